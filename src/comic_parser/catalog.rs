//! 漫画目录解析入口。

use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use super::models::{ComicDescriptor, EpisodeDescriptor};
use crate::base_system::context::Config;
use crate::base_system::retry::with_retry;
use crate::network_parser::MangaApi;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("获取漫画 mc{comic_id} 详情失败: {message}")]
    Detail { comic_id: u64, message: String },
}

/// 解析完成的漫画：元信息 + 全量章节清单。
#[derive(Debug, Clone)]
pub struct Comic {
    pub descriptor: ComicDescriptor,
    pub episodes: Vec<EpisodeDescriptor>,
}

pub struct ComicCatalog;

impl ComicCatalog {
    /// 拉取漫画详情并整理成章节清单。
    ///
    /// 章节按接口返回的逆序重排（接口是最新在前），重排后的位置
    /// 即 `real_ord`，与 `ord` 无关，保证重复或乱序的 `ord` 不影响命名。
    pub fn resolve(
        api: &dyn MangaApi,
        config: &Config,
        comic_id: u64,
    ) -> Result<Comic, CatalogError> {
        let detail = with_retry(config.retry_small(), &format!("mc{comic_id} 漫画详情"), || {
            api.comic_detail(comic_id)
        })
        .map_err(|err| CatalogError::Detail {
            comic_id,
            message: err.to_string(),
        })?;

        let save_root = PathBuf::from(&config.save_path);
        let descriptor = ComicDescriptor::from_detail(comic_id, &detail, &save_root);

        let mut ep_list = detail.ep_list;
        ep_list.reverse();
        let episodes: Vec<EpisodeDescriptor> = ep_list
            .iter()
            .enumerate()
            .map(|(idx, ep)| EpisodeDescriptor::from_data(ep, idx + 1, &descriptor.save_path))
            .collect();

        info!(
            "《{}》解析完成，共 {} 话，其中 {} 话可下载",
            descriptor.title,
            episodes.len(),
            episodes.iter().filter(|ep| ep.available).count()
        );
        Ok(Comic {
            descriptor,
            episodes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network_parser::client::{ApiError, ImageBody};
    use crate::network_parser::models::{ComicDetailData, EpisodeData, ImageToken};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubApi {
        detail_calls: AtomicU32,
        fail_first: u32,
    }

    impl MangaApi for StubApi {
        fn comic_detail(&self, _comic_id: u64) -> Result<ComicDetailData, ApiError> {
            let n = self.detail_calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(ApiError::MissingData);
            }
            Ok(ComicDetailData {
                title: "某漫画".to_string(),
                author_name: vec!["某人".to_string()],
                styles: vec!["奇幻".to_string()],
                evaluate: "简介".to_string(),
                total: 2,
                is_finish: 0,
                ep_list: vec![
                    EpisodeData {
                        id: 2,
                        ord: 2.0,
                        short_title: "2".to_string(),
                        title: String::new(),
                        is_locked: true,
                        size: 200,
                        image_count: 4,
                        pub_time: "2023-01-02 00:00:00".to_string(),
                    },
                    EpisodeData {
                        id: 1,
                        ord: 1.0,
                        short_title: "1".to_string(),
                        title: "开始".to_string(),
                        is_locked: false,
                        size: 100,
                        image_count: 3,
                        pub_time: "2023-01-01 00:00:00".to_string(),
                    },
                ],
            })
        }

        fn image_index(&self, _ep_id: u64) -> Result<Vec<String>, ApiError> {
            unimplemented!()
        }

        fn image_token(&self, _paths: &[String]) -> Result<Vec<ImageToken>, ApiError> {
            unimplemented!()
        }

        fn fetch_image(&self, _url: &str, _with_auth: bool) -> Result<ImageBody, ApiError> {
            unimplemented!()
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.save_path = "/tmp/manga".to_string();
        config.retry_small_ms = 500;
        config.retry_backoff_ms = 10;
        config
    }

    #[test]
    fn episodes_are_reversed_and_numbered() {
        let api = StubApi {
            detail_calls: AtomicU32::new(0),
            fail_first: 0,
        };
        let comic = ComicCatalog::resolve(&api, &test_config(), 12345).unwrap();
        assert_eq!(comic.descriptor.title, "某漫画");
        assert!(!comic.descriptor.finished);
        assert_eq!(comic.episodes.len(), 2);
        // 接口最新在前，重排后第一个是最早的章节
        assert_eq!(comic.episodes[0].id, 1);
        assert_eq!(comic.episodes[0].real_ord, 1);
        assert_eq!(comic.episodes[0].title, "第1话 开始");
        assert!(comic.episodes[0].available);
        assert_eq!(comic.episodes[1].real_ord, 2);
        assert_eq!(comic.episodes[1].title, "第2话");
        assert!(!comic.episodes[1].available);
    }

    #[test]
    fn detail_is_retried_within_budget() {
        let api = StubApi {
            detail_calls: AtomicU32::new(0),
            fail_first: 2,
        };
        let comic = ComicCatalog::resolve(&api, &test_config(), 12345).unwrap();
        assert_eq!(comic.episodes.len(), 2);
        assert!(api.detail_calls.load(Ordering::SeqCst) >= 3);
    }
}
