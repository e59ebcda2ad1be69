//! 测试用的假 API 与夹具构造。
//!
//! FakeApi 用真实的 JPEG 字节与 MD5 ETag 应答，支持按页注入失败、
//! 校验损坏与固定延迟，所有调用都有计数器可供断言。

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use crate::archive::SaveFormat;
use crate::base_system::context::Config;
use crate::comic_parser::models::{ComicDescriptor, EpisodeDescriptor};
use crate::download::manager::JobContext;
use crate::network_parser::client::{ApiError, ImageBody};
use crate::network_parser::models::{ComicDetailData, ImageToken};
use crate::network_parser::MangaApi;

pub struct FakeApi {
    pages: Vec<(Vec<u8>, String)>,
    fail_index: bool,
    fail_image_at: Option<usize>,
    corrupt_remaining: AtomicU32,
    fetch_delay: Option<Duration>,
    pub index_calls: AtomicU32,
    pub token_calls: AtomicU32,
    pub fetch_calls: AtomicU32,
}

impl FakeApi {
    /// n 页章节，每页是一张像素颜色不同的 1x1 JPEG。
    pub fn with_pages(n: usize) -> Self {
        let pages = (1..=n)
            .map(|idx| {
                let mut raw = Vec::new();
                let encoder =
                    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut raw, 90);
                image::RgbImage::from_pixel(1, 1, image::Rgb([(idx * 37 % 256) as u8, 0, 0]))
                    .write_with_encoder(encoder)
                    .unwrap();
                let etag = format!("{:x}", md5::compute(&raw));
                (raw, etag)
            })
            .collect();
        Self {
            pages,
            fail_index: false,
            fail_image_at: None,
            corrupt_remaining: AtomicU32::new(0),
            fetch_delay: None,
            index_calls: AtomicU32::new(0),
            token_calls: AtomicU32::new(0),
            fetch_calls: AtomicU32::new(0),
        }
    }

    /// 图片清单接口永远失败。
    pub fn fail_index(mut self) -> Self {
        self.fail_index = true;
        self
    }

    /// 第 `index` 页（从 1 起）永远下载失败。
    pub fn fail_image_at(mut self, index: usize) -> Self {
        self.fail_image_at = Some(index);
        self
    }

    /// 前 n 次图片响应返回错误的 ETag，触发校验重试。
    pub fn corrupt_first_fetches(self, n: u32) -> Self {
        self.corrupt_remaining.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    fn page_of(&self, url: &str) -> Option<usize> {
        let path = url.split('?').next()?;
        let name = path.rsplit('/').next()?;
        name.strip_suffix(".jpg")?.parse().ok()
    }
}

impl MangaApi for FakeApi {
    fn comic_detail(&self, _comic_id: u64) -> Result<ComicDetailData, ApiError> {
        Err(ApiError::MissingData)
    }

    fn image_index(&self, ep_id: u64) -> Result<Vec<String>, ApiError> {
        self.index_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_index {
            return Err(ApiError::MissingData);
        }
        Ok((1..=self.pages.len())
            .map(|idx| format!("/bfs/manga/ep{ep_id}/{idx}.jpg"))
            .collect())
    }

    fn image_token(&self, paths: &[String]) -> Result<Vec<ImageToken>, ApiError> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        Ok(paths
            .iter()
            .map(|path| ImageToken {
                url: format!("https://manga.example{path}"),
                token: Some("tok".to_string()),
            })
            .collect())
    }

    fn fetch_image(&self, url: &str, _with_auth: bool) -> Result<ImageBody, ApiError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.fetch_delay {
            thread::sleep(delay);
        }
        let page = self.page_of(url).ok_or(ApiError::MissingData)?;
        if self.fail_image_at == Some(page) {
            return Err(ApiError::MissingData);
        }
        let (bytes, etag) = self.pages.get(page - 1).ok_or(ApiError::MissingData)?;

        let corrupted = self
            .corrupt_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let etag = if corrupted {
            "0123456789abcdef0123456789abcdef".to_string()
        } else {
            etag.clone()
        };
        Ok(ImageBody {
            bytes: bytes.clone(),
            etag: Some(etag),
        })
    }
}

pub fn fixture_episode(root: &Path, ordinal: usize, title: &str) -> EpisodeDescriptor {
    EpisodeDescriptor {
        id: ordinal as u64,
        ord: ordinal as f64,
        real_ord: ordinal,
        title: title.to_string(),
        available: true,
        size: 3000,
        image_count: 0,
        pub_time: "2023-01-01 00:00:00".to_string(),
        epi_base: root.join(title),
    }
}

/// 带快速重试预算的会话上下文，避免失败注入的测试等穿预算。
pub fn job_context(root: &Path, api: Arc<FakeApi>, format: SaveFormat) -> JobContext {
    let mut config = Config::default();
    config.max_workers = 2;
    config.retry_small_ms = 300;
    config.retry_large_ms = 300;
    config.retry_backoff_ms = 10;
    config.save_path = root.to_string_lossy().into_owned();
    config.save_method = format.as_config().to_string();

    let comic = ComicDescriptor {
        id: 1,
        title: "某漫画".to_string(),
        authors: vec!["某人".to_string()],
        tags: vec!["奇幻".to_string()],
        synopsis: "简介".to_string(),
        total: 5,
        finished: false,
        save_path: root.to_path_buf(),
    };

    JobContext {
        config,
        api,
        comic,
        format,
    }
}
