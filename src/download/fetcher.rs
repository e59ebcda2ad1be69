//! 章节图片获取：清单解析与单图下载。
//!
//! 清单走小预算重试，图片正文走大预算重试；MD5 与 ETag 不一致
//! 视为可重试错误（CDN 偶发截断时重新拉取即可恢复）。

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use super::models::ImageManifestEntry;
use crate::base_system::context::Config;
use crate::base_system::retry::{RetryExhausted, with_attempts, with_retry};
use crate::network_parser::client::{ApiError, ImageBody};
use crate::network_parser::{MangaApi, is_checksum_valid};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("内容校验失败: ETag {expected} != MD5 {actual}")]
    Checksum { expected: String, actual: String },
    #[error("IO 失败: {0}")]
    Io(#[from] std::io::Error),
}

pub struct ImageFetcher<'a> {
    api: &'a dyn MangaApi,
    config: &'a Config,
}

impl<'a> ImageFetcher<'a> {
    pub fn new(api: &'a dyn MangaApi, config: &'a Config) -> Self {
        Self { api, config }
    }

    /// 两段式解析：先取路径列表，再整批换带 token 的下载地址。
    pub fn resolve_manifest(
        &self,
        ep_id: u64,
    ) -> Result<Vec<ImageManifestEntry>, RetryExhausted<FetchError>> {
        let paths = with_retry(
            self.config.retry_small(),
            &format!("ep{ep_id} 图片清单"),
            || self.api.image_index(ep_id).map_err(FetchError::from),
        )?;
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let tokens = with_retry(
            self.config.retry_small(),
            &format!("ep{ep_id} 图片 token"),
            || self.api.image_token(&paths).map_err(FetchError::from),
        )?;

        Ok(tokens
            .into_iter()
            .enumerate()
            .map(|(idx, token)| ImageManifestEntry {
                index: idx + 1,
                url: token.url,
                token: token.token,
            })
            .collect())
    }

    /// 下载一张图到暂存目录，返回临时文件路径。
    ///
    /// 临时文件名为 `{real_ord}_{index}.{ext}`，章节内有序且全局不冲突。
    pub fn download_one(
        &self,
        scratch: &Path,
        real_ord: usize,
        entry: &ImageManifestEntry,
    ) -> Result<PathBuf, RetryExhausted<FetchError>> {
        // 有 token 走签名地址，没有 token 的旧接口要带登录请求头
        let url = match &entry.token {
            Some(token) => format!("{}?token={token}", entry.url),
            None => entry.url.clone(),
        };
        let with_auth = entry.token.is_none();

        let body = with_retry(
            self.config.retry_large(),
            &format!("图片 #{}", entry.index),
            || -> Result<ImageBody, FetchError> {
                let body = self.api.fetch_image(&url, with_auth)?;
                if let Some(etag) = &body.etag {
                    let (valid, actual) = is_checksum_valid(etag, &body.bytes);
                    if !valid {
                        return Err(FetchError::Checksum {
                            expected: etag.clone(),
                            actual,
                        });
                    }
                }
                Ok(body)
            },
        )?;

        let ext = extension_of(&entry.url);
        let dest = scratch.join(format!("{real_ord}_{}.{ext}", entry.index));
        with_attempts(5, &format!("写入 {}", dest.display()), || {
            fs::write(&dest, &body.bytes)
        })
        .map_err(|err| RetryExhausted {
            attempts: err.attempts,
            elapsed: err.elapsed,
            last: FetchError::Io(err.last),
        })?;

        debug!("图片 #{} 已落盘 {}", entry.index, dest.display());
        Ok(dest)
    }
}

/// 从下载地址提取扩展名，丢掉查询串，取不到时默认 jpg。
fn extension_of(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && !ext.contains('/') => ext,
        _ => "jpg",
    }
}
