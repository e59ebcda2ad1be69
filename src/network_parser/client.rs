//! 阻塞式 reqwest 客户端与 [`MangaApi`] 接口。

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue, ORIGIN, REFERER, USER_AGENT};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use super::models::{ApiEnvelope, ComicDetailData, ImageIndexData, ImageToken};
use crate::base_system::context::Config;

const UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                  (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";
const ORIGIN_URL: &str = "https://manga.bilibili.com";
const DETAIL_URL: &str =
    "https://manga.bilibili.com/twirp/comic.v1.Comic/ComicDetail?device=pc&platform=web";
const IMAGE_INDEX_URL: &str =
    "https://manga.bilibili.com/twirp/comic.v1.Comic/GetImageIndex?device=pc&platform=web";
const IMAGE_TOKEN_URL: &str =
    "https://manga.bilibili.com/twirp/comic.v1.Comic/ImageToken?device=pc&platform=web";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("网络请求失败: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP 状态异常: {0}")]
    Status(StatusCode),
    #[error("接口返回错误码 {code}: {msg}")]
    Api { code: i64, msg: String },
    #[error("接口响应缺少 data 字段")]
    MissingData,
}

/// 一次图片请求的响应体与内容校验所需的 ETag。
#[derive(Debug, Clone)]
pub struct ImageBody {
    pub bytes: Vec<u8>,
    pub etag: Option<String>,
}

/// 下载核心依赖的 API 面，测试里用假实现替换真实网络。
pub trait MangaApi: Send + Sync {
    /// 漫画详情（标题/作者/章节列表）。
    fn comic_detail(&self, comic_id: u64) -> Result<ComicDetailData, ApiError>;
    /// 章节内有序图片路径列表。
    fn image_index(&self, ep_id: u64) -> Result<Vec<String>, ApiError>;
    /// 用路径换取带 token 的下载地址。
    fn image_token(&self, paths: &[String]) -> Result<Vec<ImageToken>, ApiError>;
    /// 下载单张图片正文；`with_auth` 为真时附带登录请求头。
    fn fetch_image(&self, url: &str, with_auth: bool) -> Result<ImageBody, ApiError>;
}

pub struct MangaClient {
    http: Client,
    comic_id: u64,
    sessdata: String,
    timeout_small: Duration,
    timeout_large: Duration,
}

impl MangaClient {
    pub fn new(config: &Config, comic_id: u64) -> Result<Self, ApiError> {
        let http = Client::builder().build()?;
        Ok(Self {
            http,
            comic_id,
            sessdata: config.sessdata.clone(),
            timeout_small: Duration::from_secs(config.timeout_small),
            timeout_large: Duration::from_secs(config.timeout_large),
        })
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(UA));
        headers.insert(ORIGIN, HeaderValue::from_static(ORIGIN_URL));
        let referer = format!("{ORIGIN_URL}/detail/mc{}?from=manga_homepage", self.comic_id);
        if let Ok(v) = HeaderValue::from_str(&referer) {
            headers.insert(REFERER, v);
        }
        let cookie = format!("SESSDATA={}", self.sessdata);
        if let Ok(v) = HeaderValue::from_str(&cookie) {
            headers.insert(COOKIE, v);
        }
        headers
    }

    fn post_api<T: DeserializeOwned>(
        &self,
        url: &str,
        form: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let res = self
            .http
            .post(url)
            .headers(self.auth_headers())
            .form(form)
            .timeout(self.timeout_small)
            .send()?;
        if res.status() != StatusCode::OK {
            return Err(ApiError::Status(res.status()));
        }
        let envelope: ApiEnvelope<T> = res.json()?;
        if envelope.code != 0 {
            return Err(ApiError::Api {
                code: envelope.code,
                msg: envelope.msg,
            });
        }
        envelope.data.ok_or(ApiError::MissingData)
    }
}

impl MangaApi for MangaClient {
    fn comic_detail(&self, comic_id: u64) -> Result<ComicDetailData, ApiError> {
        debug!("请求漫画详情 mc{comic_id}");
        self.post_api(DETAIL_URL, &[("comic_id", comic_id.to_string())])
    }

    fn image_index(&self, ep_id: u64) -> Result<Vec<String>, ApiError> {
        let data: ImageIndexData = self.post_api(IMAGE_INDEX_URL, &[("ep_id", ep_id.to_string())])?;
        Ok(data.images.into_iter().map(|img| img.path).collect())
    }

    fn image_token(&self, paths: &[String]) -> Result<Vec<ImageToken>, ApiError> {
        // 接口要求把路径列表作为 JSON 字符串放进表单字段
        let urls = serde_json::to_string(paths).unwrap_or_else(|_| "[]".to_string());
        self.post_api(IMAGE_TOKEN_URL, &[("urls", urls)])
    }

    fn fetch_image(&self, url: &str, with_auth: bool) -> Result<ImageBody, ApiError> {
        let mut req = self.http.get(url).timeout(self.timeout_large);
        if with_auth {
            req = req.headers(self.auth_headers());
        }
        let res = req.send()?;
        if res.status() != StatusCode::OK {
            return Err(ApiError::Status(res.status()));
        }
        let etag = res
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string());
        let bytes = res.bytes()?.to_vec();
        Ok(ImageBody { bytes, etag })
    }
}

/// 校验响应体 MD5 是否与 ETag 一致，返回 (是否一致, 实际摘要)。
pub fn is_checksum_valid(etag: &str, body: &[u8]) -> (bool, String) {
    let digest = format!("{:x}", md5::compute(body));
    (etag == digest, digest)
}
