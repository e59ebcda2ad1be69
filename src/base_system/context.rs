//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息。

use serde::{Deserialize, Serialize};

use super::config::{ConfigSpec, FieldMeta};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 网络配置
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_timeout_small")]
    pub timeout_small: u64,
    #[serde(default = "default_timeout_large")]
    pub timeout_large: u64,
    #[serde(default = "default_retry_small_ms")]
    pub retry_small_ms: u64,
    #[serde(default = "default_retry_large_ms")]
    pub retry_large_ms: u64,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    // 登录配置
    #[serde(default = "default_string")]
    pub sessdata: String,

    // 保存配置
    #[serde(default = "default_save_method")]
    pub save_method: String,
    #[serde(default = "default_true")]
    pub exif: bool,
    #[serde(default)]
    pub save_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            timeout_small: default_timeout_small(),
            timeout_large: default_timeout_large(),
            retry_small_ms: default_retry_small_ms(),
            retry_large_ms: default_retry_large_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            sessdata: default_string(),
            save_method: default_save_method(),
            exif: default_true(),
            save_path: String::new(),
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 10] = [
            FieldMeta {
                name: "max_workers",
                description: "最大并发下载线程数",
            },
            FieldMeta {
                name: "timeout_small",
                description: "元数据请求超时时间（秒）",
            },
            FieldMeta {
                name: "timeout_large",
                description: "图片下载超时时间（秒）",
            },
            FieldMeta {
                name: "retry_small_ms",
                description: "元数据请求重试总预算, 单位ms",
            },
            FieldMeta {
                name: "retry_large_ms",
                description: "图片下载重试总预算, 单位ms",
            },
            FieldMeta {
                name: "retry_backoff_ms",
                description: "重试退避基数, 单位ms（指数退避）",
            },
            FieldMeta {
                name: "sessdata",
                description: "B站登录 Cookie 中的 SESSDATA 值",
            },
            FieldMeta {
                name: "save_method",
                description: "保存格式, 可选: [PDF, 文件夹-图片, Zip压缩包, 7z压缩包, Cbz压缩包]",
            },
            FieldMeta {
                name: "exif",
                description: "是否在产物中嵌入标题/作者等元数据（PDF 属性 / JPEG EXIF）",
            },
            FieldMeta {
                name: "save_path",
                description: "漫画保存根目录",
            },
        ];
        &FIELDS
    }
}

impl Config {
    pub fn retry_small(&self) -> super::retry::RetryPolicy {
        super::retry::RetryPolicy {
            max_elapsed: std::time::Duration::from_millis(self.retry_small_ms),
            base_backoff: std::time::Duration::from_millis(self.retry_backoff_ms),
            max_backoff: std::time::Duration::from_secs(8),
        }
    }

    pub fn retry_large(&self) -> super::retry::RetryPolicy {
        super::retry::RetryPolicy {
            max_elapsed: std::time::Duration::from_millis(self.retry_large_ms),
            base_backoff: std::time::Duration::from_millis(self.retry_backoff_ms),
            max_backoff: std::time::Duration::from_secs(8),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_string() -> String {
    String::new()
}

fn default_max_workers() -> usize {
    8
}

fn default_timeout_small() -> u64 {
    5
}

fn default_timeout_large() -> u64 {
    10
}

fn default_retry_small_ms() -> u64 {
    10_000
}

fn default_retry_large_ms() -> u64 {
    20_000
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_save_method() -> String {
    "PDF".to_string()
}
