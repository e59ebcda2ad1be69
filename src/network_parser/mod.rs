//! B站漫画 API 访问层。
//!
//! 原始 JSON 只在这一层解析与校验一次，下游模块只接触类型化的记录。

pub mod client;
pub mod models;

pub use client::{ApiError, MangaApi, MangaClient, is_checksum_valid};
