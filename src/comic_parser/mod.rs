//! 漫画目录解析：把接口数据整理成可下载的章节清单。

pub mod catalog;
pub mod models;

pub use catalog::{CatalogError, Comic, ComicCatalog};
pub use models::{ComicDescriptor, EpisodeDescriptor};
