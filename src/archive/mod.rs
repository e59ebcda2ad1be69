//! 章节产物写出：下载完的临时图片按配置格式打包落盘。
//!
//! 所有格式共享同一套输入：有序的临时图片路径列表。打包成功后
//! 由各格式自己负责清掉临时文件（文件夹格式是移动，天然清空）。

pub mod cleanup;
pub mod comic_info;
pub mod exif;
pub mod folder;
pub mod pdf;
pub mod sevenz;
pub mod zip_archive;

use std::path::PathBuf;

use thiserror::Error;

use crate::base_system::retry::with_attempts;
use crate::comic_parser::models::{ComicDescriptor, EpisodeDescriptor};

/// 保存格式，来自配置项 `save_method` 的中文取值。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveFormat {
    Pdf,
    Folder,
    Zip,
    SevenZ,
    Cbz,
}

impl SaveFormat {
    pub fn from_config(value: &str) -> Option<Self> {
        match value {
            "PDF" => Some(Self::Pdf),
            "文件夹-图片" => Some(Self::Folder),
            "Zip压缩包" => Some(Self::Zip),
            "7z压缩包" => Some(Self::SevenZ),
            "Cbz压缩包" => Some(Self::Cbz),
            _ => None,
        }
    }

    pub fn as_config(&self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Folder => "文件夹-图片",
            Self::Zip => "Zip压缩包",
            Self::SevenZ => "7z压缩包",
            Self::Cbz => "Cbz压缩包",
        }
    }
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("IO 失败: {0}")]
    Io(#[from] std::io::Error),
    #[error("图片解码失败: {0}")]
    Image(#[from] image::ImageError),
    #[error("zip 写出失败: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("7z 写出失败: {0}")]
    SevenZ(#[from] sevenz_rust::Error),
    #[error("JPEG 结构解析失败: {0}")]
    Jpeg(#[from] img_parts::Error),
}

/// 打包时需要的元数据视图。`embed` 为假时产物不带任何元信息。
#[derive(Clone, Copy)]
pub struct ArtifactMeta<'a> {
    pub comic: &'a ComicDescriptor,
    pub episode: &'a EpisodeDescriptor,
    pub embed: bool,
}

/// 磁盘操作统一重试 5 次，全失败时返回最后一次的错误。
pub(crate) fn attempt<T, F>(what: &str, op: F) -> Result<T, ArchiveError>
where
    F: FnMut() -> Result<T, ArchiveError>,
{
    with_attempts(5, what, op).map_err(|err| err.last)
}

/// 把有序图片打包成指定格式，返回最终产物路径。
///
/// 失败时不动临时图片，调用方据此决定保留现场还是清理。
pub fn write_archive(
    format: SaveFormat,
    meta: &ArtifactMeta<'_>,
    images: &[PathBuf],
) -> Result<PathBuf, ArchiveError> {
    match format {
        SaveFormat::Pdf => pdf::write_pdf(meta, images),
        SaveFormat::Folder => folder::write_folder(meta, images),
        SaveFormat::Zip => zip_archive::write_zip(meta, images, false, "zip"),
        SaveFormat::Cbz => zip_archive::write_zip(meta, images, true, "cbz"),
        SaveFormat::SevenZ => sevenz::write_sevenz(meta, images),
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;
    use std::fs;
    use std::path::Path;

    pub fn fixture_meta(root: &Path, title: &str) -> (ComicDescriptor, EpisodeDescriptor) {
        let comic = ComicDescriptor {
            id: 1,
            title: "某漫画".to_string(),
            authors: vec!["某人".to_string()],
            tags: vec!["奇幻".to_string()],
            synopsis: "简介".to_string(),
            total: 3,
            finished: false,
            save_path: root.to_path_buf(),
        };
        let episode = EpisodeDescriptor {
            id: 10,
            ord: 1.0,
            real_ord: 1,
            title: title.to_string(),
            available: true,
            size: 1024,
            image_count: 3,
            pub_time: "2023-01-01 00:00:00".to_string(),
            epi_base: root.join(title),
        };
        (comic, episode)
    }

    /// 生成 n 张 1x1 的 JPEG 临时图片，命名与下载器一致。
    pub fn write_temp_jpegs(dir: &Path, real_ord: usize, n: usize) -> Vec<PathBuf> {
        (1..=n)
            .map(|idx| {
                let path = dir.join(format!("{real_ord}_{idx}.jpg"));
                let mut raw = Vec::new();
                let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut raw, 90);
                image::RgbImage::from_pixel(1, 1, image::Rgb([idx as u8 * 40, 0, 0]))
                    .write_with_encoder(encoder)
                    .unwrap();
                fs::write(&path, raw).unwrap();
                path
            })
            .collect()
    }
}
