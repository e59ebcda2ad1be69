//! 文件夹格式：把临时图片移进章节目录并按顺序重命名。
//!
//! 这一步同时是压缩类格式的暂存步骤。移动对重试是幂等的：
//! 源不在而目标在视为已完成。

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use super::{ArchiveError, ArtifactMeta, attempt, exif};

/// 目录内文件名用三位零填充序号，保证阅读器按字典序即为页序。
pub fn write_folder(
    meta: &ArtifactMeta<'_>,
    images: &[PathBuf],
) -> Result<PathBuf, ArchiveError> {
    let dir = meta.episode.epi_base.clone();
    fs::create_dir_all(&dir)?;

    for (idx, src) in images.iter().enumerate() {
        let ext = src
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg")
            .to_string();
        let dest = dir.join(format!("{:03}.{ext}", idx + 1));
        attempt(&format!("归档第 {} 页", idx + 1), || {
            place_image(src, &dest, meta)
        })?;
    }
    Ok(dir)
}

fn place_image(src: &Path, dest: &Path, meta: &ArtifactMeta<'_>) -> Result<(), ArchiveError> {
    if !src.exists() && dest.exists() {
        return Ok(());
    }

    let is_jpeg = matches!(
        dest.extension().and_then(|e| e.to_str()),
        Some("jpg") | Some("jpeg")
    );
    if meta.embed && is_jpeg {
        let bytes = fs::read(src)?;
        match exif::embed_into_jpeg(bytes, meta) {
            Ok(tagged) => {
                fs::write(dest, tagged)?;
                fs::remove_file(src)?;
                return Ok(());
            }
            Err(err) => {
                // 元数据写不进去不挡落盘，退回普通移动
                warn!("EXIF 嵌入失败，按原样保存 {}: {err}", dest.display());
            }
        }
    }

    move_file(src, dest)
}

/// 先尝试 rename，跨设备时退化为 copy + remove。
fn move_file(src: &Path, dest: &Path) -> Result<(), ArchiveError> {
    match fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(src, dest)?;
            fs::remove_file(src)?;
            Ok(())
        }
    }
}
