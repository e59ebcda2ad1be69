//! 临时图片清理。
//!
//! 打包成功后的清理必须可靠（残留会污染下次下载的跳过判断），
//! 带重试；取消/失败路径的清理尽力而为即可。

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use super::ArchiveError;
use crate::base_system::retry::with_attempts;

/// 尽力删除临时图片，失败只记日志。用于取消路径。
pub fn clear_images_fast(images: &[PathBuf]) {
    for path in images {
        if path.exists() {
            if let Err(err) = fs::remove_file(path) {
                warn!("清理临时图片 {} 失败: {err}", path.display());
            }
        }
    }
}

/// 带重试的清理，打包成功与下载失败后使用。已不存在的文件视为已清理。
pub fn clear_images_with_retry(images: &[PathBuf]) -> Result<(), ArchiveError> {
    with_attempts(3, "清理临时图片", || {
        for path in images {
            remove_if_exists(path)?;
        }
        Ok(())
    })
    .map_err(|err| err.last)
}

fn remove_if_exists(path: &Path) -> Result<(), ArchiveError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
