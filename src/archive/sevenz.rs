//! 7z 格式：文件夹暂存后整体压缩。

use std::fs;
use std::path::PathBuf;

use super::{ArchiveError, ArtifactMeta, attempt, folder};
use crate::base_system::retry::with_attempts;

pub fn write_sevenz(
    meta: &ArtifactMeta<'_>,
    images: &[PathBuf],
) -> Result<PathBuf, ArchiveError> {
    let dir = folder::write_folder(meta, images)?;
    let out = meta.episode.epi_base.with_extension("7z");

    attempt("压缩 7z 包", || {
        sevenz_rust::compress_to_path(&dir, &out)?;
        Ok(())
    })?;

    with_attempts(3, "删除暂存目录", || {
        fs::remove_dir_all(&dir).map_err(ArchiveError::from)
    })
    .map_err(|err| err.last)?;
    Ok(out)
}
