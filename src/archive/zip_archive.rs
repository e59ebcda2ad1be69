//! Zip / Cbz 格式：先走文件夹暂存，再平铺压缩，最后删掉暂存目录。

use std::fs::{self, File};
use std::io;
use std::path::PathBuf;

use zip::CompressionMethod;
use zip::write::FileOptions;

use super::{ArchiveError, ArtifactMeta, attempt, comic_info, folder};
use crate::base_system::retry::with_attempts;

/// `with_comic_info` 为真时（Cbz）在包里附带 ComicInfo.xml。
pub fn write_zip(
    meta: &ArtifactMeta<'_>,
    images: &[PathBuf],
    with_comic_info: bool,
    extension: &str,
) -> Result<PathBuf, ArchiveError> {
    let dir = folder::write_folder(meta, images)?;
    if with_comic_info {
        fs::write(dir.join("ComicInfo.xml"), comic_info::render(meta))?;
    }

    let out = meta.episode.epi_base.with_extension(extension);
    attempt(&format!("压缩 {extension} 包"), || {
        let mut entries: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        entries.sort();

        let file = File::create(&out)?;
        let mut zip = zip::ZipWriter::new(file);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        for entry in &entries {
            // 平铺结构，不带目录前缀
            let name = entry
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            zip.start_file(name, options)?;
            let mut reader = File::open(entry)?;
            io::copy(&mut reader, &mut zip)?;
        }
        zip.finish()?;
        Ok(())
    })?;

    with_attempts(3, "删除暂存目录", || {
        fs::remove_dir_all(&dir).map_err(ArchiveError::from)
    })
    .map_err(|err| err.last)?;
    Ok(out)
}
