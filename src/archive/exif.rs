//! JPEG EXIF 元数据嵌入。
//!
//! 手工构造一个最小的 TIFF IFD（小端），只含描述/作者/版权三个
//! ASCII 条目，由 img-parts 负责拼回 JPEG 的 APP1 段。

use img_parts::jpeg::Jpeg;
use img_parts::{Bytes, ImageEXIF};

use super::{ArchiveError, ArtifactMeta};

const TAG_IMAGE_DESCRIPTION: u16 = 0x010E;
const TAG_SOFTWARE: u16 = 0x0131;
const TAG_ARTIST: u16 = 0x013B;
const TAG_COPYRIGHT: u16 = 0x8298;
const TYPE_ASCII: u16 = 2;

/// 向 JPEG 字节流写入章节元数据，返回新的完整字节流。
pub fn embed_into_jpeg(bytes: Vec<u8>, meta: &ArtifactMeta<'_>) -> Result<Vec<u8>, ArchiveError> {
    let mut jpeg = Jpeg::from_bytes(Bytes::from(bytes))?;
    let tiff = build_tiff(meta);
    jpeg.set_exif(Some(Bytes::from(tiff)));
    Ok(jpeg.encoder().bytes().to_vec())
}

/// TIFF 条目按 tag 升序排列，越界数据紧跟 IFD 之后。
fn build_tiff(meta: &ArtifactMeta<'_>) -> Vec<u8> {
    let description = format!("{} {}", meta.comic.title, meta.episode.title);
    let artist = meta.comic.authors.join(", ");
    let copyright = "bilibili漫画";

    let entries: Vec<(u16, Vec<u8>)> = vec![
        (TAG_IMAGE_DESCRIPTION, ascii_value(&description)),
        (
            TAG_SOFTWARE,
            ascii_value(concat!("bili-manga-downloader v", env!("CARGO_PKG_VERSION"))),
        ),
        (TAG_ARTIST, ascii_value(&artist)),
        (TAG_COPYRIGHT, ascii_value(copyright)),
    ];

    let mut out = Vec::new();
    out.extend_from_slice(b"II");
    out.extend_from_slice(&42u16.to_le_bytes());
    out.extend_from_slice(&8u32.to_le_bytes()); // 第一个 IFD 的偏移

    let entry_count = entries.len() as u16;
    out.extend_from_slice(&entry_count.to_le_bytes());

    // IFD 之后才是越界数据区
    let mut data_offset = 8 + 2 + entries.len() as u32 * 12 + 4;
    let mut overflow: Vec<u8> = Vec::new();

    for (tag, value) in &entries {
        out.extend_from_slice(&tag.to_le_bytes());
        out.extend_from_slice(&TYPE_ASCII.to_le_bytes());
        out.extend_from_slice(&(value.len() as u32).to_le_bytes());
        if value.len() <= 4 {
            let mut inline = [0u8; 4];
            inline[..value.len()].copy_from_slice(value);
            out.extend_from_slice(&inline);
        } else {
            out.extend_from_slice(&data_offset.to_le_bytes());
            overflow.extend_from_slice(value);
            data_offset += value.len() as u32;
        }
    }

    out.extend_from_slice(&0u32.to_le_bytes()); // 没有下一个 IFD
    out.extend_from_slice(&overflow);
    out
}

fn ascii_value(s: &str) -> Vec<u8> {
    let mut v = s.as_bytes().to_vec();
    v.push(0);
    v
}
