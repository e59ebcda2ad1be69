//! PDF 格式：每张图一页，页面尺寸即图片像素尺寸。
//!
//! 所有图片统一转成 RGB 再重编码为 JPEG，以 DCTDecode 流内嵌，
//! 避免原图的 CMYK/灰度/PNG 在阅读器里渲染不一致。

use std::fs;
use std::path::PathBuf;

use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;
use pdf_writer::{Content, Filter, Finish, Name, Pdf, Rect, Ref, TextStr};

use super::{ArchiveError, ArtifactMeta, attempt, cleanup};

const JPEG_QUALITY: u8 = 95;

pub fn write_pdf(meta: &ArtifactMeta<'_>, images: &[PathBuf]) -> Result<PathBuf, ArchiveError> {
    let out = meta.episode.epi_base.with_extension("pdf");
    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut pdf = Pdf::new();
    let mut alloc = Ref::new(1);
    let catalog_id = alloc.bump();
    let page_tree_id = alloc.bump();
    let mut page_ids = Vec::with_capacity(images.len());

    for src in images {
        let (jpeg, width, height) = normalize_jpeg(src)?;
        let image_id = alloc.bump();
        let content_id = alloc.bump();
        let page_id = alloc.bump();
        page_ids.push(page_id);

        let mut xobject = pdf.image_xobject(image_id, &jpeg);
        xobject.filter(Filter::DctDecode);
        xobject.width(width as i32);
        xobject.height(height as i32);
        xobject.color_space().device_rgb();
        xobject.bits_per_component(8);
        xobject.finish();

        let mut content = Content::new();
        content.save_state();
        content.transform([width as f32, 0.0, 0.0, height as f32, 0.0, 0.0]);
        content.x_object(Name(b"Im0"));
        content.restore_state();
        pdf.stream(content_id, &content.finish());

        let mut page = pdf.page(page_id);
        page.media_box(Rect::new(0.0, 0.0, width as f32, height as f32));
        page.parent(page_tree_id);
        page.contents(content_id);
        page.resources().x_objects().pair(Name(b"Im0"), image_id);
        page.finish();
    }

    pdf.pages(page_tree_id)
        .kids(page_ids.iter().copied())
        .count(page_ids.len() as i32);
    pdf.catalog(catalog_id).pages(page_tree_id);

    if meta.embed {
        let info_id = alloc.bump();
        let title = format!("{} {}", meta.comic.title, meta.episode.title);
        let authors = meta.comic.authors.join(", ");
        let mut info = pdf.document_info(info_id);
        info.title(TextStr(&title));
        info.author(TextStr(&authors));
        info.creator(TextStr("bilibili漫画"));
        info.finish();
    }

    let bytes = pdf.finish();
    attempt("写出 PDF", || {
        fs::write(&out, &bytes)?;
        Ok(())
    })?;

    cleanup::clear_images_with_retry(images)?;
    Ok(out)
}

/// 解码任意来源图片并重编码为 RGB JPEG，返回 (字节, 宽, 高)。
fn normalize_jpeg(src: &PathBuf) -> Result<(Vec<u8>, u32, u32), ArchiveError> {
    let raw = fs::read(src)?;
    let decoded = image::load_from_memory(&raw)?;
    let rgb = decoded.to_rgb8();
    let (width, height) = rgb.dimensions();
    let mut jpeg = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY);
    encoder.encode(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)?;
    Ok((jpeg, width, height))
}
