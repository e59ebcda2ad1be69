//! ComicInfo.xml 生成（Anansi 项目的漫画元数据约定，Cbz 阅读器通用）。

use std::fmt::Write;

use time::PrimitiveDateTime;
use time::macros::format_description;

use super::ArtifactMeta;

/// 渲染一份 ComicInfo.xml 文本。
pub fn render(meta: &ArtifactMeta<'_>) -> String {
    let comic = meta.comic;
    let episode = meta.episode;
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="utf-8"?>"#);
    xml.push('\n');
    xml.push_str("<ComicInfo>\n");
    tag(&mut xml, "Title", &episode.title);
    tag(&mut xml, "Series", &comic.title);
    tag(&mut xml, "Number", &format_ord(episode.ord));
    tag(&mut xml, "Count", &comic.total.to_string());
    tag(&mut xml, "Writer", &comic.authors.join(", "));
    tag(&mut xml, "Publisher", "bilibili漫画");
    tag(&mut xml, "Genre", &comic.tags.join(", "));
    tag(&mut xml, "Summary", &comic.synopsis);
    tag(&mut xml, "PageCount", &episode.image_count.to_string());
    if let Some((year, month, day)) = parse_pub_date(&episode.pub_time) {
        tag(&mut xml, "Year", &year.to_string());
        tag(&mut xml, "Month", &month.to_string());
        tag(&mut xml, "Day", &day.to_string());
    }
    tag(&mut xml, "LanguageISO", "zh");
    tag(&mut xml, "Manga", "Yes");
    xml.push_str("</ComicInfo>\n");
    xml
}

/// 发布序号为整数时不带小数点，24.5 这类保留原样。
fn format_ord(ord: f64) -> String {
    if ord.fract() == 0.0 {
        format!("{}", ord as i64)
    } else {
        format!("{ord}")
    }
}

fn parse_pub_date(pub_time: &str) -> Option<(i32, u8, u8)> {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let dt = PrimitiveDateTime::parse(pub_time, &format).ok()?;
    Some((dt.year(), dt.month() as u8, dt.day()))
}

fn tag(xml: &mut String, name: &str, value: &str) {
    let _ = writeln!(xml, "  <{name}>{}</{name}>", escape(value));
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}
