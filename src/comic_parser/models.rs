//! 漫画与章节的类型化描述。
//!
//! 章节标题在这里做归一化，后续所有落盘路径都从归一化后的标题推导。

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::base_system::paths;
use crate::network_parser::models::{ComicDetailData, EpisodeData};

/// 解析完成的漫画元信息。
#[derive(Debug, Clone)]
pub struct ComicDescriptor {
    pub id: u64,
    pub title: String,
    pub authors: Vec<String>,
    pub tags: Vec<String>,
    pub synopsis: String,
    pub total: u32,
    pub finished: bool,
    /// 漫画保存目录：`{根目录}/《标题》 作者：xxx`。
    pub save_path: PathBuf,
}

impl ComicDescriptor {
    pub fn from_detail(id: u64, detail: &ComicDetailData, save_root: &Path) -> Self {
        let save_path = paths::comic_dir(save_root, &detail.title, &detail.author_name);
        Self {
            id,
            title: detail.title.clone(),
            authors: detail.author_name.clone(),
            tags: detail.styles.clone(),
            synopsis: detail.evaluate.clone(),
            total: detail.total,
            finished: detail.is_finish == 1,
            save_path,
        }
    }
}

/// 单个章节的下载描述。
#[derive(Debug, Clone)]
pub struct EpisodeDescriptor {
    pub id: u64,
    /// 接口给出的发布序号，可能为小数、重复或乱序。
    pub ord: f64,
    /// 按发布逆序重排后的稳定序号，从 1 开始，用于临时文件命名。
    pub real_ord: usize,
    /// 归一化后的章节标题。
    pub title: String,
    /// 未锁定（已解锁或免费）才可下载。
    pub available: bool,
    pub size: u64,
    pub image_count: u32,
    pub pub_time: String,
    /// 章节产物的基础路径（不带扩展名）。
    pub epi_base: PathBuf,
}

impl EpisodeDescriptor {
    pub fn from_data(ep: &EpisodeData, real_ord: usize, comic_save_path: &Path) -> Self {
        let title = normalize_title(&ep.short_title, &ep.title);
        let epi_base = paths::episode_base(comic_save_path, &title);
        Self {
            id: ep.id,
            ord: ep.ord,
            real_ord,
            title,
            available: !ep.is_locked,
            size: ep.size,
            image_count: ep.image_count,
            pub_time: ep.pub_time.clone(),
            epi_base,
        }
    }

    /// 已存在的产物路径（文件夹或任一压缩格式）。
    pub fn existing_artifact(&self) -> Option<PathBuf> {
        paths::existing_artifact(&self.epi_base)
    }
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("内置正则"))
}

/// 把 short_title/title 组合成唯一且可读的章节标题。
///
/// B站的两个标题字段高度随意：可能互为重复、可能一个为空、
/// 可能 short_title 只是数字序号。组合规则对齐原版客户端。
pub fn normalize_title(short_title: &str, title: &str) -> String {
    static DUP_HUA: OnceLock<Regex> = OnceLock::new();
    static DUP_BARE: OnceLock<Regex> = OnceLock::new();
    static SPECIAL: OnceLock<Regex> = OnceLock::new();
    static NUM_HUA: OnceLock<Regex> = OnceLock::new();
    static NUM_SPACE: OnceLock<Regex> = OnceLock::new();
    static NUM_ONLY: OnceLock<Regex> = OnceLock::new();

    let short = paths::safe_fs_name(short_title);
    let long = paths::safe_fs_name(title);
    let mut combined = if short == long || long.is_empty() {
        short
    } else {
        format!("{short} {long}")
    };

    // "12 第12话" 这类前缀与正文重复，去掉前缀
    let dup_hua = regex(&DUP_HUA, r"^(\d+)\s+第(\d+)话");
    let strip_to = dup_hua
        .captures(&combined)
        .filter(|caps| caps[1] == caps[2])
        .map(|caps| caps.get(1).map(|m| m.end()).unwrap_or(0));
    if let Some(pos) = strip_to {
        combined = combined[pos..].trim_start().to_string();
    }
    // "12 第12" 结尾缺"话"，去前缀并补全
    let dup_bare = regex(&DUP_BARE, r"^(\d+)\s+第(\d+)$");
    let rebuilt = dup_bare
        .captures(&combined)
        .filter(|caps| caps[1] == caps[2])
        .map(|caps| format!("第{}话", &caps[2]));
    if let Some(rebuilt) = rebuilt {
        combined = rebuilt;
    }
    let special = regex(&SPECIAL, r"^特别篇\s+特别篇");
    if special.is_match(&combined) {
        combined = special.replace(&combined, "特别篇").into_owned();
    }

    // 纯数字序号补上"第N话"
    let num_hua = regex(&NUM_HUA, r"^([0-9\-]+)话");
    let num_space = regex(&NUM_SPACE, r"^([0-9\-]+) ");
    let num_only = regex(&NUM_ONLY, r"^([0-9\-]+)$");
    if num_hua.is_match(&combined) {
        combined = num_hua.replace(&combined, "第${1}话").into_owned();
    } else if num_space.is_match(&combined) {
        combined = num_space.replace(&combined, "第${1}话 ").into_owned();
    } else if num_only.is_match(&combined) {
        combined = num_only.replace(&combined, "第${1}话").into_owned();
    }

    combined.trim().to_string()
}
