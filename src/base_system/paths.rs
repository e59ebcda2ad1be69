//! 保存路径与文件名处理。
//!
//! 漫画/章节的落盘路径是确定性的：`{save_path}/《标题》 作者：{作者}/{章节标题}`，
//! 不同保存格式只在扩展名上有差异。

use std::path::{Path, PathBuf};

/// 替换文件系统非法字符（对齐原版 myStrFilter 的全角替换表）。
pub fn safe_fs_name(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' | '/' => out.push(' '),
            ':' => out.push('：'),
            '*' => out.push('⭐'),
            '?' => out.push('？'),
            '"' => out.push('\''),
            '<' => out.push('《'),
            '>' => out.push('》'),
            '|' => out.push('丨'),
            '.' => out.push('·'),
            _ => out.push(ch),
        }
    }
    out.trim().to_string()
}

/// 漫画保存目录：`《标题》 作者：xxx, yyy`。
pub fn comic_dir(root: &Path, title: &str, authors: &[String]) -> PathBuf {
    root.join(format!(
        "《{}》 作者：{}",
        safe_fs_name(title),
        safe_fs_name(&authors.join(", "))
    ))
}

/// 章节产物的基础路径（不带扩展名）。
pub fn episode_base(save_path: &Path, episode_title: &str) -> PathBuf {
    save_path.join(episode_title)
}

/// 查找章节已有的产物（文件夹或已知扩展名之一），返回找到的路径。
pub fn existing_artifact(epi_base: &Path) -> Option<PathBuf> {
    if epi_base.is_dir() {
        return Some(epi_base.to_path_buf());
    }
    const EXTS: [&str; 4] = ["pdf", "zip", "7z", "cbz"];
    EXTS.iter()
        .map(|ext| epi_base.with_extension(ext))
        .find(|p| p.is_file())
}

/// 章节是否已有任一格式的产物。
pub fn artifact_exists(epi_base: &Path) -> bool {
    existing_artifact(epi_base).is_some()
}
