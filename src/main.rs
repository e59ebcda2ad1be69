//! BiliBili Manga Downloader（B站漫画下载器）Rust 实现。
//!
//! 本 crate 负责：配置加载、目录解析、并发下载调度与产物打包
//! （PDF/文件夹/Zip/7z/Cbz）。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志/重试/路径等基础设施
//! - `network_parser`：B站漫画 API 访问层
//! - `comic_parser`：目录解析与章节标题归一化
//! - `download`：任务注册、工作线程池与进度聚合
//! - `archive`：五种保存格式的产物写出
//! - `ui`：无 UI 的命令行驱动

use std::path::Path;

use anyhow::{Result, anyhow};
use clap::Parser;

mod archive;
mod base_system;
mod comic_parser;
mod download;
mod network_parser;
mod ui;

use base_system::config::load_or_create;
use base_system::context::Config;
use base_system::logging::{LogOptions, LogSystem};

#[derive(Debug, Parser)]
#[command(name = "bili-manga-downloader")]
#[command(about = "BiliBili Manga Downloader (CLI)")]
struct Cli {
    /// 漫画 ID（详情页地址 mc 后面的数字）
    comic_id: u64,

    /// 起始话（按解析后的序号，从 1 开始）
    #[arg(long)]
    start: Option<usize>,

    /// 结束话（含端点）
    #[arg(long)]
    end: Option<usize>,

    /// 跳过下载前的确认
    #[arg(short = 'y', long, default_value_t = false)]
    yes: bool,

    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 数据目录路径（用于存放 config.yml 和 logs 等文件，方便 Docker 挂载）
    #[arg(long)]
    data_dir: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let data_dir = cli.data_dir.as_deref().map(Path::new);
    let log = LogSystem::init(
        LogOptions {
            debug: cli.debug,
            ..Default::default()
        },
        data_dir,
    )
    .map_err(|e| anyhow!(e.to_string()))?;

    let mut config = load_or_create::<Config>(data_dir).map_err(|e| anyhow!(e.to_string()))?;

    let args = ui::noui::RunArgs {
        comic_id: cli.comic_id,
        start: cli.start,
        end: cli.end,
        yes: cli.yes,
    };
    ui::noui::run(&mut config, &args, &log)
}
