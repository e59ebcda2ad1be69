//! 无 UI 的命令行下载流程：解析目录、批量提交、消费进度事件。

use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use crate::archive::SaveFormat;
use crate::base_system::context::Config;
use crate::base_system::logging::LogSystem;
use crate::comic_parser::{Comic, ComicCatalog};
use crate::download::{
    DownloadManager, JobContext, RATE_DONE, RATE_FAILED, TaskId, format_eta, format_speed,
};
use crate::network_parser::{MangaApi, MangaClient};

const EVENT_POLL: Duration = Duration::from_millis(200);

pub struct RunArgs {
    pub comic_id: u64,
    pub start: Option<usize>,
    pub end: Option<usize>,
    pub yes: bool,
}

pub fn run(config: &mut Config, args: &RunArgs, log: &LogSystem) -> Result<()> {
    if config.save_path.trim().is_empty() {
        config.save_path = "./漫画".to_string();
    }
    let format = SaveFormat::from_config(&config.save_method)
        .ok_or_else(|| anyhow!("未知的保存格式: {}", config.save_method))?;

    let client = MangaClient::new(config, args.comic_id).context("初始化 HTTP 客户端失败")?;
    let api: Arc<dyn MangaApi> = Arc::new(client);

    println!("正在解析漫画 mc{} ...", args.comic_id);
    let comic = ComicCatalog::resolve(&*api, config, args.comic_id)?;
    print_summary(&comic);

    let start = args.start.unwrap_or(1);
    let end = args.end.unwrap_or(usize::MAX);
    let mut locked = 0usize;
    let targets: Vec<_> = comic
        .episodes
        .iter()
        .filter(|ep| ep.real_ord >= start && ep.real_ord <= end)
        .filter(|ep| {
            if ep.available {
                true
            } else {
                locked += 1;
                false
            }
        })
        .cloned()
        .collect();
    if locked > 0 {
        println!("跳过 {locked} 个未解锁章节");
    }
    if targets.is_empty() {
        println!("选定范围内没有可下载的章节");
        return Ok(());
    }

    println!(
        "将下载 {} 话，格式 {}，保存到 {}",
        targets.len(),
        format.as_config(),
        comic.descriptor.save_path.display()
    );
    if !args.yes && !confirm("确认开始下载？(y/N)：")? {
        println!("已取消");
        return Ok(());
    }

    let manager = DownloadManager::new(JobContext {
        config: config.clone(),
        api,
        comic: comic.descriptor.clone(),
        format,
    });

    // Ctrl-C 时先举取消旗，让在途章节走清理路径
    let cancel = manager.cancel_flag();
    log.add_exit_hook(move || {
        cancel.store(true, Ordering::SeqCst);
    });

    let mut pending: HashMap<TaskId, String> = HashMap::new();
    for episode in &targets {
        match manager.submit(episode) {
            Ok(id) => {
                pending.insert(id, episode.title.clone());
            }
            Err(err) => warn!("提交《{}》失败: {err}", episode.title),
        }
    }

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("[{bar:40.cyan/blue}] {pos}% {msg}")
            .expect("内置进度条模板")
            .progress_chars("=>-"),
    );

    let events = manager.events();
    let registry = manager.registry();
    let mut succeeded = 0usize;
    let mut failed = 0usize;
    while !pending.is_empty() {
        match events.recv_timeout(EVENT_POLL) {
            Ok(event) => match event.rate {
                RATE_DONE => {
                    manager.acknowledge(event.task_id);
                    if let Some(title) = pending.remove(&event.task_id) {
                        succeeded += 1;
                        if let Some(path) = &event.output {
                            bar.println(format!("  {title} -> {}", path.display()));
                        }
                    }
                }
                RATE_FAILED => {
                    manager.acknowledge(event.task_id);
                    if let Some(title) = pending.remove(&event.task_id) {
                        failed += 1;
                        bar.println(format!("  {title} 下载失败"));
                    }
                }
                _ => {}
            },
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }

        let telemetry = registry.aggregate();
        bar.set_position((telemetry.fraction * 100.0).round() as u64);
        bar.set_message(format!(
            "{} 剩余 {}",
            format_speed(telemetry.speed),
            format_eta(telemetry.eta)
        ));
    }
    bar.finish_and_clear();
    manager.shutdown();

    println!("完成：成功 {succeeded} 话，失败 {failed} 话");
    if failed > 0 {
        println!("失败章节的详细原因见 logs/latest.log");
    }
    Ok(())
}

fn print_summary(comic: &Comic) {
    let d = &comic.descriptor;
    println!("《{}》 作者：{}", d.title, d.authors.join(", "));
    if !d.tags.is_empty() {
        println!("标签：{}", d.tags.join(" / "));
    }
    println!(
        "共 {} 话，{}",
        comic.episodes.len(),
        if d.finished { "已完结" } else { "连载中" }
    );
    if !d.synopsis.is_empty() {
        let brief: String = d.synopsis.chars().take(80).collect();
        println!("简介：{brief}");
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().eq_ignore_ascii_case("y"))
}
