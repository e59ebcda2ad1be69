//! 单个章节任务的执行状态机。
//!
//! 入口先做跳过判断，随后按 解析清单 -> 逐图下载 -> 打包 推进；
//! 每个阶段失败都有明确的现场处理：下载失败清理临时图片，
//! 打包失败保留现场，取消走快速清理。

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::Sender;
use tracing::{error, info, warn};

use super::fetcher::ImageFetcher;
use super::manager::JobContext;
use super::models::{
    FailureKind, ProgressEvent, RATE_DONE, RATE_FAILED, TaskId, TaskOutcome,
};
use super::progress::TaskRegistry;
use crate::archive::{ArtifactMeta, cleanup, write_archive};
use crate::comic_parser::models::EpisodeDescriptor;

/// 执行一个章节任务并上报终态。
pub fn run(
    ctx: &JobContext,
    registry: &TaskRegistry,
    task_id: TaskId,
    episode: &EpisodeDescriptor,
    events: &Sender<ProgressEvent>,
    cancel: &AtomicBool,
) -> TaskOutcome {
    let outcome = execute(ctx, registry, task_id, episode, events, cancel);
    match &outcome {
        TaskOutcome::Succeeded(path) => {
            registry.mark_done(task_id);
            info!("《{}》下载完成: {}", episode.title, path.display());
            let _ = events.send(ProgressEvent {
                task_id,
                rate: RATE_DONE,
                output: Some(path.clone()),
            });
        }
        TaskOutcome::SkippedExisting(path) => {
            registry.mark_done(task_id);
            info!("《{}》已存在，跳过", episode.title);
            let _ = events.send(ProgressEvent {
                task_id,
                rate: RATE_DONE,
                output: Some(path.clone()),
            });
        }
        TaskOutcome::Failed(kind) => {
            registry.mark_failed(task_id);
            let _ = events.send(ProgressEvent {
                task_id,
                rate: RATE_FAILED,
                output: None,
            });
            if *kind != FailureKind::Cancelled {
                error!("《{}》下载失败: {kind:?}", episode.title);
            }
        }
    }
    outcome
}

fn execute(
    ctx: &JobContext,
    registry: &TaskRegistry,
    task_id: TaskId,
    episode: &EpisodeDescriptor,
    events: &Sender<ProgressEvent>,
    cancel: &AtomicBool,
) -> TaskOutcome {
    if let Some(existing) = episode.existing_artifact() {
        return TaskOutcome::SkippedExisting(existing);
    }
    if cancel.load(Ordering::SeqCst) {
        return TaskOutcome::Failed(FailureKind::Cancelled);
    }

    let fetcher = ImageFetcher::new(&*ctx.api, &ctx.config);
    let manifest = match fetcher.resolve_manifest(episode.id) {
        Ok(manifest) if !manifest.is_empty() => manifest,
        Ok(_) => {
            warn!("《{}》图片清单为空", episode.title);
            return TaskOutcome::Failed(FailureKind::Resolution);
        }
        Err(err) => {
            warn!("《{}》清单解析失败: {err}", episode.title);
            return TaskOutcome::Failed(FailureKind::Resolution);
        }
    };

    // 临时图片放在漫画目录下，命名含 real_ord，不与其他章节冲突
    let scratch = ctx.comic.save_path.clone();
    if let Err(err) = fs::create_dir_all(&scratch) {
        error!("创建下载目录失败: {err}");
        return TaskOutcome::Failed(FailureKind::Download);
    }

    let total = manifest.len();
    let mut downloaded: Vec<PathBuf> = Vec::with_capacity(total);
    for entry in &manifest {
        if cancel.load(Ordering::SeqCst) {
            cleanup::clear_images_fast(&downloaded);
            return TaskOutcome::Failed(FailureKind::Cancelled);
        }
        match fetcher.download_one(&scratch, episode.real_ord, entry) {
            Ok(path) => {
                downloaded.push(path);
                let fraction = downloaded.len() as f64 / total as f64;
                registry.update(task_id, fraction);
                if downloaded.len() < total {
                    let _ = events.send(ProgressEvent {
                        task_id,
                        rate: (fraction * 100.0) as i32,
                        output: None,
                    });
                }
            }
            Err(err) => {
                warn!("《{}》第 {} 页下载失败: {err}", episode.title, entry.index);
                if cleanup::clear_images_with_retry(&downloaded).is_err() {
                    warn!("《{}》临时图片清理不完整", episode.title);
                }
                return TaskOutcome::Failed(FailureKind::Download);
            }
        }
    }

    let meta = ArtifactMeta {
        comic: &ctx.comic,
        episode,
        embed: ctx.config.exif,
    };
    match write_archive(ctx.format, &meta, &downloaded) {
        Ok(path) => TaskOutcome::Succeeded(path),
        Err(err) => {
            // 保留临时图片，便于人工打包或重试
            error!("《{}》打包失败，现场已保留: {err}", episode.title);
            TaskOutcome::Failed(FailureKind::Packaging)
        }
    }
}
