//! 下载调度器：工作线程池 + 任务队列。
//!
//! 线程从任务通道带超时地取活，既能及时响应取消标志，
//! 也能在通道关闭后自然退出。优雅关闭 = 关通道 + 等线程收尾；
//! 强制终止 = 先举旗再关通道，在途章节在下一个检查点放弃。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use thiserror::Error;
use tracing::{debug, info};

use super::models::{ProgressEvent, TaskId};
use super::progress::TaskRegistry;
use super::task;
use crate::archive::SaveFormat;
use crate::base_system::context::Config;
use crate::comic_parser::models::{ComicDescriptor, EpisodeDescriptor};
use crate::network_parser::MangaApi;

const IDLE_POLL: Duration = Duration::from_millis(200);
const MAX_WORKERS: usize = 32;

/// 一次下载会话共享的不可变上下文。
pub struct JobContext {
    pub config: Config,
    pub api: Arc<dyn MangaApi>,
    pub comic: ComicDescriptor,
    pub format: SaveFormat,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("章节《{0}》未解锁，无法下载")]
    Locked(String),
    #[error("调度器已关闭")]
    Terminated,
}

struct Job {
    task_id: TaskId,
    episode: EpisodeDescriptor,
}

pub struct DownloadManager {
    registry: Arc<TaskRegistry>,
    events_rx: Receiver<ProgressEvent>,
    job_tx: Option<Sender<Job>>,
    cancel: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl DownloadManager {
    pub fn new(ctx: JobContext) -> Self {
        let ctx = Arc::new(ctx);
        let registry = Arc::new(TaskRegistry::new());
        let cancel = Arc::new(AtomicBool::new(false));
        let (job_tx, job_rx) = unbounded::<Job>();
        let (events_tx, events_rx) = unbounded::<ProgressEvent>();

        let worker_count = ctx.config.max_workers.clamp(1, MAX_WORKERS);
        let mut workers = Vec::with_capacity(worker_count);
        for idx in 0..worker_count {
            let ctx = Arc::clone(&ctx);
            let registry = Arc::clone(&registry);
            let cancel = Arc::clone(&cancel);
            let job_rx = job_rx.clone();
            let events_tx = events_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("下载线程-{idx}"))
                .spawn(move || {
                    worker_loop(&ctx, &registry, &job_rx, &events_tx, &cancel);
                })
                .expect("工作线程创建失败");
            workers.push(handle);
        }
        info!("调度器就绪，{worker_count} 个下载线程");

        Self {
            registry,
            events_rx,
            job_tx: Some(job_tx),
            cancel,
            workers,
        }
    }

    /// 提交一个章节任务，返回用于对账进度事件的任务 ID。
    /// 未解锁章节直接拒绝，不占任务号。
    pub fn submit(&self, episode: &EpisodeDescriptor) -> Result<TaskId, SubmitError> {
        if !episode.available {
            return Err(SubmitError::Locked(episode.title.clone()));
        }
        let tx = self.job_tx.as_ref().ok_or(SubmitError::Terminated)?;
        let task_id = self.registry.register(episode.size);
        tx.send(Job {
            task_id,
            episode: episode.clone(),
        })
        .map_err(|_| SubmitError::Terminated)?;
        Ok(task_id)
    }

    pub fn registry(&self) -> Arc<TaskRegistry> {
        Arc::clone(&self.registry)
    }

    /// 进度事件接收端。所有线程退出后通道随之断开。
    pub fn events(&self) -> Receiver<ProgressEvent> {
        self.events_rx.clone()
    }

    pub fn acknowledge(&self, id: TaskId) {
        self.registry.acknowledge(id);
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// 优雅关闭：不再接收新任务，排完队列后返回。
    pub fn shutdown(mut self) {
        self.job_tx.take();
        self.join_workers();
    }

    /// 强制终止：举取消旗，在途任务在检查点放弃后返回。
    pub fn terminate(mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.job_tx.take();
        self.join_workers();
    }

    fn join_workers(&mut self) {
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        debug!("所有下载线程已退出");
    }
}

impl Drop for DownloadManager {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.cancel.store(true, Ordering::SeqCst);
            self.job_tx.take();
            self.join_workers();
        }
    }
}

fn worker_loop(
    ctx: &JobContext,
    registry: &TaskRegistry,
    job_rx: &Receiver<Job>,
    events_tx: &Sender<ProgressEvent>,
    cancel: &AtomicBool,
) {
    loop {
        if cancel.load(Ordering::SeqCst) {
            break;
        }
        match job_rx.recv_timeout(IDLE_POLL) {
            Ok(job) => {
                task::run(ctx, registry, job.task_id, &job.episode, events_tx, cancel);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::models::{RATE_DONE, RATE_FAILED};
    use crate::download::test_support::{FakeApi, fixture_episode, job_context};
    use std::collections::HashMap;
    use std::sync::atomic::Ordering as AtomicOrdering;

    /// 收事件直到 `expected` 个任务到达终态。
    fn drain_until_terminal(
        manager: &DownloadManager,
        expected: usize,
    ) -> HashMap<TaskId, ProgressEvent> {
        let events = manager.events();
        let mut terminal = HashMap::new();
        while terminal.len() < expected {
            let event = events
                .recv_timeout(Duration::from_secs(10))
                .expect("等待终态事件超时");
            if event.rate == RATE_DONE || event.rate == RATE_FAILED {
                terminal.insert(event.task_id, event);
            }
        }
        terminal
    }

    #[test]
    fn locked_episode_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeApi::with_pages(1));
        let ctx = job_context(tmp.path(), api, SaveFormat::Folder);
        let manager = DownloadManager::new(ctx);

        let mut episode = fixture_episode(tmp.path(), 1, "第1话");
        episode.available = false;
        let err = manager.submit(&episode).unwrap_err();
        assert!(matches!(err, SubmitError::Locked(_)));
        assert!(manager.registry().is_empty());
        manager.shutdown();
    }

    #[test]
    fn existing_artifact_skips_network() {
        let tmp = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeApi::with_pages(3));
        let ctx = job_context(tmp.path(), Arc::clone(&api), SaveFormat::Pdf);
        let manager = DownloadManager::new(ctx);

        let episode = fixture_episode(tmp.path(), 1, "第1话");
        std::fs::write(episode.epi_base.with_extension("pdf"), b"%PDF").unwrap();

        let id = manager.submit(&episode).unwrap();
        let terminal = drain_until_terminal(&manager, 1);
        let event = &terminal[&id];
        assert_eq!(event.rate, RATE_DONE);
        assert_eq!(
            event.output.as_deref(),
            Some(episode.epi_base.with_extension("pdf").as_path())
        );
        assert_eq!(api.index_calls.load(AtomicOrdering::SeqCst), 0);
        assert_eq!(api.fetch_calls.load(AtomicOrdering::SeqCst), 0);
        manager.shutdown();
    }

    #[test]
    fn downloads_episode_end_to_end() {
        let tmp = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeApi::with_pages(3));
        let ctx = job_context(tmp.path(), api, SaveFormat::Folder);
        let manager = DownloadManager::new(ctx);

        let episode = fixture_episode(tmp.path(), 1, "第1话");
        let id = manager.submit(&episode).unwrap();
        let terminal = drain_until_terminal(&manager, 1);
        assert_eq!(terminal[&id].rate, RATE_DONE);

        let dir = terminal[&id].output.clone().unwrap();
        assert_eq!(dir, episode.epi_base);
        let mut pages: Vec<String> = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        pages.sort();
        assert_eq!(pages, vec!["001.jpg", "002.jpg", "003.jpg"]);
        manager.shutdown();
    }

    #[test]
    fn download_failure_cleans_scratch() {
        let tmp = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeApi::with_pages(4).fail_image_at(3));
        let ctx = job_context(tmp.path(), api, SaveFormat::Folder);
        let manager = DownloadManager::new(ctx);

        let episode = fixture_episode(tmp.path(), 1, "第1话");
        let id = manager.submit(&episode).unwrap();
        let terminal = drain_until_terminal(&manager, 1);
        assert_eq!(terminal[&id].rate, RATE_FAILED);

        // 已下载的两页临时文件必须被清掉
        let leftovers: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .collect();
        assert!(leftovers.is_empty(), "残留: {leftovers:?}");
        manager.shutdown();
    }

    #[test]
    fn packaging_failure_preserves_scratch() {
        let tmp = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeApi::with_pages(2));
        let ctx = job_context(tmp.path(), api, SaveFormat::Folder);
        let manager = DownloadManager::new(ctx);

        let episode = fixture_episode(tmp.path(), 1, "第1话");
        // 占住章节目录名，create_dir_all 在同名文件上必然失败。
        // 注意不能占成产物扩展名，否则会走跳过分支。
        std::fs::write(&episode.epi_base, b"blocker").unwrap();

        let id = manager.submit(&episode).unwrap();
        let terminal = drain_until_terminal(&manager, 1);
        assert_eq!(terminal[&id].rate, RATE_FAILED);

        let temps: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("1_"))
            .collect();
        assert_eq!(temps.len(), 2, "打包失败必须保留现场");
        manager.shutdown();
    }

    #[test]
    fn queue_drains_with_single_worker() {
        let tmp = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeApi::with_pages(2));
        let mut ctx = job_context(tmp.path(), api, SaveFormat::Folder);
        ctx.config.max_workers = 1;
        let manager = DownloadManager::new(ctx);

        let ids: Vec<TaskId> = (1..=3)
            .map(|i| {
                let episode = fixture_episode(tmp.path(), i, &format!("第{i}话"));
                manager.submit(&episode).unwrap()
            })
            .collect();

        let terminal = drain_until_terminal(&manager, 3);
        for id in &ids {
            assert_eq!(terminal[id].rate, RATE_DONE);
        }

        // 终态任务在确认前保留在注册表里
        let registry = manager.registry();
        assert_eq!(registry.len(), 3);
        let telemetry = registry.aggregate();
        assert!((telemetry.fraction - 1.0).abs() < 1e-9);

        for id in &ids {
            manager.acknowledge(*id);
        }
        assert!(registry.is_empty());
        manager.shutdown();
    }

    #[test]
    fn terminate_stops_pending_work() {
        let tmp = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeApi::with_pages(3).with_fetch_delay(Duration::from_millis(50)));
        let mut ctx = job_context(tmp.path(), Arc::clone(&api), SaveFormat::Folder);
        ctx.config.max_workers = 2;
        let manager = DownloadManager::new(ctx);

        let ids: Vec<TaskId> = (1..=5)
            .map(|i| {
                let episode = fixture_episode(tmp.path(), i, &format!("第{i}话"));
                manager.submit(&episode).unwrap()
            })
            .collect();

        // 等第一批任务真正跑起来再举取消旗
        let events = manager.events();
        let _ = events.recv_timeout(Duration::from_secs(10)).unwrap();
        let registry = manager.registry();
        manager.cancel_flag().store(true, AtomicOrdering::SeqCst);
        let resolutions_at_cancel = api.index_calls.load(AtomicOrdering::SeqCst);
        manager.terminate();

        // 旗子落下后最多只有在途线程还能各发起一次解析
        let resolutions_after = api.index_calls.load(AtomicOrdering::SeqCst);
        assert!(
            resolutions_after <= resolutions_at_cancel + 2,
            "取消后仍在解析新章节: {resolutions_at_cancel} -> {resolutions_after}"
        );

        // 没被领走的任务留在注册表里，直到确认
        assert!(registry.len() <= ids.len());
        let leftovers: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .collect();
        assert!(leftovers.is_empty(), "取消后不应残留临时图片");
    }

    #[test]
    fn submit_after_shutdown_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeApi::with_pages(1));
        let ctx = job_context(tmp.path(), api, SaveFormat::Folder);
        let mut manager = DownloadManager::new(ctx);

        manager.job_tx.take();
        let episode = fixture_episode(tmp.path(), 1, "第1话");
        assert!(matches!(
            manager.submit(&episode),
            Err(SubmitError::Terminated)
        ));
    }

    #[test]
    fn failure_marks_registry_sentinel() {
        let tmp = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeApi::with_pages(2).fail_index());
        let ctx = job_context(tmp.path(), api, SaveFormat::Folder);
        let manager = DownloadManager::new(ctx);

        let episode = fixture_episode(tmp.path(), 1, "第1话");
        let id = manager.submit(&episode).unwrap();
        let terminal = drain_until_terminal(&manager, 1);
        assert_eq!(terminal[&id].rate, RATE_FAILED);
        assert!(terminal[&id].output.is_none());

        // 失败任务不计入整体完成度
        let telemetry = manager.registry().aggregate();
        assert!((telemetry.fraction - 1.0).abs() < 1e-9);
        manager.shutdown();
    }
}
