//! 下载侧的公共类型与进度约定。

use std::path::PathBuf;

/// 任务完成时对外上报的进度值。
pub const RATE_DONE: i32 = 100;
/// 任务失败的进度哨兵值。
pub const RATE_FAILED: i32 = -1;

pub type TaskId = u64;

/// 跨线程上报的进度事件。`rate` 取 0..100、[`RATE_FAILED`] 之一，
/// 只有终态成功事件才带 `output`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub task_id: TaskId,
    pub rate: i32,
    pub output: Option<PathBuf>,
}

/// 失败环节分类，决定现场清理策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 图片清单解析失败（含空清单）。
    Resolution,
    /// 图片下载阶段失败，临时文件已清理。
    Download,
    /// 打包阶段失败，临时文件保留以便排查。
    Packaging,
    /// 协作式取消。
    Cancelled,
}

/// 单个章节任务的最终结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded(PathBuf),
    SkippedExisting(PathBuf),
    Failed(FailureKind),
}

/// 清单中的一张图片：`index` 从 1 开始，与临时文件命名一致。
#[derive(Debug, Clone)]
pub struct ImageManifestEntry {
    pub index: usize,
    pub url: String,
    pub token: Option<String>,
}
