//! 并发下载核心：任务注册、工作线程池与进度聚合。

pub mod fetcher;
pub mod manager;
pub mod models;
pub mod progress;
pub mod task;

#[cfg(test)]
pub(crate) mod test_support;

pub use manager::{DownloadManager, JobContext, SubmitError};
pub use models::{FailureKind, ProgressEvent, RATE_DONE, RATE_FAILED, TaskId, TaskOutcome};
pub use progress::{JobTelemetry, TaskRegistry, format_eta, format_speed};
