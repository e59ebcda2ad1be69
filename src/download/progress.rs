//! 任务注册表与进度聚合。
//!
//! 每个任务维护一条指数滑动平均的瞬时速度；聚合时把活跃任务的
//! 速度求和后压入 3 秒滑动窗口，窗口均值用于估算剩余时间。
//! 终态任务保留在表里，直到调用方 acknowledge 确认领走。

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use super::models::TaskId;

const EMA_ALPHA: f64 = 0.005;
const SPEED_WINDOW: Duration = Duration::from_secs(3);

/// 失败任务的速率哨兵。
const RATE_FAILED_F: f64 = -1.0;

/// 一次聚合快照。
#[derive(Debug, Clone, Copy)]
pub struct JobTelemetry {
    /// 所有未失败任务的等权平均完成度，空表按 1.0 处理。
    pub fraction: f64,
    /// 3 秒窗口内的平均总速度（字节/秒）。
    pub speed: f64,
    /// 估算剩余时间，速度为零时未知。
    pub eta: Option<Duration>,
}

struct TaskEntry {
    size: u64,
    rate: f64,
    avg_speed: f64,
    last_instant: Option<Instant>,
    terminal: bool,
}

impl TaskEntry {
    fn failed(&self) -> bool {
        self.rate == RATE_FAILED_F
    }
}

struct Inner {
    next_id: TaskId,
    tasks: HashMap<TaskId, TaskEntry>,
    window: VecDeque<(Instant, f64)>,
}

pub struct TaskRegistry {
    inner: RwLock<Inner>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                next_id: 1,
                tasks: HashMap::new(),
                window: VecDeque::new(),
            }),
        }
    }

    /// 登记一个任务，`size` 为章节字节数（接口给出，可能为 0）。
    pub fn register(&self, size: u64) -> TaskId {
        let mut inner = self.inner.write().expect("registry 锁中毒");
        let id = inner.next_id;
        inner.next_id += 1;
        inner.tasks.insert(
            id,
            TaskEntry {
                size,
                rate: 0.0,
                avg_speed: 0.0,
                last_instant: None,
                terminal: false,
            },
        );
        id
    }

    pub fn update(&self, id: TaskId, fraction: f64) {
        self.update_at(id, fraction, Instant::now());
    }

    /// 记录一次进度采样。完成度只增不减；第一次采样没有时间基线，
    /// 速度按 0 计。
    pub fn update_at(&self, id: TaskId, fraction: f64, now: Instant) {
        let mut inner = self.inner.write().expect("registry 锁中毒");
        let Some(entry) = inner.tasks.get_mut(&id) else {
            return;
        };
        if entry.terminal {
            return;
        }
        let fraction = fraction.clamp(0.0, 1.0).max(entry.rate);

        if let Some(last) = entry.last_instant {
            let dt = now.saturating_duration_since(last).as_secs_f64();
            if dt > 0.0 {
                let delta_bytes = (fraction - entry.rate) * entry.size as f64;
                let instant_speed = delta_bytes / dt;
                entry.avg_speed = if entry.avg_speed == 0.0 {
                    instant_speed
                } else {
                    EMA_ALPHA * instant_speed + (1.0 - EMA_ALPHA) * entry.avg_speed
                };
            }
        }
        entry.rate = fraction;
        entry.last_instant = Some(now);
    }

    pub fn mark_done(&self, id: TaskId) {
        let mut inner = self.inner.write().expect("registry 锁中毒");
        if let Some(entry) = inner.tasks.get_mut(&id) {
            entry.rate = 1.0;
            entry.terminal = true;
        }
    }

    pub fn mark_failed(&self, id: TaskId) {
        let mut inner = self.inner.write().expect("registry 锁中毒");
        if let Some(entry) = inner.tasks.get_mut(&id) {
            entry.rate = RATE_FAILED_F;
            entry.avg_speed = 0.0;
            entry.terminal = true;
        }
    }

    /// 确认领走一个终态任务，将其从表中移除。非终态任务不受影响。
    pub fn acknowledge(&self, id: TaskId) {
        let mut inner = self.inner.write().expect("registry 锁中毒");
        let terminal = inner.tasks.get(&id).map(|e| e.terminal).unwrap_or(false);
        if terminal {
            inner.tasks.remove(&id);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("registry 锁中毒").tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn aggregate(&self) -> JobTelemetry {
        self.aggregate_at(Instant::now())
    }

    /// 聚合一次当前快照并推进速度窗口。
    pub fn aggregate_at(&self, now: Instant) -> JobTelemetry {
        let mut inner = self.inner.write().expect("registry 锁中毒");

        let mut fraction_sum = 0.0;
        let mut fraction_count = 0usize;
        let mut total_speed = 0.0;
        let mut remaining_bytes = 0.0;
        for entry in inner.tasks.values() {
            if entry.failed() {
                continue;
            }
            fraction_sum += entry.rate;
            fraction_count += 1;
            if !entry.terminal {
                total_speed += entry.avg_speed;
                remaining_bytes += (1.0 - entry.rate) * entry.size as f64;
            }
        }
        let fraction = if fraction_count == 0 {
            1.0
        } else {
            fraction_sum / fraction_count as f64
        };

        inner.window.push_back((now, total_speed));
        while let Some(&(when, _)) = inner.window.front() {
            if now.saturating_duration_since(when) > SPEED_WINDOW {
                inner.window.pop_front();
            } else {
                break;
            }
        }
        let speed =
            inner.window.iter().map(|&(_, s)| s).sum::<f64>() / inner.window.len() as f64;

        let eta = if speed > 0.0 && remaining_bytes > 0.0 {
            Some(Duration::from_secs_f64(remaining_bytes / speed))
        } else {
            None
        };

        JobTelemetry {
            fraction,
            speed,
            eta,
        }
    }
}

/// 人类可读的速度文本，非正值显示 0B/s。
pub fn format_speed(bytes_per_sec: f64) -> String {
    if bytes_per_sec <= 0.0 {
        return "0B/s".to_string();
    }
    const UNITS: [&str; 5] = ["B/s", "KB/s", "MB/s", "GB/s", "TB/s"];
    let mut value = bytes_per_sec;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1}{}", UNITS[unit])
}

/// 剩余时间文本：超过一天显示 `N天 HH:MM:SS`，未知显示 `未知`。
pub fn format_eta(eta: Option<Duration>) -> String {
    let Some(eta) = eta else {
        return "未知".to_string();
    };
    let total = eta.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    if days > 0 {
        format!("{days}天 {hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    }
}
