//! 指数退避重试策略。
//!
//! 原则：所有网络调用都经过 [`with_retry`]，按总耗时预算控制；
//! 本地磁盘操作用 [`with_attempts`]，按次数控制。

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, warn};

/// 一次有预算的重试策略：退避时间为 `base_backoff * 2^attempt`，
/// 累计耗时超过 `max_elapsed` 后放弃。
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_elapsed: Duration,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// 元数据/列表类请求的小预算（对齐原版 MAX_RETRY_SMALL）。
    pub fn small() -> Self {
        Self {
            max_elapsed: Duration::from_millis(10_000),
            base_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(8),
        }
    }

    /// 图片正文下载的大预算（对齐原版 MAX_RETRY_LARGE）。
    pub fn large() -> Self {
        Self {
            max_elapsed: Duration::from_millis(20_000),
            base_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(8),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let delay = self
            .base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff);
        delay.min(self.max_backoff)
    }
}

/// 重试预算耗尽，携带最后一次的错误。
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub elapsed: Duration,
    pub last: E,
}

impl<E: fmt::Display> fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "重试 {} 次（{:.1}s）后放弃: {}",
            self.attempts,
            self.elapsed.as_secs_f32(),
            self.last
        )
    }
}

impl<E: fmt::Display + fmt::Debug> std::error::Error for RetryExhausted<E> {}

/// 在 `policy` 的耗时预算内反复执行 `op`，每次失败记一条 warn 日志，
/// 预算耗尽记 error 并返回 [`RetryExhausted`]。
pub fn with_retry<T, E, F>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T, RetryExhausted<E>>
where
    E: fmt::Display,
    F: FnMut() -> Result<T, E>,
{
    let start = Instant::now();
    let mut attempt: u32 = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) => {
                let delay = policy.backoff(attempt);
                if start.elapsed() + delay > policy.max_elapsed {
                    error!("{what} 多次重试后失败: {err}");
                    return Err(RetryExhausted {
                        attempts: attempt + 1,
                        elapsed: start.elapsed(),
                        last: err,
                    });
                }
                warn!(
                    "{what} 失败（第 {} 次尝试），{}ms 后重试: {err}",
                    attempt + 1,
                    delay.as_millis()
                );
                thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}

/// 按次数重试，适合本地磁盘操作（删除/写入偶发失败时再试几次）。
pub fn with_attempts<T, E, F>(
    max_attempts: u32,
    what: &str,
    mut op: F,
) -> Result<T, RetryExhausted<E>>
where
    E: fmt::Display,
    F: FnMut() -> Result<T, E>,
{
    let start = Instant::now();
    let mut attempt: u32 = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= max_attempts {
                    error!("{what} 重试 {attempt} 次后仍然失败: {err}");
                    return Err(RetryExhausted {
                        attempts: attempt,
                        elapsed: start.elapsed(),
                        last: err,
                    });
                }
                warn!("{what} 失败（第 {attempt} 次尝试），重试中: {err}");
                thread::sleep(Duration::from_millis(100));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_elapsed: Duration::from_millis(80),
            base_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(40),
        }
    }

    #[test]
    fn success_passes_through() {
        let result: Result<i32, RetryExhausted<String>> =
            with_retry(fast_policy(), "noop", || Ok::<_, String>(42));
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn retries_until_success() {
        let calls = Cell::new(0);
        let result = with_retry(fast_policy(), "flaky", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err("暂时失败")
            } else {
                Ok(calls.get())
            }
        });
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn exhaustion_returns_last_error() {
        let calls = Cell::new(0);
        let result: Result<(), _> = with_retry(fast_policy(), "dead", || {
            calls.set(calls.get() + 1);
            Err(format!("错误 #{}", calls.get()))
        });
        let err = result.unwrap_err();
        assert!(err.attempts >= 1);
        assert_eq!(err.last, format!("错误 #{}", calls.get()));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = fast_policy();
        assert_eq!(policy.backoff(0), Duration::from_millis(10));
        assert_eq!(policy.backoff(1), Duration::from_millis(20));
        assert_eq!(policy.backoff(2), Duration::from_millis(40));
        assert_eq!(policy.backoff(10), Duration::from_millis(40));
        assert_eq!(policy.backoff(64), Duration::from_millis(40));
    }

    #[test]
    fn with_attempts_is_count_bounded() {
        let calls = Cell::new(0u32);
        let result: Result<(), _> = with_attempts(3, "disk", || {
            calls.set(calls.get() + 1);
            Err("io")
        });
        assert_eq!(result.unwrap_err().attempts, 3);
        assert_eq!(calls.get(), 3);
    }
}
