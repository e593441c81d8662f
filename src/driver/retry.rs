//! Retry Executor - 트랜잭션 재시도
//!
//! 작업 함수를 새 트랜잭션에서 실행하고, 일시적 에러면 백오프 후 다시 시도합니다.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::bolt::AccessMode;

use super::error::DriverResult;
use super::session::Session;
use super::transaction::{ManagedTransaction, TransactionConfig};

// ============================================================================
// RetryConfig - 재시도 정책
// ============================================================================

/// 재시도 정책
///
/// | 필드 | 기본값 |
/// |------|--------|
/// | `max_retry_time` | 30초 |
/// | `initial_delay` | 1초 |
/// | `multiplier` | 2.0 |
/// | `jitter` | 0.2 |
/// | `max_delay` | 30초 |
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// 첫 시도부터 잰 최대 재시도 시간
    pub max_retry_time: Duration,
    /// 첫 대기 시간
    pub initial_delay: Duration,
    /// 대기 시간 배수
    pub multiplier: f64,
    /// 대기 시간 흔들림 비율 (0.2 = ±20%)
    pub jitter: f64,
    /// 대기 시간 상한
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retry_time: Duration::from_secs(30),
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: 0.2,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// 새 정책 생성 (기본값)
    pub fn new() -> Self {
        Self::default()
    }

    /// 최대 재시도 시간 설정
    pub fn with_max_retry_time(mut self, time: Duration) -> Self {
        self.max_retry_time = time;
        self
    }

    /// 첫 대기 시간 설정
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// 배수 설정
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// 흔들림 비율 설정
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// 대기 시간 상한 설정
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// 다음 기준 대기 시간
    fn next_delay(&self, current: Duration) -> Duration {
        current.mul_f64(self.multiplier.max(1.0)).min(self.max_delay)
    }

    /// 기준 대기 시간에 흔들림 적용
    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return delay;
        }
        let factor = rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter);
        delay.mul_f64(factor)
    }
}

// ============================================================================
// execute - 재시도 실행
// ============================================================================

/// 작업 함수를 재시도하며 실행
///
/// 매 시도마다 새 트랜잭션을 열고 `work`가 성공하면 커밋한다. 일시적 에러는
/// `max_retry_time` 안에서 재시도하고, 그 밖의 에러는 롤백 후 바로 반환한다.
pub async fn execute<F, Fut, T>(
    session: &Session,
    mode: AccessMode,
    config: TransactionConfig,
    mut work: F,
) -> DriverResult<T>
where
    F: FnMut(ManagedTransaction) -> Fut,
    Fut: Future<Output = DriverResult<T>>,
{
    let retry = session.retry_config().clone();
    let started = Instant::now();
    let mut delay = retry.initial_delay;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let error = match run_once(session, mode, &config, &mut work).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let elapsed = started.elapsed();
        if !error.is_retryable() || elapsed >= retry.max_retry_time {
            debug!(attempt, error = %error, "transaction work failed, not retrying");
            return Err(error);
        }

        let wait = retry
            .jittered(delay)
            .min(retry.max_retry_time.saturating_sub(elapsed));
        warn!(
            attempt,
            error = %error,
            delay_ms = wait.as_millis() as u64,
            "transaction failed with a transient error, retrying"
        );
        tokio::time::sleep(wait).await;
        delay = retry.next_delay(delay);
    }
}

async fn run_once<F, Fut, T>(
    session: &Session,
    mode: AccessMode,
    config: &TransactionConfig,
    work: &mut F,
) -> DriverResult<T>
where
    F: FnMut(ManagedTransaction) -> Fut,
    Fut: Future<Output = DriverResult<T>>,
{
    let tx = session.begin_with_mode(config.clone(), mode).await?;
    match work(tx.managed()).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_error) = tx.rollback().await {
                debug!(error = %rollback_error, "rollback after failed work also failed");
            }
            Err(e)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::BoltVersion;
    use crate::driver::bolt::stub::{Script, ScriptedProvider};
    use crate::driver::driver::{AuthToken, Driver, DriverConfig};
    use crate::driver::error::ErrorKind;
    use crate::driver::session::SessionConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_retry_config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retry_time, Duration::from_secs(30));
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.multiplier, 2.0);
        assert_eq!(config.jitter, 0.2);
        assert_eq!(config.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_next_delay_is_capped() {
        let config = RetryConfig::new().with_max_delay(Duration::from_secs(5));
        let mut delay = config.initial_delay;
        let mut seen = Vec::new();
        for _ in 0..5 {
            delay = config.next_delay(delay);
            seen.push(delay.as_secs());
        }
        assert_eq!(seen, vec![2, 4, 5, 5, 5]);
    }

    #[test]
    fn test_jitter_bounds() {
        let config = RetryConfig::new();
        let base = Duration::from_millis(1000);
        for _ in 0..100 {
            let d = config.jittered(base);
            assert!(d >= Duration::from_millis(799) && d <= Duration::from_millis(1201), "{:?}", d);
        }
        let flat = RetryConfig::new().with_jitter(0.0);
        assert_eq!(flat.jittered(base), base);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_time_runs_out() {
        let mut script = Vec::new();
        for _ in 0..3 {
            script.extend([
                Script::client("BEGIN"),
                Script::success(),
                Script::client("RUN"),
                Script::client("PULL"),
                Script::failure("Neo.TransientError.Transaction.DeadlockDetected", "deadlock"),
                Script::ignored(),
                Script::client("RESET"),
                Script::success(),
            ]);
        }
        let (provider, _server) = ScriptedProvider::single(BoltVersion::V4_4, script).await;
        let retry = RetryConfig::new()
            .with_max_retry_time(Duration::from_millis(25))
            .with_initial_delay(Duration::from_millis(10))
            .with_jitter(0.0);
        let config = DriverConfig::builder("bolt://localhost:7687", AuthToken::None)
            .unwrap()
            .with_retry(retry)
            .build();
        let driver = Driver::with_provider(config, provider.clone());
        let session = driver.session(SessionConfig::default()).await.unwrap();

        let attempts = Arc::new(AtomicUsize::new(0));
        let err = session
            .write_transaction(|tx| {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    tx.run("MATCH (n) SET n.touched = true", None).await?.consume().await
                }
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transient);
        assert_eq!(err.code(), Some("Neo.TransientError.Transaction.DeadlockDetected"));
        let attempts = attempts.load(Ordering::SeqCst);
        assert!((2..=3).contains(&attempts), "attempts: {}", attempts);

        session.close().await.unwrap();
        assert_eq!(*provider.released.lock(), 1);
    }
}
