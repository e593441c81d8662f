//! Connection Provider
//!
//! 연결 획득/반환 계약과 단일 서버용 기본 구현

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::bolt::connection::BoltConnection;
use super::bolt::{to_bolt_auth, BoltAuthToken};
use super::driver::{AddressResolver, DriverConfig, ServerAddress};
use super::error::{DriverError, DriverResult};

// ============================================================================
// ConnectionProvider - 연결 제공자
// ============================================================================

/// 세션에 연결을 빌려주는 제공자
///
/// `acquire`가 돌려주는 연결은 핸드셰이크와 HELLO가 끝난 상태다.
/// 세션은 끝나면 `release`로 돌려주고, 연결이 망가졌으면 `discard`한다.
#[async_trait]
pub trait ConnectionProvider: Send + Sync + fmt::Debug {
    /// 연결 획득
    async fn acquire(&self) -> DriverResult<BoltConnection>;

    /// 정상 연결 반환
    async fn release(&self, conn: BoltConnection);

    /// 사용할 수 없는 연결 폐기
    async fn discard(&self, conn: BoltConnection);

    /// 보관 중인 연결을 모두 닫음
    async fn close(&self);
}

// ============================================================================
// DirectProvider - 단일 서버 연결 제공자
// ============================================================================

/// 주소 해석기의 후보로 TCP 연결을 맺고, 반환된 연결을 유휴 목록에 보관
pub struct DirectProvider {
    /// 설정된 서버 주소
    address: ServerAddress,
    /// 주소 해석기
    resolver: Arc<dyn AddressResolver>,
    /// HELLO 인증 토큰
    auth: BoltAuthToken,
    /// User Agent
    user_agent: String,
    /// 연결 타임아웃
    connection_timeout: Duration,
    /// 응답 대기 타임아웃
    read_timeout: Option<Duration>,
    /// 유휴 연결들
    idle: Mutex<Vec<BoltConnection>>,
    /// 닫힘 여부
    closed: AtomicBool,
}

impl DirectProvider {
    /// 드라이버 설정으로 생성
    pub fn new(config: &DriverConfig) -> Self {
        Self {
            address: config.address.clone(),
            resolver: config.resolver.clone(),
            auth: to_bolt_auth(&config.auth),
            user_agent: config.user_agent.clone(),
            connection_timeout: config.connection_timeout,
            read_timeout: config.read_timeout,
            idle: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// 유휴 연결 수
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// 새 연결 생성: 후보를 순서대로 시도하고 모두 실패하면 마지막 오류
    async fn open(&self) -> DriverResult<BoltConnection> {
        let mut last_error = None;

        for candidate in self.resolver.resolve(&self.address) {
            let target = candidate.to_socket_addr();
            match self.open_at(&target).await {
                Ok(conn) => return Ok(conn),
                Err(e) if matches!(e, DriverError::Authentication { .. }) => return Err(e),
                Err(e) => {
                    warn!(address = %target, error = %e, "connection attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            DriverError::connectivity(format!("No address to connect to for {}", self.address))
        }))
    }

    async fn open_at(&self, target: &str) -> DriverResult<BoltConnection> {
        let mut conn =
            BoltConnection::connect(target, self.connection_timeout, self.read_timeout).await?;
        if let Err(e) = conn.hello(&self.user_agent, &self.auth).await {
            conn.close().await;
            return Err(e);
        }
        Ok(conn)
    }
}

#[async_trait]
impl ConnectionProvider for DirectProvider {
    async fn acquire(&self) -> DriverResult<BoltConnection> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DriverError::session("Driver is closed"));
        }

        loop {
            let candidate = self.idle.lock().pop();
            match candidate {
                Some(conn) if !conn.is_defunct() && !conn.is_closed() => return Ok(conn),
                Some(mut conn) => conn.close().await,
                None => break,
            }
        }

        self.open().await
    }

    async fn release(&self, mut conn: BoltConnection) {
        if self.closed.load(Ordering::Acquire) || conn.is_defunct() || conn.is_closed() {
            conn.close().await;
            return;
        }
        debug!(address = %conn.address(), "connection released");
        self.idle.lock().push(conn);
    }

    async fn discard(&self, mut conn: BoltConnection) {
        warn!(address = %conn.address(), "discarding unusable connection");
        conn.close().await;
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let idle: Vec<BoltConnection> = std::mem::take(&mut *self.idle.lock());
        for mut conn in idle {
            conn.close().await;
        }
    }
}

impl fmt::Debug for DirectProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectProvider")
            .field("address", &self.address)
            .field("idle", &self.idle.lock().len())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
