//! Session Management
//!
//! 세션 관리: 연결 하나를 감싸고 자동 커밋 쿼리, 명시적 트랜잭션, 재시도 작업을 제공

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use crate::bolt::AccessMode;

use super::bolt::connection::BoltConnection;
use super::bolt::engine::{EngineConfig, SessionEngine, SharedEngine};
use super::driver::{DriverConfig, ServerInfo};
use super::error::DriverResult;
use super::pool::ConnectionProvider;
use super::result::ResultCursor;
use super::retry::{self, RetryConfig};
use super::transaction::{ManagedTransaction, Transaction, TransactionConfig};
use super::types::Value;

// ============================================================================
// Bookmark - 북마크
// ============================================================================

/// 인과적 일관성 북마크
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bookmark {
    /// 북마크 값
    value: String,
}

impl Bookmark {
    /// 새 북마크 생성
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// 북마크 값
    pub fn value(&self) -> &str {
        &self.value
    }

    /// 빈 북마크 여부
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl fmt::Display for Bookmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl From<String> for Bookmark {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Bookmark {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ============================================================================
// SessionConfig - 세션 설정
// ============================================================================

/// 세션 설정
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// 데이터베이스 이름
    pub database: Option<String>,
    /// Fetch Size (없으면 드라이버 설정, -1 = 전부)
    pub fetch_size: Option<i64>,
    /// 기본 접근 모드
    pub default_access_mode: AccessMode,
    /// 시작 북마크
    pub bookmarks: Vec<Bookmark>,
}

impl SessionConfig {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 빌더 시작
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }

    /// 데이터베이스 설정
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Fetch Size 설정
    pub fn with_fetch_size(mut self, size: i64) -> Self {
        self.fetch_size = Some(size);
        self
    }

    /// 접근 모드 설정
    pub fn with_access_mode(mut self, mode: AccessMode) -> Self {
        self.default_access_mode = mode;
        self
    }

    /// 북마크 설정
    pub fn with_bookmarks(mut self, bookmarks: Vec<Bookmark>) -> Self {
        self.bookmarks = bookmarks;
        self
    }
}

// ============================================================================
// SessionConfigBuilder - 세션 설정 빌더
// ============================================================================

/// 세션 설정 빌더
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// 새 빌더 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 데이터베이스 설정
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.config.database = Some(database.into());
        self
    }

    /// Fetch Size 설정
    pub fn with_fetch_size(mut self, size: i64) -> Self {
        self.config.fetch_size = Some(size);
        self
    }

    /// 한 번에 모든 레코드 요청
    pub fn with_fetch_all(mut self) -> Self {
        self.config.fetch_size = Some(-1);
        self
    }

    /// 읽기 모드로 설정
    pub fn with_read_access(mut self) -> Self {
        self.config.default_access_mode = AccessMode::Read;
        self
    }

    /// 쓰기 모드로 설정
    pub fn with_write_access(mut self) -> Self {
        self.config.default_access_mode = AccessMode::Write;
        self
    }

    /// 북마크 설정
    pub fn with_bookmarks(mut self, bookmarks: Vec<Bookmark>) -> Self {
        self.config.bookmarks = bookmarks;
        self
    }

    /// 북마크 추가
    pub fn with_bookmark(mut self, bookmark: impl Into<Bookmark>) -> Self {
        self.config.bookmarks.push(bookmark.into());
        self
    }

    /// 빌드
    pub fn build(self) -> SessionConfig {
        self.config
    }
}

// ============================================================================
// Query - 쿼리
// ============================================================================

/// 쿼리
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// 쿼리 텍스트
    pub text: String,
    /// 파라미터
    pub parameters: HashMap<String, Value>,
}

impl Query {
    /// 새 쿼리 생성
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: HashMap::new(),
        }
    }

    /// 파라미터 추가
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// 파라미터들 추가
    pub fn with_params(mut self, params: HashMap<String, Value>) -> Self {
        self.parameters.extend(params);
        self
    }
}

impl From<&str> for Query {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Query {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

// ============================================================================
// Session - 세션
// ============================================================================

/// 데이터베이스 세션
///
/// 연결 하나를 독점한다. `close()`로 연결을 제공자에게 돌려준다.
pub struct Session {
    /// 프로토콜 엔진
    engine: SharedEngine,
    /// 연결 제공자
    provider: Arc<dyn ConnectionProvider>,
    /// 세션 설정
    config: SessionConfig,
    /// 재시도 정책
    retry: RetryConfig,
}

impl Session {
    pub(crate) fn new(
        conn: BoltConnection,
        provider: Arc<dyn ConnectionProvider>,
        config: SessionConfig,
        driver_config: &DriverConfig,
    ) -> Self {
        let engine_config = EngineConfig {
            database: config.database.clone(),
            access_mode: config.default_access_mode,
            fetch_size: config.fetch_size.unwrap_or(driver_config.fetch_size),
            bookmarks: config
                .bookmarks
                .iter()
                .filter(|b| !b.is_empty())
                .map(|b| b.value().to_string())
                .collect(),
        };
        let engine = SessionEngine::new(conn, engine_config, driver_config.classifier.clone());

        Self {
            engine: engine.shared(),
            provider,
            config,
            retry: driver_config.retry.clone(),
        }
    }

    /// 쿼리 실행 (auto-commit)
    pub async fn run(
        &self,
        query: impl Into<Query>,
        params: Option<HashMap<String, Value>>,
    ) -> DriverResult<ResultCursor> {
        self.run_with_config(query, params, TransactionConfig::default())
            .await
    }

    /// 트랜잭션 설정과 함께 쿼리 실행 (auto-commit)
    pub async fn run_with_config(
        &self,
        query: impl Into<Query>,
        params: Option<HashMap<String, Value>>,
        config: TransactionConfig,
    ) -> DriverResult<ResultCursor> {
        let mut query = query.into();
        if let Some(p) = params {
            query = query.with_params(p);
        }

        let opened = self
            .engine
            .lock()
            .await
            .run_autocommit(query, &config, None)
            .await?;
        Ok(ResultCursor::new(self.engine.clone(), opened))
    }

    /// 트랜잭션 시작
    pub async fn begin_transaction(
        &self,
        config: Option<TransactionConfig>,
    ) -> DriverResult<Transaction> {
        self.begin_with_mode(config.unwrap_or_default(), self.config.default_access_mode)
            .await
    }

    pub(crate) async fn begin_with_mode(
        &self,
        config: TransactionConfig,
        mode: AccessMode,
    ) -> DriverResult<Transaction> {
        let opened = self.engine.lock().await.begin(&config, Some(mode)).await?;
        Ok(Transaction::new(self.engine.clone(), opened))
    }

    /// 읽기 트랜잭션 함수 (재시도 포함)
    pub async fn read_transaction<F, Fut, T>(&self, work: F) -> DriverResult<T>
    where
        F: FnMut(ManagedTransaction) -> Fut,
        Fut: Future<Output = DriverResult<T>>,
    {
        self.execute_transaction(AccessMode::Read, TransactionConfig::default(), work)
            .await
    }

    /// 쓰기 트랜잭션 함수 (재시도 포함)
    pub async fn write_transaction<F, Fut, T>(&self, work: F) -> DriverResult<T>
    where
        F: FnMut(ManagedTransaction) -> Fut,
        Fut: Future<Output = DriverResult<T>>,
    {
        self.execute_transaction(AccessMode::Write, TransactionConfig::default(), work)
            .await
    }

    /// 트랜잭션 함수 실행 (재시도 포함)
    pub async fn execute_transaction<F, Fut, T>(
        &self,
        mode: AccessMode,
        config: TransactionConfig,
        work: F,
    ) -> DriverResult<T>
    where
        F: FnMut(ManagedTransaction) -> Fut,
        Fut: Future<Output = DriverResult<T>>,
    {
        retry::execute(self, mode, config, work).await
    }

    /// 진행 중인 모든 작업을 중단하고 IDLE로
    pub async fn reset(&self) -> DriverResult<()> {
        self.engine.lock().await.reset().await
    }

    /// 마지막 북마크
    pub async fn last_bookmark(&self) -> Option<Bookmark> {
        self.engine.lock().await.last_bookmark().map(Bookmark::new)
    }

    /// 연결된 서버 정보
    pub async fn server_info(&self) -> ServerInfo {
        self.engine.lock().await.server_info().clone()
    }

    /// 세션 닫기 (여러 번 호출해도 안전)
    pub async fn close(&self) -> DriverResult<()> {
        let conn = self.engine.lock().await.close().await;
        if let Some(conn) = conn {
            if conn.is_defunct() {
                self.provider.discard(conn).await;
            } else {
                debug!(address = %conn.address(), "session closed, releasing connection");
                self.provider.release(conn).await;
            }
        }
        Ok(())
    }

    /// 세션 설정
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub(crate) fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("database", &self.config.database)
            .field("access_mode", &self.config.default_access_mode)
            .finish()
    }
}
