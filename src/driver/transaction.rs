//! Transaction API
//!
//! 명시적 트랜잭션과 재시도 작업에 넘겨지는 관리형 트랜잭션

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::bolt::engine::{OpenedTransaction, SharedEngine};
use super::error::{DriverError, DriverResult};
use super::result::ResultCursor;
use super::session::Query;
use super::types::Value;

// ============================================================================
// TransactionConfig - 트랜잭션 설정
// ============================================================================

/// 트랜잭션 설정
#[derive(Debug, Clone, Default)]
pub struct TransactionConfig {
    /// 서버 측 타임아웃
    pub timeout: Option<Duration>,
    /// 메타데이터
    pub metadata: HashMap<String, Value>,
}

impl TransactionConfig {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 빌더 시작
    pub fn builder() -> TransactionConfigBuilder {
        TransactionConfigBuilder::default()
    }

    /// 타임아웃 설정
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// 메타데이터 추가
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// 트랜잭션 설정 빌더
#[derive(Debug, Default)]
pub struct TransactionConfigBuilder {
    config: TransactionConfig,
}

impl TransactionConfigBuilder {
    /// 타임아웃 설정
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// 메타데이터 추가
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.metadata.insert(key.into(), value.into());
        self
    }

    /// 빌드
    pub fn build(self) -> TransactionConfig {
        self.config
    }
}

fn with_params(query: impl Into<Query>, params: Option<HashMap<String, Value>>) -> Query {
    let query = query.into();
    match params {
        Some(p) => query.with_params(p),
        None => query,
    }
}

// ============================================================================
// Transaction - 명시적 트랜잭션
// ============================================================================

/// 명시적 트랜잭션
///
/// 닫힐 때 COMMIT, ROLLBACK (실패한 트랜잭션이면 RESET) 중 정확히 하나가
/// 전송된다. 닫지 않고 버리면 세션의 다음 작업 전에 롤백된다.
pub struct Transaction {
    engine: SharedEngine,
    id: u64,
    abandoned: Arc<AtomicBool>,
    success: bool,
    closed: bool,
}

impl Transaction {
    pub(crate) fn new(engine: SharedEngine, opened: OpenedTransaction) -> Self {
        Self {
            engine,
            id: opened.id,
            abandoned: opened.abandoned,
            success: false,
            closed: false,
        }
    }

    /// 쿼리 실행
    pub async fn run(
        &self,
        query: impl Into<Query>,
        params: Option<HashMap<String, Value>>,
    ) -> DriverResult<ResultCursor> {
        self.ensure_open()?;
        run_in(&self.engine, self.id, with_params(query, params)).await
    }

    /// 커밋
    pub async fn commit(mut self) -> DriverResult<()> {
        self.ensure_open()?;
        self.success = true;
        self.finish().await
    }

    /// 롤백
    pub async fn rollback(mut self) -> DriverResult<()> {
        if self.closed {
            return Ok(());
        }
        self.success = false;
        self.finish().await
    }

    /// 성공 플래그에 따라 커밋 또는 롤백
    pub async fn close(mut self) -> DriverResult<()> {
        if self.closed {
            return Ok(());
        }
        self.finish().await
    }

    /// 성공 플래그 설정
    pub fn set_success(&mut self, success: bool) {
        self.success = success;
    }

    /// 성공 플래그
    pub fn success(&self) -> bool {
        self.success
    }

    /// 열린 상태 여부
    pub fn is_open(&self) -> bool {
        !self.closed
    }

    /// 재시도 작업용 관리형 핸들
    pub fn managed(&self) -> ManagedTransaction {
        ManagedTransaction {
            engine: self.engine.clone(),
            id: self.id,
        }
    }

    async fn finish(&mut self) -> DriverResult<()> {
        self.closed = true;
        let mut engine = self.engine.lock().await;
        if !engine.is_transaction_open(self.id) {
            return if self.success {
                Err(DriverError::transaction("Transaction is no longer open"))
            } else {
                Ok(())
            };
        }
        if self.success {
            engine.commit(self.id).await.map(|_| ())
        } else {
            engine.rollback(self.id).await
        }
    }

    fn ensure_open(&self) -> DriverResult<()> {
        if self.closed {
            Err(DriverError::transaction(
                "Cannot run query in this transaction, because it has been committed or rolled back",
            ))
        } else {
            Ok(())
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.closed {
            self.abandoned.store(true, Ordering::Release);
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("success", &self.success)
            .field("closed", &self.closed)
            .finish()
    }
}

// ============================================================================
// ManagedTransaction - 관리형 트랜잭션
// ============================================================================

/// 재시도 작업에 넘겨지는 트랜잭션 뷰
///
/// 쿼리 실행만 가능하며 커밋/롤백은 실행기가 맡는다.
#[derive(Clone)]
pub struct ManagedTransaction {
    engine: SharedEngine,
    id: u64,
}

impl ManagedTransaction {
    /// 쿼리 실행
    pub async fn run(
        &self,
        query: impl Into<Query>,
        params: Option<HashMap<String, Value>>,
    ) -> DriverResult<ResultCursor> {
        run_in(&self.engine, self.id, with_params(query, params)).await
    }
}

impl fmt::Debug for ManagedTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedTransaction").field("id", &self.id).finish()
    }
}

async fn run_in(engine: &SharedEngine, tx_id: u64, query: Query) -> DriverResult<ResultCursor> {
    let opened = engine.lock().await.run_in_transaction(tx_id, query).await?;
    Ok(ResultCursor::new(engine.clone(), opened))
}

// ============================================================================
// Tests
// ============================================================================
