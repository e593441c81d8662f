//! Result Cursor - 결과 커서
//!
//! RUN 하나에 묶인 지연 레코드 스트림과 결과 요약.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream};

use crate::bolt::{Notification, PackStreamValue, QueryStats};

use super::bolt::engine::{CursorId, OpenedCursor, SharedEngine};
use super::driver::ServerInfo;
use super::error::{DriverError, DriverResult};
use super::record::Record;
use super::session::Query;
use super::types::Value;

// ============================================================================
// CursorState - 커서 상태
// ============================================================================

/// 커서 수명 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// 아직 아무 레코드도 꺼내지 않음
    Streaming,
    /// 일부 레코드를 꺼냄
    PartiallyConsumed,
    /// 서버가 스트림 끝을 알림
    Exhausted,
    /// 버려짐 (DISCARD, RESET, 실패)
    Discarded,
}

impl CursorState {
    /// 서버 쪽 스트림이 끝났는지
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Exhausted | Self::Discarded)
    }
}

// ============================================================================
// QueryType - 쿼리 타입
// ============================================================================

/// 쿼리 타입 (SUCCESS `type`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    /// 읽기 전용 (`r`)
    ReadOnly,
    /// 쓰기 전용 (`w`)
    WriteOnly,
    /// 읽기/쓰기 (`rw`)
    ReadWrite,
    /// 스키마 변경 (`s`)
    SchemaWrite,
}

impl QueryType {
    /// 서버 코드에서 변환
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "r" => Some(Self::ReadOnly),
            "w" => Some(Self::WriteOnly),
            "rw" => Some(Self::ReadWrite),
            "s" => Some(Self::SchemaWrite),
            _ => None,
        }
    }
}

// ============================================================================
// ResultSummary - 결과 요약
// ============================================================================

/// 클라이언트 측 지연 시간
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Latency {
    /// RUN 전송부터 마지막 응답까지
    pub overall: Option<Duration>,
    /// RUN 전송부터 첫 응답까지
    pub network: Option<Duration>,
    /// 전송 완료부터 첫 응답까지
    pub wait: Option<Duration>,
}

/// 결과 요약
#[derive(Debug, Clone)]
pub struct ResultSummary {
    /// 쿼리 텍스트
    pub query: String,
    /// 쿼리 파라미터
    pub parameters: HashMap<String, Value>,
    /// 쿼리 타입
    pub query_type: Option<QueryType>,
    /// 카운터
    pub counters: QueryStats,
    /// 알림
    pub notifications: Vec<Notification>,
    /// 첫 레코드까지 걸린 서버 시간 (`t_first`)
    pub result_available_after: Option<Duration>,
    /// 스트림 소비에 걸린 서버 시간 (`t_last`)
    pub result_consumed_after: Option<Duration>,
    /// 데이터베이스
    pub database: Option<String>,
    /// 자동 커밋 북마크
    pub bookmark: Option<String>,
    /// 서버 정보
    pub server: ServerInfo,
    /// 클라이언트 측 지연 시간
    pub latency: Latency,
}

impl ResultSummary {
    /// RUN/PULL SUCCESS 메타데이터에서 생성
    pub(crate) fn from_metadata(
        query: Query,
        run: &HashMap<String, PackStreamValue>,
        summary: &HashMap<String, PackStreamValue>,
        server: ServerInfo,
        latency: Latency,
    ) -> Self {
        let millis = |map: &HashMap<String, PackStreamValue>, key: &str| {
            map.get(key)
                .and_then(|v| v.as_int())
                .filter(|ms| *ms >= 0)
                .map(|ms| Duration::from_millis(ms as u64))
        };
        let text = |key: &str| summary.get(key).and_then(|v| v.as_str()).map(str::to_string);

        Self {
            query: query.text,
            parameters: query.parameters,
            query_type: summary
                .get("type")
                .and_then(|v| v.as_str())
                .and_then(QueryType::from_code),
            counters: summary
                .get("stats")
                .and_then(|v| v.as_map())
                .map(QueryStats::from_map)
                .unwrap_or_default(),
            notifications: summary
                .get("notifications")
                .and_then(|v| v.as_list())
                .map(Notification::from_list)
                .unwrap_or_default(),
            result_available_after: millis(run, "t_first"),
            result_consumed_after: millis(summary, "t_last"),
            database: text("db"),
            bookmark: text("bookmark"),
            server,
            latency,
        }
    }
}

// ============================================================================
// ResultCursor - 결과 커서
// ============================================================================

/// 지연 레코드 스트림
///
/// 버퍼가 비면 다음 `next()`가 서버에 PULL을 보낸다. 커서를 버리면
/// 남은 스트림은 세션의 다음 RUN 전에 DISCARD 된다.
pub struct ResultCursor {
    engine: SharedEngine,
    id: CursorId,
    keys: Arc<[String]>,
    _token: Arc<()>,
}

impl ResultCursor {
    pub(crate) fn new(engine: SharedEngine, opened: OpenedCursor) -> Self {
        Self {
            engine,
            id: opened.id,
            keys: opened.keys,
            _token: opened.token,
        }
    }

    /// 컬럼 키
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// 현재 상태
    pub async fn state(&self) -> CursorState {
        self.engine.lock().await.cursor_state(self.id)
    }

    /// 다음 레코드
    pub async fn next(&mut self) -> DriverResult<Option<Record>> {
        self.engine.lock().await.next_record(self.id).await
    }

    /// 다음 레코드 미리 보기
    pub async fn peek(&mut self) -> DriverResult<Option<Record>> {
        self.engine.lock().await.peek_record(self.id).await
    }

    /// 남은 레코드를 버리고 요약 반환
    pub async fn consume(self) -> DriverResult<ResultSummary> {
        self.engine.lock().await.consume(self.id).await
    }

    /// 정확히 한 개의 레코드
    pub async fn single(mut self) -> DriverResult<Record> {
        let Some(first) = self.next().await? else {
            return Err(DriverError::session(
                "Expected a result with a single record, but this result contains no records",
            ));
        };
        if self.next().await?.is_some() {
            self.consume().await?;
            return Err(DriverError::session(
                "Expected a result with a single record, but this result contains more than one",
            ));
        }
        Ok(first)
    }

    /// 남은 모든 레코드
    pub async fn collect(mut self) -> DriverResult<Vec<Record>> {
        let mut records = Vec::new();
        while let Some(record) = self.next().await? {
            records.push(record);
        }
        Ok(records)
    }

    /// `futures::Stream`으로 변환
    pub fn into_stream(self) -> impl Stream<Item = DriverResult<Record>> {
        stream::unfold(Some(self), |cursor| async move {
            let mut cursor = cursor?;
            match cursor.next().await {
                Ok(Some(record)) => Some((Ok(record), Some(cursor))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

impl fmt::Debug for ResultCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCursor")
            .field("id", &self.id)
            .field("keys", &self.keys)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::BoltVersion;

    fn server() -> ServerInfo {
        ServerInfo {
            address: "stub:7687".into(),
            protocol_version: BoltVersion::V4_4,
            agent: Some("Neo4j/4.4.0".into()),
            connection_id: Some("bolt-1".into()),
        }
    }

    #[test]
    fn test_query_type_codes() {
        assert_eq!(QueryType::from_code("r"), Some(QueryType::ReadOnly));
        assert_eq!(QueryType::from_code("w"), Some(QueryType::WriteOnly));
        assert_eq!(QueryType::from_code("rw"), Some(QueryType::ReadWrite));
        assert_eq!(QueryType::from_code("s"), Some(QueryType::SchemaWrite));
        assert_eq!(QueryType::from_code("x"), None);
    }

    #[test]
    fn test_cursor_state_finished() {
        assert!(!CursorState::Streaming.is_finished());
        assert!(!CursorState::PartiallyConsumed.is_finished());
        assert!(CursorState::Exhausted.is_finished());
        assert!(CursorState::Discarded.is_finished());
    }

    #[test]
    fn test_summary_from_metadata() {
        let run: HashMap<String, PackStreamValue> =
            [("t_first".to_string(), PackStreamValue::Integer(12))].into();
        let stats: HashMap<String, PackStreamValue> = [
            ("nodes-created".to_string(), PackStreamValue::Integer(2)),
            ("properties-set".to_string(), PackStreamValue::Integer(4)),
        ]
        .into();
        let summary: HashMap<String, PackStreamValue> = [
            ("t_last".to_string(), PackStreamValue::Integer(3)),
            ("type".to_string(), PackStreamValue::String("w".into())),
            ("db".to_string(), PackStreamValue::String("neo4j".into())),
            ("bookmark".to_string(), PackStreamValue::String("bm:1".into())),
            ("stats".to_string(), PackStreamValue::Map(stats)),
        ]
        .into();

        let query = Query::new("CREATE (a), (b)").with_param("x", 1i64);
        let summary =
            ResultSummary::from_metadata(query, &run, &summary, server(), Latency::default());

        assert_eq!(summary.query, "CREATE (a), (b)");
        assert_eq!(summary.parameters.len(), 1);
        assert_eq!(summary.query_type, Some(QueryType::WriteOnly));
        assert_eq!(summary.counters.nodes_created, 2);
        assert!(summary.counters.contains_updates());
        assert_eq!(summary.result_available_after, Some(Duration::from_millis(12)));
        assert_eq!(summary.result_consumed_after, Some(Duration::from_millis(3)));
        assert_eq!(summary.database.as_deref(), Some("neo4j"));
        assert_eq!(summary.bookmark.as_deref(), Some("bm:1"));
        assert!(summary.notifications.is_empty());
    }

    #[test]
    fn test_summary_without_metadata() {
        let empty = HashMap::new();
        let summary = ResultSummary::from_metadata(
            Query::new("RETURN 1"),
            &empty,
            &empty,
            server(),
            Latency::default(),
        );
        assert_eq!(summary.query_type, None);
        assert_eq!(summary.counters, QueryStats::default());
        assert_eq!(summary.result_available_after, None);
        assert_eq!(summary.server.protocol_version, BoltVersion::V4_4);
    }
}
