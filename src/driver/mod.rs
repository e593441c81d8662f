//! Driver Module
//!
//! 세션, 트랜잭션, 결과 커서, 재시도 실행기
//!
//! # Example
//!
//! ```no_run
//! use boltwire::driver::{AuthToken, Driver, SessionConfig};
//! use boltwire::params;
//!
//! # async fn example() -> boltwire::driver::DriverResult<()> {
//! let driver = Driver::new("bolt://localhost:7687", AuthToken::basic("neo4j", "password"))?;
//! let session = driver.session(SessionConfig::default()).await?;
//!
//! // 자동 커밋 쿼리
//! let mut cursor = session.run("MATCH (n) RETURN n LIMIT 10", None).await?;
//! while let Some(record) = cursor.next().await? {
//!     println!("{}", record);
//! }
//!
//! // 명시적 트랜잭션
//! let tx = session.begin_transaction(None).await?;
//! tx.run("CREATE (n:Person {name: $name})", Some(params! {"name" => "Alice"})).await?;
//! tx.commit().await?;
//!
//! session.close().await?;
//! driver.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod bolt;
mod driver;
mod error;
mod pool;
mod record;
mod result;
mod retry;
mod session;
mod transaction;
mod types;

// Re-exports
pub use crate::bolt::AccessMode;
pub use driver::{
    AddressResolver, AuthToken, Driver, DriverConfig, DriverConfigBuilder, IdentityResolver,
    ServerAddress, ServerInfo, DEFAULT_FETCH_SIZE, DEFAULT_PORT,
};
pub use error::{DriverError, DriverResult, ErrorClassifier, ErrorKind};
pub use pool::{ConnectionProvider, DirectProvider};
pub use record::Record;
pub use result::{CursorState, Latency, QueryType, ResultCursor, ResultSummary};
pub use retry::{execute, RetryConfig};
pub use session::{Bookmark, Query, Session, SessionConfig, SessionConfigBuilder};
pub use transaction::{
    ManagedTransaction, Transaction, TransactionConfig, TransactionConfigBuilder,
};
pub use types::{Duration, Node, OffsetTime, Path, Point, Relationship, Value};

/// 파라미터 맵 생성 매크로
#[macro_export]
macro_rules! params {
    () => {
        std::collections::HashMap::<String, $crate::driver::Value>::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = std::collections::HashMap::<String, $crate::driver::Value>::new();
        $(
            map.insert($key.into(), $crate::driver::Value::from($value));
        )+
        map
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_macro() {
        let empty = params!();
        assert!(empty.is_empty());

        let map = params! {"name" => "Alice", "age" => 30i64, "score" => 1.5};
        assert_eq!(map.len(), 3);
        assert_eq!(map.get("name"), Some(&Value::String("Alice".into())));
        assert_eq!(map.get("age"), Some(&Value::Integer(30)));
        assert_eq!(map.get("score"), Some(&Value::Float(1.5)));
    }
}
