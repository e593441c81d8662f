//! # boltwire
//!
//! An async client driver for graph databases that speak the Bolt protocol.
//!
//! ## Features
//!
//! - **Bolt 3.0 to 5.0** - Version negotiation with per-version message vocabulary
//! - **Async/Await** - Built on Tokio
//! - **Lazy result cursors** - Records are pulled in batches of the fetch size
//! - **Multiplexed streams** - Several open results per transaction on 4.0+
//! - **Transaction functions** - Automatic retry of transient failures with backoff
//! - **Typed values** - Graph, temporal and spatial types with `TryFrom` conversion
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use boltwire::{AuthToken, Driver, SessionConfig, Value};
//! use std::collections::HashMap;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let driver = Driver::new("bolt://localhost:7687", AuthToken::basic("neo4j", "password"))?;
//!
//!     let session = driver
//!         .session(SessionConfig::builder().with_database("neo4j").build())
//!         .await?;
//!
//!     let mut params = HashMap::new();
//!     params.insert("name".to_string(), Value::from("Alice"));
//!
//!     let mut cursor = session
//!         .run("CREATE (n:Person {name: $name}) RETURN n", Some(params))
//!         .await?;
//!     while let Some(record) = cursor.next().await? {
//!         println!("{}", record);
//!     }
//!
//!     session.close().await?;
//!     driver.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Transaction Functions
//!
//! ```rust,no_run
//! # use boltwire::{AuthToken, Driver, SessionConfig};
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let driver = Driver::new("bolt://localhost:7687", AuthToken::basic("u", "p"))?;
//! # let session = driver.session(SessionConfig::default()).await?;
//! let count = session
//!     .write_transaction(|tx| async move {
//!         let cursor = tx.run("MATCH (n) RETURN count(n) AS c", None).await?;
//!         cursor.single().await?.get_int("c")
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`driver`] - Driver, sessions, transactions, cursors and values
//! - [`bolt`] - Wire protocol: PackStream, messages, handshake and framing

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod bolt;
pub mod driver;

// Re-exports for convenience
pub use driver::{
    AccessMode, AuthToken, Bookmark, Driver, DriverConfig, DriverConfigBuilder, DriverError,
    DriverResult, ManagedTransaction, Query, Record, ResultCursor, ResultSummary, RetryConfig,
    ServerAddress, ServerInfo, Session, SessionConfig, SessionConfigBuilder, Transaction,
    TransactionConfig, Value,
};

pub use bolt::{BoltError, BoltVersion, PackStreamValue};

/// Config alias for convenience
pub type Config = DriverConfig;
