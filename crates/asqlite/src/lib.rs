// SPDX-FileCopyrightText: 2026 Asqlite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Awaitable adapter over the blocking rusqlite SQLite client.
//!
//! Every proxied operation is enqueued on a bounded work buffer shared by
//! per-connection dispatcher threads, executed off the async runtime, and
//! resolved back onto the caller's scheduler. The buffer is drained
//! last-in-first-out and sheds the oldest pending call when full; see
//! [`bridge`] for the exact ordering and backpressure contract.
//!
//! ```no_run
//! use asqlite::Value;
//! use futures::TryStreamExt;
//!
//! # async fn demo() -> asqlite::Result<()> {
//! let conn = asqlite::connect("app.db").await?;
//! conn.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", Vec::new())
//!     .await?;
//! conn.execute("INSERT INTO users (name) VALUES (?1)", vec![Value::Text("ada".into())])
//!     .scope(|cursor| async move {
//!         assert_eq!(cursor.rowcount(), 1);
//!         Ok(())
//!     })
//!     .await?;
//! let cursor = conn.execute("SELECT name FROM users", Vec::new()).await?;
//! let names: Vec<_> = cursor.stream().try_collect().await?;
//! # let _ = names;
//! conn.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod driver;
pub mod error;

mod connection;
mod cursor;

// Re-export key items at crate root for ergonomic imports.
pub use bridge::Bridge;
pub use connection::{BackupTarget, ConnectOptions, Connection, DumpLines, connect};
pub use cursor::{Cursor, CursorRequest};
pub use driver::{DetectTypes, InitHook, IsolationLevel, Row, RowTransform, TextFactory};
pub use error::{AsqliteError, Result};

// The underlying driver, for parameter values, function contexts, and bare
// connection handles.
pub use rusqlite;
pub use rusqlite::types::Value;
