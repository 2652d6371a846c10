// SPDX-FileCopyrightText: 2026 Asqlite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Synchronous facade over the rusqlite driver.
//!
//! This module is the adapter's view of the underlying blocking client: a
//! connection object plus a cursor object shaped after the classic embedded
//! database API (buffered row sets, `rowcount`/`lastrowid`/`description`
//! state, implicit transactions driven by the isolation level). Everything in
//! here runs on whichever thread calls it; the async wrappers decide what
//! goes through the dispatcher and what is forwarded live.

mod connection;
mod cursor;
pub(crate) mod dump;
mod row;

use std::sync::Arc;

pub use connection::Connection;
pub(crate) use connection::OpenParams;
pub use cursor::Cursor;
pub use row::Row;

/// A driver connection shared across the async wrapper, its cursors, and the
/// dispatcher threads that service their calls.
pub type SharedConnection = Arc<std::sync::Mutex<Connection>>;

/// Connection-initialization hook run on the raw driver connection at open.
pub type InitHook = Box<dyn FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<()> + Send>;

/// Live row post-processing applied when rows are fetched from a cursor.
pub type RowTransform = Arc<dyn Fn(Row) -> Row + Send + Sync>;

/// Transaction behavior for statements executed outside a transaction.
///
/// `None` at the connection level means autocommit: no implicit transactions
/// are ever opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    #[default]
    Deferred,
    Immediate,
    Exclusive,
}

impl IsolationLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deferred => "DEFERRED",
            Self::Immediate => "IMMEDIATE",
            Self::Exclusive => "EXCLUSIVE",
        }
    }
}

/// How TEXT values are materialized into rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextFactory {
    /// TEXT columns come out as text values.
    #[default]
    Text,
    /// TEXT columns come out as raw byte blobs.
    Bytes,
}

/// Declared-type and column-name parsing flags supplied at connect time.
///
/// Retained on the connection; declared-type conversion itself is delegated
/// to typed row access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DetectTypes {
    pub decltypes: bool,
    pub colnames: bool,
}

/// Locks a shared driver connection, recovering the guard from a poisoned
/// mutex (the protected state stays structurally sound across a panicked
/// call).
pub(crate) fn lock(conn: &SharedConnection) -> std::sync::MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
