// SPDX-FileCopyrightText: 2026 Asqlite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the asqlite adapter.

use thiserror::Error;

/// The primary error type surfaced by every awaitable operation.
#[derive(Debug, Error)]
pub enum AsqliteError {
    /// Connect-time configuration errors. Raised synchronously, never routed
    /// through the bridge.
    #[error("configuration error: {0}")]
    Config(String),

    /// Errors raised by the underlying SQLite driver, captured by the
    /// dispatcher and delivered at the await point.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Operation on a connection whose inner driver handle has been closed.
    #[error("connection is closed")]
    Closed,

    /// Operation on a closed cursor.
    #[error("cursor is closed")]
    CursorClosed,

    /// A backup target argument that cannot be resolved to a usable driver
    /// connection. Raised synchronously, before submission.
    #[error("invalid backup target: {0}")]
    BackupTarget(String),

    /// The pending-result channel was dropped before resolution (the owning
    /// scheduler shut down underneath the call).
    #[error("result channel closed before resolution")]
    Disconnected,

    /// The dispatcher thread for a new connection could not be started.
    #[error("failed to spawn dispatcher thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AsqliteError>;
