// SPDX-FileCopyrightText: 2026 Asqlite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The blocking connection object wrapped by the adapter.

use std::cmp::Ordering;
use std::panic::{RefUnwindSafe, UnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::OpenFlags;
use rusqlite::backup::Backup;
use rusqlite::functions::{Aggregate, Context, FunctionFlags};
use rusqlite::hooks::{AuthContext, Authorization};
use rusqlite::types::ToSql;

use super::{DetectTypes, InitHook, IsolationLevel, RowTransform, TextFactory};
use crate::error::{AsqliteError, Result};

/// Everything needed to open the raw driver connection.
pub(crate) struct OpenParams {
    pub path: PathBuf,
    pub timeout: Duration,
    pub detect_types: DetectTypes,
    pub isolation_level: Option<IsolationLevel>,
    pub cached_statements: usize,
    pub uri: bool,
    pub init: Option<InitHook>,
}

/// A synchronous driver connection plus the adapter-level state forwarded to
/// it: isolation level, row transform, text factory, detect-types flags.
///
/// The inner handle is `None` once `close` has run; every later touch fails
/// with [`AsqliteError::Closed`].
pub struct Connection {
    conn: Option<rusqlite::Connection>,
    isolation_level: Option<IsolationLevel>,
    detect_types: DetectTypes,
    row_transform: Option<RowTransform>,
    text_factory: TextFactory,
}

impl Connection {
    pub(crate) fn open(params: OpenParams) -> Result<Self> {
        // Serialized mode: the connection is shared across dispatcher threads,
        // so same-thread-only checking must stay off.
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        if params.uri {
            flags |= OpenFlags::SQLITE_OPEN_URI;
        }
        let mut conn = rusqlite::Connection::open_with_flags(&params.path, flags)?;
        conn.busy_timeout(params.timeout)?;
        conn.set_prepared_statement_cache_capacity(params.cached_statements);
        if let Some(init) = params.init {
            init(&mut conn)?;
        }
        Ok(Self {
            conn: Some(conn),
            isolation_level: params.isolation_level,
            detect_types: params.detect_types,
            row_transform: None,
            text_factory: TextFactory::default(),
        })
    }

    pub(crate) fn handle(&self) -> Result<&rusqlite::Connection> {
        self.conn.as_ref().ok_or(AsqliteError::Closed)
    }

    pub(crate) fn handle_mut(&mut self) -> Result<&mut rusqlite::Connection> {
        self.conn.as_mut().ok_or(AsqliteError::Closed)
    }

    /// Whether the inner driver handle is still present.
    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Commits an open transaction; a no-op in autocommit mode.
    pub fn commit(&self) -> Result<()> {
        let conn = self.handle()?;
        if !conn.is_autocommit() {
            conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    /// Rolls back an open transaction; a no-op in autocommit mode.
    pub fn rollback(&self) -> Result<()> {
        let conn = self.handle()?;
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    /// Closes the inner driver handle. On failure the handle is restored and
    /// the connection stays usable.
    pub fn close(&mut self) -> Result<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        match conn.close() {
            Ok(()) => Ok(()),
            Err((conn, e)) => {
                self.conn = Some(conn);
                Err(e.into())
            }
        }
    }

    pub fn in_transaction(&self) -> Result<bool> {
        Ok(!self.handle()?.is_autocommit())
    }

    /// Total number of rows inserted, updated, or deleted since the
    /// connection was opened.
    pub fn total_changes(&self) -> Result<u64> {
        let n: i64 = self
            .handle()?
            .query_row("SELECT total_changes()", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// Opens an implicit transaction before a data-modifying statement when
    /// an isolation level is set and no transaction is active.
    pub(crate) fn begin_if_needed(&self, sql: &str) -> Result<()> {
        let Some(level) = self.isolation_level else {
            return Ok(());
        };
        let conn = self.handle()?;
        if conn.is_autocommit() && is_dml(sql) {
            conn.execute_batch(&format!("BEGIN {}", level.as_str()))?;
        }
        Ok(())
    }

    /// Runs a multi-statement script, committing any open transaction first.
    pub fn executescript(&self, sql: &str) -> Result<()> {
        let conn = self.handle()?;
        if !conn.is_autocommit() {
            conn.execute_batch("COMMIT")?;
        }
        conn.execute_batch(sql)?;
        Ok(())
    }

    pub fn create_collation<C>(&self, name: &str, cmp: C) -> Result<()>
    where
        C: Fn(&str, &str) -> Ordering + Send + UnwindSafe + 'static,
    {
        self.handle()?.create_collation(name, cmp)?;
        Ok(())
    }

    pub fn create_function<F, T>(
        &self,
        name: &str,
        n_arg: i32,
        deterministic: bool,
        f: F,
    ) -> Result<()>
    where
        F: Fn(&Context<'_>) -> rusqlite::Result<T> + Send + UnwindSafe + 'static,
        T: ToSql,
    {
        let mut flags = FunctionFlags::SQLITE_UTF8;
        if deterministic {
            flags |= FunctionFlags::SQLITE_DETERMINISTIC;
        }
        self.handle()?.create_scalar_function(name, n_arg, flags, f)?;
        Ok(())
    }

    pub fn create_aggregate<A, D, T>(&self, name: &str, n_arg: i32, aggr: D) -> Result<()>
    where
        A: RefUnwindSafe + UnwindSafe,
        D: Aggregate<A, T> + 'static,
        T: ToSql,
    {
        self.handle()?
            .create_aggregate_function(name, n_arg, FunctionFlags::SQLITE_UTF8, aggr)?;
        Ok(())
    }

    /// Interrupts any query currently running on this connection.
    pub fn interrupt(&self) -> Result<()> {
        self.handle()?.get_interrupt_handle().interrupt();
        Ok(())
    }

    pub fn set_authorizer<F>(&self, hook: Option<F>) -> Result<()>
    where
        F: for<'r> FnMut(AuthContext<'r>) -> Authorization + Send + RefUnwindSafe + 'static,
    {
        self.handle()?.authorizer(hook);
        Ok(())
    }

    pub fn set_progress_handler<F>(&self, num_ops: i32, handler: Option<F>) -> Result<()>
    where
        F: FnMut() -> bool + Send + RefUnwindSafe + 'static,
    {
        self.handle()?.progress_handler(num_ops, handler);
        Ok(())
    }

    pub fn set_trace_callback(&mut self, trace_fn: Option<fn(&str)>) -> Result<()> {
        self.handle_mut()?.trace(trace_fn);
        Ok(())
    }

    pub fn enable_load_extension(&self, enabled: bool) -> Result<()> {
        let conn = self.handle()?;
        if enabled {
            // SAFETY: extension loading runs arbitrary library code; callers
            // opt in explicitly through the adapter surface.
            unsafe { conn.load_extension_enable()? };
        } else {
            conn.load_extension_disable()?;
        }
        Ok(())
    }

    pub fn load_extension(&self, path: &Path, entry_point: Option<&str>) -> Result<()> {
        // SAFETY: see enable_load_extension.
        unsafe { self.handle()?.load_extension(path, entry_point)? };
        Ok(())
    }

    /// Copies this database into `target` using the online backup API.
    pub fn backup_into(&self, target: &mut Connection) -> Result<()> {
        let src = self.handle()?;
        let dst = target
            .handle_mut()
            .map_err(|_| AsqliteError::BackupTarget("target connection is closed".into()))?;
        let backup = Backup::new(src, dst)?;
        backup.run_to_completion(100, Duration::from_millis(250), None)?;
        Ok(())
    }

    pub fn isolation_level(&self) -> Option<IsolationLevel> {
        self.isolation_level
    }

    pub fn set_isolation_level(&mut self, level: Option<IsolationLevel>) {
        self.isolation_level = level;
    }

    pub fn detect_types(&self) -> DetectTypes {
        self.detect_types
    }

    pub fn row_transform(&self) -> Option<RowTransform> {
        self.row_transform.clone()
    }

    pub fn set_row_transform(&mut self, transform: Option<RowTransform>) {
        self.row_transform = transform;
    }

    pub fn text_factory(&self) -> TextFactory {
        self.text_factory
    }

    pub fn set_text_factory(&mut self, factory: TextFactory) {
        self.text_factory = factory;
    }
}

/// Data-modifying statements open implicit transactions; everything else
/// (queries, DDL, pragmas) runs in autocommit.
fn is_dml(sql: &str) -> bool {
    let Some(first) = sql.split_whitespace().next() else {
        return false;
    };
    ["insert", "update", "delete", "replace"]
        .iter()
        .any(|kw| first.eq_ignore_ascii_case(kw))
}
