// SPDX-FileCopyrightText: 2026 Asqlite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The awaitable connection wrapper and the connect entry point.

use std::cmp::Ordering;
use std::panic::{RefUnwindSafe, UnwindSafe};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

use futures::Stream;
use rusqlite::functions::{Aggregate, Context};
use rusqlite::hooks::{AuthContext, Authorization};
use rusqlite::types::{ToSql, Value};
use tokio::runtime::Handle;
use tracing::debug;

use crate::bridge::{Bridge, default_bridge};
use crate::cursor::{Cursor, CursorRequest};
use crate::driver::{
    self, DetectTypes, InitHook, IsolationLevel, RowTransform, TextFactory, lock,
};
use crate::error::{AsqliteError, Result};

/// Opens a database with default options on the process-wide bridge.
pub async fn connect(path: impl AsRef<Path>) -> Result<Connection> {
    ConnectOptions::new(path).open().await
}

/// Builder for the connect entry point.
///
/// `check_same_thread` must stay `false`: the adapter shares the driver
/// connection across dispatcher threads by design, and requesting
/// same-thread checking is a configuration error reported before anything is
/// submitted.
pub struct ConnectOptions {
    path: PathBuf,
    timeout: Duration,
    detect_types: DetectTypes,
    isolation_level: Option<IsolationLevel>,
    check_same_thread: bool,
    factory: Option<InitHook>,
    cached_statements: usize,
    uri: bool,
    scheduler: Option<Handle>,
    bridge: Option<Bridge>,
}

impl ConnectOptions {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            timeout: Duration::from_secs(5),
            detect_types: DetectTypes::default(),
            isolation_level: Some(IsolationLevel::Deferred),
            check_same_thread: false,
            factory: None,
            cached_statements: 100,
            uri: false,
            scheduler: None,
            bridge: None,
        }
    }

    /// Busy timeout applied to the driver connection.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn detect_types(mut self, detect_types: DetectTypes) -> Self {
        self.detect_types = detect_types;
        self
    }

    /// `None` disables implicit transactions entirely (autocommit).
    pub fn isolation_level(mut self, level: Option<IsolationLevel>) -> Self {
        self.isolation_level = level;
        self
    }

    pub fn check_same_thread(mut self, check: bool) -> Self {
        self.check_same_thread = check;
        self
    }

    /// Initialization hook run on the raw driver connection at open.
    pub fn factory<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<()> + Send + 'static,
    {
        self.factory = Some(Box::new(factory));
        self
    }

    /// Prepared-statement cache capacity.
    pub fn cached_statements(mut self, capacity: usize) -> Self {
        self.cached_statements = capacity;
        self
    }

    /// Interpret the database path as a URI.
    pub fn uri(mut self, uri: bool) -> Self {
        self.uri = uri;
        self
    }

    /// Scheduler the connection's results resolve onto. Defaults to the
    /// ambient runtime.
    pub fn scheduler(mut self, scheduler: Handle) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Bridge whose work buffer this connection's dispatcher will share.
    /// Defaults to the process-wide bridge.
    pub fn bridge(mut self, bridge: Bridge) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Opens the connection: spawns its dispatcher, then builds the driver
    /// connection through the bridge.
    pub async fn open(self) -> Result<Connection> {
        if self.check_same_thread {
            return Err(AsqliteError::Config(
                "check_same_thread must be false: calls are serviced from dispatcher threads"
                    .into(),
            ));
        }
        let scheduler = match self.scheduler {
            Some(handle) => handle,
            None => Handle::current(),
        };
        let bridge = self.bridge.unwrap_or_else(default_bridge);
        bridge.spawn_dispatcher()?;

        let path = self.path.clone();
        let params = driver::OpenParams {
            path: self.path,
            timeout: self.timeout,
            detect_types: self.detect_types,
            isolation_level: self.isolation_level,
            cached_statements: self.cached_statements,
            uri: self.uri,
            init: self.factory,
        };
        let inner = bridge
            .submit(&scheduler, move || driver::Connection::open(params))
            .await?;
        debug!(path = %path.display(), "connection opened");
        Ok(Connection {
            inner: Arc::new(Mutex::new(inner)),
            scheduler,
            bridge,
        })
    }
}

impl std::fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("path", &self.path)
            .field("timeout", &self.timeout)
            .field("isolation_level", &self.isolation_level)
            .field("uri", &self.uri)
            .finish_non_exhaustive()
    }
}

/// The target of a backup operation, resolved explicitly at the call
/// boundary.
pub enum BackupTarget {
    /// A bare shared driver connection.
    Bare(driver::SharedConnection),
    /// An adapter-level connection wrapper.
    Wrapped(Connection),
}

impl BackupTarget {
    fn resolve(self) -> Result<driver::SharedConnection> {
        match self {
            Self::Bare(conn) => Ok(conn),
            Self::Wrapped(conn) => {
                if !lock(&conn.inner).is_open() {
                    return Err(AsqliteError::BackupTarget(
                        "target connection is closed".into(),
                    ));
                }
                Ok(Arc::clone(&conn.inner))
            }
        }
    }
}

/// An awaitable connection: every operation funnels the like-named blocking
/// call through the bridge and suspends until the dispatcher has resolved it
/// back onto the owning scheduler.
///
/// Attribute accessors (`isolation_level`, `in_transaction`, `row_factory`,
/// `text_factory`, `total_changes`) forward live to the underlying driver
/// object on the calling thread.
#[derive(Clone)]
pub struct Connection {
    pub(crate) inner: driver::SharedConnection,
    scheduler: Handle,
    bridge: Bridge,
}

impl Connection {
    async fn call<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut driver::Connection) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        self.bridge
            .submit(&self.scheduler, move || f(&mut lock(&inner)))
            .await
    }

    fn cursor_request<F>(&self, op: F) -> CursorRequest
    where
        F: FnOnce(&mut driver::Cursor) -> Result<()> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let scheduler = self.scheduler.clone();
        let bridge = self.bridge.clone();
        CursorRequest::new(async move {
            let raw = bridge
                .submit(&scheduler, move || {
                    let mut cursor = driver::Cursor::new(inner)?;
                    op(&mut cursor)?;
                    Ok(cursor)
                })
                .await?;
            Ok(Cursor::wrap(raw, scheduler, bridge))
        })
    }

    /// Creates a new cursor.
    pub fn cursor(&self) -> CursorRequest {
        self.cursor_request(|_| Ok(()))
    }

    /// Runs one statement and resolves to a new cursor over its results.
    pub fn execute(&self, sql: impl Into<String>, params: Vec<Value>) -> CursorRequest {
        let sql = sql.into();
        self.cursor_request(move |cursor| cursor.execute(&sql, params))
    }

    /// Runs one statement once per parameter set.
    pub fn executemany(
        &self,
        sql: impl Into<String>,
        param_sets: Vec<Vec<Value>>,
    ) -> CursorRequest {
        let sql = sql.into();
        self.cursor_request(move |cursor| cursor.executemany(&sql, param_sets))
    }

    /// Runs a multi-statement script, committing any open transaction first.
    pub fn executescript(&self, sql: impl Into<String>) -> CursorRequest {
        let sql = sql.into();
        self.cursor_request(move |cursor| cursor.executescript(&sql))
    }

    pub async fn commit(&self) -> Result<()> {
        self.call(|conn| conn.commit()).await
    }

    pub async fn rollback(&self) -> Result<()> {
        self.call(|conn| conn.rollback()).await
    }

    /// Closes the underlying driver connection. The dispatcher thread is not
    /// torn down; it keeps draining the bridge for the life of the process.
    pub async fn close(&self) -> Result<()> {
        self.call(driver::Connection::close).await?;
        debug!("connection closed");
        Ok(())
    }

    pub async fn create_collation<C>(&self, name: impl Into<String>, cmp: C) -> Result<()>
    where
        C: Fn(&str, &str) -> Ordering + Send + UnwindSafe + 'static,
    {
        let name = name.into();
        self.call(move |conn| conn.create_collation(&name, cmp)).await
    }

    pub async fn create_function<F, T>(
        &self,
        name: impl Into<String>,
        n_arg: i32,
        deterministic: bool,
        f: F,
    ) -> Result<()>
    where
        F: Fn(&Context<'_>) -> rusqlite::Result<T> + Send + UnwindSafe + 'static,
        T: ToSql + Send + 'static,
    {
        let name = name.into();
        self.call(move |conn| conn.create_function(&name, n_arg, deterministic, f))
            .await
    }

    pub async fn create_aggregate<A, D, T>(
        &self,
        name: impl Into<String>,
        n_arg: i32,
        aggr: D,
    ) -> Result<()>
    where
        A: RefUnwindSafe + UnwindSafe,
        D: Aggregate<A, T> + Send + 'static,
        T: ToSql + Send + 'static,
    {
        let name = name.into();
        self.call(move |conn| conn.create_aggregate(&name, n_arg, aggr))
            .await
    }

    /// Interrupts any query currently running on this connection. Serviced
    /// by whichever dispatcher drains it, so it can land while another
    /// dispatcher is mid-query.
    pub async fn interrupt(&self) -> Result<()> {
        self.call(|conn| conn.interrupt()).await
    }

    pub async fn set_authorizer<F>(&self, hook: Option<F>) -> Result<()>
    where
        F: for<'r> FnMut(AuthContext<'r>) -> Authorization + Send + RefUnwindSafe + 'static,
    {
        self.call(move |conn| conn.set_authorizer(hook)).await
    }

    pub async fn set_progress_handler<F>(&self, num_ops: i32, handler: Option<F>) -> Result<()>
    where
        F: FnMut() -> bool + Send + RefUnwindSafe + 'static,
    {
        self.call(move |conn| conn.set_progress_handler(num_ops, handler))
            .await
    }

    pub async fn set_trace_callback(&self, trace_fn: Option<fn(&str)>) -> Result<()> {
        self.call(move |conn| conn.set_trace_callback(trace_fn)).await
    }

    /// Allow or disallow loading SQLite extensions. Loading runs arbitrary
    /// library code; enable only for trusted paths.
    pub async fn enable_load_extension(&self, enabled: bool) -> Result<()> {
        self.call(move |conn| conn.enable_load_extension(enabled))
            .await
    }

    pub async fn load_extension(
        &self,
        path: impl AsRef<Path>,
        entry_point: Option<&str>,
    ) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        let entry_point = entry_point.map(str::to_string);
        self.call(move |conn| conn.load_extension(&path, entry_point.as_deref()))
            .await
    }

    /// Copies this database into `target`. Target-shape errors are raised
    /// before anything is submitted.
    pub async fn backup(&self, target: BackupTarget) -> Result<()> {
        let target = target.resolve()?;
        if Arc::ptr_eq(&target, &self.inner) {
            return Err(AsqliteError::BackupTarget(
                "target must be a different connection".into(),
            ));
        }
        self.call(move |conn| conn.backup_into(&mut lock(&target)))
            .await
    }

    /// Lazy sequence of SQL dump lines.
    ///
    /// Each step pulls from the driver's synchronous dump generator on the
    /// polling thread; this sequence is intentionally not routed through the
    /// dispatcher.
    pub fn iterdump(&self) -> DumpLines {
        DumpLines {
            iter: driver::dump::DumpIter::new(Arc::clone(&self.inner)),
        }
    }

    /// Scoped acquisition: runs `body` with the connection and closes it when
    /// the body finishes, success or failure.
    pub async fn scope<T, F, Fut>(self, body: F) -> Result<T>
    where
        F: FnOnce(Connection) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let outcome = body(self.clone()).await;
        let closed = self.close().await;
        match outcome {
            Err(e) => Err(e),
            Ok(value) => closed.map(|()| value),
        }
    }

    pub fn isolation_level(&self) -> Option<IsolationLevel> {
        lock(&self.inner).isolation_level()
    }

    pub fn set_isolation_level(&self, level: Option<IsolationLevel>) {
        lock(&self.inner).set_isolation_level(level);
    }

    pub fn in_transaction(&self) -> Result<bool> {
        lock(&self.inner).in_transaction()
    }

    pub fn row_factory(&self) -> Option<RowTransform> {
        lock(&self.inner).row_transform()
    }

    /// `None` clears the transform.
    pub fn set_row_factory(&self, transform: Option<RowTransform>) {
        lock(&self.inner).set_row_transform(transform);
    }

    pub fn text_factory(&self) -> TextFactory {
        lock(&self.inner).text_factory()
    }

    pub fn set_text_factory(&self, factory: TextFactory) {
        lock(&self.inner).set_text_factory(factory);
    }

    pub fn total_changes(&self) -> Result<u64> {
        lock(&self.inner).total_changes()
    }

    pub fn detect_types(&self) -> DetectTypes {
        lock(&self.inner).detect_types()
    }

    /// The shared synchronous driver object backing this wrapper.
    pub fn shared(&self) -> driver::SharedConnection {
        Arc::clone(&self.inner)
    }

    /// The scheduler this connection resolves its results onto.
    pub fn scheduler(&self) -> &Handle {
        &self.scheduler
    }

    /// The bridge whose work buffer services this connection.
    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("Connection")
            .field("isolation_level", &inner.isolation_level())
            .field("total_changes", &inner.total_changes().ok())
            .field("in_transaction", &inner.in_transaction().ok())
            .finish()
    }
}

/// Stream of SQL dump lines. See [`Connection::iterdump`].
pub struct DumpLines {
    iter: driver::dump::DumpIter,
}

impl Stream for DumpLines {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        // Synchronous at every step: the generator runs on the polling
        // thread, never through the dispatcher.
        Poll::Ready(self.get_mut().iter.next())
    }
}

impl std::fmt::Debug for DumpLines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DumpLines").finish_non_exhaustive()
    }
}
