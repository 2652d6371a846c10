// SPDX-FileCopyrightText: 2026 Asqlite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The awaitable cursor wrapper.

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::Stream;
use rusqlite::types::Value;
use tokio::runtime::Handle;

use crate::bridge::Bridge;
use crate::driver;
use crate::error::Result;

/// An awaitable cursor: every operation funnels the like-named blocking call
/// through the bridge and suspends until the dispatcher has resolved it.
///
/// Attribute accessors (`rowcount`, `lastrowid`, `arraysize`, `description`,
/// `connection`) forward live to the underlying cursor on the calling thread
/// instead.
#[derive(Clone)]
pub struct Cursor {
    inner: Arc<Mutex<driver::Cursor>>,
    scheduler: Handle,
    bridge: Bridge,
}

fn lock(cursor: &Arc<Mutex<driver::Cursor>>) -> MutexGuard<'_, driver::Cursor> {
    cursor.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Cursor {
    pub(crate) fn wrap(raw: driver::Cursor, scheduler: Handle, bridge: Bridge) -> Self {
        Self {
            inner: Arc::new(Mutex::new(raw)),
            scheduler,
            bridge,
        }
    }

    async fn call<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut driver::Cursor) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        self.bridge
            .submit(&self.scheduler, move || f(&mut lock(&inner)))
            .await
    }

    /// Runs one statement on this cursor. Resolves to the same cursor
    /// instance, never a new wrapper.
    pub async fn execute(&self, sql: impl Into<String>, params: Vec<Value>) -> Result<&Self> {
        let sql = sql.into();
        self.call(move |cursor| cursor.execute(&sql, params)).await?;
        Ok(self)
    }

    /// Runs one statement once per parameter set.
    pub async fn executemany(
        &self,
        sql: impl Into<String>,
        param_sets: Vec<Vec<Value>>,
    ) -> Result<&Self> {
        let sql = sql.into();
        self.call(move |cursor| cursor.executemany(&sql, param_sets))
            .await?;
        Ok(self)
    }

    /// Runs a multi-statement script.
    pub async fn executescript(&self, sql: impl Into<String>) -> Result<&Self> {
        let sql = sql.into();
        self.call(move |cursor| cursor.executescript(&sql)).await?;
        Ok(self)
    }

    pub async fn fetchone(&self) -> Result<Option<driver::Row>> {
        self.call(driver::Cursor::fetchone).await
    }

    pub async fn fetchmany(&self, size: Option<usize>) -> Result<Vec<driver::Row>> {
        self.call(move |cursor| cursor.fetchmany(size)).await
    }

    pub async fn fetchall(&self) -> Result<Vec<driver::Row>> {
        self.call(driver::Cursor::fetchall).await
    }

    pub async fn close(&self) -> Result<()> {
        self.call(driver::Cursor::close).await
    }

    /// Asynchronous iteration: fetches one row at a time and terminates
    /// exactly when an absent or empty row is produced.
    pub fn stream(&self) -> impl Stream<Item = Result<driver::Row>> + '_ {
        futures::stream::try_unfold(self, |cursor| async move {
            match cursor.fetchone().await? {
                Some(row) if !row.is_empty() => Ok(Some((row, cursor))),
                _ => Ok(None),
            }
        })
    }

    pub fn rowcount(&self) -> i64 {
        lock(&self.inner).rowcount()
    }

    pub fn lastrowid(&self) -> Option<i64> {
        lock(&self.inner).lastrowid()
    }

    pub fn arraysize(&self) -> usize {
        lock(&self.inner).arraysize()
    }

    pub fn set_arraysize(&self, size: usize) {
        lock(&self.inner).set_arraysize(size);
    }

    pub fn description(&self) -> Option<Vec<String>> {
        lock(&self.inner).description()
    }

    /// The shared driver connection behind this cursor.
    pub fn connection(&self) -> driver::SharedConnection {
        lock(&self.inner).connection()
    }

    /// The scheduler this cursor resolves its results onto.
    pub fn scheduler(&self) -> &Handle {
        &self.scheduler
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("Cursor")
            .field("rowcount", &inner.rowcount())
            .field("lastrowid", &inner.lastrowid())
            .field("arraysize", &inner.arraysize())
            .finish()
    }
}

/// The awaitable produced by cursor-returning connection calls.
///
/// Await it directly for the resolved [`Cursor`], or use [`scope`] to consume
/// it as a scoped acquisition that closes the cursor when the body finishes,
/// success or failure.
///
/// [`scope`]: CursorRequest::scope
pub struct CursorRequest {
    fut: Pin<Box<dyn Future<Output = Result<Cursor>> + Send>>,
}

impl CursorRequest {
    pub(crate) fn new(fut: impl Future<Output = Result<Cursor>> + Send + 'static) -> Self {
        Self { fut: Box::pin(fut) }
    }

    /// Awaits the cursor, runs `body` with it, then closes it exactly once,
    /// including when the body returns an error.
    pub async fn scope<T, F, Fut>(self, body: F) -> Result<T>
    where
        F: FnOnce(Cursor) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let cursor = self.await?;
        let outcome = body(cursor.clone()).await;
        let closed = cursor.close().await;
        match outcome {
            Err(e) => Err(e),
            Ok(value) => closed.map(|()| value),
        }
    }
}

impl Future for CursorRequest {
    type Output = Result<Cursor>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().fut.as_mut().poll(cx)
    }
}

impl std::fmt::Debug for CursorRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorRequest").finish_non_exhaustive()
    }
}
