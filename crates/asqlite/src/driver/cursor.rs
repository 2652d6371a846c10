// SPDX-FileCopyrightText: 2026 Asqlite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The blocking cursor object: statement execution plus a buffered row set
//! with the classic `rowcount`/`lastrowid`/`description` state.

use std::collections::VecDeque;
use std::sync::Arc;

use rusqlite::params_from_iter;
use rusqlite::types::Value;

use super::row::Row;
use super::{SharedConnection, TextFactory, lock};
use crate::error::{AsqliteError, Result};

/// A cursor over a shared driver connection.
///
/// Row-returning statements are materialized into an owned buffer at
/// execution time; the fetch operations drain it. `rowcount` follows the
/// embedded-API convention: −1 for row-returning statements, the number of
/// affected rows for data modification, accumulated across `executemany`.
pub struct Cursor {
    conn: SharedConnection,
    rows: VecDeque<Row>,
    description: Option<Arc<[String]>>,
    rowcount: i64,
    lastrowid: Option<i64>,
    arraysize: usize,
    closed: bool,
}

impl Cursor {
    /// Creates a cursor bound to `conn`. Fails if the connection is closed.
    pub fn new(conn: SharedConnection) -> Result<Self> {
        lock(&conn).handle()?;
        Ok(Self {
            conn,
            rows: VecDeque::new(),
            description: None,
            rowcount: -1,
            lastrowid: None,
            arraysize: 1,
            closed: false,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(AsqliteError::CursorClosed);
        }
        Ok(())
    }

    /// Runs one statement, replacing any previously buffered rows.
    pub fn execute(&mut self, sql: &str, params: Vec<Value>) -> Result<()> {
        self.ensure_open()?;
        let conn = lock(&self.conn);
        conn.begin_if_needed(sql)?;
        let text_factory = conn.text_factory();
        let handle = conn.handle()?;
        let mut stmt = handle.prepare_cached(sql)?;
        self.rows.clear();
        if stmt.column_count() > 0 {
            let columns: Arc<[String]> = stmt
                .column_names()
                .iter()
                .map(|name| (*name).to_string())
                .collect();
            let mut buffered = VecDeque::new();
            let mut result_rows = stmt.query(params_from_iter(params))?;
            while let Some(row) = result_rows.next()? {
                let mut values = Vec::with_capacity(columns.len());
                for idx in 0..columns.len() {
                    let mut value: Value = row.get(idx)?;
                    if text_factory == TextFactory::Bytes {
                        if let Value::Text(text) = value {
                            value = Value::Blob(text.into_bytes());
                        }
                    }
                    values.push(value);
                }
                buffered.push_back(Row::new(Arc::clone(&columns), values));
            }
            self.rows = buffered;
            self.description = Some(columns);
            self.rowcount = -1;
        } else {
            let changed = stmt.execute(params_from_iter(params))?;
            self.description = None;
            self.rowcount = changed as i64;
            self.lastrowid = Some(handle.last_insert_rowid());
        }
        Ok(())
    }

    /// Runs one statement once per parameter set, accumulating `rowcount`.
    /// Row-returning statements are rejected by the driver.
    pub fn executemany(&mut self, sql: &str, param_sets: Vec<Vec<Value>>) -> Result<()> {
        self.ensure_open()?;
        let conn = lock(&self.conn);
        conn.begin_if_needed(sql)?;
        let handle = conn.handle()?;
        let mut stmt = handle.prepare_cached(sql)?;
        let mut total = 0i64;
        for params in param_sets {
            total += stmt.execute(params_from_iter(params))? as i64;
        }
        self.rows.clear();
        self.description = None;
        self.rowcount = total;
        self.lastrowid = Some(handle.last_insert_rowid());
        Ok(())
    }

    /// Runs a multi-statement script through the connection.
    pub fn executescript(&mut self, sql: &str) -> Result<()> {
        self.ensure_open()?;
        lock(&self.conn).executescript(sql)?;
        self.rows.clear();
        self.description = None;
        self.rowcount = -1;
        Ok(())
    }

    pub fn fetchone(&mut self) -> Result<Option<Row>> {
        self.ensure_open()?;
        Ok(self.rows.pop_front().map(|row| self.transform(row)))
    }

    /// Fetches up to `size` rows; `None` falls back to `arraysize`.
    pub fn fetchmany(&mut self, size: Option<usize>) -> Result<Vec<Row>> {
        self.ensure_open()?;
        let size = size.unwrap_or(self.arraysize);
        let mut out = Vec::with_capacity(size.min(self.rows.len()));
        for _ in 0..size {
            match self.rows.pop_front() {
                Some(row) => out.push(self.transform(row)),
                None => break,
            }
        }
        Ok(out)
    }

    pub fn fetchall(&mut self) -> Result<Vec<Row>> {
        self.ensure_open()?;
        let rows: Vec<_> = self.rows.drain(..).collect();
        Ok(rows.into_iter().map(|row| self.transform(row)).collect())
    }

    /// Closes the cursor and discards any buffered rows.
    pub fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.rows.clear();
        Ok(())
    }

    /// The connection's row transform is read at fetch time, so setting it
    /// after execution still affects unfetched rows.
    fn transform(&self, row: Row) -> Row {
        match lock(&self.conn).row_transform() {
            Some(transform) => transform(row),
            None => row,
        }
    }

    pub fn rowcount(&self) -> i64 {
        self.rowcount
    }

    pub fn lastrowid(&self) -> Option<i64> {
        self.lastrowid
    }

    pub fn arraysize(&self) -> usize {
        self.arraysize
    }

    pub fn set_arraysize(&mut self, size: usize) {
        self.arraysize = size;
    }

    pub fn description(&self) -> Option<Vec<String>> {
        self.description.as_ref().map(|cols| cols.to_vec())
    }

    /// The shared driver connection this cursor runs against.
    pub fn connection(&self) -> SharedConnection {
        Arc::clone(&self.conn)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Connection, DetectTypes, IsolationLevel, OpenParams};
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    fn memory_conn(isolation_level: Option<IsolationLevel>) -> SharedConnection {
        let conn = Connection::open(OpenParams {
            path: PathBuf::from(":memory:"),
            timeout: Duration::from_secs(5),
            detect_types: DetectTypes::default(),
            isolation_level,
            cached_statements: 100,
            uri: false,
            init: None,
        })
        .unwrap();
        Arc::new(Mutex::new(conn))
    }

    fn seeded_conn() -> SharedConnection {
        let conn = memory_conn(None);
        lock(&conn)
            .executescript(
                "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT);
                 INSERT INTO people (name) VALUES ('ada');
                 INSERT INTO people (name) VALUES ('grace');",
            )
            .unwrap();
        conn
    }

    #[test]
    fn select_buffers_rows_and_reports_description() {
        let conn = seeded_conn();
        let mut cursor = Cursor::new(conn).unwrap();
        cursor
            .execute("SELECT id, name FROM people ORDER BY id", Vec::new())
            .unwrap();

        assert_eq!(cursor.rowcount(), -1);
        assert_eq!(
            cursor.description(),
            Some(vec!["id".to_string(), "name".to_string()])
        );
        let rows = cursor.fetchall().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get::<String>(1).unwrap(), "ada");
        assert_eq!(rows[1].get::<String>(1).unwrap(), "grace");
    }

    #[test]
    fn dml_reports_rowcount_and_lastrowid() {
        let conn = seeded_conn();
        let mut cursor = Cursor::new(conn).unwrap();
        cursor
            .execute(
                "INSERT INTO people (name) VALUES (?1)",
                vec![Value::Text("edsger".into())],
            )
            .unwrap();
        assert_eq!(cursor.rowcount(), 1);
        assert_eq!(cursor.lastrowid(), Some(3));
        assert_eq!(cursor.description(), None);
    }

    #[test]
    fn fetchone_drains_in_order_then_returns_none() {
        let conn = seeded_conn();
        let mut cursor = Cursor::new(conn).unwrap();
        cursor
            .execute("SELECT name FROM people ORDER BY id", Vec::new())
            .unwrap();
        assert_eq!(
            cursor.fetchone().unwrap().unwrap().get::<String>(0).unwrap(),
            "ada"
        );
        assert_eq!(
            cursor.fetchone().unwrap().unwrap().get::<String>(0).unwrap(),
            "grace"
        );
        assert!(cursor.fetchone().unwrap().is_none());
    }

    #[test]
    fn fetchmany_defaults_to_arraysize() {
        let conn = seeded_conn();
        let mut cursor = Cursor::new(conn).unwrap();
        cursor
            .execute("SELECT name FROM people ORDER BY id", Vec::new())
            .unwrap();

        assert_eq!(cursor.fetchmany(None).unwrap().len(), 1);

        cursor
            .execute("SELECT name FROM people ORDER BY id", Vec::new())
            .unwrap();
        cursor.set_arraysize(10);
        assert_eq!(cursor.fetchmany(None).unwrap().len(), 2);
    }

    #[test]
    fn executemany_accumulates_rowcount() {
        let conn = seeded_conn();
        let mut cursor = Cursor::new(conn).unwrap();
        cursor
            .executemany(
                "INSERT INTO people (name) VALUES (?1)",
                vec![
                    vec![Value::Text("alan".into())],
                    vec![Value::Text("barbara".into())],
                    vec![Value::Text("edsger".into())],
                ],
            )
            .unwrap();
        assert_eq!(cursor.rowcount(), 3);
    }

    #[test]
    fn executemany_rejects_row_returning_statements() {
        let conn = seeded_conn();
        let mut cursor = Cursor::new(conn).unwrap();
        let result = cursor.executemany("SELECT name FROM people", vec![Vec::new()]);
        assert!(result.is_err());
    }

    #[test]
    fn implicit_transaction_wraps_dml() {
        let conn = memory_conn(Some(IsolationLevel::Deferred));
        lock(&conn)
            .executescript("CREATE TABLE t (a INTEGER)")
            .unwrap();
        let mut cursor = Cursor::new(Arc::clone(&conn)).unwrap();
        cursor
            .execute("INSERT INTO t VALUES (1)", Vec::new())
            .unwrap();
        assert!(lock(&conn).in_transaction().unwrap());
        lock(&conn).commit().unwrap();
        assert!(!lock(&conn).in_transaction().unwrap());
    }

    #[test]
    fn text_factory_bytes_materializes_blobs() {
        let conn = seeded_conn();
        lock(&conn).set_text_factory(TextFactory::Bytes);
        let mut cursor = Cursor::new(conn).unwrap();
        cursor
            .execute("SELECT name FROM people WHERE id = 1", Vec::new())
            .unwrap();
        let row = cursor.fetchone().unwrap().unwrap();
        assert_eq!(row.value(0), Some(&Value::Blob(b"ada".to_vec())));
    }

    #[test]
    fn row_transform_is_read_at_fetch_time() {
        let conn = seeded_conn();
        let mut cursor = Cursor::new(Arc::clone(&conn)).unwrap();
        cursor
            .execute("SELECT id, name FROM people WHERE id = 1", Vec::new())
            .unwrap();
        // Installed after execution, still applied to the buffered row.
        lock(&conn).set_row_transform(Some(Arc::new(|row: Row| {
            let columns: Arc<[String]> = row.columns().to_vec().into();
            Row::new(columns, vec![Value::Text("masked".into()); row.len()])
        })));
        let row = cursor.fetchone().unwrap().unwrap();
        assert_eq!(row.get::<String>(1).unwrap(), "masked");
    }

    #[test]
    fn closed_cursor_refuses_every_operation() {
        let conn = seeded_conn();
        let mut cursor = Cursor::new(conn).unwrap();
        cursor.close().unwrap();
        assert!(matches!(
            cursor.fetchone(),
            Err(AsqliteError::CursorClosed)
        ));
        assert!(matches!(
            cursor.execute("SELECT 1", Vec::new()),
            Err(AsqliteError::CursorClosed)
        ));
    }

    #[test]
    fn cursor_creation_fails_on_a_closed_connection() {
        let conn = memory_conn(None);
        lock(&conn).close().unwrap();
        assert!(matches!(Cursor::new(conn), Err(AsqliteError::Closed)));
    }
}
