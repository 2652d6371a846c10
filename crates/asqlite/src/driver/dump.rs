// SPDX-FileCopyrightText: 2026 Asqlite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQL dump generator: a lazy, finite, non-restartable sequence of statements
//! that recreates the database schema and contents.

use std::collections::VecDeque;

use rusqlite::types::Value;

use super::{SharedConnection, lock};
use crate::error::Result;

enum Phase {
    Start,
    Tables,
    Others,
    Commit,
    Done,
}

/// Iterator of dump lines. Each `next` call does its work synchronously on
/// the calling thread.
pub(crate) struct DumpIter {
    conn: SharedConnection,
    phase: Phase,
    tables: VecDeque<(String, String)>,
    others: VecDeque<String>,
    pending: VecDeque<String>,
}

impl DumpIter {
    pub(crate) fn new(conn: SharedConnection) -> Self {
        Self {
            conn,
            phase: Phase::Start,
            tables: VecDeque::new(),
            others: VecDeque::new(),
            pending: VecDeque::new(),
        }
    }

    fn load_schema(&mut self) -> Result<()> {
        let guard = lock(&self.conn);
        let handle = guard.handle()?;
        let mut stmt = handle.prepare(
            "SELECT name, sql FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            self.tables.push_back((row.get(0)?, row.get(1)?));
        }
        drop(rows);
        let mut stmt = handle.prepare(
            "SELECT sql FROM sqlite_master
             WHERE type IN ('index', 'trigger', 'view')
               AND sql IS NOT NULL AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            self.others.push_back(row.get(0)?);
        }
        Ok(())
    }

    fn load_table_rows(&mut self, table: &str) -> Result<()> {
        let guard = lock(&self.conn);
        let handle = guard.handle()?;
        let mut stmt = handle.prepare(&format!("SELECT * FROM {}", quote_ident(table)))?;
        let column_count = stmt.column_count();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut literals = Vec::with_capacity(column_count);
            for idx in 0..column_count {
                let value: Value = row.get(idx)?;
                literals.push(sql_literal(&value));
            }
            self.pending.push_back(format!(
                "INSERT INTO {} VALUES({});",
                quote_ident(table),
                literals.join(",")
            ));
        }
        Ok(())
    }
}

impl Iterator for DumpIter {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(line) = self.pending.pop_front() {
            return Some(Ok(line));
        }
        loop {
            match self.phase {
                Phase::Start => {
                    self.phase = Phase::Tables;
                    if let Err(e) = self.load_schema() {
                        self.phase = Phase::Done;
                        return Some(Err(e));
                    }
                    return Some(Ok("BEGIN TRANSACTION;".to_string()));
                }
                Phase::Tables => match self.tables.pop_front() {
                    Some((name, sql)) => {
                        if let Err(e) = self.load_table_rows(&name) {
                            self.phase = Phase::Done;
                            return Some(Err(e));
                        }
                        return Some(Ok(format!("{sql};")));
                    }
                    None => self.phase = Phase::Others,
                },
                Phase::Others => match self.others.pop_front() {
                    Some(sql) => return Some(Ok(format!("{sql};"))),
                    None => self.phase = Phase::Commit,
                },
                Phase::Commit => {
                    self.phase = Phase::Done;
                    return Some(Ok("COMMIT;".to_string()));
                }
                Phase::Done => return None,
            }
        }
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(r) => format!("{r:?}"),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Blob(b) => {
            let hex: String = b.iter().map(|byte| format!("{byte:02X}")).collect();
            format!("X'{hex}'")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Connection, DetectTypes, OpenParams};
    use super::*;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn memory_conn() -> SharedConnection {
        let conn = Connection::open(OpenParams {
            path: PathBuf::from(":memory:"),
            timeout: Duration::from_secs(5),
            detect_types: DetectTypes::default(),
            isolation_level: None,
            cached_statements: 100,
            uri: false,
            init: None,
        })
        .unwrap();
        Arc::new(Mutex::new(conn))
    }

    #[test]
    fn literals_render_every_value_kind() {
        assert_eq!(sql_literal(&Value::Null), "NULL");
        assert_eq!(sql_literal(&Value::Integer(-3)), "-3");
        assert_eq!(sql_literal(&Value::Real(1.0)), "1.0");
        assert_eq!(sql_literal(&Value::Text("o'brien".into())), "'o''brien'");
        assert_eq!(sql_literal(&Value::Blob(vec![0xDE, 0xAD])), "X'DEAD'");
    }

    #[test]
    fn dump_recreates_schema_and_rows() {
        let conn = memory_conn();
        lock(&conn)
            .executescript(
                "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT);
                 CREATE INDEX notes_body ON notes (body);
                 INSERT INTO notes (body) VALUES ('first');
                 INSERT INTO notes (body) VALUES ('it''s quoted');",
            )
            .unwrap();

        let lines: Vec<String> = DumpIter::new(Arc::clone(&conn))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(lines.first().map(String::as_str), Some("BEGIN TRANSACTION;"));
        assert_eq!(lines.last().map(String::as_str), Some("COMMIT;"));
        assert!(lines.iter().any(|l| l.contains("CREATE TABLE notes")));
        assert!(lines.iter().any(|l| l.contains("CREATE INDEX notes_body")));

        // Replaying the dump into a fresh database reproduces the contents.
        let copy = memory_conn();
        lock(&copy).executescript(&lines.join("\n")).unwrap();
        let body: String = lock(&copy)
            .handle()
            .unwrap()
            .query_row("SELECT body FROM notes WHERE id = 2", [], |row| row.get(0))
            .unwrap();
        assert_eq!(body, "it's quoted");
    }

    #[test]
    fn dump_is_not_restartable() {
        let conn = memory_conn();
        let mut iter = DumpIter::new(conn);
        while iter.next().is_some() {}
        assert!(iter.next().is_none());
    }
}
