// SPDX-FileCopyrightText: 2026 Asqlite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Owned result rows decoupled from statement lifetimes.

use std::sync::Arc;

use rusqlite::types::{FromSql, Value, ValueRef};

use crate::error::{AsqliteError, Result};

/// A single result row: column names plus owned values.
///
/// Rows are materialized by the driver cursor when a statement runs, so they
/// stay valid across await points and thread hops.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Typed access to the value at `idx`.
    pub fn get<T: FromSql>(&self, idx: usize) -> Result<T> {
        let value = self
            .values
            .get(idx)
            .ok_or(rusqlite::Error::InvalidColumnIndex(idx))?;
        T::column_result(ValueRef::from(value)).map_err(|e| {
            AsqliteError::Sqlite(rusqlite::Error::FromSqlConversionFailure(
                idx,
                value.data_type(),
                Box::new(e),
            ))
        })
    }

    /// The raw value at `idx`, if present.
    pub fn value(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Position of the named column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Row {
        let columns: Arc<[String]> = vec!["id".to_string(), "name".to_string()].into();
        Row::new(columns, vec![Value::Integer(7), Value::Text("ada".into())])
    }

    #[test]
    fn typed_get_converts_values() {
        let row = sample();
        assert_eq!(row.get::<i64>(0).unwrap(), 7);
        assert_eq!(row.get::<String>(1).unwrap(), "ada");
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let row = sample();
        assert!(row.get::<i64>(2).is_err());
    }

    #[test]
    fn column_lookup_by_name() {
        let row = sample();
        assert_eq!(row.column_index("name"), Some(1));
        assert_eq!(row.column_index("missing"), None);
    }
}
