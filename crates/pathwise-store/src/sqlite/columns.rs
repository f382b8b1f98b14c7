//! Column encoding helpers.
//!
//! Binding goes through [`rusqlite::types::Value`] so a row can be bound as
//! a dynamic parameter list. Reading goes through [`RowReader`], which walks
//! a `SELECT` column list in order and reports decode failures as
//! [`StoreError::CorruptRow`] with the offending column name.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Value;

use crate::errors::{Result, StoreError};
use crate::ids::{Id, parse_id};
use crate::time;

// ─── Binding ────────────────────────────────────────────────────────────────

/// Bind an identifier.
pub fn id(id: &Id) -> Value {
    Value::Text(id.to_string())
}

/// Bind an optional identifier (`NULL` when absent).
pub fn opt_id(id: Option<&Id>) -> Value {
    id.map_or(Value::Null, self::id)
}

/// Bind an instant.
pub fn ts(t: &DateTime<Utc>) -> Value {
    Value::Text(time::encode(t))
}

/// Bind an optional instant.
pub fn opt_ts(t: Option<&DateTime<Utc>>) -> Value {
    t.map_or(Value::Null, ts)
}

/// Bind a JSON document as text.
pub fn json(v: &serde_json::Value) -> Value {
    Value::Text(v.to_string())
}

/// Bind text.
pub fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

/// Bind optional text.
pub fn opt_text(s: Option<&str>) -> Value {
    s.map_or(Value::Null, text)
}

/// Bind an optional opaque byte vector.
pub fn opt_blob(b: Option<&[u8]>) -> Value {
    b.map_or(Value::Null, |b| Value::Blob(b.to_vec()))
}

// ─── Reading ────────────────────────────────────────────────────────────────

/// Sequential reader over one result row.
pub struct RowReader<'r, 's> {
    row: &'r Row<'s>,
    table: &'static str,
    columns: &'static [&'static str],
    offset: usize,
    idx: usize,
}

impl<'r, 's> RowReader<'r, 's> {
    /// Reader whose first column maps to `columns[0]`, starting at `offset`
    /// in the row.
    pub fn new(
        row: &'r Row<'s>,
        table: &'static str,
        columns: &'static [&'static str],
        offset: usize,
    ) -> Self {
        Self {
            row,
            table,
            columns,
            offset,
            idx: 0,
        }
    }

    fn advance(&mut self) -> (usize, &'static str) {
        let name = self.columns.get(self.idx).copied().unwrap_or("?");
        let pos = self.offset + self.idx;
        self.idx += 1;
        (pos, name)
    }

    fn get<T: rusqlite::types::FromSql>(&mut self) -> Result<(T, &'static str)> {
        let (pos, name) = self.advance();
        let value = self
            .row
            .get::<_, T>(pos)
            .map_err(|e| StoreError::corrupt(self.table, name, e))?;
        Ok((value, name))
    }

    /// Next column as an identifier.
    pub fn id(&mut self) -> Result<Id> {
        let (raw, name) = self.get::<String>()?;
        parse_id(&raw).ok_or_else(|| StoreError::corrupt(self.table, name, "invalid uuid"))
    }

    /// Next column as an optional identifier.
    pub fn opt_id(&mut self) -> Result<Option<Id>> {
        let (raw, name) = self.get::<Option<String>>()?;
        raw.map(|raw| {
            parse_id(&raw).ok_or_else(|| StoreError::corrupt(self.table, name, "invalid uuid"))
        })
        .transpose()
    }

    /// Next column as an instant.
    pub fn ts(&mut self) -> Result<DateTime<Utc>> {
        let (raw, name) = self.get::<String>()?;
        time::decode(&raw).ok_or_else(|| StoreError::corrupt(self.table, name, "invalid timestamp"))
    }

    /// Next column as an optional instant.
    pub fn opt_ts(&mut self) -> Result<Option<DateTime<Utc>>> {
        let (raw, name) = self.get::<Option<String>>()?;
        raw.map(|raw| {
            time::decode(&raw)
                .ok_or_else(|| StoreError::corrupt(self.table, name, "invalid timestamp"))
        })
        .transpose()
    }

    /// Next column as text.
    pub fn text(&mut self) -> Result<String> {
        Ok(self.get::<String>()?.0)
    }

    /// Next column as optional text.
    pub fn opt_text(&mut self) -> Result<Option<String>> {
        Ok(self.get::<Option<String>>()?.0)
    }

    /// Next column as an integer.
    pub fn int(&mut self) -> Result<i64> {
        Ok(self.get::<i64>()?.0)
    }

    /// Next column as an optional integer.
    pub fn opt_int(&mut self) -> Result<Option<i64>> {
        Ok(self.get::<Option<i64>>()?.0)
    }

    /// Next column as a float.
    pub fn real(&mut self) -> Result<f64> {
        Ok(self.get::<f64>()?.0)
    }

    /// Next column as a JSON document.
    pub fn json(&mut self) -> Result<serde_json::Value> {
        Ok(self.get::<serde_json::Value>()?.0)
    }

    /// Next column as optional bytes.
    pub fn opt_blob(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.get::<Option<Vec<u8>>>()?.0)
    }
}
