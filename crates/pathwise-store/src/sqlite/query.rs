//! `WHERE` clause builder and list limits.
//!
//! [`Filter`] collects predicates and their bound values in order, using
//! anonymous `?` placeholders. [`Filter::is`] emits `col IS ?`, the
//! NULL-distinct comparison used for nullable scope and owner columns;
//! [`Filter::eq`] emits plain `=`.

use rusqlite::types::Value;

/// Default page size for list operations.
pub const DEFAULT_LIMIT: i64 = 500;

/// Upper bound on any list operation's page size.
pub const MAX_LIMIT: i64 = 1000;

/// Clamp a caller-supplied limit: absent or non-positive means
/// [`DEFAULT_LIMIT`], anything above [`MAX_LIMIT`] is capped.
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    match limit {
        Some(n) if n > 0 => n.min(MAX_LIMIT),
        _ => DEFAULT_LIMIT,
    }
}

/// Conjunction of predicates with their bound values.
#[derive(Debug, Default, Clone)]
pub struct Filter {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl Filter {
    /// Empty filter (matches every row).
    pub fn new() -> Self {
        Self::default()
    }

    /// `col = ?`
    #[must_use]
    pub fn eq(mut self, col: &str, value: Value) -> Self {
        self.clauses.push(format!("{col} = ?"));
        self.params.push(value);
        self
    }

    /// `col IS ?` (NULL-distinct equality).
    #[must_use]
    pub fn is(mut self, col: &str, value: Value) -> Self {
        self.clauses.push(format!("{col} IS ?"));
        self.params.push(value);
        self
    }

    /// `col IN (?, ...)`. An empty set matches nothing.
    #[must_use]
    pub fn any_of(mut self, col: &str, values: Vec<Value>) -> Self {
        if values.is_empty() {
            self.clauses.push("0".to_string());
            return self;
        }
        let marks = vec!["?"; values.len()].join(", ");
        self.clauses.push(format!("{col} IN ({marks})"));
        self.params.extend(values);
        self
    }

    /// Live rows only.
    #[must_use]
    pub fn live(mut self) -> Self {
        self.clauses.push("deleted_at IS NULL".to_string());
        self
    }

    /// Arbitrary predicate with its values, parenthesized.
    #[must_use]
    pub fn raw(mut self, clause: &str, values: impl IntoIterator<Item = Value>) -> Self {
        self.clauses.push(format!("({clause})"));
        self.params.extend(values);
        self
    }

    /// Conjunction with every predicate of `other`.
    #[must_use]
    pub fn and(mut self, other: Filter) -> Self {
        self.clauses.extend(other.clauses);
        self.params.extend(other.params);
        self
    }

    /// Whether no predicate was added.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// ` WHERE a AND b`, or an empty string.
    pub fn sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    /// Bound values in placeholder order.
    pub fn params(&self) -> &[Value] {
        &self.params
    }
}
