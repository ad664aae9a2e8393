//! `tracing` events for executed statements.
//!
//! Every terminal operation logs the SQL it is about to send on the
//! `pgmapper.sql` target before the driver is called.

use std::fmt;

/// Maximum SQL length (in bytes) written to a log event.
pub const MAX_LOGGED_SQL: usize = 200;

/// The kind of statement a terminal operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Select,
    Count,
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Select => "select",
            Operation::Count => "count",
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn log_statement(op: Operation, model: &str, sql: &str, param_count: usize) {
    tracing::debug!(
        target: "pgmapper.sql",
        op = %op,
        model,
        param_count,
        sql = %truncate_sql(sql, MAX_LOGGED_SQL),
    );
}

/// Truncate on a char boundary, appending `...` when shortened.
pub(crate) fn truncate_sql(sql: &str, max_bytes: usize) -> String {
    if sql.len() <= max_bytes {
        return sql.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &sql[..end])
}
