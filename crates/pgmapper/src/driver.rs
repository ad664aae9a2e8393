//! Driver contract consumed by the query layer.
//!
//! The query layer never talks to a socket itself. A [`Driver`] hands out
//! [`Connection`]s; a connection runs parameterized SQL and demarcates
//! transactions. `PgDriver` (feature `pool`) implements this over
//! `deadpool-postgres`, tests use an in-memory implementation.

use crate::error::OrmResult;
use crate::value::Value;
use std::future::Future;

/// One result row: column names and positional values.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Record {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `idx`.
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Value of the first column named `name`.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|idx| self.values.get(idx))
    }
}

/// Runs parameterized SQL (`$1`, `$2`, ...).
pub trait Executor: Send {
    /// Run a statement and return all rows.
    fn fetch(
        &mut self,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = OrmResult<Vec<Record>>> + Send;

    /// Run a statement and return the number of affected rows.
    fn execute(
        &mut self,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = OrmResult<u64>> + Send;
}

/// A connection checked out from a [`Driver`].
pub trait Connection: Executor {
    fn begin(&mut self) -> impl Future<Output = OrmResult<()>> + Send;

    fn commit(&mut self) -> impl Future<Output = OrmResult<()>> + Send;

    fn rollback(&mut self) -> impl Future<Output = OrmResult<()>> + Send;

    /// Called when a transaction is dropped without commit or rollback, for
    /// example when the owning task was cancelled mid-statement.
    ///
    /// The connection must not be reused in that state. The default does nothing.
    fn abandon(&mut self) {}
}

/// Hands out connections.
pub trait Driver: Send + Sync {
    type Conn: Connection;

    fn acquire(&self) -> impl Future<Output = OrmResult<Self::Conn>> + Send;
}

/// An open transaction on a borrowed connection.
///
/// Dropping the scope while it is still open calls [`Connection::abandon`].
pub struct TransactionScope<'c, C: Connection> {
    conn: &'c mut C,
    open: bool,
}

impl<'c, C: Connection> TransactionScope<'c, C> {
    /// `BEGIN` on `conn`.
    ///
    /// The scope counts as open before `BEGIN` is sent, so a failed or
    /// cancelled `BEGIN` also abandons the connection.
    pub async fn begin(conn: &'c mut C) -> OrmResult<Self> {
        let mut scope = Self { conn, open: true };
        scope.conn.begin().await?;
        Ok(scope)
    }

    pub async fn fetch(&mut self, sql: &str, params: &[Value]) -> OrmResult<Vec<Record>> {
        self.conn.fetch(sql, params).await
    }

    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        self.conn.execute(sql, params).await
    }

    pub async fn commit(mut self) -> OrmResult<()> {
        self.conn.commit().await?;
        self.open = false;
        Ok(())
    }

    pub async fn rollback(mut self) -> OrmResult<()> {
        self.conn.rollback().await?;
        self.open = false;
        Ok(())
    }
}

impl<C: Connection> Drop for TransactionScope<'_, C> {
    fn drop(&mut self) {
        if self.open {
            tracing::warn!(
                target: "pgmapper.sql",
                "transaction dropped while open; abandoning connection"
            );
            self.conn.abandon();
        }
    }
}

/// Run one row-returning statement in its own transaction.
///
/// Commits on success. On failure rolls back and returns the statement's
/// error unchanged; a failed rollback is logged and the connection abandoned.
pub async fn fetch_in_transaction<C: Connection>(
    conn: &mut C,
    sql: &str,
    params: &[Value],
) -> OrmResult<Vec<Record>> {
    let mut tx = TransactionScope::begin(conn).await?;
    match tx.fetch(sql, params).await {
        Ok(rows) => {
            tx.commit().await?;
            Ok(rows)
        }
        Err(err) => match tx.rollback().await {
            Ok(()) => Err(err),
            Err(rollback_err) => {
                tracing::warn!(
                    target: "pgmapper.sql",
                    error = %err,
                    rollback_error = %rollback_err,
                    "rollback failed"
                );
                Err(err)
            }
        },
    }
}
