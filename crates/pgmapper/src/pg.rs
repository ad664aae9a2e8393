//! [`Driver`] implementation over a `deadpool-postgres` pool.

use crate::driver::{Connection, Driver, Executor, Record};
use crate::error::{OrmError, OrmResult};
use crate::value::Value;
use deadpool_postgres::{Object, Pool};
use tokio_postgres::Row;
use tokio_postgres::types::{ToSql, Type};

/// Driver backed by a connection pool.
#[derive(Clone)]
pub struct PgDriver {
    pool: Pool,
}

impl PgDriver {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

impl Driver for PgDriver {
    type Conn = PgConnection;

    async fn acquire(&self) -> OrmResult<PgConnection> {
        let client = self.pool.get().await?;
        Ok(PgConnection {
            client: Some(client),
        })
    }
}

/// A pooled connection. Returned to the pool on drop unless abandoned.
pub struct PgConnection {
    client: Option<Object>,
}

impl PgConnection {
    fn client(&self) -> OrmResult<&Object> {
        self.client
            .as_ref()
            .ok_or_else(|| OrmError::Connection("connection was abandoned".to_string()))
    }
}

impl Executor for PgConnection {
    async fn fetch(&mut self, sql: &str, params: &[Value]) -> OrmResult<Vec<Record>> {
        let client = self.client()?;
        let params: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
        let rows = client
            .query(sql, &params)
            .await
            .map_err(OrmError::from_db_error)?;
        rows.iter().map(convert_row).collect()
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        let client = self.client()?;
        let params: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
        client
            .execute(sql, &params)
            .await
            .map_err(OrmError::from_db_error)
    }
}

impl Connection for PgConnection {
    async fn begin(&mut self) -> OrmResult<()> {
        self.client()?
            .batch_execute("BEGIN")
            .await
            .map_err(OrmError::from_db_error)
    }

    async fn commit(&mut self) -> OrmResult<()> {
        self.client()?
            .batch_execute("COMMIT")
            .await
            .map_err(OrmError::from_db_error)
    }

    async fn rollback(&mut self) -> OrmResult<()> {
        self.client()?
            .batch_execute("ROLLBACK")
            .await
            .map_err(OrmError::from_db_error)
    }

    /// Detach from the pool; closing the socket makes the server roll back.
    fn abandon(&mut self) {
        if let Some(client) = self.client.take() {
            drop(Object::take(client));
        }
    }
}

fn convert_row(row: &Row) -> OrmResult<Record> {
    let columns: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let values = row
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| convert_value(row, idx, col.type_(), col.name()))
        .collect::<OrmResult<Vec<_>>>()?;
    Ok(Record::new(columns, values))
}

fn convert_value(row: &Row, idx: usize, ty: &Type, name: &str) -> OrmResult<Value> {
    macro_rules! get {
        ($t:ty, $wrap:expr) => {
            row.try_get::<_, Option<$t>>(idx)
                .map_err(|e| OrmError::decode(name, e.to_string()))?
                .map_or(Value::Null, $wrap)
        };
    }

    let value = match *ty {
        Type::BOOL => get!(bool, Value::Bool),
        Type::INT2 => get!(i16, |v| Value::Int(i64::from(v))),
        Type::INT4 => get!(i32, |v| Value::Int(i64::from(v))),
        Type::INT8 => get!(i64, Value::Int),
        Type::FLOAT4 => get!(f32, |v| Value::Float(f64::from(v))),
        Type::FLOAT8 => get!(f64, Value::Float),
        Type::NUMERIC => get!(rust_decimal::Decimal, Value::Decimal),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => get!(String, Value::Text),
        Type::BYTEA => get!(Vec<u8>, Value::Bytes),
        Type::UUID => get!(uuid::Uuid, Value::Uuid),
        Type::DATE => get!(chrono::NaiveDate, Value::Date),
        Type::TIME => get!(chrono::NaiveTime, Value::Time),
        Type::TIMESTAMP => get!(chrono::NaiveDateTime, Value::Timestamp),
        Type::TIMESTAMPTZ => get!(chrono::DateTime<chrono::Utc>, Value::TimestampTz),
        Type::JSON | Type::JSONB => get!(serde_json::Value, Value::Json),
        _ => {
            return Err(OrmError::decode(
                name,
                format!("unsupported column type '{ty}'"),
            ));
        }
    };
    Ok(value)
}
