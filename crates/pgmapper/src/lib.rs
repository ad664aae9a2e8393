//! # pgmapper
//!
//! A PostgreSQL data mapper built around an explicit model registry.
//!
//! ## Features
//!
//! - **Explicit registration**: models are plain values validated once by [`Schema::builder`]
//! - **Lookup paths**: `filter([("customer__name", "Ada")])`, `total__gte`, `id__in`, `shipped_at__isnull`
//! - **Joins from paths**: traversing a foreign key adds one deduplicated `INNER JOIN`
//! - **Numbered parameters**: every value is bound as `$n`, numbered once per statement
//! - **No silent fallbacks**: unknown fields and lookups are errors, raised before any I/O
//! - **Driver seam**: queries run through the [`Driver`] trait; [`PgDriver`] uses `deadpool-postgres`
//!
//! ## Example
//!
//! ```ignore
//! use pgmapper::{Field, ModelDef, PgDriver, Schema, create_pool};
//!
//! let schema = Schema::builder()
//!     .model(ModelDef::new("Customer").field(Field::text("name")))
//!     .model(
//!         ModelDef::new("Order")
//!             .field(Field::foreign_key("customer", "Customer"))
//!             .field(Field::integer("total")),
//!     )
//!     .build()?;
//!
//! let driver = PgDriver::new(create_pool("postgres://localhost/shop")?);
//! let customers = schema.handle("Customer")?;
//! let orders = schema.handle("Order")?;
//!
//! let ada = customers.create(&driver, [("name", "Ada")]).await?;
//! orders.create(&driver, [("customer", ada.pk().clone()), ("total", 120.into())]).await?;
//!
//! let big = orders
//!     .filter([("customer__name", "Ada")])
//!     .filter([("total__gte", 100)])
//!     .select_related(["customer"])
//!     .all(&driver)
//!     .await?;
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod mapper;
pub mod model;
pub mod query;
pub mod trace;
pub mod value;

#[cfg(feature = "pool")]
pub mod pg;
#[cfg(feature = "pool")]
pub mod pool;

pub use config::DatabaseConfig;
pub use driver::{Connection, Driver, Executor, Record, TransactionScope, fetch_in_transaction};
pub use error::{OrmError, OrmResult};
pub use mapper::{FromInstance, Instance, Projection, ResultMapper};
pub use model::{Field, FieldType, Model, ModelDef, OnDelete, ReverseRelation, Schema, SchemaBuilder};
pub use query::{
    Lookup, ModelHandle, PredicateCompiler, Query, RenderedSql, SearchCondition, StatementBuilder,
};
pub use value::{FromValue, Value};

#[cfg(feature = "pool")]
pub use pg::{PgConnection, PgDriver};
#[cfg(feature = "pool")]
pub use pool::{create_pool, create_pool_from_config, create_pool_with_tls};
