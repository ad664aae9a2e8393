//! Query construction: lookups, path resolution, predicate compilation,
//! statement rendering and the chainable [`ModelHandle`]/[`Query`] façade.
//!
//! ```ignore
//! let orders = schema.handle("Order")?;
//! let big = orders
//!     .filter([("customer__name", Value::from("Ada")), ("total__gte", Value::from(100))])
//!     .exclude([SearchCondition::is_null("shipped_at", true)])
//!     .order_by(["total"])
//!     .limit(10)
//!     .all(&driver)
//!     .await?;
//! ```

mod builder;
pub mod lookup;
mod predicate;
mod resolve;
mod statement;

pub use builder::{ModelHandle, Query};
pub use lookup::{LOOKUPS, Lookup, PATH_SEPARATOR};
pub use predicate::{CompiledPredicate, Predicate, PredicateCompiler, SearchCondition};
pub use resolve::{FieldResolver, Join, JoinSet, RelationHop, ResolvedField};
pub use statement::{RenderedSql, StatementBuilder};
