//! Chainable query façade: [`ModelHandle`] (unbound) and [`Query`] (bound).

use crate::driver::{Driver, Executor, fetch_in_transaction};
use crate::error::{OrmError, OrmResult};
use crate::mapper::{FromInstance, Instance, Projection, ResultMapper};
use crate::model::{Model, Schema};
use crate::query::lookup::{Lookup, PATH_SEPARATOR};
use crate::query::predicate::{Predicate, SearchCondition};
use crate::query::resolve::{FieldResolver, RelationHop};
use crate::query::statement::{RenderedSql, StatementBuilder};
use crate::trace::{Operation, log_statement};
use crate::value::{FromValue, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// The default query handle of a model.
///
/// Immutable and cheap to clone; safe to share between tasks. Every chain
/// method returns a new [`Query`] that owns its own statement, so two chains
/// started from the same handle never see each other's conditions.
#[derive(Debug, Clone)]
pub struct ModelHandle {
    schema: Arc<Schema>,
    model: Arc<Model>,
}

impl ModelHandle {
    pub(crate) fn new(schema: Arc<Schema>, model: Arc<Model>) -> Self {
        Self { schema, model }
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// A fresh query with no conditions.
    pub fn query(&self) -> Query {
        Query::new(Arc::clone(&self.schema), Arc::clone(&self.model))
    }

    pub fn filter<I, C>(&self, conditions: I) -> Query
    where
        I: IntoIterator<Item = C>,
        C: Into<SearchCondition>,
    {
        self.query().filter(conditions)
    }

    pub fn exclude<I, C>(&self, conditions: I) -> Query
    where
        I: IntoIterator<Item = C>,
        C: Into<SearchCondition>,
    {
        self.query().exclude(conditions)
    }

    pub fn order_by<I, S>(&self, fields: I) -> Query
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.query().order_by(fields)
    }

    pub fn limit(&self, limit: i64) -> Query {
        self.query().limit(limit)
    }

    pub fn select_related<I, S>(&self, relations: I) -> Query
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.query().select_related(relations)
    }

    pub fn prefetch_related<I, S>(&self, relations: I) -> Query
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.query().prefetch_related(relations)
    }

    /// All rows of the model.
    pub async fn all<D: Driver>(&self, driver: &D) -> OrmResult<Vec<Instance>> {
        self.query().all(driver).await
    }

    /// Exactly one row matching `conditions`.
    pub async fn get<D, I, C>(&self, driver: &D, conditions: I) -> OrmResult<Instance>
    where
        D: Driver,
        I: IntoIterator<Item = C>,
        C: Into<SearchCondition>,
    {
        self.filter(conditions).get(driver).await
    }

    pub async fn count<D: Driver>(&self, driver: &D) -> OrmResult<i64> {
        self.query().count(driver).await
    }

    /// Insert one row and return it as stored (`RETURNING` every column).
    ///
    /// Keys are field or column names of this model. With no values the row
    /// is inserted with `DEFAULT VALUES`.
    pub async fn create<D, I, K, V>(&self, driver: &D, values: I) -> OrmResult<Instance>
    where
        D: Driver,
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let assignments = assignments(&self.model, values)?;
        let mut statement = StatementBuilder::new(self.model.table(), pk_column(&self.model));
        statement.set_returning(self.model.columns());
        let rendered = statement.render_insert(assignments);

        let projection = Projection::root(Arc::clone(&self.model));
        let mut rows = run_mutation(driver, Operation::Insert, &self.model, &rendered, &projection)
            .await?;
        match rows.len() {
            1 => Ok(rows.remove(0)),
            got => Err(OrmError::Other(format!(
                "insert into '{}' returned {} rows",
                self.model.table(),
                got
            ))),
        }
    }

    /// Update every row of the model.
    pub async fn update<D, I, K, V>(&self, driver: &D, values: I) -> OrmResult<Vec<Instance>>
    where
        D: Driver,
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.query().update(driver, values).await
    }

    /// Delete every row of the model.
    pub async fn delete<D: Driver>(&self, driver: &D) -> OrmResult<Vec<Instance>> {
        self.query().delete(driver).await
    }
}

/// A query bound to its own statement.
///
/// Chain methods consume and return the query. The first construction error
/// is kept and returned by the terminal operation (or [`Query::to_sql`])
/// before the driver is used; later chain calls are ignored once an error is
/// recorded.
#[derive(Debug, Clone)]
pub struct Query {
    schema: Arc<Schema>,
    model: Arc<Model>,
    statement: StatementBuilder,
    projection: Projection,
    error: Option<OrmError>,
}

impl Query {
    fn new(schema: Arc<Schema>, model: Arc<Model>) -> Self {
        let statement = StatementBuilder::new(model.table(), pk_column(&model));
        let projection = Projection::root(Arc::clone(&model));
        Self {
            schema,
            model,
            statement,
            projection,
            error: None,
        }
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// Construction error recorded so far, if any.
    pub fn error(&self) -> Option<&OrmError> {
        self.error.as_ref()
    }

    /// AND the conditions together and add them as one fragment.
    pub fn filter<I, C>(mut self, conditions: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<SearchCondition>,
    {
        let conditions: Vec<SearchCondition> = conditions.into_iter().map(Into::into).collect();
        self.record(|q| q.add_conditions(conditions, false));
        self
    }

    /// Like [`Query::filter`], wrapped in `NOT (...)`.
    pub fn exclude<I, C>(mut self, conditions: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<SearchCondition>,
    {
        let conditions: Vec<SearchCondition> = conditions.into_iter().map(Into::into).collect();
        self.record(|q| q.add_conditions(conditions, true));
        self
    }

    /// Ascending ORDER BY on field paths. Descending (`-field`) is not supported.
    pub fn order_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fields: Vec<String> = fields.into_iter().map(|f| f.as_ref().to_string()).collect();
        self.record(|q| {
            let resolver = FieldResolver::new(&q.schema, &q.model);
            let mut joins = q.statement.joins().clone();
            let mut exprs = Vec::with_capacity(fields.len());
            for field in &fields {
                if field.starts_with('-') {
                    return Err(OrmError::unsupported(format!(
                        "descending order ('{field}') is not supported"
                    )));
                }
                exprs.push(resolver.resolve_column(field, &mut joins)?.qualified_column());
            }
            q.statement.set_joins(joins);
            for expr in exprs {
                q.statement.add_order_by(expr);
            }
            Ok(())
        });
        self
    }

    /// LIMIT; the last call wins.
    pub fn limit(mut self, limit: i64) -> Self {
        self.record(|q| {
            if limit < 0 {
                return Err(OrmError::validation(format!(
                    "limit must not be negative, got {limit}"
                )));
            }
            q.statement.set_limit(limit);
            Ok(())
        });
        self
    }

    /// Load related models through INNER JOINs in the same round trip.
    ///
    /// `customer__wallet` loads both `customer` and `customer.wallet`.
    pub fn select_related<I, S>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let relations: Vec<String> = relations
            .into_iter()
            .map(|r| r.as_ref().to_string())
            .collect();
        self.record(|q| {
            let resolver = FieldResolver::new(&q.schema, &q.model);
            let mut joins = q.statement.joins().clone();
            let mut hops: Vec<RelationHop> = Vec::new();
            for relation in &relations {
                hops.extend(resolver.resolve_relation(relation, &mut joins)?);
            }
            q.statement.set_joins(joins);
            for hop in hops {
                q.projection.push_related(hop.path, hop.model);
            }
            Ok(())
        });
        self
    }

    /// Not supported: related sets would need a second round trip.
    pub fn prefetch_related<I, S>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let relations: Vec<String> = relations
            .into_iter()
            .map(|r| r.as_ref().to_string())
            .collect();
        self.record(|_| {
            Err(OrmError::unsupported(format!(
                "prefetch_related({}) is not supported yet",
                relations.join(", ")
            )))
        });
        self
    }

    /// The SELECT this query would run, without running it.
    pub fn to_sql(&self) -> OrmResult<RenderedSql> {
        self.check()?;
        Ok(self
            .statement
            .render_select(&self.projection.select_columns()))
    }

    /// The `SELECT COUNT(*)` this query would run.
    pub fn to_count_sql(&self) -> OrmResult<RenderedSql> {
        self.check()?;
        Ok(self.statement.render_count())
    }

    pub async fn all<D: Driver>(self, driver: &D) -> OrmResult<Vec<Instance>> {
        let rendered = self.to_sql()?;
        log_statement(
            Operation::Select,
            self.model.name(),
            &rendered.sql,
            rendered.param_count(),
        );
        let mut conn = driver.acquire().await?;
        let rows = conn.fetch(&rendered.sql, &rendered.values).await?;
        ResultMapper::new(&self.projection).map_rows(rows)
    }

    /// All rows, converted through [`FromInstance`].
    pub async fn all_as<T: FromInstance, D: Driver>(self, driver: &D) -> OrmResult<Vec<T>> {
        let instances = self.all(driver).await?;
        instances.iter().map(T::from_instance).collect()
    }

    /// Exactly one row: `NotFound` for none, `MultipleResults` for more.
    pub async fn get<D: Driver>(self, driver: &D) -> OrmResult<Instance> {
        let table = self.model.table().to_string();
        let mut rows = self.all(driver).await?;
        match rows.len() {
            0 => Err(OrmError::not_found(format!(
                "no row in '{table}' matches the query"
            ))),
            1 => Ok(rows.remove(0)),
            got => Err(OrmError::MultipleResults { table, got }),
        }
    }

    pub async fn get_as<T: FromInstance, D: Driver>(self, driver: &D) -> OrmResult<T> {
        let instance = self.get(driver).await?;
        T::from_instance(&instance)
    }

    /// Number of rows the query matches.
    pub async fn count<D: Driver>(self, driver: &D) -> OrmResult<i64> {
        let rendered = self.to_count_sql()?;
        log_statement(
            Operation::Count,
            self.model.name(),
            &rendered.sql,
            rendered.param_count(),
        );
        let mut conn = driver.acquire().await?;
        let rows = conn.fetch(&rendered.sql, &rendered.values).await?;
        let value = rows
            .first()
            .and_then(|row| row.get(0))
            .ok_or_else(|| OrmError::decode("count", "COUNT(*) returned no row"))?;
        i64::from_value(value).map_err(|e| OrmError::decode("count", e.to_string()))
    }

    /// `UPDATE ... SET` on the matched rows; returns the rows as updated.
    pub async fn update<D, I, K, V>(self, driver: &D, values: I) -> OrmResult<Vec<Instance>>
    where
        D: Driver,
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.check()?;
        let assignments = assignments(&self.model, values)?;
        let mut statement = self.statement;
        statement.set_returning(self.model.columns());
        let rendered = statement.render_update(assignments)?;
        if statement.targets_every_row() {
            tracing::warn!(
                target: "pgmapper.sql",
                model = self.model.name(),
                "UPDATE without WHERE affects every row"
            );
        }
        let projection = Projection::root(Arc::clone(&self.model));
        run_mutation(driver, Operation::Update, &self.model, &rendered, &projection).await
    }

    /// `DELETE` the matched rows; returns the deleted rows.
    pub async fn delete<D: Driver>(self, driver: &D) -> OrmResult<Vec<Instance>> {
        self.check()?;
        let mut statement = self.statement;
        statement.set_returning(self.model.columns());
        let rendered = statement.render_delete();
        if statement.targets_every_row() {
            tracing::warn!(
                target: "pgmapper.sql",
                model = self.model.name(),
                "DELETE without WHERE affects every row"
            );
        }
        let projection = Projection::root(Arc::clone(&self.model));
        run_mutation(driver, Operation::Delete, &self.model, &rendered, &projection).await
    }

    fn check(&self) -> OrmResult<()> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn record(&mut self, step: impl FnOnce(&mut Self) -> OrmResult<()>) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = step(self) {
            tracing::debug!(
                target: "pgmapper.sql",
                model = self.model.name(),
                error = %err,
                "query construction failed"
            );
            self.error = Some(err);
        }
    }

    fn add_conditions(&mut self, conditions: Vec<SearchCondition>, negated: bool) -> OrmResult<()> {
        let resolver = FieldResolver::new(&self.schema, &self.model);
        let mut joins = self.statement.joins().clone();
        let mut predicates = Vec::with_capacity(conditions.len());

        for condition in conditions {
            let (resolved, lookup) = match condition.lookup {
                Some(lookup) => (resolver.resolve_column(&condition.path, &mut joins)?, lookup),
                None => {
                    let resolved = resolver.resolve(&condition.path, &mut joins)?;
                    let lookup = resolved.lookup.unwrap_or(Lookup::Exact);
                    (resolved, lookup)
                }
            };
            predicates.push(Predicate {
                column: resolved.qualified_column(),
                path: condition.path,
                lookup,
                value: condition.value,
            });
        }

        self.statement.add_where(&predicates, negated)?;
        self.statement.set_joins(joins);
        Ok(())
    }
}

fn pk_column(model: &Model) -> &str {
    model.primary_key().column_name()
}

/// Resolve `(field, value)` pairs to `(column, value)` on the model itself.
fn assignments<I, K, V>(model: &Model, values: I) -> OrmResult<Vec<(String, Value)>>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<Value>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for (key, value) in values {
        let key = key.as_ref();
        let field = model.field(key).ok_or_else(|| {
            let segment = key.split(PATH_SEPARATOR).next().unwrap_or(key);
            OrmError::unknown_field(key, segment, model.name())
        })?;
        if !seen.insert(field.column_name().to_string()) {
            return Err(OrmError::validation(format!(
                "field '{}' is assigned twice on model '{}'",
                field.name(),
                model.name()
            )));
        }
        out.push((field.column_name().to_string(), value.into()));
    }
    Ok(out)
}

async fn run_mutation<D: Driver>(
    driver: &D,
    op: Operation,
    model: &Model,
    rendered: &RenderedSql,
    projection: &Projection,
) -> OrmResult<Vec<Instance>> {
    log_statement(op, model.name(), &rendered.sql, rendered.param_count());
    let mut conn = driver.acquire().await?;
    let rows = fetch_in_transaction(&mut conn, &rendered.sql, &rendered.values).await?;
    ResultMapper::new(projection).map_rows(rows)
}
