//! One SQL statement accumulator and its renderers.

use crate::error::{OrmError, OrmResult};
use crate::query::predicate::{Predicate, PredicateCompiler};
use crate::query::resolve::JoinSet;
use crate::value::Value;

/// Rendered SQL and the values bound to `$1..$n`, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSql {
    pub sql: String,
    pub values: Vec<Value>,
}

impl RenderedSql {
    /// Number of bound values (equal to the highest placeholder number).
    pub fn param_count(&self) -> usize {
        self.values.len()
    }
}

/// Accumulates WHERE fragments, joins, ordering and a limit for one table.
///
/// The placeholder counter is the number of WHERE values bound so far, so a
/// fragment added next starts at `counter + 1`. The limit, and for UPDATE the
/// SET values, are numbered after the WHERE values at render time.
#[derive(Debug, Clone)]
pub struct StatementBuilder {
    table: String,
    pk_column: String,
    joins: JoinSet,
    wheres: Vec<String>,
    values: Vec<Value>,
    order_by: Vec<String>,
    limit: Option<i64>,
    returning: Vec<String>,
}

impl StatementBuilder {
    pub fn new(table: impl Into<String>, pk_column: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            joins: JoinSet::new(table.clone()),
            table,
            pk_column: pk_column.into(),
            wheres: Vec::new(),
            values: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            returning: Vec::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn joins(&self) -> &JoinSet {
        &self.joins
    }

    /// Replace the join set (used after resolving paths against a copy).
    pub fn set_joins(&mut self, joins: JoinSet) {
        self.joins = joins;
    }

    /// Current placeholder counter.
    pub fn placeholder_count(&self) -> usize {
        self.values.len()
    }

    pub fn has_where(&self) -> bool {
        !self.wheres.is_empty()
    }

    /// True when an UPDATE or DELETE would touch every row: no WHERE, no LIMIT.
    pub fn targets_every_row(&self) -> bool {
        self.wheres.is_empty() && self.limit.is_none()
    }

    /// Compile `predicates` as one fragment numbered from the current counter.
    ///
    /// On error nothing is added. An empty predicate set adds nothing.
    pub fn add_where(&mut self, predicates: &[Predicate], negated: bool) -> OrmResult<()> {
        let compiled = PredicateCompiler::compile(predicates, negated, self.values.len() + 1)?;
        if let Some(compiled) = compiled {
            self.wheres.push(compiled.sql);
            self.values.extend(compiled.values);
        }
        Ok(())
    }

    /// Append an ORDER BY expression. Duplicates are kept.
    pub fn add_order_by(&mut self, expr: impl Into<String>) {
        self.order_by.push(expr.into());
    }

    /// Set the LIMIT; the last call wins.
    pub fn set_limit(&mut self, limit: i64) {
        self.limit = Some(limit);
    }

    pub fn limit(&self) -> Option<i64> {
        self.limit
    }

    /// Columns listed in `RETURNING` for INSERT, UPDATE and DELETE.
    pub fn set_returning<I, S>(&mut self, columns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returning = columns.into_iter().map(Into::into).collect();
    }

    /// `SELECT <columns> FROM t [joins] [WHERE] [ORDER BY] [LIMIT $n]`
    pub fn render_select(&self, columns: &[String]) -> RenderedSql {
        let mut values = self.values.clone();
        let sql = format!(
            "SELECT {} FROM {}{}",
            columns.join(", "),
            self.table,
            self.render_tail(&mut values, true)
        );
        RenderedSql { sql, values }
    }

    /// `SELECT COUNT(*)` over the same rows `render_select` would return.
    pub fn render_count(&self) -> RenderedSql {
        let mut values = self.values.clone();
        let sql = if self.limit.is_some() {
            format!(
                "SELECT COUNT(*) FROM (SELECT 1 FROM {}{}) AS counted",
                self.table,
                self.render_tail(&mut values, true)
            )
        } else {
            format!(
                "SELECT COUNT(*) FROM {}{}",
                self.table,
                self.render_tail(&mut values, false)
            )
        };
        RenderedSql { sql, values }
    }

    /// `INSERT INTO t (cols) VALUES ($1, ..) RETURNING ...`, or
    /// `INSERT INTO t DEFAULT VALUES RETURNING ...` when no column is given.
    pub fn render_insert(&self, assignments: Vec<(String, Value)>) -> RenderedSql {
        if assignments.is_empty() {
            return RenderedSql {
                sql: format!(
                    "INSERT INTO {} DEFAULT VALUES{}",
                    self.table,
                    self.render_returning()
                ),
                values: Vec::new(),
            };
        }

        let mut columns = Vec::with_capacity(assignments.len());
        let mut placeholders = Vec::with_capacity(assignments.len());
        let mut values = Vec::with_capacity(assignments.len());
        for (idx, (column, value)) in assignments.into_iter().enumerate() {
            columns.push(column);
            placeholders.push(format!("${}", idx + 1));
            values.push(value);
        }
        RenderedSql {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({}){}",
                self.table,
                columns.join(", "),
                placeholders.join(", "),
                self.render_returning()
            ),
            values,
        }
    }

    /// `UPDATE t SET col = $n, .. [WHERE ..] RETURNING ..`
    ///
    /// SET values are numbered after the WHERE values.
    pub fn render_update(&self, assignments: Vec<(String, Value)>) -> OrmResult<RenderedSql> {
        if assignments.is_empty() {
            return Err(OrmError::validation(format!(
                "update on '{}' has no fields to set",
                self.table
            )));
        }

        let mut values = self.values.clone();
        let filter = self.render_mutation_filter(&mut values);
        let mut sets = Vec::with_capacity(assignments.len());
        for (column, value) in assignments {
            values.push(value);
            sets.push(format!("{} = ${}", column, values.len()));
        }

        Ok(RenderedSql {
            sql: format!(
                "UPDATE {} SET {}{}{}",
                self.table,
                sets.join(", "),
                filter,
                self.render_returning()
            ),
            values,
        })
    }

    /// `DELETE FROM t [WHERE ..] RETURNING ..`
    pub fn render_delete(&self) -> RenderedSql {
        let mut values = self.values.clone();
        let filter = self.render_mutation_filter(&mut values);
        RenderedSql {
            sql: format!(
                "DELETE FROM {}{}{}",
                self.table,
                filter,
                self.render_returning()
            ),
            values,
        }
    }

    /// Joins, WHERE, ORDER BY and (optionally) LIMIT, each with a leading space.
    fn render_tail(&self, values: &mut Vec<Value>, with_order_and_limit: bool) -> String {
        let mut sql = self.joins.to_sql();
        if !self.wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.wheres.join(" AND "));
        }
        if !with_order_and_limit {
            return sql;
        }
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }
        if let Some(limit) = self.limit {
            values.push(Value::Int(limit));
            sql.push_str(&format!(" LIMIT ${}", values.len()));
        }
        sql
    }

    /// WHERE clause for UPDATE/DELETE. Postgres has no JOIN, ORDER BY or
    /// LIMIT there, so those go through a primary key subquery.
    fn render_mutation_filter(&self, values: &mut Vec<Value>) -> String {
        let needs_subquery =
            !self.joins.is_empty() || !self.order_by.is_empty() || self.limit.is_some();
        if needs_subquery {
            let pk = format!("{}.{}", self.table, self.pk_column);
            format!(
                " WHERE {pk} IN (SELECT {pk} FROM {}{})",
                self.table,
                self.render_tail(values, true)
            )
        } else if self.wheres.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.wheres.join(" AND "))
        }
    }

    fn render_returning(&self) -> String {
        if self.returning.is_empty() {
            String::new()
        } else {
            format!(" RETURNING {}", self.returning.join(", "))
        }
    }
}
