//! Field path resolution and the join requirements it produces.

use crate::error::{OrmError, OrmResult};
use crate::model::{Field, Model, Schema};
use crate::query::lookup::{Lookup, PATH_SEPARATOR};
use std::sync::Arc;

/// An `INNER JOIN` required by a resolved path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    /// Joined table.
    pub table: String,
    /// Join condition, e.g. `customers.id = orders.customer_id`.
    pub on: String,
}

impl Join {
    /// The join that follows `fk` from `from` to `target`'s primary key.
    pub fn for_foreign_key(from: &Model, fk: &Field, target: &Model) -> Self {
        Self {
            table: target.table().to_string(),
            on: format!(
                "{}.{} = {}.{}",
                target.table(),
                target.primary_key().column_name(),
                from.table(),
                fk.column_name()
            ),
        }
    }

    pub fn to_sql(&self) -> String {
        format!("INNER JOIN {} ON {}", self.table, self.on)
    }
}

/// Joins of one statement, deduplicated by `(table, condition)`.
///
/// Tables are referenced by name, so a table can be joined through one
/// condition only, and never onto the statement's own table.
#[derive(Debug, Clone)]
pub struct JoinSet {
    root_table: String,
    joins: Vec<Join>,
}

impl JoinSet {
    pub fn new(root_table: impl Into<String>) -> Self {
        Self {
            root_table: root_table.into(),
            joins: Vec::new(),
        }
    }

    /// Add a join unless an identical one is present. Returns whether it was added.
    pub fn add(&mut self, join: Join) -> OrmResult<bool> {
        if join.table == self.root_table {
            return Err(OrmError::unsupported(format!(
                "joining '{}' onto itself ({}) requires table aliases",
                join.table, join.on
            )));
        }
        match self.joins.iter().find(|j| j.table == join.table) {
            Some(existing) if existing.on == join.on => Ok(false),
            Some(existing) => Err(OrmError::unsupported(format!(
                "table '{}' is already joined on '{}', cannot join it again on '{}'",
                join.table, existing.on, join.on
            ))),
            None => {
                self.joins.push(join);
                Ok(true)
            }
        }
    }

    pub fn root_table(&self) -> &str {
        &self.root_table
    }

    pub fn iter(&self) -> impl Iterator<Item = &Join> {
        self.joins.iter()
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// ` INNER JOIN ... ON ...` for every join, in insertion order.
    pub fn to_sql(&self) -> String {
        self.joins
            .iter()
            .map(|j| format!(" {}", j.to_sql()))
            .collect()
    }
}

/// A path resolved down to one column.
#[derive(Debug, Clone)]
pub struct ResolvedField {
    /// Model that owns the column.
    pub model: Arc<Model>,
    pub field: Field,
    /// Lookup taken from the path suffix, if the path had one.
    pub lookup: Option<Lookup>,
}

impl ResolvedField {
    /// `table.column`
    pub fn qualified_column(&self) -> String {
        format!("{}.{}", self.model.table(), self.field.column_name())
    }
}

/// One relation reached by a `select_related` path.
#[derive(Debug, Clone)]
pub struct RelationHop {
    /// Relationship field names from the root, e.g. `["customer", "wallet"]`.
    pub path: Vec<String>,
    pub model: Arc<Model>,
}

/// Resolves `__`-separated paths against a model.
pub struct FieldResolver<'a> {
    schema: &'a Schema,
    model: &'a Arc<Model>,
}

impl<'a> FieldResolver<'a> {
    pub fn new(schema: &'a Schema, model: &'a Arc<Model>) -> Self {
        Self { schema, model }
    }

    /// Resolve a path that may end in a lookup suffix (`customer__name__gte`).
    pub fn resolve(&self, path: &str, joins: &mut JoinSet) -> OrmResult<ResolvedField> {
        self.walk(path, joins, true)
    }

    /// Resolve a path that must end on a column (ordering, explicit conditions).
    pub fn resolve_column(&self, path: &str, joins: &mut JoinSet) -> OrmResult<ResolvedField> {
        self.walk(path, joins, false)
    }

    /// Resolve a path made only of foreign keys, returning every model reached.
    pub fn resolve_relation(&self, path: &str, joins: &mut JoinSet) -> OrmResult<Vec<RelationHop>> {
        let segments = split_path(path, self.model)?;
        let mut current = Arc::clone(self.model);
        let mut hops = Vec::with_capacity(segments.len());
        let mut prefix = Vec::with_capacity(segments.len());

        for segment in segments {
            let field = current
                .field(segment)
                .ok_or_else(|| OrmError::unknown_field(path, segment, current.name()))?;
            let target = self.schema.related_model(field).ok_or_else(|| {
                OrmError::validation(format!(
                    "'{}' on model '{}' is not a foreign key (in '{}')",
                    segment,
                    current.name(),
                    path
                ))
            })?;
            joins.add(Join::for_foreign_key(&current, field, target))?;
            prefix.push(field.name().to_string());
            hops.push(RelationHop {
                path: prefix.clone(),
                model: Arc::clone(target),
            });
            current = Arc::clone(target);
        }
        Ok(hops)
    }

    fn walk(&self, path: &str, joins: &mut JoinSet, allow_lookup: bool) -> OrmResult<ResolvedField> {
        // A declared name always wins over segment parsing.
        if let Some(field) = self.model.field(path) {
            return Ok(ResolvedField {
                model: Arc::clone(self.model),
                field: field.clone(),
                lookup: None,
            });
        }

        let segments = split_path(path, self.model)?;
        let mut current = Arc::clone(self.model);
        let mut idx = 0;

        loop {
            let segment = segments[idx];
            let field = current
                .field(segment)
                .ok_or_else(|| OrmError::unknown_field(path, segment, current.name()))?;
            let rest = &segments[idx + 1..];

            let Some(&next) = rest.first() else {
                return Ok(ResolvedField {
                    model: Arc::clone(&current),
                    field: field.clone(),
                    lookup: None,
                });
            };

            if let Some(target) = self.schema.related_model(field) {
                if target.field(next).is_some() {
                    joins.add(Join::for_foreign_key(&current, field, target))?;
                    current = Arc::clone(target);
                    idx += 1;
                    continue;
                }
                // `customer__in`: a lookup on the foreign key column itself.
                if rest.len() == 1 && allow_lookup {
                    if let Some(lookup) = Lookup::from_suffix(next) {
                        return Ok(ResolvedField {
                            model: Arc::clone(&current),
                            field: field.clone(),
                            lookup: Some(lookup),
                        });
                    }
                }
                return Err(OrmError::unknown_field(path, next, target.name()));
            }

            if rest.len() == 1 && allow_lookup {
                return match Lookup::from_suffix(next) {
                    Some(lookup) => Ok(ResolvedField {
                        model: Arc::clone(&current),
                        field: field.clone(),
                        lookup: Some(lookup),
                    }),
                    None => Err(OrmError::unsupported_lookup(next, path)),
                };
            }
            return Err(OrmError::unknown_field(path, next, current.name()));
        }
    }
}

fn split_path<'p>(path: &'p str, model: &Model) -> OrmResult<Vec<&'p str>> {
    let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(OrmError::unknown_field(path, "", model.name()));
    }
    Ok(segments)
}
