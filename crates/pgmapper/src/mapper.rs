//! Row decomposition into model instances.
//!
//! A [`Projection`] records which model owns each selected position, grouped
//! by relation path. Rows are split positionally against it; column aliases
//! are never parsed.

use crate::driver::Record;
use crate::error::{OrmError, OrmResult};
use crate::model::Model;
use crate::value::{FromValue, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Columns of one model inside a projection.
#[derive(Debug, Clone)]
pub struct ProjectionGroup {
    /// Relationship field names from the root model; empty for the root.
    pub path: Vec<String>,
    pub model: Arc<Model>,
}

impl ProjectionGroup {
    pub fn width(&self) -> usize {
        self.model.fields().len()
    }
}

/// Positional layout of a SELECT or RETURNING list.
#[derive(Debug, Clone)]
pub struct Projection {
    groups: Vec<ProjectionGroup>,
}

impl Projection {
    /// A projection over the root model only.
    pub fn root(model: Arc<Model>) -> Self {
        Self {
            groups: vec![ProjectionGroup {
                path: Vec::new(),
                model,
            }],
        }
    }

    /// Add a related model's columns. Groups must be added parent first; a
    /// path already present is ignored.
    pub fn push_related(&mut self, path: Vec<String>, model: Arc<Model>) {
        if self.groups.iter().any(|g| g.path == path) {
            return;
        }
        self.groups.push(ProjectionGroup { path, model });
    }

    pub fn groups(&self) -> &[ProjectionGroup] {
        &self.groups
    }

    /// Total number of selected columns.
    pub fn width(&self) -> usize {
        self.groups.iter().map(ProjectionGroup::width).sum()
    }

    /// SELECT list: `table.column`, aliased `table.column AS table_column`
    /// once more than one table is selected.
    pub fn select_columns(&self) -> Vec<String> {
        let aliased = self.groups.len() > 1;
        self.groups
            .iter()
            .flat_map(|g| {
                let table = g.model.table();
                g.model.fields().iter().map(move |f| {
                    let column = f.column_name();
                    if aliased {
                        format!("{table}.{column} AS {table}_{column}")
                    } else {
                        format!("{table}.{column}")
                    }
                })
            })
            .collect()
    }
}

/// A materialized row of one model, with `select_related` instances nested.
#[derive(Debug, Clone)]
pub struct Instance {
    model: Arc<Model>,
    values: Vec<Value>,
    related: BTreeMap<String, Instance>,
}

impl Instance {
    /// Build an instance from values in field order.
    pub fn new(model: Arc<Model>, values: Vec<Value>) -> OrmResult<Self> {
        if values.len() != model.fields().len() {
            return Err(OrmError::decode(
                model.table(),
                format!(
                    "expected {} values for model '{}', got {}",
                    model.fields().len(),
                    model.name(),
                    values.len()
                ),
            ));
        }
        Ok(Self {
            model,
            values,
            related: BTreeMap::new(),
        })
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// Value of a field, by field name or column name.
    pub fn get(&self, field: &str) -> Option<&Value> {
        let idx = self
            .model
            .fields()
            .iter()
            .position(|f| f.name() == field)
            .or_else(|| {
                self.model
                    .fields()
                    .iter()
                    .position(|f| f.column_name() == field)
            })?;
        self.values.get(idx)
    }

    /// Typed value of a field.
    pub fn try_get<T: FromValue>(&self, field: &str) -> OrmResult<T> {
        let value = self.get(field).ok_or_else(|| {
            OrmError::decode(
                field,
                format!("model '{}' has no field '{}'", self.model.name(), field),
            )
        })?;
        T::from_value(value).map_err(|e| match e {
            OrmError::Decode { message, .. } => OrmError::decode(field, message),
            other => other,
        })
    }

    /// Primary key value.
    pub fn pk(&self) -> &Value {
        self.get(self.model.primary_key().name())
            .unwrap_or(&Value::Null)
    }

    /// A `select_related` instance, by relationship field name.
    pub fn related(&self, name: &str) -> Option<&Instance> {
        self.related.get(name)
    }

    /// `(field name, value)` pairs in field order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.model
            .fields()
            .iter()
            .map(|f| f.name())
            .zip(self.values.iter())
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// JSON object of field values, related instances nested under their name.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (name, value) in self.fields() {
            map.insert(name.to_string(), value.to_json());
        }
        for (name, related) in &self.related {
            map.insert(name.clone(), related.to_json());
        }
        serde_json::Value::Object(map)
    }

    fn attach(&mut self, path: &[String], instance: Instance) -> OrmResult<()> {
        match path {
            [] => Err(OrmError::decode(
                self.model.table(),
                "related instance without a relation path",
            )),
            [name] => {
                self.related.insert(name.clone(), instance);
                Ok(())
            }
            [head, rest @ ..] => {
                let parent = self.related.get_mut(head).ok_or_else(|| {
                    OrmError::decode(
                        self.model.table(),
                        format!("related instance '{head}' is not loaded"),
                    )
                })?;
                parent.attach(rest, instance)
            }
        }
    }
}

/// Types that can be built from a mapped [`Instance`].
///
/// ```ignore
/// struct Customer { id: i64, name: String }
///
/// impl FromInstance for Customer {
///     fn from_instance(instance: &Instance) -> OrmResult<Self> {
///         Ok(Self { id: instance.try_get("id")?, name: instance.try_get("name")? })
///     }
/// }
/// ```
pub trait FromInstance: Sized {
    fn from_instance(instance: &Instance) -> OrmResult<Self>;
}

impl FromInstance for Instance {
    fn from_instance(instance: &Instance) -> OrmResult<Self> {
        Ok(instance.clone())
    }
}

impl FromInstance for serde_json::Value {
    fn from_instance(instance: &Instance) -> OrmResult<Self> {
        Ok(instance.to_json())
    }
}

/// Maps records to instances against a projection.
pub struct ResultMapper<'p> {
    projection: &'p Projection,
}

impl<'p> ResultMapper<'p> {
    pub fn new(projection: &'p Projection) -> Self {
        Self { projection }
    }

    pub fn map_row(&self, record: Record) -> OrmResult<Instance> {
        let expected = self.projection.width();
        if record.len() != expected {
            return Err(OrmError::decode(
                "<row>",
                format!("expected {} columns, got {}", expected, record.len()),
            ));
        }

        let mut values = record.into_values().into_iter();
        let mut root: Option<Instance> = None;
        for group in self.projection.groups() {
            let group_values: Vec<Value> = values.by_ref().take(group.width()).collect();
            let instance = Instance::new(Arc::clone(&group.model), group_values)?;
            match root.as_mut() {
                None => root = Some(instance),
                Some(parent) => parent.attach(&group.path, instance)?,
            }
        }
        root.ok_or_else(|| OrmError::decode("<row>", "empty projection"))
    }

    pub fn map_rows(&self, records: Vec<Record>) -> OrmResult<Vec<Instance>> {
        records.into_iter().map(|r| self.map_row(r)).collect()
    }
}
