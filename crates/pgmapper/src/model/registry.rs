use super::{Field, Model, ModelDef, OnDelete, ReverseRelation};
use crate::error::{OrmError, OrmResult};
use crate::query::ModelHandle;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Registry of all models, built once at startup.
///
/// Foreign keys name their target by model name and are checked when the
/// schema is built, so every relation a query can traverse is known to exist.
#[derive(Debug)]
pub struct Schema {
    models: Vec<Arc<Model>>,
    by_name: HashMap<String, usize>,
}

impl Schema {
    /// Start registering models.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Get a model descriptor by model name.
    pub fn model(&self, name: &str) -> OrmResult<&Arc<Model>> {
        self.by_name
            .get(name)
            .map(|&idx| &self.models[idx])
            .ok_or_else(|| OrmError::validation(format!("model '{name}' is not registered")))
    }

    /// All registered models in registration order.
    pub fn models(&self) -> &[Arc<Model>] {
        &self.models
    }

    /// The model a foreign key field points at.
    pub fn related_model(&self, field: &Field) -> Option<&Arc<Model>> {
        field
            .related_model()
            .and_then(|target| self.by_name.get(target))
            .map(|&idx| &self.models[idx])
    }

    /// The default (unbound) query handle for a model.
    ///
    /// Handles are immutable; every chain call on one starts a new query.
    pub fn handle(self: &Arc<Self>, name: &str) -> OrmResult<ModelHandle> {
        let model = self.model(name)?.clone();
        Ok(ModelHandle::new(Arc::clone(self), model))
    }
}

/// Collects [`ModelDef`]s and validates them into a [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    defs: Vec<ModelDef>,
}

impl SchemaBuilder {
    /// Register a model definition.
    pub fn model(mut self, def: ModelDef) -> Self {
        self.defs.push(def);
        self
    }

    /// Validate all definitions and freeze them.
    pub fn build(self) -> OrmResult<Arc<Schema>> {
        let mut models = Vec::with_capacity(self.defs.len());
        let mut by_name = HashMap::new();
        let mut tables = HashMap::new();

        for def in self.defs {
            let model = build_model(def)?;
            if by_name.insert(model.name.clone(), models.len()).is_some() {
                return Err(OrmError::validation(format!(
                    "model '{}' is registered twice",
                    model.name
                )));
            }
            if let Some(other) = tables.insert(model.table.clone(), model.name.clone()) {
                return Err(OrmError::validation(format!(
                    "models '{}' and '{}' share table '{}'",
                    other, model.name, model.table
                )));
            }
            models.push(model);
        }

        let mut reverse: Vec<Vec<ReverseRelation>> = vec![Vec::new(); models.len()];
        for model in &models {
            for field in model.foreign_keys() {
                let target = field.related_model().unwrap_or_default();
                let Some(&target_idx) = by_name.get(target) else {
                    return Err(OrmError::validation(format!(
                        "foreign key '{}.{}' references unknown model '{}'",
                        model.name, field.name, target
                    )));
                };
                reverse[target_idx].push(ReverseRelation {
                    name: format!("{}_set", model.name.to_lowercase()),
                    model: model.name.clone(),
                    field: field.name.clone(),
                });
            }
        }
        for (model, relations) in models.iter_mut().zip(reverse) {
            model.reverse_relations = relations;
        }

        Ok(Arc::new(Schema {
            models: models.into_iter().map(Arc::new).collect(),
            by_name,
        }))
    }
}

fn build_model(def: ModelDef) -> OrmResult<Model> {
    validate_ident(&def.name, "model name")?;
    let table = def
        .table
        .unwrap_or_else(|| format!("{}s", def.name.to_lowercase()));
    validate_ident(&table, "table name")?;

    let mut fields = def.fields;
    let pk_count = fields.iter().filter(|f| f.primary_key).count();
    if pk_count > 1 {
        return Err(OrmError::validation(format!(
            "model '{}' declares {} primary keys; composite keys are not supported",
            def.name, pk_count
        )));
    }
    if pk_count == 0 {
        if fields.iter().any(|f| f.name == "id" || f.column == "id") {
            return Err(OrmError::validation(format!(
                "model '{}' has an 'id' field that is not the primary key",
                def.name
            )));
        }
        fields.insert(0, Field::big_serial("id").primary_key());
    }

    let mut names = HashSet::new();
    let mut columns = HashSet::new();
    for field in &fields {
        validate_ident(&field.name, "field name")?;
        validate_ident(&field.column, "column name")?;
        if field.name.contains("__") {
            return Err(OrmError::validation(format!(
                "field '{}.{}' must not contain '__'",
                def.name, field.name
            )));
        }
        if !names.insert(field.name.as_str()) {
            return Err(OrmError::validation(format!(
                "field '{}.{}' is declared twice",
                def.name, field.name
            )));
        }
        if !columns.insert(field.column.as_str()) {
            return Err(OrmError::validation(format!(
                "column '{}' is used twice on model '{}'",
                field.column, def.name
            )));
        }
        if field.primary_key && field.null {
            return Err(OrmError::validation(format!(
                "primary key '{}.{}' cannot be nullable",
                def.name, field.name
            )));
        }
        if field.on_delete_policy() == Some(OnDelete::SetNull) && !field.null {
            return Err(OrmError::validation(format!(
                "foreign key '{}.{}' uses SET NULL but is not nullable",
                def.name, field.name
            )));
        }
    }

    let primary_key = fields.iter().position(|f| f.primary_key).unwrap_or(0);
    Ok(Model {
        name: def.name,
        table,
        fields,
        primary_key,
        reverse_relations: Vec::new(),
    })
}

/// Names are spliced into SQL unquoted, so they must be plain identifiers:
/// `[A-Za-z_][A-Za-z0-9_]*`.
fn validate_ident(name: &str, what: &str) -> OrmResult<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(OrmError::validation(format!("invalid {what}: '{name}'")))
    }
}
