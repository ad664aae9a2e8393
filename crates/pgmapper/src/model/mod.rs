//! Model and field descriptors.
//!
//! Models are declared as plain values ([`ModelDef`] + [`Field`]) and turned
//! into immutable [`Model`] descriptors by [`Schema::builder`]. Nothing is
//! mutated after registration; handles share the descriptors through `Arc`.
//!
//! # Example
//! ```ignore
//! use pgmapper::{Field, ModelDef, OnDelete, Schema};
//!
//! let schema = Schema::builder()
//!     .model(ModelDef::new("Customer").field(Field::text("name")))
//!     .model(
//!         ModelDef::new("Order")
//!             .field(Field::foreign_key("customer", "Customer").on_delete(OnDelete::Cascade))
//!             .field(Field::integer("total")),
//!     )
//!     .build()?;
//! # Ok::<(), pgmapper::OrmError>(())
//! ```

mod registry;

pub use registry::{Schema, SchemaBuilder};

use crate::value::Value;

/// What happens to referencing rows when the referenced row is deleted.
///
/// Declared on foreign keys for documentation and schema tooling; the query
/// layer does not emit or enforce it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnDelete {
    Cascade,
    Restrict,
    #[default]
    NoAction,
    SetNull,
    SetDefault,
}

/// Semantic column type of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    SmallInt,
    Integer,
    BigInt,
    SmallSerial,
    Serial,
    BigSerial,
    Decimal { max_digits: u32, decimal_places: u32 },
    Real,
    Double,
    Varchar { max_length: u32 },
    Text,
    Boolean,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Json,
    Uuid,
    /// Reference to another model's primary key.
    ForeignKey { target: String, on_delete: OnDelete },
}

impl FieldType {
    /// Whether values are generated by a sequence.
    pub fn is_serial(&self) -> bool {
        matches!(
            self,
            FieldType::SmallSerial | FieldType::Serial | FieldType::BigSerial
        )
    }
}

/// A field (column) declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    column: String,
    field_type: FieldType,
    null: bool,
    unique: bool,
    primary_key: bool,
    auto_increment: bool,
    default: Option<Value>,
}

macro_rules! field_ctors {
    ($($(#[$meta:meta])* $fn_name:ident => $ty:expr;)*) => {
        $(
            $(#[$meta])*
            pub fn $fn_name(name: impl Into<String>) -> Self {
                Self::new(name, $ty)
            }
        )*
    };
}

impl Field {
    /// Declare a field of the given type. The column name defaults to the field name.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        let auto_increment = field_type.is_serial();
        Self {
            column: name.clone(),
            name,
            field_type,
            null: false,
            unique: false,
            primary_key: false,
            auto_increment,
            default: None,
        }
    }

    field_ctors! {
        small_int => FieldType::SmallInt;
        integer => FieldType::Integer;
        big_int => FieldType::BigInt;
        small_serial => FieldType::SmallSerial;
        serial => FieldType::Serial;
        /// `BIGSERIAL`, the type of the implicit `id` primary key.
        big_serial => FieldType::BigSerial;
        real => FieldType::Real;
        double => FieldType::Double;
        text => FieldType::Text;
        boolean => FieldType::Boolean;
        date => FieldType::Date;
        time => FieldType::Time;
        timestamp => FieldType::Timestamp;
        timestamptz => FieldType::TimestampTz;
        json => FieldType::Json;
        uuid => FieldType::Uuid;
    }

    /// `NUMERIC(max_digits, decimal_places)`.
    pub fn decimal(name: impl Into<String>, max_digits: u32, decimal_places: u32) -> Self {
        Self::new(
            name,
            FieldType::Decimal {
                max_digits,
                decimal_places,
            },
        )
    }

    /// `VARCHAR(max_length)`.
    pub fn varchar(name: impl Into<String>, max_length: u32) -> Self {
        Self::new(name, FieldType::Varchar { max_length })
    }

    /// Foreign key to the model registered as `target`.
    ///
    /// The column defaults to `<name>_id`; the field name is what paths
    /// traverse (`customer__name`).
    pub fn foreign_key(name: impl Into<String>, target: impl Into<String>) -> Self {
        let mut field = Self::new(
            name,
            FieldType::ForeignKey {
                target: target.into(),
                on_delete: OnDelete::default(),
            },
        );
        field.column = format!("{}_id", field.name);
        field
    }

    /// Allow NULL.
    pub fn null(mut self) -> Self {
        self.null = true;
        self
    }

    /// Add a UNIQUE constraint.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Mark as the primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Mark as database-generated even without a serial type (identity columns).
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Declared default value.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Override the column name.
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    /// Set the ON DELETE policy. No effect on non-foreign-key fields.
    pub fn on_delete(mut self, policy: OnDelete) -> Self {
        if let FieldType::ForeignKey { on_delete, .. } = &mut self.field_type {
            *on_delete = policy;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_name(&self) -> &str {
        &self.column
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub fn is_null(&self) -> bool {
        self.null
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn is_auto_increment(&self) -> bool {
        self.auto_increment
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Target model name if this is a foreign key.
    pub fn related_model(&self) -> Option<&str> {
        match &self.field_type {
            FieldType::ForeignKey { target, .. } => Some(target),
            _ => None,
        }
    }

    /// ON DELETE policy if this is a foreign key.
    pub fn on_delete_policy(&self) -> Option<OnDelete> {
        match &self.field_type {
            FieldType::ForeignKey { on_delete, .. } => Some(*on_delete),
            _ => None,
        }
    }

    pub fn is_foreign_key(&self) -> bool {
        self.related_model().is_some()
    }
}

/// Declarative model input for [`SchemaBuilder::model`].
#[derive(Debug, Clone)]
pub struct ModelDef {
    pub(crate) name: String,
    pub(crate) table: Option<String>,
    pub(crate) fields: Vec<Field>,
}

impl ModelDef {
    /// Start a model definition. The table defaults to the lower-cased name plus `s`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            fields: Vec::new(),
        }
    }

    /// Override the table name.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Append a field. Field order is column order.
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Append several fields.
    pub fn fields(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.fields.extend(fields);
        self
    }
}

/// A relation pointing at a model from another model's foreign key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReverseRelation {
    /// Accessor name, `<source model lower>_set`.
    pub name: String,
    /// Model that declares the foreign key.
    pub model: String,
    /// Foreign key field on that model.
    pub field: String,
}

/// Immutable model descriptor produced by [`SchemaBuilder::build`].
#[derive(Debug, Clone)]
pub struct Model {
    name: String,
    table: String,
    fields: Vec<Field>,
    primary_key: usize,
    reverse_relations: Vec<ReverseRelation>,
}

impl Model {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Look up a field by field name, then by column name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .or_else(|| self.fields.iter().find(|f| f.column == name))
    }

    pub fn primary_key(&self) -> &Field {
        &self.fields[self.primary_key]
    }

    /// Column names in declaration order.
    pub fn columns(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.column.as_str()).collect()
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_foreign_key())
    }

    pub fn reverse_relations(&self) -> &[ReverseRelation] {
        &self.reverse_relations
    }
}
