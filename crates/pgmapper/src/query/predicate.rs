//! Search conditions and their compilation into numbered SQL fragments.

use crate::error::{OrmError, OrmResult};
use crate::query::lookup::Lookup;
use crate::value::Value;

/// One condition as written by the caller.
///
/// Keyword style carries the lookup in the path (`("age__gt", 30)`); the
/// named constructors carry it explicitly and take a plain field path.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCondition {
    pub(crate) path: String,
    pub(crate) lookup: Option<Lookup>,
    pub(crate) value: Value,
}

impl SearchCondition {
    /// Keyword-style condition; a trailing `__<lookup>` in `path` selects the operator.
    pub fn new(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            lookup: None,
            value: value.into(),
        }
    }

    /// Condition with an explicit lookup on a plain field path.
    pub fn with_lookup(path: impl Into<String>, lookup: Lookup, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            lookup: Some(lookup),
            value: value.into(),
        }
    }

    pub fn equals(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::with_lookup(path, Lookup::Exact, value)
    }

    pub fn greater_than(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::with_lookup(path, Lookup::Gt, value)
    }

    pub fn greater_or_equal(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::with_lookup(path, Lookup::Gte, value)
    }

    pub fn less_than(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::with_lookup(path, Lookup::Lt, value)
    }

    pub fn less_or_equal(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::with_lookup(path, Lookup::Lte, value)
    }

    pub fn is_in<V: Into<Value>>(path: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        Self::with_lookup(path, Lookup::In, Value::List(values))
    }

    pub fn is_null(path: impl Into<String>, is_null: bool) -> Self {
        Self::with_lookup(path, Lookup::IsNull, is_null)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn lookup(&self) -> Option<Lookup> {
        self.lookup
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl<K: Into<String>, V: Into<Value>> From<(K, V)> for SearchCondition {
    fn from((path, value): (K, V)) -> Self {
        SearchCondition::new(path, value)
    }
}

/// A condition after field resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Path as written, for error messages.
    pub path: String,
    /// Qualified column, `table.column`.
    pub column: String,
    pub lookup: Lookup,
    pub value: Value,
}

/// A compiled, parenthesized fragment and the values it binds, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPredicate {
    pub sql: String,
    pub values: Vec<Value>,
}

/// Compiles resolved predicates into one boolean fragment.
pub struct PredicateCompiler;

impl PredicateCompiler {
    /// Compile `predicates` into `(p1 AND p2 ...)`, or `NOT (...)` when `negated`.
    ///
    /// Placeholders are numbered from `first_placeholder` upward without gaps.
    /// Returns `None` for an empty predicate set.
    pub fn compile(
        predicates: &[Predicate],
        negated: bool,
        first_placeholder: usize,
    ) -> OrmResult<Option<CompiledPredicate>> {
        if predicates.is_empty() {
            return Ok(None);
        }

        let mut values = Vec::new();
        let mut parts = Vec::with_capacity(predicates.len());
        for predicate in predicates {
            parts.push(compile_one(predicate, first_placeholder, &mut values)?);
        }

        let body = parts.join(" AND ");
        let sql = if negated {
            format!("NOT ({body})")
        } else {
            format!("({body})")
        };
        Ok(Some(CompiledPredicate { sql, values }))
    }
}

fn compile_one(
    predicate: &Predicate,
    first_placeholder: usize,
    values: &mut Vec<Value>,
) -> OrmResult<String> {
    let invalid = |message: &str| {
        OrmError::invalid_lookup_value(&predicate.path, predicate.lookup.suffix(), message)
    };
    let bind = |value: Value, values: &mut Vec<Value>| {
        values.push(value);
        format!("${}", first_placeholder + values.len() - 1)
    };
    let column = &predicate.column;

    match (predicate.lookup, &predicate.value) {
        (Lookup::IsNull, Value::Bool(true)) => Ok(format!("{column} IS NULL")),
        (Lookup::IsNull, Value::Bool(false)) => Ok(format!("{column} IS NOT NULL")),
        (Lookup::IsNull, other) => Err(invalid(&format!(
            "expected a bool, got {}",
            other.type_name()
        ))),
        (Lookup::In, Value::List(items)) => {
            if items.is_empty() {
                return Ok("FALSE".to_string());
            }
            if items.iter().any(|v| matches!(v, Value::List(_) | Value::Null)) {
                return Err(invalid("list items must be non-null scalars"));
            }
            let placeholders: Vec<String> =
                items.iter().map(|v| bind(v.clone(), values)).collect();
            Ok(format!("{column} IN ({})", placeholders.join(", ")))
        }
        (Lookup::In, other) => Err(invalid(&format!(
            "expected a list, got {}",
            other.type_name()
        ))),
        (Lookup::Exact, Value::Null) => Ok(format!("{column} IS NULL")),
        (_, Value::Null) => Err(invalid("cannot compare with NULL; use __isnull")),
        (_, Value::List(_)) => Err(invalid("a list is only valid with __in")),
        (lookup, value) => {
            let placeholder = bind(value.clone(), values);
            Ok(format!("{column} {} {placeholder}", lookup.sql_operator()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pred(column: &str, lookup: Lookup, value: impl Into<Value>) -> Predicate {
        Predicate {
            path: column.to_string(),
            column: column.to_string(),
            lookup,
            value: value.into(),
        }
    }

    #[test]
    fn test_empty_set_compiles_to_nothing() {
        assert_eq!(PredicateCompiler::compile(&[], false, 1).unwrap(), None);
    }

    #[test]
    fn test_numbering_starts_at_counter() {
        let preds = [
            pred("t.a", Lookup::Exact, 1),
            pred("t.b", Lookup::Gt, 2),
            pred("t.c", Lookup::Lte, 3),
        ];
        let compiled = PredicateCompiler::compile(&preds, false, 4).unwrap().unwrap();
        assert_eq!(compiled.sql, "(t.a = $4 AND t.b > $5 AND t.c <= $6)");
        assert_eq!(
            compiled.values,
            vec![Value::Int(1), Value::Int(2), Value::Int(3)]
        );
    }

    #[test]
    fn test_negated() {
        let compiled = PredicateCompiler::compile(&[pred("t.x", Lookup::Exact, 1)], true, 1)
            .unwrap()
            .unwrap();
        assert_eq!(compiled.sql, "NOT (t.x = $1)");
    }

    #[test]
    fn test_in_expands_and_isnull_binds_nothing() {
        let preds = [
            pred("t.id", Lookup::In, [1_i64, 2, 3]),
            pred("t.deleted_at", Lookup::IsNull, true),
            pred("t.name", Lookup::Exact, "x"),
        ];
        let compiled = PredicateCompiler::compile(&preds, false, 1).unwrap().unwrap();
        assert_eq!(
            compiled.sql,
            "(t.id IN ($1, $2, $3) AND t.deleted_at IS NULL AND t.name = $4)"
        );
        assert_eq!(compiled.values.len(), 4);
    }

    #[test]
    fn test_empty_in_is_false() {
        let compiled =
            PredicateCompiler::compile(&[pred("t.id", Lookup::In, Vec::<Value>::new())], false, 1)
                .unwrap()
                .unwrap();
        assert_eq!(compiled.sql, "(FALSE)");
        assert!(compiled.values.is_empty());
    }

    #[test]
    fn test_exact_null_is_null_check() {
        let compiled = PredicateCompiler::compile(&[pred("t.a", Lookup::Exact, Value::Null)], false, 1)
            .unwrap()
            .unwrap();
        assert_eq!(compiled.sql, "(t.a IS NULL)");
    }

    #[test]
    fn test_wrong_value_shapes() {
        let err = PredicateCompiler::compile(&[pred("t.a", Lookup::In, 5)], false, 1).unwrap_err();
        assert!(matches!(err, OrmError::InvalidLookupValue { .. }));

        let err =
            PredicateCompiler::compile(&[pred("t.a", Lookup::IsNull, "yes")], false, 1).unwrap_err();
        assert!(matches!(err, OrmError::InvalidLookupValue { .. }));

        let err =
            PredicateCompiler::compile(&[pred("t.a", Lookup::Gt, Value::Null)], false, 1).unwrap_err();
        assert!(matches!(err, OrmError::InvalidLookupValue { .. }));
    }
}
