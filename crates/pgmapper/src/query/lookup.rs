//! Lookup suffixes (`age__gt`) and the SQL operators they select.

use std::fmt;

/// Separator between path segments: `customer__name__gte`.
pub const PATH_SEPARATOR: &str = "__";

/// A registered lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lookup {
    /// `field = $n` (also the implicit lookup when no suffix is given)
    Exact,
    /// `field > $n`
    Gt,
    /// `field >= $n`
    Gte,
    /// `field < $n`
    Lt,
    /// `field <= $n`
    Lte,
    /// `field IN ($n, $n+1, ...)`
    In,
    /// `field IS NULL` / `field IS NOT NULL`
    IsNull,
}

/// Every registered lookup with its suffix.
pub const LOOKUPS: &[(&str, Lookup)] = &[
    ("exact", Lookup::Exact),
    ("gt", Lookup::Gt),
    ("gte", Lookup::Gte),
    ("lt", Lookup::Lt),
    ("lte", Lookup::Lte),
    ("in", Lookup::In),
    ("isnull", Lookup::IsNull),
];

impl Lookup {
    /// Resolve a suffix. `None` means the suffix is not registered; callers
    /// must treat that as an error rather than assume equality.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        LOOKUPS
            .iter()
            .find(|(name, _)| *name == suffix)
            .map(|(_, lookup)| *lookup)
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            Lookup::Exact => "exact",
            Lookup::Gt => "gt",
            Lookup::Gte => "gte",
            Lookup::Lt => "lt",
            Lookup::Lte => "lte",
            Lookup::In => "in",
            Lookup::IsNull => "isnull",
        }
    }

    /// SQL operator. `IsNull` is rendered specially by the compiler.
    pub fn sql_operator(&self) -> &'static str {
        match self {
            Lookup::Exact => "=",
            Lookup::Gt => ">",
            Lookup::Gte => ">=",
            Lookup::Lt => "<",
            Lookup::Lte => "<=",
            Lookup::In => "IN",
            Lookup::IsNull => "IS NULL",
        }
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_registered_suffix_round_trips() {
        for (suffix, lookup) in LOOKUPS {
            assert_eq!(Lookup::from_suffix(suffix), Some(*lookup));
            assert_eq!(lookup.suffix(), *suffix);
        }
    }

    #[test]
    fn test_operators() {
        assert_eq!(Lookup::Gt.sql_operator(), ">");
        assert_eq!(Lookup::Lte.sql_operator(), "<=");
        assert_eq!(Lookup::In.sql_operator(), "IN");
    }

    #[test]
    fn test_unregistered_suffix() {
        assert_eq!(Lookup::from_suffix("icontains"), None);
        assert_eq!(Lookup::from_suffix("year"), None);
        assert_eq!(Lookup::from_suffix(""), None);
    }
}
