use decorum::Total;
use serde::de::{self, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A scalar attribute value as carried by a `ChangeEvent` or projected into a
/// `QueryResult`. Equality is total over every variant (§3: "value equality
/// is by total equality over scalar types"), which is why floats are kept in
/// `Total<f64>` rather than bare `f64` — bare floats have no `Eq`/`Hash`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(Total<f64>),
    Str(String),
}

/// A property mapping: name to scalar value. Ordered so that projections and
/// hash inputs are deterministic regardless of insertion order.
pub type PropertyMap = BTreeMap<String, ScalarValue>;

impl ScalarValue {
    pub fn float(v: f64) -> Self {
        ScalarValue::Float(Total::from(v))
    }

    /// "NOT EXISTS(var.property)" treats a missing property and a literal
    /// `false` as equivalent (§4.5, §9 — a deliberate idiosyncrasy preserved
    /// from the source behavior, not converged to strict null-only semantics).
    pub fn is_falsy(&self) -> bool {
        matches!(self, ScalarValue::Null | ScalarValue::Bool(false))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Int(i) => Some(*i as f64),
            ScalarValue::Float(f) => Some(f.into_inner()),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ScalarValue::Null => "null",
            ScalarValue::Bool(_) => "bool",
            ScalarValue::Int(_) => "int",
            ScalarValue::Float(_) => "float",
            ScalarValue::Str(_) => "string",
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "null"),
            ScalarValue::Bool(b) => write!(f, "{b}"),
            ScalarValue::Int(i) => write!(f, "{i}"),
            ScalarValue::Float(v) => write!(f, "{}", v.into_inner()),
            ScalarValue::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        ScalarValue::Bool(v)
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Int(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::Str(v.to_owned())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        ScalarValue::Str(v)
    }
}

// A hand-written (de)serializer rather than `#[serde(untagged)]` over the
// variants directly: `Total<f64>` does not implement `Serialize`/`Deserialize`
// on every `decorum` version, and untagged enums need a stable, JSON-native
// shape ({"type": ..., "entityId": ...} etc. all flow through plain JSON
// scalars, not a tagged representation) to match the wire schema in §6.
impl Serialize for ScalarValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ScalarValue::Null => serializer.serialize_none(),
            ScalarValue::Bool(b) => serializer.serialize_bool(*b),
            ScalarValue::Int(i) => serializer.serialize_i64(*i),
            ScalarValue::Float(v) => serializer.serialize_f64(v.into_inner()),
            ScalarValue::Str(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for ScalarValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ScalarVisitor;

        impl<'de> Visitor<'de> for ScalarVisitor {
            type Value = ScalarValue;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a null, bool, number, or string scalar")
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E> {
                Ok(ScalarValue::Null)
            }

            fn visit_none<E>(self) -> Result<Self::Value, E> {
                Ok(ScalarValue::Null)
            }

            fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E> {
                Ok(ScalarValue::Bool(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
                Ok(ScalarValue::Int(v))
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                i64::try_from(v)
                    .map(ScalarValue::Int)
                    .map_err(|_| de::Error::custom("integer out of i64 range"))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
                Ok(ScalarValue::float(v))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
                Ok(ScalarValue::Str(v.to_owned()))
            }

            fn visit_string<E>(self, v: String) -> Result<Self::Value, E> {
                Ok(ScalarValue::Str(v))
            }
        }

        deserializer.deserialize_any(ScalarVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_total_across_variants() {
        assert_eq!(ScalarValue::from(5i64), ScalarValue::from(5i64));
        assert_ne!(ScalarValue::from(5i64), ScalarValue::float(5.0));
        assert_eq!(ScalarValue::float(1.5), ScalarValue::float(1.5));
    }

    #[test]
    fn not_exists_treats_false_as_absent() {
        assert!(ScalarValue::Null.is_falsy());
        assert!(ScalarValue::Bool(false).is_falsy());
        assert!(!ScalarValue::Bool(true).is_falsy());
        assert!(!ScalarValue::from(0i64).is_falsy());
    }

    #[test]
    fn roundtrips_through_json() {
        let values = vec![
            ScalarValue::Null,
            ScalarValue::Bool(true),
            ScalarValue::Int(-42),
            ScalarValue::float(3.25),
            ScalarValue::from("hello"),
        ];
        for v in values {
            let json = serde_json::to_string(&v).unwrap();
            let back: ScalarValue = serde_json::from_str(&json).unwrap();
            assert_eq!(v, back);
        }
    }
}
