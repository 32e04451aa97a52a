//! Materialized values.
use std::fmt;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::path_de::{self, PathError};

/// A wire value checked against (and shaped by) a schema.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<TypedValue>),
    Tuple(Vec<TypedValue>),
    Dict(IndexMap<String, TypedValue>),
    Record {
        name: String,
        fields: IndexMap<String, TypedValue>,
    },
    /// Unvalidated passthrough.
    Any(Value),
}

impl TypedValue {
    /// Back to a plain wire value. Records become objects; tuples become arrays.
    pub fn to_wire(&self) -> Value {
        match self {
            TypedValue::None => Value::Null,
            TypedValue::Bool(b) => Value::Bool(*b),
            TypedValue::Int(i) => Value::from(*i),
            TypedValue::Float(f) => Value::from(*f),
            TypedValue::Str(s) => Value::String(s.clone()),
            TypedValue::List(items) | TypedValue::Tuple(items) => {
                Value::Array(items.iter().map(TypedValue::to_wire).collect())
            }
            TypedValue::Dict(fields) | TypedValue::Record { fields, .. } => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_wire()))
                    .collect::<Map<_, _>>(),
            ),
            TypedValue::Any(v) => v.clone(),
        }
    }

    /// Hand the value to a caller-side type.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, PathError> {
        path_de::from_value_with_path(self.to_wire())
    }

    pub fn is_none(&self) -> bool {
        matches!(self, TypedValue::None)
    }

    pub fn as_record(&self) -> Option<(&str, &IndexMap<String, TypedValue>)> {
        match self {
            TypedValue::Record { name, fields } => Some((name.as_str(), fields)),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&TypedValue> {
        match self {
            TypedValue::Record { fields, .. } | TypedValue::Dict(fields) => fields.get(name),
            _ => None,
        }
    }
}

fn join<'a>(f: &mut fmt::Formatter<'_>, items: impl IntoIterator<Item = &'a TypedValue>) -> fmt::Result {
    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::None => f.write_str("None"),
            TypedValue::Bool(b) => write!(f, "{b}"),
            TypedValue::Int(i) => write!(f, "{i}"),
            TypedValue::Float(x) => write!(f, "{x:?}"),
            TypedValue::Str(s) => write!(f, "{s:?}"),
            TypedValue::List(items) => {
                f.write_str("[")?;
                join(f, items)?;
                f.write_str("]")
            }
            TypedValue::Tuple(items) => {
                f.write_str("(")?;
                join(f, items)?;
                f.write_str(")")
            }
            TypedValue::Dict(fields) => {
                f.write_str("{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k:?}: {v}")?;
                }
                f.write_str("}")
            }
            TypedValue::Record { name, fields } => {
                write!(f, "{name}(")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                f.write_str(")")
            }
            TypedValue::Any(v) => write!(f, "{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use serde_json::json;

    fn point(x: i64, y: i64) -> TypedValue {
        let mut fields = IndexMap::new();
        fields.insert("x".to_string(), TypedValue::Int(x));
        fields.insert("y".to_string(), TypedValue::Int(y));
        TypedValue::Record { name: "Point".into(), fields }
    }

    #[test]
    fn display_reads_like_a_constructor() {
        assert_eq!(point(3, 4).to_string(), "Point(x=3, y=4)");
        let v = TypedValue::Tuple(vec![TypedValue::Float(1.0), TypedValue::Str("a".into()), TypedValue::None]);
        assert_eq!(v.to_string(), "(1.0, \"a\", None)");
        assert_eq!(TypedValue::List(vec![point(0, 1)]).to_string(), "[Point(x=0, y=1)]");
    }

    #[test]
    fn to_wire_drops_type_names() {
        let v = TypedValue::List(vec![point(3, 4), point(5, 6)]);
        assert_eq!(v.to_wire(), json!([{"x": 3, "y": 4}, {"x": 5, "y": 6}]));
        assert_eq!(point(1, 2).field("y"), Some(&TypedValue::Int(2)));
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Point {
        x: i64,
        y: i64,
    }

    #[test]
    fn deserialize_into_caller_types() {
        assert_eq!(point(3, 4).deserialize::<Point>().unwrap(), Point { x: 3, y: 4 });
        assert!(point(3, 4).deserialize::<Vec<Point>>().is_err());
    }
}
