//! Canonical text of a schema.
//!
//! Named nodes print as their name, which keeps the text of cyclic graphs
//! finite and makes the text usable as a union branch tag.
use std::fmt;

use super::{Primitive, Scalar, Schema};

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Primitive::Str => "str",
            Primitive::Int => "int",
            Primitive::Float => "float",
            Primitive::Bool => "bool",
        })
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // JSON quoting, so `"a,b"` cannot be confused with two values
            Scalar::Str(s) => write!(f, "{}", serde_json::Value::from(s.as_str())),
            Scalar::Int(i) => write!(f, "{i}"),
            // `{:?}` keeps the `.0` so Float(2.0) and Int(2) print differently
            Scalar::Float(x) => write!(f, "{:?}", x.0),
            Scalar::Bool(b) => write!(f, "{b}"),
        }
    }
}

pub(crate) fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, head: &str, items: &[T]) -> fmt::Result {
    write!(f, "{head}[")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str("]")
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schema::Primitive(p) => write!(f, "{p}"),
            Schema::List(item) => write!(f, "List[{item}]"),
            Schema::Tuple(items) => write_list(f, "Tuple", items),
            Schema::Dict(value) => write!(f, "Dict[str, {value}]"),
            Schema::Record(def) => f.write_str(def.name()),
            Schema::Union(branches) => write_list(f, "Union", branches),
            Schema::Literal(values) => write_list(f, "Literal", values),
            Schema::Optional(inner) => write!(f, "Optional[{inner}]"),
            Schema::Alias(def) => f.write_str(def.name()),
            Schema::Any => f.write_str("Any"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Scope;
    use ordered_float::OrderedFloat;
    use pretty_assertions::assert_eq;

    #[test]
    fn canonical_text() {
        let point = Schema::record("Point", Scope::root(), [("x", Schema::INT)]);
        let schema = Schema::Union(vec![
            Schema::dict(Schema::list(point)),
            Schema::Tuple(vec![Schema::STR, Schema::optional(Schema::FLOAT)]),
            Schema::Literal(vec![
                Scalar::Str("a".into()),
                Scalar::Int(2),
                Scalar::Float(OrderedFloat(2.0)),
                Scalar::Bool(false),
            ]),
            Schema::Any,
        ]);
        assert_eq!(
            schema.to_string(),
            r#"Union[Dict[str, List[Point]], Tuple[str, Optional[float]], Literal["a", 2, 2.0, false], Any]"#
        );
    }

    #[test]
    fn self_referencing_alias_prints_finitely() {
        let json = Schema::alias("Json", Scope::root(), Schema::Any);
        assert_eq!(Schema::list(json).branch_tag(), "List[Json]");
    }
}
