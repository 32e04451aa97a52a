//! Schema + wire value → typed value.
//!
//! Every failure carries the locator of the offending value (`root.items[2].name`)
//! and reads as a sentence the generator can act on.
//!
//! Strict mode accepts exact wire kinds only and requires tagged union
//! envelopes. Lenient mode additionally:
//! - coerces scalars: number/bool → str, numeric string → int/float,
//!   integral float → int, `"true"`/`"false"` → bool
//! - defaults a missing `Optional` record field to `None`
//! - accepts an untagged union payload when exactly one branch matches it strictly
pub mod value;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{trace, warn};

use crate::error::ConversionError;
use crate::schema::{Primitive, RecordDef, Scalar, Schema};

pub use value::TypedValue;

/// Key naming the branch in a tagged union envelope.
pub const TAG_KEY: &str = "__type_name";
/// Key carrying the payload in a tagged union envelope.
pub const VALUE_KEY: &str = "__value";
pub const ROOT: &str = "root";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Strict,
    #[default]
    Lenient,
}

/// Materialize `value` against `schema` from the root locator.
pub fn materialize(schema: &Schema, value: &Value, mode: Mode) -> Result<TypedValue, ConversionError> {
    Materializer::new(mode).materialize(schema, value)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Materializer {
    mode: Mode,
}

impl Materializer {
    pub fn new(mode: Mode) -> Self {
        Self { mode }
    }

    pub fn strict() -> Self {
        Self::new(Mode::Strict)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn materialize(&self, schema: &Schema, value: &Value) -> Result<TypedValue, ConversionError> {
        self.at(schema, value, ROOT)
    }

    /// Same as [`Materializer::materialize`] with a caller-chosen locator.
    pub fn at(&self, schema: &Schema, value: &Value, path: &str) -> Result<TypedValue, ConversionError> {
        match schema {
            Schema::Any => Ok(TypedValue::Any(value.clone())),
            Schema::Optional(inner) => match value {
                Value::Null => Ok(TypedValue::None),
                _ => self.at(inner, value, path),
            },
            Schema::Alias(def) => match def.target() {
                Some(target) => self.at(target, value, path),
                None => Err(mismatch(path, format!("{} (unresolved alias)", def.name()), value)),
            },
            Schema::Primitive(p) => self.primitive(*p, value, path),
            Schema::Literal(allowed) => literal(allowed, value, path),
            Schema::List(item) => {
                let items = expect_array(schema, value, path)?;
                items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| self.at(item, v, &format!("{path}[{i}]")))
                    .collect::<Result<Vec<_>, _>>()
                    .map(TypedValue::List)
            }
            Schema::Tuple(slots) => {
                let items = expect_array(schema, value, path)?;
                if items.len() != slots.len() {
                    return Err(ConversionError::Arity {
                        path: path.to_string(),
                        expected: slots.len(),
                        found: items.len(),
                    });
                }
                slots
                    .iter()
                    .zip(items)
                    .enumerate()
                    .map(|(i, (s, v))| self.at(s, v, &format!("{path}[{i}]")))
                    .collect::<Result<Vec<_>, _>>()
                    .map(TypedValue::Tuple)
            }
            Schema::Dict(item) => {
                let obj = expect_object(schema, value, path)?;
                obj.iter()
                    .map(|(k, v)| Ok((k.clone(), self.at(item, v, &format!("{path}.{k}"))?)))
                    .collect::<Result<IndexMap<_, _>, ConversionError>>()
                    .map(TypedValue::Dict)
            }
            Schema::Record(def) => self.record(schema, def, value, path),
            Schema::Union(branches) => self.union(schema, branches, value, path),
        }
    }

    fn primitive(&self, p: Primitive, value: &Value, path: &str) -> Result<TypedValue, ConversionError> {
        let exact = match (p, value) {
            (Primitive::Str, Value::String(s)) => Some(TypedValue::Str(s.clone())),
            (Primitive::Int, Value::Number(n)) => n.as_i64().map(TypedValue::Int),
            (Primitive::Float, Value::Number(n)) => n.as_f64().map(TypedValue::Float),
            (Primitive::Bool, Value::Bool(b)) => Some(TypedValue::Bool(*b)),
            _ => None,
        };
        let coerced = match (exact, self.mode) {
            (Some(v), _) => return Ok(v),
            (None, Mode::Strict) => None,
            (None, Mode::Lenient) => coerce(p, value),
        };
        match coerced {
            Some(v) => {
                trace!(path, to = %p, "coerced scalar");
                Ok(v)
            }
            None => Err(mismatch(path, p.to_string(), value)),
        }
    }

    fn record(&self, schema: &Schema, def: &RecordDef, value: &Value, path: &str) -> Result<TypedValue, ConversionError> {
        let obj = expect_object(schema, value, path)?;
        let mut fields = IndexMap::with_capacity(def.field_count());
        for (name, field) in def.fields() {
            let typed = match obj.get(name) {
                Some(v) => self.at(field, v, &format!("{path}.{name}"))?,
                None if self.mode == Mode::Lenient && field.is_optional() => TypedValue::None,
                None => {
                    return Err(ConversionError::MissingField {
                        path: path.to_string(),
                        field: name.to_string(),
                    });
                }
            };
            fields.insert(name.to_string(), typed);
        }
        Ok(TypedValue::Record { name: def.name().to_string(), fields })
    }

    fn union(&self, schema: &Schema, branches: &[Schema], value: &Value, path: &str) -> Result<TypedValue, ConversionError> {
        // 1) tagged envelope: exact tag match, then strict
        if let Some(tag) = value.get(TAG_KEY).and_then(Value::as_str) {
            let Some(branch) = branches.iter().find(|b| b.branch_tag() == tag) else {
                return Err(ConversionError::UnknownBranch {
                    path: path.to_string(),
                    tag: tag.to_string(),
                    expected: tags(branches),
                });
            };
            let Some(payload) = value.get(VALUE_KEY) else {
                return Err(ConversionError::MissingField {
                    path: path.to_string(),
                    field: VALUE_KEY.to_string(),
                });
            };
            return Materializer::strict().at(branch, payload, &format!("{path}.{VALUE_KEY}"));
        }

        // 2) untagged: lenient only
        if self.mode == Mode::Strict {
            return Err(mismatch(
                path,
                format!("a {{\"{TAG_KEY}\": ..., \"{VALUE_KEY}\": ...}} envelope for {schema}"),
                value,
            ));
        }
        let strict = Materializer::strict();
        let mut matched = Vec::new();
        let mut failures = Vec::new();
        for branch in branches {
            match strict.at(branch, value, path) {
                Ok(typed) => matched.push((branch, typed)),
                Err(err) => failures.push(format!("{}: {err}", branch.branch_tag())),
            }
        }
        match matched.len() {
            1 => {
                let (branch, typed) = matched.remove(0);
                warn!(path, branch = %branch.branch_tag(), "untagged union value matched a single branch");
                Ok(typed)
            }
            0 => Err(ConversionError::AmbiguousUnion {
                path: path.to_string(),
                union: schema.to_string(),
                detail: format!("no branch matches ({})", failures.join("; ")),
            }),
            _ => Err(ConversionError::AmbiguousUnion {
                path: path.to_string(),
                union: schema.to_string(),
                detail: format!(
                    "branches {} all match; wrap the value as {{\"{TAG_KEY}\": <branch>, \"{VALUE_KEY}\": <value>}}",
                    matched.iter().map(|(b, _)| b.branch_tag()).collect::<Vec<_>>().join(", ")
                ),
            }),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn coerce(p: Primitive, value: &Value) -> Option<TypedValue> {
    match (p, value) {
        (Primitive::Str, Value::Number(n)) => Some(TypedValue::Str(n.to_string())),
        (Primitive::Str, Value::Bool(b)) => Some(TypedValue::Str(b.to_string())),
        (Primitive::Int, Value::Number(n)) => n.as_f64().and_then(integral).map(TypedValue::Int),
        (Primitive::Int, Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
                .map(TypedValue::Int)
        }
        (Primitive::Float, Value::String(s)) => {
            s.trim().parse::<f64>().ok().filter(|f| f.is_finite()).map(TypedValue::Float)
        }
        (Primitive::Bool, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(TypedValue::Bool(true)),
            "false" => Some(TypedValue::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

fn integral(f: f64) -> Option<i64> {
    (f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64).then_some(f as i64)
}

fn literal(allowed: &[Scalar], value: &Value, path: &str) -> Result<TypedValue, ConversionError> {
    match allowed.iter().find(|s| s.matches(value)) {
        Some(scalar) => Ok(match scalar {
            Scalar::Str(s) => TypedValue::Str(s.clone()),
            Scalar::Int(i) => TypedValue::Int(*i),
            Scalar::Float(f) => TypedValue::Float(f.0),
            Scalar::Bool(b) => TypedValue::Bool(*b),
        }),
        None => Err(ConversionError::LiteralMismatch {
            path: path.to_string(),
            allowed: format!(
                "[{}]",
                allowed.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
            ),
            found: describe(value),
        }),
    }
}

fn expect_array<'v>(schema: &Schema, value: &'v Value, path: &str) -> Result<&'v Vec<Value>, ConversionError> {
    value.as_array().ok_or_else(|| mismatch(path, schema.to_string(), value))
}

fn expect_object<'v>(schema: &Schema, value: &'v Value, path: &str) -> Result<&'v Map<String, Value>, ConversionError> {
    value.as_object().ok_or_else(|| mismatch(path, schema.to_string(), value))
}

fn mismatch(path: &str, expected: String, value: &Value) -> ConversionError {
    ConversionError::KindMismatch { path: path.to_string(), expected, found: describe(value) }
}

fn tags(branches: &[Schema]) -> String {
    branches.iter().map(|b| format!("`{}`", b.branch_tag())).collect::<Vec<_>>().join(", ")
}

/// Short, human-readable description of a wire value for error text.
fn describe(value: &Value) -> String {
    const MAX: usize = 40;
    match value {
        Value::Null => "null".into(),
        Value::Bool(b) => format!("bool {b}"),
        Value::Number(n) => format!("number {n}"),
        Value::String(s) if s.chars().count() > MAX => {
            format!("string {:?}...", s.chars().take(MAX).collect::<String>())
        }
        Value::String(s) => format!("string {s:?}"),
        Value::Array(items) => format!("array of {} items", items.len()),
        Value::Object(map) => match map.len() {
            0 => "empty object".into(),
            _ => format!(
                "object with keys {}",
                map.keys().take(5).map(|k| format!("`{k}`")).collect::<Vec<_>>().join(", ")
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Scope;
    use ordered_float::OrderedFloat;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn point() -> Schema {
        Schema::record("Point", Scope::parse("geo"), [("x", Schema::INT), ("y", Schema::INT)])
    }

    fn lenient(schema: &Schema, value: Value) -> Result<TypedValue, ConversionError> {
        materialize(schema, &value, Mode::Lenient)
    }

    fn strict(schema: &Schema, value: Value) -> Result<TypedValue, ConversionError> {
        materialize(schema, &value, Mode::Strict)
    }

    #[test]
    fn point_lenient_and_strict() {
        let p = lenient(&point(), json!({"x": 3, "y": "4"})).unwrap();
        assert_eq!(p.to_string(), "Point(x=3, y=4)");

        let err = strict(&point(), json!({"x": 3, "y": "4"})).unwrap_err();
        assert_eq!(err.path(), "root.y");
        assert_eq!(err.to_string(), "root.y expected to be int, but got string \"4\"");
    }

    #[test]
    fn scalar_coercions() {
        assert_eq!(lenient(&Schema::INT, json!(7.0)).unwrap(), TypedValue::Int(7));
        assert_eq!(lenient(&Schema::INT, json!(" 12 ")).unwrap(), TypedValue::Int(12));
        assert!(lenient(&Schema::INT, json!(7.5)).is_err());
        assert_eq!(lenient(&Schema::FLOAT, json!("2.5")).unwrap(), TypedValue::Float(2.5));
        assert_eq!(strict(&Schema::FLOAT, json!(2)).unwrap(), TypedValue::Float(2.0));
        assert_eq!(lenient(&Schema::STR, json!(12)).unwrap(), TypedValue::Str("12".into()));
        assert_eq!(lenient(&Schema::BOOL, json!("True")).unwrap(), TypedValue::Bool(true));
        assert!(lenient(&Schema::BOOL, json!(1)).is_err());
        assert!(strict(&Schema::STR, json!(12)).is_err());
        assert!(lenient(&Schema::STR, json!(null)).is_err());
    }

    #[test]
    fn tuple_arity_is_exact() {
        let pair = Schema::Tuple(vec![Schema::INT, Schema::STR]);
        assert_eq!(
            lenient(&pair, json!([1, "a"])).unwrap(),
            TypedValue::Tuple(vec![TypedValue::Int(1), TypedValue::Str("a".into())])
        );
        for value in [json!([1]), json!([1, "a", 2])] {
            let err = lenient(&pair, value).unwrap_err();
            assert!(matches!(err, ConversionError::Arity { expected: 2, .. }), "{err}");
        }
    }

    #[test]
    fn nested_paths() {
        let schema = Schema::record(
            "Order",
            Scope::root(),
            [("items", Schema::list(Schema::record("Line", Scope::root(), [("qty", Schema::INT)])))],
        );
        let err = strict(&schema, json!({"items": [{"qty": 1}, {"qty": 2}, {"qty": "x"}]})).unwrap_err();
        assert_eq!(err.path(), "root.items[2].qty");

        let dict = Schema::dict(Schema::INT);
        let err = strict(&dict, json!({"a": 1, "b": true})).unwrap_err();
        assert_eq!(err.path(), "root.b");
    }

    #[test]
    fn missing_fields() {
        let schema = Schema::record(
            "User",
            Scope::root(),
            [("name", Schema::STR), ("nick", Schema::optional(Schema::STR))],
        );
        let user = lenient(&schema, json!({"name": "ada", "extra": 1})).unwrap();
        assert_eq!(user.to_string(), "User(name=\"ada\", nick=None)");

        let err = strict(&schema, json!({"name": "ada"})).unwrap_err();
        assert_eq!(err, ConversionError::MissingField { path: "root".into(), field: "nick".into() });
        let err = lenient(&schema, json!({"nick": "a"})).unwrap_err();
        assert_eq!(err.to_string(), "root expected to have field `name`, but it's missing");
    }

    #[test]
    fn literals_compare_exactly() {
        let schema = Schema::Literal(vec![Scalar::Str("red".into()), Scalar::Int(1), Scalar::Float(OrderedFloat(0.5))]);
        assert_eq!(lenient(&schema, json!("red")).unwrap(), TypedValue::Str("red".into()));
        assert_eq!(lenient(&schema, json!(0.5)).unwrap(), TypedValue::Float(0.5));
        let err = lenient(&schema, json!("1")).unwrap_err();
        assert_eq!(err.to_string(), "root expected to be one of [\"red\", 1, 0.5], but got string \"1\"");
    }

    #[test]
    fn tagged_union_ignores_declaration_order() {
        let cat = Schema::record("Cat", Scope::root(), [("sound", Schema::STR)]);
        let dog = Schema::record("Dog", Scope::root(), [("sound", Schema::STR)]);
        let envelope = json!({TAG_KEY: "Dog", VALUE_KEY: {"sound": "woof"}});
        for branches in [vec![cat.clone(), dog.clone()], vec![dog.clone(), cat.clone()]] {
            let union = Schema::Union(branches);
            for mode in [Mode::Strict, Mode::Lenient] {
                let v = materialize(&union, &envelope, mode).unwrap();
                assert_eq!(v.to_string(), "Dog(sound=\"woof\")");
            }
        }
        let err = strict(&Schema::Union(vec![cat, dog]), json!({TAG_KEY: "Cow", VALUE_KEY: {}})).unwrap_err();
        assert!(matches!(err, ConversionError::UnknownBranch { ref tag, .. } if tag == "Cow"));
    }

    #[test]
    fn tagged_payload_is_strict() {
        let union = Schema::Union(vec![Schema::INT, Schema::STR]);
        let err = lenient(&union, json!({TAG_KEY: "int", VALUE_KEY: "5"})).unwrap_err();
        assert_eq!(err.path(), "root.__value");
    }

    #[test]
    fn untagged_union() {
        let cat = Schema::record("Cat", Scope::root(), [("sound", Schema::STR)]);
        let dog = Schema::record("Dog", Scope::root(), [("sound", Schema::STR)]);
        let pet = Schema::Union(vec![cat.clone(), dog]);
        let err = lenient(&pet, json!({"sound": "woof"})).unwrap_err();
        assert!(matches!(err, ConversionError::AmbiguousUnion { .. }), "{err}");
        let err = lenient(&pet, json!(3)).unwrap_err();
        assert!(matches!(err, ConversionError::AmbiguousUnion { ref detail, .. } if detail.starts_with("no branch")));

        let mixed = Schema::Union(vec![Schema::INT, cat]);
        assert_eq!(lenient(&mixed, json!(3)).unwrap(), TypedValue::Int(3));
        assert!(matches!(strict(&mixed, json!(3)), Err(ConversionError::KindMismatch { .. })));
    }

    #[test]
    fn optional_and_any() {
        let schema = Schema::optional(point());
        assert_eq!(strict(&schema, json!(null)).unwrap(), TypedValue::None);
        assert_eq!(strict(&Schema::Any, json!({"k": [1]})).unwrap(), TypedValue::Any(json!({"k": [1]})));
        let alias = Schema::alias("Ids", Scope::root(), Schema::list(Schema::INT));
        assert_eq!(
            strict(&alias, json!([1, 2])).unwrap(),
            TypedValue::List(vec![TypedValue::Int(1), TypedValue::Int(2)])
        );
    }
}
