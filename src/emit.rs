//! Schema → JSON Schema projection.
//!
//! The output only steers the generator; materialization never validates
//! against it. Named nodes (records, aliases) are emitted once under `$defs`
//! and referenced with `$ref`, which is also how cycles are written down.
use std::collections::HashMap;
use std::fmt::Write as _;

use indexmap::IndexMap;
use serde_json::{Map, Value, json};

use crate::materialize::{TAG_KEY, VALUE_KEY};
use crate::schema::{DeclKey, Primitive, Schema};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitOptions {
    /// Describe each union branch as a `{__type_name, __value}` envelope
    /// instead of the bare branch schema.
    pub tagged_unions: bool,
}

/// Wire schema with default options.
pub fn wire_schema(schema: &Schema) -> Value {
    wire_schema_with(schema, EmitOptions::default())
}

pub fn wire_schema_with(schema: &Schema, options: EmitOptions) -> Value {
    Emitter::new(options).root(schema)
}

/// Pretty-printed [`wire_schema`], as handed to the generator.
pub fn wire_schema_string(schema: &Schema) -> String {
    format!("{:#}", wire_schema(schema))
}

/// Everything the generator is shown for one call site: the wire schema,
/// then the source of each related record, then each alias definition.
pub fn compiled_artifact(schema: &Schema, options: EmitOptions) -> String {
    let mut out = format!("JSON SCHEMA:\n{:#}\n", wire_schema_with(schema, options));

    let sources = schema
        .referenced_records()
        .iter()
        .filter_map(|r| r.provenance().source.clone())
        .collect::<Vec<_>>();
    if !sources.is_empty() {
        let _ = write!(out, "\nRELATED DECLARATIONS:\n{}\n", sources.join("\n\n"));
    }

    let aliases = schema.alias_definitions();
    if !aliases.is_empty() {
        let lines = aliases.values().cloned().collect::<Vec<_>>();
        let _ = write!(out, "\nTYPE ALIASES:\n{}\n", lines.join("\n"));
    }
    out
}

// ————————————————————————————————————————————————————————————————————————————
// JSON SCHEMA CG
// ————————————————————————————————————————————————————————————————————————————

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum NamedKind {
    Record,
    Alias,
}

struct Emitter {
    options: EmitOptions,
    defs: IndexMap<String, Value>,
    names: HashMap<(NamedKind, DeclKey), String>,
}

impl Emitter {
    fn new(options: EmitOptions) -> Self {
        Self { options, defs: IndexMap::new(), names: HashMap::new() }
    }

    fn root(mut self, schema: &Schema) -> Value {
        let mut body = self.node(schema);
        if !self.defs.is_empty() {
            let defs: Map<String, Value> = self.defs.into_iter().collect();
            if let Value::Object(map) = &mut body {
                map.insert("$defs".into(), Value::Object(defs));
            }
        }
        body
    }

    /// `$defs` key for a named node; qualified with its scope when two
    /// distinct declarations share a short name, then numbered if the
    /// qualified name is taken too (a root-scope key qualifies to itself).
    fn def_name(&mut self, kind: NamedKind, key: &DeclKey) -> (String, bool) {
        if let Some(name) = self.names.get(&(kind, key.clone())) {
            return (name.clone(), false);
        }
        let mut name = key.name.clone();
        if self.defs.contains_key(&name) {
            name = key.to_string();
        }
        let base = name.clone();
        let mut n = 2;
        while self.defs.contains_key(&name) {
            name = format!("{base}_{n}");
            n += 1;
        }
        self.names.insert((kind, key.clone()), name.clone());
        (name, true)
    }

    fn reference(name: &str) -> Value {
        json!({ "$ref": format!("#/$defs/{name}") })
    }

    fn node(&mut self, schema: &Schema) -> Value {
        match schema {
            Schema::Primitive(p) => json!({ "type": primitive_type(*p) }),
            Schema::Any => json!({}),

            Schema::List(item) => json!({
                "type": "array",
                "items": self.node(item),
            }),

            Schema::Tuple(items) => {
                let prefix = items.iter().map(|i| self.node(i)).collect::<Vec<_>>();
                json!({
                    "type": "array",
                    "prefixItems": prefix,
                    "minItems": items.len(),
                    "maxItems": items.len(),
                    "items": false
                })
            }

            Schema::Dict(value) => json!({
                "type": "object",
                "additionalProperties": self.node(value),
            }),

            Schema::Record(def) => {
                let (name, fresh) = self.def_name(NamedKind::Record, def.key());
                if fresh {
                    // reserve the slot first; fields may refer back to this record
                    self.defs.insert(name.clone(), Value::Null);
                    let mut props = Map::new();
                    for (field, ty) in def.fields() {
                        props.insert(field.to_string(), self.node(ty));
                    }
                    let required = def.fields().map(|(f, _)| Value::from(f)).collect::<Vec<_>>();
                    let mut obj = json!({
                        "title": def.name(),
                        "type": "object",
                        "properties": props,
                    });
                    if !required.is_empty() {
                        obj["required"] = Value::Array(required);
                    }
                    self.defs.insert(name.clone(), obj);
                }
                Self::reference(&name)
            }

            Schema::Alias(def) => {
                let (name, fresh) = self.def_name(NamedKind::Alias, def.key());
                if fresh {
                    self.defs.insert(name.clone(), Value::Null);
                    let target = match def.target() {
                        Some(target) => self.node(target),
                        None => json!({}),
                    };
                    self.defs.insert(name.clone(), target);
                }
                Self::reference(&name)
            }

            Schema::Union(branches) => {
                let arms = branches
                    .iter()
                    .map(|b| {
                        let inner = self.node(b);
                        if self.options.tagged_unions {
                            envelope(&b.branch_tag(), inner)
                        } else {
                            inner
                        }
                    })
                    .collect::<Vec<_>>();
                json!({ "anyOf": arms })
            }

            Schema::Literal(values) => match values.as_slice() {
                [one] => json!({ "const": one.to_wire() }),
                many => json!({ "enum": many.iter().map(|v| v.to_wire()).collect::<Vec<_>>() }),
            },

            Schema::Optional(inner) => json!({
                "anyOf": [self.node(inner), { "type": "null" }]
            }),
        }
    }
}

fn primitive_type(p: Primitive) -> &'static str {
    match p {
        Primitive::Str => "string",
        Primitive::Int => "integer",
        Primitive::Float => "number",
        Primitive::Bool => "boolean",
    }
}

fn envelope(tag: &str, payload: Value) -> Value {
    json!({
        "type": "object",
        "properties": {
            TAG_KEY: { "const": tag },
            VALUE_KEY: payload,
        },
        "required": [TAG_KEY, VALUE_KEY]
    })
}
