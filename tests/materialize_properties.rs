use std::collections::HashMap;
use std::sync::Arc;

use json_shape::call_site::{CallSite, CallSiteIdentity, Locus};
use json_shape::materialize::{Mode, TAG_KEY, VALUE_KEY, materialize};
use json_shape::program::Program;
use json_shape::repair::parse_wire;
use json_shape::schema::{AliasDef, DeclKey, Provenance, Schema};
use json_shape::scope::{Declaration, DeclarationTable, Scope};
use json_shape::syntax::TypeExpr;
use json_shape::{ConversionError, SchemaResolver, TypedValue};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

fn ann(text: &str) -> TypeExpr {
    TypeExpr::parse(text).unwrap_or_else(|e| panic!("{e}"))
}

fn assign_site(scope: &str, target: &str) -> CallSite {
    CallSite::new(
        CallSiteIdentity::new("app/main.py", 7, "reason"),
        Scope::parse(scope),
        Locus::Assign { target: target.into() },
    )
}

fn resolve(table: DeclarationTable, expr: &str, scope: &str) -> Schema {
    SchemaResolver::new(table)
        .resolve_annotation(&ann(expr), &Scope::parse(scope))
        .unwrap_or_else(|e| panic!("{expr}: {e}"))
}

#[test]
fn point_from_a_program_file() {
    let program = Program::parse(
        r#"{ "declarations": [
            { "kind": "record", "scope": "geo", "name": "Point", "fields": { "x": "int", "y": "int" } },
            { "kind": "variable", "scope": "geo.main", "name": "p", "annotation": "Point" }
        ] }"#,
        "geo.json".as_ref(),
    )
    .unwrap();
    let resolver = SchemaResolver::new(program.to_table(None));
    let schema = resolver.resolve(&assign_site("geo.main", "p")).unwrap();
    let wire = json!({"x": 3, "y": "4"});

    let lenient = materialize(&schema, &wire, Mode::Lenient).unwrap();
    assert_eq!(lenient.to_string(), "Point(x=3, y=4)");

    let err = materialize(&schema, &wire, Mode::Strict).unwrap_err();
    assert!(matches!(err, ConversionError::KindMismatch { .. }));
    assert_eq!(err.path(), "root.y");
}

#[test]
fn structurally_equal_branches_are_ambiguous() {
    let mut table = DeclarationTable::new();
    table
        .declare("zoo", "Cat", Declaration::record([("sound", ann("str"))]))
        .declare("zoo", "Dog", Declaration::record([("sound", ann("str"))]));
    let pet = resolve(table, "Union[Cat, Dog]", "zoo");

    let err = materialize(&pet, &json!({"sound": "woof"}), Mode::Lenient).unwrap_err();
    assert!(matches!(err, ConversionError::AmbiguousUnion { .. }), "{err}");
    assert!(err.to_string().contains("Cat, Dog"), "{err}");
}

#[test]
fn tagged_envelope_selects_by_tag_only() {
    let mut table = DeclarationTable::new();
    table
        .declare("zoo", "Cat", Declaration::record([("sound", ann("str"))]))
        .declare("zoo", "Dog", Declaration::record([("sound", ann("str"))]));
    let envelope = json!({TAG_KEY: "Dog", VALUE_KEY: {"sound": "woof"}});

    for order in ["Union[Cat, Dog]", "Union[Dog, Cat]", "Dog | Cat"] {
        let schema = resolve(table.clone(), order, "zoo");
        for mode in [Mode::Strict, Mode::Lenient] {
            let value = materialize(&schema, &envelope, mode).unwrap();
            assert_eq!(value.as_record().map(|(name, _)| name), Some("Dog"), "{order} {mode:?}");
        }
    }
}

#[test]
fn tuple_arity_never_truncates_or_pads() {
    let triple = Schema::Tuple(vec![Schema::INT; 3]);
    for len in [0usize, 1, 2, 4, 7] {
        let wire = Value::Array((0..len).map(|i| json!(i)).collect());
        for mode in [Mode::Strict, Mode::Lenient] {
            match materialize(&triple, &wire, mode) {
                Err(ConversionError::Arity { expected: 3, found, .. }) => assert_eq!(found, len),
                other => panic!("len {len}: {other:?}"),
            }
        }
    }
    assert!(materialize(&triple, &json!([1, 2, 3]), Mode::Strict).is_ok());
}

#[test]
fn optional_null_never_touches_the_inner_schema() {
    // an alias with no target errors as soon as it is materialized
    let unfinished = AliasDef::placeholder(DeclKey::new("Later", Scope::root()), Provenance::default());
    let schema = Schema::optional(Schema::Alias(unfinished));

    for mode in [Mode::Strict, Mode::Lenient] {
        assert_eq!(materialize(&schema, &Value::Null, mode).unwrap(), TypedValue::None);
        assert!(materialize(&schema, &json!(1), mode).is_err());
    }

    let record = Schema::record("R", Scope::root(), [("maybe", schema)]);
    let value = materialize(&record, &json!({}), Mode::Lenient).unwrap();
    assert_eq!(value.field("maybe"), Some(&TypedValue::None));
}

#[test]
fn self_reference_yields_one_node_per_declaration() {
    let mut table = DeclarationTable::new();
    table
        .declare("fs", "Dir", Declaration::record([
            ("name", ann("str")),
            ("parent", ann("Optional[Dir]")),
            ("children", ann("List[Entry]")),
        ]))
        .declare("fs", "Entry", Declaration::alias(ann("Union[File, Dir]")))
        .declare("fs", "File", Declaration::record([("name", ann("str")), ("dir", ann("Dir"))]));
    let schema = resolve(table, "Dir", "fs.walk");

    let mut nodes: HashMap<DeclKey, Vec<usize>> = HashMap::new();
    let mut record_pointers = |s: &Schema| {
        if let Schema::Record(def) = s {
            let ptr = Arc::as_ptr(def) as usize;
            let seen = nodes.entry(def.key().clone()).or_default();
            if !seen.contains(&ptr) {
                seen.push(ptr);
            }
        }
    };
    // the walk expands each record once, so also inspect every field directly
    for record in schema.referenced_records() {
        record_pointers(&Schema::Record(record.clone()));
        for (_, field) in record.fields() {
            field.visit(&mut record_pointers);
        }
    }

    assert_eq!(nodes.len(), 2);
    assert!(nodes.values().all(|ptrs| ptrs.len() == 1), "{nodes:?}");
}

#[test]
fn materialized_values_survive_a_round_trip() {
    let mut table = DeclarationTable::new();
    table
        .declare("m", "Tree", Declaration::record([
            ("label", ann("str")),
            ("weight", ann("float")),
            ("kids", ann("List[Tree]")),
            ("meta", ann("Dict[str, Optional[int]]")),
            ("kind", ann("Literal['leaf', 'node']")),
            ("span", ann("Tuple[int, int]")),
            ("extra", ann("Any")),
        ]));
    let schema = resolve(table, "Tree", "m");

    let wire = json!({
        "label": 12,
        "weight": "0.5",
        "kids": [{
            "label": "child", "weight": 1, "kids": [], "meta": {},
            "kind": "leaf", "span": [2.0, 3], "extra": null
        }],
        "meta": {"a": 1, "b": null},
        "kind": "node",
        "span": [0, 9],
        "extra": {"free": ["form"]}
    });

    let first = materialize(&schema, &wire, Mode::Lenient).unwrap();
    let again = materialize(&schema, &first.to_wire(), Mode::Lenient).unwrap();
    assert_eq!(again, first);
    // the round-tripped wire form is already exact
    assert_eq!(materialize(&schema, &first.to_wire(), Mode::Strict).unwrap(), first);
}

#[test]
fn repaired_text_feeds_the_materializer() {
    let schema = Schema::record("Answer", Scope::root(), [
        ("ok", Schema::BOOL),
        ("items", Schema::list(Schema::STR)),
    ]);
    let raw = "Here you go:\n```json\n{'ok': True, 'items': ['a', 'b',]}\n```";
    let wire = parse_wire(raw).unwrap();
    let value = materialize(&schema, &wire, Mode::Strict).unwrap();
    assert_eq!(value.to_string(), r#"Answer(ok=true, items=["a", "b"])"#);
}
