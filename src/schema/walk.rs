//! Transitive queries over a schema graph.
//!
//! Every walk enters each named node at most once, so cyclic graphs terminate.
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;

use super::{DeclKey, RecordDef, Schema};

#[derive(PartialEq, Eq, Hash)]
enum Named<'a> {
    Record(&'a DeclKey),
    Alias(&'a DeclKey),
}

fn walk<'a>(schema: &'a Schema, seen: &mut HashSet<Named<'a>>, visit: &mut dyn FnMut(&'a Schema)) {
    visit(schema);
    match schema {
        Schema::Primitive(_) | Schema::Literal(_) | Schema::Any => {}
        Schema::List(item) | Schema::Dict(item) | Schema::Optional(item) => walk(item, seen, visit),
        Schema::Tuple(items) | Schema::Union(items) => {
            for item in items {
                walk(item, seen, visit);
            }
        }
        Schema::Record(def) => {
            if seen.insert(Named::Record(def.key())) {
                for (_, field) in def.fields() {
                    walk(field, seen, visit);
                }
            }
        }
        Schema::Alias(def) => {
            if seen.insert(Named::Alias(def.key())) {
                if let Some(target) = def.target() {
                    walk(target, seen, visit);
                }
            }
        }
    }
}

impl Schema {
    /// Pre-order visit of every node; named nodes are expanded once.
    pub fn visit<'a>(&'a self, mut visit: impl FnMut(&'a Schema)) {
        let mut seen = HashSet::new();
        walk(self, &mut seen, &mut visit);
    }

    /// Every distinct record reachable from here, in first-visit order.
    pub fn referenced_records(&self) -> Vec<Arc<RecordDef>> {
        let mut out: IndexMap<DeclKey, Arc<RecordDef>> = IndexMap::new();
        self.visit(|node| {
            if let Schema::Record(def) = node {
                out.entry(def.key().clone()).or_insert_with(|| def.clone());
            }
        });
        out.into_values().collect()
    }

    /// `name = canonical target` for every reachable alias.
    pub fn alias_definitions(&self) -> IndexMap<String, String> {
        let mut out = IndexMap::new();
        self.visit(|node| {
            if let Schema::Alias(def) = node {
                if let Some(target) = def.target() {
                    out.entry(def.name().to_string())
                        .or_insert_with(|| format!("{} = {}", def.name(), target));
                }
            }
        });
        out
    }

    /// Origins of every reachable named declaration. Changing any of these
    /// files may change this schema.
    pub fn referenced_artifacts(&self) -> BTreeSet<PathBuf> {
        let mut out = BTreeSet::new();
        self.visit(|node| {
            let provenance = match node {
                Schema::Record(def) => def.provenance(),
                Schema::Alias(def) => def.provenance(),
                _ => return,
            };
            if let Some(origin) = &provenance.origin {
                out.insert(origin.clone());
            }
        });
        out
    }
}
