//! Schema resolution.
//!
//! Builds a [`Schema`] for one call site by searching the declarations
//! reachable from its lexical scope.
//!
//! - Assignment targets are searched innermost scope first (block, operation,
//!   record, module); the first variable declaration wins.
//! - Type names are searched the same way. If that fails, the body scopes of
//!   records currently being resolved are searched too, which is how a field
//!   can name a type declared next to its record in another module.
//! - Records and aliases are built in two phases. A placeholder keyed by
//!   `(name, scope)` is registered and pushed on the resolving stack before
//!   its body is resolved; any reference met while the key is on the stack
//!   binds to that placeholder instead of recursing.
//!
//! One schema is built per call-site identity and memoized for the lifetime
//! of the resolver. Concurrent callers for the same identity wait for the
//! build already in flight.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::call_site::{CallSite, CallSiteIdentity, Locus};
use crate::error::ResolveError;
use crate::schema::{AliasDef, DeclKey, Primitive, RecordDef, Schema};
use crate::scope::{Declaration, Lookup, Scope};
use crate::syntax::TypeExpr;

pub struct SchemaResolver<L> {
    lookup: L,
    memo: Mutex<HashMap<CallSiteIdentity, Arc<OnceCell<Schema>>>>,
}

impl<L: Lookup> SchemaResolver<L> {
    pub fn new(lookup: L) -> Self {
        Self { lookup, memo: Mutex::new(HashMap::new()) }
    }

    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    /// Resolve (or recall) the schema for a call site.
    #[tracing::instrument(level = "debug", skip(self, site), fields(site = %site.identity))]
    pub fn resolve(&self, site: &CallSite) -> Result<Schema, ResolveError> {
        let cell = {
            let mut memo = self.memo.lock();
            memo.entry(site.identity.clone()).or_default().clone()
        };
        // the memo lock is released here; only callers of this identity block
        cell.get_or_try_init(|| {
            debug!(scope = %site.scope, locus = ?site.locus, "building schema");
            Build::new(&self.lookup).call_site(site)
        })
        .cloned()
    }

    /// Resolve one annotation as seen from `scope`, without memoization.
    pub fn resolve_annotation(&self, expr: &TypeExpr, scope: &Scope) -> Result<Schema, ResolveError> {
        Build::new(&self.lookup).annotation(expr, scope)
    }

    /// Drop the memoized schema of `identity`, e.g. after its source changed.
    pub fn forget(&self, identity: &CallSiteIdentity) -> bool {
        self.memo.lock().remove(identity).is_some()
    }

    pub fn memoized(&self) -> usize {
        self.memo.lock().values().filter(|c| c.get().is_some()).count()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// ONE BUILD
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Record,
    Alias,
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    key: DeclKey,
    /// Scope the body's annotations are resolved in.
    body: Scope,
}

struct Build<'l, L> {
    lookup: &'l L,
    records: HashMap<DeclKey, Arc<RecordDef>>,
    aliases: HashMap<DeclKey, Arc<AliasDef>>,
    resolving: Vec<Frame>,
}

impl<'l, L: Lookup> Build<'l, L> {
    fn new(lookup: &'l L) -> Self {
        Self {
            lookup,
            records: HashMap::new(),
            aliases: HashMap::new(),
            resolving: Vec::new(),
        }
    }

    fn call_site(&mut self, site: &CallSite) -> Result<Schema, ResolveError> {
        match &site.locus {
            Locus::Condition | Locus::While => Ok(Schema::Primitive(Primitive::Bool)),
            Locus::Explicit(expr) => self.annotation(expr, &site.scope),
            Locus::Destructure { arity } => {
                if *arity == 0 {
                    return Err(ResolveError::unsupported("()", "destructuring needs at least one target"));
                }
                Ok(Schema::Tuple(vec![Schema::Any; *arity]))
            }
            Locus::Return => self.return_position(&site.scope),
            Locus::Assign { target } => self.assignment(target, &site.scope),
        }
    }

    fn return_position(&mut self, scope: &Scope) -> Result<Schema, ResolveError> {
        for candidate in scope.chain() {
            let (Some(name), Some(parent)) = (candidate.last(), candidate.parent()) else {
                continue;
            };
            if let Some(Declaration::Operation { returns }) = self.lookup.lookup(name, &parent) {
                trace!(operation = name, "enclosing operation");
                return match returns {
                    Some(expr) => self.annotation(&expr, &candidate),
                    None => Err(ResolveError::unresolved(format!("return annotation of `{name}`"), &candidate)),
                };
            }
        }
        Err(ResolveError::unresolved("enclosing operation", scope))
    }

    fn assignment(&mut self, target: &str, scope: &Scope) -> Result<Schema, ResolveError> {
        for candidate in scope.chain() {
            if let Some(Declaration::Variable { annotation }) = self.lookup.lookup(target, &candidate) {
                trace!(target, scope = %candidate, "assignment target declared");
                return self.annotation(&annotation, &candidate);
            }
        }
        Err(ResolveError::unresolved(target, scope))
    }

    fn annotation(&mut self, expr: &TypeExpr, scope: &Scope) -> Result<Schema, ResolveError> {
        match expr {
            TypeExpr::Name(name) => match name.as_str() {
                "Any" => Ok(Schema::Any),
                other => match Primitive::from_name(other) {
                    Some(p) => Ok(Schema::Primitive(p)),
                    None => self.named(other, scope),
                },
            },
            TypeExpr::None => Err(ResolveError::unsupported(expr, "`None` is only valid inside Optional or a union")),
            TypeExpr::Literal(values) => {
                if values.is_empty() {
                    return Err(ResolveError::unsupported(expr, "empty Literal"));
                }
                Ok(Schema::Literal(values.clone()))
            }
            TypeExpr::Or(..) => {
                let mut members = Vec::new();
                flatten_or(expr, &mut members);
                self.union(expr, &members, scope)
            }
            TypeExpr::Generic { base, args } => self.generic(expr, base, args, scope),
        }
    }

    fn generic(&mut self, expr: &TypeExpr, base: &str, args: &[TypeExpr], scope: &Scope) -> Result<Schema, ResolveError> {
        let arity = |n: usize| -> Result<(), ResolveError> {
            if args.len() == n {
                Ok(())
            } else {
                Err(ResolveError::unsupported(expr, format!("`{base}` takes {n} argument(s), got {}", args.len())))
            }
        };
        match base {
            "List" | "list" => {
                arity(1)?;
                Ok(Schema::list(self.annotation(&args[0], scope)?))
            }
            "Tuple" | "tuple" => {
                let items = args
                    .iter()
                    .map(|a| self.annotation(a, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Schema::Tuple(items))
            }
            "Dict" | "dict" => {
                arity(2)?;
                let key = self.annotation(&args[0], scope)?;
                if !matches!(key.resolved(), Schema::Primitive(Primitive::Str)) {
                    return Err(ResolveError::unsupported(expr, format!("Dict keys must be str, got `{key}`")));
                }
                Ok(Schema::dict(self.annotation(&args[1], scope)?))
            }
            "Optional" | "optional" => {
                arity(1)?;
                match self.annotation(&args[0], scope)? {
                    already @ Schema::Optional(_) => Ok(already),
                    inner => Ok(Schema::optional(inner)),
                }
            }
            "Union" | "union" => {
                let members = args.iter().collect::<Vec<_>>();
                self.union(expr, &members, scope)
            }
            _ => Err(ResolveError::unsupported(expr, format!("unknown generic `{base}`"))),
        }
    }

    fn union(&mut self, whole: &TypeExpr, members: &[&TypeExpr], scope: &Scope) -> Result<Schema, ResolveError> {
        let mut nullable = false;
        let mut branches: Vec<Schema> = Vec::new();
        for member in members {
            if matches!(member, TypeExpr::None) {
                nullable = true;
                continue;
            }
            let resolved = self.annotation(member, scope).map_err(|err| match err {
                ResolveError::Unresolved { .. } => {
                    ResolveError::unsupported(whole, format!("union member `{member}` cannot be resolved: {err}"))
                }
                other => other,
            })?;
            let flattened = match resolved {
                Schema::Union(inner) => inner,
                Schema::Optional(inner) => {
                    nullable = true;
                    vec![*inner]
                }
                single => vec![single],
            };
            for branch in flattened {
                push_branch(whole, &mut branches, branch)?;
            }
        }
        let core = match branches.len() {
            0 => return Err(ResolveError::unsupported(whole, "union has no non-None member")),
            1 => branches.remove(0),
            _ => Schema::Union(branches),
        };
        Ok(if nullable { Schema::optional(core) } else { core })
    }

    // ---------------------------- named nodes ---------------------------- //

    fn find_type(&self, name: &str, scope: &Scope) -> Option<(DeclKey, Declaration)> {
        let (qualifier, base) = match name.rsplit_once('.') {
            Some((q, b)) => (Some(Scope::parse(q)), b),
            None => (None, name),
        };
        for candidate in scope.chain() {
            let target = match &qualifier {
                Some(q) => candidate.join(q),
                None => candidate,
            };
            if let Some(decl) = self.lookup.lookup(base, &target) {
                if decl.is_type() {
                    return Some((DeclKey::new(base, target), decl));
                }
            }
        }
        None
    }

    fn named(&mut self, name: &str, scope: &Scope) -> Result<Schema, ResolveError> {
        let found = self.find_type(name, scope).or_else(|| {
            // peer declarations of records already being resolved
            self.resolving
                .iter()
                .rev()
                .filter(|f| f.kind == FrameKind::Record)
                .find_map(|f| {
                    let hit = self.find_type(name, &f.body);
                    if hit.is_some() {
                        debug!(name, via = %f.key, "resolved through enclosing record scope");
                    }
                    hit
                })
        });
        let Some((key, decl)) = found else {
            return Err(ResolveError::unresolved(name, scope));
        };

        match decl {
            Declaration::Record { fields, provenance } => {
                if let Some(existing) = self.records.get(&key) {
                    if self.is_resolving(FrameKind::Record, &key) {
                        debug!(record = %key, "self-reference bound to placeholder");
                    }
                    return Ok(Schema::Record(existing.clone()));
                }
                let def = RecordDef::placeholder(key.clone(), provenance);
                self.records.insert(key.clone(), def.clone());

                let body = key.scope.child(&key.name);
                self.resolving.push(Frame { kind: FrameKind::Record, key: key.clone(), body: body.clone() });
                let resolved = fields
                    .iter()
                    .map(|(field, expr)| -> Result<_, ResolveError> {
                        Ok((field.clone(), self.annotation(expr, &body)?))
                    })
                    .collect::<Result<IndexMap<_, _>, _>>();
                self.resolving.pop();

                def.complete(resolved?);
                trace!(record = %key, fields = def.field_count(), "record complete");
                Ok(Schema::Record(def))
            }
            Declaration::Alias { target, provenance } => {
                if let Some(existing) = self.aliases.get(&key) {
                    if self.is_resolving(FrameKind::Alias, &key) {
                        debug!(alias = %key, "self-reference bound to placeholder");
                    }
                    return Ok(Schema::Alias(existing.clone()));
                }
                let def = AliasDef::placeholder(key.clone(), provenance);
                self.aliases.insert(key.clone(), def.clone());

                self.resolving.push(Frame { kind: FrameKind::Alias, key: key.clone(), body: key.scope.clone() });
                let resolved = self.annotation(&target, &key.scope);
                self.resolving.pop();
                let resolved = resolved?;

                // `A = Optional[A]`, `A = B` / `B = A`: a cycle that never
                // passes through a container would recurse forever downstream
                if reaches_unguarded(&resolved, &key, &mut HashSet::new()) {
                    return Err(ResolveError::unsupported(&target, format!("alias `{}` refers to itself without any structure", key.name)));
                }
                def.complete(resolved);
                Ok(Schema::Alias(def))
            }
            Declaration::Variable { .. } | Declaration::Operation { .. } => {
                Err(ResolveError::unresolved(name, scope))
            }
        }
    }

    fn is_resolving(&self, kind: FrameKind, key: &DeclKey) -> bool {
        self.resolving.iter().any(|f| f.kind == kind && &f.key == key)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn flatten_or<'e>(expr: &'e TypeExpr, out: &mut Vec<&'e TypeExpr>) {
    match expr {
        TypeExpr::Or(l, r) => {
            flatten_or(l, out);
            flatten_or(r, out);
        }
        other => out.push(other),
    }
}

/// Append a branch, dropping exact duplicates and rejecting distinct
/// branches that would share a tag.
fn push_branch(whole: &TypeExpr, branches: &mut Vec<Schema>, branch: Schema) -> Result<(), ResolveError> {
    let tag = branch.branch_tag();
    match branches.iter().find(|b| b.branch_tag() == tag) {
        Some(existing) if *existing == branch => Ok(()),
        Some(_) => Err(ResolveError::unsupported(whole, format!("two union members share the tag `{tag}`"))),
        None => {
            branches.push(branch);
            Ok(())
        }
    }
}

/// Can `schema` reach the alias `key` through Optional/Union/Alias nodes only?
fn reaches_unguarded(schema: &Schema, key: &DeclKey, seen: &mut HashSet<DeclKey>) -> bool {
    match schema {
        Schema::Alias(def) => {
            if def.key() == key {
                return true;
            }
            if !seen.insert(def.key().clone()) {
                return false;
            }
            match def.target() {
                Some(target) => reaches_unguarded(target, key, seen),
                // another alias still in flight: its own check will catch a loop
                None => false,
            }
        }
        Schema::Optional(inner) => reaches_unguarded(inner, key, seen),
        Schema::Union(branches) => branches.iter().any(|b| reaches_unguarded(b, key, seen)),
        _ => false,
    }
}
