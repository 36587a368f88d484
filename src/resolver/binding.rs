//! Global binding pass
//!
//! Sub-passes:
//! 1. Type declarations: bind `extends`/`implements` names, register
//!    implementor roles, then bind declared variable and return types
//! 2. References: drain each file's cached tokens in completion order and
//!    append the resulting bindings to the referencing entities

use super::{BuiltInTypes, FileScope, ImportLookupStrategy, ResolutionStrategy};
use crate::entity::{Binding, EntityData, EntityId, EntityKind, Import, ReferenceToken};
use crate::name::GenericName;
use crate::relation::RelationKind;
use crate::store::EntityStore;
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ResolverStats {
    pub total: usize,
    pub local: usize,
    pub import: usize,
    pub built_in: usize,
    pub duck_typed: usize,
    pub unresolved: usize,
    /// Resolved `extends`/`implements` names
    pub type_links: usize,
}

impl ResolverStats {
    fn record(&mut self, strategy: ResolutionStrategy) {
        match strategy {
            ResolutionStrategy::Local => self.local += 1,
            ResolutionStrategy::Import => self.import += 1,
            ResolutionStrategy::BuiltIn => self.built_in += 1,
            ResolutionStrategy::DuckTyping => self.duck_typed += 1,
        }
    }

    pub fn resolved(&self) -> usize {
        self.local + self.import + self.built_in + self.duck_typed
    }
}

impl fmt::Display for ResolverStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Binding Resolver Stats:")?;
        writeln!(f, "  Total References: {}", self.total)?;
        writeln!(f, "  Local: {}", self.local)?;
        writeln!(f, "  Import: {}", self.import)?;
        writeln!(f, "  Built-in: {}", self.built_in)?;
        writeln!(f, "  Duck typed: {}", self.duck_typed)?;
        writeln!(f, "  Unresolved: {}", self.unresolved)?;
        writeln!(f, "  Type links: {}", self.type_links)
    }
}

/// Namespace data of one file, copied out of the store.
#[derive(Debug, Clone, Default)]
struct FileContext {
    package: Option<String>,
    module: Option<String>,
    imports: Vec<Import>,
}

impl FileContext {
    fn scope(&self) -> FileScope<'_> {
        FileScope::new(self.package.as_deref(), self.module.as_deref(), &self.imports)
    }
}

pub struct BindingResolver<'a> {
    store: &'a EntityStore,
    lookup: &'a dyn ImportLookupStrategy,
    builtins: &'a dyn BuiltInTypes,
    enable_duck_typing: bool,
    /// Member short name → members of types, for duck typing
    member_index: HashMap<String, Vec<EntityId>>,
    contexts: HashMap<EntityId, FileContext>,
}

impl<'a> BindingResolver<'a> {
    pub fn new(
        store: &'a EntityStore,
        lookup: &'a dyn ImportLookupStrategy,
        builtins: &'a dyn BuiltInTypes,
        enable_duck_typing: bool,
    ) -> Self {
        Self {
            store,
            lookup,
            builtins,
            enable_duck_typing,
            member_index: HashMap::new(),
            contexts: HashMap::new(),
        }
    }

    pub fn run(&mut self) -> Result<ResolverStats> {
        let mut stats = ResolverStats {
            type_links: self.resolve_type_declarations()?,
            ..Default::default()
        };
        self.resolve_typed_slots()?;
        if self.enable_duck_typing {
            self.build_member_index();
        }

        for file in self.store.files_in_completion_order() {
            let context = self.file_context(file)?;
            for token in self.store.take_references(file) {
                stats.total += 1;
                let resolved = self
                    .resolve_token(&token, &context)
                    .and_then(|(targets, strategy)| self.bind(token.kind, targets, strategy));
                match resolved {
                    Some(binding) => {
                        stats.record(binding.strategy);
                        self.store
                            .update(token.from, |entity| entity.bindings.push(binding))
                            .ok_or(Error::StoreConsistency(token.from))?;
                    }
                    None => {
                        stats.unresolved += 1;
                        tracing::debug!(
                            "Unresolved {} reference '{}' from {} (line {})",
                            token.kind,
                            token.name,
                            token.from,
                            token.line
                        );
                    }
                }
            }
        }

        tracing::info!(
            "Resolved {}/{} references ({} unresolved)",
            stats.resolved(),
            stats.total,
            stats.unresolved
        );
        Ok(stats)
    }

    // ------------------------------------------------------------------
    // Sub-pass 1: type declarations
    // ------------------------------------------------------------------

    fn resolve_type_declarations(&mut self) -> Result<usize> {
        let mut links = 0;
        for id in self.store.ids() {
            if id == self.store.built_in() {
                continue;
            }
            let (mut data, scope) = match self.store.get_by_id(id) {
                Some(entity) => match entity.as_type() {
                    Some(data) => (data.clone(), entity.parent.unwrap_or(id)),
                    None => continue,
                },
                None => continue,
            };
            let context = self.context_of(id)?;

            let mut bindings = Vec::new();
            let mut role_keys = Vec::new();
            for (refs, kind) in [
                (&mut data.extends, RelationKind::Extend),
                (&mut data.implements, RelationKind::Implement),
            ] {
                for type_ref in refs.iter_mut() {
                    let Some((target, strategy)) =
                        self.resolve_type_name(&type_ref.name, scope, &context)
                    else {
                        tracing::debug!("Unresolved base type '{}' of {}", type_ref.name, id);
                        continue;
                    };
                    type_ref.target = Some(target);
                    links += 1;
                    bindings.push(Binding {
                        targets: vec![target],
                        kind,
                        strategy,
                    });
                    if let Some(key) = self.implementor_role_key(target, kind) {
                        role_keys.push(key);
                    }
                }
            }

            for key in role_keys {
                self.store.register_role(key, id);
            }
            self.store
                .update(id, |entity| {
                    entity.data = EntityData::Type(data);
                    entity.bindings.extend(bindings);
                })
                .ok_or(Error::StoreConsistency(id))?;
        }
        Ok(links)
    }

    /// Role under which a subtype is registered: every implemented
    /// interface, and a base type that is itself an interface or abstract
    fn implementor_role_key(&self, base: EntityId, kind: RelationKind) -> Option<String> {
        if base == self.store.built_in() {
            return None;
        }
        let entity = self.store.get_by_id(base)?;
        let data = entity.as_type()?;
        let register = kind == RelationKind::Implement || data.is_interface || data.is_abstract;
        register.then(|| entity.name_key())
    }

    /// Bind declared variable types and function return types so member
    /// walks can descend through them.
    fn resolve_typed_slots(&mut self) -> Result<()> {
        for id in self.store.ids() {
            let (name, scope) = match self.store.get_by_id(id) {
                Some(entity) => {
                    let slot = match &entity.data {
                        EntityData::Variable(v) => v.declared_type.as_ref(),
                        EntityData::Function(f) => f.return_type.as_ref(),
                        _ => None,
                    };
                    match slot {
                        Some(type_ref) if type_ref.target.is_none() => {
                            (type_ref.name.clone(), entity.parent.unwrap_or(id))
                        }
                        _ => continue,
                    }
                }
                None => continue,
            };
            let context = self.context_of(id)?;
            let Some((target, _)) = self.resolve_type_name(&name, scope, &context) else {
                continue;
            };
            self.store.update(id, |entity| match &mut entity.data {
                EntityData::Variable(v) => {
                    if let Some(t) = v.declared_type.as_mut() {
                        t.target = Some(target);
                    }
                }
                EntityData::Function(f) => {
                    if let Some(t) = f.return_type.as_mut() {
                        t.target = Some(target);
                    }
                }
                _ => {}
            });
        }
        Ok(())
    }

    /// Resolve a type name through local scope, imports and built-ins.
    /// Only `Type` declarations are accepted.
    fn resolve_type_name(
        &self,
        name: &GenericName,
        scope: EntityId,
        context: &FileContext,
    ) -> Option<(EntityId, ResolutionStrategy)> {
        let text = name.name();
        let segments: Vec<&str> = text.split('.').collect();
        let (head, rest) = segments.split_first()?;

        let local = self.walk(self.local_head(scope, head), rest);
        if let Some(target) = self.first_type(&local) {
            return Some((target, ResolutionStrategy::Local));
        }

        for key in self.candidate_keys(text, context) {
            let found = self.resolve_key(&key);
            if let Some(target) = self.first_type(&found) {
                return Some((target, ResolutionStrategy::Import));
            }
        }

        self.builtins
            .is_built_in(text)
            .then(|| (self.store.built_in(), ResolutionStrategy::BuiltIn))
    }

    fn first_type(&self, candidates: &[EntityId]) -> Option<EntityId> {
        candidates
            .iter()
            .copied()
            .filter(|id| self.is_type(*id))
            .min()
    }

    // ------------------------------------------------------------------
    // Sub-pass 2: references
    // ------------------------------------------------------------------

    fn resolve_token(
        &self,
        token: &ReferenceToken,
        context: &FileContext,
    ) -> Option<(Vec<EntityId>, ResolutionStrategy)> {
        // `.member`: receiver the front-end could not name
        if let Some(member) = token.name.strip_prefix('.') {
            return self.duck_type(member, token);
        }

        let segments: Vec<&str> = token.name.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return None;
        }
        let (head, rest) = segments.split_first()?;
        let last = segments.last().copied().unwrap_or(*head);

        // 1. Local scope
        let heads = self.local_head(token.from, head);
        if !heads.is_empty() {
            let found = self.select(self.walk(heads, rest), token, true);
            if found.is_empty() {
                return if rest.is_empty() {
                    None
                } else {
                    self.duck_type(last, token)
                };
            }
            let strategy = if found == [self.store.built_in()] {
                ResolutionStrategy::BuiltIn
            } else {
                ResolutionStrategy::Local
            };
            return Some((found, strategy));
        }

        // 2. Import-qualified lookup
        for key in self.candidate_keys(&token.name, context) {
            let found = self.select(self.resolve_key(&key), token, true);
            if !found.is_empty() {
                return Some((found, ResolutionStrategy::Import));
            }
        }

        // 3. Built-in table
        if self.builtins.is_built_in(&token.name) {
            return Some((vec![self.store.built_in()], ResolutionStrategy::BuiltIn));
        }

        // 4. Duck typing
        if rest.is_empty() {
            return None;
        }
        self.duck_type(last, token)
    }

    fn candidate_keys(&self, name: &str, context: &FileContext) -> Vec<String> {
        let mut keys = self.lookup.candidate_keys(name, &context.scope());
        if !keys.iter().any(|k| k == name) {
            keys.push(name.to_string());
        }
        keys
    }

    /// Resolve a qualified key by its longest registered prefix, then walk
    /// the remaining segments as members.
    fn resolve_key(&self, key: &str) -> Vec<EntityId> {
        let segments: Vec<&str> = key.split('.').collect();
        for split in (1..=segments.len()).rev() {
            let prefix = segments[..split].join(".");
            let found: Vec<EntityId> = self
                .store
                .resolve_name(&prefix)
                .into_iter()
                .filter(|id| self.is_qualified_as(*id, &prefix))
                .collect();
            if !found.is_empty() {
                return self.walk(found, &segments[split..]);
            }
        }
        Vec::new()
    }

    fn duck_type(
        &self,
        member: &str,
        token: &ReferenceToken,
    ) -> Option<(Vec<EntityId>, ResolutionStrategy)> {
        if !self.enable_duck_typing {
            return None;
        }
        let candidates = self.member_index.get(member)?.clone();
        let candidates: Vec<EntityId> = candidates
            .into_iter()
            .filter(|id| token.kind != RelationKind::Call || self.kind(*id) == Some(EntityKind::Function))
            .collect();
        let found = self.select(candidates, token, false);
        (!found.is_empty()).then_some((found, ResolutionStrategy::DuckTyping))
    }

    fn build_member_index(&mut self) {
        let mut index: HashMap<String, Vec<EntityId>> = HashMap::new();
        for id in self.store.ids() {
            let (name, parent) = match self.store.get_by_id(id) {
                Some(entity)
                    if matches!(entity.kind(), EntityKind::Function | EntityKind::Variable) =>
                {
                    match entity.parent {
                        Some(parent) => (entity.short_name().to_string(), parent),
                        None => continue,
                    }
                }
                _ => continue,
            };
            if self.is_type(parent) {
                index.entry(name).or_default().push(id);
            }
        }
        self.member_index = index;
    }

    /// Narrow candidates: type-valued tokens prefer types, functions must
    /// match the call's arity, and precise strategies keep one non-type
    /// declaration (the earliest).
    /// A call landing on a type instantiates it; relations that name a
    /// type keep only type targets
    fn bind(&self, kind: RelationKind, targets: Vec<EntityId>, strategy: ResolutionStrategy) -> Option<Binding> {
        let all_types = !targets.is_empty() && targets.iter().all(|id| self.is_type(*id));
        let (kind, targets) = match kind {
            RelationKind::Call if all_types && !targets.contains(&self.store.built_in()) => {
                (RelationKind::Create, targets)
            }
            kind if kind.refers_to_type() && !all_types => {
                let types: Vec<EntityId> = targets.into_iter().filter(|id| self.is_type(*id)).collect();
                if types.is_empty() {
                    return None;
                }
                (kind, types)
            }
            kind => (kind, targets),
        };
        Some(Binding {
            targets,
            kind,
            strategy,
        })
    }

    fn select(&self, candidates: Vec<EntityId>, token: &ReferenceToken, precise: bool) -> Vec<EntityId> {
        let mut candidates = candidates;
        candidates.sort_unstable();
        candidates.dedup();

        if token.kind.refers_to_type() {
            let types: Vec<EntityId> = candidates.iter().copied().filter(|id| self.is_type(*id)).collect();
            if !types.is_empty() {
                candidates = types;
            }
        }

        if let Some(arity) = token.arity {
            let matching: Vec<EntityId> = candidates
                .iter()
                .copied()
                .filter(|id| self.arity(*id).is_none_or(|a| a == arity))
                .collect();
            // default and variadic parameters make arity a hint for precise lookups
            if !matching.is_empty() || !precise {
                candidates = matching;
            }
        }

        if !precise || candidates.len() <= 1 || candidates.iter().all(|id| self.is_type(*id)) {
            return candidates;
        }
        candidates.truncate(1);
        candidates
    }

    // ------------------------------------------------------------------
    // Scope walking
    // ------------------------------------------------------------------

    /// Declarations a path head names from `from`'s point of view
    fn local_head(&self, from: EntityId, head: &str) -> Vec<EntityId> {
        if self.builtins.is_self_keyword(head) {
            return self.enclosing_type(from).into_iter().collect();
        }
        if self.builtins.is_super_keyword(head) {
            return self
                .enclosing_type(from)
                .map(|ty| self.supertypes(ty))
                .unwrap_or_default();
        }

        let mut scope = Some(from);
        while let Some(current) = scope {
            let found = if self.is_type(current) {
                self.members(current, head, &mut HashSet::new())
            } else {
                self.children_named(current, head)
            };
            if !found.is_empty() {
                return found;
            }
            scope = self.parent(current);
        }
        Vec::new()
    }

    /// Follow `rest` member by member from every start candidate
    fn walk(&self, start: Vec<EntityId>, rest: &[&str]) -> Vec<EntityId> {
        let mut current = start;
        for segment in rest {
            let mut next = Vec::new();
            for id in &current {
                for container in self.containers(*id) {
                    for member in self.members(container, segment, &mut HashSet::new()) {
                        if !next.contains(&member) {
                            next.push(member);
                        }
                    }
                }
            }
            if next.is_empty() {
                return next;
            }
            current = next;
        }
        current
    }

    /// What a member access on `id` descends into
    fn containers(&self, id: EntityId) -> Vec<EntityId> {
        if id == self.store.built_in() {
            return vec![id];
        }
        let Some(entity) = self.store.get_by_id(id) else {
            return Vec::new();
        };
        match &entity.data {
            EntityData::File(_) | EntityData::Type(_) => vec![id],
            EntityData::Variable(v) => v.declared_type.as_ref().and_then(|t| t.target).into_iter().collect(),
            EntityData::Function(f) => f.return_type.as_ref().and_then(|t| t.target).into_iter().collect(),
            EntityData::MultiDeclare(m) => {
                let members = m.entities.clone();
                drop(entity);
                members.into_iter().flat_map(|member| self.containers(member)).collect()
            }
        }
    }

    /// Members named `name` of a container, including inherited ones.
    /// Built-in containers swallow every member.
    fn members(&self, container: EntityId, name: &str, visited: &mut HashSet<EntityId>) -> Vec<EntityId> {
        if container == self.store.built_in() {
            return vec![container];
        }
        if !visited.insert(container) {
            return Vec::new();
        }
        let direct = self.children_named(container, name);
        if !direct.is_empty() || !self.is_type(container) {
            return direct;
        }
        for base in self.supertypes(container) {
            let inherited = self.members(base, name, visited);
            if !inherited.is_empty() {
                return inherited;
            }
        }
        Vec::new()
    }

    fn children_named(&self, scope: EntityId, name: &str) -> Vec<EntityId> {
        let children = match self.store.get_by_id(scope) {
            Some(entity) => entity.children.clone(),
            None => return Vec::new(),
        };
        children
            .into_iter()
            .filter(|child| {
                self.store
                    .get_by_id(*child)
                    .map(|e| e.short_name() == name)
                    .unwrap_or(false)
            })
            .collect()
    }

    fn enclosing_type(&self, from: EntityId) -> Option<EntityId> {
        let mut scope = Some(from);
        while let Some(current) = scope {
            if self.is_type(current) {
                return Some(current);
            }
            scope = self.parent(current);
        }
        None
    }

    /// Resolved base types, `extends` before `implements`
    fn supertypes(&self, ty: EntityId) -> Vec<EntityId> {
        let Some(entity) = self.store.get_by_id(ty) else {
            return Vec::new();
        };
        let Some(data) = entity.as_type() else {
            return Vec::new();
        };
        data.extends
            .iter()
            .chain(&data.implements)
            .filter_map(|t| t.target)
            .filter(|t| *t != ty)
            .collect()
    }

    // ------------------------------------------------------------------
    // Entity accessors
    // ------------------------------------------------------------------

    fn kind(&self, id: EntityId) -> Option<EntityKind> {
        self.store.get_by_id(id).map(|e| e.kind())
    }

    fn is_type(&self, id: EntityId) -> bool {
        self.kind(id) == Some(EntityKind::Type)
    }

    fn parent(&self, id: EntityId) -> Option<EntityId> {
        self.store.get_by_id(id).and_then(|e| e.parent)
    }

    fn arity(&self, id: EntityId) -> Option<usize> {
        self.store.get_by_id(id).and_then(|e| e.arity())
    }

    fn is_qualified_as(&self, id: EntityId, key: &str) -> bool {
        self.store
            .get_by_id(id)
            .map(|e| e.qualified_name.as_deref() == Some(key))
            .unwrap_or(false)
    }

    fn context_of(&mut self, id: EntityId) -> Result<FileContext> {
        match self.store.file_of(id) {
            Some(file) => self.file_context(file),
            None => Ok(FileContext::default()),
        }
    }

    fn file_context(&mut self, file: EntityId) -> Result<FileContext> {
        if let Some(context) = self.contexts.get(&file) {
            return Ok(context.clone());
        }
        let entity = self.store.get_by_id(file).ok_or(Error::StoreConsistency(file))?;
        let context = entity
            .as_file()
            .map(|data| FileContext {
                package: data.package.clone(),
                module: data.module.clone(),
                imports: data.imports.clone(),
            })
            .unwrap_or_default();
        drop(entity);
        self.contexts.insert(file, context.clone());
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, FileData, FunctionData, TypeData, TypeRef, VariableData};
    use crate::resolver::{JavaBuiltIns, JavaImportLookup};

    struct Fixture {
        store: EntityStore,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: EntityStore::new(),
            }
        }

        fn file(&self, path: &str, package: &str) -> EntityId {
            let data = FileData {
                package: Some(package.to_string()),
                ..Default::default()
            };
            self.store.add(Entity::file(self.store.generate_id(), path, data))
        }

        fn ty(&self, parent: EntityId, qualified: &str, data: TypeData) -> EntityId {
            let short = qualified.rsplit('.').next().unwrap_or(qualified);
            self.store.add(
                Entity::new(self.store.generate_id(), short, EntityData::Type(data))
                    .with_qualified_name(qualified)
                    .with_parent(parent),
            )
        }

        fn function(&self, parent: EntityId, qualified: &str, params: &[(&str, &str)]) -> EntityId {
            let short = qualified.rsplit('.').next().unwrap_or(qualified);
            let id = self.store.add(
                Entity::new(self.store.generate_id(), short, EntityData::Function(FunctionData::default()))
                    .with_qualified_name(qualified)
                    .with_parent(parent),
            );
            let mut ids = Vec::new();
            for (name, ty) in params {
                let data = VariableData {
                    declared_type: Some(TypeRef::new(*ty)),
                };
                ids.push(self.store.add(
                    Entity::new(self.store.generate_id(), *name, EntityData::Variable(data)).with_parent(id),
                ));
            }
            self.store.update(id, |e| {
                if let EntityData::Function(f) = &mut e.data {
                    f.parameters = ids;
                }
            });
            id
        }

        fn reference(&self, from: EntityId, name: &str, kind: RelationKind, arity: Option<usize>) {
            let mut token = ReferenceToken::new(from, name, kind);
            token.arity = arity;
            self.store.submit_reference(token).unwrap();
        }

        fn run(&self, duck_typing: bool) -> ResolverStats {
            for file in self.store.ids() {
                if self.store.get_by_id(file).unwrap().kind() == EntityKind::File {
                    self.store.complete_file(file);
                }
            }
            let lookup = JavaImportLookup;
            let builtins = JavaBuiltIns;
            BindingResolver::new(&self.store, &lookup, &builtins, duck_typing)
                .run()
                .unwrap()
        }

        fn bindings(&self, id: EntityId) -> Vec<Binding> {
            self.store.get_by_id(id).unwrap().bindings.clone()
        }
    }

    fn interface() -> TypeData {
        TypeData {
            is_interface: true,
            ..Default::default()
        }
    }

    fn implementing(name: &str) -> TypeData {
        TypeData {
            implements: vec![TypeRef::new(name)],
            ..Default::default()
        }
    }

    #[test]
    fn test_local_sibling_method() {
        let fx = Fixture::new();
        let file = fx.file("/p/A.java", "p");
        let a = fx.ty(file, "p.A", TypeData::default());
        let f = fx.function(a, "p.A.f", &[]);
        let g = fx.function(a, "p.A.g", &[]);
        fx.reference(f, "g", RelationKind::Call, Some(0));

        let stats = fx.run(false);
        assert_eq!(stats.local, 1);
        assert_eq!(
            fx.bindings(f),
            vec![Binding {
                targets: vec![g],
                kind: RelationKind::Call,
                strategy: ResolutionStrategy::Local,
            }]
        );
    }

    #[test]
    fn test_implements_registers_role_and_walks_parameter_type() {
        let fx = Fixture::new();
        let shape_file = fx.file("/p/Shape.java", "p");
        let shape = fx.ty(shape_file, "p.Shape", interface());
        let area = fx.function(shape, "p.Shape.area", &[]);

        let circle_file = fx.file("/p/Circle.java", "p");
        let circle = fx.ty(circle_file, "p.Circle", implementing("Shape"));
        let render = fx.function(circle, "p.Circle.render", &[("s", "Shape")]);
        fx.reference(render, "s.area", RelationKind::Call, Some(0));

        let stats = fx.run(false);
        assert_eq!(stats.type_links, 1);
        assert_eq!(fx.store.lookup_role("p.Shape"), vec![circle]);

        let circle_bindings = fx.bindings(circle);
        assert_eq!(circle_bindings[0].targets, vec![shape]);
        assert_eq!(circle_bindings[0].kind, RelationKind::Implement);
        assert_eq!(circle_bindings[0].strategy, ResolutionStrategy::Import);

        assert_eq!(fx.bindings(render)[0].targets, vec![area]);
    }

    #[test]
    fn test_this_and_inherited_members() {
        let fx = Fixture::new();
        let file = fx.file("/p/B.java", "p");
        let base = fx.ty(file, "p.Base", TypeData::default());
        let helper = fx.function(base, "p.Base.helper", &[]);
        let derived = fx.ty(
            file,
            "p.Derived",
            TypeData {
                extends: vec![TypeRef::new("Base")],
                ..Default::default()
            },
        );
        let run = fx.function(derived, "p.Derived.run", &[]);
        fx.reference(run, "this.helper", RelationKind::Call, Some(0));
        fx.reference(run, "super.helper", RelationKind::Call, Some(0));

        fx.run(false);
        let bindings = fx.bindings(run);
        assert_eq!(bindings.len(), 2);
        assert!(bindings.iter().all(|b| b.targets == vec![helper]));
        // concrete base: no implementor role
        assert!(fx.store.lookup_role("p.Base").is_empty());
    }

    #[test]
    fn test_built_in_references_bind_to_sentinel() {
        let fx = Fixture::new();
        let file = fx.file("/p/A.java", "p");
        let a = fx.ty(file, "p.A", TypeData::default());
        let f = fx.function(a, "p.A.f", &[("name", "String")]);
        fx.reference(f, "System.out.println", RelationKind::Call, Some(1));
        fx.reference(f, "name.length", RelationKind::Call, Some(0));

        let stats = fx.run(false);
        assert_eq!(stats.built_in, 2);
        assert!(fx.bindings(f).iter().all(|b| b.targets == vec![fx.store.built_in()]));
    }

    #[test]
    fn test_duck_typing_is_gated() {
        for enabled in [false, true] {
            let fx = Fixture::new();
            let file = fx.file("/p/A.java", "p");
            let a = fx.ty(file, "p.A", TypeData::default());
            let quack = fx.function(a, "p.A.quack", &[]);
            let b = fx.ty(file, "p.B", TypeData::default());
            let other = fx.function(b, "p.B.quack", &[("loud", "boolean")]);
            let caller = fx.function(b, "p.B.caller", &[]);
            fx.reference(caller, ".quack", RelationKind::Call, Some(0));
            fx.reference(caller, "unknown.quack", RelationKind::Call, None);

            let stats = fx.run(enabled);
            let bindings = fx.bindings(caller);
            if enabled {
                assert_eq!(stats.duck_typed, 2);
                assert_eq!(bindings[0].targets, vec![quack]);
                assert_eq!(bindings[1].targets, vec![quack, other]);
                assert!(bindings.iter().all(|b| b.strategy == ResolutionStrategy::DuckTyping));
            } else {
                assert_eq!(stats.unresolved, 2);
                assert!(bindings.is_empty());
            }
        }
    }

    #[test]
    fn test_duck_typing_only_adds_bindings() {
        let resolve = |duck_typing: bool| {
            let fx = Fixture::new();
            let a_file = fx.file("/p/A.java", "p");
            let a = fx.ty(a_file, "p.A", TypeData::default());
            fx.function(a, "p.A.g", &[]);
            fx.function(a, "p.A.quack", &[]);

            let b_file = fx.file("/q/B.java", "q");
            let b = fx.ty(b_file, "q.B", TypeData::default());
            fx.function(b, "q.B.helper", &[]);
            let caller = fx.function(b, "q.B.caller", &[]);
            fx.reference(caller, "helper", RelationKind::Call, Some(0));
            fx.reference(caller, "p.A.g", RelationKind::Call, Some(0));
            fx.reference(caller, "System.out.println", RelationKind::Call, Some(1));
            fx.reference(caller, ".quack", RelationKind::Call, Some(0));

            let stats = fx.run(duck_typing);
            let precise: Vec<_> = fx
                .bindings(caller)
                .into_iter()
                .filter(|b| b.strategy != ResolutionStrategy::DuckTyping)
                .map(|b| {
                    let names: Vec<String> = b
                        .targets
                        .iter()
                        .map(|id| fx.store.get_by_id(*id).unwrap().name_key())
                        .collect();
                    (names, b.kind, b.strategy)
                })
                .collect();
            (stats, precise)
        };

        let (off, precise_off) = resolve(false);
        let (on, precise_on) = resolve(true);

        assert_eq!(precise_off, precise_on);
        assert_eq!(
            precise_off.iter().map(|(_, _, s)| *s).collect::<Vec<_>>(),
            vec![
                ResolutionStrategy::Local,
                ResolutionStrategy::Import,
                ResolutionStrategy::BuiltIn
            ]
        );
        assert_eq!(precise_off[1].0, vec!["p.A.g".to_string()]);
        assert_eq!(off.duck_typed, 0);
        assert_eq!(on.duck_typed, 1);
        assert_eq!(off.resolved() + 1, on.resolved());
    }

    #[test]
    fn test_call_to_type_becomes_create() {
        let fx = Fixture::new();
        let file = fx.file("/p/m.py", "p");
        let bar = fx.ty(file, "p.Bar", TypeData::default());
        let make = fx.function(file, "p.make", &[]);
        let caller = fx.function(file, "p.caller", &[]);
        fx.reference(caller, "Bar", RelationKind::Call, Some(0));
        fx.reference(caller, "Bar", RelationKind::Return, None);
        fx.reference(caller, "make", RelationKind::Return, None);
        fx.reference(caller, "make", RelationKind::Call, Some(0));

        let stats = fx.run(false);
        let kinds: Vec<(RelationKind, Vec<EntityId>)> =
            fx.bindings(caller).into_iter().map(|b| (b.kind, b.targets)).collect();
        assert_eq!(
            kinds,
            vec![
                (RelationKind::Create, vec![bar]),
                (RelationKind::Return, vec![bar]),
                (RelationKind::Call, vec![make]),
            ]
        );
        assert_eq!(stats.unresolved, 1);
    }

    #[test]
    fn test_arity_selects_overload() {
        let fx = Fixture::new();
        let file = fx.file("/p/A.java", "p");
        let a = fx.ty(file, "p.A", TypeData::default());
        let one = fx.function(a, "p.A.log", &[("msg", "String")]);
        let two = fx.function(a, "p.A.log", &[("msg", "String"), ("level", "int")]);
        let caller = fx.function(a, "p.A.caller", &[]);
        fx.reference(caller, "log", RelationKind::Call, Some(2));
        fx.reference(caller, "p.A.log", RelationKind::Call, Some(1));

        fx.run(false);
        let bindings = fx.bindings(caller);
        assert_eq!(bindings[0].targets, vec![two]);
        assert_eq!(bindings[1].targets, vec![one]);
        assert_eq!(bindings[1].strategy, ResolutionStrategy::Import);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let build = || {
            let fx = Fixture::new();
            let file = fx.file("/p/A.java", "p");
            let a = fx.ty(file, "p.A", TypeData::default());
            fx.function(a, "p.A.run", &[]);
            fx.function(a, "p.A.run", &[]);
            let caller = fx.function(a, "p.A.caller", &[]);
            fx.reference(caller, "run", RelationKind::Call, Some(0));
            fx.reference(caller, "missing", RelationKind::Call, None);
            fx.run(true);
            fx.bindings(caller)
        };
        let first = build();
        assert_eq!(first.len(), 1);
        assert_eq!(first.len(), build().len());
        assert_eq!(first[0].targets.len(), 1);
        assert_eq!(first, build());
    }
}
