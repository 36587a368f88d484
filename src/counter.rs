//! Relation Counter - turns bindings into typed edges
//!
//! Rules:
//! - one edge per `(target, kind)` on the source entity
//! - no self edges, no edges to the built-in sentinel
//! - edges into external entities only when requested
//! - a call or use of a method declared on an interface (or abstract base)
//!   with registered implementors is redirected to every concrete
//!   implementation; those methods are then processed in turn

use crate::entity::{EntityId, EntityKind};
use crate::name::signature_role_key;
use crate::relation::{Relation, RelationKind};
use crate::store::EntityStore;
use crate::{Error, Result};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct CounterStats {
    /// Entities whose relations were computed in this run
    pub processed: usize,
    pub edges: usize,
    /// Bindings redirected to implementor methods
    pub expanded: usize,
    pub skipped_external: usize,
}

impl fmt::Display for CounterStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Relation Counter Stats:")?;
        writeln!(f, "  Processed entities: {}", self.processed)?;
        writeln!(f, "  Edges: {}", self.edges)?;
        writeln!(f, "  Expanded to implementors: {}", self.expanded)?;
        writeln!(f, "  Skipped external: {}", self.skipped_external)
    }
}

pub struct RelationCounter<'a> {
    store: &'a EntityStore,
    emit_external: bool,
}

impl<'a> RelationCounter<'a> {
    pub fn new(store: &'a EntityStore, emit_external: bool) -> Self {
        Self {
            store,
            emit_external,
        }
    }

    pub fn run(&self) -> Result<CounterStats> {
        let mut stats = CounterStats::default();
        let mut pending: VecDeque<EntityId> = VecDeque::new();

        for id in self.store.ids() {
            pending.push_back(id);
            while let Some(next) = pending.pop_front() {
                self.process(next, &mut pending, &mut stats)?;
            }
        }

        tracing::info!(
            "Computed {} relations over {} entities ({} expanded to implementors)",
            stats.edges,
            stats.processed,
            stats.expanded
        );
        Ok(stats)
    }

    fn process(&self, id: EntityId, pending: &mut VecDeque<EntityId>, stats: &mut CounterStats) -> Result<()> {
        let bindings = self
            .store
            .update(id, |entity| {
                if entity.relations_computed {
                    return None;
                }
                entity.relations_computed = true;
                Some(entity.bindings.clone())
            })
            .ok_or(Error::StoreConsistency(id))?;
        let Some(bindings) = bindings else {
            return Ok(());
        };
        stats.processed += 1;

        let mut edges: Vec<Relation> = Vec::new();
        for binding in bindings {
            for target in binding.targets {
                if target == self.store.built_in() {
                    continue;
                }
                let implementations = if binding.kind.is_dispatchable() {
                    self.concrete_implementations(target)
                } else {
                    Vec::new()
                };

                if implementations.is_empty() {
                    self.push_edge(id, target, binding.kind, &mut edges, stats);
                    continue;
                }
                stats.expanded += 1;
                for method in implementations {
                    self.push_edge(id, method, binding.kind, &mut edges, stats);
                    pending.push_back(method);
                }
            }
        }

        stats.edges += edges.len();
        self.store
            .update(id, |entity| entity.relations.extend(edges))
            .ok_or(Error::StoreConsistency(id))
    }

    fn push_edge(
        &self,
        from: EntityId,
        target: EntityId,
        kind: RelationKind,
        edges: &mut Vec<Relation>,
        stats: &mut CounterStats,
    ) {
        if target == from {
            return;
        }
        if !self.emit_external && self.is_external(target) {
            stats.skipped_external += 1;
            return;
        }
        let relation = Relation::new(target, kind);
        if !edges.contains(&relation) {
            edges.push(relation);
        }
    }

    /// Concrete methods implementing `method` in every registered
    /// implementor of its declaring type, following implementors of
    /// implementors. Empty when the declaring type has none.
    fn concrete_implementations(&self, method: EntityId) -> Vec<EntityId> {
        let Some(signature) = self.signature(method) else {
            return Vec::new();
        };

        let mut found = BTreeSet::new();
        let mut visited: HashSet<EntityId> = HashSet::from([signature.owner]);
        let mut queue: VecDeque<EntityId> = self.store.lookup_role(&signature.owner_key).into();

        while let Some(implementor) = queue.pop_front() {
            if !visited.insert(implementor) {
                continue;
            }
            let Some(implementor_key) = self.store.get_by_id(implementor).map(|e| e.name_key()) else {
                continue;
            };
            match self.find_method(implementor, &implementor_key, &signature) {
                Some(concrete) if concrete != method => {
                    found.insert(concrete);
                }
                _ => {}
            }
            queue.extend(self.store.lookup_role(&implementor_key));
        }

        found.into_iter().collect()
    }

    fn find_method(&self, implementor: EntityId, implementor_key: &str, signature: &Signature) -> Option<EntityId> {
        let params: Vec<&str> = signature.params.iter().map(String::as_str).collect();
        let by_role = self
            .store
            .lookup_role(&signature_role_key(implementor_key, &signature.name, &params))
            .into_iter()
            .find(|id| self.is_concrete_member(*id, implementor));
        if by_role.is_some() {
            return by_role;
        }

        let children = self.store.get_by_id(implementor)?.children.clone();
        children.into_iter().find(|child| {
            self.store
                .get_by_id(*child)
                .map(|e| {
                    e.short_name() == signature.name
                        && e.arity() == Some(signature.arity)
                        && e.as_function().is_some_and(|f| !f.is_abstract)
                })
                .unwrap_or(false)
        })
    }

    fn is_concrete_member(&self, id: EntityId, owner: EntityId) -> bool {
        self.store
            .get_by_id(id)
            .map(|e| e.parent == Some(owner) && e.as_function().is_some_and(|f| !f.is_abstract))
            .unwrap_or(false)
    }

    /// Name, arity and parameter types of a method declared on a type
    fn signature(&self, method: EntityId) -> Option<Signature> {
        let (name, owner, parameters) = {
            let entity = self.store.get_by_id(method)?;
            let function = entity.as_function()?;
            (entity.short_name().to_string(), entity.parent?, function.parameters.clone())
        };
        let owner_key = {
            let entity = self.store.get_by_id(owner)?;
            if entity.kind() != EntityKind::Type {
                return None;
            }
            entity.name_key()
        };
        let params = parameters
            .iter()
            .filter_map(|p| self.store.get_by_id(*p).map(|e| parameter_role_name(&e)))
            .collect();
        Some(Signature {
            name,
            owner,
            owner_key,
            arity: parameters.len(),
            params,
        })
    }

    fn is_external(&self, id: EntityId) -> bool {
        self.store.get_by_id(id).map(|e| e.external).unwrap_or(false)
    }
}

struct Signature {
    name: String,
    owner: EntityId,
    owner_key: String,
    arity: usize,
    params: Vec<String>,
}

/// Parameter component of a signature role key: the declared type when
/// present, else the parameter name
fn parameter_role_name(parameter: &crate::entity::Entity) -> String {
    parameter
        .as_variable()
        .and_then(|v| v.declared_type.as_ref())
        .map(|t| t.name.uniq_name())
        .unwrap_or_else(|| parameter.short_name().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Binding, Entity, EntityData, FileData, FunctionData, TypeData, VariableData};
    use crate::resolver::ResolutionStrategy;

    fn ty(store: &EntityStore, qualified: &str, interface: bool) -> EntityId {
        let data = TypeData {
            is_interface: interface,
            ..Default::default()
        };
        store.add(Entity::new(store.generate_id(), qualified, EntityData::Type(data)).with_qualified_name(qualified))
    }

    fn method(store: &EntityStore, owner: EntityId, owner_key: &str, name: &str, is_abstract: bool) -> EntityId {
        let data = FunctionData {
            is_abstract,
            ..Default::default()
        };
        let id = store.add(
            Entity::new(store.generate_id(), name, EntityData::Function(data))
                .with_qualified_name(format!("{}.{}", owner_key, name))
                .with_parent(owner),
        );
        store.register_role(signature_role_key(owner_key, name, &[]), id);
        id
    }

    fn bind(store: &EntityStore, from: EntityId, targets: Vec<EntityId>, kind: RelationKind) {
        store.update(from, |e| {
            e.bindings.push(Binding {
                targets,
                kind,
                strategy: ResolutionStrategy::Local,
            })
        });
    }

    fn relations(store: &EntityStore, id: EntityId) -> Vec<Relation> {
        store.get_by_id(id).unwrap().relations.clone()
    }

    #[test]
    fn test_sibling_call_single_edge() {
        let store = EntityStore::new();
        let a = ty(&store, "A", false);
        let f = method(&store, a, "A", "f", false);
        let g = method(&store, a, "A", "g", false);
        bind(&store, f, vec![g], RelationKind::Call);
        bind(&store, f, vec![g], RelationKind::Call);

        RelationCounter::new(&store, false).run().unwrap();
        assert_eq!(relations(&store, f), vec![Relation::new(g, RelationKind::Call)]);
        assert!(relations(&store, g).is_empty());
    }

    #[test]
    fn test_no_self_or_built_in_edges() {
        let store = EntityStore::new();
        let a = ty(&store, "A", false);
        let f = method(&store, a, "A", "f", false);
        bind(&store, f, vec![f], RelationKind::Call);
        bind(&store, f, vec![store.built_in()], RelationKind::Use);

        let stats = RelationCounter::new(&store, false).run().unwrap();
        assert_eq!(stats.edges, 0);
        assert!(relations(&store, f).is_empty());
    }

    #[test]
    fn test_interface_call_expands_to_implementors() {
        let store = EntityStore::new();
        let shape = ty(&store, "Shape", true);
        let area = method(&store, shape, "Shape", "area", true);
        let circle = ty(&store, "Circle", false);
        let circle_area = method(&store, circle, "Circle", "area", false);
        let square = ty(&store, "Square", false);
        let square_area = method(&store, square, "Square", "area", false);
        store.register_role("Shape", circle);
        store.register_role("Shape", square);

        let main = ty(&store, "Main", false);
        let run = method(&store, main, "Main", "run", false);
        bind(&store, run, vec![area], RelationKind::Call);
        bind(&store, circle, vec![shape], RelationKind::Implement);

        let stats = RelationCounter::new(&store, false).run().unwrap();
        assert_eq!(
            relations(&store, run),
            vec![
                Relation::new(circle_area, RelationKind::Call),
                Relation::new(square_area, RelationKind::Call),
            ]
        );
        assert_eq!(relations(&store, circle), vec![Relation::new(shape, RelationKind::Implement)]);
        assert_eq!(stats.expanded, 1);
    }

    #[test]
    fn test_mutual_interface_calls_terminate() {
        let store = EntityStore::new();
        let shape = ty(&store, "Shape", true);
        let area = method(&store, shape, "Shape", "area", true);
        let perimeter = method(&store, shape, "Shape", "perimeter", true);
        let circle = ty(&store, "Circle", false);
        let circle_area = method(&store, circle, "Circle", "area", false);
        let circle_perimeter = method(&store, circle, "Circle", "perimeter", false);
        store.register_role("Shape", circle);
        bind(&store, circle_area, vec![perimeter], RelationKind::Call);
        bind(&store, circle_perimeter, vec![area], RelationKind::Call);

        RelationCounter::new(&store, false).run().unwrap();
        assert_eq!(
            relations(&store, circle_area),
            vec![Relation::new(circle_perimeter, RelationKind::Call)]
        );
        assert_eq!(
            relations(&store, circle_perimeter),
            vec![Relation::new(circle_area, RelationKind::Call)]
        );
    }

    #[test]
    fn test_implementors_of_implementors() {
        let store = EntityStore::new();
        let shape = ty(&store, "Shape", true);
        let area = method(&store, shape, "Shape", "area", true);
        let base = ty(&store, "BaseShape", false);
        let deep = ty(&store, "Circle", false);
        let deep_area = method(&store, deep, "Circle", "area", false);
        store.register_role("Shape", base);
        store.register_role("BaseShape", deep);

        let caller = ty(&store, "Main", false);
        let run = method(&store, caller, "Main", "run", false);
        bind(&store, run, vec![area], RelationKind::Call);

        RelationCounter::new(&store, false).run().unwrap();
        assert_eq!(relations(&store, run), vec![Relation::new(deep_area, RelationKind::Call)]);
    }

    #[test]
    fn test_no_implementation_keeps_static_target() {
        let store = EntityStore::new();
        let shape = ty(&store, "Shape", true);
        let area = method(&store, shape, "Shape", "area", true);
        let blob = ty(&store, "Blob", false);
        store.register_role("Shape", blob);
        let caller = ty(&store, "Main", false);
        let run = method(&store, caller, "Main", "run", false);
        bind(&store, run, vec![area], RelationKind::Call);

        RelationCounter::new(&store, false).run().unwrap();
        assert_eq!(relations(&store, run), vec![Relation::new(area, RelationKind::Call)]);
    }

    #[test]
    fn test_external_targets_are_gated() {
        for emit in [false, true] {
            let store = EntityStore::new();
            let file = store.add(Entity::file(store.generate_id(), "/lib/Util.java", FileData::default()).external(true));
            let util = store.add(
                Entity::new(store.generate_id(), "Util", EntityData::Type(TypeData::default()))
                    .with_parent(file)
                    .external(true),
            );
            let local = store.add(Entity::new(
                store.generate_id(),
                "x",
                EntityData::Variable(VariableData::default()),
            ));
            bind(&store, local, vec![util], RelationKind::Use);

            let stats = RelationCounter::new(&store, emit).run().unwrap();
            assert_eq!(relations(&store, local).len(), usize::from(emit));
            assert_eq!(stats.skipped_external, usize::from(!emit));
        }
    }

    #[test]
    fn test_rerun_is_noop() {
        let store = EntityStore::new();
        let a = ty(&store, "A", false);
        let f = method(&store, a, "A", "f", false);
        let g = method(&store, a, "A", "g", false);
        bind(&store, f, vec![g], RelationKind::Call);

        let counter = RelationCounter::new(&store, false);
        counter.run().unwrap();
        let second = counter.run().unwrap();
        assert_eq!(second.processed, 0);
        assert_eq!(relations(&store, f).len(), 1);
    }
}
