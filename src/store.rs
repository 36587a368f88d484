//! Entity Graph Store - the authoritative registry of all entities
//!
//! Entities are kept in an arena keyed by `EntityId`; every cross reference
//! (parent, children, relation targets, role lists) is an id resolved through
//! the store at read time.
//!
//! Indices:
//! - by id: every entity ever added
//! - by name key: qualified name, else the canonical raw name; collisions
//!   fold into a `MultiDeclare` entity
//! - by role key: interface → implementors, signature → overloads
//!
//! All indices are sharded maps, so registration from concurrent front-end
//! workers only contends on the key being written. Guards returned by the
//! lookup methods must be dropped before calling back into the store.

use crate::entity::{
    Entity, EntityData, EntityId, EntityKind, MultiDeclareData, ReferenceToken, TypeData,
};
use crate::relation::RelationKind;
use crate::{Error, Result};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::Ref;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

/// Read guard over a stored entity
pub type EntityRef<'a> = Ref<'a, EntityId, Entity>;

/// Name key of the shared sentinel that built-in names resolve to
pub const BUILT_IN_KEY: &str = "<built-in>";

/// In-memory entity graph for one analysis run.
#[derive(Debug)]
pub struct EntityStore {
    next_id: AtomicU32,
    entities: DashMap<EntityId, Entity>,
    by_name: DashMap<String, EntityId>,
    roles: DashMap<String, Vec<EntityId>>,
    /// Files in the order their parse completed
    file_order: Mutex<Vec<EntityId>>,
    built_in: EntityId,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore {
    /// Create an empty store holding only the built-in sentinel
    pub fn new() -> Self {
        let mut store = Self {
            next_id: AtomicU32::new(0),
            entities: DashMap::new(),
            by_name: DashMap::new(),
            roles: DashMap::new(),
            file_order: Mutex::new(Vec::new()),
            built_in: EntityId(0),
        };
        store.built_in = store.generate_id();
        store.register_built_in();
        store
    }

    fn register_built_in(&self) {
        let sentinel = Entity::new(self.built_in, BUILT_IN_KEY, EntityData::Type(TypeData::default()))
            .with_qualified_name(BUILT_IN_KEY);
        self.add(sentinel);
    }

    /// Next process-unique id; ids are never reused
    pub fn generate_id(&self) -> EntityId {
        EntityId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Id of the shared built-in type sentinel
    pub fn built_in(&self) -> EntityId {
        self.built_in
    }

    /// Register an entity by id and by name key, and link it to its parent.
    ///
    /// A second entity under an existing name key folds both into a
    /// `MultiDeclare` entity that takes over the name slot; later collisions
    /// append to it.
    pub fn add(&self, entity: Entity) -> EntityId {
        let id = entity.id;
        let key = entity.name_key();
        let raw_name = entity.raw_name.clone();
        let parent = entity.parent;
        self.entities.insert(id, entity);

        match self.by_name.entry(key.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
            Entry::Occupied(mut slot) => {
                let existing = *slot.get();
                let existing_is_multi = self
                    .entities
                    .get(&existing)
                    .map(|e| e.kind() == EntityKind::MultiDeclare)
                    .unwrap_or(false);

                if existing_is_multi {
                    if let Some(mut multi) = self.entities.get_mut(&existing) {
                        if let EntityData::MultiDeclare(data) = &mut multi.data {
                            data.entities.push(id);
                        }
                    }
                } else {
                    let multi_id = self.generate_id();
                    let multi = Entity::new(
                        multi_id,
                        raw_name,
                        EntityData::MultiDeclare(MultiDeclareData {
                            entities: vec![existing, id],
                        }),
                    )
                    .with_qualified_name(key.clone());
                    self.entities.insert(multi_id, multi);
                    slot.insert(multi_id);
                    tracing::debug!("Folded duplicate declarations of {} into {}", key, multi_id);
                }
            }
        }

        if let Some(parent) = parent {
            match self.entities.get_mut(&parent) {
                Some(mut p) => p.children.push(id),
                None => tracing::warn!("Entity {} declares unknown parent {}", id, parent),
            }
        }

        id
    }

    /// Get an entity by id
    pub fn get_by_id(&self, id: EntityId) -> Option<EntityRef<'_>> {
        self.entities.get(&id)
    }

    /// Get the entity occupying a name slot (possibly a `MultiDeclare`)
    pub fn get_by_name(&self, key: &str) -> Option<EntityRef<'_>> {
        let id = self.id_by_name(key)?;
        self.entities.get(&id)
    }

    /// Id occupying a name slot
    pub fn id_by_name(&self, key: &str) -> Option<EntityId> {
        self.by_name.get(key).map(|id| *id)
    }

    /// All declarations under a name key, with `MultiDeclare` flattened
    pub fn resolve_name(&self, key: &str) -> Vec<EntityId> {
        let Some(id) = self.id_by_name(key) else {
            return Vec::new();
        };
        let members = self
            .entities
            .get(&id)
            .and_then(|e| e.as_multi_declare().map(|m| m.entities.clone()));
        members.unwrap_or_else(|| vec![id])
    }

    /// Index an entity under a secondary key; duplicates are ignored
    pub fn register_role(&self, key: impl Into<String>, id: EntityId) {
        let mut entities = self.roles.entry(key.into()).or_default();
        if !entities.contains(&id) {
            entities.push(id);
        }
    }

    /// Entities registered under a secondary key, in registration order
    pub fn lookup_role(&self, key: &str) -> Vec<EntityId> {
        self.roles.get(key).map(|v| v.clone()).unwrap_or_default()
    }

    /// Nearest enclosing file of an entity (the entity itself for files)
    pub fn file_of(&self, id: EntityId) -> Option<EntityId> {
        let mut current = id;
        loop {
            let (kind, parent) = {
                let entity = self.entities.get(&current)?;
                (entity.kind(), entity.parent)
            };
            if kind == EntityKind::File {
                return Some(current);
            }
            current = parent?;
        }
    }

    /// Cache an unresolved reference on the referencing entity's file
    pub fn submit_reference(&self, token: ReferenceToken) -> Result<()> {
        let file = self
            .file_of(token.from)
            .ok_or_else(|| Error::EntityNotFound(format!("file enclosing {}", token.from)))?;
        let mut entity = self.entities.get_mut(&file).ok_or(Error::StoreConsistency(file))?;
        if let EntityData::File(data) = &mut entity.data {
            data.references.push(token);
        }
        Ok(())
    }

    /// Drain the cached references of a file
    pub fn take_references(&self, file: EntityId) -> Vec<ReferenceToken> {
        match self.entities.get_mut(&file) {
            Some(mut entity) => match &mut entity.data {
                EntityData::File(data) => std::mem::take(&mut data.references),
                _ => Vec::new(),
            },
            None => Vec::new(),
        }
    }

    /// Record that a file's parse finished
    pub fn complete_file(&self, file: EntityId) {
        let is_file = self
            .entities
            .get(&file)
            .map(|e| e.kind() == EntityKind::File)
            .unwrap_or(false);
        if is_file {
            self.lock_file_order().push(file);
        }
    }

    fn lock_file_order(&self) -> std::sync::MutexGuard<'_, Vec<EntityId>> {
        self.file_order.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mutate an entity in place.
    ///
    /// The closure must not call back into the store.
    pub fn update<R>(&self, id: EntityId, f: impl FnOnce(&mut Entity) -> R) -> Option<R> {
        self.entities.get_mut(&id).map(|mut entity| f(&mut entity))
    }

    /// All ids in creation order
    pub fn ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.entities.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Every entity in id order
    pub fn iter_all(&self) -> impl Iterator<Item = EntityRef<'_>> + '_ {
        self.ids().into_iter().filter_map(move |id| self.entities.get(&id))
    }

    /// Files in the order their parse completed
    pub fn files_in_completion_order(&self) -> Vec<EntityId> {
        self.lock_file_order().clone()
    }

    /// Number of stored entities, including the built-in sentinel
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Release every index; ids keep increasing afterwards
    pub fn clear(&self) {
        self.entities.clear();
        self.by_name.clear();
        self.roles.clear();
        self.lock_file_order().clear();
        self.register_built_in();
    }

    /// Get statistics about the store
    pub fn stats(&self) -> StoreStats {
        let mut stats = StoreStats::default();
        for entity in self.entities.iter() {
            if entity.id == self.built_in {
                continue;
            }
            match entity.kind() {
                EntityKind::File => stats.files += 1,
                EntityKind::Type => stats.types += 1,
                EntityKind::Function => stats.functions += 1,
                EntityKind::Variable => stats.variables += 1,
                EntityKind::MultiDeclare => stats.multi_declares += 1,
            }
            stats.relations += entity.relations.len();
            stats.calls += entity.relations_of(RelationKind::Call).count();
        }
        stats.roles = self.roles.len();
        stats
    }
}

/// Statistics about an entity store
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct StoreStats {
    pub files: usize,
    pub types: usize,
    pub functions: usize,
    pub variables: usize,
    pub multi_declares: usize,
    pub relations: usize,
    pub calls: usize,
    pub roles: usize,
}

impl StoreStats {
    pub fn entities(&self) -> usize {
        self.files + self.types + self.functions + self.variables + self.multi_declares
    }
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Entity Store Statistics:")?;
        writeln!(f, "  Files: {}", self.files)?;
        writeln!(
            f,
            "  Entities: {} (types: {}, functions: {}, variables: {}, multi-declared: {})",
            self.entities(),
            self.types,
            self.functions,
            self.variables,
            self.multi_declares
        )?;
        writeln!(f, "  Relations: {} (calls: {})", self.relations, self.calls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{FileData, FunctionData, VariableData};
    use std::sync::Arc;

    fn function(store: &EntityStore, name: &str, qualified: &str) -> Entity {
        Entity::new(store.generate_id(), name, EntityData::Function(FunctionData::default()))
            .with_qualified_name(qualified)
    }

    #[test]
    fn test_get_by_id_after_add() {
        let store = EntityStore::new();
        let file = Entity::file(store.generate_id(), "/src/a.java", FileData::default());
        let id = store.add(file);

        let entity = store.get_by_id(id).unwrap();
        assert_eq!(entity.id, id);
        assert_eq!(entity.kind(), EntityKind::File);
        assert!(store.get_by_id(EntityId(9999)).is_none());
        assert!(store.get_by_name("/src/missing.java").is_none());
    }

    #[test]
    fn test_collision_folds_into_multi_declare() {
        let store = EntityStore::new();
        let first = store.add(function(&store, "f", "pkg.A.f"));
        let second = store.add(function(&store, "f", "pkg.A.f"));
        let third = store.add(function(&store, "f", "pkg.A.f"));

        let slot = store.get_by_name("pkg.A.f").unwrap();
        assert_eq!(slot.kind(), EntityKind::MultiDeclare);
        assert_eq!(
            slot.as_multi_declare().unwrap().entities,
            vec![first, second, third]
        );
        drop(slot);

        assert_eq!(store.resolve_name("pkg.A.f"), vec![first, second, third]);
        // Folded entities stay reachable by id
        assert_eq!(store.get_by_id(second).unwrap().id, second);
    }

    #[test]
    fn test_unqualified_entities_use_raw_name_key() {
        let store = EntityStore::new();
        let a = store.add(Entity::new(
            store.generate_id(),
            "count",
            EntityData::Variable(VariableData::default()),
        ));
        assert_eq!(store.id_by_name("count"), Some(a));
    }

    #[test]
    fn test_parent_links_children_in_order() {
        let store = EntityStore::new();
        let file = store.add(Entity::file(store.generate_id(), "/src/a.py", FileData::default()));
        let f = store.add(function(&store, "f", "a.f").with_parent(file));
        let g = store.add(function(&store, "g", "a.g").with_parent(file));

        assert_eq!(store.get_by_id(file).unwrap().children, vec![f, g]);
        assert_eq!(store.file_of(g), Some(file));
    }

    #[test]
    fn test_roles_accumulate_without_duplicates() {
        let store = EntityStore::new();
        store.register_role("pkg.Shape", EntityId(5));
        store.register_role("pkg.Shape", EntityId(7));
        store.register_role("pkg.Shape", EntityId(5));

        assert_eq!(store.lookup_role("pkg.Shape"), vec![EntityId(5), EntityId(7)]);
        assert!(store.lookup_role("pkg.Nothing").is_empty());
    }

    #[test]
    fn test_references_cached_on_file() {
        let store = EntityStore::new();
        let file = store.add(Entity::file(store.generate_id(), "/src/a.py", FileData::default()));
        let f = store.add(function(&store, "f", "a.f").with_parent(file));

        store
            .submit_reference(ReferenceToken::new(f, "g", RelationKind::Call))
            .unwrap();
        let taken = store.take_references(file);
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].from, f);
        assert!(store.take_references(file).is_empty());
    }

    #[test]
    fn test_reference_without_file_is_rejected() {
        let store = EntityStore::new();
        let orphan = store.add(function(&store, "f", "f"));
        let result = store.submit_reference(ReferenceToken::new(orphan, "g", RelationKind::Call));
        assert!(matches!(result, Err(Error::EntityNotFound(_))));
    }

    #[test]
    fn test_completion_order_and_clear() {
        let store = EntityStore::new();
        let b = store.add(Entity::file(store.generate_id(), "/b.py", FileData::default()));
        let a = store.add(Entity::file(store.generate_id(), "/a.py", FileData::default()));
        store.complete_file(b);
        store.complete_file(a);
        assert_eq!(store.files_in_completion_order(), vec![b, a]);

        let before = store.generate_id();
        store.clear();
        assert!(store.files_in_completion_order().is_empty());
        assert!(store.get_by_id(a).is_none());
        assert_eq!(store.len(), 1);
        assert!(store.get_by_id(store.built_in()).is_some());
        assert!(store.generate_id() > before);
    }

    #[test]
    fn test_concurrent_registration() {
        let store = Arc::new(EntityStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let id = store.add(function(&store, "run", "pkg.Task.run"));
                        store.register_role("pkg.Task,run,", id);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.resolve_name("pkg.Task.run").len(), 400);
        assert_eq!(store.lookup_role("pkg.Task,run,").len(), 400);
        assert_eq!(store.stats().multi_declares, 1);
    }
}
