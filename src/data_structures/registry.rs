//! The entity store.
//!
//! Components live in one sparse set per type. Removing a component (or
//! destroying the entity that holds it) drops the value in place, so any
//! component that wraps a native resource releases it through its own `Drop`
//! implementation at a deterministic point.
//!
//! Two queues make frame ordering explicit instead of relying on observers:
//!
//! - the patch queue (`patch` / `drain_patches`) records "this component of
//!   this entity changed, react to it" notifications,
//! - the destroy queue (`destroy_later` / `flush_destroyed`) defers
//!   destruction until the end of the frame so that no system pulls entities
//!   out from under a view another system is still walking.

use std::{
    any::{Any, TypeId, type_name},
    collections::HashMap,
};

use crate::error::EcsError;

use super::{
    entity::{Entity, EntityAllocator},
    view::{ComponentSet, View},
};

/// Sparse set storage for a single component type.
pub(crate) struct Storage<T> {
    sparse: Vec<Option<usize>>,
    dense: Vec<Entity>,
    data: Vec<T>,
}

impl<T> Default for Storage<T> {
    fn default() -> Self {
        Self {
            sparse: Vec::new(),
            dense: Vec::new(),
            data: Vec::new(),
        }
    }
}

impl<T> Storage<T> {
    fn position(&self, entity: Entity) -> Option<usize> {
        let pos = (*self.sparse.get(entity.index() as usize)?)?;
        (self.dense[pos] == entity).then_some(pos)
    }

    fn insert(&mut self, entity: Entity, value: T) -> &mut T {
        let slot = entity.index() as usize;
        if slot >= self.sparse.len() {
            self.sparse.resize(slot + 1, None);
        }
        self.sparse[slot] = Some(self.dense.len());
        self.dense.push(entity);
        self.data.push(value);
        let last = self.data.len() - 1;
        &mut self.data[last]
    }

    fn get(&self, entity: Entity) -> Option<&T> {
        self.position(entity).map(|pos| &self.data[pos])
    }

    fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        self.position(entity).map(|pos| &mut self.data[pos])
    }

    fn take(&mut self, entity: Entity) -> Option<T> {
        let pos = self.position(entity)?;
        self.sparse[entity.index() as usize] = None;
        self.dense.swap_remove(pos);
        let value = self.data.swap_remove(pos);
        if let Some(moved) = self.dense.get(pos) {
            self.sparse[moved.index() as usize] = Some(pos);
        }
        Some(value)
    }
}

/// Type-erased access to a [`Storage`].
pub(crate) trait AnyStorage {
    fn remove_entity(&mut self, entity: Entity) -> bool;
    fn contains(&self, entity: Entity) -> bool;
    fn clear(&mut self);
    fn entities(&self) -> &[Entity];
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: 'static> AnyStorage for Storage<T> {
    fn remove_entity(&mut self, entity: Entity) -> bool {
        self.take(entity).is_some()
    }

    fn contains(&self, entity: Entity) -> bool {
        self.position(entity).is_some()
    }

    fn clear(&mut self) {
        self.sparse.clear();
        self.dense.clear();
        // Dropping the values runs release logic for resource-owning components.
        self.data.clear();
    }

    fn entities(&self) -> &[Entity] {
        &self.dense
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A "component changed" notification waiting to be processed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Patch {
    pub entity: Entity,
    pub component: TypeId,
}

impl Patch {
    pub fn is<T: 'static>(&self) -> bool {
        self.component == TypeId::of::<T>()
    }
}

#[derive(Default)]
pub struct Registry {
    entities: EntityAllocator,
    storages: HashMap<TypeId, Box<dyn AnyStorage>>,
    patches: Vec<Patch>,
    pending_destroy: Vec<Entity>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("entities", &self.entities.count())
            .field("storages", &self.storages.len())
            .field("patches", &self.patches.len())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self) -> Entity {
        self.entities.allocate()
    }

    pub fn valid(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.entities.count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.iter()
    }

    /// Removes every component of `entity` and invalidates the id.
    ///
    /// Returns `false` for ids that are already dead.
    pub fn destroy(&mut self, entity: Entity) -> bool {
        if !self.valid(entity) {
            return false;
        }
        for storage in self.storages.values_mut() {
            storage.remove_entity(entity);
        }
        self.patches.retain(|patch| patch.entity != entity);
        self.entities.deallocate(entity)
    }

    /// Queue `entity` for destruction at the next [`Registry::flush_destroyed`].
    pub fn destroy_later(&mut self, entity: Entity) {
        if !self.pending_destroy.contains(&entity) {
            self.pending_destroy.push(entity);
        }
    }

    pub fn flush_destroyed(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending_destroy);
        pending
            .into_iter()
            .filter(|entity| self.destroy(*entity))
            .count()
    }

    /// Drops every entity and every component.
    pub fn clear_all(&mut self) {
        for storage in self.storages.values_mut() {
            storage.clear();
        }
        self.storages.clear();
        self.patches.clear();
        self.pending_destroy.clear();
        self.entities = EntityAllocator::default();
    }

    fn storage<T: 'static>(&self) -> Option<&Storage<T>> {
        self.storages
            .get(&TypeId::of::<T>())
            .and_then(|s| s.as_any().downcast_ref::<Storage<T>>())
    }

    fn storage_mut<T: 'static>(&mut self) -> Option<&mut Storage<T>> {
        self.storages
            .get_mut(&TypeId::of::<T>())
            .and_then(|s| s.as_any_mut().downcast_mut::<Storage<T>>())
    }

    fn storage_or_insert<T: 'static>(&mut self) -> &mut Storage<T> {
        let storage = self
            .storages
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(Storage::<T>::default()));
        match storage.as_any_mut().downcast_mut::<Storage<T>>() {
            Some(storage) => storage,
            None => unreachable!("storage registered under the wrong TypeId"),
        }
    }

    pub(crate) fn storage_entities(&self, id: TypeId) -> Option<&[Entity]> {
        self.storages.get(&id).map(|s| s.entities())
    }

    pub(crate) fn has_type(&self, entity: Entity, id: TypeId) -> bool {
        self.storages
            .get(&id)
            .is_some_and(|storage| storage.contains(entity))
    }

    fn check_alive(&self, entity: Entity) -> Result<(), EcsError> {
        if self.valid(entity) {
            Ok(())
        } else {
            Err(EcsError::StaleEntity(entity))
        }
    }

    /// Attach `value` to `entity`. Fails if the entity already carries a `T`.
    pub fn emplace<T: 'static>(&mut self, entity: Entity, value: T) -> Result<&mut T, EcsError> {
        self.check_alive(entity)?;
        if self.has::<T>(entity) {
            return Err(EcsError::AlreadyPresent {
                entity,
                component: type_name::<T>(),
            });
        }
        Ok(self.storage_or_insert::<T>().insert(entity, value))
    }

    /// Attach `value`, dropping any previous `T` before the new one is stored.
    pub fn emplace_or_replace<T: 'static>(
        &mut self,
        entity: Entity,
        value: T,
    ) -> Result<&mut T, EcsError> {
        self.check_alive(entity)?;
        self.remove::<T>(entity);
        Ok(self.storage_or_insert::<T>().insert(entity, value))
    }

    /// Swap the existing `T` for `value`. Fails if there is none.
    pub fn replace<T: 'static>(&mut self, entity: Entity, value: T) -> Result<&mut T, EcsError> {
        self.check_alive(entity)?;
        if !self.remove::<T>(entity) {
            return Err(EcsError::Missing {
                entity,
                component: type_name::<T>(),
            });
        }
        Ok(self.storage_or_insert::<T>().insert(entity, value))
    }

    /// Drops the `T` attached to `entity`, if any.
    pub fn remove<T: 'static>(&mut self, entity: Entity) -> bool {
        self.storage_mut::<T>()
            .and_then(|storage| storage.take(entity))
            .is_some()
    }

    pub fn get<T: 'static>(&self, entity: Entity) -> Result<&T, EcsError> {
        self.check_alive(entity)?;
        self.try_get::<T>(entity).ok_or(EcsError::Missing {
            entity,
            component: type_name::<T>(),
        })
    }

    pub fn get_mut<T: 'static>(&mut self, entity: Entity) -> Result<&mut T, EcsError> {
        self.check_alive(entity)?;
        self.storage_mut::<T>()
            .and_then(|storage| storage.get_mut(entity))
            .ok_or(EcsError::Missing {
                entity,
                component: type_name::<T>(),
            })
    }

    pub fn try_get<T: 'static>(&self, entity: Entity) -> Option<&T> {
        self.storage::<T>().and_then(|storage| storage.get(entity))
    }

    pub fn try_get_mut<T: 'static>(&mut self, entity: Entity) -> Option<&mut T> {
        self.storage_mut::<T>()
            .and_then(|storage| storage.get_mut(entity))
    }

    pub fn has<T: 'static>(&self, entity: Entity) -> bool {
        self.has_type(entity, TypeId::of::<T>())
    }

    pub fn all_of<Q: ComponentSet>(&self, entity: Entity) -> bool {
        Q::type_ids().into_iter().all(|id| self.has_type(entity, id))
    }

    pub fn any_of<Q: ComponentSet>(&self, entity: Entity) -> bool {
        Q::type_ids().into_iter().any(|id| self.has_type(entity, id))
    }

    pub fn view<Q: ComponentSet>(&self) -> View<'_> {
        View::new(self, Q::type_ids())
    }

    /// Removes the listed component kinds from every entity. Entities survive.
    pub fn clear<Q: ComponentSet>(&mut self) {
        for id in Q::type_ids() {
            if let Some(storage) = self.storages.get_mut(&id) {
                storage.clear();
            }
        }
    }

    /// Number of entities holding a `T`.
    pub fn count<T: 'static>(&self) -> usize {
        self.storage::<T>().map_or(0, |s| s.dense.len())
    }

    /// Notify that the `T` of `entity` changed. No-op if the entity has no `T`.
    pub fn patch<T: 'static>(&mut self, entity: Entity) -> bool {
        if !self.valid(entity) || !self.has::<T>(entity) {
            return false;
        }
        let patch = Patch {
            entity,
            component: TypeId::of::<T>(),
        };
        if !self.patches.contains(&patch) {
            self.patches.push(patch);
        }
        true
    }

    pub fn drain_patches(&mut self) -> Vec<Patch> {
        std::mem::take(&mut self.patches)
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use super::*;

    #[derive(Debug, PartialEq)]
    struct Position(f32, f32);
    struct Marker;
    struct Other;

    struct Tracked(Rc<Cell<u32>>);
    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn emplace_twice_fails() {
        let mut registry = Registry::new();
        let e = registry.create();
        registry.emplace(e, Position(1.0, 2.0)).unwrap();
        let err = registry.emplace(e, Position(3.0, 4.0)).unwrap_err();
        assert!(matches!(err, EcsError::AlreadyPresent { .. }));
        assert_eq!(registry.get::<Position>(e).unwrap(), &Position(1.0, 2.0));
    }

    #[test]
    fn get_fails_when_absent_or_stale() {
        let mut registry = Registry::new();
        let e = registry.create();
        assert!(matches!(
            registry.get::<Position>(e),
            Err(EcsError::Missing { .. })
        ));
        registry.emplace(e, Position(0.0, 0.0)).unwrap();
        registry.destroy(e);
        assert_eq!(registry.get::<Position>(e), Err(EcsError::StaleEntity(e)));
    }

    #[test]
    fn destroyed_components_are_unreachable_after_slot_reuse() {
        let mut registry = Registry::new();
        let e = registry.create();
        registry.emplace(e, Position(5.0, 5.0)).unwrap();
        registry.emplace(e, Marker).unwrap();
        registry.destroy(e);

        let reused = registry.create();
        assert_eq!(reused.index(), e.index());
        assert!(!registry.has::<Position>(reused));
        assert!(!registry.has::<Marker>(e));
        assert!(registry.try_get::<Position>(e).is_none());
        assert_eq!(registry.count::<Position>(), 0);
    }

    #[test]
    fn removal_and_destroy_release_owned_values() {
        let drops = Rc::new(Cell::new(0));
        let mut registry = Registry::new();
        let a = registry.create();
        let b = registry.create();
        registry.emplace(a, Tracked(drops.clone())).unwrap();
        registry.emplace(b, Tracked(drops.clone())).unwrap();

        registry.remove::<Tracked>(a);
        assert_eq!(drops.get(), 1);
        registry.destroy(b);
        assert_eq!(drops.get(), 2);
    }

    #[test]
    fn replace_drops_old_value_before_storing_new() {
        let drops = Rc::new(Cell::new(0));
        let mut registry = Registry::new();
        let e = registry.create();
        registry.emplace(e, Tracked(drops.clone())).unwrap();
        registry.emplace_or_replace(e, Tracked(drops.clone())).unwrap();
        assert_eq!(drops.get(), 1);
        registry.replace(e, Tracked(drops.clone())).unwrap();
        assert_eq!(drops.get(), 2);
        assert_eq!(registry.count::<Tracked>(), 1);
    }

    #[test]
    fn views_filter_and_restart() {
        let mut registry = Registry::new();
        let both = registry.create();
        let only_marker = registry.create();
        let excluded = registry.create();
        registry.emplace(both, Position(0.0, 0.0)).unwrap();
        registry.emplace(both, Marker).unwrap();
        registry.emplace(only_marker, Marker).unwrap();
        registry.emplace(excluded, Position(1.0, 1.0)).unwrap();
        registry.emplace(excluded, Marker).unwrap();
        registry.emplace(excluded, Other).unwrap();

        let view = registry.view::<(Position, Marker)>().without::<(Other,)>();
        assert_eq!(view.entities(), vec![both]);
        // restartable
        assert_eq!(view.count(), 1);
        assert_eq!(view.front(), Some(both));
        assert!(registry.view::<(Other, Position, Marker, f32)>().is_empty());
    }

    #[test]
    fn all_of_and_any_of() {
        let mut registry = Registry::new();
        let e = registry.create();
        registry.emplace(e, Marker).unwrap();
        assert!(registry.all_of::<(Marker,)>(e));
        assert!(!registry.all_of::<(Marker, Other)>(e));
        assert!(registry.any_of::<(Marker, Other)>(e));
        assert!(!registry.any_of::<(Other, Position)>(e));
    }

    #[test]
    fn deferred_destruction_waits_for_flush() {
        let mut registry = Registry::new();
        let entities: Vec<_> = (0..3).map(|_| registry.create()).collect();
        for e in &entities {
            registry.emplace(*e, Marker).unwrap();
        }
        for e in registry.view::<(Marker,)>().entities() {
            registry.destroy_later(e);
            registry.destroy_later(e);
        }
        assert_eq!(registry.count::<Marker>(), 3);
        assert_eq!(registry.flush_destroyed(), 3);
        assert!(registry.is_empty());
    }

    #[test]
    fn patches_are_deduplicated_and_require_the_component() {
        let mut registry = Registry::new();
        let e = registry.create();
        assert!(!registry.patch::<Marker>(e));
        registry.emplace(e, Marker).unwrap();
        assert!(registry.patch::<Marker>(e));
        assert!(registry.patch::<Marker>(e));
        let patches = registry.drain_patches();
        assert_eq!(patches.len(), 1);
        assert!(patches[0].is::<Marker>());
        assert!(registry.drain_patches().is_empty());
    }

    #[test]
    fn clear_strips_components_but_keeps_entities() {
        let mut registry = Registry::new();
        let e = registry.create();
        registry.emplace(e, Marker).unwrap();
        registry.emplace(e, Other).unwrap();
        registry.clear::<(Marker,)>();
        assert!(registry.valid(e));
        assert!(!registry.has::<Marker>(e));
        assert!(registry.has::<Other>(e));
    }
}
