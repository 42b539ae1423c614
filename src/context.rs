//! Process-wide state and the world every system receives.
//!
//! [`Context`] holds exactly-one-instance values that no entity owns (the
//! config, input devices, delta time, game state, play area bounds, model
//! catalog, ...). It is keyed by type, so each type has at most one slot.
//!
//! [`World`] bundles the entity [`Registry`] with the [`Context`]. Systems take
//! `&mut World` explicitly; nothing reaches for global state. Keeping the two
//! as separate fields lets a system hold a context value and mutate the
//! registry at the same time.

use std::{
    any::{Any, TypeId, type_name},
    collections::HashMap,
};

use crate::data_structures::{entity::Entity, registry::Registry};

#[derive(Default)]
pub struct Context {
    slots: HashMap<TypeId, Box<dyn Any>>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("slots", &self.slots.len())
            .finish()
    }
}

impl Context {
    /// Returns the existing `T`, or stores `value` if there is none.
    pub fn emplace<T: 'static>(&mut self, value: T) -> &mut T {
        let slot = self
            .slots
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(value));
        match slot.downcast_mut::<T>() {
            Some(value) => value,
            None => unreachable!("context slot for {} holds another type", type_name::<T>()),
        }
    }

    /// Like [`Context::emplace`], building the value only when the slot is empty.
    pub fn emplace_with<T: 'static>(&mut self, make: impl FnOnce() -> T) -> &mut T {
        let slot = self
            .slots
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(make()));
        match slot.downcast_mut::<T>() {
            Some(value) => value,
            None => unreachable!("context slot for {} holds another type", type_name::<T>()),
        }
    }

    /// Stores `value`, dropping any previous `T` first.
    pub fn insert<T: 'static>(&mut self, value: T) -> &mut T {
        self.erase::<T>();
        self.emplace(value)
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.slots
            .get(&TypeId::of::<T>())
            .and_then(|slot| slot.downcast_ref::<T>())
    }

    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.slots
            .get_mut(&TypeId::of::<T>())
            .and_then(|slot| slot.downcast_mut::<T>())
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.slots.contains_key(&TypeId::of::<T>())
    }

    /// Drops the `T`, if present.
    pub fn erase<T: 'static>(&mut self) -> bool {
        self.slots.remove(&TypeId::of::<T>()).is_some()
    }
}

/// The entity that carries the window, renderer state, camera and levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Display(pub Entity);

#[derive(Debug, Default)]
pub struct World {
    pub registry: Registry,
    pub ctx: Context,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// The display entity, if one has been registered and is still alive.
    pub fn display(&self) -> Option<Entity> {
        self.ctx
            .get::<Display>()
            .map(|display| display.0)
            .filter(|entity| self.registry.valid(*entity))
    }

    /// Drops all entities first, then every context value.
    pub fn clear(&mut self) {
        self.registry.clear_all();
        self.ctx = Context::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct DeltaTime(f32);

    #[test]
    fn emplace_keeps_the_first_value() {
        let mut ctx = Context::default();
        ctx.emplace(DeltaTime(1.0));
        assert_eq!(ctx.emplace(DeltaTime(2.0)), &mut DeltaTime(1.0));
        ctx.insert(DeltaTime(3.0));
        assert_eq!(ctx.get::<DeltaTime>(), Some(&DeltaTime(3.0)));
        assert!(ctx.erase::<DeltaTime>());
        assert!(!ctx.contains::<DeltaTime>());
        assert!(!ctx.erase::<DeltaTime>());
    }

    #[test]
    fn display_must_be_alive() {
        let mut world = World::new();
        let display = world.registry.create();
        world.ctx.emplace(Display(display));
        assert_eq!(world.display(), Some(display));
        world.registry.destroy(display);
        assert_eq!(world.display(), None);
    }
}
