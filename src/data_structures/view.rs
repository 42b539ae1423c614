//! Component sets and filtered views over the registry.
//!
//! A [`View`] is a lazy, restartable sequence of the entities that hold every
//! component of an include set and none of an exclude set. It borrows the
//! registry immutably, so the borrow checker already rules out destroying
//! entities while a view is being walked. Systems that need to mutate collect
//! the entities first (`view.entities()`) or queue destruction with
//! [`Registry::destroy_later`](super::registry::Registry::destroy_later).

use std::any::TypeId;

use super::{entity::Entity, registry::Registry};

/// A compile-time list of component kinds, implemented for tuples `(A,)` up to
/// eight elements.
pub trait ComponentSet {
    fn type_ids() -> Vec<TypeId>;
}

macro_rules! impl_component_set {
    ($($ty:ident),+) => {
        impl<$($ty: 'static),+> ComponentSet for ($($ty,)+) {
            fn type_ids() -> Vec<TypeId> {
                vec![$(TypeId::of::<$ty>()),+]
            }
        }
    };
}

impl_component_set!(A);
impl_component_set!(A, B);
impl_component_set!(A, B, C);
impl_component_set!(A, B, C, D);
impl_component_set!(A, B, C, D, E);
impl_component_set!(A, B, C, D, E, F);
impl_component_set!(A, B, C, D, E, F, G);
impl_component_set!(A, B, C, D, E, F, G, H);

#[derive(Clone)]
pub struct View<'a> {
    registry: &'a Registry,
    include: Vec<TypeId>,
    exclude: Vec<TypeId>,
}

impl<'a> View<'a> {
    pub(crate) fn new(registry: &'a Registry, include: Vec<TypeId>) -> Self {
        Self {
            registry,
            include,
            exclude: Vec::new(),
        }
    }

    /// Drop every entity that holds any of `Q`.
    pub fn without<Q: ComponentSet>(mut self) -> Self {
        self.exclude.extend(Q::type_ids());
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        // Drive the iteration from the smallest storage in the include set.
        let driver = self
            .include
            .iter()
            .map(|id| self.registry.storage_entities(*id))
            .min_by_key(|entities| entities.map_or(0, <[Entity]>::len))
            .flatten()
            .unwrap_or(&[]);
        driver.iter().copied().filter(move |entity| {
            self.include
                .iter()
                .all(|id| self.registry.has_type(*entity, *id))
                && !self
                    .exclude
                    .iter()
                    .any(|id| self.registry.has_type(*entity, *id))
        })
    }

    pub fn front(&self) -> Option<Entity> {
        self.iter().next()
    }

    pub fn is_empty(&self) -> bool {
        self.front().is_none()
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    /// Snapshot of the matching entities, for loops that mutate the registry.
    pub fn entities(&self) -> Vec<Entity> {
        self.iter().collect()
    }
}
