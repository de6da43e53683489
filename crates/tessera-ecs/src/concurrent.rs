use parking_lot::RwLock;

use crate::component::Component;
use crate::entity::Entity;
use crate::error::EcsResult;
use crate::filter::{FilterId, FilterMask};
use crate::world::World;

/// A [`World`] shared between threads behind a reader/writer lock.
///
/// Lookups take a recursive read lock and run concurrently with each other.
/// Anything that changes structure, or refreshes a filter cache, takes the
/// write lock.
pub struct ConcurrentWorld {
    inner: RwLock<World>,
}

impl ConcurrentWorld {
    pub fn new(world: World) -> Self {
        Self {
            inner: RwLock::new(world),
        }
    }

    pub fn into_inner(self) -> World {
        self.inner.into_inner()
    }

    // ---- Reads ----

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.inner.read_recursive().is_alive(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.inner.read_recursive().entity_count()
    }

    pub fn has<T: Component>(&self, entity: Entity) -> EcsResult<bool> {
        self.inner.read_recursive().has::<T>(entity)
    }

    /// Run `f` on the `T` of `entity` under a read lock.
    pub fn with_component<T, R>(&self, entity: Entity, f: impl FnOnce(&T) -> R) -> EcsResult<R>
    where
        T: Component,
    {
        let world = self.inner.read_recursive();
        world.get::<T>(entity).map(f)
    }

    /// Copy out the `T` of `entity`.
    pub fn get_cloned<T: Component>(&self, entity: Entity) -> EcsResult<T> {
        self.with_component(entity, T::clone)
    }

    /// Run `f` with shared access to the whole world.
    pub fn read<R>(&self, f: impl FnOnce(&World) -> R) -> R {
        f(&self.inner.read_recursive())
    }

    // ---- Writes ----

    /// Run `f` on the `T` of `entity` under the write lock.
    pub fn with_component_mut<T, R>(
        &self,
        entity: Entity,
        f: impl FnOnce(&mut T) -> R,
    ) -> EcsResult<R>
    where
        T: Component,
    {
        let mut world = self.inner.write();
        world.get_mut::<T>(entity).map(f)
    }

    pub fn create_entity(&self) -> EcsResult<Entity> {
        self.inner.write().create_entity()
    }

    pub fn create_entity_with<M: Component>(&self) -> EcsResult<Entity> {
        self.inner.write().create_entity_with::<M>()
    }

    pub fn destroy_entity(&self, entity: Entity) -> EcsResult<()> {
        self.inner.write().destroy_entity(entity)
    }

    pub fn copy_entity(&self, entity: Entity) -> EcsResult<Entity> {
        self.inner.write().copy_entity(entity)
    }

    pub fn add_component<T: Component>(&self, entity: Entity, value: T) -> EcsResult<()> {
        self.inner.write().add_component(entity, value)
    }

    pub fn remove_component<T: Component>(&self, entity: Entity) -> EcsResult<bool> {
        self.inner.write().remove_component::<T>(entity)
    }

    pub fn replace_component<T: Component>(
        &self,
        entity: Entity,
        value: T,
    ) -> EcsResult<Option<T>> {
        self.inner.write().replace_component(entity, value)
    }

    pub fn filter(&self, mask: FilterMask) -> FilterId {
        self.inner.write().filter(mask)
    }

    /// Snapshot of the entities matching `filter`.
    pub fn filter_entities(&self, filter: FilterId) -> EcsResult<Vec<Entity>> {
        Ok(self.inner.write().filter_entities(filter)?.to_vec())
    }

    pub fn filter_count(&self, filter: FilterId) -> EcsResult<usize> {
        self.inner.write().filter_count(filter)
    }

    /// Run `f` with exclusive access to the whole world.
    pub fn write<R>(&self, f: impl FnOnce(&mut World) -> R) -> R {
        f(&mut self.inner.write())
    }
}

impl Default for ConcurrentWorld {
    fn default() -> Self {
        Self::new(World::new())
    }
}

impl From<World> for ConcurrentWorld {
    fn from(world: World) -> Self {
        Self::new(world)
    }
}
