use std::any::Any;

use tessera_core::BufferPool;

use crate::component::{Component, ComponentId};
use crate::entity::Entity;
use crate::error::{EcsError, EcsResult};
use crate::sparse_set::SparseSet;

/// Type-erased view of one component table, addressable by [`ComponentId`].
///
/// This is what the filter engine, entity teardown and serializers use when
/// they only know the component id at runtime.
pub trait ComponentStore: Any + Send + Sync {
    fn component_id(&self) -> ComponentId;
    fn type_name(&self) -> &'static str;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn contains(&self, entity_id: u32) -> bool;
    /// Ids of the entities holding this component, dense order.
    fn entity_ids(&self) -> &[u32];
    /// Remove with destroy hooks. Returns whether anything was removed.
    fn remove(&mut self, entity_id: u32, pool: &mut BufferPool) -> bool;
    /// Duplicate the value of `from` onto `to`. No-op if `from` lacks the component
    /// or `to` already has it.
    fn copy(&mut self, from: u32, to: u32) -> bool;
    /// Drop every value without destroy hooks.
    fn clear(&mut self);
    /// Raw bytes of the value on `entity_id`, for `pod` components.
    fn bytes(&self, entity_id: u32) -> Option<&[u8]>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

/// Sparse-set storage for a single component type.
pub struct ComponentTable<T: Component> {
    values: SparseSet<T>,
}

impl<T: Component> ComponentTable<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            values: SparseSet::with_capacity(capacity),
        }
    }

    pub fn id(&self) -> ComponentId {
        T::component_id()
    }

    /// Insert a value. Fails if the entity already has one.
    pub fn add(&mut self, entity: Entity, value: T) -> EcsResult<&mut T> {
        if self.values.contains(entity.id()) {
            return Err(self.duplicate(entity));
        }
        self.values.insert(entity.id(), value)
    }

    /// Insert a reset default value.
    pub fn set_or_default(&mut self, entity: Entity, pool: &mut BufferPool) -> EcsResult<&mut T> {
        if self.values.contains(entity.id()) {
            return Err(self.duplicate(entity));
        }
        let mut value = T::default();
        value.on_reset();
        value.on_pool_acquire(pool);
        self.values.insert(entity.id(), value)
    }

    /// Insert or overwrite without running hooks, returning the previous value.
    pub fn replace(&mut self, entity: Entity, value: T) -> Option<T> {
        self.values.replace(entity.id(), value)
    }

    pub fn get(&self, entity: Entity) -> EcsResult<&T> {
        self.values.get(entity.id()).map_err(|_| EcsError::MissingComponent {
            entity,
            component: T::type_name(),
        })
    }

    pub fn get_mut(&mut self, entity: Entity) -> EcsResult<&mut T> {
        self.values
            .get_mut(entity.id())
            .map_err(|_| EcsError::MissingComponent {
                entity,
                component: T::type_name(),
            })
    }

    pub fn has(&self, entity_id: u32) -> bool {
        self.values.contains(entity_id)
    }

    /// Remove with destroy hooks, returning the removed value.
    pub fn remove_value(&mut self, entity_id: u32, pool: &mut BufferPool) -> Option<T> {
        let value = self.values.get_mut(entity_id).ok()?;
        value.on_destroy();
        value.on_pool_release(pool);
        self.values.remove(entity_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.values.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut T)> {
        self.values.iter_mut()
    }

    pub(crate) fn values_mut(&mut self) -> &mut SparseSet<T> {
        &mut self.values
    }

    fn duplicate(&self, entity: Entity) -> EcsError {
        EcsError::DuplicateComponent {
            entity,
            component: T::type_name(),
        }
    }
}

impl<T: Component> ComponentStore for ComponentTable<T> {
    fn component_id(&self) -> ComponentId {
        T::component_id()
    }

    fn type_name(&self) -> &'static str {
        T::type_name()
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn contains(&self, entity_id: u32) -> bool {
        self.values.contains(entity_id)
    }

    fn entity_ids(&self) -> &[u32] {
        self.values.ids()
    }

    fn remove(&mut self, entity_id: u32, pool: &mut BufferPool) -> bool {
        self.remove_value(entity_id, pool).is_some()
    }

    fn copy(&mut self, from: u32, to: u32) -> bool {
        if self.values.contains(to) {
            return false;
        }
        let Ok(src) = self.values.get(from) else {
            return false;
        };
        let copy = src.duplicate();
        self.values.insert(to, copy).is_ok()
    }

    fn clear(&mut self) {
        self.values.clear();
    }

    fn bytes(&self, entity_id: u32) -> Option<&[u8]> {
        self.values.get(entity_id).ok()?.as_bytes()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Component tables of one world, indexed by [`ComponentId`].
#[derive(Default)]
pub(crate) struct ComponentArena {
    tables: Vec<Option<Box<dyn ComponentStore>>>,
}

impl ComponentArena {
    pub fn get(&self, id: ComponentId) -> Option<&dyn ComponentStore> {
        self.tables.get(id.index())?.as_deref()
    }

    pub fn get_mut(&mut self, id: ComponentId) -> Option<&mut (dyn ComponentStore + 'static)> {
        self.tables.get_mut(id.index())?.as_deref_mut()
    }

    pub fn typed<T: Component>(&self) -> Option<&ComponentTable<T>> {
        self.get(T::component_id())?
            .as_any()
            .downcast_ref::<ComponentTable<T>>()
    }

    pub fn typed_mut<T: Component>(&mut self) -> Option<&mut ComponentTable<T>> {
        self.get_mut(T::component_id())?
            .as_any_mut()
            .downcast_mut::<ComponentTable<T>>()
    }

    /// Table of `T`, created on first use.
    pub fn get_or_create<T: Component>(&mut self, capacity: usize) -> &mut ComponentTable<T> {
        let index = T::component_id().index();
        if index >= self.tables.len() {
            self.tables.resize_with(index + 1, || None);
        }
        self.tables[index]
            .get_or_insert_with(|| {
                tracing::debug!("Creating component table for {} (id {})", T::type_name(), index);
                Box::new(ComponentTable::<T>::new(capacity))
            })
            .as_any_mut()
            .downcast_mut::<ComponentTable<T>>()
            .expect("component table stored under its own id")
    }

    /// Detach the table of `T`, leaving its slot empty until [`Self::restore`].
    pub fn take<T: Component>(&mut self, capacity: usize) -> Box<ComponentTable<T>> {
        self.get_or_create::<T>(capacity);
        let boxed = self.tables[T::component_id().index()]
            .take()
            .expect("table created above");
        boxed
            .into_any()
            .downcast::<ComponentTable<T>>()
            .expect("component table stored under its own id")
    }

    pub fn restore<T: Component>(&mut self, table: Box<ComponentTable<T>>) {
        self.tables[T::component_id().index()] = Some(table);
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn ComponentStore> {
        self.tables.iter().filter_map(|t| t.as_deref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut (dyn ComponentStore + 'static)> {
        self.tables.iter_mut().filter_map(|t| t.as_deref_mut())
    }
}
