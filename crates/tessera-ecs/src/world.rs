use std::panic::{self, AssertUnwindSafe};

use tessera_core::{BufferPool, WorldConfig};
use tracing::{debug, trace, warn};

use crate::component::{Component, ComponentId};
use crate::deferred::DeferredQueue;
use crate::entity::{Entity, EntityRecord, EntityTable, WorldId};
use crate::error::{EcsError, EcsResult};
use crate::filter::{FilterEngine, FilterId, FilterMask};
use crate::table::{ComponentArena, ComponentStore};

/// The central container. Owns all entities, component tables and filters.
///
/// An entity that loses its last component is returned to the pool. Attach a
/// marker component (see [`World::create_entity_with`]) to keep one alive.
pub struct World {
    id: WorldId,
    pub(crate) config: WorldConfig,
    pub(crate) entities: EntityTable,
    pub(crate) tables: ComponentArena,
    pub(crate) filters: FilterEngine,
    pool: BufferPool,
    lock_depth: u32,
    pub(crate) deferred: DeferredQueue,
}

impl World {
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    pub fn with_config(config: WorldConfig) -> Self {
        let id = WorldId::next();
        debug!(
            "Creating world {} ({} entity slots, {:?} scan)",
            id.raw(),
            config.entity_capacity,
            config.scan_strategy
        );
        Self {
            id,
            entities: EntityTable::new(id, config.entity_capacity),
            tables: ComponentArena::default(),
            filters: FilterEngine::new(config.filter_capacity),
            pool: BufferPool::new(),
            lock_depth: 0,
            deferred: DeferredQueue::with_capacity(config.deferred_capacity),
            config,
        }
    }

    pub fn id(&self) -> WorldId {
        self.id
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Buffers handed to component pool hooks.
    pub fn buffer_pool(&self) -> &BufferPool {
        &self.pool
    }

    fn check_alive(&self, entity: Entity) -> EcsResult<()> {
        if self.entities.is_alive(entity) {
            Ok(())
        } else {
            Err(EcsError::DeadEntity(entity))
        }
    }

    fn check_unlocked(&self, op: &'static str) -> EcsResult<()> {
        if self.is_locked() {
            Err(EcsError::WorldLocked(op))
        } else {
            Ok(())
        }
    }

    // ---- Entity management ----

    /// Create an entity with no components.
    pub fn create_entity(&mut self) -> EcsResult<Entity> {
        self.check_unlocked("create_entity")?;
        let entity = self.entities.allocate();
        self.filters.mark_population_changed();
        Ok(entity)
    }

    /// Create an entity carrying a default `M`.
    pub fn create_entity_with<M: Component>(&mut self) -> EcsResult<Entity> {
        let entity = self.create_entity()?;
        self.set_or_default::<M>(entity)?;
        Ok(entity)
    }

    /// Remove every component of `entity`, running destroy hooks, and return its
    /// slot to the pool.
    pub fn destroy_entity(&mut self, entity: Entity) -> EcsResult<()> {
        self.check_unlocked("destroy_entity")?;
        self.check_alive(entity)?;
        let owned: Vec<usize> = self.entities.get(entity.id())?.mask().ones().collect();
        for bit in owned {
            let id = ComponentId::from_index(bit);
            if let Some(table) = self.tables.get_mut(id) {
                table.remove(entity.id(), &mut self.pool);
            }
            self.filters.mark_dirty(id);
        }
        self.entities.release(entity.id());
        self.filters.mark_population_changed();
        Ok(())
    }

    /// Create a new entity holding a duplicate of every component of `entity`.
    pub fn copy_entity(&mut self, entity: Entity) -> EcsResult<Entity> {
        self.check_unlocked("copy_entity")?;
        self.check_alive(entity)?;
        let source = self.entities.get(entity.id())?.mask().clone();
        let copy = self.entities.allocate();
        self.filters.mark_population_changed();
        for bit in source.ones() {
            let id = ComponentId::from_index(bit);
            let copied = self
                .tables
                .get_mut(id)
                .is_some_and(|table| table.copy(entity.id(), copy.id()));
            if copied {
                self.entities.get_mut(copy.id())?.mask_mut().set(bit);
                self.filters.mark_dirty(id);
            }
        }
        Ok(copy)
    }

    /// Bring slot `id` back to life with an explicit generation, as when a saved
    /// world is loaded. Fails with `DuplicateEntry` if the slot is alive.
    pub fn restore_entity(&mut self, id: u32, generation: u32) -> EcsResult<Entity> {
        self.check_unlocked("restore_entity")?;
        let entity = self.entities.allocate_at(id, generation)?;
        self.filters.mark_population_changed();
        Ok(entity)
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Number of alive entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Handles of all alive entities.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.iter().map(EntityRecord::handle)
    }

    /// Ids of the component types owned by `entity`, ascending.
    pub fn component_ids(
        &self,
        entity: Entity,
    ) -> EcsResult<impl Iterator<Item = ComponentId> + '_> {
        self.check_alive(entity)?;
        Ok(self
            .entities
            .get(entity.id())?
            .mask()
            .ones()
            .map(ComponentId::from_index))
    }

    // ---- Component management ----

    /// Create the table of `T` up front.
    pub fn register<T: Component>(&mut self) -> ComponentId {
        self.tables.get_or_create::<T>(self.config.component_capacity);
        T::component_id()
    }

    /// Attach `value` to `entity`. Deferred until unlock while the world is locked.
    pub fn add_component<T: Component>(&mut self, entity: Entity, value: T) -> EcsResult<()> {
        self.check_alive(entity)?;
        if self.is_locked() {
            self.deferred
                .push("add_component", move |world| world.add_component(entity, value));
            return Ok(());
        }
        let capacity = self.config.component_capacity;
        self.tables.get_or_create::<T>(capacity).add(entity, value)?;
        self.entities
            .get_mut(entity.id())?
            .mask_mut()
            .set(T::component_id().index());
        self.filters.mark_dirty(T::component_id());
        Ok(())
    }

    /// Attach a default `T` with its reset and pool-acquire hooks applied.
    pub fn set_or_default<T: Component>(&mut self, entity: Entity) -> EcsResult<&mut T> {
        self.check_unlocked("set_or_default")?;
        self.check_alive(entity)?;
        if self.tables.typed::<T>().is_some_and(|t| t.has(entity.id())) {
            return Err(EcsError::DuplicateComponent {
                entity,
                component: T::type_name(),
            });
        }
        self.entities
            .get_mut(entity.id())?
            .mask_mut()
            .set(T::component_id().index());
        self.filters.mark_dirty(T::component_id());
        let capacity = self.config.component_capacity;
        self.tables
            .get_or_create::<T>(capacity)
            .set_or_default(entity, &mut self.pool)
    }

    /// Existing `T` of `entity`, or a freshly defaulted one.
    pub fn get_or_set_default<T: Component>(&mut self, entity: Entity) -> EcsResult<&mut T> {
        if self.has::<T>(entity)? {
            return self.get_mut::<T>(entity);
        }
        self.set_or_default::<T>(entity)
    }

    pub fn get<T: Component>(&self, entity: Entity) -> EcsResult<&T> {
        self.check_alive(entity)?;
        match self.tables.typed::<T>() {
            Some(table) => table.get(entity),
            None => Err(EcsError::MissingComponent {
                entity,
                component: T::type_name(),
            }),
        }
    }

    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> EcsResult<&mut T> {
        self.check_alive(entity)?;
        match self.tables.typed_mut::<T>() {
            Some(table) => table.get_mut(entity),
            None => Err(EcsError::MissingComponent {
                entity,
                component: T::type_name(),
            }),
        }
    }

    pub fn has<T: Component>(&self, entity: Entity) -> EcsResult<bool> {
        self.check_alive(entity)?;
        Ok(self.tables.typed::<T>().is_some_and(|t| t.has(entity.id())))
    }

    /// Detach `T` from `entity`. Returns whether anything was removed; always
    /// `false` while locked, since the removal only happens on unlock.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> EcsResult<bool> {
        self.remove_component_id(entity, T::component_id())
    }

    /// [`World::remove_component`] for a component known only by id.
    pub fn remove_component_id(&mut self, entity: Entity, id: ComponentId) -> EcsResult<bool> {
        self.check_alive(entity)?;
        if self.is_locked() {
            self.deferred.push("remove_component", move |world| {
                world.remove_component_id(entity, id).map(drop)
            });
            return Ok(false);
        }
        let Some(table) = self.tables.get_mut(id) else {
            return Ok(false);
        };
        if !table.remove(entity.id(), &mut self.pool) {
            return Ok(false);
        }
        self.filters.mark_dirty(id);
        let record = self.entities.get_mut(entity.id())?;
        record.mask_mut().unset(id.index());
        if record.is_empty() {
            trace!("Releasing {} after its last component was removed", entity);
            self.entities.release(entity.id());
            self.filters.mark_population_changed();
        }
        Ok(true)
    }

    /// Store `value` without running hooks, returning the previous value.
    ///
    /// While locked, overwriting is immediate but attaching a new value is deferred.
    pub fn replace_component<T: Component>(
        &mut self,
        entity: Entity,
        value: T,
    ) -> EcsResult<Option<T>> {
        self.check_alive(entity)?;
        if let Some(table) = self.tables.typed_mut::<T>() {
            if table.has(entity.id()) {
                return Ok(table.replace(entity, value));
            }
        }
        self.add_component(entity, value)?;
        Ok(None)
    }

    /// Type-erased table of component `id`, if any value of it was ever stored.
    pub fn storage(&self, id: ComponentId) -> Option<&dyn ComponentStore> {
        self.tables.get(id)
    }

    /// Ids of every component type that has a table.
    pub fn storage_ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.tables.iter().map(|table| table.component_id())
    }

    /// Remove `T` from every entity holding it, returning how many lost it.
    pub fn clear_components<T: Component>(&mut self) -> EcsResult<usize> {
        self.check_unlocked("clear_components")?;
        let Some(table) = self.tables.typed::<T>() else {
            return Ok(0);
        };
        let holders: Vec<u32> = table.iter().map(|(id, _)| id).collect();
        let mut removed = 0;
        for id in holders {
            let Some(entity) = self.entities.handle(id) else {
                continue;
            };
            if self.remove_component::<T>(entity)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    // ---- Locking ----

    /// Enter a section where structural changes are deferred.
    pub fn lock(&mut self) {
        self.lock_depth += 1;
    }

    /// Leave a locked section. The outermost unlock replays deferred operations in
    /// the order they were recorded. A failing operation does not stop the replay;
    /// the first failure is returned once the queue is empty.
    pub fn unlock(&mut self) -> EcsResult<()> {
        if self.lock_depth == 0 {
            return Err(EcsError::NotLocked);
        }
        self.lock_depth -= 1;
        if self.lock_depth > 0 {
            return Ok(());
        }

        let mut first_error = None;
        let mut replayed = 0usize;
        while let Some(op) = self.deferred.pop() {
            replayed += 1;
            if let Err(e) = (op.apply)(self) {
                warn!("Deferred {} failed: {}", op.label, e);
                first_error.get_or_insert(e);
            }
        }
        if replayed > 0 {
            trace!("Replayed {} deferred operations on world {}", replayed, self.id.raw());
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn is_locked(&self) -> bool {
        self.lock_depth > 0
    }

    pub fn lock_depth(&self) -> u32 {
        self.lock_depth
    }

    /// Number of operations waiting for the outermost unlock.
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    // ---- Filters ----

    /// Filter for `mask`, shared with every other request for an equal mask.
    pub fn filter(&mut self, mask: FilterMask) -> FilterId {
        self.filters.get_or_create(mask)
    }

    pub fn filter_mask(&self, filter: FilterId) -> EcsResult<&FilterMask> {
        self.filters.mask(filter)
    }

    /// Entities currently matching `filter`.
    pub fn filter_entities(&mut self, filter: FilterId) -> EcsResult<&[Entity]> {
        self.filters
            .refresh(filter, &self.entities, &self.tables, self.config.scan_strategy)
    }

    pub fn filter_count(&mut self, filter: FilterId) -> EcsResult<usize> {
        Ok(self.filter_entities(filter)?.len())
    }

    pub fn filter_first(&mut self, filter: FilterId) -> EcsResult<Option<Entity>> {
        Ok(self.filter_entities(filter)?.first().copied())
    }

    pub fn filter_any(&mut self, filter: FilterId) -> EcsResult<bool> {
        Ok(!self.filter_entities(filter)?.is_empty())
    }

    pub fn filter_iter(
        &mut self,
        filter: FilterId,
    ) -> EcsResult<impl Iterator<Item = Entity> + '_> {
        Ok(self.filter_entities(filter)?.iter().copied())
    }

    /// Replace the contents of `out` with the entities of `filter`.
    pub fn fill_filter_entities(
        &mut self,
        filter: FilterId,
        out: &mut Vec<Entity>,
    ) -> EcsResult<usize> {
        let entities = self.filter_entities(filter)?;
        out.clear();
        out.extend_from_slice(entities);
        Ok(out.len())
    }

    /// Call `f` for every entity of `filter` with the world locked, so structural
    /// changes made by `f` are deferred until the walk is over.
    ///
    /// A panic in `f` unlocks the world (replaying what was queued) before it
    /// resumes.
    pub fn for_each_locked<F>(&mut self, filter: FilterId, mut f: F) -> EcsResult<()>
    where
        F: FnMut(&mut World, Entity),
    {
        let snapshot = self.filter_entities(filter)?.to_vec();
        self.lock();
        let walked = panic::catch_unwind(AssertUnwindSafe(|| {
            for entity in snapshot {
                f(self, entity);
            }
        }));
        let unlocked = self.unlock();
        if let Err(payload) = walked {
            panic::resume_unwind(payload);
        }
        unlocked
    }

    // ---- Teardown ----

    /// Drop every entity, component value and filter. Destroy hooks are not run and
    /// filter handles from before the call are disposed.
    pub fn clear(&mut self) -> EcsResult<()> {
        self.check_unlocked("clear")?;
        debug!(
            "Clearing world {} ({} entities, {} filters)",
            self.id.raw(),
            self.entities.len(),
            self.filters.len()
        );
        self.filters.clear();
        for table in self.tables.iter_mut() {
            table.clear();
        }
        self.entities.clear();
        self.pool.clear();
        self.deferred.clear();
        Ok(())
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static DESTROYED: AtomicUsize = AtomicUsize::new(0);

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Marker;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Hp(i32);

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Generation(u32);

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Doomed;

    crate::declare_component!(Position);
    crate::declare_component!(Velocity);
    crate::declare_component!(Marker);
    crate::declare_component!(Hp {
        fn on_reset(&mut self) {
            self.0 = 100;
        }
    });
    crate::declare_component!(Generation {
        fn duplicate(&self) -> Self {
            Generation(self.0 + 1)
        }
    });
    crate::declare_component!(Doomed {
        fn on_destroy(&mut self) {
            DESTROYED.fetch_add(1, Ordering::SeqCst);
        }
    });

    #[test]
    fn create_and_destroy() {
        let mut world = World::new();
        let e = world.create_entity().unwrap();
        assert!(world.is_alive(e));
        assert_eq!(world.entity_count(), 1);
        world.destroy_entity(e).unwrap();
        assert!(!world.is_alive(e));
        assert_eq!(world.entity_count(), 0);
        assert_eq!(world.destroy_entity(e), Err(EcsError::DeadEntity(e)));
    }

    #[test]
    fn add_get_remove_component() {
        let mut world = World::new();
        let e = world.create_entity_with::<Marker>().unwrap();
        world.add_component(e, Position { x: 1.0, y: 2.0 }).unwrap();
        assert_eq!(world.get::<Position>(e), Ok(&Position { x: 1.0, y: 2.0 }));
        assert_eq!(world.has::<Position>(e), Ok(true));

        world.get_mut::<Position>(e).unwrap().x = 5.0;
        assert_eq!(world.get::<Position>(e).unwrap().x, 5.0);

        assert_eq!(world.remove_component::<Position>(e), Ok(true));
        assert_eq!(world.remove_component::<Position>(e), Ok(false));
        assert_eq!(world.has::<Position>(e), Ok(false));
        assert!(matches!(
            world.get::<Position>(e),
            Err(EcsError::MissingComponent { .. })
        ));
    }

    #[test]
    fn duplicate_add_leaves_value() {
        let mut world = World::new();
        let e = world.create_entity().unwrap();
        world.add_component(e, Hp(3)).unwrap();
        assert!(matches!(
            world.add_component(e, Hp(4)),
            Err(EcsError::DuplicateComponent { .. })
        ));
        assert!(world.set_or_default::<Hp>(e).is_err());
        assert_eq!(world.get::<Hp>(e), Ok(&Hp(3)));
    }

    #[test]
    fn removing_last_component_releases_entity() {
        let mut world = World::new();
        let bare = world.create_entity().unwrap();
        let e = world.create_entity().unwrap();
        world.add_component(e, Velocity::default()).unwrap();
        world.remove_component::<Velocity>(e).unwrap();
        assert!(!world.is_alive(e));
        // Never had a component, so nothing released it.
        assert!(world.is_alive(bare));
    }

    #[test]
    fn stale_handle_is_dead_not_missing() {
        let mut world = World::new();
        let e = world.create_entity_with::<Marker>().unwrap();
        world.destroy_entity(e).unwrap();
        let reused = world.create_entity().unwrap();
        assert_eq!(reused.id(), e.id());
        assert_eq!(world.get::<Marker>(e), Err(EcsError::DeadEntity(e)));
        assert_eq!(world.has::<Marker>(e), Err(EcsError::DeadEntity(e)));
        assert_eq!(world.has::<Marker>(reused), Ok(false));

        let other = World::new();
        assert_eq!(other.get::<Marker>(reused), Err(EcsError::DeadEntity(reused)));
    }

    #[test]
    fn set_or_default_runs_reset() {
        let mut world = World::new();
        let e = world.create_entity().unwrap();
        assert_eq!(world.set_or_default::<Hp>(e), Ok(&mut Hp(100)));
        world.get_mut::<Hp>(e).unwrap().0 = 7;
        assert_eq!(world.get_or_set_default::<Hp>(e), Ok(&mut Hp(7)));
    }

    #[test]
    fn destroy_runs_hooks() {
        let mut world = World::new();
        let e = world.create_entity_with::<Doomed>().unwrap();
        let before = DESTROYED.load(Ordering::SeqCst);
        world.destroy_entity(e).unwrap();
        assert_eq!(DESTROYED.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn copy_duplicates_current_values() {
        let mut world = World::new();
        let e = world.create_entity().unwrap();
        world.add_component(e, Position { x: 1.0, y: 1.0 }).unwrap();
        world.add_component(e, Generation(0)).unwrap();
        world.get_mut::<Position>(e).unwrap().x = 3.0;

        let copy = world.copy_entity(e).unwrap();
        assert_ne!(copy, e);
        assert_eq!(world.get::<Position>(copy), Ok(&Position { x: 3.0, y: 1.0 }));
        assert_eq!(world.get::<Generation>(copy), Ok(&Generation(1)));

        world.get_mut::<Position>(e).unwrap().x = 9.0;
        assert_eq!(world.get::<Position>(copy).unwrap().x, 3.0);
        assert_eq!(
            world.component_ids(copy).unwrap().collect::<Vec<_>>(),
            world.component_ids(e).unwrap().collect::<Vec<_>>()
        );
    }

    #[test]
    fn replace_inserts_or_overwrites() {
        let mut world = World::new();
        let e = world.create_entity().unwrap();
        assert_eq!(world.replace_component(e, Hp(1)), Ok(None));
        assert_eq!(world.replace_component(e, Hp(2)), Ok(Some(Hp(1))));
        assert_eq!(world.get::<Hp>(e), Ok(&Hp(2)));
    }

    #[test]
    fn filter_tracks_changes() {
        let mut world = World::new();
        let moving = world.filter(FilterMask::new().include::<Position>().include::<Velocity>());
        let a = world.create_entity().unwrap();
        world.add_component(a, Position::default()).unwrap();
        assert_eq!(world.filter_count(moving), Ok(0));

        world.add_component(a, Velocity::default()).unwrap();
        assert_eq!(world.filter_entities(moving).unwrap(), &[a]);
        assert_eq!(world.filter_first(moving), Ok(Some(a)));

        world.remove_component::<Velocity>(a).unwrap();
        assert_eq!(world.filter_any(moving), Ok(false));
    }

    #[test]
    fn lock_defers_structural_changes() {
        let mut world = World::new();
        let e = world.create_entity_with::<Marker>().unwrap();
        world.lock();
        world.add_component(e, Hp(1)).unwrap();
        assert_eq!(world.has::<Hp>(e), Ok(false));
        assert_eq!(world.remove_component::<Marker>(e), Ok(false));
        assert_eq!(world.deferred_len(), 2);
        assert_eq!(world.create_entity(), Err(EcsError::WorldLocked("create_entity")));
        assert_eq!(world.destroy_entity(e), Err(EcsError::WorldLocked("destroy_entity")));

        world.unlock().unwrap();
        assert_eq!(world.get::<Hp>(e), Ok(&Hp(1)));
        assert_eq!(world.has::<Marker>(e), Ok(false));
        assert_eq!(world.unlock(), Err(EcsError::NotLocked));
    }

    #[test]
    fn locked_world_rejects_immediate_operations() {
        let mut world = World::new();
        let e = world.create_entity_with::<Marker>().unwrap();
        world.add_component(e, Hp(7)).unwrap();
        world.lock();

        assert_eq!(
            world.set_or_default::<Position>(e).map(|_| ()),
            Err(EcsError::WorldLocked("set_or_default"))
        );
        assert_eq!(
            world.create_entity_with::<Marker>(),
            Err(EcsError::WorldLocked("create_entity"))
        );
        assert_eq!(world.copy_entity(e), Err(EcsError::WorldLocked("copy_entity")));
        assert_eq!(world.clear(), Err(EcsError::WorldLocked("clear")));
        assert_eq!(
            world.clear_components::<Hp>(),
            Err(EcsError::WorldLocked("clear_components"))
        );

        assert_eq!(world.entity_count(), 1);
        assert!(world.is_alive(e));
        assert_eq!(world.deferred_len(), 0);
        world.unlock().unwrap();

        assert_eq!(world.entity_count(), 1);
        assert_eq!(world.get::<Hp>(e), Ok(&Hp(7)));
        assert_eq!(world.has::<Marker>(e), Ok(true));
        assert_eq!(world.has::<Position>(e), Ok(false));
    }

    #[test]
    fn restore_entity_at_slot() {
        let mut world = World::new();
        let everyone = world.filter(FilterMask::new().exclude::<Marker>());
        assert_eq!(world.filter_count(everyone), Ok(0));

        let e = world.restore_entity(5, 7).unwrap();
        assert_eq!((e.id(), e.generation()), (5, 7));
        assert!(world.is_alive(e));
        assert_eq!(world.filter_entities(everyone).unwrap(), &[e]);
        world.add_component(e, Hp(1)).unwrap();
        assert_eq!(world.get::<Hp>(e), Ok(&Hp(1)));

        assert_eq!(
            world.restore_entity(5, 8),
            Err(EcsError::DuplicateEntry { id: 5 })
        );
        world.lock();
        assert_eq!(
            world.restore_entity(6, 0),
            Err(EcsError::WorldLocked("restore_entity"))
        );
        world.unlock().unwrap();
        assert_eq!(world.entity_count(), 1);
    }

    #[test]
    fn nested_locks_replay_once() {
        let mut world = World::new();
        let e = world.create_entity_with::<Marker>().unwrap();
        world.lock();
        world.lock();
        world.add_component(e, Hp(1)).unwrap();
        world.unlock().unwrap();
        assert!(world.is_locked());
        assert_eq!(world.has::<Hp>(e), Ok(false));
        world.unlock().unwrap();
        assert_eq!(world.has::<Hp>(e), Ok(true));
        assert_eq!(world.lock_depth(), 0);
    }

    #[test]
    fn replay_is_fifo() {
        let mut world = World::new();
        let e = world.create_entity_with::<Marker>().unwrap();
        world.lock();
        world.add_component(e, Hp(1)).unwrap();
        world.remove_component::<Hp>(e).unwrap();
        world.add_component(e, Hp(2)).unwrap();
        world.unlock().unwrap();
        assert_eq!(world.get::<Hp>(e), Ok(&Hp(2)));
    }

    #[test]
    fn failed_replay_reports_first_error_and_continues() {
        let mut world = World::new();
        let e = world.create_entity_with::<Marker>().unwrap();
        world.lock();
        world.add_component(e, Hp(1)).unwrap();
        world.add_component(e, Hp(2)).unwrap();
        world.add_component(e, Position::default()).unwrap();
        let err = world.unlock().unwrap_err();
        assert!(matches!(err, EcsError::DuplicateComponent { .. }));
        assert_eq!(world.get::<Hp>(e), Ok(&Hp(1)));
        assert_eq!(world.has::<Position>(e), Ok(true));
        assert!(!world.is_locked());
    }

    #[test]
    fn for_each_locked_defers_removals() {
        let mut world = World::new();
        let all = world.filter(FilterMask::new().include::<Hp>());
        for i in 0..4 {
            let e = world.create_entity_with::<Marker>().unwrap();
            world.add_component(e, Hp(i)).unwrap();
        }
        world
            .for_each_locked(all, |world, e| {
                world.get_mut::<Hp>(e).unwrap().0 += 10;
                world.remove_component::<Hp>(e).unwrap();
            })
            .unwrap();
        assert_eq!(world.filter_count(all), Ok(0));
        assert_eq!(world.entity_count(), 4);
    }

    #[test]
    fn for_each_locked_unlocks_after_panic() {
        let mut world = World::new();
        let all = world.filter(FilterMask::new().include::<Hp>());
        let e = world.create_entity_with::<Marker>().unwrap();
        world.add_component(e, Hp(1)).unwrap();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            world.for_each_locked(all, |world, e| {
                world.remove_component::<Hp>(e).unwrap();
                panic!("visitor failed");
            })
        }));
        assert!(outcome.is_err());

        assert!(!world.is_locked());
        assert_eq!(world.has::<Hp>(e), Ok(false));
        assert_eq!(world.filter_count(all), Ok(0));
        assert!(world.create_entity().is_ok());
    }

    #[test]
    fn clear_disposes_everything() {
        let mut world = World::new();
        let f = world.filter(FilterMask::new().include::<Marker>());
        let e = world.create_entity_with::<Marker>().unwrap();
        assert_eq!(world.filter_count(f), Ok(1));
        world.clear().unwrap();
        assert!(!world.is_alive(e));
        assert_eq!(world.entity_count(), 0);
        assert_eq!(world.filter_count(f), Err(EcsError::DisposedFilter(f.index())));

        let again = world.create_entity_with::<Marker>().unwrap();
        assert_eq!(again.id(), e.id());
        assert_ne!(again.generation(), e.generation());
        let f2 = world.filter(FilterMask::new().include::<Marker>());
        assert_eq!(world.filter_entities(f2).unwrap(), &[again]);
    }

    #[test]
    fn clear_components_removes_from_all() {
        let mut world = World::new();
        let with: Vec<_> = (0..3)
            .map(|_| {
                let e = world.create_entity_with::<Marker>().unwrap();
                world.add_component(e, Velocity::default()).unwrap();
                e
            })
            .collect();
        assert_eq!(world.clear_components::<Velocity>(), Ok(3));
        for e in with {
            assert_eq!(world.has::<Velocity>(e), Ok(false));
            assert!(world.is_alive(e));
        }
        assert_eq!(world.clear_components::<Velocity>(), Ok(0));
    }

    #[test]
    fn storage_exposes_type_erased_tables() {
        let mut world = World::new();
        let id = world.register::<Position>();
        assert_eq!(world.storage(id).map(|s| s.len()), Some(0));
        let e = world.create_entity().unwrap();
        world.add_component(e, Position::default()).unwrap();
        let store = world.storage(id).unwrap();
        assert!(store.contains(e.id()));
        assert_eq!(store.entity_ids(), &[e.id()]);
        assert!(world.storage_ids().any(|s| s == id));
    }
}
