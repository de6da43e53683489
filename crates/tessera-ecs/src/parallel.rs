//! Data-parallel iteration over one component type of a filter.

use std::panic::{self, AssertUnwindSafe};

use rayon::prelude::*;

use crate::component::Component;
use crate::entity::Entity;
use crate::error::EcsResult;
use crate::filter::FilterId;
use crate::world::World;

/// Shared view of the world handed to parallel workers.
///
/// Reads go straight to the world. Structural changes are queued and applied
/// in submission order once the parallel walk is over. The component type being
/// iterated is detached for the duration of the walk and reads of it fail with
/// `MissingComponent`.
pub struct ParContext<'w> {
    world: &'w World,
}

impl<'w> ParContext<'w> {
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.world.is_alive(entity)
    }

    pub fn get<U: Component>(&self, entity: Entity) -> EcsResult<&'w U> {
        self.world.get::<U>(entity)
    }

    pub fn has<U: Component>(&self, entity: Entity) -> EcsResult<bool> {
        self.world.has::<U>(entity)
    }

    /// Queue attaching `value` to `entity`.
    pub fn add_component<U: Component>(&self, entity: Entity, value: U) {
        self.world
            .deferred
            .push("add_component", move |world| world.add_component(entity, value));
    }

    /// Queue detaching `U` from `entity`.
    pub fn remove_component<U: Component>(&self, entity: Entity) {
        self.world.deferred.push("remove_component", move |world| {
            world.remove_component::<U>(entity).map(drop)
        });
    }
}

impl World {
    /// Run `f` on the `T` of every entity of `filter`, spread over the rayon pool.
    ///
    /// Entities of the filter that do not own `T` are skipped. The world stays
    /// locked while `f` runs; the queued changes are replayed before returning.
    ///
    /// If `f` panics, the table of `T` is reattached and the world unlocked
    /// (replaying whatever was queued) before the panic resumes.
    pub fn par_for_each<T, F>(&mut self, filter: FilterId, f: F) -> EcsResult<()>
    where
        T: Component,
        F: Fn(&ParContext<'_>, Entity, &mut T) + Sync,
    {
        let selected = self.filter_entities(filter)?.to_vec();
        self.lock();

        let mut table = self.tables.take::<T>(self.config.component_capacity);
        let values = table.values_mut();
        let mut by_slot: Vec<Option<Entity>> = vec![None; values.len()];
        for entity in selected {
            if let Some(slot) = values.slot_of(entity.id()) {
                by_slot[slot] = Some(entity);
            }
        }

        let ctx = ParContext { world: &*self };
        let (_, dense) = values.dense_parts_mut();
        let walked = panic::catch_unwind(AssertUnwindSafe(|| {
            dense
                .par_iter_mut()
                .zip(by_slot.par_iter())
                .for_each(|(value, entity)| {
                    if let Some(entity) = *entity {
                        f(&ctx, entity, value);
                    }
                });
        }));

        self.tables.restore(table);
        let unlocked = self.unlock();
        if let Err(payload) = walked {
            panic::resume_unwind(payload);
        }
        unlocked
    }
}
