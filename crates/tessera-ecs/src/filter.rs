//! Cached entity sets keyed by (include, exclude) component masks.
//!
//! Structural changes only record which component ids changed. A filter rebuilds
//! its cache on the first read after one of its ids was touched.

use std::collections::HashMap;

use tessera_core::ScanStrategy;
use tracing::debug;

use crate::bit_vector::BitVector;
use crate::component::{Component, ComponentId};
use crate::entity::{Entity, EntityRecord, EntityTable};
use crate::error::{EcsError, EcsResult};
use crate::table::ComponentArena;

/// Component types an entity must own (`include`) and must not own (`exclude`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FilterMask {
    include: BitVector,
    exclude: BitVector,
}

impl FilterMask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include<T: Component>(self) -> Self {
        self.include_id(T::component_id())
    }

    pub fn exclude<T: Component>(self) -> Self {
        self.exclude_id(T::component_id())
    }

    pub fn include_id(mut self, id: ComponentId) -> Self {
        self.include.set(id.index());
        self
    }

    pub fn exclude_id(mut self, id: ComponentId) -> Self {
        self.exclude.set(id.index());
        self
    }

    /// Union of the includes and of the excludes of both masks.
    pub fn combine(a: &FilterMask, b: &FilterMask) -> FilterMask {
        FilterMask {
            include: &a.include | &b.include,
            exclude: &a.exclude | &b.exclude,
        }
    }

    pub fn includes(&self) -> &BitVector {
        &self.include
    }

    pub fn excludes(&self) -> &BitVector {
        &self.exclude
    }

    /// An entity owning exactly `mask` passes this filter.
    pub fn matches(&self, mask: &BitVector) -> bool {
        mask.is_superset_of(&self.include) && !mask.intersects(&self.exclude)
    }

    pub fn hash_id(&self) -> u64 {
        self.include.hash_id() ^ self.exclude.hash_id().rotate_left(1)
    }
}

/// Handle to a filter owned by a world.
///
/// Handles from before a `World::clear` are rejected with
/// [`EcsError::DisposedFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterId {
    index: u32,
    epoch: u32,
}

impl FilterId {
    pub fn index(self) -> u32 {
        self.index
    }
}

struct Filter {
    mask: FilterMask,
    cache: Vec<Entity>,
    dirty: bool,
}

/// Owns every filter of a world and the bookkeeping that invalidates them.
pub(crate) struct FilterEngine {
    filters: Vec<Filter>,
    by_hash: HashMap<u64, Vec<u32>>,
    /// Filters interested in each component id, through either mask.
    by_component: Vec<Vec<u32>>,
    /// Filters with an empty include mask, affected by every entity creation.
    unbounded: Vec<u32>,
    pending: BitVector,
    population_changed: bool,
    epoch: u32,
}

impl FilterEngine {
    pub fn new(capacity: usize) -> Self {
        Self {
            filters: Vec::with_capacity(capacity),
            by_hash: HashMap::with_capacity(capacity),
            by_component: Vec::new(),
            unbounded: Vec::new(),
            pending: BitVector::new(),
            population_changed: false,
            epoch: 0,
        }
    }

    /// Filter for `mask`, created on first request. Set-equal masks share a filter.
    pub fn get_or_create(&mut self, mask: FilterMask) -> FilterId {
        let hash = mask.hash_id();
        if let Some(candidates) = self.by_hash.get(&hash) {
            if let Some(&index) = candidates
                .iter()
                .find(|&&i| self.filters[i as usize].mask == mask)
            {
                return self.handle(index);
            }
        }

        let index = self.filters.len() as u32;
        debug!("Creating filter #{} (hash {:016x})", index, hash);
        for bit in mask.include.ones().chain(mask.exclude.ones()) {
            if bit >= self.by_component.len() {
                self.by_component.resize_with(bit + 1, Vec::new);
            }
            let listeners = &mut self.by_component[bit];
            if listeners.last() != Some(&index) {
                listeners.push(index);
            }
        }
        if mask.include.is_empty() {
            self.unbounded.push(index);
        }
        self.by_hash.entry(hash).or_default().push(index);
        self.filters.push(Filter {
            mask,
            cache: Vec::new(),
            dirty: true,
        });
        self.handle(index)
    }

    fn handle(&self, index: u32) -> FilterId {
        FilterId {
            index,
            epoch: self.epoch,
        }
    }

    fn slot(&self, id: FilterId) -> EcsResult<usize> {
        if id.epoch != self.epoch || id.index as usize >= self.filters.len() {
            return Err(EcsError::DisposedFilter(id.index));
        }
        Ok(id.index as usize)
    }

    pub fn mask(&self, id: FilterId) -> EcsResult<&FilterMask> {
        let slot = self.slot(id)?;
        Ok(&self.filters[slot].mask)
    }

    /// Record that entities gained or lost component `id`.
    pub fn mark_dirty(&mut self, id: ComponentId) {
        self.pending.set(id.index());
    }

    /// Record that an entity was created or released.
    pub fn mark_population_changed(&mut self) {
        self.population_changed = true;
    }

    /// Move pending changes onto the affected filters.
    pub fn flush(&mut self) {
        for bit in self.pending.ones() {
            if let Some(listeners) = self.by_component.get(bit) {
                for &index in listeners {
                    self.filters[index as usize].dirty = true;
                }
            }
        }
        self.pending.clear();
        if std::mem::take(&mut self.population_changed) {
            for &index in &self.unbounded {
                self.filters[index as usize].dirty = true;
            }
        }
    }

    /// Cached entities of `id`, rebuilt first if anything relevant changed.
    pub fn refresh(
        &mut self,
        id: FilterId,
        entities: &EntityTable,
        tables: &ComponentArena,
        strategy: ScanStrategy,
    ) -> EcsResult<&[Entity]> {
        let slot = self.slot(id)?;
        self.flush();
        let filter = &mut self.filters[slot];
        if filter.dirty {
            Self::rebuild(filter, entities, tables, strategy);
            filter.dirty = false;
        }
        Ok(&filter.cache)
    }

    fn rebuild(
        filter: &mut Filter,
        entities: &EntityTable,
        tables: &ComponentArena,
        strategy: ScanStrategy,
    ) {
        filter.cache.clear();
        let mask = &filter.mask;
        let keep = |record: &EntityRecord| mask.matches(record.mask());

        if mask.include.is_empty() || strategy == ScanStrategy::Full {
            filter
                .cache
                .extend(entities.iter().filter(|&r| keep(r)).map(EntityRecord::handle));
            return;
        }

        let mut smallest: Option<&[u32]> = None;
        for bit in mask.include.ones() {
            // An include type nobody has ever stored cannot match anything.
            let Some(table) = tables.get(ComponentId::from_index(bit)) else {
                return;
            };
            let ids = table.entity_ids();
            if smallest.map_or(true, |s| ids.len() < s.len()) {
                smallest = Some(ids);
            }
        }
        let candidates = smallest.unwrap_or_default();
        filter.cache.extend(
            candidates
                .iter()
                .filter_map(|&id| entities.get(id).ok())
                .filter(|&r| keep(r))
                .map(EntityRecord::handle),
        );
    }

    /// Number of live filters.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Dispose every filter. Outstanding handles become invalid.
    pub fn clear(&mut self) {
        self.filters.clear();
        self.by_hash.clear();
        self.by_component.clear();
        self.unbounded.clear();
        self.pending.clear();
        self.population_changed = false;
        self.epoch = self.epoch.wrapping_add(1);
    }
}
