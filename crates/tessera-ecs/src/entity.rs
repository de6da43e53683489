use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::debug;

use crate::bit_vector::BitVector;
use crate::error::{EcsError, EcsResult};
use crate::sparse_set::SparseSet;

static NEXT_WORLD_ID: AtomicU32 = AtomicU32::new(0);

/// Generation held by a slot that has never been handed out. The first
/// allocation wraps it to zero.
const NEVER_ALLOCATED: u32 = u32::MAX;
/// A slot released at this generation or above is retired for good, so a
/// wrapped counter never revives an old handle.
const LAST_GENERATION: u32 = u32::MAX - 1;

/// Process-unique identifier of a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorldId(u32);

impl WorldId {
    pub(crate) fn next() -> Self {
        Self(NEXT_WORLD_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Create a world id from its raw value (mainly for testing).
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// A generational entity handle: slot id, generation of that slot, owning world.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entity {
    id: u32,
    generation: u32,
    world: WorldId,
}

impl Entity {
    /// Handle that never refers to a live entity.
    pub const EMPTY: Entity = Entity {
        id: u32::MAX,
        generation: u32::MAX,
        world: WorldId(u32::MAX),
    };

    /// Create an entity from raw parts (mainly for testing).
    pub fn new(id: u32, generation: u32, world: WorldId) -> Self {
        Self {
            id,
            generation,
            world,
        }
    }

    /// The slot index of this entity.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The generation of this entity (incremented on reuse).
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn world(&self) -> WorldId {
        self.world
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{}@{})", self.id, self.generation, self.world.0)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity[{}|{}|{}]", self.id, self.generation, self.world.0)
    }
}

/// Per-slot state: the current handle and the mask of owned component types.
#[derive(Debug, Clone)]
pub struct EntityRecord {
    handle: Entity,
    mask: BitVector,
}

impl EntityRecord {
    fn carve(id: u32, world: WorldId) -> Self {
        Self {
            handle: Entity::new(id, NEVER_ALLOCATED, world),
            mask: BitVector::new(),
        }
    }

    pub fn handle(&self) -> Entity {
        self.handle
    }

    pub fn mask(&self) -> &BitVector {
        &self.mask
    }

    pub(crate) fn mask_mut(&mut self) -> &mut BitVector {
        &mut self.mask
    }

    /// No component bit is set.
    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }
}

/// Live entity records plus a free-list pool that recycles slot ids.
pub struct EntityTable {
    world: WorldId,
    live: SparseSet<EntityRecord>,
    /// Stack of free records; the top is handed out next.
    free: Vec<EntityRecord>,
    carved: usize,
    retired: usize,
}

impl EntityTable {
    pub fn new(world: WorldId, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut table = Self {
            world,
            live: SparseSet::with_capacity(capacity),
            free: Vec::with_capacity(capacity),
            carved: 0,
            retired: 0,
        };
        table.carve_up_to(capacity);
        table
    }

    /// Carve slots `[carved, target)`, pushed so the lowest id pops first.
    fn carve_up_to(&mut self, target: usize) {
        if target <= self.carved {
            return;
        }
        let world = self.world;
        let mut fresh: Vec<EntityRecord> = (self.carved..target)
            .rev()
            .map(|id| EntityRecord::carve(id as u32, world))
            .collect();
        // New slots go underneath the already-free ones.
        fresh.append(&mut self.free);
        self.free = fresh;
        self.carved = target;
    }

    fn grow(&mut self) {
        let target = self.carved * 2;
        debug!("Growing entity pool from {} to {} slots", self.carved, target);
        self.carve_up_to(target);
    }

    /// Hand out a free slot, bumping its generation.
    pub fn allocate(&mut self) -> Entity {
        let mut record = loop {
            if let Some(record) = self.free.pop() {
                break record;
            }
            self.grow();
        };
        // Wraps only from NEVER_ALLOCATED; exhausted slots never reach the free list.
        record.handle.generation = record.handle.generation.wrapping_add(1);
        record.mask.clear();
        let handle = record.handle;
        // Free slots are never live, the insert cannot collide.
        let _ = self.live.insert(handle.id, record);
        handle
    }

    /// Allocate the slot `id` with an explicit generation, for restoring saved
    /// worlds.
    pub fn allocate_at(&mut self, id: u32, generation: u32) -> EcsResult<Entity> {
        if self.live.contains(id) {
            return Err(EcsError::DuplicateEntry { id });
        }
        while id as usize >= self.carved {
            self.grow();
        }
        let position = self
            .free
            .iter()
            .rposition(|r| r.handle.id == id)
            .ok_or(EcsError::MissingEntry { id })?;
        let mut record = self.free.remove(position);
        record.handle.generation = generation;
        record.mask.clear();
        let handle = record.handle;
        let _ = self.live.insert(id, record);
        Ok(handle)
    }

    /// Return a live slot to the pool. The generation is kept until the slot is
    /// allocated again. A slot whose generation is exhausted is retired.
    pub fn release(&mut self, id: u32) -> bool {
        let Some(mut record) = self.live.remove(id) else {
            return false;
        };
        record.mask.clear();
        self.recycle(record);
        true
    }

    fn recycle(&mut self, record: EntityRecord) {
        if record.handle.generation >= LAST_GENERATION {
            debug!(
                "Retiring entity slot {} at generation {}",
                record.handle.id, record.handle.generation
            );
            self.retired += 1;
        } else {
            self.free.push(record);
        }
    }

    /// Slots taken out of circulation because their generation ran out.
    pub fn retired(&self) -> usize {
        self.retired
    }

    pub fn is_alive(&self, handle: Entity) -> bool {
        handle.world == self.world
            && self
                .live
                .get(handle.id)
                .is_ok_and(|r| r.handle.generation == handle.generation)
    }

    pub fn get(&self, id: u32) -> EcsResult<&EntityRecord> {
        self.live.get(id)
    }

    pub fn get_mut(&mut self, id: u32) -> EcsResult<&mut EntityRecord> {
        self.live.get_mut(id)
    }

    /// Current handle of a live slot.
    pub fn handle(&self, id: u32) -> Option<Entity> {
        self.live.get(id).ok().map(EntityRecord::handle)
    }

    /// Live records in dense order.
    pub fn iter(&self) -> impl Iterator<Item = &EntityRecord> {
        self.live.values().iter()
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Slots carved so far, live or free.
    pub fn capacity(&self) -> usize {
        self.carved
    }

    /// Return every live slot to the pool, keeping generations.
    pub fn clear(&mut self) {
        let released: Vec<EntityRecord> = self.live.drain().map(|(_, r)| r).collect();
        for mut record in released {
            record.mask.clear();
            self.recycle(record);
        }
        self.free.sort_unstable_by(|a, b| b.handle.id.cmp(&a.handle.id));
    }
}
