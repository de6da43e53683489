use crate::error::{EcsError, EcsResult};

const MIN_CAPACITY: usize = 4;

/// Dense + sparse arrays keyed by small integer ids. Provides O(1)
/// insert/remove/lookup and contiguous iteration.
///
/// Iteration order is the dense order: insertion order until the first removal,
/// after which the last element takes the removed slot.
#[derive(Debug, Clone)]
pub struct SparseSet<T> {
    /// Maps id → dense slot + 1. Zero means absent.
    sparse: Vec<u32>,
    /// Ids of the occupants of each dense slot.
    ids: Vec<u32>,
    /// Packed values.
    dense: Vec<T>,
}

impl<T> SparseSet<T> {
    pub fn new() -> Self {
        Self::with_capacity(MIN_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_CAPACITY);
        Self {
            sparse: vec![0; capacity],
            ids: Vec::with_capacity(capacity),
            dense: Vec::with_capacity(capacity),
        }
    }

    /// Insert a value for `id`. Fails if `id` is already present.
    pub fn insert(&mut self, id: u32, value: T) -> EcsResult<&mut T> {
        if self.contains(id) {
            return Err(EcsError::DuplicateEntry { id });
        }
        self.grow_for(id);
        let slot = self.dense.len();
        self.sparse[id as usize] = slot as u32 + 1;
        self.ids.push(id);
        self.dense.push(value);
        Ok(&mut self.dense[slot])
    }

    /// Insert or overwrite, returning the previous value.
    pub fn replace(&mut self, id: u32, value: T) -> Option<T> {
        match self.slot_of(id) {
            Some(slot) => Some(std::mem::replace(&mut self.dense[slot], value)),
            None => {
                // Absent ids always insert.
                let _ = self.insert(id, value);
                None
            }
        }
    }

    /// Remove the value for `id`, moving the last element into its slot.
    pub fn remove(&mut self, id: u32) -> Option<T> {
        let slot = self.slot_of(id)?;
        self.sparse[id as usize] = 0;

        let last = self.dense.len() - 1;
        if slot != last {
            self.ids.swap(slot, last);
            self.dense.swap(slot, last);
            let moved = self.ids[slot];
            self.sparse[moved as usize] = slot as u32 + 1;
        }
        self.ids.pop();
        self.dense.pop()
    }

    #[inline]
    pub fn contains(&self, id: u32) -> bool {
        self.slot_of(id).is_some()
    }

    /// Dense slot currently holding `id`.
    #[inline]
    pub fn slot_of(&self, id: u32) -> Option<usize> {
        match self.sparse.get(id as usize) {
            Some(&s) if s != 0 => Some(s as usize - 1),
            _ => None,
        }
    }

    pub fn get(&self, id: u32) -> EcsResult<&T> {
        self.slot_of(id)
            .map(|slot| &self.dense[slot])
            .ok_or(EcsError::MissingEntry { id })
    }

    pub fn get_mut(&mut self, id: u32) -> EcsResult<&mut T> {
        match self.slot_of(id) {
            Some(slot) => Ok(&mut self.dense[slot]),
            None => Err(EcsError::MissingEntry { id }),
        }
    }

    /// First value in dense order.
    pub fn first(&self) -> Option<&T> {
        self.dense.first()
    }

    /// Last value in dense order.
    pub fn last(&self) -> Option<&T> {
        self.dense.last()
    }

    pub fn len(&self) -> usize {
        self.dense.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// Largest id + 1 that fits without growing.
    pub fn capacity(&self) -> usize {
        self.sparse.len()
    }

    /// Ids in dense order.
    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    /// Values in dense order.
    pub fn values(&self) -> &[T] {
        &self.dense
    }

    /// Ids and mutable values in dense order, borrowed together.
    pub fn dense_parts_mut(&mut self) -> (&[u32], &mut [T]) {
        (&self.ids, &mut self.dense)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.ids.iter().copied().zip(self.dense.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut T)> {
        self.ids.iter().copied().zip(self.dense.iter_mut())
    }

    /// Remove everything. Only the sparse entries of live ids are touched.
    pub fn clear(&mut self) {
        for &id in &self.ids {
            self.sparse[id as usize] = 0;
        }
        self.ids.clear();
        self.dense.clear();
    }

    /// Remove everything, yielding the values in dense order.
    pub fn drain(&mut self) -> impl Iterator<Item = (u32, T)> + '_ {
        for &id in &self.ids {
            self.sparse[id as usize] = 0;
        }
        self.ids.drain(..).zip(self.dense.drain(..))
    }

    fn grow_for(&mut self, id: u32) {
        let mut capacity = self.sparse.len();
        while id as usize >= capacity || self.dense.len() >= capacity {
            capacity *= 2;
        }
        if capacity != self.sparse.len() {
            self.sparse.resize(capacity, 0);
            self.ids.reserve(capacity - self.ids.len());
            self.dense.reserve(capacity - self.dense.len());
        }
    }
}

impl<T> Default for SparseSet<T> {
    fn default() -> Self {
        Self::new()
    }
}
