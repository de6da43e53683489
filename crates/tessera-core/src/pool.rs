use std::any::{Any, TypeId};
use std::collections::HashMap;

const DEFAULT_BUFFER_CAPACITY: usize = 4;

/// Type-keyed pool of reusable `Vec<T>` buffers.
///
/// Components that own growable sub-buffers rent them here in their pool-acquire
/// hook and hand them back in their pool-release hook, so churn of such components
/// stops allocating once the pool is warm.
pub struct BufferPool {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    rented: usize,
}

impl BufferPool {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            rented: 0,
        }
    }

    fn free_list<T: 'static + Send + Sync>(&mut self) -> &mut Vec<Vec<T>> {
        self.map
            .entry(TypeId::of::<Vec<T>>())
            .or_insert_with(|| Box::new(Vec::<Vec<T>>::new()))
            .downcast_mut::<Vec<Vec<T>>>()
            .expect("buffer pool keyed by element type")
    }

    /// Rent an empty buffer, reusing a returned one when available.
    pub fn rent<T: 'static + Send + Sync>(&mut self) -> Vec<T> {
        self.rented += 1;
        self.free_list::<T>()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(DEFAULT_BUFFER_CAPACITY))
    }

    /// Return a buffer. It is cleared and kept for the next `rent`.
    pub fn give_back<T: 'static + Send + Sync>(&mut self, mut buffer: Vec<T>) {
        self.rented = self.rented.saturating_sub(1);
        buffer.clear();
        self.free_list::<T>().push(buffer);
    }

    /// Number of idle buffers of element type `T`.
    pub fn idle<T: 'static + Send + Sync>(&self) -> usize {
        self.map
            .get(&TypeId::of::<Vec<T>>())
            .and_then(|b| b.downcast_ref::<Vec<Vec<T>>>())
            .map_or(0, Vec::len)
    }

    /// Buffers rented and not yet given back.
    pub fn rented(&self) -> usize {
        self.rented
    }

    /// Drop every idle buffer and forget outstanding rentals.
    pub fn clear(&mut self) {
        self.map.clear();
        self.rented = 0;
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}
