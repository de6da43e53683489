use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::error::EcsResult;
use crate::world::World;

/// A structural mutation recorded while the world was locked.
pub(crate) struct DeferredOp {
    pub label: &'static str,
    pub apply: Box<dyn FnOnce(&mut World) -> EcsResult<()> + Send>,
}

/// FIFO of deferred operations. Pushing only needs `&self`, so parallel workers
/// share it through the world.
pub(crate) struct DeferredQueue {
    ops: Mutex<VecDeque<DeferredOp>>,
}

impl DeferredQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ops: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push<F>(&self, label: &'static str, apply: F)
    where
        F: FnOnce(&mut World) -> EcsResult<()> + Send + 'static,
    {
        self.ops.lock().push_back(DeferredOp {
            label,
            apply: Box::new(apply),
        });
    }

    /// Pop the oldest operation. The lock is released before the caller applies it,
    /// so replayed ops may enqueue again.
    pub fn pop(&self) -> Option<DeferredOp> {
        self.ops.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.ops.lock().len()
    }

    pub fn clear(&self) {
        self.ops.lock().clear();
    }
}
