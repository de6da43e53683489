//! Tessera ECS - Entity Component data engine
//!
//! Sparse-set storage for components, generational entity handles, and cached
//! include/exclude filters that rebuild lazily after structural changes.
//! Structural mutation during iteration goes through a lock counter and a
//! deferred queue, which is also what lets one component type be walked in
//! parallel with rayon.

pub mod bit_vector;
pub mod component;
pub mod concurrent;
mod deferred;
pub mod entity;
pub mod error;
pub mod filter;
pub mod parallel;
pub mod sparse_set;
pub mod table;
pub mod world;

pub use bit_vector::BitVector;
pub use component::{register, Component, ComponentId};
pub use concurrent::ConcurrentWorld;
pub use entity::{Entity, WorldId};
pub use error::{EcsError, EcsResult};
pub use filter::{FilterId, FilterMask};
pub use parallel::ParContext;
pub use sparse_set::SparseSet;
pub use table::{ComponentStore, ComponentTable};
pub use world::World;

pub use tessera_core::{BufferPool, ScanStrategy, WorldConfig};

#[doc(hidden)]
pub use bytemuck as __bytemuck;
