use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use tessera_core::BufferPool;

static NEXT_COMPONENT_ID: AtomicU32 = AtomicU32::new(0);

/// Process-wide index of a component type. It is the bit position of the type in
/// every mask and the slot of its table in every world.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u32);

impl ComponentId {
    /// Hand out the next unused id. Called once per component type from the
    /// `component_id` generated by [`declare_component!`].
    #[doc(hidden)]
    pub fn allocate() -> Self {
        Self(NEXT_COMPONENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn from_index(index: usize) -> Self {
        Self(index as u32)
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentId({})", self.0)
    }
}

/// A plain data record attached to at most one entity per type.
///
/// Implement it with [`declare_component!`], which assigns the stable id. Lifecycle
/// hooks default to no-ops and can be overridden inside the macro body.
pub trait Component: Default + Clone + Send + Sync + Sized + 'static {
    /// Stable id of this type, assigned on first call.
    fn component_id() -> ComponentId;

    /// Type name used in error messages.
    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Applied to the default value built by `set_or_default`.
    fn on_reset(&mut self) {}

    /// Produce the value stored on the destination entity of a copy.
    fn duplicate(&self) -> Self {
        self.clone()
    }

    /// Called right before the value is removed from its entity.
    fn on_destroy(&mut self) {}

    /// Rent pooled sub-resources for a freshly defaulted value.
    fn on_pool_acquire(&mut self, _pool: &mut BufferPool) {}

    /// Return pooled sub-resources before removal.
    fn on_pool_release(&mut self, _pool: &mut BufferPool) {}

    /// Raw bytes of the value, for types declared `pod`.
    fn as_bytes(&self) -> Option<&[u8]> {
        None
    }
}

/// Declare a type as a component.
///
/// ```ignore
/// declare_component!(Health);
/// declare_component!(pod Position);
/// declare_component!(Inventory {
///     fn on_destroy(&mut self) { self.items.clear(); }
/// });
/// ```
#[macro_export]
macro_rules! declare_component {
    (pod $ty:ty { $($body:tt)* }) => {
        $crate::declare_component!($ty {
            fn as_bytes(&self) -> ::std::option::Option<&[u8]> {
                ::std::option::Option::Some($crate::__bytemuck::bytes_of(self))
            }
            $($body)*
        });
    };
    (pod $ty:ty) => {
        $crate::declare_component!(pod $ty {});
    };
    ($ty:ty { $($body:tt)* }) => {
        impl $crate::Component for $ty {
            fn component_id() -> $crate::ComponentId {
                static ID: ::std::sync::OnceLock<$crate::ComponentId> =
                    ::std::sync::OnceLock::new();
                *ID.get_or_init($crate::ComponentId::allocate)
            }
            $($body)*
        }
    };
    ($ty:ty) => {
        $crate::declare_component!($ty {});
    };
}

/// Resolve the stable id of `T`, assigning it if this is the first use.
pub fn register<T: Component>() -> ComponentId {
    T::component_id()
}
