use crate::entity::Entity;

/// Errors raised by entity, component and filter operations.
///
/// Every error leaves the world unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EcsError {
    #[error("sparse set already contains id {id}")]
    DuplicateEntry { id: u32 },

    #[error("sparse set has no entry for id {id}")]
    MissingEntry { id: u32 },

    #[error("{entity} already contains {component}")]
    DuplicateComponent {
        entity: Entity,
        component: &'static str,
    },

    #[error("{entity} does not contain {component}")]
    MissingComponent {
        entity: Entity,
        component: &'static str,
    },

    #[error("{0} is dead")]
    DeadEntity(Entity),

    #[error("world is locked, {0} cannot be deferred")]
    WorldLocked(&'static str),

    #[error("world is not locked")]
    NotLocked,

    #[error("filter #{0} was disposed")]
    DisposedFilter(u32),
}

pub type EcsResult<T> = Result<T, EcsError>;
