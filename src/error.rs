//! Typed errors for programmer-error conditions.
//!
//! SPEC_FULL.md §7 names `InvalidPlacement` and `InvalidMove` alongside its
//! other error kinds, but its own propagation policy is explicit that these
//! two are expected negative outcomes, not raises: placement and move
//! rejection are reported as `bool`/`Option` return values elsewhere in this
//! crate (`GridTerrain::add_entity`/`move_entity`, `MoveOutcome::succeeded`)
//! and never surface here. `TacticsError` is reserved for conditions a
//! caller should not routinely hit during normal play (unknown entity, wrong
//! component type, bad setup). A subscriber fault on the event bus is
//! likewise never one of these: `EventBus::publish` logs and continues, per
//! `event_bus.rs`, so there is no `HandlerFault` variant here to construct.

use crate::ecs_store::EntityId;

/// Errors produced by the tactical combat core.
#[derive(Debug, thiserror::Error)]
pub enum TacticsError {
    #[error("entity already exists: {0}")]
    DuplicateEntity(EntityId),

    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("entity {entity} has no component of type {component_type}")]
    ComponentNotFound {
        entity: EntityId,
        component_type: &'static str,
    },

    #[error("configuration error: {0}")]
    ConfigurationError(String),
}

pub type TacticsResult<T> = Result<T, TacticsError>;
