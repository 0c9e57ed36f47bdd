//! Tactical grid combat core.
//!
//! A deterministic, single-threaded engine for grid-based tactical combat:
//! entities and components over `bevy_ecs`, a versioned terrain grid with
//! walls/occupancy/effects, a cached line-of-sight engine, cost-aware
//! movement and pathfinding, round/turn sequencing by initiative, and a
//! synchronous event bus tying it all together. [`game::Game`] is the
//! composition root; most callers only need that module.

pub mod components;
pub mod config;
pub mod ecs_store;
pub mod error;
pub mod event_bus;
pub mod game;
pub mod los;
pub mod movement;
pub mod terrain;
pub mod terrain_effects;
pub mod turn_order;
pub mod vision;

pub use components::*;
pub use config::{LosSamplingMode, TacticsConfig};
pub use ecs_store::{EcsStore, EntityId};
pub use error::{TacticsError, TacticsResult};
pub use event_bus::{EventBus, EventPriority};
pub use game::{EntityView, Game};
pub use los::LosEngine;
pub use movement::MoveOutcome;
pub use terrain::{Effect, EffectKind, GridTerrain};
pub use turn_order::TurnOrderEngine;
