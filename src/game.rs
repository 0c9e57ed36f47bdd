//! Composition root: owns every subsystem and exposes the crate's public
//! surface.
//!
//! Shaped after the teacher's `SimWorld` (`api.rs`): a single struct built by
//! `new`/`with_config`, holding the ECS store, terrain, event bus, and the
//! stateful engines (LOS cache, turn order) that need a `&mut` handle across
//! calls. Unlike `SimWorld`, there is no `bevy_ecs::Schedule` here - the core
//! is single-threaded and non-reentrant (SPEC_FULL.md §5), so callers drive
//! it by calling methods directly rather than stepping a fixed timestep.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use crate::components::{CharacterRef, Facing, MovementUsage, Position, Team};
use crate::config::TacticsConfig;
use crate::ecs_store::{EcsStore, EntityId};
use crate::error::TacticsResult;
use crate::event_bus::{EventBus, Handler};
use crate::los::LosEngine;
use crate::movement::MoveOutcome;
use crate::terrain::GridTerrain;
use crate::turn_order::TurnOrderEngine;

/// A movement-accounting request queued by a `movement_reset_requested` or
/// `movement_distance_spent` subscriber while a publish is in progress.
/// Subscriber closures cannot hold `&mut self.store` (the bus living inside
/// `Game` can't lend out a sibling field through a boxed `Handler`), so they
/// queue here instead and [`Game::drain_pending_movement_events`] applies the
/// queue to the store right after the publish that might have filled it.
enum PendingMovementEvent {
    Reset(EntityId),
    DistanceSpent(EntityId, i32),
}

/// Read-only snapshot of an entity's externally relevant state. Never
/// exposes the internal `bevy_ecs::Entity` backing the ID.
#[derive(Debug, Clone)]
pub struct EntityView {
    pub id: EntityId,
    pub position: Option<Position>,
    pub facing: Option<Facing>,
    pub team: Option<Team>,
    pub is_dead: bool,
}

pub struct Game {
    store: EcsStore,
    terrain: GridTerrain,
    bus: EventBus,
    los: LosEngine,
    turn_order: TurnOrderEngine,
    config: TacticsConfig,
    registered_handlers: HashSet<(String, String)>,
    pending_movement: Rc<RefCell<VecDeque<PendingMovementEvent>>>,
}

impl Game {
    pub fn new() -> Self {
        Self::with_config(TacticsConfig::default())
    }

    /// Validates `config` before building, surfacing a bad grid size or cell
    /// size as a [`crate::error::TacticsError::ConfigurationError`] instead
    /// of constructing a `Game` no subsystem can use correctly.
    pub fn try_with_config(config: TacticsConfig) -> TacticsResult<Self> {
        config.validate()?;
        Ok(Self::with_config(config))
    }

    pub fn with_config(config: TacticsConfig) -> Self {
        let mut terrain = GridTerrain::new(config.grid_width, config.grid_height, config.cell_size);
        if config.precompute_paths {
            terrain.precompute_paths();
        }
        let mut game = Self {
            store: EcsStore::new(),
            terrain,
            bus: EventBus::new(config.event_history_capacity),
            los: LosEngine::new(config.los_granularity, config.los_mode),
            turn_order: TurnOrderEngine::new(),
            registered_handlers: HashSet::new(),
            pending_movement: Rc::new(RefCell::new(VecDeque::new())),
            config,
        };
        game.subscribe_movement_handlers();
        game
    }

    /// Replaces the event bus with `bus` and re-subscribes the facade's own
    /// handlers on it, clearing the idempotency tracking first so the new
    /// bus gets a fresh registration rather than being silently skipped.
    ///
    /// Grounded in `original_source/core/game_state.py`'s `set_event_bus`,
    /// which tracks `_movement_subscription_bus` to unsubscribe from the old
    /// bus and re-subscribe on the new one exactly once (SPEC_FULL.md §9).
    pub fn set_event_bus(&mut self, bus: EventBus) {
        self.bus = bus;
        self.registered_handlers.clear();
        self.subscribe_movement_handlers();
    }

    /// Registers the facade's `movement_reset_requested`/
    /// `movement_distance_spent` subscriptions on the current bus (SPEC_FULL.md
    /// §4.5), idempotently per `subscribe_once`.
    fn subscribe_movement_handlers(&mut self) {
        let queue = self.pending_movement.clone();
        self.subscribe_once(
            "movement_reset_requested",
            "game::movement_usage_reset",
            Box::new(move |payload| {
                let entity_id = payload
                    .get("entity_id")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| "movement_reset_requested payload missing entity_id".to_string())?;
                queue.borrow_mut().push_back(PendingMovementEvent::Reset(EntityId::from(entity_id)));
                Ok(())
            }),
        );

        let queue = self.pending_movement.clone();
        self.subscribe_once(
            "movement_distance_spent",
            "game::movement_usage_accumulate",
            Box::new(move |payload| {
                let entity_id = payload
                    .get("entity_id")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| "movement_distance_spent payload missing entity_id".to_string())?;
                let distance = payload.get("distance").and_then(|v| v.as_i64()).unwrap_or(0) as i32;
                queue.borrow_mut().push_back(PendingMovementEvent::DistanceSpent(EntityId::from(entity_id), distance));
                Ok(())
            }),
        );
    }

    /// Applies every movement-accounting request queued by the handlers
    /// registered in [`Game::subscribe_movement_handlers`] to the store.
    fn drain_pending_movement_events(&mut self) {
        while let Some(event) = self.pending_movement.borrow_mut().pop_front() {
            match event {
                PendingMovementEvent::Reset(id) => {
                    if self.store.with_component_mut::<MovementUsage, ()>(&id, |u| u.reset()).is_none() {
                        let _ = self.store.add_component(&id, MovementUsage::default());
                    }
                }
                PendingMovementEvent::DistanceSpent(id, distance) => {
                    crate::movement::register_movement_usage(&mut self.store, &id, distance);
                }
            }
        }
    }

    /// Publishes `movement_reset_requested` for `id` and immediately applies
    /// it, resetting that entity's [`MovementUsage`] for the turn now
    /// starting. Grounded in `game_system.py`'s turn loop, which fires this
    /// event right after `turn_start`, before any action resolution.
    pub fn turn_start_movement_reset(&mut self, id: &EntityId) {
        self.bus.publish("movement_reset_requested", serde_json::json!({"entity_id": id.as_str()}));
        self.drain_pending_movement_events();
    }

    pub fn config(&self) -> &TacticsConfig {
        &self.config
    }

    pub fn store(&self) -> &EcsStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut EcsStore {
        &mut self.store
    }

    pub fn terrain(&self) -> &GridTerrain {
        &self.terrain
    }

    pub fn terrain_mut(&mut self) -> &mut GridTerrain {
        &mut self.terrain
    }

    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    pub fn los_mut(&mut self) -> &mut LosEngine {
        &mut self.los
    }

    pub fn turn_order_mut(&mut self) -> &mut TurnOrderEngine {
        &mut self.turn_order
    }

    pub fn spawn(&mut self) -> EntityId {
        self.store.spawn()
    }

    pub fn spawn_with_id(&mut self, id: impl Into<EntityId>) -> TacticsResult<EntityId> {
        self.store.spawn_with_id(id)
    }

    /// Reports whether `from` currently has line of sight to `to`.
    pub fn has_los(&mut self, from: (i32, i32), to: (i32, i32)) -> bool {
        self.los.has_los(&self.terrain, from, to)
    }

    /// Moves `id` one hop (or pathfound, if `pathfind`) and handles a
    /// void-landing death, if one occurred, by despawning the entity.
    pub fn move_entity(
        &mut self,
        id: &EntityId,
        dest: (i32, i32),
        max_steps: Option<i32>,
        pathfind: bool,
        provoke_aoo: bool,
    ) -> MoveOutcome {
        let outcome = crate::movement::mv(&mut self.store, &mut self.terrain, &mut self.bus, id, dest, max_steps, pathfind, provoke_aoo);
        if outcome.died_in_void {
            self.kill_entity(id, "void");
        }
        outcome
    }

    /// Removes an entity from both the ECS store and the terrain, publishing
    /// `entity_died`. Idempotent: killing an already-dead or unknown entity
    /// is a no-op.
    pub fn kill_entity(&mut self, id: &EntityId, cause: &str) {
        if !self.store.entity_exists(id) {
            return;
        }
        self.terrain.remove_entity(id);
        let _ = self.store.delete_entity(id);
        self.bus.publish("entity_died", serde_json::json!({"entity_id": id.as_str(), "cause": cause}));
    }

    /// Read-only view of an entity's externally relevant state, or `None` if
    /// unknown.
    pub fn entity_view(&self, id: &EntityId) -> Option<EntityView> {
        if !self.store.entity_exists(id) {
            return None;
        }
        let is_dead = self.store.try_get::<CharacterRef>(id).map(|c| c.0.is_dead()).unwrap_or(false);
        Some(EntityView {
            id: id.clone(),
            position: self.store.try_get::<Position>(id),
            facing: self.store.try_get::<Facing>(id),
            team: self.store.try_get::<Team>(id),
            is_dead,
        })
    }

    /// Registers `handler` for `event_type` under `key`, unless a handler was
    /// already registered under that same `(event_type, key)` pair - re-
    /// wiring the same subscription twice (e.g. across a reload) is a no-op
    /// rather than a duplicate dispatch.
    pub fn subscribe_once(&mut self, event_type: impl Into<String>, key: impl Into<String>, handler: Handler) {
        let event_type = event_type.into();
        let key = key.into();
        if !self.registered_handlers.insert((event_type.clone(), key)) {
            return;
        }
        self.bus.subscribe(event_type, handler);
    }

    /// Builds the initiative order for a new round and returns it, publishing
    /// `round_started`/`turn_started` along the way, then resets the first
    /// entity's movement usage for its turn. A thin wrapper so callers don't
    /// need to juggle `turn_order_mut()` against `store()`/`bus_mut()`
    /// borrows themselves.
    pub fn start_round(&mut self) -> Vec<EntityId> {
        self.turn_order.start_new_round(&self.store, &mut self.bus);
        if let Some(first) = self.turn_order.current_entity().cloned() {
            self.turn_start_movement_reset(&first);
        }
        self.turn_order.get_turn_order().to_vec()
    }

    /// Advances the turn order by ending the current entity's turn and
    /// starting the next (or a new round, if exhausted), then resets the new
    /// current entity's movement usage for its turn.
    pub fn next_turn(&mut self) {
        self.turn_order.next_turn(&self.store, &mut self.bus);
        if let Some(current) = self.turn_order.current_entity().cloned() {
            self.turn_start_movement_reset(&current);
        }
    }

    /// Runs the per-round terrain-current displacement sweep.
    pub fn round_start(&mut self) {
        crate::terrain_effects::round_start(&mut self.terrain, &mut self.bus);
    }

    /// Re-triggers hazards for the entity whose turn is starting.
    pub fn turn_start_hazards(&mut self, id: &EntityId) {
        crate::terrain_effects::turn_start(&self.terrain, &mut self.bus, id);
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_round_returns_the_same_order_the_engine_now_holds() {
        let mut game = Game::new();
        // A round with no CharacterRef entities at all is still a valid,
        // empty order rather than an error.
        let order = game.start_round();
        assert!(order.is_empty());
        assert_eq!(game.turn_order_mut().get_turn_order(), order.as_slice());
    }

    #[test]
    fn kill_entity_removes_from_both_store_and_terrain() {
        let mut game = Game::new();
        let id = game.spawn_with_id("a").unwrap();
        game.store_mut().add_component(&id, Position::point(1, 1)).unwrap();
        game.terrain_mut().add_entity(id.clone(), 1, 1, &[(0, 0)]);

        game.kill_entity(&id, "test");
        assert!(!game.store().entity_exists(&id));
        assert_eq!(game.terrain().anchor_of(&id), None);
    }

    #[test]
    fn kill_entity_on_unknown_id_is_a_no_op() {
        let mut game = Game::new();
        game.kill_entity(&"ghost".into(), "test");
    }

    #[test]
    fn void_landing_move_kills_the_entity() {
        let mut game = Game::new();
        let id = game.spawn_with_id("jumper").unwrap();
        game.store_mut().add_component(&id, Position::point(0, 0)).unwrap();
        game.terrain_mut().add_entity(id.clone(), 0, 0, &[(0, 0)]);
        game.terrain_mut().add_effect(
            crate::terrain::EffectKind::ImpassableVoid,
            &[(4, 4)],
            serde_json::json!({}),
            &mut EventBus::new(8),
        );

        let outcome = game.move_entity(&id, (4, 4), None, false, true);
        assert!(outcome.succeeded);
        assert!(outcome.died_in_void);
        assert!(!game.store().entity_exists(&id));
    }

    #[test]
    fn subscribe_once_does_not_register_the_same_key_twice() {
        let mut game = Game::new();
        let calls = std::rc::Rc::new(std::cell::RefCell::new(0));
        for _ in 0..2 {
            let calls = calls.clone();
            game.subscribe_once(
                "wall_added",
                "my-handler",
                Box::new(move |_| {
                    *calls.borrow_mut() += 1;
                    Ok(())
                }),
            );
        }
        let Game { terrain, bus, .. } = &mut game;
        terrain.add_wall(0, 0, bus);
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn turn_start_resets_movement_usage_for_the_entity_whose_turn_begins() {
        let mut game = Game::new();
        let id = game.spawn_with_id("runner").unwrap();
        game.store_mut()
            .add_component(&id, crate::components::CharacterRef::new(std::sync::Arc::new(AlwaysReadyFighter)))
            .unwrap();
        game.store_mut().add_component(&id, MovementUsage { distance: 7 }).unwrap();

        game.start_round();

        assert_eq!(game.store().get_component::<MovementUsage>(&id).unwrap().distance, 0);
    }

    #[test]
    fn movement_distance_spent_event_accumulates_onto_movement_usage() {
        let mut game = Game::new();
        let id = game.spawn_with_id("scout").unwrap();

        game.bus_mut().publish("movement_distance_spent", serde_json::json!({"entity_id": id.as_str(), "distance": 3}));
        game.drain_pending_movement_events();

        assert_eq!(game.store().get_component::<MovementUsage>(&id).unwrap().distance, 3);
    }

    #[test]
    fn set_event_bus_re_subscribes_movement_handlers_on_the_new_bus() {
        let mut game = Game::new();
        let id = game.spawn_with_id("scout").unwrap();
        game.set_event_bus(EventBus::new(16));

        game.bus_mut().publish("movement_distance_spent", serde_json::json!({"entity_id": id.as_str(), "distance": 4}));
        game.drain_pending_movement_events();

        assert_eq!(game.store().get_component::<MovementUsage>(&id).unwrap().distance, 4);
    }

    #[test]
    fn try_with_config_rejects_an_unusable_grid() {
        let bad = TacticsConfig::default().with_grid(0, 10);
        assert!(Game::try_with_config(bad).is_err());
    }

    struct AlwaysReadyFighter;

    impl crate::components::CharacterSheet for AlwaysReadyFighter {
        fn self_control(&self) -> i32 {
            1
        }
        fn instinct(&self) -> i32 {
            1
        }
        fn wits(&self) -> i32 {
            1
        }
        fn is_dead(&self) -> bool {
            false
        }
        fn states(&self) -> HashSet<String> {
            HashSet::new()
        }
    }
}
