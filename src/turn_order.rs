//! Turn-order engine: initiative, round/turn sequencing, and delay.
//!
//! Grounded in `original_source/ecs/systems/turn_order_system.py`'s
//! `TurnOrderSystem`. Initiative is `max(self_control, instinct) + wits`,
//! read through [`crate::components::CharacterSheet`] and refined by an
//! optional [`crate::components::Initiative`] component; ties are broken by
//! a per-entity random value drawn once and cached for the lifetime of the
//! engine, matching the reference's `get_or_create_tie_breaker`.

use std::collections::HashMap;

use crate::components::{CharacterRef, Initiative};
use crate::ecs_store::{EcsStore, EntityId};
use crate::event_bus::EventBus;

pub struct TurnOrderEngine {
    round_number: u32,
    order: Vec<EntityId>,
    index: usize,
    tie_breakers: HashMap<EntityId, u64>,
}

impl TurnOrderEngine {
    pub fn new() -> Self {
        Self { round_number: 0, order: Vec::new(), index: 0, tie_breakers: HashMap::new() }
    }

    pub fn round_number(&self) -> u32 {
        self.round_number
    }

    pub fn get_turn_order(&self) -> &[EntityId] {
        &self.order
    }

    pub fn current_entity(&self) -> Option<&EntityId> {
        self.order.get(self.index)
    }

    fn tie_breaker(&mut self, id: &EntityId) -> u64 {
        *self.tie_breakers.entry(id.clone()).or_insert_with(|| fastrand::u64(..))
    }

    /// `max(self_control, instinct) + wits`, refined by the entity's
    /// [`Initiative`] component if present. `None` if the entity has no
    /// [`CharacterRef`].
    pub fn calculate_initiative(store: &EcsStore, id: &EntityId) -> Option<i32> {
        let character = store.try_get::<CharacterRef>(id)?;
        let base = character.0.self_control().max(character.0.instinct()) + character.0.wits();
        let initiative = store.try_get::<Initiative>(id).unwrap_or_default();
        Some(initiative.resolve(base, 0))
    }

    /// Increments the round counter, rebuilds the turn order from every
    /// living [`CharacterRef`] entity sorted by `(initiative, tie_breaker)`
    /// descending, and publishes `round_started` then `turn_started` for the
    /// first entity (if any are alive).
    pub fn start_new_round(&mut self, store: &EcsStore, bus: &mut EventBus) {
        self.round_number += 1;

        let mut living: Vec<(EntityId, i32)> = store
            .iter::<CharacterRef>()
            .filter(|(_, character)| !character.0.is_dead())
            .filter_map(|(id, _)| Self::calculate_initiative(store, &id).map(|initiative| (id, initiative)))
            .collect();

        let mut keyed: Vec<(EntityId, i32, u64)> = living
            .drain(..)
            .map(|(id, initiative)| {
                let tie = self.tie_breaker(&id);
                (id, initiative, tie)
            })
            .collect();
        keyed.sort_by(|a, b| (b.1, b.2).cmp(&(a.1, a.2)));

        self.order = keyed.into_iter().map(|(id, _, _)| id).collect();
        self.index = 0;

        bus.publish("round_started", serde_json::json!({"round_number": self.round_number}));
        if let Some(first) = self.order.first() {
            bus.publish("turn_started", serde_json::json!({"entity_id": first.as_str(), "round_number": self.round_number}));
        }
    }

    /// Moves the current entity one slot later in the order, or drops it
    /// entirely if it was already last.
    pub fn delay_current_entity(&mut self) {
        if self.index >= self.order.len() {
            return;
        }
        if self.index + 1 < self.order.len() {
            self.order.swap(self.index, self.index + 1);
        } else {
            self.order.remove(self.index);
        }
    }

    /// Ends the current entity's turn and starts the next, rolling into a
    /// new round if the order is exhausted.
    pub fn next_turn(&mut self, store: &EcsStore, bus: &mut EventBus) {
        if let Some(current) = self.order.get(self.index).cloned() {
            bus.publish("turn_ended", serde_json::json!({"entity_id": current.as_str(), "round_number": self.round_number}));
        }
        self.index += 1;
        if self.index >= self.order.len() {
            self.start_new_round(store, bus);
            return;
        }
        if let Some(next) = self.order.get(self.index) {
            bus.publish("turn_started", serde_json::json!({"entity_id": next.as_str(), "round_number": self.round_number}));
        }
    }
}

impl Default for TurnOrderEngine {
    fn default() -> Self {
        Self::new()
    }
}
