//! Terrain-effect engine: round-start current displacement and turn-start
//! hazard re-triggering.
//!
//! Grounded in `original_source/core/terrain_effect_system.py`'s
//! `TerrainEffectSystem`. `round_start` pushes every entity standing on a
//! `current` effect one step in its carry direction, stopping (not
//! publishing a move) if the destination is invalid, non-walkable, or
//! occupied. `turn_start` re-aggregates and re-publishes hazards for the
//! entity whose turn is beginning, reusing
//! [`crate::terrain::GridTerrain::handle_entity_enter`] so both the on-enter
//! and turn-start call sites apply the exact same comparison rule (see
//! SPEC_FULL.md §9).

use crate::ecs_store::EntityId;
use crate::event_bus::EventBus;
use crate::terrain::{EffectKind, GridTerrain};

/// Displaces every entity sitting on a `current` effect along the direction
/// recorded in the effect's `dx`/`dy` data fields, up to `magnitude` single-
/// tile steps, stopping at the first step whose destination is out of
/// bounds, not walkable, or occupied. Publishes exactly one
/// `terrain_current_moved` event per displaced entity, with `magnitude` set
/// to the number of steps actually taken (which may be less than the
/// effect's configured magnitude if the entity was stopped early).
pub fn round_start(terrain: &mut GridTerrain, bus: &mut EventBus) {
    for (id, (x, y)) in terrain.entities_with_anchor() {
        let Some(effect) = terrain.get_effects(x, y).iter().find(|e| e.name == EffectKind::Current).cloned() else {
            continue;
        };
        let dx = effect.data.get("dx").and_then(|v| v.as_i64()).unwrap_or(0) as i32;
        let dy = effect.data.get("dy").and_then(|v| v.as_i64()).unwrap_or(0) as i32;
        let magnitude = effect.data.get("magnitude").and_then(|v| v.as_i64()).unwrap_or(1).max(0);
        if (dx == 0 && dy == 0) || magnitude == 0 {
            continue;
        }

        let origin = (x, y);
        let mut current = origin;
        let mut steps_taken = 0i64;
        for _ in 0..magnitude {
            let dest = (current.0 + dx, current.1 + dy);
            if !terrain.move_entity(&id, dest.0, dest.1, bus) {
                break;
            }
            current = dest;
            steps_taken += 1;
        }
        if steps_taken > 0 {
            bus.publish(
                "terrain_current_moved",
                serde_json::json!({
                    "entity_id": id.as_str(),
                    "from": origin,
                    "to": current,
                    "dx": dx,
                    "dy": dy,
                    "magnitude": steps_taken,
                }),
            );
        }
    }
}

/// Re-aggregates and re-publishes this entity's strongest hazards for the
/// tiles it currently occupies, as if it had just entered them.
pub fn turn_start(terrain: &GridTerrain, bus: &mut EventBus, id: &EntityId) {
    if let Some((x, y)) = terrain.anchor_of(id) {
        terrain.handle_entity_enter(id, x, y, bus);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn current_pushes_entity_one_tile_in_carry_direction() {
        let mut terrain = GridTerrain::new(10, 10, 1.0);
        let mut bus = EventBus::new(64);
        let id: EntityId = "drifter".into();
        terrain.add_entity(id.clone(), 3, 3, &[(0, 0)]);
        terrain.add_effect(EffectKind::Current, &[(3, 3)], json!({"dx": 1, "dy": 0, "magnitude": 1}), &mut bus);

        round_start(&mut terrain, &mut bus);
        assert_eq!(terrain.anchor_of(&id), Some((4, 3)));
    }

    #[test]
    fn scenario_d_current_displaces_entity_by_full_magnitude_in_one_event() {
        let mut terrain = GridTerrain::new(10, 10, 1.0);
        let mut bus = EventBus::new(64);
        let id: EntityId = "drifter".into();
        terrain.add_entity(id.clone(), 0, 0, &[(0, 0)]);
        terrain.add_effect(EffectKind::Current, &[(0, 0)], json!({"dx": 1, "dy": 0, "magnitude": 2}), &mut bus);

        let before = bus.get_current_sequence();
        round_start(&mut terrain, &mut bus);
        assert_eq!(terrain.anchor_of(&id), Some((2, 0)));

        let events = bus.get_events_since(before);
        let current_moved: Vec<_> = events.iter().filter(|e| e.event_type == "terrain_current_moved").collect();
        assert_eq!(current_moved.len(), 1);
        assert_eq!(current_moved[0].data["magnitude"], json!(2));
    }

    #[test]
    fn current_stops_at_first_blocked_step_and_reports_steps_taken() {
        let mut terrain = GridTerrain::new(10, 10, 1.0);
        let mut bus = EventBus::new(64);
        let id: EntityId = "drifter".into();
        terrain.add_entity(id.clone(), 0, 0, &[(0, 0)]);
        terrain.add_effect(EffectKind::Current, &[(0, 0)], json!({"dx": 1, "dy": 0, "magnitude": 3}), &mut bus);
        terrain.add_wall(2, 0, &mut bus);

        let before = bus.get_current_sequence();
        round_start(&mut terrain, &mut bus);
        assert_eq!(terrain.anchor_of(&id), Some((1, 0)));

        let events = bus.get_events_since(before);
        let current_moved: Vec<_> = events.iter().filter(|e| e.event_type == "terrain_current_moved").collect();
        assert_eq!(current_moved.len(), 1);
        assert_eq!(current_moved[0].data["magnitude"], json!(1));
    }

    #[test]
    fn current_does_not_push_into_a_wall() {
        let mut terrain = GridTerrain::new(10, 10, 1.0);
        let mut bus = EventBus::new(64);
        let id: EntityId = "drifter".into();
        terrain.add_entity(id.clone(), 3, 3, &[(0, 0)]);
        terrain.add_effect(EffectKind::Current, &[(3, 3)], json!({"dx": 1, "dy": 0}), &mut bus);
        terrain.add_wall(4, 3, &mut bus);

        round_start(&mut terrain, &mut bus);
        assert_eq!(terrain.anchor_of(&id), Some((3, 3)));
    }

    #[test]
    fn turn_start_re_triggers_dangerous_terrain_under_the_entity() {
        let mut terrain = GridTerrain::new(10, 10, 1.0);
        let mut bus = EventBus::new(64);
        let id: EntityId = "victim".into();
        terrain.add_entity(id.clone(), 2, 2, &[(0, 0)]);
        terrain.add_effect(EffectKind::Dangerous, &[(2, 2)], json!({"difficulty": 4, "damage": 2}), &mut bus);

        let before = bus.get_current_sequence();
        turn_start(&terrain, &mut bus, &id);
        let events = bus.get_events_since(before);
        assert!(events.iter().any(|e| e.event_type == "terrain_effect_trigger"));
    }
}
