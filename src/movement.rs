//! Movement engine: cost-aware reachability, pathfinding, and stepwise moves.
//!
//! Grounded in `original_source/ecs/systems/movement.py`'s `MovementSystem`:
//! `reachable`/`find_path` are Dijkstra over 4-directional steps weighted by
//! [`crate::terrain::GridTerrain::get_movement_cost`]; `mv`/`path_move` apply
//! one step at a time, each step atomically committed or aborted via
//! [`crate::terrain::GridTerrain::move_entity`], publishing
//! `movement_started`/`movement_ended` around the terrain's own
//! `entity_moved`/`terrain_effect_trigger*` events.

use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::components::{CharacterRef, Cover, Facing, MovementUsage, Position};
use crate::ecs_store::EcsStore;
use crate::event_bus::EventBus;
use crate::terrain::GridTerrain;

const STEPS: [(i32, i32); 4] = [(0, 1), (1, 0), (0, -1), (-1, 0)];

/// Min-heap entry ordered by ascending cost (`Reverse`-style via custom `Ord`).
#[derive(PartialEq, Eq)]
struct HeapEntry {
    cost: i32,
    tile: (i32, i32),
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.cost.cmp(&self.cost).then_with(|| other.tile.cmp(&self.tile))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Result of a completed or attempted move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome {
    pub succeeded: bool,
    /// Set when the entity's final tile carried an `impassable_void` effect;
    /// the caller (the game facade) is responsible for killing the entity.
    pub died_in_void: bool,
}

impl MoveOutcome {
    fn rejected() -> Self {
        Self { succeeded: false, died_in_void: false }
    }
}

/// Reads an entity's footprint dimensions from its [`Position`], defaulting
/// to a single tile if the entity has no recorded position.
fn footprint_of(store: &EcsStore, id: &crate::ecs_store::EntityId) -> (i32, i32, i32, i32) {
    match store.try_get::<Position>(id) {
        Some(p) => (p.x, p.y, p.width, p.height),
        None => (0, 0, 1, 1),
    }
}

/// Convenience wrapper mirroring the reference's `MovementSystem.is_walkable`
/// helper used by AI and other callers that don't need a full move.
pub fn is_walkable(terrain: &GridTerrain, x: i32, y: i32, width: i32, height: i32) -> bool {
    terrain.is_walkable(x, y, width, height)
}

/// Dijkstra reachability from `id`'s current position up to `max_distance`,
/// returning `(x, y, cost)` triples including the origin at cost `0`.
/// `reserved` additionally blocks tiles (e.g. tiles another entity has
/// provisionally claimed this round) beyond terrain occupancy.
pub fn reachable(
    store: &EcsStore,
    terrain: &GridTerrain,
    id: &crate::ecs_store::EntityId,
    max_distance: i32,
    reserved: &HashSet<(i32, i32)>,
) -> Vec<(i32, i32, i32)> {
    let _span = tracing::trace_span!("movement::reachable", entity = id.as_str(), max_distance).entered();
    let (sx, sy, w, h) = footprint_of(store, id);
    let start = (sx, sy);
    let mut heap = BinaryHeap::new();
    heap.push(HeapEntry { cost: 0, tile: start });
    let mut best: HashMap<(i32, i32), i32> = HashMap::new();
    best.insert(start, 0);
    let mut out = Vec::new();

    while let Some(HeapEntry { cost, tile }) = heap.pop() {
        if cost > best.get(&tile).copied().unwrap_or(i32::MAX) {
            continue;
        }
        if cost > max_distance {
            continue;
        }
        out.push((tile.0, tile.1, cost));
        for (dx, dy) in STEPS {
            let next = (tile.0 + dx, tile.1 + dy);
            if reserved.contains(&next) {
                continue;
            }
            if !terrain.is_walkable(next.0, next.1, w, h) {
                continue;
            }
            if terrain.is_occupied(next.0, next.1, w, h, Some(id), false) {
                continue;
            }
            let step_cost = terrain.get_movement_cost(next.0, next.1);
            let next_cost = cost + step_cost;
            if next_cost > max_distance {
                continue;
            }
            if next_cost < best.get(&next).copied().unwrap_or(i32::MAX) {
                best.insert(next, next_cost);
                heap.push(HeapEntry { cost: next_cost, tile: next });
            }
        }
    }
    out
}

/// Dijkstra shortest path from `id`'s current position to `dest`, inclusive
/// of both endpoints. Empty if unreachable within `max_distance` (if given).
pub fn find_path(
    store: &EcsStore,
    terrain: &GridTerrain,
    id: &crate::ecs_store::EntityId,
    dest: (i32, i32),
    max_distance: Option<i32>,
) -> Vec<(i32, i32)> {
    let _span = tracing::trace_span!("movement::find_path", entity = id.as_str(), ?dest).entered();
    let (sx, sy, w, h) = footprint_of(store, id);
    let start = (sx, sy);
    if start == dest {
        return vec![start];
    }
    let cap = max_distance.unwrap_or(i32::MAX);

    let mut heap = BinaryHeap::new();
    heap.push(HeapEntry { cost: 0, tile: start });
    let mut best: HashMap<(i32, i32), i32> = HashMap::new();
    best.insert(start, 0);
    let mut parent: HashMap<(i32, i32), (i32, i32)> = HashMap::new();

    while let Some(HeapEntry { cost, tile }) = heap.pop() {
        if cost > best.get(&tile).copied().unwrap_or(i32::MAX) {
            continue;
        }
        if tile == dest {
            let mut path = vec![tile];
            let mut cur = tile;
            while cur != start {
                cur = parent[&cur];
                path.push(cur);
            }
            path.reverse();
            return path;
        }
        if cost > cap {
            continue;
        }
        for (dx, dy) in STEPS {
            let next = (tile.0 + dx, tile.1 + dy);
            if !terrain.is_walkable(next.0, next.1, w, h) {
                continue;
            }
            if terrain.is_occupied(next.0, next.1, w, h, Some(id), false) {
                continue;
            }
            let next_cost = cost + terrain.get_movement_cost(next.0, next.1);
            if next_cost > cap {
                continue;
            }
            if next_cost < best.get(&next).copied().unwrap_or(i32::MAX) {
                best.insert(next, next_cost);
                parent.insert(next, tile);
                heap.push(HeapEntry { cost: next_cost, tile: next });
            }
        }
    }
    Vec::new()
}

/// Records traveled distance on `id`'s [`MovementUsage`], inserting a default
/// component first if absent. Public per the reference's
/// `register_movement_usage`, for callers that move an entity by some means
/// other than this module (e.g. a forced push).
pub fn register_movement_usage(store: &mut EcsStore, id: &crate::ecs_store::EntityId, distance: i32) {
    if distance <= 0 {
        return;
    }
    if store.with_component_mut::<MovementUsage, ()>(id, |u| u.add(distance)).is_none() {
        let mut usage = MovementUsage::default();
        usage.add(distance);
        let _ = store.add_component(id, usage);
    }
}

fn update_facing(store: &mut EcsStore, id: &crate::ecs_store::EntityId, origin: (i32, i32), destination: (i32, i32)) {
    if origin == destination {
        return;
    }
    let updated_orientation = store.with_component_mut::<Facing, Option<crate::components::Orientation>>(id, |facing| {
        if facing.is_fixed() {
            return None;
        }
        facing.face_towards_position(origin, destination);
        Some(facing.orientation)
    });
    if let (Some(Some(orientation)), Some(character)) = (updated_orientation, store.try_get::<CharacterRef>(id)) {
        character.0.set_orientation(orientation);
    }
}

fn bump_blocker_if_blocking(store: &EcsStore, terrain: &mut GridTerrain, id: &crate::ecs_store::EntityId) {
    if store.has_component::<CharacterRef>(id) || store.has_component::<Cover>(id) {
        terrain.bump_blocker_version();
    }
}

fn publish_movement_started(
    bus: &mut EventBus,
    id: &crate::ecs_store::EntityId,
    from: (i32, i32),
    to: (i32, i32),
    provoke_aoo: bool,
    path_step: Option<usize>,
    path_length: Option<usize>,
) {
    bus.publish(
        "movement_started",
        serde_json::json!({
            "entity_id": id.as_str(),
            "from_position": from,
            "to_position": to,
            "provoke_opportunity_attacks": provoke_aoo,
            "path_step": path_step,
            "path_length": path_length,
        }),
    );
}

fn publish_movement_ended(
    bus: &mut EventBus,
    id: &crate::ecs_store::EntityId,
    from: (i32, i32),
    to: (i32, i32),
    provoke_aoo: bool,
    succeeded: bool,
    path_step: Option<usize>,
    path_length: Option<usize>,
) {
    bus.publish(
        "movement_ended",
        serde_json::json!({
            "entity_id": id.as_str(),
            "from_position": from,
            "to_position": to,
            "provoke_opportunity_attacks": provoke_aoo,
            "succeeded": succeeded,
            "path_step": path_step,
            "path_length": path_length,
        }),
    );
}

/// Moves `id` one hop (jump) to `dest`, or delegates to [`path_move`] if
/// `pathfind` is set. A direct jump may land on an `impassable_void` tile
/// (killing the entity, signalled via `died_in_void`); a pathfound move never
/// routes through void tiles at all.
pub fn mv(
    store: &mut EcsStore,
    terrain: &mut GridTerrain,
    bus: &mut EventBus,
    id: &crate::ecs_store::EntityId,
    dest: (i32, i32),
    max_steps: Option<i32>,
    pathfind: bool,
    provoke_aoo: bool,
) -> MoveOutcome {
    let _span = tracing::debug_span!("movement::mv", entity = id.as_str(), ?dest, pathfind).entered();
    if pathfind {
        return path_move(store, terrain, bus, id, dest, max_steps, provoke_aoo);
    }
    let (cur_x, cur_y, _, _) = footprint_of(store, id);
    if !store.entity_exists(id) {
        return MoveOutcome::rejected();
    }
    let distance = (dest.0 - cur_x).abs() + (dest.1 - cur_y).abs();
    if let Some(cap) = max_steps {
        if distance > cap {
            return MoveOutcome::rejected();
        }
    }

    let from = (cur_x, cur_y);
    publish_movement_started(bus, id, from, dest, provoke_aoo, None, None);

    let Some(landed_on_void) = terrain.move_entity_jump(id, dest.0, dest.1, bus) else {
        publish_movement_ended(bus, id, from, dest, provoke_aoo, false, None, None);
        return MoveOutcome::rejected();
    };

    if let Some(mut pos) = store.try_get::<Position>(id) {
        pos.x = dest.0;
        pos.y = dest.1;
        let _ = store.add_component(id, pos);
    }
    publish_movement_ended(bus, id, from, dest, provoke_aoo, true, None, None);

    update_facing(store, id, from, dest);
    register_movement_usage(store, id, distance);
    bump_blocker_if_blocking(store, terrain, id);

    MoveOutcome { succeeded: true, died_in_void: landed_on_void }
}

/// Finds a cost-weighted path to `dest` and walks it one tile at a time,
/// each step an independently committed/aborted `move_entity` call. Void
/// tiles are never part of a found path (ordinary walkability excludes
/// them), so `died_in_void` is always `false` here.
pub fn path_move(
    store: &mut EcsStore,
    terrain: &mut GridTerrain,
    bus: &mut EventBus,
    id: &crate::ecs_store::EntityId,
    dest: (i32, i32),
    max_steps: Option<i32>,
    provoke_aoo: bool,
) -> MoveOutcome {
    let _span = tracing::debug_span!("movement::path_move", entity = id.as_str(), ?dest).entered();
    let (cur_x, cur_y, _, _) = footprint_of(store, id);
    if !store.entity_exists(id) {
        return MoveOutcome::rejected();
    }
    let start = (cur_x, cur_y);
    if start == dest {
        return MoveOutcome { succeeded: true, died_in_void: false };
    }
    let path = find_path(store, terrain, id, dest, max_steps);
    if path.is_empty() {
        return MoveOutcome::rejected();
    }

    let mut current = start;
    for (step_index, &(x, y)) in path.iter().enumerate().skip(1) {
        let path_length = path.len() - 1;
        publish_movement_started(bus, id, current, (x, y), provoke_aoo, Some(step_index), Some(path_length));

        if !terrain.move_entity(id, x, y, bus) {
            publish_movement_ended(bus, id, current, (x, y), provoke_aoo, false, Some(step_index), Some(path_length));
            return MoveOutcome::rejected();
        }
        if let Some(mut pos) = store.try_get::<Position>(id) {
            pos.x = x;
            pos.y = y;
            let _ = store.add_component(id, pos);
        }
        publish_movement_ended(bus, id, current, (x, y), provoke_aoo, true, Some(step_index), Some(path_length));

        let step_cost = terrain.get_movement_cost(x, y);
        register_movement_usage(store, id, step_cost);
        bump_blocker_if_blocking(store, terrain, id);
        update_facing(store, id, current, (x, y));
        current = (x, y);
    }
    MoveOutcome { succeeded: true, died_in_void: false }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Orientation;
    use crate::ecs_store::EntityId;

    fn setup() -> (EcsStore, GridTerrain, EventBus) {
        (EcsStore::new(), GridTerrain::new(10, 10, 1.0), EventBus::new(256))
    }

    fn place(store: &mut EcsStore, terrain: &mut GridTerrain, id: &str, x: i32, y: i32) -> EntityId {
        let id = store.spawn_with_id(id).unwrap();
        store.add_component(&id, Position::point(x, y)).unwrap();
        store.add_component(&id, Facing::new(Orientation::South)).unwrap();
        terrain.add_entity(id.clone(), x, y, &[(0, 0)]);
        id
    }

    #[test]
    fn reachable_respects_difficult_terrain_cost() {
        let (mut store, mut terrain, mut bus) = setup();
        let id = place(&mut store, &mut terrain, "a", 0, 0);
        terrain.add_effect(crate::terrain::EffectKind::Difficult, &[(1, 0)], serde_json::json!({"cost": 3}), &mut bus);
        let tiles = reachable(&store, &terrain, &id, 2, &HashSet::new());
        let cost_at_1_0 = tiles.iter().find(|(x, y, _)| *x == 1 && *y == 0).map(|(_, _, c)| *c);
        assert_eq!(cost_at_1_0, Some(3));
        assert!(tiles.iter().any(|(x, y, _)| *x == 0 && *y == 1));
    }

    #[test]
    fn find_path_returns_start_and_end_inclusive() {
        let (mut store, mut terrain, _bus) = setup();
        let id = place(&mut store, &mut terrain, "a", 0, 0);
        let path = find_path(&store, &terrain, &id, (2, 0), None);
        assert_eq!(path.first(), Some(&(0, 0)));
        assert_eq!(path.last(), Some(&(2, 0)));
    }

    #[test]
    fn path_move_walks_every_step_and_updates_position() {
        let (mut store, mut terrain, mut bus) = setup();
        let id = place(&mut store, &mut terrain, "a", 0, 0);
        let outcome = path_move(&mut store, &mut terrain, &mut bus, &id, (2, 0), None, true);
        assert!(outcome.succeeded);
        assert_eq!(terrain.anchor_of(&id), Some((2, 0)));
        assert_eq!(store.get_component::<Position>(&id).unwrap().x, 2);
    }

    #[test]
    fn move_blocked_by_occupant_leaves_position_unchanged() {
        let (mut store, mut terrain, mut bus) = setup();
        let a = place(&mut store, &mut terrain, "a", 0, 0);
        let _b = place(&mut store, &mut terrain, "b", 1, 0);
        let outcome = mv(&mut store, &mut terrain, &mut bus, &a, (1, 0), None, false, true);
        assert!(!outcome.succeeded);
        assert_eq!(terrain.anchor_of(&a), Some((0, 0)));
    }

    #[test]
    fn jump_move_onto_void_kills_on_landing() {
        let (mut store, mut terrain, mut bus) = setup();
        let id = place(&mut store, &mut terrain, "a", 0, 0);
        terrain.add_effect(crate::terrain::EffectKind::ImpassableVoid, &[(3, 3)], serde_json::json!({}), &mut bus);
        let outcome = mv(&mut store, &mut terrain, &mut bus, &id, (3, 3), None, false, true);
        assert!(outcome.succeeded);
        assert!(outcome.died_in_void);
    }

    #[test]
    fn facing_updates_after_a_successful_move() {
        let (mut store, mut terrain, mut bus) = setup();
        let id = place(&mut store, &mut terrain, "a", 0, 0);
        mv(&mut store, &mut terrain, &mut bus, &id, (0, 1), None, false, true);
        assert_eq!(store.get_component::<Facing>(&id).unwrap().orientation, Orientation::South);
        mv(&mut store, &mut terrain, &mut bus, &id, (1, 1), None, false, true);
        assert_eq!(store.get_component::<Facing>(&id).unwrap().orientation, Orientation::East);
    }
}
