//! Walks a tiny two-entity scenario through the tactics core: placement,
//! a round of turn order, a pathfound move, a terrain hazard, and a kill.
//!
//! Run with: cargo run --example basic_demo

use tactics_core::{CharacterSheet, Game, Initiative, Position, TacticsConfig};

use std::collections::HashSet;
use std::sync::Arc;

struct Soldier {
    name: &'static str,
    self_control: i32,
    instinct: i32,
    wits: i32,
}

impl CharacterSheet for Soldier {
    fn self_control(&self) -> i32 {
        self.self_control
    }
    fn instinct(&self) -> i32 {
        self.instinct
    }
    fn wits(&self) -> i32 {
        self.wits
    }
    fn is_dead(&self) -> bool {
        false
    }
    fn states(&self) -> HashSet<String> {
        HashSet::new()
    }
    fn set_orientation(&self, orientation: tactics_core::Orientation) {
        tracing::debug!(name = self.name, ?orientation, "soldier reoriented");
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let config = TacticsConfig::default().with_grid(12, 12);
    let mut game = Game::with_config(config);

    let scout = game.spawn_with_id("scout").expect("fresh entity id");
    let guard = game.spawn_with_id("guard").expect("fresh entity id");

    game.store_mut().add_component(&scout, Position::point(0, 0)).expect("scout exists");
    game.store_mut()
        .add_component(&scout, tactics_core::CharacterRef::new(Arc::new(Soldier { name: "Scout", self_control: 2, instinct: 4, wits: 3 })))
        .expect("scout exists");
    game.store_mut().add_component(&scout, Initiative::default()).expect("scout exists");
    game.terrain_mut().add_entity(scout.clone(), 0, 0, &[(0, 0)]);

    game.store_mut().add_component(&guard, Position::point(5, 0)).expect("guard exists");
    game.store_mut()
        .add_component(&guard, tactics_core::CharacterRef::new(Arc::new(Soldier { name: "Guard", self_control: 5, instinct: 2, wits: 2 })))
        .expect("guard exists");
    game.store_mut().add_component(&guard, Initiative::default()).expect("guard exists");
    game.terrain_mut().add_entity(guard.clone(), 5, 0, &[(0, 0)]);

    let order = game.start_round();
    println!("round 1 turn order: {:?}", order.iter().map(|id| id.as_str()).collect::<Vec<_>>());

    println!("scout -> (3, 0) has line of sight to guard: {}", game.has_los((0, 0), (5, 0)));

    let outcome = game.move_entity(&scout, (3, 0), None, true, true);
    println!("move outcome: succeeded={} died_in_void={}", outcome.succeeded, outcome.died_in_void);

    if let Some(view) = game.entity_view(&scout) {
        println!("scout now at {:?}", view.position);
    }

    game.next_turn();
    println!("after next_turn, current entity: {:?}", game.turn_order_mut().current_entity().map(|id| id.as_str()));
}
