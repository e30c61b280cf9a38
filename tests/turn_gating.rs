#![allow(non_snake_case)]
use serde_json::json;
use std::sync::Arc;
use tile_duel::{
    controller::{
        Action,
        GameController,
        Refusal,
    },
    parser::parse_game,
    snapshot::{
        Direction,
        GameSnapshot,
    },
    test_helpers::*,
};

const STARTED_AT: u64 = 1_000_000;
const TIMEOUT_MS: u64 = 30_000;

fn active_game(current_turn: u64) -> Arc<GameSnapshot> {
    let mut content = game_content(json!([ADDR_A, ADDR_B]), 2);
    content["fields"]["current_turn"] = json!(current_turn.to_string());
    content["fields"]["turn_start_time"] = json!(STARTED_AT.to_string());
    Arc::new(parse_game(&content, Some(7)).expect("active game parses"))
}

fn controller_for(me: &str, current_turn: u64) -> GameController {
    let ctx = test_context(
        Arc::new(FakeLedger::default()),
        Arc::new(FakeSigner::default()),
    );
    let mut controller = GameController::new(Arc::new(ctx), me.parse().unwrap());
    controller.select_game(GAME_ID.parse().unwrap());
    assert!(controller.apply_snapshot(active_game(current_turn)));
    controller
}

#[test]
fn force_timeout__waiting_player_only_after_timeout() {
    // given
    let mut waiting = controller_for(ADDR_A, 1);

    // when
    let early = waiting.prepare(Action::ForceTimeout, STARTED_AT + TIMEOUT_MS - 1);
    let late = waiting.prepare(Action::ForceTimeout, STARTED_AT + TIMEOUT_MS);

    // then
    assert_eq!(early.err(), Some(Refusal::NotEligible("force a timeout")));
    assert!(late.is_ok());
}

#[test]
fn force_timeout__never_for_the_current_player() {
    let mut current = controller_for(ADDR_B, 1);

    let refused = current.prepare(Action::ForceTimeout, STARTED_AT + 10 * TIMEOUT_MS);

    assert_eq!(refused.err(), Some(Refusal::NotEligible("force a timeout")));
}

#[test]
fn move__only_current_player_is_eligible() {
    let waiting = controller_for(ADDR_A, 1);
    let current = controller_for(ADDR_B, 1);
    let spectator = controller_for(ADDR_C, 1);
    let now = STARTED_AT + 5_000;

    assert!(!waiting.eligibility(now).make_move);
    assert!(current.eligibility(now).make_move);
    assert!(!spectator.eligibility(now).make_move);
    assert!(!spectator.eligibility(now + TIMEOUT_MS).force_timeout);
    assert_eq!(
        current.eligibility(now).time_remaining,
        Some(std::time::Duration::from_millis(TIMEOUT_MS - 5_000))
    );
}

#[test]
fn move__current_player_without_capability_is_refused() {
    let mut current = controller_for(ADDR_B, 1);

    let refused = current.prepare(Action::Move(Direction::Up), STARTED_AT);

    assert_eq!(refused.err(), Some(Refusal::NoMoveCap));
    assert!(!current.in_flight());
}
