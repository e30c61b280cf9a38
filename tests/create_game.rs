#![allow(non_snake_case)]
use serde_json::json;
use std::{
    sync::Arc,
    time::Duration,
};
use tile_duel::{
    app::{
        App,
        AppEvent,
    },
    controller::ActionError,
    ids::ObjectId,
    ledger::TransactionResponse,
    snapshot::GameStatus,
    test_helpers::*,
    ui::UserEvent,
};
use tokio::sync::mpsc::UnboundedReceiver;

async fn next_action(app: &mut App, events: &mut UnboundedReceiver<AppEvent>) -> AppEvent {
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            let event = events.recv().await.expect("app events open");
            if matches!(event, AppEvent::Action(_)) {
                return event;
            }
            app.handle(event);
        }
    })
    .await
    .expect("action result")
}

async fn next_snapshot(app: &mut App, events: &mut UnboundedReceiver<AppEvent>) {
    tokio::time::timeout(Duration::from_secs(60), async {
        while app.controller().snapshot().is_none() {
            let event = events.recv().await.expect("app events open");
            app.handle(event);
        }
    })
    .await
    .expect("snapshot")
}

#[tokio::test(start_paused = true)]
async fn create_game__extracted_handle_is_polled_into_lobby_snapshot() {
    // given
    let ledger = Arc::new(FakeLedger::default());
    ledger.put_snapshot_object(GameStatus::Lobby, &[], 1);
    let signer = Arc::new(FakeSigner::default());
    signer.push_response(TransactionResponse {
        digest: "CREATE".to_string(),
        effects: Some(success_effects()),
        events: None,
        object_changes: Some(vec![created_change(PACKAGE_ID, "Game", GAME_ID)]),
    });
    let ctx = Arc::new(test_context(ledger.clone(), signer.clone()));
    let (mut app, mut events) = App::new(ctx, ADDR_A.parse().unwrap());

    // when
    assert!(app.handle_user(UserEvent::CreateGame));
    let result = next_action(&mut app, &mut events).await;
    app.handle(result);
    next_snapshot(&mut app, &mut events).await;

    // then
    let game: ObjectId = GAME_ID.parse().unwrap();
    assert_eq!(app.controller().game_id(), Some(&game));
    assert_eq!(app.poll_handle().map(|p| p.game_id().clone()), Some(game));
    let snapshot = app.controller().snapshot().unwrap();
    assert_eq!(snapshot.status, GameStatus::Lobby);
    assert!(snapshot.players.is_empty());
    assert_eq!(ledger.wait_count(), 0);
    assert_eq!(signer.submissions()[0].function(), "create_game");
}

#[tokio::test(start_paused = true)]
async fn create_game__falls_back_to_event_after_waiting_for_details() {
    // given
    let ledger = Arc::new(FakeLedger::default());
    ledger.put_transaction(TransactionResponse {
        digest: "CREATE".to_string(),
        effects: Some(success_effects()),
        events: Some(vec![game_created_event(PACKAGE_ID, GAME_ID)]),
        object_changes: Some(Vec::new()),
    });
    let signer = Arc::new(FakeSigner::default());
    signer.push_ok("CREATE");
    let ctx = Arc::new(test_context(ledger.clone(), signer));
    let (mut app, mut events) = App::new(ctx, ADDR_A.parse().unwrap());

    // when
    app.handle_user(UserEvent::CreateGame);
    let result = next_action(&mut app, &mut events).await;

    // then
    let AppEvent::Action(result) = result else {
        unreachable!()
    };
    assert!(result.outcome.is_ok());
    assert_eq!(ledger.wait_count(), 1);
    app.handle(AppEvent::Action(result));
    assert_eq!(app.controller().game_id(), Some(&GAME_ID.parse().unwrap()));
}

#[tokio::test(start_paused = true)]
async fn create_game__without_any_handle_reports_extraction_failure() {
    // given
    let ledger = Arc::new(FakeLedger::default());
    let signer = Arc::new(FakeSigner::default());
    signer.push_response(TransactionResponse {
        digest: "EMPTY".to_string(),
        effects: Some(json!({"status": {"status": "success"}, "created": []})),
        events: Some(vec![json!({"type": "0x1::other::Thing", "parsedJson": {}})]),
        object_changes: None,
    });
    let ctx = Arc::new(test_context(ledger, signer));
    let (mut app, mut events) = App::new(ctx, ADDR_A.parse().unwrap());

    // when
    app.handle_user(UserEvent::CreateGame);
    let AppEvent::Action(result) = next_action(&mut app, &mut events).await else {
        unreachable!()
    };

    // then
    assert!(matches!(
        &result.outcome,
        Err(ActionError::ExtractionFailed { kind: "game", digest }) if digest == "EMPTY"
    ));
    app.handle(AppEvent::Action(result));
    assert!(app.controller().game_id().is_none());
    let notice = app.controller().notice().unwrap();
    assert!(notice.is_error);
    assert!(notice.message.contains("EMPTY"));
}
