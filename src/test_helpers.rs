//! In-memory ledger and wallet doubles plus JSON fixtures shaped like fullnode
//! responses.

use crate::{
    builders::{
        CLOCK_OBJECT_ID,
        DEFAULT_MODULE,
        TransactionDescription,
        TxBuilder,
    },
    config::GameConstants,
    controller::ClientContext,
    executor::Executor,
    ids::{
        Address,
        ObjectId,
        StructTag,
        type_matches,
    },
    ledger::{
        EventFilter,
        EventPage,
        Ledger,
        LedgerError,
        RawObject,
        TransactionResponse,
    },
    signer::{
        SignerError,
        TransactionSigner,
    },
    snapshot::{
        Coord,
        GameSnapshot,
        GameStatus,
    },
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{
    Value,
    json,
};
use std::{
    collections::{
        HashMap,
        VecDeque,
    },
    sync::{
        Arc,
        atomic::{
            AtomicUsize,
            Ordering,
        },
    },
};
use tokio::sync::{
    Notify,
    Semaphore,
};

pub const PACKAGE_ID: &str = "0x1";
pub const GAME_ID: &str = "0xaaa";
pub const ADDR_A: &str = "0xa11ce";
pub const ADDR_B: &str = "0xb0b";
pub const ADDR_C: &str = "0xc0c";

const RELEASE_PERMITS: usize = 1 << 20;

/// `content` block of a game object as `sui_getObject` returns it.
pub fn game_content(players: Value, status: u64) -> Value {
    json!({
        "dataType": "moveObject",
        "type": format!("{PACKAGE_ID}::tile_game_core::Game"),
        "hasPublicTransfer": false,
        "fields": {
            "id": {"id": GAME_ID},
            "creator": ADDR_A,
            "board_size": "11",
            "players": players,
            "current_turn": "0",
            "status": status,
            "tiles_remaining": "10",
            "turn_start_time": "0",
            "winner": null,
            "players_positions": [],
            "players_scores": [],
            "last_directions": [],
            "tile_ids": [],
            "tile_positions": [],
            "has_placed": [],
            "move_caps_created": false
        }
    })
}

pub fn game_object(players: Value, status: u64, version: u64) -> RawObject {
    RawObject {
        object_id: parse_id(GAME_ID),
        version: Some(version),
        object_type: Some(format!("{PACKAGE_ID}::tile_game_core::Game")),
        content: game_content(players, status),
    }
}

pub fn move_cap_object(id: &str, game: &str, player: &str, moves: u64) -> RawObject {
    let object_type = format!("{PACKAGE_ID}::tile_game_core::MoveCap");
    RawObject {
        object_id: parse_id(id),
        version: Some(1),
        object_type: Some(object_type.clone()),
        content: json!({
            "dataType": "moveObject",
            "type": object_type,
            "fields": {
                "id": {"id": id},
                "game_id": game,
                "player_address": player,
                "moves_remaining": moves.to_string()
            }
        }),
    }
}

pub fn snapshot_with(status: GameStatus, players: &[&str]) -> GameSnapshot {
    let players: Vec<Address> = players
        .iter()
        .map(|p| p.parse().expect("fixture address"))
        .collect();
    let count = players.len();
    GameSnapshot {
        id: parse_id(GAME_ID),
        version: Some(1),
        creator: Some(ADDR_A.parse().expect("fixture address")),
        board_size: 11,
        players,
        current_turn: 0,
        status,
        tiles_remaining: 10,
        turn_started_at: None,
        winner: None,
        player_positions: vec![Coord::default(); count],
        player_scores: vec![0; count],
        last_directions: Vec::new(),
        tile_ids: Vec::new(),
        tile_positions: Vec::new(),
        has_placed: vec![false; count],
        move_caps_created: false,
    }
}

/// An `objectChanges` entry for a created object.
pub fn created_change(package: &str, struct_name: &str, id: &str) -> Value {
    json!({
        "type": "created",
        "sender": ADDR_A,
        "owner": {"Shared": {"initial_shared_version": 1}},
        "objectType": format!("{package}::tile_game_core::{struct_name}"),
        "objectId": id,
        "version": "1",
        "digest": "obj-digest"
    })
}

pub fn game_created_event(package: &str, game: &str) -> Value {
    json!({
        "type": format!("{package}::tile_game_core::GameCreated"),
        "parsedJson": {"game_id": game, "creator": ADDR_A}
    })
}

pub fn success_effects() -> Value {
    json!({"status": {"status": "success"}, "created": [], "mutated": []})
}

fn parse_id(raw: &str) -> ObjectId {
    raw.parse().expect("fixture object id")
}

#[derive(Default)]
pub struct FakeLedger {
    objects: Mutex<HashMap<ObjectId, RawObject>>,
    owned: Mutex<HashMap<Address, Vec<RawObject>>>,
    events: Mutex<Vec<Value>>,
    transactions: Mutex<HashMap<String, TransactionResponse>>,
    fetch_gate: Mutex<Option<Arc<Semaphore>>>,
    fail_fetches: AtomicUsize,
    fail_waits: AtomicUsize,
    fetches: AtomicUsize,
    waits: AtomicUsize,
    fetch_started: Notify,
}

impl FakeLedger {
    pub fn put_object(&self, object: RawObject) {
        self.objects.lock().insert(object.object_id.clone(), object);
    }

    /// Stores a game at [`GAME_ID`] with the given status and players.
    pub fn put_snapshot_object(&self, status: GameStatus, players: &[&str], version: u64) {
        self.put_object(game_object(json!(players), u64::from(status.code()), version));
    }

    pub fn put_owned(&self, owner: &Address, object: RawObject) {
        self.owned.lock().entry(owner.clone()).or_default().push(object);
    }

    pub fn put_transaction(&self, response: TransactionResponse) {
        self.transactions
            .lock()
            .insert(response.digest.clone(), response);
    }

    pub fn push_event(&self, mut event: Value) {
        let mut events = self.events.lock();
        if event.get("id").is_none() {
            event["id"] = json!({"txDigest": format!("tx{}", events.len()), "eventSeq": "0"});
        }
        events.push(event);
    }

    pub fn fail_next_fetches(&self, count: usize) {
        self.fail_fetches.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_waits(&self, count: usize) {
        self.fail_waits.store(count, Ordering::SeqCst);
    }

    /// Makes `get_object` block until [`FakeLedger::release_fetches`].
    pub fn hold_fetches(&self) {
        *self.fetch_gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_fetches(&self) {
        if let Some(gate) = self.fetch_gate.lock().take() {
            gate.add_permits(RELEASE_PERMITS);
        }
    }

    /// Resolves once a `get_object` call has started.
    pub async fn fetch_started(&self) {
        self.fetch_started.notified().await;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn wait_count(&self) -> usize {
        self.waits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Ledger for FakeLedger {
    async fn get_object(&self, id: &ObjectId) -> Result<Option<RawObject>, LedgerError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.fetch_started.notify_one();
        let gate = self.fetch_gate.lock().clone();
        if let Some(gate) = gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|err| LedgerError::Transport(err.to_string()))?;
        }
        let failing = self.fail_fetches.load(Ordering::SeqCst);
        if failing > 0 {
            self.fail_fetches.store(failing - 1, Ordering::SeqCst);
            return Err(LedgerError::Transport("connection reset".to_string()));
        }
        Ok(self.objects.lock().get(id).cloned())
    }

    async fn get_owned_objects(
        &self,
        owner: &Address,
        struct_type: Option<&str>,
    ) -> Result<Vec<RawObject>, LedgerError> {
        let wanted = struct_type.and_then(StructTag::parse);
        let owned = self.owned.lock().get(owner).cloned().unwrap_or_default();
        Ok(owned
            .into_iter()
            .filter(|raw| match (&wanted, &raw.object_type) {
                (None, _) => true,
                (Some(tag), Some(ty)) => type_matches(ty, &tag.module, &tag.name),
                (Some(_), None) => false,
            })
            .collect())
    }

    async fn wait_for_transaction(
        &self,
        digest: &str,
    ) -> Result<TransactionResponse, LedgerError> {
        self.waits.fetch_add(1, Ordering::SeqCst);
        let failing = self.fail_waits.load(Ordering::SeqCst);
        if failing > 0 {
            self.fail_waits.store(failing - 1, Ordering::SeqCst);
            return Err(LedgerError::Transport("request timed out".to_string()));
        }
        let stored = self.transactions.lock().get(digest).cloned();
        Ok(stored.unwrap_or_else(|| TransactionResponse {
            digest: digest.to_string(),
            effects: Some(success_effects()),
            events: Some(Vec::new()),
            object_changes: Some(Vec::new()),
        }))
    }

    async fn query_events(
        &self,
        _filter: &EventFilter,
        cursor: Option<Value>,
        limit: usize,
        descending: bool,
    ) -> Result<EventPage, LedgerError> {
        let events = self.events.lock().clone();
        let data: Vec<Value> = if descending {
            events.iter().rev().take(limit).cloned().collect()
        } else {
            let start = cursor
                .as_ref()
                .and_then(|c| events.iter().position(|e| e.get("id") == Some(c)))
                .map(|idx| idx + 1)
                .unwrap_or(0);
            events.iter().skip(start).take(limit).cloned().collect()
        };
        Ok(EventPage {
            next_cursor: data.last().and_then(|e| e.get("id")).cloned(),
            has_next_page: false,
            data,
        })
    }
}

#[derive(Default)]
pub struct FakeSigner {
    responses: Mutex<VecDeque<Result<TransactionResponse, SignerError>>>,
    submissions: Mutex<Vec<TransactionDescription>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    submitted: Notify,
}

impl FakeSigner {
    pub fn push_response(&self, response: TransactionResponse) {
        self.responses.lock().push_back(Ok(response));
    }

    /// A wallet result that carries only the digest and effects.
    pub fn push_ok(&self, digest: &str) {
        self.push_response(TransactionResponse {
            digest: digest.to_string(),
            effects: Some(success_effects()),
            events: None,
            object_changes: None,
        });
    }

    pub fn push_rejection(&self, reason: &str) {
        self.responses
            .lock()
            .push_back(Err(SignerError::Rejected(reason.to_string())));
    }

    pub fn push_failure(&self, reason: &str) {
        self.responses
            .lock()
            .push_back(Err(SignerError::Failed(reason.to_string())));
    }

    /// Makes `sign_and_submit` block until [`FakeSigner::release`].
    pub fn hold(&self) {
        *self.gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self) {
        if let Some(gate) = self.gate.lock().take() {
            gate.add_permits(RELEASE_PERMITS);
        }
    }

    /// Resolves once a submission has reached the wallet.
    pub async fn submitted(&self) {
        self.submitted.notified().await;
    }

    pub fn submissions(&self) -> Vec<TransactionDescription> {
        self.submissions.lock().clone()
    }
}

#[async_trait]
impl TransactionSigner for FakeSigner {
    async fn sign_and_submit(
        &self,
        tx: &TransactionDescription,
    ) -> Result<TransactionResponse, SignerError> {
        let index = {
            let mut submissions = self.submissions.lock();
            submissions.push(tx.clone());
            submissions.len()
        };
        self.submitted.notify_one();
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|err| SignerError::Unavailable(err.to_string()))?;
        }
        let next = self.responses.lock().pop_front();
        next.unwrap_or_else(|| {
            Ok(TransactionResponse {
                digest: format!("digest-{index}"),
                effects: Some(success_effects()),
                events: None,
                object_changes: None,
            })
        })
    }
}

/// A context wired to the fakes, using [`PACKAGE_ID`] and a registry at `0x7e9`.
pub fn test_context(ledger: Arc<FakeLedger>, signer: Arc<FakeSigner>) -> ClientContext {
    let constants = GameConstants::default();
    ClientContext {
        executor: Executor::new(ledger.clone(), signer, constants.gas_budget),
        ledger,
        builder: TxBuilder::new(PACKAGE_ID, DEFAULT_MODULE, CLOCK_OBJECT_ID)
            .expect("fixture builder"),
        constants,
        registry: Some(parse_id("0x7e9")),
    }
}
