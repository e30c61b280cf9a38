use crate::{
    builders::{
        TransactionDescription,
        TxBuilder,
    },
    config::GameConstants,
    executor::{
        ExecutionError,
        Executor,
        TransactionOutcome,
    },
    extract::ExtractorChain,
    ids::{
        Address,
        ObjectId,
    },
    ledger::{
        Ledger,
        LedgerError,
    },
    parser::{
        MOVE_CAP_STRUCT,
        parse_move_cap,
    },
    poller::fetch_snapshot,
    snapshot::{
        Coord,
        Direction,
        GameSnapshot,
        GameStatus,
        MoveCapability,
        TileDetail,
    },
    turn::{
        self,
        Eligibility,
    },
};
use std::{
    fmt,
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    sync::{
        OwnedSemaphorePermit,
        Semaphore,
    },
    time::Instant,
};
use tracing::{
    debug,
    info,
    warn,
};

/// Everything a component needs to talk to the chain, built once by the
/// application and passed down.
pub struct ClientContext {
    pub ledger: Arc<dyn Ledger>,
    pub executor: Executor,
    pub builder: TxBuilder,
    pub constants: GameConstants,
    pub registry: Option<ObjectId>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Action {
    CreateGame,
    Join(ObjectId),
    ChooseStart(Coord),
    Start,
    Move(Direction),
    ForceTimeout,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::CreateGame => f.write_str("create game"),
            Action::Join(game) => write!(f, "join {}", game.short()),
            Action::ChooseStart(at) => write!(f, "choose start ({}, {})", at.x, at.y),
            Action::Start => f.write_str("start game"),
            Action::Move(direction) => write!(f, "move {direction:?}"),
            Action::ForceTimeout => f.write_str("force timeout"),
        }
    }
}

/// Reasons the controller declines to build a transaction at all.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum Refusal {
    #[error("a transaction is already in flight")]
    Busy,
    #[error("no game selected")]
    NoGame,
    #[error("no game registry configured")]
    NoRegistry,
    #[error("the game is finished")]
    Finished,
    #[error("cannot {0} right now")]
    NotEligible(&'static str),
    #[error("({x}, {y}) is outside the {size}x{size} board")]
    OutOfBounds { x: u64, y: u64, size: u64 },
    #[error("move capability not found yet")]
    NoMoveCap,
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("could not determine the created {kind}, inspect transaction {digest} manually")]
    ExtractionFailed { kind: &'static str, digest: String },
    #[error("game {0} cannot be joined")]
    NotJoinable(ObjectId),
    #[error("could not read game before joining: {0}")]
    Lookup(#[from] LedgerError),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ActionEffect {
    GameCreated { game: ObjectId, digest: String },
    Joined { game: ObjectId, digest: String },
    /// `move_cap` is the local player's capability when the start outcome named
    /// one and it could be read back.
    Started {
        move_cap: Option<MoveCapability>,
        digest: String,
    },
    Submitted { digest: String },
}

#[derive(Debug)]
pub struct ActionResult {
    pub action: Action,
    pub outcome: Result<ActionEffect, ActionError>,
}

enum Plan {
    Create(TransactionDescription),
    Join(ObjectId, TransactionDescription),
    Start(ObjectId, TransactionDescription),
    Call(TransactionDescription),
}

/// A built transaction holding the controller's single in-flight permit. The
/// permit is released when [`PendingAction::run`] finishes.
pub struct PendingAction {
    action: Action,
    plan: Plan,
    ctx: Arc<ClientContext>,
    me: Address,
    _permit: OwnedSemaphorePermit,
}

impl PendingAction {
    pub fn action(&self) -> &Action {
        &self.action
    }

    pub async fn run(self) -> ActionResult {
        let outcome = self.execute().await;
        match &outcome {
            Ok(effect) => info!(action = %self.action, ?effect, "action complete"),
            Err(err) => warn!(action = %self.action, %err, "action failed"),
        }
        ActionResult {
            action: self.action,
            outcome,
        }
    }

    async fn execute(&self) -> Result<ActionEffect, ActionError> {
        let executor = &self.ctx.executor;
        match &self.plan {
            Plan::Create(tx) => {
                let outcome = executor.execute(tx.clone(), &self.me).await?;
                let chain = ExtractorChain::created_game(self.ctx.builder.module());
                match chain.extract(&outcome) {
                    Some(game) => Ok(ActionEffect::GameCreated {
                        game,
                        digest: outcome.digest,
                    }),
                    None => Err(ActionError::ExtractionFailed {
                        kind: "game",
                        digest: outcome.digest,
                    }),
                }
            }
            Plan::Join(game, tx) => {
                let joinable = fetch_snapshot(self.ctx.ledger.as_ref(), game)
                    .await?
                    .is_some_and(|s| {
                        s.status == GameStatus::Lobby
                            && s.players.len() < turn::MAX_PLAYERS
                            && s.player_index(&self.me).is_none()
                    });
                if !joinable {
                    return Err(ActionError::NotJoinable(game.clone()));
                }
                let outcome = executor.execute(tx.clone(), &self.me).await?;
                Ok(ActionEffect::Joined {
                    game: game.clone(),
                    digest: outcome.digest,
                })
            }
            Plan::Start(game, tx) => {
                let outcome = executor.execute(tx.clone(), &self.me).await?;
                let move_cap = self.created_move_cap(game, &outcome).await;
                Ok(ActionEffect::Started {
                    move_cap,
                    digest: outcome.digest,
                })
            }
            Plan::Call(tx) => {
                let outcome = executor.execute(tx.clone(), &self.me).await?;
                Ok(ActionEffect::Submitted {
                    digest: outcome.digest,
                })
            }
        }
    }

    /// Reads back the capability a start transaction created for us. `None`
    /// leaves discovery to the owned-object scan.
    async fn created_move_cap(
        &self,
        game: &ObjectId,
        outcome: &TransactionOutcome,
    ) -> Option<MoveCapability> {
        let id = ExtractorChain::created_move_cap(self.ctx.builder.module(), &self.me)
            .extract(outcome)?;
        let raw = match self.ctx.ledger.get_object(&id).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(cap = %id, "created move cap not visible yet");
                return None;
            }
            Err(err) => {
                warn!(cap = %id, %err, "could not read created move cap");
                return None;
            }
        };
        parse_move_cap(&raw.content).filter(|cap| {
            cap.game_id == *game && cap.player.as_ref().is_none_or(|p| *p == self.me)
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Notice {
    pub message: String,
    pub is_error: bool,
    pub expires_at: Instant,
}

/// Read-only view handed to the renderer.
#[derive(Clone, Debug)]
pub struct GameView {
    pub me: Address,
    pub game_id: Option<ObjectId>,
    pub snapshot: Option<Arc<GameSnapshot>>,
    pub eligibility: Eligibility,
    pub move_cap: Option<MoveCapability>,
    pub tiles: Vec<TileDetail>,
    pub in_flight: bool,
    pub status: String,
    pub notice: Option<Notice>,
}

/// The turn controller. State only changes in response to snapshots from the
/// ledger; submitting a transaction never edits the local game.
pub struct GameController {
    ctx: Arc<ClientContext>,
    me: Address,
    gate: Arc<Semaphore>,
    game_id: Option<ObjectId>,
    snapshot: Option<Arc<GameSnapshot>>,
    move_cap: Option<MoveCapability>,
    tiles: Vec<TileDetail>,
    status: String,
    notice: Option<Notice>,
}

impl GameController {
    pub fn new(ctx: Arc<ClientContext>, me: Address) -> Self {
        Self {
            ctx,
            me,
            gate: Arc::new(Semaphore::new(1)),
            game_id: None,
            snapshot: None,
            move_cap: None,
            tiles: Vec::new(),
            status: "Ready".to_string(),
            notice: None,
        }
    }

    pub fn context(&self) -> &Arc<ClientContext> {
        &self.ctx
    }

    pub fn me(&self) -> &Address {
        &self.me
    }

    pub fn game_id(&self) -> Option<&ObjectId> {
        self.game_id.as_ref()
    }

    pub fn snapshot(&self) -> Option<&Arc<GameSnapshot>> {
        self.snapshot.as_ref()
    }

    pub fn move_cap(&self) -> Option<&MoveCapability> {
        self.move_cap.as_ref()
    }

    pub fn in_flight(&self) -> bool {
        self.gate.available_permits() == 0
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn eligibility(&self, now_ms: u64) -> Eligibility {
        self.snapshot
            .as_deref()
            .map(|s| turn::evaluate(s, &self.me, now_ms, self.ctx.constants.turn_timeout))
            .unwrap_or_default()
    }

    /// Switches to `game`, discarding everything known about the previous one.
    /// Returns false when `game` is already selected.
    pub fn select_game(&mut self, game: ObjectId) -> bool {
        if self.game_id.as_ref() == Some(&game) {
            return false;
        }
        debug!(%game, "selecting game");
        self.game_id = Some(game);
        self.snapshot = None;
        self.move_cap = None;
        self.tiles.clear();
        true
    }

    pub fn leave_game(&mut self) {
        self.game_id = None;
        self.snapshot = None;
        self.move_cap = None;
        self.tiles.clear();
    }

    /// Builds the transaction for `action`, or refuses. At most one
    /// [`PendingAction`] exists at a time.
    pub fn prepare(&mut self, action: Action, now_ms: u64) -> Result<PendingAction, Refusal> {
        let plan = self.plan(&action, now_ms)?;
        let permit = self
            .gate
            .clone()
            .try_acquire_owned()
            .map_err(|_| Refusal::Busy)?;
        self.status = format!("Submitting {action}...");
        info!(%action, "preparing transaction");
        Ok(PendingAction {
            action,
            plan,
            ctx: self.ctx.clone(),
            me: self.me.clone(),
            _permit: permit,
        })
    }

    fn plan(&self, action: &Action, now_ms: u64) -> Result<Plan, Refusal> {
        if self.in_flight() {
            return Err(Refusal::Busy);
        }
        let builder = &self.ctx.builder;
        let constants = &self.ctx.constants;

        let tx = match action {
            Action::CreateGame => {
                let registry = self.ctx.registry.as_ref().ok_or(Refusal::NoRegistry)?;
                return Ok(Plan::Create(builder.create_game(registry)));
            }
            Action::Join(game) => {
                let tx = builder.join_game(game, constants.join_fee);
                return Ok(Plan::Join(game.clone(), tx));
            }
            Action::ChooseStart(at) => {
                let (snapshot, eligibility) = self.current_game(now_ms)?;
                if !eligibility.choose_start {
                    return Err(Refusal::NotEligible("choose a start"));
                }
                if !at.within(snapshot.board_size) {
                    return Err(Refusal::OutOfBounds {
                        x: at.x,
                        y: at.y,
                        size: snapshot.board_size,
                    });
                }
                builder.choose_start(&snapshot.id, *at)
            }
            Action::Start => {
                let (snapshot, eligibility) = self.current_game(now_ms)?;
                if !eligibility.start {
                    return Err(Refusal::NotEligible("start the game"));
                }
                let tx = builder.start_game(&snapshot.id, constants.start_funding);
                return Ok(Plan::Start(snapshot.id.clone(), tx));
            }
            Action::Move(direction) => {
                let (snapshot, eligibility) = self.current_game(now_ms)?;
                if !eligibility.make_move {
                    return Err(Refusal::NotEligible("move"));
                }
                let cap = self.move_cap.as_ref().ok_or(Refusal::NoMoveCap)?;
                if cap.is_spent() {
                    return Err(Refusal::NotEligible("move without remaining moves"));
                }
                builder.move_with_cap(&snapshot.id, &cap.id, *direction)
            }
            Action::ForceTimeout => {
                let (snapshot, eligibility) = self.current_game(now_ms)?;
                if !eligibility.force_timeout {
                    return Err(Refusal::NotEligible("force a timeout"));
                }
                builder.force_timeout(&snapshot.id)
            }
        };
        Ok(Plan::Call(tx))
    }

    fn current_game(&self, now_ms: u64) -> Result<(&GameSnapshot, Eligibility), Refusal> {
        let snapshot = self.snapshot.as_deref().ok_or(Refusal::NoGame)?;
        if snapshot.status == GameStatus::Finished {
            return Err(Refusal::Finished);
        }
        Ok((snapshot, self.eligibility(now_ms)))
    }

    /// Accepts a polled snapshot unless it belongs to another game or would move
    /// the status backwards.
    pub fn apply_snapshot(&mut self, snapshot: Arc<GameSnapshot>) -> bool {
        if self.game_id.as_ref() != Some(&snapshot.id) {
            debug!(game = %snapshot.id, "ignoring snapshot of another game");
            return false;
        }
        if let Some(current) = &self.snapshot
            && snapshot.status < current.status
        {
            warn!(
                game = %snapshot.id,
                from = %current.status,
                to = %snapshot.status,
                "ignoring status regression"
            );
            return false;
        }
        if self
            .move_cap
            .as_ref()
            .is_some_and(|cap| cap.game_id != snapshot.id)
        {
            self.move_cap = None;
        }
        self.snapshot = Some(snapshot);
        true
    }

    /// Records the outcome of an action. Returns the game to start polling when
    /// the action created or joined one.
    pub fn apply_result(&mut self, result: &ActionResult, now: Instant) -> Option<ObjectId> {
        match &result.outcome {
            Ok(ActionEffect::GameCreated { game, digest }) => {
                self.status = format!("Created game {} ({digest})", game.short());
                self.set_notice(format!("Game created: {game}"), false, now);
                self.select_game(game.clone());
                Some(game.clone())
            }
            Ok(ActionEffect::Joined { game, digest }) => {
                self.status = format!("Joined game {} ({digest})", game.short());
                self.set_notice(format!("Joined game {}", game.short()), false, now);
                self.select_game(game.clone());
                Some(game.clone())
            }
            Ok(ActionEffect::Started { move_cap, digest }) => {
                self.status = format!("{} submitted ({digest})", result.action);
                if move_cap.is_some() {
                    self.set_move_cap(move_cap.clone());
                }
                None
            }
            Ok(ActionEffect::Submitted { digest }) => {
                self.status = format!("{} submitted ({digest})", result.action);
                None
            }
            Err(err) => {
                self.status = format!("{} failed", result.action);
                self.set_notice(err.to_string(), true, now);
                None
            }
        }
    }

    fn set_notice(&mut self, message: String, is_error: bool, now: Instant) {
        self.notice = Some(Notice {
            message,
            is_error,
            expires_at: now + self.ctx.constants.notice_ttl,
        });
    }

    /// Shows a refusal the same way as a failed action.
    pub fn refuse(&mut self, refusal: &Refusal, now: Instant) {
        debug!(%refusal, "action refused");
        self.set_notice(refusal.to_string(), true, now);
    }

    /// Clears the notice once its lifetime has passed. Returns true if it changed.
    pub fn expire_notice(&mut self, now: Instant) -> bool {
        if self.notice.as_ref().is_some_and(|n| n.expires_at <= now) {
            self.notice = None;
            return true;
        }
        false
    }

    /// The local player needs a capability lookup: the game is running, we play
    /// in it and hold no capability for it.
    pub fn needs_move_cap(&self) -> bool {
        let Some(snapshot) = self.snapshot.as_deref() else {
            return false;
        };
        snapshot.status == GameStatus::Active
            && snapshot.player_index(&self.me).is_some()
            && self.move_cap.is_none()
    }

    pub fn set_move_cap(&mut self, cap: Option<MoveCapability>) {
        match cap {
            Some(cap) if self.game_id.as_ref() == Some(&cap.game_id) => {
                self.move_cap = Some(cap);
            }
            Some(cap) => debug!(cap = %cap.id, "ignoring capability for another game"),
            None => self.move_cap = None,
        }
    }

    pub fn set_tiles(&mut self, tiles: Vec<TileDetail>) {
        self.tiles = tiles;
    }

    pub fn view(&self, now_ms: u64) -> GameView {
        GameView {
            me: self.me.clone(),
            game_id: self.game_id.clone(),
            snapshot: self.snapshot.clone(),
            eligibility: self.eligibility(now_ms),
            move_cap: self.move_cap.clone(),
            tiles: self.tiles.clone(),
            in_flight: self.in_flight(),
            status: self.status.clone(),
            notice: self.notice.clone(),
        }
    }
}

/// Finds the local player's capability for `game` among owned objects. When more
/// than one exists the one with the most moves left wins.
pub async fn discover_move_cap(
    ctx: &ClientContext,
    owner: &Address,
    game: &ObjectId,
) -> Result<Option<MoveCapability>, LedgerError> {
    let struct_type = format!(
        "{}::{}::{}",
        ctx.builder.package(),
        ctx.builder.module(),
        MOVE_CAP_STRUCT
    );
    let owned = ctx
        .ledger
        .get_owned_objects(owner, Some(&struct_type))
        .await?;
    let cap = owned
        .iter()
        .filter_map(|raw| parse_move_cap(&raw.content))
        .filter(|cap| cap.game_id == *game)
        .filter(|cap| cap.player.as_ref().is_none_or(|p| p == owner))
        .max_by_key(|cap| cap.moves_remaining);
    debug!(%game, found = cap.is_some(), scanned = owned.len(), "move cap lookup");
    Ok(cap)
}
