use crate::{
    builders::TxBuilder,
    config::AppConfig,
    controller::{
        Action,
        ActionResult,
        ClientContext,
        GameController,
        GameView,
        discover_move_cap,
    },
    events::{
        DEFAULT_EVENT_INTERVAL,
        EventFeed,
        event_mentions_game,
    },
    executor::Executor,
    ids::{
        Address,
        ObjectId,
    },
    ledger::{
        EventFilter,
        Ledger,
        LedgerError,
    },
    poller::{
        PollHandle,
        PollOptions,
        start_polling,
    },
    rpc::SuiRpcClient,
    signer::SuiCliSigner,
    snapshot::{
        GameSnapshot,
        GameStatus,
        MoveCapability,
        TileDetail,
    },
    tiles::fetch_tile_details,
    turn,
    ui::{
        self,
        UserEvent,
    },
};
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use serde_json::Value;
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::mpsc,
    time::{
        self,
        Instant,
        MissedTickBehavior,
    },
};
use tracing::{
    debug,
    info,
    warn,
};

/// Cadence of the countdown redraw and notice expiry.
const TICK: Duration = Duration::from_millis(500);

/// Everything background tasks report back to the loop.
#[derive(Debug)]
pub enum AppEvent {
    Snapshot(Arc<GameSnapshot>),
    Action(ActionResult),
    MoveCap {
        game: ObjectId,
        result: Result<Option<MoveCapability>, LedgerError>,
    },
    Tiles {
        game: ObjectId,
        tiles: Vec<TileDetail>,
    },
    Chain(Value),
}

/// Owns the controller and the background work feeding it. All state changes
/// happen on the loop that drives [`App::handle`]; spawned tasks only send
/// [`AppEvent`]s.
pub struct App {
    controller: GameController,
    events_tx: mpsc::UnboundedSender<AppEvent>,
    poll: Option<PollHandle>,
    feed: Option<EventFeed>,
    cap_lookup: Option<ObjectId>,
    cap_retry_at: Option<Instant>,
    tiles_in_flight: bool,
    tiles_dirty: bool,
}

impl App {
    pub fn new(
        ctx: Arc<ClientContext>,
        me: Address,
    ) -> (Self, mpsc::UnboundedReceiver<AppEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let app = Self {
            controller: GameController::new(ctx, me),
            events_tx,
            poll: None,
            feed: None,
            cap_lookup: None,
            cap_retry_at: None,
            tiles_in_flight: false,
            tiles_dirty: false,
        };
        (app, events_rx)
    }

    pub fn controller(&self) -> &GameController {
        &self.controller
    }

    pub fn poll_handle(&self) -> Option<&PollHandle> {
        self.poll.as_ref()
    }

    pub fn view(&self) -> GameView {
        self.controller.view(turn::now_ms())
    }

    /// Selects `game` and starts its poller, replacing any previous one.
    pub fn watch(&mut self, game: ObjectId) {
        if let Some(poll) = &self.poll
            && *poll.game_id() == game
            && !poll.is_stopped()
        {
            poll.refresh_now();
            return;
        }
        self.stop_polling();
        self.controller.select_game(game.clone());
        self.cap_retry_at = None;

        let ctx = self.controller.context();
        let options = PollOptions {
            interval: ctx.constants.poll_interval,
            immediate: true,
        };
        let tx = self.events_tx.clone();
        info!(%game, "watching game");
        self.poll = Some(start_polling(ctx.ledger.clone(), game, options, move |snapshot| {
            let _ = tx.send(AppEvent::Snapshot(snapshot));
        }));
    }

    /// Follows the package's module events so changes show up before the next
    /// poll tick.
    pub fn start_event_feed(&mut self) {
        let ctx = self.controller.context();
        let filter = EventFilter::MoveModule {
            package: ctx.builder.package().clone(),
            module: ctx.builder.module().to_string(),
        };
        let tx = self.events_tx.clone();
        self.feed = Some(EventFeed::start(
            ctx.ledger.clone(),
            filter,
            DEFAULT_EVENT_INTERVAL,
            move |event| {
                let _ = tx.send(AppEvent::Chain(event));
            },
        ));
    }

    pub fn shutdown(&mut self) {
        self.stop_polling();
        if let Some(feed) = self.feed.take() {
            feed.stop();
        }
    }

    fn stop_polling(&mut self) {
        if let Some(poll) = self.poll.take() {
            poll.stop();
        }
    }

    /// Applies one background report. Returns true when the view changed.
    pub fn handle(&mut self, event: AppEvent) -> bool {
        match event {
            AppEvent::Snapshot(snapshot) => {
                if !self.controller.apply_snapshot(snapshot.clone()) {
                    return false;
                }
                debug!(game = %snapshot.id, status = %snapshot.status, "snapshot applied");
                if self.controller.needs_move_cap() {
                    self.lookup_move_cap();
                }
                if !snapshot.tile_ids.is_empty() {
                    self.fetch_tiles(snapshot);
                }
                true
            }
            AppEvent::Action(result) => {
                self.on_action_result(result);
                true
            }
            AppEvent::MoveCap { game, result } => {
                if self.cap_lookup.as_ref() == Some(&game) {
                    self.cap_lookup = None;
                }
                if self.controller.game_id() != Some(&game) {
                    return false;
                }
                match result {
                    Ok(Some(cap)) => {
                        self.cap_retry_at = None;
                        self.controller.set_move_cap(Some(cap));
                        true
                    }
                    Ok(None) => {
                        let retry = self.controller.context().constants.poll_interval;
                        self.cap_retry_at = Some(Instant::now() + retry);
                        let had_cap = self.controller.move_cap().is_some();
                        self.controller.set_move_cap(None);
                        had_cap
                    }
                    Err(err) => {
                        warn!(%game, ?err, "move capability lookup failed");
                        false
                    }
                }
            }
            AppEvent::Tiles { game, tiles } => {
                self.tiles_in_flight = false;
                let current = self.controller.game_id() == Some(&game);
                if current {
                    self.controller.set_tiles(tiles);
                }
                if std::mem::take(&mut self.tiles_dirty)
                    && let Some(snapshot) = self.controller.snapshot().cloned()
                {
                    self.fetch_tiles(snapshot);
                }
                current
            }
            AppEvent::Chain(event) => {
                if let (Some(game), Some(poll)) = (self.controller.game_id(), &self.poll)
                    && event_mentions_game(&event, game)
                {
                    debug!(%game, kind = ?event.get("type"), "game event, refreshing");
                    poll.refresh_now();
                }
                false
            }
        }
    }

    fn on_action_result(&mut self, result: ActionResult) {
        if let Some(game) = self.controller.apply_result(&result, Instant::now()) {
            self.watch(game);
            return;
        }
        if result.outcome.is_err() {
            return;
        }
        if let Some(poll) = &self.poll {
            poll.refresh_now();
        }
        if matches!(result.action, Action::Move(_)) {
            self.lookup_move_cap();
        }
    }

    /// Applies one user intent. Returns false when the user asked to quit.
    pub fn handle_user(&mut self, event: UserEvent) -> bool {
        match event {
            UserEvent::Quit => return false,
            UserEvent::Redraw => {}
            UserEvent::CreateGame => self.submit(Action::CreateGame),
            UserEvent::Join(game) => self.submit(Action::Join(game)),
            UserEvent::ChooseStart(at) => self.submit(Action::ChooseStart(at)),
            UserEvent::Start => self.submit(Action::Start),
            UserEvent::Move(direction) => self.submit(Action::Move(direction)),
            UserEvent::ForceTimeout => self.submit(Action::ForceTimeout),
            UserEvent::Refresh => {
                if let Some(poll) = &self.poll {
                    poll.refresh_now();
                }
            }
            UserEvent::Leave => {
                self.stop_polling();
                self.controller.leave_game();
            }
        }
        true
    }

    fn submit(&mut self, action: Action) {
        match self.controller.prepare(action, turn::now_ms()) {
            Ok(pending) => {
                let tx = self.events_tx.clone();
                tokio::spawn(async move {
                    let result = pending.run().await;
                    let _ = tx.send(AppEvent::Action(result));
                });
            }
            Err(refusal) => self.controller.refuse(&refusal, Instant::now()),
        }
    }

    /// Periodic housekeeping. Returns true when a redraw is due.
    pub fn tick(&mut self) -> bool {
        let now = Instant::now();
        let expired = self.controller.expire_notice(now);
        if self.controller.needs_move_cap() && self.cap_retry_at.is_none_or(|at| at <= now) {
            self.lookup_move_cap();
        }
        let counting = self
            .controller
            .snapshot()
            .is_some_and(|s| s.status == GameStatus::Active);
        expired || counting
    }

    fn lookup_move_cap(&mut self) {
        let Some(game) = self.controller.game_id().cloned() else {
            return;
        };
        if self.cap_lookup.as_ref() == Some(&game) {
            return;
        }
        self.cap_lookup = Some(game.clone());
        let ctx = self.controller.context().clone();
        let me = self.controller.me().clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = discover_move_cap(&ctx, &me, &game).await;
            let _ = tx.send(AppEvent::MoveCap { game, result });
        });
    }

    fn fetch_tiles(&mut self, snapshot: Arc<GameSnapshot>) {
        if self.tiles_in_flight {
            self.tiles_dirty = true;
            return;
        }
        self.tiles_in_flight = true;
        let ledger = self.controller.context().ledger.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let tiles = fetch_tile_details(ledger.as_ref(), &snapshot).await;
            let _ = tx.send(AppEvent::Tiles {
                game: snapshot.id.clone(),
                tiles,
            });
        });
    }
}

/// Builds the chain-facing context from configuration. Resolves the local
/// identity through the wallet when no address is configured.
pub async fn build_context(config: &AppConfig) -> Result<(Arc<ClientContext>, Address)> {
    let signer = Arc::new(SuiCliSigner::new(&config.sui_bin));
    let me: Address = match &config.address {
        Some(raw) => raw.parse::<Address>().wrap_err("invalid --address")?,
        None => signer
            .active_address()
            .await
            .wrap_err("could not read the wallet's active address")?,
    };
    let ledger: Arc<dyn Ledger> = Arc::new(
        SuiRpcClient::new(config.network.url()).wrap_err("failed to build the RPC client")?,
    );
    let constants = config.constants.clone();
    let builder = TxBuilder::new(&config.package_id, &constants.module, &constants.clock_id)
        .wrap_err("invalid package configuration")?;
    let registry = config
        .registry_id
        .as_deref()
        .map(str::parse::<ObjectId>)
        .transpose()
        .wrap_err("invalid registry id")?;
    let executor = Executor::new(ledger.clone(), signer, constants.gas_budget);
    let ctx = ClientContext {
        ledger,
        executor,
        builder,
        constants,
        registry,
    };
    Ok((Arc::new(ctx), me))
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let (ctx, me) = build_context(&config).await?;
    info!(network = %config.network, me = %me, package = %ctx.builder.package(), "starting");

    let (mut app, app_events) = App::new(ctx, me);
    if let Some(raw) = &config.game {
        let game: ObjectId = raw.parse().wrap_err("invalid --game")?;
        app.watch(game);
    }
    app.start_event_feed();

    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(app, app_events, &mut ui_state, &mut input_events).await;
    ui::terminal_exit()?;
    res
}

async fn run_loop(
    mut app: App,
    mut app_events: mpsc::UnboundedReceiver<AppEvent>,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEvents,
) -> Result<()> {
    let mut ticker = time::interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ui::draw(ui_state, &app.view()).wrap_err("initial draw failed")?;

    loop {
        let redraw = tokio::select! {
            maybe_event = app_events.recv() => {
                let Some(event) = maybe_event else {
                    warn!("app event channel closed");
                    break;
                };
                app.handle(event)
            }
            _ = ticker.tick() => app.tick(),
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(ui_state, event) else {
                    continue;
                };
                if !app.handle_user(ev) {
                    break;
                }
                true
            }
            _ = tokio::signal::ctrl_c() => break,
        };
        if redraw {
            ui::draw(ui_state, &app.view()).wrap_err("draw failed")?;
        }
    }
    info!("shutting down");
    app.shutdown();
    Ok(())
}
