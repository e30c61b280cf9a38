use crate::{
    ids::ObjectId,
    ledger::{
        Ledger,
        LedgerError,
    },
    parser::parse_game,
    snapshot::GameSnapshot,
};
use parking_lot::Mutex;
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{
        self,
        Instant,
        MissedTickBehavior,
    },
};
use tracing::{
    debug,
    warn,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2_000);
/// Shorter intervals are raised to this.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug)]
pub struct PollOptions {
    pub interval: Duration,
    /// Run the first cycle right away instead of after one interval.
    pub immediate: bool,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            immediate: true,
        }
    }
}

enum PollCommand {
    RefreshNow,
}

/// Fetches and parses one game. `Ok(None)` covers both a missing object and
/// content that is not a game.
pub async fn fetch_snapshot(
    ledger: &dyn Ledger,
    game_id: &ObjectId,
) -> Result<Option<GameSnapshot>, LedgerError> {
    let Some(raw) = ledger.get_object(game_id).await? else {
        return Ok(None);
    };
    let snapshot = parse_game(&raw.content, raw.version);
    if snapshot.is_none() {
        warn!(%game_id, object_type = ?raw.object_type, "object did not parse as a game");
    }
    Ok(snapshot)
}

/// Handle to a running reconciler. Dropping it stops polling.
pub struct PollHandle {
    game_id: ObjectId,
    stopped: Arc<Mutex<bool>>,
    commands: mpsc::UnboundedSender<PollCommand>,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn game_id(&self) -> &ObjectId {
        &self.game_id
    }

    /// Stops polling. Idempotent. Once this returns the subscriber will not be
    /// called again, even for a fetch that was already in flight.
    pub fn stop(&self) {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            debug!(game_id = %self.game_id, "stopping poller");
            *stopped = true;
        }
        drop(stopped);
        self.task.abort();
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    /// Runs a cycle now instead of waiting for the next tick.
    pub fn refresh_now(&self) {
        let _ = self.commands.send(PollCommand::RefreshNow);
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Starts the polling reconciler for `game_id`.
///
/// Cycles run one at a time. A failed fetch or unparsable content is logged and
/// the loop carries on; only [`PollHandle::stop`] ends it. Responses carrying an
/// object version older than the last published one are discarded, as are
/// snapshots identical to the last published one.
///
/// `on_snapshot` runs while the stop lock is held and must not call back into
/// the handle.
pub fn start_polling<F>(
    ledger: Arc<dyn Ledger>,
    game_id: ObjectId,
    options: PollOptions,
    mut on_snapshot: F,
) -> PollHandle
where
    F: FnMut(Arc<GameSnapshot>) + Send + 'static,
{
    let stopped = Arc::new(Mutex::new(false));
    let (commands, mut rx) = mpsc::unbounded_channel();
    let worker_stopped = stopped.clone();
    let worker_id = game_id.clone();
    let interval = options.interval.max(MIN_POLL_INTERVAL);

    let task = tokio::spawn(async move {
        let first = if options.immediate {
            Instant::now()
        } else {
            Instant::now() + interval
        };
        let mut ticker = time::interval_at(first, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last: Option<Arc<GameSnapshot>> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                cmd = rx.recv() => match cmd {
                    Some(PollCommand::RefreshNow) => ticker.reset(),
                    None => break,
                },
            }
            if *worker_stopped.lock() {
                break;
            }

            let snapshot = match fetch_snapshot(ledger.as_ref(), &worker_id).await {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => {
                    debug!(game_id = %worker_id, "no game snapshot this cycle");
                    continue;
                }
                Err(err) => {
                    warn!(game_id = %worker_id, ?err, "poll fetch failed");
                    continue;
                }
            };

            if let Some(prev) = &last {
                if let (Some(prev_v), Some(new_v)) = (prev.version, snapshot.version)
                    && new_v < prev_v
                {
                    debug!(game_id = %worker_id, prev_v, new_v, "dropping stale version");
                    continue;
                }
                if **prev == snapshot {
                    continue;
                }
            }

            {
                let stopped = worker_stopped.lock();
                if *stopped {
                    break;
                }
                let snapshot = Arc::new(snapshot);
                last = Some(snapshot.clone());
                on_snapshot(snapshot);
            }
        }
        debug!(game_id = %worker_id, "poller exited");
    });

    PollHandle {
        game_id,
        stopped,
        commands,
        task,
    }
}
