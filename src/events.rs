use crate::{
    ids::ObjectId,
    ledger::{
        EventFilter,
        Ledger,
    },
    parser::coerce_object_id,
};
use serde_json::Value;
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::{
    task::JoinHandle,
    time,
};
use tracing::{
    debug,
    warn,
};

pub const DEFAULT_EVENT_INTERVAL: Duration = Duration::from_millis(1_500);
const PAGE_LIMIT: usize = 50;

/// Event subscription over `suix_queryEvents`. Only events emitted after the
/// feed started are delivered. Dropping the feed stops it.
pub struct EventFeed {
    task: JoinHandle<()>,
}

impl EventFeed {
    pub fn start<F>(
        ledger: Arc<dyn Ledger>,
        filter: EventFilter,
        interval: Duration,
        mut on_event: F,
    ) -> Self
    where
        F: FnMut(Value) + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let mut cursor = match ledger.query_events(&filter, None, 1, true).await {
                Ok(page) => page.data.first().and_then(|e| e.get("id")).cloned(),
                Err(err) => {
                    warn!(?err, "could not read newest event, starting from the beginning");
                    None
                }
            };
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let page = match ledger
                    .query_events(&filter, cursor.clone(), PAGE_LIMIT, false)
                    .await
                {
                    Ok(page) => page,
                    Err(err) => {
                        warn!(?err, "event query failed");
                        continue;
                    }
                };
                if page.data.is_empty() {
                    continue;
                }
                debug!(count = page.data.len(), "new events");
                let last_id = page.data.last().and_then(|e| e.get("id")).cloned();
                for event in page.data {
                    on_event(event);
                }
                cursor = page.next_cursor.filter(|c| !c.is_null()).or(last_id).or(cursor);
            }
        });
        Self { task }
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for EventFeed {
    fn drop(&mut self) {
        self.stop();
    }
}

/// True when the event's payload names `game` under one of the usual id fields.
pub fn event_mentions_game(event: &Value, game: &ObjectId) -> bool {
    let Some(payload) = event.get("parsedJson") else {
        return false;
    };
    ["game_id", "gameId", "id"]
        .iter()
        .filter_map(|field| coerce_object_id(payload.get(*field)))
        .any(|id| id == *game)
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::test_helpers::{
        FakeLedger,
        GAME_ID,
        game_created_event,
    };
    use parking_lot::Mutex;

    fn filter() -> EventFilter {
        EventFilter::MoveModule {
            package: "0x1".parse().unwrap(),
            module: "tile_game_core".to_string(),
        }
    }

    #[test]
    fn event_mentions_game__matches_any_id_field() {
        let game: ObjectId = GAME_ID.parse().unwrap();
        let event = game_created_event("0x1", GAME_ID);

        assert!(event_mentions_game(&event, &game));
        assert!(!event_mentions_game(&event, &"0xdead".parse().unwrap()));
        assert!(!event_mentions_game(&serde_json::json!({}), &game));
    }

    #[tokio::test(start_paused = true)]
    async fn event_feed__delivers_only_new_events() {
        // given
        let ledger = Arc::new(FakeLedger::default());
        ledger.push_event(game_created_event("0x1", "0xabc1"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _feed = EventFeed::start(
            ledger.clone(),
            filter(),
            Duration::from_secs(1),
            move |event| sink.lock().push(event),
        );
        time::sleep(Duration::from_millis(10)).await;

        // when
        ledger.push_event(game_created_event("0x1", GAME_ID));
        time::sleep(Duration::from_millis(1_100)).await;

        // then
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(event_mentions_game(&seen[0], &GAME_ID.parse().unwrap()));
    }
}
