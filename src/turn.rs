//! Client-side eligibility for each game action. The contract is the final
//! authority; these gates only decide which controls are offered.

use crate::{
    ids::Address,
    snapshot::{
        GameSnapshot,
        GameStatus,
    },
};
use std::time::Duration;

pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_millis(30_000);
pub const MAX_PLAYERS: usize = 2;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Eligibility {
    pub join: bool,
    pub choose_start: bool,
    pub start: bool,
    pub make_move: bool,
    pub force_timeout: bool,
    /// Time left on the current turn clock, when one is running.
    pub time_remaining: Option<Duration>,
}

impl Eligibility {
    pub fn any(&self) -> bool {
        self.join || self.choose_start || self.start || self.make_move || self.force_timeout
    }
}

/// Evaluates what `me` may do in `snapshot` at wall-clock time `now_ms`.
pub fn evaluate(
    snapshot: &GameSnapshot,
    me: &Address,
    now_ms: u64,
    timeout: Duration,
) -> Eligibility {
    let my_index = snapshot.player_index(me);
    let mut out = Eligibility::default();

    match snapshot.status {
        GameStatus::Lobby => {
            out.join = my_index.is_none() && snapshot.players.len() < MAX_PLAYERS;
        }
        GameStatus::Placement => {
            out.choose_start = my_index
                .is_some_and(|idx| !snapshot.has_placed.get(idx).copied().unwrap_or(false));
            out.start = snapshot.creator.as_ref() == Some(me) && snapshot.all_placed();
        }
        GameStatus::Active => {
            let current = snapshot.current_turn_index();
            out.make_move = my_index.is_some() && my_index == current;
            if let Some(started) = snapshot.turn_started_at {
                let elapsed = Duration::from_millis(now_ms.saturating_sub(started));
                out.time_remaining = Some(timeout.saturating_sub(elapsed));
                out.force_timeout = my_index.is_some()
                    && current.is_some()
                    && my_index != current
                    && elapsed >= timeout;
            }
        }
        GameStatus::Finished => {}
    }
    out
}

/// Current wall-clock time in milliseconds since the Unix epoch, as the chain
/// clock reports it.
pub fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::test_helpers::{
        ADDR_A,
        ADDR_B,
        ADDR_C,
        snapshot_with,
    };
    use proptest::prelude::*;

    const TIMEOUT: Duration = DEFAULT_TURN_TIMEOUT;

    fn addr(raw: &str) -> Address {
        raw.parse().unwrap()
    }

    #[test]
    fn evaluate__lobby_allows_join_for_outsiders_only() {
        let snapshot = snapshot_with(GameStatus::Lobby, &[ADDR_A]);

        assert!(evaluate(&snapshot, &addr(ADDR_B), 0, TIMEOUT).join);
        assert!(!evaluate(&snapshot, &addr(ADDR_A), 0, TIMEOUT).join);

        let full = snapshot_with(GameStatus::Lobby, &[ADDR_A, ADDR_B]);
        assert!(!evaluate(&full, &addr(ADDR_C), 0, TIMEOUT).join);
    }

    #[test]
    fn evaluate__start_requires_creator_and_both_placed() {
        // given
        let mut snapshot = snapshot_with(GameStatus::Placement, &[ADDR_A, ADDR_B]);
        snapshot.creator = Some(addr(ADDR_A));
        snapshot.has_placed = vec![true, false];

        // when
        let creator = evaluate(&snapshot, &addr(ADDR_A), 0, TIMEOUT);
        let joiner = evaluate(&snapshot, &addr(ADDR_B), 0, TIMEOUT);

        // then
        assert!(!creator.start);
        assert!(!creator.choose_start);
        assert!(joiner.choose_start);

        snapshot.has_placed = vec![true, true];
        assert!(evaluate(&snapshot, &addr(ADDR_A), 0, TIMEOUT).start);
        assert!(!evaluate(&snapshot, &addr(ADDR_B), 0, TIMEOUT).start);
    }

    #[test]
    fn evaluate__finished_allows_nothing() {
        let mut snapshot = snapshot_with(GameStatus::Finished, &[ADDR_A, ADDR_B]);
        snapshot.turn_started_at = Some(1);

        let e = evaluate(&snapshot, &addr(ADDR_B), u64::MAX, TIMEOUT);

        assert!(!e.any());
        assert_eq!(e.time_remaining, None);
    }

    #[test]
    fn evaluate__outsider_never_forces_timeout() {
        let mut snapshot = snapshot_with(GameStatus::Active, &[ADDR_A, ADDR_B]);
        snapshot.turn_started_at = Some(1_000);

        let e = evaluate(&snapshot, &addr(ADDR_C), 1_000_000, TIMEOUT);

        assert!(!e.make_move);
        assert!(!e.force_timeout);
    }

    proptest! {
        #[test]
        fn evaluate__active_gates_move_and_timeout(
            turn in 0usize..2,
            me in 0usize..2,
            started in 1u64..1_000_000,
            elapsed in 0u64..120_000,
        ) {
            let mut snapshot = snapshot_with(GameStatus::Active, &[ADDR_A, ADDR_B]);
            snapshot.current_turn = turn;
            snapshot.turn_started_at = Some(started);
            let who = addr([ADDR_A, ADDR_B][me]);

            let e = evaluate(&snapshot, &who, started + elapsed, TIMEOUT);

            prop_assert_eq!(e.make_move, me == turn);
            prop_assert_eq!(
                e.force_timeout,
                me != turn && elapsed >= TIMEOUT.as_millis() as u64
            );
            prop_assert!(!e.join && !e.start && !e.choose_start);
        }
    }
}
