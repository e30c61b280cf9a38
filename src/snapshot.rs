use crate::ids::{
    Address,
    ObjectId,
};
use std::fmt;

/// Lifecycle of a game as reported by the contract. The order of the variants is the
/// only legal progression.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum GameStatus {
    Lobby,
    Placement,
    Active,
    Finished,
}

impl GameStatus {
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(GameStatus::Lobby),
            1 => Some(GameStatus::Placement),
            2 => Some(GameStatus::Active),
            3 => Some(GameStatus::Finished),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            GameStatus::Lobby => 0,
            GameStatus::Placement => 1,
            GameStatus::Active => 2,
            GameStatus::Finished => 3,
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GameStatus::Lobby => "Lobby",
            GameStatus::Placement => "Placement",
            GameStatus::Active => "Active",
            GameStatus::Finished => "Finished",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct Coord {
    pub x: u64,
    pub y: u64,
}

impl Coord {
    pub fn new(x: u64, y: u64) -> Self {
        Self { x, y }
    }

    pub fn within(&self, board_size: u64) -> bool {
        self.x < board_size && self.y < board_size
    }

    /// Neighbouring cell in `direction`, clamped to the board.
    pub fn step(self, direction: Direction, board_size: u64) -> Self {
        let max = board_size.saturating_sub(1);
        match direction {
            Direction::Up => Coord::new(self.x, self.y.saturating_sub(1)),
            Direction::Right => Coord::new((self.x + 1).min(max), self.y),
            Direction::Down => Coord::new(self.x, (self.y + 1).min(max)),
            Direction::Left => Coord::new(self.x.saturating_sub(1), self.y),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Direction {
    Up,
    Right,
    Down,
    Left,
}

impl Direction {
    /// Wire encoding expected by `move_with_cap`.
    pub fn code(self) -> u8 {
        match self {
            Direction::Up => 0,
            Direction::Right => 1,
            Direction::Down => 2,
            Direction::Left => 3,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Direction::Up),
            1 => Some(Direction::Right),
            2 => Some(Direction::Down),
            3 => Some(Direction::Left),
            _ => None,
        }
    }
}

/// Point-in-time view of a game object. Snapshots are only ever replaced, never edited;
/// consumers share them behind an `Arc`.
///
/// `player_positions`, `player_scores` and `has_placed` always have the same length
/// as `players`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GameSnapshot {
    pub id: ObjectId,
    pub version: Option<u64>,
    pub creator: Option<Address>,
    pub board_size: u64,
    pub players: Vec<Address>,
    pub(crate) current_turn: usize,
    pub status: GameStatus,
    pub tiles_remaining: u64,
    /// Chain clock milliseconds at which the current turn began.
    pub turn_started_at: Option<u64>,
    pub winner: Option<Address>,
    pub player_positions: Vec<Coord>,
    pub player_scores: Vec<u64>,
    pub last_directions: Vec<Option<Direction>>,
    pub tile_ids: Vec<ObjectId>,
    pub tile_positions: Vec<Coord>,
    pub has_placed: Vec<bool>,
    pub move_caps_created: bool,
}

impl GameSnapshot {
    /// Index of the player whose turn it is. Only defined while the game is active.
    pub fn current_turn_index(&self) -> Option<usize> {
        (self.status == GameStatus::Active && self.current_turn < self.players.len())
            .then_some(self.current_turn)
    }

    pub fn current_player(&self) -> Option<&Address> {
        self.current_turn_index().map(|idx| &self.players[idx])
    }

    pub fn player_index(&self, who: &Address) -> Option<usize> {
        self.players.iter().position(|p| p == who)
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= 2
    }

    pub fn all_placed(&self) -> bool {
        self.is_full() && self.has_placed.iter().all(|placed| *placed)
    }

    pub fn is_draw(&self) -> bool {
        self.status == GameStatus::Finished && self.winner.is_none()
    }

    pub fn player_at(&self, cell: Coord) -> Option<usize> {
        self.player_positions.iter().position(|pos| *pos == cell)
    }
}

/// Permission to move in exactly one game for exactly one player.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MoveCapability {
    pub id: ObjectId,
    pub game_id: ObjectId,
    pub player: Option<Address>,
    pub moves_remaining: u64,
}

impl MoveCapability {
    pub fn is_spent(&self) -> bool {
        self.moves_remaining == 0
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TileDetail {
    pub id: ObjectId,
    pub position: Coord,
    pub reward_value: u64,
    pub claimed: bool,
    pub owner: Option<Address>,
}
