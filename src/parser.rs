//! Maps raw ledger object content into typed values.
//!
//! Every function here is total: unexpected shapes fall back to a default or to
//! `None`. Nothing in this module performs I/O.

use crate::{
    ids::{
        Address,
        ObjectId,
        StructTag,
    },
    snapshot::{
        Coord,
        Direction,
        GameSnapshot,
        GameStatus,
        MoveCapability,
        TileDetail,
    },
};
use serde_json::Value;

pub const GAME_STRUCT: &str = "Game";
pub const MOVE_CAP_STRUCT: &str = "MoveCap";
pub const TILE_STRUCT: &str = "Tile";
pub const REGISTRY_STRUCT: &str = "GameRegistry";

const MAX_PLAYERS: usize = 2;

/// Unwraps vector-like values: a plain array, `{fields: [..]}`, `{vec: [..]}` or
/// `{fields: {contents: [..]}}`. Anything else is an empty list.
pub fn unwrap_vec(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Object(map)) => {
            if let Some(Value::Array(items)) = map.get("fields") {
                return items.clone();
            }
            if let Some(Value::Array(items)) = map.get("vec") {
                return items.clone();
            }
            if let Some(inner @ Value::Object(_)) = map.get("fields") {
                return unwrap_vec(inner.get("contents").or_else(|| inner.get("vec")));
            }
            if let Some(Value::Array(items)) = map.get("contents") {
                return items.clone();
            }
            Vec::new()
        }
        _ => Vec::new(),
    }
}

/// Unwraps an optional value: `null`, absent, `[]`, `[x]`, `{vec: [..]}`,
/// `{fields: {vec: [..]}}` or a plain value.
pub fn unwrap_option(value: Option<&Value>) -> Option<Value> {
    match value? {
        Value::Null => None,
        Value::Array(items) => items.first().filter(|v| !v.is_null()).cloned(),
        Value::Object(map) => {
            if let Some(vec) = map.get("vec") {
                return unwrap_option(Some(vec));
            }
            if let Some(Value::Object(fields)) = map.get("fields")
                && let Some(vec) = fields.get("vec")
            {
                return unwrap_option(Some(vec));
            }
            Some(Value::Object(map.clone()))
        }
        other => Some(other.clone()),
    }
}

/// Reads an integer that may be a JSON number, a decimal string, `{value}` or
/// `{fields: {value}}`.
pub fn coerce_u64(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(u64::from(*b)),
        Value::Object(map) => {
            if let Some(inner) = map.get("value") {
                return coerce_u64(Some(inner));
            }
            match map.get("fields") {
                Some(fields @ Value::Object(_)) => coerce_u64(fields.get("value")),
                _ => None,
            }
        }
        _ => None,
    }
}

pub fn coerce_bool(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        other => coerce_u64(Some(other)).map(|n| n != 0),
    }
}

/// Peels a Move struct `{type, fields: {..}}` down to its field bag.
fn struct_fields(value: &Value) -> &Value {
    match value.get("fields") {
        Some(fields @ Value::Object(_)) => fields,
        _ => value,
    }
}

/// First present value among `names`.
fn field<'a>(bag: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| bag.get(*name).filter(|v| !v.is_null()))
}

pub(crate) fn coerce_address(value: Option<&Value>) -> Option<Address> {
    value?.as_str()?.parse().ok()
}

/// Handles appear as plain strings, `{id: "0x.."}` (a `UID`) or
/// `{fields: {id: "0x.."}}`.
pub(crate) fn coerce_object_id(value: Option<&Value>) -> Option<ObjectId> {
    match value? {
        Value::String(s) => s.parse().ok(),
        obj @ Value::Object(_) => {
            let bag = struct_fields(obj);
            coerce_object_id(field(bag, &["id", "bytes"]))
        }
        _ => None,
    }
}

fn coerce_coord(value: &Value) -> Option<Coord> {
    let bag = struct_fields(value);
    let x = coerce_u64(bag.get("x"))?;
    let y = coerce_u64(bag.get("y"))?;
    Some(Coord::new(x, y))
}

fn coerce_direction(value: &Value) -> Option<Direction> {
    let inner = unwrap_option(Some(value))?;
    coerce_u64(Some(&inner)).and_then(Direction::from_code)
}

/// Splits the `content` envelope into `(type, fields)`, requiring a Move object.
fn move_object(content: &Value) -> Option<(Option<StructTag>, &Value)> {
    if content.get("dataType").and_then(Value::as_str) != Some("moveObject") {
        return None;
    }
    let tag = content
        .get("type")
        .and_then(Value::as_str)
        .map(StructTag::parse);
    let tag = match tag {
        Some(None) => return None,
        Some(Some(tag)) => Some(tag),
        None => None,
    };
    let fields = content.get("fields").filter(|f| f.is_object())?;
    Some((tag, fields))
}

fn type_is(tag: &Option<StructTag>, name: &str) -> bool {
    tag.as_ref().is_none_or(|tag| tag.name == name)
}

fn pad<T: Clone>(mut values: Vec<T>, len: usize, filler: T) -> Vec<T> {
    values.truncate(len);
    values.resize(len, filler);
    values
}

/// Parses a game object's `content` block. `version` is carried through from the
/// object envelope when known.
///
/// Returns `None` for anything that is not a game: a different data type, a
/// different struct, a missing or malformed id, an unknown status code, an
/// unreadable player entry or more than two players.
pub fn parse_game(content: &Value, version: Option<u64>) -> Option<GameSnapshot> {
    let (tag, fields) = move_object(content)?;
    if !type_is(&tag, GAME_STRUCT) {
        return None;
    }

    let id = coerce_object_id(fields.get("id"))?;
    let status = GameStatus::from_code(coerce_u64(fields.get("status")).unwrap_or(0))?;

    // Per-player vectors and the turn index are positional, so one bad entry
    // invalidates the whole object.
    let players: Vec<Address> = unwrap_vec(fields.get("players"))
        .iter()
        .map(|p| coerce_address(Some(p)))
        .collect::<Option<_>>()?;
    if players.len() > MAX_PLAYERS {
        return None;
    }
    let count = players.len();

    let player_positions = unwrap_vec(field(fields, &["players_positions", "player_positions"]))
        .iter()
        .map(|v| coerce_coord(v).unwrap_or_default())
        .collect();
    let player_scores = unwrap_vec(field(fields, &["players_scores", "player_scores"]))
        .iter()
        .map(|v| coerce_u64(Some(v)).unwrap_or(0))
        .collect();
    let has_placed = unwrap_vec(fields.get("has_placed"))
        .iter()
        .map(|v| coerce_bool(Some(v)).unwrap_or(false))
        .collect();
    let last_directions = unwrap_vec(fields.get("last_directions"))
        .iter()
        .map(coerce_direction)
        .collect();

    let tile_ids = unwrap_vec(fields.get("tile_ids"))
        .iter()
        .filter_map(|v| coerce_object_id(Some(v)))
        .collect();
    let tile_positions = unwrap_vec(fields.get("tile_positions"))
        .iter()
        .filter_map(coerce_coord)
        .collect();

    let turn_started_at = coerce_u64(field(fields, &["turn_start_time", "turn_started_at"]))
        .filter(|ts| *ts > 0);
    let winner = unwrap_option(fields.get("winner")).and_then(|w| coerce_address(Some(&w)));

    Some(GameSnapshot {
        id,
        version,
        creator: coerce_address(fields.get("creator")),
        board_size: coerce_u64(fields.get("board_size")).unwrap_or(0),
        players,
        current_turn: coerce_u64(fields.get("current_turn")).unwrap_or(0) as usize,
        status,
        tiles_remaining: coerce_u64(fields.get("tiles_remaining")).unwrap_or(0),
        turn_started_at,
        winner,
        player_positions: pad(player_positions, count, Coord::default()),
        player_scores: pad(player_scores, count, 0),
        last_directions,
        tile_ids,
        tile_positions,
        has_placed: pad(has_placed, count, false),
        move_caps_created: coerce_bool(fields.get("move_caps_created")).unwrap_or(false),
    })
}

/// Parses a `MoveCap` owned object.
pub fn parse_move_cap(content: &Value) -> Option<MoveCapability> {
    let (tag, fields) = move_object(content)?;
    if !type_is(&tag, MOVE_CAP_STRUCT) {
        return None;
    }
    Some(MoveCapability {
        id: coerce_object_id(fields.get("id"))?,
        game_id: coerce_object_id(fields.get("game_id"))?,
        player: coerce_address(field(fields, &["player_address", "player"])),
        moves_remaining: coerce_u64(fields.get("moves_remaining")).unwrap_or(0),
    })
}

/// Parses a tile object. `fallback_position` is used when the object carries no
/// coordinates of its own.
pub fn parse_tile(content: &Value, fallback_position: Option<Coord>) -> Option<TileDetail> {
    let (tag, fields) = move_object(content)?;
    if !type_is(&tag, TILE_STRUCT) {
        return None;
    }
    let position = field(fields, &["position", "pos"])
        .and_then(coerce_coord)
        .or_else(|| coerce_coord(fields))
        .or(fallback_position)?;
    let owner = unwrap_option(fields.get("owner")).and_then(|o| coerce_address(Some(&o)));
    Some(TileDetail {
        id: coerce_object_id(fields.get("id"))?,
        position,
        reward_value: coerce_u64(field(fields, &["reward_value", "value", "reward"]))
            .unwrap_or(0),
        claimed: coerce_bool(field(fields, &["claimed", "is_claimed"])).unwrap_or(false),
        owner,
    })
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::test_helpers::{
        ADDR_A,
        ADDR_B,
        GAME_ID,
        game_content,
    };
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn unwrap_vec__accepts_every_wrapper() {
        let plain = json!([1, 2]);
        let fields = json!({"fields": [1, 2]});
        let vec = json!({"vec": [1, 2]});
        let contents = json!({"fields": {"contents": [1, 2]}});
        for value in [plain, fields, vec, contents] {
            assert_eq!(unwrap_vec(Some(&value)), vec![json!(1), json!(2)]);
        }
        assert!(unwrap_vec(None).is_empty());
        assert!(unwrap_vec(Some(&json!("nope"))).is_empty());
    }

    #[test]
    fn unwrap_option__treats_empty_wrappers_as_none() {
        assert_eq!(unwrap_option(None), None);
        assert_eq!(unwrap_option(Some(&json!(null))), None);
        assert_eq!(unwrap_option(Some(&json!([]))), None);
        assert_eq!(unwrap_option(Some(&json!({"vec": []}))), None);
        assert_eq!(unwrap_option(Some(&json!({"fields": {"vec": []}}))), None);
        assert_eq!(unwrap_option(Some(&json!({"vec": ["0x1"]}))), Some(json!("0x1")));
        assert_eq!(unwrap_option(Some(&json!("0x1"))), Some(json!("0x1")));
    }

    #[test]
    fn coerce_u64__reads_numbers_strings_and_wrapped_values() {
        assert_eq!(coerce_u64(Some(&json!(7))), Some(7));
        assert_eq!(coerce_u64(Some(&json!("1700000000000"))), Some(1_700_000_000_000));
        assert_eq!(coerce_u64(Some(&json!({"value": 2}))), Some(2));
        assert_eq!(coerce_u64(Some(&json!({"fields": {"value": "3"}}))), Some(3));
        assert_eq!(coerce_u64(Some(&json!("x"))), None);
    }

    #[test]
    fn parse_game__wrapped_players_match_plain_players() {
        // given
        let plain = game_content(json!([ADDR_A, ADDR_B]), 1);
        let wrapped = game_content(json!({"fields": [ADDR_A, ADDR_B]}), 1);

        // when
        let a = parse_game(&plain, None).unwrap();
        let b = parse_game(&wrapped, None).unwrap();

        // then
        assert_eq!(a.players, b.players);
        assert_eq!(a.players.len(), 2);
    }

    #[test]
    fn parse_game__missing_winner_is_none() {
        // given
        let mut content = game_content(json!([ADDR_A, ADDR_B]), 3);
        content["fields"].as_object_mut().unwrap().remove("winner");

        // when
        let snapshot = parse_game(&content, None).unwrap();

        // then
        assert_eq!(snapshot.winner, None);
        assert!(snapshot.is_draw());
    }

    #[test]
    fn parse_game__reads_wrapped_winner() {
        let mut content = game_content(json!([ADDR_A, ADDR_B]), 3);
        content["fields"]["winner"] = json!({"fields": {"vec": [ADDR_B]}});

        let snapshot = parse_game(&content, None).unwrap();

        assert_eq!(snapshot.winner, Some(ADDR_B.parse().unwrap()));
    }

    #[test]
    fn parse_game__pads_per_player_vectors() {
        // given
        let mut content = game_content(json!([ADDR_A, ADDR_B]), 1);
        content["fields"]["players_positions"] = json!([{"fields": {"x": "1", "y": "2"}}]);
        content["fields"]["players_scores"] = json!([]);
        content["fields"]["has_placed"] = json!([true, false, true]);

        // when
        let snapshot = parse_game(&content, None).unwrap();

        // then
        assert_eq!(snapshot.player_positions, vec![Coord::new(1, 2), Coord::default()]);
        assert_eq!(snapshot.player_scores, vec![0, 0]);
        assert_eq!(snapshot.has_placed, vec![true, false]);
    }

    #[test]
    fn parse_game__rejects_wrong_data_type_and_struct() {
        let mut package = game_content(json!([]), 0);
        package["dataType"] = json!("package");
        assert!(parse_game(&package, None).is_none());

        let mut registry = game_content(json!([]), 0);
        registry["type"] = json!("0x1::tile_game_core::GameRegistry");
        assert!(parse_game(&registry, None).is_none());
    }

    #[test]
    fn parse_game__rejects_more_than_two_players_and_unknown_status() {
        let crowded = game_content(json!([ADDR_A, ADDR_B, ADDR_A]), 0);
        assert!(parse_game(&crowded, None).is_none());

        let unknown = game_content(json!([]), 9);
        assert!(parse_game(&unknown, None).is_none());
    }

    #[test]
    fn parse_game__unreadable_player_rejects_snapshot() {
        // given
        let content = game_content(json!(["not-an-address", ADDR_B]), 2);

        // when
        let snapshot = parse_game(&content, None);

        // then
        assert!(snapshot.is_none());
    }

    #[test]
    fn parse_game__current_turn_only_visible_while_active() {
        let mut content = game_content(json!([ADDR_A, ADDR_B]), 1);
        content["fields"]["current_turn"] = json!(1);
        let placement = parse_game(&content, None).unwrap();
        assert_eq!(placement.current_turn_index(), None);

        content["fields"]["status"] = json!({"fields": {"value": 2}});
        let active = parse_game(&content, None).unwrap();
        assert_eq!(active.current_turn_index(), Some(1));
        assert_eq!(active.id, GAME_ID.parse().unwrap());
    }

    #[test]
    fn parse_move_cap__reads_uid_and_game() {
        let content = json!({
            "dataType": "moveObject",
            "type": "0x1::tile_game_core::MoveCap",
            "fields": {
                "id": {"id": "0xc4"},
                "game_id": GAME_ID,
                "player_address": ADDR_A,
                "moves_remaining": "12"
            }
        });

        let cap = parse_move_cap(&content).unwrap();

        assert_eq!(cap.id, "0xc4".parse().unwrap());
        assert_eq!(cap.game_id, GAME_ID.parse().unwrap());
        assert_eq!(cap.moves_remaining, 12);
        assert!(parse_game(&content, None).is_none());
    }

    #[test]
    fn parse_tile__falls_back_to_known_position() {
        let content = json!({
            "dataType": "moveObject",
            "type": "0x1::tile_game_core::Tile",
            "fields": {"id": {"id": "0x77"}, "reward_value": 5, "claimed": false, "owner": null}
        });

        let tile = parse_tile(&content, Some(Coord::new(3, 4))).unwrap();

        assert_eq!(tile.position, Coord::new(3, 4));
        assert_eq!(tile.reward_value, 5);
        assert_eq!(tile.owner, None);
        assert!(parse_tile(&content, None).is_none());
    }

    fn wrap_strategy() -> impl Strategy<Value = u8> {
        0u8..4
    }

    fn wrap(items: Vec<Value>, how: u8) -> Value {
        match how {
            0 => Value::Array(items),
            1 => json!({ "fields": items }),
            2 => json!({ "vec": items }),
            _ => json!({ "fields": { "contents": items } }),
        }
    }

    proptest! {
        #[test]
        fn parse_game__scores_survive_any_wrapping(
            scores in proptest::collection::vec(0u64..1_000, 0..=2),
            how in wrap_strategy(),
            as_strings in any::<bool>(),
        ) {
            let players = [ADDR_A, ADDR_B][..scores.len()].to_vec();
            let items = scores
                .iter()
                .map(|s| if as_strings { json!(s.to_string()) } else { json!(s) })
                .collect();
            let mut content = game_content(json!(players), 2);
            content["fields"]["players_scores"] = wrap(items, how);

            let snapshot = parse_game(&content, None).unwrap();

            prop_assert_eq!(snapshot.player_scores, scores);
        }
    }
}
