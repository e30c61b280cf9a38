//! Locating newly created objects in a transaction outcome.
//!
//! Wallets and fullnodes surface different subsets of result data, so extraction
//! is an ordered chain of strategies, each total, from most to least reliable.

use crate::{
    executor::TransactionOutcome,
    ids::{
        Address,
        ObjectId,
        StructTag,
        type_matches,
    },
    parser::{
        GAME_STRUCT,
        MOVE_CAP_STRUCT,
        REGISTRY_STRUCT,
        coerce_address,
        coerce_object_id,
    },
};
use serde_json::Value;
use tracing::debug;

pub trait ExtractStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, outcome: &TransactionOutcome) -> Option<ObjectId>;
}

/// Authoritative: a `created` entry in `objectChanges` with the expected type
/// and owner.
pub struct FromObjectChanges {
    pub module: String,
    pub struct_name: String,
    pub owner: ExpectedOwner,
}

impl ExtractStrategy for FromObjectChanges {
    fn name(&self) -> &'static str {
        "object_changes"
    }

    fn extract(&self, outcome: &TransactionOutcome) -> Option<ObjectId> {
        outcome.object_changes.iter().find_map(|change| {
            if change.get("type").and_then(Value::as_str) != Some("created") {
                return None;
            }
            let object_type = change.get("objectType").and_then(Value::as_str)?;
            if !type_matches(object_type, &self.module, &self.struct_name)
                || !self.owner.accepts(change.get("owner"))
            {
                return None;
            }
            coerce_object_id(change.get("objectId").or_else(|| change.get("object_id")))
        })
    }
}

/// A creation event, matched by struct name or by substring of the event type,
/// with the id read from the first present payload field.
pub struct FromEvents {
    pub names: Vec<String>,
    pub id_fields: Vec<String>,
}

impl FromEvents {
    fn matches(&self, event_type: &str) -> bool {
        let tag_name = StructTag::parse(event_type).map(|tag| tag.name);
        self.names.iter().any(|name| {
            tag_name.as_deref() == Some(name.as_str()) || event_type.contains(name.as_str())
        })
    }
}

impl ExtractStrategy for FromEvents {
    fn name(&self) -> &'static str {
        "events"
    }

    fn extract(&self, outcome: &TransactionOutcome) -> Option<ObjectId> {
        outcome.events.iter().find_map(|event| {
            let event_type = event.get("type").and_then(Value::as_str)?;
            if !self.matches(event_type) {
                return None;
            }
            let payload = event.get("parsedJson")?;
            self.id_fields
                .iter()
                .find_map(|field| coerce_object_id(payload.get(field.as_str())))
        })
    }
}

/// Which owner a created object is expected to have. Effects carry no type
/// information, so ownership is the only discriminator available.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExpectedOwner {
    Shared,
    Address(Address),
    Any,
}

impl ExpectedOwner {
    fn accepts(&self, owner: Option<&Value>) -> bool {
        match self {
            ExpectedOwner::Any => true,
            ExpectedOwner::Shared => owner.is_some_and(|o| o.get("Shared").is_some()),
            ExpectedOwner::Address(expected) => owner
                .and_then(|o| coerce_address(o.get("AddressOwner")))
                .is_some_and(|a| a == *expected),
        }
    }
}

/// Last resort: object references in the effects' `created` list, then
/// optionally `mutated`. The gas coin is never returned.
pub struct FromEffects {
    pub owner: ExpectedOwner,
    pub allow_mutated: bool,
}

fn reference_id(entry: &Value) -> Option<ObjectId> {
    let reference = entry.get("reference").unwrap_or(entry);
    coerce_object_id(
        reference
            .get("objectId")
            .or_else(|| reference.get("object_id")),
    )
}

impl FromEffects {
    fn scan(&self, effects: &Value, list: &str, gas: Option<&ObjectId>) -> Option<ObjectId> {
        effects
            .get(list)?
            .as_array()?
            .iter()
            .filter(|entry| self.owner.accepts(entry.get("owner")))
            .filter_map(reference_id)
            .find(|id| Some(id) != gas)
    }
}

impl ExtractStrategy for FromEffects {
    fn name(&self) -> &'static str {
        "effects"
    }

    fn extract(&self, outcome: &TransactionOutcome) -> Option<ObjectId> {
        let effects = &outcome.effects;
        let gas = effects.get("gasObject").and_then(reference_id);
        self.scan(effects, "created", gas.as_ref()).or_else(|| {
            self.allow_mutated
                .then(|| self.scan(effects, "mutated", gas.as_ref()))
                .flatten()
        })
    }
}

/// Strategies tried in order; the first non-empty answer wins.
pub struct ExtractorChain {
    label: &'static str,
    strategies: Vec<Box<dyn ExtractStrategy>>,
}

impl ExtractorChain {
    pub fn new(label: &'static str, strategies: Vec<Box<dyn ExtractStrategy>>) -> Self {
        Self { label, strategies }
    }

    pub fn created_game(module: &str) -> Self {
        Self::new(
            "game",
            vec![
                Box::new(FromObjectChanges {
                    module: module.to_string(),
                    struct_name: GAME_STRUCT.to_string(),
                    owner: ExpectedOwner::Any,
                }),
                Box::new(FromEvents {
                    names: strings(&["GameCreated", "GameCreatedEvent"]),
                    id_fields: strings(&["game_id", "gameId", "id"]),
                }),
                Box::new(FromEffects {
                    owner: ExpectedOwner::Shared,
                    allow_mutated: true,
                }),
            ],
        )
    }

    pub fn created_move_cap(module: &str, owner: &Address) -> Self {
        Self::new(
            "move cap",
            vec![
                Box::new(FromObjectChanges {
                    module: module.to_string(),
                    struct_name: MOVE_CAP_STRUCT.to_string(),
                    owner: ExpectedOwner::Address(owner.clone()),
                }),
                Box::new(FromEvents {
                    names: strings(&["MoveCapCreated", "MoveCapIssued"]),
                    id_fields: strings(&["cap_id", "capId", "move_cap_id"]),
                }),
                Box::new(FromEffects {
                    owner: ExpectedOwner::Address(owner.clone()),
                    allow_mutated: false,
                }),
            ],
        )
    }

    pub fn created_registry(module: &str) -> Self {
        Self::new(
            "registry",
            vec![
                Box::new(FromObjectChanges {
                    module: module.to_string(),
                    struct_name: REGISTRY_STRUCT.to_string(),
                    owner: ExpectedOwner::Any,
                }),
                Box::new(FromEvents {
                    names: strings(&["RegistryCreated", "GameRegistryCreated"]),
                    id_fields: strings(&["registry_id", "registryId", "id"]),
                }),
                Box::new(FromEffects {
                    owner: ExpectedOwner::Shared,
                    allow_mutated: false,
                }),
            ],
        )
    }

    pub fn extract(&self, outcome: &TransactionOutcome) -> Option<ObjectId> {
        self.strategies.iter().find_map(|strategy| {
            let id = strategy.extract(outcome)?;
            debug!(
                kind = self.label,
                strategy = strategy.name(),
                %id,
                digest = %outcome.digest,
                "extracted created object"
            );
            Some(id)
        })
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::test_helpers::{
        ADDR_A,
        created_change,
    };
    use serde_json::json;

    const PKG: &str = "0x1";

    #[test]
    fn object_changes__ignores_other_types_and_mutations() {
        let outcome = TransactionOutcome {
            object_changes: vec![
                json!({"type": "mutated", "objectType": format!("{PKG}::tile_game_core::Game"), "objectId": "0x1"}),
                created_change(PKG, "GameRegistry", "0x2"),
                created_change(PKG, "Game", "0x3"),
            ],
            ..Default::default()
        };

        let id = ExtractorChain::created_game("tile_game_core").extract(&outcome);

        assert_eq!(id, Some("0x3".parse().unwrap()));
    }

    #[test]
    fn events__accepts_name_variants_and_id_spellings() {
        let outcome = TransactionOutcome {
            events: vec![json!({
                "type": format!("{PKG}::tile_game_core::GameCreatedEvent"),
                "parsedJson": {"gameId": "0xbee"}
            })],
            ..Default::default()
        };

        let id = ExtractorChain::created_game("tile_game_core").extract(&outcome);

        assert_eq!(id, Some("0xbee".parse().unwrap()));
    }

    #[test]
    fn effects__skips_gas_and_owned_objects_for_shared_game() {
        // given
        let outcome = TransactionOutcome {
            effects: json!({
                "status": {"status": "success"},
                "gasObject": {"owner": {"AddressOwner": ADDR_A}, "reference": {"objectId": "0x9"}},
                "created": [
                    {"owner": {"AddressOwner": ADDR_A}, "reference": {"objectId": "0x5"}},
                    {"owner": {"Shared": {"initial_shared_version": 3}}, "reference": {"objectId": "0x7"}}
                ],
                "mutated": [
                    {"owner": {"AddressOwner": ADDR_A}, "reference": {"objectId": "0x9"}}
                ]
            }),
            ..Default::default()
        };

        // when
        let game = ExtractorChain::created_game("tile_game_core").extract(&outcome);
        let cap = ExtractorChain::created_move_cap("tile_game_core", &ADDR_A.parse().unwrap())
            .extract(&outcome);

        // then
        assert_eq!(game, Some("0x7".parse().unwrap()));
        assert_eq!(cap, Some("0x5".parse().unwrap()));
    }

    #[test]
    fn effects__falls_back_to_mutated_shared_object() {
        let outcome = TransactionOutcome {
            effects: json!({
                "created": [],
                "mutated": [
                    {"owner": {"Shared": {"initial_shared_version": 1}}, "reference": {"object_id": "0x44"}}
                ]
            }),
            ..Default::default()
        };

        let id = ExtractorChain::created_game("tile_game_core").extract(&outcome);

        assert_eq!(id, Some("0x44".parse().unwrap()));
        assert_eq!(
            ExtractorChain::created_registry("tile_game_core").extract(&outcome),
            None
        );
    }

    #[test]
    fn chain__object_changes_win_over_events() {
        // given
        let outcome = TransactionOutcome {
            object_changes: vec![created_change(PKG, "Game", "0xaaa")],
            events: vec![json!({
                "type": format!("{PKG}::tile_game_core::GameCreated"),
                "parsedJson": {"game_id": "0xbbb"}
            })],
            ..Default::default()
        };

        // when
        let id = ExtractorChain::created_game("tile_game_core").extract(&outcome);

        // then
        assert_eq!(id, Some("0xaaa".parse().unwrap()));
    }

    #[test]
    fn chain__empty_outcome_is_none() {
        let outcome = TransactionOutcome::default();

        assert_eq!(
            ExtractorChain::created_game("tile_game_core").extract(&outcome),
            None
        );
    }
}
