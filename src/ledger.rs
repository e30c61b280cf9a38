use crate::ids::{
    Address,
    ObjectId,
};
use async_trait::async_trait;
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger transport failed: {0}")]
    Transport(String),
    #[error("ledger returned error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("could not decode ledger response: {0}")]
    Decode(String),
    #[error("transaction {digest} not visible after {waited:?}")]
    WaitTimedOut { digest: String, waited: Duration },
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        LedgerError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Decode(err.to_string())
    }
}

/// An object as read from the ledger. `content` is the untouched `content` block.
#[derive(Clone, Debug, PartialEq)]
pub struct RawObject {
    pub object_id: ObjectId,
    pub version: Option<u64>,
    pub object_type: Option<String>,
    pub content: Value,
}

/// Full or partial transaction result. Any of the detail blocks may be missing
/// depending on who produced it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub digest: String,
    #[serde(default)]
    pub effects: Option<Value>,
    #[serde(default)]
    pub events: Option<Vec<Value>>,
    #[serde(default)]
    pub object_changes: Option<Vec<Value>>,
}

impl TransactionResponse {
    pub fn has_details(&self) -> bool {
        self.object_changes.as_ref().is_some_and(|c| !c.is_empty())
            || self.events.as_ref().is_some_and(|e| !e.is_empty())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EventFilter {
    MoveModule { package: ObjectId, module: String },
}

impl EventFilter {
    pub fn to_json(&self) -> Value {
        match self {
            EventFilter::MoveModule { package, module } => serde_json::json!({
                "MoveModule": { "package": package.as_str(), "module": module }
            }),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPage {
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub next_cursor: Option<Value>,
    #[serde(default)]
    pub has_next_page: bool,
}

/// Read side of the remote ledger.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// `Ok(None)` when the object does not exist or was deleted.
    async fn get_object(&self, id: &ObjectId) -> Result<Option<RawObject>, LedgerError>;

    /// Every object owned by `owner`, optionally restricted to one struct type
    /// (`<package>::<module>::<Name>`).
    async fn get_owned_objects(
        &self,
        owner: &Address,
        struct_type: Option<&str>,
    ) -> Result<Vec<RawObject>, LedgerError>;

    /// Blocks until `digest` is visible with full detail.
    async fn wait_for_transaction(
        &self,
        digest: &str,
    ) -> Result<TransactionResponse, LedgerError>;

    async fn query_events(
        &self,
        filter: &EventFilter,
        cursor: Option<Value>,
        limit: usize,
        descending: bool,
    ) -> Result<EventPage, LedgerError>;
}
