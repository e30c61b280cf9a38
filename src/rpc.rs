use crate::{
    ids::{
        Address,
        ObjectId,
    },
    ledger::{
        EventFilter,
        EventPage,
        Ledger,
        LedgerError,
        RawObject,
        TransactionResponse,
    },
    parser::coerce_u64,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{
    Value,
    json,
};
use std::{
    sync::atomic::{
        AtomicU64,
        Ordering,
    },
    time::Duration,
};
use tokio::time::{
    self,
    Instant,
};
use tracing::debug;

pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const OWNED_PAGE_LIMIT: usize = 50;

/// JSON-RPC client for a Sui fullnode.
pub struct SuiRpcClient {
    url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
    wait_timeout: Duration,
}

#[derive(Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorDto>,
}

#[derive(Deserialize)]
struct RpcErrorDto {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectResponseDto {
    #[serde(default)]
    data: Option<ObjectDataDto>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectDataDto {
    object_id: ObjectId,
    #[serde(default)]
    version: Option<Value>,
    #[serde(default, rename = "type")]
    object_type: Option<String>,
    #[serde(default)]
    content: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnedPageDto {
    #[serde(default)]
    data: Vec<ObjectResponseDto>,
    #[serde(default)]
    next_cursor: Option<Value>,
    #[serde(default)]
    has_next_page: bool,
}

impl From<ObjectDataDto> for RawObject {
    fn from(dto: ObjectDataDto) -> Self {
        RawObject {
            object_id: dto.object_id,
            version: coerce_u64(dto.version.as_ref()),
            object_type: dto.object_type,
            content: dto.content.unwrap_or(Value::Null),
        }
    }
}

fn object_options() -> Value {
    json!({ "showType": true, "showContent": true })
}

fn transaction_options() -> Value {
    json!({
        "showEffects": true,
        "showEvents": true,
        "showObjectChanges": true,
    })
}

impl SuiRpcClient {
    pub fn new(url: impl Into<String>) -> Result<Self, LedgerError> {
        let url = url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self {
            url,
            http,
            next_id: AtomicU64::new(1),
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        })
    }

    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, id, "rpc request");
        let res = self.http.post(&self.url).json(&body).send().await?;
        let status = res.status();
        let bytes = res.bytes().await?;
        if status != StatusCode::OK {
            let body = String::from_utf8_lossy(&bytes);
            return Err(LedgerError::Transport(format!(
                "fullnode responded with {status} to {method}: {body}"
            )));
        }
        let envelope: RpcEnvelope = serde_json::from_slice(&bytes)?;
        if let Some(err) = envelope.error {
            return Err(LedgerError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        envelope
            .result
            .ok_or_else(|| LedgerError::Decode(format!("{method} returned no result")))
    }

    async fn get_transaction(&self, digest: &str) -> Result<TransactionResponse, LedgerError> {
        let result = self
            .call("sui_getTransactionBlock", json!([digest, transaction_options()]))
            .await?;
        Ok(serde_json::from_value(result)?)
    }
}

#[async_trait]
impl Ledger for SuiRpcClient {
    async fn get_object(&self, id: &ObjectId) -> Result<Option<RawObject>, LedgerError> {
        let result = self
            .call("sui_getObject", json!([id.as_str(), object_options()]))
            .await?;
        let dto: ObjectResponseDto = serde_json::from_value(result)?;
        if let Some(err) = dto.error {
            debug!(%id, ?err, "object not readable");
            return Ok(None);
        }
        Ok(dto.data.map(Into::into))
    }

    async fn get_owned_objects(
        &self,
        owner: &Address,
        struct_type: Option<&str>,
    ) -> Result<Vec<RawObject>, LedgerError> {
        let mut query = json!({ "options": object_options() });
        if let Some(struct_type) = struct_type {
            query["filter"] = json!({ "StructType": struct_type });
        }
        let mut objects = Vec::new();
        let mut cursor = Value::Null;
        loop {
            let result = self
                .call(
                    "suix_getOwnedObjects",
                    json!([owner.as_str(), query, cursor, OWNED_PAGE_LIMIT]),
                )
                .await?;
            let page: OwnedPageDto = serde_json::from_value(result)?;
            objects.extend(page.data.into_iter().filter_map(|o| o.data).map(Into::into));
            match page.next_cursor {
                Some(next) if page.has_next_page && !next.is_null() => cursor = next,
                _ => break,
            }
        }
        Ok(objects)
    }

    async fn wait_for_transaction(
        &self,
        digest: &str,
    ) -> Result<TransactionResponse, LedgerError> {
        let started = Instant::now();
        loop {
            match self.get_transaction(digest).await {
                Ok(response) => return Ok(response),
                // Not indexed yet; the fullnode reports it as an RPC error.
                Err(LedgerError::Rpc { code, message }) => {
                    if started.elapsed() >= self.wait_timeout {
                        debug!(digest, code, %message, "giving up on transaction");
                        return Err(LedgerError::WaitTimedOut {
                            digest: digest.to_string(),
                            waited: started.elapsed(),
                        });
                    }
                }
                Err(err) => return Err(err),
            }
            time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    async fn query_events(
        &self,
        filter: &EventFilter,
        cursor: Option<Value>,
        limit: usize,
        descending: bool,
    ) -> Result<EventPage, LedgerError> {
        let result = self
            .call(
                "suix_queryEvents",
                json!([filter.to_json(), cursor, limit, descending]),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }
}
