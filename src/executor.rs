use crate::{
    builders::TransactionDescription,
    ids::Address,
    ledger::{
        Ledger,
        TransactionResponse,
    },
    signer::{
        SignerError,
        TransactionSigner,
    },
};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{
    debug,
    info,
    warn,
};

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("signing rejected: {0}")]
    SigningRejected(String),
    #[error("submission failed: {0}")]
    SubmissionFailed(String),
    #[error("unexpected transaction result: {0}")]
    MalformedResult(String),
    #[error("{}", abort_message(.code, .reason))]
    Aborted { reason: String, code: Option<u64> },
}

/// Human message for a contract abort code, if it is one the game knows about.
pub fn describe_abort_code(code: u64) -> Option<&'static str> {
    let msg = match code {
        2 => "You are not a valid player for this action.",
        3 => "It is not your turn.",
        6 => "Action not allowed: game not active.",
        11 => "Your move capability has no remaining moves.",
        13 => "Only the game creator can perform this action.",
        14 => "Wrong funding amount for starting the game.",
        20 => "You must wait before forcing a timeout.",
        21 => "Game already has two players.",
        22 => "You have already joined this game.",
        23 => "Game or object not found.",
        _ => return None,
    };
    Some(msg)
}

fn abort_message(code: &Option<u64>, reason: &str) -> String {
    match code.and_then(describe_abort_code) {
        Some(msg) => msg.to_string(),
        None => format!("transaction aborted: {reason}"),
    }
}

/// Pulls the numeric code out of a `MoveAbort(MoveLocation { .. }, 22) in command 0`
/// style error string.
pub fn parse_abort_code(error: &str) -> Option<u64> {
    let start = error.find("MoveAbort")?;
    let rest = &error[start..];
    let after_location = &rest[rest.rfind("}, ")? + 3..];
    let digits: String = after_location
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Normalised result of a successfully executed transaction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransactionOutcome {
    pub digest: String,
    pub effects: Value,
    pub events: Vec<Value>,
    pub object_changes: Vec<Value>,
}

impl From<TransactionResponse> for TransactionOutcome {
    fn from(response: TransactionResponse) -> Self {
        Self {
            digest: response.digest,
            effects: response.effects.unwrap_or(Value::Null),
            events: response.events.unwrap_or_default(),
            object_changes: response.object_changes.unwrap_or_default(),
        }
    }
}

/// Sequences sign, submit and the detail re-fetch. Never retries.
#[derive(Clone)]
pub struct Executor {
    ledger: Arc<dyn Ledger>,
    signer: Arc<dyn TransactionSigner>,
    gas_budget: u64,
}

impl Executor {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        signer: Arc<dyn TransactionSigner>,
        gas_budget: u64,
    ) -> Self {
        Self {
            ledger,
            signer,
            gas_budget,
        }
    }

    pub async fn execute(
        &self,
        tx: TransactionDescription,
        sender: &Address,
    ) -> Result<TransactionOutcome, ExecutionError> {
        let tx = tx.with_sender(sender.clone(), self.gas_budget);
        let function = tx.function().to_string();

        let response = self.signer.sign_and_submit(&tx).await.map_err(|err| match err {
            SignerError::Rejected(msg) | SignerError::Unavailable(msg) => {
                ExecutionError::SigningRejected(msg)
            }
            SignerError::Failed(msg) => match parse_abort_code(&msg) {
                Some(code) => ExecutionError::Aborted {
                    reason: msg,
                    code: Some(code),
                },
                None => ExecutionError::SubmissionFailed(msg),
            },
        })?;

        if response.digest.trim().is_empty() {
            return Err(ExecutionError::MalformedResult(
                "wallet returned no transaction digest".to_string(),
            ));
        }
        info!(%function, digest = %response.digest, "transaction submitted");

        let response = if response.has_details() {
            response
        } else {
            debug!(digest = %response.digest, "result lacks details, waiting for transaction");
            let full = self
                .ledger
                .wait_for_transaction(&response.digest)
                .await
                .map_err(|err| ExecutionError::SubmissionFailed(err.to_string()))?;
            merge(response, full)
        };

        check_status(&response)?;
        Ok(response.into())
    }
}

fn merge(partial: TransactionResponse, full: TransactionResponse) -> TransactionResponse {
    TransactionResponse {
        digest: partial.digest,
        effects: full.effects.or(partial.effects),
        events: full.events.or(partial.events),
        object_changes: full.object_changes.or(partial.object_changes),
    }
}

fn check_status(response: &TransactionResponse) -> Result<(), ExecutionError> {
    let Some(effects) = &response.effects else {
        return Ok(());
    };
    if !effects.is_object() {
        return Err(ExecutionError::MalformedResult(format!(
            "effects of {} are not an object",
            response.digest
        )));
    }
    let status = effects.get("status");
    match status.and_then(|s| s.get("status")).and_then(Value::as_str) {
        Some("failure") => {
            let reason = status
                .and_then(|s| s.get("error"))
                .and_then(Value::as_str)
                .unwrap_or("unknown failure")
                .to_string();
            let code = parse_abort_code(&reason);
            warn!(digest = %response.digest, %reason, ?code, "transaction failed on chain");
            Err(ExecutionError::Aborted { reason, code })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        builders::{
            CLOCK_OBJECT_ID,
            DEFAULT_MODULE,
            TxBuilder,
        },
        test_helpers::{
            ADDR_A,
            FakeLedger,
            FakeSigner,
            GAME_ID,
            PACKAGE_ID,
            created_change,
        },
    };
    use serde_json::json;

    fn executor(ledger: Arc<FakeLedger>, signer: Arc<FakeSigner>) -> Executor {
        Executor::new(ledger, signer, 1_000)
    }

    fn timeout_tx() -> TransactionDescription {
        TxBuilder::new(PACKAGE_ID, DEFAULT_MODULE, CLOCK_OBJECT_ID)
            .unwrap()
            .force_timeout(&GAME_ID.parse().unwrap())
    }

    #[tokio::test]
    async fn execute__failed_detail_fetch_is_submission_failure() {
        // given
        let ledger = Arc::new(FakeLedger::default());
        ledger.fail_next_waits(1);
        let signer = Arc::new(FakeSigner::default());
        signer.push_ok("D1");

        // when
        let result = executor(ledger.clone(), signer)
            .execute(timeout_tx(), &ADDR_A.parse().unwrap())
            .await;

        // then
        assert!(matches!(result, Err(ExecutionError::SubmissionFailed(_))));
        assert_eq!(ledger.wait_count(), 1);
    }

    #[tokio::test]
    async fn execute__failure_status_is_aborted_with_code() {
        // given
        let ledger = Arc::new(FakeLedger::default());
        let signer = Arc::new(FakeSigner::default());
        signer.push_response(TransactionResponse {
            digest: "D2".to_string(),
            effects: Some(json!({
                "status": {
                    "status": "failure",
                    "error": "MoveAbort(MoveLocation { module: ModuleId { address: 0x1, \
                              name: Identifier(\"tile_game_core\") }, function: 7, \
                              instruction: 4, function_name: Some(\"force_timeout\") }, 3) \
                              in command 0"
                }
            })),
            events: Some(Vec::new()),
            object_changes: Some(vec![created_change(PACKAGE_ID, "Game", GAME_ID)]),
        });

        // when
        let result = executor(ledger.clone(), signer)
            .execute(timeout_tx(), &ADDR_A.parse().unwrap())
            .await;

        // then
        match result {
            Err(ExecutionError::Aborted { code, .. }) => assert_eq!(code, Some(3)),
            other => panic!("expected abort, got {other:?}"),
        }
        assert_eq!(ledger.wait_count(), 0);
    }

    #[tokio::test]
    async fn execute__blank_digest_is_malformed() {
        let ledger = Arc::new(FakeLedger::default());
        let signer = Arc::new(FakeSigner::default());
        signer.push_ok("  ");

        let result = executor(ledger.clone(), signer)
            .execute(timeout_tx(), &ADDR_A.parse().unwrap())
            .await;

        assert!(matches!(result, Err(ExecutionError::MalformedResult(_))));
        assert_eq!(ledger.wait_count(), 0);
    }

    #[test]
    fn parse_abort_code__reads_trailing_code() {
        let error = "MoveAbort(MoveLocation { module: ModuleId { address: 0x1, name: \
                     Identifier(\"tile_game_core\") }, function: 3, instruction: 12, \
                     function_name: Some(\"join_game\") }, 22) in command 0";

        assert_eq!(parse_abort_code(error), Some(22));
        assert_eq!(parse_abort_code("InsufficientGas"), None);
    }

    #[test]
    fn aborted__known_code_has_friendly_message() {
        let err = ExecutionError::Aborted {
            reason: "MoveAbort(..)".to_string(),
            code: Some(3),
        };
        assert_eq!(err.to_string(), "It is not your turn.");

        let unknown = ExecutionError::Aborted {
            reason: "boom".to_string(),
            code: Some(99),
        };
        assert_eq!(unknown.to_string(), "transaction aborted: boom");
    }

    #[test]
    fn merge__prefers_refetched_details() {
        let partial = TransactionResponse {
            digest: "D".to_string(),
            effects: Some(serde_json::json!({"status": {"status": "success"}})),
            ..Default::default()
        };
        let full = TransactionResponse {
            digest: "D".to_string(),
            object_changes: Some(vec![serde_json::json!({"type": "created"})]),
            ..Default::default()
        };

        let merged = merge(partial, full);

        assert!(merged.effects.is_some());
        assert_eq!(merged.object_changes.map(|c| c.len()), Some(1));
    }
}
