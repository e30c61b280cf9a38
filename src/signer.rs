use crate::{
    builders::{
        CallArg,
        TransactionDescription,
    },
    ids::Address,
    ledger::TransactionResponse,
};
use async_trait::async_trait;
use std::{
    io,
    path::PathBuf,
    process::Output,
};
use thiserror::Error;
use tokio::process::Command;
use tracing::{
    debug,
    info,
};

const SPLIT_RESULT: &str = "fee";

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("signing was rejected: {0}")]
    Rejected(String),
    #[error("wallet unavailable: {0}")]
    Unavailable(String),
    #[error("submission failed: {0}")]
    Failed(String),
}

/// The wallet boundary: sign a description and hand it to the network.
///
/// Submissions are not cancellable once this call starts.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign_and_submit(
        &self,
        tx: &TransactionDescription,
    ) -> Result<TransactionResponse, SignerError>;
}

/// Signs through the `sui` CLI wallet (`sui client ptb`).
#[derive(Clone, Debug)]
pub struct SuiCliSigner {
    sui_bin: PathBuf,
}

impl SuiCliSigner {
    pub fn new(sui_bin: impl Into<PathBuf>) -> Self {
        Self {
            sui_bin: sui_bin.into(),
        }
    }

    async fn run(&self, args: &[String]) -> Result<Output, SignerError> {
        debug!(bin = %self.sui_bin.display(), ?args, "invoking wallet");
        Command::new(&self.sui_bin)
            .args(args)
            .output()
            .await
            .map_err(|err| match err.kind() {
                io::ErrorKind::NotFound => SignerError::Unavailable(format!(
                    "`{}` not found on PATH",
                    self.sui_bin.display()
                )),
                _ => SignerError::Unavailable(err.to_string()),
            })
    }

    /// The wallet's active address, used as the local identity when none is
    /// configured.
    pub async fn active_address(&self) -> Result<Address, SignerError> {
        let args = ["client", "active-address", "--json"].map(String::from);
        let output = self.run(&args).await?;
        if !output.status.success() {
            return Err(classify_failure(&output));
        }
        let value: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|err| SignerError::Failed(format!("unreadable wallet output: {err}")))?;
        value
            .as_str()
            .and_then(|raw| raw.parse().ok())
            .ok_or_else(|| SignerError::Failed(format!("unexpected active address {value}")))
    }
}

/// Argument vector for `sui client ptb` describing `tx`.
pub fn ptb_args(tx: &TransactionDescription) -> Vec<String> {
    let mut args: Vec<String> = vec!["client".into(), "ptb".into()];
    if let Some(amount) = tx.fee_split {
        args.extend([
            "--split-coins".into(),
            "gas".into(),
            format!("[{amount}]"),
            "--assign".into(),
            SPLIT_RESULT.into(),
        ]);
    }
    args.push("--move-call".into());
    args.push(tx.call.target());
    args.extend(tx.call.arguments.iter().map(|arg| match arg {
        CallArg::Object(id) => format!("@{id}"),
        CallArg::U8(v) => format!("{v}u8"),
        CallArg::U64(v) => format!("{v}u64"),
        CallArg::SplitCoin => format!("{SPLIT_RESULT}.0"),
    }));
    if let Some(budget) = tx.gas_budget {
        args.extend(["--gas-budget".into(), budget.to_string()]);
    }
    if let Some(sender) = &tx.sender {
        args.extend(["--sender".into(), format!("@{sender}")]);
    }
    args.push("--json".into());
    args
}

fn classify_failure(output: &Output) -> SignerError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let lowered = stderr.to_lowercase();
    if lowered.contains("reject") || lowered.contains("cancel") || lowered.contains("denied") {
        SignerError::Rejected(stderr)
    } else if lowered.contains("keystore") || lowered.contains("no active address") {
        SignerError::Unavailable(stderr)
    } else if stderr.is_empty() {
        SignerError::Failed(format!("wallet exited with {}", output.status))
    } else {
        SignerError::Failed(stderr)
    }
}

#[async_trait]
impl TransactionSigner for SuiCliSigner {
    async fn sign_and_submit(
        &self,
        tx: &TransactionDescription,
    ) -> Result<TransactionResponse, SignerError> {
        let args = ptb_args(tx);
        info!(target_fn = %tx.call.target(), "submitting transaction");
        let output = self.run(&args).await?;
        if !output.status.success() {
            return Err(classify_failure(&output));
        }
        serde_json::from_slice(&output.stdout)
            .map_err(|err| SignerError::Failed(format!("unreadable wallet output: {err}")))
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        builders::TxBuilder,
        snapshot::Direction,
    };

    fn builder() -> TxBuilder {
        TxBuilder::new("0x1", "tile_game_core", "0x6").unwrap()
    }

    #[test]
    fn ptb_args__move_call_with_sender_and_budget() {
        // given
        let game = "0xaaa".parse().unwrap();
        let cap = "0xc4".parse().unwrap();
        let sender: Address = "0xb0b".parse().unwrap();
        let tx = builder()
            .move_with_cap(&game, &cap, Direction::Right)
            .with_sender(sender.clone(), 100);

        // when
        let args = ptb_args(&tx);

        // then
        assert_eq!(&args[..3], ["client", "ptb", "--move-call"]);
        assert!(args[3].ends_with("::tile_game_core::move_with_cap"));
        assert_eq!(args[4], format!("@{game}"));
        assert_eq!(args[6], "1u8");
        let tail: Vec<_> = args[8..].to_vec();
        assert_eq!(
            tail,
            vec![
                "--gas-budget".to_string(),
                "100".to_string(),
                "--sender".to_string(),
                format!("@{sender}"),
                "--json".to_string(),
            ]
        );
    }

    #[test]
    fn ptb_args__splits_fee_before_call() {
        let game = "0xaaa".parse().unwrap();
        let tx = builder().start_game(&game, Some(500));

        let args = ptb_args(&tx);

        assert_eq!(&args[2..7], ["--split-coins", "gas", "[500]", "--assign", "fee"]);
        assert!(args.contains(&"fee.0".to_string()));
    }

    #[tokio::test]
    async fn sign_and_submit__missing_binary_is_unavailable() {
        let signer = SuiCliSigner::new("/nonexistent/sui-binary");
        let tx = builder().create_registry();

        let err = signer.sign_and_submit(&tx).await.unwrap_err();

        assert!(matches!(err, SignerError::Unavailable(_)));
    }
}
