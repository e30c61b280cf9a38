use crate::{
    builders::{
        CLOCK_OBJECT_ID,
        DEFAULT_MODULE,
    },
    deployment::DeploymentEnv,
    poller::DEFAULT_POLL_INTERVAL,
    turn::DEFAULT_TURN_TIMEOUT,
};
use std::{
    fmt,
    path::PathBuf,
    time::Duration,
};

pub const DEFAULT_DEVNET_RPC_URL: &str = "https://fullnode.devnet.sui.io:443";
pub const DEFAULT_TESTNET_RPC_URL: &str = "https://fullnode.testnet.sui.io:443";
pub const DEFAULT_MAINNET_RPC_URL: &str = "https://fullnode.mainnet.sui.io:443";
pub const DEFAULT_LOCAL_RPC_URL: &str = "http://127.0.0.1:9000";

pub const DEFAULT_GAS_BUDGET: u64 = 100_000_000;
pub const DEFAULT_START_FUNDING: u64 = 500_000_000;
pub const DEFAULT_NOTICE_TTL: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NetworkTarget {
    Devnet { url: String },
    Testnet { url: String },
    Mainnet { url: String },
    Local { url: String },
}

impl NetworkTarget {
    pub fn url(&self) -> &str {
        match self {
            NetworkTarget::Devnet { url }
            | NetworkTarget::Testnet { url }
            | NetworkTarget::Mainnet { url }
            | NetworkTarget::Local { url } => url,
        }
    }

    pub fn deployment_env(&self) -> DeploymentEnv {
        match self {
            NetworkTarget::Devnet { .. } => DeploymentEnv::Dev,
            NetworkTarget::Testnet { .. } => DeploymentEnv::Test,
            NetworkTarget::Mainnet { .. } => DeploymentEnv::Main,
            NetworkTarget::Local { .. } => DeploymentEnv::Local,
        }
    }
}

impl fmt::Display for NetworkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.deployment_env(), self.url())
    }
}

/// Fees, budgets and cadences. All of these vary between contract versions, so
/// none of them is hard-coded at the call sites.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GameConstants {
    pub gas_budget: u64,
    pub join_fee: Option<u64>,
    pub start_funding: Option<u64>,
    pub turn_timeout: Duration,
    pub poll_interval: Duration,
    pub notice_ttl: Duration,
    pub clock_id: String,
    pub module: String,
}

impl Default for GameConstants {
    fn default() -> Self {
        Self {
            gas_budget: DEFAULT_GAS_BUDGET,
            join_fee: None,
            start_funding: Some(DEFAULT_START_FUNDING),
            turn_timeout: DEFAULT_TURN_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            notice_ttl: DEFAULT_NOTICE_TTL,
            clock_id: CLOCK_OBJECT_ID.to_string(),
            module: DEFAULT_MODULE.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub network: NetworkTarget,
    pub package_id: String,
    pub registry_id: Option<String>,
    /// Local identity; the wallet's active address when absent.
    pub address: Option<String>,
    /// Game to open on start-up.
    pub game: Option<String>,
    pub sui_bin: PathBuf,
    pub constants: GameConstants,
}
