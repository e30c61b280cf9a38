use clap::{
    ArgGroup,
    Parser,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use std::{
    path::PathBuf,
    time::Duration,
};
use tile_duel::{
    app,
    config::{
        AppConfig,
        DEFAULT_DEVNET_RPC_URL,
        DEFAULT_GAS_BUDGET,
        DEFAULT_LOCAL_RPC_URL,
        DEFAULT_MAINNET_RPC_URL,
        DEFAULT_START_FUNDING,
        DEFAULT_TESTNET_RPC_URL,
        GameConstants,
        NetworkTarget,
    },
    deployment::{
        self,
        DeploymentStore,
    },
    poller::MIN_POLL_INTERVAL,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Terminal client for two-player tile duels on Sui",
    long_about = None,
    group(
        ArgGroup::new("network")
            .args(["devnet", "testnet", "mainnet", "local"])
            .required(true)
    )
)]
struct Args {
    #[arg(long)]
    devnet: bool,

    #[arg(long)]
    testnet: bool,

    #[arg(long)]
    mainnet: bool,

    #[arg(long)]
    local: bool,

    /// Override the RPC URL for the selected network
    #[arg(long)]
    rpc_url: Option<String>,

    /// Defaults to the latest deployment record for the network
    #[arg(long)]
    package_id: Option<String>,

    #[arg(long)]
    registry_id: Option<String>,

    /// Local identity; defaults to the wallet's active address
    #[arg(long)]
    address: Option<String>,

    /// Game to open on start-up
    #[arg(long)]
    game: Option<String>,

    #[arg(long, default_value = "sui")]
    sui_bin: String,

    #[arg(long, default_value_t = DEFAULT_GAS_BUDGET)]
    gas_budget: u64,

    /// Exact fee split off the gas coin when joining
    #[arg(long)]
    join_fee: Option<u64>,

    /// Funding passed to `start`; 0 sends none
    #[arg(long, default_value_t = DEFAULT_START_FUNDING)]
    start_funding: u64,

    #[arg(long)]
    turn_timeout_ms: Option<u64>,

    #[arg(long)]
    poll_interval_ms: Option<u64>,

    #[arg(long, default_value = "logs")]
    log_dir: String,
}

impl Args {
    fn network(&self) -> NetworkTarget {
        let url = |default: &str| self.rpc_url.clone().unwrap_or_else(|| default.to_string());
        if self.devnet {
            NetworkTarget::Devnet {
                url: url(DEFAULT_DEVNET_RPC_URL),
            }
        } else if self.testnet {
            NetworkTarget::Testnet {
                url: url(DEFAULT_TESTNET_RPC_URL),
            }
        } else if self.mainnet {
            NetworkTarget::Mainnet {
                url: url(DEFAULT_MAINNET_RPC_URL),
            }
        } else {
            NetworkTarget::Local {
                url: url(DEFAULT_LOCAL_RPC_URL),
            }
        }
    }
}

fn init_tracing(log_dir: &str) -> Result<WorkerGuard> {
    let dir = shellexpand::tilde(log_dir).into_owned();
    let appender = rolling::daily(&dir, "tile-duel.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|err| eyre!("failed to install tracing subscriber: {err}"))?;
    Ok(guard)
}

/// Merges CLI flags with the latest deployment record. Flags win.
fn build_config(args: Args, store: &DeploymentStore) -> Result<AppConfig> {
    let network = args.network();
    let latest = store
        .latest(args.package_id.as_deref())
        .wrap_err("loading deployment records")?;

    let package_id = match (&args.package_id, &latest) {
        (Some(package), _) => package.clone(),
        (None, Some(record)) => {
            tracing::info!(
                package = %record.package_id,
                deployed_at = %record.deployed_at,
                "using deployment record"
            );
            record.package_id.clone()
        }
        (None, None) => {
            return Err(eyre!(
                "No deployment record found for {}; provide --package-id",
                network.deployment_env()
            ));
        }
    };
    let registry_id = args
        .registry_id
        .clone()
        .or_else(|| latest.as_ref().and_then(|r| r.registry_id.clone()));

    let mut constants = GameConstants {
        gas_budget: args.gas_budget,
        join_fee: args.join_fee,
        start_funding: (args.start_funding > 0).then_some(args.start_funding),
        ..GameConstants::default()
    };
    if let Some(record) = &latest {
        constants.module = record.module.clone();
    }
    if let Some(ms) = args.turn_timeout_ms {
        constants.turn_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = args.poll_interval_ms {
        constants.poll_interval = Duration::from_millis(ms).max(MIN_POLL_INTERVAL);
    }

    Ok(AppConfig {
        network,
        package_id,
        registry_id,
        address: args.address,
        game: args.game,
        sui_bin: PathBuf::from(shellexpand::tilde(&args.sui_bin).into_owned()),
        constants,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    let _guard = init_tracing(&args.log_dir)?;
    deployment::ensure_structure()?;
    let store = DeploymentStore::new(args.network().deployment_env())
        .wrap_err("opening deployments store")?;
    let config = build_config(args, &store)?;
    app::run_app(config).await
}
