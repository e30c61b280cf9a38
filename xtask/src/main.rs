use anyhow::{
    Context,
    Result,
    anyhow,
    ensure,
};
use clap::{
    Args,
    Parser,
    Subcommand,
    ValueEnum,
};
use std::{
    path::{
        Path,
        PathBuf,
    },
    process::Command,
    sync::Arc,
};
use tile_duel::{
    builders::{
        CLOCK_OBJECT_ID,
        DEFAULT_MODULE,
        TxBuilder,
    },
    config::{
        DEFAULT_DEVNET_RPC_URL,
        DEFAULT_GAS_BUDGET,
        DEFAULT_LOCAL_RPC_URL,
        DEFAULT_MAINNET_RPC_URL,
        DEFAULT_TESTNET_RPC_URL,
        NetworkTarget,
    },
    deployment::{
        DEPLOYMENTS_ROOT,
        DeploymentRecord,
        DeploymentStore,
    },
    executor::Executor,
    extract::ExtractorChain,
    ids::{
        Address,
        ObjectId,
    },
    ledger::Ledger,
    rpc::SuiRpcClient,
    signer::SuiCliSigner,
};

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "tile-duel helper tasks (registry setup, clippy, tests)",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a game registry for a published package and record it
    CreateRegistry(RegistryArgs),
    /// Run clippy for the entire workspace with warnings-as-errors
    Clippy,
    /// Run the workspace tests
    Test,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Network {
    Devnet,
    Testnet,
    Mainnet,
    Local,
}

impl Network {
    fn target(self, rpc_url: Option<String>) -> NetworkTarget {
        match self {
            Network::Devnet => NetworkTarget::Devnet {
                url: rpc_url.unwrap_or_else(|| DEFAULT_DEVNET_RPC_URL.to_string()),
            },
            Network::Testnet => NetworkTarget::Testnet {
                url: rpc_url.unwrap_or_else(|| DEFAULT_TESTNET_RPC_URL.to_string()),
            },
            Network::Mainnet => NetworkTarget::Mainnet {
                url: rpc_url.unwrap_or_else(|| DEFAULT_MAINNET_RPC_URL.to_string()),
            },
            Network::Local => NetworkTarget::Local {
                url: rpc_url.unwrap_or_else(|| DEFAULT_LOCAL_RPC_URL.to_string()),
            },
        }
    }
}

#[derive(Args)]
struct RegistryArgs {
    #[arg(long, value_enum)]
    network: Network,

    #[arg(long)]
    package_id: String,

    #[arg(long)]
    rpc_url: Option<String>,

    /// Sender; defaults to the wallet's active address
    #[arg(long)]
    address: Option<String>,

    #[arg(long, default_value = "sui")]
    sui_bin: PathBuf,

    #[arg(long, default_value_t = DEFAULT_GAS_BUDGET)]
    gas_budget: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = repo_root()?;

    match cli.command {
        Commands::CreateRegistry(args) => create_registry(&root, args)?,
        Commands::Clippy => run_clippy(&root)?,
        Commands::Test => run_tests(&root)?,
    }

    Ok(())
}

fn repo_root() -> Result<PathBuf> {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| anyhow!("xtask has no parent directory"))
}

fn create_registry(root: &Path, args: RegistryArgs) -> Result<()> {
    let network = args.network.target(args.rpc_url.clone());
    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    let registry = runtime.block_on(submit_create_registry(&args, &network))?;
    println!("Created registry {registry} on {network}");

    let store = DeploymentStore::in_root(root.join(DEPLOYMENTS_ROOT), network.deployment_env())
        .map_err(|err| anyhow!("opening deployments store: {err:?}"))?;
    store
        .append(DeploymentRecord::new(
            args.package_id.clone(),
            Some(registry.to_string()),
            network.url(),
        ))
        .map_err(|err| anyhow!("recording deployment: {err:?}"))?;
    println!("Recorded deployment in {}", store.path().display());
    Ok(())
}

async fn submit_create_registry(args: &RegistryArgs, network: &NetworkTarget) -> Result<ObjectId> {
    let signer = Arc::new(SuiCliSigner::new(&args.sui_bin));
    let sender: Address = match &args.address {
        Some(raw) => raw.parse::<Address>().context("parsing --address")?,
        None => signer
            .active_address()
            .await
            .context("reading the wallet's active address")?,
    };
    let ledger: Arc<dyn Ledger> = Arc::new(SuiRpcClient::new(network.url())?);
    let builder = TxBuilder::new(&args.package_id, DEFAULT_MODULE, CLOCK_OBJECT_ID)
        .context("parsing --package-id")?;
    let executor = Executor::new(ledger, signer, args.gas_budget);

    println!("Submitting create_registry as {sender}");
    let outcome = executor
        .execute(builder.create_registry(), &sender)
        .await
        .context("create_registry failed")?;
    ExtractorChain::created_registry(builder.module())
        .extract(&outcome)
        .ok_or_else(|| {
            anyhow!(
                "could not find the created registry; inspect transaction {}",
                outcome.digest
            )
        })
}

fn run_clippy(root: &Path) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("clippy")
        .arg("--workspace")
        .arg("--all-targets")
        .arg("--all-features")
        .arg("--")
        .arg("-D")
        .arg("warnings")
        .current_dir(root);
    run_command(cmd, "cargo clippy")?;
    Ok(())
}

fn run_tests(root: &Path) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("test").arg("--workspace").current_dir(root);
    run_command(cmd, "cargo test --workspace")?;
    Ok(())
}

fn run_command(mut cmd: Command, label: &str) -> Result<()> {
    println!("Running: {}", label);
    let status = cmd
        .status()
        .with_context(|| format!("failed to run {label}"))?;
    ensure!(status.success(), "{label} failed with status {status}");
    Ok(())
}
