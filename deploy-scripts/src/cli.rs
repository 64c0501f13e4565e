//! Definitions of CLI arguments and commands for deploy scripts

use std::path::PathBuf;

use alloy::primitives::Address;
use clap::{Args, Parser, Subcommand};

use crate::{
    commands::{deploy, events, plan, show, verify},
    constants::{DEFAULT_ARTIFACTS_DIR, DEFAULT_DEPLOYMENTS_DIR},
    errors::ScriptError,
    network::Network,
};

/// Deploys the PredyPool protocol
#[derive(Parser)]
#[command(name = "predy-deploy", version)]
pub struct Cli {
    /// Arguments shared by every command
    #[command(flatten)]
    pub env: EnvArgs,

    /// The command to run
    #[command(subcommand)]
    pub command: Command,
}

/// The network and directories a command operates on
#[derive(Args, Clone, Debug)]
pub struct EnvArgs {
    /// The network to operate on
    #[arg(short, long, env = "NETWORK", default_value = "localhost", global = true)]
    pub network: Network,

    /// The directory holding the per-network deployment records
    #[arg(long, default_value = DEFAULT_DEPLOYMENTS_DIR, global = true)]
    pub deployments: PathBuf,

    /// The directory holding the compiled contract artifacts
    #[arg(long, default_value = DEFAULT_ARTIFACTS_DIR, global = true)]
    pub artifacts: PathBuf,

    /// Network RPC URL, overriding the network's default endpoint
    #[arg(long, env = "RPC_URL", global = true)]
    pub rpc_url: Option<String>,

    /// Private key of the deployer
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true, global = true)]
    pub private_key: Option<String>,

    /// Infura project key, used by networks served through Infura
    #[arg(long, env = "INFURA_API_KEY", hide_env_values = true, global = true)]
    pub infura_key: Option<String>,
}

/// The deploy script commands
#[derive(Subcommand)]
pub enum Command {
    /// Deploy every script matching the given tags
    Deploy(DeployArgs),
    /// Print the scripts a deployment would run, without sending anything
    Plan(PlanArgs),
    /// Print the deployment records of the network
    Show(ShowArgs),
    /// Print the merged event ABI of the protocol contracts
    Events(EventsArgs),
    /// Verify the network's deployments on its block explorer
    Verify(VerifyArgs),
}

/// Run the deploy scripts.
///
/// Scripts run in catalog order; a script runs if any of its tags is selected.
/// Steps whose recorded deployment is current are skipped, so re-running a
/// deployment only sends what changed.
#[derive(Args)]
pub struct DeployArgs {
    /// The tags to deploy, comma separated. Deploys everything if omitted
    #[arg(short, long, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// The address allowed to fill market orders
    #[arg(long, env = "FILLER_ADDRESS")]
    pub filler: Option<Address>,

    /// Skip the confirmation prompt on production networks
    #[arg(short, long)]
    pub yes: bool,
}

/// Resolve and validate a deployment against the network's records
#[derive(Args)]
pub struct PlanArgs {
    /// The tags to deploy, comma separated. Selects everything if omitted
    #[arg(short, long, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// The address allowed to fill market orders
    #[arg(long, env = "FILLER_ADDRESS")]
    pub filler: Option<Address>,

    /// Also print the dependency edges of the selected steps
    #[arg(long)]
    pub graph: bool,
}

/// Show deployment records
#[derive(Args)]
pub struct ShowArgs {
    /// Print the full record of this contract instead of the address list
    pub name: Option<String>,
}

/// Export the event ABI for indexers
#[derive(Args)]
pub struct EventsArgs {
    /// The contracts whose events are exported, comma separated.
    /// Defaults to the protocol's event-emitting contracts
    #[arg(short, long, value_delimiter = ',')]
    pub contracts: Vec<String>,
}

/// Submit the source of deployed contracts to an Etherscan-compatible explorer.
///
/// Proxied contracts are verified through their implementation and proxy records.
#[derive(Args)]
pub struct VerifyArgs {
    /// The records to verify. Verifies every record of the network if omitted
    pub names: Vec<String>,

    /// The block explorer API key
    #[arg(long, env = "ETHERSCAN_API_KEY", hide_env_values = true)]
    pub etherscan_key: Option<String>,

    /// The explorer API URL, overriding the network's default
    #[arg(long, env = "EXPLORER_API_URL")]
    pub explorer_url: Option<String>,

    /// The project root the compiler's source paths are relative to
    #[arg(long, default_value = ".")]
    pub sources: PathBuf,
}

impl Command {
    /// Run the command
    pub async fn run(self, env: EnvArgs) -> Result<(), ScriptError> {
        match self {
            Command::Deploy(args) => deploy(args, &env).await,
            Command::Plan(args) => plan(args, &env),
            Command::Show(args) => show(args, &env),
            Command::Events(args) => events(args, &env),
            Command::Verify(args) => verify(args, &env).await,
        }
    }
}
