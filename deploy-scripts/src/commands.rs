//! Implementations of the deploy script commands

use alloy::primitives::Address;
use itertools::Itertools;
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    artifacts::ArtifactStore,
    catalog::Catalog,
    cli::{DeployArgs, EnvArgs, EventsArgs, PlanArgs, ShowArgs, VerifyArgs},
    client::{ChainClient, RpcClient},
    constants::{EVENT_ABI_CONTRACTS, NUM_DEPLOY_CONFIRMATIONS},
    errors::ScriptError,
    network::NetworkProfile,
    plan::DeployPlan,
    registry::AddressRegistry,
    sequencer::{Sequencer, StepOutcome, StepReport},
    types::{AddressBook, ExternalContract},
    utils::prompt_for_confirmation,
    verify::{ExplorerClient, RequestBuilder},
};

/// Resolve the plan for `tags` and run it to completion.
///
/// Nothing is sent if the plan does not resolve. Otherwise the steps run in
/// order until one fails; every record written before the failure is kept.
pub async fn run_deployment<C: ChainClient>(
    client: &C,
    registry: &mut AddressRegistry,
    artifacts: &ArtifactStore,
    book: &AddressBook,
    tags: &[String],
) -> Result<Vec<StepReport>, ScriptError> {
    let catalog = Catalog::protocol()?;
    let plan = DeployPlan::resolve(&catalog, tags, registry, book)?;
    Sequencer::new(client, registry, artifacts, book)
        .run(&plan)
        .await
}

/// Deploy the scripts selected by `args.tags` to the configured network
pub async fn deploy(args: DeployArgs, env: &EnvArgs) -> Result<(), ScriptError> {
    let profile = NetworkProfile::resolve(
        env.network,
        env.rpc_url.clone(),
        env.infura_key.as_deref(),
        env.private_key.clone(),
    )?;
    let book = AddressBook::default().with_filler(args.filler);
    log_address_book(&book);

    let client = RpcClient::connect(&profile, NUM_DEPLOY_CONFIRMATIONS).await?;
    let chain_id = client.chain_id().await?;
    if chain_id != profile.chain_id {
        return Err(ScriptError::NetworkMismatch {
            expected: profile.chain_id,
            actual: chain_id,
        });
    }

    let mut registry =
        AddressRegistry::open(&env.deployments, &profile.network.to_string(), chain_id)?;
    let artifacts = ArtifactStore::new(&env.artifacts);

    // Validate the selection before asking for confirmation
    let catalog = Catalog::protocol()?;
    let plan = DeployPlan::resolve(&catalog, &args.tags, &registry, &book)?;
    if plan.is_empty() {
        info!("No scripts selected, nothing to deploy");
        return Ok(());
    }
    print_plan(&plan);

    if profile.network.is_production() && !args.yes {
        let prompt = format!(
            "Deploy to {} as {:#x}?",
            profile.network,
            client.deployer()
        );
        if !prompt_for_confirmation(&prompt)? {
            return Err(ScriptError::Aborted);
        }
    }

    let reports = run_deployment(&client, &mut registry, &artifacts, &book, &args.tags).await?;
    print_summary(&reports);
    Ok(())
}

/// Print the plan for `args.tags` against the network's records
pub fn plan(args: PlanArgs, env: &EnvArgs) -> Result<(), ScriptError> {
    let registry = AddressRegistry::open_read_only(
        &env.deployments,
        &env.network.to_string(),
        env.network.chain_id(),
    )?;
    let book = AddressBook::default().with_filler(args.filler);

    let catalog = Catalog::protocol()?;
    let plan = DeployPlan::resolve(&catalog, &args.tags, &registry, &book)?;
    print_plan(&plan);
    if args.graph {
        print_dependency_graph(&catalog, &plan);
    }
    Ok(())
}

/// Print the network's deployment records
pub fn show(args: ShowArgs, env: &EnvArgs) -> Result<(), ScriptError> {
    let registry = AddressRegistry::open_read_only(
        &env.deployments,
        &env.network.to_string(),
        env.network.chain_id(),
    )?;

    match args.name {
        Some(name) => {
            let record = registry.find(&name).ok_or_else(|| {
                ScriptError::Config(format!("no record for `{}` on {}", name, env.network))
            })?;
            let json = serde_json::to_string_pretty(record)
                .map_err(|e| ScriptError::ReadDeployments(e.to_string()))?;
            println!("{}", json);
        }
        None => {
            if registry.is_empty() {
                println!("No deployments on {}", env.network);
            }
            for (name, record) in registry.records() {
                match record.implementation {
                    Some(implementation) => println!(
                        "{:<32} {:#x} -> {:#x}",
                        name, record.address, implementation
                    ),
                    None => println!("{:<32} {:#x}", name, record.address),
                }
            }
        }
    }

    Ok(())
}

/// Print the merged event ABI of the selected contracts
pub fn events(args: EventsArgs, env: &EnvArgs) -> Result<(), ScriptError> {
    let contracts = if args.contracts.is_empty() {
        EVENT_ABI_CONTRACTS.iter().map(|c| c.to_string()).collect()
    } else {
        args.contracts
    };

    let events = event_abi(&ArtifactStore::new(&env.artifacts), &contracts)?;
    let json = serde_json::to_string_pretty(&Value::Array(events))
        .map_err(|e| ScriptError::ArtifactParsing(e.to_string()))?;
    println!("{}", json);
    Ok(())
}

/// The event entries of the given contracts' ABIs, merged.
///
/// Events declared identically by several contracts appear once.
pub fn event_abi(artifacts: &ArtifactStore, contracts: &[String]) -> Result<Vec<Value>, ScriptError> {
    let mut events = Vec::new();
    for contract in contracts {
        let artifact = artifacts.load(contract)?;
        let before = events.len();
        events.extend(artifact.event_items().cloned());
        if events.len() == before {
            warn!("{} declares no events", contract);
        }
    }

    Ok(events.into_iter().unique_by(|event| event.to_string()).collect())
}

/// Verify the network's deployment records on its block explorer.
///
/// Every record is attempted; the command fails if any of them could not be verified.
pub async fn verify(args: VerifyArgs, env: &EnvArgs) -> Result<(), ScriptError> {
    let api_url = args
        .explorer_url
        .as_deref()
        .or(env.network.explorer_api())
        .ok_or_else(|| {
            ScriptError::Config(format!(
                "network `{}` has no block explorer, pass --explorer-url",
                env.network
            ))
        })?;
    let api_key = args.etherscan_key.as_deref().ok_or_else(|| {
        ScriptError::Config("verification needs ETHERSCAN_API_KEY or --etherscan-key".to_string())
    })?;

    let registry = AddressRegistry::open_read_only(
        &env.deployments,
        &env.network.to_string(),
        env.network.chain_id(),
    )?;
    let names = if args.names.is_empty() {
        registry.records().map(|(name, _)| name.to_string()).collect()
    } else {
        args.names
    };

    let artifacts = ArtifactStore::new(&env.artifacts);
    let builder = RequestBuilder::new(&artifacts, &args.sources);
    let client = ExplorerClient::new(api_url, api_key)?;

    let mut failed = Vec::new();
    for name in &names {
        let record = registry.find(name).ok_or_else(|| {
            ScriptError::Config(format!("no record for `{}` on {}", name, env.network))
        })?;
        let Some(request) = builder.build(name, record)? else {
            info!("{} shares its address with its proxy record, skipping", name);
            continue;
        };

        info!("Verifying {} at {:#x}", name, record.address);
        if let Err(e) = client.verify(&request).await {
            warn!("Could not verify {}: {}", name, e);
            failed.push(name.as_str());
        }
    }

    if !failed.is_empty() {
        return Err(ScriptError::Verification(format!(
            "unverified: {}",
            failed.join(", ")
        )));
    }
    Ok(())
}

// -----------
// | HELPERS |
// -----------

/// Log the external addresses the deployment consumes
fn log_address_book(book: &AddressBook) {
    for contract in [
        ExternalContract::UniswapFactory,
        ExternalContract::SwapRouter,
        ExternalContract::QuoterV2,
        ExternalContract::Pyth,
        ExternalContract::Permit2,
        ExternalContract::Filler,
    ] {
        match book.resolve(contract) {
            Some(address) => info!("{}: {:#x}", contract, address),
            None => info!("{}: unset", contract),
        }
    }
}

/// Print the scripts and steps of a plan
fn print_plan(plan: &DeployPlan<'_>) {
    for script in plan.scripts() {
        println!("{} [{}]", script.id, script.tags.iter().join(", "));
        for step in &script.steps {
            let deps = step.dependencies().join(", ");
            let kind = if step.proxy.is_some() { " (proxy)" } else { "" };
            if deps.is_empty() {
                println!("  {}{}", step.name, kind);
            } else {
                println!("  {}{} <- {}", step.name, kind, deps);
            }
        }
    }
}

/// Print the dependency edges of the plan's steps
fn print_dependency_graph(catalog: &Catalog, plan: &DeployPlan<'_>) {
    let planned: Vec<&str> = plan.steps().map(|step| step.name).collect();
    for (step, dependency) in catalog
        .dependency_graph()
        .into_iter()
        .filter(|(step, _)| planned.contains(step))
    {
        println!("{} -> {}", step, dependency);
    }
}

/// Print the outcome of every step
fn print_summary(reports: &[StepReport]) {
    for report in reports {
        let address: Address = report.outcome.address();
        let status = match &report.outcome {
            StepOutcome::Deployed(_) => "deployed",
            StepOutcome::Unchanged(_) | StepOutcome::ProxyUnchanged(_) => "unchanged",
            StepOutcome::ProxyDeployed(_) => "proxy deployed, initialized",
            StepOutcome::ProxyUpgraded(_) => "proxy upgraded",
        };
        println!("{:<32} {:#x} {}", report.name, address, status);
    }

    let changed = reports.iter().filter(|r| r.outcome.changed()).count();
    info!("{} of {} steps sent transactions", changed, reports.len());
}
