//! The deploy sequencer: runs the steps of a plan against a chain, recording
//! every deployment in the address registry.
//!
//! Steps run strictly in order and every transaction is awaited to its receipt
//! before the next one is sent. A failure aborts the run but leaves every
//! record written so far intact, so a re-run resumes where it stopped.

use alloy::{
    dyn_abi::DynSolValue,
    json_abi::JsonAbi,
    primitives::{keccak256, Address, Bytes, B256},
    sol_types::SolCall,
};
use tracing::{debug, info};

use crate::{
    artifacts::{address_values, ArtifactStore},
    catalog::{implementation_record, proxy_record, DeployStep, Initializer},
    client::ChainClient,
    constants::{PROXY_CONTRACT_NAME, PROXY_IMPLEMENTATION_STORAGE_SLOT},
    errors::ScriptError,
    plan::DeployPlan,
    registry::AddressRegistry,
    solidity::upgradeToCall,
    types::{
        AddressBook, DeployArg, DeployRecord, ExecutedCall, LibraryLinks, ProxyInstance,
    },
    utils::address_from_slot,
};

/// What a step did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// The contract was deployed
    Deployed(DeployRecord),
    /// The recorded deployment is current, nothing was sent
    Unchanged(DeployRecord),
    /// A new proxy was constructed, running the initializer
    ProxyDeployed(ProxyInstance),
    /// An existing proxy was pointed at a new implementation
    ProxyUpgraded(ProxyInstance),
    /// The proxy and its implementation are current, nothing was sent
    ProxyUnchanged(ProxyInstance),
}

impl StepOutcome {
    /// Whether the step sent any transaction
    pub fn changed(&self) -> bool {
        !matches!(
            self,
            StepOutcome::Unchanged(_) | StepOutcome::ProxyUnchanged(_)
        )
    }

    /// The address dependents of the step see
    pub fn address(&self) -> Address {
        match self {
            StepOutcome::Deployed(record) | StepOutcome::Unchanged(record) => record.address,
            StepOutcome::ProxyDeployed(proxy)
            | StepOutcome::ProxyUpgraded(proxy)
            | StepOutcome::ProxyUnchanged(proxy) => proxy.proxy_address,
        }
    }
}

/// The outcome of a single step
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepReport {
    /// The step's contract name
    pub name: &'static str,
    /// What the step did
    pub outcome: StepOutcome,
}

/// A contract deployment resolved to concrete inputs
struct ResolvedDeployment {
    /// The creation code: linked bytecode and encoded constructor arguments
    creation_code: Bytes,
    /// The constructor's address arguments
    args: Vec<Address>,
    /// The linked libraries
    libraries: LibraryLinks,
    /// The contract ABI
    abi: JsonAbi,
}

/// Runs deploy plans against a chain
pub struct Sequencer<'a, C: ChainClient> {
    /// The chain to deploy to
    client: &'a C,
    /// The registry records are read from and written to
    registry: &'a mut AddressRegistry,
    /// The compiled contracts
    artifacts: &'a ArtifactStore,
    /// The external addresses
    book: &'a AddressBook,
}

impl<'a, C: ChainClient> Sequencer<'a, C> {
    /// Create a sequencer
    pub fn new(
        client: &'a C,
        registry: &'a mut AddressRegistry,
        artifacts: &'a ArtifactStore,
        book: &'a AddressBook,
    ) -> Self {
        Self {
            client,
            registry,
            artifacts,
            book,
        }
    }

    /// Run every step of the plan in order, stopping at the first failure
    pub async fn run(&mut self, plan: &DeployPlan<'_>) -> Result<Vec<StepReport>, ScriptError> {
        let mut reports = Vec::new();
        for script in plan.scripts() {
            info!("Running {}", script.id);
            for step in &script.steps {
                let outcome = self.run_step(step).await?;
                reports.push(StepReport {
                    name: step.name,
                    outcome,
                });
            }
        }

        Ok(reports)
    }

    /// Run a single step
    pub async fn run_step(&mut self, step: &DeployStep) -> Result<StepOutcome, ScriptError> {
        match &step.proxy {
            None => {
                let (record, deployed) = self.deploy_contract(step.name, step).await?;
                Ok(if deployed {
                    StepOutcome::Deployed(record)
                } else {
                    StepOutcome::Unchanged(record)
                })
            }
            Some(initializer) => self.deploy_proxied(step, initializer).await,
        }
    }

    // -----------
    // | HELPERS |
    // -----------

    /// Resolve an address argument
    fn resolve_arg(&self, step: &str, arg: &DeployArg) -> Result<Address, ScriptError> {
        match arg {
            DeployArg::Deployment(name) => self.registry.address_of(step, name),
            DeployArg::External(contract) => self.book.resolve(*contract).ok_or_else(|| {
                ScriptError::Config(format!("`{}` needs the {} address", step, contract))
            }),
        }
    }

    /// Resolve every address argument
    fn resolve_args(&self, step: &str, args: &[DeployArg]) -> Result<Vec<Address>, ScriptError> {
        args.iter().map(|arg| self.resolve_arg(step, arg)).collect()
    }

    /// Resolve a step's artifact, libraries and constructor arguments into creation code
    fn resolve_deployment(&self, step: &DeployStep) -> Result<ResolvedDeployment, ScriptError> {
        let libraries = step
            .libraries
            .iter()
            .map(|library| {
                self.registry
                    .address_of(step.name, library)
                    .map(|address| (library.to_string(), address))
            })
            .collect::<Result<LibraryLinks, _>>()?;
        let args = self.resolve_args(step.name, &step.args)?;

        let artifact = self.artifacts.load(step.name)?;
        let creation_code = artifact.creation_code(&libraries, &address_values(&args))?;

        Ok(ResolvedDeployment {
            creation_code,
            args,
            libraries,
            abi: artifact.abi,
        })
    }

    /// Whether a contract exists at `address`
    async fn has_code(&self, address: Address) -> Result<bool, ScriptError> {
        Ok(!self.client.code_at(address).await?.is_empty())
    }

    /// Deploy the step's contract under `record_name`, unless the recorded
    /// deployment has the same creation code and still exists.
    ///
    /// Returns the record and whether a deployment was sent.
    async fn deploy_contract(
        &mut self,
        record_name: &str,
        step: &DeployStep,
    ) -> Result<(DeployRecord, bool), ScriptError> {
        let resolved = self.resolve_deployment(step)?;
        let bytecode_hash = keccak256(&resolved.creation_code);

        if let Some(record) = self.registry.find(record_name) {
            if record.bytecode_hash == bytecode_hash && self.has_code(record.address).await? {
                info!("Reusing {} at {:#x}", record_name, record.address);
                return Ok((record.clone(), false));
            }
            debug!("{} changed since its last deployment", record_name);
        }

        let outcome = self.client.deploy(resolved.creation_code).await?;
        let address = outcome.contract_address.ok_or_else(|| {
            ScriptError::TransactionFailure(format!("no contract created for {}", record_name))
        })?;

        let record = DeployRecord {
            address,
            abi: resolved.abi,
            transaction_hash: outcome.tx_hash,
            args: resolved.args,
            bytecode_hash,
            libraries: resolved.libraries,
            implementation: None,
            execute: None,
        };
        self.registry.save(record_name, record.clone())?;

        info!("Deployed {} at {:#x}", record_name, address);
        Ok((record, true))
    }

    /// Deploy an upgradeable contract: its implementation, then a proxy
    /// constructed with the initializer call, or an upgrade of the existing proxy
    async fn deploy_proxied(
        &mut self,
        step: &DeployStep,
        initializer: &Initializer,
    ) -> Result<StepOutcome, ScriptError> {
        let impl_name = implementation_record(step.name);
        let proxy_name = proxy_record(step.name);

        let (implementation, _) = self.deploy_contract(&impl_name, step).await?;

        let existing_proxy = match self.registry.find(&proxy_name).cloned() {
            Some(record) if self.has_code(record.address).await? => Some(record),
            Some(record) => {
                info!(
                    "Recorded {} at {:#x} has no code, deploying a new one",
                    proxy_name, record.address
                );
                None
            }
            None => None,
        };

        match existing_proxy {
            Some(proxy) => {
                self.reuse_proxy(step, &proxy_name, proxy, &implementation)
                    .await
            }
            None => {
                self.construct_proxy(step, initializer, &proxy_name, &implementation)
                    .await
            }
        }
    }

    /// Construct a new proxy pointed at `implementation`, running the initializer
    async fn construct_proxy(
        &mut self,
        step: &DeployStep,
        initializer: &Initializer,
        proxy_name: &str,
        implementation: &DeployRecord,
    ) -> Result<StepOutcome, ScriptError> {
        let init_args = self.resolve_args(step.name, &initializer.args)?;
        let impl_artifact = self.artifacts.load(step.name)?;
        let init_calldata =
            impl_artifact.call_calldata(initializer.method, &address_values(&init_args))?;

        let owner = self.client.deployer();
        let proxy_artifact = self.artifacts.load(PROXY_CONTRACT_NAME)?;
        let creation_code = proxy_artifact.creation_code(
            &LibraryLinks::new(),
            &[
                DynSolValue::Address(implementation.address),
                DynSolValue::Address(owner),
                DynSolValue::Bytes(init_calldata),
            ],
        )?;
        let proxy_hash = keccak256(&creation_code);

        let outcome = self.client.deploy(creation_code).await?;
        let proxy_address = outcome.contract_address.ok_or_else(|| {
            ScriptError::TransactionFailure(format!("no contract created for {}", proxy_name))
        })?;

        self.registry.save(
            proxy_name,
            DeployRecord {
                address: proxy_address,
                abi: proxy_artifact.abi,
                transaction_hash: outcome.tx_hash,
                args: vec![implementation.address, owner],
                bytecode_hash: proxy_hash,
                libraries: LibraryLinks::new(),
                implementation: Some(implementation.address),
                execute: Some(ExecutedCall {
                    method_name: initializer.method.to_string(),
                    args: init_args.clone(),
                }),
            },
        )?;
        self.registry.save(
            step.name,
            DeployRecord {
                address: proxy_address,
                abi: implementation.abi.clone(),
                transaction_hash: outcome.tx_hash,
                args: init_args,
                bytecode_hash: implementation.bytecode_hash,
                libraries: implementation.libraries.clone(),
                implementation: Some(implementation.address),
                execute: None,
            },
        )?;

        info!(
            "Deployed {} proxy at {:#x} -> {:#x}, initialized by {}",
            step.name, proxy_address, implementation.address, initializer.method
        );
        Ok(StepOutcome::ProxyDeployed(ProxyInstance {
            proxy_address,
            implementation_address: implementation.address,
            initializer_called: true,
        }))
    }

    /// Bring an existing proxy up to date with `implementation`. The
    /// initializer is never called again.
    async fn reuse_proxy(
        &mut self,
        step: &DeployStep,
        proxy_name: &str,
        proxy: DeployRecord,
        implementation: &DeployRecord,
    ) -> Result<StepOutcome, ScriptError> {
        let slot = self
            .client
            .storage_at(proxy.address, PROXY_IMPLEMENTATION_STORAGE_SLOT)
            .await?;
        let current = address_from_slot(slot);

        let instance = ProxyInstance {
            proxy_address: proxy.address,
            implementation_address: implementation.address,
            initializer_called: false,
        };

        if current == implementation.address {
            // The step record may be missing if a previous run stopped right after the proxy
            let up_to_date = self
                .registry
                .find(step.name)
                .is_some_and(|record| record.implementation == Some(current));
            if !up_to_date {
                let record = self.facade_record(
                    step,
                    &proxy,
                    implementation,
                    proxy.transaction_hash,
                )?;
                self.registry.save(step.name, record)?;
            }

            info!("Reusing {} proxy at {:#x}", step.name, proxy.address);
            return Ok(StepOutcome::ProxyUnchanged(instance));
        }

        // The proxy must still point at the implementation we last installed
        let expected = self
            .registry
            .find(step.name)
            .and_then(|record| record.implementation)
            .or(proxy.implementation);
        if expected != Some(current) {
            return Err(ScriptError::ProxyState(format!(
                "{} at {:#x} points at {:#x}, but the registry expects {}",
                proxy_name,
                proxy.address,
                current,
                expected.map_or_else(|| "nothing".to_string(), |a| format!("{:#x}", a)),
            )));
        }

        let calldata = upgradeToCall {
            newImplementation: implementation.address,
        }
        .abi_encode();
        let outcome = self.client.send(proxy.address, calldata.into()).await?;

        let mut upgraded = proxy.clone();
        upgraded.implementation = Some(implementation.address);
        self.registry.save(proxy_name, upgraded)?;
        let record =
            self.facade_record(step, &proxy, implementation, outcome.tx_hash)?;
        self.registry.save(step.name, record)?;

        info!(
            "Upgraded {} proxy at {:#x}: {:#x} -> {:#x}",
            step.name, proxy.address, current, implementation.address
        );
        Ok(StepOutcome::ProxyUpgraded(instance))
    }

    /// The record dependents read for a proxied contract: the proxy's address
    /// with the implementation's interface
    fn facade_record(
        &self,
        step: &DeployStep,
        proxy: &DeployRecord,
        implementation: &DeployRecord,
        transaction_hash: B256,
    ) -> Result<DeployRecord, ScriptError> {
        Ok(DeployRecord {
            address: proxy.address,
            abi: implementation.abi.clone(),
            transaction_hash,
            args: self.initializer_args(step, proxy)?,
            bytecode_hash: implementation.bytecode_hash,
            libraries: implementation.libraries.clone(),
            implementation: Some(implementation.address),
            execute: None,
        })
    }

    /// The arguments the proxy's initializer actually ran with. These never
    /// change after construction, whatever the address book now holds.
    fn initializer_args(
        &self,
        step: &DeployStep,
        proxy: &DeployRecord,
    ) -> Result<Vec<Address>, ScriptError> {
        if let Some(call) = &proxy.execute {
            return Ok(call.args.clone());
        }

        // Proxy records written without the executed call
        self.registry
            .find(step.name)
            .filter(|record| record.address == proxy.address)
            .map(|record| record.args.clone())
            .ok_or_else(|| {
                ScriptError::ProxyState(format!(
                    "the initializer arguments of {} at {:#x} are not recorded",
                    step.name, proxy.address
                ))
            })
    }
}
