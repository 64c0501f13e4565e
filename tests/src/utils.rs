use std::sync::Once;

use alloy::primitives::{address, Address};
use deploy_scripts::{
    commands::run_deployment,
    errors::ScriptError,
    registry::AddressRegistry,
    sequencer::{StepOutcome, StepReport},
    types::{AddressBook, DeployRecord},
};
use eyre::{eyre, Result};
use tempfile::TempDir;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{
    fixtures::{proxy_bytecode, Fixtures},
    mock_chain::{MockChain, MOCK_CHAIN_ID},
};

/// The network name test deployments are recorded under
pub const TEST_NETWORK: &str = "localhost";

/// The filler identity used by tests deploying markets
pub const TEST_FILLER: Address = address!("f1f1f1f1f1f1f1f1f1f1f1f1f1f1f1f1f1f1f1f1");

static TRACING_INIT: Once = Once::new();

// ---------------------
// | META TEST HELPERS |
// ---------------------

/// A mock chain with fixture artifacts and an empty registry
pub struct TestEnv {
    /// The chain deployments are sent to
    pub chain: MockChain,
    /// The network's deployment records
    pub registry: AddressRegistry,
    /// The compiled contracts
    pub fixtures: Fixtures,
    /// The external addresses
    pub book: AddressBook,
    /// The deployments root, kept alive for the registry
    deployments: TempDir,
}

impl TestEnv {
    /// Set up a fresh environment
    pub fn new() -> Result<Self> {
        TRACING_INIT.call_once(|| {
            fmt().with_env_filter(EnvFilter::from_default_env()).init();
        });

        let deployments = tempfile::tempdir()?;
        let registry = AddressRegistry::open(deployments.path(), TEST_NETWORK, MOCK_CHAIN_ID)?;
        debug!("Deployments at {}", deployments.path().display());

        Ok(Self {
            chain: MockChain::new(proxy_bytecode()),
            registry,
            fixtures: Fixtures::new()?,
            book: AddressBook::default().with_filler(Some(TEST_FILLER)),
            deployments,
        })
    }

    /// Deploy the scripts matching `tags`
    pub async fn deploy(&mut self, tags: &[&str]) -> Result<Vec<StepReport>, ScriptError> {
        let tags: Vec<String> = tags.iter().map(|tag| tag.to_string()).collect();
        let artifacts = self.fixtures.store();
        run_deployment(&self.chain, &mut self.registry, &artifacts, &self.book, &tags).await
    }

    /// Reload the registry from disk
    pub fn reopen_registry(&mut self) -> Result<()> {
        self.registry = AddressRegistry::open(self.deployments.path(), TEST_NETWORK, MOCK_CHAIN_ID)?;
        Ok(())
    }

    /// The record for `name`
    pub fn record(&self, name: &str) -> Result<&DeployRecord> {
        self.registry
            .find(name)
            .ok_or_else(|| eyre!("no record for {}", name))
    }
}

// ----------------
// | MISC HELPERS |
// ----------------

/// The names of the steps that sent transactions
pub fn changed_steps(reports: &[StepReport]) -> Vec<&'static str> {
    reports
        .iter()
        .filter(|report| report.outcome.changed())
        .map(|report| report.name)
        .collect()
}

/// The outcome of the step named `name`
pub fn outcome_of<'a>(reports: &'a [StepReport], name: &str) -> Result<&'a StepOutcome> {
    reports
        .iter()
        .find(|report| report.name == name)
        .map(|report| &report.outcome)
        .ok_or_else(|| eyre!("no report for {}", name))
}

/// Whether `haystack` contains `needle` as a contiguous byte sequence
pub fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}
