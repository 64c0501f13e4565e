//! The address registry: deployment records persisted per network.
//!
//! Each network gets a directory under the deployments root holding one
//! `<Name>.json` file per deployed contract and a `.chainId` marker. Records are
//! written after every successful deployment and read back by later steps.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use alloy::primitives::Address;
use tracing::debug;

use crate::{
    constants::{CHAIN_ID_FILE, JSON_EXTENSION},
    errors::ScriptError,
    types::DeployRecord,
};

/// The deployment records of a single network
#[derive(Debug)]
pub struct AddressRegistry {
    /// The network's deployments directory
    dir: PathBuf,
    /// The records, keyed by contract name
    records: BTreeMap<String, DeployRecord>,
}

impl AddressRegistry {
    /// Open the registry for `network` under `root`, creating it if needed.
    ///
    /// Fails if the directory was populated on a different chain.
    pub fn open(root: &Path, network: &str, chain_id: u64) -> Result<Self, ScriptError> {
        let dir = root.join(network);
        fs::create_dir_all(&dir).map_err(|e| ScriptError::WriteDeployments(e.to_string()))?;

        let chain_id_path = dir.join(CHAIN_ID_FILE);
        if chain_id_path.exists() {
            check_chain_id(&chain_id_path, chain_id)?;
        } else {
            fs::write(&chain_id_path, chain_id.to_string())
                .map_err(|e| ScriptError::WriteDeployments(e.to_string()))?;
        }

        let records = load_records(&dir)?;
        Ok(Self { dir, records })
    }

    /// Open the registry for `network` without touching the filesystem.
    ///
    /// A network that was never deployed to has no records.
    pub fn open_read_only(root: &Path, network: &str, chain_id: u64) -> Result<Self, ScriptError> {
        let dir = root.join(network);
        if !dir.is_dir() {
            return Ok(Self {
                dir,
                records: BTreeMap::new(),
            });
        }

        let chain_id_path = dir.join(CHAIN_ID_FILE);
        if chain_id_path.exists() {
            check_chain_id(&chain_id_path, chain_id)?;
        }

        let records = load_records(&dir)?;
        Ok(Self { dir, records })
    }

    /// Get the record for `name`, needed by `step`.
    ///
    /// A missing record means the steps ran out of dependency order.
    pub fn get(&self, step: &str, name: &str) -> Result<&DeployRecord, ScriptError> {
        self.records
            .get(name)
            .ok_or_else(|| ScriptError::missing_dependency(step, name))
    }

    /// Get the address of `name`, needed by `step`
    pub fn address_of(&self, step: &str, name: &str) -> Result<Address, ScriptError> {
        self.get(step, name).map(|record| record.address)
    }

    /// Get the record for `name` if it exists
    pub fn find(&self, name: &str) -> Option<&DeployRecord> {
        self.records.get(name)
    }

    /// Whether a record exists for `name`
    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    /// Persist the record for `name`, replacing any previous one
    pub fn save(&mut self, name: &str, record: DeployRecord) -> Result<(), ScriptError> {
        let path = self.record_path(name);
        let contents = serde_json::to_string_pretty(&record)
            .map_err(|e| ScriptError::WriteDeployments(e.to_string()))?;

        // Write through a temporary file so an interrupted run never leaves a truncated record
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, contents).map_err(|e| ScriptError::WriteDeployments(e.to_string()))?;
        fs::rename(&tmp_path, &path).map_err(|e| ScriptError::WriteDeployments(e.to_string()))?;

        self.records.insert(name.to_string(), record);
        Ok(())
    }

    /// All records, ordered by name
    pub fn records(&self) -> impl Iterator<Item = (&str, &DeployRecord)> {
        self.records.iter().map(|(name, record)| (name.as_str(), record))
    }

    /// The number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the registry holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The file a record is stored in
    fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, JSON_EXTENSION))
    }
}

/// Check the chain a deployments directory was populated on
fn check_chain_id(path: &Path, chain_id: u64) -> Result<(), ScriptError> {
    let recorded = fs::read_to_string(path)
        .map_err(|e| ScriptError::ReadDeployments(e.to_string()))?
        .trim()
        .parse::<u64>()
        .map_err(|e| ScriptError::ReadDeployments(e.to_string()))?;
    if recorded != chain_id {
        return Err(ScriptError::NetworkMismatch {
            expected: chain_id,
            actual: recorded,
        });
    }
    Ok(())
}

/// Read every `<Name>.json` record in `dir`
fn load_records(dir: &Path) -> Result<BTreeMap<String, DeployRecord>, ScriptError> {
    let mut records = BTreeMap::new();
    let entries = fs::read_dir(dir).map_err(|e| ScriptError::ReadDeployments(e.to_string()))?;
    for entry in entries {
        let path = entry
            .map_err(|e| ScriptError::ReadDeployments(e.to_string()))?
            .path();
        if !path.extension().is_some_and(|ext| ext == JSON_EXTENSION) {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let contents =
            fs::read_to_string(&path).map_err(|e| ScriptError::ReadDeployments(e.to_string()))?;
        let record: DeployRecord = serde_json::from_str(&contents).map_err(|e| {
            ScriptError::ReadDeployments(format!("{}: {}", path.display(), e))
        })?;
        records.insert(name.to_string(), record);
    }

    debug!("Loaded {} records from {}", records.len(), dir.display());
    Ok(records)
}
