//! Definitions of errors that can occur during deployment of the contracts

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

/// Errors that can occur during the execution of the deploy scripts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// A step needs a deployment record that does not exist yet,
    /// i.e. the steps were run out of dependency order
    MissingDependency {
        /// The name of the step that needs the record
        step: String,
        /// The name of the missing record
        dependency: String,
    },
    /// A transaction reverted or could not be confirmed
    TransactionFailure(String),
    /// Error reading the deployments directory
    ReadDeployments(String),
    /// Error writing the deployments directory
    WriteDeployments(String),
    /// Error parsing a Solidity compilation artifact
    ArtifactParsing(String),
    /// Error substituting library addresses into contract bytecode
    LibraryLinking(String),
    /// Error constructing calldata for a constructor or contract method
    CalldataConstruction(String),
    /// Error initializing the RPC client
    ClientInitialization(String),
    /// The connected chain is not the one the deployments were made on
    NetworkMismatch {
        /// The chain ID the run expects
        expected: u64,
        /// The chain ID that was found
        actual: u64,
    },
    /// Invalid or incomplete configuration
    Config(String),
    /// On-chain proxy state disagrees with the deployment records
    ProxyState(String),
    /// A block explorer rejected or failed a source verification
    Verification(String),
    /// The operator declined to continue
    Aborted,
}

impl ScriptError {
    /// Shorthand for a [`ScriptError::MissingDependency`]
    pub fn missing_dependency(step: &str, dependency: &str) -> Self {
        ScriptError::MissingDependency {
            step: step.to_string(),
            dependency: dependency.to_string(),
        }
    }
}

impl Display for ScriptError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::MissingDependency { step, dependency } => write!(
                f,
                "`{}` depends on `{}`, which has not been deployed on this network",
                step, dependency
            ),
            ScriptError::TransactionFailure(s) => write!(f, "transaction failed: {}", s),
            ScriptError::ReadDeployments(s) => write!(f, "error reading deployments: {}", s),
            ScriptError::WriteDeployments(s) => write!(f, "error writing deployments: {}", s),
            ScriptError::ArtifactParsing(s) => write!(f, "error parsing artifact: {}", s),
            ScriptError::LibraryLinking(s) => write!(f, "error linking libraries: {}", s),
            ScriptError::CalldataConstruction(s) => write!(f, "error constructing calldata: {}", s),
            ScriptError::ClientInitialization(s) => write!(f, "error initializing client: {}", s),
            ScriptError::NetworkMismatch { expected, actual } => write!(
                f,
                "chain ID mismatch: expected {}, connected to {}",
                expected, actual
            ),
            ScriptError::Config(s) => write!(f, "invalid configuration: {}", s),
            ScriptError::ProxyState(s) => write!(f, "unexpected proxy state: {}", s),
            ScriptError::Verification(s) => write!(f, "verification failed: {}", s),
            ScriptError::Aborted => write!(f, "deployment aborted by operator"),
        }
    }
}

impl Error for ScriptError {}
