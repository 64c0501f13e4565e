//! Source verification on Etherscan-compatible block explorers.
//!
//! A deployment record is verified by submitting the standard JSON compiler
//! input rebuilt from its artifact's metadata, together with the constructor
//! arguments the record was deployed with. Proxied contracts are verified
//! through their `_Implementation` and `_Proxy` records.

use std::{collections::BTreeMap, fs, path::Path};

use alloy::{dyn_abi::DynSolValue, hex, primitives::Address};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::{
    artifacts::{address_values, Artifact, ArtifactStore},
    constants::{
        EXPLORER_REQUEST_TIMEOUT, IMPLEMENTATION_SUFFIX, PROXY_CONTRACT_NAME, PROXY_SUFFIX,
        STANDARD_JSON_CODE_FORMAT, VERIFICATION_MAX_POLLS, VERIFICATION_POLL_INTERVAL,
    },
    errors::ScriptError,
    types::{DeployRecord, LibraryLinks},
};

/// The explorer's reply to a submission while the source is already verified
const ALREADY_VERIFIED: &str = "already verified";
/// The explorer's reply to a status check while the verification is queued
const PENDING_IN_QUEUE: &str = "pending in queue";

/// The compiler metadata embedded in an artifact
#[derive(Deserialize)]
struct CompilerMetadata {
    /// The compiler that produced the artifact
    compiler: CompilerInfo,
    /// The source language
    language: String,
    /// The compiler settings, including the compilation target
    settings: Map<String, Value>,
    /// Source path -> hashes and, with literal content, the source itself
    sources: BTreeMap<String, Value>,
}

/// The compiler section of the metadata
#[derive(Deserialize)]
struct CompilerInfo {
    /// The full compiler version, e.g. `0.8.19+commit.7dd6d404`
    version: String,
}

/// A source verification submission
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationRequest {
    /// The deployed contract
    pub contract_address: Address,
    /// The fully qualified contract name, `<source path>:<Name>`
    pub contract_name: String,
    /// The compiler version, e.g. `v0.8.19+commit.7dd6d404`
    pub compiler_version: String,
    /// The standard JSON compiler input
    pub standard_json: Value,
    /// The ABI-encoded constructor arguments
    pub constructor_arguments: Vec<u8>,
}

impl VerificationRequest {
    /// The form fields of a `verifysourcecode` submission
    pub fn form(&self, api_key: &str) -> Vec<(&'static str, String)> {
        vec![
            ("apikey", api_key.to_string()),
            ("module", "contract".to_string()),
            ("action", "verifysourcecode".to_string()),
            ("contractaddress", format!("{:#x}", self.contract_address)),
            ("sourceCode", self.standard_json.to_string()),
            ("codeformat", STANDARD_JSON_CODE_FORMAT.to_string()),
            ("contractname", self.contract_name.clone()),
            ("compilerversion", self.compiler_version.clone()),
            // Sic, the API's spelling
            ("constructorArguements", hex::encode(&self.constructor_arguments)),
        ]
    }
}

/// What a deployment record is, for verification purposes
#[derive(Debug, PartialEq, Eq)]
enum RecordKind<'a> {
    /// A contract deployed directly, or a proxied contract's implementation
    Contract(&'a str),
    /// The proxy in front of the named contract
    Proxy(&'a str),
    /// The record dependents read for a proxied contract, at the proxy's address
    Facade,
}

impl<'a> RecordKind<'a> {
    /// Classify the record named `name`
    fn of(name: &'a str, record: &DeployRecord) -> Self {
        if let Some(contract) = name.strip_suffix(PROXY_SUFFIX) {
            RecordKind::Proxy(contract)
        } else if let Some(contract) = name.strip_suffix(IMPLEMENTATION_SUFFIX) {
            RecordKind::Contract(contract)
        } else if record.implementation.is_some() {
            RecordKind::Facade
        } else {
            RecordKind::Contract(name)
        }
    }
}

/// Builds verification requests from deployment records and compiler output
pub struct RequestBuilder<'a> {
    /// The compiled contracts
    artifacts: &'a ArtifactStore,
    /// The project root the metadata's source paths are relative to
    sources_root: &'a Path,
}

impl<'a> RequestBuilder<'a> {
    /// Create a builder
    pub fn new(artifacts: &'a ArtifactStore, sources_root: &'a Path) -> Self {
        Self {
            artifacts,
            sources_root,
        }
    }

    /// The request verifying the record `name`, `None` for records that share
    /// their address with another record
    pub fn build(
        &self,
        name: &str,
        record: &DeployRecord,
    ) -> Result<Option<VerificationRequest>, ScriptError> {
        let (artifact, constructor_arguments) = match RecordKind::of(name, record) {
            RecordKind::Facade => return Ok(None),
            RecordKind::Contract(contract) => {
                let artifact = self.artifacts.load(contract)?;
                let args = artifact.constructor_calldata(&address_values(&record.args))?;
                (artifact, args)
            }
            RecordKind::Proxy(contract) => {
                let args = self.proxy_constructor_args(name, contract, record)?;
                (self.artifacts.load(PROXY_CONTRACT_NAME)?, args)
            }
        };

        let (contract_name, compiler_version, standard_json) =
            self.compiler_input(&artifact, &record.libraries)?;
        Ok(Some(VerificationRequest {
            contract_address: record.address,
            contract_name,
            compiler_version,
            standard_json,
            constructor_arguments,
        }))
    }

    // -----------
    // | HELPERS |
    // -----------

    /// Re-encode the `(implementation, owner, data)` the proxy was constructed with
    fn proxy_constructor_args(
        &self,
        name: &str,
        contract: &str,
        record: &DeployRecord,
    ) -> Result<Vec<u8>, ScriptError> {
        let [implementation, owner] = record.args.as_slice() else {
            return Err(ScriptError::Verification(format!(
                "{} does not record the proxy's implementation and owner",
                name
            )));
        };
        let call = record.execute.as_ref().ok_or_else(|| {
            ScriptError::Verification(format!("{} does not record its initializer call", name))
        })?;

        let init_calldata = self
            .artifacts
            .load(contract)?
            .call_calldata(&call.method_name, &address_values(&call.args))?;
        self.artifacts
            .load(PROXY_CONTRACT_NAME)?
            .constructor_calldata(&[
                DynSolValue::Address(*implementation),
                DynSolValue::Address(*owner),
                DynSolValue::Bytes(init_calldata),
            ])
    }

    /// Rebuild the standard JSON compiler input of an artifact.
    ///
    /// Returns the fully qualified contract name, the compiler version and the input.
    fn compiler_input(
        &self,
        artifact: &Artifact,
        libraries: &LibraryLinks,
    ) -> Result<(String, String, Value), ScriptError> {
        let metadata = artifact.metadata().ok_or_else(|| {
            ScriptError::ArtifactParsing(format!("{} carries no compiler metadata", artifact.name))
        })?;
        let CompilerMetadata {
            compiler,
            language,
            mut settings,
            sources,
        } = serde_json::from_value(metadata.clone())
            .map_err(|e| ScriptError::ArtifactParsing(format!("{}: {}", artifact.name, e)))?;

        let contract_name = match settings.remove("compilationTarget") {
            Some(Value::Object(target)) if target.len() == 1 => target
                .into_iter()
                .map(|(path, name)| format!("{}:{}", path, name.as_str().unwrap_or_default()))
                .collect(),
            _ => {
                return Err(ScriptError::ArtifactParsing(format!(
                    "{} has no single compilation target",
                    artifact.name
                )))
            }
        };

        // Metadata lists libraries linked at compile time, these are linked at deploy time
        settings.remove("libraries");
        if !libraries.is_empty() {
            settings.insert("libraries".to_string(), library_settings(artifact, libraries)?);
        }

        let mut source_contents = Map::new();
        for (path, source) in sources {
            let content = match source.get("content").and_then(Value::as_str) {
                Some(content) => content.to_string(),
                None => fs::read_to_string(self.sources_root.join(&path)).map_err(|e| {
                    ScriptError::ArtifactParsing(format!("source {}: {}", path, e))
                })?,
            };
            source_contents.insert(path, json!({ "content": content }));
        }

        let input = json!({
            "language": language,
            "sources": source_contents,
            "settings": settings,
        });
        Ok((contract_name, format!("v{}", compiler.version), input))
    }
}

/// The `settings.libraries` section: source file -> library name -> address
fn library_settings(artifact: &Artifact, libraries: &LibraryLinks) -> Result<Value, ScriptError> {
    let mut settings = Map::new();
    for (library, address) in libraries {
        let source = artifact.library_source(library).ok_or_else(|| {
            ScriptError::LibraryLinking(format!(
                "{} does not reference library {}",
                artifact.name, library
            ))
        })?;
        let entry = settings
            .entry(source.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(source_libraries) = entry {
            source_libraries.insert(library.clone(), json!(format!("{:#x}", address)));
        }
    }

    Ok(Value::Object(settings))
}

/// A reply of the explorer API
#[derive(Debug, Deserialize)]
pub struct ExplorerResponse {
    /// `"1"` on success
    pub status: String,
    /// A short status message
    pub message: String,
    /// The submission GUID, or a description of the outcome
    pub result: String,
}

impl ExplorerResponse {
    /// Whether the API reported success
    fn is_ok(&self) -> bool {
        self.status == "1"
    }

    /// Whether the result reads `phrase`, ignoring case
    fn reads(&self, phrase: &str) -> bool {
        self.result.to_lowercase().contains(phrase)
    }
}

/// The state of a submitted verification
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerificationStatus {
    /// Queued under the given GUID
    Submitted(String),
    /// Still being processed
    Pending,
    /// The source is verified
    Verified,
}

/// Interpret the reply to a `verifysourcecode` submission
pub fn interpret_submission(response: ExplorerResponse) -> Result<VerificationStatus, ScriptError> {
    if response.is_ok() {
        Ok(VerificationStatus::Submitted(response.result))
    } else if response.reads(ALREADY_VERIFIED) {
        Ok(VerificationStatus::Verified)
    } else {
        Err(ScriptError::Verification(format!(
            "{}: {}",
            response.message, response.result
        )))
    }
}

/// Interpret the reply to a `checkverifystatus` request
pub fn interpret_status(response: ExplorerResponse) -> Result<VerificationStatus, ScriptError> {
    if response.is_ok() || response.reads(ALREADY_VERIFIED) {
        Ok(VerificationStatus::Verified)
    } else if response.reads(PENDING_IN_QUEUE) {
        Ok(VerificationStatus::Pending)
    } else {
        Err(ScriptError::Verification(response.result))
    }
}

/// A client of an Etherscan-compatible explorer API
pub struct ExplorerClient {
    /// The HTTP client
    http: reqwest::Client,
    /// The API endpoint
    api_url: String,
    /// The API key
    api_key: String,
}

impl ExplorerClient {
    /// Create a client of the API at `api_url`
    pub fn new(api_url: &str, api_key: &str) -> Result<Self, ScriptError> {
        let http = reqwest::Client::builder()
            .timeout(EXPLORER_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;

        Ok(Self {
            http,
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Submit a verification and wait until the explorer reports its outcome
    pub async fn verify(&self, request: &VerificationRequest) -> Result<(), ScriptError> {
        let guid = match self.submit(request).await? {
            VerificationStatus::Submitted(guid) => guid,
            _ => {
                info!("{:#x} is already verified", request.contract_address);
                return Ok(());
            }
        };
        debug!("Submitted {} as {}", request.contract_name, guid);

        for _ in 0..VERIFICATION_MAX_POLLS {
            tokio::time::sleep(VERIFICATION_POLL_INTERVAL).await;
            if self.check(&guid).await? == VerificationStatus::Verified {
                info!(
                    "Verified {} at {:#x}",
                    request.contract_name, request.contract_address
                );
                return Ok(());
            }
        }

        Err(ScriptError::Verification(format!(
            "{} still pending after {} checks",
            guid, VERIFICATION_MAX_POLLS
        )))
    }

    /// Submit a verification
    async fn submit(&self, request: &VerificationRequest) -> Result<VerificationStatus, ScriptError> {
        let response = self
            .http
            .post(&self.api_url)
            .form(&request.form(&self.api_key))
            .send()
            .await
            .map_err(|e| ScriptError::Verification(e.to_string()))?
            .json::<ExplorerResponse>()
            .await
            .map_err(|e| ScriptError::Verification(e.to_string()))?;

        interpret_submission(response)
    }

    /// Check the status of a submitted verification
    async fn check(&self, guid: &str) -> Result<VerificationStatus, ScriptError> {
        let response = self
            .http
            .get(&self.api_url)
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("module", "contract"),
                ("action", "checkverifystatus"),
                ("guid", guid),
            ])
            .send()
            .await
            .map_err(|e| ScriptError::Verification(e.to_string()))?
            .json::<ExplorerResponse>()
            .await
            .map_err(|e| ScriptError::Verification(e.to_string()))?;

        interpret_status(response)
    }
}
