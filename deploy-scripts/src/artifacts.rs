//! Compiled contract artifacts: loading, library linking and calldata encoding

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use alloy::{
    dyn_abi::{DynSolValue, JsonAbiExt},
    hex,
    json_abi::JsonAbi,
    primitives::{Address, Bytes},
};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::{
    constants::{
        ARTIFACT_SOURCE_EXTENSION, JSON_EXTENSION, LIBRARY_PLACEHOLDER_PREFIX, NUM_BYTES_ADDRESS,
    },
    errors::ScriptError,
    types::LibraryLinks,
};

/// The location of a library placeholder within the bytecode, in bytes
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub struct LinkOffset {
    /// The first byte of the placeholder
    pub start: usize,
    /// The length of the placeholder
    pub length: usize,
}

/// The artifact file as written by the compiler
#[derive(Deserialize)]
struct RawArtifact {
    /// The ABI, kept as raw JSON so it can be re-emitted verbatim
    abi: Vec<Value>,
    /// The creation bytecode
    bytecode: RawBytecode,
    /// The compiler metadata, as an object or as its JSON string
    #[serde(default)]
    metadata: Option<Value>,
}

/// The creation bytecode section of an artifact
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBytecode {
    /// The hex bytecode, with unlinked library placeholders
    object: String,
    /// Source file -> library name -> placeholder offsets
    #[serde(default)]
    link_references: BTreeMap<String, BTreeMap<String, Vec<LinkOffset>>>,
}

/// A compiled contract
#[derive(Clone, Debug)]
pub struct Artifact {
    /// The contract name
    pub name: String,
    /// The parsed ABI
    pub abi: JsonAbi,
    /// The ABI items as they appear in the artifact
    pub abi_items: Vec<Value>,
    /// The unlinked creation bytecode in hex, without a `0x` prefix
    bytecode: String,
    /// Library name -> placeholder offsets
    link_references: BTreeMap<String, Vec<LinkOffset>>,
    /// Library name -> the source file declaring it
    library_sources: BTreeMap<String, String>,
    /// The compiler metadata, if the artifact carries it
    metadata: Option<Value>,
}

impl Artifact {
    /// Parse an artifact from the compiler's JSON output
    pub fn from_json(name: &str, json: &str) -> Result<Self, ScriptError> {
        let raw: RawArtifact = serde_json::from_str(json)
            .map_err(|e| ScriptError::ArtifactParsing(format!("{}: {}", name, e)))?;
        let abi: JsonAbi = serde_json::from_value(Value::Array(raw.abi.clone()))
            .map_err(|e| ScriptError::ArtifactParsing(format!("{}: {}", name, e)))?;

        let mut link_references: BTreeMap<String, Vec<LinkOffset>> = BTreeMap::new();
        let mut library_sources = BTreeMap::new();
        for (source, libraries) in raw.bytecode.link_references {
            for (library, offsets) in libraries {
                library_sources.insert(library.clone(), source.clone());
                link_references.entry(library).or_default().extend(offsets);
            }
        }

        let metadata = match raw.metadata {
            Some(Value::String(metadata)) => Some(
                serde_json::from_str(&metadata)
                    .map_err(|e| ScriptError::ArtifactParsing(format!("{}: {}", name, e)))?,
            ),
            metadata => metadata,
        };

        let bytecode = raw
            .bytecode
            .object
            .strip_prefix("0x")
            .unwrap_or(&raw.bytecode.object)
            .to_string();
        if bytecode.is_empty() {
            return Err(ScriptError::ArtifactParsing(format!(
                "{} has no creation bytecode, is it abstract?",
                name
            )));
        }
        // Placeholder offsets index hex digits, so every character must be one byte
        if !bytecode.is_ascii() {
            return Err(ScriptError::ArtifactParsing(format!(
                "{}: creation bytecode is not hex",
                name
            )));
        }

        Ok(Self {
            name: name.to_string(),
            abi,
            abi_items: raw.abi,
            bytecode,
            link_references,
            library_sources,
            metadata,
        })
    }

    /// The compiler metadata, if the artifact carries it
    pub fn metadata(&self) -> Option<&Value> {
        self.metadata.as_ref()
    }

    /// The source file declaring a library this contract links against
    pub fn library_source(&self, library: &str) -> Option<&str> {
        self.library_sources.get(library).map(String::as_str)
    }

    /// Substitute the given library addresses into the bytecode.
    ///
    /// Every library referenced by the bytecode must be present in `libraries`,
    /// and no placeholder may remain afterwards.
    pub fn link(&self, libraries: &LibraryLinks) -> Result<Bytes, ScriptError> {
        let mut code = self.bytecode.clone();
        for (library, offsets) in &self.link_references {
            let address = libraries.get(library).ok_or_else(|| {
                ScriptError::LibraryLinking(format!(
                    "{} references library {}, which the step does not link",
                    self.name, library
                ))
            })?;
            let address_hex = hex::encode(address);

            for offset in offsets {
                if offset.length != NUM_BYTES_ADDRESS {
                    return Err(ScriptError::LibraryLinking(format!(
                        "{}: placeholder for {} is {} bytes",
                        self.name, library, offset.length
                    )));
                }
                let start = offset.start.checked_mul(2);
                let end = start.and_then(|start| start.checked_add(offset.length * 2));
                let (Some(start), Some(end)) = (start, end) else {
                    return Err(ScriptError::LibraryLinking(format!(
                        "{}: placeholder for {} lies outside the bytecode",
                        self.name, library
                    )));
                };
                if end > code.len() {
                    return Err(ScriptError::LibraryLinking(format!(
                        "{}: placeholder for {} lies outside the bytecode",
                        self.name, library
                    )));
                }
                code.replace_range(start..end, &address_hex);
            }
        }

        for library in libraries.keys() {
            if !self.link_references.contains_key(library) {
                warn!("{} does not reference linked library {}", self.name, library);
            }
        }

        if code.contains(LIBRARY_PLACEHOLDER_PREFIX) {
            return Err(ScriptError::LibraryLinking(format!(
                "{} still contains unresolved library placeholders",
                self.name
            )));
        }

        hex::decode(&code)
            .map(Bytes::from)
            .map_err(|e| ScriptError::ArtifactParsing(format!("{}: {}", self.name, e)))
    }

    /// ABI-encode constructor arguments, without a selector
    pub fn constructor_calldata(&self, args: &[DynSolValue]) -> Result<Vec<u8>, ScriptError> {
        match &self.abi.constructor {
            Some(constructor) => constructor
                .abi_encode_input(args)
                .map_err(|e| ScriptError::CalldataConstruction(format!("{}: {}", self.name, e))),
            None if args.is_empty() => Ok(Vec::new()),
            None => Err(ScriptError::CalldataConstruction(format!(
                "{} has no constructor but {} arguments were given",
                self.name,
                args.len()
            ))),
        }
    }

    /// The full creation code: linked bytecode followed by the encoded constructor arguments
    pub fn creation_code(
        &self,
        libraries: &LibraryLinks,
        args: &[DynSolValue],
    ) -> Result<Bytes, ScriptError> {
        let mut code = self.link(libraries)?.to_vec();
        code.extend(self.constructor_calldata(args)?);
        Ok(code.into())
    }

    /// ABI-encode a call to `method`, selecting the overload taking `args.len()` arguments
    pub fn call_calldata(&self, method: &str, args: &[DynSolValue]) -> Result<Vec<u8>, ScriptError> {
        let function = self
            .abi
            .function(method)
            .and_then(|overloads| overloads.iter().find(|f| f.inputs.len() == args.len()))
            .ok_or_else(|| {
                ScriptError::CalldataConstruction(format!(
                    "{} has no `{}` taking {} arguments",
                    self.name,
                    method,
                    args.len()
                ))
            })?;

        function
            .abi_encode_input(args)
            .map_err(|e| ScriptError::CalldataConstruction(format!("{}: {}", self.name, e)))
    }

    /// The event entries of the ABI
    pub fn event_items(&self) -> impl Iterator<Item = &Value> {
        self.abi_items
            .iter()
            .filter(|item| item.get("type").and_then(Value::as_str) == Some("event"))
    }
}

/// Encode addresses as ABI values
pub fn address_values(addresses: &[Address]) -> Vec<DynSolValue> {
    addresses.iter().copied().map(DynSolValue::Address).collect()
}

/// Reads artifacts from the compiler's output directory
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    /// The output directory, laid out as `<root>/<Name>.sol/<Name>.json`
    root: PathBuf,
}

impl ArtifactStore {
    /// A store reading from `root`
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// The path of the artifact for contract `name`
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", name, ARTIFACT_SOURCE_EXTENSION))
            .join(format!("{}.{}", name, JSON_EXTENSION))
    }

    /// Load the artifact for contract `name`
    pub fn load(&self, name: &str) -> Result<Artifact, ScriptError> {
        let path = self.path_of(name);
        let json = fs::read_to_string(&path)
            .map_err(|e| ScriptError::ArtifactParsing(format!("{}: {}", path.display(), e)))?;
        Artifact::from_json(name, &json)
    }
}
