//! Core data model shared by every stage of the pipeline.

use std::path::PathBuf;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{BundleError, Result};
use crate::identity::Identity;

/// Free-form metadata attached to requests, resolutions and chunks.
///
/// Components use this to pass format-specific details along graph edges
/// without the core understanding them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta(pub serde_json::Map<String, serde_json::Value>);

impl Meta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default metadata for an import discovered in source code.
    ///
    /// `specified` is false for imports synthesized by components rather
    /// than written by the user.
    pub fn specified(flag: bool) -> Self {
        let mut map = serde_json::Map::new();
        map.insert("specified".into(), serde_json::Value::Bool(flag));
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.0.insert(key.into(), value);
    }
}

/// File contents as read from disk or produced by a transformer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileContents {
    Text(String),
    Binary(Vec<u8>),
}

impl FileContents {
    /// Keeps text as text so transformers can work with `&str` directly.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => FileContents::Text(text),
            Err(err) => FileContents::Binary(err.into_bytes()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FileContents::Text(text) => text.as_bytes(),
            FileContents::Binary(bytes) => bytes,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FileContents::Text(text) => Some(text),
            FileContents::Binary(_) => None,
        }
    }

    pub fn to_text_lossy(&self) -> String {
        match self {
            FileContents::Text(text) => text.clone(),
            FileContents::Binary(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

impl From<&str> for FileContents {
    fn from(value: &str) -> Self {
        FileContents::Text(value.to_owned())
    }
}

impl From<String> for FileContents {
    fn from(value: String) -> Self {
        FileContents::Text(value)
    }
}

/// A request to resolve a string specifier into a file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImportRequest {
    /// The raw specifier, e.g. `./button` or `lodash`.
    pub request: String,
    /// File the request originates from; `None` for configured entries.
    pub request_file: Option<PathBuf>,
    /// Resolver component names that must not see this request.
    pub ignored_resolvers: Vec<String>,
    pub meta: Meta,
}

impl ImportRequest {
    /// A top-level entry request with no originating file.
    pub fn entry(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            request_file: None,
            ignored_resolvers: Vec::new(),
            meta: Meta::new(),
        }
    }

    /// An import written in `request_file`'s source code.
    pub fn from_file(request: impl Into<String>, request_file: impl Into<PathBuf>) -> Self {
        Self {
            request: request.into(),
            request_file: Some(request_file.into()),
            ignored_resolvers: Vec::new(),
            meta: Meta::specified(true),
        }
    }
}

/// A successfully resolved import.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImportResolved {
    /// Output format the file belongs to, e.g. `js` or `css`.
    pub format: String,
    /// Absolute path of the resolved file.
    pub file_path: PathBuf,
    pub meta: Meta,
}

impl ImportResolved {
    pub fn new(format: impl Into<String>, file_path: impl Into<PathBuf>) -> Self {
        Self {
            format: format.into(),
            file_path: file_path.into(),
            meta: Meta::new(),
        }
    }

    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }

    pub fn identity(&self) -> Identity {
        Identity::of_file(self)
    }
}

/// Outcome of the resolver chain.
///
/// A refusal is an explicit "this must not be bundled" answer, distinct
/// from a resolver abstaining (`None` from its callback).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Resolution {
    Resolved(ImportResolved),
    Refused { meta: Meta },
}

impl Resolution {
    pub fn is_refused(&self) -> bool {
        matches!(self, Resolution::Refused { .. })
    }

    pub fn into_resolved(self) -> Option<ImportResolved> {
        match self {
            Resolution::Resolved(resolved) => Some(resolved),
            Resolution::Refused { .. } => None,
        }
    }
}

/// A named group of files emitted together as one logical output unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub format: String,
    /// Entry file of the chunk, when it has one.
    pub entry: Option<PathBuf>,
    /// Label for entry-less chunks (e.g. a split-out vendor group).
    pub label: Option<String>,
    /// Imports the chunk directly references, in declaration order.
    pub imports: Vec<ImportResolved>,
    /// True for the synthetic chunks wrapping configured entries.
    pub is_entry: bool,
    pub meta: Meta,
}

impl Chunk {
    /// Either a label or an entry path is required; identity is derived
    /// from whichever is present.
    pub fn new(
        format: impl Into<String>,
        label: Option<String>,
        entry: Option<PathBuf>,
    ) -> Result<Self> {
        if label.is_none() && entry.is_none() {
            return Err(BundleError::Config(
                "either label or entry are required to make a chunk".into(),
            ));
        }
        Ok(Self {
            format: format.into(),
            entry,
            label,
            imports: Vec::new(),
            is_entry: false,
            meta: Meta::new(),
        })
    }

    /// Synthetic top-level chunk wrapping a resolved entry.
    pub fn entry_chunk(resolved: &ImportResolved) -> Self {
        Self {
            format: resolved.format.clone(),
            entry: Some(resolved.file_path.clone()),
            label: None,
            imports: Vec::new(),
            is_entry: true,
            meta: resolved.meta.clone(),
        }
    }

    pub fn labeled(format: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            entry: None,
            label: Some(label.into()),
            imports: Vec::new(),
            is_entry: false,
            meta: Meta::new(),
        }
    }

    pub fn with_imports(mut self, imports: Vec<ImportResolved>) -> Self {
        self.imports = imports;
        self
    }

    pub fn identity(&self) -> Identity {
        Identity::of_chunk(self)
    }

    /// Short human-readable description used in error messages.
    pub fn describe(&self) -> String {
        let mut parts = vec![format!("format '{}'", self.format)];
        if let Some(entry) = &self.entry {
            parts.push(format!("entry '{}'", entry.display()));
        }
        if let Some(label) = &self.label {
            parts.push(format!("label '{label}'"));
        }
        parts.join(" ")
    }
}

/// A file after the transformer fold, with its discovered graph edges.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformedFile {
    pub resolved: ImportResolved,
    pub contents: FileContents,
    /// Serialized source map, when tracking survived the fold.
    pub source_map: Option<String>,
    /// Imports discovered during transformation, ordered by first add.
    pub imports: Vec<ImportResolved>,
    /// Nested chunks discovered during transformation, ordered by first add.
    pub chunks: Vec<Chunk>,
}

impl TransformedFile {
    pub fn identity(&self) -> Identity {
        self.resolved.identity()
    }
}

/// Accumulated state of one full build pass.
///
/// Both maps are identity-keyed unions written from concurrent recursive
/// branches; final contents are order-independent. Append-only within a
/// pass, except that a failing chunk subtree removes its own chunk entry.
#[derive(Clone, Debug, Default)]
pub struct Job {
    pub chunks: DashMap<Identity, Chunk>,
    pub files: DashMap<Identity, TransformedFile>,
}

impl Job {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the chunk map, for iteration across suspension points.
    pub fn chunk_list(&self) -> Vec<Chunk> {
        self.chunks.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn file_list(&self) -> Vec<TransformedFile> {
        self.files.iter().map(|entry| entry.value().clone()).collect()
    }
}
