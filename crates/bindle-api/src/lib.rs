//! # bindle-api
//!
//! Data model, component system and plugin pipeline for the bindle
//! bundler. This crate is format-agnostic: it never parses source code
//! itself, it only defines the contracts format-specific components
//! implement and the policy for invoking them.
//!
//! The orchestration engine that drives builds over this pipeline lives
//! in `bindle-core`.

pub mod components;
pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod issue;
pub mod output;
pub mod sourcemap;
pub mod types;
pub mod validate;

pub use components::{
    Component, ComponentHook, ComponentKind, ComponentRegistry, ChunkGenerator,
    ChunkTransformOutput, ChunkTransformer, FileResolver, FileTransformer, FileView,
    GeneratedChunk, IssueReporter, JobTransformer, PipelineHost, TransformOutput,
};
pub use config::{BundleConfig, OutputConfig};
pub use context::{
    ChunkGenerated, ChunksGenerated, Context, FileTransformResult, TransformHandle,
};
pub use error::{BundleError, Result, WorkError};
pub use identity::Identity;
pub use issue::{Issue, Severity};
pub use output::{OutputFormats, OutputPattern, get_file_name};
pub use sourcemap::{SourceMap, SourceMapHint, SourceMapState};
pub use types::{
    Chunk, FileContents, ImportRequest, ImportResolved, Job, Meta, Resolution, TransformedFile,
};
