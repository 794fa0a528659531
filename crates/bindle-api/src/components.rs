//! Pluggable component kinds and the registry that orders them.
//!
//! All format-specific logic lives in components; the core orchestrates
//! and never implements their behavior. Each kind has its own
//! strongly-typed async callback trait, and a component record carries
//! name, version and priority. The registry sorts once at configuration
//! time: descending priority, stable for ties (registration order).

use std::cmp::Reverse;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::{ChunkGenerated, TransformHandle};
use crate::error::Result;
use crate::issue::Issue;
use crate::sourcemap::{SourceMap, SourceMapHint, SourceMapState};
use crate::types::{Chunk, FileContents, ImportRequest, Job, Meta, Resolution};

/// The closed set of component kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    FileResolver,
    FileTransformer,
    JobTransformer,
    ChunkGenerator,
    ChunkTransformer,
    IssueReporter,
}

/// Read-only view of the file a transformer is being folded over.
pub struct FileView<'a> {
    pub file_path: &'a Path,
    pub format: &'a str,
    pub meta: &'a Meta,
    pub contents: &'a FileContents,
    pub source_map: &'a SourceMapState,
}

/// A transformer's contribution to the running accumulator.
pub struct TransformOutput {
    pub contents: FileContents,
    /// `None` drops any previously accumulated map.
    pub source_map: Option<SourceMapHint>,
}

/// Output of the first chunk generator that handles a chunk.
#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedChunk {
    pub format: String,
    pub contents: FileContents,
    pub source_map: Option<SourceMap>,
}

/// Replacement produced by a chunk transformer. A replace is full, not a
/// merge: returning no source map clears any previously set one.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkTransformOutput {
    pub contents: FileContents,
    pub source_map: Option<SourceMap>,
}

/// Maps a request string to a file, or abstains, or refuses.
#[async_trait]
pub trait FileResolver: Send + Sync {
    async fn resolve(&self, request: &ImportRequest) -> Result<Option<Resolution>>;
}

/// Rewrites file contents and registers discovered graph edges.
#[async_trait]
pub trait FileTransformer: Send + Sync {
    async fn transform(
        &self,
        file: FileView<'_>,
        api: &TransformHandle<'_>,
    ) -> Result<Option<TransformOutput>>;
}

/// Rewrites the finished job before generation.
#[async_trait]
pub trait JobTransformer: Send + Sync {
    async fn transform(&self, job: &Job) -> Result<Option<Job>>;
}

/// Produces the contents of one output chunk.
#[async_trait]
pub trait ChunkGenerator: Send + Sync {
    async fn generate(&self, job: &Job, chunk: &Chunk) -> Result<Option<GeneratedChunk>>;
}

/// Post-processes a generated chunk (e.g. minification).
#[async_trait]
pub trait ChunkTransformer: Send + Sync {
    async fn transform(&self, output: &ChunkGenerated) -> Result<Option<ChunkTransformOutput>>;
}

/// Receives issues; has no return value and can never fail the build.
#[async_trait]
pub trait IssueReporter: Send + Sync {
    async fn report(&self, issue: &Issue);
}

/// Worker-facing surface handed to the pipeline so transformer-initiated
/// resolves route back through the single resolver worker.
#[async_trait]
pub trait PipelineHost: Send + Sync {
    async fn resolve(&self, request: ImportRequest) -> Result<Resolution>;
    async fn report(&self, issue: Issue);
}

/// Kind-specific hook held by a component record.
#[derive(Clone)]
pub enum ComponentHook {
    FileResolver(Arc<dyn FileResolver>),
    FileTransformer(Arc<dyn FileTransformer>),
    JobTransformer(Arc<dyn JobTransformer>),
    ChunkGenerator(Arc<dyn ChunkGenerator>),
    ChunkTransformer(Arc<dyn ChunkTransformer>),
    IssueReporter(Arc<dyn IssueReporter>),
}

impl ComponentHook {
    pub fn kind(&self) -> ComponentKind {
        match self {
            ComponentHook::FileResolver(_) => ComponentKind::FileResolver,
            ComponentHook::FileTransformer(_) => ComponentKind::FileTransformer,
            ComponentHook::JobTransformer(_) => ComponentKind::JobTransformer,
            ComponentHook::ChunkGenerator(_) => ComponentKind::ChunkGenerator,
            ComponentHook::ChunkTransformer(_) => ComponentKind::ChunkTransformer,
            ComponentHook::IssueReporter(_) => ComponentKind::IssueReporter,
        }
    }
}

/// A registered component.
#[derive(Clone)]
pub struct Component {
    pub name: String,
    pub version: String,
    /// Higher runs earlier within its kind.
    pub priority: i32,
    pub hook: ComponentHook,
}

impl Component {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        priority: i32,
        hook: ComponentHook,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            priority,
            hook,
        }
    }

    pub fn file_resolver(
        name: impl Into<String>,
        priority: i32,
        hook: impl FileResolver + 'static,
    ) -> Self {
        Self::new(name, "0.0.0", priority, ComponentHook::FileResolver(Arc::new(hook)))
    }

    pub fn file_transformer(
        name: impl Into<String>,
        priority: i32,
        hook: impl FileTransformer + 'static,
    ) -> Self {
        Self::new(name, "0.0.0", priority, ComponentHook::FileTransformer(Arc::new(hook)))
    }

    pub fn job_transformer(
        name: impl Into<String>,
        priority: i32,
        hook: impl JobTransformer + 'static,
    ) -> Self {
        Self::new(name, "0.0.0", priority, ComponentHook::JobTransformer(Arc::new(hook)))
    }

    pub fn chunk_generator(
        name: impl Into<String>,
        priority: i32,
        hook: impl ChunkGenerator + 'static,
    ) -> Self {
        Self::new(name, "0.0.0", priority, ComponentHook::ChunkGenerator(Arc::new(hook)))
    }

    pub fn chunk_transformer(
        name: impl Into<String>,
        priority: i32,
        hook: impl ChunkTransformer + 'static,
    ) -> Self {
        Self::new(name, "0.0.0", priority, ComponentHook::ChunkTransformer(Arc::new(hook)))
    }

    pub fn issue_reporter(
        name: impl Into<String>,
        priority: i32,
        hook: impl IssueReporter + 'static,
    ) -> Self {
        Self::new(name, "0.0.0", priority, ComponentHook::IssueReporter(Arc::new(hook)))
    }

    pub fn kind(&self) -> ComponentKind {
        self.hook.kind()
    }
}

/// Components grouped by kind, sorted once at construction.
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    components: Vec<Component>,
}

impl ComponentRegistry {
    pub fn new(mut components: Vec<Component>) -> Self {
        // Stable sort keeps registration order for equal priorities.
        components.sort_by_key(|c| Reverse(c.priority));
        Self { components }
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn of_kind(&self, kind: ComponentKind) -> impl Iterator<Item = &Component> {
        self.components.iter().filter(move |c| c.kind() == kind)
    }

    pub fn file_resolvers(&self) -> Vec<(&Component, &Arc<dyn FileResolver>)> {
        self.components
            .iter()
            .filter_map(|c| match &c.hook {
                ComponentHook::FileResolver(hook) => Some((c, hook)),
                _ => None,
            })
            .collect()
    }

    pub fn file_transformers(&self) -> Vec<(&Component, &Arc<dyn FileTransformer>)> {
        self.components
            .iter()
            .filter_map(|c| match &c.hook {
                ComponentHook::FileTransformer(hook) => Some((c, hook)),
                _ => None,
            })
            .collect()
    }

    pub fn job_transformers(&self) -> Vec<(&Component, &Arc<dyn JobTransformer>)> {
        self.components
            .iter()
            .filter_map(|c| match &c.hook {
                ComponentHook::JobTransformer(hook) => Some((c, hook)),
                _ => None,
            })
            .collect()
    }

    pub fn chunk_generators(&self) -> Vec<(&Component, &Arc<dyn ChunkGenerator>)> {
        self.components
            .iter()
            .filter_map(|c| match &c.hook {
                ComponentHook::ChunkGenerator(hook) => Some((c, hook)),
                _ => None,
            })
            .collect()
    }

    pub fn chunk_transformers(&self) -> Vec<(&Component, &Arc<dyn ChunkTransformer>)> {
        self.components
            .iter()
            .filter_map(|c| match &c.hook {
                ComponentHook::ChunkTransformer(hook) => Some((c, hook)),
                _ => None,
            })
            .collect()
    }

    pub fn issue_reporters(&self) -> Vec<(&Component, &Arc<dyn IssueReporter>)> {
        self.components
            .iter()
            .filter_map(|c| match &c.hook {
                ComponentHook::IssueReporter(hook) => Some((c, hook)),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullResolver;

    #[async_trait]
    impl FileResolver for NullResolver {
        async fn resolve(&self, _request: &ImportRequest) -> Result<Option<Resolution>> {
            Ok(None)
        }
    }

    #[test]
    fn test_registry_sorts_by_priority_descending() {
        let registry = ComponentRegistry::new(vec![
            Component::file_resolver("low", 5, NullResolver),
            Component::file_resolver("high", 10, NullResolver),
        ]);
        let names: Vec<_> = registry
            .file_resolvers()
            .into_iter()
            .map(|(c, _)| c.name.clone())
            .collect();
        assert_eq!(names, vec!["high", "low"]);
    }

    #[test]
    fn test_registry_is_stable_for_equal_priorities() {
        let registry = ComponentRegistry::new(vec![
            Component::file_resolver("first", 5, NullResolver),
            Component::file_resolver("second", 5, NullResolver),
            Component::file_resolver("third", 5, NullResolver),
        ]);
        let names: Vec<_> = registry
            .file_resolvers()
            .into_iter()
            .map(|(c, _)| c.name.clone())
            .collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_of_kind_filters() {
        let registry = ComponentRegistry::new(vec![
            Component::file_resolver("resolver", 0, NullResolver),
        ]);
        assert_eq!(registry.of_kind(ComponentKind::FileResolver).count(), 1);
        assert_eq!(registry.of_kind(ComponentKind::ChunkGenerator).count(), 0);
    }
}
