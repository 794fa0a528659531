//! The plugin pipeline invoker.
//!
//! `Context` owns the configuration and the component registry and knows
//! how to drive each of the six component kinds with validation and
//! result-merging policy. It is shared by every worker; all state that
//! varies per invocation lives in arguments, never in the context.

use std::path::PathBuf;

use futures::StreamExt;
use futures::stream::{self, TryStreamExt};
use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::components::{
    ChunkTransformOutput, ComponentRegistry, FileView, PipelineHost,
};
use crate::config::BundleConfig;
use crate::error::{BundleError, Result, WorkError};
use crate::identity::Identity;
use crate::issue::Issue;
use crate::sourcemap::{SourceMap, SourceMapState, inject_source_contents};
use crate::types::{
    Chunk, FileContents, ImportRequest, ImportResolved, Job, Meta, Resolution,
};
use crate::{output, validate};

/// Upper bound for fan-out style invocations (chunk generation, issue
/// reporting). Sequential kinds ignore it by design.
const INVOKE_CONCURRENCY: usize = 8;

/// A generated chunk paired with its public output path.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkGenerated {
    pub chunk: Chunk,
    /// Output format, which may differ from the chunk's input format.
    pub format: String,
    pub contents: FileContents,
    /// Public path; `None` when the output table suppresses this format.
    pub file_path: Option<String>,
    pub source_map: Option<SourceMap>,
}

/// Everything `generate` produced for one set of chunks.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunksGenerated {
    pub root_directory: PathBuf,
    pub outputs: Vec<ChunkGenerated>,
}

/// Result of folding all file transformers over one file.
#[derive(Clone, Debug, PartialEq)]
pub struct FileTransformResult {
    pub meta: Meta,
    /// Discovered imports, deduped, ordered by first add.
    pub imports: Vec<ImportResolved>,
    /// Discovered nested chunks, deduped, ordered by first add.
    pub chunks: Vec<Chunk>,
    pub contents: FileContents,
    /// Serialized source map, when tracking survived the fold.
    pub source_map: Option<String>,
}

/// Side-effecting capabilities handed to each file transformer.
pub struct TransformHandle<'a> {
    host: &'a dyn PipelineHost,
    origin: &'a ImportResolved,
    component: &'a str,
    imports: &'a Mutex<IndexMap<Identity, ImportResolved>>,
    chunks: &'a Mutex<IndexMap<Identity, Chunk>>,
}

impl TransformHandle<'_> {
    /// Resolve a request relative to the file being transformed.
    pub async fn resolve(&self, request: &str) -> Result<Resolution> {
        self.resolve_specified(request, true).await
    }

    /// Like [`Self::resolve`], with an explicit "specified" flag for
    /// imports synthesized by the transformer rather than the user.
    pub async fn resolve_specified(&self, request: &str, specified: bool) -> Result<Resolution> {
        let mut meta = self.origin.meta.clone();
        meta.insert("specified", serde_json::Value::Bool(specified));
        self.host
            .resolve(ImportRequest {
                request: request.to_owned(),
                request_file: Some(self.origin.file_path.clone()),
                ignored_resolvers: Vec::new(),
                meta,
            })
            .await
    }

    /// Register an additional import edge. Validated on registration;
    /// later adds with the same identity collapse to one.
    pub fn add_import(&self, import: ImportResolved) -> Result<()> {
        let messages = validate::resolved(&import);
        if !messages.is_empty() {
            return Err(BundleError::TransformFailed(WorkError::in_component(
                self.component,
                format!("cannot add invalid import in transformer '{}'", self.component),
                messages,
            )));
        }
        self.imports.lock().insert(import.identity(), import);
        Ok(())
    }

    /// Register an additional chunk edge, validated like an import.
    pub fn add_chunk(&self, chunk: Chunk) -> Result<()> {
        let messages = validate::chunk(&chunk);
        if !messages.is_empty() {
            return Err(BundleError::TransformFailed(WorkError::in_component(
                self.component,
                format!("cannot add invalid chunk in transformer '{}'", self.component),
                messages,
            )));
        }
        self.chunks.lock().insert(chunk.identity(), chunk);
        Ok(())
    }
}

/// Invokes the pluggable component kinds.
pub struct Context {
    config: BundleConfig,
    components: ComponentRegistry,
}

impl Context {
    pub fn new(config: BundleConfig, components: ComponentRegistry) -> Self {
        Self { config, components }
    }

    pub fn config(&self) -> &BundleConfig {
        &self.config
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// Public path for a chunk under the configured output table.
    pub fn get_public_path(&self, chunk: &Chunk) -> Result<Option<String>> {
        output::get_file_name(&self.config.output.formats, chunk)
    }

    /// Run the resolver chain over one request.
    ///
    /// Resolvers run in priority order; each may abstain, refuse, or
    /// produce a full record. The chain does not short-circuit: a later
    /// resolver's validated result freely supersedes an earlier one.
    pub async fn invoke_file_resolvers(&self, request: &ImportRequest) -> Result<Resolution> {
        let all = self.components.file_resolvers();
        if all.is_empty() {
            return Err(BundleError::resolve_failed("no file resolvers are configured"));
        }
        let allowed: Vec<_> = all
            .into_iter()
            .filter(|(c, _)| !request.ignored_resolvers.contains(&c.name))
            .collect();
        if allowed.is_empty() {
            return Err(BundleError::resolve_failed(
                "all file resolvers were excluded for this request",
            ));
        }

        let mut result: Option<Resolution> = None;
        for (component, hook) in allowed {
            match hook.resolve(request).await? {
                None => continue,
                Some(Resolution::Refused { meta }) => {
                    result = Some(Resolution::Refused { meta });
                }
                Some(Resolution::Resolved(resolved)) => {
                    let messages = validate::resolved(&resolved);
                    if !messages.is_empty() {
                        return Err(BundleError::ResolveFailed(WorkError::in_component(
                            &component.name,
                            format!("resolver '{}' returned an invalid result", component.name),
                            messages,
                        )));
                    }
                    result = Some(Resolution::Resolved(resolved));
                }
            }
        }

        result.ok_or_else(|| {
            let origin = request
                .request_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "root".into());
            BundleError::resolve_failed(format!(
                "unable to resolve '{}' from '{}'",
                request.request, origin
            ))
        })
    }

    /// Fold all file transformers over a file's raw contents.
    pub async fn invoke_file_transformers(
        &self,
        host: &dyn PipelineHost,
        request: &ImportResolved,
    ) -> Result<FileTransformResult> {
        let raw = tokio::fs::read(&request.file_path).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                BundleError::transform_failed(format!(
                    "cannot find file '{}'",
                    request.file_path.display()
                ))
            } else {
                BundleError::Io {
                    path: request.file_path.clone(),
                    source: err,
                }
            }
        })?;
        let original = FileContents::from_bytes(raw);

        let found_imports: Mutex<IndexMap<Identity, ImportResolved>> =
            Mutex::new(IndexMap::new());
        let found_chunks: Mutex<IndexMap<Identity, Chunk>> = Mutex::new(IndexMap::new());

        let mut contents = original.clone();
        let mut map_state = SourceMapState::Absent;

        for (component, hook) in self.components.file_transformers() {
            let handle = TransformHandle {
                host,
                origin: request,
                component: &component.name,
                imports: &found_imports,
                chunks: &found_chunks,
            };
            let view = FileView {
                file_path: &request.file_path,
                format: &request.format,
                meta: &request.meta,
                contents: &contents,
                source_map: &map_state,
            };
            let Some(result) = hook.transform(view, &handle).await? else {
                continue;
            };
            contents = result.contents;
            map_state = map_state.apply(result.source_map);
        }

        let mut final_map = map_state.into_map();
        if let Some(map) = &mut final_map {
            inject_source_contents(map, &request.file_path, &original.to_text_lossy());
        }

        Ok(FileTransformResult {
            meta: request.meta.clone(),
            imports: found_imports.into_inner().into_values().collect(),
            chunks: found_chunks.into_inner().into_values().collect(),
            contents,
            source_map: final_map.map(|map| map.to_json()),
        })
    }

    /// Sequential fold of job transformers; each may replace the job.
    pub async fn invoke_job_transformers(&self, job: Job) -> Result<Job> {
        let mut current = job;
        for (_, hook) in self.components.job_transformers() {
            if let Some(replacement) = hook.transform(&current).await? {
                current = replacement;
            }
        }
        Ok(current)
    }

    /// Generate every chunk, in bounded concurrency. Per chunk, the first
    /// generator (priority order) that returns a validated result wins.
    pub async fn invoke_chunk_generators(
        &self,
        job: &Job,
        chunks: &[Chunk],
    ) -> Result<ChunksGenerated> {
        let generators = self.components.chunk_generators();
        if generators.is_empty() {
            return Err(BundleError::generate_failed("no chunk generators are configured"));
        }

        let outputs: Vec<ChunkGenerated> = stream::iter(chunks.iter())
            .map(|chunk| {
                let generators = &generators;
                async move {
                    for (component, hook) in generators {
                        let Some(generated) = hook.generate(job, chunk).await? else {
                            continue;
                        };
                        if generated.format.is_empty() {
                            return Err(BundleError::GenerateFailed(WorkError::in_component(
                                &component.name,
                                format!(
                                    "chunk generator '{}' returned an invalid result",
                                    component.name
                                ),
                                vec!["format must not be empty".into()],
                            )));
                        }
                        let mut output_chunk = chunk.clone();
                        output_chunk.format = generated.format.clone();
                        let file_path = self.get_public_path(&output_chunk)?;
                        return Ok(ChunkGenerated {
                            chunk: chunk.clone(),
                            format: generated.format,
                            contents: generated.contents,
                            file_path,
                            source_map: generated.source_map,
                        });
                    }
                    Err(BundleError::generate_failed(format!(
                        "chunk generators refused to generate chunk of {}",
                        chunk.describe()
                    )))
                }
            })
            .buffer_unordered(INVOKE_CONCURRENCY)
            .try_collect()
            .await?;

        Ok(ChunksGenerated {
            root_directory: self.config.output.root_directory.clone(),
            outputs,
        })
    }

    /// Sequential fold of chunk transformers over a generated chunk.
    ///
    /// Each replace is full, not a merge: a transformer that returns no
    /// source map clears any previously set one.
    pub async fn invoke_chunk_transformers(
        &self,
        generated: &ChunkGenerated,
    ) -> Result<ChunkTransformOutput> {
        let mut current = ChunkTransformOutput {
            contents: generated.contents.clone(),
            source_map: None,
        };
        for (_, hook) in self.components.chunk_transformers() {
            let view = ChunkGenerated {
                contents: current.contents.clone(),
                ..generated.clone()
            };
            if let Some(result) = hook.transform(&view).await? {
                current = result;
            }
        }
        Ok(current)
    }

    /// Fan an issue out to all reporters. Never fails the build; with no
    /// reporters registered the issue goes to the diagnostic sink.
    pub async fn invoke_issue_reporters(&self, issue: &Issue) {
        let reporters = self.components.issue_reporters();
        if reporters.is_empty() {
            tracing::error!(
                severity = ?issue.severity,
                message = %issue.message,
                "no issue reporters registered to receive this issue"
            );
            return;
        }
        stream::iter(reporters)
            .for_each_concurrent(INVOKE_CONCURRENCY, |(_, hook)| {
                let hook = hook.clone();
                async move {
                    hook.report(issue).await;
                }
            })
            .await;
    }
}
