//! Plugin pipeline tests: resolver chain semantics, transformer folding,
//! generator selection and the reporter fan-out, driven through a real
//! `Context` with stub components.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bindle_api::{
    BundleConfig, BundleError, Chunk, ChunkGenerated, ChunkGenerator, ChunkTransformOutput,
    ChunkTransformer, Component, ComponentRegistry, Context, FileResolver,
    FileTransformer, FileView, GeneratedChunk, ImportRequest, ImportResolved, Issue,
    IssueReporter, Job, JobTransformer, Meta, OutputPattern, PipelineHost, Resolution,
    Result, TransformHandle, TransformOutput,
};
use parking_lot::Mutex;
use tempfile::TempDir;

fn context_with(components: Vec<Component>) -> Arc<Context> {
    let config = BundleConfig::new("/project")
        .with_entry("./index.js")
        .with_format("map", OutputPattern::Suppress(false));
    Arc::new(Context::new(config, ComponentRegistry::new(components)))
}

struct TestHost {
    context: Arc<Context>,
}

#[async_trait]
impl PipelineHost for TestHost {
    async fn resolve(&self, request: ImportRequest) -> Result<Resolution> {
        self.context.invoke_file_resolvers(&request).await
    }

    async fn report(&self, _issue: Issue) {}
}

struct Abstain;

#[async_trait]
impl FileResolver for Abstain {
    async fn resolve(&self, _request: &ImportRequest) -> Result<Option<Resolution>> {
        Ok(None)
    }
}

struct FixedResolver {
    path: &'static str,
}

#[async_trait]
impl FileResolver for FixedResolver {
    async fn resolve(&self, _request: &ImportRequest) -> Result<Option<Resolution>> {
        Ok(Some(Resolution::Resolved(ImportResolved::new(
            "js", self.path,
        ))))
    }
}

struct Refuser;

#[async_trait]
impl FileResolver for Refuser {
    async fn resolve(&self, _request: &ImportRequest) -> Result<Option<Resolution>> {
        Ok(Some(Resolution::Refused { meta: Meta::new() }))
    }
}

#[tokio::test]
async fn test_zero_resolvers_fails() {
    let context = context_with(vec![]);
    let err = context
        .invoke_file_resolvers(&ImportRequest::entry("./a"))
        .await
        .unwrap_err();
    assert!(matches!(err, BundleError::ResolveFailed(_)));
}

#[tokio::test]
async fn test_all_resolvers_ignored_fails() {
    let context = context_with(vec![Component::file_resolver("only", 0, Abstain)]);
    let mut request = ImportRequest::entry("./a");
    request.ignored_resolvers.push("only".into());
    let err = context.invoke_file_resolvers(&request).await.unwrap_err();
    assert!(matches!(err, BundleError::ResolveFailed(_)));
}

#[tokio::test]
async fn test_abstaining_resolver_falls_through() {
    let context = context_with(vec![
        Component::file_resolver("r1", 10, Abstain),
        Component::file_resolver("r2", 5, FixedResolver { path: "/a.js" }),
    ]);
    let resolution = context
        .invoke_file_resolvers(&ImportRequest::entry("./a"))
        .await
        .unwrap();
    let resolved = resolution.into_resolved().unwrap();
    assert_eq!(resolved.file_path, PathBuf::from("/a.js"));
}

#[tokio::test]
async fn test_later_resolver_supersedes_earlier() {
    let context = context_with(vec![
        Component::file_resolver("r1", 10, FixedResolver { path: "/a.js" }),
        Component::file_resolver("r2", 5, FixedResolver { path: "/b.js" }),
    ]);
    let resolved = context
        .invoke_file_resolvers(&ImportRequest::entry("./a"))
        .await
        .unwrap()
        .into_resolved()
        .unwrap();
    assert_eq!(resolved.file_path, PathBuf::from("/b.js"));
}

#[tokio::test]
async fn test_refusal_is_preserved_unless_overridden() {
    let context = context_with(vec![
        Component::file_resolver("refuser", 10, Refuser),
    ]);
    let resolution = context
        .invoke_file_resolvers(&ImportRequest::entry("node:fs"))
        .await
        .unwrap();
    assert!(resolution.is_refused());

    let context = context_with(vec![
        Component::file_resolver("refuser", 10, Refuser),
        Component::file_resolver("override", 5, FixedResolver { path: "/shim.js" }),
    ]);
    let resolution = context
        .invoke_file_resolvers(&ImportRequest::entry("node:fs"))
        .await
        .unwrap();
    assert!(!resolution.is_refused());
}

#[tokio::test]
async fn test_invalid_resolver_result_names_component() {
    let context = context_with(vec![Component::file_resolver(
        "bad",
        0,
        FixedResolver { path: "relative.js" },
    )]);
    let err = context
        .invoke_file_resolvers(&ImportRequest::entry("./a"))
        .await
        .unwrap_err();
    assert_eq!(err.component(), Some("bad"));
}

struct Uppercase;

#[async_trait]
impl FileTransformer for Uppercase {
    async fn transform(
        &self,
        file: FileView<'_>,
        _api: &TransformHandle<'_>,
    ) -> Result<Option<TransformOutput>> {
        Ok(Some(TransformOutput {
            contents: file.contents.to_text_lossy().to_uppercase().into(),
            source_map: None,
        }))
    }
}

struct AddImports {
    imports: Vec<&'static str>,
}

#[async_trait]
impl FileTransformer for AddImports {
    async fn transform(
        &self,
        _file: FileView<'_>,
        api: &TransformHandle<'_>,
    ) -> Result<Option<TransformOutput>> {
        for path in &self.imports {
            api.add_import(ImportResolved::new("js", *path))?;
        }
        Ok(None)
    }
}

#[tokio::test]
async fn test_transformer_fold_and_edge_registration() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("a.js");
    std::fs::write(&file_path, "let x = 1;").unwrap();

    let context = context_with(vec![
        Component::file_transformer("upper", 10, Uppercase),
        Component::file_transformer(
            "edges",
            5,
            AddImports {
                imports: vec!["/dep1.js", "/dep2.js", "/dep1.js"],
            },
        ),
    ]);
    let host = TestHost {
        context: context.clone(),
    };
    let result = context
        .invoke_file_transformers(&host, &ImportResolved::new("js", &file_path))
        .await
        .unwrap();

    assert_eq!(result.contents.as_text(), Some("LET X = 1;"));
    // duplicate add collapsed, order of first add kept
    let paths: Vec<_> = result
        .imports
        .iter()
        .map(|i| i.file_path.clone())
        .collect();
    assert_eq!(paths, vec![PathBuf::from("/dep1.js"), PathBuf::from("/dep2.js")]);
}

#[tokio::test]
async fn test_transformer_missing_file_fails() {
    let context = context_with(vec![Component::file_transformer("upper", 0, Uppercase)]);
    let host = TestHost {
        context: context.clone(),
    };
    let err = context
        .invoke_file_transformers(&host, &ImportResolved::new("js", "/does/not/exist.js"))
        .await
        .unwrap_err();
    assert!(matches!(err, BundleError::TransformFailed(_)));
}

struct ResolvingTransformer;

#[async_trait]
impl FileTransformer for ResolvingTransformer {
    async fn transform(
        &self,
        _file: FileView<'_>,
        api: &TransformHandle<'_>,
    ) -> Result<Option<TransformOutput>> {
        let resolution = api.resolve("./dep").await?;
        if let Some(resolved) = resolution.into_resolved() {
            api.add_import(resolved)?;
        }
        Ok(None)
    }
}

#[tokio::test]
async fn test_transformer_resolve_reenters_resolver_chain() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("a.js");
    std::fs::write(&file_path, "import './dep';").unwrap();

    let context = context_with(vec![
        Component::file_resolver("fixed", 0, FixedResolver { path: "/dep.js" }),
        Component::file_transformer("resolving", 0, ResolvingTransformer),
    ]);
    let host = TestHost {
        context: context.clone(),
    };
    let result = context
        .invoke_file_transformers(&host, &ImportResolved::new("js", &file_path))
        .await
        .unwrap();
    assert_eq!(result.imports.len(), 1);
    assert_eq!(result.imports[0].file_path, PathBuf::from("/dep.js"));
}

struct ReplaceJob;

#[async_trait]
impl JobTransformer for ReplaceJob {
    async fn transform(&self, job: &Job) -> Result<Option<Job>> {
        let replacement = job.clone();
        replacement
            .chunks
            .insert(Chunk::labeled("js", "runtime").identity(), Chunk::labeled("js", "runtime"));
        Ok(Some(replacement))
    }
}

#[tokio::test]
async fn test_job_transformer_replaces_job() {
    let context = context_with(vec![Component::job_transformer("inject", 0, ReplaceJob)]);
    let job = context.invoke_job_transformers(Job::new()).await.unwrap();
    assert_eq!(job.chunks.len(), 1);
}

struct FormatGenerator {
    handles: &'static str,
    output: &'static str,
}

#[async_trait]
impl ChunkGenerator for FormatGenerator {
    async fn generate(&self, _job: &Job, chunk: &Chunk) -> Result<Option<GeneratedChunk>> {
        if chunk.format != self.handles {
            return Ok(None);
        }
        Ok(Some(GeneratedChunk {
            format: chunk.format.clone(),
            contents: self.output.into(),
            source_map: None,
        }))
    }
}

#[tokio::test]
async fn test_no_generators_is_fatal() {
    let context = context_with(vec![]);
    let job = Job::new();
    let err = context
        .invoke_chunk_generators(&job, &[Chunk::labeled("js", "vendor")])
        .await
        .unwrap_err();
    assert!(matches!(err, BundleError::GenerateFailed(_)));
}

#[tokio::test]
async fn test_first_successful_generator_wins() {
    let context = context_with(vec![
        Component::chunk_generator("first", 10, FormatGenerator { handles: "js", output: "first" }),
        Component::chunk_generator("second", 5, FormatGenerator { handles: "js", output: "second" }),
    ]);
    let job = Job::new();
    let generated = context
        .invoke_chunk_generators(&job, &[Chunk::labeled("js", "vendor")])
        .await
        .unwrap();
    assert_eq!(generated.outputs.len(), 1);
    assert_eq!(generated.outputs[0].contents.as_text(), Some("first"));
    assert!(generated.outputs[0].file_path.is_some());
}

#[tokio::test]
async fn test_unhandled_chunk_names_it_in_error() {
    let context = context_with(vec![Component::chunk_generator(
        "js-only",
        0,
        FormatGenerator { handles: "js", output: "x" },
    )]);
    let job = Job::new();
    let err = context
        .invoke_chunk_generators(&job, &[Chunk::labeled("css", "styles")])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("styles"));
}

#[tokio::test]
async fn test_suppressed_format_has_no_output_path() {
    let context = context_with(vec![Component::chunk_generator(
        "map-gen",
        0,
        FormatGenerator { handles: "map", output: "{}" },
    )]);
    let job = Job::new();
    let generated = context
        .invoke_chunk_generators(&job, &[Chunk::labeled("map", "maps")])
        .await
        .unwrap();
    assert_eq!(generated.outputs[0].file_path, None);
}

struct Minify;

#[async_trait]
impl ChunkTransformer for Minify {
    async fn transform(&self, output: &ChunkGenerated) -> Result<Option<ChunkTransformOutput>> {
        Ok(Some(ChunkTransformOutput {
            contents: output.contents.to_text_lossy().replace(' ', "").into(),
            source_map: None,
        }))
    }
}

#[tokio::test]
async fn test_chunk_transformer_full_replace() {
    let context = context_with(vec![Component::chunk_transformer("minify", 0, Minify)]);
    let generated = ChunkGenerated {
        chunk: Chunk::labeled("js", "vendor"),
        format: "js".into(),
        contents: "a = 1 ;".into(),
        file_path: Some("vendor.js".into()),
        source_map: Some(bindle_api::SourceMap::new()),
    };
    let result = context.invoke_chunk_transformers(&generated).await.unwrap();
    assert_eq!(result.contents.as_text(), Some("a=1;"));
    // full replace: the transformer returned no map, so none survives
    assert!(result.source_map.is_none());
}

struct Recorder {
    seen: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl IssueReporter for Recorder {
    async fn report(&self, issue: &Issue) {
        self.seen.lock().push(issue.message.clone());
    }
}

#[tokio::test]
async fn test_issue_fan_out_reaches_all_reporters() {
    let first = Arc::new(Mutex::new(Vec::new()));
    let second = Arc::new(Mutex::new(Vec::new()));
    let context = context_with(vec![
        Component::issue_reporter("first", 0, Recorder { seen: first.clone() }),
        Component::issue_reporter("second", 0, Recorder { seen: second.clone() }),
    ]);
    context
        .invoke_issue_reporters(&Issue::error("boom"))
        .await;
    assert_eq!(first.lock().as_slice(), ["boom"]);
    assert_eq!(second.lock().as_slice(), ["boom"]);
}

#[tokio::test]
async fn test_issue_fan_out_without_reporters_is_silent() {
    let context = context_with(vec![]);
    // must not fail or panic
    context
        .invoke_issue_reporters(&Issue::warning("nobody listening"))
        .await;
}

/// A transformer stub that counts its invocations, used by the dedup
/// tests in bindle-core as well; duplicated here in miniature to pin the
/// fold contract.
struct Counting {
    count: Arc<AtomicUsize>,
}

#[async_trait]
impl FileTransformer for Counting {
    async fn transform(
        &self,
        _file: FileView<'_>,
        _api: &TransformHandle<'_>,
    ) -> Result<Option<TransformOutput>> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }
}

#[tokio::test]
async fn test_every_registered_transformer_runs_once_per_invoke() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("a.js");
    std::fs::write(&file_path, "x").unwrap();

    let count = Arc::new(AtomicUsize::new(0));
    let context = context_with(vec![
        Component::file_transformer("count-a", 10, Counting { count: count.clone() }),
        Component::file_transformer("count-b", 5, Counting { count: count.clone() }),
    ]);
    let host = TestHost {
        context: context.clone(),
    };
    context
        .invoke_file_transformers(&host, &ImportResolved::new("js", &file_path))
        .await
        .unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_source_map_injection_is_self_contained() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("a.js");
    std::fs::write(&file_path, "let x = 1;").unwrap();

    struct MapProducer;

    #[async_trait]
    impl FileTransformer for MapProducer {
        async fn transform(
            &self,
            file: FileView<'_>,
            _api: &TransformHandle<'_>,
        ) -> Result<Option<TransformOutput>> {
            let mut map = bindle_api::SourceMap::new();
            map.sources = vec![file.file_path.to_string_lossy().into_owned()];
            map.mappings = "AAAA".into();
            Ok(Some(TransformOutput {
                contents: file.contents.clone(),
                source_map: Some(bindle_api::SourceMapHint::Map(map)),
            }))
        }
    }

    let context = context_with(vec![Component::file_transformer("mapper", 0, MapProducer)]);
    let host = TestHost {
        context: context.clone(),
    };
    let result = context
        .invoke_file_transformers(&host, &ImportResolved::new("js", &file_path))
        .await
        .unwrap();
    let map = bindle_api::SourceMap::from_json(result.source_map.as_deref().unwrap()).unwrap();
    assert_eq!(
        map.sources_content,
        Some(vec![Some("let x = 1;".to_string())])
    );
}
