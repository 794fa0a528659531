//! Build orchestration.
//!
//! `Master` owns the worker pool and the cache and drives whole build
//! passes: resolve entries, walk the chunk/file graph recursively,
//! fold job transformers, then generate outputs. Resolution always runs
//! on a dedicated worker so resolver components keep exclusive state;
//! transforms fan out over the remaining workers.

use std::collections::VecDeque;
use std::sync::Arc;

use bindle_api::{
    BundleError, Chunk, ChunkGenerated, ChunkTransformOutput, ChunksGenerated, Context, Identity,
    ImportRequest, ImportResolved, Issue, Job, PipelineHost, Resolution, Result, SourceMap,
    TransformedFile,
};
use dashmap::DashSet;
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use futures::stream::{self, StreamExt, TryStreamExt};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::cache::{Cache, CacheStorage, NullStorage};
use crate::worker::WorkerDelegate;

/// Bound for chunk-transformer fan-out during generation.
const GENERATE_CONCURRENCY: usize = 8;

/// Invoked once per freshly transformed file, with the previous state of
/// that identity when one existed in the job.
pub type TickCallback = Arc<
    dyn Fn(Option<TransformedFile>, TransformedFile) -> BoxFuture<'static, Result<()>>
        + Send
        + Sync,
>;

/// A deferred transform unit waiting for an idle worker. The dispatcher
/// supplies the worker and the host when it runs the task.
type QueuedTask =
    Box<dyn for<'a> FnOnce(&'a WorkerDelegate, &'a dyn PipelineHost) -> BoxFuture<'a, ()> + Send>;

/// Per-pass traversal state.
///
/// The lock set guarantees each identity is visited at most once per
/// pass even when the graph has cycles or diamond-shaped imports. The
/// changed set forces a fresh transform for identities the caller knows
/// are stale; an identity is removed from it the moment its re-transform
/// begins, so sibling visits in the same pass reuse the fresh result.
struct Pass {
    locks: DashSet<Identity>,
    changed: DashSet<Identity>,
    tick: Option<TickCallback>,
}

impl Pass {
    fn new(changed: impl IntoIterator<Item = Identity>, tick: Option<TickCallback>) -> Self {
        Self {
            locks: DashSet::new(),
            changed: changed.into_iter().collect(),
            tick,
        }
    }
}

pub struct Master {
    context: Arc<Context>,
    cache: Cache,
    resolver_worker: WorkerDelegate,
    transform_workers: Vec<WorkerDelegate>,
    queue: Mutex<VecDeque<QueuedTask>>,
}

impl Master {
    pub fn new(context: Arc<Context>) -> Self {
        Self::with_cache_storage(context, Arc::new(NullStorage))
    }

    pub fn with_cache_storage(context: Arc<Context>, storage: Arc<dyn CacheStorage>) -> Self {
        let transform_workers = (0..default_worker_count())
            .map(|_| WorkerDelegate::new(context.clone()))
            .collect();
        Self {
            resolver_worker: WorkerDelegate::new(context.clone()),
            cache: Cache::new(storage),
            transform_workers,
            queue: Mutex::new(VecDeque::new()),
            context,
        }
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn transform_worker_count(&self) -> usize {
        self.transform_workers.len()
    }

    /// Hydrate the cache and spawn every worker. Idempotent while the
    /// pool is alive; any spawn failure disposes the whole pool.
    pub async fn initialize(&self) -> Result<()> {
        let workers = std::iter::once(&self.resolver_worker).chain(&self.transform_workers);
        let spawns = future::join_all(workers.map(|worker| async move {
            if worker.is_alive() {
                return Ok(());
            }
            worker.spawn().await
        }));
        let (_, results) = futures::join!(self.cache.load(), spawns);
        if let Some(err) = results.into_iter().find_map(Result::err) {
            self.dispose();
            return Err(err);
        }
        tracing::debug!(
            transform_workers = self.transform_workers.len(),
            "worker pool initialized"
        );
        Ok(())
    }

    /// Tear the pool down. Idempotent; queued work that never ran fails
    /// its caller with [`BundleError::PoolDisposed`].
    pub fn dispose(&self) {
        self.resolver_worker.dispose();
        for worker in &self.transform_workers {
            worker.dispose();
        }
        self.queue.lock().clear();
    }

    /// Run one full build pass over the configured entries.
    pub async fn execute(&self) -> Result<ChunksGenerated> {
        self.execute_with_tick(None).await
    }

    /// Like [`Self::execute`], invoking `tick` for every file that is
    /// genuinely re-transformed during the pass.
    pub async fn execute_with_tick(&self, tick: Option<TickCallback>) -> Result<ChunksGenerated> {
        let result = self.try_execute(tick).await;
        self.offer_to_reporters(result).await
    }

    async fn try_execute(&self, tick: Option<TickCallback>) -> Result<ChunksGenerated> {
        let job = Job::new();
        self.build_graph(&job, tick).await?;
        let job = self.context.invoke_job_transformers(job).await?;
        self.generate(&job, None).await
    }

    /// Every work error is offered to the issue reporters before it
    /// surfaces to the caller.
    async fn offer_to_reporters<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_work() {
                self.context.invoke_issue_reporters(&Issue::from(err)).await;
            }
        }
        result
    }

    /// Resolve the configured entries and walk their graphs into `job`.
    ///
    /// Watch-style embedders drive this directly and keep the job alive
    /// across passes; [`Self::execute`] uses it with a throwaway job.
    pub async fn build(&self, job: &Job, tick: Option<TickCallback>) -> Result<()> {
        let result = self.build_graph(job, tick).await;
        self.offer_to_reporters(result).await
    }

    async fn build_graph(&self, job: &Job, tick: Option<TickCallback>) -> Result<()> {
        self.context.config().validate()?;

        let entries = self.context.config().entries.clone();
        let resolved = future::try_join_all(
            entries
                .iter()
                .map(|entry| self.resolve_strict(ImportRequest::entry(entry.clone()))),
        )
        .await?;

        let pass = Pass::new(Vec::new(), tick);
        future::try_join_all(
            resolved
                .iter()
                .map(|entry| self.transform_chunk(job, Chunk::entry_chunk(entry), &pass)),
        )
        .await?;
        Ok(())
    }

    /// Re-run a previous job after `changed` identities went stale.
    ///
    /// Every chunk already in the job is walked again; unchanged files
    /// are reused from the job itself, changed ones are re-transformed
    /// (with `tick` observing each old/new pair).
    pub async fn transform_job(
        &self,
        job: &Job,
        changed: impl IntoIterator<Item = Identity>,
        tick: Option<TickCallback>,
    ) -> Result<()> {
        let pass = Pass::new(changed, tick);
        let chunks = job.chunk_list();
        let walked = future::try_join_all(
            chunks
                .into_iter()
                .map(|chunk| self.transform_chunk(job, chunk, &pass)),
        )
        .await
        .map(|_| ());
        self.offer_to_reporters(walked).await
    }

    /// Generate outputs for `chunks` (all job chunks when `None`) and
    /// fold chunk transformers over each output.
    pub async fn generate(
        &self,
        job: &Job,
        chunks: Option<Vec<Chunk>>,
    ) -> Result<ChunksGenerated> {
        let chunks = chunks.unwrap_or_else(|| job.chunk_list());
        let generated = self.context.invoke_chunk_generators(job, &chunks).await?;

        let outputs = stream::iter(generated.outputs.into_iter())
            .map(|output| async move {
                let update = self.transform_chunk_generated(&output).await?;
                Ok::<_, BundleError>(merge_generated(output, update))
            })
            .buffer_unordered(GENERATE_CONCURRENCY)
            .try_collect()
            .await?;

        Ok(ChunksGenerated {
            root_directory: generated.root_directory,
            outputs,
        })
    }

    /// Resolve a request on the dedicated resolver worker.
    pub async fn resolve(&self, request: ImportRequest) -> Result<Resolution> {
        self.resolver_worker.resolve(&request).await
    }

    /// Resolve, treating a refusal as a hard failure. Entries and other
    /// must-bundle requests go through here.
    pub async fn resolve_strict(&self, request: ImportRequest) -> Result<ImportResolved> {
        let origin = request
            .request_file
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "root".into());
        match self.resolve(request.clone()).await? {
            Resolution::Resolved(resolved) => Ok(resolved),
            Resolution::Refused { .. } => Err(BundleError::resolve_failed(format!(
                "resolution of '{}' from '{}' was refused",
                request.request, origin
            ))),
        }
    }

    pub async fn report(&self, issue: Issue) {
        self.context.invoke_issue_reporters(&issue).await;
    }

    fn transform_chunk<'a>(
        &'a self,
        job: &'a Job,
        chunk: Chunk,
        pass: &'a Pass,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let key = chunk.identity();
            if pass.locks.contains(&key) {
                return Ok(());
            }
            // A pass with no stale identities can trust chunks the job
            // already holds.
            if pass.changed.is_empty() && job.chunks.contains_key(&key) {
                return Ok(());
            }
            pass.locks.insert(key.clone());
            job.chunks.insert(key.clone(), chunk.clone());

            let mut files = chunk.imports.clone();
            if let Some(entry) = &chunk.entry {
                files.push(
                    ImportResolved::new(chunk.format.clone(), entry.clone())
                        .with_meta(chunk.meta.clone()),
                );
            }
            let walked = future::try_join_all(
                files
                    .into_iter()
                    .map(|file| self.transform_file_tree(job, file, pass)),
            )
            .await;
            if let Err(err) = walked {
                // A failing subtree must not leave a half-built chunk in
                // the job.
                job.chunks.remove(&key);
                return Err(err);
            }
            Ok(())
        }
        .boxed()
    }

    fn transform_file_tree<'a>(
        &'a self,
        job: &'a Job,
        request: ImportResolved,
        pass: &'a Pass,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let key = request.identity();
            if !pass.locks.insert(key.clone()) {
                return Ok(());
            }
            let file_changed = pass.changed.contains(&key);
            let old_file = job.files.get(&key).map(|entry| entry.value().clone());

            let cached_file = if file_changed {
                None
            } else {
                self.cache.get_file(&request)
            };

            let mut fresh = false;
            let new_file = match (&old_file, cached_file) {
                (Some(old), _) if !file_changed => old.clone(),
                (_, Some(cached)) => {
                    job.files.insert(key.clone(), cached.clone());
                    cached
                }
                _ => {
                    pass.changed.remove(&key);
                    let transformed = self.transform_file(&request).await?;
                    job.files.insert(key.clone(), transformed.clone());
                    self.cache.set_file(&request, transformed.clone());
                    fresh = true;
                    transformed
                }
            };

            let imports = new_file.imports.clone();
            let chunks = new_file.chunks.clone();
            futures::try_join!(
                future::try_join_all(
                    imports
                        .into_iter()
                        .map(|import| self.transform_file_tree(job, import, pass)),
                ),
                future::try_join_all(
                    chunks
                        .into_iter()
                        .map(|chunk| self.transform_chunk(job, chunk, pass)),
                ),
            )?;

            if fresh {
                if let Some(tick) = &pass.tick {
                    tick(old_file, new_file).await?;
                }
            }
            Ok(())
        }
        .boxed()
    }

    async fn transform_file(&self, request: &ImportResolved) -> Result<TransformedFile> {
        let request = request.clone();
        self.queued_process(move |worker, host| {
            async move { worker.transform_file(host, &request).await }.boxed()
        })
        .await
    }

    async fn transform_chunk_generated(
        &self,
        generated: &ChunkGenerated,
    ) -> Result<ChunkTransformOutput> {
        let generated = generated.clone();
        self.queued_process(move |worker, _host| {
            async move { worker.transform_chunk_generated(&generated).await }.boxed()
        })
        .await
    }

    /// Greedy least-loaded dispatch: run on the first idle transform
    /// worker, or park the unit until one frees up. A worker finishing a
    /// unit drains the deferred queue in FIFO order before going idle.
    async fn queued_process<T, F>(&self, run: F) -> Result<T>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a WorkerDelegate, &'a dyn PipelineHost) -> BoxFuture<'a, Result<T>>
            + Send
            + 'static,
    {
        if !self.transform_workers.iter().any(WorkerDelegate::is_alive) {
            return Err(BundleError::PoolDisposed);
        }
        let idle = self
            .transform_workers
            .iter()
            .find(|worker| worker.is_alive() && worker.busy() == 0);

        match idle {
            Some(worker) => {
                let result = {
                    let _unit = worker.begin();
                    run(worker, self).await
                };
                self.drain_queue(worker).await;
                result
            }
            None => {
                let (sender, receiver) = oneshot::channel();
                let task: QueuedTask = Box::new(move |worker, host| {
                    async move {
                        let _ = sender.send(run(worker, host).await);
                    }
                    .boxed()
                });
                self.queue.lock().push_back(task);
                receiver.await.map_err(|_| BundleError::PoolDisposed)?
            }
        }
    }

    async fn drain_queue(&self, worker: &WorkerDelegate) {
        loop {
            // Scoped so the lock never crosses an await.
            let task = { self.queue.lock().pop_front() };
            let Some(task) = task else { break };
            let _unit = worker.begin();
            task(worker, self).await;
        }
    }
}

#[async_trait::async_trait]
impl PipelineHost for Master {
    async fn resolve(&self, request: ImportRequest) -> Result<Resolution> {
        self.resolver_worker.resolve(&request).await
    }

    async fn report(&self, issue: Issue) {
        self.context.invoke_issue_reporters(&issue).await;
    }
}

fn default_worker_count() -> usize {
    #[cfg(not(target_family = "wasm"))]
    {
        num_cpus::get().max(1)
    }
    #[cfg(target_family = "wasm")]
    {
        1
    }
}

/// Field-wise merge of a generated output with its transformer fold.
/// Contents are always the fold's; source map fields from the fold win
/// over the generator's where both are present.
fn merge_generated(output: ChunkGenerated, update: ChunkTransformOutput) -> ChunkGenerated {
    let source_map = match (output.source_map, update.source_map) {
        (None, None) => None,
        (Some(base), None) => Some(base),
        (None, Some(over)) => Some(over),
        (Some(base), Some(over)) => Some(SourceMap {
            version: over.version,
            file: over.file.or(base.file),
            sources: if over.sources.is_empty() { base.sources } else { over.sources },
            sources_content: over.sources_content.or(base.sources_content),
            names: if over.names.is_empty() { base.names } else { over.names },
            mappings: if over.mappings.is_empty() { base.mappings } else { over.mappings },
        }),
    };
    ChunkGenerated {
        contents: update.contents,
        source_map,
        ..output
    }
}
