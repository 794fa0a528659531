//! A single worker's handle.
//!
//! Each delegate wraps the shared `Context` for one isolated execution
//! unit and tracks its in-flight load; the master's dispatcher picks the
//! first delegate with zero in-flight units. Disposal is terminal: a
//! disposed delegate refuses all further work.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bindle_api::{
    BundleError, ChunkGenerated, ChunkTransformOutput, Context, ImportRequest, ImportResolved,
    PipelineHost, Resolution, Result, TransformedFile,
};

pub struct WorkerDelegate {
    context: Arc<Context>,
    busy: AtomicUsize,
    alive: AtomicBool,
    disposed: AtomicBool,
}

/// Decrements the in-flight count when a unit of work finishes.
pub(crate) struct BusyGuard<'a>(&'a WorkerDelegate);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.busy.fetch_sub(1, Ordering::SeqCst);
    }
}

impl WorkerDelegate {
    pub fn new(context: Arc<Context>) -> Self {
        Self {
            context,
            busy: AtomicUsize::new(0),
            alive: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    pub async fn spawn(&self) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(BundleError::PoolDisposed);
        }
        self.alive.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Idempotent, best-effort teardown. In-flight futures are abandoned,
    /// not cancelled with a signaled error.
    pub fn dispose(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.disposed.store(true, Ordering::SeqCst);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Number of in-flight work units.
    pub fn busy(&self) -> usize {
        self.busy.load(Ordering::SeqCst)
    }

    pub(crate) fn begin(&self) -> BusyGuard<'_> {
        self.busy.fetch_add(1, Ordering::SeqCst);
        BusyGuard(self)
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(BundleError::PoolDisposed)
        }
    }

    pub async fn resolve(&self, request: &ImportRequest) -> Result<Resolution> {
        self.ensure_alive()?;
        self.context.invoke_file_resolvers(request).await
    }

    pub async fn transform_file(
        &self,
        host: &dyn PipelineHost,
        request: &ImportResolved,
    ) -> Result<TransformedFile> {
        self.ensure_alive()?;
        let result = self.context.invoke_file_transformers(host, request).await?;
        Ok(TransformedFile {
            resolved: request.clone(),
            contents: result.contents,
            source_map: result.source_map,
            imports: result.imports,
            chunks: result.chunks,
        })
    }

    pub async fn transform_chunk_generated(
        &self,
        generated: &ChunkGenerated,
    ) -> Result<ChunkTransformOutput> {
        self.ensure_alive()?;
        self.context.invoke_chunk_transformers(generated).await
    }
}
