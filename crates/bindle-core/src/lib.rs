//! # bindle-core
//!
//! Build orchestration for the bindle bundler: the worker pool, the
//! transform cache and the recursive chunk/file graph traversal that
//! turns configured entries into generated outputs.
//!
//! The component contracts this engine drives live in `bindle-api`.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bindle_api::{BundleConfig, ComponentRegistry, Context};
//! use bindle_core::Master;
//!
//! # async fn run(components: ComponentRegistry) -> bindle_api::Result<()> {
//! let config = BundleConfig::new("/project").with_entry("./src/index.js");
//! let master = Master::new(Arc::new(Context::new(config, components)));
//! master.initialize().await?;
//! let generated = master.execute().await?;
//! for output in &generated.outputs {
//!     println!("{:?}", output.file_path);
//! }
//! master.dispose();
//! # Ok(())
//! # }
//! ```

pub mod cache;
#[cfg(feature = "logging")]
pub mod logging;
pub mod master;
pub mod worker;

pub use cache::{Cache, CacheStorage, FileStorage, NullStorage};
pub use master::{Master, TickCallback};
pub use worker::WorkerDelegate;
