//! Subscriber setup for embedders, behind the `logging` feature.
//!
//! bindle is a library first: the engine only emits `tracing` events
//! and expects the host application to install its own subscriber.
//! These helpers cover binaries and test harnesses that just want the
//! engine's output on stderr without wiring one up themselves.

use std::sync::Once;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// How much of the engine's output to surface.
///
/// The engine logs at four levels and has no info-level output:
/// errors (issues with no reporter to receive them), warnings (cache
/// snapshot failures), debug (pool and pass lifecycle), and trace
/// (per-file cache lookups).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verbosity {
    Silent,
    Errors,
    /// Errors plus warnings, the default.
    #[default]
    Warnings,
    /// Adds pool initialization, cache hydration and pass lifecycle.
    Lifecycle,
    /// Everything, including per-file cache lookups. Very noisy.
    Everything,
}

impl Verbosity {
    fn directive(self) -> &'static str {
        match self {
            Verbosity::Silent => "off",
            Verbosity::Errors => "error",
            Verbosity::Warnings => "warn",
            Verbosity::Lifecycle => "debug",
            Verbosity::Everything => "trace",
        }
    }
}

impl std::str::FromStr for Verbosity {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "silent" | "off" => Ok(Verbosity::Silent),
            "errors" | "error" => Ok(Verbosity::Errors),
            "warnings" | "warn" => Ok(Verbosity::Warnings),
            "lifecycle" | "debug" => Ok(Verbosity::Lifecycle),
            "everything" | "trace" => Ok(Verbosity::Everything),
            other => Err(format!("unknown verbosity '{other}'")),
        }
    }
}

impl std::fmt::Display for Verbosity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.directive())
    }
}

/// Install a global subscriber at the given verbosity.
///
/// Safe to call from multiple threads and more than once; only the
/// first call takes effect. `RUST_LOG` directives still apply on top,
/// so a single crate's events can be raised or silenced selectively.
pub fn init_logging(verbosity: Verbosity) {
    init_with_filter(
        EnvFilter::builder()
            .with_default_directive(verbosity.directive().parse().unwrap())
            .from_env_lossy(),
    );
}

/// Install a global subscriber configured entirely from `RUST_LOG`,
/// falling back to [`Verbosity::Warnings`] when unset or invalid.
pub fn init_logging_from_env() {
    init_with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(Verbosity::default().directive().parse().unwrap())
            .from_env_lossy()
    }));
}

fn init_with_filter(filter: EnvFilter) {
    INIT.call_once(|| {
        tracing_subscriber::registry()
            .with(filter)
            // targets distinguish cache events from dispatch events;
            // timestamps are left to the embedder's own subscriber
            .with(fmt::layer().compact().with_target(true).without_time())
            .init();
    });
}
