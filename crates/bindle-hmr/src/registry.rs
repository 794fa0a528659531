//! The client-side module registry model.
//!
//! This mirrors what a runtime's module cache knows about each loaded
//! module: who required it, and what hot-update declarations its last
//! execution made. The registry the ordering algorithm consults is
//! always the one captured *before* the update lands.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Module ids are the module's public path within the bundle.
pub type ModuleId = String;

/// Matches any dependency in accept/decline declarations.
pub const WILDCARD: &str = "*";

/// Hot-update declarations made by a module's last execution.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HotState {
    /// Dependency ids (or `"*"`) this module accepts updates for.
    pub accepted: Vec<String>,
    /// Dependency ids (or `"*"`) this module refuses updates for.
    pub declined: Vec<String>,
    /// Opaque state handed from the outgoing instance to the incoming one.
    pub data: serde_json::Value,
}

impl HotState {
    pub fn accepts(&self, id: &str) -> bool {
        self.accepted.iter().any(|a| a == WILDCARD || a == id)
    }

    pub fn declines(&self, id: &str) -> bool {
        self.declined.iter().any(|d| d == WILDCARD || d == id)
    }
}

/// One loaded module as the ordering algorithm sees it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleRecord {
    /// Modules that required this one. Updates propagate upward through
    /// these edges.
    pub parents: Vec<ModuleId>,
    /// `None` for modules that opted out of hot updates entirely.
    pub hot: Option<HotState>,
}

impl ModuleRecord {
    pub fn with_parents(parents: Vec<ModuleId>) -> Self {
        Self {
            parents,
            hot: Some(HotState::default()),
        }
    }

    pub fn accepting(mut self, dependency: impl Into<String>) -> Self {
        self.hot
            .get_or_insert_with(HotState::default)
            .accepted
            .push(dependency.into());
        self
    }

    pub fn declining(mut self, dependency: impl Into<String>) -> Self {
        self.hot
            .get_or_insert_with(HotState::default)
            .declined
            .push(dependency.into());
        self
    }

    pub fn without_hot(mut self) -> Self {
        self.hot = None;
        self
    }
}

/// Snapshot of the runtime's module cache at the moment an update frame
/// arrives.
#[derive(Clone, Debug, Default)]
pub struct ModuleRegistry {
    modules: FxHashMap<ModuleId, ModuleRecord>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<ModuleId>, record: ModuleRecord) {
        self.modules.insert(id.into(), record);
    }

    pub fn get(&self, id: &str) -> Option<&ModuleRecord> {
        self.modules.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.modules.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
