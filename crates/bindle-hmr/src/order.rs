//! Acceptance resolution and update ordering.
//!
//! Given the pre-update registry and the set of changed module ids, the
//! algorithm either produces a safe re-evaluation order or rejects the
//! whole batch. Rejection is all-or-nothing: the consumer must fall back
//! to a full reload, never apply a partial update.

use petgraph::algo::toposort;
use petgraph::prelude::DiGraphMap;
use rustc_hash::FxHashSet;

use crate::registry::{ModuleId, ModuleRegistry};

/// How a module relates to an update of `match_against`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acceptance {
    /// Handles the update itself; the walk stops here.
    Direct,
    /// Does not handle it, but some ancestor does.
    Parent,
    /// Neither this module nor any ancestor accepts the update.
    No,
}

/// The whole batch was rejected by at least one module.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("hot update rejected, full reload required (modules: {})", rejected.join(", "))]
pub struct HmrRejected {
    pub rejected: Vec<ModuleId>,
}

/// Resolve how `id` reacts to an update of `match_against`.
///
/// A module absent from the registry is new code with nothing to
/// preserve, so it is always `Direct`. A loaded module without hot
/// state can never be updated in place.
pub fn acceptance(registry: &ModuleRegistry, id: &str, match_against: &str) -> Acceptance {
    let mut visited = FxHashSet::default();
    acceptance_visit(registry, id, match_against, &mut visited)
}

fn acceptance_visit<'a>(
    registry: &'a ModuleRegistry,
    id: &'a str,
    match_against: &str,
    visited: &mut FxHashSet<&'a str>,
) -> Acceptance {
    // A parent cycle that never reaches an accepting module is a "no".
    if !visited.insert(id) {
        return Acceptance::No;
    }
    let Some(record) = registry.get(id) else {
        return Acceptance::Direct;
    };
    let Some(hot) = &record.hot else {
        return Acceptance::No;
    };
    if hot.declines(match_against) {
        return Acceptance::No;
    }
    if hot.accepts(match_against) {
        return Acceptance::Direct;
    }
    let propagates = record
        .parents
        .iter()
        .any(|parent| acceptance_visit(registry, parent, match_against, visited) != Acceptance::No);
    if propagates {
        Acceptance::Parent
    } else {
        Acceptance::No
    }
}

/// Compute the re-evaluation order for a changed-module batch.
///
/// Walks upward from every changed id recording (module, parent) edges,
/// stopping each walk at a `Direct` module. Any `No` anywhere rejects
/// the batch. The result is dependency-first: a module always runs after
/// the modules it requires have been refreshed.
pub fn update_order(
    registry: &ModuleRegistry,
    changed: &[ModuleId],
) -> Result<Vec<ModuleId>, HmrRejected> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    let mut rejected: Vec<ModuleId> = Vec::new();
    let mut seen: FxHashSet<&str> = FxHashSet::default();

    fn walk<'a>(
        registry: &'a ModuleRegistry,
        graph: &mut DiGraphMap<&'a str, ()>,
        seen: &mut FxHashSet<&'a str>,
        rejected: &mut Vec<ModuleId>,
        id: &'a str,
    ) {
        if !seen.insert(id) {
            return;
        }
        let result = acceptance(registry, id, id);
        if result == Acceptance::No {
            rejected.push(id.to_owned());
        }
        graph.add_node(id);
        if result == Acceptance::Direct {
            return;
        }
        if let Some(record) = registry.get(id) {
            for parent in &record.parents {
                graph.add_edge(id, parent.as_str(), ());
                walk(registry, graph, seen, rejected, parent);
            }
        }
    }

    for id in changed {
        walk(registry, &mut graph, &mut seen, &mut rejected, id);
    }

    if !rejected.is_empty() {
        rejected.sort();
        return Err(HmrRejected { rejected });
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(str::to_owned).collect()),
        // Mutually-parenting modules cannot be ordered; treat like a
        // rejection so the consumer reloads.
        Err(cycle) => Err(HmrRejected {
            rejected: vec![cycle.node_id().to_owned()],
        }),
    }
}
