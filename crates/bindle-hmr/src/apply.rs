//! Driving an accepted update through the runtime.
//!
//! The runtime itself (module cache, factory table, chunk loader) lives
//! outside this crate; `ModuleRuntime` is the seam it implements. The
//! per-module lifecycle is fixed: dispose hooks of the outgoing
//! instance, install the new body, re-require from the synthetic root,
//! success hooks of the incoming instance.

use crate::order::{HmrRejected, update_order};
use crate::registry::{ModuleId, ModuleRegistry};

/// Runtime operations needed to land one module update.
pub trait ModuleRuntime {
    /// Whether the runtime hosts this id at all. Ids it does not host
    /// (e.g. a stylesheet in a script runtime) are skipped.
    fn has_module(&self, id: &str) -> bool;
    /// Run the outgoing instance's dispose hooks.
    fn dispose(&mut self, id: &str);
    /// Install the freshly fetched module body.
    fn install(&mut self, id: &str);
    /// Re-evaluate the module from the synthetic root.
    fn require_from_root(&mut self, id: &str);
    /// Run the incoming instance's success hooks.
    fn success(&mut self, id: &str);
}

/// Order the batch and land it module by module.
///
/// Returns the applied order. A rejection leaves the runtime untouched;
/// nothing is applied partially.
pub fn apply_update(
    registry: &ModuleRegistry,
    runtime: &mut dyn ModuleRuntime,
    changed: &[ModuleId],
) -> Result<Vec<ModuleId>, HmrRejected> {
    let order = update_order(registry, changed)?;
    for id in &order {
        if !runtime.has_module(id) {
            tracing::debug!(module = %id, "skipping update for module the runtime does not host");
            continue;
        }
        // Only a previously loaded instance has hooks to run.
        let loaded = registry.contains(id);
        if loaded {
            runtime.dispose(id);
        }
        runtime.install(id);
        runtime.require_from_root(id);
        if loaded {
            runtime.success(id);
        }
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ModuleRecord;
    use rustc_hash::FxHashSet;

    #[derive(Default)]
    struct RecordingRuntime {
        hosted: FxHashSet<String>,
        calls: Vec<String>,
    }

    impl RecordingRuntime {
        fn hosting(ids: &[&str]) -> Self {
            Self {
                hosted: ids.iter().map(|id| (*id).to_owned()).collect(),
                calls: Vec::new(),
            }
        }
    }

    impl ModuleRuntime for RecordingRuntime {
        fn has_module(&self, id: &str) -> bool {
            self.hosted.contains(id)
        }
        fn dispose(&mut self, id: &str) {
            self.calls.push(format!("dispose {id}"));
        }
        fn install(&mut self, id: &str) {
            self.calls.push(format!("install {id}"));
        }
        fn require_from_root(&mut self, id: &str) {
            self.calls.push(format!("require {id}"));
        }
        fn success(&mut self, id: &str) {
            self.calls.push(format!("success {id}"));
        }
    }

    #[test]
    fn test_lifecycle_order_per_module() {
        let mut registry = ModuleRegistry::new();
        registry.insert("/a.js", ModuleRecord::with_parents(vec![]).accepting("*"));
        let mut runtime = RecordingRuntime::hosting(&["/a.js"]);

        let order = apply_update(&registry, &mut runtime, &["/a.js".into()]).unwrap();
        assert_eq!(order, vec!["/a.js".to_string()]);
        assert_eq!(
            runtime.calls,
            vec!["dispose /a.js", "install /a.js", "require /a.js", "success /a.js"]
        );
    }

    #[test]
    fn test_new_module_skips_instance_hooks() {
        let registry = ModuleRegistry::new();
        let mut runtime = RecordingRuntime::hosting(&["/new.js"]);

        apply_update(&registry, &mut runtime, &["/new.js".into()]).unwrap();
        assert_eq!(runtime.calls, vec!["install /new.js", "require /new.js"]);
    }

    #[test]
    fn test_unhosted_module_is_skipped() {
        let mut registry = ModuleRegistry::new();
        registry.insert("/style.css", ModuleRecord::with_parents(vec![]).accepting("*"));
        let mut runtime = RecordingRuntime::hosting(&[]);

        let order = apply_update(&registry, &mut runtime, &["/style.css".into()]).unwrap();
        assert_eq!(order, vec!["/style.css".to_string()]);
        assert!(runtime.calls.is_empty());
    }

    #[test]
    fn test_rejection_leaves_runtime_untouched() {
        let mut registry = ModuleRegistry::new();
        registry.insert("/a.js", ModuleRecord::with_parents(vec![]));
        let mut runtime = RecordingRuntime::hosting(&["/a.js"]);

        assert!(apply_update(&registry, &mut runtime, &["/a.js".into()]).is_err());
        assert!(runtime.calls.is_empty());
    }
}
