//! Identity keys for files and chunks.
//!
//! An identity is a deterministic function of resolution identity
//! (format + path-or-label), never of content. Repeat resolution of the
//! same logical file yields the same key, which is what caching, the
//! per-pass lock set and de-duplication all rely on.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Chunk, ImportResolved};

/// Identity key of a file or chunk within a build pass.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(String);

impl Identity {
    pub fn of_file(resolved: &ImportResolved) -> Self {
        let hash = seahash::hash(resolved.file_path.to_string_lossy().as_bytes());
        Identity(format!("file_{}_{}", resolved.format, hash))
    }

    pub fn of_chunk(chunk: &Chunk) -> Self {
        Identity(format!("chunk_{}_{}", chunk.format, chunk_hash(chunk)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Short hash of a chunk's label-or-entry, used for the `[id]` output
/// placeholder and for entry-less output names.
pub fn chunk_hash(chunk: &Chunk) -> String {
    let source = chunk
        .label
        .clone()
        .or_else(|| chunk.entry.as_ref().map(|p| p.to_string_lossy().into_owned()))
        .unwrap_or_default();
    seahash::hash(source.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_identity_is_deterministic() {
        let a = ImportResolved::new("js", "/src/a.js");
        let b = ImportResolved::new("js", "/src/a.js");
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn test_distinct_paths_distinct_keys() {
        let a = ImportResolved::new("js", "/src/a.js");
        let b = ImportResolved::new("js", "/src/b.js");
        assert_ne!(a.identity(), b.identity());
    }

    #[test]
    fn test_format_is_part_of_identity() {
        let js = ImportResolved::new("js", "/src/a.js");
        let css = ImportResolved::new("css", "/src/a.js");
        assert_ne!(js.identity(), css.identity());
    }

    #[test]
    fn test_chunk_identity_from_label_or_entry() {
        let labeled = Chunk::labeled("js", "vendor");
        let same_label = Chunk::labeled("js", "vendor");
        assert_eq!(labeled.identity(), same_label.identity());

        let entry = Chunk::new("js", None, Some("/src/a.js".into())).unwrap();
        assert_ne!(labeled.identity(), entry.identity());
    }

    #[test]
    fn test_identity_ignores_content_only_fields() {
        let resolved = ImportResolved::new("js", "/src/a.js");
        let mut chunk = Chunk::entry_chunk(&resolved);
        let before = chunk.identity();
        chunk.imports.push(ImportResolved::new("js", "/src/b.js"));
        assert_eq!(before, chunk.identity());
    }
}
