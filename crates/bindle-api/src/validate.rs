//! Shape validation for component results.
//!
//! The type system rules out most malformed results, but a few semantic
//! constraints remain: empty formats, relative paths, chunks without an
//! identity source. Validators return the full list of violations so a
//! work error can name them all at once.

use crate::types::{Chunk, ImportResolved};

pub fn resolved(resolved: &ImportResolved) -> Vec<String> {
    let mut messages = Vec::new();
    if resolved.format.is_empty() {
        messages.push("format must not be empty".into());
    }
    if resolved.file_path.as_os_str().is_empty() {
        messages.push("file path must not be empty".into());
    } else if !resolved.file_path.is_absolute() {
        messages.push(format!(
            "file path '{}' must be absolute",
            resolved.file_path.display()
        ));
    }
    messages
}

pub fn chunk(chunk: &Chunk) -> Vec<String> {
    let mut messages = Vec::new();
    if chunk.format.is_empty() {
        messages.push("format must not be empty".into());
    }
    if chunk.label.is_none() && chunk.entry.is_none() {
        messages.push("chunk requires either a label or an entry".into());
    }
    for import in &chunk.imports {
        messages.extend(resolved(import));
    }
    messages
}
