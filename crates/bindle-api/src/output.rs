//! Public output path computation.
//!
//! The output config is a table of glob-style patterns over chunk
//! formats. Longest pattern wins. A `false` value suppresses output for
//! matching chunks; a template value supports `[format]`, `[name]`,
//! `[ext]` and `[id]` placeholders filled from the chunk's entry path,
//! falling back to its identity hash when the chunk has no entry.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{BundleError, Result};
use crate::identity::chunk_hash;
use crate::types::Chunk;

/// Value side of the output-format table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputPattern {
    /// Template string with placeholders.
    Template(String),
    /// `false` in config: emit nothing for chunks of this format.
    Suppress(bool),
}

/// Glob-pattern table mapping chunk formats to output templates.
pub type OutputFormats = IndexMap<String, OutputPattern>;

static PATTERN_CACHE: Lazy<Mutex<FxHashMap<String, Regex>>> =
    Lazy::new(|| Mutex::new(FxHashMap::default()));

fn glob_regex(pattern: &str) -> Result<Regex> {
    if let Some(regex) = PATTERN_CACHE.lock().get(pattern) {
        return Ok(regex.clone());
    }
    let mut source = String::with_capacity(pattern.len() + 2);
    source.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');
    let regex = Regex::new(&source)
        .map_err(|err| BundleError::Config(format!("invalid format pattern '{pattern}': {err}")))?;
    PATTERN_CACHE.lock().insert(pattern.to_owned(), regex.clone());
    Ok(regex)
}

/// Compute the public file name for a chunk, or `None` when the matched
/// pattern suppresses output.
pub fn get_file_name(formats: &OutputFormats, chunk: &Chunk) -> Result<Option<String>> {
    let mut keys: Vec<&String> = formats.keys().collect();
    keys.sort_by_key(|key| std::cmp::Reverse(key.len()));

    let mut matched = None;
    for key in keys {
        if glob_regex(key)?.is_match(&chunk.format) {
            matched = Some(key);
            break;
        }
    }
    let Some(key) = matched else {
        return Err(BundleError::generate_failed(format!(
            "unable to find an output path for format '{}'",
            chunk.format
        )));
    };

    let template = match &formats[key] {
        OutputPattern::Suppress(_) => return Ok(None),
        OutputPattern::Template(template) => template,
    };

    let hash = chunk_hash(chunk);
    let (name, ext) = match &chunk.entry {
        Some(entry) => (
            entry
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| hash.clone()),
            entry
                .extension()
                .map(|ext| format!(".{}", ext.to_string_lossy()))
                .unwrap_or_default(),
        ),
        None => (hash.clone(), String::new()),
    };

    Ok(Some(
        template
            .replace("[format]", &chunk.format)
            .replace("[name]", &name)
            .replace("[ext]", &ext)
            .replace("[id]", &hash),
    ))
}
