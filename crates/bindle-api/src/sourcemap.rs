//! Source map model and accumulation policy for the transformer fold.
//!
//! Maps use the standard JSON shape (version 3). The fold tracks three
//! states: tracking disabled, no map yet, or a present map. Once a
//! transformer disables tracking it stays disabled for the rest of the
//! fold. When a transformer produces a map on top of an existing one,
//! the new map's mappings are rebased through the prior map so the
//! result points at the original sources.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// A standard JSON source map.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_content: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub mappings: String,
}

fn default_version() -> u32 {
    3
}

impl SourceMap {
    pub fn new() -> Self {
        Self {
            version: 3,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Running source-map state during the transformer fold.
#[derive(Clone, Debug, PartialEq)]
pub enum SourceMapState {
    /// A transformer turned tracking off; stays off for the rest of the fold.
    Disabled,
    /// No map yet.
    Absent,
    Present(SourceMap),
}

/// A transformer's source-map contribution.
#[derive(Clone, Debug, PartialEq)]
pub enum SourceMapHint {
    /// Disable tracking from this point on.
    Disable,
    Map(SourceMap),
}

impl SourceMapState {
    /// Accumulation table for one fold step.
    pub fn apply(self, update: Option<SourceMapHint>) -> Self {
        match (self, update) {
            (SourceMapState::Disabled, _) => SourceMapState::Disabled,
            (_, Some(SourceMapHint::Disable)) => SourceMapState::Disabled,
            (SourceMapState::Absent, Some(SourceMapHint::Map(map))) => {
                SourceMapState::Present(map)
            }
            (SourceMapState::Present(prior), Some(SourceMapHint::Map(new))) => {
                SourceMapState::Present(compose(&prior, &new))
            }
            // A transformer that rewrote contents without producing a map
            // invalidates whatever map came before it.
            (_, None) => SourceMapState::Absent,
        }
    }

    pub fn into_map(self) -> Option<SourceMap> {
        match self {
            SourceMapState::Present(map) => Some(map),
            _ => None,
        }
    }
}

/// Make a map self-contained: if its source list names the original file,
/// inject the original contents into the contents side-table.
pub fn inject_source_contents(map: &mut SourceMap, file_path: &Path, contents: &str) {
    let path = file_path.to_string_lossy();
    let index = map
        .sources
        .iter()
        .position(|source| !source.is_empty() && path.ends_with(source.as_str()));
    let Some(index) = index else { return };

    let table = map.sources_content.get_or_insert_with(Vec::new);
    if table.len() <= index {
        table.resize(index + 1, None);
    }
    table[index] = Some(contents.to_owned());
}

/// One decoded mapping segment within a generated line.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Segment {
    gen_col: i64,
    /// (source index, original line, original column)
    source: Option<(i64, i64, i64)>,
    name: Option<i64>,
}

/// Rebase `new`'s mappings through `prior`: the result maps `new`'s
/// generated positions to `prior`'s original sources.
pub fn compose(prior: &SourceMap, new: &SourceMap) -> SourceMap {
    let prior_lines = decode_mappings(&prior.mappings);
    let new_lines = decode_mappings(&new.mappings);

    let mut out_lines: Vec<Vec<Segment>> = Vec::with_capacity(new_lines.len());
    for line in &new_lines {
        let mut out_line = Vec::with_capacity(line.len());
        for segment in line {
            let rebased = segment
                .source
                .and_then(|(_, line, col)| lookup(&prior_lines, line, col));
            out_line.push(Segment {
                gen_col: segment.gen_col,
                source: rebased.and_then(|s| s.source),
                name: rebased.and_then(|s| s.name),
            });
        }
        out_lines.push(out_line);
    }

    SourceMap {
        version: 3,
        file: new.file.clone().or_else(|| prior.file.clone()),
        sources: prior.sources.clone(),
        sources_content: prior.sources_content.clone(),
        names: prior.names.clone(),
        mappings: encode_mappings(&out_lines),
    }
}

/// Last segment on `line` whose generated column is <= `col`.
fn lookup(lines: &[Vec<Segment>], line: i64, col: i64) -> Option<Segment> {
    let line = usize::try_from(line).ok()?;
    lines
        .get(line)?
        .iter()
        .take_while(|segment| segment.gen_col <= col)
        .last()
        .copied()
}

fn decode_mappings(mappings: &str) -> Vec<Vec<Segment>> {
    let mut lines = Vec::new();
    let mut src_idx = 0i64;
    let mut src_line = 0i64;
    let mut src_col = 0i64;
    let mut name_idx = 0i64;

    for raw_line in mappings.split(';') {
        let mut segments = Vec::new();
        let mut gen_col = 0i64;
        for raw_segment in raw_line.split(',') {
            if raw_segment.is_empty() {
                continue;
            }
            let mut values = [0i64; 5];
            let mut count = 0;
            let mut bytes = raw_segment.bytes();
            while count < 5 {
                match decode_vlq(&mut bytes) {
                    Some(value) => {
                        values[count] = value;
                        count += 1;
                    }
                    None => break,
                }
            }
            if count == 0 {
                continue;
            }
            gen_col += values[0];
            let source = if count >= 4 {
                src_idx += values[1];
                src_line += values[2];
                src_col += values[3];
                Some((src_idx, src_line, src_col))
            } else {
                None
            };
            let name = if count >= 5 {
                name_idx += values[4];
                Some(name_idx)
            } else {
                None
            };
            segments.push(Segment {
                gen_col,
                source,
                name,
            });
        }
        segments.sort_by_key(|segment| segment.gen_col);
        lines.push(segments);
    }
    lines
}

fn encode_mappings(lines: &[Vec<Segment>]) -> String {
    let mut out = String::new();
    let mut src_idx = 0i64;
    let mut src_line = 0i64;
    let mut src_col = 0i64;
    let mut name_idx = 0i64;

    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.push(';');
        }
        let mut gen_col = 0i64;
        for (j, segment) in line.iter().enumerate() {
            if j > 0 {
                out.push(',');
            }
            encode_vlq(segment.gen_col - gen_col, &mut out);
            gen_col = segment.gen_col;
            if let Some((idx, line, col)) = segment.source {
                encode_vlq(idx - src_idx, &mut out);
                encode_vlq(line - src_line, &mut out);
                encode_vlq(col - src_col, &mut out);
                src_idx = idx;
                src_line = line;
                src_col = col;
                if let Some(name) = segment.name {
                    encode_vlq(name - name_idx, &mut out);
                    name_idx = name;
                }
            }
        }
    }
    out
}

const B64_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

fn b64_value(byte: u8) -> Option<i64> {
    B64_CHARS.iter().position(|&c| c == byte).map(|v| v as i64)
}

fn decode_vlq(bytes: &mut impl Iterator<Item = u8>) -> Option<i64> {
    let mut result = 0i64;
    let mut shift = 0u32;
    loop {
        // A well-formed i64 value fits in 13 base64-VLQ digits; longer
        // runs of continuation bits are malformed input.
        if shift > 63 {
            return None;
        }
        let digit = b64_value(bytes.next()?)?;
        result |= (digit & 31) << shift;
        if digit & 32 == 0 {
            break;
        }
        shift += 5;
    }
    let negative = result & 1 == 1;
    let value = result >> 1;
    Some(if negative { -value } else { value })
}

fn encode_vlq(value: i64, out: &mut String) {
    let mut v = if value < 0 {
        (((-value) as u64) << 1) | 1
    } else {
        (value as u64) << 1
    };
    loop {
        let mut digit = (v & 31) as u8;
        v >>= 5;
        if v > 0 {
            digit |= 32;
        }
        out.push(B64_CHARS[digit as usize] as char);
        if v == 0 {
            break;
        }
    }
}
