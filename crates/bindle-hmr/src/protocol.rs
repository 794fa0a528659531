//! The development wire protocol.
//!
//! The server streams newline-delimited JSON frames: a status frame on
//! connect, then one update frame per rebuild. Field names are fixed by
//! the protocol, not by this crate's naming conventions.

use serde::{Deserialize, Serialize};

use crate::registry::ModuleId;

/// One artifact the client must fetch before applying an update.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdatePath {
    pub url: String,
    pub format: String,
}

/// A source file whose change triggered the update.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangedFile {
    #[serde(rename = "filePath")]
    pub file_path: String,
    pub format: String,
}

/// A frame on the dev channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HmrMessage {
    /// Whether the server will send updates on this connection.
    Status { enabled: bool },
    /// Fetch every path, then re-evaluate `changed_modules` in order.
    Update {
        paths: Vec<UpdatePath>,
        #[serde(rename = "changedFiles")]
        changed_files: Vec<ChangedFile>,
        #[serde(rename = "changedModules")]
        changed_modules: Vec<ModuleId>,
    },
}

/// Serialize one newline-terminated frame.
pub fn encode_frame(message: &HmrMessage) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Incremental frame decoder over an arbitrary byte stream.
///
/// Bytes arrive in whatever slices the transport produces; frames are
/// complete only at a newline. Trailing bytes stay buffered for the
/// next push.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes in, get every newly completed frame out.
    ///
    /// Lines that do not parse as a frame are dropped; a dev channel
    /// keeps serving updates across the occasional garbled message.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<HmrMessage> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();
        while let Some(split) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=split).collect();
            let line = &line[..line.len() - 1];
            if line.is_empty() {
                continue;
            }
            match serde_json::from_slice(line) {
                Ok(frame) => frames.push(frame),
                Err(err) => {
                    tracing::debug!("discarding unparsable frame: {err}");
                }
            }
        }
        frames
    }
}
