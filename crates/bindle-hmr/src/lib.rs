//! # bindle-hmr
//!
//! Hot module replacement support for bindle: the accept/decline
//! acceptance model, the all-or-nothing update-ordering algorithm, the
//! runtime application seam, and the dev-channel wire protocol.
//!
//! The crate is runtime-agnostic. It never touches a browser or an
//! interpreter; consumers implement [`ModuleRuntime`] over whatever
//! module cache they host and feed [`apply_update`] the registry
//! snapshot taken before the update arrived.

pub mod apply;
pub mod order;
pub mod protocol;
pub mod registry;

pub use apply::{ModuleRuntime, apply_update};
pub use order::{Acceptance, HmrRejected, acceptance, update_order};
pub use protocol::{ChangedFile, FrameDecoder, HmrMessage, UpdatePath, encode_frame};
pub use registry::{HotState, ModuleId, ModuleRecord, ModuleRegistry, WILDCARD};
