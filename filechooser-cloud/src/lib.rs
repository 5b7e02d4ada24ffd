//! Object store sources for the file chooser: S3 and Azure adapters,
//! credential sessions, the per-source session cache, and the selection
//! state that walks a `CloudNode` tree.

pub mod backend;
pub mod cache;
pub mod chooser;
pub mod config;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{SourceConfig, SourceKind};
pub use cache::{Lookup, SessionCache, SessionKey};
pub use chooser::{Chooser, Selection};
pub use config::ChooserConfig;
pub use session::{BackendSession, SessionState};
