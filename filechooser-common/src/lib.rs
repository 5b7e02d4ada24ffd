//! Namespace model shared by the file chooser: the lazily fetched
//! `CloudNode` tree, the backend seams it fetches through, and the
//! listing parsers that shape flat or hierarchical responses into nodes.

pub mod backend;
pub mod filter;
pub mod node;
pub mod path;
pub mod tree;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{CloudBackend, CredentialStatus, ListingStyle, StoreClient, StoreError};
pub use filter::NameFilter;
pub use node::{CloudNode, IconSet, NodeError};
