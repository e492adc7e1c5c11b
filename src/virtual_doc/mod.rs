//! Virtual document layer
//! - store.rs: VirtualDocumentStore, the owner of all virtual files
//! - provider.rs: read-only provider adapter and show_virtual_file
//! - protocol.rs: custom notification/request shapes and uri helpers

pub mod protocol;
pub mod provider;
pub mod store;

pub use provider::{ShowVirtualFileOutcome, VirtualDocumentProvider, show_virtual_file};
pub use store::{VirtualDocumentStore, VirtualFile};
