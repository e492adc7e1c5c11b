pub mod commands;
pub mod config;
pub mod console;
pub mod extension;
pub mod host;
pub mod log;
pub mod progress;
pub mod router;
pub mod session;
pub mod transport;
pub mod virtual_doc;

pub use extension::Extension;
pub use host::{Host, ProgressLocation, TextDocumentContentProvider};
pub use session::{SessionController, SessionError, SessionState};
