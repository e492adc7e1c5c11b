// Session layer
// - controller.rs: start/stop/restart, ready hooks, notification pump
// - launcher.rs: Launcher trait and the child-process launcher
// - state.rs: SessionState / SessionStatus
// - error.rs: SessionError

pub mod controller;
pub mod error;
pub mod launcher;
pub mod state;

pub use controller::{ControllerOptions, SessionController, SessionHandle};
pub use error::SessionError;
pub use launcher::{Launcher, ProcessLauncher};
pub use state::{SessionState, SessionStatus};
