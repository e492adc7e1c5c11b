//! Session lifecycle states

use std::fmt;

/// Lifecycle state of the language server session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Stopped,
    Starting,
    Ready,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Stopped => "stopped",
            SessionState::Starting => "starting",
            SessionState::Ready => "ready",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// State snapshot published by the controller.
///
/// `generation` increases by one for every start attempt, so observers can
/// tell a fresh session apart from the one it replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStatus {
    pub generation: u64,
    pub state: SessionState,
}

impl SessionStatus {
    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }
}
