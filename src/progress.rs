use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::host::{Host, ProgressLocation};

/// Shows a host progress indicator for the lifetime of an operation
pub struct ProgressReporter {
    host: Arc<dyn Host>,
    next_id: AtomicU64,
}

/// Ends the indicator when dropped, so it cannot outlive the operation even
/// if the wrapping future is dropped early.
struct ProgressGuard<'a> {
    host: &'a dyn Host,
    id: u64,
}

impl Drop for ProgressGuard<'_> {
    fn drop(&mut self) {
        self.host.end_progress(self.id);
    }
}

impl ProgressReporter {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self {
            host,
            next_id: AtomicU64::new(1),
        }
    }

    /// Runs `operation` with a visible indicator titled `title`.
    ///
    /// The indicator ends when the operation settles, whatever its output.
    pub async fn wrap<F>(&self, title: &str, location: ProgressLocation, operation: F) -> F::Output
    where
        F: Future,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!("Progress {} started: {}", id, title);
        self.host.begin_progress(id, title, location);
        let _guard = ProgressGuard {
            host: self.host.as_ref(),
            id,
        };

        operation.await
    }
}
