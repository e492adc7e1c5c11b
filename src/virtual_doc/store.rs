use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Synthetic, read-only document holding the compiled view of a source region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFile {
    pub uri: String,
    pub content: String,
    pub source_map: String,
}

/// Owns every virtual file, keyed by uri.
///
/// Entries are replaced whole, so a reader sees either the previous
/// content/source map pair or the new one, never a mix.
pub struct VirtualDocumentStore {
    files: RwLock<HashMap<String, Arc<VirtualFile>>>,
    changes: broadcast::Sender<String>,
}

impl VirtualDocumentStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            files: RwLock::new(HashMap::new()),
            changes,
        }
    }

    /// Creates or replaces the virtual file at `uri` and announces the change.
    pub fn set_contents(
        &self,
        uri: impl Into<String>,
        content: impl Into<String>,
        source_map: impl Into<String>,
    ) {
        let uri = uri.into();
        let file = Arc::new(VirtualFile {
            uri: uri.clone(),
            content: content.into(),
            source_map: source_map.into(),
        });

        self.files.write().insert(uri.clone(), file);
        debug!("Virtual file updated: {}", uri);
        // No subscribers is fine; hosts subscribe only while a view is open.
        let _ = self.changes.send(uri);
    }

    pub fn get(&self, uri: &str) -> Option<Arc<VirtualFile>> {
        self.files.read().get(uri).cloned()
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receives the uri of every subsequent update.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.changes.subscribe()
    }
}

impl Default for VirtualDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}
