//! Host editor boundary.
//!
//! Everything the client needs from the editor goes through [`Host`]: opening
//! things, progress indicators, the output channel and the read-only content
//! provider registration. All methods must return promptly; a host that needs
//! to do slow work schedules it on its own loop.

use std::path::Path;
use std::sync::Arc;

/// Where a progress indicator is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressLocation {
    Window,
    Notification,
    SourceControl,
}

/// Read-only documents served for a custom URI scheme
pub trait TextDocumentContentProvider: Send + Sync {
    /// Returns the current text for `uri`. Must never block.
    fn provide_text_document_content(&self, uri: &str) -> String;
}

#[cfg_attr(test, mockall::automock)]
pub trait Host: Send + Sync {
    /// Opens a URL outside the editor (browser).
    fn open_external(&self, url: &str);

    /// Opens a folder in a new editor window.
    fn open_folder(&self, path: &Path);

    /// Shows the document at `uri`, resolving it through registered providers.
    fn show_document(&self, uri: &str);

    /// Opens a new untitled document with the given content.
    fn show_untitled(&self, content: &str, language: &str);

    /// Shows a non-modal information notice.
    fn show_information(&self, message: &str);

    /// Appends a line to the client's output channel.
    fn append_output(&self, line: &str);

    /// Reveals the output channel.
    fn show_output(&self);

    fn begin_progress(&self, id: u64, title: &str, location: ProgressLocation);

    fn end_progress(&self, id: u64);

    fn register_content_provider(&self, scheme: &str, provider: Arc<dyn TextDocumentContentProvider>);

    fn set_language_configuration(&self, language: &str, word_pattern: &str);

    /// URI of the document in the focused editor, if any.
    fn active_document(&self) -> Option<String>;
}
