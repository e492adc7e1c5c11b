//! Headless host that drives the client from a terminal

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::warn;

use crate::host::{Host, ProgressLocation, TextDocumentContentProvider};

/// One line typed at the console
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    /// `:quit`
    Quit,
    /// `:cat <uri>` prints what the provider of the uri's scheme serves
    Cat(String),
    /// `:open <uri>` makes `uri` the active document
    Open(String),
    /// `<command-id> [arg]`
    Run { id: String, args: Vec<Value> },
}

/// Parses a console line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<ConsoleCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };

    let command = match head {
        ":quit" | ":q" => ConsoleCommand::Quit,
        ":cat" => ConsoleCommand::Cat(rest.to_string()),
        ":open" => ConsoleCommand::Open(rest.to_string()),
        id => ConsoleCommand::Run {
            id: id.to_string(),
            args: if rest.is_empty() {
                Vec::new()
            } else {
                vec![Value::String(rest.to_string())]
            },
        },
    };
    Some(command)
}

/// Host that writes everything it is asked to show to a text sink
pub struct ConsoleHost {
    out: Mutex<Box<dyn Write + Send>>,
    providers: RwLock<HashMap<String, Arc<dyn TextDocumentContentProvider>>>,
    active: RwLock<Option<String>>,
}

impl ConsoleHost {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
            providers: RwLock::new(HashMap::new()),
            active: RwLock::new(None),
        }
    }

    pub fn set_active_document(&self, uri: impl Into<String>) {
        *self.active.write() = Some(uri.into());
    }

    /// Content served for `uri` by the provider registered for its scheme.
    pub fn read_document(&self, uri: &str) -> Option<String> {
        let scheme = uri.split_once(':')?.0;
        let provider = self.providers.read().get(scheme).cloned()?;
        Some(provider.provide_text_document_content(uri))
    }

    pub fn print(&self, text: &str) {
        let mut out = self.out.lock();
        if let Err(e) = writeln!(out, "{}", text).and_then(|_| out.flush()) {
            warn!("Console write failed: {}", e);
        }
    }
}

impl Host for ConsoleHost {
    fn open_external(&self, url: &str) {
        self.print(&format!("open {}", url));
    }

    fn open_folder(&self, path: &Path) {
        self.print(&format!("open folder {}", path.display()));
    }

    fn show_document(&self, uri: &str) {
        match self.read_document(uri) {
            Some(content) => self.print(&format!("--- {}\n{}", uri, content)),
            None => self.print(&format!("show {}", uri)),
        }
    }

    fn show_untitled(&self, content: &str, language: &str) {
        self.print(&format!("--- untitled ({})\n{}", language, content));
    }

    fn show_information(&self, message: &str) {
        self.print(&format!("info: {}", message));
    }

    fn append_output(&self, line: &str) {
        self.print(&format!("[output] {}", line));
    }

    fn show_output(&self) {}

    fn begin_progress(&self, _id: u64, title: &str, _location: ProgressLocation) {
        self.print(&format!("{}...", title));
    }

    fn end_progress(&self, _id: u64) {}

    fn register_content_provider(&self, scheme: &str, provider: Arc<dyn TextDocumentContentProvider>) {
        self.providers.write().insert(scheme.to_string(), provider);
    }

    fn set_language_configuration(&self, _language: &str, _word_pattern: &str) {}

    fn active_document(&self) -> Option<String> {
        self.active.read().clone()
    }
}
