//! Shared fixtures for the integration tests: a recording host and a fake
//! language server built on tower-lsp, connected over an in-memory pipe.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::io::BufReader;
use tower_lsp::jsonrpc::Result as RpcResult;
use tower_lsp::lsp_types::notification::Notification;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};

use vls_client::config::{ClientConfig, HostChannel, ServerCommand};
use vls_client::host::{Host, ProgressLocation, TextDocumentContentProvider};
use vls_client::router::NotificationRouter;
use vls_client::session::{ControllerOptions, Launcher, SessionController, SessionError};
use vls_client::transport::Connection;
use vls_client::transport::codec::{read_message, write_message};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const STOP_GRACE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    OpenExternal(String),
    OpenFolder(PathBuf),
    ShowDocument(String),
    ShowUntitled { content: String, language: String },
    Information(String),
    Output(String),
    ShowOutput,
    BeginProgress(String, ProgressLocation),
    EndProgress(u64),
    LanguageConfiguration(String),
}

/// Host that records every call it receives
#[derive(Default)]
pub struct RecordingHost {
    events: Mutex<Vec<HostEvent>>,
    providers: Mutex<HashMap<String, Arc<dyn TextDocumentContentProvider>>>,
    active: Mutex<Option<String>>,
}

impl RecordingHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.events.lock().clone()
    }

    pub fn outputs(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HostEvent::Output(line) => Some(line),
                _ => None,
            })
            .collect()
    }

    pub fn informations(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HostEvent::Information(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn has_event(&self, expected: &HostEvent) -> bool {
        self.events.lock().contains(expected)
    }

    pub fn set_active_document(&self, uri: &str) {
        *self.active.lock() = Some(uri.to_string());
    }

    /// Reads `uri` through the provider registered for its scheme.
    pub fn read_document(&self, uri: &str) -> Option<String> {
        let scheme = uri.split_once(':')?.0;
        let provider = self.providers.lock().get(scheme).cloned()?;
        Some(provider.provide_text_document_content(uri))
    }

    fn record(&self, event: HostEvent) {
        self.events.lock().push(event);
    }
}

impl Host for RecordingHost {
    fn open_external(&self, url: &str) {
        self.record(HostEvent::OpenExternal(url.to_string()));
    }

    fn open_folder(&self, path: &Path) {
        self.record(HostEvent::OpenFolder(path.to_path_buf()));
    }

    fn show_document(&self, uri: &str) {
        self.record(HostEvent::ShowDocument(uri.to_string()));
    }

    fn show_untitled(&self, content: &str, language: &str) {
        self.record(HostEvent::ShowUntitled {
            content: content.to_string(),
            language: language.to_string(),
        });
    }

    fn show_information(&self, message: &str) {
        self.record(HostEvent::Information(message.to_string()));
    }

    fn append_output(&self, line: &str) {
        self.record(HostEvent::Output(line.to_string()));
    }

    fn show_output(&self) {
        self.record(HostEvent::ShowOutput);
    }

    fn begin_progress(&self, _id: u64, title: &str, location: ProgressLocation) {
        self.record(HostEvent::BeginProgress(title.to_string(), location));
    }

    fn end_progress(&self, id: u64) {
        self.record(HostEvent::EndProgress(id));
    }

    fn register_content_provider(&self, scheme: &str, provider: Arc<dyn TextDocumentContentProvider>) {
        self.providers.lock().insert(scheme.to_string(), provider);
    }

    fn set_language_configuration(&self, language: &str, _word_pattern: &str) {
        self.record(HostEvent::LanguageConfiguration(language.to_string()));
    }

    fn active_document(&self) -> Option<String> {
        self.active.lock().clone()
    }
}

pub enum ShowVirtualFile {}

impl Notification for ShowVirtualFile {
    type Params = Value;
    const METHOD: &'static str = "$/showVirtualFile";
}

pub enum OpenWebsite {}

impl Notification for OpenWebsite {
    type Params = Value;
    const METHOD: &'static str = "$/openWebsite";
}

pub enum FutureFeature {}

impl Notification for FutureFeature {
    type Params = Value;
    const METHOD: &'static str = "$/futureFeature";
}

/// Notification the fake server sends once the client is initialized
#[derive(Debug, Clone)]
pub enum Scripted {
    ShowVirtualFile(Value),
    OpenWebsite(Value),
    FutureFeature(Value),
    Log(MessageType, String),
}

/// Behavior of the fake server. Clones share the request log.
#[derive(Clone, Default)]
pub struct ServerScript {
    /// `$/queryVirtualFileInfo` replies keyed by source uri; missing means null
    pub virtual_files: HashMap<String, Value>,
    pub doctor_report: Value,
    pub on_initialized: Vec<Scripted>,
    pub requests: Arc<Mutex<Vec<(String, Value)>>>,
}

impl ServerScript {
    pub fn with_virtual_file(mut self, source_uri: &str, info: Value) -> Self {
        self.virtual_files.insert(source_uri.to_string(), info);
        self
    }

    pub fn with_doctor_report(mut self, report: Value) -> Self {
        self.doctor_report = report;
        self
    }

    pub fn on_initialized(mut self, notification: Scripted) -> Self {
        self.on_initialized.push(notification);
        self
    }

    pub fn received(&self, method: &str) -> Vec<Value> {
        self.requests
            .lock()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }
}

struct FakeServer {
    client: Client,
    script: ServerScript,
    generation: u64,
}

impl FakeServer {
    async fn query_virtual_file_info(&self, params: Value) -> RpcResult<Value> {
        self.record("$/queryVirtualFileInfo", &params);
        let source = params
            .get("sourceUri")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(self
            .script
            .virtual_files
            .get(source)
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn doctor(&self, params: Value) -> RpcResult<Value> {
        self.record("$/doctor", &params);
        Ok(self.script.doctor_report.clone())
    }

    fn record(&self, method: &str, params: &Value) {
        self.script
            .requests
            .lock()
            .push((method.to_string(), params.clone()));
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for FakeServer {
    async fn initialize(&self, params: InitializeParams) -> RpcResult<InitializeResult> {
        self.record(
            "initialize",
            &params.initialization_options.unwrap_or(Value::Null),
        );
        Ok(InitializeResult {
            server_info: Some(ServerInfo {
                name: "fake-vls".to_string(),
                version: Some(self.generation.to_string()),
            }),
            ..Default::default()
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        for notification in &self.script.on_initialized {
            match notification.clone() {
                Scripted::ShowVirtualFile(params) => {
                    self.client.send_notification::<ShowVirtualFile>(params).await
                }
                Scripted::OpenWebsite(params) => {
                    self.client.send_notification::<OpenWebsite>(params).await
                }
                Scripted::FutureFeature(params) => {
                    self.client.send_notification::<FutureFeature>(params).await
                }
                Scripted::Log(typ, message) => self.client.log_message(typ, message).await,
            }
        }
    }

    async fn shutdown(&self) -> RpcResult<()> {
        self.record("shutdown", &Value::Null);
        Ok(())
    }
}

/// Starts a fake server on an in-memory pipe and connects to it.
pub fn connect_fake_server(script: ServerScript, generation: u64) -> Connection {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);

    let (service, socket) = LspService::build(|client| FakeServer {
        client,
        script,
        generation,
    })
    .custom_method("$/queryVirtualFileInfo", FakeServer::query_virtual_file_info)
    .custom_method("$/doctor", FakeServer::doctor)
    .finish();

    let (server_read, server_write) = tokio::io::split(server_io);
    tokio::spawn(Server::new(server_read, server_write, socket).serve(service));

    let (reader, writer) = tokio::io::split(client_io);
    Connection::new(reader, writer, REQUEST_TIMEOUT)
}

/// A connection whose server is already gone, like a process that exits at once
pub fn connect_dead_server() -> Connection {
    let (client_io, server_io) = tokio::io::duplex(1024);
    drop(server_io);
    let (reader, writer) = tokio::io::split(client_io);
    Connection::new(reader, writer, REQUEST_TIMEOUT)
}

/// A server that initializes and then hangs up, like a process that crashes
pub fn connect_crashing_server() -> Connection {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);

    tokio::spawn(async move {
        let (reader, mut writer) = tokio::io::split(server_io);
        let mut reader = BufReader::new(reader);
        let mut buf = String::new();
        while let Ok(Some(msg)) = read_message(&mut reader, &mut buf).await {
            match msg["method"].as_str() {
                Some("initialize") => {
                    let reply = json!({"id": msg["id"].clone(), "result": {"capabilities": {}}});
                    if write_message(&mut writer, &reply).await.is_err() {
                        return;
                    }
                }
                Some("initialized") => return,
                _ => {}
            }
        }
    });

    let (reader, writer) = tokio::io::split(client_io);
    Connection::new(reader, writer, REQUEST_TIMEOUT)
}

/// Launches servers that crash right after initialization
pub struct CrashingLauncher;

#[async_trait]
impl Launcher for CrashingLauncher {
    async fn launch(&self, _request_timeout: Duration) -> Result<Connection, SessionError> {
        Ok(connect_crashing_server())
    }
}

/// Launches fake servers, optionally failing the first attempts
pub struct FakeLauncher {
    script: ServerScript,
    failures_left: AtomicUsize,
    launches: AtomicUsize,
}

impl FakeLauncher {
    pub fn new(script: ServerScript) -> Arc<Self> {
        Self::failing_first(script, 0)
    }

    pub fn failing_first(script: ServerScript, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            script,
            failures_left: AtomicUsize::new(failures),
            launches: AtomicUsize::new(0),
        })
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn launch(&self, _request_timeout: Duration) -> Result<Connection, SessionError> {
        let attempt = self.launches.fetch_add(1, Ordering::SeqCst) + 1;
        let fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if fail {
            Ok(connect_dead_server())
        } else {
            Ok(connect_fake_server(self.script.clone(), attempt as u64))
        }
    }
}

pub fn test_options() -> ControllerOptions {
    ControllerOptions {
        stop_grace: STOP_GRACE,
        request_timeout: REQUEST_TIMEOUT,
        ..Default::default()
    }
}

pub fn create_controller(
    launcher: Arc<FakeLauncher>,
    host: Arc<RecordingHost>,
) -> (Arc<SessionController>, Arc<NotificationRouter>) {
    let router = Arc::new(NotificationRouter::new());
    let controller = Arc::new(SessionController::new(
        launcher,
        Arc::clone(&router),
        host,
        test_options(),
    ));
    (controller, router)
}

pub fn test_config(snippet_dir: &Path) -> ClientConfig {
    let mut config = ClientConfig::new(ServerCommand::new("fake-vls"), HostChannel::Stable);
    config.snippet_dir = snippet_dir.to_path_buf();
    config.stop_grace = STOP_GRACE;
    config.request_timeout = REQUEST_TIMEOUT;
    config
}

/// Polls `condition` until it holds, giving up after a few seconds.
pub async fn wait_until<F>(condition: F) -> bool
where
    F: Fn() -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}
