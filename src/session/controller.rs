//! Ownership and lifecycle of the language server session.
//!
//! The controller owns at most one [`Session`] at a time. `start`, `stop` and
//! `restart` are serialized by a FIFO lifecycle lock, so a restart requested
//! while another is in flight runs after it instead of interleaving. Other
//! components never see the process: they get a [`SessionHandle`], a weak
//! lookup that stops working once its session is gone.
//!
//! Policy for `start()` on a running session: it is a no-op that returns the
//! handle of the Ready session. A `start()` queued behind an in-flight start
//! observes the outcome of that start and reuses its session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tower_lsp::lsp_types::{
    ClientCapabilities, ClientInfo, InitializeParams, InitializeResult, WindowClientCapabilities,
};
use tracing::{debug, error, info, warn};

use crate::config::{ClientConfig, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_STOP_GRACE_MS};
use crate::host::Host;
use crate::router::NotificationRouter;
use crate::session::launcher::Launcher;
use crate::session::state::{SessionState, SessionStatus};
use crate::session::SessionError;
use crate::transport::{AnyNotification, Connection};

type ReadyHook = Arc<dyn Fn(u64) + Send + Sync>;

/// Tunables for a [`SessionController`]
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Time the server gets to acknowledge `shutdown` and to exit afterwards
    pub stop_grace: Duration,
    pub request_timeout: Duration,
    /// Sent as `initializationOptions` with every `initialize` request
    pub initialization_options: Value,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            stop_grace: Duration::from_millis(DEFAULT_STOP_GRACE_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            initialization_options: Value::Null,
        }
    }
}

impl From<&ClientConfig> for ControllerOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            stop_grace: config.stop_grace,
            request_timeout: config.request_timeout,
            initialization_options: json!({ "globalSnippetDir": config.snippet_dir }),
        }
    }
}

/// One running language server and its connection
struct Session {
    generation: u64,
    connection: Connection,
    pump: JoinHandle<()>,
    /// Releases the pump once the ready hooks have wired the router
    arm: Mutex<Option<oneshot::Sender<()>>>,
}

impl Session {
    async fn shutdown(&self, grace: Duration) {
        match self
            .connection
            .request_with_timeout("shutdown", Value::Null, grace)
            .await
        {
            Ok(_) => {
                if let Err(e) = self.connection.notify("exit", Value::Null) {
                    debug!("Could not send exit: {}", e);
                }
            }
            Err(e) => warn!("Language server did not acknowledge shutdown: {}", e),
        }

        self.connection.close(grace).await;
        self.pump.abort();
    }
}

/// Weak lookup of a session, handed to components that talk to the server
#[derive(Clone)]
pub struct SessionHandle {
    generation: u64,
    session: Weak<Session>,
}

impl SessionHandle {
    fn new(session: &Arc<Session>) -> Self {
        Self {
            generation: session.generation,
            session: Arc::downgrade(session),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the session still exists and its connection is open.
    pub fn is_alive(&self) -> bool {
        self.session
            .upgrade()
            .is_some_and(|session| !session.connection.is_closed())
    }

    /// Forwards an arbitrary request to the language server.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, SessionError> {
        let session = self.session.upgrade().ok_or(SessionError::NotRunning)?;
        session.connection.request(method, params).await
    }

    pub fn notify(&self, method: &str, params: Value) -> Result<(), SessionError> {
        let session = self.session.upgrade().ok_or(SessionError::NotRunning)?;
        session.connection.notify(method, params)
    }
}

/// State shared with the per-session notification pumps
struct Shared {
    current: Mutex<Option<Arc<Session>>>,
    status: watch::Sender<SessionStatus>,
    hooks: Mutex<Vec<ReadyHook>>,
    host: Arc<dyn Host>,
}

impl Shared {
    fn publish(&self, generation: u64, state: SessionState) {
        debug!("Session {} is {}", generation, state);
        self.status.send_replace(SessionStatus { generation, state });
    }

    /// Stores a freshly initialized session and runs the ready hooks once.
    fn install(&self, session: Arc<Session>) -> Result<SessionHandle, SessionError> {
        let generation = session.generation;
        {
            let mut current = self.current.lock();
            if session.connection.is_closed() {
                return Err(SessionError::ConnectionClosed);
            }
            *current = Some(Arc::clone(&session));
        }

        let hooks = {
            let hooks = self.hooks.lock();
            self.publish(generation, SessionState::Ready);
            hooks.clone()
        };
        info!("Language server session {} is ready", generation);

        for hook in hooks {
            hook(generation);
        }
        if let Some(arm) = session.arm.lock().take() {
            let _ = arm.send(());
        }
        Ok(SessionHandle::new(&session))
    }

    fn report_failure(&self, generation: u64, err: &SessionError) {
        self.publish(generation, SessionState::Failed);
        error!("Language server session {} failed: {}", generation, err);
        self.host
            .append_output(&format!("[Error] Language server failed: {}", err));
    }

    /// Called by a pump once its connection has closed.
    fn connection_lost(&self, generation: u64) {
        let lost = {
            let mut current = self.current.lock();
            match current.as_ref() {
                Some(session) if session.generation == generation => current.take(),
                _ => None,
            }
        };

        if lost.is_some() {
            self.report_failure(generation, &SessionError::ConnectionClosed);
        }
    }
}

pub struct SessionController {
    shared: Arc<Shared>,
    launcher: Arc<dyn Launcher>,
    router: Arc<NotificationRouter>,
    options: ControllerOptions,
    lifecycle: tokio::sync::Mutex<()>,
    generation: AtomicU64,
}

impl SessionController {
    /// `host` is the diagnostic sink for failures; notifications of every
    /// session are dispatched through `router`.
    pub fn new(
        launcher: Arc<dyn Launcher>,
        router: Arc<NotificationRouter>,
        host: Arc<dyn Host>,
        options: ControllerOptions,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus::default());
        Self {
            shared: Arc::new(Shared {
                current: Mutex::new(None),
                status,
                hooks: Mutex::new(Vec::new()),
                host,
            }),
            launcher,
            router,
            options,
            lifecycle: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn status(&self) -> SessionStatus {
        *self.shared.status.borrow()
    }

    /// Watches every status change, starting from the current one.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.shared.status.subscribe()
    }

    /// Handle of the current session, if it is Ready.
    pub fn session(&self) -> Option<SessionHandle> {
        if !self.status().is_ready() {
            return None;
        }
        self.shared.current.lock().as_ref().map(SessionHandle::new)
    }

    /// Sends a typed request to the Ready session.
    pub async fn request<P, R>(&self, method: &str, params: &P) -> Result<R, SessionError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let session = self.session().ok_or(SessionError::NotRunning)?;
        let result = session.request(method, serde_json::to_value(params)?).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Registers a hook that runs once for every session that becomes Ready.
    ///
    /// If the current session is already Ready the hook runs immediately.
    pub fn on_ready<F>(&self, hook: F)
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        let hook: ReadyHook = Arc::new(hook);
        let ready_generation = {
            let mut hooks = self.shared.hooks.lock();
            hooks.push(Arc::clone(&hook));
            let status = self.status();
            status.is_ready().then_some(status.generation)
        };

        if let Some(generation) = ready_generation {
            hook(generation);
        }
    }

    /// Waits until the current or pending session is Ready.
    pub async fn ready(&self) -> Result<SessionHandle, SessionError> {
        let mut status_rx = self.shared.status.subscribe();
        loop {
            let status = *status_rx.borrow_and_update();
            match status.state {
                SessionState::Ready => {
                    if let Some(handle) = self.session() {
                        return Ok(handle);
                    }
                }
                SessionState::Failed | SessionState::Stopped => {
                    if self.lifecycle.try_lock().is_ok() {
                        return Err(match status.state {
                            SessionState::Failed => SessionError::StartFailed(format!(
                                "session {} did not reach ready",
                                status.generation
                            )),
                            _ => SessionError::NotRunning,
                        });
                    }
                    // A start or restart holds the lifecycle; look again once it is done.
                    drop(self.lifecycle.lock().await);
                    continue;
                }
                SessionState::Starting => {}
            }

            if status_rx.changed().await.is_err() {
                return Err(SessionError::NotRunning);
            }
        }
    }

    /// Launches and initializes a session unless one is already Ready.
    pub async fn start(&self) -> Result<SessionHandle, SessionError> {
        let _lifecycle = self.lifecycle.lock().await;
        self.start_locked().await
    }

    /// Shuts the session down, killing the server if it outlives the grace period.
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.stop_locked().await;
    }

    /// Stops the current session and starts a fresh one.
    ///
    /// Concurrent restarts queue up; each returns the session it started.
    pub async fn restart(&self) -> Result<SessionHandle, SessionError> {
        let _lifecycle = self.lifecycle.lock().await;
        info!("Restarting language server");
        self.stop_locked().await;
        self.start_locked().await
    }

    async fn start_locked(&self) -> Result<SessionHandle, SessionError> {
        if let Some(handle) = self.session() {
            debug!("Session {} already ready, reusing it", handle.generation());
            return Ok(handle);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.publish(generation, SessionState::Starting);
        info!("Starting language server session {}", generation);

        let result = match self.launch(generation).await {
            Ok(session) => self.shared.install(session),
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            self.shared.report_failure(generation, e);
        }
        result
    }

    async fn stop_locked(&self) {
        let Some(session) = self.shared.current.lock().take() else {
            debug!("No session to stop");
            return;
        };

        info!("Stopping language server session {}", session.generation);
        session.shutdown(self.options.stop_grace).await;
        self.shared.publish(session.generation, SessionState::Stopped);
    }

    async fn launch(&self, generation: u64) -> Result<Arc<Session>, SessionError> {
        let connection = self.launcher.launch(self.options.request_timeout).await?;
        let notifications = connection
            .take_notifications()
            .ok_or_else(|| SessionError::Protocol("notification queue already taken".into()))?;

        if let Err(e) = self.initialize(&connection).await {
            connection.close(self.options.stop_grace).await;
            return Err(e);
        }

        let (arm, armed) = oneshot::channel();
        let pump = tokio::spawn(pump_notifications(
            generation,
            armed,
            notifications,
            Arc::clone(&self.router),
            Arc::downgrade(&self.shared),
        ));

        Ok(Arc::new(Session {
            generation,
            connection,
            pump,
            arm: Mutex::new(Some(arm)),
        }))
    }

    async fn initialize(&self, connection: &Connection) -> Result<(), SessionError> {
        let params = InitializeParams {
            process_id: Some(std::process::id()),
            capabilities: client_capabilities(),
            initialization_options: Some(self.options.initialization_options.clone()),
            client_info: Some(ClientInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            ..Default::default()
        };

        let result = connection
            .request("initialize", serde_json::to_value(params)?)
            .await?;
        let result: InitializeResult = serde_json::from_value(result)?;
        match result.server_info {
            Some(info) => info!(
                "Connected to {} {}",
                info.name,
                info.version.as_deref().unwrap_or("")
            ),
            None => info!("Connected to language server"),
        }

        connection.notify("initialized", json!({}))
    }
}

fn client_capabilities() -> ClientCapabilities {
    ClientCapabilities {
        window: Some(WindowClientCapabilities {
            work_done_progress: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

async fn pump_notifications(
    generation: u64,
    armed: oneshot::Receiver<()>,
    mut notifications: mpsc::UnboundedReceiver<AnyNotification>,
    router: Arc<NotificationRouter>,
    shared: Weak<Shared>,
) {
    // Held back until the session is installed; a session that never gets
    // installed is reported by the start that launched it.
    if armed.await.is_err() {
        debug!("Session {} was not installed, dropping its notifications", generation);
        return;
    }

    while let Some(notification) = notifications.recv().await {
        router.dispatch(notification);
    }

    debug!("Notification stream of session {} ended", generation);
    if let Some(shared) = shared.upgrade() {
        shared.connection_lost(generation);
    }
}
