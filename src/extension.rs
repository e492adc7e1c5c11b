//! Activation of the client inside a host editor.
//!
//! Activation registers the virtual document provider and the commands that
//! work without a server, installs a ready hook, and starts the first session
//! under a progress indicator. The ready hook runs for every session: it
//! rebinds the notification handlers and the language configuration, and the
//! first time round it registers the commands that talk to the server.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use anyhow::Context;
use serde_json::Value;
use tower_lsp::lsp_types::{LogMessageParams, MessageType, ShowMessageParams};
use tracing::{debug, error, info};

use crate::commands::{
    CommandError, CommandRegistry, OPEN_USER_SCAFFOLD_SNIPPET_FOLDER, RESTART_SERVER,
    SHOW_CORRESPONDING_VIRTUAL_FILE, SHOW_DOCTOR_INFO, SHOW_OUTPUT_CHANNEL, string_arg,
};
use crate::config::ClientConfig;
use crate::host::{Host, ProgressLocation};
use crate::progress::ProgressReporter;
use crate::router::NotificationRouter;
use crate::session::{ControllerOptions, Launcher, ProcessLauncher, SessionController};
use crate::virtual_doc::protocol::{
    DOCTOR, DoctorParams, OPEN_WEBSITE, OpenWebsiteParams, SHOW_VIRTUAL_FILE,
    ShowVirtualFileParams, VIRTUAL_SCHEME,
};
use crate::virtual_doc::{
    ShowVirtualFileOutcome, VirtualDocumentProvider, VirtualDocumentStore, show_virtual_file,
};

/// Language whose editor configuration the client owns
pub const LANGUAGE_ID: &str = "vue";

/// Word pattern for the template language, shared with the TypeScript one
pub const WORD_PATTERN: &str = r#"(-?\d*\.\d\w*)|([^\`\~\!\@\%\^\&\*\(\)\-\=\+\[\{\]\}\\\|\;\:\'\"\,\.\<\>\/\?\s]+)"#;

pub const INIT_PROGRESS_TITLE: &str = "VLS initialization";
pub const RESTART_PROGRESS_TITLE: &str = "VLS restart";

pub struct Extension {
    host: Arc<dyn Host>,
    controller: Arc<SessionController>,
    store: Arc<VirtualDocumentStore>,
    router: Arc<NotificationRouter>,
    commands: Arc<CommandRegistry>,
    progress: Arc<ProgressReporter>,
}

impl Extension {
    /// Activates the client with a language server spawned from `config`.
    pub async fn activate(host: Arc<dyn Host>, config: &ClientConfig) -> anyhow::Result<Self> {
        let launcher = Arc::new(ProcessLauncher::new(config.server.clone(), Arc::clone(&host)));
        Self::activate_with(host, launcher, config).await
    }

    /// Activates the client with a custom launcher.
    ///
    /// A server that fails to start does not fail activation; the failure is
    /// written to the output channel and the restart command stays available.
    pub async fn activate_with(
        host: Arc<dyn Host>,
        launcher: Arc<dyn Launcher>,
        config: &ClientConfig,
    ) -> anyhow::Result<Self> {
        let store = Arc::new(VirtualDocumentStore::new());
        host.register_content_provider(
            VIRTUAL_SCHEME,
            Arc::new(VirtualDocumentProvider::new(Arc::clone(&store))),
        );

        let router = Arc::new(NotificationRouter::new());
        let controller = Arc::new(SessionController::new(
            launcher,
            Arc::clone(&router),
            Arc::clone(&host),
            ControllerOptions::from(config),
        ));

        let extension = Self {
            progress: Arc::new(ProgressReporter::new(Arc::clone(&host))),
            commands: Arc::new(CommandRegistry::new()),
            host,
            controller,
            store,
            router,
        };

        extension.register_snippet_folder_command(config.snippet_dir.clone())?;
        extension.register_restart_command()?;
        extension.install_ready_hook();

        let started = extension
            .progress
            .wrap(
                INIT_PROGRESS_TITLE,
                ProgressLocation::Window,
                extension.controller.start(),
            )
            .await;
        if let Err(e) = started {
            error!("Client initialization failed: {}", e);
            extension.host.append_output("Client initialization failed");
        }

        Ok(extension)
    }

    /// Stops the language server.
    pub async fn deactivate(&self) {
        info!("Deactivating client");
        self.controller.stop().await;
    }

    /// Runs a command on behalf of the host. Failures also go to the output channel.
    pub async fn execute_command(&self, id: &str, args: Vec<Value>) -> Result<(), CommandError> {
        let result = self.commands.invoke(id, args).await;
        if let Err(e) = &result {
            error!("{}", e);
            self.host.append_output(&format!("[Error] {}", e));
        }
        result
    }

    pub fn controller(&self) -> &Arc<SessionController> {
        &self.controller
    }

    pub fn store(&self) -> &Arc<VirtualDocumentStore> {
        &self.store
    }

    pub fn commands(&self) -> &Arc<CommandRegistry> {
        &self.commands
    }

    pub fn router(&self) -> &Arc<NotificationRouter> {
        &self.router
    }

    fn register_snippet_folder_command(&self, snippet_dir: PathBuf) -> Result<(), CommandError> {
        let host = Arc::clone(&self.host);
        self.commands
            .register(OPEN_USER_SCAFFOLD_SNIPPET_FOLDER, move |_| {
                open_snippet_folder(Arc::clone(&host), snippet_dir.clone())
            })
    }

    fn register_restart_command(&self) -> Result<(), CommandError> {
        let controller = Arc::downgrade(&self.controller);
        let progress = Arc::clone(&self.progress);
        let host = Arc::clone(&self.host);
        self.commands.register(RESTART_SERVER, move |_| {
            restart_server(controller.clone(), Arc::clone(&progress), Arc::clone(&host))
        })
    }

    fn install_ready_hook(&self) {
        let router = Arc::clone(&self.router);
        let store = Arc::clone(&self.store);
        let host = Arc::clone(&self.host);
        let commands = Arc::clone(&self.commands);
        let controller = Arc::downgrade(&self.controller);
        let session_commands_registered = AtomicBool::new(false);

        self.controller.on_ready(move |generation| {
            debug!("Wiring session {}", generation);
            wire_notifications(&router, &store, &host);
            host.set_language_configuration(LANGUAGE_ID, WORD_PATTERN);

            if !session_commands_registered.swap(true, Ordering::SeqCst)
                && let Err(e) = register_session_commands(&commands, &controller, &store, &host)
            {
                error!("Failed to register commands: {}", e);
            }
        });
    }
}

fn wire_notifications(
    router: &NotificationRouter,
    store: &Arc<VirtualDocumentStore>,
    host: &Arc<dyn Host>,
) {
    let open_host = Arc::clone(host);
    router.register(OPEN_WEBSITE, move |params: OpenWebsiteParams| {
        match params.url() {
            Some(url) => open_host.open_external(url),
            None => debug!("{} without a url", OPEN_WEBSITE),
        }
    });

    let store = Arc::clone(store);
    router.register(SHOW_VIRTUAL_FILE, move |params: ShowVirtualFileParams| {
        let (uri, content, source_map) = params.into_parts();
        store.set_contents(uri, content, source_map);
    });

    let log_host = Arc::clone(host);
    router.register("window/logMessage", move |params: LogMessageParams| {
        log_host.append_output(&format!(
            "[{}] {}",
            message_label(params.typ),
            params.message
        ));
    });

    let message_host = Arc::clone(host);
    router.register("window/showMessage", move |params: ShowMessageParams| {
        message_host.append_output(&format!(
            "[{}] {}",
            message_label(params.typ),
            params.message
        ));
    });
}

fn message_label(typ: MessageType) -> &'static str {
    if typ == MessageType::ERROR {
        "Error"
    } else if typ == MessageType::WARNING {
        "Warn"
    } else if typ == MessageType::INFO {
        "Info"
    } else {
        "Log"
    }
}

fn register_session_commands(
    commands: &CommandRegistry,
    controller: &Weak<SessionController>,
    store: &Arc<VirtualDocumentStore>,
    host: &Arc<dyn Host>,
) -> Result<(), CommandError> {
    let output_host = Arc::clone(host);
    commands.register(SHOW_OUTPUT_CHANNEL, move |_| {
        output_host.show_output();
        async { Ok(()) }
    })?;

    let virtual_controller = controller.clone();
    let virtual_store = Arc::clone(store);
    let virtual_host = Arc::clone(host);
    commands.register(SHOW_CORRESPONDING_VIRTUAL_FILE, move |args| {
        show_corresponding_virtual_file(
            virtual_controller.clone(),
            Arc::clone(&virtual_store),
            Arc::clone(&virtual_host),
            args,
        )
    })?;

    let doctor_controller = controller.clone();
    let doctor_host = Arc::clone(host);
    commands.register(SHOW_DOCTOR_INFO, move |args| {
        show_doctor_info(doctor_controller.clone(), Arc::clone(&doctor_host), args)
    })?;

    Ok(())
}

async fn open_snippet_folder(host: Arc<dyn Host>, dir: PathBuf) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("Failed to create snippet folder {}", dir.display()))?;
    host.open_folder(&dir);
    Ok(())
}

async fn restart_server(
    controller: Weak<SessionController>,
    progress: Arc<ProgressReporter>,
    host: Arc<dyn Host>,
) -> anyhow::Result<()> {
    let controller = controller.upgrade().context("Client is deactivated")?;
    let restarted = progress
        .wrap(
            RESTART_PROGRESS_TITLE,
            ProgressLocation::Window,
            controller.restart(),
        )
        .await;

    // The controller already wrote the failure to the output channel.
    if let Err(e) = restarted {
        host.show_information(&format!("Language server restart failed: {}", e));
    }
    Ok(())
}

async fn show_corresponding_virtual_file(
    controller: Weak<SessionController>,
    store: Arc<VirtualDocumentStore>,
    host: Arc<dyn Host>,
    args: Vec<Value>,
) -> anyhow::Result<()> {
    let Some(source) = string_arg(&args, 0).or_else(|| host.active_document()) else {
        host.show_information("Open a component file to show its virtual file");
        return Ok(());
    };
    let controller = controller.upgrade().context("Client is deactivated")?;

    match show_virtual_file(&controller, &store, host.as_ref(), &source).await {
        Ok(ShowVirtualFileOutcome::Shown(uri)) => debug!("Showing {}", uri),
        Ok(ShowVirtualFileOutcome::NoMapping) => {
            host.show_information(&format!("No virtual file for {}", source))
        }
        Err(e) => host.show_information(&format!("Cannot show virtual file: {}", e)),
    }
    Ok(())
}

async fn show_doctor_info(
    controller: Weak<SessionController>,
    host: Arc<dyn Host>,
    args: Vec<Value>,
) -> anyhow::Result<()> {
    let Some(file_name) = string_arg(&args, 0).or_else(|| host.active_document()) else {
        host.show_information("Open a component file to run the doctor");
        return Ok(());
    };
    let controller = controller.upgrade().context("Client is deactivated")?;

    let report: Value = controller
        .request(DOCTOR, &DoctorParams { file_name })
        .await
        .context("Doctor request failed")?;
    host.show_untitled(&pretty_report(report)?, "json");
    Ok(())
}

/// Pretty-prints a doctor report, which servers send either as JSON or as a
/// JSON-encoded string.
fn pretty_report(report: Value) -> anyhow::Result<String> {
    match report {
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(parsed) => Ok(serde_json::to_string_pretty(&parsed)?),
            Err(_) => Ok(text),
        },
        other => Ok(serde_json::to_string_pretty(&other)?),
    }
}
