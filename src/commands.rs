//! Named commands invoked by the host editor

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub const OPEN_USER_SCAFFOLD_SNIPPET_FOLDER: &str = "vls.openUserScaffoldSnippetFolder";
pub const RESTART_SERVER: &str = "vls.restartServer";
pub const SHOW_OUTPUT_CHANNEL: &str = "vls.showOutputChannel";
pub const SHOW_CORRESPONDING_VIRTUAL_FILE: &str = "vls.showCorrespondingVirtualFile";
pub const SHOW_DOCTOR_INFO: &str = "vls.showDoctorInfo";

pub type CommandHandler = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Command already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Unknown command: {0}")]
    Unknown(String),

    #[error("Command {id} failed: {source}")]
    Handler {
        id: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Binds command identifiers to handlers. Identifiers are unique.
#[derive(Default)]
pub struct CommandRegistry {
    handlers: RwLock<HashMap<String, CommandHandler>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `id`.
    ///
    /// Registering the same id twice is a programming error and is rejected.
    pub fn register<F, Fut>(&self, id: &str, handler: F) -> Result<(), CommandError>
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut handlers = self.handlers.write();
        if handlers.contains_key(id) {
            return Err(CommandError::AlreadyRegistered(id.to_string()));
        }

        let handler: CommandHandler =
            Arc::new(move |args: Vec<Value>| -> BoxFuture<'static, anyhow::Result<()>> {
                Box::pin(handler(args))
            });
        handlers.insert(id.to_string(), handler);
        debug!("Registered command {}", id);
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.handlers.read().contains_key(id)
    }

    /// Registered identifiers, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.handlers.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Runs the handler bound to `id`.
    pub async fn invoke(&self, id: &str, args: Vec<Value>) -> Result<(), CommandError> {
        let handler = self
            .handlers
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| CommandError::Unknown(id.to_string()))?;

        debug!("Invoking command {}", id);
        handler(args).await.map_err(|source| CommandError::Handler {
            id: id.to_string(),
            source,
        })
    }
}

/// Argument `index` of a command as a string, if present.
pub fn string_arg(args: &[Value], index: usize) -> Option<String> {
    args.get(index).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[tokio::test]
    async fn invoke_passes_arguments_to_handler() {
        let registry = CommandRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        registry
            .register("test.echo", move |args| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().extend(args);
                    Ok(())
                }
            })
            .unwrap();

        registry
            .invoke("test.echo", vec![json!("file:///a.vue")])
            .await
            .unwrap();

        assert_eq!(*seen.lock(), vec![json!("file:///a.vue")]);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = CommandRegistry::new();
        registry.register("test.a", |_| async { Ok(()) }).unwrap();

        let result = registry.register("test.a", |_| async { Ok(()) });

        assert!(matches!(result, Err(CommandError::AlreadyRegistered(id)) if id == "test.a"));
        assert_eq!(registry.ids(), vec!["test.a".to_string()]);
    }

    #[tokio::test]
    async fn unknown_command_is_an_error() {
        let registry = CommandRegistry::new();

        let result = registry.invoke("test.missing", Vec::new()).await;

        assert!(matches!(result, Err(CommandError::Unknown(_))));
    }

    #[tokio::test]
    async fn handler_failure_is_wrapped_with_command_id() {
        let registry = CommandRegistry::new();
        registry
            .register("test.fail", |_| async { Err(anyhow::anyhow!("no workspace")) })
            .unwrap();

        let err = registry.invoke("test.fail", Vec::new()).await.unwrap_err();

        assert_eq!(err.to_string(), "Command test.fail failed: no workspace");
    }

    #[test]
    fn string_arg_reads_only_strings() {
        let args = vec![json!("file:///a.vue"), json!(3)];

        assert_eq!(string_arg(&args, 0).as_deref(), Some("file:///a.vue"));
        assert_eq!(string_arg(&args, 1), None);
        assert_eq!(string_arg(&args, 2), None);
    }
}
