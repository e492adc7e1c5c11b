//! Dispatch of server notifications to typed handlers.
//!
//! Registering a second handler for the same method replaces the first
//! (last registration wins). Notifications without a handler are ignored so
//! newer servers can send methods this client does not know yet. Handlers run
//! inline on the session pump, one at a time, in delivery order.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::transport::AnyNotification;

type Handler = Arc<dyn Fn(Value) + Send + Sync>;

#[derive(Default)]
pub struct NotificationRouter {
    handlers: RwLock<HashMap<String, Handler>>,
}

impl NotificationRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `handler` to `method`, replacing any earlier binding.
    ///
    /// Params that do not deserialize into `P` are logged and dropped.
    pub fn register<P, F>(&self, method: impl Into<String>, handler: F)
    where
        P: DeserializeOwned + 'static,
        F: Fn(P) + Send + Sync + 'static,
    {
        let method = method.into();
        let name = method.clone();
        let handler: Handler = Arc::new(move |params: Value| {
            match serde_json::from_value::<P>(params) {
                Ok(params) => handler(params),
                Err(e) => debug!("Ignoring malformed {} notification: {}", name, e),
            }
        });

        if self.handlers.write().insert(method.clone(), handler).is_some() {
            debug!("Replaced notification handler for {}", method);
        }
    }

    pub fn is_registered(&self, method: &str) -> bool {
        self.handlers.read().contains_key(method)
    }

    /// Runs the handler bound to the notification's method.
    ///
    /// Returns `false` when no handler is bound.
    pub fn dispatch(&self, notification: AnyNotification) -> bool {
        let handler = self.handlers.read().get(&notification.method).cloned();
        match handler {
            Some(handler) => {
                handler(notification.params);
                true
            }
            None => {
                debug!("No handler for {}, ignoring", notification.method);
                false
            }
        }
    }
}
