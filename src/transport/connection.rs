//! Bidirectional JSON-RPC connection to a language server.
//!
//! A connection owns one I/O task that serializes all outbound writes and
//! decodes inbound frames. Responses are matched to their pending requests,
//! notifications are queued in delivery order for the session pump, and
//! server-initiated requests are answered inline so replies keep their order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::codec::{read_message, write_message};
use super::message::{AnyNotification, AnyRequest, AnyResponse, Inbound, RequestId, ResponseError};
use crate::session::SessionError;

type ResponseSender = oneshot::Sender<Result<AnyResponse, SessionError>>;

enum Outbound {
    Notify(AnyNotification),
    Request {
        request: AnyRequest,
        response_tx: ResponseSender,
    },
}

pub struct Connection {
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    notifications: Mutex<Option<mpsc::UnboundedReceiver<AnyNotification>>>,
    closed: watch::Receiver<bool>,
    next_id: AtomicI64,
    request_timeout: Duration,
    child: tokio::sync::Mutex<Option<Child>>,
    io_task: JoinHandle<()>,
}

impl Connection {
    /// Starts the I/O task over a reader/writer pair.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<R, W>(reader: R, writer: W, request_timeout: Duration) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (notification_tx, notification_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed) = watch::channel(false);

        let io_task = tokio::spawn(run_io(
            reader,
            writer,
            outbound_rx,
            notification_tx,
            closed_tx,
        ));

        Self {
            outbound_tx,
            notifications: Mutex::new(Some(notification_rx)),
            closed,
            next_id: AtomicI64::new(1),
            request_timeout,
            child: tokio::sync::Mutex::new(None),
            io_task,
        }
    }

    /// Attaches the child process whose stdio backs this connection.
    pub fn with_child(mut self, child: Child) -> Self {
        self.child = tokio::sync::Mutex::new(Some(child));
        self
    }

    /// Takes the inbound notification queue. Only the first call returns it.
    pub fn take_notifications(&self) -> Option<mpsc::UnboundedReceiver<AnyNotification>> {
        self.notifications.lock().take()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Sends a request and waits for its result, bounded by the request timeout.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, SessionError> {
        self.request_with_timeout(method, params, self.request_timeout)
            .await
    }

    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, SessionError> {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (response_tx, response_rx) = oneshot::channel();

        self.outbound_tx
            .send(Outbound::Request {
                request: AnyRequest {
                    id,
                    method: method.to_string(),
                    params,
                },
                response_tx,
            })
            .map_err(|_| SessionError::ConnectionClosed)?;

        let response = match tokio::time::timeout(timeout, response_rx).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => return Err(SessionError::ConnectionClosed),
            Err(_) => return Err(SessionError::Timeout(method.to_string())),
        };

        if let Some(error) = response.error {
            return Err(SessionError::Response(error));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    pub fn notify(&self, method: &str, params: Value) -> Result<(), SessionError> {
        self.outbound_tx
            .send(Outbound::Notify(AnyNotification::new(method, params)))
            .map_err(|_| SessionError::ConnectionClosed)
    }

    /// Waits for the connection and its process to end, forcing termination
    /// after `grace`.
    pub async fn close(&self, grace: Duration) {
        let mut closed = self.closed.clone();
        if tokio::time::timeout(grace, closed.wait_for(|closed| *closed))
            .await
            .is_err()
        {
            debug!("Connection still open after grace period, aborting I/O task");
        }
        self.io_task.abort();

        let Some(mut child) = self.child.lock().await.take() else {
            return;
        };

        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => info!("Language server exited with {}", status),
            Ok(Err(e)) => warn!("Failed to wait for language server: {}", e),
            Err(_) => {
                warn!("Language server did not exit within {:?}, killing it", grace);
                if let Err(e) = child.kill().await {
                    error!("Failed to kill language server: {}", e);
                }
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.io_task.abort();
    }
}

async fn run_io<R, W>(
    reader: R,
    mut writer: W,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    notification_tx: mpsc::UnboundedSender<AnyNotification>,
    closed_tx: watch::Sender<bool>,
) where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    // Frame reads are not cancel-safe, so they get their own task.
    let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
    let reader_task = tokio::spawn(read_loop(reader, inbound_tx));
    let mut pending: HashMap<RequestId, ResponseSender> = HashMap::new();

    loop {
        tokio::select! {
            out = outbound_rx.recv() => {
                let Some(out) = out else {
                    debug!("Connection handle dropped, stopping I/O");
                    break;
                };

                let write_res = match out {
                    Outbound::Notify(notification) => {
                        write_message(&mut writer, &json!(notification)).await
                    }
                    Outbound::Request { request, response_tx } => {
                        match write_message(&mut writer, &json!(request)).await {
                            Ok(()) => {
                                pending.insert(request.id, response_tx);
                                Ok(())
                            }
                            Err(e) => {
                                let _ = response_tx.send(Err(SessionError::ConnectionClosed));
                                Err(e)
                            }
                        }
                    }
                };

                if let Err(e) = write_res {
                    error!("Outbound write failed, closing connection: {}", e);
                    break;
                }
            }

            inbound = inbound_rx.recv() => {
                match inbound {
                    Some(Ok(msg)) => {
                        if let Err(e) =
                            handle_inbound(msg, &mut pending, &notification_tx, &mut writer).await
                        {
                            error!("Failed to answer server request: {}", e);
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        error!("Error reading from language server: {}", e);
                        break;
                    }
                    None => {
                        info!("Language server closed the connection");
                        break;
                    }
                }
            }
        }
    }

    reader_task.abort();
    // Flag the close before `notification_tx` drops so the session pump,
    // which wakes on the closed queue, always observes it.
    closed_tx.send_replace(true);
    for (_, tx) in pending {
        let _ = tx.send(Err(SessionError::ConnectionClosed));
    }
    outbound_rx.close();
    while let Ok(out) = outbound_rx.try_recv() {
        if let Outbound::Request { response_tx, .. } = out {
            let _ = response_tx.send(Err(SessionError::ConnectionClosed));
        }
    }
}

async fn read_loop<R>(reader: R, inbound_tx: mpsc::UnboundedSender<Result<Value, SessionError>>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = String::new();

    loop {
        match read_message(&mut reader, &mut buf).await {
            Ok(Some(msg)) => {
                if inbound_tx.send(Ok(msg)).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            // The frame was consumed whole, so the stream is still in sync.
            Err(SessionError::Deserialize(e)) => {
                warn!("Skipping frame with invalid JSON body: {}", e);
            }
            Err(e) => {
                let _ = inbound_tx.send(Err(e));
                break;
            }
        }
    }
}

async fn handle_inbound<W>(
    msg: Value,
    pending: &mut HashMap<RequestId, ResponseSender>,
    notification_tx: &mpsc::UnboundedSender<AnyNotification>,
    writer: &mut W,
) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin,
{
    let inbound = match Inbound::classify(msg) {
        Ok(inbound) => inbound,
        Err(e) => {
            warn!("Dropping undecodable message: {}", e);
            return Ok(());
        }
    };

    match inbound {
        Inbound::Response(response) => match pending.remove(&response.id) {
            Some(tx) => {
                let _ = tx.send(Ok(response));
            }
            None => debug!("Response for unknown request id {}", response.id),
        },
        Inbound::Notification(notification) => {
            let _ = notification_tx.send(notification);
        }
        Inbound::Request(request) => {
            let reply = answer_server_request(&request);
            write_message(writer, &json!(reply)).await?;
        }
    }
    Ok(())
}

/// Builds the reply to a server-initiated request.
fn answer_server_request(request: &AnyRequest) -> AnyResponse {
    debug!("Server request {} ({})", request.method, request.id);

    let result = match request.method.as_str() {
        "workspace/configuration" => {
            let items = request
                .params
                .get("items")
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            Ok(Value::Array(vec![Value::Null; items]))
        }
        "client/registerCapability"
        | "client/unregisterCapability"
        | "window/workDoneProgress/create" => Ok(Value::Null),
        method => Err(ResponseError::method_not_found(method)),
    };

    match result {
        Ok(value) => AnyResponse {
            id: request.id.clone(),
            result: Some(value),
            error: None,
        },
        Err(error) => AnyResponse {
            id: request.id.clone(),
            result: None,
            error: Some(error),
        },
    }
}
