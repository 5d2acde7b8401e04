//! TCP IPC server: accept loop and per-connection handler.
//!
//! Requests on one connection are served concurrently; each response carries
//! its request id and is queued to a single writer task. Closing the
//! connection aborts whatever calls are still in flight.

use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::ipc::codec::{read_frame, write_frame, Frame, MSG_ERROR, MSG_REQUEST, MSG_RESPONSE};
use crate::ipc::router::route_request;
use crate::server::ToolServer;
use crate::types::IpcConfig;

/// Responses queued per connection before request handlers wait on the writer.
const RESPONSE_QUEUE: usize = 64;

/// IPC server wrapping the tool server.
#[derive(Debug)]
pub struct IpcServer {
    server: Arc<ToolServer>,
    addr: SocketAddr,
    cancel: CancellationToken,
    ipc_config: IpcConfig,
}

impl IpcServer {
    pub fn new(server: Arc<ToolServer>, addr: SocketAddr, ipc_config: IpcConfig) -> Self {
        Self {
            server,
            addr,
            cancel: CancellationToken::new(),
            ipc_config,
        }
    }

    /// Bind the configured address and serve until cancelled.
    pub async fn serve(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_listener(listener).await
    }

    /// Serve on an already bound listener until cancelled or accept fails.
    pub async fn serve_listener(&self, listener: TcpListener) -> std::io::Result<()> {
        let conn_semaphore = Arc::new(Semaphore::new(self.ipc_config.max_connections));
        tracing::info!(
            "IPC server listening on {} (max_connections={})",
            listener.local_addr()?,
            self.ipc_config.max_connections,
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("IPC server shutting down");
                    break;
                }
                accept = listener.accept() => {
                    let (stream, peer) = accept?;

                    let permit = match conn_semaphore.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            tracing::warn!(
                                "Connection from {} rejected: at max_connections ({})",
                                peer,
                                self.ipc_config.max_connections,
                            );
                            drop(stream);
                            continue;
                        }
                    };

                    tracing::debug!("IPC connection from {} (active={})",
                        peer,
                        self.ipc_config.max_connections - conn_semaphore.available_permits(),
                    );
                    let server = self.server.clone();
                    let cancel = self.cancel.clone();
                    let ipc_config = self.ipc_config.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, server, cancel, ipc_config, permit).await {
                            tracing::warn!("Connection from {} error: {}", peer, e);
                        }
                    });
                }
            }
        }
        Ok(())
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Token cancelled by [`IpcServer::shutdown`].
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

fn error_body(id: Value, code: &str, message: String) -> Value {
    json!({
        "id": id,
        "ok": false,
        "error": {
            "code": code,
            "message": message,
        }
    })
}

/// Handle a single TCP connection: read frames, spawn a task per request,
/// write responses as they complete.
async fn handle_connection(
    stream: TcpStream,
    server: Arc<ToolServer>,
    cancel: CancellationToken,
    ipc_config: IpcConfig,
    _permit: OwnedSemaphorePermit, // held for connection lifetime
) -> std::io::Result<()> {
    let (mut reader, writer) = stream.into_split();
    let read_timeout = Duration::from_secs(ipc_config.read_timeout_secs);
    let write_timeout = Duration::from_secs(ipc_config.write_timeout_secs);

    let (tx, rx) = mpsc::channel::<Frame>(RESPONSE_QUEUE);
    let mut writer_task = tokio::spawn(write_loop(writer, rx, write_timeout));
    let mut in_flight = JoinSet::new();

    let outcome = loop {
        while in_flight.try_join_next().is_some() {}

        tokio::select! {
            _ = cancel.cancelled() => break Ok(()),
            written = &mut writer_task => {
                break match written {
                    Ok(result) => result,
                    Err(join) => Err(std::io::Error::other(join.to_string())),
                };
            }
            frame_result = tokio::time::timeout(read_timeout, read_frame(&mut reader, ipc_config.max_frame_bytes)) => {
                let frame = match frame_result {
                    Err(_elapsed) => {
                        tracing::debug!("Read timeout ({}s), dropping connection", ipc_config.read_timeout_secs);
                        break Ok(());
                    }
                    Ok(Err(e)) => break Err(e),
                    Ok(Ok(None)) => break Ok(()),
                    Ok(Ok(Some(frame))) => frame,
                };

                if frame.msg_type != MSG_REQUEST {
                    let body = error_body(
                        json!(""),
                        "INVALID_ARGUMENT",
                        format!("Unexpected message type: 0x{:02X}", frame.msg_type),
                    );
                    if send(&tx, MSG_ERROR, &body).await.is_err() {
                        break Ok(());
                    }
                    continue;
                }

                let request = match frame.decode() {
                    Ok(v) => v,
                    Err(e) => {
                        let body = error_body(json!(""), "INVALID_ARGUMENT", format!("Invalid msgpack: {}", e));
                        if send(&tx, MSG_ERROR, &body).await.is_err() {
                            break Ok(());
                        }
                        continue;
                    }
                };

                let server = server.clone();
                let tx = tx.clone();
                in_flight.spawn(async move {
                    let (msg_type, body) = respond(&server, request).await;
                    // The receiver is gone only when the connection is closing.
                    let _ = send(&tx, msg_type, &body).await;
                });
            }
        }
    };

    if !in_flight.is_empty() {
        tracing::debug!(aborted = in_flight.len(), "Connection closed with calls in flight");
    }
    in_flight.abort_all();
    writer_task.abort();
    outcome
}

/// Route one decoded request and build its response frame body.
async fn respond(server: &ToolServer, request: Value) -> (u8, Value) {
    let request_id = request.get("id").cloned().unwrap_or_else(|| json!(""));
    let service = request.get("service").and_then(|v| v.as_str()).unwrap_or("");
    let method = request.get("method").and_then(|v| v.as_str()).unwrap_or("");
    let body = request
        .get("body")
        .cloned()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

    match route_request(server, service, method, body).await {
        Ok(response_body) => (
            MSG_RESPONSE,
            json!({
                "id": request_id,
                "ok": true,
                "body": response_body,
            }),
        ),
        Err(e) => {
            tracing::debug!(service, method, code = e.to_ipc_error_code(), "IPC request failed");
            (MSG_ERROR, error_body(request_id, e.to_ipc_error_code(), e.to_string()))
        }
    }
}

async fn send(tx: &mpsc::Sender<Frame>, msg_type: u8, body: &Value) -> std::io::Result<()> {
    let frame = Frame::encode(msg_type, body)?;
    tx.send(frame)
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "connection writer closed"))
}

/// Drain queued responses to the socket. A slow consumer that exceeds the
/// write timeout ends the connection.
async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::Receiver<Frame>,
    timeout: Duration,
) -> std::io::Result<()> {
    while let Some(frame) = rx.recv().await {
        tokio::time::timeout(timeout, write_frame(&mut writer, &frame))
            .await
            .map_err(|_| {
                tracing::warn!("Write timeout ({}s), dropping connection", timeout.as_secs());
                std::io::Error::new(std::io::ErrorKind::TimedOut, "write timeout")
            })??;
    }
    Ok(())
}
