//! IPC server and client over a Unix domain socket.
//!
//! Each connection carries NDJSON: the client writes one request per line
//! and the server answers each with one response line, in order.

use crate::protocol::{BatchParams, DeleteParams, InsertParams, WireDbResult};
use crate::{error_codes, IpcError, IpcResult, Method, Request, Response};
use event_model::{Event, EventCategory, EventDbResult, SendPolicy};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

/// Handler function type for IPC methods.
pub type HandlerFn =
    Box<dyn Fn(Request) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync>;

type HandlerMap = Arc<RwLock<HashMap<Method, HandlerFn>>>;

/// IPC server that listens on a Unix domain socket.
pub struct IpcServer {
    socket_path: PathBuf,
    handlers: HandlerMap,
    shutdown_tx: broadcast::Sender<()>,
}

impl IpcServer {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            handlers: Arc::new(RwLock::new(HashMap::new())),
            shutdown_tx,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Register a handler for a method, replacing any previous one.
    pub async fn register_handler<F, Fut>(&self, method: Method, handler: F)
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        let boxed_handler: HandlerFn = Box::new(move |req| Box::pin(handler(req)));
        self.handlers.write().await.insert(method, boxed_handler);
    }

    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Trigger shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Listen for connections until [`IpcServer::shutdown`] is called.
    ///
    /// A stale socket file left by a previous run is replaced; the socket
    /// file is removed again on exit.
    pub async fn run(&self) -> IpcResult<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        info!(path = %self.socket_path.display(), "IPC server listening");

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, _)) => {
                            let handlers = self.handlers.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, handlers).await {
                                    error!(error = %e, "Connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Accept error");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("IPC server shutting down");
                    break;
                }
            }
        }

        let _ = std::fs::remove_file(&self.socket_path);

        Ok(())
    }
}

async fn write_response(writer: &mut OwnedWriteHalf, response: &Response) -> IpcResult<()> {
    let response_json = response.to_json()?;
    debug!(response = %response_json, "Sending response");
    writer.write_all(response_json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Handle a single client connection.
async fn handle_connection(stream: UnixStream, handlers: HandlerMap) -> IpcResult<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    debug!("Client connected");

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;

        if bytes_read == 0 {
            debug!("Client disconnected");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        debug!(request = %trimmed, "Received request");

        let request = match Request::from_json(trimmed) {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "Failed to parse request");
                let response =
                    Response::error("", error_codes::PARSE_ERROR, &format!("Parse error: {}", e));
                write_response(&mut writer, &response).await?;
                continue;
            }
        };

        let response = {
            let handlers = handlers.read().await;
            match handlers.get(&request.method) {
                Some(handler) => handler(request).await,
                None => Response::error(
                    &request.id,
                    error_codes::METHOD_NOT_FOUND,
                    &format!("Method not found: {:?}", request.method),
                ),
            }
        };

        write_response(&mut writer, &response).await?;
    }

    Ok(())
}

/// IPC client for processes that do not own the event store.
#[derive(Debug, Clone)]
pub struct IpcClient {
    socket_path: PathBuf,
}

impl IpcClient {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    /// Send a request and wait for response.
    pub async fn call(&self, request: Request) -> IpcResult<Response> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| IpcError::Socket(format!("Failed to connect: {}", e)))?;

        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let request_json = request.to_json()?;
        writer.write_all(request_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        let mut line = String::new();
        reader.read_line(&mut line).await?;

        if line.is_empty() {
            return Err(IpcError::ConnectionClosed);
        }

        let response = Response::from_json(line.trim())?;
        if response.id != request.id && !response.id.is_empty() {
            return Err(IpcError::Protocol(format!(
                "response id {} does not match request id {}",
                response.id, request.id
            )));
        }
        Ok(response)
    }

    /// Send a method call with no parameters.
    pub async fn call_method(&self, method: Method) -> IpcResult<Response> {
        self.call(Request::new(method)).await
    }

    /// Send a method call with parameters.
    pub async fn call_method_with_params(
        &self,
        method: Method,
        params: serde_json::Value,
    ) -> IpcResult<Response> {
        self.call(Request::with_params(method, params)).await
    }

    /// Check if a store server answers on the socket.
    pub async fn is_server_running(&self) -> bool {
        match self.call_method(Method::Health).await {
            Ok(response) => response.is_success(),
            Err(_) => false,
        }
    }

    pub async fn insert(&self, event: &Event) -> IpcResult<EventDbResult> {
        let params = serde_json::to_value(InsertParams {
            event: event.clone(),
        })?;
        self.store_call(Method::EventsInsert, Some(params)).await
    }

    pub async fn query(&self, policy: SendPolicy, limit: usize) -> IpcResult<EventDbResult> {
        let params = serde_json::to_value(BatchParams { policy, limit })?;
        self.store_call(Method::EventsQuery, Some(params)).await
    }

    pub async fn query_and_delete(
        &self,
        policy: SendPolicy,
        limit: usize,
    ) -> IpcResult<EventDbResult> {
        let params = serde_json::to_value(BatchParams { policy, limit })?;
        self.store_call(Method::EventsQueryAndDelete, Some(params)).await
    }

    pub async fn delete(
        &self,
        last_id: i64,
        policy: SendPolicy,
        category: EventCategory,
    ) -> IpcResult<EventDbResult> {
        let params = serde_json::to_value(DeleteParams {
            last_id,
            policy,
            category,
        })?;
        self.store_call(Method::EventsDelete, Some(params)).await
    }

    pub async fn remove_overdue(&self) -> IpcResult<EventDbResult> {
        self.store_call(Method::EventsRemoveOverdue, None).await
    }

    pub async fn clear(&self) -> IpcResult<EventDbResult> {
        self.store_call(Method::EventsClear, None).await
    }

    async fn store_call(
        &self,
        method: Method,
        params: Option<serde_json::Value>,
    ) -> IpcResult<EventDbResult> {
        let request = match params {
            Some(params) => Request::with_params(method, params),
            None => Request::new(method),
        };
        let value = self.call(request).await?.into_result()?;
        let wire: WireDbResult = serde_json::from_value(value)?;
        wire.into_db_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_without_server() {
        let dir = tempfile::tempdir().unwrap();
        let client = IpcClient::new(dir.path().join("missing.sock"));
        assert!(!client.is_server_running().await);
        assert!(matches!(
            client.call_method(Method::Health).await,
            Err(IpcError::Socket(_))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_receiver() {
        let server = IpcServer::new("/tmp/tracker-ipc-unused.sock");
        let mut receiver = server.shutdown_receiver();
        server.shutdown();
        assert!(receiver.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_method_and_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("ipc.sock");
        let server = Arc::new(IpcServer::new(&socket));
        let runner = server.clone();
        let task = tokio::spawn(async move { runner.run().await });

        let client = IpcClient::new(&socket);
        for _ in 0..50 {
            if socket.exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let response = client.call_method(Method::EventsClear).await.unwrap();
        assert_eq!(
            response.error.as_ref().map(|e| e.code),
            Some(error_codes::METHOD_NOT_FOUND)
        );

        let stream = UnixStream::connect(&socket).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        writer.write_all(b"{not json}\n").await.unwrap();
        let mut line = String::new();
        BufReader::new(reader).read_line(&mut line).await.unwrap();
        let response = Response::from_json(line.trim()).unwrap();
        assert_eq!(
            response.error.map(|e| e.code),
            Some(error_codes::PARSE_ERROR)
        );

        server.shutdown();
        task.await.unwrap().unwrap();
        assert!(!socket.exists());
    }
}
