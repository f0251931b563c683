//! Serving side: answer initialize, tools/list and tools/call over a
//! newline-delimited stream.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use serde_json::{Map, Value};
use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::MAX_FRAME_SIZE;
use crate::error::{Error, Result};
use crate::frame::{Frame, FrameReader};
use crate::protocol::{
    CallToolParams, CallToolResult, Implementation, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, ListToolsResult, PROTOCOL_VERSION, RequestId,
    ServerCapabilities, ToolsCapability, is_supported_version,
};
use crate::schema::ToolDefinition;

/// A set of tools exposed over the protocol.
///
/// Implementations report tool failures as error-flagged results; the
/// serving loop never turns them into protocol errors.
pub trait ToolService: Send + Sync + 'static {
    fn server_info(&self) -> Implementation;

    fn instructions(&self) -> Option<String> {
        None
    }

    /// Definitions advertised by `tools/list`, in a stable order.
    fn list_tools(&self) -> Vec<ToolDefinition>;

    fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> impl Future<Output = CallToolResult> + Send;
}

/// Serve over this process's stdin and stdout until stdin closes.
pub async fn serve_stdio<S: ToolService>(service: Arc<S>) -> Result<()> {
    serve(service, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Serve one client over a byte stream pair until the reader reaches EOF.
///
/// Tool calls run concurrently; responses are written as they complete and
/// carry the id of the request they answer. Calls still running at EOF are
/// allowed to finish before this returns.
pub async fn serve<S, R, W>(service: Arc<S>, reader: R, writer: W) -> Result<()>
where
    S: ToolService,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(write_loop(writer, rx));

    let mut frames = FrameReader::new(reader, MAX_FRAME_SIZE);
    let mut initialized = false;

    let outcome = loop {
        let line = match frames.next_frame().await {
            Ok(Some(Frame::Text(line))) => line,
            Ok(Some(Frame::Oversized { size, id })) => {
                let err = Error::FrameTooLarge {
                    size,
                    max: MAX_FRAME_SIZE,
                };
                warn!(error = %err, "rejecting frame");
                let _ = tx.send(JsonRpcResponse::failure(
                    id,
                    JsonRpcError::new(JsonRpcError::INVALID_REQUEST, err.to_string()),
                ));
                continue;
            }
            Ok(None) => break Ok(()),
            Err(e) => break Err(Error::Io(e)),
        };
        let frame = line.as_str();

        let request = match decode_request(frame) {
            Decoded::Request(request) => request,
            Decoded::Ignored => continue,
            Decoded::Rejected(response) => {
                let _ = tx.send(response);
                continue;
            }
        };

        let Some(id) = request.id.clone() else {
            debug!(method = %request.method, "notification");
            continue;
        };

        match request.method.as_str() {
            "initialize" => {
                let response = initialize(service.as_ref(), id, request.params);
                initialized |= response.error.is_none();
                let _ = tx.send(response);
            }
            "ping" => {
                let _ = tx.send(JsonRpcResponse::success(id, Value::Object(Map::new())));
            }
            _ if !initialized => {
                let _ = tx.send(JsonRpcResponse::failure(
                    Some(id),
                    JsonRpcError::new(JsonRpcError::NOT_INITIALIZED, "session not initialized"),
                ));
            }
            "tools/list" => {
                let _ = tx.send(respond(
                    id,
                    ListToolsResult {
                        tools: service.list_tools(),
                    },
                ));
            }
            "tools/call" => {
                let params = match request.params.map(serde_json::from_value::<CallToolParams>) {
                    Some(Ok(params)) => params,
                    Some(Err(e)) => {
                        let _ = tx.send(JsonRpcResponse::failure(
                            Some(id),
                            JsonRpcError::invalid_params(e),
                        ));
                        continue;
                    }
                    None => {
                        let _ = tx.send(JsonRpcResponse::failure(
                            Some(id),
                            JsonRpcError::invalid_params("missing tool name"),
                        ));
                        continue;
                    }
                };

                let service = Arc::clone(&service);
                let tx = tx.clone();
                tokio::spawn(async move {
                    debug!(tool = %params.name, %id, "tool call");
                    let arguments = params.arguments.unwrap_or_default();
                    let call = AssertUnwindSafe(service.call_tool(&params.name, arguments));
                    let result = match call.catch_unwind().await {
                        Ok(result) => result,
                        Err(panic) => {
                            let reason = panic_message(panic.as_ref());
                            warn!(tool = %params.name, %id, reason, "tool handler panicked");
                            CallToolResult::error(format!(
                                "Error: tool {} failed: {reason}",
                                params.name
                            ))
                        }
                    };
                    let _ = tx.send(respond(id, result));
                });
            }
            other => {
                let _ = tx.send(JsonRpcResponse::failure(
                    Some(id),
                    JsonRpcError::method_not_found(other),
                ));
            }
        }
    };

    drop(tx);
    if let Err(e) = writer_task.await {
        warn!(error = %e, "writer task failed");
    }
    info!("client disconnected");
    outcome
}

enum Decoded {
    Request(JsonRpcRequest),
    Ignored,
    Rejected(JsonRpcResponse),
}

fn decode_request(frame: &str) -> Decoded {
    let value: Value = match serde_json::from_str(frame) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "unparseable frame");
            return Decoded::Rejected(JsonRpcResponse::failure(
                None,
                JsonRpcError::new(JsonRpcError::PARSE_ERROR, format!("parse error: {e}")),
            ));
        }
    };

    if value.get("method").is_none() && value.get("id").is_some() {
        // A response to something we never sent
        debug!("ignoring response frame from client");
        return Decoded::Ignored;
    }

    let id = value
        .get("id")
        .cloned()
        .and_then(|id| serde_json::from_value::<RequestId>(id).ok());
    match serde_json::from_value::<JsonRpcRequest>(value) {
        Ok(request) => Decoded::Request(request),
        Err(e) => Decoded::Rejected(JsonRpcResponse::failure(
            id,
            JsonRpcError::new(JsonRpcError::INVALID_REQUEST, format!("invalid request: {e}")),
        )),
    }
}

fn initialize<S: ToolService>(
    service: &S,
    id: RequestId,
    params: Option<Value>,
) -> JsonRpcResponse {
    let params = match params.map(serde_json::from_value::<InitializeParams>) {
        Some(Ok(params)) => params,
        Some(Err(e)) => return JsonRpcResponse::failure(Some(id), JsonRpcError::invalid_params(e)),
        None => {
            return JsonRpcResponse::failure(
                Some(id),
                JsonRpcError::invalid_params("missing initialize params"),
            );
        }
    };

    let protocol_version = if is_supported_version(&params.protocol_version) {
        params.protocol_version
    } else {
        PROTOCOL_VERSION.to_string()
    };
    info!(
        client = %params.client_info.name,
        version = %protocol_version,
        "client initialized"
    );

    respond(
        id,
        InitializeResult {
            protocol_version,
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
            },
            server_info: service.server_info(),
            instructions: service.instructions(),
        },
    )
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("handler panicked")
}

fn respond(id: RequestId, result: impl serde::Serialize) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::failure(
            Some(id),
            JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, format!("failed to encode result: {e}")),
        ),
    }
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<JsonRpcResponse>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = match serde_json::to_string(&response) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to encode response");
                continue;
            }
        };
        line.push('\n');

        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = written {
            warn!(error = %e, "write to client failed");
            break;
        }
    }
}
