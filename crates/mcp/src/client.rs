//! Calling side of a session: spawn, handshake, discovery, correlated calls.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::frame::{Frame, FrameReader};
use crate::protocol::{
    CallToolParams, CallToolResult, Implementation, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, ListToolsResult, Message, RequestId,
    is_supported_version,
};
use crate::schema::ToolDefinition;

/// Default bound on the initialize exchange.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on every other request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum frame size (1MB).
/// Sized for large tool outputs (long search results).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Configuration for a server child process.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

/// Tunables for establishing and using a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub handshake_timeout: Duration,
    pub request_timeout: Duration,
    pub client_info: Implementation,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            client_info: Implementation::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }
}

type Writer = Box<dyn AsyncWrite + Send + Unpin>;
type Responder = oneshot::Sender<Result<Value>>;

/// State shared with the background reader.
struct Shared {
    name: String,
    writer: Mutex<Option<Writer>>,
    pending: Mutex<HashMap<RequestId, Responder>>,
    closed: AtomicBool,
}

impl Shared {
    async fn write_frame(&self, frame: &impl Serialize) -> Result<()> {
        let mut line = serde_json::to_string(frame)?;
        line.push('\n');

        let mut writer = self.writer.lock().await;
        let stream = writer.as_mut().ok_or(Error::SessionClosed)?;
        let written = async {
            stream.write_all(line.as_bytes()).await?;
            stream.flush().await
        }
        .await;

        if let Err(e) = written {
            drop(writer);
            warn!(server = %self.name, error = %e, "write to server failed");
            self.shutdown().await;
            return Err(Error::SessionClosed);
        }
        Ok(())
    }

    /// Mark the session closed and fail everything in flight.
    async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let drained: Vec<_> = self.pending.lock().await.drain().collect();
        for (_, responder) in drained {
            let _ = responder.send(Err(Error::SessionClosed));
        }
        // Dropping stdin lets a well-behaved server exit on EOF
        self.writer.lock().await.take();
        debug!(server = %self.name, "session shut down");
    }

    async fn dispatch(&self, message: Message) {
        match message {
            Message::Response(response) => self.resolve(response).await,
            Message::Request(request) => self.answer_peer_request(request).await,
        }
    }

    async fn resolve(&self, response: JsonRpcResponse) {
        let Some(id) = response.id.clone() else {
            warn!(server = %self.name, error = ?response.error, "response without id");
            return;
        };

        let responder = self.pending.lock().await.remove(&id);
        match responder {
            Some(responder) => {
                let outcome = response.into_result().map_err(Error::from);
                let _ = responder.send(outcome);
            }
            None => debug!(server = %self.name, %id, "response for unknown request"),
        }
    }

    /// Fail one pending request without a response to deliver.
    async fn fail(&self, id: &RequestId, error: Error) {
        if let Some(responder) = self.pending.lock().await.remove(id) {
            let _ = responder.send(Err(error));
        }
    }

    async fn answer_peer_request(&self, request: JsonRpcRequest) {
        let Some(id) = request.id else {
            debug!(server = %self.name, method = %request.method, "notification from server");
            return;
        };

        let response = match request.method.as_str() {
            "ping" => JsonRpcResponse::success(id, Value::Object(Map::new())),
            other => {
                warn!(server = %self.name, method = other, "server sent unsupported request");
                JsonRpcResponse::failure(Some(id), JsonRpcError::method_not_found(other))
            }
        };
        if let Err(e) = self.write_frame(&response).await {
            debug!(server = %self.name, error = %e, "failed to answer server request");
        }
    }
}

/// A framed, id-correlated duplex channel to one server.
struct Channel {
    shared: Arc<Shared>,
    child: Mutex<Option<Child>>,
    reader: JoinHandle<()>,
    next_id: AtomicI64,
    request_timeout: Duration,
}

impl Channel {
    fn start<R, W>(
        name: String,
        reader: R,
        writer: W,
        child: Option<Child>,
        request_timeout: Duration,
    ) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let shared = Arc::new(Shared {
            name,
            writer: Mutex::new(Some(Box::new(writer))),
            pending: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });
        let reader = tokio::spawn(read_loop(Arc::clone(&shared), reader));

        Self {
            shared,
            child: Mutex::new(child),
            reader,
            next_id: AtomicI64::new(1),
            request_timeout,
        }
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        self.request_within(method, params, self.request_timeout).await
    }

    async fn request_within<P, R>(&self, method: &str, params: Option<P>, limit: Duration) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.next_request_id();
        let mut request = JsonRpcRequest::new(id.clone(), method);
        if let Some(p) = params {
            request = request.with_params(p)?;
        }

        let (tx, rx) = oneshot::channel();
        {
            // Checked under the lock so shutdown cannot miss this entry
            let mut pending = self.shared.pending.lock().await;
            if self.is_closed() {
                return Err(Error::SessionClosed);
            }
            pending.insert(id.clone(), tx);
        }

        if let Err(e) = self.shared.write_frame(&request).await {
            self.shared.pending.lock().await.remove(&id);
            return Err(e);
        }
        debug!(server = %self.shared.name, %id, method, "request sent");

        let value = match timeout(limit, rx).await {
            Ok(Ok(outcome)) => outcome?,
            Ok(Err(_)) => return Err(Error::SessionClosed),
            Err(_) => {
                self.shared.pending.lock().await.remove(&id);
                return Err(Error::Timeout {
                    method: method.to_string(),
                    after: limit,
                });
            }
        };

        serde_json::from_value(value).map_err(|e| Error::InvalidResponse(format!("{method}: {e}")))
    }

    async fn notify(&self, method: &str) -> Result<()> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        self.shared
            .write_frame(&JsonRpcRequest::notification(method))
            .await
    }

    async fn close(&self) {
        self.shared.shutdown().await;
        self.reader.abort();

        let mut child = self.child.lock().await;
        if let Some(mut process) = child.take() {
            let _ = process.kill().await;
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop<R>(shared: Arc<Shared>, reader: R)
where
    R: AsyncRead + Send + Unpin,
{
    let mut frames = FrameReader::new(reader, MAX_FRAME_SIZE);
    loop {
        let frame = match frames.next_frame().await {
            Ok(Some(Frame::Text(frame))) => frame,
            Ok(Some(Frame::Oversized { size, id })) => {
                warn!(
                    server = %shared.name,
                    size,
                    max = MAX_FRAME_SIZE,
                    "dropping oversized frame"
                );
                if let Some(id) = id {
                    shared
                        .fail(
                            &id,
                            Error::FrameTooLarge {
                                size,
                                max: MAX_FRAME_SIZE,
                            },
                        )
                        .await;
                }
                continue;
            }
            Ok(None) => {
                debug!(server = %shared.name, "server closed its output");
                break;
            }
            Err(e) => {
                warn!(server = %shared.name, error = %e, "read from server failed");
                break;
            }
        };

        match serde_json::from_str::<Message>(&frame) {
            Ok(message) => shared.dispatch(message).await,
            Err(e) => warn!(server = %shared.name, error = %e, "received invalid frame"),
        }
    }

    shared.shutdown().await;
}

/// An established session: handshake done, tools discovered.
///
/// Cloning is cheap and every clone talks over the same channel. Calls may be
/// issued concurrently; responses are matched to callers by request id.
#[derive(Clone)]
pub struct Session {
    channel: Arc<Channel>,
    protocol_version: String,
    server_info: Implementation,
    instructions: Option<String>,
    tools: Arc<[ToolDefinition]>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("server", &self.channel.shared.name)
            .field("protocol_version", &self.protocol_version)
            .field("tools", &self.tools.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Session {
    /// Spawn a server process and establish a session over its stdio.
    pub async fn spawn(config: ServerConfig, options: SessionOptions) -> Result<Self> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut process = cmd.spawn().map_err(|source| Error::Spawn {
            command: config.command.clone(),
            source,
        })?;

        let stdin = process.stdin.take().ok_or_else(|| Error::Spawn {
            command: config.command.clone(),
            source: std::io::Error::other("failed to capture stdin"),
        })?;
        let stdout = process.stdout.take().ok_or_else(|| Error::Spawn {
            command: config.command.clone(),
            source: std::io::Error::other("failed to capture stdout"),
        })?;

        info!(server = %config.name, command = %config.command, "server process started");
        let channel = Channel::start(
            config.name,
            stdout,
            stdin,
            Some(process),
            options.request_timeout,
        );
        Self::establish(channel, options).await
    }

    /// Establish a session over an existing byte stream pair.
    pub async fn connect<R, W>(
        name: impl Into<String>,
        reader: R,
        writer: W,
        options: SessionOptions,
    ) -> Result<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let channel = Channel::start(name.into(), reader, writer, None, options.request_timeout);
        Self::establish(channel, options).await
    }

    async fn establish(channel: Channel, options: SessionOptions) -> Result<Self> {
        let params = InitializeParams::new(options.client_info.clone());
        let handshake = channel.request_within::<_, InitializeResult>(
            "initialize",
            Some(params),
            options.handshake_timeout,
        );

        let init = match handshake.await {
            Ok(init) => init,
            Err(e) => {
                channel.close().await;
                return Err(match e {
                    Error::Timeout { .. } => Error::HandshakeTimeout(options.handshake_timeout),
                    Error::SessionClosed => {
                        Error::Handshake("server closed the channel during initialize".into())
                    }
                    other => Error::Handshake(other.to_string()),
                });
            }
        };

        if !is_supported_version(&init.protocol_version) {
            channel.close().await;
            return Err(Error::Handshake(format!(
                "unsupported protocol version {}",
                init.protocol_version
            )));
        }

        if let Err(e) = channel.notify("notifications/initialized").await {
            channel.close().await;
            return Err(e);
        }

        let listed: ListToolsResult = match channel.request("tools/list", None::<()>).await {
            Ok(listed) => listed,
            Err(e) => {
                channel.close().await;
                return Err(e);
            }
        };

        info!(
            server = %init.server_info.name,
            version = %init.protocol_version,
            tools = listed.tools.len(),
            "session established"
        );

        Ok(Self {
            channel: Arc::new(channel),
            protocol_version: init.protocol_version,
            server_info: init.server_info,
            instructions: init.instructions,
            tools: listed.tools.into(),
        })
    }

    /// Name from the server configuration.
    pub fn name(&self) -> &str {
        &self.channel.shared.name
    }

    /// Protocol version agreed during the handshake.
    pub fn protocol_version(&self) -> &str {
        &self.protocol_version
    }

    pub fn server_info(&self) -> &Implementation {
        &self.server_info
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    /// Tool definitions discovered after the handshake. Fixed for the
    /// lifetime of the session.
    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }

    /// Call a tool by name.
    ///
    /// Tool-level failures come back as `Ok` with `is_error` set; `Err` means
    /// the transport failed.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments: Some(arguments),
        };
        self.channel.request("tools/call", Some(params)).await
    }

    /// Round-trip a ping to check liveness.
    pub async fn ping(&self) -> Result<()> {
        let _: Value = self.channel.request("ping", None::<()>).await?;
        Ok(())
    }

    /// Close the session and terminate the server process.
    ///
    /// Calls in flight on any clone fail with [`Error::SessionClosed`], as
    /// does every call issued afterwards.
    pub async fn close(&self) {
        self.channel.close().await;
        info!(server = %self.name(), "session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream, duplex, split};

    fn options() -> SessionOptions {
        SessionOptions {
            handshake_timeout: Duration::from_millis(200),
            request_timeout: Duration::from_secs(2),
            ..SessionOptions::default()
        }
    }

    async fn read_request(lines: &mut tokio::io::Lines<BufReader<tokio::io::ReadHalf<DuplexStream>>>) -> Value {
        let line = lines.next_line().await.unwrap().unwrap();
        serde_json::from_str(&line).unwrap()
    }

    async fn reply(writer: &mut tokio::io::WriteHalf<DuplexStream>, frame: Value) {
        let mut line = frame.to_string();
        line.push('\n');
        writer.write_all(line.as_bytes()).await.unwrap();
    }

    /// Answers initialize and tools/list, then hands the stream back.
    async fn scripted_handshake(
        server: DuplexStream,
    ) -> (
        tokio::io::Lines<BufReader<tokio::io::ReadHalf<DuplexStream>>>,
        tokio::io::WriteHalf<DuplexStream>,
    ) {
        let (read, mut write) = split(server);
        let mut lines = BufReader::new(read).lines();

        let init = read_request(&mut lines).await;
        assert_eq!(init["method"], "initialize");
        reply(
            &mut write,
            json!({"jsonrpc":"2.0","id":init["id"],"result":{
                "protocolVersion":"2024-11-05",
                "capabilities":{"tools":{}},
                "serverInfo":{"name":"scripted","version":"0"}
            }}),
        )
        .await;

        let initialized = read_request(&mut lines).await;
        assert_eq!(initialized["method"], "notifications/initialized");

        let list = read_request(&mut lines).await;
        assert_eq!(list["method"], "tools/list");
        reply(
            &mut write,
            json!({"jsonrpc":"2.0","id":list["id"],"result":{"tools":[
                {"name":"echo","inputSchema":{"type":"object","properties":{}}}
            ]}}),
        )
        .await;

        (lines, write)
    }

    async fn connected() -> (
        Session,
        tokio::io::Lines<BufReader<tokio::io::ReadHalf<DuplexStream>>>,
        tokio::io::WriteHalf<DuplexStream>,
    ) {
        let (client, server) = duplex(64 * 1024);
        let (read, write) = split(client);
        let server = tokio::spawn(scripted_handshake(server));
        let session = Session::connect("test", read, write, options()).await.unwrap();
        let (lines, writer) = server.await.unwrap();
        (session, lines, writer)
    }

    #[tokio::test]
    async fn handshake_and_discovery() {
        let (session, _lines, _writer) = connected().await;
        assert_eq!(session.protocol_version(), "2024-11-05");
        assert_eq!(session.server_info().name, "scripted");
        assert_eq!(session.tools().len(), 1);
        assert_eq!(session.tools()[0].name, "echo");
    }

    #[tokio::test]
    async fn silent_server_times_out_handshake() {
        let (client, _server) = duplex(1024);
        let (read, write) = split(client);
        let result = Session::connect("silent", read, write, options()).await;
        assert!(matches!(result, Err(Error::HandshakeTimeout(_))));
    }

    #[tokio::test]
    async fn unsupported_version_fails_handshake() {
        let (client, server) = duplex(1024);
        let (read, write) = split(client);
        tokio::spawn(async move {
            let (read, mut write) = split(server);
            let mut lines = BufReader::new(read).lines();
            let init = read_request(&mut lines).await;
            reply(
                &mut write,
                json!({"jsonrpc":"2.0","id":init["id"],"result":{
                    "protocolVersion":"1999-01-01",
                    "serverInfo":{"name":"old"}
                }}),
            )
            .await;
            // keep the stream open
            let _ = lines.next_line().await;
        });

        let result = Session::connect("old", read, write, options()).await;
        assert!(matches!(result, Err(Error::Handshake(_))));
    }

    #[tokio::test]
    async fn responses_are_matched_by_id_not_order() {
        let (session, mut lines, mut writer) = connected().await;

        let first = session.call_tool("echo", Map::new());
        let second = session.call_tool("echo", Map::new());

        let server = async {
            let a = read_request(&mut lines).await;
            let b = read_request(&mut lines).await;
            // answer in reverse order
            for req in [&b, &a] {
                reply(
                    &mut writer,
                    json!({"jsonrpc":"2.0","id":req["id"],"result":{
                        "content":[{"type":"text","text":format!("reply-{}", req["id"])}]
                    }}),
                )
                .await;
            }
            (a["id"].clone(), b["id"].clone())
        };

        let (first, second, (id_a, id_b)) = tokio::join!(first, second, server);
        let first = first.unwrap().joined_text();
        let second = second.unwrap().joined_text();

        let mut got = vec![first, second];
        got.sort();
        let mut expected = vec![format!("reply-{id_a}"), format!("reply-{id_b}")];
        expected.sort();
        assert_eq!(got, expected);
        assert_ne!(id_a, id_b);
    }

    #[tokio::test]
    async fn call_after_close_fails() {
        let (session, _lines, _writer) = connected().await;
        session.close().await;
        assert!(session.is_closed());

        let result = session.call_tool("echo", Map::new()).await;
        assert!(matches!(result, Err(Error::SessionClosed)));
    }

    #[tokio::test]
    async fn in_flight_call_fails_when_server_goes_away() {
        let (session, mut lines, writer) = connected().await;

        let call = session.call_tool("echo", Map::new());
        let server = async move {
            let _ = read_request(&mut lines).await;
            drop(writer);
            drop(lines);
        };

        let (result, ()) = tokio::join!(call, server);
        assert!(matches!(result, Err(Error::SessionClosed)));
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn server_ping_is_answered() {
        let (_session, mut lines, mut writer) = connected().await;
        reply(&mut writer, json!({"jsonrpc":"2.0","id":"srv-1","method":"ping"})).await;
        let answer = read_request(&mut lines).await;
        assert_eq!(answer["id"], "srv-1");
        assert!(answer["result"].is_object());
    }

    #[tokio::test]
    async fn oversized_response_fails_only_its_caller() {
        let (session, mut lines, mut writer) = connected().await;

        let call = session.call_tool("echo", Map::new());
        let server = async {
            let req = read_request(&mut lines).await;
            let text = "x".repeat(MAX_FRAME_SIZE);
            reply(
                &mut writer,
                json!({"jsonrpc":"2.0","id":req["id"],"result":{"content":[{"type":"text","text":text}]}}),
            )
            .await;
        };

        let (result, ()) = tokio::join!(call, server);
        assert!(matches!(result, Err(Error::FrameTooLarge { .. })), "{result:?}");
        assert!(!session.is_closed());
    }
}
