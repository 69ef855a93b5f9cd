//! MCP Server Implementation
//!
//! Handles MCP requests and dispatches `tools/call` to the tool registry.
//! Calls in flight are tracked per session so `notifications/cancelled` can
//! abort them.

use super::protocol::*;
use super::transport::Transport;
use crate::device::AccessToken;
use crate::tools::{
    ToolContext, ToolError, ToolErrorKind, ToolOutput, ToolRegistry, ToolResult,
    ToolResultEnvelope, ToolRuntime,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// MCP Server configuration
#[derive(Debug, Clone)]
pub struct McpServerConfig {
    /// Server name
    pub name: String,
    /// Server version
    pub version: String,
    /// Free-form usage hint returned from `initialize`
    pub instructions: Option<String>,
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            name: "xiaodu-mcp".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            instructions: Some(
                "Call list_user_devices first, then address a device by its cuid and client_id."
                    .to_string(),
            ),
        }
    }
}

/// Per-connection state handed to every request
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub access_token: Option<AccessToken>,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            access_token: None,
        }
    }

    pub fn with_access_token(mut self, token: Option<AccessToken>) -> Self {
        self.access_token = token;
        self
    }
}

type InFlightKey = (String, RequestId);
type InFlightMap = Arc<Mutex<HashMap<InFlightKey, CancellationToken>>>;

/// Lock a map that is never held across an await
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registration of one running request.
///
/// Dropping it removes the entry, including when the request future is
/// abandoned mid-flight by a disconnected HTTP client.
struct InFlight {
    map: InFlightMap,
    key: InFlightKey,
    token: CancellationToken,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        lock(&self.map).remove(&self.key);
    }
}

/// MCP Server state
#[derive(Clone)]
pub struct McpServer {
    config: Arc<McpServerConfig>,
    tools: Arc<ToolRegistry>,
    runtime: ToolRuntime,
    default_token: Option<AccessToken>,
    in_flight: InFlightMap,
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("config", &self.config)
            .field("tools", &self.tools)
            .finish()
    }
}

impl McpServer {
    pub fn builder() -> McpServerBuilder {
        McpServerBuilder::new()
    }

    pub fn config(&self) -> &McpServerConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Handle one request, tracking it for cancellation while it runs
    pub async fn handle_request(&self, request: JsonRpcRequest, session: &SessionContext) -> JsonRpcResponse {
        match self.track(session, &request.id) {
            Ok(in_flight) => self.dispatch(request, session, in_flight).await,
            Err(error) => JsonRpcResponse::error(request.id, error),
        }
    }

    /// Handle a notification; never produces a response
    pub async fn handle_notification(&self, notification: JsonRpcNotification, session: &SessionContext) {
        match notification.method.as_str() {
            "notifications/initialized" => {
                info!(session = %session.session_id, "Client initialized");
            }
            "notifications/cancelled" => {
                let params: CancelledParams = match notification.params.map(serde_json::from_value) {
                    Some(Ok(params)) => params,
                    _ => {
                        warn!("Ignoring malformed cancellation notification");
                        return;
                    }
                };
                let key = (session.session_id.clone(), params.request_id);
                let token = lock(&self.in_flight).get(&key).cloned();
                match token {
                    Some(token) => {
                        info!(request_id = %key.1, reason = ?params.reason, "Cancelling request");
                        token.cancel();
                    }
                    None => debug!(request_id = %key.1, "Cancellation for unknown or finished request"),
                }
            }
            other => debug!(method = other, "Ignoring notification"),
        }
    }

    /// Register a request id for cancellation. An id already running in the
    /// same session is rejected.
    fn track(&self, session: &SessionContext, id: &RequestId) -> Result<InFlight, JsonRpcError> {
        let key = (session.session_id.clone(), id.clone());
        let token = CancellationToken::new();
        {
            let mut map = lock(&self.in_flight);
            if map.contains_key(&key) {
                warn!(session = %session.session_id, request_id = %id, "Duplicate request id");
                return Err(JsonRpcError::new(
                    -32600,
                    format!("Request id {} is already in flight", id),
                ));
            }
            map.insert(key.clone(), token.clone());
        }
        Ok(InFlight {
            map: self.in_flight.clone(),
            key,
            token,
        })
    }

    async fn dispatch(
        &self,
        request: JsonRpcRequest,
        session: &SessionContext,
        in_flight: InFlight,
    ) -> JsonRpcResponse {
        let cancel = in_flight.token.clone();
        let id = request.id.clone();
        debug!(method = %request.method, id = %id, "Handling request");

        let outcome = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "ping" => Ok(Value::Object(Default::default())),
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(request.params, session, cancel).await,
            _ => Err(JsonRpcError::method_not_found()),
        };

        drop(in_flight);

        match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(id, error),
        }
    }

    fn handle_initialize(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: InitializeParams = parse_params(params, "initialize")?;
        let protocol_version = negotiate_protocol_version(&params.protocol_version);

        if let Some(client) = &params.client_info {
            info!(client = %client.name, version = %client.version, protocol_version, "Initializing session");
        }

        let result = InitializeResult {
            protocol_version: protocol_version.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: false }),
            },
            server_info: ServerInfo {
                name: self.config.name.clone(),
                version: self.config.version.clone(),
            },
            instructions: self.config.instructions.clone(),
        };
        to_result(&result)
    }

    fn handle_tools_list(&self) -> Result<Value, JsonRpcError> {
        let tools = self
            .tools
            .list()
            .into_iter()
            .map(|t| McpTool {
                name: t.name,
                description: t.description,
                input_schema: t.input_schema,
            })
            .collect();
        to_result(&ToolsListResult { tools })
    }

    async fn handle_tools_call(
        &self,
        params: Option<Value>,
        session: &SessionContext,
        cancel: CancellationToken,
    ) -> Result<Value, JsonRpcError> {
        let params: ToolCallParams = parse_params(params, "tools/call")?;
        let tool = self
            .tools
            .get(&params.name)
            .cloned()
            .ok_or_else(|| JsonRpcError::invalid_params(format!("Unknown tool: {}", params.name)))?;

        let ctx = ToolContext::new()
            .with_access_token(session.access_token.clone().or_else(|| self.default_token.clone()))
            .with_trace_id(uuid::Uuid::new_v4().to_string())
            .with_cancellation(cancel);

        let envelope = self.runtime.execute(tool.as_ref(), params.arguments, &ctx).await;
        to_result(&call_result(envelope))
    }

    /// Serve one transport until it closes.
    ///
    /// Requests run concurrently; responses are written as they complete.
    pub async fn run<T: Transport>(&self, mut transport: T) -> crate::error::Result<()> {
        let session = SessionContext::new(uuid::Uuid::new_v4().to_string())
            .with_access_token(self.default_token.clone());
        let (tx, mut rx) = mpsc::channel::<JsonRpcResponse>(64);

        loop {
            tokio::select! {
                incoming = transport.receive() => match incoming {
                    Ok(Some(IncomingMessage::Request(request))) => {
                        let in_flight = match self.track(&session, &request.id) {
                            Ok(in_flight) => in_flight,
                            Err(error) => {
                                transport.send(&JsonRpcResponse::error(request.id, error)).await?;
                                continue;
                            }
                        };
                        let server = self.clone();
                        let session = session.clone();
                        let tx = tx.clone();
                        tokio::spawn(async move {
                            let response = server.dispatch(request, &session, in_flight).await;
                            if tx.send(response).await.is_err() {
                                warn!("Transport closed before response was sent");
                            }
                        });
                    }
                    Ok(Some(IncomingMessage::Notification(notification))) => {
                        self.handle_notification(notification, &session).await;
                    }
                    Ok(Some(IncomingMessage::Invalid { id, error })) => {
                        transport.send(&JsonRpcResponse::error(id, error)).await?;
                    }
                    Ok(Some(IncomingMessage::Response(_))) => {
                        debug!("Ignoring client response");
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!("Transport error: {}", e);
                        break;
                    }
                },
                Some(response) = rx.recv() => {
                    transport.send(&response).await?;
                }
            }
        }

        // flush calls still running when input closed
        drop(tx);
        while let Some(response) = rx.recv().await {
            transport.send(&response).await?;
        }
        Ok(())
    }
}

/// Render a tool envelope as an MCP `tools/call` result
pub fn call_result(envelope: ToolResultEnvelope) -> ToolCallResult {
    let failure = |error: ToolError| ToolCallResult {
        content: vec![ContentBlock::text(error.to_payload().to_string())],
        is_error: Some(true),
    };

    match envelope.result {
        ToolResult::Success { output } => {
            let block = match output {
                ToolOutput::Text { text } => ContentBlock::text(text),
                ToolOutput::Image { data, mime_type } => ContentBlock::image(data, mime_type),
                ToolOutput::Json { value } => {
                    ContentBlock::text(serde_json::to_string_pretty(&value).unwrap_or_default())
                }
            };
            ToolCallResult {
                content: vec![block],
                is_error: None,
            }
        }
        ToolResult::Error { error } => failure(error),
        ToolResult::Cancelled { reason } => failure(ToolError::new(ToolErrorKind::Cancelled, reason)),
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>, method: &str) -> Result<T, JsonRpcError> {
    let params = params.ok_or_else(|| JsonRpcError::invalid_params(format!("Missing {} params", method)))?;
    serde_json::from_value(params)
        .map_err(|e| JsonRpcError::invalid_params(format!("Invalid {} params: {}", method, e)))
}

fn to_result<T: serde::Serialize>(value: &T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}

/// Builder for MCP Server
pub struct McpServerBuilder {
    config: McpServerConfig,
    tools: ToolRegistry,
    default_token: Option<AccessToken>,
}

impl McpServerBuilder {
    pub fn new() -> Self {
        Self {
            config: McpServerConfig::default(),
            tools: ToolRegistry::new(),
            default_token: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.config.version = version.into();
        self
    }

    pub fn with_tools(mut self, registry: ToolRegistry) -> Self {
        self.tools = registry;
        self
    }

    /// Token used when the transport does not supply one
    pub fn with_default_token(mut self, token: Option<AccessToken>) -> Self {
        self.default_token = token;
        self
    }

    pub fn build(self) -> McpServer {
        McpServer {
            config: Arc::new(self.config),
            tools: Arc::new(self.tools),
            runtime: ToolRuntime::new(),
            default_token: self.default_token,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for McpServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
