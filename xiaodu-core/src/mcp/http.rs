//! HTTP transports
//!
//! Two network surfaces over the same [`McpServer`]:
//! - streamable HTTP: `POST /mcp`, one JSON-RPC message per request body
//! - SSE: `GET /sse` opens an event stream whose first `endpoint` event names
//!   the `POST /messages?session_id=...` URL for that stream
//!
//! The access token comes from `Authorization: Bearer <token>` or an
//! `ACCESS_TOKEN` header on each request.
//!
//! A streamable-HTTP request without an `Mcp-Session-Id` header runs in a
//! session of its own; `initialize` hands the new id back in that header.
//! An SSE session lives exactly as long as its event stream.

use super::protocol::{IncomingMessage, JsonRpcResponse};
use super::server::{McpServer, SessionContext, lock};
use crate::device::AccessToken;
use crate::error::XiaoduError;
use axum::{
    Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{
        IntoResponse, Json, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

/// Header clients use to keep streamable-HTTP requests in one session
pub const SESSION_HEADER: &str = "mcp-session-id";

struct SseSession {
    tx: mpsc::Sender<JsonRpcResponse>,
    access_token: Option<AccessToken>,
}

type SessionMap = Arc<Mutex<HashMap<String, SseSession>>>;

/// Removes an SSE session when its event stream is dropped
struct SseSessionGuard {
    sessions: SessionMap,
    session_id: String,
}

impl Drop for SseSessionGuard {
    fn drop(&mut self) {
        lock(&self.sessions).remove(&self.session_id);
        debug!(session = %self.session_id, "SSE stream closed");
    }
}

#[derive(Clone)]
struct HttpState {
    server: McpServer,
    sessions: SessionMap,
}

#[derive(Debug, Deserialize)]
struct MessagesQuery {
    session_id: String,
}

/// Build the router with CORS open to any origin
pub fn router(server: McpServer) -> Router {
    let state = HttpState {
        server,
        sessions: Arc::new(Mutex::new(HashMap::new())),
    };

    Router::new()
        .route("/mcp", post(mcp_handler))
        .route("/sse", get(sse_handler))
        .route("/messages", post(messages_handler))
        .route("/health", get(health_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Listen on `bind` until the process is stopped
pub async fn serve_http(server: McpServer, bind: &str) -> crate::error::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| XiaoduError::Transport(format!("Failed to bind {}: {}", bind, e)))?;
    info!(addr = %bind, "HTTP transport listening");

    axum::serve(listener, router(server))
        .await
        .map_err(|e| XiaoduError::Transport(e.to_string()))
}

/// Bearer token, falling back to the `ACCESS_TOKEN` header
pub fn token_from_headers(headers: &HeaderMap) -> Option<AccessToken> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(AccessToken::new);

    bearer.or_else(|| {
        headers
            .get("access_token")
            .and_then(|v| v.to_str().ok())
            .and_then(AccessToken::new)
    })
}

async fn health_handler(State(state): State<HttpState>) -> impl IntoResponse {
    let config = state.server.config();
    Json(json!({
        "status": "ok",
        "name": config.name,
        "version": config.version,
    }))
}

async fn mcp_handler(State(state): State<HttpState>, headers: HeaderMap, body: String) -> Response {
    let (session_id, issued) = match headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
        Some(id) if !id.trim().is_empty() => (id.to_string(), false),
        _ => (uuid::Uuid::new_v4().to_string(), true),
    };
    let session = SessionContext::new(session_id).with_access_token(token_from_headers(&headers));

    match IncomingMessage::parse(&body) {
        IncomingMessage::Request(request) => {
            let initialize = request.method == "initialize";
            let response = Json(state.server.handle_request(request, &session).await);
            if initialize && issued {
                debug!(session = %session.session_id, "Issued streamable-HTTP session");
                ([(SESSION_HEADER, session.session_id)], response).into_response()
            } else {
                response.into_response()
            }
        }
        IncomingMessage::Notification(notification) => {
            state.server.handle_notification(notification, &session).await;
            StatusCode::ACCEPTED.into_response()
        }
        IncomingMessage::Response(_) => StatusCode::ACCEPTED.into_response(),
        IncomingMessage::Invalid { id, error } => {
            (StatusCode::BAD_REQUEST, Json(JsonRpcResponse::error(id, error))).into_response()
        }
    }
}

async fn sse_handler(
    State(state): State<HttpState>,
    headers: HeaderMap,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = uuid::Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::channel::<JsonRpcResponse>(32);

    lock(&state.sessions).insert(
        session_id.clone(),
        SseSession {
            tx,
            access_token: token_from_headers(&headers),
        },
    );
    info!(session = %session_id, "SSE stream opened");

    Sse::new(session_events(state.sessions.clone(), session_id, rx)).keep_alive(KeepAlive::default())
}

/// `endpoint` first, then one `message` event per response.
///
/// The stream owns the session's guard, so dropping it ends the session.
fn session_events(
    sessions: SessionMap,
    session_id: String,
    rx: mpsc::Receiver<JsonRpcResponse>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("/messages?session_id={}", session_id));
    let guard = SseSessionGuard { sessions, session_id };

    let messages = ReceiverStream::new(rx).map(move |response| {
        let _guard = &guard;
        let data = serde_json::to_string(&response).unwrap_or_default();
        Ok::<_, Infallible>(Event::default().event("message").data(data))
    });

    stream::once(async move { Ok::<_, Infallible>(endpoint) }).chain(messages)
}

async fn messages_handler(
    State(state): State<HttpState>,
    Query(query): Query<MessagesQuery>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let found = lock(&state.sessions)
        .get(&query.session_id)
        .map(|session| (session.tx.clone(), session.access_token.clone()));
    let Some((tx, stored_token)) = found else {
        return (StatusCode::NOT_FOUND, "Unknown session").into_response();
    };
    let session = SessionContext::new(query.session_id.clone())
        .with_access_token(token_from_headers(&headers).or(stored_token));

    match IncomingMessage::parse(&body) {
        IncomingMessage::Request(request) => {
            tokio::spawn(async move {
                let response = state.server.handle_request(request, &session).await;
                if tx.send(response).await.is_err() {
                    warn!(session = %session.session_id, "SSE stream closed before response was sent");
                }
            });
        }
        IncomingMessage::Notification(notification) => {
            state.server.handle_notification(notification, &session).await;
        }
        IncomingMessage::Response(_) => debug!("Ignoring client response"),
        IncomingMessage::Invalid { id, error } => {
            if tx.send(JsonRpcResponse::error(id, error)).await.is_err() {
                warn!(session = %query.session_id, "SSE stream closed before error was sent");
            }
        }
    }

    StatusCode::ACCEPTED.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_preferred() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert("access_token", HeaderValue::from_static("xyz"));
        assert_eq!(token_from_headers(&headers).unwrap().expose(), "abc");
    }

    #[test]
    fn test_access_token_header_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9v"));
        headers.insert("access_token", HeaderValue::from_static("xyz"));
        assert_eq!(token_from_headers(&headers).unwrap().expose(), "xyz");
    }

    #[test]
    fn test_blank_token_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert!(token_from_headers(&headers).is_none());
    }

    #[tokio::test]
    async fn test_dropped_stream_removes_session() {
        let sessions: SessionMap = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = mpsc::channel(1);
        lock(&sessions).insert(
            "s-1".to_string(),
            SseSession {
                tx,
                access_token: None,
            },
        );

        let mut events = Box::pin(session_events(sessions.clone(), "s-1".to_string(), rx));
        assert!(events.next().await.unwrap().is_ok());
        assert!(lock(&sessions).contains_key("s-1"));

        drop(events);
        assert!(lock(&sessions).is_empty());
    }
}
