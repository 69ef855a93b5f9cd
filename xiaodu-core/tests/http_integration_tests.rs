//! End-to-end tests against a fake device cloud served by axum.
//!
//! The fake listens on 127.0.0.1:0 and answers with the same envelope shape as
//! the real cloud, so these tests exercise `HttpDeviceCloud` request building,
//! bearer forwarding and error mapping, plus the streamable-HTTP transport.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use xiaodu_core::config::CloudConfig;
use xiaodu_core::device::{
    AccessToken, CommandRequest, DeviceCapability, DeviceCloud, DeviceError, DeviceTarget,
    HttpDeviceCloud, ResourcePushRequest, ResourceType, SpeechRequest, XiaoduService,
};
use xiaodu_core::mcp::{McpServer, router};
use xiaodu_core::tools::default_registry;

const GOOD_TOKEN: &str = "good-token";
const JPEG: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xD9];

#[derive(Clone, Default)]
struct FakeState {
    seen_tokens: Arc<Mutex<Vec<String>>>,
    last_push: Arc<Mutex<Option<Value>>>,
}

fn authorized(state: &FakeState, headers: &HeaderMap) -> bool {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_string();
    state.seen_tokens.lock().unwrap().push(token.clone());
    token == GOOD_TOKEN
}

async fn devices(State(state): State<FakeState>, headers: HeaderMap) -> impl IntoResponse {
    if !authorized(&state, &headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "code": 40001, "msg": "bad token" })));
    }
    (
        StatusCode::OK,
        Json(json!({
            "code": 0,
            "msg": "ok",
            "data": { "devices": [
                { "cuid": "cuid-1", "client_id": "client-1", "name": "客厅", "online": true,
                  "capabilities": ["camera", "speaker", "hologram"] },
                { "cuid": "cuid-2", "client_id": "client-2", "name": "卧室", "online": false,
                  "capabilities": ["speaker"] }
            ]}
        })),
    )
}

async fn command(State(state): State<FakeState>, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    authorized(&state, &headers);
    if body["cuid"] == "cuid-off" {
        return Json(json!({ "code": 40004, "msg": "device offline" }));
    }
    Json(json!({ "code": 0, "data": { "result": format!("done: {}", body["command"].as_str().unwrap_or_default()) } }))
}

async fn speak() -> StatusCode {
    StatusCode::BAD_GATEWAY
}

async fn photo(Json(body): Json<Value>) -> Json<Value> {
    if body["cuid"] == "cuid-nocam" {
        return Json(json!({ "code": 40005, "msg": "no camera" }));
    }
    Json(json!({ "code": 0, "data": { "image": STANDARD.encode(JPEG) } }))
}

async fn resource(State(state): State<FakeState>, Json(body): Json<Value>) -> Json<Value> {
    let slow = body["cuid"] == "cuid-slow";
    *state.last_push.lock().unwrap() = Some(body);
    if slow {
        tokio::time::sleep(Duration::from_secs(3)).await;
    }
    Json(json!({ "code": 0, "data": {} }))
}

async fn spawn_fake_cloud() -> (String, FakeState) {
    let state = FakeState::default();
    let app = Router::new()
        .route("/api/devices", get(devices))
        .route("/api/devices/command", post(command))
        .route("/api/devices/speak", post(speak))
        .route("/api/devices/photo", post(photo))
        .route("/api/devices/resource", post(resource))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/api/", addr), state)
}

fn cloud(api_base: &str) -> HttpDeviceCloud {
    HttpDeviceCloud::new(&CloudConfig {
        api_base: api_base.to_string(),
        request_timeout: Duration::from_secs(5),
        ..CloudConfig::default()
    })
    .unwrap()
}

fn token(value: &str) -> AccessToken {
    AccessToken::new(value).unwrap()
}

#[tokio::test]
async fn test_list_devices_forwards_bearer_token() {
    let (base, state) = spawn_fake_cloud().await;
    let cloud = cloud(&base);

    let devices = cloud.list_devices(&token(GOOD_TOKEN)).await.unwrap();
    assert_eq!(devices.len(), 2);
    assert!(devices[0].has_capability(DeviceCapability::Camera));
    assert_eq!(devices[0].capabilities.len(), 2);
    assert_eq!(state.seen_tokens.lock().unwrap().as_slice(), [GOOD_TOKEN]);
}

#[tokio::test]
async fn test_unauthorized_maps_to_authentication() {
    let (base, _state) = spawn_fake_cloud().await;
    let err = cloud(&base).list_devices(&token("expired")).await.unwrap_err();
    assert!(matches!(err, DeviceError::Authentication(_)), "{:?}", err);
}

#[tokio::test]
async fn test_offline_code_maps_to_device_offline() {
    let (base, _state) = spawn_fake_cloud().await;
    let cloud = cloud(&base);

    let request = CommandRequest::new("打开台灯", DeviceTarget::new("cuid-off", "client-off"));
    let err = cloud.send_command(&token(GOOD_TOKEN), &request).await.unwrap_err();
    assert_eq!(err.kind(), "device_offline");

    let request = CommandRequest::new("打开台灯", DeviceTarget::new("cuid-1", "client-1"));
    let result = cloud.send_command(&token(GOOD_TOKEN), &request).await.unwrap();
    assert_eq!(result, "done: 打开台灯");
}

#[tokio::test]
async fn test_gateway_error_maps_to_upstream_unavailable() {
    let (base, _state) = spawn_fake_cloud().await;
    let request = SpeechRequest::new("你好", DeviceTarget::new("cuid-1", "client-1"));
    let err = cloud(&base).speak(&token(GOOD_TOKEN), &request).await.unwrap_err();
    assert!(matches!(err, DeviceError::UpstreamUnavailable(_)), "{:?}", err);
}

#[tokio::test]
async fn test_unreachable_cloud_is_upstream_unavailable() {
    let err = cloud("http://127.0.0.1:9/api")
        .list_devices(&token(GOOD_TOKEN))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "upstream_unavailable");
}

#[tokio::test]
async fn test_take_photo_through_service() {
    let (base, _state) = spawn_fake_cloud().await;
    let service = XiaoduService::new(Arc::new(cloud(&base)));

    let photo = service
        .take_photo(Some(&token(GOOD_TOKEN)), &DeviceTarget::new("cuid-1", "client-1"))
        .await
        .unwrap();
    assert_eq!(photo.content, JPEG);
    assert_eq!(photo.content_type, "image/jpeg");
}

#[tokio::test]
async fn test_push_resource_body_and_window() {
    let (base, state) = spawn_fake_cloud().await;
    let cloud = cloud(&base);

    let request = ResourcePushRequest::new(ResourceType::ImageWithBgm, DeviceTarget::new("cuid-1", "client-1"))
        .with_image_url("https://example.com/cat.jpg")
        .with_bgm_url("https://example.com/purr.mp3")
        .with_timeout(20);
    let status = cloud.push_resource(&token(GOOD_TOKEN), &request).await.unwrap();
    assert_eq!(status, "success");

    let body = state.last_push.lock().unwrap().clone().unwrap();
    assert_eq!(body["resource_type"], "image_with_bgm");
    assert_eq!(body["cuid"], "cuid-1");
    assert_eq!(body["client_id"], "client-1");
    assert_eq!(body["image_url"], "https://example.com/cat.jpg");
    assert_eq!(body["bgm_url"], "https://example.com/purr.mp3");
    assert_eq!(body["timeout"], 20);
}

#[tokio::test]
async fn test_push_resource_window_elapses() {
    let (base, _state) = spawn_fake_cloud().await;

    let request = ResourcePushRequest::new(ResourceType::Image, DeviceTarget::new("cuid-slow", "client-slow"))
        .with_image_url("https://example.com/cat.jpg")
        .with_timeout(1);
    let err = cloud(&base).push_resource(&token(GOOD_TOKEN), &request).await.unwrap_err();
    match err {
        DeviceError::Timeout(window) => assert_eq!(window, Duration::from_secs(1)),
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_photo_without_camera_code() {
    let (base, _state) = spawn_fake_cloud().await;
    let err = cloud(&base)
        .capture_photo(&token(GOOD_TOKEN), &DeviceTarget::new("cuid-nocam", "client-nocam"))
        .await
        .unwrap_err();
    match err {
        DeviceError::CapabilityUnsupported { cuid, capability } => {
            assert_eq!(cuid, "cuid-nocam");
            assert_eq!(capability, DeviceCapability::Camera);
        }
        other => panic!("expected capability_unsupported, got {:?}", other),
    }
}

async fn spawn_mcp(api_base: &str) -> String {
    let service = XiaoduService::new(Arc::new(cloud(api_base)));
    let server = McpServer::builder()
        .with_tools(default_registry(service).unwrap())
        .build();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(server)).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_streamable_http_tools_list() {
    let (base, _state) = spawn_fake_cloud().await;
    let mcp = spawn_mcp(&base).await;

    let response: Value = reqwest::Client::new()
        .post(format!("{}/mcp", mcp))
        .json(&json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let tools = response["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 5);
    let photo = tools.iter().find(|t| t["name"] == "xiaodu_take_photo").unwrap();
    assert_eq!(photo["inputSchema"]["required"], json!(["cuid", "client_id"]));
}

#[tokio::test]
async fn test_streamable_http_call_uses_bearer_header() {
    let (base, state) = spawn_fake_cloud().await;
    let mcp = spawn_mcp(&base).await;
    let client = reqwest::Client::new();

    let response: Value = client
        .post(format!("{}/mcp", mcp))
        .bearer_auth(GOOD_TOKEN)
        .json(&json!({
            "jsonrpc": "2.0",
            "id": "call-1",
            "method": "tools/call",
            "params": { "name": "list_user_devices", "arguments": {} }
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(response["id"], "call-1");
    assert!(response["result"].get("isError").is_none());
    let devices: Value = serde_json::from_str(response["result"]["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(devices.as_array().unwrap().len(), 1);
    assert_eq!(state.seen_tokens.lock().unwrap().as_slice(), [GOOD_TOKEN]);
}

#[tokio::test]
async fn test_streamable_http_notification_and_garbage() {
    let (base, _state) = spawn_fake_cloud().await;
    let mcp = spawn_mcp(&base).await;
    let client = reqwest::Client::new();

    let status = client
        .post(format!("{}/mcp", mcp))
        .json(&json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, reqwest::StatusCode::ACCEPTED);

    let response = client
        .post(format!("{}/mcp", mcp))
        .body("{ nope")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], -32700);
}

#[tokio::test]
async fn test_health_and_unknown_sse_session() {
    let (base, _state) = spawn_fake_cloud().await;
    let mcp = spawn_mcp(&base).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{}/health", mcp))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["name"], "xiaodu-mcp");

    let status = client
        .post(format!("{}/messages?session_id=missing", mcp))
        .json(&json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" }))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_initialize_issues_distinct_sessions() {
    let (base, _state) = spawn_fake_cloud().await;
    let mcp = spawn_mcp(&base).await;
    let client = reqwest::Client::new();
    let initialize = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": { "name": "test-client", "version": "1.0" }
        }
    });

    let mut issued = Vec::new();
    for _ in 0..2 {
        let response = client
            .post(format!("{}/mcp", mcp))
            .json(&initialize)
            .send()
            .await
            .unwrap();
        let session = response
            .headers()
            .get("mcp-session-id")
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert!(!session.is_empty());
        issued.push(session);
    }
    assert_ne!(issued[0], issued[1]);

    let response = client
        .post(format!("{}/mcp", mcp))
        .header("mcp-session-id", &issued[0])
        .json(&initialize)
        .send()
        .await
        .unwrap();
    assert!(response.headers().get("mcp-session-id").is_none());
}

/// Minimal `text/event-stream` reader
struct EventReader {
    response: reqwest::Response,
    buffer: String,
}

impl EventReader {
    fn new(response: reqwest::Response) -> Self {
        Self {
            response,
            buffer: String::new(),
        }
    }

    /// Next `(event, data)` pair, skipping keep-alive comments
    async fn next_event(&mut self) -> (String, String) {
        loop {
            while let Some(end) = self.buffer.find("\n\n") {
                let block: String = self.buffer.drain(..end + 2).collect();
                let mut event = String::from("message");
                let mut data = Vec::new();
                for line in block.lines() {
                    if let Some(value) = line.strip_prefix("event:") {
                        event = value.trim_start().to_string();
                    } else if let Some(value) = line.strip_prefix("data:") {
                        data.push(value.trim_start().to_string());
                    }
                }
                if !data.is_empty() {
                    return (event, data.join("\n"));
                }
            }

            let chunk = tokio::time::timeout(Duration::from_secs(5), self.response.chunk())
                .await
                .expect("event within 5s")
                .unwrap()
                .expect("stream ended");
            self.buffer.push_str(&String::from_utf8_lossy(&chunk).replace("\r\n", "\n"));
        }
    }
}

#[tokio::test]
async fn test_sse_session_round_trip_with_remembered_token() {
    let (base, state) = spawn_fake_cloud().await;
    let mcp = spawn_mcp(&base).await;
    let client = reqwest::Client::new();

    let stream = client
        .get(format!("{}/sse", mcp))
        .bearer_auth(GOOD_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(stream.status(), reqwest::StatusCode::OK);
    let mut events = EventReader::new(stream);

    let (event, endpoint) = events.next_event().await;
    assert_eq!(event, "endpoint");
    assert!(endpoint.starts_with("/messages?session_id="), "{}", endpoint);
    assert!(endpoint.len() > "/messages?session_id=".len());

    // no token on the POST: the one given to GET /sse is used
    let status = client
        .post(format!("{}{}", mcp, endpoint))
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "tools/call",
            "params": { "name": "list_user_devices", "arguments": {} }
        }))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, reqwest::StatusCode::ACCEPTED);

    let (event, data) = events.next_event().await;
    assert_eq!(event, "message");
    let response: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(response["id"], 7);
    assert!(response["result"].get("isError").is_none(), "{}", response);
    assert_eq!(state.seen_tokens.lock().unwrap().as_slice(), [GOOD_TOKEN]);
}
