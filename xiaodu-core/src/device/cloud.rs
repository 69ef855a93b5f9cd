//! Device cloud client
//!
//! [`DeviceCloud`] is the only place the service touches the network.
//! [`HttpDeviceCloud`] speaks the cloud's JSON envelope protocol over a single
//! pooled `reqwest::Client`.

use super::error::DeviceError;
use super::model::{
    CommandRequest, DeviceCapability, DeviceDescriptor, DeviceTarget, ResourcePushRequest,
    SpeechRequest,
};
use crate::config::CloudConfig;
use crate::error::{Result, XiaoduError};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Envelope code for a rejected credential
pub const CODE_UNAUTHORIZED: i64 = 40001;
/// Envelope code for an unreachable device
pub const CODE_DEVICE_OFFLINE: i64 = 40004;
/// Envelope code for a missing device capability
pub const CODE_CAPABILITY_UNSUPPORTED: i64 = 40005;

/// Access credential forwarded to the device cloud
///
/// Never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a token, returning `None` for a blank value
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        let trimmed = token.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(****)")
    }
}

/// Remote device-control backend
#[async_trait]
pub trait DeviceCloud: Send + Sync {
    /// Devices bound to the token's owner
    async fn list_devices(&self, token: &AccessToken) -> std::result::Result<Vec<DeviceDescriptor>, DeviceError>;

    /// Forward a voice command; returns the device's textual response
    async fn send_command(
        &self,
        token: &AccessToken,
        request: &CommandRequest,
    ) -> std::result::Result<String, DeviceError>;

    /// Text-to-speech playback; returns an operation status
    async fn speak(
        &self,
        token: &AccessToken,
        request: &SpeechRequest,
    ) -> std::result::Result<String, DeviceError>;

    /// Capture one still frame; returns the base64 payload
    async fn capture_photo(
        &self,
        token: &AccessToken,
        target: &DeviceTarget,
    ) -> std::result::Result<String, DeviceError>;

    /// Push a media resource; returns an operation status
    async fn push_resource(
        &self,
        token: &AccessToken,
        request: &ResourcePushRequest,
    ) -> std::result::Result<String, DeviceError>;
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: i64,
    #[serde(default, alias = "message")]
    msg: String,
    data: Option<T>,
}

#[derive(Deserialize)]
struct DevicesData {
    #[serde(default)]
    devices: Vec<WireDevice>,
}

#[derive(Deserialize)]
struct WireDevice {
    #[serde(default)]
    cuid: String,
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    online: bool,
    #[serde(default)]
    capabilities: Vec<String>,
}

impl From<WireDevice> for DeviceDescriptor {
    fn from(wire: WireDevice) -> Self {
        let capabilities: BTreeSet<DeviceCapability> = wire
            .capabilities
            .iter()
            .filter_map(|name| DeviceCapability::parse(name))
            .collect();
        DeviceDescriptor {
            cuid: wire.cuid,
            client_id: wire.client_id,
            name: wire.name,
            online: wire.online,
            capabilities,
        }
    }
}

#[derive(Deserialize)]
struct StatusData {
    #[serde(default)]
    result: Option<String>,
}

#[derive(Deserialize)]
struct PhotoData {
    image: String,
}

/// Per-call context used to translate failures
struct Call<'a> {
    path: &'static str,
    target: Option<&'a DeviceTarget>,
    capability: Option<DeviceCapability>,
    timeout: Duration,
}

impl<'a> Call<'a> {
    fn new(path: &'static str, timeout: Duration) -> Self {
        Self {
            path,
            target: None,
            capability: None,
            timeout,
        }
    }

    fn on(mut self, target: &'a DeviceTarget) -> Self {
        self.target = Some(target);
        self
    }

    fn needs(mut self, capability: DeviceCapability) -> Self {
        self.capability = Some(capability);
        self
    }

    fn envelope_error(&self, code: i64, message: String) -> DeviceError {
        match code {
            CODE_UNAUTHORIZED => DeviceError::Authentication(message),
            CODE_DEVICE_OFFLINE => {
                let cuid = self.target.map(|t| t.cuid.as_str()).unwrap_or("unknown");
                DeviceError::DeviceOffline(format!("{}: {}", cuid, message))
            }
            CODE_CAPABILITY_UNSUPPORTED => match (self.target, self.capability) {
                (Some(target), Some(capability)) => DeviceError::CapabilityUnsupported {
                    cuid: target.cuid.clone(),
                    capability,
                },
                _ => DeviceError::Upstream { code, message },
            },
            _ => DeviceError::Upstream { code, message },
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> DeviceError {
        if err.is_timeout() {
            DeviceError::Timeout(self.timeout)
        } else {
            DeviceError::UpstreamUnavailable(format!("{}: {}", self.path, err))
        }
    }
}

/// HTTP implementation of [`DeviceCloud`]
#[derive(Debug, Clone)]
pub struct HttpDeviceCloud {
    client: reqwest::Client,
    api_base: String,
    request_timeout: Duration,
    capture_timeout: Duration,
}

impl HttpDeviceCloud {
    /// Build the pooled client from configuration
    pub fn new(config: &CloudConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("xiaodu-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| XiaoduError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout,
            capture_timeout: config.capture_timeout,
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        token: &AccessToken,
        call: Call<'_>,
    ) -> std::result::Result<T, DeviceError> {
        let builder = self
            .client
            .get(self.url(call.path))
            .bearer_auth(token.expose());
        self.execute(builder, call).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        token: &AccessToken,
        body: &B,
        call: Call<'_>,
    ) -> std::result::Result<T, DeviceError> {
        let builder = self
            .client
            .post(self.url(call.path))
            .bearer_auth(token.expose())
            .timeout(call.timeout)
            .json(body);
        self.execute(builder, call).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
        call: Call<'_>,
    ) -> std::result::Result<T, DeviceError> {
        debug!(path = call.path, "Calling device cloud");

        let response = builder.send().await.map_err(|e| call.transport_error(e))?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    debug!(path = call.path, error = %e, "Failed to read rejection body");
                    String::new()
                }
            };
            return Err(DeviceError::Authentication(format!(
                "device cloud rejected the access token ({}){}",
                status,
                if text.is_empty() { String::new() } else { format!(": {}", text) }
            )));
        }

        if status.is_server_error() {
            return Err(DeviceError::UpstreamUnavailable(format!(
                "{} returned {}",
                call.path, status
            )));
        }

        let text = response.text().await.map_err(|e| call.transport_error(e))?;

        let envelope: Envelope<T> = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => {
                return Err(DeviceError::Upstream {
                    code: -1,
                    message: format!("unreadable response from {}: {}", call.path, e),
                });
            }
            Err(_) => {
                return Err(DeviceError::Upstream {
                    code: i64::from(status.as_u16()),
                    message: text,
                });
            }
        };

        if envelope.code != 0 {
            warn!(path = call.path, code = envelope.code, msg = %envelope.msg, "Device cloud reported failure");
            return Err(call.envelope_error(envelope.code, envelope.msg));
        }

        if !status.is_success() {
            return Err(DeviceError::Upstream {
                code: i64::from(status.as_u16()),
                message: envelope.msg,
            });
        }

        envelope.data.ok_or_else(|| DeviceError::Upstream {
            code: -1,
            message: format!("{} returned no data", call.path),
        })
    }

    async fn post_status<B: Serialize + ?Sized>(
        &self,
        token: &AccessToken,
        body: &B,
        call: Call<'_>,
    ) -> std::result::Result<String, DeviceError> {
        let data: StatusData = self.post(token, body, call).await?;
        Ok(data.result.unwrap_or_else(|| "success".to_string()))
    }
}

#[async_trait]
impl DeviceCloud for HttpDeviceCloud {
    async fn list_devices(&self, token: &AccessToken) -> std::result::Result<Vec<DeviceDescriptor>, DeviceError> {
        let data: DevicesData = self
            .get(token, Call::new("devices", self.request_timeout))
            .await?;
        Ok(data.devices.into_iter().map(DeviceDescriptor::from).collect())
    }

    async fn send_command(
        &self,
        token: &AccessToken,
        request: &CommandRequest,
    ) -> std::result::Result<String, DeviceError> {
        let call = Call::new("devices/command", self.request_timeout).on(&request.target);
        self.post_status(token, request, call).await
    }

    async fn speak(
        &self,
        token: &AccessToken,
        request: &SpeechRequest,
    ) -> std::result::Result<String, DeviceError> {
        let call = Call::new("devices/speak", self.request_timeout)
            .on(&request.target)
            .needs(DeviceCapability::Speaker);
        self.post_status(token, request, call).await
    }

    async fn capture_photo(
        &self,
        token: &AccessToken,
        target: &DeviceTarget,
    ) -> std::result::Result<String, DeviceError> {
        let call = Call::new("devices/photo", self.capture_timeout)
            .on(target)
            .needs(DeviceCapability::Camera);
        let data: PhotoData = self.post(token, target, call).await?;
        Ok(data.image)
    }

    async fn push_resource(
        &self,
        token: &AccessToken,
        request: &ResourcePushRequest,
    ) -> std::result::Result<String, DeviceError> {
        let timeout = request
            .timeout
            .map(Duration::from_secs)
            .unwrap_or(self.request_timeout);
        let call = Call::new("devices/resource", timeout).on(&request.target);
        self.post_status(token, request, call).await
    }
}
