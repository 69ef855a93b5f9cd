//! Device descriptors and per-call request types
//!
//! Every request that targets a device carries both `cuid` and `client_id`.
//! Validation here is purely local and runs before any remote call.

use super::error::DeviceError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Maximum speech length in Unicode scalar values
pub const MAX_SPEECH_CHARS: usize = 500;

/// Upper bound accepted for a resource push timeout, in seconds
pub const MAX_PUSH_TIMEOUT_SECS: u64 = 300;

/// MIME type of every captured photo
pub const JPEG_MIME: &str = "image/jpeg";

const JPEG_SIGNATURE: [u8; 2] = [0xFF, 0xD8];

/// Hardware capability of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceCapability {
    Camera,
    Screen,
    Speaker,
}

impl DeviceCapability {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceCapability::Camera => "camera",
            DeviceCapability::Screen => "screen",
            DeviceCapability::Speaker => "speaker",
        }
    }

    /// Parse a capability name, ignoring case. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "camera" => Some(DeviceCapability::Camera),
            "screen" => Some(DeviceCapability::Screen),
            "speaker" => Some(DeviceCapability::Speaker),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bound device as reported by the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub cuid: String,
    pub client_id: String,
    pub name: String,
    pub online: bool,
    #[serde(default)]
    pub capabilities: BTreeSet<DeviceCapability>,
}

impl DeviceDescriptor {
    pub fn has_capability(&self, capability: DeviceCapability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Whether both identifiers are present
    pub fn is_addressable(&self) -> bool {
        !self.cuid.trim().is_empty() && !self.client_id.trim().is_empty()
    }

    pub fn target(&self) -> DeviceTarget {
        DeviceTarget::new(&self.cuid, &self.client_id)
    }
}

/// The `cuid` + `client_id` pair naming one physical device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceTarget {
    pub cuid: String,
    pub client_id: String,
}

impl DeviceTarget {
    /// Surrounding whitespace is stripped from both identifiers
    pub fn new(cuid: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            cuid: trimmed(cuid.into()),
            client_id: trimmed(client_id.into()),
        }
    }

    pub fn validate(&self) -> Result<(), DeviceError> {
        require_identifier("cuid", &self.cuid)?;
        require_identifier("client_id", &self.client_id)
    }

    pub fn matches(&self, device: &DeviceDescriptor) -> bool {
        self.cuid == device.cuid && self.client_id == device.client_id
    }
}

/// Natural-language instruction executed as if spoken to the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandRequest {
    pub command: String,
    #[serde(flatten)]
    pub target: DeviceTarget,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>, target: DeviceTarget) -> Self {
        Self {
            command: trimmed(command.into()),
            target,
        }
    }

    pub fn validate(&self) -> Result<(), DeviceError> {
        require_non_empty("command", &self.command)?;
        self.target.validate()
    }
}

/// Literal text for text-to-speech playback
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeechRequest {
    pub text: String,
    #[serde(flatten)]
    pub target: DeviceTarget,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>, target: DeviceTarget) -> Self {
        Self {
            text: text.into(),
            target,
        }
    }

    pub fn validate(&self) -> Result<(), DeviceError> {
        require_non_empty("text", &self.text)?;
        let length = self.text.chars().count();
        if length > MAX_SPEECH_CHARS {
            return Err(DeviceError::invalid(format!(
                "text is {} characters, the maximum is {}",
                length, MAX_SPEECH_CHARS
            )));
        }
        self.target.validate()
    }
}

/// Kind of media pushed to a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Image,
    ImageWithBgm,
    Video,
    Audio,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Image => "image",
            ResourceType::ImageWithBgm => "image_with_bgm",
            ResourceType::Video => "video",
            ResourceType::Audio => "audio",
        }
    }

    /// URL fields that must be present for this type
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            ResourceType::Image => &["image_url"],
            ResourceType::ImageWithBgm => &["image_url", "bgm_url"],
            ResourceType::Video => &["video_url"],
            ResourceType::Audio => &["audio_url"],
        }
    }
}

impl FromStr for ResourceType {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "image" => Ok(ResourceType::Image),
            "image_with_bgm" => Ok(ResourceType::ImageWithBgm),
            "video" => Ok(ResourceType::Video),
            "audio" => Ok(ResourceType::Audio),
            other => Err(DeviceError::invalid(format!(
                "unrecognized resource_type '{}', expected one of image, image_with_bgm, video, audio",
                other
            ))),
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A URL-referenced media asset to display or play on a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourcePushRequest {
    pub resource_type: ResourceType,
    #[serde(flatten)]
    pub target: DeviceTarget,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bgm_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    /// Seconds to wait for the push acknowledgment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl ResourcePushRequest {
    pub fn new(resource_type: ResourceType, target: DeviceTarget) -> Self {
        Self {
            resource_type,
            target,
            image_url: None,
            bgm_url: None,
            video_url: None,
            audio_url: None,
            timeout: None,
        }
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(trimmed(url.into()));
        self
    }

    pub fn with_bgm_url(mut self, url: impl Into<String>) -> Self {
        self.bgm_url = Some(trimmed(url.into()));
        self
    }

    pub fn with_video_url(mut self, url: impl Into<String>) -> Self {
        self.video_url = Some(trimmed(url.into()));
        self
    }

    pub fn with_audio_url(mut self, url: impl Into<String>) -> Self {
        self.audio_url = Some(trimmed(url.into()));
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    fn url_field(&self, field: &str) -> Option<&str> {
        match field {
            "image_url" => self.image_url.as_deref(),
            "bgm_url" => self.bgm_url.as_deref(),
            "video_url" => self.video_url.as_deref(),
            "audio_url" => self.audio_url.as_deref(),
            _ => None,
        }
    }

    /// Check conditional field presence for the declared resource type
    pub fn validate(&self) -> Result<(), DeviceError> {
        self.target.validate()?;

        for field in self.resource_type.required_fields() {
            match self.url_field(field) {
                Some(url) if !url.trim().is_empty() => require_http_url(field, url)?,
                _ => {
                    return Err(DeviceError::invalid(format!(
                        "{} is required when resource_type is {}",
                        field, self.resource_type
                    )));
                }
            }
        }

        if let Some(seconds) = self.timeout {
            if seconds == 0 || seconds > MAX_PUSH_TIMEOUT_SECS {
                return Err(DeviceError::invalid(format!(
                    "timeout must be between 1 and {} seconds",
                    MAX_PUSH_TIMEOUT_SECS
                )));
            }
        }

        Ok(())
    }
}

/// A captured still image
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhotoResult {
    #[serde(skip)]
    pub content: Vec<u8>,
    pub content_type: &'static str,
}

impl PhotoResult {
    /// Build from raw bytes, rejecting anything that is not a JPEG
    pub fn from_jpeg(content: Vec<u8>) -> Result<Self, DeviceError> {
        if !content.starts_with(&JPEG_SIGNATURE) {
            return Err(DeviceError::Upstream {
                code: -1,
                message: "capture payload is not a JPEG image".to_string(),
            });
        }
        Ok(Self {
            content,
            content_type: JPEG_MIME,
        })
    }

    /// Decode the base64 payload returned by the device cloud.
    ///
    /// A `data:image/jpeg;base64,` prefix is tolerated.
    pub fn from_base64(payload: &str) -> Result<Self, DeviceError> {
        let encoded = match payload.split_once(";base64,") {
            Some((prefix, rest)) if prefix.starts_with("data:") => rest,
            _ => payload,
        };
        let content = STANDARD
            .decode(encoded.trim())
            .map_err(|e| DeviceError::Upstream {
                code: -1,
                message: format!("capture payload is not valid base64: {}", e),
            })?;
        Self::from_jpeg(content)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.content)
    }
}

fn trimmed(value: String) -> String {
    value.trim().to_string()
}

/// Identifiers are compared verbatim against the directory
fn require_identifier(field: &str, value: &str) -> Result<(), DeviceError> {
    require_non_empty(field, value)?;
    if value.trim() != value {
        return Err(DeviceError::invalid(format!(
            "{} must not have leading or trailing whitespace",
            field
        )));
    }
    Ok(())
}

fn require_non_empty(field: &str, value: &str) -> Result<(), DeviceError> {
    if value.trim().is_empty() {
        return Err(DeviceError::invalid(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn require_http_url(field: &str, value: &str) -> Result<(), DeviceError> {
    let url = reqwest::Url::parse(value.trim())
        .map_err(|e| DeviceError::invalid(format!("{} is not a valid URL: {}", field, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(DeviceError::invalid(format!(
            "{} must use http or https, got {}",
            field, scheme
        ))),
    }
}
