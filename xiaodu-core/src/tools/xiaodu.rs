//! Xiaodu device tools
//!
//! Each tool parses its JSON arguments into a typed request, hands it to
//! [`XiaoduService`] and renders the outcome as a [`ToolOutput`].

use super::registry::{RegistryError, ToolRegistry};
use super::result::{ToolError, ToolOutput};
use super::tool::{Tool, ToolExecutionContext, ToolMetadata, ToolSchema};
use crate::device::{
    CommandRequest, DeviceTarget, MAX_PUSH_TIMEOUT_SECS, MAX_SPEECH_CHARS, ResourcePushRequest,
    ResourceType, SpeechRequest, XiaoduService,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

pub const LIST_USER_DEVICES: &str = "list_user_devices";
pub const CONTROL_XIAODU: &str = "control_xiaodu";
pub const XIAODU_SPEAK: &str = "xiaodu_speak";
pub const XIAODU_TAKE_PHOTO: &str = "xiaodu_take_photo";
pub const PUSH_RESOURCE_TO_XIAODU: &str = "push_resource_to_xiaodu";

/// Build the registry holding all five device tools
pub fn default_registry(service: XiaoduService) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();
    registry.register_all(vec![
        Arc::new(ListUserDevicesTool::new(service.clone())),
        Arc::new(ControlXiaoduTool::new(service.clone())),
        Arc::new(XiaoduSpeakTool::new(service.clone())),
        Arc::new(XiaoduTakePhotoTool::new(service.clone())),
        Arc::new(PushResourceTool::new(service)),
    ])?;
    Ok(registry)
}

/// Device identity shared by every targeted tool
#[derive(Debug, Deserialize)]
struct TargetArgs {
    #[serde(default)]
    cuid: String,
    #[serde(default)]
    client_id: String,
}

impl From<TargetArgs> for DeviceTarget {
    fn from(args: TargetArgs) -> Self {
        DeviceTarget::new(args.cuid, args.client_id)
    }
}

#[derive(Debug, Deserialize)]
struct CommandArgs {
    #[serde(default)]
    command: String,
    #[serde(flatten)]
    target: TargetArgs,
}

#[derive(Debug, Deserialize)]
struct SpeakArgs {
    #[serde(default)]
    text: String,
    #[serde(flatten)]
    target: TargetArgs,
}

#[derive(Debug, Deserialize)]
struct PushArgs {
    #[serde(default)]
    resource_type: String,
    #[serde(flatten)]
    target: TargetArgs,
    image_url: Option<String>,
    bgm_url: Option<String>,
    video_url: Option<String>,
    audio_url: Option<String>,
    timeout: Option<u64>,
}

impl TryFrom<PushArgs> for ResourcePushRequest {
    type Error = ToolError;

    fn try_from(args: PushArgs) -> Result<Self, Self::Error> {
        let resource_type: ResourceType = args.resource_type.parse()?;
        let mut request = ResourcePushRequest::new(resource_type, args.target.into());
        if let Some(url) = args.image_url {
            request = request.with_image_url(url);
        }
        if let Some(url) = args.bgm_url {
            request = request.with_bgm_url(url);
        }
        if let Some(url) = args.video_url {
            request = request.with_video_url(url);
        }
        if let Some(url) = args.audio_url {
            request = request.with_audio_url(url);
        }
        request.timeout = args.timeout;
        Ok(request)
    }
}

/// Deserialize tool arguments, reporting shape errors as `invalid_argument`.
///
/// `userid` from older clients is accepted and ignored.
fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, ToolError> {
    let args = match args {
        Value::Null => json!({}),
        other => other,
    };
    if args.get("userid").is_some() {
        debug!(tool, "Ignoring deprecated userid argument");
    }
    serde_json::from_value(args)
        .map_err(|e| ToolError::invalid_argument(format!("invalid arguments for {}: {}", tool, e)))
}

fn target_properties() -> serde_json::Map<String, Value> {
    let mut properties = serde_json::Map::new();
    properties.insert(
        "cuid".to_string(),
        json!({
            "type": "string",
            "description": "Device identifier, as returned by list_user_devices"
        }),
    );
    properties.insert(
        "client_id".to_string(),
        json!({
            "type": "string",
            "description": "Client identifier bound to the device, as returned by list_user_devices"
        }),
    );
    properties.insert(
        "userid".to_string(),
        json!({
            "type": "string",
            "description": "Deprecated, ignored",
            "deprecated": true
        }),
    );
    properties
}

fn targeted_schema(extra: Value, required: &[&str]) -> ToolSchema {
    let mut properties = target_properties();
    if let Value::Object(extra) = extra {
        properties.extend(extra);
    }
    let mut names: Vec<&str> = required.to_vec();
    names.extend(["cuid", "client_id"]);
    ToolSchema::new(json!({
        "type": "object",
        "properties": properties,
        "required": names
    }))
}

/// Lists the caller's online devices
pub struct ListUserDevicesTool {
    metadata: ToolMetadata,
    service: XiaoduService,
}

impl ListUserDevicesTool {
    pub fn new(service: XiaoduService) -> Self {
        Self {
            metadata: ToolMetadata::new(
                LIST_USER_DEVICES,
                "List the online Xiaodu devices bound to the current user. Returns each device's \
                 cuid, client_id, name and capabilities; use the cuid and client_id to address the \
                 other tools.",
            )
            .with_tag("directory"),
            service,
        }
    }
}

#[async_trait]
impl Tool for ListUserDevicesTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    fn schema(&self) -> ToolSchema {
        let mut properties = serde_json::Map::new();
        properties.insert(
            "userid".to_string(),
            json!({ "type": "string", "description": "Deprecated, ignored", "deprecated": true }),
        );
        ToolSchema::new(json!({ "type": "object", "properties": properties }))
    }

    async fn execute(&self, args: Value, ctx: &ToolExecutionContext) -> Result<ToolOutput, ToolError> {
        let _: Value = parse_args(LIST_USER_DEVICES, args)?;
        let devices = self
            .service
            .list_user_devices(ctx.access_token.as_ref())
            .await?;
        let value = serde_json::to_value(&devices)
            .map_err(|e| ToolError::internal(format!("failed to encode devices: {}", e)))?;
        Ok(ToolOutput::json(value))
    }
}

/// Sends a natural-language voice command
pub struct ControlXiaoduTool {
    metadata: ToolMetadata,
    service: XiaoduService,
}

impl ControlXiaoduTool {
    pub fn new(service: XiaoduService) -> Self {
        Self {
            metadata: ToolMetadata::new(
                CONTROL_XIAODU,
                "Send a natural-language instruction to a Xiaodu device as if the user had spoken \
                 it, for example \"播放周杰伦的歌\" or \"打开客厅的灯\". Returns the device's \
                 textual response.",
            )
            .with_tag("control"),
            service,
        }
    }
}

#[async_trait]
impl Tool for ControlXiaoduTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    fn schema(&self) -> ToolSchema {
        targeted_schema(
            json!({
                "command": {
                    "type": "string",
                    "description": "Instruction to execute as a voice command"
                }
            }),
            &["command"],
        )
    }

    async fn execute(&self, args: Value, ctx: &ToolExecutionContext) -> Result<ToolOutput, ToolError> {
        let args: CommandArgs = parse_args(CONTROL_XIAODU, args)?;
        let request = CommandRequest::new(args.command, args.target.into());
        let reply = self.service.control(ctx.access_token.as_ref(), &request).await?;
        Ok(ToolOutput::text(reply))
    }
}

/// Speaks literal text through the device's TTS
pub struct XiaoduSpeakTool {
    metadata: ToolMetadata,
    service: XiaoduService,
}

impl XiaoduSpeakTool {
    pub fn new(service: XiaoduService) -> Self {
        Self {
            metadata: ToolMetadata::new(
                XIAODU_SPEAK,
                format!(
                    "Make a Xiaodu device read the given text aloud, verbatim. At most {} \
                     characters.",
                    MAX_SPEECH_CHARS
                ),
            )
            .with_tag("speech"),
            service,
        }
    }
}

#[async_trait]
impl Tool for XiaoduSpeakTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    fn schema(&self) -> ToolSchema {
        targeted_schema(
            json!({
                "text": {
                    "type": "string",
                    "description": "Text to speak",
                    "maxLength": MAX_SPEECH_CHARS
                }
            }),
            &["text"],
        )
    }

    async fn execute(&self, args: Value, ctx: &ToolExecutionContext) -> Result<ToolOutput, ToolError> {
        let args: SpeakArgs = parse_args(XIAODU_SPEAK, args)?;
        let request = SpeechRequest::new(args.text, args.target.into());
        let status = self.service.speak(ctx.access_token.as_ref(), &request).await?;
        Ok(ToolOutput::text(status))
    }
}

/// Captures a still image from a camera-equipped device
pub struct XiaoduTakePhotoTool {
    metadata: ToolMetadata,
    service: XiaoduService,
}

impl XiaoduTakePhotoTool {
    pub fn new(service: XiaoduService) -> Self {
        Self {
            metadata: ToolMetadata::new(
                XIAODU_TAKE_PHOTO,
                "Take a photo with a camera-equipped Xiaodu device and return it as a JPEG image.",
            )
            .with_tag("camera"),
            service,
        }
    }
}

#[async_trait]
impl Tool for XiaoduTakePhotoTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    fn schema(&self) -> ToolSchema {
        targeted_schema(json!({}), &[])
    }

    async fn execute(&self, args: Value, ctx: &ToolExecutionContext) -> Result<ToolOutput, ToolError> {
        let args: TargetArgs = parse_args(XIAODU_TAKE_PHOTO, args)?;
        let photo = self
            .service
            .take_photo(ctx.access_token.as_ref(), &args.into())
            .await?;
        Ok(ToolOutput::image(photo.to_base64(), photo.content_type))
    }
}

/// Pushes an image, video or audio URL to a device
pub struct PushResourceTool {
    metadata: ToolMetadata,
    service: XiaoduService,
}

impl PushResourceTool {
    pub fn new(service: XiaoduService) -> Self {
        Self {
            metadata: ToolMetadata::new(
                PUSH_RESOURCE_TO_XIAODU,
                "Display or play a media resource on a Xiaodu device. resource_type selects the \
                 required URL: image needs image_url, image_with_bgm needs image_url and bgm_url, \
                 video needs video_url, audio needs audio_url.",
            )
            .with_tag("media"),
            service,
        }
    }
}

#[async_trait]
impl Tool for PushResourceTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    fn schema(&self) -> ToolSchema {
        targeted_schema(
            json!({
                "resource_type": {
                    "type": "string",
                    "enum": ["image", "image_with_bgm", "video", "audio"],
                    "description": "Kind of resource to push"
                },
                "image_url": { "type": "string", "description": "Image URL (image, image_with_bgm)" },
                "bgm_url": { "type": "string", "description": "Background music URL (image_with_bgm)" },
                "video_url": { "type": "string", "description": "Video URL (video)" },
                "audio_url": { "type": "string", "description": "Audio URL (audio)" },
                "timeout": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_PUSH_TIMEOUT_SECS,
                    "description": "Seconds to wait for the device to acknowledge, default 30"
                }
            }),
            &["resource_type"],
        )
    }

    async fn execute(&self, args: Value, ctx: &ToolExecutionContext) -> Result<ToolOutput, ToolError> {
        let args: PushArgs = parse_args(PUSH_RESOURCE_TO_XIAODU, args)?;
        let request = ResourcePushRequest::try_from(args)?;
        let status = self
            .service
            .push_resource(ctx.access_token.as_ref(), &request)
            .await?;
        Ok(ToolOutput::text(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args_ignores_userid() {
        let args: CommandArgs = parse_args(
            CONTROL_XIAODU,
            json!({ "command": "开灯", "cuid": "c", "client_id": "k", "userid": "u-1" }),
        )
        .unwrap();
        assert_eq!(args.command, "开灯");
        assert_eq!(args.target.cuid, "c");
    }

    #[test]
    fn test_parse_args_type_mismatch() {
        let err = parse_args::<PushArgs>(
            PUSH_RESOURCE_TO_XIAODU,
            json!({ "resource_type": "image", "cuid": "c", "client_id": "k", "timeout": "soon" }),
        )
        .unwrap_err();
        assert_eq!(err.kind.as_str(), "invalid_argument");
    }

    #[test]
    fn test_push_args_unknown_type() {
        let args: PushArgs = parse_args(
            PUSH_RESOURCE_TO_XIAODU,
            json!({ "resource_type": "holo", "cuid": "c", "client_id": "k" }),
        )
        .unwrap();
        let err = ResourcePushRequest::try_from(args).unwrap_err();
        assert_eq!(err.kind.as_str(), "invalid_argument");
        assert!(err.message.contains("holo"));
    }

    #[test]
    fn test_targeted_schema_required() {
        let schema = targeted_schema(json!({ "text": { "type": "string" } }), &["text"]);
        assert_eq!(schema.required(), vec!["text", "cuid", "client_id"]);
        assert!(schema.parameters["properties"]["userid"]["deprecated"].as_bool().unwrap());
    }
}
