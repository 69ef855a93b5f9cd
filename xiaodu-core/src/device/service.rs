//! Device operations
//!
//! [`XiaoduService`] validates every request locally, resolves the caller's
//! credential and then makes exactly one remote attempt through a
//! [`DeviceCloud`]. Nothing is retried here.

use super::cloud::{AccessToken, DeviceCloud};
use super::error::DeviceError;
use super::model::{
    CommandRequest, DeviceCapability, DeviceDescriptor, DeviceTarget, PhotoResult,
    ResourcePushRequest, SpeechRequest,
};
use crate::config::CloudConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Time windows applied by the service around remote calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceLimits {
    /// How long to wait for a captured frame
    pub capture_timeout: Duration,
    /// Default acknowledgment window for resource pushes
    pub push_timeout: Duration,
}

impl Default for ServiceLimits {
    fn default() -> Self {
        Self {
            capture_timeout: Duration::from_secs(30),
            push_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&CloudConfig> for ServiceLimits {
    fn from(config: &CloudConfig) -> Self {
        Self {
            capture_timeout: config.capture_timeout,
            push_timeout: config.push_timeout,
        }
    }
}

/// Entry point for the five device operations
#[derive(Clone)]
pub struct XiaoduService {
    cloud: Arc<dyn DeviceCloud>,
    limits: ServiceLimits,
}

impl XiaoduService {
    pub fn new(cloud: Arc<dyn DeviceCloud>) -> Self {
        Self {
            cloud,
            limits: ServiceLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: ServiceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> ServiceLimits {
        self.limits
    }

    /// Online, addressable devices bound to the caller
    pub async fn list_user_devices(
        &self,
        token: Option<&AccessToken>,
    ) -> Result<Vec<DeviceDescriptor>, DeviceError> {
        let token = require_token(token)?;
        let devices = self.cloud.list_devices(token).await?;
        let total = devices.len();

        let usable: Vec<DeviceDescriptor> = devices
            .into_iter()
            .filter(|device| {
                if !device.is_addressable() {
                    warn!(name = %device.name, "Dropping device without cuid/client_id");
                    return false;
                }
                device.online
            })
            .collect();

        debug!(total, usable = usable.len(), "Listed devices");
        Ok(usable)
    }

    /// Forward a natural-language instruction to a device
    pub async fn control(
        &self,
        token: Option<&AccessToken>,
        request: &CommandRequest,
    ) -> Result<String, DeviceError> {
        request.validate()?;
        let token = require_token(token)?;
        info!(cuid = %request.target.cuid, "Sending voice command");
        self.cloud.send_command(token, request).await
    }

    /// Speak literal text on a device
    pub async fn speak(
        &self,
        token: Option<&AccessToken>,
        request: &SpeechRequest,
    ) -> Result<String, DeviceError> {
        request.validate()?;
        let token = require_token(token)?;
        info!(cuid = %request.target.cuid, chars = request.text.chars().count(), "Requesting speech");
        self.cloud.speak(token, request).await
    }

    /// Capture one still frame from a camera-equipped device
    pub async fn take_photo(
        &self,
        token: Option<&AccessToken>,
        target: &DeviceTarget,
    ) -> Result<PhotoResult, DeviceError> {
        target.validate()?;
        let token = require_token(token)?;

        let devices = self.cloud.list_devices(token).await?;
        let device = devices
            .iter()
            .find(|device| target.matches(device))
            .filter(|device| device.online)
            .ok_or_else(|| DeviceError::DeviceOffline(target.cuid.clone()))?;

        if !device.has_capability(DeviceCapability::Camera) {
            return Err(DeviceError::CapabilityUnsupported {
                cuid: target.cuid.clone(),
                capability: DeviceCapability::Camera,
            });
        }

        let window = self.limits.capture_timeout;
        info!(cuid = %target.cuid, ?window, "Capturing photo");

        let payload = match tokio::time::timeout(window, self.cloud.capture_photo(token, target)).await {
            Ok(Ok(payload)) => payload,
            Ok(Err(DeviceError::Timeout(_))) | Err(_) => {
                return Err(DeviceError::CaptureTimeout(window));
            }
            Ok(Err(e)) => return Err(e),
        };

        PhotoResult::from_base64(&payload)
    }

    /// Display or play a URL-referenced resource on a device
    pub async fn push_resource(
        &self,
        token: Option<&AccessToken>,
        request: &ResourcePushRequest,
    ) -> Result<String, DeviceError> {
        request.validate()?;
        let token = require_token(token)?;

        let window = request
            .timeout
            .map(Duration::from_secs)
            .unwrap_or(self.limits.push_timeout);

        let mut request = request.clone();
        request.timeout = Some(window.as_secs());

        info!(
            cuid = %request.target.cuid,
            resource_type = %request.resource_type,
            ?window,
            "Pushing resource"
        );

        match tokio::time::timeout(window, self.cloud.push_resource(token, &request)).await {
            Ok(result) => result,
            Err(_) => Err(DeviceError::Timeout(window)),
        }
    }
}

fn require_token(token: Option<&AccessToken>) -> Result<&AccessToken, DeviceError> {
    token.ok_or_else(|| {
        DeviceError::Authentication(
            "no access token supplied; set the ACCESS_TOKEN header or configuration".to_string(),
        )
    })
}
