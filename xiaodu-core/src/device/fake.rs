//! In-memory [`DeviceCloud`] for unit tests
//!
//! Counts every call so tests can assert that validation failures never reach
//! the network.

use super::cloud::{AccessToken, DeviceCloud};
use super::error::DeviceError;
use super::model::{
    CommandRequest, DeviceCapability, DeviceDescriptor, DeviceTarget, ResourcePushRequest,
    SpeechRequest,
};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Bytes of a minimal JPEG header
pub const JPEG_BYTES: [u8; 6] = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

#[derive(Default)]
pub struct FakeCloud {
    pub call_count: AtomicUsize,
    pub completed_count: AtomicUsize,
    pub devices: Vec<DeviceDescriptor>,
    pub photo: Option<String>,
    pub delay: Option<Duration>,
    pub last_push: Mutex<Option<ResourcePushRequest>>,
}

impl FakeCloud {
    /// One online speaker with a camera, `cuid-1`/`client-1`, that returns a JPEG
    pub fn with_camera() -> Self {
        Self {
            devices: vec![device("cuid-1", true, &[DeviceCapability::Camera, DeviceCapability::Speaker])],
            photo: Some(STANDARD.encode(JPEG_BYTES)),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Calls started
    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Calls that ran to completion
    pub fn completed(&self) -> usize {
        self.completed_count.load(Ordering::SeqCst)
    }

    async fn hit(&self) {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.completed_count.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn device(cuid: &str, online: bool, caps: &[DeviceCapability]) -> DeviceDescriptor {
    DeviceDescriptor {
        cuid: cuid.to_string(),
        client_id: cuid.replace("cuid", "client"),
        name: format!("speaker {}", cuid),
        online,
        capabilities: caps.iter().copied().collect(),
    }
}

#[async_trait]
impl DeviceCloud for FakeCloud {
    async fn list_devices(&self, _token: &AccessToken) -> Result<Vec<DeviceDescriptor>, DeviceError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.completed_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.devices.clone())
    }

    async fn send_command(&self, _token: &AccessToken, request: &CommandRequest) -> Result<String, DeviceError> {
        self.hit().await;
        Ok(format!("done: {}", request.command))
    }

    async fn speak(&self, _token: &AccessToken, _request: &SpeechRequest) -> Result<String, DeviceError> {
        self.hit().await;
        Ok("success".to_string())
    }

    async fn capture_photo(&self, _token: &AccessToken, _target: &DeviceTarget) -> Result<String, DeviceError> {
        self.hit().await;
        self.photo.clone().ok_or(DeviceError::Upstream {
            code: 50000,
            message: "no frame".into(),
        })
    }

    async fn push_resource(
        &self,
        _token: &AccessToken,
        request: &ResourcePushRequest,
    ) -> Result<String, DeviceError> {
        *self.last_push.lock().unwrap() = Some(request.clone());
        self.hit().await;
        Ok("success".to_string())
    }
}
