//! Xiaodu device operations
//!
//! - [`model`]: device descriptors and request types with local validation
//! - [`cloud`]: the [`DeviceCloud`] seam and its HTTP implementation
//! - [`service`]: [`XiaoduService`], which sequences validation, credential
//!   checks and the single remote call

pub mod cloud;
pub mod error;
pub mod model;
pub mod service;

#[cfg(test)]
pub(crate) mod fake;

pub use cloud::{AccessToken, DeviceCloud, HttpDeviceCloud};
pub use error::DeviceError;
pub use model::{
    CommandRequest, DeviceCapability, DeviceDescriptor, DeviceTarget, JPEG_MIME,
    MAX_PUSH_TIMEOUT_SECS, MAX_SPEECH_CHARS, PhotoResult, ResourcePushRequest, ResourceType,
    SpeechRequest,
};
pub use service::{ServiceLimits, XiaoduService};
