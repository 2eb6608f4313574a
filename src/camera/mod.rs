//! Camera sources.
//!
//! The camera SDK is an external collaborator. This module defines the
//! contract the recorder drives (`Camera`) and the discovery entry point:
//! - `stub://<name>` targets resolve to the in-tree `SyntheticCamera`
//! - any other target (`ip:<addr>`, local enumeration) needs a vendor backend
//!   implementing `Camera`; without one, discovery finds no camera
//!
//! Camera implementations return `anyhow::Result`; the session and capture
//! loop classify failures into `CaptureError::Device`.

use anyhow::{anyhow, Result};
use std::path::Path;

use crate::config::CameraConfig;
use crate::frame::Frame;

pub mod synthetic;

pub use synthetic::SyntheticCamera;

pub const STUB_SCHEME: &str = "stub://";
pub const IP_PREFIX: &str = "ip:";

/// Identification reported by a camera after `initialize`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CameraDetails {
    pub camera_id: String,
    pub sd_card_image_version: String,
    pub kernel_version: String,
    pub u_boot_version: String,
}

/// Depth camera driven by the recorder.
///
/// `request_frame` blocks until the camera produces a frame. The returned
/// frame is borrowed from the camera and is refilled by the next request, so
/// it cannot be held across requests:
///
/// ```compile_fail
/// use tof_recorder::camera::{Camera, SyntheticCamera};
/// use tof_recorder::config::CameraConfig;
/// use tof_recorder::frame::FrameKind;
///
/// let mut camera = SyntheticCamera::new("stub://doc");
/// camera.initialize(&CameraConfig::default()).unwrap();
/// camera.set_mode("sr-qnative").unwrap();
/// camera.start().unwrap();
/// let first = camera.request_frame().unwrap();
/// let _second = camera.request_frame().unwrap();
/// let _stale = first.data(FrameKind::Depth);
/// ```
pub trait Camera: Send {
    fn initialize(&mut self, config: &CameraConfig) -> Result<()>;

    fn details(&self) -> CameraDetails;

    /// Names of the sensor modes ("frame types" in vendor terms) the camera supports.
    fn available_modes(&self) -> Result<Vec<String>>;

    fn mode_name_from_id(&self, id: u32) -> Result<String>;

    fn set_mode(&mut self, name: &str) -> Result<()>;

    /// Turn on-device depth computation on or off. With it off only raw data is produced.
    fn enable_depth_compute(&mut self, enable: bool) -> Result<()>;

    /// Read a device control, e.g. `phaseDepthBits`.
    fn control(&self, key: &str) -> Result<String>;

    fn sensor_name(&self) -> Result<String>;

    fn start(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    fn request_frame(&mut self) -> Result<&Frame>;

    fn update_firmware(&mut self, path: &Path) -> Result<()>;

    /// Store the module's calibration blob (CCB) at `path`.
    fn save_module_ccb(&self, path: &Path) -> Result<()>;
}

/// Find the cameras reachable at `target`.
///
/// Returns an empty list (not an error) when nothing answers, so callers can
/// treat "no camera" as a benign exit.
pub fn discover(target: &str) -> Result<Vec<Box<dyn Camera>>> {
    let target = target.trim();
    if target.is_empty() {
        return Err(anyhow!("camera target must not be empty"));
    }
    if let Some(name) = target.strip_prefix(STUB_SCHEME) {
        if name.is_empty() {
            return Err(anyhow!("stub camera target needs a name (stub://<name>)"));
        }
        return Ok(vec![Box::new(SyntheticCamera::new(target))]);
    }
    log::debug!("no camera backend linked for target {}", target);
    Ok(Vec::new())
}

/// First camera reachable at `target`. Unlike `discover`, finding nothing is an error.
pub fn open_first(target: &str) -> Result<Box<dyn Camera>> {
    discover(target)?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No cameras found at {}", target.trim()))
}

/// Build the discovery target for a network camera address.
pub fn ip_target(ip: &str) -> String {
    format!("{}{}", IP_PREFIX, ip.trim())
}
