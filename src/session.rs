//! Session controller.
//!
//! Takes a discovered camera from "just found" to "stopped": initialize,
//! optional firmware update, mode resolution, frame-type fixups, CCB export,
//! start, then the capture loop.

use chrono::{DateTime, Local};
use indicatif::ProgressBar;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use crate::camera::Camera;
use crate::capture::{CaptureLoop, CaptureReport, PCM_NATIVE_MODE};
use crate::config::CameraConfig;
use crate::error::{CaptureError, CaptureResult};
use crate::frame::FrameKind;

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Parameters fixed at session start and shared read-only with every write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionParams {
    pub folder: PathBuf,
    pub frame_kind: FrameKind,
    pub mode_name: String,
    pub frames: u32,
    /// `YYYYMMDDHHMMSS`, formatted once per session.
    pub timestamp: String,
}

impl SessionParams {
    pub fn new(
        folder: impl Into<PathBuf>,
        frame_kind: FrameKind,
        mode_name: impl Into<String>,
        frames: u32,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            folder: folder.into(),
            frame_kind,
            mode_name: mode_name.into(),
            frames,
            timestamp: timestamp.into(),
        }
    }
}

pub fn timestamp_tag(at: &DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn local_timestamp_tag() -> String {
    timestamp_tag(&Local::now())
}

/// Sensor mode given on the command line, by index or by name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModeSelector {
    Id(u32),
    Name(String),
}

impl FromStr for ModeSelector {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CaptureError::config("mode must not be empty"));
        }
        match s.parse::<u32>() {
            Ok(id) => Ok(ModeSelector::Id(id)),
            Err(_) => Ok(ModeSelector::Name(s.to_string())),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub folder: PathBuf,
    pub frames: u32,
    pub mode: ModeSelector,
    pub warmup: Duration,
    pub frame_kind: FrameKind,
    pub firmware: Option<PathBuf>,
    pub ccb_path: Option<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("."),
            frames: 1,
            mode: ModeSelector::Id(0),
            warmup: Duration::ZERO,
            frame_kind: FrameKind::Depth,
            firmware: None,
            ccb_path: None,
        }
    }
}

#[derive(Debug)]
pub enum SessionOutcome {
    Captured(CaptureReport),
    /// Firmware was flashed; the board must be rebooted before capturing.
    FirmwareUpdated,
}

pub struct Session<'a> {
    camera: &'a mut dyn Camera,
    config: &'a CameraConfig,
    options: SessionOptions,
    stop: Option<Arc<AtomicBool>>,
    progress: Option<ProgressBar>,
    timestamp: Option<String>,
}

impl<'a> Session<'a> {
    pub fn new(camera: &'a mut dyn Camera, config: &'a CameraConfig, options: SessionOptions) -> Self {
        Self {
            camera,
            config,
            options,
            stop: None,
            progress: None,
            timestamp: None,
        }
    }

    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop = Some(flag);
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Use a fixed timestamp tag instead of the local clock.
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn run(self) -> CaptureResult<SessionOutcome> {
        prepare_output_folder(&self.options.folder)?;

        self.camera
            .initialize(self.config)
            .map_err(|e| CaptureError::device("initialize", e))?;
        let details = self.camera.details();
        log::info!("Camera: {}", details.camera_id);
        log::info!("SD card image version: {}", details.sd_card_image_version);
        log::info!("Kernel version: {}", details.kernel_version);
        log::info!("U-Boot version: {}", details.u_boot_version);

        if let Some(image) = &self.options.firmware {
            check_firmware_image(image)?;
            self.camera
                .update_firmware(image)
                .map_err(|e| CaptureError::device("update_firmware", e))?;
            log::info!("Please reboot the board!");
            return Ok(SessionOutcome::FirmwareUpdated);
        }

        let modes = self
            .camera
            .available_modes()
            .map_err(|e| CaptureError::device("available_modes", e))?;
        if modes.is_empty() {
            return Err(CaptureError::Device {
                operation: "available_modes",
                message: "camera reports no modes".to_string(),
            });
        }
        let mode_name = match &self.options.mode {
            ModeSelector::Name(name) => name.clone(),
            ModeSelector::Id(id) => self.camera.mode_name_from_id(*id).map_err(|_| {
                CaptureError::config(format!("mode {} is invalid for this type of camera", id))
            })?,
        };

        match self.camera.sensor_name() {
            Ok(name) => log::info!("Sensor: {}", name),
            Err(err) => log::warn!("could not read sensor name: {:#}", err),
        }

        let frame_kind = effective_frame_kind(self.options.frame_kind, &mode_name);
        if frame_kind == FrameKind::Raw {
            self.camera
                .enable_depth_compute(false)
                .map_err(|e| CaptureError::device("enable_depth_compute", e))?;
        }

        self.camera
            .set_mode(&mode_name)
            .map_err(|e| CaptureError::device("set_mode", e))?;

        let timestamp = self.timestamp.clone().unwrap_or_else(local_timestamp_tag);

        if let Some(ccb_path) = &self.options.ccb_path {
            match self.camera.save_module_ccb(ccb_path) {
                Ok(()) => log::info!("CCB stored to {}", ccb_path.display()),
                Err(err) => log::warn!("Failed to store CCB to {}: {:#}", ccb_path.display(), err),
            }
        }

        self.camera
            .start()
            .map_err(|e| CaptureError::device("start", e))?;

        let params = Arc::new(SessionParams::new(
            self.options.folder.clone(),
            frame_kind,
            mode_name,
            self.options.frames,
            timestamp,
        ));
        let mut capture = CaptureLoop::new(self.camera, params).with_warmup(self.options.warmup);
        if let Some(flag) = self.stop {
            capture = capture.with_stop_flag(flag);
        }
        if let Some(progress) = self.progress {
            capture = capture.with_progress(progress);
        }
        capture.run().map(SessionOutcome::Captured)
    }
}

/// Passive IR modes only carry IR data; any other frame type is remapped.
pub fn effective_frame_kind(requested: FrameKind, mode_name: &str) -> FrameKind {
    if requested != FrameKind::Ir && mode_name == PCM_NATIVE_MODE {
        log::error!(
            "{} mode doesn't contain depth/conf/raw data, setting frame type to ir",
            mode_name
        );
        return FrameKind::Ir;
    }
    requested
}

pub fn prepare_output_folder(folder: &Path) -> CaptureResult<()> {
    std::fs::create_dir_all(folder).map_err(|e| {
        CaptureError::config(format!(
            "unable to create output folder {}: {}",
            folder.display(),
            e
        ))
    })
}

fn check_firmware_image(image: &Path) -> CaptureResult<()> {
    match std::fs::metadata(image) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        _ => Err(CaptureError::config(format!(
            "{} not found or is an empty file",
            image.display()
        ))),
    }
}
