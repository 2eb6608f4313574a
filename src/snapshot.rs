//! First-frame snapshot.
//!
//! Bring-up check for the megapixel modes: start the camera, pull a few frames
//! synchronously and dump ir, depth and the fixed-size raw payload of each one
//! into the output directory. Dumps are best effort; a failed dump is logged
//! and counted, and the next frame is still requested.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::camera::Camera;
use crate::config::CameraConfig;
use crate::error::{CaptureError, CaptureResult};
use crate::frame::{CaptureBuffer, FrameKind};
use crate::session::{local_timestamp_tag, prepare_output_folder};
use crate::writer::write_file;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotMode {
    /// Megapixel: three 12-bit phases plus a 16-bit AB frame.
    Mp,
    /// Quarter megapixel: 16-bit radial, 16-bit AB and 8-bit confidence.
    Qmp,
}

impl SnapshotMode {
    pub fn mode_name(&self) -> &'static str {
        match self {
            SnapshotMode::Mp => "mp",
            SnapshotMode::Qmp => "qmp",
        }
    }

    /// Bytes of raw payload per frame.
    pub fn expected_raw_size(&self) -> usize {
        match self {
            SnapshotMode::Mp => (1024 * 1024) * (3 * 12 + 16) / 8,
            SnapshotMode::Qmp => (512 * 512) * (16 + 16 + 8) / 8,
        }
    }
}

impl fmt::Display for SnapshotMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mode_name())
    }
}

impl FromStr for SnapshotMode {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "mp" => Ok(SnapshotMode::Mp),
            "qmp" => Ok(SnapshotMode::Qmp),
            other => Err(CaptureError::config(format!(
                "unknown mode '{}' (qmp - quarter megapixel mode, mp - megapixel mode)",
                other
            ))),
        }
    }
}

#[derive(Debug, Default)]
pub struct SnapshotReport {
    pub frames: u32,
    pub written: Vec<PathBuf>,
    pub failed_dumps: usize,
    pub elapsed: Duration,
    pub fps: Option<f64>,
}

pub fn processed_dump_path(dir: &Path, kind: FrameKind, timestamp: &str, counter: u32) -> PathBuf {
    dir.join(format!("out_{}_{}_{:05}.bin", kind, timestamp, counter))
}

pub fn raw_dump_path(dir: &Path, timestamp: &str, counter: u32) -> PathBuf {
    dir.join(format!("raw_frame_{}_{:05}.bin", timestamp, counter))
}

/// Capture `frames` frames in `mode` and dump them into `out_dir`.
///
/// The camera is stopped before returning; a stop failure is an error here,
/// unlike the recording session.
pub fn run_snapshot(
    camera: &mut dyn Camera,
    config: &CameraConfig,
    mode: SnapshotMode,
    frames: u32,
    out_dir: &Path,
) -> CaptureResult<SnapshotReport> {
    prepare_output_folder(out_dir)?;

    camera
        .initialize(config)
        .map_err(|e| CaptureError::device("initialize", e))?;
    let details = camera.details();
    log::info!("SD card image version: {}", details.sd_card_image_version);
    log::info!("Kernel version: {}", details.kernel_version);
    log::info!("U-Boot version: {}", details.u_boot_version);

    let modes = camera
        .available_modes()
        .map_err(|e| CaptureError::device("available_modes", e))?;
    if modes.is_empty() {
        return Err(CaptureError::Device {
            operation: "available_modes",
            message: "no frame type available".to_string(),
        });
    }
    camera
        .set_mode(mode.mode_name())
        .map_err(|e| CaptureError::device("set_mode", e))?;
    camera
        .start()
        .map_err(|e| CaptureError::device("start", e))?;

    let raw_size = mode.expected_raw_size();
    log::info!("'{}' expected frame size: {}", mode, raw_size);
    log::info!("Getting {} frames", frames);

    let mut report = SnapshotReport {
        frames,
        ..SnapshotReport::default()
    };
    let start = Instant::now();
    let captured = capture_frames(camera, frames, raw_size, out_dir, &mut report);
    report.elapsed = start.elapsed();

    let stopped = camera
        .stop()
        .map_err(|e| CaptureError::device("stop", e));
    captured?;
    stopped?;

    let secs = report.elapsed.as_secs_f64();
    report.fps = (frames > 0 && secs > 0.0).then(|| frames as f64 / secs);
    if let Some(fps) = report.fps {
        log::info!("Frame rate = {:.3}", fps);
    }
    Ok(report)
}

fn capture_frames(
    camera: &mut dyn Camera,
    frames: u32,
    raw_size: usize,
    out_dir: &Path,
    report: &mut SnapshotReport,
) -> CaptureResult<()> {
    for counter in 1..=frames {
        let frame = camera
            .request_frame()
            .map_err(|e| CaptureError::device("request_frame", e))?;
        log::info!("Frame #: {}, {} bytes", counter, raw_size);

        let mut dumps = Vec::with_capacity(3);
        for kind in [FrameKind::Ir, FrameKind::Depth] {
            let path = processed_dump_path(out_dir, kind, &local_timestamp_tag(), counter);
            dumps.push((path, CaptureBuffer::copy_out(frame, kind)));
        }
        let raw_path = raw_dump_path(out_dir, &local_timestamp_tag(), counter);
        dumps.push((raw_path, CaptureBuffer::copy_prefix(frame, FrameKind::Raw, raw_size)));

        for (path, buffer) in dumps {
            match buffer.and_then(|buffer| write_file(&path, buffer.as_bytes())) {
                Ok(_) => report.written.push(path),
                Err(err) => {
                    log::error!("could not dump {}: {}", path.display(), err);
                    report.failed_dumps += 1;
                }
            }
        }
    }
    Ok(())
}
