//! Capture loop.
//!
//! Drives a started camera through `Idle -> Warmup -> Capturing -> Draining ->
//! Stopped`, copying one sub-buffer per frame and handing it to a
//! `FrameWriter`. All iterations but the last dispatch their write and move on;
//! the last one is joined before the throughput is measured.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::ProgressBar;

use crate::camera::Camera;
use crate::error::{CaptureError, CaptureResult};
use crate::frame::{CaptureBuffer, FrameKind};
use crate::session::SessionParams;
use crate::writer::{FrameWriter, WriteJob, WriteOutcome};

/// Passive IR mode. Carries IR data only and has no `abBits` gate.
pub const PCM_NATIVE_MODE: &str = "pcm-native";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Warmup,
    Capturing,
    Draining,
    Stopped,
}

#[derive(Debug)]
pub struct CaptureReport {
    pub frames_requested: u32,
    pub frames_captured: u32,
    pub written: Vec<PathBuf>,
    pub failures: Vec<WriteOutcome>,
    pub elapsed: Duration,
    /// Frames per second over the capture window. `None` when nothing was
    /// captured or no time elapsed.
    pub fps: Option<f64>,
    pub interrupted: bool,
}

pub struct CaptureLoop<'a> {
    camera: &'a mut dyn Camera,
    params: Arc<SessionParams>,
    warmup: Duration,
    stop: Option<Arc<AtomicBool>>,
    progress: ProgressBar,
    state: CaptureState,
}

impl<'a> CaptureLoop<'a> {
    /// `camera` must already be started in the mode named by `params`.
    pub fn new(camera: &'a mut dyn Camera, params: Arc<SessionParams>) -> Self {
        Self {
            camera,
            params,
            warmup: Duration::ZERO,
            stop: None,
            progress: ProgressBar::hidden(),
            state: CaptureState::Idle,
        }
    }

    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    /// Stop requesting frames once `flag` is set. Pending writes still finish.
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop = Some(flag);
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Run the session to completion.
    ///
    /// On a fatal error the in-flight write is joined and the camera stopped
    /// before the error is returned.
    pub fn run(&mut self) -> CaptureResult<CaptureReport> {
        let mut writer = FrameWriter::new();
        let captured = self.capture(&mut writer);

        self.transition(CaptureState::Draining);
        let outcomes = writer.finish();
        if let Err(err) = self.camera.stop() {
            log::warn!("Error stopping camera: {:#}", err);
        }
        self.transition(CaptureState::Stopped);
        match &captured {
            Ok(_) => self.progress.finish(),
            Err(_) => self.progress.abandon(),
        }

        let (frames_captured, elapsed, interrupted) = captured?;
        let secs = elapsed.as_secs_f64();
        let fps = (frames_captured > 0 && secs > 0.0).then(|| frames_captured as f64 / secs);
        if let Some(fps) = fps {
            log::info!("Measured FPS: {:.3}", fps);
        }

        let (ok, failures): (Vec<_>, Vec<_>) = outcomes.into_iter().partition(WriteOutcome::is_ok);
        if !failures.is_empty() {
            log::warn!(
                "{} of {} frame writes failed",
                failures.len(),
                frames_captured
            );
        }

        Ok(CaptureReport {
            frames_requested: self.params.frames,
            frames_captured,
            written: ok.into_iter().map(|outcome| outcome.path).collect(),
            failures,
            elapsed,
            fps,
            interrupted,
        })
    }

    fn capture(&mut self, writer: &mut FrameWriter) -> CaptureResult<(u32, Duration, bool)> {
        if !self.warmup.is_zero() {
            self.transition(CaptureState::Warmup);
            if !self.run_warmup()? {
                log::warn!("capture interrupted during warmup");
                return Ok((0, Duration::ZERO, true));
            }
        }

        let total = self.params.frames;
        log::info!("Requesting {} frames!", total);
        self.transition(CaptureState::Capturing);
        self.progress.set_length(total as u64);

        let start = Instant::now();
        let mut captured = 0u32;
        let mut interrupted = false;
        for sequence in 0..total {
            if self.stop_requested() {
                log::warn!("capture interrupted after {} of {} frames", captured, total);
                interrupted = true;
                break;
            }
            let buffer = match self.capture_one(sequence) {
                Ok(buffer) => buffer,
                Err(err) if !err.is_fatal() => {
                    log::error!("frame {:05}: {}", sequence, err);
                    continue;
                }
                Err(err) => return Err(err),
            };
            let job = WriteJob::new(self.params.clone(), sequence, buffer);
            if sequence + 1 == total {
                writer.submit_and_wait(job);
            } else {
                writer.submit(job);
            }
            captured += 1;
            self.progress.inc(1);
        }
        Ok((captured, start.elapsed(), interrupted))
    }

    /// Discard frames until the warmup time is spent. Returns `false` if the
    /// stop flag was raised first.
    fn run_warmup(&mut self) -> CaptureResult<bool> {
        log::info!("Warming up for {:.1}s", self.warmup.as_secs_f64());
        let start = Instant::now();
        let mut discarded = 0u64;
        loop {
            if self.stop_requested() {
                return Ok(false);
            }
            let frame = self
                .camera
                .request_frame()
                .map_err(|e| CaptureError::device("request_frame", e))?;
            if frame.data(FrameKind::Raw).is_none() {
                return Err(CaptureError::data_unavailable(
                    "could not get raw frame data during warmup",
                ));
            }
            discarded += 1;
            if start.elapsed() >= self.warmup {
                break;
            }
        }
        log::info!("Warmup done, {} frames discarded", discarded);
        Ok(true)
    }

    fn capture_one(&mut self, sequence: u32) -> CaptureResult<CaptureBuffer> {
        let kind = self.params.frame_kind;
        check_channel(&*self.camera, kind, &self.params.mode_name)?;

        let frame = self
            .camera
            .request_frame()
            .map_err(|e| CaptureError::device("request_frame", e))?;
        let details = frame.details();
        log::debug!(
            "frame {:05}: {}x{} {}",
            sequence,
            details.width,
            details.height,
            kind
        );
        CaptureBuffer::copy_out(frame, kind)
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    fn transition(&mut self, next: CaptureState) {
        log::debug!("capture state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// Fail if the device reports the `kind` channel as disabled (zero bits).
pub fn check_channel(camera: &dyn Camera, kind: FrameKind, mode_name: &str) -> CaptureResult<()> {
    let Some(control) = kind.bit_depth_control() else {
        return Ok(());
    };
    if kind == FrameKind::Ir && mode_name == PCM_NATIVE_MODE {
        return Ok(());
    }
    let value = camera
        .control(control)
        .map_err(|e| CaptureError::device("get_control", e))?;
    let bits: u32 = value.trim().parse().map_err(|_| CaptureError::Device {
        operation: "get_control",
        message: format!("{} returned non-numeric value '{}'", control, value),
    })?;
    if bits == 0 {
        return Err(CaptureError::data_unavailable(format!(
            "{} disabled from ini file ({} = 0)",
            kind, control
        )));
    }
    Ok(())
}
