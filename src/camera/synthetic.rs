//! Synthetic camera (stub://) for tests and bench runs.
//!
//! Behaves like a ToF module driven through the vendor SDK:
//! - modes, dimensions and bit-depth controls come from `CameraConfig`
//! - a single frame is refilled in place on every request
//! - channels whose bit-depth control is `0` carry no data
//! - depth compute off leaves only the raw channel
//! - requests are paced to the configured frame rate

use anyhow::{anyhow, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use std::time::{Duration, Instant};

use super::{Camera, CameraDetails};
use crate::config::{CameraConfig, ModeSpec};
use crate::frame::{Frame, FrameDataDetails, FrameDetails, FrameKind};

const CCB_MAGIC: &[u8; 4] = b"CCB1";

pub struct SyntheticCamera {
    target: String,
    config: Option<CameraConfig>,
    mode: Option<ModeSpec>,
    depth_compute: bool,
    streaming: bool,
    frame: Frame,
    frame_count: u64,
    rng: StdRng,
    last_frame_at: Option<Instant>,
    firmware: Option<String>,
}

impl SyntheticCamera {
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            config: None,
            mode: None,
            depth_compute: true,
            streaming: false,
            frame: Frame::default(),
            frame_count: 0,
            rng: StdRng::seed_from_u64(0),
            last_frame_at: None,
            firmware: None,
        }
    }

    /// Frames delivered since `initialize`.
    pub fn frames_delivered(&self) -> u64 {
        self.frame_count
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn depth_compute_enabled(&self) -> bool {
        self.depth_compute
    }

    pub fn active_mode(&self) -> Option<&str> {
        self.mode.as_ref().map(|mode| mode.name.as_str())
    }

    fn config(&self) -> Result<&CameraConfig> {
        self.config
            .as_ref()
            .ok_or_else(|| anyhow!("camera {} is not initialized", self.target))
    }

    fn channel_enabled(&self, kind: FrameKind) -> bool {
        let Some(control) = kind.bit_depth_control() else {
            return true;
        };
        self.config
            .as_ref()
            .and_then(|cfg| cfg.control(control))
            .map(|bits| bits.trim().parse::<u32>().map(|b| b > 0).unwrap_or(true))
            .unwrap_or(true)
    }

    fn pace(&mut self, frame_rate: u32) {
        let interval = Duration::from_secs_f64(1.0 / frame_rate as f64);
        if let Some(last) = self.last_frame_at {
            let since = last.elapsed();
            if since < interval {
                std::thread::sleep(interval - since);
            }
        }
        self.last_frame_at = Some(Instant::now());
    }

    fn fill_frame(&mut self, mode: &ModeSpec) {
        let width = mode.width;
        let height = mode.height;
        let pixels = width as usize * height as usize;
        let frame_count = self.frame_count;
        self.frame.reset(FrameDetails { width, height });

        let raw_details = FrameDataDetails {
            width,
            height,
            subelements_per_element: mode.raw_subelements,
            subelement_size: 2,
        };
        let raw = self.ramp_u16(pixels * mode.raw_subelements as usize, width, frame_count, 0);
        self.frame.set_data(FrameKind::Raw, raw_details, Some(raw));

        let sample16 = FrameDataDetails {
            width,
            height,
            subelements_per_element: 1,
            subelement_size: 2,
        };
        let sample32 = FrameDataDetails {
            subelement_size: 4,
            ..sample16
        };

        let ir_enabled = mode.ir_only || (self.depth_compute && self.channel_enabled(FrameKind::Ir));
        let ir = ir_enabled.then(|| self.ramp_u16(pixels, width, frame_count, 512));
        self.frame.set_data(FrameKind::Ir, sample16, ir);

        if mode.ir_only {
            return;
        }

        let depth_enabled = self.depth_compute && self.channel_enabled(FrameKind::Depth);
        let depth = depth_enabled.then(|| self.ramp_u16(pixels, width, frame_count, 1024));
        self.frame.set_data(FrameKind::Depth, sample16, depth);

        let conf_enabled = self.depth_compute && self.channel_enabled(FrameKind::Conf);
        let conf = conf_enabled.then(|| self.confidence(pixels));
        self.frame.set_data(FrameKind::Conf, sample32, conf);
    }

    /// 12-bit diagonal ramp that drifts with the frame counter, plus a little noise.
    fn ramp_u16(&mut self, samples: usize, width: u32, frame_count: u64, offset: u64) -> Vec<u8> {
        let width = width.max(1) as u64;
        let mut out = Vec::with_capacity(samples * 2);
        for i in 0..samples as u64 {
            let x = i % width;
            let y = i / width;
            let base = (x + y + frame_count + offset) % 4096;
            let value = base as u16 + self.rng.gen_range(0..4u16);
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }

    fn confidence(&mut self, samples: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(samples * 4);
        for _ in 0..samples {
            let value: f32 = self.rng.gen_range(0.0..1.0);
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }
}

impl Camera for SyntheticCamera {
    fn initialize(&mut self, config: &CameraConfig) -> Result<()> {
        config.validate().context("invalid camera config")?;
        self.rng = StdRng::seed_from_u64(config.synthetic.noise_seed);
        self.config = Some(config.clone());
        self.mode = None;
        self.depth_compute = true;
        self.streaming = false;
        self.frame_count = 0;
        self.last_frame_at = None;
        log::info!("SyntheticCamera: initialized {}", self.target);
        Ok(())
    }

    fn details(&self) -> CameraDetails {
        CameraDetails {
            camera_id: self.target.clone(),
            sd_card_image_version: self
                .firmware
                .clone()
                .unwrap_or_else(|| "synthetic".to_string()),
            kernel_version: "synthetic".to_string(),
            u_boot_version: "synthetic".to_string(),
        }
    }

    fn available_modes(&self) -> Result<Vec<String>> {
        Ok(self
            .config()?
            .modes
            .iter()
            .map(|mode| mode.name.clone())
            .collect())
    }

    fn mode_name_from_id(&self, id: u32) -> Result<String> {
        self.config()?
            .mode_by_id(id)
            .map(|mode| mode.name.clone())
            .ok_or_else(|| anyhow!("no mode with id {}", id))
    }

    fn set_mode(&mut self, name: &str) -> Result<()> {
        if self.streaming {
            return Err(anyhow!("cannot change mode while streaming"));
        }
        let mode = self
            .config()?
            .mode(name)
            .cloned()
            .ok_or_else(|| anyhow!("unsupported mode '{}'", name))?;
        log::info!(
            "SyntheticCamera: mode {} ({}x{})",
            mode.name,
            mode.width,
            mode.height
        );
        self.mode = Some(mode);
        Ok(())
    }

    fn enable_depth_compute(&mut self, enable: bool) -> Result<()> {
        self.depth_compute = enable;
        Ok(())
    }

    fn control(&self, key: &str) -> Result<String> {
        self.config()?
            .control(key)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("unknown control '{}'", key))
    }

    fn sensor_name(&self) -> Result<String> {
        Ok("synthetic-tof".to_string())
    }

    fn start(&mut self) -> Result<()> {
        self.config()?;
        if self.mode.is_none() {
            return Err(anyhow!("no mode selected"));
        }
        self.streaming = true;
        self.last_frame_at = None;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if !self.streaming {
            return Err(anyhow!("camera {} is not streaming", self.target));
        }
        self.streaming = false;
        if self.config()?.synthetic.fail_stop {
            return Err(anyhow!("camera {} did not acknowledge stop", self.target));
        }
        Ok(())
    }

    fn request_frame(&mut self) -> Result<&Frame> {
        if !self.streaming {
            return Err(anyhow!("camera {} is not streaming", self.target));
        }
        let (frame_rate, fail_after) = {
            let cfg = self.config()?;
            (cfg.frame_rate, cfg.synthetic.fail_after_frames)
        };
        if let Some(limit) = fail_after {
            if self.frame_count >= limit {
                return Err(anyhow!(
                    "frame request timed out after {} frames",
                    self.frame_count
                ));
            }
        }
        let mode = self
            .mode
            .clone()
            .ok_or_else(|| anyhow!("no mode selected"))?;
        self.pace(frame_rate);
        self.fill_frame(&mode);
        self.frame_count += 1;
        Ok(&self.frame)
    }

    fn update_firmware(&mut self, path: &Path) -> Result<()> {
        let image = std::fs::read(path)
            .with_context(|| format!("read firmware image {}", path.display()))?;
        if image.is_empty() {
            return Err(anyhow!("firmware image {} is empty", path.display()));
        }
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        log::info!(
            "SyntheticCamera: flashed {} ({} bytes)",
            name,
            image.len()
        );
        self.firmware = Some(name);
        Ok(())
    }

    fn save_module_ccb(&self, path: &Path) -> Result<()> {
        let cfg = self.config()?;
        let mut blob = Vec::with_capacity(8 + cfg.modes.len() * 12);
        blob.extend_from_slice(CCB_MAGIC);
        blob.extend_from_slice(&(cfg.modes.len() as u32).to_le_bytes());
        for mode in &cfg.modes {
            blob.extend_from_slice(&mode.id.to_le_bytes());
            blob.extend_from_slice(&mode.width.to_le_bytes());
            blob.extend_from_slice(&mode.height.to_le_bytes());
        }
        std::fs::write(path, &blob).with_context(|| format!("write CCB to {}", path.display()))
    }
}
