//! data_collect - record N frames of one frame type from a ToF camera

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tof_recorder::camera::{self, discover};
use tof_recorder::ui::Ui;
use tof_recorder::{CameraConfig, FrameKind, ModeSelector, Session, SessionOptions, SessionOutcome};

const DEFAULT_CAMERA: &str = "stub://tof0";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Record frames from a ToF camera to raw binary files",
    after_help = "Valid mode (--m) options are:\n  \
        0: short-range native\n  \
        1: long-range native\n  \
        2: short-range Quarter Megapixel (QMP)\n  \
        3: long-range QMP\n  \
        4: pcm-native\n  \
        5: long-range mixed\n  \
        6: short-range mixed\n\n\
        Note: --m argument supports both index and string (0/sr-native)"
)]
struct Args {
    /// JSON camera configuration file.
    #[arg(value_name = "CONFIG")]
    config: PathBuf,
    /// Output folder; created if missing.
    #[arg(long = "f", value_name = "FOLDER", default_value = ".")]
    folder: PathBuf,
    /// Number of frames to capture.
    #[arg(long = "n", value_name = "COUNT", default_value_t = 1)]
    frames: u32,
    /// Sensor mode, by index or name.
    #[arg(long = "m", value_name = "MODE", default_value = "0")]
    mode: ModeSelector,
    /// Warmup time in seconds; frames captured during warmup are discarded.
    #[arg(long = "wt", value_name = "SECS", default_value_t = 0)]
    warmup_secs: u64,
    /// Store the module CCB to this file.
    #[arg(long = "ccb", value_name = "FILE")]
    ccb: Option<PathBuf>,
    /// Network camera address; overrides --camera.
    #[arg(long = "ip", value_name = "IP")]
    ip: Option<String>,
    /// Firmware image to flash. No frames are captured.
    #[arg(long = "fw", value_name = "FIRMWARE")]
    firmware: Option<PathBuf>,
    /// Frame type to save (raw|depth|ir|conf).
    #[arg(long = "ft", value_name = "TYPE", default_value = "depth")]
    frame_type: FrameKind,
    /// Camera target used when --ip is not given.
    #[arg(long, env = "TOF_CAMERA", default_value = DEFAULT_CAMERA)]
    camera: String,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    log::info!("tof-recorder {}", env!("CARGO_PKG_VERSION"));
    let config = CameraConfig::load(&args.config)
        .with_context(|| format!("load camera config {}", args.config.display()))?;

    let target = match &args.ip {
        Some(ip) => camera::ip_target(ip),
        None => args.camera.clone(),
    };
    let mut cameras = {
        let _stage = ui.stage("Discover camera");
        discover(&target).with_context(|| format!("discover cameras at {}", target))?
    };
    if cameras.is_empty() {
        log::warn!("No cameras found");
        return Ok(());
    }
    let mut camera = cameras.swap_remove(0);

    let stop = Arc::new(AtomicBool::new(false));
    let handler_flag = stop.clone();
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    let options = SessionOptions {
        folder: args.folder,
        frames: args.frames,
        mode: args.mode,
        warmup: Duration::from_secs(args.warmup_secs),
        frame_kind: args.frame_type,
        firmware: args.firmware,
        ccb_path: args.ccb,
    };
    let session = Session::new(&mut *camera, &config, options)
        .with_stop_flag(stop)
        .with_progress(ui.progress_bar(args.frames));

    let outcome = {
        let _stage = ui.stage("Capture");
        session.run()?
    };
    match outcome {
        SessionOutcome::FirmwareUpdated => {}
        SessionOutcome::Captured(report) => {
            log::info!(
                "captured {} of {} frames, {} written",
                report.frames_captured,
                report.frames_requested,
                report.written.len()
            );
            for failure in &report.failures {
                log::error!("frame {:05} not saved: {}", failure.sequence, failure.path.display());
            }
            if report.interrupted {
                log::warn!("capture interrupted by signal");
            }
        }
    }
    Ok(())
}
