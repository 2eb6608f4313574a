//! first_frame - dump the first frames of a megapixel mode for bring-up

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use tof_recorder::camera::{self, open_first};
use tof_recorder::ui::Ui;
use tof_recorder::{run_snapshot, CameraConfig, SnapshotMode};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Dump ir, depth and raw data of the first frames",
    after_help = "MODE is one of:\n  qmp - quarter megapixel mode.\n  mp - megapixel mode."
)]
struct Args {
    /// Sensor mode (mp|qmp).
    #[arg(value_name = "MODE")]
    mode: SnapshotMode,
    /// Number of frames to dump.
    #[arg(value_name = "FRAMES")]
    frames: u32,
    /// JSON camera configuration file.
    #[arg(value_name = "CONFIG")]
    config: PathBuf,
    /// Network camera address; overrides --camera.
    #[arg(long, value_name = "IP")]
    ip: Option<String>,
    /// Camera target used when --ip is not given.
    #[arg(long, env = "TOF_CAMERA", default_value = "stub://tof0")]
    camera: String,
    /// Directory for the dumps.
    #[arg(long, value_name = "DIR", default_value = ".")]
    out: PathBuf,
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

    let config = CameraConfig::load(&args.config)
        .with_context(|| format!("load camera config {}", args.config.display()))?;

    let target = match &args.ip {
        Some(ip) => camera::ip_target(ip),
        None => args.camera.clone(),
    };
    let mut camera = open_first(&target)?;

    let report = {
        let _stage = ui.stage(&format!("Dump {} frames ({})", args.frames, args.mode));
        run_snapshot(&mut *camera, &config, args.mode, args.frames, &args.out)?
    };
    log::info!(
        "{} files written to {}, {} dumps failed",
        report.written.len(),
        args.out.display(),
        report.failed_dumps
    );
    Ok(())
}
