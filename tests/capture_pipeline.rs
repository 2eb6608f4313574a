use std::path::Path;

use tof_recorder::camera::{discover, ip_target, Camera, SyntheticCamera};
use tof_recorder::config::{CameraConfig, ModeSpec};
use tof_recorder::writer::output_path;
use tof_recorder::{
    CaptureError, CaptureReport, FrameKind, ModeSelector, Session, SessionOptions,
    SessionOutcome,
};

const TS: &str = "20240102030405";
const WIDTH: u32 = 16;
const HEIGHT: u32 = 8;

fn test_config() -> CameraConfig {
    CameraConfig {
        frame_rate: 1000,
        modes: vec![
            ModeSpec::new(0, "sr-native", WIDTH, HEIGHT).with_raw_subelements(2),
            ModeSpec::new(4, "pcm-native", WIDTH, HEIGHT).ir_only(),
        ],
        ..CameraConfig::default()
    }
}

fn options(folder: &Path, kind: FrameKind, frames: u32) -> SessionOptions {
    SessionOptions {
        folder: folder.to_path_buf(),
        frames,
        mode: ModeSelector::Name("sr-native".to_string()),
        frame_kind: kind,
        ..SessionOptions::default()
    }
}

fn run(
    camera: &mut SyntheticCamera,
    config: &CameraConfig,
    options: SessionOptions,
) -> Result<SessionOutcome, CaptureError> {
    Session::new(camera, config, options).with_timestamp(TS).run()
}

fn captured(outcome: SessionOutcome) -> CaptureReport {
    match outcome {
        SessionOutcome::Captured(report) => report,
        other => panic!("expected a capture, got {:?}", other),
    }
}

fn bin_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".bin"))
        .collect();
    names.sort();
    names
}

#[test]
fn records_depth_frames_with_sequential_names() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config();
    let mut camera = SyntheticCamera::new("stub://pipeline");

    let report = captured(run(&mut camera, &config, options(dir.path(), FrameKind::Depth, 3)).unwrap());

    assert_eq!(report.frames_captured, 3);
    assert!(report.failures.is_empty());
    assert!(report.fps.is_some());
    assert_eq!(
        bin_files(dir.path()),
        vec![
            format!("depth_frame_{}_00000.bin", TS),
            format!("depth_frame_{}_00001.bin", TS),
            format!("depth_frame_{}_00002.bin", TS),
        ]
    );
    for path in &report.written {
        let len = std::fs::metadata(path).unwrap().len();
        assert_eq!(len, (2 * WIDTH * HEIGHT) as u64);
    }
    assert!(!camera.is_streaming());
}

#[test]
fn confidence_frames_use_four_byte_samples() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config();
    let mut camera = SyntheticCamera::new("stub://pipeline");

    let report = captured(run(&mut camera, &config, options(dir.path(), FrameKind::Conf, 2)).unwrap());

    assert_eq!(report.written.len(), 2);
    let path = output_path(dir.path(), FrameKind::Conf, TS, 1);
    assert_eq!(std::fs::metadata(path).unwrap().len(), (4 * WIDTH * HEIGHT) as u64);
}

#[test]
fn raw_frames_disable_depth_compute() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config();
    let mut camera = SyntheticCamera::new("stub://pipeline");

    let report = captured(run(&mut camera, &config, options(dir.path(), FrameKind::Raw, 1)).unwrap());

    assert!(!camera.depth_compute_enabled());
    assert_eq!(report.written, vec![output_path(dir.path(), FrameKind::Raw, TS, 0)]);
    let len = std::fs::metadata(&report.written[0]).unwrap().len();
    assert_eq!(len, (WIDTH * HEIGHT * 2 * 2) as u64);
}

#[test]
fn disabled_channel_fails_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config
        .controls
        .insert("phaseDepthBits".to_string(), "0".to_string());
    let mut camera = SyntheticCamera::new("stub://pipeline");

    let err = run(&mut camera, &config, options(dir.path(), FrameKind::Depth, 3)).unwrap_err();

    assert!(matches!(err, CaptureError::DataUnavailable(_)));
    assert!(bin_files(dir.path()).is_empty());
    assert!(!camera.is_streaming());
}

#[test]
fn write_failure_does_not_stop_capture() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config();
    let mut camera = SyntheticCamera::new("stub://pipeline");
    let blocked = output_path(dir.path(), FrameKind::Depth, TS, 1);
    std::fs::create_dir(&blocked).unwrap();

    let report = captured(run(&mut camera, &config, options(dir.path(), FrameKind::Depth, 3)).unwrap());

    assert_eq!(report.frames_captured, 3);
    assert_eq!(
        report.written,
        vec![
            output_path(dir.path(), FrameKind::Depth, TS, 0),
            output_path(dir.path(), FrameKind::Depth, TS, 2),
        ]
    );
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].sequence, 1);
    assert!(matches!(report.failures[0].result, Err(CaptureError::Io { .. })));
}

#[test]
fn zero_frames_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config();
    let mut camera = SyntheticCamera::new("stub://pipeline");

    let report = captured(run(&mut camera, &config, options(dir.path(), FrameKind::Depth, 0)).unwrap());

    assert_eq!(report.frames_captured, 0);
    assert!(report.fps.is_none());
    assert!(bin_files(dir.path()).is_empty());
}

#[test]
fn missing_output_folder_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let folder = dir.path().join("nested").join("out");
    let config = test_config();
    let mut camera = SyntheticCamera::new("stub://pipeline");

    let report = captured(run(&mut camera, &config, options(&folder, FrameKind::Ir, 1)).unwrap());

    assert_eq!(report.written.len(), 1);
    assert!(report.written[0].starts_with(&folder));
}

#[test]
fn mode_index_resolves_through_camera() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config();
    let mut camera = SyntheticCamera::new("stub://pipeline");
    let opts = SessionOptions {
        mode: ModeSelector::Id(0),
        ..options(dir.path(), FrameKind::Depth, 1)
    };

    captured(run(&mut camera, &config, opts).unwrap());
    assert_eq!(camera.active_mode(), Some("sr-native"));
}

#[test]
fn invalid_mode_index_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config();
    let mut camera = SyntheticCamera::new("stub://pipeline");
    let opts = SessionOptions {
        mode: ModeSelector::Id(99),
        ..options(dir.path(), FrameKind::Depth, 1)
    };

    let err = run(&mut camera, &config, opts).unwrap_err();
    assert!(matches!(err, CaptureError::Config(_)));
    assert!(!camera.is_streaming());
}

#[test]
fn passive_mode_records_ir() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config();
    let mut camera = SyntheticCamera::new("stub://pipeline");
    let opts = SessionOptions {
        mode: ModeSelector::Id(4),
        ..options(dir.path(), FrameKind::Depth, 2)
    };

    let report = captured(run(&mut camera, &config, opts).unwrap());

    assert_eq!(
        bin_files(dir.path()),
        vec![
            format!("ir_frame_{}_00000.bin", TS),
            format!("ir_frame_{}_00001.bin", TS),
        ]
    );
    assert_eq!(report.written.len(), 2);
}

#[test]
fn firmware_update_skips_capture() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("fw_1.2.3.bin");
    std::fs::write(&image, b"firmware").unwrap();
    let config = test_config();
    let mut camera = SyntheticCamera::new("stub://pipeline");
    let opts = SessionOptions {
        firmware: Some(image),
        ..options(dir.path(), FrameKind::Depth, 3)
    };

    let outcome = run(&mut camera, &config, opts).unwrap();

    assert!(matches!(outcome, SessionOutcome::FirmwareUpdated));
    assert_eq!(camera.details().sd_card_image_version, "fw_1.2.3.bin");
    assert_eq!(camera.frames_delivered(), 0);
    assert!(!camera.is_streaming());
}

#[test]
fn empty_firmware_image_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("empty.img");
    std::fs::write(&image, b"").unwrap();
    let config = test_config();
    let mut camera = SyntheticCamera::new("stub://pipeline");
    let opts = SessionOptions {
        firmware: Some(image),
        ..options(dir.path(), FrameKind::Depth, 1)
    };

    let err = run(&mut camera, &config, opts).unwrap_err();
    assert!(matches!(err, CaptureError::Config(_)));
}

#[test]
fn ccb_is_stored_and_failures_are_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config();
    let ccb = dir.path().join("module.ccb");
    let mut camera = SyntheticCamera::new("stub://pipeline");
    let opts = SessionOptions {
        ccb_path: Some(ccb.clone()),
        ..options(dir.path(), FrameKind::Depth, 1)
    };
    captured(run(&mut camera, &config, opts).unwrap());
    assert!(std::fs::read(&ccb).unwrap().starts_with(b"CCB1"));

    let mut camera = SyntheticCamera::new("stub://pipeline");
    let opts = SessionOptions {
        ccb_path: Some(dir.path().join("missing").join("module.ccb")),
        ..options(dir.path(), FrameKind::Depth, 1)
    };
    let report = captured(run(&mut camera, &config, opts).unwrap());
    assert_eq!(report.frames_captured, 1);
}

#[test]
fn request_failure_keeps_earlier_frames() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config.synthetic.fail_after_frames = Some(2);
    let mut camera = SyntheticCamera::new("stub://pipeline");

    let err = run(&mut camera, &config, options(dir.path(), FrameKind::Depth, 4)).unwrap_err();

    assert!(matches!(err, CaptureError::Device { operation: "request_frame", .. }));
    assert_eq!(bin_files(dir.path()).len(), 2);
}

#[test]
fn network_target_without_backend_finds_no_camera() {
    let cameras = discover(&ip_target("10.42.0.1")).unwrap();
    assert!(cameras.is_empty());
}
