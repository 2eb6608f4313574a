//! ToF frame recorder
//!
//! Records frames from a time-of-flight depth camera to disk as raw binary
//! dumps, one file per frame.
//!
//! # Pipeline
//!
//! 1. The session controller brings a discovered camera up: initialize,
//!    resolve the sensor mode, fix up the frame type, start streaming.
//! 2. The capture loop requests frames synchronously. Each frame is borrowed
//!    from the camera and only one sub-buffer is copied out of it.
//! 3. The copy is handed to a writer thread. At most one write is in flight
//!    while the next frame is captured; the last write is joined before the
//!    frame rate is measured.
//!
//! # Module Structure
//!
//! - `camera`: camera contract, discovery and the synthetic `stub://` camera
//! - `frame`: frames, frame-type tags and the owned `CaptureBuffer`
//! - `writer`: persistence task and the depth-1 `FrameWriter`
//! - `capture`: the capture loop
//! - `session`: session controller used by `data_collect`
//! - `snapshot`: first-frame dump used by `first_frame`
//! - `config`: camera configuration file and environment overrides
//! - `error`: `CaptureError` taxonomy
//! - `ui`: terminal progress output

pub mod camera;
pub mod capture;
pub mod config;
pub mod error;
pub mod frame;
pub mod session;
pub mod snapshot;
pub mod ui;
pub mod writer;

pub use camera::{discover, Camera, CameraDetails, SyntheticCamera};
pub use capture::{CaptureLoop, CaptureReport, CaptureState};
pub use config::CameraConfig;
pub use error::{CaptureError, CaptureResult};
pub use frame::{CaptureBuffer, Frame, FrameKind};
pub use session::{ModeSelector, Session, SessionOptions, SessionOutcome, SessionParams};
pub use snapshot::{run_snapshot, SnapshotMode, SnapshotReport};
pub use writer::{FrameWriter, WriteJob, WriteOutcome};
