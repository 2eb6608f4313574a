//! Frame persistence.
//!
//! A `WriteJob` owns one `CaptureBuffer`. `persist` writes it to
//! `<folder>/<frameType>_frame_<timestamp>_<sequence:05>.bin` and drops the
//! buffer when done, success or not. That drop is the only place a captured
//! buffer is released.
//!
//! `FrameWriter` runs jobs on worker threads with a queue depth of one: a new
//! job joins the previous one before it is spawned, so at most one write is in
//! flight while the next frame is captured. Dropping the writer joins the
//! in-flight job.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::{CaptureError, CaptureResult};
use crate::frame::{CaptureBuffer, FrameKind};
use crate::session::SessionParams;

pub fn output_path(folder: &Path, kind: FrameKind, timestamp: &str, sequence: u32) -> PathBuf {
    folder.join(format!("{}_frame_{}_{:05}.bin", kind, timestamp, sequence))
}

/// Write `bytes` to `path`, truncating any existing file.
pub fn write_file(path: &Path, bytes: &[u8]) -> CaptureResult<usize> {
    let mut file = File::create(path).map_err(|e| CaptureError::io(path, e))?;
    file.write_all(bytes).map_err(|e| CaptureError::io(path, e))?;
    file.flush().map_err(|e| CaptureError::io(path, e))?;
    Ok(bytes.len())
}

#[derive(Debug)]
pub struct WriteJob {
    params: Arc<SessionParams>,
    sequence: u32,
    buffer: CaptureBuffer,
}

impl WriteJob {
    pub fn new(params: Arc<SessionParams>, sequence: u32, buffer: CaptureBuffer) -> Self {
        Self {
            params,
            sequence,
            buffer,
        }
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn path(&self) -> PathBuf {
        output_path(
            &self.params.folder,
            self.params.frame_kind,
            &self.params.timestamp,
            self.sequence,
        )
    }
}

#[derive(Debug)]
pub struct WriteOutcome {
    pub sequence: u32,
    pub path: PathBuf,
    /// Bytes written.
    pub result: CaptureResult<usize>,
}

impl WriteOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Write one job to disk and release its buffer.
pub fn persist(job: WriteJob) -> WriteOutcome {
    let path = job.path();
    let WriteJob {
        sequence, buffer, ..
    } = job;
    let result = write_file(&path, buffer.as_bytes());
    drop(buffer);

    match &result {
        Ok(bytes) => log::debug!("frame {:05}: wrote {} bytes to {}", sequence, bytes, path.display()),
        Err(err) => log::error!("frame {:05}: {}", sequence, err),
    }
    WriteOutcome {
        sequence,
        path,
        result,
    }
}

#[derive(Debug, Default)]
pub struct FrameWriter {
    in_flight: Option<JoinHandle<WriteOutcome>>,
    outcomes: Vec<WriteOutcome>,
}

impl FrameWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch a job to a worker thread. Blocks only while the previous job
    /// is still writing.
    pub fn submit(&mut self, job: WriteJob) {
        self.wait_in_flight();

        let sequence = job.sequence();
        let path = job.path();
        let spawned = thread::Builder::new()
            .name(format!("frame-writer-{:05}", sequence))
            .spawn(move || persist(job));
        match spawned {
            Ok(handle) => self.in_flight = Some(handle),
            Err(err) => {
                log::error!("frame {:05}: could not start writer thread: {}", sequence, err);
                self.outcomes.push(WriteOutcome {
                    sequence,
                    path: path.clone(),
                    result: Err(CaptureError::io(path, err)),
                });
            }
        }
    }

    /// Dispatch a job and wait for it to finish.
    pub fn submit_and_wait(&mut self, job: WriteJob) {
        self.submit(job);
        self.wait_in_flight();
    }

    pub fn wait_in_flight(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            match handle.join() {
                Ok(outcome) => self.outcomes.push(outcome),
                Err(_) => log::error!("frame writer thread panicked"),
            }
        }
    }

    pub fn has_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn outcomes(&self) -> &[WriteOutcome] {
        &self.outcomes
    }

    /// Join the in-flight job and return every outcome in dispatch order.
    pub fn finish(mut self) -> Vec<WriteOutcome> {
        self.wait_in_flight();
        std::mem::take(&mut self.outcomes)
    }
}

impl Drop for FrameWriter {
    fn drop(&mut self) {
        self.wait_in_flight();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, FrameDataDetails, FrameDetails};

    fn make_buffer(len: usize) -> CaptureBuffer {
        let mut frame = Frame::new(FrameDetails {
            width: len as u32,
            height: 1,
        });
        let details = FrameDataDetails {
            width: len as u32,
            height: 1,
            subelements_per_element: 1,
            subelement_size: 2,
        };
        frame.set_data(FrameKind::Depth, details, Some(vec![0xAB; len * 2]));
        CaptureBuffer::copy_out(&frame, FrameKind::Depth).unwrap()
    }

    fn params(folder: &Path) -> Arc<SessionParams> {
        Arc::new(SessionParams::new(
            folder,
            FrameKind::Depth,
            "sr-native",
            3,
            "20240102030405",
        ))
    }

    #[test]
    fn output_path_pads_sequence() {
        let path = output_path(Path::new("out"), FrameKind::Conf, "20240102030405", 7);
        assert_eq!(path, Path::new("out").join("conf_frame_20240102030405_00007.bin"));
    }

    #[test]
    fn persist_writes_whole_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = persist(WriteJob::new(params(dir.path()), 0, make_buffer(6)));
        assert_eq!(outcome.result.as_ref().unwrap(), &12);
        let written = std::fs::read(&outcome.path).unwrap();
        assert_eq!(written, vec![0xAB; 12]);
    }

    #[test]
    fn persist_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let params = params(dir.path());
        let path = output_path(dir.path(), FrameKind::Depth, &params.timestamp, 1);
        std::fs::write(&path, vec![0u8; 100]).unwrap();
        let outcome = persist(WriteJob::new(params, 1, make_buffer(2)));
        assert!(outcome.is_ok());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 4);
    }

    #[test]
    fn persist_reports_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let outcome = persist(WriteJob::new(params(&missing), 0, make_buffer(2)));
        assert!(matches!(outcome.result, Err(CaptureError::Io { .. })));
    }

    #[test]
    fn writer_keeps_at_most_one_job_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let params = params(dir.path());
        let mut writer = FrameWriter::new();
        writer.submit(WriteJob::new(params.clone(), 0, make_buffer(4)));
        assert!(writer.has_in_flight());
        writer.submit(WriteJob::new(params.clone(), 1, make_buffer(4)));
        // Submitting job 1 joined job 0.
        assert_eq!(writer.outcomes().len(), 1);
        writer.submit_and_wait(WriteJob::new(params, 2, make_buffer(4)));
        assert!(!writer.has_in_flight());
        let outcomes = writer.finish();
        let sequences: Vec<u32> = outcomes.iter().map(|o| o.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
        assert!(outcomes.iter().all(WriteOutcome::is_ok));
    }

    #[test]
    fn dropping_writer_joins_in_flight_job() {
        let dir = tempfile::tempdir().unwrap();
        let params = params(dir.path());
        let path = output_path(dir.path(), FrameKind::Depth, &params.timestamp, 0);
        {
            let mut writer = FrameWriter::new();
            writer.submit(WriteJob::new(params, 0, make_buffer(1024)));
        }
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 2048);
    }
}
