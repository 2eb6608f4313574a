//! Frame data and the copy-out boundary.
//!
//! - `Frame`: one capture event as held by the camera. Sub-buffers are borrowed
//!   from the camera and are only valid until the next `request_frame`.
//! - `FrameKind`: the frame-type tag naming a sub-buffer.
//! - `CaptureBuffer`: owned copy of one sub-buffer, handed to the writer.
//!
//! The ONLY path from a borrowed frame to data that can cross a thread is
//! `CaptureBuffer::copy_out()`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{CaptureError, CaptureResult};

// ----------------------------------------------------------------------------
// FrameKind: frame-type tag
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FrameKind {
    Raw,
    Depth,
    Ir,
    Conf,
}

impl FrameKind {
    pub const ALL: [FrameKind; 4] = [
        FrameKind::Raw,
        FrameKind::Depth,
        FrameKind::Ir,
        FrameKind::Conf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FrameKind::Raw => "raw",
            FrameKind::Depth => "depth",
            FrameKind::Ir => "ir",
            FrameKind::Conf => "conf",
        }
    }

    /// Bytes per sample. Confidence is stored as 32-bit float.
    pub fn element_size(&self) -> usize {
        match self {
            FrameKind::Raw | FrameKind::Depth | FrameKind::Ir => 2,
            FrameKind::Conf => 4,
        }
    }

    /// Device control reporting the bit depth of this channel. Zero bits means
    /// the channel was disabled in the device configuration.
    pub fn bit_depth_control(&self) -> Option<&'static str> {
        match self {
            FrameKind::Raw => None,
            FrameKind::Depth => Some("phaseDepthBits"),
            FrameKind::Ir => Some("abBits"),
            FrameKind::Conf => Some("confidenceBits"),
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrameKind {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "raw" => Ok(FrameKind::Raw),
            "depth" => Ok(FrameKind::Depth),
            "ir" => Ok(FrameKind::Ir),
            "conf" => Ok(FrameKind::Conf),
            other => Err(CaptureError::config(format!(
                "unknown frame type '{}' (possible values: raw, depth, ir, conf)",
                other
            ))),
        }
    }
}

// ----------------------------------------------------------------------------
// Frame: camera-owned capture event
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameDetails {
    pub width: u32,
    pub height: u32,
}

/// Layout of a single sub-buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameDataDetails {
    pub width: u32,
    pub height: u32,
    pub subelements_per_element: u32,
    pub subelement_size: u32,
}

impl FrameDataDetails {
    pub fn byte_len(&self) -> usize {
        self.width as usize
            * self.height as usize
            * self.subelements_per_element as usize
            * self.subelement_size as usize
    }
}

#[derive(Debug)]
struct SubBuffer {
    details: FrameDataDetails,
    /// `None` when the channel is disabled on the device.
    data: Option<Vec<u8>>,
}

/// One capture event. Owned by the camera, lent to callers by
/// `Camera::request_frame`.
///
/// There is no `Clone`: a frame is refilled in place by the camera on every
/// request, which is why callers only ever see `&Frame`.
#[derive(Debug, Default)]
pub struct Frame {
    details: FrameDetails,
    buffers: BTreeMap<FrameKind, SubBuffer>,
}

impl Frame {
    pub fn new(details: FrameDetails) -> Self {
        Self {
            details,
            buffers: BTreeMap::new(),
        }
    }

    pub fn details(&self) -> FrameDetails {
        self.details
    }

    /// Reset to an empty frame with new dimensions. Called by camera backends
    /// before refilling.
    pub fn reset(&mut self, details: FrameDetails) {
        self.details = details;
        self.buffers.clear();
    }

    pub fn set_data(&mut self, kind: FrameKind, details: FrameDataDetails, data: Option<Vec<u8>>) {
        self.buffers.insert(kind, SubBuffer { details, data });
    }

    /// Borrowed sub-buffer bytes, `None` if the channel is absent or disabled.
    pub fn data(&self, kind: FrameKind) -> Option<&[u8]> {
        self.buffers
            .get(&kind)
            .and_then(|buf| buf.data.as_deref())
    }

    pub fn data_details(&self, kind: FrameKind) -> Option<FrameDataDetails> {
        self.buffers.get(&kind).map(|buf| buf.details)
    }
}

// ----------------------------------------------------------------------------
// CaptureBuffer: owned copy handed to the writer
// ----------------------------------------------------------------------------

/// Owned copy of one sub-buffer.
///
/// Not `Clone`. It is moved into a `WriteJob` and released by the writer when
/// the file is done, so the capture loop cannot touch it after hand-off:
///
/// ```compile_fail
/// use std::sync::Arc;
/// use tof_recorder::frame::{CaptureBuffer, Frame, FrameDataDetails, FrameDetails, FrameKind};
/// use tof_recorder::writer::{FrameWriter, WriteJob};
/// use tof_recorder::SessionParams;
///
/// let mut frame = Frame::new(FrameDetails { width: 2, height: 1 });
/// let details = FrameDataDetails { width: 2, height: 1, subelements_per_element: 1, subelement_size: 2 };
/// frame.set_data(FrameKind::Depth, details, Some(vec![0u8; 4]));
/// let buffer = CaptureBuffer::copy_out(&frame, FrameKind::Depth).unwrap();
/// let params = Arc::new(SessionParams::new("out", FrameKind::Depth, "sr-native", 1, "20240101000000"));
/// let mut writer = FrameWriter::new();
/// writer.submit(WriteJob::new(params, 0, buffer));
/// let _ = buffer.len();
/// ```
#[derive(Debug)]
pub struct CaptureBuffer {
    data: Vec<u8>,
}

impl CaptureBuffer {
    /// Copy the `kind` sub-buffer out of a borrowed frame.
    ///
    /// Size comes from frame metadata: the raw channel uses its own data
    /// details, the processed channels use the frame dimensions times the
    /// element size of the kind.
    pub fn copy_out(frame: &Frame, kind: FrameKind) -> CaptureResult<Self> {
        let size = expected_size(frame, kind)?;
        if size == 0 {
            return Err(CaptureError::data_unavailable(format!(
                "{} buffer has zero size",
                kind
            )));
        }
        let data = frame.data(kind).ok_or_else(|| {
            CaptureError::data_unavailable(format!("no {} data allocated in frame", kind))
        })?;
        if data.len() < size {
            return Err(CaptureError::data_unavailable(format!(
                "{} buffer holds {} bytes, expected {}",
                kind,
                data.len(),
                size
            )));
        }
        Ok(Self {
            data: data[..size].to_vec(),
        })
    }

    /// Copy a fixed number of bytes regardless of metadata. Used when the byte
    /// count is dictated by the sensor mode rather than the frame.
    pub fn copy_prefix(frame: &Frame, kind: FrameKind, size: usize) -> CaptureResult<Self> {
        let data = frame.data(kind).ok_or_else(|| {
            CaptureError::data_unavailable(format!("no {} data allocated in frame", kind))
        })?;
        if size == 0 || data.len() < size {
            return Err(CaptureError::data_unavailable(format!(
                "{} buffer holds {} bytes, expected {}",
                kind,
                data.len(),
                size
            )));
        }
        Ok(Self {
            data: data[..size].to_vec(),
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Byte size of the `kind` sub-buffer according to frame metadata.
pub fn expected_size(frame: &Frame, kind: FrameKind) -> CaptureResult<usize> {
    match kind {
        FrameKind::Raw => frame
            .data_details(FrameKind::Raw)
            .map(|details| details.byte_len())
            .ok_or_else(|| CaptureError::data_unavailable("frame has no raw data details")),
        _ => {
            let details = frame.details();
            Ok(details.width as usize * details.height as usize * kind.element_size())
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_frame(width: u32, height: u32) -> Frame {
        let mut frame = Frame::new(FrameDetails { width, height });
        let raw = FrameDataDetails {
            width,
            height,
            subelements_per_element: 1,
            subelement_size: 2,
        };
        let pixels = (width * height) as usize;
        frame.set_data(FrameKind::Raw, raw, Some(vec![1u8; pixels * 2]));
        frame.set_data(FrameKind::Depth, raw, Some(vec![2u8; pixels * 2]));
        let conf = FrameDataDetails {
            subelement_size: 4,
            ..raw
        };
        frame.set_data(FrameKind::Conf, conf, Some(vec![3u8; pixels * 4]));
        frame.set_data(FrameKind::Ir, raw, None);
        frame
    }

    #[test]
    fn parses_known_frame_types() {
        for kind in FrameKind::ALL {
            assert_eq!(kind.as_str().parse::<FrameKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_frame_type_is_config_error() {
        let err = "xyz".parse::<FrameKind>().unwrap_err();
        assert!(matches!(err, CaptureError::Config(_)));
    }

    #[test]
    fn copy_out_sizes_follow_element_size() {
        let frame = make_frame(4, 3);
        let depth = CaptureBuffer::copy_out(&frame, FrameKind::Depth).unwrap();
        assert_eq!(depth.len(), 4 * 3 * 2);
        let conf = CaptureBuffer::copy_out(&frame, FrameKind::Conf).unwrap();
        assert_eq!(conf.len(), 4 * 3 * 4);
        let raw = CaptureBuffer::copy_out(&frame, FrameKind::Raw).unwrap();
        assert_eq!(raw.len(), 4 * 3 * 2);
        assert!(raw.as_bytes().iter().all(|b| *b == 1));
    }

    #[test]
    fn disabled_channel_is_data_unavailable() {
        let frame = make_frame(4, 3);
        let err = CaptureBuffer::copy_out(&frame, FrameKind::Ir).unwrap_err();
        assert!(matches!(err, CaptureError::DataUnavailable(_)));
    }

    #[test]
    fn zero_sized_frame_is_data_unavailable() {
        let frame = make_frame(0, 3);
        let err = CaptureBuffer::copy_out(&frame, FrameKind::Depth).unwrap_err();
        assert!(matches!(err, CaptureError::DataUnavailable(_)));
    }

    #[test]
    fn short_buffer_is_data_unavailable() {
        let mut frame = make_frame(4, 3);
        let details = frame.data_details(FrameKind::Depth).unwrap();
        frame.set_data(FrameKind::Depth, details, Some(vec![0u8; 5]));
        let err = CaptureBuffer::copy_out(&frame, FrameKind::Depth).unwrap_err();
        assert!(matches!(err, CaptureError::DataUnavailable(_)));
    }

    #[test]
    fn copy_prefix_takes_requested_bytes() {
        let frame = make_frame(4, 3);
        let raw = CaptureBuffer::copy_prefix(&frame, FrameKind::Raw, 10).unwrap();
        assert_eq!(raw.len(), 10);
        assert!(CaptureBuffer::copy_prefix(&frame, FrameKind::Raw, 1000).is_err());
    }
}
