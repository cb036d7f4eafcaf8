//! Captured frame representation.
//!
//! A [`Frame`] is one complete still image as produced by a capture strategy.
//! Frames are immutable after creation: the payload is a [`Bytes`] handle, so
//! moving a frame from producer to channel to viewer never copies the image.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Image encoding of a frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameFormat {
    /// JPEG images, produced by the streaming transcoder or the iOS agent.
    Jpeg,
    /// PNG images, produced by the single-shot screenshot command.
    Png,
}

impl FrameFormat {
    /// Returns the MIME type written into each multipart part header.
    pub fn mime_type(self) -> &'static str {
        match self {
            FrameFormat::Jpeg => "image/jpeg",
            FrameFormat::Png => "image/png",
        }
    }
}

/// One complete still image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Bytes,
    format: FrameFormat,
}

impl Frame {
    /// Wraps an encoded image payload.
    pub fn new(data: impl Into<Bytes>, format: FrameFormat) -> Self {
        Self {
            data: data.into(),
            format,
        }
    }

    /// Convenience constructor for a JPEG frame.
    pub fn jpeg(data: impl Into<Bytes>) -> Self {
        Self::new(data, FrameFormat::Jpeg)
    }

    /// Convenience constructor for a PNG frame.
    pub fn png(data: impl Into<Bytes>) -> Self {
        Self::new(data, FrameFormat::Png)
    }

    /// The encoded image bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// The image encoding.
    pub fn format(&self) -> FrameFormat {
        self.format
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` when the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consumes the frame and returns its payload.
    pub fn into_data(self) -> Bytes {
        self.data
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
