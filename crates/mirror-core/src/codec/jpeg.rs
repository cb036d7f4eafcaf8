//! JPEG image splitting for the transcoder output stream.
//!
//! The streaming transcoder writes back-to-back JPEG images to its stdout
//! with no container framing.  Reads from the pipe return arbitrary
//! fixed-size chunks that do not line up with image boundaries, so the
//! splitter accumulates chunks and cuts complete images out by their markers:
//!
//! ```text
//! FF D8 ...................... FF D9 FF D8 ........ FF D9
//! └─ SOI          image 1  EOI ─┘└─ SOI  image 2  EOI ─┘
//! ```
//!
//! Bytes that precede the first start-of-image marker are discarded, which
//! also resynchronises the stream after a truncated image.

use bytes::{Bytes, BytesMut};

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Default cap on a single buffered image before the buffer is discarded.
pub const DEFAULT_MAX_IMAGE_LEN: usize = 8 * 1024 * 1024;

/// Accumulates transcoder output and yields complete JPEG images.
#[derive(Debug)]
pub struct JpegSplitter {
    buf: BytesMut,
    /// Offset from which to resume the end-of-image search.
    scan_from: usize,
    max_image_len: usize,
}

impl Default for JpegSplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl JpegSplitter {
    pub fn new() -> Self {
        Self::with_max_image_len(DEFAULT_MAX_IMAGE_LEN)
    }

    /// Creates a splitter that drops any partial image larger than `max_image_len`.
    pub fn with_max_image_len(max_image_len: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            scan_from: 0,
            max_image_len,
        }
    }

    /// Appends one chunk read from the transcoder.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Number of buffered bytes not yet returned as an image.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Returns the next complete image, if one is buffered.
    pub fn next_image(&mut self) -> Option<Bytes> {
        loop {
            // Align the buffer on a start-of-image marker.
            match find(&self.buf, &SOI, 0) {
                Some(0) => {}
                Some(start) => {
                    let _ = self.buf.split_to(start);
                    self.scan_from = 0;
                }
                None => {
                    // Keep a trailing 0xFF: it may be the first half of a marker.
                    let keep = usize::from(self.buf.last() == Some(&0xFF));
                    let drop = self.buf.len() - keep;
                    let _ = self.buf.split_to(drop);
                    self.scan_from = 0;
                    return None;
                }
            }

            let from = self.scan_from.max(SOI.len());
            match find(&self.buf, &EOI, from) {
                Some(end) => {
                    self.scan_from = 0;
                    return Some(self.buf.split_to(end + EOI.len()).freeze());
                }
                None => {
                    if self.buf.len() > self.max_image_len {
                        // Oversized or corrupt image: drop its start marker and resync.
                        let _ = self.buf.split_to(SOI.len());
                        self.scan_from = 0;
                        continue;
                    }
                    // Resume one byte early so a marker split across chunks is found.
                    self.scan_from = self.buf.len().saturating_sub(1);
                    return None;
                }
            }
        }
    }
}

fn find(haystack: &[u8], needle: &[u8; 2], from: usize) -> Option<usize> {
    if haystack.len() < from + needle.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
