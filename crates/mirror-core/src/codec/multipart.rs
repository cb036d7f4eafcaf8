//! `multipart/x-mixed-replace` part encoding for the viewer stream.
//!
//! Browsers render a `multipart/x-mixed-replace` response inside an `<img>`
//! element by replacing the displayed image with each new part.  Every part
//! carries its own `Content-Type`, so a stream may switch from JPEG to PNG
//! when a link is downgraded without the viewer reconnecting.
//!
//! Wire layout of one part:
//!
//! ```text
//! --frame\r\n
//! Content-Type: image/jpeg\r\n
//! Content-Length: 5123\r\n
//! \r\n
//! <5123 image bytes>\r\n
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::domain::frame::Frame;

/// Fixed boundary token separating parts.
pub const BOUNDARY: &str = "frame";

/// `Content-Type` of the whole viewer response.
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Encodes one frame as a complete multipart part (header, body, trailing CRLF).
pub fn encode_part(frame: &Frame) -> Bytes {
    let header = format!(
        "--{BOUNDARY}\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
        frame.format().mime_type(),
        frame.len()
    );
    let mut out = BytesMut::with_capacity(header.len() + frame.len() + 2);
    out.put_slice(header.as_bytes());
    out.put_slice(frame.data());
    out.put_slice(b"\r\n");
    out.freeze()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
