//! Byte-level codecs for the capture and viewer paths.
//!
//! - **`jpeg`**      – Splits a transcoder's continuous output into images.
//! - **`multipart`** – Writes `multipart/x-mixed-replace` parts for viewers.

pub mod jpeg;
pub mod multipart;
