//! Domain types with no I/O dependencies.
//!
//! - **`frame`**    – One captured still image and its MIME type.
//! - **`stream`**   – Capture mode and per-device stream state.
//! - **`geometry`** – Logical screen dimensions and tap coordinate conversion.

pub mod frame;
pub mod geometry;
pub mod stream;
