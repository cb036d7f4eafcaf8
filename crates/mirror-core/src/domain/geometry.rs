//! Device screen geometry.
//!
//! Viewers send taps as normalized ratios (`0.0..=1.0` on each axis) so they
//! do not need to know the device resolution or how the image is scaled in
//! the browser.  [`DeviceGeometry`] converts them into the coordinate space
//! the device's input command expects.
//!
//! | Platform | Width | Height | Unit            |
//! |----------|-------|--------|-----------------|
//! | Android  | 1080  | 1920   | pixels          |
//! | iOS      | 375   | 812    | logical points  |

use serde::{Deserialize, Serialize};

/// A point in device coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DevicePoint {
    pub x: u32,
    pub y: u32,
}

/// Fixed logical screen dimensions of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceGeometry {
    pub width: u32,
    pub height: u32,
}

impl DeviceGeometry {
    /// Android emulator screen, in pixels.
    pub const ANDROID: DeviceGeometry = DeviceGeometry {
        width: 1080,
        height: 1920,
    };

    /// iOS device screen, in logical points.
    pub const IOS: DeviceGeometry = DeviceGeometry {
        width: 375,
        height: 812,
    };

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Converts normalized ratios into device coordinates.
    ///
    /// Ratios outside `0.0..=1.0` (and NaN) are clamped so a sloppy viewer can
    /// never address a point off the screen.  The result is truncated toward
    /// zero, so `(0.5, 0.5)` on a 1080x1920 screen maps to `(540, 960)`.
    pub fn to_device_point(&self, x_ratio: f64, y_ratio: f64) -> DevicePoint {
        DevicePoint {
            x: scale(x_ratio, self.width),
            y: scale(y_ratio, self.height),
        }
    }
}

fn scale(ratio: f64, extent: u32) -> u32 {
    let ratio = if ratio.is_nan() { 0.0 } else { ratio.clamp(0.0, 1.0) };
    (ratio * f64::from(extent)) as u32
}

// ── Tests ─────────────────────────────────────────────────────────────────────
