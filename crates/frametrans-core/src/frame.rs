//! Pixel formats and the frame descriptor exchanged with transport back-ends.
//!
//! # Who owns a frame? (for beginners)
//!
//! The *back-end* allocates every frame buffer.  The host asks for one with
//! `get_frame`, writes pixels into it, and hands it back with `send_frame`.
//! Between those two calls the host only *borrows* the buffer; there is no
//! free/release call.  The back-end decides whether to reuse the buffer for
//! the next frame or reclaim it.
//!
//! [`RawFrame`] is the C-compatible layout of that descriptor.  It is shared
//! verbatim with dynamically loaded modules, so its field order is part of
//! the module ABI and must not change.

use std::ffi::c_void;
use std::os::raw::c_int;
use std::ptr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a pixel format name is not recognised.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown pixel format '{0}' (expected one of rgb, rgba, bgr, bgra, abgr, argb)")]
pub struct ParseFormatError(pub String);

/// Pixel layouts a back-end may be asked to allocate.
///
/// The discriminants are the integer codes used on the module ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum PixelFormat {
    Rgb = 0,
    Rgba = 1,
    Bgr = 2,
    Bgra = 3,
    Abgr = 4,
    Argb = 5,
}

impl PixelFormat {
    /// Every format, in ABI code order.
    pub const ALL: [PixelFormat; 6] = [
        PixelFormat::Rgb,
        PixelFormat::Rgba,
        PixelFormat::Bgr,
        PixelFormat::Bgra,
        PixelFormat::Abgr,
        PixelFormat::Argb,
    ];

    /// Bytes occupied by one pixel.
    pub fn pixel_size(self) -> usize {
        match self {
            PixelFormat::Rgb | PixelFormat::Bgr => 3,
            PixelFormat::Rgba | PixelFormat::Bgra | PixelFormat::Abgr | PixelFormat::Argb => 4,
        }
    }

    /// The integer code passed across the module ABI.
    pub fn as_raw(self) -> c_int {
        self as c_int
    }

    /// Maps an ABI code back to a format, or `None` for unknown codes.
    pub fn from_raw(code: c_int) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_raw() == code)
    }

    /// Byte offsets of the red, green and blue components within one pixel.
    pub fn rgb_offsets(self) -> (usize, usize, usize) {
        match self {
            PixelFormat::Rgb | PixelFormat::Rgba => (0, 1, 2),
            PixelFormat::Bgr | PixelFormat::Bgra => (2, 1, 0),
            PixelFormat::Abgr => (3, 2, 1),
            PixelFormat::Argb => (1, 2, 3),
        }
    }
}

impl FromStr for PixelFormat {
    type Err = ParseFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rgb" => Ok(PixelFormat::Rgb),
            "rgba" => Ok(PixelFormat::Rgba),
            "bgr" => Ok(PixelFormat::Bgr),
            "bgra" => Ok(PixelFormat::Bgra),
            "abgr" => Ok(PixelFormat::Abgr),
            "argb" => Ok(PixelFormat::Argb),
            _ => Err(ParseFormatError(s.to_string())),
        }
    }
}

/// C-compatible frame descriptor owned by a transport back-end.
///
/// `bits` points at `pitch * height` bytes of left-eye (or mono) pixels.
/// `rbits` points at the right-eye buffer for stereo frames and is null
/// otherwise.  `opaque` is reserved for the back-end's own bookkeeping and is
/// never touched by the bridge.
#[repr(C)]
#[derive(Debug)]
pub struct RawFrame {
    pub bits: *mut u8,
    pub rbits: *mut u8,
    pub format: c_int,
    pub width: c_int,
    pub height: c_int,
    pub pitch: c_int,
    pub opaque: *mut c_void,
}

impl RawFrame {
    /// A descriptor with no backing storage.
    pub fn empty(width: c_int, height: c_int, format: PixelFormat) -> Self {
        Self {
            bits: ptr::null_mut(),
            rbits: ptr::null_mut(),
            format: format.as_raw(),
            width,
            height,
            pitch: 0,
            opaque: ptr::null_mut(),
        }
    }

    /// Size in bytes of one eye's buffer (`pitch * height`), zero for
    /// negative or empty geometry.
    pub fn buffer_len(&self) -> usize {
        if self.pitch <= 0 || self.height <= 0 {
            return 0;
        }
        self.pitch as usize * self.height as usize
    }

    /// `true` when a right-eye buffer is attached.
    pub fn is_stereo(&self) -> bool {
        !self.rbits.is_null()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_size_is_three_for_packed_rgb_formats() {
        assert_eq!(PixelFormat::Rgb.pixel_size(), 3);
        assert_eq!(PixelFormat::Bgr.pixel_size(), 3);
    }

    #[test]
    fn test_pixel_size_is_four_for_formats_with_alpha() {
        for format in [
            PixelFormat::Rgba,
            PixelFormat::Bgra,
            PixelFormat::Abgr,
            PixelFormat::Argb,
        ] {
            assert_eq!(format.pixel_size(), 4, "{format:?}");
        }
    }

    #[test]
    fn test_from_raw_maps_every_abi_code_back_to_its_format() {
        for format in PixelFormat::ALL {
            assert_eq!(PixelFormat::from_raw(format.as_raw()), Some(format));
        }
    }

    #[test]
    fn test_from_raw_rejects_unknown_code() {
        assert_eq!(PixelFormat::from_raw(6), None);
        assert_eq!(PixelFormat::from_raw(-1), None);
    }

    #[test]
    fn test_from_str_is_case_insensitive() {
        assert_eq!("BGRA".parse::<PixelFormat>(), Ok(PixelFormat::Bgra));
        assert_eq!("rgb".parse::<PixelFormat>(), Ok(PixelFormat::Rgb));
    }

    #[test]
    fn test_from_str_unknown_name_reports_the_input() {
        // Act
        let err = "yuv420".parse::<PixelFormat>().unwrap_err();

        // Assert
        assert_eq!(err, ParseFormatError("yuv420".to_string()));
        assert!(err.to_string().contains("yuv420"));
    }

    #[test]
    fn test_rgb_offsets_stay_within_the_pixel() {
        for format in PixelFormat::ALL {
            let (r, g, b) = format.rgb_offsets();
            let size = format.pixel_size();
            assert!(r < size && g < size && b < size, "{format:?}");
        }
    }

    #[test]
    fn test_empty_frame_has_zero_buffer_len_and_is_mono() {
        let frame = RawFrame::empty(64, 64, PixelFormat::Rgb);
        assert_eq!(frame.buffer_len(), 0);
        assert!(!frame.is_stereo());
    }

    #[test]
    fn test_buffer_len_ignores_negative_geometry() {
        // Arrange
        let mut frame = RawFrame::empty(-4, -4, PixelFormat::Rgba);
        frame.pitch = 16;

        // Assert
        assert_eq!(frame.buffer_len(), 0);
    }

    #[test]
    fn test_buffer_len_is_pitch_times_height() {
        let mut frame = RawFrame::empty(10, 5, PixelFormat::Rgb);
        frame.pitch = 32;
        assert_eq!(frame.buffer_len(), 160);
    }
}
