//! FramePump: pushes rendered frames through a bridge one tick at a time.
//!
//! Each [`FramePump::pump_with`] call is one frame of the host's render loop:
//!
//! 1. Ask the back-end how many frames it can take (`ready`).
//! 2. If none and spoiling is on, drop this frame; a fresher one follows.
//!    If none and spoiling is off, wait for the queue to drain
//!    (`synchronize`).
//! 3. Borrow a buffer (`get_frame`), let the caller fill it, hand it back
//!    (`send_frame`).
//!
//! Errors are returned as-is; whether to retry or give up is the caller's
//! decision.

use frametrans_core::PixelFormat;
use tracing::trace;

use crate::application::bridge::{BridgeError, Frame, TransportBridge};

/// Geometry of the frames a pump requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSpec {
    pub width: i32,
    pub height: i32,
    pub format: PixelFormat,
    pub stereo: bool,
}

/// Outcome of one pump tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The frame was handed to the back-end.
    Sent,
    /// The back-end was busy and the frame was dropped.
    Spoiled,
}

/// Running totals for one pump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub sent: u64,
    pub spoiled: u64,
}

/// Feeds frames of one [`FrameSpec`] into a bridge.
pub struct FramePump<'b> {
    bridge: &'b TransportBridge,
    spec: FrameSpec,
    spoil: bool,
    sync: bool,
    frame_no: u64,
    stats: PumpStats,
}

impl<'b> FramePump<'b> {
    /// Creates a pump with spoiling enabled and asynchronous sends.
    pub fn new(bridge: &'b TransportBridge, spec: FrameSpec) -> Self {
        Self {
            bridge,
            spec,
            spoil: true,
            sync: false,
            frame_no: 0,
            stats: PumpStats::default(),
        }
    }

    /// Drop frames while the back-end is busy (`true`) or wait for it.
    pub fn spoil(mut self, spoil: bool) -> Self {
        self.spoil = spoil;
        self
    }

    /// Block in `send_frame` until each frame is delivered.
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Totals so far.
    pub fn stats(&self) -> PumpStats {
        self.stats
    }

    /// Runs one tick, painting the built-in moving test pattern.
    ///
    /// # Errors
    ///
    /// Propagates any [`BridgeError`] from the bridge.
    pub fn pump(&mut self) -> Result<Delivery, BridgeError> {
        self.pump_with(fill_test_pattern)
    }

    /// Runs one tick, letting `fill` paint the frame.  `fill` also receives
    /// the sequence number of the frame.
    ///
    /// # Errors
    ///
    /// Propagates any [`BridgeError`] from the bridge.
    pub fn pump_with(
        &mut self,
        fill: impl FnOnce(&mut Frame<'_>, u64),
    ) -> Result<Delivery, BridgeError> {
        if self.bridge.ready()? == 0 {
            if self.spoil {
                self.stats.spoiled += 1;
                trace!(frame = self.frame_no, "back-end busy, frame spoiled");
                return Ok(Delivery::Spoiled);
            }
            self.bridge.synchronize()?;
        }

        let FrameSpec {
            width,
            height,
            format,
            stereo,
        } = self.spec;
        let mut frame = self.bridge.get_frame(width, height, format, stereo)?;
        fill(&mut frame, self.frame_no);
        self.bridge.send_frame(frame, self.sync)?;

        self.frame_no += 1;
        self.stats.sent += 1;
        Ok(Delivery::Sent)
    }
}

/// Paints a gradient that scrolls one pixel per frame.  The right eye of a
/// stereo frame scrolls the opposite way.
pub fn fill_test_pattern(frame: &mut Frame<'_>, frame_no: u64) {
    let Some(format) = frame.format() else {
        return;
    };
    let width = frame.width().max(0) as usize;
    let pitch = frame.pitch().max(0) as usize;
    if pitch == 0 {
        return;
    }

    let shift = frame_no as usize;
    paint(frame.pixels_mut(), pitch, width, format, shift);
    if let Some(right) = frame.right_pixels_mut() {
        paint(right, pitch, width, format, shift.wrapping_neg());
    }
}

fn paint(pixels: &mut [u8], pitch: usize, width: usize, format: PixelFormat, shift: usize) {
    let size = format.pixel_size();
    let (r, g, b) = format.rgb_offsets();
    for (y, row) in pixels.chunks_mut(pitch).enumerate() {
        let columns = width.min(row.len() / size);
        for (x, px) in row[..columns * size].chunks_exact_mut(size).enumerate() {
            px[r] = x.wrapping_add(shift) as u8;
            px[g] = y as u8;
            px[b] = (x ^ y) as u8;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
