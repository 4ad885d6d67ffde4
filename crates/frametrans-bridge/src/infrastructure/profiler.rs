//! Frame throughput profiler.
//!
//! Measures the time between frame acquisition (`begin_frame`) and delivery
//! (`end_frame`) and, once more than one interval of frame time has
//! accumulated, logs a line like:
//!
//! ```text
//! Send - 61.44 Mpixels/sec - 200.00 frames/sec - 1474.56 Mbits/sec
//! ```
//!
//! Totals are reset after each report.  A disabled profiler does nothing.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::info;

use crate::application::bridge::TelemetrySink;
use crate::infrastructure::config::ProfileConfig;

/// Rates over one reporting interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Report {
    pub mpixels_per_sec: f64,
    pub frames_per_sec: f64,
    pub mbits_per_sec: f64,
}

#[derive(Debug, Default)]
struct Totals {
    started: Option<Instant>,
    elapsed: Duration,
    mpixels: f64,
    mbytes: f64,
    frames: f64,
}

/// [`TelemetrySink`] that periodically logs throughput.
#[derive(Debug)]
pub struct Profiler {
    name: String,
    interval: Duration,
    enabled: bool,
    totals: Mutex<Totals>,
}

impl Profiler {
    pub fn new(name: impl Into<String>, interval: Duration, enabled: bool) -> Self {
        Self {
            name: name.into(),
            interval,
            enabled,
            totals: Mutex::new(Totals::default()),
        }
    }

    /// Builds a profiler from the `[profile]` config section.  A non-positive
    /// or non-finite interval falls back to two seconds.
    pub fn from_config(name: impl Into<String>, config: &ProfileConfig) -> Self {
        let interval = Duration::try_from_secs_f64(config.interval_secs)
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or(Duration::from_secs(2));
        Self::new(name, interval, config.enabled)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Adds one frame's worth of totals; returns the report when the interval
    /// is exceeded.
    fn record(&self, elapsed: Option<Duration>, pixels: u64, bytes: u64, frames: f64) -> Option<Report> {
        let mut totals = self.totals.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(elapsed) = elapsed {
            totals.elapsed += elapsed;
            totals.mpixels += pixels as f64 / 1_000_000.0;
            totals.mbytes += bytes as f64 / 1_000_000.0;
            totals.frames += frames;
        }
        if totals.elapsed <= self.interval {
            return None;
        }

        let secs = totals.elapsed.as_secs_f64();
        let report = Report {
            mpixels_per_sec: totals.mpixels / secs,
            frames_per_sec: totals.frames / secs,
            mbits_per_sec: totals.mbytes * 8.0 / secs,
        };
        *totals = Totals::default();
        Some(report)
    }
}

impl TelemetrySink for Profiler {
    fn begin_frame(&self) {
        if !self.enabled {
            return;
        }
        self.totals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .started = Some(Instant::now());
    }

    fn end_frame(&self, pixels: u64, bytes: u64, frames: f64) {
        if !self.enabled {
            return;
        }
        let elapsed = self
            .totals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .started
            .take()
            .map(|start| start.elapsed());

        if let Some(report) = self.record(elapsed, pixels, bytes, frames) {
            info!(
                "{} - {:.2} Mpixels/sec - {:.2} frames/sec - {:.2} Mbits/sec",
                self.name, report.mpixels_per_sec, report.frames_per_sec, report.mbits_per_sec
            );
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
