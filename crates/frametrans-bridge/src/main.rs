//! frametrans-send: entry point.
//!
//! Opens a transport by name, connects it to a receiver, and pushes a moving
//! test pattern through it until the frame count is reached or Ctrl+C is
//! pressed.  Useful for checking that a transport module loads and for
//! measuring its throughput.
//!
//! # Usage
//!
//! ```text
//! frametrans-send [OPTIONS]
//!
//! Options:
//!   --config    <PATH>    Config file [env: FRAMETRANS_CONFIG]
//!   --transport <NAME>    Transport name [default: dummy]
//!   --receiver  <HOST>    Receiver host name or address
//!   --port      <PORT>    Receiver port
//!   --frames    <N>       Frames to send, 0 = until Ctrl+C [default: 0]
//!   --width     <PIXELS>  Frame width
//!   --height    <PIXELS>  Frame height
//!   --format    <FORMAT>  rgb, rgba, bgr, bgra, abgr or argb
//!   --stereo              Request stereo frames
//!   --sync                Wait for each frame to be delivered
//!   --no-connect          Skip connecting to a receiver
//!   --profile             Log throughput every profiling interval
//!   --save-config         Write the effective configuration and exit
//! ```
//!
//! Settings are layered: built-in defaults, then the config file, then the
//! `FRAMETRANS_TRANSPORT` / `FRAMETRANS_PROFILE` environment variables, then
//! the command line.
//!
//! The log level comes from `RUST_LOG` when set, else from `log_level` in the
//! config file.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use frametrans_bridge::application::frame_pump::{FramePump, PumpStats};
use frametrans_bridge::infrastructure::config::{
    config_file_path, load_config_from, save_config_to, AppConfig,
};
use frametrans_bridge::infrastructure::interception::HostInterception;
use frametrans_bridge::infrastructure::plugin_loader::TransportResolver;
use frametrans_bridge::infrastructure::profiler::Profiler;
use frametrans_bridge::{BridgeContext, TransportBridge};
use frametrans_core::{DisplayHandle, PixelFormat, WindowHandle};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Send test frames through a FrameTrans transport.
#[derive(Debug, Parser)]
#[command(
    name = "frametrans-send",
    about = "Push test frames through a run-time selected FrameTrans transport",
    version
)]
struct Cli {
    /// Configuration file.  Defaults to the platform config path.
    #[arg(long, env = "FRAMETRANS_CONFIG")]
    config: Option<PathBuf>,

    /// Transport name: a built-in back-end or a `frametrans_<name>` module.
    #[arg(long)]
    transport: Option<String>,

    /// Receiver host name or address.
    #[arg(long)]
    receiver: Option<String>,

    /// Receiver port.
    #[arg(long)]
    port: Option<u16>,

    /// Number of frames to send; 0 sends until Ctrl+C.
    #[arg(long, default_value_t = 0)]
    frames: u64,

    /// Frame width in pixels.
    #[arg(long)]
    width: Option<i32>,

    /// Frame height in pixels.
    #[arg(long)]
    height: Option<i32>,

    /// Pixel format.
    #[arg(long)]
    format: Option<PixelFormat>,

    /// Request stereo (left + right eye) frames.
    #[arg(long)]
    stereo: bool,

    /// Block until each frame has been delivered.
    #[arg(long)]
    sync: bool,

    /// Do not connect to a receiver before sending.
    #[arg(long)]
    no_connect: bool,

    /// Log throughput statistics.
    #[arg(long)]
    profile: bool,

    /// Write the effective configuration to the config file and exit.
    #[arg(long)]
    save_config: bool,
}

impl Cli {
    /// Layers the command-line options over `config`.
    fn apply(&self, config: &mut AppConfig) {
        if let Some(name) = &self.transport {
            config.transport.name = name.clone();
        }
        if let Some(receiver) = &self.receiver {
            config.transport.receiver = receiver.clone();
        }
        if let Some(port) = self.port {
            config.transport.port = port;
        }
        if let Some(width) = self.width {
            config.frame.width = width;
        }
        if let Some(height) = self.height {
            config.frame.height = height;
        }
        if let Some(format) = self.format {
            config.frame.format = format;
        }
        if self.stereo {
            config.frame.stereo = true;
        }
        if self.profile {
            config.profile.enabled = true;
        }
    }

    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => config_file_path().context("cannot locate the config file"),
        }
    }
}

/// What the frame loop does besides pumping.
#[derive(Debug, Clone, Copy)]
struct RunOptions {
    frames: u64,
    sync: bool,
    connect: bool,
}

/// Opens the configured transport and pumps frames until `frames` have been
/// sent or `running` is cleared.  Blocking.
fn run_sender(
    config: &AppConfig,
    options: RunOptions,
    running: &AtomicBool,
) -> anyhow::Result<PumpStats> {
    let resolver = Arc::new(TransportResolver::with_plugin_dirs(
        config.transport.plugin_dirs.clone(),
    ));
    let builtins = resolver.builtin_names().join(", ");
    let profiler = Arc::new(Profiler::from_config("Send", &config.profile));
    if profiler.is_enabled() {
        info!(
            interval_secs = config.profile.interval_secs,
            "throughput profiling enabled"
        );
    }
    let ctx = BridgeContext::new(resolver, Arc::new(HostInterception::new()))
        .with_params(config.encoding.to_params(config.transport.port))
        .with_telemetry(profiler);

    let name = &config.transport.name;
    let bridge = TransportBridge::open(DisplayHandle::null(), WindowHandle(0), name, &ctx)
        .with_context(|| {
            format!("failed to open transport '{name}' (built-in transports: {builtins})")
        })?;

    if options.connect {
        let (receiver, port) = (&config.transport.receiver, config.transport.port);
        bridge
            .connect(receiver, i32::from(port))
            .with_context(|| format!("failed to connect to {receiver}:{port}"))?;
    }

    let mut pump = FramePump::new(&bridge, config.frame.to_spec())
        .spoil(config.encoding.spoil)
        .sync(options.sync);
    while running.load(Ordering::Relaxed) && (options.frames == 0 || pump.stats().sent < options.frames)
    {
        pump.pump()?;
    }
    let stats = pump.stats();

    bridge.destroy()?;
    Ok(stats)
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config_path()?;
    let mut config = load_config_from(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    config.apply_env_overrides(|key| std::env::var(key).ok());
    cli.apply(&mut config);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    if cli.save_config {
        save_config_to(&config, &config_path)?;
        info!("configuration written to {}", config_path.display());
        return Ok(());
    }

    info!(
        "frametrans-send starting, transport={} receiver={}:{}",
        config.transport.name, config.transport.receiver, config.transport.port
    );

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, stopping after the current frame");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    // ── Frame loop ────────────────────────────────────────────────────────────
    //
    // Transport calls block, so the loop runs on the blocking pool.
    let options = RunOptions {
        frames: cli.frames,
        sync: cli.sync,
        connect: !cli.no_connect,
    };
    let stats = tokio::task::spawn_blocking(move || run_sender(&config, options, &running))
        .await
        .context("frame loop panicked")??;

    if stats.spoiled > 0 {
        warn!("{} frames spoiled while the transport was busy", stats.spoiled);
    }
    info!("frametrans-send stopped after {} frames", stats.sent);
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
