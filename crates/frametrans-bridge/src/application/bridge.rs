//! TransportBridge: one resolved back-end bound to one output connection.
//!
//! # Call discipline
//!
//! Every operation follows the same sequence:
//!
//! ```text
//! lock binding ─► suspend interception ─► back-end call ─► restore interception ─► unlock
//! ```
//!
//! The lock is held across the back-end call, so concurrent callers on the
//! same bridge queue up rather than overlap; back-ends are never assumed to
//! be reentrant.  Interception is restored by [`InterceptionGuard`]'s `Drop`,
//! so a failing or panicking back-end never leaves the host's interception
//! state altered.
//!
//! # Lifecycle
//!
//! ```text
//! open ─► (connect) ─► { ready | get_frame | send_frame | synchronize }* ─► destroy
//! ```
//!
//! `destroy` runs at most once against the back-end; later calls are no-ops
//! and every other operation returns [`BridgeError::SessionClosed`].  Dropping
//! the bridge destroys the session first and then releases the module.
//!
//! A [`Frame`] points into back-end storage that lives only as long as the
//! session, so `destroy` is refused with [`BridgeError::FramesOutstanding`]
//! while any frame obtained from the bridge is still held.

use std::fmt;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use frametrans_core::{
    DisplayHandle, InterceptionContext, InterceptionGuard, PixelFormat, RawFrame, SessionHandle,
    TransportParams, TransportPlugin, WindowHandle,
};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Serializes module resolution and `init` across all bridges in the
/// process: the dynamic loader's error state is process-global.
static LOAD_LOCK: Mutex<()> = Mutex::new(());

/// Back-end operation named in [`BridgeError::Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Init,
    Connect,
    GetFrame,
    Ready,
    Synchronize,
    SendFrame,
    Destroy,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Init => "init",
            Operation::Connect => "connect",
            Operation::GetFrame => "get_frame",
            Operation::Ready => "ready",
            Operation::Synchronize => "synchronize",
            Operation::SendFrame => "send_frame",
            Operation::Destroy => "destroy",
        })
    }
}

/// Error type for every bridge operation.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A caller-supplied argument was rejected before reaching the back-end.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The transport module could not be located, or it lacks a required
    /// entry point.  `message` is the loader's diagnostic, verbatim.
    #[error("cannot load transport '{transport}': {message}")]
    PluginLoad { transport: String, message: String },

    /// A back-end call returned its failure sentinel.  `message` is what the
    /// back-end's `last_error` reported.
    #[error("transport '{transport}' {operation} failed: {message}")]
    Transport {
        transport: String,
        operation: Operation,
        message: String,
    },

    /// The session was already destroyed.
    #[error("transport '{transport}' session is closed")]
    SessionClosed { transport: String },

    /// `destroy` was called while frames obtained with `get_frame` were
    /// still held.  The session stays open.
    #[error("transport '{transport}' still has {count} frame(s) outstanding")]
    FramesOutstanding { transport: String, count: usize },
}

/// Maps a transport name to a ready-to-initialise back-end.
///
/// Implementations live in the infrastructure layer (built-in registry,
/// dynamic-library loader).  A resolver must either return a back-end with
/// all eight operations bound or fail with [`BridgeError::PluginLoad`];
/// it must not call into the back-end.
pub trait ModuleResolver: Send + Sync {
    /// Resolves `transport` to a back-end.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::PluginLoad`] when no module provides the name.
    fn resolve(&self, transport: &str) -> Result<Box<dyn TransportPlugin>, BridgeError>;
}

/// Observer of frame throughput.  Purely informational.
pub trait TelemetrySink: Send + Sync {
    /// A frame buffer was handed to the host.
    fn begin_frame(&self);

    /// A frame was accepted for delivery.
    fn end_frame(&self, pixels: u64, bytes: u64, frames: f64);
}

/// Collaborators and settings shared by the bridges a host opens.
#[derive(Clone)]
pub struct BridgeContext {
    pub resolver: Arc<dyn ModuleResolver>,
    pub interception: Arc<dyn InterceptionContext>,
    /// Configuration block handed to the back-end's `init`.
    pub params: TransportParams,
    pub telemetry: Option<Arc<dyn TelemetrySink>>,
}

impl BridgeContext {
    /// Creates a context with default transport parameters and no telemetry.
    pub fn new(
        resolver: Arc<dyn ModuleResolver>,
        interception: Arc<dyn InterceptionContext>,
    ) -> Self {
        Self {
            resolver,
            interception,
            params: TransportParams::default(),
            telemetry: None,
        }
    }

    /// Replaces the `init` configuration block.
    pub fn with_params(mut self, params: TransportParams) -> Self {
        self.params = params;
        self
    }

    /// Attaches a throughput observer.
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }
}

/// The resolved module and its session.  Guarded by the bridge's lock.
struct Binding {
    plugin: Box<dyn TransportPlugin>,
    /// `None` once destroyed.
    session: Option<SessionHandle>,
    /// Frames handed out and not yet sent or dropped.
    frames_out: usize,
}

/// A back-end frame buffer, borrowed between `get_frame` and `send_frame`.
///
/// The back-end owns the storage.  The frame borrows the bridge and is
/// counted by it until it is consumed by `send_frame` or dropped, so the
/// session cannot be destroyed underneath it.
pub struct Frame<'a> {
    raw: NonNull<RawFrame>,
    bridge: &'a TransportBridge,
}

impl fmt::Debug for Frame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("raw", &self.raw)
            .field("bridge", &self.bridge.id)
            .finish()
    }
}

impl Drop for Frame<'_> {
    fn drop(&mut self) {
        self.bridge.release_frame();
    }
}

impl<'a> Frame<'a> {
    fn desc(&self) -> &RawFrame {
        // SAFETY: the back-end keeps the descriptor valid until the frame is
        // handed back or the session is destroyed.  `send_frame` consumes
        // `self`, and `destroy` is refused while this frame is counted.
        unsafe { self.raw.as_ref() }
    }

    /// Width in pixels, as reported by the back-end.
    pub fn width(&self) -> i32 {
        self.desc().width
    }

    /// Height in pixels, as reported by the back-end.
    pub fn height(&self) -> i32 {
        self.desc().height
    }

    /// Bytes per row.
    pub fn pitch(&self) -> i32 {
        self.desc().pitch
    }

    /// Pixel layout, or `None` when the back-end reports an unknown code.
    pub fn format(&self) -> Option<PixelFormat> {
        PixelFormat::from_raw(self.desc().format)
    }

    /// `true` when a right-eye buffer is attached.
    pub fn is_stereo(&self) -> bool {
        self.desc().is_stereo()
    }

    /// Writable left-eye (or mono) pixels; empty when the back-end attached
    /// no storage.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        let (bits, len) = (self.desc().bits, self.desc().buffer_len());
        if bits.is_null() || len == 0 {
            return &mut [];
        }
        // SAFETY: the back-end allocates `pitch * height` bytes at `bits` and
        // does not touch them while the host holds the frame.
        unsafe { std::slice::from_raw_parts_mut(bits, len) }
    }

    /// Writable right-eye pixels for stereo frames.
    pub fn right_pixels_mut(&mut self) -> Option<&mut [u8]> {
        let (rbits, len) = (self.desc().rbits, self.desc().buffer_len());
        if rbits.is_null() {
            return None;
        }
        // SAFETY: as for `pixels_mut`; a non-null `rbits` has the same size.
        Some(unsafe { std::slice::from_raw_parts_mut(rbits, len) })
    }

    /// The descriptor pointer, exactly as the back-end returned it.
    pub fn as_raw(&self) -> NonNull<RawFrame> {
        self.raw
    }

    /// (pixels, bytes) carried by this frame, both eyes included.
    fn traffic(&self) -> (u64, u64) {
        let desc = self.desc();
        let eyes = if desc.is_stereo() { 2 } else { 1 };
        let pixels = desc.width.max(0) as u64 * desc.height.max(0) as u64;
        (pixels * eyes, desc.buffer_len() as u64 * eyes)
    }
}

/// One back-end module bound to one initialised session.
///
/// `TransportBridge` is `Send + Sync`; share it across threads with `Arc`.
/// All operations take `&self` and are serialized internally.
pub struct TransportBridge {
    id: Uuid,
    transport: String,
    interception: Arc<dyn InterceptionContext>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
    binding: Mutex<Binding>,
}

/// Non-negative status codes are success.
fn status(code: i32) -> Option<i32> {
    (code >= 0).then_some(code)
}

impl TransportBridge {
    /// Resolves `transport`, initialises a session on `display`/`window`, and
    /// returns the bound bridge.
    ///
    /// Nothing is returned unless every step succeeds; on failure the module
    /// is released before this function returns.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::InvalidArgument`] if `transport` is empty.
    /// - [`BridgeError::PluginLoad`] if the module or any entry point is
    ///   missing; the back-end is not called.
    /// - [`BridgeError::Transport`] if the back-end's `init` fails.
    pub fn open(
        display: DisplayHandle,
        window: WindowHandle,
        transport: &str,
        ctx: &BridgeContext,
    ) -> Result<Self, BridgeError> {
        if transport.is_empty() {
            return Err(BridgeError::InvalidArgument(
                "transport name is empty".to_string(),
            ));
        }

        let _load = LOAD_LOCK.lock().unwrap_or_else(PoisonError::into_inner);

        let mut plugin = ctx.resolver.resolve(transport)?;
        debug!(transport, "transport module resolved");

        let init = {
            let _guard = InterceptionGuard::suspend(ctx.interception.as_ref());
            plugin
                .init(display, window, &ctx.params)
                .ok_or_else(|| plugin.last_error())
        };
        let session = init.map_err(|message| {
            warn!(transport, %message, "transport init failed");
            BridgeError::Transport {
                transport: transport.to_string(),
                operation: Operation::Init,
                message,
            }
        })?;

        let id = Uuid::new_v4();
        info!(bridge = %id, transport, "transport session initialised");

        Ok(Self {
            id,
            transport: transport.to_string(),
            interception: Arc::clone(&ctx.interception),
            telemetry: ctx.telemetry.clone(),
            binding: Mutex::new(Binding {
                plugin,
                session: Some(session),
                frames_out: 0,
            }),
        })
    }

    /// Name the bridge was opened with.
    pub fn transport(&self) -> &str {
        &self.transport
    }

    /// Identifier used in this bridge's log lines.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// `true` once the session has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.lock_binding().session.is_none()
    }

    /// Frames obtained with `get_frame` that are still held.
    pub fn frames_outstanding(&self) -> usize {
        self.lock_binding().frames_out
    }

    /// Connects the session to a receiver.
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidArgument`] if `receiver` contains a NUL byte;
    /// [`BridgeError::Transport`] if the back-end refuses or cannot reach the
    /// receiver.  The bridge stays usable either way.
    pub fn connect(&self, receiver: &str, port: i32) -> Result<(), BridgeError> {
        if receiver.contains('\0') {
            return Err(BridgeError::InvalidArgument(
                "receiver address contains a NUL byte".to_string(),
            ));
        }
        self.call(Operation::Connect, |plugin, session| {
            status(plugin.connect(session, receiver, port))
        })?;
        info!(bridge = %self.id, receiver, port, "transport connected");
        Ok(())
    }

    /// Number of frames the back-end can accept right now.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Transport`] on a negative back-end result.
    pub fn ready(&self) -> Result<i32, BridgeError> {
        self.call(Operation::Ready, |plugin, session| status(plugin.ready(session)))
    }

    /// Blocks until the back-end's queue drains.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Transport`] on a negative back-end result.
    pub fn synchronize(&self) -> Result<(), BridgeError> {
        self.call(Operation::Synchronize, |plugin, session| {
            status(plugin.synchronize(session))
        })
        .map(|_| ())
    }

    /// Requests a writable frame buffer of the given geometry.
    ///
    /// The geometry is forwarded as-is; validating it is up to the back-end.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Transport`] if the back-end returns no frame.
    pub fn get_frame(
        &self,
        width: i32,
        height: i32,
        format: PixelFormat,
        stereo: bool,
    ) -> Result<Frame<'_>, BridgeError> {
        let mut binding = self.lock_binding();
        let raw = self.call_locked(&mut binding, Operation::GetFrame, |plugin, session| {
            plugin.get_frame(session, width, height, format, stereo)
        })?;
        // Counted under the same lock as the call, so a concurrent destroy
        // either runs before the frame exists or sees it.
        binding.frames_out += 1;
        drop(binding);

        if let Some(telemetry) = &self.telemetry {
            telemetry.begin_frame();
        }
        Ok(Frame { raw, bridge: self })
    }

    /// Hands a frame back for delivery, blocking until it is sent if `sync`
    /// is set.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Transport`] on a negative back-end result.
    pub fn send_frame(&self, frame: Frame<'_>, sync: bool) -> Result<(), BridgeError> {
        let (pixels, bytes) = frame.traffic();
        let raw = frame.raw;
        let sent = self.call(Operation::SendFrame, |plugin, session| {
            status(plugin.send_frame(session, raw, sync))
        });
        // The descriptor belongs to the back-end again, sent or not.
        drop(frame);
        sent?;
        if let Some(telemetry) = &self.telemetry {
            telemetry.end_frame(pixels, bytes, 1.0);
        }
        Ok(())
    }

    /// Destroys the back-end session.
    ///
    /// Idempotent: only the first call reaches the back-end, whether or not it
    /// succeeds, so an already released session is never addressed again.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::FramesOutstanding`] while frames from `get_frame` are
    ///   still held; nothing is destroyed and the call may be repeated once
    ///   they are sent or dropped.
    /// - [`BridgeError::Transport`] if the back-end's destroy fails.
    pub fn destroy(&self) -> Result<(), BridgeError> {
        let mut binding = self.lock_binding();
        if binding.session.is_some() && binding.frames_out > 0 {
            return Err(BridgeError::FramesOutstanding {
                transport: self.transport.clone(),
                count: binding.frames_out,
            });
        }
        let Some(session) = binding.session.take() else {
            return Ok(());
        };

        let outcome = {
            let _guard = InterceptionGuard::suspend(self.interception.as_ref());
            let plugin = &mut *binding.plugin;
            if plugin.destroy(session) < 0 {
                Err(plugin.last_error())
            } else {
                Ok(())
            }
        };

        match outcome {
            Ok(()) => {
                info!(bridge = %self.id, transport = %self.transport, "transport session destroyed");
                Ok(())
            }
            Err(message) => Err(self.failure(Operation::Destroy, message)),
        }
    }

    /// Runs one guarded back-end call.
    ///
    /// `invoke` returns `None` for the back-end's failure sentinel; the
    /// back-end's message is then read inside the same guarded section.
    fn call<T>(
        &self,
        operation: Operation,
        invoke: impl FnOnce(&mut dyn TransportPlugin, SessionHandle) -> Option<T>,
    ) -> Result<T, BridgeError> {
        let mut binding = self.lock_binding();
        self.call_locked(&mut binding, operation, invoke)
    }

    /// [`call`](Self::call) for a caller already holding the binding lock.
    fn call_locked<T>(
        &self,
        binding: &mut Binding,
        operation: Operation,
        invoke: impl FnOnce(&mut dyn TransportPlugin, SessionHandle) -> Option<T>,
    ) -> Result<T, BridgeError> {
        let session = binding.session.ok_or_else(|| BridgeError::SessionClosed {
            transport: self.transport.clone(),
        })?;

        debug!(bridge = %self.id, %operation, "transport call");
        let outcome = {
            let _guard = InterceptionGuard::suspend(self.interception.as_ref());
            let plugin = &mut *binding.plugin;
            invoke(&mut *plugin, session).ok_or_else(|| plugin.last_error())
        };

        outcome.map_err(|message| self.failure(operation, message))
    }

    fn failure(&self, operation: Operation, message: String) -> BridgeError {
        warn!(
            bridge = %self.id,
            transport = %self.transport,
            %operation,
            %message,
            "transport call failed"
        );
        BridgeError::Transport {
            transport: self.transport.clone(),
            operation,
            message,
        }
    }

    fn release_frame(&self) {
        let mut binding = self.lock_binding();
        binding.frames_out = binding.frames_out.saturating_sub(1);
    }

    fn lock_binding(&self) -> MutexGuard<'_, Binding> {
        // A panic inside a back-end call poisons the lock, but the
        // interception guard has already been restored during unwinding.
        self.binding.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TransportBridge {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            warn!(bridge = %self.id, "destroy during teardown failed: {e}");
        }
        // The module itself is released when `binding` drops, after destroy.
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
