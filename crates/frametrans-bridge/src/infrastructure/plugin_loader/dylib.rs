//! Shared-library transport modules.
//!
//! This is the only place the crate touches the dynamic loader.  A module is
//! opened, all eight `frametrans_*` exports are resolved into an
//! [`EntryTable`], and only then is it wrapped as a [`DylibPlugin`], which
//! implements the safe [`TransportPlugin`] trait the bridge talks to.  A
//! module missing any export is rejected before any of its functions run.
//!
//! The loader itself sits behind two small traits, [`ModuleLoader`] and
//! [`SymbolSource`], implemented for `libloading` by [`SystemLoader`].

use std::ffi::{c_void, CStr, CString};
use std::mem;
use std::os::raw::c_int;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::Arc;

use frametrans_core::abi::{
    ConnectFn, DestroyFn, GetErrorFn, GetFrameFn, InitFn, ReadyFn, SendFrameFn, SynchronizeFn,
};
use frametrans_core::{
    DisplayHandle, EntryPoint, PixelFormat, RawFrame, SessionHandle, TransportParams,
    TransportPlugin, WindowHandle,
};
use libloading::Library;
use tracing::{debug, trace};

use super::module_file_name;
use crate::application::bridge::{BridgeError, ModuleResolver};

/// An opened module that can be asked for exported symbols.
pub trait SymbolSource: Send {
    /// Address of the NUL-terminated `symbol`, or the loader's diagnostic.
    fn symbol_address(&self, symbol: &[u8]) -> Result<*mut c_void, String>;
}

impl SymbolSource for Library {
    fn symbol_address(&self, symbol: &[u8]) -> Result<*mut c_void, String> {
        // SAFETY: the export is read as an untyped address; it is only called
        // after `EntryTable::resolve` casts it to the matching ABI type.
        unsafe { self.get::<*mut c_void>(symbol) }
            .map(|sym| *sym)
            .map_err(|e| e.to_string())
    }
}

/// Opens module files.
pub trait ModuleLoader: Send + Sync {
    /// Opens the module at `path`, or returns the loader's diagnostic.
    fn open(&self, path: &Path) -> Result<Box<dyn SymbolSource>, String>;
}

/// The platform dynamic loader, via `libloading`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLoader;

impl ModuleLoader for SystemLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn SymbolSource>, String> {
        // SAFETY: opening a library runs its initialisers.  Transport modules
        // are named by the operator and trusted like the host binary itself.
        unsafe { Library::new(path) }
            .map(|lib| Box::new(lib) as Box<dyn SymbolSource>)
            .map_err(|e| e.to_string())
    }
}

/// The eight entry points of one module, all resolved.
#[derive(Debug, Clone, Copy)]
pub struct EntryTable {
    init: InitFn,
    connect: ConnectFn,
    get_frame: GetFrameFn,
    ready: ReadyFn,
    synchronize: SynchronizeFn,
    send_frame: SendFrameFn,
    destroy: DestroyFn,
    get_error: GetErrorFn,
}

impl EntryTable {
    /// Resolves every entry point in [`EntryPoint::ALL`] order.
    ///
    /// # Errors
    ///
    /// The diagnostic for the first entry point that is missing or resolves
    /// to a null address.
    pub fn resolve(module: &dyn SymbolSource) -> Result<Self, String> {
        let mut addrs = [std::ptr::null_mut::<c_void>(); 8];
        for (slot, entry) in addrs.iter_mut().zip(EntryPoint::ALL) {
            let addr = module.symbol_address(entry.symbol_with_nul())?;
            if addr.is_null() {
                return Err(format!("{entry}: symbol resolves to a null address"));
            }
            trace!(symbol = %entry, "entry point resolved");
            *slot = addr;
        }

        let [init, connect, get_frame, ready, synchronize, send_frame, destroy, get_error] = addrs;
        // SAFETY: each address is the module's export for the entry point in
        // the same position of `EntryPoint::ALL`, whose C signature is fixed
        // by the module ABI.
        unsafe {
            Ok(Self {
                init: mem::transmute::<*mut c_void, InitFn>(init),
                connect: mem::transmute::<*mut c_void, ConnectFn>(connect),
                get_frame: mem::transmute::<*mut c_void, GetFrameFn>(get_frame),
                ready: mem::transmute::<*mut c_void, ReadyFn>(ready),
                synchronize: mem::transmute::<*mut c_void, SynchronizeFn>(synchronize),
                send_frame: mem::transmute::<*mut c_void, SendFrameFn>(send_frame),
                destroy: mem::transmute::<*mut c_void, DestroyFn>(destroy),
                get_error: mem::transmute::<*mut c_void, GetErrorFn>(get_error),
            })
        }
    }
}

/// A shared-library module seen through [`TransportPlugin`].
pub struct DylibPlugin {
    entries: EntryTable,
    /// Error raised on this side of the ABI, reported instead of the
    /// module's own until the next call.
    local_error: Option<String>,
    // Dropped last: the entry points point into it.
    _module: Box<dyn SymbolSource>,
}

impl DylibPlugin {
    pub fn new(entries: EntryTable, module: Box<dyn SymbolSource>) -> Self {
        Self {
            entries,
            local_error: None,
            _module: module,
        }
    }
}

impl TransportPlugin for DylibPlugin {
    fn init(
        &mut self,
        display: DisplayHandle,
        window: WindowHandle,
        params: &TransportParams,
    ) -> Option<SessionHandle> {
        self.local_error = None;
        // SAFETY: `init` takes the host's display and window as opaque values
        // and reads `params` only for the duration of the call.
        let handle = unsafe { (self.entries.init)(display.as_ptr(), window.0, params) };
        SessionHandle::from_raw(handle)
    }

    fn connect(&mut self, session: SessionHandle, receiver: &str, port: i32) -> i32 {
        self.local_error = None;
        let Ok(receiver) = CString::new(receiver) else {
            self.local_error = Some("receiver address contains a NUL byte".to_string());
            return -1;
        };
        // SAFETY: `session` came from this module's `init`; `receiver` is a
        // valid C string for the duration of the call.
        unsafe { (self.entries.connect)(session.as_ptr(), receiver.as_ptr(), port) }
    }

    fn get_frame(
        &mut self,
        session: SessionHandle,
        width: i32,
        height: i32,
        format: PixelFormat,
        stereo: bool,
    ) -> Option<NonNull<RawFrame>> {
        self.local_error = None;
        // SAFETY: `session` came from this module's `init`.
        let frame = unsafe {
            (self.entries.get_frame)(
                session.as_ptr(),
                width,
                height,
                format.as_raw(),
                c_int::from(stereo),
            )
        };
        NonNull::new(frame)
    }

    fn ready(&mut self, session: SessionHandle) -> i32 {
        self.local_error = None;
        // SAFETY: `session` came from this module's `init`.
        unsafe { (self.entries.ready)(session.as_ptr()) }
    }

    fn synchronize(&mut self, session: SessionHandle) -> i32 {
        self.local_error = None;
        // SAFETY: `session` came from this module's `init`.
        unsafe { (self.entries.synchronize)(session.as_ptr()) }
    }

    fn send_frame(&mut self, session: SessionHandle, frame: NonNull<RawFrame>, sync: bool) -> i32 {
        self.local_error = None;
        // SAFETY: `session` came from this module's `init` and `frame` from
        // its `get_frame`.
        unsafe { (self.entries.send_frame)(session.as_ptr(), frame.as_ptr(), c_int::from(sync)) }
    }

    fn destroy(&mut self, session: SessionHandle) -> i32 {
        self.local_error = None;
        // SAFETY: `session` came from this module's `init`; the bridge never
        // passes it again after this call.
        unsafe { (self.entries.destroy)(session.as_ptr()) }
    }

    fn last_error(&self) -> String {
        if let Some(message) = &self.local_error {
            return message.clone();
        }
        // SAFETY: `get_error` returns null or a NUL-terminated string that
        // stays valid until the module's next call on this thread.
        unsafe {
            let message = (self.entries.get_error)();
            if message.is_null() {
                return String::new();
            }
            CStr::from_ptr(message).to_string_lossy().into_owned()
        }
    }
}

/// Finds `frametrans_<name>` modules on disk.
pub struct DylibResolver {
    search_dirs: Vec<PathBuf>,
    loader: Arc<dyn ModuleLoader>,
}

impl DylibResolver {
    /// Searches `search_dirs`, then the system loader's default path.
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self::with_loader(search_dirs, Arc::new(SystemLoader))
    }

    pub fn with_loader(search_dirs: Vec<PathBuf>, loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            search_dirs,
            loader,
        }
    }

    /// Paths tried for `transport`, in order.  The last one is the bare file
    /// name, left to the system loader's search path.
    pub fn candidates(&self, transport: &str) -> Vec<PathBuf> {
        let file_name = module_file_name(transport);
        self.search_dirs
            .iter()
            .map(|dir| dir.join(&file_name))
            .chain(std::iter::once(PathBuf::from(&file_name)))
            .collect()
    }
}

impl ModuleResolver for DylibResolver {
    fn resolve(&self, transport: &str) -> Result<Box<dyn TransportPlugin>, BridgeError> {
        let load_error = |message: String| BridgeError::PluginLoad {
            transport: transport.to_string(),
            message,
        };

        let mut last_error = String::new();
        for path in self.candidates(transport) {
            let module = match self.loader.open(&path) {
                Ok(module) => module,
                Err(e) => {
                    trace!(path = %path.display(), error = %e, "module not loaded");
                    last_error = e;
                    continue;
                }
            };
            debug!(transport, path = %path.display(), "transport module opened");

            let entries = EntryTable::resolve(module.as_ref()).map_err(load_error)?;
            return Ok(Box::new(DylibPlugin::new(entries, module)));
        }
        Err(load_error(last_error))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
