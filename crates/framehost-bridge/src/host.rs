//! Host function table.
//!
//! [`HostState`] is the data wasmtime associates with the session's
//! [`Store`](wasmtime::Store); [`HostFunctions::register`] binds the eight
//! `env` imports the guest may call.  Every import takes only numbers.
//! Variable-length data arrives as a `(ptr, len)` pair that is turned into a
//! [`ByteRange`] and read through the [`MemoryView`] on each call.
//!
//! The guest has no error channel, so failures inside an import (out of
//! bounds reads, lost graphics, failed growth) are logged and contained.
//! The one exception is `js_panic`, which records a [`PanicRecord`] and
//! returns an error that unwinds the current guest call.

use wasmtime::{Caller, Linker, StoreLimits};

use crate::abi::{
    ALERT, GL_CLEAR, GL_CLEAR_COLOR, GROW_MEMORY, IMPORT_MODULE, LOG_NUMBER, LOG_TEXT,
    MEMORY_EXPORT, MEMORY_PAGES, PANIC,
};
use crate::alert::AlertSink;
use crate::error::{BridgeError, Result};
use crate::graphics::{GraphicsContext, GraphicsForwarder};
use crate::memory::{ByteRange, MemoryView};
use crate::panic::{PanicChannel, PanicRecord};

/// Placeholder used when a panic's text cannot be read from guest memory.
const UNREADABLE: &str = "<unreadable>";

/// Per-session state stored in the wasmtime store.
pub struct HostState {
    /// Live memory handle, set once the instance exists.
    pub(crate) memory: Option<MemoryView>,
    pub(crate) graphics: GraphicsForwarder,
    pub(crate) alerts: Box<dyn AlertSink>,
    pub(crate) panic: PanicChannel,
    pub(crate) limits: StoreLimits,
    /// Host-side failures swallowed on the guest's behalf.
    pub(crate) contained_faults: u64,
}

impl HostState {
    /// Build host state around the host-owned graphics context and alert sink.
    pub fn new(
        graphics: Box<dyn GraphicsContext>,
        alerts: Box<dyn AlertSink>,
        limits: StoreLimits,
    ) -> Self {
        Self {
            memory: None,
            graphics: GraphicsForwarder::new(graphics),
            alerts,
            panic: PanicChannel::new(),
            limits,
            contained_faults: 0,
        }
    }

    /// The session's panic channel.
    pub fn panic_channel(&self) -> &PanicChannel {
        &self.panic
    }

    /// Number of contained host-side failures.
    pub fn contained_faults(&self) -> u64 {
        self.contained_faults
    }

    /// Present `message` through the alert sink.
    pub fn alert(&mut self, message: &str) {
        self.alerts.alert(message);
    }
}

/// Registers the host import table on a [`Linker`].
pub struct HostFunctions;

impl HostFunctions {
    /// Register all eight imports under the `env` module.
    pub fn register(linker: &mut Linker<HostState>) -> Result<()> {
        Self::register_logging(linker)?;
        Self::register_alert(linker)?;
        Self::register_panic(linker)?;
        Self::register_graphics(linker)?;
        Self::register_memory(linker)?;
        Ok(())
    }

    fn register_logging(linker: &mut Linker<HostState>) -> Result<()> {
        linker
            .func_wrap(
                IMPORT_MODULE,
                LOG_TEXT,
                |mut caller: Caller<'_, HostState>, ptr: i32, len: i32| {
                    match read_text(&mut caller, ByteRange::from_raw(ptr, len)) {
                        Ok(text) => tracing::info!(target: "guest", "{text}"),
                        Err(err) => contain(&mut caller, LOG_TEXT, err),
                    }
                },
            )
            .map_err(|e| link_error(LOG_TEXT, e))?;

        linker
            .func_wrap(
                IMPORT_MODULE,
                LOG_NUMBER,
                |_caller: Caller<'_, HostState>, value: f64| {
                    tracing::info!(target: "guest", "{value}");
                },
            )
            .map_err(|e| link_error(LOG_NUMBER, e))?;
        Ok(())
    }

    fn register_alert(linker: &mut Linker<HostState>) -> Result<()> {
        linker
            .func_wrap(
                IMPORT_MODULE,
                ALERT,
                |mut caller: Caller<'_, HostState>, ptr: i32, len: i32| {
                    match read_text(&mut caller, ByteRange::from_raw(ptr, len)) {
                        Ok(text) => caller.data_mut().alert(&text),
                        Err(err) => contain(&mut caller, ALERT, err),
                    }
                },
            )
            .map_err(|e| link_error(ALERT, e))?;
        Ok(())
    }

    fn register_panic(linker: &mut Linker<HostState>) -> Result<()> {
        linker
            .func_wrap(
                IMPORT_MODULE,
                PANIC,
                |mut caller: Caller<'_, HostState>,
                 err_ptr: i32,
                 err_len: i32,
                 file_ptr: i32,
                 file_len: i32,
                 line: i32|
                 -> wasmtime::Result<()> {
                    let message = read_panic_text(&mut caller, ByteRange::from_raw(err_ptr, err_len));
                    let file = read_panic_text(&mut caller, ByteRange::from_raw(file_ptr, file_len));
                    let record = PanicRecord::new(message, file, line as u32);

                    caller.data_mut().panic.report(record.clone());
                    Err(wasmtime::Error::new(BridgeError::GuestPanic(record)))
                },
            )
            .map_err(|e| link_error(PANIC, e))?;
        Ok(())
    }

    fn register_graphics(linker: &mut Linker<HostState>) -> Result<()> {
        linker
            .func_wrap(
                IMPORT_MODULE,
                GL_CLEAR,
                |mut caller: Caller<'_, HostState>, mask: i32| {
                    if let Err(err) = caller.data_mut().graphics.clear(mask as u32) {
                        contain(&mut caller, GL_CLEAR, err);
                    }
                },
            )
            .map_err(|e| link_error(GL_CLEAR, e))?;

        linker
            .func_wrap(
                IMPORT_MODULE,
                GL_CLEAR_COLOR,
                |mut caller: Caller<'_, HostState>, red: f32, green: f32, blue: f32, alpha: f32| {
                    let result = caller
                        .data_mut()
                        .graphics
                        .clear_color(red, green, blue, alpha);
                    if let Err(err) = result {
                        contain(&mut caller, GL_CLEAR_COLOR, err);
                    }
                },
            )
            .map_err(|e| link_error(GL_CLEAR_COLOR, e))?;
        Ok(())
    }

    fn register_memory(linker: &mut Linker<HostState>) -> Result<()> {
        // Mirrors `memory.grow`: previous page count on success, -1 on failure.
        linker
            .func_wrap(
                IMPORT_MODULE,
                GROW_MEMORY,
                |mut caller: Caller<'_, HostState>, pages: i32| -> i32 {
                    if pages < 0 {
                        tracing::warn!(pages, "guest requested negative memory growth");
                        return -1;
                    }
                    let grown = memory_of(&mut caller)
                        .and_then(|view| view.grow(&mut caller, pages as u64));
                    match grown {
                        Ok(previous) => previous as i32,
                        Err(err) => {
                            contain(&mut caller, GROW_MEMORY, err);
                            -1
                        }
                    }
                },
            )
            .map_err(|e| link_error(GROW_MEMORY, e))?;

        linker
            .func_wrap(
                IMPORT_MODULE,
                MEMORY_PAGES,
                |mut caller: Caller<'_, HostState>| -> i32 {
                    match memory_of(&mut caller) {
                        Ok(view) => view.page_count(&caller) as i32,
                        Err(err) => {
                            contain(&mut caller, MEMORY_PAGES, err);
                            0
                        }
                    }
                },
            )
            .map_err(|e| link_error(MEMORY_PAGES, e))?;
        Ok(())
    }
}

/// Resolve the guest memory, preferring the handle recorded at load time.
fn memory_of(caller: &mut Caller<'_, HostState>) -> Result<MemoryView> {
    if let Some(view) = caller.data().memory {
        return Ok(view);
    }
    // Imports called from a start function run before the handle is recorded.
    caller
        .get_export(MEMORY_EXPORT)
        .and_then(|export| export.into_memory())
        .map(MemoryView::new)
        .ok_or_else(|| BridgeError::MissingEntryPoint {
            name: MEMORY_EXPORT.to_owned(),
        })
}

fn read_text(caller: &mut Caller<'_, HostState>, range: ByteRange) -> Result<String> {
    let view = memory_of(caller)?;
    view.read_text(&*caller, range)
}

/// Panic text must never fail: an empty range is an empty string and an
/// unreadable one becomes a placeholder.
fn read_panic_text(caller: &mut Caller<'_, HostState>, range: ByteRange) -> String {
    if range.is_empty() {
        return String::new();
    }
    match read_text(caller, range) {
        Ok(text) => text,
        Err(err) => {
            contain(caller, PANIC, err);
            UNREADABLE.to_owned()
        }
    }
}

fn contain(caller: &mut Caller<'_, HostState>, import: &'static str, err: BridgeError) {
    caller.data_mut().contained_faults += 1;
    tracing::warn!(import, error = %err, "host call failed, guest continues");
}

fn link_error(import: &str, err: wasmtime::Error) -> BridgeError {
    BridgeError::LoadFailure {
        reason: format!("failed to register host import `{import}`: {err}"),
    }
}
