//! framehost host/guest bridge.
//!
//! This crate loads a sandboxed WebAssembly module, binds a fixed table of
//! numeric-only host functions into it, and drives its per-frame entry point
//! against a graphics context the host owns.
//!
//! - **[`loader`]** -- [`ModuleLoader`] fetches, compiles and verifies a
//!   module, producing a [`Session`].
//! - **[`session`]** -- [`Session`] owns the store, instance, memory and
//!   entry points of one live guest.
//! - **[`host`]** -- the eight `env` imports and the [`HostState`] behind
//!   them.
//! - **[`memory`]** -- [`ByteRange`] and the bound-checked [`MemoryView`].
//! - **[`panic`]** -- [`PanicRecord`] and the one-shot [`PanicChannel`].
//! - **[`graphics`]** / **[`surface`]** -- the [`GraphicsContext`] seam, a
//!   recording context and a headless software surface.
//! - **[`alert`]** -- the synchronous [`AlertSink`] channel.
//! - **[`driver`]** -- [`FrameDriver`], the explicit frame-loop state machine.
//! - **[`config`]** -- [`BridgeConfig`] limits and schedule.
//! - **[`error`]** -- [`BridgeError`] enumerates every failure mode.
//!
//! Everything runs on one logical thread of control: each guest call runs
//! to completion before the next one is issued.

pub mod abi;
pub mod alert;
pub mod config;
pub mod driver;
pub mod error;
pub mod graphics;
pub mod host;
pub mod loader;
pub mod memory;
pub mod panic;
pub mod session;
pub mod surface;

// Re-export the most commonly used types at the crate root.
pub use alert::{AlertSink, ConsoleAlert, RecordingAlerts};
pub use config::{BridgeConfig, EntryPoints};
pub use driver::{DriverState, FrameDriver, Termination};
pub use error::{BridgeError, Result};
pub use graphics::{GfxCall, GraphicsContext, GraphicsForwarder, RecordingContext};
pub use host::{HostFunctions, HostState};
pub use loader::{ModuleLoader, ModuleReport, ModuleSource};
pub use memory::{ByteRange, MemoryView};
pub use panic::{PanicChannel, PanicRecord, PanicState};
pub use session::Session;
pub use surface::SoftwareSurface;
