//! Graphics forwarding layer.
//!
//! The guest issues primitive GL-style calls through `glClear` and
//! `glClearColor`.  [`GraphicsForwarder`] hands them to the host-owned
//! [`GraphicsContext`] verbatim: no buffering, no batching, and no argument
//! validation beyond what the context itself performs.

use std::sync::{Arc, Mutex};

use crate::error::{BridgeError, Result};

/// The subset of a GL context the bridge forwards to.
pub trait GraphicsContext: Send {
    /// Clear the buffers selected by `mask`.
    fn clear(&mut self, mask: u32) -> Result<()>;

    /// Set the colour used by subsequent colour-buffer clears.
    fn clear_color(&mut self, red: f32, green: f32, blue: f32, alpha: f32) -> Result<()>;
}

/// A single forwarded graphics call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GfxCall {
    /// `glClear(mask)`.
    Clear { mask: u32 },
    /// `glClearColor(r, g, b, a)`.
    ClearColor {
        red: f32,
        green: f32,
        blue: f32,
        alpha: f32,
    },
}

/// Sole owner of the session's graphics context.
pub struct GraphicsForwarder {
    context: Box<dyn GraphicsContext>,
}

impl GraphicsForwarder {
    /// Take ownership of `context`.
    pub fn new(context: Box<dyn GraphicsContext>) -> Self {
        Self { context }
    }

    /// Forward a `glClear` call.
    pub fn clear(&mut self, mask: u32) -> Result<()> {
        self.context.clear(mask)
    }

    /// Forward a `glClearColor` call.
    pub fn clear_color(&mut self, red: f32, green: f32, blue: f32, alpha: f32) -> Result<()> {
        self.context.clear_color(red, green, blue, alpha)
    }
}

impl std::fmt::Debug for GraphicsForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsForwarder").finish_non_exhaustive()
    }
}

/// Graphics context that records every call it receives.
///
/// Clones share one call log.  Marking the context lost makes every further
/// call fail with [`BridgeError::GraphicsUnavailable`].
#[derive(Debug, Clone, Default)]
pub struct RecordingContext {
    inner: Arc<Mutex<RecordingInner>>,
}

#[derive(Debug, Default)]
struct RecordingInner {
    calls: Vec<GfxCall>,
    lost: bool,
}

impl RecordingContext {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the calls received so far, oldest first.
    pub fn calls(&self) -> Vec<GfxCall> {
        self.inner
            .lock()
            .map(|inner| inner.calls.clone())
            .unwrap_or_default()
    }

    /// Simulate a lost context.
    pub fn set_lost(&self, lost: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.lost = lost;
        }
    }

    fn record(&self, call: GfxCall) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| BridgeError::GraphicsUnavailable {
                reason: "recording context poisoned".into(),
            })?;
        if inner.lost {
            return Err(BridgeError::GraphicsUnavailable {
                reason: "context lost".into(),
            });
        }
        tracing::trace!(?call, "recorded graphics call");
        inner.calls.push(call);
        Ok(())
    }
}

impl GraphicsContext for RecordingContext {
    fn clear(&mut self, mask: u32) -> Result<()> {
        self.record(GfxCall::Clear { mask })
    }

    fn clear_color(&mut self, red: f32, green: f32, blue: f32, alpha: f32) -> Result<()> {
        self.record(GfxCall::ClearColor {
            red,
            green,
            blue,
            alpha,
        })
    }
}
