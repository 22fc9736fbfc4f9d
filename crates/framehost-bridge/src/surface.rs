//! Headless software surface.
//!
//! [`SoftwareSurface`] is a CPU framebuffer that honours the GL clear
//! semantics the bridge forwards: `clear_color` only sets state, `clear`
//! fills each buffer selected by the mask.  Clones share the framebuffer so
//! the host can inspect or dump it while the session owns the context.

use std::collections::TryReserveError;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::abi::{COLOR_BUFFER_BIT, DEPTH_BUFFER_BIT, STENCIL_BUFFER_BIT};
use crate::error::{BridgeError, Result};
use crate::graphics::GraphicsContext;

/// Largest surface area accepted, in pixels (4096 x 4096).
pub const MAX_SURFACE_PIXELS: u64 = 4096 * 4096;

/// CPU-side colour, depth and stencil buffers.
#[derive(Debug, Clone, Default)]
pub struct SoftwareSurface {
    state: Arc<Mutex<SurfaceState>>,
}

#[derive(Debug, Default)]
struct SurfaceState {
    width: u32,
    height: u32,
    clear_color: [f32; 4],
    color: Vec<[u8; 4]>,
    depth: Vec<f32>,
    stencil: Vec<u8>,
    clears: u64,
    lost: bool,
}

impl SoftwareSurface {
    /// Create a `width` x `height` surface.
    ///
    /// Fails with [`BridgeError::GraphicsUnavailable`] if either dimension
    /// is zero, the area exceeds [`MAX_SURFACE_PIXELS`], or the buffers
    /// cannot be allocated.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let unavailable = |why: &str| BridgeError::GraphicsUnavailable {
            reason: format!("cannot create a {width}x{height} surface: {why}"),
        };
        if width == 0 || height == 0 {
            return Err(unavailable("zero-sized"));
        }
        let area = u64::from(width) * u64::from(height);
        if area > MAX_SURFACE_PIXELS {
            return Err(unavailable(&format!(
                "more than {MAX_SURFACE_PIXELS} pixels"
            )));
        }
        let pixels = usize::try_from(area).map_err(|_| unavailable("too large for this host"))?;
        let state = SurfaceState {
            width,
            height,
            clear_color: [0.0; 4],
            color: filled(pixels, [0, 0, 0, 0]).map_err(|e| unavailable(&e.to_string()))?,
            depth: filled(pixels, 1.0).map_err(|e| unavailable(&e.to_string()))?,
            stencil: filled(pixels, 0).map_err(|e| unavailable(&e.to_string()))?,
            clears: 0,
            lost: false,
        };
        tracing::info!(width, height, "software surface created");
        Ok(Self {
            state: Arc::new(Mutex::new(state)),
        })
    }

    /// Surface dimensions.
    pub fn size(&self) -> (u32, u32) {
        self.lock()
            .map(|s| (s.width, s.height))
            .unwrap_or_default()
    }

    /// Current clear colour state.
    pub fn clear_color_state(&self) -> [f32; 4] {
        self.lock().map(|s| s.clear_color).unwrap_or_default()
    }

    /// Number of `clear` calls applied so far.
    pub fn clear_count(&self) -> u64 {
        self.lock().map(|s| s.clears).unwrap_or_default()
    }

    /// RGBA8 value of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let state = self.lock().ok()?;
        if x >= state.width || y >= state.height {
            return None;
        }
        state
            .color
            .get(y as usize * state.width as usize + x as usize)
            .copied()
    }

    /// Depth value of the pixel at `(x, y)`.
    pub fn depth(&self, x: u32, y: u32) -> Option<f32> {
        let state = self.lock().ok()?;
        if x >= state.width || y >= state.height {
            return None;
        }
        state
            .depth
            .get(y as usize * state.width as usize + x as usize)
            .copied()
    }

    /// Mark the surface lost (or restored).
    pub fn set_lost(&self, lost: bool) {
        if let Ok(mut state) = self.lock() {
            if lost {
                tracing::warn!("software surface marked lost");
            }
            state.lost = lost;
        }
    }

    /// Write the colour buffer as a binary PPM (alpha is dropped).
    pub fn write_ppm(&self, path: &Path) -> Result<()> {
        let state = self.lock()?;
        let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
        write!(file, "P6\n{} {}\n255\n", state.width, state.height)?;
        for [r, g, b, _] in &state.color {
            file.write_all(&[*r, *g, *b])?;
        }
        file.flush()?;
        tracing::info!(path = %path.display(), "wrote framebuffer");
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, SurfaceState>> {
        self.state
            .lock()
            .map_err(|_| BridgeError::GraphicsUnavailable {
                reason: "surface state poisoned".into(),
            })
    }

    fn live(&self) -> Result<MutexGuard<'_, SurfaceState>> {
        let state = self.lock()?;
        if state.lost {
            return Err(BridgeError::GraphicsUnavailable {
                reason: "surface lost".into(),
            });
        }
        Ok(state)
    }
}

/// Convert a normalised channel to 8 bits, clamping like GL does.
fn to_unorm8(channel: f32) -> u8 {
    if channel.is_nan() {
        return 0;
    }
    (channel.clamp(0.0, 1.0) * 255.0).round() as u8
}

impl GraphicsContext for SoftwareSurface {
    fn clear(&mut self, mask: u32) -> Result<()> {
        let mut state = self.live()?;
        if mask & COLOR_BUFFER_BIT != 0 {
            let [r, g, b, a] = state.clear_color;
            let rgba = [to_unorm8(r), to_unorm8(g), to_unorm8(b), to_unorm8(a)];
            state.color.fill(rgba);
        }
        if mask & DEPTH_BUFFER_BIT != 0 {
            state.depth.fill(1.0);
        }
        if mask & STENCIL_BUFFER_BIT != 0 {
            state.stencil.fill(0);
        }
        state.clears += 1;
        Ok(())
    }

    fn clear_color(&mut self, red: f32, green: f32, blue: f32, alpha: f32) -> Result<()> {
        let mut state = self.live()?;
        state.clear_color = [red, green, blue, alpha];
        Ok(())
    }
}

/// A buffer of `len` copies of `value`, or an error if it cannot be allocated.
fn filled<T: Clone>(len: usize, value: T) -> std::result::Result<Vec<T>, TryReserveError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)?;
    buf.resize(len, value);
    Ok(buf)
}
