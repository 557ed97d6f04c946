//! GPU-presentable surface management
//!
//! A [`SurfaceManager`] owns the one surface bound to a window region and the
//! CPU back buffer the engine renders into. The GPU work behind it sits behind
//! the [`GpuContext`] trait; [`WgpuContext`] is the wgpu implementation.

mod blit;
mod manager;
mod wgpu_context;

pub use manager::{SharedSurface, SurfaceManager};
pub use wgpu_context::{GpuOptions, WgpuContext};

use crate::utils::error::Result;
use std::fmt;
use std::sync::Arc;

/// Opaque handle to a live surface
///
/// [`SurfaceHandle::NONE`] is the "no surface" sentinel; valid handles are
/// never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(u64);

impl SurfaceHandle {
    /// The "no surface" sentinel
    pub const NONE: SurfaceHandle = SurfaceHandle(0);

    /// Wrap a raw id; zero maps to [`SurfaceHandle::NONE`]
    pub const fn from_raw(id: u64) -> Self {
        SurfaceHandle(id)
    }

    /// Raw id
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Whether this handle refers to a surface
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl Default for SurfaceHandle {
    fn default() -> Self {
        SurfaceHandle::NONE
    }
}

/// A drawable window region
///
/// Sizes are logical; [`SurfaceRegion::physical_size`] applies the
/// composition scale.
#[derive(Clone)]
pub struct SurfaceRegion {
    /// Logical width
    pub width: f64,

    /// Logical height
    pub height: f64,

    /// Device scale factor
    pub scale_factor: f64,

    /// Native window the surface binds to; `None` for headless contexts
    pub target: Option<Arc<dyn wgpu::WindowHandle>>,
}

impl SurfaceRegion {
    /// Region with no native target
    pub fn headless(width: f64, height: f64, scale_factor: f64) -> Self {
        Self {
            width,
            height,
            scale_factor,
            target: None,
        }
    }

    /// Region bound to a native window
    pub fn for_window<W>(target: Arc<W>, width: f64, height: f64, scale_factor: f64) -> Self
    where
        W: wgpu::WindowHandle + 'static,
    {
        Self {
            width,
            height,
            scale_factor,
            target: Some(target),
        }
    }

    /// Presentable size in device pixels
    pub fn physical_size(&self) -> (u32, u32) {
        let scale = if self.scale_factor.is_finite() && self.scale_factor > 0.0 {
            self.scale_factor
        } else {
            1.0
        };
        let px = |v: f64| {
            if v.is_finite() && v > 0.0 {
                (v * scale).round().min(u32::MAX as f64) as u32
            } else {
                0
            }
        };
        (px(self.width), px(self.height))
    }

    /// Same window, new logical size and scale
    pub fn resized(&self, width: f64, height: f64, scale_factor: f64) -> Self {
        Self {
            width,
            height,
            scale_factor,
            target: self.target.clone(),
        }
    }
}

impl fmt::Debug for SurfaceRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceRegion")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("scale_factor", &self.scale_factor)
            .field("has_target", &self.target.is_some())
            .finish()
    }
}

/// Packed 32-bit pixel layouts the engine can render into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// R, G, B, padding
    Rgb0,
    /// B, G, R, padding
    Bgr0,
}

impl PixelFormat {
    /// Format name understood by the engine's software renderer
    pub fn engine_name(self) -> &'static str {
        match self {
            PixelFormat::Rgb0 => "rgb0",
            PixelFormat::Bgr0 => "bgr0",
        }
    }

    /// Matching texture format for upload
    pub fn texture_format(self) -> wgpu::TextureFormat {
        match self {
            PixelFormat::Rgb0 => wgpu::TextureFormat::Rgba8UnormSrgb,
            PixelFormat::Bgr0 => wgpu::TextureFormat::Bgra8UnormSrgb,
        }
    }
}

/// CPU frame buffer the engine draws into
#[derive(Debug, Clone)]
pub struct FrameTarget {
    pub width: u32,
    pub height: u32,
    /// Bytes per row
    pub stride: usize,
    pub format: PixelFormat,
    pub pixels: Vec<u8>,
}

impl FrameTarget {
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Zeroed buffer of the given size
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let stride = width as usize * Self::BYTES_PER_PIXEL;
        Self {
            width,
            height,
            stride,
            format,
            pixels: vec![0; stride * height as usize],
        }
    }

    /// Empty buffer; nothing to present
    pub fn empty(format: PixelFormat) -> Self {
        Self::new(0, 0, format)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Reallocate for new dimensions; returns whether anything changed
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if self.width == width && self.height == height {
            return false;
        }
        *self = Self::new(width, height, self.format);
        true
    }
}

/// Scale for a quad that fits `frame` inside `surface` keeping aspect ratio
///
/// Returns `[x, y]` in normalized device units; one axis is always 1.0.
pub fn letterbox_scale(frame: (u32, u32), surface: (u32, u32)) -> [f32; 2] {
    if frame.0 == 0 || frame.1 == 0 || surface.0 == 0 || surface.1 == 0 {
        return [1.0, 1.0];
    }
    let frame_aspect = frame.0 as f32 / frame.1 as f32;
    let surface_aspect = surface.0 as f32 / surface.1 as f32;
    if frame_aspect > surface_aspect {
        [1.0, surface_aspect / frame_aspect]
    } else {
        [frame_aspect / surface_aspect, 1.0]
    }
}

/// GPU device context a [`SurfaceManager`] drives
///
/// Implementations need not be thread-safe beyond `Send`: every call is made
/// with the surface-mutation lock held.
pub trait GpuContext: Send {
    /// Bind a presentable surface to `region`
    fn create_surface(&mut self, region: &SurfaceRegion) -> Result<SurfaceHandle>;

    /// Release a surface; unknown handles are ignored
    fn destroy_surface(&mut self, surface: SurfaceHandle);

    /// Reinitialize the device after loss, keeping window bindings
    fn reset(&mut self) -> Result<()>;

    /// Claim the context for the calling thread
    fn make_current(&mut self) -> Result<()>;

    /// Reconfigure a surface for a new physical size
    fn resize(&mut self, surface: SurfaceHandle, width: u32, height: u32) -> Result<()>;

    /// Upload `frame` and swap it to the screen
    ///
    /// Any error is treated as device loss by the caller.
    fn present(&mut self, surface: SurfaceHandle, frame: &FrameTarget) -> Result<()>;
}
