//! GPU framebuffer resources
//!
//! A `Framebuffer` owns one color texture + framebuffer object pair on the
//! output's GL context. Id pair `(0, 0)` means unallocated; id 0 is also
//! what GL calls the display backbuffer, which is why an unallocated
//! resource placed in a `RenderTarget` naturally targets the display.
//!
//! All mutation must happen between `GpuContext::render_begin` and
//! `render_end`.

use crate::geometry::{Rect, Transform};
use crate::server::GpuContext;
use tracing::trace;

/// A color texture + FBO pair with its current size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framebuffer {
    pub fb: u32,
    pub tex: u32,
    width: i32,
    height: i32,
}

impl Default for Framebuffer {
    fn default() -> Self {
        Self::unallocated()
    }
}

impl Framebuffer {
    pub const fn unallocated() -> Self {
        Self {
            fb: 0,
            tex: 0,
            width: 0,
            height: 0,
        }
    }

    pub fn is_allocated(&self) -> bool {
        self.fb != 0 || self.tex != 0
    }

    pub fn size(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    /// Create the pair, or resize it if the size changed. Idempotent for
    /// an identical size.
    pub fn allocate(&mut self, gpu: &dyn GpuContext, width: i32, height: i32) {
        if !self.is_allocated() {
            let (fb, tex) = gpu.create_buffer(width, height);
            trace!("allocated buffer fb={} tex={} {}x{}", fb, tex, width, height);
            self.fb = fb;
            self.tex = tex;
            self.width = width;
            self.height = height;
            return;
        }

        if self.width != width || self.height != height {
            gpu.resize_buffer(self.fb, self.tex, width, height);
            self.width = width;
            self.height = height;
        }
    }

    /// Free the pair and return to the unallocated state
    pub fn release(&mut self, gpu: &dyn GpuContext) {
        if self.is_allocated() {
            gpu.destroy_buffer(self.fb, self.tex);
        }
        *self = Self::unallocated();
    }

    /// Forget the ids without freeing them, for ownership transfer
    pub fn reset(&mut self) {
        *self = Self::unallocated();
    }
}

/// Everything a renderer needs to draw into one target
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTarget {
    /// Output-relative geometry of the drawable area
    pub geometry: Rect,
    /// The output transform in effect
    pub transform: Transform,
    /// Column-major projection for `transform`
    pub matrix: [f32; 16],
    /// Raw pixel size of the target
    pub viewport_width: i32,
    pub viewport_height: i32,
    /// Framebuffer object to bind; 0 is the display backbuffer
    pub fb: u32,
    /// Color texture backing `fb`; 0 for the display backbuffer
    pub tex: u32,
}

impl RenderTarget {
    /// The same target with different backing ids
    pub fn with_buffer(&self, fb: u32, tex: u32) -> Self {
        Self {
            fb,
            tex,
            ..self.clone()
        }
    }

    pub fn targets_display(&self) -> bool {
        self.fb == 0
    }
}
