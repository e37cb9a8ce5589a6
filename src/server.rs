//! Display-server contracts
//!
//! The render pipeline never talks to the display server directly; the
//! owning compositor injects these collaborators at construction. One
//! `Output` stands for one physical display together with its damage
//! tracker, `EventLoop` is the single-threaded compositor loop, and
//! `GpuContext` is the bound GL context of that output.
//!
//! All of this runs cooperatively on the event-loop thread; none of the
//! trait objects need to be `Send`.

use crate::framebuffer::RenderTarget;
use crate::geometry::{Rect, Transform};
use crate::region::Region;
use anyhow::Result;
use std::time::Instant;

/// Handle to a queued idle callback, used to cancel it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdleToken(pub u64);

/// The compositor event loop
pub trait EventLoop {
    /// Queue a callback to run once the loop goes idle
    fn add_idle(&self, callback: Box<dyn FnOnce()>) -> IdleToken;

    /// Cancel a queued idle callback; unknown tokens are ignored
    fn remove(&self, token: IdleToken);
}

/// One physical display plus its damage tracker
pub trait Output {
    /// Raw backbuffer size in pixels
    fn size(&self) -> (i32, i32);

    /// Size after the output transform is applied
    fn transformed_resolution(&self) -> (i32, i32);

    /// Integer scale factor
    fn scale(&self) -> i32;

    fn transform(&self) -> Transform;

    /// Output-local geometry, `(0, 0, logical_w, logical_h)`
    fn relative_geometry(&self) -> Rect;

    /// Ask the display for a frame event
    fn schedule_frame(&self);

    /// Once destroyed, damage reports are dropped
    fn is_destroyed(&self) -> bool;

    /// Report a damaged box to the display's damage tracker
    fn track_rect(&self, rect: Rect);

    /// Report a damaged region to the display's damage tracker
    fn track_region(&self, region: &Region);

    /// Attach the backbuffer for rendering. On success `out_damage` holds
    /// the display's aggregated damage since the last swap and the return
    /// value says whether the display wants a swap at all. Errors abort
    /// the frame; the next frame event retries.
    fn make_current(&self, out_damage: &mut Region) -> Result<bool>;

    /// Present the backbuffer, handing the display the region that differs
    /// from the frontbuffer
    fn swap_buffers(&self, when: Instant, swap_damage: &Region);

    /// Draw the software cursor planes into the bound target
    fn render_software_cursors(&self, damage: &Region);
}

/// The output's GL context. Buffer create/resize/destroy calls are only
/// valid inside a `render_begin`/`render_end` pair, draw calls only after
/// one of the `render_to*` entry points.
pub trait GpuContext {
    /// Make this output's context current
    fn bind_output(&self);

    fn unbind_output(&self);

    /// Open a resource scope (no draw target bound)
    fn render_begin(&self);

    /// Open a draw scope targeting `target`
    fn render_to(&self, target: &RenderTarget);

    /// Open a draw scope targeting the display backbuffer
    fn render_to_display(&self, width: i32, height: i32);

    /// Close the current scope
    fn render_end(&self);

    /// Clear the bound target to `color` (RGBA)
    fn clear(&self, color: [f32; 4]);

    /// Restrict subsequent draws to `area`; `None` lifts the restriction
    fn scissor(&self, area: Option<Rect>);

    /// Allocate a color texture + framebuffer pair, returns `(fb, tex)`
    fn create_buffer(&self, width: i32, height: i32) -> (u32, u32);

    /// Resize the storage behind an existing pair
    fn resize_buffer(&self, fb: u32, tex: u32, width: i32, height: i32);

    fn destroy_buffer(&self, fb: u32, tex: u32);
}
