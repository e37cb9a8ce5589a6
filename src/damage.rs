//! Per-output damage accumulation
//!
//! `DamageTracker` sits between the render manager and the display's own
//! damage tracking. Every damage report goes two ways: into the display
//! tracker (which ages it across its swapchain) and into a local pending
//! region. The pending region exists because reports can land outside the
//! current output bounds (other workspaces); the display tracker clips
//! those away, so we re-inject them ourselves at `make_current` time.

use crate::geometry::Rect;
use crate::region::Region;
use crate::server::Output;
use anyhow::Result;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

pub struct DamageTracker {
    output: Rc<dyn Output>,
    /// Damage reported since the last swap, output-pixel space
    pending: RefCell<Region>,
    /// Force full-output repaints every frame
    no_damage_track: bool,
}

impl DamageTracker {
    pub fn new(output: Rc<dyn Output>, no_damage_track: bool) -> Self {
        Self {
            output,
            pending: RefCell::new(Region::new()),
            no_damage_track,
        }
    }

    fn output_rect(&self) -> Rect {
        let (w, h) = self.output.transformed_resolution();
        Rect::new(0, 0, w, h)
    }

    /// Damage the whole output
    pub fn add_full(&self) {
        self.add_rect(self.output_rect());
    }

    pub fn add_rect(&self, rect: Rect) {
        self.pending.borrow_mut().add_rect(&rect);
        self.output.track_rect(rect);
        self.output.schedule_frame();
    }

    pub fn add_region(&self, region: &Region) {
        self.pending.borrow_mut().add_region(region);
        self.output.track_region(region);
        self.output.schedule_frame();
    }

    /// Attach the backbuffer and collect the damage to repaint. Returns
    /// whether the display wants a swap. On success the output-sized
    /// rectangle is dropped from the pending region so in-bounds damage
    /// does not accumulate across frames.
    pub fn make_current(&self, out_damage: &mut Region) -> Result<bool> {
        let needs_swap = self.output.make_current(out_damage)?;

        let regular = self.output_rect();
        let mut pending = self.pending.borrow_mut();
        pending.subtract_rect(&regular);
        out_damage.add_region(&pending);

        if self.no_damage_track {
            out_damage.add_rect(&regular);
        }

        Ok(needs_swap)
    }

    /// Present and forget everything reported up to now
    pub fn swap_buffers(&self, when: Instant, swap_damage: &Region) {
        self.output.swap_buffers(when, swap_damage);
        self.pending.borrow_mut().clear();
    }
}
