//! Post-effect chain
//!
//! An ordered list of full-frame GPU passes applied after the scene. Pass
//! `i` samples the previous pass's color buffer and draws into its own;
//! the terminal pass draws straight into the display backbuffer. That
//! terminal slot is a sentinel, not an allocation — it is modelled as
//! `BufferSlot::Display` and is never freed.
//!
//! Removal is deferred: `remove` only flags an entry and `cleanup` drops
//! flagged entries at frame boundaries, so the chain stays stable while a
//! frame is in flight.

use crate::framebuffer::{Framebuffer, RenderTarget};
use crate::server::GpuContext;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, trace};

/// Target of one post pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferSlot {
    /// The zero-id display backbuffer; never allocated, never freed
    Display,
    Owned(Framebuffer),
}

impl BufferSlot {
    fn ids(&self) -> (u32, u32) {
        match self {
            BufferSlot::Display => (0, 0),
            BufferSlot::Owned(buffer) => (buffer.fb, buffer.tex),
        }
    }
}

/// Registration token for a post hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostId(u64);

type PostHook = Rc<RefCell<dyn FnMut(&RenderTarget, &RenderTarget)>>;

struct PostEntry {
    id: PostId,
    hook: PostHook,
    slot: BufferSlot,
    to_remove: bool,
}

/// The ordered post-effect pipeline
#[derive(Default)]
pub struct PostChain {
    entries: RefCell<Vec<PostEntry>>,
    next_id: Cell<u64>,
}

impl PostChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Append a pass. The previously terminal slot gets a real buffer at
    /// the current output size and the new pass takes over the display
    /// slot, so the chain still ends at the backbuffer. `scene_buffer` is
    /// the buffer the scene renders into; it is allocated here when the
    /// first pass arrives.
    ///
    /// Must run inside a bound GPU context.
    pub fn add(
        &self,
        gpu: &dyn GpuContext,
        scene_buffer: &RefCell<Framebuffer>,
        size: (i32, i32),
        hook: impl FnMut(&RenderTarget, &RenderTarget) + 'static,
    ) -> PostId {
        let (width, height) = size;

        gpu.render_begin();
        {
            let mut entries = self.entries.borrow_mut();
            match entries.last_mut() {
                Some(last) => {
                    // the old terminal pass now renders offscreen
                    let mut buffer = Framebuffer::unallocated();
                    buffer.allocate(gpu, width, height);
                    last.slot = BufferSlot::Owned(buffer);
                }
                None => {
                    let mut scene = scene_buffer.borrow_mut();
                    scene.reset();
                    scene.allocate(gpu, width, height);
                }
            }
        }
        gpu.render_end();

        let id = PostId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.entries.borrow_mut().push(PostEntry {
            id,
            hook: Rc::new(RefCell::new(hook)),
            slot: BufferSlot::Display,
            to_remove: false,
        });

        debug!("post chain grew to {} passes", self.len());
        id
    }

    /// Flag a pass for removal at the next frame boundary
    pub fn remove(&self, id: PostId) {
        for entry in self.entries.borrow_mut().iter_mut() {
            if entry.id == id {
                entry.to_remove = true;
            }
        }
    }

    /// Drop flagged passes and restore the display terminal. Returns true
    /// if anything was removed (the caller re-damages the output).
    ///
    /// Must run inside a bound GPU context.
    pub fn cleanup(&self, gpu: &dyn GpuContext, scene_buffer: &RefCell<Framebuffer>) -> bool {
        if !self.entries.borrow().iter().any(|e| e.to_remove) {
            return false;
        }

        gpu.render_begin();
        {
            let mut entries = self.entries.borrow_mut();
            entries.retain_mut(|entry| {
                if entry.to_remove {
                    if let BufferSlot::Owned(mut buffer) = entry.slot {
                        buffer.release(gpu);
                    }
                    false
                } else {
                    true
                }
            });

            // whoever is last now draws to the display again
            match entries.last_mut() {
                Some(last) => {
                    if let BufferSlot::Owned(mut buffer) = last.slot {
                        buffer.release(gpu);
                        last.slot = BufferSlot::Display;
                    }
                }
                None => scene_buffer.borrow_mut().release(gpu),
            }
        }
        gpu.render_end();

        debug!("post chain shrank to {} passes", self.len());
        true
    }

    /// Execute the chain: scene buffer -> owned buffers -> display. Each
    /// owned slot is first reallocated to the current output size in case
    /// the output was resized.
    pub fn run(&self, gpu: &dyn GpuContext, base: &RenderTarget, size: (i32, i32)) {
        let (width, height) = size;

        // resize pass buffers and snapshot the walk before invoking any
        // hook, so hooks can edit the chain without tripping a borrow
        let mut passes: Vec<(PostHook, (u32, u32))> = Vec::with_capacity(self.len());
        gpu.render_begin();
        {
            let mut entries = self.entries.borrow_mut();
            for entry in entries.iter_mut() {
                if let BufferSlot::Owned(ref mut buffer) = entry.slot {
                    buffer.allocate(gpu, width, height);
                }
                passes.push((entry.hook.clone(), entry.slot.ids()));
            }
        }
        gpu.render_end();

        let mut last = (base.fb, base.tex);
        for (hook, dst_ids) in passes {
            let src = base.with_buffer(last.0, last.1);
            let dst = base.with_buffer(dst_ids.0, dst_ids.1);
            trace!("post pass from fb {} to fb {}", src.fb, dst.fb);
            (hook.borrow_mut())(&src, &dst);
            last = dst_ids;
        }

        debug_assert_eq!(last, (0, 0), "post chain must end at the display");
    }

    /// Release every owned pass buffer at manager teardown. The display
    /// slots are sentinels and stay untouched.
    ///
    /// Must run inside a bound GPU context.
    pub fn release_buffers(&self, gpu: &dyn GpuContext) {
        for entry in self.entries.borrow_mut().iter_mut() {
            if let BufferSlot::Owned(mut buffer) = entry.slot {
                buffer.release(gpu);
                entry.slot = BufferSlot::Display;
            }
        }
    }

    /// Terminal invariant: the last pass, if any, owns the display slot
    pub fn terminal_is_display(&self) -> bool {
        self.entries
            .borrow()
            .last()
            .map(|entry| entry.slot == BufferSlot::Display)
            .unwrap_or(true)
    }
}
