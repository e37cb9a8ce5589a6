//! Per-output render manager
//!
//! One `RenderManager` per display. It accumulates damage between frames,
//! and on each frame event runs the full pipeline: pre effects, scene
//! (workspace stream or a custom renderer), overlay effects, software
//! cursors, the post-effect chain, swap, post effects.
//!
//! Everything runs cooperatively on the compositor event loop; callbacks
//! registered here may call back into the manager, so the internal state
//! lives in cells and hook lists are snapshotted before every run.

use crate::config::RenderConfig;
use crate::damage::DamageTracker;
use crate::effects::{EffectId, EffectPhase, EffectRegistry, Signal, SignalId, SignalRegistry};
use crate::framebuffer::{Framebuffer, RenderTarget};
use crate::geometry::Rect;
use crate::post::{PostChain, PostId};
use crate::region::Region;
use crate::scene::{InputManager, LayerMask, View, WorkspaceManager};
use crate::server::{EventLoop, GpuContext, IdleToken, Output};
use crate::stream::WorkspaceStream;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

type RendererHook = Rc<RefCell<dyn FnMut(&RenderTarget)>>;

/// Repaint pacing trace. Painted frames are counted per window and the
/// average rate goes out at debug level, so a stuck constant-redraw or a
/// damage feedback loop shows up in the logs without per-frame spam.
struct RepaintStats {
    window_start: Instant,
    frames_in_window: u32,
}

impl RepaintStats {
    const WINDOW: Duration = Duration::from_secs(5);

    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            frames_in_window: 0,
        }
    }

    /// Count one painted frame, reporting when the window closes
    fn note_frame(&mut self) {
        self.frames_in_window += 1;

        let elapsed = self.window_start.elapsed();
        if elapsed < Self::WINDOW {
            return;
        }

        debug!(
            "painted {} frames in the last {:.1}s ({:.1} per second)",
            self.frames_in_window,
            elapsed.as_secs_f64(),
            f64::from(self.frames_in_window) / elapsed.as_secs_f64()
        );
        self.frames_in_window = 0;
        self.window_start = Instant::now();
    }
}

pub struct RenderManager {
    pub(crate) output: Rc<dyn Output>,
    pub(crate) workspaces: Rc<dyn WorkspaceManager>,
    pub(crate) input: Rc<dyn InputManager>,
    pub(crate) gpu: Rc<dyn GpuContext>,
    event_loop: Rc<dyn EventLoop>,
    config: RenderConfig,

    damage_tracker: DamageTracker,
    /// Damage being repainted by the frame in flight, output-pixel space
    pub(crate) frame_damage: RefCell<Region>,
    /// The scene render target; stays the display sentinel until the post
    /// chain needs an offscreen scene
    scene_buffer: RefCell<Framebuffer>,

    /// One dormant stream per workspace grid cell, created once
    streams: RefCell<Vec<Vec<WorkspaceStream>>>,
    current_stream: Cell<Option<(usize, usize)>>,

    effects: EffectRegistry,
    pub(crate) signals: SignalRegistry,
    post: PostChain,
    renderer: RefCell<Option<RendererHook>>,

    constant_redraw: Cell<i32>,
    output_inhibit: Cell<i32>,
    idle_redraw: Cell<Option<IdleToken>>,
    idle_damage: Cell<Option<IdleToken>>,

    repaint_stats: RefCell<RepaintStats>,
    weak_self: Weak<RenderManager>,
}

impl RenderManager {
    pub fn new(
        output: Rc<dyn Output>,
        workspaces: Rc<dyn WorkspaceManager>,
        input: Rc<dyn InputManager>,
        event_loop: Rc<dyn EventLoop>,
        gpu: Rc<dyn GpuContext>,
        config: RenderConfig,
    ) -> Rc<Self> {
        let (vwidth, vheight) = workspaces.grid_size();
        let mut grid = Vec::with_capacity(vwidth as usize);
        for x in 0..vwidth {
            let mut row = Vec::with_capacity(vheight as usize);
            for y in 0..vheight {
                row.push(WorkspaceStream::new((x, y)));
            }
            grid.push(row);
        }
        info!(
            "render manager ready: {}x{} workspace grid",
            vwidth, vheight
        );

        let damage_tracker = DamageTracker::new(output.clone(), config.no_damage_track);

        let manager = Rc::new_cyclic(|weak| Self {
            output,
            workspaces,
            input,
            gpu,
            event_loop,
            config,
            damage_tracker,
            frame_damage: RefCell::new(Region::new()),
            scene_buffer: RefCell::new(Framebuffer::unallocated()),
            streams: RefCell::new(grid),
            current_stream: Cell::new(None),
            effects: EffectRegistry::new(),
            signals: SignalRegistry::new(),
            post: PostChain::new(),
            renderer: RefCell::new(None),
            constant_redraw: Cell::new(0),
            output_inhibit: Cell::new(0),
            idle_redraw: Cell::new(None),
            idle_damage: Cell::new(None),
            repaint_stats: RefCell::new(RepaintStats::new()),
            weak_self: weak.clone(),
        });

        // first frame paints everything
        manager.damage_tracker.add_full();
        manager.schedule_redraw();
        manager
    }

    // ---- damage ----------------------------------------------------

    /// Report a damaged box in output pixels
    pub fn damage_rect(&self, rect: Rect) {
        if !self.output.is_destroyed() {
            self.damage_tracker.add_rect(rect);
        }
    }

    /// Report a damaged region; `None` damages the whole output
    pub fn damage_region(&self, region: Option<&Region>) {
        if self.output.is_destroyed() {
            return;
        }
        match region {
            Some(region) => self.damage_tracker.add_region(region),
            None => self.damage_tracker.add_full(),
        }
    }

    // ---- scheduling ------------------------------------------------

    /// Ask for a frame once the event loop goes idle; at most one request
    /// is ever queued
    pub fn schedule_redraw(&self) {
        if self.idle_redraw.get().is_some() {
            return;
        }
        let weak = self.weak_self.clone();
        let token = self.event_loop.add_idle(Box::new(move || {
            if let Some(manager) = weak.upgrade() {
                manager.idle_redraw.set(None);
                manager.output.schedule_frame();
            }
        }));
        self.idle_redraw.set(Some(token));
    }

    /// Reference-counted constant repaint: while any caller holds it on,
    /// every finished frame schedules the next one
    pub fn auto_redraw(&self, enable: bool) {
        let value = self.constant_redraw.get() + if enable { 1 } else { -1 };
        self.constant_redraw.set(value);

        if value > 1 {
            // already redrawing, nothing changes
            return;
        }
        if value < 0 {
            warn!("auto_redraw(false) without a matching auto_redraw(true)");
            self.constant_redraw.set(0);
            return;
        }

        self.schedule_redraw();
    }

    /// Reference-counted output inhibit: while held, frames present
    /// opaque black. Releasing the last hold re-damages everything and
    /// emits `start-rendering`.
    pub fn add_inhibit(&self, inhibit: bool) {
        if inhibit {
            self.output_inhibit.set(self.output_inhibit.get() + 1);
            return;
        }

        let value = self.output_inhibit.get();
        if value == 0 {
            warn!("add_inhibit(false) without a matching add_inhibit(true)");
            return;
        }

        self.output_inhibit.set(value - 1);
        if value == 1 {
            debug!("output inhibit lifted");
            self.damage_region(None);
            self.signals.emit(&Signal::StartRendering);
        }
    }

    // ---- renderer & hooks ------------------------------------------

    /// Install a custom full-frame renderer replacing the workspace
    /// stream path. Overlay, cursor and post stages still run on top.
    pub fn set_renderer(&self, hook: impl FnMut(&RenderTarget) + 'static) {
        *self.renderer.borrow_mut() = Some(Rc::new(RefCell::new(hook)));
    }

    /// Remove the custom renderer and queue a full repaint of the scene
    pub fn reset_renderer(&self) {
        *self.renderer.borrow_mut() = None;

        if self.idle_damage.get().is_some() {
            return;
        }
        let weak = self.weak_self.clone();
        let token = self.event_loop.add_idle(Box::new(move || {
            if let Some(manager) = weak.upgrade() {
                manager.idle_damage.set(None);
                manager.damage_region(None);
            }
        }));
        self.idle_damage.set(Some(token));
    }

    pub(crate) fn has_renderer(&self) -> bool {
        self.renderer.borrow().is_some()
    }

    pub fn add_effect(&self, phase: EffectPhase, hook: impl FnMut() + 'static) -> EffectId {
        self.effects.add(phase, hook)
    }

    pub fn rem_effect(&self, phase: EffectPhase, id: EffectId) {
        self.effects.remove(phase, id);
    }

    pub fn connect_signal(
        &self,
        name: &str,
        listener: impl FnMut(&Signal) + 'static,
    ) -> SignalId {
        self.signals.connect(name, listener)
    }

    pub fn disconnect_signal(&self, id: SignalId) {
        self.signals.disconnect(id);
    }

    /// Append a post pass; the chain keeps ending at the display
    pub fn add_post(
        &self,
        hook: impl FnMut(&RenderTarget, &RenderTarget) + 'static,
    ) -> PostId {
        let id = self
            .post
            .add(&*self.gpu, &self.scene_buffer, self.output.size(), hook);
        self.damage_region(None);
        id
    }

    /// Flag a post pass for removal at the next frame boundary
    pub fn rem_post(&self, id: PostId) {
        self.post.remove(id);
        self.damage_region(None);
    }

    fn cleanup_post_hooks(&self) {
        if self.post.cleanup(&*self.gpu, &self.scene_buffer) {
            self.damage_region(None);
        }
    }

    /// The target the scene is currently rendered into
    pub fn target_framebuffer(&self) -> RenderTarget {
        let transform = self.output.transform();
        let (width, height) = self.output.size();
        let scene = self.scene_buffer.borrow();

        RenderTarget {
            geometry: self.output.relative_geometry(),
            transform,
            matrix: transform.matrix(),
            viewport_width: width,
            viewport_height: height,
            fb: scene.fb,
            tex: scene.tex,
        }
    }

    // ---- frame orchestration ---------------------------------------

    /// Produce one frame. Called on the display's frame event.
    pub fn paint(&self) {
        let frame_started = Instant::now();
        self.cleanup_post_hooks();

        // about to be repopulated from the damage tracker
        self.frame_damage.borrow_mut().clear();

        self.effects.run(EffectPhase::Pre);

        let needs_swap = {
            let mut damage = self.frame_damage.borrow_mut();
            match self.damage_tracker.make_current(&mut damage) {
                Ok(needs_swap) => needs_swap,
                Err(e) => {
                    debug!("make_current failed, skipping frame: {}", e);
                    return;
                }
            }
        };

        if !needs_swap && self.constant_redraw.get() == 0 {
            self.post_paint();
            return;
        }

        let (width, height) = self.output.size();
        self.gpu.bind_output();
        trace!("frame");

        // with post passes the scene goes offscreen; track output resizes
        if !self.post.is_empty() {
            self.gpu.render_begin();
            self.scene_buffer.borrow_mut().allocate(&*self.gpu, width, height);
            self.gpu.render_end();
        }

        let full_output = Rect::new(0, 0, width, height);
        let mut swap_damage = Region::new();

        if self.config.damage_debug {
            // anything not repainted this frame stays yellow
            swap_damage.add_rect(&full_output);
            self.gpu.render_to_display(width, height);
            self.gpu.clear([1.0, 1.0, 0.0, 1.0]);
            self.gpu.render_end();
        }

        let renderer = self.renderer.borrow().clone();
        if let Some(hook) = renderer {
            let target = self.target_framebuffer();
            (hook.borrow_mut())(&target);
            // custom renderers cannot declare their repaint region yet
            swap_damage.add_rect(&full_output);
        } else {
            let (tw, th) = self.output.transformed_resolution();
            let has_damage = {
                let mut damage = self.frame_damage.borrow_mut();
                damage.intersect_rect(&Rect::new(0, 0, tw, th));
                if !damage.is_empty() {
                    swap_damage = damage.clone();
                    true
                } else {
                    false
                }
            };

            if has_damage {
                self.render_current_workspace();
            }
        }

        self.effects.run(EffectPhase::Overlay);

        if !self.post.is_empty() {
            // the post chain repaints everything
            swap_damage.add_rect(&full_output);
        }

        let target = self.target_framebuffer();
        self.gpu.render_to(&target);
        self.output.render_software_cursors(&swap_damage);
        self.gpu.render_end();

        if !self.post.is_empty() {
            self.post.run(&*self.gpu, &target, (width, height));
        }

        if self.output_inhibit.get() > 0 {
            self.gpu.render_to_display(width, height);
            self.gpu.clear([0.0, 0.0, 0.0, 1.0]);
            self.gpu.render_end();
        }

        self.gpu.unbind_output();
        self.damage_tracker.swap_buffers(frame_started, &swap_damage);
        self.repaint_stats.borrow_mut().note_frame();

        self.post_paint();
    }

    /// Paint the current workspace through its grid stream, switching
    /// streams if the workspace changed since the last frame
    fn render_current_workspace(&self) {
        let (cx, cy) = self.workspaces.current_workspace();
        let index = (cx as usize, cy as usize);

        let previous = self.current_stream.get();
        if previous != Some(index) {
            if let Some(old) = previous {
                self.with_grid_stream(old, |manager, stream| {
                    manager.workspace_stream_stop(stream);
                });
            }
            self.current_stream.set(Some(index));
            self.with_grid_stream(index, |manager, stream| {
                manager.stream_start(stream, false);
            });
        } else {
            self.with_grid_stream(index, |manager, stream| {
                manager.stream_render(stream, 1.0, 1.0, false);
            });
        }
    }

    /// Run `f` with a grid stream temporarily lifted out of the table, so
    /// callbacks inside the render can reach the manager again
    fn with_grid_stream<R>(
        &self,
        index: (usize, usize),
        f: impl FnOnce(&Self, &mut WorkspaceStream) -> R,
    ) -> R {
        let placeholder = WorkspaceStream::new((index.0 as i32, index.1 as i32));
        let mut stream = {
            let mut grid = self.streams.borrow_mut();
            std::mem::replace(&mut grid[index.0][index.1], placeholder)
        };

        let result = f(self, &mut stream);

        let mut grid = self.streams.borrow_mut();
        grid[index.0][index.1] = stream;
        result
    }

    /// After-swap work: post effects, constant redraw, frame-done
    /// notifications to every surface that contributed
    fn post_paint(&self) {
        self.cleanup_post_hooks();
        self.effects.run(EffectPhase::Post);

        if self.constant_redraw.get() > 0 {
            self.schedule_redraw();
        }

        let mut send_frame_done = |view: &dyn View| {
            if !view.is_mapped() {
                return;
            }
            view.for_each_surface(&mut |surface, _, _| {
                surface.send_frame_done(Instant::now());
            });
        };

        if self.has_renderer() {
            // no way to tell what the custom renderer showed; notify all
            self.workspaces
                .for_each_view(LayerMask::all(), &mut send_frame_done);
        } else {
            let current = self.workspaces.current_workspace();
            for view in self
                .workspaces
                .views_on_workspace(current, LayerMask::middle())
            {
                send_frame_done(&*view);
            }

            // panels, backgrounds and overlays live outside the workspace
            self.workspaces.for_each_view(
                LayerMask::below() | LayerMask::above(),
                &mut send_frame_done,
            );
        }
    }
}


impl Drop for RenderManager {
    fn drop(&mut self) {
        if let Some(token) = self.idle_redraw.take() {
            self.event_loop.remove(token);
        }
        if let Some(token) = self.idle_damage.take() {
            self.event_loop.remove(token);
        }

        self.gpu.render_begin();
        for row in self.streams.borrow_mut().iter_mut() {
            for stream in row.iter_mut() {
                stream.buffer.release(&*self.gpu);
            }
        }
        self.scene_buffer.borrow_mut().release(&*self.gpu);
        self.post.release_buffers(&*self.gpu);
        self.gpu.render_end();

        info!("render manager destroyed");
    }
}
