//! Recording collaborators for tests
//!
//! Minimal implementations of the display-server and scene-graph
//! contracts that log every call, so the frame tests can assert on what
//! actually reached the display.

use crate::framebuffer::RenderTarget;
use crate::geometry::{Rect, Transform};
use crate::region::Region;
use crate::scene::{DragIcon, InputManager, LayerMask, Surface, View, ViewRole, WorkspaceManager};
use crate::server::{EventLoop, GpuContext, IdleToken, Output};
use anyhow::Result;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Instant;

// ---- display server -----------------------------------------------

pub struct MockOutput {
    pub width: i32,
    pub height: i32,
    pub destroyed: Cell<bool>,
    /// Display-side damage tracking, returned by `make_current`
    pub tracked: RefCell<Region>,
    pub frames_scheduled: Cell<u32>,
    pub swaps: RefCell<Vec<Region>>,
    pub needs_swap: Cell<bool>,
    pub fail_make_current: Cell<bool>,
    pub cursor_passes: RefCell<Vec<Region>>,
}

impl MockOutput {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            destroyed: Cell::new(false),
            tracked: RefCell::new(Region::new()),
            frames_scheduled: Cell::new(0),
            swaps: RefCell::new(Vec::new()),
            needs_swap: Cell::new(true),
            fail_make_current: Cell::new(false),
            cursor_passes: RefCell::new(Vec::new()),
        }
    }

    /// Inject damage on the display side, as an aged swapchain would
    pub fn pending_display_damage(&self, region: Region) {
        self.tracked.borrow_mut().add_region(&region);
    }
}

impl Output for MockOutput {
    fn size(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    fn transformed_resolution(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    fn scale(&self) -> i32 {
        1
    }

    fn transform(&self) -> Transform {
        Transform::Normal
    }

    fn relative_geometry(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    fn schedule_frame(&self) {
        self.frames_scheduled.set(self.frames_scheduled.get() + 1);
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    fn track_rect(&self, rect: Rect) {
        self.tracked.borrow_mut().add_rect(&rect);
    }

    fn track_region(&self, region: &Region) {
        self.tracked.borrow_mut().add_region(region);
    }

    fn make_current(&self, out_damage: &mut Region) -> Result<bool> {
        if self.fail_make_current.get() {
            anyhow::bail!("context lost");
        }
        out_damage.add_region(&self.tracked.borrow());
        Ok(self.needs_swap.get())
    }

    fn swap_buffers(&self, _when: Instant, swap_damage: &Region) {
        self.swaps.borrow_mut().push(swap_damage.clone());
        self.tracked.borrow_mut().clear();
    }

    fn render_software_cursors(&self, damage: &Region) {
        self.cursor_passes.borrow_mut().push(damage.clone());
    }
}

type IdleCallback = Box<dyn FnOnce()>;

#[derive(Default)]
pub struct MockEventLoop {
    queue: RefCell<Vec<(IdleToken, IdleCallback)>>,
    next_token: Cell<u64>,
}

impl MockEventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run everything currently queued; returns how many callbacks ran
    pub fn dispatch_idle(&self) -> usize {
        let queued: Vec<_> = self.queue.borrow_mut().drain(..).collect();
        let count = queued.len();
        for (_, callback) in queued {
            callback();
        }
        count
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }
}

impl EventLoop for MockEventLoop {
    fn add_idle(&self, callback: IdleCallback) -> IdleToken {
        let token = IdleToken(self.next_token.get());
        self.next_token.set(token.0 + 1);
        self.queue.borrow_mut().push((token, callback));
        token
    }

    fn remove(&self, token: IdleToken) {
        self.queue.borrow_mut().retain(|(t, _)| *t != token);
    }
}

#[derive(Default)]
pub struct MockGpu {
    pub created: RefCell<Vec<(u32, u32)>>,
    pub resized: RefCell<Vec<(u32, u32, i32, i32)>>,
    pub destroyed: RefCell<Vec<(u32, u32)>>,
    /// `(bound fb, color)` for every clear
    pub clears: RefCell<Vec<(u32, [f32; 4])>>,
    pub scissors: RefCell<Vec<Option<Rect>>>,
    /// fb ids bound through `render_to` / `render_to_display`
    pub bound_targets: RefCell<Vec<u32>>,
    current_fb: Cell<u32>,
    next_id: Cell<u32>,
}

impl MockGpu {
    pub fn new() -> Self {
        let gpu = Self::default();
        gpu.next_id.set(1);
        gpu
    }
}

impl GpuContext for MockGpu {
    fn bind_output(&self) {}

    fn unbind_output(&self) {}

    fn render_begin(&self) {}

    fn render_to(&self, target: &RenderTarget) {
        self.current_fb.set(target.fb);
        self.bound_targets.borrow_mut().push(target.fb);
    }

    fn render_to_display(&self, _width: i32, _height: i32) {
        self.current_fb.set(0);
        self.bound_targets.borrow_mut().push(0);
    }

    fn render_end(&self) {}

    fn clear(&self, color: [f32; 4]) {
        self.clears.borrow_mut().push((self.current_fb.get(), color));
    }

    fn scissor(&self, area: Option<Rect>) {
        self.scissors.borrow_mut().push(area);
    }

    fn create_buffer(&self, _width: i32, _height: i32) -> (u32, u32) {
        let fb = self.next_id.get();
        let tex = fb + 1;
        self.next_id.set(fb + 2);
        self.created.borrow_mut().push((fb, tex));
        (fb, tex)
    }

    fn resize_buffer(&self, fb: u32, tex: u32, width: i32, height: i32) {
        self.resized.borrow_mut().push((fb, tex, width, height));
    }

    fn destroy_buffer(&self, fb: u32, tex: u32) {
        self.destroyed.borrow_mut().push((fb, tex));
    }
}

// ---- scene graph ---------------------------------------------------

type DrawLog = Rc<RefCell<Vec<&'static str>>>;

pub struct MockSurface {
    pub name: &'static str,
    pub geometry: Rect,
    pub alpha: Cell<f32>,
    /// Surface-local opaque rect subtracted during culling
    pub opaque: Cell<Option<Rect>>,
    pub mapped: Cell<bool>,
    /// `(damage, target fb, target geometry origin)` per render
    pub renders: RefCell<Vec<(Region, u32, (i32, i32))>>,
    pub frames_done: Cell<u32>,
    shared_log: RefCell<Option<DrawLog>>,
}

impl MockSurface {
    /// Fully opaque surface of the given size
    pub fn new(name: &'static str, geometry: Rect) -> Rc<Self> {
        Rc::new(Self {
            name,
            geometry,
            alpha: Cell::new(1.0),
            opaque: Cell::new(Some(Rect::new(0, 0, geometry.width, geometry.height))),
            mapped: Cell::new(true),
            renders: RefCell::new(Vec::new()),
            frames_done: Cell::new(0),
            shared_log: RefCell::new(None),
        })
    }

    /// Record draw order into a log shared between surfaces
    pub fn set_draw_log(&self, log: DrawLog) {
        *self.shared_log.borrow_mut() = Some(log);
    }

    pub fn render_count(&self) -> usize {
        self.renders.borrow().len()
    }
}

impl Surface for MockSurface {
    fn is_mapped(&self) -> bool {
        self.mapped.get()
    }

    fn output_geometry(&self) -> Rect {
        self.geometry
    }

    fn alpha(&self) -> f32 {
        self.alpha.get()
    }

    fn subtract_opaque(&self, damage: &mut Region, x: i32, y: i32) {
        if let Some(opaque) = self.opaque.get() {
            damage.subtract_rect(&opaque.translated(x, y));
        }
    }

    fn render(&self, damage: &Region, target: &RenderTarget) {
        self.renders.borrow_mut().push((
            damage.clone(),
            target.fb,
            (target.geometry.x, target.geometry.y),
        ));
        if let Some(log) = self.shared_log.borrow().as_ref() {
            log.borrow_mut().push(self.name);
        }
    }

    fn send_frame_done(&self, _when: Instant) {
        self.frames_done.set(self.frames_done.get() + 1);
    }
}

pub struct MockView {
    /// `(surface, x, y)` in stacking order within the view
    pub surfaces: RefCell<Vec<(Rc<MockSurface>, i32, i32)>>,
    pub mapped: Cell<bool>,
    pub visible: Cell<bool>,
    pub transformer: Cell<bool>,
    pub role: ViewRole,
    pub bbox: Cell<Rect>,
    /// Renders taken through the snapshot path
    pub snapshot_renders: RefCell<Vec<(Region, u32)>>,
}

impl MockView {
    /// A plain toplevel with one opaque surface at `(x, y)`
    pub fn toplevel(name: &'static str, x: i32, y: i32, width: i32, height: i32) -> Rc<Self> {
        let surface = MockSurface::new(name, Rect::new(x, y, width, height));
        Rc::new(Self {
            surfaces: RefCell::new(vec![(surface, x, y)]),
            mapped: Cell::new(true),
            visible: Cell::new(true),
            transformer: Cell::new(false),
            role: ViewRole::Toplevel,
            bbox: Cell::new(Rect::new(x, y, width, height)),
            snapshot_renders: RefCell::new(Vec::new()),
        })
    }

    /// A shell component (panel, dock) in output coordinates
    pub fn shell(name: &'static str, x: i32, y: i32, width: i32, height: i32) -> Rc<Self> {
        let surface = MockSurface::new(name, Rect::new(x, y, width, height));
        Rc::new(Self {
            surfaces: RefCell::new(vec![(surface, x, y)]),
            mapped: Cell::new(true),
            visible: Cell::new(true),
            transformer: Cell::new(false),
            role: ViewRole::Shell,
            bbox: Cell::new(Rect::new(x, y, width, height)),
            snapshot_renders: RefCell::new(Vec::new()),
        })
    }

    pub fn main_surface(&self) -> Rc<MockSurface> {
        self.surfaces.borrow()[0].0.clone()
    }
}

impl Surface for MockView {
    fn is_mapped(&self) -> bool {
        self.mapped.get()
    }

    fn output_geometry(&self) -> Rect {
        self.bbox.get()
    }

    fn alpha(&self) -> f32 {
        1.0
    }

    fn subtract_opaque(&self, _damage: &mut Region, _x: i32, _y: i32) {}

    fn render(&self, damage: &Region, target: &RenderTarget) {
        self.snapshot_renders
            .borrow_mut()
            .push((damage.clone(), target.fb));
    }

    fn send_frame_done(&self, _when: Instant) {}
}

impl View for MockView {
    fn is_visible(&self) -> bool {
        self.visible.get()
    }

    fn has_transformer(&self) -> bool {
        self.transformer.get()
    }

    fn role(&self) -> ViewRole {
        self.role
    }

    fn bounding_box(&self) -> Rect {
        self.bbox.get()
    }

    fn for_each_surface(&self, f: &mut dyn FnMut(Rc<dyn Surface>, i32, i32)) {
        for (surface, x, y) in self.surfaces.borrow().iter() {
            f(surface.clone(), *x, *y);
        }
    }
}

pub struct MockWorkspaceManager {
    pub grid: (i32, i32),
    pub current: Cell<(i32, i32)>,
    /// `(workspace, layer, view)`, frontmost first
    pub views: RefCell<Vec<((i32, i32), LayerMask, Rc<MockView>)>>,
}

impl MockWorkspaceManager {
    pub fn new(grid: (i32, i32)) -> Self {
        Self {
            grid,
            current: Cell::new((0, 0)),
            views: RefCell::new(Vec::new()),
        }
    }

    /// Append behind everything already added
    pub fn add_view(&self, ws: (i32, i32), layer: LayerMask, view: Rc<MockView>) {
        self.views.borrow_mut().push((ws, layer, view));
    }
}

impl WorkspaceManager for MockWorkspaceManager {
    fn grid_size(&self) -> (i32, i32) {
        self.grid
    }

    fn current_workspace(&self) -> (i32, i32) {
        self.current.get()
    }

    fn views_on_workspace(&self, ws: (i32, i32), layers: LayerMask) -> Vec<Rc<dyn View>> {
        self.views
            .borrow()
            .iter()
            .filter(|(view_ws, layer, _)| *view_ws == ws && layers.intersects(*layer))
            .map(|(_, _, view)| view.clone() as Rc<dyn View>)
            .collect()
    }

    fn for_each_view(&self, layers: LayerMask, f: &mut dyn FnMut(&dyn View)) {
        for (_, layer, view) in self.views.borrow().iter() {
            if layers.intersects(*layer) {
                f(&**view);
            }
        }
    }
}

pub struct MockDragIcon {
    pub mapped: Cell<bool>,
    pub surfaces: RefCell<Vec<(Rc<MockSurface>, i32, i32)>>,
    /// Every `set_output` call: true = attached, false = detached
    pub output_changes: RefCell<Vec<bool>>,
}

impl MockDragIcon {
    pub fn new(surface: Rc<MockSurface>, x: i32, y: i32) -> Rc<Self> {
        Rc::new(Self {
            mapped: Cell::new(true),
            surfaces: RefCell::new(vec![(surface, x, y)]),
            output_changes: RefCell::new(Vec::new()),
        })
    }
}

impl DragIcon for MockDragIcon {
    fn is_mapped(&self) -> bool {
        self.mapped.get()
    }

    fn set_output(&self, output: Option<Rc<dyn Output>>) {
        self.output_changes.borrow_mut().push(output.is_some());
    }

    fn for_each_surface(&self, f: &mut dyn FnMut(Rc<dyn Surface>, i32, i32)) {
        for (surface, x, y) in self.surfaces.borrow().iter() {
            f(surface.clone(), *x, *y);
        }
    }
}

#[derive(Default)]
pub struct MockInput {
    pub icons: RefCell<Vec<Rc<MockDragIcon>>>,
}

impl MockInput {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InputManager for MockInput {
    fn drag_icons(&self) -> Vec<Rc<dyn DragIcon>> {
        self.icons
            .borrow()
            .iter()
            .map(|icon| icon.clone() as Rc<dyn DragIcon>)
            .collect()
    }
}
