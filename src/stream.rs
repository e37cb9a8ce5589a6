//! Workspace streams
//!
//! A stream snapshots one workspace of the grid into a render target,
//! repainting only the damaged parts. The manager keeps one dormant stream
//! per grid cell for the on-screen scene; plugins (switchers, zoom-out
//! views) create their own streams, which render offscreen into the
//! stream's cached framebuffer so the texture can be composited anywhere.
//!
//! Culling runs front-to-back: every opaque surface subtracts its opaque
//! region from the remaining workspace damage, records whose damage comes
//! up empty are discarded, and collection stops outright once nothing is
//! left. Drawing then replays the surviving records back-to-front.

use crate::effects::Signal;
use crate::framebuffer::Framebuffer;
use crate::geometry::Rect;
use crate::manager::RenderManager;
use crate::region::Region;
use crate::scene::{LayerMask, Surface, View, ViewRole};
use std::rc::Rc;
use tracing::{debug, trace};

/// Per-workspace render state
pub struct WorkspaceStream {
    /// Grid cell this stream renders
    pub ws: (i32, i32),
    /// Cached backing; stays unallocated for streams that render straight
    /// into the scene target
    pub buffer: Framebuffer,
    pub running: bool,
    /// Requested render scale. Scaled rendering is experimental and
    /// currently ignored by the render itself.
    pub scale: (f32, f32),
}

impl WorkspaceStream {
    pub fn new(ws: (i32, i32)) -> Self {
        Self {
            ws,
            buffer: Framebuffer::unallocated(),
            running: false,
            scale: (1.0, 1.0),
        }
    }
}

/// One culled draw: a surface, its view offset and the damage it repaints
struct DamagedSurface {
    surface: Rc<dyn Surface>,
    offset: (i32, i32),
    damage: Region,
}

fn schedule_surface(
    to_render: &mut Vec<DamagedSurface>,
    ws_damage: &mut Region,
    scale: i32,
    surface: Rc<dyn Surface>,
    x: i32,
    y: i32,
    offset: (i32, i32),
) {
    if !surface.is_mapped() || ws_damage.is_empty() {
        return;
    }

    // bring the surface position into workspace-local coords
    let x = x - offset.0;
    let y = y - offset.1;

    let mut obox = surface.output_geometry();
    obox.x = x;
    obox.y = y;
    let obox = obox.to_output_pixels(scale);

    let mut damage = Region::from_rect(obox);
    damage.intersect_region(ws_damage);
    if damage.is_empty() {
        return;
    }

    if surface.alpha() >= 0.999 {
        surface.subtract_opaque(ws_damage, x, y);
    }

    to_render.push(DamagedSurface {
        surface,
        offset,
        damage,
    });
}

fn schedule_snapshotted_view(
    to_render: &mut Vec<DamagedSurface>,
    ws_damage: &Region,
    scale: i32,
    view: Rc<dyn View>,
    offset: (i32, i32),
) {
    let bbox = view
        .bounding_box()
        .translated(-offset.0, -offset.1)
        .to_output_pixels(scale);

    let mut damage = Region::from_rect(bbox);
    damage.intersect_region(ws_damage);
    if damage.is_empty() {
        return;
    }

    to_render.push(DamagedSurface {
        surface: view,
        offset,
        damage,
    });
}

impl RenderManager {
    /// Frame damage falling inside `ws`, translated to workspace-local
    /// coordinates
    pub fn workspace_damage(&self, ws: (i32, i32)) -> Region {
        let (vx, vy) = ws;
        let (cx, cy) = self.workspaces.current_workspace();
        let (sw, sh) = self.output.transformed_resolution();

        let mut out = self.frame_damage.borrow().clone();
        out.intersect_rect(&Rect::new((vx - cx) * sw, (vy - cy) * sh, sw, sh));
        out.translate((cx - vx) * sw, (cy - vy) * sh);
        out
    }

    /// Begin streaming: force a full repaint of the workspace, then render
    pub fn workspace_stream_start(&self, stream: &mut WorkspaceStream) {
        self.stream_start(stream, true);
    }

    /// Repaint the stream's damaged parts. The scale arguments are an
    /// experimental hook: a change forces a full repaint but the render
    /// itself still runs at 1:1.
    pub fn workspace_stream_update(
        &self,
        stream: &mut WorkspaceStream,
        scale_x: f32,
        scale_y: f32,
    ) {
        self.stream_render(stream, scale_x, scale_y, true);
    }

    /// End streaming. The cached framebuffer is retained.
    pub fn workspace_stream_stop(&self, stream: &mut WorkspaceStream) {
        debug!("stopping workspace stream {:?}", stream.ws);
        stream.running = false;
    }

    pub(crate) fn stream_start(&self, stream: &mut WorkspaceStream, allocate_backing: bool) {
        debug!("starting workspace stream {:?}", stream.ws);
        stream.running = true;
        stream.scale = (1.0, 1.0);

        let (vx, vy) = stream.ws;
        let (cx, cy) = self.workspaces.current_workspace();
        let (sw, sh) = self.output.transformed_resolution();

        // damage the whole workspace so the first update repaints it all
        self.frame_damage
            .borrow_mut()
            .add_rect(&Rect::new((vx - cx) * sw, (vy - cy) * sh, sw, sh));

        self.stream_render(stream, 1.0, 1.0, allocate_backing);
    }

    /// Render one stream. With `allocate_backing` the stream gets (or
    /// keeps) its own framebuffer at output size; without it an
    /// unallocated stream draws into the scene target, which is how the
    /// on-screen workspace is painted.
    pub(crate) fn stream_render(
        &self,
        stream: &mut WorkspaceStream,
        scale_x: f32,
        scale_y: f32,
        allocate_backing: bool,
    ) {
        let g = self.output.relative_geometry();
        let (vx, vy) = stream.ws;
        let (cx, cy) = self.workspaces.current_workspace();

        // workspace offset in the output's relative geometry
        let dx = g.x + (vx - cx) * g.width;
        let dy = g.y + (vy - cy) * g.height;

        let mut ws_damage = self.workspace_damage(stream.ws);

        if (scale_x, scale_y) != stream.scale {
            // scaled rendering is not enabled yet; a scale change still
            // invalidates everything rendered so far
            let (sw, sh) = self.output.transformed_resolution();
            ws_damage.add_rect(&Rect::new(0, 0, sw, sh));
        }

        if ws_damage.is_empty() {
            return;
        }

        let (width, height) = self.output.size();
        if allocate_backing {
            self.gpu.render_begin();
            stream.buffer.allocate(&*self.gpu, width, height);
            self.gpu.render_end();
        }

        // an unallocated stream renders straight into the scene target
        let base = self.target_framebuffer();
        let target = if stream.buffer.is_allocated() {
            base.with_buffer(stream.buffer.fb, stream.buffer.tex)
        } else {
            base
        };
        trace!("update stream {:?} into fb {}", stream.ws, target.fb);

        self.signals.emit(&Signal::WorkspaceStreamPre {
            damage: &ws_damage,
            target: &target,
        });

        let scale = self.output.scale();
        let mut to_render: Vec<DamagedSurface> = Vec::new();
        let custom_renderer = self.has_renderer();

        // drag icons follow the pointer, not a workspace; re-home them to
        // this output for the duration of the pass
        let icons = self.input.drag_icons();
        if !custom_renderer {
            for icon in &icons {
                if !icon.is_mapped() {
                    continue;
                }
                icon.set_output(Some(self.output.clone()));
                icon.for_each_surface(&mut |surface, x, y| {
                    schedule_surface(&mut to_render, &mut ws_damage, scale, surface, x, y, (0, 0));
                });
            }
        }

        let views = self.workspaces.views_on_workspace(stream.ws, LayerMask::all());
        for view in views {
            if ws_damage.is_empty() {
                // everything further back is fully occluded
                break;
            }
            if !view.is_visible() {
                continue;
            }

            // shell views position themselves in output coords already
            let offset = match view.role() {
                ViewRole::Shell => (0, 0),
                ViewRole::Toplevel => (dx, dy),
            };

            // A transformed view renders from its snapshot, as does a view
            // that is visible but no longer mapped (kept alive by a
            // plugin). Snapshots cover all subsurfaces in one box.
            if view.has_transformer() || !view.is_mapped() {
                schedule_snapshotted_view(&mut to_render, &ws_damage, scale, view, offset);
                continue;
            }

            view.for_each_surface(&mut |surface, x, y| {
                schedule_surface(&mut to_render, &mut ws_damage, scale, surface, x, y, offset);
            });
        }

        // clear what remains uncovered, scissored to the damage bands
        self.gpu.render_to(&target);
        for rect in ws_damage.rects() {
            self.gpu.scissor(Some(*rect));
            self.gpu.clear([0.0, 0.0, 0.0, 1.0]);
        }
        self.gpu.scissor(None);
        self.gpu.render_end();

        // draw back-to-front; each record repaints only its own damage
        for record in to_render.iter().rev() {
            let mut record_target = target.clone();
            record_target.geometry.x = record.offset.0;
            record_target.geometry.y = record.offset.1;
            record.surface.render(&record.damage, &record_target);
        }

        if !custom_renderer {
            for icon in &icons {
                if icon.is_mapped() {
                    icon.set_output(None);
                }
            }
        }

        self.signals.emit(&Signal::WorkspaceStreamPost { target: &target });
    }
}
