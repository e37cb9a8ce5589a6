//! OpenGL implementation of the GPU context contract
//!
//! The embedding compositor owns the native context (EGL/GLX) and hands us
//! two hooks to make it current around a frame; everything else is plain
//! GL: framebuffer/texture pairs for offscreen targets, scissored clears,
//! viewport management.

use crate::framebuffer::RenderTarget;
use crate::geometry::Rect;
use crate::server::GpuContext;
use anyhow::Result;
use std::cell::Cell;
use std::ffi::c_void;
use tracing::{error, info, trace};

pub struct GlGpu {
    bind_hook: Box<dyn Fn()>,
    unbind_hook: Box<dyn Fn()>,
    /// Height of the currently bound viewport, for scissor Y flipping
    viewport_height: Cell<i32>,
}

impl GlGpu {
    /// Load GL symbols through `loader` and remember the context hooks.
    /// The loader is typically `eglGetProcAddress`/`glXGetProcAddress`
    /// from the embedder.
    pub fn new(
        mut loader: impl FnMut(&str) -> *const c_void,
        bind_hook: impl Fn() + 'static,
        unbind_hook: impl Fn() + 'static,
    ) -> Result<Self> {
        gl::load_with(|symbol| loader(symbol));

        let version = unsafe {
            let data = gl::GetString(gl::VERSION);
            if data.is_null() {
                anyhow::bail!("GL context not current while loading symbols");
            }
            std::ffi::CStr::from_ptr(data as *const _)
                .to_string_lossy()
                .into_owned()
        };
        info!("GL renderer initialized: {}", version);

        Ok(Self {
            bind_hook: Box::new(bind_hook),
            unbind_hook: Box::new(unbind_hook),
            viewport_height: Cell::new(0),
        })
    }
}

impl GpuContext for GlGpu {
    fn bind_output(&self) {
        (self.bind_hook)();
    }

    fn unbind_output(&self) {
        (self.unbind_hook)();
    }

    fn render_begin(&self) {
        // resource scope; nothing to bind
    }

    fn render_to(&self, target: &RenderTarget) {
        unsafe {
            gl::BindFramebuffer(gl::FRAMEBUFFER, target.fb);
            gl::Viewport(0, 0, target.viewport_width, target.viewport_height);
        }
        self.viewport_height.set(target.viewport_height);
    }

    fn render_to_display(&self, width: i32, height: i32) {
        unsafe {
            gl::BindFramebuffer(gl::FRAMEBUFFER, 0);
            gl::Viewport(0, 0, width, height);
        }
        self.viewport_height.set(height);
    }

    fn render_end(&self) {
        unsafe {
            gl::Disable(gl::SCISSOR_TEST);
            gl::BindFramebuffer(gl::FRAMEBUFFER, 0);
        }
    }

    fn clear(&self, color: [f32; 4]) {
        unsafe {
            gl::ClearColor(color[0], color[1], color[2], color[3]);
            gl::Clear(gl::COLOR_BUFFER_BIT | gl::DEPTH_BUFFER_BIT);
        }
    }

    fn scissor(&self, area: Option<Rect>) {
        match area {
            Some(rect) => unsafe {
                gl::Enable(gl::SCISSOR_TEST);
                // GL scissor boxes are bottom-left anchored
                let flipped_y = self.viewport_height.get() - (rect.y + rect.height);
                gl::Scissor(rect.x, flipped_y, rect.width, rect.height);
            },
            None => unsafe {
                gl::Disable(gl::SCISSOR_TEST);
            },
        }
    }

    fn create_buffer(&self, width: i32, height: i32) -> (u32, u32) {
        unsafe {
            let mut tex = 0;
            gl::GenTextures(1, &mut tex);
            gl::BindTexture(gl::TEXTURE_2D, tex);
            gl::TexImage2D(
                gl::TEXTURE_2D,
                0,
                gl::RGBA as i32,
                width,
                height,
                0,
                gl::RGBA,
                gl::UNSIGNED_BYTE,
                std::ptr::null(),
            );
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, gl::LINEAR as i32);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, gl::LINEAR as i32);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, gl::CLAMP_TO_EDGE as i32);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_T, gl::CLAMP_TO_EDGE as i32);

            let mut fb = 0;
            gl::GenFramebuffers(1, &mut fb);
            gl::BindFramebuffer(gl::FRAMEBUFFER, fb);
            gl::FramebufferTexture2D(
                gl::FRAMEBUFFER,
                gl::COLOR_ATTACHMENT0,
                gl::TEXTURE_2D,
                tex,
                0,
            );

            let status = gl::CheckFramebufferStatus(gl::FRAMEBUFFER);
            if status != gl::FRAMEBUFFER_COMPLETE {
                error!("Framebuffer incomplete: status 0x{:x}", status);
            }

            gl::BindFramebuffer(gl::FRAMEBUFFER, 0);
            gl::BindTexture(gl::TEXTURE_2D, 0);

            trace!("created buffer fb={} tex={} {}x{}", fb, tex, width, height);
            (fb, tex)
        }
    }

    fn resize_buffer(&self, _fb: u32, tex: u32, width: i32, height: i32) {
        unsafe {
            gl::BindTexture(gl::TEXTURE_2D, tex);
            gl::TexImage2D(
                gl::TEXTURE_2D,
                0,
                gl::RGBA as i32,
                width,
                height,
                0,
                gl::RGBA,
                gl::UNSIGNED_BYTE,
                std::ptr::null(),
            );
            gl::BindTexture(gl::TEXTURE_2D, 0);
        }
    }

    fn destroy_buffer(&self, fb: u32, tex: u32) {
        unsafe {
            gl::DeleteFramebuffers(1, &fb);
            gl::DeleteTextures(1, &tex);
        }
    }
}
