//! Per-output render pipeline for the Ember compositing window system
//!
//! One [`RenderManager`] per display turns damage reports and a scene of
//! surfaces into timed GPU frames: damage accumulates between frame
//! events, workspace streams repaint only what changed with front-to-back
//! occlusion culling, and an optional post-effect chain reprocesses the
//! scene before the buffer swap.
//!
//! The display server, GL context and scene graph stay outside; the
//! compositor injects them through the traits in [`server`] and [`scene`].

pub mod config;
pub mod damage;
pub mod effects;
pub mod framebuffer;
pub mod geometry;
pub mod gl_context;
pub mod manager;
pub mod post;
pub mod region;
pub mod scene;
pub mod server;
pub mod stream;

#[cfg(test)]
pub(crate) mod mock;

pub use config::RenderConfig;
pub use effects::{EffectId, EffectPhase, Signal, SignalId};
pub use framebuffer::{Framebuffer, RenderTarget};
pub use geometry::{Rect, Transform};
pub use manager::RenderManager;
pub use post::PostId;
pub use region::Region;
pub use scene::{DragIcon, InputManager, LayerMask, Surface, View, ViewRole, WorkspaceManager};
pub use server::{EventLoop, GpuContext, IdleToken, Output};
pub use stream::WorkspaceStream;
