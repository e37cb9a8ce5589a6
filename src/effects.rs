//! Effect hooks and render signals
//!
//! Plugins attach no-argument effect hooks at three points of the frame:
//! before any scene rendering (`Pre`), after the scene but before cursors
//! (`Overlay`), and after the swap (`Post`). Hooks run in insertion order
//! and may register or remove hooks while running; the list is snapshotted
//! before each run so mid-iteration edits only affect the next run.
//!
//! The signal registry carries the named notifications the pipeline emits
//! (`workspace-stream-pre`, `workspace-stream-post`, `start-rendering`)
//! with the same snapshot discipline.

use crate::framebuffer::RenderTarget;
use crate::region::Region;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Where in the frame an effect hook runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectPhase {
    /// Before damage collection and scene rendering
    Pre,
    /// After the scene, before software cursors
    Overlay,
    /// After the buffer swap
    Post,
}

impl EffectPhase {
    fn index(self) -> usize {
        match self {
            EffectPhase::Pre => 0,
            EffectPhase::Overlay => 1,
            EffectPhase::Post => 2,
        }
    }
}

/// Registration token for an effect hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectId(u64);

type Hook = Rc<RefCell<dyn FnMut()>>;

/// Ordered per-phase hook lists
#[derive(Default)]
pub struct EffectRegistry {
    phases: [RefCell<Vec<(EffectId, Hook)>>; 3],
    next_id: Cell<u64>,
}

impl EffectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook to a phase. Duplicates are accepted and keep their
    /// insertion order.
    pub fn add(&self, phase: EffectPhase, hook: impl FnMut() + 'static) -> EffectId {
        let id = EffectId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.phases[phase.index()]
            .borrow_mut()
            .push((id, Rc::new(RefCell::new(hook))));
        id
    }

    /// Remove a hook by token; unknown tokens are a no-op
    pub fn remove(&self, phase: EffectPhase, id: EffectId) {
        self.phases[phase.index()]
            .borrow_mut()
            .retain(|(hook_id, _)| *hook_id != id);
    }

    /// Run one phase over a snapshot of its current hooks
    pub fn run(&self, phase: EffectPhase) {
        let snapshot: Vec<Hook> = self.phases[phase.index()]
            .borrow()
            .iter()
            .map(|(_, hook)| hook.clone())
            .collect();

        for hook in snapshot {
            (hook.borrow_mut())();
        }
    }

    #[cfg(test)]
    fn len(&self, phase: EffectPhase) -> usize {
        self.phases[phase.index()].borrow().len()
    }
}

/// Payload of a named render signal
pub enum Signal<'a> {
    /// A workspace stream is about to render `damage` into `target`
    WorkspaceStreamPre {
        damage: &'a Region,
        target: &'a RenderTarget,
    },
    /// A workspace stream finished rendering into `target`
    WorkspaceStreamPost { target: &'a RenderTarget },
    /// Output inhibit was lifted; rendering resumes
    StartRendering,
}

impl Signal<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Signal::WorkspaceStreamPre { .. } => "workspace-stream-pre",
            Signal::WorkspaceStreamPost { .. } => "workspace-stream-post",
            Signal::StartRendering => "start-rendering",
        }
    }
}

/// Registration token for a signal listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalId(u64);

type Listener = Rc<RefCell<dyn FnMut(&Signal)>>;

/// Named listener lists, insertion-ordered
#[derive(Default)]
pub struct SignalRegistry {
    listeners: RefCell<Vec<(SignalId, String, Listener)>>,
    next_id: Cell<u64>,
}

impl SignalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, name: &str, listener: impl FnMut(&Signal) + 'static) -> SignalId {
        let id = SignalId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().push((
            id,
            name.to_owned(),
            Rc::new(RefCell::new(listener)),
        ));
        id
    }

    pub fn disconnect(&self, id: SignalId) {
        self.listeners
            .borrow_mut()
            .retain(|(listener_id, _, _)| *listener_id != id);
    }

    pub fn emit(&self, signal: &Signal) {
        let snapshot: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(_, name, _)| name == signal.name())
            .map(|(_, _, listener)| listener.clone())
            .collect();

        for listener in snapshot {
            (listener.borrow_mut())(signal);
        }
    }
}
