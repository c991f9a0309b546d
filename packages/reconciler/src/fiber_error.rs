use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use crate::fiber::{FiberNode, StateNode};
use crate::update_queue::UpdateAction;
use crate::work_tags::WorkTag;

/// Failure raised by user code (render bodies, lifecycle hooks) or by a
/// host mutation. These are the recoverable kind; engine invariant
/// violations panic instead and are never routed through boundaries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("{0}")]
    Message(String),
    #[error("host operation failed: {0}")]
    Host(String),
}

impl RenderError {
    pub fn msg(text: impl Into<String>) -> RenderError {
        RenderError::Message(text.into())
    }
}

impl From<&str> for RenderError {
    fn from(text: &str) -> Self {
        RenderError::msg(text)
    }
}

/// Which phase the failure escaped from. Lifecycle errors get deferred
/// handling; everything else is routed as soon as the current unit ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPhase {
    BeginWork,
    CompleteWork,
    CommitMutation,
    CommitLifecycle,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{phase:?} failed: {error}")]
pub struct CapturedError {
    pub error: RenderError,
    pub phase: ErrorPhase,
}

impl CapturedError {
    pub fn new(error: RenderError, phase: ErrorPhase) -> CapturedError {
        CapturedError { error, phase }
    }
}

/// Error surfaced from a top-level scheduling call. Raised exactly once
/// per batch, after scheduler state has been reset.
#[derive(Debug, PartialEq, Error)]
pub enum ReconcileError {
    #[error("uncaught error escaped to the root: {0}")]
    Uncaught(CapturedError),
}

/// A located recovery target: the boundary fiber plus the state update
/// its component wants applied for the fallback render.
pub(crate) struct BoundaryMatch {
    pub boundary: Rc<RefCell<FiberNode>>,
    pub action: UpdateAction,
}

fn is_same_boundary(a: &Rc<RefCell<FiberNode>>, b: &Rc<RefCell<FiberNode>>) -> bool {
    if Rc::ptr_eq(a, b) {
        return true;
    }
    match a.borrow().alternate.as_ref() {
        Some(alt) => Rc::ptr_eq(alt, b),
        None => false,
    }
}

/// Walks rootward from the failing fiber looking for the nearest class
/// component that claims the error. Boundaries that already failed this
/// batch are skipped so a boundary cannot loop on its own error; no match
/// means the error is uncaught and the caller rethrows once it is safe.
pub(crate) fn find_closest_error_boundary(
    source: &Rc<RefCell<FiberNode>>,
    error: &CapturedError,
    failed_boundaries: &[Rc<RefCell<FiberNode>>],
) -> Option<BoundaryMatch> {
    let mut node = source.borrow()._return.clone();
    while let Some(fiber) = node {
        let next = fiber.borrow()._return.clone();
        if fiber.borrow().tag == WorkTag::ClassComponent {
            let already_failed = failed_boundaries
                .iter()
                .any(|failed| is_same_boundary(failed, &fiber));
            if !already_failed {
                let component = match fiber.borrow().state_node.clone() {
                    Some(StateNode::Component(component)) => Some(component),
                    _ => None,
                };
                if let Some(component) = component {
                    if let Some(action) = component.capture_error(error) {
                        return Some(BoundaryMatch {
                            boundary: fiber,
                            action,
                        });
                    }
                }
            }
        }
        node = next;
    }
    None
}
