//! An incremental UI reconciliation engine: declarative element
//! descriptions in, a minimal stream of host mutations out. Work is
//! split into fiber-sized units that can be prioritized, paused, and
//! resumed; commits are atomic; failures route to the nearest error
//! boundary.
//!
//! The engine is host-agnostic: everything platform-specific enters
//! through the [`HostConfig`] trait.

use std::cell::RefCell;
use std::rc::Rc;

pub mod component;
pub mod element;
pub mod fiber;
pub mod fiber_flags;
pub mod host_config;
pub mod update_queue;
pub mod work_tags;

mod begin_work;
mod child_fiber;
mod commit_work;
mod complete_work;
mod fiber_context;
mod fiber_error;
mod host_context;
mod work_loop;

pub use component::Component;
pub use element::{
    AttrMap, Children, Element, ElementKind, PropValue, Props, RefHandle, StateMap,
};
pub use fiber::{FiberNode, FiberRootNode};
pub use fiber_error::{CapturedError, ErrorPhase, ReconcileError, RenderError};
pub use host_config::{
    AnimationCallback, DeferredCallback, HostConfig, HostContext, HostInstance,
};
pub use update_queue::{UpdateAction, UpdateCallback};
pub use weft_scheduler::{Deadline, PriorityLevel};

use work_loop::WorkLoop;

/// One reconciler instance: owns its scheduler state outright, so
/// multiple instances (one per independent host) never interfere.
pub struct Reconciler {
    work_loop: Rc<WorkLoop>,
}

impl Reconciler {
    pub fn new(host: Rc<dyn HostConfig>) -> Reconciler {
        Reconciler {
            work_loop: WorkLoop::new(host),
        }
    }

    /// Creates a root record for a mount point. Nothing renders until
    /// [`update_container`](Self::update_container) is called.
    pub fn create_container(&self, container: HostInstance) -> Rc<RefCell<FiberRootNode>> {
        self.work_loop.create_container(container)
    }

    /// Creates a root and renders the first description into it in one
    /// call.
    pub fn mount_container(
        &self,
        children: Children,
        container: HostInstance,
        parent_context: Option<StateMap>,
        on_complete: Option<UpdateCallback>,
    ) -> Result<Rc<RefCell<FiberRootNode>>, ReconcileError> {
        let root = self.create_container(container);
        WorkLoop::update_container(
            &self.work_loop,
            children,
            &root,
            parent_context,
            on_complete,
        )?;
        Ok(root)
    }

    /// Renders `children` into the root at the ambient default priority.
    pub fn update_container(
        &self,
        children: Children,
        root: &Rc<RefCell<FiberRootNode>>,
    ) -> Result<(), ReconcileError> {
        WorkLoop::update_container(&self.work_loop, children, root, None, None)
    }

    /// Full form: a parent context seeds the ambient context stack, and
    /// the completion callback fires from the commit lifecycle pass once
    /// the tree has landed.
    pub fn update_container_with(
        &self,
        children: Children,
        root: &Rc<RefCell<FiberRootNode>>,
        parent_context: Option<StateMap>,
        on_complete: Option<UpdateCallback>,
    ) -> Result<(), ReconcileError> {
        WorkLoop::update_container(&self.work_loop, children, root, parent_context, on_complete)
    }

    /// Synchronously unmounts everything under the root.
    pub fn unmount_container(
        &self,
        root: &Rc<RefCell<FiberRootNode>>,
    ) -> Result<(), ReconcileError> {
        WorkLoop::unmount_container(&self.work_loop, root)
    }

    /// First host instance in the committed tree, if any.
    pub fn find_host_instance(
        &self,
        root: &Rc<RefCell<FiberRootNode>>,
    ) -> Option<HostInstance> {
        self.work_loop.find_host_instance(root)
    }

    /// Runs `f` with the ambient default priority swapped, so updates it
    /// issues are scheduled at `priority`.
    pub fn perform_with_priority(
        &self,
        priority: PriorityLevel,
        f: impl FnOnce(),
    ) -> Result<(), ReconcileError> {
        WorkLoop::perform_with_priority(&self.work_loop, priority, f)
    }

    /// Coalesces every update issued inside `f` into a single pass that
    /// flushes when `f` returns.
    pub fn batched_updates(&self, f: impl FnOnce()) -> Result<(), ReconcileError> {
        WorkLoop::batched_updates(&self.work_loop, f)
    }
}
