use std::any::Any;
use std::rc::Rc;

use weft_scheduler::Deadline;

use crate::element::Props;
use crate::fiber_error::{ReconcileError, RenderError};

/// Opaque handle to a platform node. The engine never looks inside; it
/// only threads these between host operations.
pub type HostInstance = Rc<dyn Any>;

/// Opaque per-subtree host information (e.g. namespace), produced by
/// `get_child_host_context` and stacked by the engine during render.
pub type HostContext = Rc<dyn Any>;

/// Continuation handed to the host's idle-callback primitive. The
/// returned result carries any error that escaped every boundary during
/// the tick, since there is no caller left to rethrow to.
pub type DeferredCallback = Box<dyn FnOnce(&dyn Deadline) -> Result<(), ReconcileError>>;

/// Continuation handed to the host's animation-frame primitive.
pub type AnimationCallback = Box<dyn FnOnce() -> Result<(), ReconcileError>>;

/// The capability set a platform adapter supplies. Everything the engine
/// knows about the host tree goes through here; mutating operations
/// return `Result` so a host failure can be captured per effect without
/// abandoning the rest of the commit.
pub trait HostConfig {
    fn create_instance(
        &self,
        tag: &str,
        props: &Props,
        root_container: &HostInstance,
        host_context: &HostContext,
    ) -> HostInstance;

    fn create_text_instance(&self, text: &str) -> HostInstance;

    /// Wiring during the build-up of a not-yet-committed subtree.
    fn append_initial_child(&self, parent: &HostInstance, child: &HostInstance);

    fn append_child(&self, parent: &HostInstance, child: &HostInstance)
        -> Result<(), RenderError>;

    fn insert_before(
        &self,
        parent: &HostInstance,
        child: &HostInstance,
        before: &HostInstance,
    ) -> Result<(), RenderError>;

    fn remove_child(&self, parent: &HostInstance, child: &HostInstance)
        -> Result<(), RenderError>;

    /// Returns true when the instance needs a commit-time Update effect
    /// (e.g. focus-type side effects that must run after attachment).
    fn finalize_initial_children(
        &self,
        instance: &HostInstance,
        props: &Props,
        root_container: &HostInstance,
    ) -> bool;

    /// Diffs old against new props; true means commit an Update.
    fn prepare_update(
        &self,
        instance: &HostInstance,
        old_props: &Props,
        new_props: &Props,
    ) -> bool;

    fn commit_update(
        &self,
        instance: &HostInstance,
        old_props: &Props,
        new_props: &Props,
        root_container: &HostInstance,
    ) -> Result<(), RenderError>;

    fn commit_text_update(
        &self,
        text_instance: &HostInstance,
        old_text: &str,
        new_text: &str,
    ) -> Result<(), RenderError>;

    fn reset_text_content(&self, instance: &HostInstance) -> Result<(), RenderError>;

    fn root_host_context(&self) -> HostContext {
        Rc::new(())
    }

    fn get_child_host_context(&self, parent: &HostContext, tag: &str) -> HostContext;

    /// True when children are plain text the host sets directly on the
    /// instance instead of the engine creating text children.
    fn should_set_text_content(&self, tag: &str, props: &Props) -> bool;

    /// Cooperative yield points. The host invokes the callback when idle
    /// time (deferred) or the next frame (animation) arrives.
    fn schedule_deferred_callback(&self, callback: DeferredCallback);
    fn schedule_animation_callback(&self, callback: AnimationCallback);

    /// Matched pair bracketing every host-mutation pass, success or not
    /// (e.g. suppress event delivery, save and restore selection).
    fn prepare_for_commit(&self);
    fn reset_after_commit(&self);
}
