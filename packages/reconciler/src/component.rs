use crate::element::{Children, Props, StateMap};
use crate::fiber_error::{CapturedError, RenderError};
use crate::update_queue::UpdateAction;

/// The narrow contract the engine invokes on stateful components. The
/// implementation object is shared behavior; per-position state lives in
/// the tree and is passed in on every call.
///
/// Everything except `render` has a do-nothing default, so a minimal
/// component is just a render body.
pub trait Component {
    fn initial_state(&self, _props: &Props) -> StateMap {
        StateMap::new()
    }

    fn render(
        &self,
        props: &Props,
        state: &StateMap,
        context: &StateMap,
    ) -> Result<Children, RenderError>;

    /// Update-path gate. Returning false reuses the previous child
    /// subtree; forced updates bypass this entirely.
    fn should_update(
        &self,
        _old_props: &Props,
        _new_props: &Props,
        _old_state: &StateMap,
        _new_state: &StateMap,
    ) -> bool {
        true
    }

    /// Contribution to the ambient context visible to descendants.
    /// Pushed when this component begins, popped when it completes.
    fn child_context(&self, _props: &Props, _state: &StateMap) -> Option<StateMap> {
        None
    }

    /// Error-boundary capability. Returning `Some` claims the error: the
    /// engine unmounts this component's subtree and enqueues the returned
    /// update so the recovery render can produce fallback content.
    fn capture_error(&self, _error: &CapturedError) -> Option<UpdateAction> {
        None
    }

    fn did_mount(&self, _props: &Props, _state: &StateMap) -> Result<(), RenderError> {
        Ok(())
    }

    fn did_update(
        &self,
        _old_props: &Props,
        _new_props: &Props,
        _state: &StateMap,
    ) -> Result<(), RenderError> {
        Ok(())
    }

    /// Errors from unmount hooks are swallowed so teardown always runs to
    /// completion.
    fn will_unmount(&self, _props: &Props, _state: &StateMap) -> Result<(), RenderError> {
        Ok(())
    }
}
