use std::cell::RefCell;
use std::rc::Rc;

use crate::child_fiber::{mount_child_fibers, reconcile_child_fibers};
use crate::element::{ElementKind, Props, PropValue, RefHandle};
use crate::fiber::{FiberNode, MemoizedState, StateNode};
use crate::fiber_error::RenderError;
use crate::fiber_flags::Flags;
use crate::host_config::{HostConfig, HostInstance};
use crate::work_loop::PassState;
use crate::work_tags::WorkTag;

type FiberRef = Rc<RefCell<FiberNode>>;

/// Finalizes a fiber whose subtree is done: builds or diffs the host
/// instance, unwinds the pass-scoped stacks, and for coroutines spawns
/// the handler-phase continuation (the one case where completion returns
/// more work).
pub(crate) fn complete_work(
    host: &Rc<dyn HostConfig>,
    pass: &mut PassState,
    work_in_progress: &FiberRef,
) -> Result<Option<FiberRef>, RenderError> {
    let tag = work_in_progress.borrow().tag;
    match tag {
        WorkTag::FunctionComponent | WorkTag::Fragment | WorkTag::YieldComponent => Ok(None),
        WorkTag::IndeterminateComponent => {
            panic!("indeterminate fiber reached completion without rendering")
        }
        WorkTag::ClassComponent => {
            pop_class_provider(pass, work_in_progress);
            Ok(None)
        }
        WorkTag::HostRoot => {
            pass.host_context.pop_container();
            let root = match work_in_progress.borrow().state_node.clone() {
                Some(StateNode::Root(root)) => root,
                other => panic!("host root fiber without a root record: {other:?}"),
            };
            let pending = root.borrow_mut().pending_context.take();
            if pending.is_some() {
                root.borrow_mut().context = pending;
            }
            Ok(None)
        }
        WorkTag::HostPortal => {
            pass.host_context.pop_container();
            Ok(None)
        }
        WorkTag::HostComponent => {
            complete_host_component(host, pass, work_in_progress);
            Ok(None)
        }
        WorkTag::HostText => {
            complete_host_text(host, work_in_progress);
            Ok(None)
        }
        WorkTag::CoroutineComponent => {
            move_coroutine_to_handler_phase(pass, work_in_progress)
        }
        WorkTag::CoroutineHandlerPhase => {
            // Second visit: the continuation finished. Reset for the next
            // render pass.
            work_in_progress.borrow_mut().tag = WorkTag::CoroutineComponent;
            Ok(None)
        }
    }
}

/// Mirrors the push in begin work: recomputed from the same memoized
/// inputs, so push/pop stay balanced on every path.
fn pop_class_provider(pass: &mut PassState, work_in_progress: &FiberRef) {
    let component = match work_in_progress.borrow().state_node.clone() {
        Some(StateNode::Component(component)) => component,
        _ => return,
    };
    let props = work_in_progress.borrow().pending_props.clone();
    let state = match work_in_progress.borrow().memoized_state.clone() {
        Some(MemoizedState::State(map)) => map,
        _ => Default::default(),
    };
    if component.child_context(&props, &state).is_some() {
        pass.context.pop_provider();
    }
}

fn complete_host_component(
    host: &Rc<dyn HostConfig>,
    pass: &mut PassState,
    work_in_progress: &FiberRef,
) {
    let tag = match work_in_progress.borrow().element_kind.clone() {
        Some(ElementKind::Host(tag)) => tag,
        other => panic!("host fiber without a host element: {other:?}"),
    };
    pass.host_context.pop_context();

    let current = work_in_progress.borrow().alternate.clone();
    let existing_instance = match work_in_progress.borrow().state_node.clone() {
        Some(StateNode::Instance(instance)) => Some(instance),
        _ => None,
    };
    let new_props = work_in_progress.borrow().pending_props.clone();

    match (current, existing_instance) {
        (Some(current), Some(instance)) => {
            let old_props = current
                .borrow()
                .memoized_props
                .clone()
                .unwrap_or_else(Props::empty);
            if host.prepare_update(&instance, &old_props, &new_props) {
                work_in_progress.borrow_mut().flags |= Flags::Update;
            }
            if ref_changed(&current, work_in_progress) {
                work_in_progress.borrow_mut().flags |= Flags::Ref;
            }
        }
        _ => {
            // First appearance of this position: build the instance and
            // wire the finished subtree below it while it is still
            // detached from the host tree.
            let container = pass.host_context.current_container();
            let host_context = pass.host_context.current_context();
            let instance = host.create_instance(&tag, &new_props, &container, &host_context);
            append_all_children(host, &instance, work_in_progress);
            work_in_progress.borrow_mut().state_node =
                Some(StateNode::Instance(instance.clone()));
            if host.finalize_initial_children(&instance, &new_props, &container) {
                work_in_progress.borrow_mut().flags |= Flags::Update;
            }
            if work_in_progress.borrow().ref_handle.is_some() {
                work_in_progress.borrow_mut().flags |= Flags::Ref;
            }
        }
    }
}

fn ref_changed(current: &FiberRef, work_in_progress: &FiberRef) -> bool {
    let old_ref = current.borrow().ref_handle.clone();
    let new_ref = work_in_progress.borrow().ref_handle.clone();
    match (old_ref, new_ref) {
        (None, None) => false,
        (Some(old), Some(new)) => !RefHandle::same(&old, &new),
        _ => true,
    }
}

fn complete_host_text(host: &Rc<dyn HostConfig>, work_in_progress: &FiberRef) {
    let new_text = FiberNode::text_of(&work_in_progress.borrow().pending_props);
    let current = work_in_progress.borrow().alternate.clone();
    let existing_instance = match work_in_progress.borrow().state_node.clone() {
        Some(StateNode::Instance(instance)) => Some(instance),
        _ => None,
    };
    match (current, existing_instance) {
        (Some(current), Some(_)) => {
            let old_text = current
                .borrow()
                .memoized_props
                .clone()
                .map(|props| FiberNode::text_of(&props))
                .unwrap_or_default();
            if old_text != new_text {
                work_in_progress.borrow_mut().flags |= Flags::Update;
            }
        }
        _ => {
            let instance = host.create_text_instance(&new_text);
            work_in_progress.borrow_mut().state_node = Some(StateNode::Instance(instance));
        }
    }
}

/// Appends every first-level host instance below `work_in_progress` to
/// the freshly created parent instance. Composite layers are traversed;
/// portal subtrees are skipped because their content lives in another
/// container.
fn append_all_children(
    host: &Rc<dyn HostConfig>,
    parent: &HostInstance,
    work_in_progress: &FiberRef,
) {
    let mut node = work_in_progress.borrow().child.clone();
    while let Some(current) = node.clone() {
        let tag = current.borrow().tag;
        if tag == WorkTag::HostComponent || tag == WorkTag::HostText {
            if let Some(StateNode::Instance(instance)) = current.borrow().state_node.clone() {
                host.append_initial_child(parent, &instance);
            }
        } else if tag != WorkTag::HostPortal {
            if let Some(child) = current.borrow().child.clone() {
                node = Some(child);
                continue;
            }
        }

        // Walk to the next sibling, climbing back up as levels finish.
        loop {
            let current = node.clone().unwrap();
            if Rc::ptr_eq(&current, work_in_progress) {
                return;
            }
            if let Some(sibling) = current.borrow().sibling.clone() {
                node = Some(sibling);
                break;
            }
            let parent_fiber = current.borrow()._return.clone();
            match parent_fiber {
                Some(parent_fiber) => {
                    if Rc::ptr_eq(&parent_fiber, work_in_progress) {
                        return;
                    }
                    node = Some(parent_fiber);
                }
                None => return,
            }
        }
    }
}

/// First completion of a coroutine: collect the values its yield
/// placeholders produced, hand them to the handler, and reconcile the
/// continuation as this fiber's real children. Completion resumes here
/// when the continuation subtree finishes.
fn move_coroutine_to_handler_phase(
    pass: &PassState,
    work_in_progress: &FiberRef,
) -> Result<Option<FiberRef>, RenderError> {
    let handler = match work_in_progress.borrow().element_kind.clone() {
        Some(ElementKind::Coroutine(handler)) => handler,
        other => panic!("coroutine fiber without a coroutine element: {other:?}"),
    };

    let mut yields: Vec<PropValue> = vec![];
    let mut node = work_in_progress.borrow().child.clone();
    while let Some(current) = node {
        if current.borrow().tag == WorkTag::YieldComponent {
            if let Some(ElementKind::Yield(value)) = current.borrow().element_kind.clone() {
                yields.push(value);
            }
        }
        node = current.borrow().sibling.clone();
    }

    // The yield fibers were scaffolding for this pass; whatever they
    // accumulated must not reach the commit.
    {
        let mut wip = work_in_progress.borrow_mut();
        wip.first_effect = None;
        wip.last_effect = None;
        wip.tag = WorkTag::CoroutineHandlerPhase;
    }

    let props = work_in_progress.borrow().pending_props.clone();
    let continuation = handler(&props, &yields)?;

    let priority = pass.render_priority;
    let current = work_in_progress.borrow().alternate.clone();
    let first = match current {
        Some(current) => {
            let current_first_child = current.borrow().child.clone();
            reconcile_child_fibers(
                work_in_progress,
                current_first_child,
                &continuation,
                priority,
            )
        }
        None => mount_child_fibers(work_in_progress, None, &continuation, priority),
    };
    work_in_progress.borrow_mut().child = first.clone();
    Ok(first)
}
