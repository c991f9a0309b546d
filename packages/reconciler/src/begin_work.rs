use std::cell::RefCell;
use std::rc::Rc;

use weft_scheduler::PriorityLevel;
use weft_shared::{is_dev, log};

use crate::child_fiber::{mount_child_fibers, reconcile_child_fibers};
use crate::element::{Children, ElementKind, Props};
use crate::fiber::{FiberNode, MemoizedState, StateNode};
use crate::fiber_error::RenderError;
use crate::fiber_flags::Flags;
use crate::host_config::HostConfig;
use crate::update_queue::{create_update_queue, process_update_queue};
use crate::work_loop::PassState;
use crate::work_tags::WorkTag;

type FiberRef = Rc<RefCell<FiberNode>>;

/// Expands one fiber into its next-level children. Returns the first
/// child to descend into, or None when this node is a leaf (or bailed out
/// with nothing left below at the current priority).
pub(crate) fn begin_work(
    host: &Rc<dyn HostConfig>,
    pass: &mut PassState,
    work_in_progress: &FiberRef,
) -> Result<Option<FiberRef>, RenderError> {
    // Work reconciled earlier at exactly this priority is picked up
    // where it left off instead of being redone.
    {
        let progressed_priority = work_in_progress.borrow().progressed_priority;
        if progressed_priority == pass.render_priority {
            let progressed = work_in_progress.borrow().progressed_child.clone();
            if progressed.is_some() {
                work_in_progress.borrow_mut().child = progressed;
            }
        }
    }

    let tag = work_in_progress.borrow().tag;
    match tag {
        WorkTag::IndeterminateComponent => mount_indeterminate(pass, work_in_progress),
        WorkTag::FunctionComponent => update_function_component(pass, work_in_progress),
        WorkTag::ClassComponent => update_class_component(pass, work_in_progress),
        WorkTag::HostRoot => update_host_root(host, pass, work_in_progress),
        WorkTag::HostComponent => update_host_component(host, pass, work_in_progress),
        WorkTag::HostText => Ok(None),
        WorkTag::Fragment => update_fragment(pass, work_in_progress),
        WorkTag::HostPortal => update_portal(host, pass, work_in_progress),
        WorkTag::CoroutineComponent | WorkTag::CoroutineHandlerPhase => {
            update_coroutine(pass, work_in_progress)
        }
        WorkTag::YieldComponent => Ok(None),
    }
}

fn has_pending_update(fiber: &FiberRef) -> bool {
    fiber
        .borrow()
        .update_queue
        .as_ref()
        .map(|queue| queue.borrow().shared.pending.is_some())
        .unwrap_or(false)
}

fn props_unchanged(fiber: &FiberRef) -> bool {
    let fiber_ref = fiber.borrow();
    match &fiber_ref.memoized_props {
        Some(memoized) => Props::same(memoized, &fiber_ref.pending_props),
        None => false,
    }
}

/// The amortization that makes incremental reconciliation cheap: a clean
/// node skips its render. If nothing below holds work at the current
/// priority the whole subtree is skipped; otherwise the children are
/// cloned so the walk can continue into them without recomputation.
fn bail_out(pass: &PassState, work_in_progress: &FiberRef) -> Option<FiberRef> {
    let pending = work_in_progress.borrow().pending_work_priority;
    if !pending.at_least(pass.render_priority) {
        if is_dev() {
            log!("bailing out over a subtree with no work at {:?}", pass.render_priority);
        }
        return None;
    }
    clone_child_fibers(work_in_progress);
    work_in_progress.borrow().child.clone()
}

fn clone_child_fibers(work_in_progress: &FiberRef) {
    let mut source = work_in_progress.borrow().child.clone();
    let mut previous: Option<FiberRef> = None;
    while let Some(child) = source {
        let next = child.borrow().sibling.clone();
        let props = {
            let child_ref = child.borrow();
            child_ref
                .memoized_props
                .clone()
                .unwrap_or_else(|| child_ref.pending_props.clone())
        };
        let clone = FiberNode::create_work_in_progress(&child, props);
        clone.borrow_mut()._return = Some(work_in_progress.clone());
        clone.borrow_mut().sibling = None;
        clone.borrow_mut().index = child.borrow().index;
        match &previous {
            Some(prev) => prev.borrow_mut().sibling = Some(clone.clone()),
            None => work_in_progress.borrow_mut().child = Some(clone.clone()),
        }
        previous = Some(clone);
        source = next;
    }
}

fn reconcile_children(
    pass: &PassState,
    work_in_progress: &FiberRef,
    children: &Children,
) {
    let current = work_in_progress.borrow().alternate.clone();
    // Portal children always track placement: the root-level Placement
    // that covers a freshly mounting tree does not reach into another
    // container.
    let track = current.is_some() || work_in_progress.borrow().tag == WorkTag::HostPortal;
    let current_first_child = current.and_then(|c| c.borrow().child.clone());
    let new_child = if track {
        reconcile_child_fibers(
            work_in_progress,
            current_first_child,
            children,
            pass.render_priority,
        )
    } else {
        mount_child_fibers(work_in_progress, None, children, pass.render_priority)
    };
    {
        let mut wip = work_in_progress.borrow_mut();
        wip.child = new_child.clone();
        wip.progressed_child = new_child;
        wip.progressed_priority = pass.render_priority;
    }
}

fn mount_indeterminate(
    pass: &mut PassState,
    work_in_progress: &FiberRef,
) -> Result<Option<FiberRef>, RenderError> {
    let render = match work_in_progress.borrow().element_kind.clone() {
        Some(ElementKind::Function(render)) => render,
        other => panic!("indeterminate fiber without a function element: {other:?}"),
    };
    let props = work_in_progress.borrow().pending_props.clone();
    let children = render(&props)?;
    // Resolved for good: every later pass takes the function path.
    work_in_progress.borrow_mut().tag = WorkTag::FunctionComponent;
    reconcile_children(pass, work_in_progress, &children);
    Ok(work_in_progress.borrow().child.clone())
}

fn update_function_component(
    pass: &mut PassState,
    work_in_progress: &FiberRef,
) -> Result<Option<FiberRef>, RenderError> {
    if props_unchanged(work_in_progress)
        && !has_pending_update(work_in_progress)
        && !pass.context.has_changed()
    {
        return Ok(bail_out(pass, work_in_progress));
    }
    let render = match work_in_progress.borrow().element_kind.clone() {
        Some(ElementKind::Function(render)) => render,
        other => panic!("function fiber without a function element: {other:?}"),
    };
    let props = work_in_progress.borrow().pending_props.clone();
    let children = render(&props)?;
    reconcile_children(pass, work_in_progress, &children);
    Ok(work_in_progress.borrow().child.clone())
}

fn update_class_component(
    pass: &mut PassState,
    work_in_progress: &FiberRef,
) -> Result<Option<FiberRef>, RenderError> {
    let component = {
        let state_node = work_in_progress.borrow().state_node.clone();
        match state_node {
            Some(StateNode::Component(component)) => component,
            _ => match work_in_progress.borrow().element_kind.clone() {
                Some(ElementKind::Class(component)) => component,
                other => panic!("class fiber without a class element: {other:?}"),
            },
        }
    };
    let current = work_in_progress.borrow().alternate.clone();
    let is_mount = current.is_none()
        || !matches!(
            work_in_progress.borrow().state_node,
            Some(StateNode::Component(_))
        );

    let props = work_in_progress.borrow().pending_props.clone();
    if is_mount {
        work_in_progress.borrow_mut().state_node =
            Some(StateNode::Component(component.clone()));
        if work_in_progress.borrow().update_queue.is_none() {
            work_in_progress.borrow_mut().update_queue = Some(create_update_queue());
        }
        work_in_progress.borrow_mut().memoized_state =
            Some(MemoizedState::State(component.initial_state(&props)));
    }

    let had_updates = has_pending_update(work_in_progress);
    let base_state = work_in_progress.borrow().memoized_state.clone();
    let update_queue = work_in_progress.borrow().update_queue.clone();
    let processed = process_update_queue(base_state, &update_queue);
    if processed.has_callbacks {
        work_in_progress.borrow_mut().flags |= Flags::Callback;
    }
    let new_state = match processed.state {
        Some(MemoizedState::State(map)) => map,
        Some(MemoizedState::Children(_)) => {
            panic!("class fiber memoized a children description")
        }
        None => Default::default(),
    };
    let forced = processed.saw_forced;

    // A boundary tearing down its failed subtree renders nothing,
    // whatever its body says.
    if work_in_progress.borrow().force_empty_render {
        work_in_progress.borrow_mut().memoized_state =
            Some(MemoizedState::State(new_state));
        push_class_provider(pass, work_in_progress, &component);
        reconcile_children(pass, work_in_progress, &Children::None);
        return Ok(work_in_progress.borrow().child.clone());
    }

    if !is_mount && !forced {
        let old_state = current
            .as_ref()
            .and_then(|c| c.borrow().memoized_state.clone());
        let old_state_map = match &old_state {
            Some(MemoizedState::State(map)) => map.clone(),
            _ => Default::default(),
        };
        if !had_updates && props_unchanged(work_in_progress) && !pass.context.has_changed() {
            push_class_provider(pass, work_in_progress, &component);
            return Ok(bail_out(pass, work_in_progress));
        }
        let old_props = work_in_progress
            .borrow()
            .memoized_props
            .clone()
            .unwrap_or_else(Props::empty);
        if !component.should_update(&old_props, &props, &old_state_map, &new_state) {
            // The gate declined the render; memoize the new inputs so a
            // later pass compares against them.
            work_in_progress.borrow_mut().memoized_state =
                Some(MemoizedState::State(new_state));
            push_class_provider(pass, work_in_progress, &component);
            return Ok(bail_out(pass, work_in_progress));
        }
    }

    let context_map = pass.context.current().clone();
    let children = component.render(&props, &new_state, &context_map)?;
    work_in_progress.borrow_mut().memoized_state = Some(MemoizedState::State(new_state));
    // Drives did_mount/did_update in the commit lifecycle pass.
    work_in_progress.borrow_mut().flags |= Flags::Update;
    push_class_provider(pass, work_in_progress, &component);
    reconcile_children(pass, work_in_progress, &children);
    Ok(work_in_progress.borrow().child.clone())
}

/// Providers push on begin and pop on complete, so the push has to happen
/// on every begin path, bailouts included.
fn push_class_provider(
    pass: &mut PassState,
    work_in_progress: &FiberRef,
    component: &Rc<dyn crate::component::Component>,
) {
    let props = work_in_progress.borrow().pending_props.clone();
    let state = match work_in_progress.borrow().memoized_state.clone() {
        Some(MemoizedState::State(map)) => map,
        _ => Default::default(),
    };
    if let Some(contribution) = component.child_context(&props, &state) {
        let changed = work_in_progress.borrow().memoized_context.as_ref() != Some(&contribution);
        work_in_progress.borrow_mut().memoized_context = Some(contribution.clone());
        pass.context.push_provider(&contribution, changed);
    }
}

fn update_host_root(
    host: &Rc<dyn HostConfig>,
    pass: &mut PassState,
    work_in_progress: &FiberRef,
) -> Result<Option<FiberRef>, RenderError> {
    let root = match work_in_progress.borrow().state_node.clone() {
        Some(StateNode::Root(root)) => root,
        other => panic!("host root fiber without a root record: {other:?}"),
    };

    // Every pass enters through the root, so the pass-scoped stacks are
    // rebuilt here.
    pass.host_context.reset();
    pass.host_context
        .push_container(root.borrow().container_info.clone(), host.root_host_context());
    let base_context = {
        let root_ref = root.borrow();
        root_ref
            .pending_context
            .clone()
            .or_else(|| root_ref.context.clone())
            .unwrap_or_default()
    };
    pass.context.reset(base_context);

    let had_updates = has_pending_update(work_in_progress);
    if !had_updates {
        return Ok(bail_out(pass, work_in_progress));
    }

    let base_state = work_in_progress.borrow().memoized_state.clone();
    let update_queue = work_in_progress.borrow().update_queue.clone();
    let processed = process_update_queue(base_state, &update_queue);
    if processed.has_callbacks {
        work_in_progress.borrow_mut().flags |= Flags::Callback;
    }
    work_in_progress.borrow_mut().memoized_state = processed.state.clone();

    let next_children = match processed.state {
        Some(MemoizedState::Children(children)) => children,
        other => panic!("host root memoized something other than children: {other:?}"),
    };
    reconcile_children(pass, work_in_progress, &next_children);
    Ok(work_in_progress.borrow().child.clone())
}

fn update_host_component(
    host: &Rc<dyn HostConfig>,
    pass: &mut PassState,
    work_in_progress: &FiberRef,
) -> Result<Option<FiberRef>, RenderError> {
    let tag = match work_in_progress.borrow().element_kind.clone() {
        Some(ElementKind::Host(tag)) => tag,
        other => panic!("host fiber without a host element: {other:?}"),
    };
    let parent_context = pass.host_context.current_context();
    let child_context = host.get_child_host_context(&parent_context, &tag);
    pass.host_context.push_context(child_context);

    let props = work_in_progress.borrow().pending_props.clone();

    // Offscreen subtree: reconcile once at Offscreen priority, skip at
    // anything more urgent. The committed children stay attached so the
    // host tree is untouched until the offscreen pass runs.
    let current = work_in_progress.borrow().alternate.clone();
    if props.is_hidden() {
        if pass.render_priority < PriorityLevel::Offscreen {
            {
                let mut wip = work_in_progress.borrow_mut();
                wip.pending_work_priority = PriorityLevel::Offscreen;
            }
            if let Some(alternate) = &current {
                alternate.borrow_mut().pending_work_priority = PriorityLevel::Offscreen;
            }
            return Ok(None);
        }
        // At Offscreen priority the deferred reconcile happens even when
        // the props are referentially clean; the children were never
        // expanded at any other level.
    } else if current.is_some() && props_unchanged(work_in_progress) {
        return Ok(bail_out(pass, work_in_progress));
    }

    // Text-only content is set directly on the instance; switching away
    // from it needs the old text cleared before new children land.
    let next_children = if host.should_set_text_content(&tag, &props) {
        Children::None
    } else {
        if let Some(current) = &current {
            let old_props = current.borrow().memoized_props.clone();
            if let Some(old_props) = old_props {
                if host.should_set_text_content(&tag, &old_props) {
                    work_in_progress.borrow_mut().flags |= Flags::ContentReset;
                }
            }
        }
        props.children().clone()
    };

    reconcile_children(pass, work_in_progress, &next_children);
    Ok(work_in_progress.borrow().child.clone())
}

fn update_fragment(
    pass: &mut PassState,
    work_in_progress: &FiberRef,
) -> Result<Option<FiberRef>, RenderError> {
    if props_unchanged(work_in_progress) && !pass.context.has_changed() {
        return Ok(bail_out(pass, work_in_progress));
    }
    let children = work_in_progress.borrow().pending_props.children().clone();
    reconcile_children(pass, work_in_progress, &children);
    Ok(work_in_progress.borrow().child.clone())
}

fn update_portal(
    host: &Rc<dyn HostConfig>,
    pass: &mut PassState,
    work_in_progress: &FiberRef,
) -> Result<Option<FiberRef>, RenderError> {
    let container = match work_in_progress.borrow().state_node.clone() {
        Some(StateNode::Instance(container)) => container,
        other => panic!("portal fiber without a container: {other:?}"),
    };
    pass.host_context
        .push_container(container, host.root_host_context());

    if props_unchanged(work_in_progress) && !pass.context.has_changed() {
        return Ok(bail_out(pass, work_in_progress));
    }
    let children = work_in_progress.borrow().pending_props.children().clone();
    reconcile_children(pass, work_in_progress, &children);
    Ok(work_in_progress.borrow().child.clone())
}

fn update_coroutine(
    pass: &mut PassState,
    work_in_progress: &FiberRef,
) -> Result<Option<FiberRef>, RenderError> {
    // A restart while in the handler phase begins from the first phase.
    if work_in_progress.borrow().tag == WorkTag::CoroutineHandlerPhase {
        work_in_progress.borrow_mut().tag = WorkTag::CoroutineComponent;
    }
    // The yield placeholders are per-pass scaffolding, built fresh with
    // no diffing: the committed children of a coroutine are the
    // continuation the handler produced, and only the handler phase
    // diffs against those.
    let children = work_in_progress.borrow().pending_props.children().clone();
    let first = mount_child_fibers(work_in_progress, None, &children, pass.render_priority);
    work_in_progress.borrow_mut().child = first.clone();
    Ok(first)
}
