use std::cell::RefCell;
use std::rc::Rc;

use weft_shared::log;

use crate::element::Props;
use crate::fiber::{FiberNode, MemoizedState, StateNode};
use crate::fiber_error::{CapturedError, ErrorPhase, RenderError};
use crate::fiber_flags::Flags;
use crate::host_config::{HostConfig, HostInstance};
use crate::work_tags::WorkTag;

type FiberRef = Rc<RefCell<FiberNode>>;

/// Applies a finished tree's effect list to the host. Two passes: host
/// mutations first, then lifecycle hooks and callbacks, so every hook
/// observes a fully mutated tree.
pub(crate) struct CommitWork {
    host: Rc<dyn HostConfig>,
    root_container: HostInstance,
}

impl CommitWork {
    pub fn new(host: Rc<dyn HostConfig>, root_container: HostInstance) -> Self {
        Self {
            host,
            root_container,
        }
    }

    /// The host-mutation pass. Bracketed by the prepare/reset pair no
    /// matter what the individual effects do.
    pub fn commit_mutation_effects(
        &self,
        finished_work: &FiberRef,
    ) -> Vec<(FiberRef, CapturedError)> {
        let mut errors = vec![];
        self.host.prepare_for_commit();

        let mut effect = finished_work.borrow().first_effect.clone();
        while let Some(fiber) = effect {
            let next = fiber.borrow().next_effect.clone();
            let flags = fiber.borrow().flags;

            if flags.contains(Flags::ContentReset) {
                if let Some(instance) = instance_of(&fiber) {
                    if let Err(error) = self.host.reset_text_content(&instance) {
                        errors.push((
                            fiber.clone(),
                            CapturedError::new(error, ErrorPhase::CommitMutation),
                        ));
                    }
                }
                fiber.borrow_mut().flags -= Flags::ContentReset;
            }

            if flags.contains(Flags::Placement) {
                match self.commit_placement(&fiber) {
                    Ok(()) => {
                        // Cleared immediately so later anchor searches
                        // treat this node as stable.
                        fiber.borrow_mut().flags -= Flags::Placement;
                    }
                    Err(error) => errors.push((
                        fiber.clone(),
                        CapturedError::new(error, ErrorPhase::CommitMutation),
                    )),
                }
            }

            if flags.contains(Flags::Update) {
                if let Err(error) = self.commit_update(&fiber) {
                    errors.push((
                        fiber.clone(),
                        CapturedError::new(error, ErrorPhase::CommitMutation),
                    ));
                }
            }

            if flags.contains(Flags::Deletion) {
                self.commit_deletion(&fiber, &mut errors);
            }

            effect = next;
        }

        self.host.reset_after_commit();
        errors
    }

    /// The lifecycle pass: mount/update hooks, ref attachment, queued
    /// completion callbacks. A failing hook reverts the hooks committed
    /// before it (in reverse, errors suppressed) and surfaces the error
    /// to the caller for post-commit routing.
    pub fn commit_lifecycle_effects(
        &self,
        finished_work: &FiberRef,
    ) -> Option<(FiberRef, CapturedError)> {
        let mut committed: Vec<(FiberRef, bool)> = vec![];

        let mut effect = finished_work.borrow().first_effect.clone();
        while let Some(fiber) = effect {
            let next = fiber.borrow().next_effect.clone();
            if let Err(error) = self.commit_lifecycle_on_fiber(&fiber, &mut committed) {
                self.revert_lifecycles(&committed);
                return Some((
                    fiber,
                    CapturedError::new(error, ErrorPhase::CommitLifecycle),
                ));
            }
            effect = next;
        }

        // The root fiber never appears on its own effect list; its
        // callbacks (e.g. the mount completion callback) run here.
        let root_flags = finished_work.borrow().flags;
        if root_flags != Flags::NoFlags {
            if let Err(error) = self.commit_lifecycle_on_fiber(finished_work, &mut committed) {
                self.revert_lifecycles(&committed);
                return Some((
                    finished_work.clone(),
                    CapturedError::new(error, ErrorPhase::CommitLifecycle),
                ));
            }
        }

        None
    }

    fn commit_lifecycle_on_fiber(
        &self,
        fiber: &FiberRef,
        committed: &mut Vec<(FiberRef, bool)>,
    ) -> Result<(), RenderError> {
        let flags = fiber.borrow().flags;
        let tag = fiber.borrow().tag;

        if tag == WorkTag::ClassComponent && flags.contains(Flags::Update) {
            let component = match fiber.borrow().state_node.clone() {
                Some(StateNode::Component(component)) => component,
                other => panic!("class fiber without a component instance: {other:?}"),
            };
            let props = fiber.borrow().pending_props.clone();
            let state = match fiber.borrow().memoized_state.clone() {
                Some(MemoizedState::State(map)) => map,
                _ => Default::default(),
            };
            let current = fiber.borrow().alternate.clone();
            let was_mount = current
                .as_ref()
                .map(|c| c.borrow().memoized_props.is_none())
                .unwrap_or(true);
            if was_mount {
                component.did_mount(&props, &state)?;
            } else {
                let old_props = current
                    .and_then(|c| c.borrow().memoized_props.clone())
                    .unwrap_or_else(Props::empty);
                component.did_update(&old_props, &props, &state)?;
            }
            committed.push((fiber.clone(), was_mount));
        }

        if flags.contains(Flags::Ref) {
            self.attach_ref(fiber);
        }

        if flags.contains(Flags::Callback) {
            let queue = fiber.borrow().update_queue.clone();
            if let Some(queue) = queue {
                let callbacks: Vec<_> = queue.borrow_mut().callbacks.drain(..).collect();
                for callback in callbacks {
                    callback();
                }
            }
        }

        Ok(())
    }

    /// Opposite hooks in reverse order. Only mounts have a meaningful
    /// opposite; secondary errors are swallowed because we are already
    /// unwinding.
    fn revert_lifecycles(&self, committed: &[(FiberRef, bool)]) {
        for (fiber, was_mount) in committed.iter().rev() {
            if !was_mount {
                continue;
            }
            let component = match fiber.borrow().state_node.clone() {
                Some(StateNode::Component(component)) => component,
                _ => continue,
            };
            let props = fiber.borrow().pending_props.clone();
            let state = match fiber.borrow().memoized_state.clone() {
                Some(MemoizedState::State(map)) => map,
                _ => Default::default(),
            };
            if let Err(error) = component.will_unmount(&props, &state) {
                log!("ignoring error from unmount during revert: {error}");
            }
        }
    }

    fn attach_ref(&self, fiber: &FiberRef) {
        let handle = fiber.borrow().ref_handle.clone();
        if let Some(handle) = handle {
            // A replaced handle releases the old one first.
            let old_handle = fiber
                .borrow()
                .alternate
                .clone()
                .and_then(|c| c.borrow().ref_handle.clone());
            if let Some(old_handle) = old_handle {
                if !crate::element::RefHandle::same(&old_handle, &handle) {
                    old_handle.set(None);
                }
            }
            handle.set(instance_of(fiber));
        }
    }

    fn commit_update(&self, fiber: &FiberRef) -> Result<(), RenderError> {
        let tag = fiber.borrow().tag;
        match tag {
            WorkTag::HostText => {
                let instance = instance_of(fiber).expect("text fiber without an instance");
                let new_text = FiberNode::text_of(&fiber.borrow().pending_props);
                let old_text = fiber
                    .borrow()
                    .alternate
                    .clone()
                    .and_then(|c| c.borrow().memoized_props.clone())
                    .map(|props| FiberNode::text_of(&props))
                    .unwrap_or_default();
                self.host
                    .commit_text_update(&instance, &old_text, &new_text)
            }
            WorkTag::HostComponent => {
                let instance = instance_of(fiber).expect("host fiber without an instance");
                let new_props = fiber.borrow().pending_props.clone();
                let old_props = fiber
                    .borrow()
                    .alternate
                    .clone()
                    .and_then(|c| c.borrow().memoized_props.clone())
                    .unwrap_or_else(Props::empty);
                self.host
                    .commit_update(&instance, &old_props, &new_props, &self.root_container)
            }
            // Class updates only drive the lifecycle pass.
            _ => Ok(()),
        }
    }

    fn commit_placement(&self, fiber: &FiberRef) -> Result<(), RenderError> {
        let parent_fiber = match get_host_parent(fiber) {
            Some(parent) => parent,
            None => return Ok(()),
        };
        let parent_instance = match FiberNode::derive_state_node(&parent_fiber) {
            Some(instance) => instance,
            None => return Ok(()),
        };
        // A parent switching away from direct text content clears it
        // before the first new child lands in it.
        if parent_fiber.borrow().flags.contains(Flags::ContentReset) {
            if let Some(instance) = instance_of(&parent_fiber) {
                self.host.reset_text_content(&instance)?;
            }
            parent_fiber.borrow_mut().flags -= Flags::ContentReset;
        }
        let before = get_host_sibling(fiber);
        self.insert_or_append_placement_node(fiber, &parent_instance, &before)
    }

    /// Descends through composite layers to the host nodes that actually
    /// move, inserting each before the anchor (or appending when there is
    /// none). Portal subtrees are skipped: their content lives in another
    /// container.
    fn insert_or_append_placement_node(
        &self,
        fiber: &FiberRef,
        parent: &HostInstance,
        before: &Option<HostInstance>,
    ) -> Result<(), RenderError> {
        let tag = fiber.borrow().tag;
        if tag == WorkTag::HostComponent || tag == WorkTag::HostText {
            let instance = instance_of(fiber).expect("placed fiber without an instance");
            return match before {
                Some(before) => self.host.insert_before(parent, &instance, before),
                None => self.host.append_child(parent, &instance),
            };
        }
        if tag == WorkTag::HostPortal {
            return Ok(());
        }
        let mut child = fiber.borrow().child.clone();
        while let Some(node) = child {
            self.insert_or_append_placement_node(&node, parent, before)?;
            child = node.borrow().sibling.clone();
        }
        Ok(())
    }

    /// Tears down a deleted subtree: unmount hooks and ref detachment on
    /// every descendant (errors swallowed so teardown always finishes),
    /// host removal at each outermost host node, switching the removal
    /// parent at portal boundaries.
    fn commit_deletion(
        &self,
        child_to_delete: &FiberRef,
        errors: &mut Vec<(FiberRef, CapturedError)>,
    ) {
        let parent_instance = get_host_parent(child_to_delete)
            .and_then(|parent| FiberNode::derive_state_node(&parent));
        self.unmount_host_components(child_to_delete, &parent_instance, errors);
        // The deleted fiber stays linked into the commit's effect chain;
        // the lifecycle pass still has to walk past it.
        let next_effect = child_to_delete.borrow().next_effect.clone();
        detach_subtree(child_to_delete);
        child_to_delete.borrow_mut().next_effect = next_effect;
    }

    fn unmount_host_components(
        &self,
        node: &FiberRef,
        current_parent: &Option<HostInstance>,
        errors: &mut Vec<(FiberRef, CapturedError)>,
    ) {
        let tag = node.borrow().tag;

        if tag == WorkTag::HostComponent || tag == WorkTag::HostText {
            // Hooks and refs below this host node first, then one host
            // removal takes the whole subtree with it.
            self.commit_nested_unmounts(node);
            if let (Some(parent), Some(instance)) = (current_parent, instance_of(node)) {
                if let Err(error) = self.host.remove_child(parent, &instance) {
                    errors.push((
                        node.clone(),
                        CapturedError::new(error, ErrorPhase::CommitMutation),
                    ));
                }
            }
            return;
        }

        if tag == WorkTag::HostPortal {
            let portal_container = instance_of(node);
            let mut child = node.borrow().child.clone();
            while let Some(current) = child {
                self.unmount_host_components(&current, &portal_container, errors);
                child = current.borrow().sibling.clone();
            }
            return;
        }

        self.commit_unmount(node);
        let mut child = node.borrow().child.clone();
        while let Some(current) = child {
            self.unmount_host_components(&current, current_parent, errors);
            child = current.borrow().sibling.clone();
        }
    }

    /// Unmount hooks for a host subtree that is about to be removed in
    /// one host operation.
    fn commit_nested_unmounts(&self, root: &FiberRef) {
        self.commit_unmount(root);
        let mut child = root.borrow().child.clone();
        while let Some(current) = child {
            self.commit_nested_unmounts(&current);
            child = current.borrow().sibling.clone();
        }
    }

    fn commit_unmount(&self, fiber: &FiberRef) {
        let tag = fiber.borrow().tag;
        match tag {
            WorkTag::ClassComponent => {
                let component = match fiber.borrow().state_node.clone() {
                    Some(StateNode::Component(component)) => component,
                    _ => return,
                };
                let props = fiber.borrow().pending_props.clone();
                let state = match fiber.borrow().memoized_state.clone() {
                    Some(MemoizedState::State(map)) => map,
                    _ => Default::default(),
                };
                // Unmount errors never escalate; teardown must finish.
                if let Err(error) = component.will_unmount(&props, &state) {
                    log!("ignoring error from will_unmount: {error}");
                }
            }
            WorkTag::HostComponent | WorkTag::HostText => {
                let handle = fiber.borrow().ref_handle.clone();
                if let Some(handle) = handle {
                    handle.set(None);
                }
            }
            _ => {}
        }
    }
}

/// Clears next-effect links and leftover flags once a commit has fully
/// landed, so stale chains cannot leak into the next render.
pub(crate) fn cleanup_effect_list(finished_work: &FiberRef) {
    let mut effect = finished_work.borrow_mut().first_effect.take();
    finished_work.borrow_mut().last_effect = None;
    while let Some(fiber) = effect {
        let next = fiber.borrow_mut().next_effect.take();
        fiber.borrow_mut().flags = Flags::NoFlags;
        effect = next;
    }
    finished_work.borrow_mut().flags = Flags::NoFlags;
}

fn instance_of(fiber: &FiberRef) -> Option<HostInstance> {
    match fiber.borrow().state_node.clone() {
        Some(StateNode::Instance(instance)) => Some(instance),
        _ => None,
    }
}

fn get_host_parent(fiber: &FiberRef) -> Option<FiberRef> {
    let mut parent = fiber.borrow()._return.clone();
    while let Some(node) = parent {
        let tag = node.borrow().tag;
        if tag == WorkTag::HostComponent
            || tag == WorkTag::HostRoot
            || tag == WorkTag::HostPortal
        {
            return Some(node);
        }
        parent = node.borrow()._return.clone();
    }
    None
}

/// Finds the stable host node the placed subtree must land before. The
/// anchor can live deeper than the immediate sibling (composite siblings
/// resolve to their first host descendant) and anything itself pending
/// placement is skipped — its position is not trustworthy yet.
fn get_host_sibling(fiber: &FiberRef) -> Option<HostInstance> {
    let mut node = fiber.clone();
    'siblings: loop {
        loop {
            let sibling = node.borrow().sibling.clone();
            if sibling.is_some() {
                break;
            }
            let parent = node.borrow()._return.clone();
            match parent {
                None => return None,
                Some(parent) => {
                    let tag = parent.borrow().tag;
                    if tag == WorkTag::HostComponent
                        || tag == WorkTag::HostRoot
                        || tag == WorkTag::HostPortal
                    {
                        return None;
                    }
                    node = parent;
                }
            }
        }

        let sibling = node.borrow().sibling.clone().unwrap();
        node = sibling;

        loop {
            let tag = node.borrow().tag;
            if tag == WorkTag::HostComponent || tag == WorkTag::HostText {
                break;
            }
            if node.borrow().flags.contains(Flags::Placement) || tag == WorkTag::HostPortal {
                continue 'siblings;
            }
            let child = node.borrow().child.clone();
            match child {
                None => continue 'siblings,
                Some(child) => node = child,
            }
        }

        if !node.borrow().flags.contains(Flags::Placement) {
            return FiberNode::derive_state_node(&node);
        }
    }
}

/// Breaks every edge inside a deleted subtree so reference cycles in the
/// doubly-navigable tree cannot keep it alive.
fn detach_subtree(root: &FiberRef) {
    let mut stack = vec![root.clone()];
    let mut nodes = vec![];
    while let Some(fiber) = stack.pop() {
        let mut child = fiber.borrow().child.clone();
        while let Some(current) = child {
            let sibling = current.borrow().sibling.clone();
            stack.push(current);
            child = sibling;
        }
        nodes.push(fiber);
    }
    for fiber in nodes {
        FiberNode::detach(&fiber);
    }
}
