use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use weft_scheduler::PriorityLevel;

use crate::component::Component;
use crate::element::{Children, Element, ElementKind, Props, PropValue, RefHandle, StateMap};
use crate::fiber_flags::Flags;
use crate::update_queue::UpdateQueue;
use crate::work_tags::WorkTag;

/// What a fiber owns outside the tree itself: the root record for the
/// host root, a host instance for host kinds, or the shared component
/// behavior object for class kinds.
#[derive(Clone)]
pub enum StateNode {
    Root(Rc<RefCell<FiberRootNode>>),
    Instance(Rc<dyn Any>),
    Component(Rc<dyn Component>),
}

impl fmt::Debug for StateNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateNode::Root(_) => write!(f, "Root"),
            StateNode::Instance(_) => write!(f, "Instance"),
            StateNode::Component(_) => write!(f, "Component"),
        }
    }
}

/// Component-local committed state. The host root memoizes the children
/// description it last rendered; class components memoize a state map.
#[derive(Clone, Debug)]
pub enum MemoizedState {
    State(StateMap),
    Children(Children),
}

impl MemoizedState {
    pub fn as_state(&self) -> Option<&StateMap> {
        match self {
            MemoizedState::State(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_children(&self) -> Option<&Children> {
        match self {
            MemoizedState::Children(children) => Some(children),
            _ => None,
        }
    }
}

/// One position in the rendered tree. `child`/`sibling` are the ownership
/// edges; `_return` is a plain back link, rebuilt every pass and cleared
/// when a subtree is detached; `alternate` pairs this node with its other
/// buffer (current vs work in progress).
pub struct FiberNode {
    pub tag: WorkTag,
    pub key: Option<String>,
    pub element_kind: Option<ElementKind>,
    pub pending_props: Props,
    pub memoized_props: Option<Props>,
    pub memoized_state: Option<MemoizedState>,
    /// Child context this class contributed in its last committed render.
    pub memoized_context: Option<StateMap>,
    pub update_queue: Option<Rc<RefCell<UpdateQueue>>>,
    pub state_node: Option<StateNode>,
    pub _return: Option<Rc<RefCell<FiberNode>>>,
    pub sibling: Option<Rc<RefCell<FiberNode>>>,
    pub child: Option<Rc<RefCell<FiberNode>>>,
    /// Position among siblings, used for move detection in list diffs.
    pub index: u32,
    pub ref_handle: Option<RefHandle>,
    pub alternate: Option<Rc<RefCell<FiberNode>>>,
    pub flags: Flags,
    // Subtree effect list, built bottom-up during completion. Children's
    // effects always precede the owner's own entry.
    pub first_effect: Option<Rc<RefCell<FiberNode>>>,
    pub last_effect: Option<Rc<RefCell<FiberNode>>>,
    pub next_effect: Option<Rc<RefCell<FiberNode>>>,
    /// Most urgent unfinished work in this node or below; NoWork if none.
    pub pending_work_priority: PriorityLevel,
    /// Children produced by the most recent reconciliation, kept per
    /// priority so offscreen work is not thrown away by a bailout at a
    /// more urgent level.
    pub progressed_child: Option<Rc<RefCell<FiberNode>>>,
    pub progressed_priority: PriorityLevel,
    /// Set on an error boundary while its failed subtree is being torn
    /// down: the next render yields no children regardless of the body.
    pub force_empty_render: bool,
}

impl FiberNode {
    pub fn new(tag: WorkTag, pending_props: Props, key: Option<String>) -> Self {
        Self {
            tag,
            key,
            element_kind: None,
            pending_props,
            memoized_props: None,
            memoized_state: None,
            memoized_context: None,
            update_queue: None,
            state_node: None,
            _return: None,
            sibling: None,
            child: None,
            index: 0,
            ref_handle: None,
            alternate: None,
            flags: Flags::NoFlags,
            first_effect: None,
            last_effect: None,
            next_effect: None,
            pending_work_priority: PriorityLevel::NoWork,
            progressed_child: None,
            progressed_priority: PriorityLevel::NoWork,
            force_empty_render: false,
        }
    }

    pub fn create_fiber_from_element(element: &Element, priority: PriorityLevel) -> FiberNode {
        let tag = match element.kind {
            ElementKind::Host(_) => WorkTag::HostComponent,
            // Function elements resolve to FunctionComponent on first render.
            ElementKind::Function(_) => WorkTag::IndeterminateComponent,
            ElementKind::Class(_) => WorkTag::ClassComponent,
            ElementKind::Fragment => WorkTag::Fragment,
            ElementKind::Portal(_) => WorkTag::HostPortal,
            ElementKind::Coroutine(_) => WorkTag::CoroutineComponent,
            ElementKind::Yield(_) => WorkTag::YieldComponent,
        };
        let mut fiber = FiberNode::new(tag, element.props.clone(), element.key.clone());
        fiber.element_kind = Some(element.kind.clone());
        fiber.ref_handle = element.ref_handle.clone();
        fiber.pending_work_priority = priority;
        if let ElementKind::Portal(container) = &element.kind {
            fiber.state_node = Some(StateNode::Instance(container.clone()));
        }
        fiber
    }

    pub fn create_fiber_from_text(content: &str, priority: PriorityLevel) -> FiberNode {
        let props = Props::with_attrs([("content", PropValue::from(content))]);
        let mut fiber = FiberNode::new(WorkTag::HostText, props, None);
        fiber.pending_work_priority = priority;
        fiber
    }

    pub fn create_fiber_from_fragment(
        children: Children,
        priority: PriorityLevel,
        key: Option<String>,
    ) -> FiberNode {
        let mut fiber = FiberNode::new(WorkTag::Fragment, Props::with_children(children), key);
        fiber.element_kind = Some(ElementKind::Fragment);
        fiber.pending_work_priority = priority;
        fiber
    }

    /// Text content of a HostText fiber's props.
    pub fn text_of(props: &Props) -> String {
        props
            .get("content")
            .and_then(PropValue::as_str)
            .unwrap_or_default()
            .to_string()
    }

    /// The other buffer for this position: reused when it exists, created
    /// and cross-linked on first update. Effect bookkeeping starts clean;
    /// tree and memoized fields start from the current side.
    pub fn create_work_in_progress(
        current: &Rc<RefCell<FiberNode>>,
        pending_props: Props,
    ) -> Rc<RefCell<FiberNode>> {
        let existing = current.borrow().alternate.clone();
        match existing {
            Some(wip) => {
                {
                    let current_ref = current.borrow();
                    let mut wip_mut = wip.borrow_mut();
                    wip_mut.pending_props = pending_props;
                    wip_mut.flags = Flags::NoFlags;
                    wip_mut.first_effect = None;
                    wip_mut.last_effect = None;
                    wip_mut.next_effect = None;
                    wip_mut.tag = current_ref.tag;
                    wip_mut.key = current_ref.key.clone();
                    wip_mut.element_kind = current_ref.element_kind.clone();
                    wip_mut.child = current_ref.child.clone();
                    wip_mut.sibling = None;
                    wip_mut._return = None;
                    wip_mut.index = current_ref.index;
                    wip_mut.memoized_props = current_ref.memoized_props.clone();
                    wip_mut.memoized_state = current_ref.memoized_state.clone();
                    wip_mut.memoized_context = current_ref.memoized_context.clone();
                    wip_mut.update_queue = current_ref.update_queue.clone();
                    wip_mut.state_node = current_ref.state_node.clone();
                    wip_mut.ref_handle = current_ref.ref_handle.clone();
                    wip_mut.pending_work_priority = current_ref.pending_work_priority;
                    wip_mut.progressed_child = current_ref.progressed_child.clone();
                    wip_mut.progressed_priority = current_ref.progressed_priority;
                    wip_mut.force_empty_render = current_ref.force_empty_render;
                }
                wip
            }
            None => {
                let wip = {
                    let current_ref = current.borrow();
                    let mut wip = FiberNode::new(
                        current_ref.tag,
                        pending_props,
                        current_ref.key.clone(),
                    );
                    wip.element_kind = current_ref.element_kind.clone();
                    wip.child = current_ref.child.clone();
                    wip.index = current_ref.index;
                    wip.memoized_props = current_ref.memoized_props.clone();
                    wip.memoized_state = current_ref.memoized_state.clone();
                    wip.memoized_context = current_ref.memoized_context.clone();
                    wip.update_queue = current_ref.update_queue.clone();
                    wip.state_node = current_ref.state_node.clone();
                    wip.ref_handle = current_ref.ref_handle.clone();
                    wip.pending_work_priority = current_ref.pending_work_priority;
                    wip.progressed_child = current_ref.progressed_child.clone();
                    wip.progressed_priority = current_ref.progressed_priority;
                    wip.force_empty_render = current_ref.force_empty_render;
                    Rc::new(RefCell::new(wip))
                };
                wip.borrow_mut().alternate = Some(current.clone());
                current.borrow_mut().alternate = Some(wip.clone());
                wip
            }
        }
    }

    /// Host instance backing this fiber, or the container handle for the
    /// host root.
    pub fn derive_state_node(fiber: &Rc<RefCell<FiberNode>>) -> Option<Rc<dyn Any>> {
        match fiber.borrow().state_node.clone() {
            Some(StateNode::Instance(instance)) => Some(instance),
            Some(StateNode::Root(root)) => Some(root.borrow().container_info.clone()),
            _ => None,
        }
    }

    /// Severs every edge of a detached fiber so the deleted subtree and
    /// its alternate pairing cannot keep each other alive.
    pub fn detach(fiber: &Rc<RefCell<FiberNode>>) {
        let alternate = {
            let mut fiber_mut = fiber.borrow_mut();
            fiber_mut._return = None;
            fiber_mut.child = None;
            fiber_mut.sibling = None;
            fiber_mut.first_effect = None;
            fiber_mut.last_effect = None;
            fiber_mut.next_effect = None;
            fiber_mut.progressed_child = None;
            fiber_mut.alternate.take()
        };
        if let Some(alternate) = alternate {
            alternate.borrow_mut().alternate = None;
        }
    }
}

impl fmt::Debug for FiberNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Shallow on purpose: the tree is full of reference cycles.
        f.debug_struct("FiberNode")
            .field("tag", &self.tag)
            .field("key", &self.key)
            .field("flags", &self.flags)
            .field("priority", &self.pending_work_priority)
            .finish()
    }
}

/// One mount point. Holds the committed tree, membership in the
/// scheduler's intrusive ready list, and a finished-but-uncommitted tree
/// when a deferred pass ran out of budget right after completing.
pub struct FiberRootNode {
    pub container_info: Rc<dyn Any>,
    pub current: Rc<RefCell<FiberNode>>,
    pub context: Option<StateMap>,
    pub pending_context: Option<StateMap>,
    pub is_scheduled: bool,
    pub next_scheduled_root: Option<Rc<RefCell<FiberRootNode>>>,
    pub finished_work: Option<Rc<RefCell<FiberNode>>>,
    pub finished_priority: PriorityLevel,
}

impl FiberRootNode {
    pub fn new(
        container_info: Rc<dyn Any>,
        host_root_fiber: Rc<RefCell<FiberNode>>,
    ) -> Self {
        Self {
            container_info,
            current: host_root_fiber,
            context: None,
            pending_context: None,
            is_scheduled: false,
            next_scheduled_root: None,
            finished_work: None,
            finished_priority: PriorityLevel::NoWork,
        }
    }
}

impl fmt::Debug for FiberRootNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FiberRootNode")
            .field("is_scheduled", &self.is_scheduled)
            .field("finished_priority", &self.finished_priority)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_in_progress_is_pooled_and_cross_linked() {
        let current = Rc::new(RefCell::new(FiberNode::new(
            WorkTag::HostComponent,
            Props::empty(),
            None,
        )));
        let wip = FiberNode::create_work_in_progress(&current, Props::empty());
        assert!(Rc::ptr_eq(
            wip.borrow().alternate.as_ref().unwrap(),
            &current
        ));
        assert!(Rc::ptr_eq(
            current.borrow().alternate.as_ref().unwrap(),
            &wip
        ));

        // A second clone for the same position reuses the same buffer.
        let wip_again = FiberNode::create_work_in_progress(&current, Props::empty());
        assert!(Rc::ptr_eq(&wip, &wip_again));
    }

    #[test]
    fn clone_resets_effect_bookkeeping() {
        let current = Rc::new(RefCell::new(FiberNode::new(
            WorkTag::HostComponent,
            Props::empty(),
            None,
        )));
        let wip = FiberNode::create_work_in_progress(&current, Props::empty());
        wip.borrow_mut().flags |= Flags::Placement;
        wip.borrow_mut().first_effect = Some(current.clone());

        let wip_again = FiberNode::create_work_in_progress(&current, Props::empty());
        assert_eq!(wip_again.borrow().flags, Flags::NoFlags);
        assert!(wip_again.borrow().first_effect.is_none());
    }

    #[test]
    fn detach_breaks_the_alternate_pairing() {
        let current = Rc::new(RefCell::new(FiberNode::new(
            WorkTag::HostComponent,
            Props::empty(),
            None,
        )));
        let wip = FiberNode::create_work_in_progress(&current, Props::empty());
        FiberNode::detach(&current);
        assert!(current.borrow().alternate.is_none());
        assert!(wip.borrow().alternate.is_none());
    }
}
