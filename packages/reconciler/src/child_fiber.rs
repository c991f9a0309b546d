use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use weft_scheduler::PriorityLevel;
use weft_shared::log;

use crate::element::{Children, Element, ElementKind};
use crate::fiber::FiberNode;
use crate::fiber_flags::Flags;
use crate::work_tags::WorkTag;

/// Lookup key for the slow-path table over remaining old children.
/// Unkeyed entries only ever match through their structural slot.
#[derive(Hash, PartialEq, Eq, Debug)]
enum MapKey {
    Keyed(String),
    Index(u32),
}

type FiberRef = Rc<RefCell<FiberNode>>;

/// Diffs one child level. `should_track_side_effects` is off for the
/// first-ever mount below a brand new node: every child there is
/// implicitly placed with its parent, so per-child bookkeeping is
/// skipped.
pub(crate) struct ChildReconciler {
    should_track_side_effects: bool,
    priority: PriorityLevel,
}

pub(crate) fn reconcile_child_fibers(
    return_fiber: &FiberRef,
    current_first_child: Option<FiberRef>,
    new_child: &Children,
    priority: PriorityLevel,
) -> Option<FiberRef> {
    ChildReconciler {
        should_track_side_effects: true,
        priority,
    }
    .reconcile(return_fiber, current_first_child, new_child)
}

pub(crate) fn mount_child_fibers(
    return_fiber: &FiberRef,
    current_first_child: Option<FiberRef>,
    new_child: &Children,
    priority: PriorityLevel,
) -> Option<FiberRef> {
    ChildReconciler {
        should_track_side_effects: false,
        priority,
    }
    .reconcile(return_fiber, current_first_child, new_child)
}

impl ChildReconciler {
    fn reconcile(
        &self,
        return_fiber: &FiberRef,
        current_first_child: Option<FiberRef>,
        new_child: &Children,
    ) -> Option<FiberRef> {
        match new_child {
            Children::None => {
                self.delete_remaining_children(return_fiber, current_first_child);
                None
            }
            Children::Text(text) => Some(self.place_single_child(
                self.reconcile_single_text_node(return_fiber, current_first_child, text),
            )),
            Children::Element(element) => Some(self.place_single_child(
                self.reconcile_single_element(return_fiber, current_first_child, element),
            )),
            Children::List(list) => {
                self.reconcile_children_list(return_fiber, current_first_child, list)
            }
        }
    }

    /// Clones an existing fiber for reuse at the head of a new sibling
    /// chain.
    fn use_fiber(&self, fiber: &FiberRef, pending_props: crate::element::Props) -> FiberRef {
        let clone = FiberNode::create_work_in_progress(fiber, pending_props);
        clone.borrow_mut().index = 0;
        clone.borrow_mut().sibling = None;
        clone
    }

    /// Tags a no-longer-wanted current child for deletion and splices it
    /// onto the parent's effect list so the commit tears it down before
    /// any sibling insertions.
    fn delete_child(&self, return_fiber: &FiberRef, child_to_delete: &FiberRef) {
        if !self.should_track_side_effects {
            return;
        }
        child_to_delete.borrow_mut().flags |= Flags::Deletion;
        child_to_delete.borrow_mut().next_effect = None;
        let last = return_fiber.borrow().last_effect.clone();
        match last {
            Some(last) => {
                last.borrow_mut().next_effect = Some(child_to_delete.clone());
                return_fiber.borrow_mut().last_effect = Some(child_to_delete.clone());
            }
            None => {
                let mut parent = return_fiber.borrow_mut();
                parent.first_effect = Some(child_to_delete.clone());
                parent.last_effect = Some(child_to_delete.clone());
            }
        }
    }

    fn delete_remaining_children(
        &self,
        return_fiber: &FiberRef,
        first_child: Option<FiberRef>,
    ) {
        let mut child = first_child;
        while let Some(fiber) = child {
            self.delete_child(return_fiber, &fiber);
            child = fiber.borrow().sibling.clone();
        }
    }

    /// New fibers with no alternate have never been committed and need a
    /// Placement; reused fibers keep their host position unless the move
    /// detector says otherwise.
    fn place_single_child(&self, fiber: FiberRef) -> FiberRef {
        if self.should_track_side_effects && fiber.borrow().alternate.is_none() {
            fiber.borrow_mut().flags |= Flags::Placement;
        }
        fiber
    }

    fn reconcile_single_element(
        &self,
        return_fiber: &FiberRef,
        current_first_child: Option<FiberRef>,
        element: &Element,
    ) -> FiberRef {
        let mut child = current_first_child;
        while let Some(existing) = child {
            let sibling = existing.borrow().sibling.clone();
            let key_matches = existing.borrow().key == element.key;
            if key_matches {
                let type_matches = existing
                    .borrow()
                    .element_kind
                    .as_ref()
                    .map(|kind| ElementKind::same_type(kind, &element.kind))
                    .unwrap_or(false);
                if type_matches {
                    // Same position survives; everything after it goes.
                    self.delete_remaining_children(return_fiber, sibling);
                    let reused = self.use_fiber(&existing, element.props.clone());
                    reused.borrow_mut().ref_handle = element.ref_handle.clone();
                    reused.borrow_mut()._return = Some(return_fiber.clone());
                    return reused;
                }
                // Key matched but the type changed: nothing is salvageable.
                self.delete_remaining_children(return_fiber, Some(existing));
                break;
            }
            self.delete_child(return_fiber, &existing);
            child = sibling;
        }

        let fiber = Rc::new(RefCell::new(FiberNode::create_fiber_from_element(
            element,
            self.priority,
        )));
        fiber.borrow_mut()._return = Some(return_fiber.clone());
        fiber
    }

    fn reconcile_single_text_node(
        &self,
        return_fiber: &FiberRef,
        current_first_child: Option<FiberRef>,
        text: &str,
    ) -> FiberRef {
        if let Some(existing) = &current_first_child {
            if existing.borrow().tag == WorkTag::HostText {
                let sibling = existing.borrow().sibling.clone();
                self.delete_remaining_children(return_fiber, sibling);
                let props = crate::element::Props::with_attrs([(
                    "content",
                    crate::element::PropValue::from(text),
                )]);
                let reused = self.use_fiber(existing, props);
                reused.borrow_mut()._return = Some(return_fiber.clone());
                return reused;
            }
        }
        // A text node never impersonates an element node (or vice versa).
        self.delete_remaining_children(return_fiber, current_first_child);
        let fiber = Rc::new(RefCell::new(FiberNode::create_fiber_from_text(
            text,
            self.priority,
        )));
        fiber.borrow_mut()._return = Some(return_fiber.clone());
        fiber
    }

    /// Two-pass list diff. Pass one walks both lists in lockstep reusing
    /// slot matches; the first mismatch degrades to a keyed lookup table
    /// over whatever old children remain.
    fn reconcile_children_list(
        &self,
        return_fiber: &FiberRef,
        current_first_child: Option<FiberRef>,
        new_children: &[Children],
    ) -> Option<FiberRef> {
        let mut result_first: Option<FiberRef> = None;
        let mut previous: Option<FiberRef> = None;
        let mut old_fiber = current_first_child;
        let mut last_placed_index: u32 = 0;
        let mut new_idx: usize = 0;

        // Pass 1: forward scan while slots keep matching.
        while old_fiber.is_some() && new_idx < new_children.len() {
            let old = old_fiber.clone().unwrap();
            // Old lists can have index gaps after holes; an old fiber
            // past the current slot matches nothing yet.
            let (slot_old, next_old) = if old.borrow().index > new_idx as u32 {
                (None, old_fiber.clone())
            } else {
                (old_fiber.clone(), old.borrow().sibling.clone())
            };

            let new_fiber = self.update_slot(return_fiber, &slot_old, &new_children[new_idx]);
            let new_fiber = match new_fiber {
                None => {
                    if slot_old.is_none() {
                        old_fiber = next_old;
                    }
                    break;
                }
                Some(fiber) => fiber,
            };

            if self.should_track_side_effects {
                if let Some(slot_old) = &slot_old {
                    if new_fiber.borrow().alternate.is_none() {
                        // Slot matched by key/position but the node could
                        // not be reused.
                        self.delete_child(return_fiber, slot_old);
                    }
                }
            }

            last_placed_index = self.place_child(&new_fiber, last_placed_index, new_idx as u32);
            self.link(&mut result_first, &mut previous, new_fiber);
            old_fiber = next_old;
            new_idx += 1;
        }

        if new_idx == new_children.len() {
            // New list fully consumed: the rest of the old list goes.
            self.delete_remaining_children(return_fiber, old_fiber);
            return result_first;
        }

        if old_fiber.is_none() {
            // Old list exhausted: the rest are pure insertions, no table
            // needed.
            for entry in &new_children[new_idx..] {
                if let Some(created) = self.create_child(return_fiber, entry) {
                    last_placed_index =
                        self.place_child(&created, last_placed_index, new_idx as u32);
                    self.link(&mut result_first, &mut previous, created);
                }
                new_idx += 1;
            }
            return result_first;
        }

        // Slow path: index the remaining old children, then resolve each
        // remaining new entry with a single probe.
        let mut existing = self.map_remaining_children(old_fiber);
        while new_idx < new_children.len() {
            let entry = &new_children[new_idx];
            if let Some(new_fiber) =
                self.update_from_map(&existing, return_fiber, new_idx as u32, entry)
            {
                if self.should_track_side_effects && new_fiber.borrow().alternate.is_some() {
                    // Reused: take it out of the table so it is not
                    // deleted as a leftover.
                    let map_key = match new_fiber.borrow().key.clone() {
                        Some(key) => MapKey::Keyed(key),
                        None => MapKey::Index(new_idx as u32),
                    };
                    existing.shift_remove(&map_key);
                }
                last_placed_index =
                    self.place_child(&new_fiber, last_placed_index, new_idx as u32);
                self.link(&mut result_first, &mut previous, new_fiber);
            }
            new_idx += 1;
        }

        if self.should_track_side_effects {
            for leftover in existing.values() {
                self.delete_child(return_fiber, leftover);
            }
        }

        result_first
    }

    fn link(
        &self,
        result_first: &mut Option<FiberRef>,
        previous: &mut Option<FiberRef>,
        fiber: FiberRef,
    ) {
        match previous {
            Some(prev) => prev.borrow_mut().sibling = Some(fiber.clone()),
            None => *result_first = Some(fiber.clone()),
        }
        *previous = Some(fiber);
    }

    /// Attempts direct reuse of the fiber sitting at the same structural
    /// slot. Returns None on a key mismatch, which ends the fast path.
    fn update_slot(
        &self,
        return_fiber: &FiberRef,
        old_fiber: &Option<FiberRef>,
        new_child: &Children,
    ) -> Option<FiberRef> {
        let old_key = old_fiber.as_ref().and_then(|f| f.borrow().key.clone());
        match new_child {
            Children::None => None,
            Children::Text(text) => {
                if old_key.is_some() {
                    // Text children never match a keyed slot.
                    return None;
                }
                Some(self.update_text_node(return_fiber, old_fiber, text))
            }
            Children::Element(element) => {
                if element.key != old_key {
                    return None;
                }
                Some(self.update_element(return_fiber, old_fiber, element))
            }
            Children::List(list) => {
                if old_key.is_some() {
                    return None;
                }
                Some(self.update_fragment(return_fiber, old_fiber, list, None))
            }
        }
    }

    fn update_text_node(
        &self,
        return_fiber: &FiberRef,
        old_fiber: &Option<FiberRef>,
        text: &str,
    ) -> FiberRef {
        let props = crate::element::Props::with_attrs([(
            "content",
            crate::element::PropValue::from(text),
        )]);
        match old_fiber {
            Some(old) if old.borrow().tag == WorkTag::HostText => {
                let reused = self.use_fiber(old, props);
                reused.borrow_mut()._return = Some(return_fiber.clone());
                reused
            }
            _ => {
                let fiber = Rc::new(RefCell::new(FiberNode::create_fiber_from_text(
                    text,
                    self.priority,
                )));
                fiber.borrow_mut()._return = Some(return_fiber.clone());
                fiber
            }
        }
    }

    fn update_element(
        &self,
        return_fiber: &FiberRef,
        old_fiber: &Option<FiberRef>,
        element: &Element,
    ) -> FiberRef {
        if let Some(old) = old_fiber {
            let type_matches = old
                .borrow()
                .element_kind
                .as_ref()
                .map(|kind| ElementKind::same_type(kind, &element.kind))
                .unwrap_or(false);
            if type_matches {
                let reused = self.use_fiber(old, element.props.clone());
                reused.borrow_mut().ref_handle = element.ref_handle.clone();
                reused.borrow_mut()._return = Some(return_fiber.clone());
                return reused;
            }
        }
        let fiber = Rc::new(RefCell::new(FiberNode::create_fiber_from_element(
            element,
            self.priority,
        )));
        fiber.borrow_mut()._return = Some(return_fiber.clone());
        fiber
    }

    fn update_fragment(
        &self,
        return_fiber: &FiberRef,
        old_fiber: &Option<FiberRef>,
        list: &[Children],
        key: Option<String>,
    ) -> FiberRef {
        let children = Children::List(list.to_vec());
        match old_fiber {
            Some(old) if old.borrow().tag == WorkTag::Fragment => {
                let reused =
                    self.use_fiber(old, crate::element::Props::with_children(children));
                reused.borrow_mut()._return = Some(return_fiber.clone());
                reused
            }
            _ => {
                let fiber = Rc::new(RefCell::new(FiberNode::create_fiber_from_fragment(
                    children,
                    self.priority,
                    key,
                )));
                fiber.borrow_mut()._return = Some(return_fiber.clone());
                fiber
            }
        }
    }

    fn create_child(&self, return_fiber: &FiberRef, new_child: &Children) -> Option<FiberRef> {
        let fiber = match new_child {
            Children::None => return None,
            Children::Text(text) => Rc::new(RefCell::new(FiberNode::create_fiber_from_text(
                text,
                self.priority,
            ))),
            Children::Element(element) => Rc::new(RefCell::new(
                FiberNode::create_fiber_from_element(element, self.priority),
            )),
            Children::List(list) => Rc::new(RefCell::new(FiberNode::create_fiber_from_fragment(
                Children::List(list.to_vec()),
                self.priority,
                None,
            ))),
        };
        fiber.borrow_mut()._return = Some(return_fiber.clone());
        Some(fiber)
    }

    fn map_remaining_children(
        &self,
        first_child: Option<FiberRef>,
    ) -> IndexMap<MapKey, FiberRef> {
        let mut existing = IndexMap::new();
        let mut child = first_child;
        while let Some(fiber) = child {
            let map_key = match fiber.borrow().key.clone() {
                Some(key) => MapKey::Keyed(key),
                None => MapKey::Index(fiber.borrow().index),
            };
            let sibling = fiber.borrow().sibling.clone();
            if existing.insert(map_key, fiber).is_some() {
                log!("duplicate key among siblings; later entry wins");
            }
            child = sibling;
        }
        existing
    }

    fn update_from_map(
        &self,
        existing: &IndexMap<MapKey, FiberRef>,
        return_fiber: &FiberRef,
        new_idx: u32,
        new_child: &Children,
    ) -> Option<FiberRef> {
        match new_child {
            Children::None => None,
            Children::Text(text) => {
                let matched = existing.get(&MapKey::Index(new_idx)).cloned();
                Some(self.update_text_node(return_fiber, &matched, text))
            }
            Children::Element(element) => {
                let map_key = match &element.key {
                    Some(key) => MapKey::Keyed(key.clone()),
                    None => MapKey::Index(new_idx),
                };
                let matched = existing.get(&map_key).cloned();
                Some(self.update_element(return_fiber, &matched, element))
            }
            Children::List(list) => {
                let matched = existing.get(&MapKey::Index(new_idx)).cloned();
                Some(self.update_fragment(return_fiber, &matched, list, None))
            }
        }
    }

    /// Move detection: a reused child whose committed index is below the
    /// high-water mark of already-placed children has to move; everything
    /// else keeps its host position and only updates the mark.
    pub(crate) fn place_child(
        &self,
        fiber: &FiberRef,
        last_placed_index: u32,
        new_index: u32,
    ) -> u32 {
        fiber.borrow_mut().index = new_index;
        if !self.should_track_side_effects {
            return last_placed_index;
        }
        let current = fiber.borrow().alternate.clone();
        match current {
            Some(current) => {
                let old_index = current.borrow().index;
                if old_index < last_placed_index {
                    fiber.borrow_mut().flags |= Flags::Placement;
                    last_placed_index
                } else {
                    old_index
                }
            }
            None => {
                fiber.borrow_mut().flags |= Flags::Placement;
                last_placed_index
            }
        }
    }
}
