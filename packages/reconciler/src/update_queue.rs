use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::element::{Children, StateMap};
use crate::fiber::MemoizedState;

/// One pending state operation. `Partial` and `Compute` merge into the
/// accumulated state; `Replace` discards everything before it and is only
/// legal as the first record in a queue; `RootRender` is the root-fiber
/// variant carrying the next children description for the container.
#[derive(Clone)]
pub enum UpdateAction {
    Partial(StateMap),
    Compute(Rc<dyn Fn(&StateMap) -> StateMap>),
    Replace(StateMap),
    RootRender(Children),
}

impl fmt::Debug for UpdateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateAction::Partial(map) => f.debug_tuple("Partial").field(map).finish(),
            UpdateAction::Compute(_) => write!(f, "Compute"),
            UpdateAction::Replace(map) => f.debug_tuple("Replace").field(map).finish(),
            UpdateAction::RootRender(_) => write!(f, "RootRender"),
        }
    }
}

pub type UpdateCallback = Box<dyn FnOnce()>;

pub struct Update {
    pub action: Option<UpdateAction>,
    pub is_forced: bool,
    pub callback: Option<UpdateCallback>,
    pub next: Option<Rc<RefCell<Update>>>,
}

/// Pending list shared between the current fiber and its work in
/// progress. `pending` points at the most recently enqueued record, whose
/// `next` closes the circle back to the oldest one.
pub struct SharedQueue {
    pub pending: Option<Rc<RefCell<Update>>>,
}

pub struct UpdateQueue {
    pub shared: SharedQueue,
    /// Completion callbacks collected while processing, fired by the
    /// commit lifecycle pass after the tree has been mutated.
    pub callbacks: Vec<UpdateCallback>,
}

pub fn create_update(action: UpdateAction) -> Update {
    Update {
        action: Some(action),
        is_forced: false,
        callback: None,
        next: None,
    }
}

pub fn create_update_queue() -> Rc<RefCell<UpdateQueue>> {
    Rc::new(RefCell::new(UpdateQueue {
        shared: SharedQueue { pending: None },
        callbacks: vec![],
    }))
}

pub fn enqueue_update(update_queue: &Rc<RefCell<UpdateQueue>>, update: Update) {
    let update_rc = Rc::new(RefCell::new(update));
    let pending = update_queue.borrow().shared.pending.clone();
    match pending {
        None => {
            update_rc.borrow_mut().next = Some(update_rc.clone());
        }
        Some(last) => {
            let first = last.borrow().next.clone();
            update_rc.borrow_mut().next = first;
            last.borrow_mut().next = Some(update_rc.clone());
        }
    }
    update_queue.borrow_mut().shared.pending = Some(update_rc);
}

pub struct ProcessedUpdates {
    pub state: Option<MemoizedState>,
    pub saw_forced: bool,
    pub has_callbacks: bool,
}

fn merge_into(accumulator: &mut StateMap, partial: &StateMap) {
    for (key, value) in partial {
        accumulator.insert(key.clone(), value.clone());
    }
}

fn state_map_of(state: &Option<MemoizedState>) -> StateMap {
    match state {
        Some(MemoizedState::State(map)) => map.clone(),
        _ => StateMap::new(),
    }
}

/// Drains the pending list in enqueue order, replaying each record
/// against the accumulated state. Callbacks move onto the queue's
/// callback list for the commit lifecycle pass.
pub fn process_update_queue(
    base_state: Option<MemoizedState>,
    update_queue: &Option<Rc<RefCell<UpdateQueue>>>,
    ) -> ProcessedUpdates {
    let mut result = ProcessedUpdates {
        state: base_state,
        saw_forced: false,
        has_callbacks: false,
    };
    let queue = match update_queue {
        None => return result,
        Some(queue) => queue,
    };

    let last = {
        let mut queue_ref = queue.borrow_mut();
        queue_ref.shared.pending.take()
    };
    let last = match last {
        None => return result,
        Some(last) => last,
    };

    let first = last.borrow().next.clone().expect("pending list not circular");
    let mut is_first = true;
    let mut cursor = first;
    loop {
        {
            let mut update = cursor.borrow_mut();
            match update.action.take() {
                None => {}
                Some(UpdateAction::RootRender(children)) => {
                    result.state = Some(MemoizedState::Children(children));
                }
                Some(UpdateAction::Replace(map)) => {
                    if !is_first {
                        panic!("replace update must be the first record in the queue");
                    }
                    result.state = Some(MemoizedState::State(map));
                }
                Some(UpdateAction::Partial(map)) => {
                    let mut accumulator = state_map_of(&result.state);
                    merge_into(&mut accumulator, &map);
                    result.state = Some(MemoizedState::State(accumulator));
                }
                Some(UpdateAction::Compute(compute)) => {
                    let mut accumulator = state_map_of(&result.state);
                    let partial = compute(&accumulator);
                    merge_into(&mut accumulator, &partial);
                    result.state = Some(MemoizedState::State(accumulator));
                }
            }
            result.saw_forced |= update.is_forced;
            if let Some(callback) = update.callback.take() {
                queue.borrow_mut().callbacks.push(callback);
                result.has_callbacks = true;
            }
        }
        is_first = false;
        if Rc::ptr_eq(&cursor, &last) {
            break;
        }
        let next = cursor.borrow().next.clone().expect("pending list not circular");
        cursor = next;
    }

    result
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::element::PropValue;

    fn partial(pairs: &[(&str, PropValue)]) -> UpdateAction {
        UpdateAction::Partial(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    fn state_of(result: &ProcessedUpdates) -> StateMap {
        match &result.state {
            Some(MemoizedState::State(map)) => map.clone(),
            other => panic!("expected state map, got {other:?}"),
        }
    }

    #[test]
    fn later_records_override_and_compute_sees_the_accumulator() {
        let queue = create_update_queue();
        enqueue_update(&queue, create_update(partial(&[("x", 1.into())])));
        enqueue_update(
            &queue,
            create_update(UpdateAction::Compute(Rc::new(|state| {
                let x = state.get("x").and_then(PropValue::as_num).unwrap_or(0.0);
                [("x".to_string(), PropValue::Num(x + 1.0))].into_iter().collect()
            }))),
        );
        enqueue_update(&queue, create_update(partial(&[("y", 2.into())])));

        let base = Some(MemoizedState::State(
            [("x".to_string(), PropValue::Num(0.0))].into_iter().collect(),
        ));
        let result = process_update_queue(base, &Some(queue.clone()));
        let state = state_of(&result);
        assert_eq!(state.get("x"), Some(&PropValue::Num(2.0)));
        assert_eq!(state.get("y"), Some(&PropValue::Num(2.0)));
        assert!(queue.borrow().shared.pending.is_none());
    }

    #[test]
    fn replace_at_the_head_discards_base_state() {
        let queue = create_update_queue();
        enqueue_update(
            &queue,
            create_update(UpdateAction::Replace(
                [("fresh".to_string(), PropValue::Bool(true))].into_iter().collect(),
            )),
        );
        enqueue_update(&queue, create_update(partial(&[("x", 5.into())])));

        let base = Some(MemoizedState::State(
            [("stale".to_string(), PropValue::Bool(true))].into_iter().collect(),
        ));
        let result = process_update_queue(base, &Some(queue));
        let state = state_of(&result);
        assert!(state.get("stale").is_none());
        assert_eq!(state.get("fresh"), Some(&PropValue::Bool(true)));
        assert_eq!(state.get("x"), Some(&PropValue::Num(5.0)));
    }

    #[test]
    #[should_panic(expected = "replace update must be the first record")]
    fn replace_past_the_head_is_an_invariant_violation() {
        let queue = create_update_queue();
        enqueue_update(&queue, create_update(partial(&[("x", 1.into())])));
        enqueue_update(&queue, create_update(UpdateAction::Replace(StateMap::new())));
        process_update_queue(None, &Some(queue));
    }

    #[test]
    fn callbacks_are_collected_for_commit_in_order() {
        let queue = create_update_queue();
        let fired = Rc::new(Cell::new(0));

        for expected in 0..2 {
            let mut update = create_update(partial(&[]));
            let fired = fired.clone();
            update.callback = Some(Box::new(move || {
                assert_eq!(fired.get(), expected);
                fired.set(fired.get() + 1);
            }));
            enqueue_update(&queue, update);
        }

        let result = process_update_queue(None, &Some(queue.clone()));
        assert!(result.has_callbacks);
        // Nothing fires during processing; commit drains the list.
        assert_eq!(fired.get(), 0);
        for callback in queue.borrow_mut().callbacks.drain(..) {
            callback();
        }
        assert_eq!(fired.get(), 2);
    }

    #[test]
    fn forced_flag_survives_the_merge() {
        let queue = create_update_queue();
        let mut update = create_update(partial(&[("x", 1.into())]));
        update.is_forced = true;
        enqueue_update(&queue, update);
        enqueue_update(&queue, create_update(partial(&[("y", 2.into())])));

        let result = process_update_queue(None, &Some(queue));
        assert!(result.saw_forced);
    }
}
