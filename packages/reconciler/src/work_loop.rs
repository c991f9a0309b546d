use std::cell::RefCell;
use std::rc::Rc;

use weft_scheduler::{Deadline, PriorityLevel};
use weft_shared::{is_dev, log};

use crate::begin_work::begin_work;
use crate::commit_work::{cleanup_effect_list, CommitWork};
use crate::complete_work::complete_work;
use crate::element::{Children, Props, StateMap};
use crate::fiber::{FiberNode, FiberRootNode, StateNode};
use crate::fiber_context::ContextStack;
use crate::fiber_error::{
    find_closest_error_boundary, CapturedError, ErrorPhase, ReconcileError,
};
use crate::fiber_flags::{get_lifecycle_mask, get_mutation_mask, Flags};
use crate::host_config::{HostConfig, HostInstance};
use crate::host_context::HostContextStack;
use crate::update_queue::{
    create_update, create_update_queue, enqueue_update, UpdateAction, UpdateCallback,
};
use crate::work_tags::WorkTag;

type FiberRef = Rc<RefCell<FiberNode>>;
type RootRef = Rc<RefCell<FiberRootNode>>;

/// One unit of work must fit in this much remaining budget, or the
/// deferred loop yields back to the host.
const TIME_HEURISTIC_MS: f64 = 1.0;

/// State that belongs to the in-flight render pass: the priority being
/// rendered and the two pass-scoped stacks. Survives suspension of a
/// deferred pass alongside the next-unit pointer.
pub(crate) struct PassState {
    pub render_priority: PriorityLevel,
    pub context: ContextStack,
    pub host_context: HostContextStack,
}

impl Default for PassState {
    fn default() -> Self {
        Self {
            render_priority: PriorityLevel::NoWork,
            context: ContextStack::new(),
            host_context: HostContextStack::new(),
        }
    }
}

struct WorkLoopState {
    next_unit_of_work: Option<FiberRef>,
    next_priority_level: PriorityLevel,
    /// Root owning the in-flight pass.
    work_root: Option<RootRef>,
    /// Intrusive list of roots with pending work.
    next_scheduled_root: Option<RootRef>,
    last_scheduled_root: Option<RootRef>,
    default_priority: PriorityLevel,
    is_performing_work: bool,
    is_committing: bool,
    is_batching: bool,
    deferred_scheduled: bool,
    animation_scheduled: bool,
    /// Set when higher-urgency work invalidated the in-flight walk; the
    /// driver drops its partial tree and restarts the root scan.
    walk_invalidated: bool,
    first_uncaught: Option<CapturedError>,
    failed_boundaries: Vec<FiberRef>,
    /// Boundaries whose failed subtree was just unmounted; after that
    /// commit they get their recovery render scheduled.
    recovering_boundaries: Vec<FiberRef>,
    pass: PassState,
}

/// The engine: one instance per reconciler, owning all scheduler state
/// explicitly so independent instances never share anything.
pub struct WorkLoop {
    host: Rc<dyn HostConfig>,
    state: RefCell<WorkLoopState>,
}

impl WorkLoop {
    pub fn new(host: Rc<dyn HostConfig>) -> Rc<WorkLoop> {
        Rc::new(WorkLoop {
            host,
            state: RefCell::new(WorkLoopState {
                next_unit_of_work: None,
                next_priority_level: PriorityLevel::NoWork,
                work_root: None,
                next_scheduled_root: None,
                last_scheduled_root: None,
                default_priority: PriorityLevel::Synchronous,
                is_performing_work: false,
                is_committing: false,
                is_batching: false,
                deferred_scheduled: false,
                animation_scheduled: false,
                walk_invalidated: false,
                first_uncaught: None,
                failed_boundaries: vec![],
                recovering_boundaries: vec![],
                pass: PassState::default(),
            }),
        })
    }

    // ----- root operations -----

    pub fn create_container(&self, container: HostInstance) -> RootRef {
        let host_root_fiber = Rc::new(RefCell::new(FiberNode::new(
            WorkTag::HostRoot,
            Props::empty(),
            None,
        )));
        host_root_fiber.borrow_mut().update_queue = Some(create_update_queue());
        let root = Rc::new(RefCell::new(FiberRootNode::new(
            container,
            host_root_fiber.clone(),
        )));
        host_root_fiber.borrow_mut().state_node = Some(StateNode::Root(root.clone()));
        root
    }

    pub fn update_container(
        this: &Rc<Self>,
        children: Children,
        root: &RootRef,
        parent_context: Option<StateMap>,
        on_complete: Option<UpdateCallback>,
    ) -> Result<(), ReconcileError> {
        if parent_context.is_some() {
            root.borrow_mut().pending_context = parent_context;
        }
        let host_root_fiber = root.borrow().current.clone();
        let queue = host_root_fiber
            .borrow()
            .update_queue
            .clone()
            .expect("host root without an update queue");
        let mut update = create_update(UpdateAction::RootRender(children));
        // A top-level render request always re-renders, matching props or
        // not.
        update.is_forced = true;
        update.callback = on_complete;
        enqueue_update(&queue, update);

        let priority = this.state.borrow().default_priority;
        Self::schedule_update(this, &host_root_fiber, priority);
        this.take_uncaught()
    }

    pub fn unmount_container(this: &Rc<Self>, root: &RootRef) -> Result<(), ReconcileError> {
        let previous = {
            let mut state = this.state.borrow_mut();
            std::mem::replace(&mut state.default_priority, PriorityLevel::Synchronous)
        };
        let result = Self::update_container(this, Children::None, root, None, None);
        this.state.borrow_mut().default_priority = previous;
        // The tree is empty now; break the alternate pairing so the old
        // buffers are released.
        let current = root.borrow().current.clone();
        FiberNode::detach(&current);
        result
    }

    pub fn find_host_instance(&self, root: &RootRef) -> Option<HostInstance> {
        let mut node = root.borrow().current.borrow().child.clone();
        while let Some(fiber) = node {
            let tag = fiber.borrow().tag;
            if tag == WorkTag::HostComponent || tag == WorkTag::HostText {
                return FiberNode::derive_state_node(&fiber);
            }
            node = fiber.borrow().child.clone();
        }
        None
    }

    pub fn perform_with_priority(
        this: &Rc<Self>,
        priority: PriorityLevel,
        f: impl FnOnce(),
    ) -> Result<(), ReconcileError> {
        let previous = {
            let mut state = this.state.borrow_mut();
            std::mem::replace(&mut state.default_priority, priority)
        };
        f();
        this.state.borrow_mut().default_priority = previous;
        this.take_uncaught()
    }

    /// Defers the actual work loop until `f` returns, so a burst of
    /// updates coalesces into one pass.
    pub fn batched_updates(this: &Rc<Self>, f: impl FnOnce()) -> Result<(), ReconcileError> {
        {
            let mut state = this.state.borrow_mut();
            if state.is_batching {
                // Nested region: the outer one flushes.
                drop(state);
                f();
                return Ok(());
            }
            state.is_batching = true;
        }
        f();
        this.state.borrow_mut().is_batching = false;
        Self::perform_task_work(this);
        this.take_uncaught()
    }

    fn take_uncaught(&self) -> Result<(), ReconcileError> {
        let mut state = self.state.borrow_mut();
        // A nested call from inside the loop must not steal the batch's
        // error; the outermost caller surfaces it after the loop ends.
        if state.is_performing_work || state.is_committing {
            return Ok(());
        }
        match state.first_uncaught.take() {
            Some(error) => Err(ReconcileError::Uncaught(error)),
            None => Ok(()),
        }
    }

    // ----- scheduling -----

    /// Bubbles the priority from the updated fiber to its root and puts
    /// the root on the ready list. A parent's pending priority always
    /// reflects the most urgent unresolved descendant.
    pub(crate) fn schedule_update(this: &Rc<Self>, fiber: &FiberRef, priority: PriorityLevel) {
        if is_dev() {
            log!("schedule_update at {:?} on {:?}", priority, fiber.borrow());
        }
        let mut node = fiber.clone();
        loop {
            bump_priority(&node, priority);
            let parent = node.borrow()._return.clone();
            match parent {
                Some(parent) => node = parent,
                None => break,
            }
        }
        if node.borrow().tag != WorkTag::HostRoot {
            // Detached subtree (e.g. already unmounted); nothing to do.
            log!("update scheduled on a fiber with no root; dropping");
            return;
        }
        let root = match node.borrow().state_node.clone() {
            Some(StateNode::Root(root)) => root,
            other => panic!("host root fiber without a root record: {other:?}"),
        };
        Self::schedule_work_on_root(this, &root, priority);
    }

    fn schedule_work_on_root(this: &Rc<Self>, root: &RootRef, priority: PriorityLevel) {
        let start_now = {
            let mut state = this.state.borrow_mut();
            // New work at least as urgent as the in-flight walk
            // invalidates it: the partial tree is dropped, never
            // partially committed, and the scan restarts from the roots.
            if state.next_priority_level == PriorityLevel::NoWork
                || priority <= state.next_priority_level
            {
                state.next_unit_of_work = None;
                state.work_root = None;
                state.walk_invalidated = true;
            }

            if !root.borrow().is_scheduled {
                root.borrow_mut().is_scheduled = true;
                match state.last_scheduled_root.clone() {
                    Some(last) => {
                        last.borrow_mut().next_scheduled_root = Some(root.clone());
                        state.last_scheduled_root = Some(root.clone());
                    }
                    None => {
                        state.next_scheduled_root = Some(root.clone());
                        state.last_scheduled_root = Some(root.clone());
                    }
                }
            }

            // While work is already being performed (or batched), only
            // the bookkeeping above happens; the running loop picks the
            // new work up. This is what makes re-entrant scheduling from
            // render and commit callbacks safe.
            !state.is_performing_work && !state.is_committing && !state.is_batching
        };

        if !start_now {
            return;
        }
        match priority {
            PriorityLevel::Synchronous | PriorityLevel::Task => Self::perform_task_work(this),
            PriorityLevel::Animation => Self::request_animation(this),
            PriorityLevel::NoWork => panic!("cannot schedule work at NoWork priority"),
            _ => Self::request_deferred(this),
        }
    }

    fn request_deferred(this: &Rc<Self>) {
        {
            let mut state = this.state.borrow_mut();
            if state.deferred_scheduled {
                return;
            }
            state.deferred_scheduled = true;
        }
        let work_loop = this.clone();
        this.host
            .schedule_deferred_callback(Box::new(move |deadline| {
                WorkLoop::perform_deferred_work(&work_loop, deadline)
            }));
    }

    fn request_animation(this: &Rc<Self>) {
        {
            let mut state = this.state.borrow_mut();
            if state.animation_scheduled {
                return;
            }
            state.animation_scheduled = true;
        }
        let work_loop = this.clone();
        this.host
            .schedule_animation_callback(Box::new(move || {
                WorkLoop::perform_animation_work(&work_loop)
            }));
    }

    // ----- selecting work -----

    /// Scans the ready list, drops exhausted roots, and clones the most
    /// urgent root's current fiber as the new work-in-progress root.
    fn find_next_unit_of_work(&self) -> Option<FiberRef> {
        let mut state = self.state.borrow_mut();
        // A fresh scan supersedes any pending invalidation.
        state.walk_invalidated = false;

        // Clear out roots with nothing left on them.
        loop {
            let head = match state.next_scheduled_root.clone() {
                None => {
                    state.next_priority_level = PriorityLevel::NoWork;
                    state.work_root = None;
                    return None;
                }
                Some(head) => head,
            };
            let exhausted = {
                let head_ref = head.borrow();
                head_ref.current.borrow().pending_work_priority == PriorityLevel::NoWork
                    && head_ref.finished_work.is_none()
            };
            if !exhausted {
                break;
            }
            head.borrow_mut().is_scheduled = false;
            let is_last = state
                .last_scheduled_root
                .as_ref()
                .map(|last| Rc::ptr_eq(last, &head))
                .unwrap_or(false);
            let next = head.borrow_mut().next_scheduled_root.take();
            if is_last {
                state.next_scheduled_root = None;
                state.last_scheduled_root = None;
                state.next_priority_level = PriorityLevel::NoWork;
                state.work_root = None;
                return None;
            }
            state.next_scheduled_root = next;
        }

        // Pick the globally most urgent pending root.
        let mut highest_root: Option<RootRef> = None;
        let mut highest_priority = PriorityLevel::NoWork;
        let mut cursor = state.next_scheduled_root.clone();
        while let Some(root) = cursor {
            let pending = root.borrow().current.borrow().pending_work_priority;
            if pending != PriorityLevel::NoWork
                && (highest_priority == PriorityLevel::NoWork || pending < highest_priority)
            {
                highest_priority = pending;
                highest_root = Some(root.clone());
            }
            cursor = root.borrow().next_scheduled_root.clone();
        }

        match highest_root {
            Some(root) => {
                state.next_priority_level = highest_priority;
                state.work_root = Some(root.clone());
                state.pass.render_priority = highest_priority;
                let current = root.borrow().current.clone();
                let pending_props = current.borrow().pending_props.clone();
                Some(FiberNode::create_work_in_progress(&current, pending_props))
            }
            None => {
                state.next_priority_level = PriorityLevel::NoWork;
                state.work_root = None;
                None
            }
        }
    }

    // ----- the per-unit step -----

    /// Begin one fiber, then either descend or complete. The pass state
    /// is taken out of the engine for the duration so user code invoked
    /// from render can re-enter the scheduler for bookkeeping.
    fn perform_unit_of_work(
        &self,
        fiber: FiberRef,
    ) -> Result<Option<FiberRef>, (FiberRef, CapturedError)> {
        let mut pass = std::mem::take(&mut self.state.borrow_mut().pass);
        let outcome = self.perform_unit_inner(&mut pass, fiber);
        self.state.borrow_mut().pass = pass;
        outcome
    }

    fn perform_unit_inner(
        &self,
        pass: &mut PassState,
        fiber: FiberRef,
    ) -> Result<Option<FiberRef>, (FiberRef, CapturedError)> {
        let next = match begin_work(&self.host, pass, &fiber) {
            Ok(next) => next,
            Err(error) => {
                return Err((
                    fiber,
                    CapturedError::new(error, ErrorPhase::BeginWork),
                ))
            }
        };
        {
            let pending = fiber.borrow().pending_props.clone();
            fiber.borrow_mut().memoized_props = Some(pending);
        }
        match next {
            Some(next) => Ok(Some(next)),
            None => self.complete_unit_of_work(pass, fiber),
        }
    }

    /// Walks upward completing fibers, splicing each finished subtree's
    /// effect list onto its parent (children first, own entry last), and
    /// parks the finished tree on the root when the top is reached.
    fn complete_unit_of_work(
        &self,
        pass: &mut PassState,
        fiber: FiberRef,
    ) -> Result<Option<FiberRef>, (FiberRef, CapturedError)> {
        let mut work = fiber;
        loop {
            let next = match complete_work(&self.host, pass, &work) {
                Ok(next) => next,
                Err(error) => {
                    return Err((
                        work,
                        CapturedError::new(error, ErrorPhase::CompleteWork),
                    ))
                }
            };
            if next.is_some() {
                // Completion spawned more work (coroutine handler phase);
                // effects splice when this fiber completes for real.
                return Ok(next);
            }

            reset_work_priority(&work, pass.render_priority);

            let return_fiber = work.borrow()._return.clone();
            if let Some(parent) = &return_fiber {
                splice_effects(parent, &work);
            }

            let sibling = work.borrow().sibling.clone();
            if let Some(sibling) = sibling {
                return Ok(Some(sibling));
            }

            match return_fiber {
                Some(parent) => work = parent,
                None => {
                    let root = match work.borrow().state_node.clone() {
                        Some(StateNode::Root(root)) => root,
                        other => panic!("completed a tree without a root record: {other:?}"),
                    };
                    if Rc::ptr_eq(&root.borrow().current, &work) {
                        panic!(
                            "cannot commit the same tree as before; the return \
                             chain of the work in progress is corrupt"
                        );
                    }
                    root.borrow_mut().finished_work = Some(work.clone());
                    root.borrow_mut().finished_priority = pass.render_priority;
                    return Ok(None);
                }
            }
        }
    }

    // ----- drivers -----

    /// Flushes all Synchronous and Task work, committing as roots finish.
    pub(crate) fn perform_task_work(this: &Rc<Self>) {
        Self::perform_work_at(this, PriorityLevel::Task, None);
    }

    fn perform_animation_work(this: &Rc<Self>) -> Result<(), ReconcileError> {
        this.state.borrow_mut().animation_scheduled = false;
        Self::perform_work_at(this, PriorityLevel::Animation, None);
        this.take_uncaught()
    }

    fn perform_deferred_work(
        this: &Rc<Self>,
        deadline: &dyn Deadline,
    ) -> Result<(), ReconcileError> {
        this.state.borrow_mut().deferred_scheduled = false;
        Self::perform_work_at(this, PriorityLevel::Offscreen, Some(deadline));
        this.take_uncaught()
    }

    /// The cooperative loop: one fiber at a time, most urgent root first,
    /// stopping at `cutoff` urgency and (for deferred levels) yielding
    /// when the deadline runs dry. Suspension is unit-exact — a fiber is
    /// never left half-processed.
    fn perform_work_at(
        this: &Rc<Self>,
        cutoff: PriorityLevel,
        deadline: Option<&dyn Deadline>,
    ) {
        {
            let mut state = this.state.borrow_mut();
            if state.is_performing_work {
                return;
            }
            state.is_performing_work = true;
        }

        Self::flush_parked_commits(this, deadline);

        loop {
            let unit = {
                let state = this.state.borrow();
                state.next_unit_of_work.clone()
            };
            let unit = match unit {
                Some(unit) => unit,
                None => match this.find_next_unit_of_work() {
                    Some(unit) => {
                        this.state.borrow_mut().next_unit_of_work = Some(unit.clone());
                        unit
                    }
                    None => break,
                },
            };

            let level = this.state.borrow().next_priority_level;
            if level == PriorityLevel::NoWork || level > cutoff {
                break;
            }
            if level.is_deferred() {
                if let Some(deadline) = deadline {
                    if deadline.time_remaining() <= TIME_HEURISTIC_MS {
                        break;
                    }
                }
            }

            match this.perform_unit_of_work(unit) {
                Ok(next) => {
                    let mut state = this.state.borrow_mut();
                    if state.walk_invalidated {
                        // Higher-urgency work arrived mid-unit; the
                        // partial walk is abandoned uncommitted.
                        state.walk_invalidated = false;
                        state.next_unit_of_work = None;
                        state.work_root = None;
                        continue;
                    }
                    match next {
                        Some(next) => state.next_unit_of_work = Some(next),
                        None => {
                            state.next_unit_of_work = None;
                            let root = state.work_root.take();
                            drop(state);
                            if let Some(root) = root {
                                let can_commit = !level.is_deferred()
                                    || deadline
                                        .map(|d| d.time_remaining() > TIME_HEURISTIC_MS)
                                        .unwrap_or(true);
                                if can_commit {
                                    Self::commit_root(this, &root);
                                } else {
                                    park_finished_work(&root);
                                    break;
                                }
                            }
                        }
                    }
                }
                Err((failed, error)) => {
                    {
                        let mut state = this.state.borrow_mut();
                        state.next_unit_of_work = None;
                        state.work_root = None;
                        state.walk_invalidated = false;
                    }
                    Self::handle_error(this, &failed, error);
                }
            }
        }

        {
            let mut state = this.state.borrow_mut();
            state.is_performing_work = false;
            state.failed_boundaries.clear();
        }
        Self::request_remaining_work(this);
    }

    /// A deferred pass that finished right at the deadline leaves its
    /// tree parked on the root; later ticks commit it before rendering
    /// anything new.
    fn flush_parked_commits(this: &Rc<Self>, deadline: Option<&dyn Deadline>) {
        let mut cursor = this.state.borrow().next_scheduled_root.clone();
        while let Some(root) = cursor {
            let next = root.borrow().next_scheduled_root.clone();
            if root.borrow().finished_work.is_some() {
                let can_commit = deadline
                    .map(|d| d.time_remaining() > TIME_HEURISTIC_MS)
                    .unwrap_or(true);
                if can_commit {
                    Self::commit_root(this, &root);
                }
            }
            cursor = next;
        }
    }

    /// Schedules host callbacks for whatever is still pending once the
    /// current drive ends.
    fn request_remaining_work(this: &Rc<Self>) {
        let mut remaining = PriorityLevel::NoWork;
        {
            let state = this.state.borrow();
            let mut cursor = state.next_scheduled_root.clone();
            while let Some(root) = cursor {
                let pending = root.borrow().current.borrow().pending_work_priority;
                remaining = remaining.more_urgent(pending);
                if root.borrow().finished_work.is_some() {
                    remaining = remaining.more_urgent(root.borrow().finished_priority);
                }
                cursor = root.borrow().next_scheduled_root.clone();
            }
        }
        match remaining {
            PriorityLevel::NoWork => {}
            PriorityLevel::Animation => Self::request_animation(this),
            // Sync/Task leftovers can only appear here when scheduled
            // from the tail of the loop; run them on the deferred pump
            // rather than recursing.
            _ => Self::request_deferred(this),
        }
    }

    // ----- commit -----

    fn commit_root(this: &Rc<Self>, root: &RootRef) {
        let finished = match root.borrow_mut().finished_work.take() {
            Some(finished) => finished,
            None => return,
        };
        root.borrow_mut().finished_priority = PriorityLevel::NoWork;

        {
            let mut state = this.state.borrow_mut();
            if state.is_committing {
                panic!("cannot start a commit while another commit is in progress");
            }
            state.is_committing = true;
        }

        let container = root.borrow().container_info.clone();
        let commit = CommitWork::new(this.host.clone(), container);
        let subtree_has_effects = finished.borrow().first_effect.is_some();
        let root_flags = finished.borrow().flags;
        let mutation_errors = if subtree_has_effects || root_flags.intersects(get_mutation_mask())
        {
            commit.commit_mutation_effects(&finished)
        } else {
            vec![]
        };
        let lifecycle_error =
            if subtree_has_effects || root_flags.intersects(get_lifecycle_mask()) {
                commit.commit_lifecycle_effects(&finished)
            } else {
                None
            };

        // The swap is a single pointer write; nothing observes an
        // intermediate state.
        root.borrow_mut().current = finished.clone();
        cleanup_effect_list(&finished);

        let recovering = {
            let mut state = this.state.borrow_mut();
            state.is_committing = false;
            std::mem::take(&mut state.recovering_boundaries)
        };

        // Errors captured mid-commit could not start new renders then;
        // route them now that the tree is consistent.
        for (fiber, error) in mutation_errors {
            Self::handle_error(this, &fiber, error);
        }
        if let Some((fiber, error)) = lifecycle_error {
            Self::handle_error(this, &fiber, error);
        }

        // Boundaries whose bad subtree was just unmounted get their
        // recovery render immediately next.
        for boundary in recovering {
            clear_force_empty(&boundary);
            let queue = boundary.borrow().update_queue.clone();
            if let Some(queue) = queue {
                let mut update = create_update(UpdateAction::Partial(Default::default()));
                update.is_forced = true;
                enqueue_update(&queue, update);
            }
            Self::schedule_update(this, &boundary, PriorityLevel::Synchronous);
        }
    }

    // ----- error recovery -----

    /// Routes a captured failure to the nearest live boundary, or records
    /// it as the batch's uncaught error. Boundary recovery is two steps:
    /// unmount the failed subtree by rendering the boundary empty, then a
    /// forced update so it renders fallback content.
    fn handle_error(this: &Rc<Self>, failed: &FiberRef, error: CapturedError) {
        log!("captured {error} below {:?}", failed.borrow());
        let matched = {
            let state = this.state.borrow();
            find_closest_error_boundary(failed, &error, &state.failed_boundaries)
        };

        let matched = match matched {
            Some(matched) => matched,
            None => {
                let mut state = this.state.borrow_mut();
                if state.first_uncaught.is_none() {
                    state.first_uncaught = Some(error);
                }
                drop(state);
                // Drop the doomed work so the loop cannot spin on it.
                abandon_root_work(failed);
                return;
            }
        };

        {
            let mut state = this.state.borrow_mut();
            state.failed_boundaries.push(matched.boundary.clone());
            state.recovering_boundaries.push(matched.boundary.clone());
        }

        set_force_empty(&matched.boundary);
        let queue = {
            let boundary_ref = matched.boundary.borrow();
            boundary_ref.update_queue.clone()
        };
        let queue = match queue {
            Some(queue) => queue,
            None => {
                let queue = create_update_queue();
                matched.boundary.borrow_mut().update_queue = Some(queue.clone());
                if let Some(alternate) = matched.boundary.borrow().alternate.clone() {
                    alternate.borrow_mut().update_queue = Some(queue.clone());
                }
                queue
            }
        };
        let mut update = create_update(matched.action);
        update.is_forced = true;
        enqueue_update(&queue, update);

        // Restart synchronously from the root so the unmount commits
        // before anything else runs.
        Self::schedule_update(this, &matched.boundary, PriorityLevel::Synchronous);

        // When the failure happened inside an uncommitted tree (initial
        // mount included), the boundary only exists there: resume the
        // walk from that tree's root instead of cloning the committed
        // one. Bailouts re-clone the children on the way down, so
        // partially built state below is rebuilt cleanly.
        let top = top_of(&matched.boundary);
        if top.borrow().tag == WorkTag::HostRoot {
            let top_state_node = top.borrow().state_node.clone();
            if let Some(StateNode::Root(root)) = top_state_node {
                let is_wip = !Rc::ptr_eq(&root.borrow().current, &top);
                if is_wip {
                    // Effects spliced before the failure would double up
                    // on the re-walk.
                    top.borrow_mut().first_effect = None;
                    top.borrow_mut().last_effect = None;
                    let mut state = this.state.borrow_mut();
                    state.next_unit_of_work = Some(top.clone());
                    state.next_priority_level = PriorityLevel::Synchronous;
                    state.work_root = Some(root);
                    state.pass.render_priority = PriorityLevel::Synchronous;
                    state.walk_invalidated = false;
                }
            }
        }
    }
}

fn top_of(fiber: &FiberRef) -> FiberRef {
    let mut node = fiber.clone();
    loop {
        let parent = node.borrow()._return.clone();
        match parent {
            Some(parent) => node = parent,
            None => return node,
        }
    }
}

fn bump_priority(fiber: &FiberRef, priority: PriorityLevel) {
    {
        let mut fiber_mut = fiber.borrow_mut();
        fiber_mut.pending_work_priority =
            fiber_mut.pending_work_priority.more_urgent(priority);
    }
    let alternate = fiber.borrow().alternate.clone();
    if let Some(alternate) = alternate {
        let mut alternate_mut = alternate.borrow_mut();
        alternate_mut.pending_work_priority =
            alternate_mut.pending_work_priority.more_urgent(priority);
    }
}

/// Remaining work after completion bubbles up from the children; a
/// subtree deprioritized below the current render priority keeps its
/// offscreen marker.
fn reset_work_priority(work: &FiberRef, render_priority: PriorityLevel) {
    let mut new_priority = PriorityLevel::NoWork;
    if work.borrow().pending_work_priority == PriorityLevel::Offscreen
        && render_priority < PriorityLevel::Offscreen
    {
        new_priority = PriorityLevel::Offscreen;
    }
    let mut child = work.borrow().child.clone();
    while let Some(fiber) = child {
        new_priority = new_priority.more_urgent(fiber.borrow().pending_work_priority);
        child = fiber.borrow().sibling.clone();
    }
    work.borrow_mut().pending_work_priority = new_priority;
}

/// Appends a completed fiber's subtree effects, then its own entry, onto
/// the parent's list. Sibling completion order is what makes the final
/// list a deterministic post-order.
fn splice_effects(parent: &FiberRef, work: &FiberRef) {
    let work_first = work.borrow().first_effect.clone();
    let work_last = work.borrow().last_effect.clone();

    if parent.borrow().first_effect.is_none() {
        parent.borrow_mut().first_effect = work_first.clone();
    }
    if let Some(work_last) = work_last {
        let parent_last = parent.borrow().last_effect.clone();
        if let Some(parent_last) = parent_last {
            parent_last.borrow_mut().next_effect = work_first;
        }
        parent.borrow_mut().last_effect = Some(work_last);
    }

    let flags = work.borrow().flags;
    if flags != Flags::NoFlags {
        work.borrow_mut().next_effect = None;
        let parent_last = parent.borrow().last_effect.clone();
        match parent_last {
            Some(last) => last.borrow_mut().next_effect = Some(work.clone()),
            None => parent.borrow_mut().first_effect = Some(work.clone()),
        }
        parent.borrow_mut().last_effect = Some(work.clone());
    }
}

/// A deferred tree that completed with no budget left to commit: the
/// root keeps it, and the current tree inherits whatever priority is
/// still unresolved below so the scheduler stops re-selecting this root
/// for rendering.
fn park_finished_work(root: &RootRef) {
    let finished = root.borrow().finished_work.clone();
    if let Some(finished) = finished {
        let leftover = finished.borrow().pending_work_priority;
        let current = root.borrow().current.clone();
        current.borrow_mut().pending_work_priority = leftover;
    }
}

fn set_force_empty(boundary: &FiberRef) {
    boundary.borrow_mut().force_empty_render = true;
    let alternate = boundary.borrow().alternate.clone();
    if let Some(alternate) = alternate {
        alternate.borrow_mut().force_empty_render = true;
    }
}

fn clear_force_empty(boundary: &FiberRef) {
    boundary.borrow_mut().force_empty_render = false;
    let alternate = boundary.borrow().alternate.clone();
    if let Some(alternate) = alternate {
        alternate.borrow_mut().force_empty_render = false;
    }
}

/// With no boundary anywhere, the failed pass is dropped entirely: the
/// root's pending priority is cleared so the scheduler does not spin
/// retrying work that can only fail again.
fn abandon_root_work(failed: &FiberRef) {
    let mut node = failed.clone();
    loop {
        let parent = node.borrow()._return.clone();
        match parent {
            Some(parent) => node = parent,
            None => break,
        }
    }
    if node.borrow().tag == WorkTag::HostRoot {
        node.borrow_mut().pending_work_priority = PriorityLevel::NoWork;
        let alternate = node.borrow().alternate.clone();
        if let Some(alternate) = alternate {
            alternate.borrow_mut().pending_work_priority = PriorityLevel::NoWork;
        }
    }
}
