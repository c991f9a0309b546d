use std::cell::Cell;
use std::rc::Rc;

use weft_reconciler::{
    Children, FiberRootNode, PriorityLevel, ReconcileError, Reconciler, StateMap,
    UpdateCallback,
};
use weft_scheduler::Deadline;

use crate::host_config::{container_snapshot, HostOp, NoopContainer, NoopHost};

/// Deadline that answers "plenty of time" a fixed number of times, then
/// reports exhaustion. Lets tests force suspension after a known number
/// of budget checks without a clock.
pub struct UnitBudget {
    checks: Cell<u32>,
}

impl UnitBudget {
    pub fn new(checks: u32) -> UnitBudget {
        UnitBudget {
            checks: Cell::new(checks),
        }
    }
}

impl Deadline for UnitBudget {
    fn time_remaining(&self) -> f64 {
        let left = self.checks.get();
        if left == 0 {
            return 0.0;
        }
        self.checks.set(left - 1);
        100.0
    }
}

/// Deadline that never runs out.
pub struct UnlimitedBudget;

impl Deadline for UnlimitedBudget {
    fn time_remaining(&self) -> f64 {
        1.0e9
    }
}

/// A reconciler wired to the in-memory host, plus the manual pumps the
/// tests drive the cooperative yield points with.
pub struct NoopRenderer {
    pub host: Rc<NoopHost>,
    pub reconciler: Reconciler,
    pub container: Rc<NoopContainer>,
    pub root: Rc<std::cell::RefCell<FiberRootNode>>,
}

impl NoopRenderer {
    pub fn new() -> NoopRenderer {
        let host = NoopHost::new();
        let reconciler = Reconciler::new(host.clone());
        let container = host.create_container();
        let root = reconciler.create_container(container.clone());
        NoopRenderer {
            host,
            reconciler,
            container,
            root,
        }
    }

    pub fn render(&self, children: impl Into<Children>) -> Result<(), ReconcileError> {
        self.reconciler.update_container(children.into(), &self.root)
    }

    pub fn render_with(
        &self,
        children: impl Into<Children>,
        parent_context: Option<StateMap>,
        on_complete: Option<UpdateCallback>,
    ) -> Result<(), ReconcileError> {
        self.reconciler
            .update_container_with(children.into(), &self.root, parent_context, on_complete)
    }

    /// Renders at an explicit priority instead of the default.
    pub fn render_at(
        &self,
        priority: PriorityLevel,
        children: impl Into<Children>,
    ) -> Result<(), ReconcileError> {
        let children = children.into();
        let mut inner = Ok(());
        let outer = self.reconciler.perform_with_priority(priority, || {
            inner = self.reconciler.update_container(children, &self.root);
        });
        inner.and(outer)
    }

    pub fn unmount(&self) -> Result<(), ReconcileError> {
        self.reconciler.unmount_container(&self.root)
    }

    pub fn has_deferred_work(&self) -> bool {
        !self.host.deferred.borrow().is_empty()
    }

    /// Runs every deferred callback queued so far against one deadline.
    /// Callbacks rescheduled during the run wait for the next pump.
    pub fn flush_deferred(&self, deadline: &dyn Deadline) -> Result<(), ReconcileError> {
        let callbacks: Vec<_> = self.host.deferred.borrow_mut().drain(..).collect();
        let mut result = Ok(());
        for callback in callbacks {
            let outcome = callback(deadline);
            if result.is_ok() {
                result = outcome;
            }
        }
        result
    }

    /// Pumps deferred work with unlimited budget until none remains.
    pub fn flush_all_deferred(&self) -> Result<(), ReconcileError> {
        let mut result = Ok(());
        let mut spins = 0;
        while self.has_deferred_work() {
            spins += 1;
            if spins > 100 {
                panic!("deferred work is not converging");
            }
            let outcome = self.flush_deferred(&UnlimitedBudget);
            if result.is_ok() {
                result = outcome;
            }
        }
        result
    }

    pub fn flush_animation(&self) -> Result<(), ReconcileError> {
        let callbacks: Vec<_> = self.host.animation.borrow_mut().drain(..).collect();
        let mut result = Ok(());
        for callback in callbacks {
            let outcome = callback();
            if result.is_ok() {
                result = outcome;
            }
        }
        result
    }

    /// Drains and returns the host operation log.
    pub fn take_ops(&self) -> Vec<HostOp> {
        self.host.take_ops()
    }

    /// Committed container contents as display strings.
    pub fn snapshot(&self) -> Vec<String> {
        container_snapshot(&self.container)
    }
}

impl Default for NoopRenderer {
    fn default() -> Self {
        Self::new()
    }
}
