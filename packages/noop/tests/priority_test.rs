mod common;

use common::{host, labeled};
use weft_noop::{HostOp, NoopRenderer, UnitBudget};
use weft_reconciler::{Children, PriorityLevel};

fn wide_tree(label: &str, width: usize) -> Children {
    host(
        "root",
        Children::list(
            (0..width).map(|i| labeled("cell", &format!("{label}{i}")).into()),
        ),
    )
    .into()
}

#[test]
fn deferred_work_waits_for_the_idle_pump() {
    let renderer = NoopRenderer::new();
    renderer
        .render_at(PriorityLevel::Low, wide_tree("a", 3))
        .unwrap();
    // Scheduled, not rendered: low priority work needs idle time.
    assert!(renderer.snapshot().is_empty());
    assert!(renderer.has_deferred_work());

    renderer.flush_all_deferred().unwrap();
    assert_eq!(renderer.snapshot().len(), 1);
}

#[test]
fn deferred_work_suspends_at_unit_granularity_and_resumes() {
    let renderer = NoopRenderer::new();
    renderer
        .render_at(PriorityLevel::Low, wide_tree("a", 6))
        .unwrap();

    // A tiny budget: the walk starts but cannot finish, and nothing may
    // reach the host container until the tree completes.
    renderer.flush_deferred(&UnitBudget::new(2)).unwrap();
    assert!(renderer.snapshot().is_empty());
    assert!(renderer.has_deferred_work(), "continuation was rescheduled");

    renderer.flush_all_deferred().unwrap();
    let snapshot = renderer.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot[0].contains("a5"), "snapshot: {snapshot:?}");
}

#[test]
fn synchronous_update_discards_an_in_flight_low_priority_walk() {
    let renderer = NoopRenderer::new();
    renderer
        .render_at(PriorityLevel::Low, wide_tree("low", 6))
        .unwrap();
    // Start the low-priority walk without letting it finish.
    renderer.flush_deferred(&UnitBudget::new(2)).unwrap();
    assert!(renderer.snapshot().is_empty());

    // Synchronous work for the same root preempts: the partial tree is
    // dropped, and only the synchronous result ever commits.
    renderer.render(wide_tree("sync", 2)).unwrap();
    let snapshot = renderer.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot[0].contains("sync0"), "snapshot: {snapshot:?}");
    assert!(!snapshot[0].contains("low"), "snapshot: {snapshot:?}");

    let ops = renderer.take_ops();
    let container_appends = ops
        .iter()
        .filter(|op| {
            matches!(op, HostOp::Append { parent, .. }
                if *parent == renderer.container.id as i64)
        })
        .count();
    assert_eq!(container_appends, 1, "only the sync tree was placed: {ops:?}");

    // The abandoned low-priority update was superseded; nothing left.
    renderer.flush_all_deferred().unwrap();
    assert!(renderer.snapshot()[0].contains("sync0"));
}

#[test]
fn batched_updates_commit_once() {
    let renderer = NoopRenderer::new();
    renderer
        .reconciler
        .batched_updates(|| {
            let _ = renderer.render(labeled("first", "1"));
            let _ = renderer.render(labeled("second", "2"));
        })
        .unwrap();

    // Last description wins, through a single commit.
    let snapshot = renderer.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot[0].contains("second#"), "snapshot: {snapshot:?}");
    let ops = renderer.take_ops();
    let commits = ops
        .iter()
        .filter(|op| matches!(op, HostOp::PrepareForCommit))
        .count();
    assert_eq!(commits, 1, "ops: {ops:?}");
}

#[test]
fn animation_work_runs_on_the_frame_pump() {
    let renderer = NoopRenderer::new();
    renderer
        .render_at(PriorityLevel::Animation, labeled("frame", "f"))
        .unwrap();
    assert!(renderer.snapshot().is_empty());
    assert!(!renderer.host.animation.borrow().is_empty());

    renderer.flush_animation().unwrap();
    assert_eq!(renderer.snapshot().len(), 1);
}
