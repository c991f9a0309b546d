mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::{host, labeled, new_log, TestClass};
use weft_noop::{HostOp, NoopRenderer};
use weft_reconciler::{Children, Element, Props, RefHandle};

#[test]
fn mounts_a_host_tree_with_one_root_placement() {
    let renderer = NoopRenderer::new();
    renderer
        .render(host("div", Children::list([
            labeled("span", "hi").into(),
            Children::from("plain"),
        ])))
        .unwrap();

    assert_eq!(renderer.snapshot().len(), 1);
    assert!(renderer.snapshot()[0].starts_with("div#"));

    let ops = renderer.take_ops();
    // The whole new tree enters the container through a single
    // root-level placement; everything below is wired while detached.
    let appends: Vec<_> = ops
        .iter()
        .filter(|op| matches!(op, HostOp::Append { .. } | HostOp::InsertBefore { .. }))
        .collect();
    assert_eq!(appends.len(), 1);
    let initial_appends = ops
        .iter()
        .filter(|op| matches!(op, HostOp::AppendInitial { .. }))
        .count();
    assert_eq!(initial_appends, 2);
}

#[test]
fn commit_brackets_every_mutation_pass() {
    let renderer = NoopRenderer::new();
    renderer.render(host("div", Children::None)).unwrap();
    let ops = renderer.take_ops();
    let prepare = ops
        .iter()
        .position(|op| *op == HostOp::PrepareForCommit)
        .unwrap();
    let reset = ops
        .iter()
        .position(|op| *op == HostOp::ResetAfterCommit)
        .unwrap();
    assert!(prepare < reset);
    // Host mutations land strictly inside the bracket.
    for (index, op) in ops.iter().enumerate() {
        if matches!(op, HostOp::Append { .. }) {
            assert!(index > prepare && index < reset);
        }
    }
}

#[test]
fn text_updates_in_place() {
    let renderer = NoopRenderer::new();
    renderer.render(host("div", Children::from("one"))).unwrap();
    renderer.take_ops();
    renderer.render(host("div", Children::from("two"))).unwrap();

    let ops = renderer.take_ops();
    assert!(ops.iter().any(|op| matches!(
        op,
        HostOp::CommitTextUpdate { old, new, .. } if old == "one" && new == "two"
    )));
    // No instance churn for a content-only change.
    assert!(!ops
        .iter()
        .any(|op| matches!(op, HostOp::CreateInstance { .. } | HostOp::CreateText { .. })));
}

#[test]
fn switching_away_from_text_content_resets_it() {
    let renderer = NoopRenderer::new();
    renderer.render(labeled("box", "direct")).unwrap();
    let box_instance = renderer.container.children.borrow()[0].clone();
    assert_eq!(*box_instance.text.borrow(), "direct");
    renderer.take_ops();

    // Content moves from the host fast path to a real text child; the
    // old direct text has to be cleared.
    renderer
        .render(host("box", Children::from("as-child")))
        .unwrap();
    let ops = renderer.take_ops();
    assert!(ops
        .iter()
        .any(|op| matches!(op, HostOp::ResetText { id } if *id == box_instance.id)));
    assert!(box_instance.text.borrow().is_empty());
    assert_eq!(box_instance.children.borrow().len(), 1);
}

#[test]
fn fragments_flatten_into_the_parent() {
    let renderer = NoopRenderer::new();
    renderer
        .render(Element::fragment(Children::list([
            host("a", Children::None).into(),
            host("b", Children::None).into(),
        ])))
        .unwrap();
    let snapshot = renderer.snapshot();
    assert_eq!(snapshot.len(), 2);
    assert!(snapshot[0].starts_with("a#"));
    assert!(snapshot[1].starts_with("b#"));
}

#[test]
fn completion_callback_fires_after_the_tree_landed() {
    let renderer = NoopRenderer::new();
    let container = renderer.container.clone();
    let observed = Rc::new(Cell::new(0));
    let observed_in_callback = observed.clone();
    renderer
        .render_with(
            host("div", Children::None),
            None,
            Some(Box::new(move || {
                observed_in_callback.set(container.children.borrow().len());
            })),
        )
        .unwrap();
    // The callback ran and saw the committed child.
    assert_eq!(observed.get(), 1);
}

#[test]
fn refs_attach_on_commit_and_detach_on_unmount() {
    let renderer = NoopRenderer::new();
    let handle = RefHandle::new();
    renderer
        .render(Element::host("div", Props::empty()).with_ref(handle.clone()))
        .unwrap();
    assert!(handle.current().is_some());

    renderer.unmount().unwrap();
    assert!(handle.current().is_none());
    assert!(renderer.snapshot().is_empty());
}

#[test]
fn unmount_runs_lifecycle_and_empties_the_container() {
    let renderer = NoopRenderer::new();
    let log = new_log();
    let class = TestClass::new("widget", &log);
    renderer
        .render(class.element(host("div", Children::None)))
        .unwrap();
    assert_eq!(renderer.snapshot().len(), 1);

    renderer.unmount().unwrap();
    assert!(renderer.snapshot().is_empty());
    assert!(log.borrow().iter().any(|entry| entry == "unmount widget"));
}

#[test]
fn mount_container_creates_and_renders_in_one_call() {
    let host = weft_noop::NoopHost::new();
    let reconciler = weft_reconciler::Reconciler::new(host.clone());
    let container = host.create_container();
    let root = reconciler
        .mount_container(
            host_element_for_mount().into(),
            container.clone(),
            None,
            None,
        )
        .unwrap();
    assert_eq!(container.children.borrow().len(), 1);
    assert!(reconciler.find_host_instance(&root).is_some());
}

fn host_element_for_mount() -> Element {
    host("app", Children::None)
}

#[test]
fn find_host_instance_returns_the_first_host_node() {
    let renderer = NoopRenderer::new();
    let log = new_log();
    let class = TestClass::new("wrapper", &log);
    renderer
        .render(class.element(host("section", Children::None)))
        .unwrap();
    let instance = renderer.reconciler.find_host_instance(&renderer.root);
    let instance = instance
        .unwrap()
        .downcast::<weft_noop::NoopInstance>()
        .unwrap();
    assert_eq!(instance.tag, "section");
}
