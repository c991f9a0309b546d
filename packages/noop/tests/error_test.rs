mod common;

use common::{host, labeled, log_of, new_log, TestClass};
use weft_noop::NoopRenderer;
use weft_reconciler::{Children, ReconcileError};

#[test]
fn boundary_contains_a_descendant_render_error() {
    let renderer = NoopRenderer::new();
    let log = new_log();
    let boundary = TestClass::boundary("guard", &log);
    let failing = TestClass::failing_render("bomb", &log);

    let result = renderer.render(host(
        "app",
        Children::list([
            boundary
                .element(failing.element(Children::None))
                .into(),
            labeled("aside", "untouched").into(),
        ]),
    ));

    // Caught: nothing escapes to the caller.
    result.unwrap();
    assert!(log.borrow().contains(&"capture guard".to_string()));

    let snapshot = renderer.snapshot();
    assert_eq!(snapshot.len(), 1);
    let app = &snapshot[0];
    // The boundary renders its fallback; the sibling kept its content.
    assert!(app.contains("fallback-guard"), "snapshot: {app}");
    assert!(app.contains("untouched"), "snapshot: {app}");
}

#[test]
fn boundary_protects_committed_siblings_on_update_errors() {
    let renderer = NoopRenderer::new();
    let log = new_log();
    let boundary = TestClass::boundary("guard", &log);
    let failing = TestClass::failing_render("bomb", &log);

    renderer
        .render(host(
            "app",
            Children::list([
                boundary.element(labeled("inner", "fine")).into(),
                labeled("aside", "untouched").into(),
            ]),
        ))
        .unwrap();

    // Second pass swaps the healthy child for one that throws.
    renderer
        .render(host(
            "app",
            Children::list([
                boundary.element(failing.element(Children::None)).into(),
                labeled("aside", "untouched").into(),
            ]),
        ))
        .unwrap();

    let app = &renderer.snapshot()[0];
    assert!(app.contains("fallback-guard"), "snapshot: {app}");
    assert!(app.contains("untouched"), "snapshot: {app}");
    // The previously committed subtree under the boundary was unmounted
    // for real before the fallback rendered.
    assert!(!app.contains("fine"), "snapshot: {app}");
}

#[test]
fn uncaught_errors_surface_exactly_once_and_reset_cleanly() {
    let renderer = NoopRenderer::new();
    let log = new_log();
    let failing = TestClass::failing_render("bomb", &log);

    let result = renderer.render(failing.element(Children::None));
    assert!(matches!(result, Err(ReconcileError::Uncaught(_))));
    assert!(renderer.snapshot().is_empty());

    // State was reset; the next render succeeds.
    renderer.render(labeled("ok", "recovered")).unwrap();
    assert_eq!(renderer.snapshot().len(), 1);
    assert!(renderer.snapshot()[0].contains("recovered"));
}

#[test]
fn failing_boundary_escalates_to_the_next_one() {
    let renderer = NoopRenderer::new();
    let log = new_log();
    let outer = TestClass::boundary("outer", &log);
    // Inner boundary claims the error but its own recovery render fails
    // too, so the outer one takes over.
    let inner = std::rc::Rc::new(common::TestClass {
        name: "inner".to_string(),
        log: log.clone(),
        boundary: true,
        fail_render: false,
        fail_fallback: true,
        fail_did_mount: false,
        fail_unmount: false,
    });
    let failing = TestClass::failing_render("bomb", &log);

    renderer
        .render(outer.element(inner.element(failing.element(Children::None))))
        .unwrap();

    let entries = log_of(&log);
    assert!(entries.contains(&"capture inner".to_string()));
    assert!(entries.contains(&"capture outer".to_string()));
    assert_eq!(renderer.snapshot(), vec!["\"fallback-outer\"".to_string()]);
}

#[test]
fn unmount_errors_are_swallowed_and_teardown_completes() {
    let renderer = NoopRenderer::new();
    let log = new_log();
    let stubborn = TestClass::failing_unmount("stubborn", &log);

    renderer
        .render(host(
            "app",
            Children::list([stubborn.element(labeled("x", "x")).into()]),
        ))
        .unwrap();
    renderer.render(host("app", Children::None)).unwrap();

    // No error escaped, the hook ran, and the host content is gone.
    assert!(log.borrow().contains(&"unmount stubborn".to_string()));
    let app = &renderer.snapshot()[0];
    assert!(!app.contains("x#"), "snapshot: {app}");
}

#[test]
fn failing_did_mount_reverts_earlier_mounts_in_reverse() {
    let renderer = NoopRenderer::new();
    let log = new_log();
    let first = TestClass::new("first", &log);
    let second = TestClass::failing_did_mount("second", &log);

    let result = renderer.render(host(
        "app",
        Children::list([
            first.element(Children::None).into(),
            second.element(Children::None).into(),
        ]),
    ));
    assert!(matches!(result, Err(ReconcileError::Uncaught(_))));

    let entries = log_of(&log);
    let mount_first = entries.iter().position(|e| e == "mount first").unwrap();
    let mount_second = entries.iter().position(|e| e == "mount second").unwrap();
    let unmount_first = entries.iter().position(|e| e == "unmount first").unwrap();
    assert!(mount_first < mount_second);
    // The opposite hook ran for the component that did mount.
    assert!(unmount_first > mount_second);
}
