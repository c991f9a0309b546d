mod common;

use common::{attrs, host, labeled};
use weft_noop::NoopRenderer;
use weft_reconciler::{Children, Element, Props, PropValue};

fn hidden_box(children: impl Into<Children>) -> Element {
    Element::host(
        "box",
        Props::new(
            [("hidden".to_string(), PropValue::Bool(true))]
                .into_iter()
                .collect(),
            children.into(),
        ),
    )
}

#[test]
fn hidden_subtree_is_reconciled_only_at_offscreen_priority() {
    let renderer = NoopRenderer::new();
    renderer
        .render(host(
            "app",
            Children::list([hidden_box(labeled("secret", "s")).into()]),
        ))
        .unwrap();

    // The hidden box itself commits, its content does not.
    let app = renderer.snapshot()[0].clone();
    assert!(app.contains("box#"), "snapshot: {app}");
    assert!(!app.contains("secret"), "snapshot: {app}");
    // The skipped content left offscreen work behind.
    assert!(renderer.has_deferred_work());

    renderer.flush_all_deferred().unwrap();
    let app = renderer.snapshot()[0].clone();
    assert!(app.contains("secret"), "snapshot: {app}");
}

#[test]
fn revealing_a_hidden_subtree_keeps_the_offscreen_instances() {
    let renderer = NoopRenderer::new();
    renderer
        .render(host(
            "app",
            Children::list([hidden_box(labeled("secret", "s")).into()]),
        ))
        .unwrap();
    renderer.flush_all_deferred().unwrap();

    let app_instance = renderer.container.children.borrow()[0].clone();
    let box_instance = app_instance.children.borrow()[0].clone();
    let secret_id = box_instance.children.borrow()[0].id;

    // Reveal: same content, hidden flag dropped. The offscreen-built
    // instance survives; the list diff starts from a fresh mark.
    renderer
        .render(host(
            "app",
            Children::list([Element::host(
                "box",
                Props::with_children(labeled("secret", "s").into()),
            )
            .into()]),
        ))
        .unwrap();

    let box_after = app_instance.children.borrow()[0].clone();
    assert_eq!(box_after.children.borrow()[0].id, secret_id);
}

#[test]
fn hiding_a_visible_subtree_defers_its_reconciliation() {
    let renderer = NoopRenderer::new();
    renderer
        .render(host(
            "app",
            Children::list([host("box", labeled("item", "v1")).into()]),
        ))
        .unwrap();
    let app_instance = renderer.container.children.borrow()[0].clone();
    let box_instance = app_instance.children.borrow()[0].clone();
    assert_eq!(box_instance.children.borrow().len(), 1);

    // Hide with changed content: the committed child stays in place
    // until the offscreen pass catches up.
    renderer
        .render(host(
            "app",
            Children::list([hidden_box(labeled("item", "v2")).into()]),
        ))
        .unwrap();
    let item = box_instance.children.borrow()[0].clone();
    assert_eq!(*item.text.borrow(), "v1");

    renderer.flush_all_deferred().unwrap();
    let item = box_instance.children.borrow()[0].clone();
    assert_eq!(*item.text.borrow(), "v2");
}

#[test]
fn attribute_changes_on_the_hidden_node_itself_still_commit() {
    let renderer = NoopRenderer::new();
    renderer
        .render(Element::host(
            "box",
            Props::new(
                attrs(&[("hidden", PropValue::Bool(true)), ("width", PropValue::from(1))])
                    .attrs()
                    .clone(),
                Children::None,
            ),
        ))
        .unwrap();
    let id = renderer.container.children.borrow()[0].id;

    renderer
        .render(Element::host(
            "box",
            Props::new(
                attrs(&[("hidden", PropValue::Bool(true)), ("width", PropValue::from(2))])
                    .attrs()
                    .clone(),
                Children::None,
            ),
        ))
        .unwrap();
    let instance = renderer.container.children.borrow()[0].clone();
    assert_eq!(instance.id, id);
    assert_eq!(
        instance.props.borrow().get("width"),
        Some(&PropValue::Num(2.0))
    );
}
