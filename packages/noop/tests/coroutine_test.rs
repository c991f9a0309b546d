mod common;

use std::rc::Rc;

use common::host;
use weft_noop::NoopRenderer;
use weft_reconciler::element::CoroutineHandler;
use weft_reconciler::{Children, Element, Props, PropValue};

fn totaling_handler() -> Rc<CoroutineHandler> {
    Rc::new(|_props: &Props, yields: &[PropValue]| {
        let total: f64 = yields.iter().filter_map(PropValue::as_num).sum();
        Ok(Children::Text(format!("total={total}")))
    })
}

fn totaling_coroutine(handler: &Rc<CoroutineHandler>, yields: &[f64]) -> Element {
    let children = Children::list(
        yields
            .iter()
            .map(|value| Element::yielded(*value).into()),
    );
    Element::coroutine_of(handler.clone(), Props::with_children(children))
}

#[test]
fn handler_receives_collected_yields() {
    let renderer = NoopRenderer::new();
    let handler = totaling_handler();
    renderer
        .render(host(
            "app",
            totaling_coroutine(&handler, &[1.0, 2.0, 3.0]),
        ))
        .unwrap();
    let app = renderer.snapshot()[0].clone();
    assert!(app.contains("total=6"), "snapshot: {app}");
}

#[test]
fn continuation_updates_when_yields_change() {
    let renderer = NoopRenderer::new();
    let handler = totaling_handler();
    renderer
        .render(host("app", totaling_coroutine(&handler, &[1.0, 2.0])))
        .unwrap();
    let app_instance = renderer.container.children.borrow()[0].clone();
    let text_id = app_instance.children.borrow()[0].id;

    renderer
        .render(host("app", totaling_coroutine(&handler, &[5.0, 7.0])))
        .unwrap();
    let app = renderer.snapshot()[0].clone();
    assert!(app.contains("total=12"), "snapshot: {app}");
    // The continuation's text node was updated, not replaced.
    assert_eq!(app_instance.children.borrow()[0].id, text_id);
}
