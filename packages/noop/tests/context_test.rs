mod common;

use std::cell::RefCell;
use std::rc::Rc;

use weft_noop::NoopRenderer;
use weft_reconciler::{
    Children, Component, Element, Props, PropValue, RenderError, StateMap,
};

/// Exposes a child context derived from its `value` prop, so the same
/// behavior object can provide different values across renders.
struct ThemeProvider;

impl Component for ThemeProvider {
    fn render(
        &self,
        props: &Props,
        _state: &StateMap,
        _context: &StateMap,
    ) -> Result<Children, RenderError> {
        Ok(props.children().clone())
    }

    fn child_context(&self, props: &Props, _state: &StateMap) -> Option<StateMap> {
        let value = props.get("value")?.clone();
        Some([("theme".to_string(), value)].into_iter().collect())
    }
}

/// Renders whatever `theme` it sees in the ambient context.
struct ThemeConsumer {
    renders: Rc<RefCell<u32>>,
}

impl Component for ThemeConsumer {
    fn render(
        &self,
        _props: &Props,
        _state: &StateMap,
        context: &StateMap,
    ) -> Result<Children, RenderError> {
        *self.renders.borrow_mut() += 1;
        let theme = context
            .get("theme")
            .and_then(PropValue::as_str)
            .unwrap_or("unset")
            .to_string();
        Ok(Children::Text(theme))
    }
}

fn provider(component: &Rc<ThemeProvider>, value: &str, children: Children) -> Element {
    Element::class(
        component.clone(),
        Props::new(
            [("value".to_string(), PropValue::from(value))]
                .into_iter()
                .collect(),
            children,
        ),
    )
}

#[test]
fn providers_reach_descendants_and_shadow_by_depth() {
    let renderer = NoopRenderer::new();
    let theme_provider = Rc::new(ThemeProvider);
    let renders = Rc::new(RefCell::new(0));
    let outer_consumer = Rc::new(ThemeConsumer {
        renders: renders.clone(),
    });
    let inner_consumer = Rc::new(ThemeConsumer {
        renders: renders.clone(),
    });

    renderer
        .render(provider(
            &theme_provider,
            "dark",
            Children::list([
                Element::class(outer_consumer, Props::empty()).into(),
                provider(
                    &theme_provider,
                    "light",
                    Element::class(inner_consumer, Props::empty()).into(),
                )
                .into(),
            ]),
        ))
        .unwrap();

    // Outer consumer sees the outer theme; the nested provider shadows
    // it for the inner one.
    assert_eq!(
        renderer.snapshot(),
        vec!["\"dark\"".to_string(), "\"light\"".to_string()]
    );
}

#[test]
fn context_change_defeats_the_referential_bailout() {
    let renderer = NoopRenderer::new();
    let theme_provider = Rc::new(ThemeProvider);
    let renders = Rc::new(RefCell::new(0));
    let consumer = Rc::new(ThemeConsumer {
        renders: renders.clone(),
    });
    // The exact same consumer element value both times: props identity
    // alone would bail it out.
    let consumer_element = Element::class(consumer, Props::empty());

    renderer
        .render(provider(
            &theme_provider,
            "dark",
            consumer_element.clone().into(),
        ))
        .unwrap();
    assert_eq!(*renders.borrow(), 1);
    assert_eq!(renderer.snapshot(), vec!["\"dark\"".to_string()]);

    renderer
        .render(provider(&theme_provider, "light", consumer_element.into()))
        .unwrap();
    // The provider's contribution changed, so the consumer re-rendered
    // despite identical props.
    assert_eq!(*renders.borrow(), 2);
    assert_eq!(renderer.snapshot(), vec!["\"light\"".to_string()]);
}

#[test]
fn root_parent_context_seeds_the_stack() {
    let renderer = NoopRenderer::new();
    let renders = Rc::new(RefCell::new(0));
    let consumer = Rc::new(ThemeConsumer { renders });

    renderer
        .render_with(
            Element::class(consumer, Props::empty()),
            Some(
                [("theme".to_string(), PropValue::from("ambient"))]
                    .into_iter()
                    .collect(),
            ),
            None,
        )
        .unwrap();
    assert_eq!(renderer.snapshot(), vec!["\"ambient\"".to_string()]);
}
