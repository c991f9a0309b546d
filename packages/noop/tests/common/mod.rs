#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use weft_reconciler::{
    CapturedError, Children, Component, Element, PropValue, Props, RenderError, StateMap,
    UpdateAction,
};

pub type Log = Rc<RefCell<Vec<String>>>;

pub fn new_log() -> Log {
    Rc::new(RefCell::new(vec![]))
}

pub fn log_of(log: &Log) -> Vec<String> {
    log.borrow().clone()
}

pub fn attrs(pairs: &[(&str, PropValue)]) -> Props {
    Props::with_attrs(pairs.iter().map(|(k, v)| (*k, v.clone())))
}

pub fn host(tag: &str, children: impl Into<Children>) -> Element {
    Element::host(tag, Props::with_children(children.into()))
}

pub fn host_keyed(tag: &str, key: &str) -> Element {
    Element::host(tag, Props::empty()).with_key(key)
}

/// Host element whose content is plain text set through the host's
/// text-content fast path.
pub fn labeled(tag: &str, text: &str) -> Element {
    Element::host(tag, attrs(&[("text", PropValue::from(text))]))
}

/// Configurable class component used across the suite. Renders its
/// props children, or a fallback string once its state carries the
/// `failed` marker an error boundary sets.
pub struct TestClass {
    pub name: String,
    pub log: Log,
    pub boundary: bool,
    pub fail_render: bool,
    /// Fail only the recovery render, after this boundary captured an
    /// error, so escalation paths can be exercised.
    pub fail_fallback: bool,
    pub fail_did_mount: bool,
    pub fail_unmount: bool,
}

impl TestClass {
    pub fn new(name: &str, log: &Log) -> Rc<TestClass> {
        Rc::new(TestClass {
            name: name.to_string(),
            log: log.clone(),
            boundary: false,
            fail_render: false,
            fail_fallback: false,
            fail_did_mount: false,
            fail_unmount: false,
        })
    }

    pub fn boundary(name: &str, log: &Log) -> Rc<TestClass> {
        Rc::new(TestClass {
            boundary: true,
            ..Self::unwrapped(name, log)
        })
    }

    pub fn failing_render(name: &str, log: &Log) -> Rc<TestClass> {
        Rc::new(TestClass {
            fail_render: true,
            ..Self::unwrapped(name, log)
        })
    }

    pub fn failing_did_mount(name: &str, log: &Log) -> Rc<TestClass> {
        Rc::new(TestClass {
            fail_did_mount: true,
            ..Self::unwrapped(name, log)
        })
    }

    pub fn failing_unmount(name: &str, log: &Log) -> Rc<TestClass> {
        Rc::new(TestClass {
            fail_unmount: true,
            ..Self::unwrapped(name, log)
        })
    }

    fn unwrapped(name: &str, log: &Log) -> TestClass {
        TestClass {
            name: name.to_string(),
            log: log.clone(),
            boundary: false,
            fail_render: false,
            fail_fallback: false,
            fail_did_mount: false,
            fail_unmount: false,
        }
    }

    pub fn element(self: &Rc<Self>, children: impl Into<Children>) -> Element {
        Element::class(self.clone(), Props::with_children(children.into()))
    }
}

impl Component for TestClass {
    fn render(
        &self,
        props: &Props,
        state: &StateMap,
        _context: &StateMap,
    ) -> Result<Children, RenderError> {
        self.log.borrow_mut().push(format!("render {}", self.name));
        let failed = state
            .get("failed")
            .map(PropValue::is_truthy)
            .unwrap_or(false);
        if failed {
            if self.fail_fallback {
                return Err(RenderError::msg(format!(
                    "{} failed its recovery render",
                    self.name
                )));
            }
            return Ok(Children::Text(format!("fallback-{}", self.name)));
        }
        if self.fail_render {
            return Err(RenderError::msg(format!("{} refuses to render", self.name)));
        }
        Ok(props.children().clone())
    }

    fn capture_error(&self, _error: &CapturedError) -> Option<UpdateAction> {
        if !self.boundary {
            return None;
        }
        self.log.borrow_mut().push(format!("capture {}", self.name));
        Some(UpdateAction::Partial(
            [("failed".to_string(), PropValue::Bool(true))]
                .into_iter()
                .collect(),
        ))
    }

    fn did_mount(&self, _props: &Props, _state: &StateMap) -> Result<(), RenderError> {
        self.log.borrow_mut().push(format!("mount {}", self.name));
        if self.fail_did_mount {
            return Err(RenderError::msg(format!("{} failed in did_mount", self.name)));
        }
        Ok(())
    }

    fn did_update(
        &self,
        _old_props: &Props,
        _new_props: &Props,
        _state: &StateMap,
    ) -> Result<(), RenderError> {
        self.log.borrow_mut().push(format!("update {}", self.name));
        Ok(())
    }

    fn will_unmount(&self, _props: &Props, _state: &StateMap) -> Result<(), RenderError> {
        self.log.borrow_mut().push(format!("unmount {}", self.name));
        if self.fail_unmount {
            return Err(RenderError::msg(format!("{} failed in will_unmount", self.name)));
        }
        Ok(())
    }
}
