use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::component::Component;
use crate::fiber_error::RenderError;

/// Scalar attribute/state value. Numbers are stored as f64 across the
/// board, the same coercion the host side applies.
#[derive(Clone, Debug, PartialEq)]
pub enum PropValue {
    Str(String),
    Num(f64),
    Bool(bool),
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Str(value.to_string())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Str(value)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Num(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        PropValue::Num(value as f64)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

impl PropValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            PropValue::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            PropValue::Str(s) => !s.is_empty(),
            PropValue::Num(n) => *n != 0.0,
            PropValue::Bool(b) => *b,
        }
    }
}

/// Ordered string-keyed map used for both element attributes and
/// component-local state.
pub type AttrMap = IndexMap<String, PropValue>;

/// Component-local state is shaped exactly like an attribute map; update
/// records merge into it key by key.
pub type StateMap = AttrMap;

struct PropsData {
    attrs: AttrMap,
    children: Children,
}

/// Immutable prop set. Cloning is an `Rc` bump; pointer identity is what
/// the bailout path compares, structural equality is what host diffing
/// compares.
#[derive(Clone)]
pub struct Props(Rc<PropsData>);

impl Props {
    pub fn empty() -> Props {
        Props(Rc::new(PropsData {
            attrs: AttrMap::new(),
            children: Children::None,
        }))
    }

    pub fn new(attrs: AttrMap, children: Children) -> Props {
        Props(Rc::new(PropsData { attrs, children }))
    }

    pub fn with_attrs<'a, I>(attrs: I) -> Props
    where
        I: IntoIterator<Item = (&'a str, PropValue)>,
    {
        Props::new(
            attrs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            Children::None,
        )
    }

    pub fn with_children(children: Children) -> Props {
        Props::new(AttrMap::new(), children)
    }

    pub fn attrs(&self) -> &AttrMap {
        &self.0.attrs
    }

    pub fn children(&self) -> &Children {
        &self.0.children
    }

    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.0.attrs.get(name)
    }

    /// The reserved `hidden` attribute marks an offscreen subtree that
    /// only reconciles at Offscreen priority.
    pub fn is_hidden(&self) -> bool {
        self.get("hidden").map(PropValue::is_truthy).unwrap_or(false)
    }

    /// Referential identity, the cheap comparison the bailout path uses.
    pub fn same(a: &Props, b: &Props) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }
}

impl PartialEq for Props {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
            || (self.0.attrs == other.0.attrs && self.0.children == other.0.children)
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Props")
            .field("attrs", &self.0.attrs)
            .finish_non_exhaustive()
    }
}

/// Slot written by commit with the host instance backing an element.
/// Attach happens in the lifecycle pass, detach on unmount.
#[derive(Clone)]
pub struct RefHandle(Rc<RefCell<Option<Rc<dyn Any>>>>);

impl RefHandle {
    pub fn new() -> RefHandle {
        RefHandle(Rc::new(RefCell::new(None)))
    }

    pub fn current(&self) -> Option<Rc<dyn Any>> {
        self.0.borrow().clone()
    }

    pub(crate) fn set(&self, instance: Option<Rc<dyn Any>>) {
        *self.0.borrow_mut() = instance;
    }

    pub fn same(a: &RefHandle, b: &RefHandle) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }
}

impl Default for RefHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RefHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RefHandle({})", if self.current().is_some() { "set" } else { "empty" })
    }
}

pub type RenderFn = dyn Fn(&Props) -> Result<Children, RenderError>;

/// Coroutine continuation: receives the coroutine props and the values
/// collected from the yield placeholders in its child list.
pub type CoroutineHandler = dyn Fn(&Props, &[PropValue]) -> Result<Children, RenderError>;

#[derive(Clone)]
pub enum ElementKind {
    /// Host platform node, addressed by tag.
    Host(String),
    Function(Rc<RenderFn>),
    Class(Rc<dyn Component>),
    Fragment,
    /// Renders its children into a different host container.
    Portal(Rc<dyn Any>),
    Coroutine(Rc<CoroutineHandler>),
    Yield(PropValue),
}

impl ElementKind {
    /// Type equality for reconciliation: host tags compare by name,
    /// behavior-carrying kinds by identity of the behavior object.
    pub fn same_type(a: &ElementKind, b: &ElementKind) -> bool {
        match (a, b) {
            (ElementKind::Host(x), ElementKind::Host(y)) => x == y,
            (ElementKind::Function(x), ElementKind::Function(y)) => Rc::ptr_eq(x, y),
            (ElementKind::Class(x), ElementKind::Class(y)) => Rc::ptr_eq(x, y),
            (ElementKind::Fragment, ElementKind::Fragment) => true,
            (ElementKind::Portal(x), ElementKind::Portal(y)) => Rc::ptr_eq(x, y),
            (ElementKind::Coroutine(x), ElementKind::Coroutine(y)) => Rc::ptr_eq(x, y),
            (ElementKind::Yield(_), ElementKind::Yield(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Host(tag) => write!(f, "Host({tag})"),
            ElementKind::Function(_) => write!(f, "Function"),
            ElementKind::Class(_) => write!(f, "Class"),
            ElementKind::Fragment => write!(f, "Fragment"),
            ElementKind::Portal(_) => write!(f, "Portal"),
            ElementKind::Coroutine(_) => write!(f, "Coroutine"),
            ElementKind::Yield(v) => write!(f, "Yield({v:?})"),
        }
    }
}

/// One node of the declarative description handed to the reconciler.
#[derive(Clone, Debug)]
pub struct Element {
    pub kind: ElementKind,
    pub key: Option<String>,
    pub props: Props,
    pub ref_handle: Option<RefHandle>,
}

impl Element {
    fn of(kind: ElementKind, props: Props) -> Element {
        Element {
            kind,
            key: None,
            props,
            ref_handle: None,
        }
    }

    pub fn host(tag: &str, props: Props) -> Element {
        Element::of(ElementKind::Host(tag.to_string()), props)
    }

    pub fn function<F>(render: F, props: Props) -> Element
    where
        F: Fn(&Props) -> Result<Children, RenderError> + 'static,
    {
        Element::of(ElementKind::Function(Rc::new(render)), props)
    }

    /// Builds an element around an already-shared render fn, so repeated
    /// descriptions of the same component compare equal by type.
    pub fn function_of(render: Rc<RenderFn>, props: Props) -> Element {
        Element::of(ElementKind::Function(render), props)
    }

    pub fn class(component: Rc<dyn Component>, props: Props) -> Element {
        Element::of(ElementKind::Class(component), props)
    }

    pub fn fragment(children: Children) -> Element {
        Element::of(ElementKind::Fragment, Props::with_children(children))
    }

    pub fn portal(container: Rc<dyn Any>, children: Children) -> Element {
        Element::of(ElementKind::Portal(container), Props::with_children(children))
    }

    pub fn coroutine<F>(handler: F, props: Props) -> Element
    where
        F: Fn(&Props, &[PropValue]) -> Result<Children, RenderError> + 'static,
    {
        Element::of(ElementKind::Coroutine(Rc::new(handler)), props)
    }

    /// Builds a coroutine element around an already-shared handler, so
    /// repeated descriptions compare equal by type.
    pub fn coroutine_of(handler: Rc<CoroutineHandler>, props: Props) -> Element {
        Element::of(ElementKind::Coroutine(handler), props)
    }

    pub fn yielded(value: impl Into<PropValue>) -> Element {
        Element::of(ElementKind::Yield(value.into()), Props::empty())
    }

    pub fn with_key(mut self, key: &str) -> Element {
        self.key = Some(key.to_string());
        self
    }

    pub fn with_ref(mut self, handle: RefHandle) -> Element {
        self.ref_handle = Some(handle);
        self
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        ElementKind::same_type(&self.kind, &other.kind)
            && self.key == other.key
            && self.props == other.props
    }
}

/// Child description for one tree position: nothing, text, a single
/// element, or an ordered list of further descriptions.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Children {
    #[default]
    None,
    Text(String),
    Element(Element),
    List(Vec<Children>),
}

impl Children {
    pub fn list(items: impl IntoIterator<Item = Children>) -> Children {
        Children::List(items.into_iter().collect())
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Children::None)
    }
}

impl From<Element> for Children {
    fn from(element: Element) -> Self {
        Children::Element(element)
    }
}

impl From<&str> for Children {
    fn from(text: &str) -> Self {
        Children::Text(text.to_string())
    }
}

impl From<String> for Children {
    fn from(text: String) -> Self {
        Children::Text(text)
    }
}

impl From<f64> for Children {
    fn from(value: f64) -> Self {
        Children::Text(value.to_string())
    }
}

impl From<i64> for Children {
    fn from(value: i64) -> Self {
        Children::Text(value.to_string())
    }
}

// Booleans are not renderable content; they reconcile to nothing.
impl From<bool> for Children {
    fn from(_: bool) -> Self {
        Children::None
    }
}

impl<T: Into<Children>> From<Option<T>> for Children {
    fn from(value: Option<T>) -> Self {
        match value {
            None => Children::None,
            Some(v) => v.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn props_identity_vs_value_equality() {
        let a = Props::with_attrs([("id", PropValue::from("x"))]);
        let b = a.clone();
        let c = Props::with_attrs([("id", PropValue::from("x"))]);
        assert!(Props::same(&a, &b));
        assert!(!Props::same(&a, &c));
        assert_eq!(a, c);
    }

    #[test]
    fn host_types_compare_by_tag() {
        let div = Element::host("div", Props::empty());
        let other_div = Element::host("div", Props::empty());
        let span = Element::host("span", Props::empty());
        assert!(ElementKind::same_type(&div.kind, &other_div.kind));
        assert!(!ElementKind::same_type(&div.kind, &span.kind));
    }

    #[test]
    fn function_types_compare_by_identity() {
        let render: Rc<RenderFn> = Rc::new(|_| Ok(Children::None));
        let a = Element::function_of(render.clone(), Props::empty());
        let b = Element::function_of(render, Props::empty());
        let c = Element::function(|_| Ok(Children::None), Props::empty());
        assert!(ElementKind::same_type(&a.kind, &b.kind));
        assert!(!ElementKind::same_type(&a.kind, &c.kind));
    }

    #[test]
    fn booleans_and_options_reconcile_to_nothing() {
        assert!(Children::from(true).is_none());
        assert!(Children::from(Option::<Element>::None).is_none());
    }

    #[test]
    fn hidden_attribute_is_recognized() {
        let hidden = Props::with_attrs([("hidden", PropValue::from(true))]);
        assert!(hidden.is_hidden());
        assert!(!Props::empty().is_hidden());
    }
}
