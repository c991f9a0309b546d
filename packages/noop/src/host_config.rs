use std::cell::{Cell, RefCell};
use std::rc::Rc;

use weft_reconciler::host_config::{
    AnimationCallback, DeferredCallback, HostConfig, HostContext, HostInstance,
};
use weft_reconciler::{Props, PropValue, RenderError};

/// In-memory stand-in for a platform node.
pub struct NoopInstance {
    pub id: u32,
    /// Host tag; empty string for text instances.
    pub tag: String,
    pub text: RefCell<String>,
    pub props: RefCell<Props>,
    pub children: RefCell<Vec<Rc<NoopInstance>>>,
    /// Owning container or instance id; -1 while detached.
    pub parent: Cell<i64>,
}

/// In-memory mount point.
pub struct NoopContainer {
    pub id: u32,
    pub children: RefCell<Vec<Rc<NoopInstance>>>,
}

/// Everything the host was asked to do, in order. The integration suite
/// asserts against this log to count placements, updates and removals.
#[derive(Debug, Clone, PartialEq)]
pub enum HostOp {
    CreateInstance { id: u32, tag: String },
    CreateText { id: u32, text: String },
    AppendInitial { parent: u32, child: u32 },
    Append { parent: i64, child: u32 },
    InsertBefore { parent: i64, child: u32, before: u32 },
    Remove { parent: i64, child: u32 },
    CommitUpdate { id: u32 },
    CommitTextUpdate { id: u32, old: String, new: String },
    ResetText { id: u32 },
    PrepareForCommit,
    ResetAfterCommit,
}

/// Test host renderer: instances are plain records with ids, containers
/// hold child arrays, and the cooperative yield points queue callbacks
/// for the test to pump manually.
pub struct NoopHost {
    counter: Cell<u32>,
    pub ops: RefCell<Vec<HostOp>>,
    pub deferred: RefCell<Vec<DeferredCallback>>,
    pub animation: RefCell<Vec<AnimationCallback>>,
}

impl NoopHost {
    pub fn new() -> Rc<NoopHost> {
        Rc::new(NoopHost {
            counter: Cell::new(0),
            ops: RefCell::new(vec![]),
            deferred: RefCell::new(vec![]),
            animation: RefCell::new(vec![]),
        })
    }

    fn next_id(&self) -> u32 {
        let id = self.counter.get();
        self.counter.set(id + 1);
        id
    }

    pub fn create_container(&self) -> Rc<NoopContainer> {
        Rc::new(NoopContainer {
            id: self.next_id(),
            children: RefCell::new(vec![]),
        })
    }

    pub fn record(&self, op: HostOp) {
        self.ops.borrow_mut().push(op);
    }

    pub fn take_ops(&self) -> Vec<HostOp> {
        self.ops.borrow_mut().drain(..).collect()
    }
}

fn as_instance(any: &HostInstance) -> Rc<NoopInstance> {
    any.clone()
        .downcast::<NoopInstance>()
        .expect("host handle is not a noop instance")
}

/// Containers and instances can both be the parent of a mutation.
enum NoopParent {
    Container(Rc<NoopContainer>),
    Instance(Rc<NoopInstance>),
}

impl NoopParent {
    fn of(any: &HostInstance) -> NoopParent {
        match any.clone().downcast::<NoopContainer>() {
            Ok(container) => NoopParent::Container(container),
            Err(_) => NoopParent::Instance(as_instance(any)),
        }
    }

    fn id(&self) -> i64 {
        match self {
            NoopParent::Container(container) => container.id as i64,
            NoopParent::Instance(instance) => instance.id as i64,
        }
    }

    fn with_children<R>(&self, f: impl FnOnce(&mut Vec<Rc<NoopInstance>>) -> R) -> R {
        match self {
            NoopParent::Container(container) => f(&mut container.children.borrow_mut()),
            NoopParent::Instance(instance) => f(&mut instance.children.borrow_mut()),
        }
    }
}

impl HostConfig for NoopHost {
    fn create_instance(
        &self,
        tag: &str,
        props: &Props,
        _root_container: &HostInstance,
        _host_context: &HostContext,
    ) -> HostInstance {
        let id = self.next_id();
        self.record(HostOp::CreateInstance {
            id,
            tag: tag.to_string(),
        });
        let text = props
            .get("text")
            .and_then(PropValue::as_str)
            .unwrap_or_default()
            .to_string();
        Rc::new(NoopInstance {
            id,
            tag: tag.to_string(),
            text: RefCell::new(text),
            props: RefCell::new(props.clone()),
            children: RefCell::new(vec![]),
            parent: Cell::new(-1),
        })
    }

    fn create_text_instance(&self, text: &str) -> HostInstance {
        let id = self.next_id();
        self.record(HostOp::CreateText {
            id,
            text: text.to_string(),
        });
        Rc::new(NoopInstance {
            id,
            tag: String::new(),
            text: RefCell::new(text.to_string()),
            props: RefCell::new(Props::empty()),
            children: RefCell::new(vec![]),
            parent: Cell::new(-1),
        })
    }

    fn append_initial_child(&self, parent: &HostInstance, child: &HostInstance) {
        let parent = as_instance(parent);
        let child = as_instance(child);
        self.record(HostOp::AppendInitial {
            parent: parent.id,
            child: child.id,
        });
        child.parent.set(parent.id as i64);
        parent.children.borrow_mut().push(child);
    }

    fn append_child(
        &self,
        parent: &HostInstance,
        child: &HostInstance,
    ) -> Result<(), RenderError> {
        let parent = NoopParent::of(parent);
        let child = as_instance(child);
        self.record(HostOp::Append {
            parent: parent.id(),
            child: child.id,
        });
        child.parent.set(parent.id());
        parent.with_children(|children| {
            children.retain(|existing| existing.id != child.id);
            children.push(child.clone());
        });
        Ok(())
    }

    fn insert_before(
        &self,
        parent: &HostInstance,
        child: &HostInstance,
        before: &HostInstance,
    ) -> Result<(), RenderError> {
        let parent = NoopParent::of(parent);
        let child = as_instance(child);
        let before = as_instance(before);
        self.record(HostOp::InsertBefore {
            parent: parent.id(),
            child: child.id,
            before: before.id,
        });
        child.parent.set(parent.id());
        parent.with_children(|children| {
            children.retain(|existing| existing.id != child.id);
            match children
                .iter()
                .position(|existing| existing.id == before.id)
            {
                Some(index) => {
                    children.insert(index, child.clone());
                    Ok(())
                }
                None => Err(RenderError::Host("insert anchor is not a child".into())),
            }
        })
    }

    fn remove_child(
        &self,
        parent: &HostInstance,
        child: &HostInstance,
    ) -> Result<(), RenderError> {
        let parent = NoopParent::of(parent);
        let child = as_instance(child);
        self.record(HostOp::Remove {
            parent: parent.id(),
            child: child.id,
        });
        parent.with_children(|children| {
            match children
                .iter()
                .position(|existing| existing.id == child.id)
            {
                Some(index) => {
                    children.remove(index);
                    child.parent.set(-1);
                    Ok(())
                }
                None => Err(RenderError::Host("removed node is not a child".into())),
            }
        })
    }

    fn finalize_initial_children(
        &self,
        _instance: &HostInstance,
        props: &Props,
        _root_container: &HostInstance,
    ) -> bool {
        props
            .get("needs_commit_update")
            .map(PropValue::is_truthy)
            .unwrap_or(false)
    }

    fn prepare_update(
        &self,
        _instance: &HostInstance,
        old_props: &Props,
        new_props: &Props,
    ) -> bool {
        old_props.attrs() != new_props.attrs()
    }

    fn commit_update(
        &self,
        instance: &HostInstance,
        _old_props: &Props,
        new_props: &Props,
        _root_container: &HostInstance,
    ) -> Result<(), RenderError> {
        let instance = as_instance(instance);
        if new_props
            .get("fail_commit")
            .map(PropValue::is_truthy)
            .unwrap_or(false)
        {
            return Err(RenderError::Host("commit_update exploded".into()));
        }
        self.record(HostOp::CommitUpdate { id: instance.id });
        if let Some(text) = new_props.get("text").and_then(PropValue::as_str) {
            *instance.text.borrow_mut() = text.to_string();
        }
        *instance.props.borrow_mut() = new_props.clone();
        Ok(())
    }

    fn commit_text_update(
        &self,
        text_instance: &HostInstance,
        old_text: &str,
        new_text: &str,
    ) -> Result<(), RenderError> {
        let instance = as_instance(text_instance);
        self.record(HostOp::CommitTextUpdate {
            id: instance.id,
            old: old_text.to_string(),
            new: new_text.to_string(),
        });
        *instance.text.borrow_mut() = new_text.to_string();
        Ok(())
    }

    fn reset_text_content(&self, instance: &HostInstance) -> Result<(), RenderError> {
        let instance = as_instance(instance);
        self.record(HostOp::ResetText { id: instance.id });
        instance.text.borrow_mut().clear();
        Ok(())
    }

    fn get_child_host_context(&self, _parent: &HostContext, tag: &str) -> HostContext {
        Rc::new(tag.to_string())
    }

    fn should_set_text_content(&self, _tag: &str, props: &Props) -> bool {
        props.get("text").is_some()
    }

    fn schedule_deferred_callback(&self, callback: DeferredCallback) {
        self.deferred.borrow_mut().push(callback);
    }

    fn schedule_animation_callback(&self, callback: AnimationCallback) {
        self.animation.borrow_mut().push(callback);
    }

    fn prepare_for_commit(&self) {
        self.record(HostOp::PrepareForCommit);
    }

    fn reset_after_commit(&self) {
        self.record(HostOp::ResetAfterCommit);
    }
}

/// Printable snapshot of a container's committed children, e.g.
/// `["div#2[hi]", "\"plain text\""]`.
pub fn container_snapshot(container: &NoopContainer) -> Vec<String> {
    container
        .children
        .borrow()
        .iter()
        .map(|child| instance_snapshot(child))
        .collect()
}

pub fn instance_snapshot(instance: &NoopInstance) -> String {
    if instance.tag.is_empty() {
        return format!("{:?}", instance.text.borrow());
    }
    let children: Vec<String> = instance
        .children
        .borrow()
        .iter()
        .map(|child| instance_snapshot(child))
        .collect();
    let text = instance.text.borrow();
    if children.is_empty() && text.is_empty() {
        format!("{}#{}", instance.tag, instance.id)
    } else if children.is_empty() {
        format!("{}#{}[{}]", instance.tag, instance.id, text)
    } else {
        format!("{}#{}({})", instance.tag, instance.id, children.join(", "))
    }
}
