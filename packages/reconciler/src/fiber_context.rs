use crate::element::StateMap;

/// Ambient context stack for class components that expose a child
/// context. Providers push a merged map on begin and pop on complete, so
/// nested providers shadow by depth with no global registry.
///
/// The stack only lives for one render pass; starting a pass from the
/// root resets it.
pub struct ContextStack {
    // (merged map visible below this provider, context changed here or above)
    stack: Vec<(StateMap, bool)>,
    base: StateMap,
}

impl ContextStack {
    pub fn new() -> ContextStack {
        ContextStack {
            stack: vec![],
            base: StateMap::new(),
        }
    }

    pub fn reset(&mut self, base: StateMap) {
        self.stack.clear();
        self.base = base;
    }

    /// The context visible to the component currently beginning work.
    pub fn current(&self) -> &StateMap {
        match self.stack.last() {
            Some((map, _)) => map,
            None => &self.base,
        }
    }

    /// True when some provider above the current position pushed a value
    /// different from its previous committed one. Gates the bailout path.
    pub fn has_changed(&self) -> bool {
        self.stack.last().map(|(_, changed)| *changed).unwrap_or(false)
    }

    /// Pushes a provider's contribution merged over the current map.
    /// `changed` is whether the contribution differs from the one this
    /// provider made in the committed tree.
    pub fn push_provider(&mut self, contribution: &StateMap, changed: bool) {
        let mut merged = self.current().clone();
        for (key, value) in contribution {
            merged.insert(key.clone(), value.clone());
        }
        let changed = changed || self.has_changed();
        self.stack.push((merged, changed));
    }

    pub fn pop_provider(&mut self) {
        if self.stack.pop().is_none() {
            panic!("unbalanced context stack pop");
        }
    }
}

impl Default for ContextStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::PropValue;

    fn map(pairs: &[(&str, &str)]) -> StateMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), PropValue::from(*v)))
            .collect()
    }

    #[test]
    fn nested_providers_shadow_and_unwind() {
        let mut stack = ContextStack::new();
        stack.reset(map(&[("theme", "light")]));

        stack.push_provider(&map(&[("theme", "dark")]), true);
        stack.push_provider(&map(&[("lang", "en")]), false);

        assert_eq!(
            stack.current().get("theme"),
            Some(&PropValue::from("dark"))
        );
        assert_eq!(stack.current().get("lang"), Some(&PropValue::from("en")));
        // The change below the outer provider is still visible here.
        assert!(stack.has_changed());

        stack.pop_provider();
        stack.pop_provider();
        assert_eq!(
            stack.current().get("theme"),
            Some(&PropValue::from("light"))
        );
        assert!(!stack.has_changed());
    }

    #[test]
    #[should_panic(expected = "unbalanced context stack pop")]
    fn unbalanced_pop_is_fatal() {
        ContextStack::new().pop_provider();
    }
}
