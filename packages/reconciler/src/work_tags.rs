/// Discriminant for what a fiber represents in the tree. Begin/complete
/// dispatch on this; the numbering mirrors the renderer family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkTag {
    /// A function element that has not rendered yet; resolved to
    /// `FunctionComponent` by its first begin.
    IndeterminateComponent = 0,
    FunctionComponent = 1,
    ClassComponent = 2,
    HostRoot = 3,
    HostPortal = 4,
    HostComponent = 5,
    HostText = 6,
    CoroutineComponent = 7,
    /// Second phase of a coroutine: the handler has been invoked and its
    /// continuation children are being processed.
    CoroutineHandlerPhase = 8,
    YieldComponent = 9,
    Fragment = 10,
}
