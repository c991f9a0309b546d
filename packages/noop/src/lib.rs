//! In-memory host renderer for exercising the reconciler without a real
//! platform: instances are plain records, containers hold child arrays,
//! every host operation is logged, and the cooperative yield points are
//! pumped manually by the caller.

pub mod host_config;
pub mod renderer;

pub use host_config::{
    container_snapshot, instance_snapshot, HostOp, NoopContainer, NoopHost, NoopInstance,
};
pub use renderer::{NoopRenderer, UnitBudget, UnlimitedBudget};
