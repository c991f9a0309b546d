//! Bits shared by every crate in the workspace: the `log!` macro the
//! engine traces through, and the dev-mode switch.

pub use tracing;

/// Engine-internal trace logging. Goes through `tracing` so embedders can
/// install whatever subscriber they like; without one it costs nothing.
#[macro_export]
macro_rules! log {
    ( $( $t:tt )* ) => {
        $crate::tracing::debug!( $( $t )* );
    }
}

/// Extra consistency checks and chatty logging are only worth paying for
/// in debug builds.
pub fn is_dev() -> bool {
    cfg!(debug_assertions)
}
