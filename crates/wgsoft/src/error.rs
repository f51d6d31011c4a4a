//! Library error type.

use thiserror::Error;

/// Lifecycle and parameter errors surfaced to the caller. Numerical
/// degeneracies never reach this type; they are absorbed by the kernels.
#[derive(Debug, Error)]
pub enum SoftbodyError {
    /// The compute backend failed to allocate its buffers or compile its
    /// kernels; the simulation stays unbaked.
    #[error("backend initialisation failed: {0}")]
    Backend(anyhow::Error),
    /// Geometry, instances, colliders and pins are frozen once baked.
    #[error("the simulation is already baked")]
    AlreadyBaked,
    /// The operation needs `bake` to have run.
    #[error("the simulation has not been baked")]
    NotBaked,
    /// A handle referenced an unknown registration.
    #[error("unknown handle {0}")]
    UnknownHandle(usize),
    /// A reset was issued for an instance id beyond the registered range.
    #[error("instance {0} is out of range")]
    ResetOutOfRange(usize),
    /// The anchor limit was reached; existing anchors are preserved.
    #[error("cannot register more than {0} anchors")]
    AnchorOverflow(usize),
    /// A dynamic collider update changed the shape kind or sample count.
    #[error("collider updates must keep the shape kind and sample count")]
    ColliderShapeMismatch,
}
