//! Real-time XPBD softbody simulation on the GPU.
//!
//! Tetrahedral models (typically produced by the `tetmesh` crate) are baked
//! into flat structured buffers and advanced by a fixed-step solver made of
//! data-parallel kernels: Verlet predict with signed-distance colliders,
//! Jacobi-relaxed XPBD edge and volume constraints, shape-matching rotation
//! extraction, and a spatial-grid tet–tet broadphase. The kernels run on
//! wgpu ([`backend::gpu::GpuBackend`]) or, with identical semantics, on
//! host threads ([`backend::cpu::CpuBackend`]).

pub mod backend;
pub mod collider;
pub mod error;
pub mod gpu;
pub mod grid;
pub mod kernel;
pub mod layout;
pub mod params;
pub mod render;
pub mod shader;
pub mod sim;
pub mod state;
pub mod tensor;

pub use collider::{Collider, ColliderDesc, GpuCollider};
pub use error::SoftbodyError;
pub use gpu::GpuInstance;
pub use grid::GridMode;
pub use params::{AnchorDef, SoftbodyConfig};
pub use sim::{
    AnchorHandle, ColliderHandle, GeometryHandle, InstanceHandle, PickedVertex,
    SoftbodySimulation,
};
