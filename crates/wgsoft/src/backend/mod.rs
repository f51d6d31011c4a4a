//! The compute-device seam.
//!
//! A [`Backend`] consumes the packed interchange buffers of
//! [`crate::state::BakeBuffers`] and executes physics steps over them. Two
//! implementations exist: [`gpu::GpuBackend`] dispatches the WGSL kernels,
//! and [`cpu::CpuBackend`] executes the same kernel semantics on the host,
//! which property tests and GPU-less hosts rely on. Both read the identical
//! byte images, which keeps the structured-buffer portability contract
//! honest.

use nalgebra::Point3;

use crate::collider::GpuCollider;
use crate::params::{DragParams, GpuAnchor, MouseParams, ResetParams, SimParams, MAX_ANCHORS};
use crate::render::RenderBuffers;
use crate::state::BakeBuffers;

pub mod cpu;
pub mod gpu;

/// Everything a backend needs to run one physics step.
pub struct StepContext<'a> {
    /// Solver uniform for this step.
    pub params: SimParams,
    /// Substeps to run.
    pub num_substeps: u32,
    /// Lowered collider records.
    pub colliders: &'a [GpuCollider],
    /// Auxiliary collider samples (height fields).
    pub collider_aux: &'a [f32],
    /// Whether the collider records changed since the previous step.
    pub colliders_dirty: bool,
    /// Anchor uniform array; entries beyond `params.num_anchors` are unused.
    pub anchors: [GpuAnchor; MAX_ANCHORS],
    /// Drag uniform.
    pub drag: DragParams,
    /// Mouse-impulse uniform.
    pub mouse: MouseParams,
}

/// A compute device able to run the solver.
pub trait Backend {
    /// Uploads the baked buffers and prepares the kernels.
    fn bake(&mut self, bake: &BakeBuffers) -> anyhow::Result<()>;

    /// Runs one full physics step (all substeps, grid rebuild, broadphase,
    /// rotation update, interaction passes).
    fn step(&mut self, ctx: &StepContext<'_>);

    /// Runs the reset kernels over one instance's ranges.
    fn reset_instance(&mut self, params: &ResetParams);

    /// Overwrites the `size` flag of an instance row (used by despawn).
    fn write_instance_size(&mut self, object_id: u32, size: f32);

    /// Reads every vertex position back to the host.
    fn read_positions(&mut self, out: &mut Vec<Point3<f32>>);

    /// Device buffers for a renderer, when the backend has any.
    fn render_buffers(&self) -> Option<RenderBuffers<'_>>;
}
