//! Simulation configuration and the Pod uniforms mirrored by the kernels.

use nalgebra::Vector3;

use crate::grid::GridMode;

/// Maximum number of anchors held in the device-side uniform array.
pub const MAX_ANCHORS: usize = 32;

/// Instance `size` values below this are treated as inactive; every kernel
/// early-exits on them.
pub const SIZE_EPS: f32 = 1.0e-4;

/// Host-side configuration of a softbody simulation.
#[derive(Copy, Clone, Debug)]
pub struct SoftbodyConfig {
    /// Fixed physics ticks per second.
    pub steps_per_second: u32,
    /// XPBD substeps per physics tick.
    pub num_substeps: u32,
    /// World acceleration.
    pub gravity: Vector3<f32>,
    /// Velocity retention per predict, in `(0, 1]`.
    pub damping: f32,
    /// Tangential velocity reduction at contacts, in `[0, 1]`.
    pub friction: f32,
    /// Iterations of the shape-match rotation extraction.
    pub rotation_steps: u32,
    /// XPBD edge compliance (0 = rigid).
    pub edge_compliance: f32,
    /// XPBD volume compliance (0 = rigid).
    pub vol_compliance: f32,
    /// Maximum number of registered anchors (capped at [`MAX_ANCHORS`]).
    pub max_anchors: usize,
    /// Spatial-grid addressing mode.
    pub grid_mode: GridMode,
    /// Rest-adjacency threshold of the tet–tet self-collision guard, as a
    /// multiple of the two tets' summed characteristic radii.
    pub self_collision_margin: f32,
    /// Jacobi relaxation applied to edge/volume corrections.
    pub relaxation: f32,
    /// Physics steps between body-position readbacks.
    pub readback_interval: u32,
}

impl Default for SoftbodyConfig {
    fn default() -> Self {
        Self {
            steps_per_second: 60,
            num_substeps: 10,
            gravity: Vector3::new(0.0, -9.81, 0.0),
            damping: 1.0,
            friction: 0.5,
            rotation_steps: 2,
            edge_compliance: 0.0,
            vol_compliance: 0.0,
            max_anchors: MAX_ANCHORS,
            grid_mode: GridMode::Dense,
            self_collision_margin: 1.5,
            relaxation: 0.25,
            readback_interval: 50,
        }
    }
}

impl SoftbodyConfig {
    /// Length of one fixed physics step.
    pub fn step_dt(&self) -> f32 {
        1.0 / self.steps_per_second as f32
    }

    /// Length of one substep.
    pub fn substep_dt(&self) -> f32 {
        self.step_dt() / self.num_substeps.max(1) as f32
    }
}

/// Per-step solver parameters, bound as a uniform.
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct SimParams {
    /// World acceleration.
    pub gravity: [f32; 3],
    /// Substep length.
    pub sdt: f32,
    /// Velocity retention per predict.
    pub damping: f32,
    /// Tangential velocity reduction at contacts.
    pub friction: f32,
    /// XPBD edge compliance.
    pub edge_compliance: f32,
    /// XPBD volume compliance.
    pub vol_compliance: f32,
    /// Jacobi relaxation factor.
    pub relaxation: f32,
    /// Shape-match rotation iterations.
    pub rotation_steps: u32,
    /// Number of simulation vertices.
    pub num_vertices: u32,
    /// Number of edge constraints.
    pub num_edges: u32,
    /// Number of simulation tets.
    pub num_tets: u32,
    /// Number of active colliders.
    pub num_colliders: u32,
    /// Number of registered anchors.
    pub num_anchors: u32,
    /// Self-collision rest-adjacency margin.
    pub self_collision_margin: f32,
    /// Spatial-grid cell size.
    pub grid_cell_size: f32,
    /// 0 = dense lattice, 1 = open hash.
    pub grid_mode: u32,
    /// Hash-table length (hash mode).
    pub grid_table_len: u32,
    pub _pad: u32,
}

/// Drag state, bound as a uniform; active while a vertex is grabbed.
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct DragParams {
    /// Target position (xyz; w unused).
    pub target_pos: [f32; 4],
    /// Dragged vertex id, `-1` when none.
    pub vertex: i32,
    /// Pull strength in `[0, 1]`.
    pub strength: f32,
    /// Non-zero while dragging.
    pub enabled: u32,
    pub _pad: u32,
}

/// Mouse-ray impulse state, bound as a uniform.
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct MouseParams {
    /// Ray origin (xyz; w unused).
    pub origin: [f32; 4],
    /// Ray direction (xyz); w holds the soft radius.
    pub dir: [f32; 4],
    /// Velocity impulse applied at full falloff (xyz; w unused).
    pub impulse: [f32; 4],
    /// Non-zero while the impulse applies.
    pub enabled: u32,
    pub _pad: [u32; 3],
}

/// Instance-reset command, bound as a uniform of the reset kernels.
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct ResetParams {
    /// Composed spawn transform (column-major).
    pub transform: [[f32; 4]; 4],
    /// Initial velocity (xyz); w holds the substep length.
    pub velocity: [f32; 4],
    /// First vertex of the instance.
    pub first_vertex: u32,
    /// Vertex count of the instance.
    pub vertex_count: u32,
    /// First tet of the instance.
    pub first_tet: u32,
    /// Tet count of the instance.
    pub tet_count: u32,
    /// Instance row to activate.
    pub object_id: u32,
    pub _pad: [u32; 3],
}

/// One anchor record of the device-side uniform array.
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct GpuAnchor {
    /// Rest-space centre (xyz) and influence radius (w).
    pub center_radius: [f32; 4],
    /// Target position (xyz) and strength (w).
    pub target_strength: [f32; 4],
}

/// Definition of an anchor.
#[derive(Copy, Clone, Debug)]
pub struct AnchorDef {
    /// Rest-space centre of influence.
    pub center: nalgebra::Point3<f32>,
    /// Influence radius.
    pub radius: f32,
    /// Target position the anchored region is pulled toward.
    pub target: nalgebra::Point3<f32>,
    /// Pull strength in `[0, 1]`.
    pub strength: f32,
}

impl From<&AnchorDef> for GpuAnchor {
    fn from(def: &AnchorDef) -> Self {
        Self {
            center_radius: [def.center.x, def.center.y, def.center.z, def.radius],
            target_strength: [def.target.x, def.target.y, def.target.z, def.strength],
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn uniform_sizes_are_16_byte_multiples() {
        assert_eq!(std::mem::size_of::<SimParams>() % 16, 0);
        assert_eq!(std::mem::size_of::<DragParams>() % 16, 0);
        assert_eq!(std::mem::size_of::<MouseParams>() % 16, 0);
        assert_eq!(std::mem::size_of::<ResetParams>() % 16, 0);
        assert_eq!(std::mem::size_of::<GpuAnchor>(), 32);
    }
}
