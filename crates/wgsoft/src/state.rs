//! Record layouts of the simulation buffers and the bake-time packing of
//! registered models into them.
//!
//! The layouts defined here are the single source of truth: the host packs
//! through them and the WGSL structs the kernels compile against are
//! generated from them by [`structs_wgsl`].

use nalgebra::Vector3;
use tetmesh::Model;

use crate::grid::{GridMode, GridSettings};
use crate::layout::{Field, FieldKind, StructLayout, StructuredBuffer};

/// Layout of one simulation vertex.
pub fn vertex_layout() -> StructLayout {
    StructLayout::new(&[
        ("obj_id", FieldKind::I32),
        ("inv_mass", FieldKind::F32),
        ("influencer_start", FieldKind::I32),
        ("influencer_count", FieldKind::I32),
        ("pos", FieldKind::Vec3),
        ("prev", FieldKind::Vec3),
        ("rest", FieldKind::Vec3),
    ])
}

/// Layout of one simulation tet.
pub fn tet_layout() -> StructLayout {
    StructLayout::new(&[
        ("obj_id", FieldKind::I32),
        ("rest_volume", FieldKind::F32),
        ("radius", FieldKind::F32),
        ("next_tet", FieldKind::I32),
        ("ids", FieldKind::IVec4),
        ("rest_centroid", FieldKind::Vec3),
        ("centroid", FieldKind::Vec3),
        ("rot", FieldKind::Quat),
    ])
}

/// Layout of one rest-pose record (four per tet).
pub fn rest_pose_layout() -> StructLayout {
    StructLayout::new(&[("pos", FieldKind::Vec3), ("volume", FieldKind::F32)])
}

/// Layout of one edge constraint.
pub fn edge_layout() -> StructLayout {
    StructLayout::new(&[
        ("a", FieldKind::I32),
        ("b", FieldKind::I32),
        ("rest", FieldKind::F32),
    ])
}

/// Layout of one instance row.
pub fn instance_layout() -> StructLayout {
    StructLayout::new(&[
        ("first_vertex", FieldKind::I32),
        ("vertex_count", FieldKind::I32),
        ("first_tet", FieldKind::I32),
        ("tet_count", FieldKind::I32),
        ("center_vertex", FieldKind::I32),
        ("size", FieldKind::F32),
    ])
}

/// WGSL declarations of all record structs, generated from the layouts.
pub fn structs_wgsl() -> String {
    [
        vertex_layout().to_wgsl("Vertex"),
        tet_layout().to_wgsl("Tet"),
        rest_pose_layout().to_wgsl("RestPose"),
        edge_layout().to_wgsl("Edge"),
        instance_layout().to_wgsl("Instance"),
    ]
    .join("\n")
}

/// Resolved vertex fields.
#[derive(Copy, Clone, Debug)]
pub struct VertexFields {
    pub obj_id: Field,
    pub inv_mass: Field,
    pub influencer_start: Field,
    pub influencer_count: Field,
    pub pos: Field,
    pub prev: Field,
    pub rest: Field,
}

impl VertexFields {
    /// Looks the fields up in `layout`.
    pub fn new(layout: &StructLayout) -> Self {
        Self {
            obj_id: layout.field("obj_id"),
            inv_mass: layout.field("inv_mass"),
            influencer_start: layout.field("influencer_start"),
            influencer_count: layout.field("influencer_count"),
            pos: layout.field("pos"),
            prev: layout.field("prev"),
            rest: layout.field("rest"),
        }
    }
}

/// Resolved tet fields.
#[derive(Copy, Clone, Debug)]
pub struct TetFields {
    pub obj_id: Field,
    pub rest_volume: Field,
    pub radius: Field,
    pub next_tet: Field,
    pub ids: Field,
    pub rest_centroid: Field,
    pub centroid: Field,
    pub rot: Field,
}

impl TetFields {
    /// Looks the fields up in `layout`.
    pub fn new(layout: &StructLayout) -> Self {
        Self {
            obj_id: layout.field("obj_id"),
            rest_volume: layout.field("rest_volume"),
            radius: layout.field("radius"),
            next_tet: layout.field("next_tet"),
            ids: layout.field("ids"),
            rest_centroid: layout.field("rest_centroid"),
            centroid: layout.field("centroid"),
            rot: layout.field("rot"),
        }
    }
}

/// Resolved rest-pose fields.
#[derive(Copy, Clone, Debug)]
pub struct RestPoseFields {
    pub pos: Field,
    pub volume: Field,
}

impl RestPoseFields {
    /// Looks the fields up in `layout`.
    pub fn new(layout: &StructLayout) -> Self {
        Self {
            pos: layout.field("pos"),
            volume: layout.field("volume"),
        }
    }
}

/// Resolved edge fields.
#[derive(Copy, Clone, Debug)]
pub struct EdgeFields {
    pub a: Field,
    pub b: Field,
    pub rest: Field,
}

impl EdgeFields {
    /// Looks the fields up in `layout`.
    pub fn new(layout: &StructLayout) -> Self {
        Self {
            a: layout.field("a"),
            b: layout.field("b"),
            rest: layout.field("rest"),
        }
    }
}

/// Resolved instance fields.
#[derive(Copy, Clone, Debug)]
pub struct InstanceFields {
    pub first_vertex: Field,
    pub vertex_count: Field,
    pub first_tet: Field,
    pub tet_count: Field,
    pub center_vertex: Field,
    pub size: Field,
}

impl InstanceFields {
    /// Looks the fields up in `layout`.
    pub fn new(layout: &StructLayout) -> Self {
        Self {
            first_vertex: layout.field("first_vertex"),
            vertex_count: layout.field("vertex_count"),
            first_tet: layout.field("first_tet"),
            tet_count: layout.field("tet_count"),
            center_vertex: layout.field("center_vertex"),
            size: layout.field("size"),
        }
    }
}

/// Index ranges of one instance inside the packed buffers.
#[derive(Copy, Clone, Debug)]
pub struct InstanceRange {
    /// First vertex row.
    pub first_vertex: u32,
    /// Number of vertex rows.
    pub vertex_count: u32,
    /// First tet row.
    pub first_tet: u32,
    /// Number of tet rows.
    pub tet_count: u32,
    /// Vertex used for body-level position readback.
    pub center_vertex: u32,
}

/// The packed interchange buffers handed to a backend at bake time.
pub struct BakeBuffers {
    /// Vertex records.
    pub vertices: StructuredBuffer,
    /// Tet records.
    pub tets: StructuredBuffer,
    /// Rest-pose records, four per tet.
    pub rest_poses: StructuredBuffer,
    /// Edge constraints.
    pub edges: StructuredBuffer,
    /// Instance rows.
    pub instances: StructuredBuffer,
    /// Flattened per-vertex incident list; each entry is `tet * 4 + corner`,
    /// i.e. a rest-pose index.
    pub influencers: Vec<i32>,
    /// Spatial-grid parameters (cell size = 2 × max tet radius).
    pub grid: GridSettings,
}

fn tet_volume(p: [Vector3<f32>; 4]) -> f32 {
    (p[1] - p[0]).dot(&(p[2] - p[0]).cross(&(p[3] - p[0]))) / 6.0
}

/// Packs every instance of every registered model into the interchange
/// buffers. `instance_geometry[i]` names the model of instance `i`;
/// `pinned` lists `(instance, local_vertex)` pairs whose inverse mass is
/// forced to zero.
pub fn build_bake(
    models: &[Model],
    instance_geometry: &[usize],
    pinned: &[(usize, u32)],
    grid_mode: GridMode,
) -> (BakeBuffers, Vec<InstanceRange>) {
    let total_vertices: usize = instance_geometry
        .iter()
        .map(|&g| models[g].vertices.len())
        .sum();
    let total_tets: usize = instance_geometry.iter().map(|&g| models[g].tets.len()).sum();
    let total_edges: usize = instance_geometry
        .iter()
        .map(|&g| models[g].edges.len())
        .sum();

    let mut vertices = StructuredBuffer::new(vertex_layout(), total_vertices);
    let mut tets = StructuredBuffer::new(tet_layout(), total_tets);
    let mut rest_poses = StructuredBuffer::new(rest_pose_layout(), total_tets * 4);
    let mut edges = StructuredBuffer::new(edge_layout(), total_edges);
    let mut instances = StructuredBuffer::new(instance_layout(), instance_geometry.len());
    let mut influencers = Vec::new();

    let vf = VertexFields::new(&vertex_layout());
    let tf = TetFields::new(&tet_layout());
    let rf = RestPoseFields::new(&rest_pose_layout());
    let ef = EdgeFields::new(&edge_layout());
    let inf = InstanceFields::new(&instance_layout());

    let mut ranges = Vec::with_capacity(instance_geometry.len());
    let mut base_v = 0usize;
    let mut base_t = 0usize;
    let mut base_e = 0usize;
    let mut max_radius = 0.0f32;

    for (obj, &g) in instance_geometry.iter().enumerate() {
        let model = &models[g];
        let nv = model.vertices.len();
        let nt = model.tets.len();

        // Inverse masses: the sum over incident tets of 1 / (V / 4).
        let mut inv_mass = vec![0.0f32; nv];
        let mut incident: Vec<Vec<i32>> = vec![Vec::new(); nv];
        for (t, ids) in model.tets.iter().enumerate() {
            let p = ids.map(|i| model.vertices[i as usize].coords);
            let vol = tet_volume(p);
            let p_inv = if vol > 0.0 { 1.0 / (vol / 4.0) } else { 0.0 };
            for (corner, &id) in ids.iter().enumerate() {
                inv_mass[id as usize] += p_inv;
                incident[id as usize].push(((base_t + t) * 4 + corner) as i32);
            }

            let global_t = base_t + t;
            tets.set_i32(global_t, tf.obj_id, obj as i32);
            tets.set_f32(global_t, tf.rest_volume, vol);
            tets.set_f32(
                global_t,
                tf.radius,
                (vol.max(0.0) * 3.0 / (4.0 * std::f32::consts::PI)).cbrt(),
            );
            tets.set_i32(global_t, tf.next_tet, -1);
            for (lane, &id) in ids.iter().enumerate() {
                tets.set_ivec4_lane(global_t, tf.ids, lane, (base_v + id as usize) as i32);
            }
            let centroid = (p[0] + p[1] + p[2] + p[3]) / 4.0;
            tets.set_vec3(global_t, tf.rest_centroid, centroid);
            tets.set_vec3(global_t, tf.centroid, centroid);
            tets.set_vec4(global_t, tf.rot, nalgebra::Vector4::new(0.0, 0.0, 0.0, 1.0));
            max_radius = max_radius.max(tets.get_f32(global_t, tf.radius));

            for (corner, &id) in ids.iter().enumerate() {
                let row = global_t * 4 + corner;
                rest_poses.set_vec3(row, rf.pos, model.vertices[id as usize].coords);
                rest_poses.set_f32(row, rf.volume, vol);
            }
        }

        for &(instance, local) in pinned {
            if instance == obj {
                inv_mass[local as usize] = 0.0;
            }
        }

        let rest_centroid: Vector3<f32> =
            model.vertices.iter().map(|v| v.coords).sum::<Vector3<f32>>() / nv.max(1) as f32;
        let mut center_vertex = 0usize;
        let mut center_d = f32::INFINITY;
        for (v, p) in model.vertices.iter().enumerate() {
            let d = (p.coords - rest_centroid).norm_squared();
            if d < center_d {
                center_d = d;
                center_vertex = v;
            }
        }

        for (v, p) in model.vertices.iter().enumerate() {
            let row = base_v + v;
            vertices.set_i32(row, vf.obj_id, obj as i32);
            vertices.set_f32(row, vf.inv_mass, inv_mass[v]);
            vertices.set_i32(row, vf.influencer_start, influencers.len() as i32);
            vertices.set_i32(row, vf.influencer_count, incident[v].len() as i32);
            influencers.extend_from_slice(&incident[v]);
            vertices.set_vec3(row, vf.pos, p.coords);
            vertices.set_vec3(row, vf.prev, p.coords);
            vertices.set_vec3(row, vf.rest, p.coords);
        }

        for (e, ids) in model.edges.iter().enumerate() {
            let row = base_e + e;
            edges.set_i32(row, ef.a, (base_v + ids[0] as usize) as i32);
            edges.set_i32(row, ef.b, (base_v + ids[1] as usize) as i32);
            let rest = (model.vertices[ids[0] as usize] - model.vertices[ids[1] as usize]).norm();
            edges.set_f32(row, ef.rest, rest);
        }

        instances.set_i32(obj, inf.first_vertex, base_v as i32);
        instances.set_i32(obj, inf.vertex_count, nv as i32);
        instances.set_i32(obj, inf.first_tet, base_t as i32);
        instances.set_i32(obj, inf.tet_count, nt as i32);
        instances.set_i32(obj, inf.center_vertex, (base_v + center_vertex) as i32);
        instances.set_f32(obj, inf.size, 0.0);

        ranges.push(InstanceRange {
            first_vertex: base_v as u32,
            vertex_count: nv as u32,
            first_tet: base_t as u32,
            tet_count: nt as u32,
            center_vertex: (base_v + center_vertex) as u32,
        });

        base_v += nv;
        base_t += nt;
        base_e += model.edges.len();
    }

    let grid = GridSettings {
        mode: grid_mode,
        cell_size: (2.0 * max_radius).max(1.0e-3),
    };
    (
        BakeBuffers {
            vertices,
            tets,
            rest_poses,
            edges,
            instances,
            influencers,
            grid,
        },
        ranges,
    )
}
