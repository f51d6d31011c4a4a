//! Host-thread reference backend.
//!
//! Executes the solver kernels sequentially over the same packed word
//! buffers the gpu consumes. Each function here mirrors one WGSL entry
//! point; keep them in lockstep with `shaders/*.wgsl`.

use nalgebra::{Point3, Vector3, Vector4};

use super::{Backend, StepContext};
use crate::layout::StructuredBuffer;
use crate::params::{DragParams, ResetParams, SIZE_EPS};
use crate::render::RenderBuffers;
use crate::state::{
    BakeBuffers, EdgeFields, InstanceFields, RestPoseFields, TetFields, VertexFields,
};

/// CPU implementation of [`Backend`].
#[derive(Default)]
pub struct CpuBackend {
    data: Option<CpuData>,
}

struct CpuData {
    vertices: StructuredBuffer,
    tets: StructuredBuffer,
    rest_poses: StructuredBuffer,
    edges: StructuredBuffer,
    instances: StructuredBuffer,
    vf: VertexFields,
    tf: TetFields,
    rf: RestPoseFields,
    ef: EdgeFields,
    inf: InstanceFields,
    grid: crate::grid::GridSettings,
    grid_heads: Vec<i32>,
}

impl CpuBackend {
    /// Creates an un-baked CPU backend.
    pub fn new() -> Self {
        Self::default()
    }
}

// Mirrors of the wgsl quaternion helpers, (x, y, z, w).

fn quat_identity() -> Vector4<f32> {
    Vector4::new(0.0, 0.0, 0.0, 1.0)
}

fn quat_mul(a: Vector4<f32>, b: Vector4<f32>) -> Vector4<f32> {
    let av = a.xyz();
    let bv = b.xyz();
    let v = bv * a.w + av * b.w + av.cross(&bv);
    Vector4::new(v.x, v.y, v.z, a.w * b.w - av.dot(&bv))
}

fn quat_from_axis_angle(axis: Vector3<f32>, angle: f32) -> Vector4<f32> {
    let half = angle * 0.5;
    let v = axis * half.sin();
    Vector4::new(v.x, v.y, v.z, half.cos())
}

fn quat_normalize(q: Vector4<f32>) -> Vector4<f32> {
    let n = q.norm();
    if n < 1.0e-12 {
        quat_identity()
    } else {
        q / n
    }
}

fn quat_rotate(q: Vector4<f32>, v: Vector3<f32>) -> Vector3<f32> {
    let u = q.xyz();
    let t = 2.0 * u.cross(&v);
    v + t * q.w + u.cross(&t)
}

fn is_finite_f(x: f32) -> bool {
    x.abs() < 1.0e30
}

impl CpuData {
    fn active(&self, obj: i32) -> bool {
        self.instances.get_f32(obj as usize, self.inf.size) > SIZE_EPS
    }

    fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    fn apply_colliders(&mut self, i: usize, ctx: &StepContext<'_>) {
        let mut pos = self.vertices.get_vec3(i, self.vf.pos);
        let mut prev = self.vertices.get_vec3(i, self.vf.prev);
        for collider in ctx.colliders {
            let res = collider.sample(ctx.collider_aux, pos);
            if !is_finite_f(res.w) || !is_finite_f(res.x + res.y + res.z) {
                continue;
            }
            if res.w < 0.0 {
                let n = res.xyz();
                pos -= n * res.w;
                let vel = pos - prev;
                let vn = n * vel.dot(&n);
                let vt = vel - vn;
                prev = pos - (vn + vt * (1.0 - ctx.params.friction));
            }
        }
        self.vertices.set_vec3(i, self.vf.pos, pos);
        self.vertices.set_vec3(i, self.vf.prev, prev);
    }

    fn integrate(&mut self, ctx: &StepContext<'_>) {
        let gravity = Vector3::from(ctx.params.gravity);
        let sdt = ctx.params.sdt;
        for i in 0..self.num_vertices() {
            if !self.active(self.vertices.get_i32(i, self.vf.obj_id)) {
                continue;
            }
            if self.vertices.get_f32(i, self.vf.inv_mass) == 0.0 {
                continue;
            }
            let pos = self.vertices.get_vec3(i, self.vf.pos);
            let mut vel = (pos - self.vertices.get_vec3(i, self.vf.prev)) * ctx.params.damping;
            vel += gravity * sdt * sdt;
            self.vertices.set_vec3(i, self.vf.prev, pos);
            self.vertices.set_vec3(i, self.vf.pos, pos + vel);
            self.apply_colliders(i, ctx);
        }
    }

    fn solve_edges(&mut self, ctx: &StepContext<'_>) {
        let alpha = ctx.params.edge_compliance / (ctx.params.sdt * ctx.params.sdt);
        for e in 0..self.edges.len() {
            let ia = self.edges.get_i32(e, self.ef.a) as usize;
            let ib = self.edges.get_i32(e, self.ef.b) as usize;
            if !self.active(self.vertices.get_i32(ia, self.vf.obj_id)) {
                continue;
            }
            let wa = self.vertices.get_f32(ia, self.vf.inv_mass);
            let wb = self.vertices.get_f32(ib, self.vf.inv_mass);
            let w = wa + wb;
            if w == 0.0 {
                continue;
            }
            let pa = self.vertices.get_vec3(ia, self.vf.pos);
            let pb = self.vertices.get_vec3(ib, self.vf.pos);
            let d = pa - pb;
            let len = d.norm();
            if len < 1.0e-12 {
                continue;
            }
            let grad = d / len;
            let c = len - self.edges.get_f32(e, self.ef.rest);
            let s = -c / (w + alpha);
            let delta = grad * (s * ctx.params.relaxation);
            self.vertices.set_vec3(ia, self.vf.pos, pa + delta * wa);
            self.vertices.set_vec3(ib, self.vf.pos, pb - delta * wb);
        }
    }

    fn solve_volumes(&mut self, ctx: &StepContext<'_>) {
        let alpha = ctx.params.vol_compliance / (ctx.params.sdt * ctx.params.sdt);
        for t in 0..self.tets.len() {
            if !self.active(self.tets.get_i32(t, self.tf.obj_id)) {
                continue;
            }
            let ids = [
                self.tets.get_ivec4_lane(t, self.tf.ids, 0) as usize,
                self.tets.get_ivec4_lane(t, self.tf.ids, 1) as usize,
                self.tets.get_ivec4_lane(t, self.tf.ids, 2) as usize,
                self.tets.get_ivec4_lane(t, self.tf.ids, 3) as usize,
            ];
            let p: Vec<Vector3<f32>> = ids
                .iter()
                .map(|&i| self.vertices.get_vec3(i, self.vf.pos))
                .collect();
            let g = [
                (p[3] - p[1]).cross(&(p[2] - p[1])) / 6.0,
                (p[2] - p[0]).cross(&(p[3] - p[0])) / 6.0,
                (p[3] - p[0]).cross(&(p[1] - p[0])) / 6.0,
                (p[1] - p[0]).cross(&(p[2] - p[0])) / 6.0,
            ];
            let w_per: Vec<f32> = ids
                .iter()
                .map(|&i| self.vertices.get_f32(i, self.vf.inv_mass))
                .collect();
            let w: f32 = (0..4).map(|j| w_per[j] * g[j].norm_squared()).sum();
            if w == 0.0 {
                continue;
            }
            let vol = (p[1] - p[0]).dot(&(p[2] - p[0]).cross(&(p[3] - p[0]))) / 6.0;
            let c = vol - self.tets.get_f32(t, self.tf.rest_volume);
            let s = -c / (w + alpha) * ctx.params.relaxation;
            for j in 0..4 {
                self.vertices
                    .set_vec3(ids[j], self.vf.pos, p[j] + g[j] * (s * w_per[j]));
            }
        }
    }

    fn post_collide(&mut self, ctx: &StepContext<'_>) {
        for i in 0..self.num_vertices() {
            if !self.active(self.vertices.get_i32(i, self.vf.obj_id)) {
                continue;
            }
            if self.vertices.get_f32(i, self.vf.inv_mass) == 0.0 {
                continue;
            }
            self.apply_colliders(i, ctx);
        }
    }

    fn apply_drag(&mut self, drag: &DragParams) {
        if drag.enabled == 0 || drag.vertex < 0 {
            return;
        }
        let i = drag.vertex as usize;
        let target = Vector3::new(drag.target_pos[0], drag.target_pos[1], drag.target_pos[2]);
        let mut pos = self.vertices.get_vec3(i, self.vf.pos);
        pos += (target - pos) * drag.strength;
        let vel = (pos - self.vertices.get_vec3(i, self.vf.prev)) * 0.5;
        self.vertices.set_vec3(i, self.vf.prev, pos - vel);
        self.vertices.set_vec3(i, self.vf.pos, pos);
    }

    fn grid_clear(&mut self) {
        self.grid_heads.fill(-1);
    }

    fn update_tets(&mut self, ctx: &StepContext<'_>) {
        for t in 0..self.tets.len() {
            if !self.active(self.tets.get_i32(t, self.tf.obj_id)) {
                continue;
            }
            let p: Vec<Vector3<f32>> = (0..4)
                .map(|lane| {
                    let i = self.tets.get_ivec4_lane(t, self.tf.ids, lane) as usize;
                    self.vertices.get_vec3(i, self.vf.pos)
                })
                .collect();
            let centroid = (p[0] + p[1] + p[2] + p[3]) * 0.25;

            let r: Vec<Vector3<f32>> = (0..4)
                .map(|j| self.rest_poses.get_vec3(t * 4 + j, self.rf.pos))
                .collect();
            let rbar = (r[0] + r[1] + r[2] + r[3]) * 0.25;

            let q: Vec<Vector3<f32>> = (0..4).map(|j| p[j] - centroid).collect();
            let s: Vec<Vector3<f32>> = (0..4).map(|j| r[j] - rbar).collect();
            let a0: Vector3<f32> = (0..4).map(|j| q[j] * s[j].x).sum();
            let a1: Vector3<f32> = (0..4).map(|j| q[j] * s[j].y).sum();
            let a2: Vector3<f32> = (0..4).map(|j| q[j] * s[j].z).sum();

            let mut dq = quat_identity();
            for _ in 0..ctx.params.rotation_steps {
                let x = quat_rotate(dq, Vector3::x());
                let y = quat_rotate(dq, Vector3::y());
                let z = quat_rotate(dq, Vector3::z());
                let denom = (x.dot(&a0) + y.dot(&a1) + z.dot(&a2)).abs() + 1.0e-9;
                let omega = (x.cross(&a0) + y.cross(&a1) + z.cross(&a2)) / denom;
                let angle = omega.norm();
                if angle < 1.0e-9 {
                    break;
                }
                dq = quat_normalize(quat_mul(quat_from_axis_angle(omega / angle, angle), dq));
            }

            for j in 0..4 {
                let rotated = rbar + quat_rotate(dq, r[j] - rbar);
                self.rest_poses.set_vec3(t * 4 + j, self.rf.pos, rotated);
            }
            let rot = self.tets.get_vec4(t, self.tf.rot);
            self.tets
                .set_vec4(t, self.tf.rot, quat_normalize(quat_mul(dq, rot)));
            self.tets.set_vec3(t, self.tf.centroid, centroid);

            let cell = self.grid.cell_of(centroid) as usize;
            let prev_head = self.grid_heads[cell];
            self.grid_heads[cell] = t as i32;
            self.tets.set_i32(t, self.tf.next_tet, prev_head);
        }
    }

    fn broadphase(&mut self, ctx: &StepContext<'_>) {
        for t in 0..self.tets.len() {
            let obj = self.tets.get_i32(t, self.tf.obj_id);
            if !self.active(obj) {
                continue;
            }
            let ca = self.tets.get_vec3(t, self.tf.centroid);
            let ra = self.tets.get_f32(t, self.tf.radius);
            let rest_ca = self.tets.get_vec3(t, self.tf.rest_centroid);
            let mut diff = Vector3::zeros();

            for dx in -1..=1 {
                for dy in -1..=1 {
                    for dz in -1..=1 {
                        let offset = Vector3::new(dx as f32, dy as f32, dz as f32)
                            * ctx.params.grid_cell_size;
                        let cell = self.grid.cell_of(ca + offset) as usize;
                        let mut cur = self.grid_heads[cell];
                        while cur >= 0 {
                            let o = cur as usize;
                            let next = self.tets.get_i32(o, self.tf.next_tet);
                            if o != t {
                                let same_obj = self.tets.get_i32(o, self.tf.obj_id) == obj;
                                let rb = self.tets.get_f32(o, self.tf.radius);
                                let rest_adjacent = same_obj
                                    && (self.tets.get_vec3(o, self.tf.rest_centroid) - rest_ca)
                                        .norm()
                                        <= ctx.params.self_collision_margin * (ra + rb);
                                if !rest_adjacent {
                                    let cb = self.tets.get_vec3(o, self.tf.centroid);
                                    let d = (ca - cb).norm();
                                    let rsum = ra + rb;
                                    if d < rsum && d > 1.0e-9 {
                                        diff += (ca - cb) * (0.5 * (rsum - d) / d);
                                    }
                                }
                            }
                            cur = next;
                        }
                    }
                }
            }

            if diff.norm_squared() > 0.0 {
                for lane in 0..4 {
                    let vi = self.tets.get_ivec4_lane(t, self.tf.ids, lane) as usize;
                    if self.vertices.get_f32(vi, self.vf.inv_mass) > 0.0 {
                        let pos = self.vertices.get_vec3(vi, self.vf.pos);
                        self.vertices.set_vec3(vi, self.vf.pos, pos + diff);
                    }
                }
            }
        }
    }

    fn apply_mouse(&mut self, ctx: &StepContext<'_>) {
        let mouse = &ctx.mouse;
        if mouse.enabled == 0 {
            return;
        }
        let origin = Vector3::new(mouse.origin[0], mouse.origin[1], mouse.origin[2]);
        let dir = Vector3::new(mouse.dir[0], mouse.dir[1], mouse.dir[2]);
        let impulse = Vector3::new(mouse.impulse[0], mouse.impulse[1], mouse.impulse[2]);
        let radius = mouse.dir[3];
        for i in 0..self.num_vertices() {
            if !self.active(self.vertices.get_i32(i, self.vf.obj_id)) {
                continue;
            }
            if self.vertices.get_f32(i, self.vf.inv_mass) == 0.0 {
                continue;
            }
            let rel = self.vertices.get_vec3(i, self.vf.pos) - origin;
            let perp = rel - dir * rel.dot(&dir);
            let d = perp.norm();
            if d < radius {
                let falloff = 1.0 - d / radius;
                let prev = self.vertices.get_vec3(i, self.vf.prev);
                self.vertices
                    .set_vec3(i, self.vf.prev, prev - impulse * falloff);
            }
        }
    }

    fn apply_anchors(&mut self, ctx: &StepContext<'_>) {
        if ctx.params.num_anchors == 0 {
            return;
        }
        for i in 0..self.num_vertices() {
            if !self.active(self.vertices.get_i32(i, self.vf.obj_id)) {
                continue;
            }
            if self.vertices.get_f32(i, self.vf.inv_mass) == 0.0 {
                continue;
            }
            let rest = self.vertices.get_vec3(i, self.vf.rest);
            let mut pos = self.vertices.get_vec3(i, self.vf.pos);
            for a in 0..ctx.params.num_anchors as usize {
                let anchor = &ctx.anchors[a];
                let center = Vector3::new(
                    anchor.center_radius[0],
                    anchor.center_radius[1],
                    anchor.center_radius[2],
                );
                let radius = anchor.center_radius[3];
                let d = (rest - center).norm();
                if d < radius {
                    let target = Vector3::new(
                        anchor.target_strength[0],
                        anchor.target_strength[1],
                        anchor.target_strength[2],
                    ) + (rest - center);
                    let weight = (1.0 - d / radius) * anchor.target_strength[3];
                    pos += (target - pos) * weight;
                }
            }
            self.vertices.set_vec3(i, self.vf.pos, pos);
        }
    }
}

impl Backend for CpuBackend {
    fn bake(&mut self, bake: &BakeBuffers) -> anyhow::Result<()> {
        self.data = Some(CpuData {
            vf: VertexFields::new(bake.vertices.layout()),
            tf: TetFields::new(bake.tets.layout()),
            rf: RestPoseFields::new(bake.rest_poses.layout()),
            ef: EdgeFields::new(bake.edges.layout()),
            inf: InstanceFields::new(bake.instances.layout()),
            vertices: bake.vertices.clone(),
            tets: bake.tets.clone(),
            rest_poses: bake.rest_poses.clone(),
            edges: bake.edges.clone(),
            instances: bake.instances.clone(),
            grid: bake.grid,
            grid_heads: vec![-1; bake.grid.table_len()],
        });
        Ok(())
    }

    fn step(&mut self, ctx: &StepContext<'_>) {
        let Some(data) = self.data.as_mut() else {
            return;
        };
        for _ in 0..ctx.num_substeps {
            data.integrate(ctx);
            data.solve_edges(ctx);
            data.solve_volumes(ctx);
            data.post_collide(ctx);
            data.apply_drag(&ctx.drag);
        }
        data.grid_clear();
        data.update_tets(ctx);
        data.broadphase(ctx);
        data.apply_mouse(ctx);
        data.apply_anchors(ctx);
    }

    fn reset_instance(&mut self, params: &ResetParams) {
        let Some(data) = self.data.as_mut() else {
            return;
        };
        let transform = nalgebra::Matrix4::from_fn(|r, c| params.transform[c][r]);
        let apply = |p: Vector3<f32>| -> Vector3<f32> {
            (transform * Vector4::new(p.x, p.y, p.z, 1.0)).xyz()
        };
        let velocity = Vector3::new(params.velocity[0], params.velocity[1], params.velocity[2]);
        let sdt = params.velocity[3];

        for k in 0..params.vertex_count as usize {
            let i = params.first_vertex as usize + k;
            let p = apply(data.vertices.get_vec3(i, data.vf.rest));
            data.vertices.set_vec3(i, data.vf.pos, p);
            data.vertices.set_vec3(i, data.vf.prev, p - velocity * sdt);
        }
        data.instances
            .set_f32(params.object_id as usize, data.inf.size, 1.0);

        for k in 0..params.tet_count as usize {
            let t = params.first_tet as usize + k;
            let p: Vec<Vector3<f32>> = (0..4)
                .map(|lane| {
                    let i = data.tets.get_ivec4_lane(t, data.tf.ids, lane) as usize;
                    apply(data.vertices.get_vec3(i, data.vf.rest))
                })
                .collect();
            for (j, pj) in p.iter().enumerate() {
                data.rest_poses.set_vec3(t * 4 + j, data.rf.pos, *pj);
            }
            let vol = (p[1] - p[0]).dot(&(p[2] - p[0]).cross(&(p[3] - p[0]))) / 6.0;
            for j in 0..4 {
                data.rest_poses.set_f32(t * 4 + j, data.rf.volume, vol);
            }
            let centroid = (p[0] + p[1] + p[2] + p[3]) * 0.25;
            data.tets.set_f32(t, data.tf.rest_volume, vol);
            data.tets.set_vec3(t, data.tf.rest_centroid, centroid);
            data.tets.set_vec3(t, data.tf.centroid, centroid);
            data.tets.set_f32(
                t,
                data.tf.radius,
                (vol.max(0.0) * 3.0 / (4.0 * std::f32::consts::PI)).cbrt(),
            );
            data.tets
                .set_vec4(t, data.tf.rot, Vector4::new(0.0, 0.0, 0.0, 1.0));
            data.tets.set_i32(t, data.tf.next_tet, -1);
        }
    }

    fn write_instance_size(&mut self, object_id: u32, size: f32) {
        if let Some(data) = self.data.as_mut() {
            data.instances
                .set_f32(object_id as usize, data.inf.size, size);
        }
    }

    fn read_positions(&mut self, out: &mut Vec<Point3<f32>>) {
        out.clear();
        if let Some(data) = self.data.as_ref() {
            for i in 0..data.vertices.len() {
                out.push(Point3::from(data.vertices.get_vec3(i, data.vf.pos)));
            }
        }
    }

    fn render_buffers(&self) -> Option<RenderBuffers<'_>> {
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::StepContext;
    use crate::grid::GridMode;
    use crate::params::{GpuAnchor, MouseParams, SimParams, MAX_ANCHORS};
    use crate::state::build_bake;
    use tetmesh::na::Point3 as P3;
    use tetmesh::{Model, TetMeshOutput};

    fn cube_model() -> Model {
        let h = 0.5;
        let mesh = TetMeshOutput {
            vertices: vec![
                P3::new(-h, -h, -h),
                P3::new(h, -h, -h),
                P3::new(h, h, -h),
                P3::new(-h, h, -h),
                P3::new(-h, -h, h),
                P3::new(h, -h, h),
                P3::new(h, h, h),
                P3::new(-h, h, h),
            ],
            tets: vec![
                [0, 1, 3, 4],
                [1, 2, 3, 6],
                [1, 4, 5, 6],
                [3, 4, 6, 7],
                [1, 3, 4, 6],
            ],
            points: Vec::new(),
        };
        Model::from_tet_mesh(&mesh)
    }

    fn identity_reset(vertex_count: u32, tet_count: u32) -> ResetParams {
        let mut transform = [[0.0f32; 4]; 4];
        for (k, column) in transform.iter_mut().enumerate() {
            column[k] = 1.0;
        }
        ResetParams {
            transform,
            velocity: [0.0; 4],
            first_vertex: 0,
            vertex_count,
            first_tet: 0,
            tet_count,
            object_id: 0,
            _pad: [0; 3],
        }
    }

    fn run_one_step(mode: GridMode) -> CpuBackend {
        let (bake, ranges) = build_bake(&[cube_model()], &[0], &[], mode);
        let mut backend = CpuBackend::new();
        backend.bake(&bake).unwrap();
        backend.reset_instance(&identity_reset(ranges[0].vertex_count, ranges[0].tet_count));

        let params = SimParams {
            gravity: [0.0, -9.81, 0.0],
            sdt: 1.0 / 600.0,
            damping: 1.0,
            friction: 0.0,
            edge_compliance: 0.0,
            vol_compliance: 0.0,
            relaxation: 0.25,
            rotation_steps: 2,
            num_vertices: bake.vertices.len() as u32,
            num_edges: bake.edges.len() as u32,
            num_tets: bake.tets.len() as u32,
            num_colliders: 0,
            num_anchors: 0,
            self_collision_margin: 1.5,
            grid_cell_size: bake.grid.cell_size,
            grid_mode: match mode {
                GridMode::Dense => 0,
                GridMode::Hash => 1,
            },
            grid_table_len: bake.grid.table_len() as u32,
            _pad: 0,
        };
        let ctx = StepContext {
            params,
            num_substeps: 10,
            colliders: &[],
            collider_aux: &[],
            colliders_dirty: false,
            anchors: [GpuAnchor::default(); MAX_ANCHORS],
            drag: DragParams::default(),
            mouse: MouseParams::default(),
        };
        backend.step(&ctx);
        backend
    }

    /// After `update_tets`, walking the linked list of each tet's cell must
    /// visit that tet exactly once.
    #[test]
    fn grid_lists_visit_each_tet_exactly_once() {
        for mode in [GridMode::Dense, GridMode::Hash] {
            let backend = run_one_step(mode);
            let data = backend.data.as_ref().unwrap();
            for t in 0..data.tets.len() {
                let centroid = data.tets.get_vec3(t, data.tf.centroid);
                let cell = data.grid.cell_of(centroid) as usize;
                let mut visits = 0;
                let mut cur = data.grid_heads[cell];
                let mut hops = 0;
                while cur >= 0 {
                    if cur as usize == t {
                        visits += 1;
                    }
                    cur = data.tets.get_i32(cur as usize, data.tf.next_tet);
                    hops += 1;
                    assert!(hops <= data.tets.len(), "cycle in grid list");
                }
                assert_eq!(visits, 1, "tet {t} visited {visits} times in {mode:?} mode");
            }
        }
    }
}
