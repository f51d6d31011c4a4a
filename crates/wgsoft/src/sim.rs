//! The softbody simulation front end.
//!
//! Geometries, instances, colliders, anchors and pins are registered first;
//! `bake` then packs the interchange buffers, sizes the spatial grid and
//! compiles the kernels. After baking, instances are activated with `spawn`
//! and advanced with `update`, which consumes fixed physics steps from a
//! saturating accumulator.

use nalgebra::{Isometry3, Matrix4, Point3, Translation3, UnitQuaternion, Vector3};
use tetmesh::Model;

use crate::backend::cpu::CpuBackend;
use crate::backend::gpu::GpuBackend;
use crate::backend::{Backend, StepContext};
use crate::collider::{ColliderDesc, GpuCollider};
use crate::error::SoftbodyError;
use crate::gpu::GpuInstance;
use crate::grid::{GridMode, GridSettings};
use crate::params::{
    AnchorDef, DragParams, GpuAnchor, MouseParams, ResetParams, SimParams, SoftbodyConfig,
    MAX_ANCHORS,
};
use crate::render::SurfaceBinding;
use crate::state::{build_bake, InstanceRange};

/// Handle of a registered geometry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GeometryHandle(usize);

/// Handle of a registered instance.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InstanceHandle(usize);

/// Handle of a registered collider.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ColliderHandle(usize);

/// Handle of a registered anchor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AnchorHandle(usize);

/// Result of a ray pick over the simulation vertices.
#[derive(Copy, Clone, Debug)]
pub struct PickedVertex {
    /// Global vertex id.
    pub vertex_id: u32,
    /// Its position at the last readback.
    pub pos: Point3<f32>,
    /// Distance along the ray of its perpendicular foot.
    pub along_ray: f32,
}

struct Baked {
    ranges: Vec<InstanceRange>,
    grid: GridSettings,
    num_vertices: u32,
    num_tets: u32,
    num_edges: u32,
    empty: bool,
}

/// A real-time XPBD softbody simulation.
pub struct SoftbodySimulation {
    config: SoftbodyConfig,
    backend: Box<dyn Backend>,
    models: Vec<Model>,
    instance_geometry: Vec<usize>,
    pinned: Vec<(usize, u32)>,
    colliders: Vec<ColliderDesc>,
    lowered: Vec<GpuCollider>,
    collider_aux: Vec<f32>,
    colliders_dirty: bool,
    anchors: Vec<AnchorDef>,
    baked: Option<Baked>,
    accumulator: f32,
    drag: DragParams,
    mouse: MouseParams,
    positions: Vec<Point3<f32>>,
    body_positions: Vec<Point3<f32>>,
    spawned: Vec<bool>,
    steps_since_readback: u32,
}

impl SoftbodySimulation {
    /// Creates a simulation on a gpu device.
    pub fn new(gpu: &GpuInstance, config: SoftbodyConfig) -> Self {
        Self::with_backend(Box::new(GpuBackend::new(gpu)), config)
    }

    /// Creates a simulation executing on host threads (reference backend).
    pub fn new_cpu(config: SoftbodyConfig) -> Self {
        Self::with_backend(Box::new(CpuBackend::new()), config)
    }

    /// Creates a simulation over an arbitrary backend.
    pub fn with_backend(backend: Box<dyn Backend>, config: SoftbodyConfig) -> Self {
        Self {
            config,
            backend,
            models: Vec::new(),
            instance_geometry: Vec::new(),
            pinned: Vec::new(),
            colliders: Vec::new(),
            lowered: Vec::new(),
            collider_aux: Vec::new(),
            colliders_dirty: true,
            anchors: Vec::new(),
            baked: None,
            accumulator: 0.0,
            drag: DragParams {
                vertex: -1,
                ..Default::default()
            },
            mouse: MouseParams::default(),
            positions: Vec::new(),
            body_positions: Vec::new(),
            spawned: Vec::new(),
            steps_since_readback: 0,
        }
    }

    /// The configuration the simulation was created with.
    pub fn config(&self) -> &SoftbodyConfig {
        &self.config
    }

    fn ensure_unbaked(&self) -> Result<(), SoftbodyError> {
        if self.baked.is_some() {
            Err(SoftbodyError::AlreadyBaked)
        } else {
            Ok(())
        }
    }

    /// Registers a baked geometry.
    pub fn add_geometry(&mut self, model: Model) -> Result<GeometryHandle, SoftbodyError> {
        self.ensure_unbaked()?;
        self.models.push(model);
        Ok(GeometryHandle(self.models.len() - 1))
    }

    /// Registers an instance of a geometry. Instances start inactive.
    pub fn add_instance(
        &mut self,
        geometry: GeometryHandle,
    ) -> Result<InstanceHandle, SoftbodyError> {
        self.ensure_unbaked()?;
        if geometry.0 >= self.models.len() {
            return Err(SoftbodyError::UnknownHandle(geometry.0));
        }
        self.instance_geometry.push(geometry.0);
        self.spawned.push(false);
        self.body_positions.push(Point3::origin());
        Ok(InstanceHandle(self.instance_geometry.len() - 1))
    }

    /// Pins one vertex of an instance (zero inverse mass).
    pub fn pin_vertex(
        &mut self,
        instance: InstanceHandle,
        local_vertex: u32,
    ) -> Result<(), SoftbodyError> {
        self.ensure_unbaked()?;
        if instance.0 >= self.instance_geometry.len() {
            return Err(SoftbodyError::UnknownHandle(instance.0));
        }
        self.pinned.push((instance.0, local_vertex));
        Ok(())
    }

    /// Registers a collider.
    pub fn add_collider(&mut self, desc: ColliderDesc) -> Result<ColliderHandle, SoftbodyError> {
        self.colliders.push(desc);
        self.lower_colliders();
        Ok(ColliderHandle(self.colliders.len() - 1))
    }

    /// Updates a dynamic collider. The shape kind and auxiliary sample
    /// count must not change.
    pub fn update_collider(
        &mut self,
        handle: ColliderHandle,
        desc: ColliderDesc,
    ) -> Result<(), SoftbodyError> {
        let current = self
            .colliders
            .get(handle.0)
            .ok_or(SoftbodyError::UnknownHandle(handle.0))?;
        if std::mem::discriminant(current) != std::mem::discriminant(&desc)
            || current.aux_len() != desc.aux_len()
        {
            return Err(SoftbodyError::ColliderShapeMismatch);
        }
        self.colliders[handle.0] = desc;
        self.lower_colliders();
        Ok(())
    }

    fn lower_colliders(&mut self) {
        self.lowered.clear();
        self.collider_aux.clear();
        for desc in &self.colliders {
            let record = desc.lower(&mut self.collider_aux);
            self.lowered.push(record);
        }
        self.colliders_dirty = true;
    }

    /// Registers an anchor.
    pub fn add_anchor(&mut self, def: AnchorDef) -> Result<AnchorHandle, SoftbodyError> {
        let limit = self.config.max_anchors.min(MAX_ANCHORS);
        if self.anchors.len() >= limit {
            return Err(SoftbodyError::AnchorOverflow(limit));
        }
        self.anchors.push(def);
        Ok(AnchorHandle(self.anchors.len() - 1))
    }

    /// Updates an anchor (target, strength, region).
    pub fn update_anchor(
        &mut self,
        handle: AnchorHandle,
        def: AnchorDef,
    ) -> Result<(), SoftbodyError> {
        *self
            .anchors
            .get_mut(handle.0)
            .ok_or(SoftbodyError::UnknownHandle(handle.0))? = def;
        Ok(())
    }

    /// Allocates the device buffers, sizes the spatial grid and compiles
    /// the kernels. An empty registration logs and leaves `update` a no-op.
    pub fn bake(&mut self) -> Result<(), SoftbodyError> {
        self.ensure_unbaked()?;

        let total_vertices: usize = self
            .instance_geometry
            .iter()
            .map(|&g| self.models[g].vertices.len())
            .sum();
        let total_tets: usize = self
            .instance_geometry
            .iter()
            .map(|&g| self.models[g].tets.len())
            .sum();
        if total_vertices == 0 || total_tets == 0 {
            log::warn!("bake called with no vertices or tets; simulation stays empty");
            self.baked = Some(Baked {
                ranges: Vec::new(),
                grid: GridSettings {
                    mode: self.config.grid_mode,
                    cell_size: 1.0,
                },
                num_vertices: 0,
                num_tets: 0,
                num_edges: 0,
                empty: true,
            });
            return Ok(());
        }

        let (bake, ranges) = build_bake(
            &self.models,
            &self.instance_geometry,
            &self.pinned,
            self.config.grid_mode,
        );
        log::info!(
            "baking softbody simulation: {} vertices, {} tets, {} edges, {} instances, grid cell {}",
            bake.vertices.len(),
            bake.tets.len(),
            bake.edges.len(),
            self.instance_geometry.len(),
            bake.grid.cell_size,
        );
        let baked = Baked {
            grid: bake.grid,
            num_vertices: bake.vertices.len() as u32,
            num_tets: bake.tets.len() as u32,
            num_edges: bake.edges.len() as u32,
            ranges,
            empty: false,
        };
        self.backend.bake(&bake).map_err(SoftbodyError::Backend)?;
        self.positions = Vec::with_capacity(baked.num_vertices as usize);
        self.baked = Some(baked);
        Ok(())
    }

    /// Activates an instance at a pose, with an initial velocity.
    pub fn spawn(
        &mut self,
        instance: InstanceHandle,
        pos: Point3<f32>,
        rot: UnitQuaternion<f32>,
        scale: f32,
        velocity: Vector3<f32>,
    ) -> Result<(), SoftbodyError> {
        let baked = self.baked.as_ref().ok_or(SoftbodyError::NotBaked)?;
        if instance.0 >= self.instance_geometry.len() {
            return Err(SoftbodyError::ResetOutOfRange(instance.0));
        }
        if baked.empty {
            return Ok(());
        }
        let range = baked.ranges[instance.0];
        let iso = Isometry3::from_parts(Translation3::from(pos.coords), rot);
        let transform: Matrix4<f32> = iso.to_homogeneous() * Matrix4::new_scaling(scale);
        let params = ResetParams {
            transform: transform.into(),
            velocity: [
                velocity.x,
                velocity.y,
                velocity.z,
                self.config.substep_dt(),
            ],
            first_vertex: range.first_vertex,
            vertex_count: range.vertex_count,
            first_tet: range.first_tet,
            tet_count: range.tet_count,
            object_id: instance.0 as u32,
            _pad: [0; 3],
        };
        self.backend.reset_instance(&params);
        self.spawned[instance.0] = true;
        self.body_positions[instance.0] = pos;
        Ok(())
    }

    /// Deactivates an instance; its buffer rows are kept but skipped by
    /// every kernel.
    pub fn despawn(&mut self, instance: InstanceHandle) -> Result<(), SoftbodyError> {
        if self.baked.is_none() {
            return Err(SoftbodyError::NotBaked);
        }
        if instance.0 >= self.instance_geometry.len() {
            return Err(SoftbodyError::ResetOutOfRange(instance.0));
        }
        self.backend.write_instance_size(instance.0 as u32, 0.0);
        self.spawned[instance.0] = false;
        Ok(())
    }

    /// Advances real time and consumes as many fixed physics steps as the
    /// accumulator allows. `dt` saturates at 1/60 s to bound per-call work.
    pub fn update(&mut self, dt: f32) {
        let Some(baked) = self.baked.as_ref() else {
            return;
        };
        if baked.empty {
            return;
        }
        self.accumulator += dt.min(1.0 / 60.0);
        let step_dt = self.config.step_dt();
        while self.accumulator >= step_dt {
            self.step_once();
            self.accumulator -= step_dt;
            self.steps_since_readback += 1;
            if self.steps_since_readback >= self.config.readback_interval {
                self.refresh_positions();
            }
        }
    }

    fn step_once(&mut self) {
        let Some(baked) = self.baked.as_ref() else {
            return;
        };
        let params = SimParams {
            gravity: self.config.gravity.into(),
            sdt: self.config.substep_dt(),
            damping: self.config.damping,
            friction: self.config.friction,
            edge_compliance: self.config.edge_compliance,
            vol_compliance: self.config.vol_compliance,
            relaxation: self.config.relaxation,
            rotation_steps: self.config.rotation_steps,
            num_vertices: baked.num_vertices,
            num_edges: baked.num_edges,
            num_tets: baked.num_tets,
            num_colliders: self.lowered.len() as u32,
            num_anchors: self.anchors.len().min(MAX_ANCHORS) as u32,
            self_collision_margin: self.config.self_collision_margin,
            grid_cell_size: baked.grid.cell_size,
            grid_mode: match baked.grid.mode {
                GridMode::Dense => 0,
                GridMode::Hash => 1,
            },
            grid_table_len: baked.grid.table_len() as u32,
            _pad: 0,
        };
        let mut anchors = [GpuAnchor::default(); MAX_ANCHORS];
        for (slot, def) in self.anchors.iter().enumerate().take(MAX_ANCHORS) {
            anchors[slot] = def.into();
        }
        let ctx = StepContext {
            params,
            num_substeps: self.config.num_substeps.max(1),
            colliders: &self.lowered,
            collider_aux: &self.collider_aux,
            colliders_dirty: self.colliders_dirty,
            anchors,
            drag: self.drag,
            mouse: self.mouse,
        };
        self.backend.step(&ctx);
        self.colliders_dirty = false;
    }

    fn refresh_positions(&mut self) {
        self.backend.read_positions(&mut self.positions);
        self.steps_since_readback = 0;
        let Some(baked) = self.baked.as_ref() else {
            return;
        };
        for (i, range) in baked.ranges.iter().enumerate() {
            if self.spawned[i] {
                if let Some(p) = self.positions.get(range.center_vertex as usize) {
                    self.body_positions[i] = *p;
                }
            }
        }
    }

    /// Reads every vertex position back from the device.
    pub fn read_positions(&mut self) -> &[Point3<f32>] {
        self.refresh_positions();
        &self.positions
    }

    /// The cached body-level position of an instance.
    ///
    /// Updated every `readback_interval` steps, so it lags the simulation
    /// by up to that many steps.
    pub fn instance_position(&self, instance: InstanceHandle) -> Option<Point3<f32>> {
        self.spawned
            .get(instance.0)
            .copied()
            .unwrap_or(false)
            .then(|| self.body_positions[instance.0])
    }

    /// Finds the active vertex closest to a ray, within `max_perp` of it.
    pub fn find_nearest_vertex(
        &mut self,
        origin: Point3<f32>,
        dir: Vector3<f32>,
        max_perp: f32,
    ) -> Option<PickedVertex> {
        self.refresh_positions();
        let baked = self.baked.as_ref()?;
        let dir = dir.normalize();
        let mut best: Option<PickedVertex> = None;
        let mut best_perp = max_perp;
        for (i, range) in baked.ranges.iter().enumerate() {
            if !self.spawned[i] {
                continue;
            }
            for v in range.first_vertex..range.first_vertex + range.vertex_count {
                let Some(p) = self.positions.get(v as usize).copied() else {
                    continue;
                };
                let rel = p - origin;
                let along = rel.dot(&dir);
                let perp = (rel - dir * along).norm();
                if perp <= best_perp {
                    best_perp = perp;
                    best = Some(PickedVertex {
                        vertex_id: v,
                        pos: p,
                        along_ray: along,
                    });
                }
            }
        }
        best
    }

    /// Starts dragging a vertex toward a target updated by
    /// [`Self::update_drag`].
    pub fn start_drag(&mut self, vertex_id: u32, strength: f32) {
        let target = self
            .positions
            .get(vertex_id as usize)
            .copied()
            .unwrap_or(Point3::origin());
        self.drag = DragParams {
            target_pos: [target.x, target.y, target.z, 0.0],
            vertex: vertex_id as i32,
            strength,
            enabled: 1,
            _pad: 0,
        };
    }

    /// Moves the drag target.
    pub fn update_drag(&mut self, target: Point3<f32>) {
        self.drag.target_pos = [target.x, target.y, target.z, 0.0];
    }

    /// Releases the dragged vertex.
    pub fn end_drag(&mut self) {
        self.drag.enabled = 0;
        self.drag.vertex = -1;
    }

    /// Applies a soft-radius impulse around a ray on the next steps.
    pub fn set_mouse_impulse(
        &mut self,
        origin: Point3<f32>,
        dir: Vector3<f32>,
        radius: f32,
        impulse: Vector3<f32>,
    ) {
        let dir = dir.normalize();
        self.mouse = MouseParams {
            origin: [origin.x, origin.y, origin.z, 0.0],
            dir: [dir.x, dir.y, dir.z, radius],
            impulse: [impulse.x, impulse.y, impulse.z, 0.0],
            enabled: 1,
            _pad: [0; 3],
        };
    }

    /// Stops applying the mouse impulse.
    pub fn clear_mouse(&mut self) {
        self.mouse.enabled = 0;
    }

    /// Render binding for an instance's attached surface, when running on a
    /// device backend and the geometry carries a surface.
    pub fn surface_binding(&self, instance: InstanceHandle) -> Option<SurfaceBinding<'_>> {
        let baked = self.baked.as_ref()?;
        let geometry = *self.instance_geometry.get(instance.0)?;
        let surface = self.models[geometry].surface.as_ref()?;
        let buffers = self.backend.render_buffers()?;
        let range = baked.ranges[instance.0];
        Some(SurfaceBinding {
            buffers,
            surface,
            first_tet: range.first_tet,
            first_vertex: range.first_vertex,
        })
    }
}
