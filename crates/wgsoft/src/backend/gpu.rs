//! wgpu implementation of the compute backend.
//!
//! One compute pipeline per kernel entry point; bind-group layouts are
//! derived from the shaders, so every dispatch binds exactly the slots its
//! kernel statically uses. All dispatches of one physics step are recorded
//! into a single compute pass; pass ordering provides the inter-kernel
//! barriers.

use bytemuck::Zeroable;
use nalgebra::Point3;
use wgpu::{BufferUsages, ComputePipeline, Device, Queue};

use super::{Backend, StepContext};
use crate::gpu::GpuInstance;
use crate::kernel::{CommandEncoderExt, KernelDispatch};
use crate::params::{GpuAnchor, ResetParams, SimParams, MAX_ANCHORS};
use crate::render::RenderBuffers;
use crate::shader::{
    compute_pipeline, load_module, reset_module_source, solver_module_source,
    update_module_source,
};
use crate::state::BakeBuffers;
use crate::tensor::{GpuScalar, GpuVector};

const WORKGROUP_SIZE: u32 = 64;

struct Pipelines {
    integrate: ComputePipeline,
    solve_edges: ComputePipeline,
    solve_volumes: ComputePipeline,
    post_collide: ComputePipeline,
    apply_drag: ComputePipeline,
    grid_clear: ComputePipeline,
    update_tets: ComputePipeline,
    broadphase: ComputePipeline,
    apply_mouse: ComputePipeline,
    apply_anchors: ComputePipeline,
    reset_vertices: ComputePipeline,
    reset_tets: ComputePipeline,
}

struct GpuBuffers {
    params: GpuScalar<SimParams>,
    vertices: GpuVector<u32>,
    tets: GpuVector<u32>,
    rest_poses: GpuVector<u32>,
    edges: GpuVector<u32>,
    instances: GpuVector<u32>,
    colliders: GpuVector<crate::collider::GpuCollider>,
    collider_aux: GpuVector<f32>,
    grid: GpuVector<i32>,
    anchors: GpuScalar<[GpuAnchor; MAX_ANCHORS]>,
    drag: GpuScalar<crate::params::DragParams>,
    mouse: GpuScalar<crate::params::MouseParams>,
    reset: GpuScalar<ResetParams>,
    staging: GpuVector<u32>,

    num_vertices: u32,
    num_edges: u32,
    num_tets: u32,
    grid_len: u32,
    vertex_stride: usize,
    pos_offset: usize,
    instance_stride: usize,
    size_offset: usize,
    tet_stride: usize,
    rot_offset: usize,
}

/// GPU implementation of [`Backend`].
pub struct GpuBackend {
    device: Device,
    queue: Queue,
    pipelines: Option<Pipelines>,
    buffers: Option<GpuBuffers>,
}

impl GpuBackend {
    /// Creates a backend on the given device.
    pub fn new(gpu: &GpuInstance) -> Self {
        Self {
            device: gpu.device().clone(),
            queue: gpu.queue().clone(),
            pipelines: None,
            buffers: None,
        }
    }

    fn build_pipelines(device: &Device) -> Pipelines {
        let solver = load_module(device, "wgsoft_solver", &solver_module_source());
        let update = load_module(device, "wgsoft_update", &update_module_source());
        let reset = load_module(device, "wgsoft_reset", &reset_module_source());

        Pipelines {
            integrate: compute_pipeline(device, &solver, "integrate"),
            solve_edges: compute_pipeline(device, &solver, "solve_edges"),
            solve_volumes: compute_pipeline(device, &solver, "solve_volumes"),
            post_collide: compute_pipeline(device, &solver, "post_collide"),
            apply_drag: compute_pipeline(device, &solver, "apply_drag"),
            grid_clear: compute_pipeline(device, &solver, "grid_clear"),
            broadphase: compute_pipeline(device, &solver, "broadphase"),
            apply_mouse: compute_pipeline(device, &solver, "apply_mouse"),
            apply_anchors: compute_pipeline(device, &solver, "apply_anchors"),
            update_tets: compute_pipeline(device, &update, "update_tets"),
            reset_vertices: compute_pipeline(device, &reset, "reset_vertices"),
            reset_tets: compute_pipeline(device, &reset, "reset_tets"),
        }
    }

    /// wgpu rejects bindings smaller than one shader-side record, so empty
    /// buffers are padded to a single zeroed record.
    fn init_words(
        device: &Device,
        words: &[u32],
        min_words: usize,
        usage: BufferUsages,
    ) -> GpuVector<u32> {
        if words.len() < min_words {
            let mut padded = words.to_vec();
            padded.resize(min_words, 0);
            GpuVector::init(device, &padded, usage)
        } else {
            GpuVector::init(device, words, usage)
        }
    }
}

impl Backend for GpuBackend {
    fn bake(&mut self, bake: &BakeBuffers) -> anyhow::Result<()> {
        let device = &self.device;
        self.pipelines = Some(Self::build_pipelines(device));

        let storage = BufferUsages::STORAGE | BufferUsages::COPY_DST;
        let uniform = BufferUsages::UNIFORM | BufferUsages::COPY_DST;

        let vertex_layout = bake.vertices.layout();
        let instance_layout = bake.instances.layout();
        let tet_layout = bake.tets.layout();

        self.buffers = Some(GpuBuffers {
            params: GpuScalar::init(device, SimParams::zeroed(), uniform),
            vertices: Self::init_words(
                device,
                bake.vertices.words(),
                vertex_layout.stride(),
                storage | BufferUsages::COPY_SRC,
            ),
            tets: Self::init_words(device, bake.tets.words(), tet_layout.stride(), storage),
            rest_poses: Self::init_words(
                device,
                bake.rest_poses.words(),
                bake.rest_poses.layout().stride(),
                storage,
            ),
            edges: Self::init_words(
                device,
                bake.edges.words(),
                bake.edges.layout().stride(),
                storage,
            ),
            instances: Self::init_words(
                device,
                bake.instances.words(),
                instance_layout.stride(),
                storage,
            ),
            colliders: GpuVector::init(
                device,
                &[crate::collider::GpuCollider::default()],
                storage,
            ),
            collider_aux: GpuVector::init(device, &[0.0f32], storage),
            grid: GpuVector::uninit(device, bake.grid.table_len(), BufferUsages::STORAGE),
            anchors: GpuScalar::init(device, [GpuAnchor::default(); MAX_ANCHORS], uniform),
            drag: GpuScalar::init(device, Default::default(), uniform),
            mouse: GpuScalar::init(device, Default::default(), uniform),
            reset: GpuScalar::init(device, ResetParams::zeroed(), uniform),
            staging: GpuVector::uninit(
                device,
                bake.vertices.words().len().max(1),
                BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            ),
            num_vertices: bake.vertices.len() as u32,
            num_edges: bake.edges.len() as u32,
            num_tets: bake.tets.len() as u32,
            grid_len: bake.grid.table_len() as u32,
            vertex_stride: vertex_layout.stride(),
            pos_offset: vertex_layout.field("pos").offset,
            instance_stride: instance_layout.stride(),
            size_offset: instance_layout.field("size").offset,
            tet_stride: tet_layout.stride(),
            rot_offset: tet_layout.field("rot").offset,
        });
        Ok(())
    }

    fn step(&mut self, ctx: &StepContext<'_>) {
        let (Some(bufs), Some(pipes)) = (&mut self.buffers, &self.pipelines) else {
            return;
        };
        bufs.params.write(&self.queue, &ctx.params);
        bufs.drag.write(&self.queue, &ctx.drag);
        bufs.mouse.write(&self.queue, &ctx.mouse);
        bufs.anchors.write(&self.queue, &ctx.anchors);
        if ctx.colliders_dirty {
            if ctx.colliders.len() > bufs.colliders.len()
                || ctx.collider_aux.len() > bufs.collider_aux.len()
            {
                // Collider count grew since bake; reallocate.
                let storage = BufferUsages::STORAGE | BufferUsages::COPY_DST;
                if !ctx.colliders.is_empty() {
                    bufs.colliders = GpuVector::init(&self.device, ctx.colliders, storage);
                }
                if !ctx.collider_aux.is_empty() {
                    bufs.collider_aux = GpuVector::init(&self.device, ctx.collider_aux, storage);
                }
            } else {
                if !ctx.colliders.is_empty() {
                    bufs.colliders.write(&self.queue, 0, ctx.colliders);
                }
                if !ctx.collider_aux.is_empty() {
                    bufs.collider_aux.write(&self.queue, 0, ctx.collider_aux);
                }
            }
        }

        let vwg = bufs.num_vertices.div_ceil(WORKGROUP_SIZE);
        let ewg = bufs.num_edges.div_ceil(WORKGROUP_SIZE);
        let twg = bufs.num_tets.div_ceil(WORKGROUP_SIZE);
        let gwg = bufs.grid_len.div_ceil(WORKGROUP_SIZE);

        let mut encoder = self.device.create_command_encoder(&Default::default());
        let mut pass = encoder.compute_pass("wgsoft_step");

        for _ in 0..ctx.num_substeps {
            KernelDispatch::new(&self.device, &mut pass, &pipes.integrate)
                .bind_at(
                    0,
                    [
                        (bufs.params.buffer(), 0),
                        (bufs.vertices.buffer(), 1),
                        (bufs.instances.buffer(), 5),
                        (bufs.collider_aux.buffer(), 6),
                        (bufs.colliders.buffer(), 7),
                    ],
                )
                .dispatch(vwg);
            KernelDispatch::new(&self.device, &mut pass, &pipes.solve_edges)
                .bind_at(
                    0,
                    [
                        (bufs.params.buffer(), 0),
                        (bufs.vertices.buffer(), 1),
                        (bufs.edges.buffer(), 4),
                        (bufs.instances.buffer(), 5),
                    ],
                )
                .dispatch(ewg);
            KernelDispatch::new(&self.device, &mut pass, &pipes.solve_volumes)
                .bind_at(
                    0,
                    [
                        (bufs.params.buffer(), 0),
                        (bufs.vertices.buffer(), 1),
                        (bufs.tets.buffer(), 2),
                        (bufs.instances.buffer(), 5),
                    ],
                )
                .dispatch(twg);
            KernelDispatch::new(&self.device, &mut pass, &pipes.post_collide)
                .bind_at(
                    0,
                    [
                        (bufs.params.buffer(), 0),
                        (bufs.vertices.buffer(), 1),
                        (bufs.instances.buffer(), 5),
                        (bufs.collider_aux.buffer(), 6),
                        (bufs.colliders.buffer(), 7),
                    ],
                )
                .dispatch(vwg);
            if ctx.drag.enabled != 0 {
                KernelDispatch::new(&self.device, &mut pass, &pipes.apply_drag)
                    .bind_at(0, [(bufs.vertices.buffer(), 1), (bufs.drag.buffer(), 10)])
                    .dispatch(1);
            }
        }

        KernelDispatch::new(&self.device, &mut pass, &pipes.grid_clear)
            .bind_at(0, [(bufs.grid.buffer(), 8)])
            .dispatch(gwg);
        KernelDispatch::new(&self.device, &mut pass, &pipes.update_tets)
            .bind_at(
                0,
                [
                    (bufs.params.buffer(), 0),
                    (bufs.vertices.buffer(), 1),
                    (bufs.tets.buffer(), 2),
                    (bufs.rest_poses.buffer(), 3),
                    (bufs.instances.buffer(), 5),
                    (bufs.grid.buffer(), 8),
                ],
            )
            .dispatch(twg);
        KernelDispatch::new(&self.device, &mut pass, &pipes.broadphase)
            .bind_at(
                0,
                [
                    (bufs.params.buffer(), 0),
                    (bufs.vertices.buffer(), 1),
                    (bufs.tets.buffer(), 2),
                    (bufs.instances.buffer(), 5),
                    (bufs.grid.buffer(), 8),
                ],
            )
            .dispatch(twg);
        if ctx.mouse.enabled != 0 {
            KernelDispatch::new(&self.device, &mut pass, &pipes.apply_mouse)
                .bind_at(
                    0,
                    [
                        (bufs.params.buffer(), 0),
                        (bufs.vertices.buffer(), 1),
                        (bufs.instances.buffer(), 5),
                        (bufs.mouse.buffer(), 11),
                    ],
                )
                .dispatch(vwg);
        }
        if ctx.params.num_anchors != 0 {
            KernelDispatch::new(&self.device, &mut pass, &pipes.apply_anchors)
                .bind_at(
                    0,
                    [
                        (bufs.params.buffer(), 0),
                        (bufs.vertices.buffer(), 1),
                        (bufs.instances.buffer(), 5),
                        (bufs.anchors.buffer(), 9),
                    ],
                )
                .dispatch(vwg);
        }

        drop(pass);
        self.queue.submit(Some(encoder.finish()));
    }

    fn reset_instance(&mut self, params: &ResetParams) {
        let (Some(bufs), Some(pipes)) = (&self.buffers, &self.pipelines) else {
            return;
        };
        bufs.reset.write(&self.queue, params);

        let mut encoder = self.device.create_command_encoder(&Default::default());
        let mut pass = encoder.compute_pass("wgsoft_reset");
        KernelDispatch::new(&self.device, &mut pass, &pipes.reset_vertices)
            .bind_at(
                0,
                [
                    (bufs.reset.buffer(), 0),
                    (bufs.vertices.buffer(), 1),
                    (bufs.instances.buffer(), 5),
                ],
            )
            .dispatch(params.vertex_count.div_ceil(WORKGROUP_SIZE));
        KernelDispatch::new(&self.device, &mut pass, &pipes.reset_tets)
            .bind_at(
                0,
                [
                    (bufs.reset.buffer(), 0),
                    (bufs.vertices.buffer(), 1),
                    (bufs.tets.buffer(), 2),
                    (bufs.rest_poses.buffer(), 3),
                ],
            )
            .dispatch(params.tet_count.div_ceil(WORKGROUP_SIZE));
        drop(pass);
        self.queue.submit(Some(encoder.finish()));
    }

    fn write_instance_size(&mut self, object_id: u32, size: f32) {
        if let Some(bufs) = &self.buffers {
            let word = object_id as usize * bufs.instance_stride + bufs.size_offset;
            bufs.instances.write(&self.queue, word, &[size.to_bits()]);
        }
    }

    fn read_positions(&mut self, out: &mut Vec<Point3<f32>>) {
        out.clear();
        let Some(bufs) = &self.buffers else {
            return;
        };
        let mut encoder = self.device.create_command_encoder(&Default::default());
        bufs.vertices.copy_to(&mut encoder, &bufs.staging);
        self.queue.submit(Some(encoder.finish()));

        let mut words = vec![0u32; bufs.vertices.len()];
        if let Err(err) = bufs.staging.read_to(&self.device, &mut words) {
            log::error!("position readback failed: {err}");
            return;
        }
        out.reserve(bufs.num_vertices as usize);
        for i in 0..bufs.num_vertices as usize {
            let base = i * bufs.vertex_stride + bufs.pos_offset;
            out.push(Point3::new(
                f32::from_bits(words[base]),
                f32::from_bits(words[base + 1]),
                f32::from_bits(words[base + 2]),
            ));
        }
    }

    fn render_buffers(&self) -> Option<RenderBuffers<'_>> {
        let bufs = self.buffers.as_ref()?;
        Some(RenderBuffers {
            vertices: bufs.vertices.buffer(),
            tets: bufs.tets.buffer(),
            vertex_stride: bufs.vertex_stride as u64 * 4,
            position_offset: bufs.pos_offset as u64 * 4,
            tet_stride: bufs.tet_stride as u64 * 4,
            rotation_offset: bufs.rot_offset as u64 * 4,
        })
    }
}
