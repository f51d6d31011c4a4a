//! Device bring-up sized for the solver's buffers.

use wgpu::{Device, Queue};

use crate::{grid, state};

/// A compute device and its queue, requested with storage limits large
/// enough for the simulation buffers the solver binds.
pub struct GpuInstance {
    device: Device,
    queue: Queue,
}

impl GpuInstance {
    /// Brings up a device sized for about a million vertices and tets,
    /// which fits inside wgpu's default limits.
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_capacity(1 << 20, 1 << 20).await
    }

    /// Brings up a device able to bind the buffers of a simulation with up
    /// to `max_vertices` vertex records and `max_tets` tet records.
    ///
    /// The largest bindings the solver creates are the vertex store, the
    /// tet store, the four-per-tet rest poses, and the hash-mode grid head
    /// table; the storage limits are raised to whichever of those is
    /// biggest. An adapter that cannot satisfy them fails the request.
    pub async fn with_capacity(max_vertices: u64, max_tets: u64) -> anyhow::Result<Self> {
        let vertex_bytes = max_vertices * state::vertex_layout().stride_bytes() as u64;
        let tet_bytes = max_tets * state::tet_layout().stride_bytes() as u64;
        let rest_pose_bytes = max_tets * 4 * state::rest_pose_layout().stride_bytes() as u64;
        let grid_bytes = (grid::HASH_TABLE_LEN * 4) as u64;
        let largest_binding = vertex_bytes
            .max(tet_bytes)
            .max(rest_pose_bytes)
            .max(grid_bytes);

        let defaults = wgpu::Limits::default();
        let limits = wgpu::Limits {
            max_storage_buffer_binding_size: defaults
                .max_storage_buffer_binding_size
                .max(u32::try_from(largest_binding).unwrap_or(u32::MAX)),
            max_buffer_size: defaults.max_buffer_size.max(largest_binding),
            ..defaults
        };

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                ..Default::default()
            })
            .await
            .map_err(|_| anyhow::anyhow!("no compatible gpu adapter"))?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("wgsoft"),
                required_features: wgpu::Features::empty(),
                required_limits: limits,
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| anyhow::anyhow!("device request failed: {e:?}"))?;

        Ok(Self { device, queue })
    }

    /// The device.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// The submission queue.
    pub fn queue(&self) -> &Queue {
        &self.queue
    }
}
