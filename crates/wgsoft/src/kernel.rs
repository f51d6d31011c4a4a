//! Compute-kernel dispatch helpers.

use wgpu::{
    BindGroupEntry, Buffer, CommandEncoder, ComputePass, ComputePassDescriptor, ComputePipeline,
    Device,
};

/// Convenience extension for opening labelled compute passes.
pub trait CommandEncoderExt {
    /// Begins a compute pass with the given debug label.
    fn compute_pass(&mut self, label: &str) -> ComputePass<'_>;
}

impl CommandEncoderExt for CommandEncoder {
    fn compute_pass(&mut self, label: &str) -> ComputePass<'_> {
        self.begin_compute_pass(&ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        })
    }
}

/// Builder that binds buffers to a pipeline and dispatches it.
///
/// Bind groups are created on the fly from the pipeline's layout; buffers
/// bind in slot order within each group.
pub struct KernelDispatch<'a, 'b> {
    device: &'a Device,
    pass: &'a mut ComputePass<'b>,
    pipeline: &'a ComputePipeline,
}

impl<'a, 'b> KernelDispatch<'a, 'b> {
    /// Starts a dispatch of `pipeline` inside `pass`.
    pub fn new(device: &'a Device, pass: &'a mut ComputePass<'b>, pipeline: &'a ComputePipeline) -> Self {
        Self {
            device,
            pass,
            pipeline,
        }
    }

    /// Binds `buffers` to consecutive slots `0..` of bind group 0.
    pub fn bind0<const N: usize>(self, buffers: [&Buffer; N]) -> Self {
        self.bind(0, buffers)
    }

    /// Binds `buffers` to consecutive slots `0..` of the given bind group.
    pub fn bind<const N: usize>(self, group: u32, buffers: [&Buffer; N]) -> Self {
        let entries: Vec<BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .map(|(slot, buffer)| BindGroupEntry {
                binding: slot as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        self.bind_entries(group, &entries)
    }

    /// Binds `(buffer, slot)` pairs to the given bind group.
    pub fn bind_at<const N: usize>(self, group: u32, buffers: [(&Buffer, u32); N]) -> Self {
        let entries: Vec<BindGroupEntry> = buffers
            .iter()
            .map(|(buffer, slot)| BindGroupEntry {
                binding: *slot,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        self.bind_entries(group, &entries)
    }

    fn bind_entries(self, group: u32, entries: &[BindGroupEntry]) -> Self {
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout: &self.pipeline.get_bind_group_layout(group),
            entries,
        });
        self.pass.set_bind_group(group, &bind_group, &[]);
        self
    }

    /// Dispatches `num_workgroups` along x.
    pub fn dispatch(self, num_workgroups: u32) {
        self.pass.set_pipeline(self.pipeline);
        self.pass.dispatch_workgroups(num_workgroups.max(1), 1, 1);
    }
}
