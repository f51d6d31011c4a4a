//! Typed wrappers over gpu storage buffers.

use std::marker::PhantomData;

use bytemuck::Pod;
use wgpu::util::DeviceExt;
use wgpu::{Buffer, BufferUsages, CommandEncoder, Device, Queue};

/// A gpu buffer holding a dense array of `T`.
pub struct GpuVector<T> {
    buffer: Buffer,
    len: usize,
    _phantom: PhantomData<T>,
}

impl<T: Pod> GpuVector<T> {
    /// Allocates a buffer initialized with `data`.
    pub fn init(device: &Device, data: &[T], usage: BufferUsages) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: None,
            contents: bytemuck::cast_slice(data),
            usage,
        });
        Self {
            buffer,
            len: data.len(),
            _phantom: PhantomData,
        }
    }

    /// Allocates an uninitialized (zeroed) buffer for `len` elements.
    pub fn uninit(device: &Device, len: usize, usage: BufferUsages) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: None,
            size: (len.max(1) * std::mem::size_of::<T>()) as u64,
            usage,
            mapped_at_creation: false,
        });
        Self {
            buffer,
            len,
            _phantom: PhantomData,
        }
    }

    /// The underlying buffer.
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` if this buffer holds no element.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Overwrites elements starting at `offset` through the queue.
    pub fn write(&self, queue: &Queue, offset: usize, data: &[T]) {
        queue.write_buffer(
            &self.buffer,
            (offset * std::mem::size_of::<T>()) as u64,
            bytemuck::cast_slice(data),
        );
    }

    /// Enqueues a full copy of `self` into `staging`.
    pub fn copy_to(&self, encoder: &mut CommandEncoder, staging: &GpuVector<T>) {
        encoder.copy_buffer_to_buffer(
            &self.buffer,
            0,
            &staging.buffer,
            0,
            (self.len * std::mem::size_of::<T>()) as u64,
        );
    }

    /// Blocks until the (mappable) buffer content can be read, then copies it
    /// into `out`.
    ///
    /// `self` must have been created with `MAP_READ | COPY_DST` and be the
    /// target of a submitted copy.
    pub fn read_to(&self, device: &Device, out: &mut [T]) -> anyhow::Result<()> {
        let slice = self.buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| anyhow::anyhow!("device poll failed: {e:?}"))?;
        receiver.recv()??;
        {
            let view = slice.get_mapped_range();
            let data: &[T] = bytemuck::cast_slice(&view);
            out.copy_from_slice(&data[..out.len()]);
        }
        self.buffer.unmap();
        Ok(())
    }
}

/// A gpu buffer holding a single `T`, typically bound as a uniform.
pub struct GpuScalar<T> {
    buffer: Buffer,
    _phantom: PhantomData<T>,
}

impl<T: Pod> GpuScalar<T> {
    /// Allocates a single-element buffer initialized with `value`.
    pub fn init(device: &Device, value: T, usage: BufferUsages) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: None,
            contents: bytemuck::bytes_of(&value),
            usage,
        });
        Self {
            buffer,
            _phantom: PhantomData,
        }
    }

    /// The underlying buffer.
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Overwrites the value through the queue.
    pub fn write(&self, queue: &Queue, value: &T) {
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(value));
    }
}
