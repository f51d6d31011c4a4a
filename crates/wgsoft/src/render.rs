//! The binding surface a host renderer consumes.
//!
//! The simulator never reads positions back for rendering; instead it hands
//! out the device buffers plus the stride/offset information needed to bind
//! them, and the per-surface-vertex attachment tables. A renderer
//! reconstructs each surface vertex from its host tet's deformed corners
//! and rotates surface normals by the host tet's orientation quaternion.

use tetmesh::model::AttachedSurface;

/// Device buffers and layout info for binding deformed geometry.
pub struct RenderBuffers<'a> {
    /// Vertex records; positions live at `position_offset` within each
    /// `vertex_stride`-byte record.
    pub vertices: &'a wgpu::Buffer,
    /// Tet records; orientation quaternions live at `rotation_offset`
    /// within each `tet_stride`-byte record.
    pub tets: &'a wgpu::Buffer,
    /// Byte stride of one vertex record.
    pub vertex_stride: u64,
    /// Byte offset of the position inside a vertex record.
    pub position_offset: u64,
    /// Byte stride of one tet record.
    pub tet_stride: u64,
    /// Byte offset of the orientation quaternion inside a tet record.
    pub rotation_offset: u64,
}

/// Everything a renderer needs to draw one geometry's attached surface.
pub struct SurfaceBinding<'a> {
    /// Device buffers of the deformed state.
    pub buffers: RenderBuffers<'a>,
    /// The surface mesh with its host-tet/barycentric attachment.
    pub surface: &'a AttachedSurface,
    /// Offset added to the attachment's host-tet ids for this instance.
    pub first_tet: u32,
    /// Offset added to tet corner ids for this instance.
    pub first_vertex: u32,
}
