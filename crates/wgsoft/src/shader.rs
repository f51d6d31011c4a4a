//! Shader-source composition and pipeline creation.
//!
//! Kernels are written as WGSL snippets that reference shared structs and
//! helper functions; a module is produced by concatenating the generated
//! struct declarations with the snippets it needs. WGSL resolves
//! module-scope declarations in any order, so snippet order is free.

use wgpu::{ComputePipeline, Device, ShaderModule};

use crate::state::structs_wgsl;

/// Concatenates WGSL sources into one module source.
pub fn compose(sources: &[&str]) -> String {
    sources.join("\n")
}

/// Source of the solver module: substep kernels, broadphase, interaction
/// passes; the grid binds as a plain view.
pub fn solver_module_source() -> String {
    compose(&[
        &structs_wgsl(),
        include_str!("../shaders/types.wgsl"),
        include_str!("../shaders/grid.wgsl"),
        include_str!("../shaders/collider.wgsl"),
        include_str!("../shaders/solver.wgsl"),
    ])
}

/// Source of the tet-update module; the grid binds as an atomic view.
pub fn update_module_source() -> String {
    compose(&[
        &structs_wgsl(),
        include_str!("../shaders/types.wgsl"),
        include_str!("../shaders/quat.wgsl"),
        include_str!("../shaders/grid.wgsl"),
        include_str!("../shaders/update.wgsl"),
    ])
}

/// Source of the instance-reset module.
pub fn reset_module_source() -> String {
    compose(&[
        &structs_wgsl(),
        include_str!("../shaders/types.wgsl"),
        include_str!("../shaders/reset.wgsl"),
    ])
}

/// Compiles a WGSL module.
pub fn load_module(device: &Device, label: &str, source: &str) -> ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    })
}

/// Creates a compute pipeline for one entry point, with the bind-group
/// layout derived from the shader.
pub fn compute_pipeline(device: &Device, module: &ShaderModule, entry: &str) -> ComputePipeline {
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(entry),
        layout: None,
        module,
        entry_point: Some(entry),
        compilation_options: Default::default(),
        cache: None,
    })
}
