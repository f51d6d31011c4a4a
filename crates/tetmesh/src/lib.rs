//! Delaunay tetrahedralization of closed triangle surfaces and point clouds.
//!
//! The entry points are [`tetrahedralize`] for a closed triangulated surface
//! (interior points are sampled on a regular grid and classified with a
//! BVH-accelerated inside test) and [`tetrahedralize_points`] for a raw point
//! cloud. Both run incremental Bowyer–Watson insertion and post-filter the
//! result by tetrahedron quality and, in surface mode, by containment.
//!
//! The output of a tetrahedralization can be turned into a [`model::Model`]
//! (f32 vertices, deduplicated edges, optional surface attachment) suitable
//! for consumption by a real-time solver.

#![warn(missing_docs)]

pub extern crate nalgebra as na;

pub mod bvh;
pub mod delaunay;
pub mod geometry;
pub mod model;
pub mod msh;
pub mod stats;

pub use delaunay::{tetrahedralize, tetrahedralize_points, MeshPoint, TetMeshOutput, TetOptions};
pub use model::{attach_surface, Model, SurfaceAttachment, TriangleSurface};
