//! Attaches a render surface to a tet mesh and packages both for a solver.
//!
//! Each surface vertex is hosted by the tet whose centroid is nearest and is
//! reconstructed at runtime from that tet's deformed corners through its
//! barycentric coordinates.

use na::{Point3, Vector3};

use crate::delaunay::TetMeshOutput;
use crate::geometry;

/// A triangle soup with shared vertices.
#[derive(Clone, Debug, Default)]
pub struct TriangleSurface {
    /// Vertex positions.
    pub vertices: Vec<Point3<f64>>,
    /// Triangles as vertex-id triples.
    pub faces: Vec<[u32; 3]>,
}

/// Per-surface-vertex attachment to a host tet.
#[derive(Clone, Debug)]
pub struct SurfaceAttachment {
    /// Host tet id per surface vertex.
    pub host_tets: Vec<u32>,
    /// Barycentric coordinates `(β1, β2, β3)` w.r.t. the host tet; the
    /// fourth coordinate is implicit.
    pub barycentric: Vec<[f32; 3]>,
}

/// A baked softbody geometry: f32 tet vertices, tet ids, deduplicated edges
/// and an optional surface attachment.
#[derive(Clone, Debug)]
pub struct Model {
    /// Tet vertex rest positions.
    pub vertices: Vec<Point3<f32>>,
    /// Tetrahedra as vertex-id 4-tuples.
    pub tets: Vec<[u32; 4]>,
    /// Unique tet edges, stored with the smaller id first.
    pub edges: Vec<[u32; 2]>,
    /// Render-surface attachment, if the model was built from a surface.
    pub surface: Option<AttachedSurface>,
}

/// The render surface attached to a [`Model`].
#[derive(Clone, Debug)]
pub struct AttachedSurface {
    /// Surface vertex rest positions.
    pub vertices: Vec<Point3<f32>>,
    /// Surface triangles.
    pub faces: Vec<[u32; 3]>,
    /// Host-tet and barycentric data per surface vertex.
    pub attachment: SurfaceAttachment,
}

/// Computes the host tet and barycentric coordinates for every surface
/// vertex: the host is the tet whose centroid is nearest to the vertex.
pub fn attach_surface(mesh: &TetMeshOutput, surface: &TriangleSurface) -> SurfaceAttachment {
    let centroids: Vec<Point3<f64>> = mesh
        .tets
        .iter()
        .map(|t| {
            geometry::tet_centroid(
                &mesh.vertices[t[0] as usize],
                &mesh.vertices[t[1] as usize],
                &mesh.vertices[t[2] as usize],
                &mesh.vertices[t[3] as usize],
            )
        })
        .collect();

    let mut host_tets = Vec::with_capacity(surface.vertices.len());
    let mut barycentric = Vec::with_capacity(surface.vertices.len());
    for v in &surface.vertices {
        let mut best = 0usize;
        let mut best_d = f64::INFINITY;
        for (t, c) in centroids.iter().enumerate() {
            let d = (v - c).norm_squared();
            if d < best_d {
                best_d = d;
                best = t;
            }
        }
        let ids = mesh.tets[best];
        let bc: Vector3<f64> = geometry::barycentric(
            v,
            &mesh.vertices[ids[0] as usize],
            &mesh.vertices[ids[1] as usize],
            &mesh.vertices[ids[2] as usize],
            &mesh.vertices[ids[3] as usize],
        );
        host_tets.push(best as u32);
        barycentric.push([bc.x as f32, bc.y as f32, bc.z as f32]);
    }
    SurfaceAttachment {
        host_tets,
        barycentric,
    }
}

/// Collects the unique edges of a tet set, smaller vertex id first.
pub fn collect_edges(tets: &[[u32; 4]]) -> Vec<[u32; 2]> {
    let mut seen = std::collections::HashSet::new();
    let mut edges = Vec::new();
    for t in tets {
        for [a, b] in geometry::TET_EDGES {
            let (lo, hi) = if t[a] < t[b] { (t[a], t[b]) } else { (t[b], t[a]) };
            if seen.insert((lo, hi)) {
                edges.push([lo, hi]);
            }
        }
    }
    edges
}

impl Model {
    /// Builds a model from a tetrahedralization, without a render surface.
    pub fn from_tet_mesh(mesh: &TetMeshOutput) -> Self {
        Self {
            vertices: mesh
                .vertices
                .iter()
                .map(|v| Point3::new(v.x as f32, v.y as f32, v.z as f32))
                .collect(),
            tets: mesh.tets.clone(),
            edges: collect_edges(&mesh.tets),
            surface: None,
        }
    }

    /// Builds a model and attaches `surface` to it for rendering.
    pub fn with_surface(mesh: &TetMeshOutput, surface: &TriangleSurface) -> Self {
        let mut model = Self::from_tet_mesh(mesh);
        model.surface = Some(AttachedSurface {
            vertices: surface
                .vertices
                .iter()
                .map(|v| Point3::new(v.x as f32, v.y as f32, v.z as f32))
                .collect(),
            faces: surface.faces.clone(),
            attachment: attach_surface(mesh, surface),
        });
        model
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::delaunay::{tetrahedralize_points, TetOptions};
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn edges_are_unique_and_sorted() {
        let tets = [[0, 1, 2, 3], [1, 2, 3, 4]];
        let edges = collect_edges(&tets);
        assert_eq!(edges.len(), 9);
        let mut seen = std::collections::HashSet::new();
        for [a, b] in &edges {
            assert!(a < b);
            assert!(seen.insert((*a, *b)));
        }
    }

    #[test]
    fn surface_vertices_reconstruct_from_their_host_tet() {
        let mut rng = StdRng::seed_from_u64(5);
        let cloud: Vec<_> = (0..60)
            .map(|_| {
                Point3::new(
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                )
            })
            .collect();
        let mesh = tetrahedralize_points(&cloud, &TetOptions::default());
        assert!(mesh.tet_count() > 0);

        // Probe points well inside the hull reconstruct exactly.
        let surface = TriangleSurface {
            vertices: vec![
                Point3::new(0.1, 0.05, -0.1),
                Point3::new(-0.2, 0.1, 0.2),
                Point3::new(0.0, -0.15, 0.05),
            ],
            faces: vec![[0, 1, 2]],
        };
        let attachment = attach_surface(&mesh, &surface);
        for (v, (&host, bc)) in surface
            .vertices
            .iter()
            .zip(attachment.host_tets.iter().zip(&attachment.barycentric))
        {
            let ids = mesh.tets[host as usize];
            let p0 = mesh.vertices[ids[0] as usize];
            let p1 = mesh.vertices[ids[1] as usize];
            let p2 = mesh.vertices[ids[2] as usize];
            let p3 = mesh.vertices[ids[3] as usize];
            let rebuilt = p0
                + (p1 - p0) * bc[0] as f64
                + (p2 - p0) * bc[1] as f64
                + (p3 - p0) * bc[2] as f64;
            assert_relative_eq!(rebuilt, *v, epsilon = 1.0e-4);
        }
    }
}
