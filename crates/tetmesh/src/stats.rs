//! Debug-time helpers: tet-mesh statistics and boundary-surface extraction.

use std::collections::HashMap;

use na::Point3;

use crate::geometry::{self, TET_FACES};

/// Aggregate statistics over a tet mesh.
#[derive(Copy, Clone, Debug, Default)]
pub struct MeshStats {
    /// Number of tetrahedra.
    pub tet_count: usize,
    /// Sum of unsigned tet volumes.
    pub total_volume: f64,
    /// Smallest quality magnitude.
    pub min_quality: f64,
    /// Largest quality magnitude.
    pub max_quality: f64,
    /// Mean quality magnitude.
    pub avg_quality: f64,
}

/// Computes volume and quality statistics for a tet mesh.
pub fn mesh_stats(vertices: &[Point3<f64>], tets: &[[u32; 4]]) -> MeshStats {
    if tets.is_empty() {
        return MeshStats::default();
    }
    let mut stats = MeshStats {
        tet_count: tets.len(),
        min_quality: f64::INFINITY,
        ..Default::default()
    };
    for t in tets {
        let p0 = &vertices[t[0] as usize];
        let p1 = &vertices[t[1] as usize];
        let p2 = &vertices[t[2] as usize];
        let p3 = &vertices[t[3] as usize];
        stats.total_volume += geometry::tet_volume(p0, p1, p2, p3).abs();
        let q = geometry::tet_quality(p0, p1, p2, p3).abs();
        stats.min_quality = stats.min_quality.min(q);
        stats.max_quality = stats.max_quality.max(q);
        stats.avg_quality += q;
    }
    stats.avg_quality /= tets.len() as f64;
    stats
}

/// Extracts the boundary surface of a tet mesh: the faces that appear in
/// exactly one tetrahedron, wound outward per the canonical face table.
pub fn extract_surface(tets: &[[u32; 4]]) -> Vec<[u32; 3]> {
    let mut counts: HashMap<[u32; 3], ([u32; 3], u32)> = HashMap::new();
    for t in tets {
        for face in TET_FACES {
            let tri = [t[face[0]], t[face[1]], t[face[2]]];
            let mut key = tri;
            key.sort_unstable();
            counts
                .entry(key)
                .and_modify(|(_, n)| *n += 1)
                .or_insert((tri, 1));
        }
    }
    let mut boundary: Vec<[u32; 3]> = counts
        .into_values()
        .filter_map(|(tri, n)| (n == 1).then_some(tri))
        .collect();
    boundary.sort_unstable();
    boundary
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn single_tet_stats() {
        let vertices = vec![
            Point3::origin(),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ];
        let stats = mesh_stats(&vertices, &[[0, 1, 2, 3]]);
        assert_eq!(stats.tet_count, 1);
        assert_relative_eq!(stats.total_volume, 1.0 / 6.0, epsilon = 1.0e-12);
        assert_relative_eq!(stats.min_quality, stats.max_quality);
    }

    #[test]
    fn single_tet_boundary_is_all_four_faces() {
        let boundary = extract_surface(&[[0, 1, 2, 3]]);
        assert_eq!(boundary.len(), 4);
    }

    #[test]
    fn shared_face_is_interior() {
        // Two tets glued across face (1, 2, 3).
        let tets = [[0, 1, 2, 3], [4, 2, 1, 3]];
        let boundary = extract_surface(&tets);
        assert_eq!(boundary.len(), 6);
        for tri in &boundary {
            let mut key = *tri;
            key.sort_unstable();
            assert_ne!(key, [1, 2, 3], "shared face leaked into the boundary");
        }
    }
}
