//! Shared geometry builders for integration tests.

use std::collections::HashMap;

use tetmesh::na::Point3;
use tetmesh::TriangleSurface;

/// Builds a unit icosphere: an icosahedron subdivided `detail` times with
/// every vertex projected back onto the sphere of the given radius.
pub fn icosphere(radius: f64, detail: u32) -> TriangleSurface {
    let t = (1.0 + 5.0f64.sqrt()) / 2.0;
    let mut vertices: Vec<Point3<f64>> = [
        [-1.0, t, 0.0],
        [1.0, t, 0.0],
        [-1.0, -t, 0.0],
        [1.0, -t, 0.0],
        [0.0, -1.0, t],
        [0.0, 1.0, t],
        [0.0, -1.0, -t],
        [0.0, 1.0, -t],
        [t, 0.0, -1.0],
        [t, 0.0, 1.0],
        [-t, 0.0, -1.0],
        [-t, 0.0, 1.0],
    ]
    .into_iter()
    .map(|[x, y, z]| {
        let p = Point3::new(x, y, z);
        Point3::from(p.coords.normalize() * radius)
    })
    .collect();

    let mut faces: Vec<[u32; 3]> = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];

    for _ in 0..detail {
        let mut midpoints: HashMap<(u32, u32), u32> = HashMap::new();
        let mut next = Vec::with_capacity(faces.len() * 4);
        for [a, b, c] in faces {
            let ab = midpoint(&mut vertices, &mut midpoints, a, b, radius);
            let bc = midpoint(&mut vertices, &mut midpoints, b, c, radius);
            let ca = midpoint(&mut vertices, &mut midpoints, c, a, radius);
            next.extend_from_slice(&[[a, ab, ca], [b, bc, ab], [c, ca, bc], [ab, bc, ca]]);
        }
        faces = next;
    }

    // Orient every face outward (the sphere is centered at the origin).
    for face in &mut faces {
        let a = vertices[face[0] as usize];
        let b = vertices[face[1] as usize];
        let c = vertices[face[2] as usize];
        let n = (b - a).cross(&(c - a));
        let center = (a.coords + b.coords + c.coords) / 3.0;
        if n.dot(&center) < 0.0 {
            face.swap(1, 2);
        }
    }

    TriangleSurface { vertices, faces }
}

fn midpoint(
    vertices: &mut Vec<Point3<f64>>,
    cache: &mut HashMap<(u32, u32), u32>,
    a: u32,
    b: u32,
    radius: f64,
) -> u32 {
    let key = if a < b { (a, b) } else { (b, a) };
    *cache.entry(key).or_insert_with(|| {
        let m = (vertices[a as usize].coords + vertices[b as usize].coords) / 2.0;
        vertices.push(Point3::from(m.normalize() * radius));
        vertices.len() as u32 - 1
    })
}
