//! Shared model builders for integration tests.
#![allow(dead_code)] // not every suite uses every builder

use std::collections::HashMap;

use nalgebra::Point3;
use tetmesh::{tetrahedralize, Model, TetMeshOutput, TetOptions, TriangleSurface};

/// Corner offsets of a unit-ish cube in the order used by the 5-tet table.
fn cube_corners(half: f64) -> [[f64; 3]; 8] {
    let h = half;
    [
        [-h, -h, -h],
        [h, -h, -h],
        [h, h, -h],
        [-h, h, -h],
        [-h, -h, h],
        [h, -h, h],
        [h, h, h],
        [-h, h, h],
    ]
}

/// Five positively-oriented tets filling a cube with the corner order of
/// [`cube_corners`].
const CUBE_TETS: [[u32; 4]; 5] = [
    [0, 1, 3, 4],
    [1, 2, 3, 6],
    [1, 4, 5, 6],
    [3, 4, 6, 7],
    [1, 3, 4, 6],
];

/// A cube of side `2 * half` centred at the origin, split into five tets.
pub fn cube_model(half: f64) -> Model {
    let mesh = TetMeshOutput {
        vertices: cube_corners(half)
            .into_iter()
            .map(|[x, y, z]| Point3::new(x, y, z))
            .collect(),
        tets: CUBE_TETS.to_vec(),
        points: Vec::new(),
    };
    Model::from_tet_mesh(&mesh)
}

/// A vertical rope: `segments` stacked cubes of half-extent `half` sharing
/// their corner layers, bottom layer at y = 0.
pub fn rope_model(segments: usize, half: f64) -> Model {
    let h = half;
    let mut vertices = Vec::new();
    for layer in 0..=segments {
        let y = layer as f64 * 2.0 * h;
        vertices.push(Point3::new(-h, y, -h));
        vertices.push(Point3::new(h, y, -h));
        vertices.push(Point3::new(h, y, h));
        vertices.push(Point3::new(-h, y, h));
    }
    let mut tets = Vec::new();
    for cube in 0..segments {
        let b = (cube * 4) as u32;
        let t = b + 4;
        // Map the shared layers onto the cube corner numbering.
        let corner = [b, b + 1, t + 1, t, b + 3, b + 2, t + 2, t + 3];
        for tet in CUBE_TETS {
            tets.push([
                corner[tet[0] as usize],
                corner[tet[1] as usize],
                corner[tet[2] as usize],
                corner[tet[3] as usize],
            ]);
        }
    }
    let mesh = TetMeshOutput {
        vertices,
        tets,
        points: Vec::new(),
    };
    Model::from_tet_mesh(&mesh)
}

/// An icosphere surface of the given radius.
fn icosphere(radius: f64, detail: u32) -> TriangleSurface {
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
    .map(|[x, y, z]| Point3::from(nalgebra::Vector3::new(x, y, z).normalize() * radius))
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
        let mut cache: HashMap<(u32, u32), u32> = HashMap::new();
        let mut next = Vec::with_capacity(faces.len() * 4);
        for [a, b, c] in faces {
            let mut midpoint = |a: u32, b: u32, vertices: &mut Vec<Point3<f64>>| {
                let key = if a < b { (a, b) } else { (b, a) };
                *cache.entry(key).or_insert_with(|| {
                    let m = (vertices[a as usize].coords + vertices[b as usize].coords) / 2.0;
                    vertices.push(Point3::from(m.normalize() * radius));
                    vertices.len() as u32 - 1
                })
            };
            let ab = midpoint(a, b, &mut vertices);
            let bc = midpoint(b, c, &mut vertices);
            let ca = midpoint(c, a, &mut vertices);
            next.extend_from_slice(&[[a, ab, ca], [b, bc, ab], [c, ca, bc], [ab, bc, ca]]);
        }
        faces = next;
    }

    // Orient every face outward (the sphere is centred at the origin).
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

/// A softbody ball: an icosphere surface tetrahedralized with interior
/// sampling, so the tets (and thus the broadphase pushes) stay small.
pub fn sphere_model(radius: f64, detail: u32) -> Model {
    let mesh = tetrahedralize(
        &icosphere(radius, detail),
        &TetOptions {
            resolution: 6,
            ..TetOptions::default()
        },
    );
    assert!(mesh.tet_count() > 0, "sphere tetrahedralization came out empty");
    Model::from_tet_mesh(&mesh)
}
