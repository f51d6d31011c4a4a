//! End-to-end tetrahedralization scenarios.

mod common;

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tetmesh::bvh::TriangleBvh;
use tetmesh::geometry;
use tetmesh::msh::{parse_msh, serialize_msh, MshMesh};
use tetmesh::na::Point3;
use tetmesh::stats::{extract_surface, mesh_stats};
use tetmesh::{tetrahedralize, tetrahedralize_points, TetMeshOutput, TetOptions};

fn canonical_tets(tets: &[[u32; 4]]) -> Vec<[u32; 4]> {
    let mut out: Vec<[u32; 4]> = tets
        .iter()
        .map(|t| {
            let mut s = *t;
            s.sort_unstable();
            s
        })
        .collect();
    out.sort_unstable();
    out
}

fn total_unsigned_volume(mesh: &TetMeshOutput) -> f64 {
    mesh.tets
        .iter()
        .map(|t| {
            geometry::tet_volume(
                &mesh.vertices[t[0] as usize],
                &mesh.vertices[t[1] as usize],
                &mesh.vertices[t[2] as usize],
                &mesh.vertices[t[3] as usize],
            )
            .abs()
        })
        .sum()
}

#[test]
fn unit_icosphere_fills_the_ball() {
    let sphere = common::icosphere(1.0, 2);
    let opts = TetOptions {
        resolution: 8,
        min_quality: 0.001,
        verbose: false,
    };
    let mesh = tetrahedralize(&sphere, &opts);

    assert!(mesh.tet_count() >= 50, "only {} tets", mesh.tet_count());

    for t in &mesh.tets {
        let c = geometry::tet_centroid(
            &mesh.vertices[t[0] as usize],
            &mesh.vertices[t[1] as usize],
            &mesh.vertices[t[2] as usize],
            &mesh.vertices[t[3] as usize],
        );
        assert!(
            c.coords.norm() < 1.0,
            "centroid {c:?} escaped the unit sphere"
        );
    }

    let ball_volume = 4.0 * std::f64::consts::PI / 3.0;
    let total = total_unsigned_volume(&mesh);
    assert!(
        (total - ball_volume).abs() < ball_volume * 0.05,
        "volume {total} deviates from {ball_volume} by more than 5%"
    );

    // Quality filtering really applied.
    let stats = mesh_stats(&mesh.vertices, &mesh.tets);
    assert!(stats.min_quality >= opts.min_quality);
}

#[test]
fn every_face_is_shared_by_at_most_two_tets() {
    let sphere = common::icosphere(1.0, 1);
    let mesh = tetrahedralize(&sphere, &TetOptions::default());
    assert!(mesh.tet_count() > 0);

    let mut counts: HashMap<[u32; 3], u32> = HashMap::new();
    for t in &mesh.tets {
        for face in geometry::TET_FACES {
            let mut key = [t[face[0]], t[face[1]], t[face[2]]];
            key.sort_unstable();
            *counts.entry(key).or_insert(0) += 1;
        }
    }
    for (face, n) in &counts {
        assert!(*n <= 2, "face {face:?} appears {n} times");
    }

    let boundary = extract_surface(&mesh.tets);
    let once = counts.values().filter(|&&n| n == 1).count();
    assert_eq!(boundary.len(), once);
}

#[test]
fn interior_samples_stay_inside_and_off_the_boundary() {
    let sphere = common::icosphere(1.0, 2);
    let opts = TetOptions {
        resolution: 8,
        ..TetOptions::default()
    };
    let mesh = tetrahedralize(&sphere, &opts);
    let bvh = TriangleBvh::build(&sphere.vertices, &sphere.faces).unwrap();

    // Points after the deduplicated surface vertices are the grid samples.
    let n_surface = sphere.vertices.len();
    assert!(mesh.vertices.len() > n_surface, "no interior samples kept");
    let h = 2.0 / opts.resolution as f64;
    for sample in &mesh.vertices[n_surface..] {
        assert!(bvh.is_inside(sample));
        // Perturbation may nudge a sample by up to 1e-4 per coordinate.
        assert!(bvh.distance(sample) >= h / 2.0 - 1.0e-3);
    }
}

#[test]
fn cube_corners_tetrahedralize_to_five_or_six_tets() {
    let corners: Vec<Point3<f64>> = (0..8)
        .map(|i| {
            Point3::new(
                if i & 1 == 0 { -1.0 } else { 1.0 },
                if i & 2 == 0 { -1.0 } else { 1.0 },
                if i & 4 == 0 { -1.0 } else { 1.0 },
            )
        })
        .collect();
    let mesh = tetrahedralize_points(&corners, &TetOptions::default());

    assert!(
        (5..=6).contains(&mesh.tet_count()),
        "expected 5 or 6 tets, got {}",
        mesh.tet_count()
    );
    let total = total_unsigned_volume(&mesh);
    // The mandated 1e-4 perturbation wobbles the hull volume by O(1e-3).
    assert!((total - 8.0).abs() < 5.0e-3, "cube volume came out as {total}");
}

#[test]
fn degenerate_surface_falls_back_to_point_cloud_mode() {
    // All faces collapsed: no BVH can be built, vertices are still meshed.
    let surface = tetmesh::TriangleSurface {
        vertices: vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ],
        faces: vec![[0, 1, 2]],
    };
    let mesh = tetrahedralize(&surface, &TetOptions::default());
    assert_eq!(mesh.tet_count(), 1);
}

#[test]
fn msh_roundtrip_re_tetrahedralizes_identically() {
    let mut rng = StdRng::seed_from_u64(33);
    let cloud: Vec<Point3<f64>> = (0..33)
        .map(|_| {
            Point3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            )
        })
        .collect();
    let opts = TetOptions::default();
    let first = tetrahedralize_points(&cloud, &opts);
    assert!(first.tet_count() > 0);

    let text = serialize_msh(&MshMesh {
        nodes: first.vertices.clone(),
        tets: first.tets.clone(),
    });
    let parsed = parse_msh(&text).unwrap();
    assert_eq!(parsed.nodes.len(), 33);
    assert_eq!(canonical_tets(&parsed.tets), canonical_tets(&first.tets));

    // Meshing the round-tripped nodes again reproduces the same tet set.
    let second = tetrahedralize_points(&parsed.nodes, &opts);
    assert_eq!(second.tet_count(), first.tet_count());
    assert_eq!(canonical_tets(&second.tets), canonical_tets(&first.tets));
}
