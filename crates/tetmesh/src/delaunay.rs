//! Incremental Bowyer–Watson Delaunay tetrahedralization.
//!
//! Points are inserted one by one into a bounding super-tetrahedron: a walk
//! locates the containing tet, a flood fill collects every tet whose open
//! circumsphere contains the new point (the cavity), the cavity is carved
//! out, and the hole is re-tiled with a fan of new tets around the point.
//!
//! Tets live in a dense arena of parallel arrays with four neighbour slots
//! each (one per face of [`geometry::TET_FACES`]). Deletion is soft: slot 0
//! of the vertex tuple becomes `-1` and slot 1 threads the free list.

use std::collections::HashSet;

use na::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::bvh::TriangleBvh;
use crate::geometry::{self, TET_FACES};
use crate::model::TriangleSurface;

/// Coordinates are merged when equal at this many decimals.
const DEDUP_DECIMALS: f64 = 1.0e6;
/// Isotropic jitter applied per coordinate to break degeneracies.
const PERTURBATION: f64 = 1.0e-4;
/// Super-tet vertices are placed at this multiple of the cloud radius.
const SUPER_TET_SCALE: f64 = 5.0;

/// Options controlling tetrahedralization.
#[derive(Copy, Clone, Debug)]
pub struct TetOptions {
    /// Number of interior-sampling grid cells along the largest AABB extent.
    /// Zero disables interior sampling (surface vertices only).
    pub resolution: u32,
    /// Tets whose quality magnitude falls below this are discarded.
    pub min_quality: f64,
    /// Emit per-stage progress and degeneracy reports at `info` level.
    pub verbose: bool,
}

impl Default for TetOptions {
    fn default() -> Self {
        Self {
            resolution: 16,
            min_quality: 1.0e-3,
            verbose: false,
        }
    }
}

/// A point fed to the tetrahedralizer, after deduplication and perturbation.
#[derive(Copy, Clone, Debug)]
pub struct MeshPoint {
    /// Perturbed position.
    pub pos: Point3<f64>,
    /// Index into the output vertex array.
    pub id: u32,
}

/// Result of a tetrahedralization: a dense vertex array and 4-tuples of
/// vertex ids, plus the raw point list for downstream surface attachment.
#[derive(Clone, Debug, Default)]
pub struct TetMeshOutput {
    /// Vertex positions (super-tet vertices already dropped).
    pub vertices: Vec<Point3<f64>>,
    /// Tetrahedra as vertex-id 4-tuples with positive signed volume.
    pub tets: Vec<[u32; 4]>,
    /// The point records the mesh was built from.
    pub points: Vec<MeshPoint>,
}

impl TetMeshOutput {
    /// Number of tetrahedra.
    pub fn tet_count(&self) -> usize {
        self.tets.len()
    }

    /// Vertex coordinates flattened to `[x0, y0, z0, x1, ...]` in f32.
    pub fn flat_vertices(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.vertices.len() * 3);
        for v in &self.vertices {
            out.extend_from_slice(&[v.x as f32, v.y as f32, v.z as f32]);
        }
        out
    }

    /// Tet ids flattened to `[a0, b0, c0, d0, a1, ...]`.
    pub fn flat_tet_ids(&self) -> Vec<u32> {
        let mut out = Vec::with_capacity(self.tets.len() * 4);
        for t in &self.tets {
            out.extend_from_slice(t);
        }
        out
    }
}

/// Dense arena of tetrahedra with neighbour slots, face planes and marks.
struct TetArena {
    verts: Vec<[i32; 4]>,
    neighbors: Vec<[i32; 4]>,
    plane_normals: Vec<[Vector3<f64>; 4]>,
    plane_offsets: Vec<[f64; 4]>,
    visit_marks: Vec<u64>,
    cavity_marks: Vec<u64>,
    first_free: i32,
    next_mark: u64,
    walk_start: usize,
}

/// A cavity-boundary face: its three vertices in the winding of the carved
/// tet, and the surviving neighbour on the far side.
struct BoundaryFace {
    verts: [i32; 3],
    outer: i32,
    outer_slot: usize,
}

impl TetArena {
    fn seed(points: &[MeshPoint], super_ids: [u32; 4]) -> Self {
        let mut arena = Self {
            verts: Vec::new(),
            neighbors: Vec::new(),
            plane_normals: Vec::new(),
            plane_offsets: Vec::new(),
            visit_marks: Vec::new(),
            cavity_marks: Vec::new(),
            first_free: -1,
            next_mark: 1,
            walk_start: 0,
        };
        let t = arena.alloc();
        arena.verts[t] = super_ids.map(|i| i as i32);
        arena.neighbors[t] = [-1; 4];
        arena.update_planes(t, points);
        arena
    }

    fn len(&self) -> usize {
        self.verts.len()
    }

    fn is_live(&self, t: usize) -> bool {
        self.verts[t][0] >= 0
    }

    fn alloc(&mut self) -> usize {
        if self.first_free >= 0 {
            let t = self.first_free as usize;
            self.first_free = self.verts[t][1];
            t
        } else {
            self.verts.push([-1; 4]);
            self.neighbors.push([-1; 4]);
            self.plane_normals.push([Vector3::zeros(); 4]);
            self.plane_offsets.push([0.0; 4]);
            self.visit_marks.push(0);
            self.cavity_marks.push(0);
            self.verts.len() - 1
        }
    }

    fn free(&mut self, t: usize) {
        self.verts[t][0] = -1;
        self.verts[t][1] = self.first_free;
        self.first_free = t as i32;
    }

    fn point(&self, points: &[MeshPoint], t: usize, corner: usize) -> Point3<f64> {
        points[self.verts[t][corner] as usize].pos
    }

    fn centroid(&self, points: &[MeshPoint], t: usize) -> Point3<f64> {
        let mut c = Vector3::zeros();
        for corner in 0..4 {
            c += self.point(points, t, corner).coords;
        }
        Point3::from(c / 4.0)
    }

    /// Recomputes the four outward face planes of `t` (unnormalized).
    fn update_planes(&mut self, t: usize, points: &[MeshPoint]) {
        for (f, face) in TET_FACES.iter().enumerate() {
            let a = self.point(points, t, face[0]);
            let b = self.point(points, t, face[1]);
            let c = self.point(points, t, face[2]);
            let opposite = self.point(points, t, 6 - face[0] - face[1] - face[2]);
            let mut n = (b - a).cross(&(c - a));
            let mut d = n.dot(&a.coords);
            if n.dot(&opposite.coords) - d > 0.0 {
                n = -n;
                d = -d;
            }
            self.plane_normals[t][f] = n;
            self.plane_offsets[t][f] = d;
        }
    }

    /// Walks from the last insertion site toward `p` and returns the tet
    /// containing it. Cycles (revisiting a tet marked during this walk) and
    /// hull exits return `None`.
    fn locate(&mut self, points: &[MeshPoint], p: &Point3<f64>) -> Option<usize> {
        let mark = self.next_mark;
        self.next_mark += 1;
        let mut t = self.walk_start;
        if !self.is_live(t) {
            t = (0..self.len()).find(|&i| self.is_live(i))?;
        }
        loop {
            if self.visit_marks[t] == mark {
                return None;
            }
            self.visit_marks[t] = mark;

            let c = self.centroid(points, t);
            let mut t_min = f64::INFINITY;
            let mut face_min = usize::MAX;
            for f in 0..4 {
                let n = &self.plane_normals[t][f];
                let d = self.plane_offsets[t][f];
                let hp = n.dot(&p.coords) - d;
                let hc = n.dot(&c.coords) - d;
                if hp <= hc {
                    // The segment centroid→p moves away from this face.
                    continue;
                }
                let tf = -hc / (hp - hc);
                if tf < t_min {
                    t_min = tf;
                    face_min = f;
                }
            }
            if face_min == usize::MAX || t_min >= 1.0 {
                return Some(t);
            }
            let next = self.neighbors[t][face_min];
            if next < 0 {
                return None;
            }
            t = next as usize;
        }
    }

    /// Flood-fills the Delaunay cavity of `p` from its containing tet.
    fn find_cavity(&mut self, points: &[MeshPoint], p: &Point3<f64>, start: usize) -> (Vec<usize>, u64) {
        let mark = self.next_mark;
        self.next_mark += 1;
        self.visit_marks[start] = mark;
        self.cavity_marks[start] = mark;
        let mut cavity = vec![start];
        let mut stack = vec![start];
        while let Some(t) = stack.pop() {
            for f in 0..4 {
                let n = self.neighbors[t][f];
                if n < 0 {
                    continue;
                }
                let n = n as usize;
                if self.visit_marks[n] == mark {
                    continue;
                }
                self.visit_marks[n] = mark;
                let p0 = self.point(points, n, 0);
                let p1 = self.point(points, n, 1);
                let p2 = self.point(points, n, 2);
                let p3 = self.point(points, n, 3);
                if geometry::circumsphere_contains(&p0, &p1, &p2, &p3, p) {
                    self.cavity_marks[n] = mark;
                    cavity.push(n);
                    stack.push(n);
                }
            }
        }
        (cavity, mark)
    }

    /// Inserts the point with id `pid`. Returns `false` when the walk fails
    /// to locate a containing tet (the point is skipped).
    fn insert(&mut self, points: &[MeshPoint], pid: u32) -> bool {
        let p = points[pid as usize].pos;
        let Some(start) = self.locate(points, &p) else {
            return false;
        };
        let (cavity, cavity_mark) = self.find_cavity(points, &p, start);

        // Boundary faces must be gathered before the cavity rows are reused.
        let mut boundary = Vec::with_capacity(cavity.len() * 2 + 4);
        for &t in &cavity {
            for (f, face) in TET_FACES.iter().enumerate() {
                let n = self.neighbors[t][f];
                if n >= 0 && self.cavity_marks[n as usize] == cavity_mark {
                    continue;
                }
                let outer_slot = if n >= 0 {
                    self.neighbors[n as usize]
                        .iter()
                        .position(|&back| back == t as i32)
                        .unwrap_or(0)
                } else {
                    0
                };
                boundary.push(BoundaryFace {
                    verts: [
                        self.verts[t][face[0]],
                        self.verts[t][face[1]],
                        self.verts[t][face[2]],
                    ],
                    outer: n,
                    outer_slot,
                });
            }
        }

        for &t in &cavity {
            self.free(t);
        }

        // Re-tile the cavity with a fan of new tets around p, reusing freed
        // slots first.
        let mut new_tets = Vec::with_capacity(boundary.len());
        for bf in &boundary {
            let t = self.alloc();
            let [mut a, mut b, c] = bf.verts;
            let vol = geometry::tet_volume(
                &points[a as usize].pos,
                &points[b as usize].pos,
                &points[c as usize].pos,
                &p,
            );
            if vol < 0.0 {
                std::mem::swap(&mut a, &mut b);
            }
            self.verts[t] = [a, b, c, pid as i32];
            self.neighbors[t] = [bf.outer, -1, -1, -1];
            if bf.outer >= 0 {
                self.neighbors[bf.outer as usize][bf.outer_slot] = t as i32;
            }
            new_tets.push(t);
        }

        // Faces 1..3 of each new tet pair up across the fan; two new tets
        // share a face exactly when they share the non-apex edge.
        let mut edge_keys: Vec<(i32, i32, u32, u8)> = Vec::with_capacity(new_tets.len() * 3);
        for &t in &new_tets {
            let [v0, v1, v2, _] = self.verts[t];
            for (slot, (ea, eb)) in [(v0, v1), (v1, v2), (v2, v0)].into_iter().enumerate() {
                let (lo, hi) = if ea < eb { (ea, eb) } else { (eb, ea) };
                edge_keys.push((lo, hi, t as u32, slot as u8 + 1));
            }
        }
        edge_keys.sort_unstable();
        for pair in edge_keys.chunks_exact(2) {
            let (l0, h0, t0, s0) = pair[0];
            let (l1, h1, t1, s1) = pair[1];
            debug_assert_eq!((l0, h0), (l1, h1), "unpaired cavity boundary edge");
            self.neighbors[t0 as usize][s0 as usize] = t1 as i32;
            self.neighbors[t1 as usize][s1 as usize] = t0 as i32;
        }

        for &t in &new_tets {
            self.update_planes(t, points);
        }
        self.walk_start = new_tets[0];
        true
    }
}

fn dedup_and_perturb(input: impl Iterator<Item = Point3<f64>>, rng: &mut StdRng) -> Vec<MeshPoint> {
    let mut seen = HashSet::new();
    let mut points = Vec::new();
    for p in input {
        let key = (
            (p.x * DEDUP_DECIMALS).round() as i64,
            (p.y * DEDUP_DECIMALS).round() as i64,
            (p.z * DEDUP_DECIMALS).round() as i64,
        );
        if !seen.insert(key) {
            continue;
        }
        let jitter = Vector3::new(
            rng.gen_range(-PERTURBATION..PERTURBATION),
            rng.gen_range(-PERTURBATION..PERTURBATION),
            rng.gen_range(-PERTURBATION..PERTURBATION),
        );
        points.push(MeshPoint {
            pos: p + jitter,
            id: points.len() as u32,
        });
    }
    points
}

/// Samples a regular grid over the surface AABB and keeps samples that are
/// inside and at least half a cell away from the surface.
fn sample_interior(
    surface: &TriangleSurface,
    bvh: &TriangleBvh,
    resolution: u32,
    rng: &mut StdRng,
    points: &mut Vec<MeshPoint>,
) {
    let mut mins = Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
    let mut maxs = Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
    for v in &surface.vertices {
        mins = mins.inf(v);
        maxs = maxs.sup(v);
    }
    let extents = maxs - mins;
    let h = extents.max() / resolution as f64;
    if !(h > 0.0) {
        return;
    }

    let counts = [
        (extents.x / h).ceil() as i64,
        (extents.y / h).ceil() as i64,
        (extents.z / h).ceil() as i64,
    ];
    for i in 0..counts[0] {
        for j in 0..counts[1] {
            for k in 0..counts[2] {
                let sample = mins
                    + Vector3::new(
                        (i as f64 + 0.5) * h,
                        (j as f64 + 0.5) * h,
                        (k as f64 + 0.5) * h,
                    );
                if !bvh.is_inside(&sample) || bvh.distance(&sample) < h * 0.5 {
                    continue;
                }
                let jitter = Vector3::new(
                    rng.gen_range(-PERTURBATION..PERTURBATION),
                    rng.gen_range(-PERTURBATION..PERTURBATION),
                    rng.gen_range(-PERTURBATION..PERTURBATION),
                );
                points.push(MeshPoint {
                    pos: sample + jitter,
                    id: points.len() as u32,
                });
            }
        }
    }
}

/// Appends the four super-tet vertices and runs every insertion.
///
/// Returns the arena and the number of real (non-super) points.
fn run_insertions(points: &mut Vec<MeshPoint>, verbose: bool) -> (TetArena, usize) {
    let n_real = points.len();

    let mut centroid = Vector3::zeros();
    for p in points.iter() {
        centroid += p.pos.coords;
    }
    centroid /= n_real as f64;
    let mut radius: f64 = 0.0;
    for p in points.iter() {
        radius = radius.max((p.pos.coords - centroid).norm());
    }
    let radius = radius.max(1.0e-3) * SUPER_TET_SCALE;

    let dirs = [
        Vector3::new(1.0, 1.0, 1.0),
        Vector3::new(1.0, -1.0, -1.0),
        Vector3::new(-1.0, -1.0, 1.0),
        Vector3::new(-1.0, 1.0, -1.0),
    ];
    let mut super_ids = [0u32; 4];
    for (i, dir) in dirs.iter().enumerate() {
        super_ids[i] = points.len() as u32;
        points.push(MeshPoint {
            pos: Point3::from(centroid + dir * radius),
            id: super_ids[i],
        });
    }

    let mut arena = TetArena::seed(points, super_ids);
    let mut skipped = 0usize;
    for pid in 0..n_real as u32 {
        if !arena.insert(points, pid) {
            skipped += 1;
            log::warn!("tetrahedralize: walk failed to locate point {pid}, skipping");
        }
    }
    if verbose {
        log::info!(
            "tetrahedralize: inserted {} points ({} skipped), arena holds {} tet slots",
            n_real - skipped,
            skipped,
            arena.len()
        );
    }
    (arena, n_real)
}

fn collect_output(
    points: Vec<MeshPoint>,
    arena: &TetArena,
    n_real: usize,
    bvh: Option<&TriangleBvh>,
    opts: &TetOptions,
) -> TetMeshOutput {
    let mut tets = Vec::new();
    let mut dropped_quality = 0usize;
    let mut dropped_outside = 0usize;
    'tets: for t in 0..arena.len() {
        if !arena.is_live(t) {
            continue;
        }
        let ids = arena.verts[t];
        for id in ids {
            if id as usize >= n_real {
                continue 'tets;
            }
        }
        let p0 = points[ids[0] as usize].pos;
        let p1 = points[ids[1] as usize].pos;
        let p2 = points[ids[2] as usize].pos;
        let p3 = points[ids[3] as usize].pos;
        if geometry::tet_quality(&p0, &p1, &p2, &p3).abs() < opts.min_quality {
            dropped_quality += 1;
            continue;
        }
        if let Some(bvh) = bvh {
            if !bvh.is_inside(&geometry::tet_centroid(&p0, &p1, &p2, &p3)) {
                dropped_outside += 1;
                continue;
            }
        }
        tets.push(ids.map(|i| i as u32));
    }
    if opts.verbose {
        log::info!(
            "tetrahedralize: kept {} tets ({} below quality {}, {} outside the surface)",
            tets.len(),
            dropped_quality,
            opts.min_quality,
            dropped_outside
        );
    }

    let mut points = points;
    points.truncate(n_real);
    TetMeshOutput {
        vertices: points.iter().map(|p| p.pos).collect(),
        tets,
        points,
    }
}

/// Tetrahedralizes the interior of a closed triangulated surface.
///
/// Surface vertices are treated as a sampling hint, not as constraints:
/// interior points are added on a regular grid (spacing `max extent /
/// resolution`) and the result is filtered to tets whose centroid lies
/// inside the surface. If the surface is too degenerate to build a BVH, the
/// call falls back to point-cloud mode.
pub fn tetrahedralize(surface: &TriangleSurface, opts: &TetOptions) -> TetMeshOutput {
    let bvh = TriangleBvh::build(&surface.vertices, &surface.faces);
    if bvh.is_none() {
        log::warn!("tetrahedralize: degenerate surface, falling back to point-cloud mode");
    }

    let mut rng = StdRng::seed_from_u64(0x7e7a_11ab);
    let mut points = dedup_and_perturb(surface.vertices.iter().copied(), &mut rng);
    if let Some(bvh) = &bvh {
        if opts.resolution > 0 {
            let before = points.len();
            sample_interior(surface, bvh, opts.resolution, &mut rng, &mut points);
            if opts.verbose {
                log::info!(
                    "tetrahedralize: {} interior samples kept",
                    points.len() - before
                );
            }
        }
    }
    if points.is_empty() {
        return TetMeshOutput::default();
    }

    let (arena, n_real) = run_insertions(&mut points, opts.verbose);
    collect_output(points, &arena, n_real, bvh.as_ref(), opts)
}

/// Tetrahedralizes a raw point cloud (no interior sampling, no containment
/// filtering).
pub fn tetrahedralize_points(input: &[Point3<f64>], opts: &TetOptions) -> TetMeshOutput {
    let mut rng = StdRng::seed_from_u64(0x7e7a_11ab);
    let mut points = dedup_and_perturb(input.iter().copied(), &mut rng);
    if points.is_empty() {
        return TetMeshOutput::default();
    }
    let (arena, n_real) = run_insertions(&mut points, opts.verbose);
    collect_output(points, &arena, n_real, None, opts)
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    fn random_points(n: usize, seed: u64) -> Vec<Point3<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                Point3::new(
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                )
            })
            .collect()
    }

    /// Checks the neighbour-graph invariants on the raw arena: reciprocity
    /// and shared-face consistency.
    fn check_neighbors(arena: &TetArena) {
        for t in 0..arena.len() {
            if !arena.is_live(t) {
                continue;
            }
            for (f, face) in TET_FACES.iter().enumerate() {
                let n = arena.neighbors[t][f];
                if n < 0 {
                    continue;
                }
                let n = n as usize;
                assert!(arena.is_live(n), "tet {t} points at deleted neighbour {n}");
                let back = arena.neighbors[n]
                    .iter()
                    .position(|&b| b == t as i32)
                    .expect("neighbour does not reference back");
                let mut mine: Vec<i32> = face.iter().map(|&c| arena.verts[t][c]).collect();
                let mut theirs: Vec<i32> = TET_FACES[back]
                    .iter()
                    .map(|&c| arena.verts[n][c])
                    .collect();
                mine.sort_unstable();
                theirs.sort_unstable();
                assert_eq!(mine, theirs, "shared face mismatch between {t} and {n}");
            }
        }
    }

    #[test]
    fn four_points_make_one_tet() {
        let pts = vec![
            Point3::origin(),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ];
        let out = tetrahedralize_points(&pts, &TetOptions::default());
        assert_eq!(out.tet_count(), 1);
        let [a, b, c, d] = out.tets[0];
        let vol = geometry::tet_volume(
            &out.vertices[a as usize],
            &out.vertices[b as usize],
            &out.vertices[c as usize],
            &out.vertices[d as usize],
        );
        assert_relative_eq!(vol, 1.0 / 6.0, epsilon = 1.0e-3);
    }

    #[test]
    fn empty_input_yields_empty_mesh() {
        let out = tetrahedralize_points(&[], &TetOptions::default());
        assert_eq!(out.tet_count(), 0);
        assert!(out.vertices.is_empty());
    }

    #[test]
    fn coincident_points_are_merged() {
        let pts = vec![Point3::new(0.5, 0.5, 0.5); 10];
        let out = tetrahedralize_points(&pts, &TetOptions::default());
        assert_eq!(out.vertices.len(), 1);
        assert_eq!(out.tet_count(), 0);
    }

    #[test]
    fn neighbor_graph_is_reciprocal_during_construction() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut points = dedup_and_perturb(random_points(60, 3).into_iter(), &mut rng);
        let (arena, _) = run_insertions(&mut points, false);
        check_neighbors(&arena);
    }

    #[test]
    fn every_point_is_inserted_and_volumes_are_positive() {
        let pts = random_points(80, 7);
        let out = tetrahedralize_points(&pts, &TetOptions::default());
        assert_eq!(out.vertices.len(), 80);
        assert!(out.tet_count() > 0);
        for t in &out.tets {
            let vol = geometry::tet_volume(
                &out.vertices[t[0] as usize],
                &out.vertices[t[1] as usize],
                &out.vertices[t[2] as usize],
                &out.vertices[t[3] as usize],
            );
            assert!(vol > 0.0, "tet {t:?} has non-positive volume {vol}");
        }
    }

    #[test]
    fn delaunay_criterion_holds() {
        let pts = random_points(40, 11);
        let out = tetrahedralize_points(&pts, &TetOptions::default());
        for t in &out.tets {
            let p0 = out.vertices[t[0] as usize];
            let p1 = out.vertices[t[1] as usize];
            let p2 = out.vertices[t[2] as usize];
            let p3 = out.vertices[t[3] as usize];
            let (center, radius_sq) = geometry::circumsphere(&p0, &p1, &p2, &p3).unwrap();
            for (id, q) in out.vertices.iter().enumerate() {
                if t.contains(&(id as u32)) {
                    continue;
                }
                let d = (q - center).norm_squared();
                assert!(
                    d > radius_sq * (1.0 - 1.0e-7),
                    "point {id} violates the circumsphere of {t:?}"
                );
            }
        }
    }

    #[test]
    fn convex_cloud_fills_its_hull() {
        // The convex hull of the perturbed cloud has a slightly wobbly
        // boundary, so only bound the summed tet volume instead of matching
        // the exact cube volume.
        let pts = random_points(120, 23);
        let out = tetrahedralize_points(&pts, &TetOptions::default());
        let total: f64 = out
            .tets
            .iter()
            .map(|t| {
                geometry::tet_volume(
                    &out.vertices[t[0] as usize],
                    &out.vertices[t[1] as usize],
                    &out.vertices[t[2] as usize],
                    &out.vertices[t[3] as usize],
                )
            })
            .sum();
        assert!(total > 4.0, "hull volume {total} suspiciously small");
        assert!(total < 8.0 + 1.0e-6, "hull volume {total} exceeds the cube");
    }
}
