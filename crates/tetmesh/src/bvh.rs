//! Flat bounding-volume hierarchy over a triangle set.
//!
//! Used by the tetrahedralizer for interior classification (six axis-aligned
//! ray casts with a majority vote) and for nearest-surface queries that keep
//! interior samples away from the boundary.

use na::{Point3, Vector3};

const LEAF_SIZE: usize = 4;
const RAY_EPS: f64 = 1.0e-9;

/// The six axis-aligned directions cast by [`TriangleBvh::is_inside`].
fn axis_rays() -> [Vector3<f64>; 6] {
    [
        Vector3::x(),
        -Vector3::x(),
        Vector3::y(),
        -Vector3::y(),
        Vector3::z(),
        -Vector3::z(),
    ]
}

#[derive(Copy, Clone)]
struct Aabb {
    mins: Point3<f64>,
    maxs: Point3<f64>,
}

impl Aabb {
    fn empty() -> Self {
        Self {
            mins: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            maxs: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    fn grow(&mut self, p: &Point3<f64>) {
        self.mins = self.mins.inf(p);
        self.maxs = self.maxs.sup(p);
    }

    fn merge(&mut self, other: &Aabb) {
        self.mins = self.mins.inf(&other.mins);
        self.maxs = self.maxs.sup(&other.maxs);
    }

    fn longest_axis(&self) -> usize {
        let d = self.maxs - self.mins;
        if d.x > d.y && d.x > d.z {
            0
        } else if d.y > d.z {
            1
        } else {
            2
        }
    }

    /// Slab test; returns `true` if the ray hits the box anywhere in `[0, t_max]`.
    fn intersects_ray(&self, origin: &Point3<f64>, inv_dir: &Vector3<f64>, t_max: f64) -> bool {
        let mut t0: f64 = 0.0;
        let mut t1 = t_max;
        for k in 0..3 {
            let ta = (self.mins[k] - origin[k]) * inv_dir[k];
            let tb = (self.maxs[k] - origin[k]) * inv_dir[k];
            let (near, far) = if ta <= tb { (ta, tb) } else { (tb, ta) };
            t0 = t0.max(near);
            t1 = t1.min(far);
            if t0 > t1 {
                return false;
            }
        }
        true
    }

    fn distance_sq(&self, p: &Point3<f64>) -> f64 {
        let mut d = 0.0;
        for k in 0..3 {
            let v = (self.mins[k] - p[k]).max(0.0).max(p[k] - self.maxs[k]);
            d += v * v;
        }
        d
    }
}

#[derive(Copy, Clone)]
struct Node {
    aabb: Aabb,
    // Internal: index of the left child (right is left + 1), count == 0.
    // Leaf: first index into `order`, count > 0.
    first: u32,
    count: u32,
}

struct Triangle {
    a: Point3<f64>,
    b: Point3<f64>,
    c: Point3<f64>,
    normal: Vector3<f64>,
}

/// A ray/triangle hit: parametric distance and the (unit) triangle normal.
#[derive(Copy, Clone, Debug)]
pub struct RayHit {
    /// Parametric distance along the ray direction.
    pub t: f64,
    /// Unit normal of the hit triangle, oriented by the input winding.
    pub normal: Vector3<f64>,
}

/// Result of a nearest-surface query.
#[derive(Copy, Clone, Debug)]
pub struct SurfacePoint {
    /// Distance from the query point to the surface.
    pub distance: f64,
    /// Closest point on the surface.
    pub point: Point3<f64>,
    /// Unit normal of the closest triangle.
    pub normal: Vector3<f64>,
}

/// Median-split BVH over a triangle soup.
pub struct TriangleBvh {
    nodes: Vec<Node>,
    order: Vec<u32>,
    triangles: Vec<Triangle>,
}

impl TriangleBvh {
    /// Builds a BVH from a shared vertex buffer and triangle indices.
    ///
    /// Returns `None` for degenerate input: fewer than four triangles (not a
    /// closed surface) or a soup whose every triangle has zero area.
    pub fn build(vertices: &[Point3<f64>], faces: &[[u32; 3]]) -> Option<Self> {
        if faces.len() < 4 {
            return None;
        }
        let mut triangles = Vec::with_capacity(faces.len());
        let mut any_area = false;
        for face in faces {
            let a = vertices[face[0] as usize];
            let b = vertices[face[1] as usize];
            let c = vertices[face[2] as usize];
            let n = (b - a).cross(&(c - a));
            let norm = n.norm();
            any_area |= norm > 0.0;
            let normal = if norm > 0.0 { n / norm } else { Vector3::zeros() };
            triangles.push(Triangle { a, b, c, normal });
        }
        if !any_area {
            return None;
        }

        let centroids: Vec<Point3<f64>> = triangles
            .iter()
            .map(|t| Point3::from((t.a.coords + t.b.coords + t.c.coords) / 3.0))
            .collect();
        let bounds: Vec<Aabb> = triangles
            .iter()
            .map(|t| {
                let mut aabb = Aabb::empty();
                aabb.grow(&t.a);
                aabb.grow(&t.b);
                aabb.grow(&t.c);
                aabb
            })
            .collect();

        let order: Vec<u32> = (0..triangles.len() as u32).collect();
        let mut nodes = Vec::with_capacity(triangles.len() * 2);
        nodes.push(Node {
            aabb: Aabb::empty(),
            first: 0,
            count: triangles.len() as u32,
        });
        let mut bvh = Self {
            nodes,
            order,
            triangles,
        };
        bvh.subdivide(0, &centroids, &bounds);
        Some(bvh)
    }

    fn subdivide(&mut self, node_id: usize, centroids: &[Point3<f64>], bounds: &[Aabb]) {
        let (first, count) = (self.nodes[node_id].first as usize, self.nodes[node_id].count as usize);
        let mut aabb = Aabb::empty();
        for &tri in &self.order[first..first + count] {
            aabb.merge(&bounds[tri as usize]);
        }
        self.nodes[node_id].aabb = aabb;

        if count <= LEAF_SIZE {
            return;
        }

        let axis = aabb.longest_axis();
        let mid = first + count / 2;
        self.order[first..first + count]
            .select_nth_unstable_by(count / 2, |&i, &j| {
                centroids[i as usize][axis]
                    .partial_cmp(&centroids[j as usize][axis])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

        let left = self.nodes.len() as u32;
        self.nodes.push(Node {
            aabb: Aabb::empty(),
            first: first as u32,
            count: (mid - first) as u32,
        });
        self.nodes.push(Node {
            aabb: Aabb::empty(),
            first: mid as u32,
            count: (first + count - mid) as u32,
        });
        self.nodes[node_id].first = left;
        self.nodes[node_id].count = 0;
        self.subdivide(left as usize, centroids, bounds);
        self.subdivide(left as usize + 1, centroids, bounds);
    }

    /// Casts a ray and returns the nearest hit, if any.
    pub fn raycast(&self, origin: &Point3<f64>, dir: &Vector3<f64>) -> Option<RayHit> {
        let inv_dir = Vector3::new(1.0 / dir.x, 1.0 / dir.y, 1.0 / dir.z);
        let mut best: Option<RayHit> = None;
        let mut stack = vec![0u32];
        while let Some(node_id) = stack.pop() {
            let node = &self.nodes[node_id as usize];
            let t_max = best.map_or(f64::INFINITY, |h| h.t);
            if !node.aabb.intersects_ray(origin, &inv_dir, t_max) {
                continue;
            }
            if node.count > 0 {
                for &tri in &self.order[node.first as usize..(node.first + node.count) as usize] {
                    if let Some(hit) = self.raycast_triangle(tri as usize, origin, dir) {
                        if best.is_none_or(|b| hit.t < b.t) {
                            best = Some(hit);
                        }
                    }
                }
            } else {
                stack.push(node.first);
                stack.push(node.first + 1);
            }
        }
        best
    }

    /// Möller–Trumbore intersection against one triangle.
    fn raycast_triangle(
        &self,
        tri: usize,
        origin: &Point3<f64>,
        dir: &Vector3<f64>,
    ) -> Option<RayHit> {
        let t = &self.triangles[tri];
        let e1 = t.b - t.a;
        let e2 = t.c - t.a;
        let pvec = dir.cross(&e2);
        let det = e1.dot(&pvec);
        if det.abs() < RAY_EPS {
            return None;
        }
        let inv_det = 1.0 / det;
        let tvec = origin - t.a;
        let u = tvec.dot(&pvec) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let qvec = tvec.cross(&e1);
        let v = dir.dot(&qvec) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let hit_t = e2.dot(&qvec) * inv_det;
        (hit_t > RAY_EPS).then_some(RayHit {
            t: hit_t,
            normal: t.normal,
        })
    }

    /// Classifies a point as interior by casting the six axis-aligned rays
    /// and requiring a majority of them to exit through a front face.
    ///
    /// The vote makes the test robust against single-ray misclassification
    /// near coplanar faces.
    pub fn is_inside(&self, p: &Point3<f64>) -> bool {
        let mut votes = 0;
        for dir in &axis_rays() {
            if let Some(hit) = self.raycast(p, dir) {
                if hit.normal.dot(dir) > 0.0 {
                    votes += 1;
                }
            }
        }
        votes > 3
    }

    /// Nearest point on the surface, its distance, and the triangle normal.
    pub fn nearest(&self, p: &Point3<f64>) -> SurfacePoint {
        let mut best = SurfacePoint {
            distance: f64::INFINITY,
            point: *p,
            normal: Vector3::zeros(),
        };
        let mut stack = vec![0u32];
        while let Some(node_id) = stack.pop() {
            let node = &self.nodes[node_id as usize];
            if node.aabb.distance_sq(p) >= best.distance * best.distance {
                continue;
            }
            if node.count > 0 {
                for &tri in &self.order[node.first as usize..(node.first + node.count) as usize] {
                    let t = &self.triangles[tri as usize];
                    let q = closest_point_on_triangle(p, &t.a, &t.b, &t.c);
                    let d = (p - q).norm();
                    if d < best.distance {
                        best = SurfacePoint {
                            distance: d,
                            point: q,
                            normal: t.normal,
                        };
                    }
                }
            } else {
                // Visit the nearer child first so pruning kicks in earlier.
                let (l, r) = (node.first, node.first + 1);
                let dl = self.nodes[l as usize].aabb.distance_sq(p);
                let dr = self.nodes[r as usize].aabb.distance_sq(p);
                if dl <= dr {
                    stack.push(r);
                    stack.push(l);
                } else {
                    stack.push(l);
                    stack.push(r);
                }
            }
        }
        best
    }

    /// Distance from `p` to the surface.
    #[inline]
    pub fn distance(&self, p: &Point3<f64>) -> f64 {
        self.nearest(p).distance
    }
}

/// Closest point on triangle `(a, b, c)` to `p` (Ericson, Real-Time
/// Collision Detection, §5.1.5).
fn closest_point_on_triangle(
    p: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> Point3<f64> {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return *a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return *b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return *c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    /// Axis-aligned box `[-1, 1]³` as 12 outward-wound triangles.
    fn cube() -> (Vec<Point3<f64>>, Vec<[u32; 3]>) {
        let vertices = vec![
            Point3::new(-1.0, -1.0, -1.0),
            Point3::new(1.0, -1.0, -1.0),
            Point3::new(1.0, 1.0, -1.0),
            Point3::new(-1.0, 1.0, -1.0),
            Point3::new(-1.0, -1.0, 1.0),
            Point3::new(1.0, -1.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(-1.0, 1.0, 1.0),
        ];
        let faces = vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [2, 3, 7],
            [2, 7, 6],
            [0, 7, 3],
            [0, 4, 7],
            [1, 2, 6],
            [1, 6, 5],
        ];
        (vertices, faces)
    }

    #[test]
    fn rejects_degenerate_input() {
        let (vertices, _) = cube();
        assert!(TriangleBvh::build(&vertices, &[[0, 1, 2]]).is_none());
        let flat = vec![Point3::origin(); 3];
        assert!(TriangleBvh::build(&flat, &[[0, 1, 2], [0, 1, 2], [0, 1, 2], [0, 1, 2]]).is_none());
    }

    #[test]
    fn raycast_hits_the_near_face() {
        let (vertices, faces) = cube();
        let bvh = TriangleBvh::build(&vertices, &faces).unwrap();
        let hit = bvh
            .raycast(&Point3::new(0.0, 0.0, -5.0), &Vector3::z())
            .unwrap();
        assert_relative_eq!(hit.t, 4.0, epsilon = 1.0e-9);
        assert_relative_eq!(hit.normal, -Vector3::z(), epsilon = 1.0e-9);
    }

    #[test]
    fn inside_test_votes_over_six_rays() {
        let (vertices, faces) = cube();
        let bvh = TriangleBvh::build(&vertices, &faces).unwrap();
        assert!(bvh.is_inside(&Point3::origin()));
        assert!(bvh.is_inside(&Point3::new(0.9, -0.8, 0.7)));
        assert!(!bvh.is_inside(&Point3::new(1.5, 0.0, 0.0)));
        assert!(!bvh.is_inside(&Point3::new(-3.0, 2.0, 0.2)));
    }

    #[test]
    fn nearest_surface_distance() {
        let (vertices, faces) = cube();
        let bvh = TriangleBvh::build(&vertices, &faces).unwrap();
        let q = bvh.nearest(&Point3::new(0.25, 0.0, 0.0));
        assert_relative_eq!(q.distance, 0.75, epsilon = 1.0e-9);
        assert_relative_eq!(q.point, Point3::new(1.0, 0.0, 0.0), epsilon = 1.0e-9);

        let outside = bvh.nearest(&Point3::new(3.0, 0.0, 0.0));
        assert_relative_eq!(outside.distance, 2.0, epsilon = 1.0e-9);
    }
}
