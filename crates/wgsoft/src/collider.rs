//! Colliders: a closed union of signed-distance primitives.
//!
//! A collider maps a world position to `(nx, ny, nz, signed_distance)` with
//! negative distance meaning penetration and the vector part the outward
//! unit normal at the contact. On the device the union is a tagged record of
//! three vec4 lanes (the tag bit-cast into the `w` lane of the first), with
//! height-field samples living in a shared auxiliary buffer; the host mirror
//! in [`GpuCollider::sample`] interprets the exact same records.

use nalgebra::{Point3, Vector3, Vector4};

/// Anything that can be sampled as a signed-distance contact.
pub trait Collider {
    /// Returns `(nx, ny, nz, signed_distance)` at `p`.
    fn sample(&self, p: Point3<f32>) -> Vector4<f32>;
}

/// Collider type tags shared with the WGSL union.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ColliderKind {
    /// Half-space below a plane (tag 0).
    Plane = 0,
    /// Solid sphere, or spherical container when inverted (tag 1).
    Sphere = 1,
    /// Solid axis-aligned box, or box container when inverted (tag 2).
    Box = 2,
    /// Capsule between two endpoints (tag 3).
    Capsule = 3,
    /// Sampled height field over the XZ plane (tag 4).
    HeightField = 4,
}

/// Host-side collider description.
#[derive(Clone, Debug)]
pub enum ColliderDesc {
    /// The half-space `normal · p < offset`.
    Plane {
        /// Outward (up) unit normal.
        normal: Vector3<f32>,
        /// Plane offset along the normal.
        offset: f32,
    },
    /// A sphere; `inverted` turns it into a container.
    Sphere {
        /// Centre.
        center: Point3<f32>,
        /// Radius.
        radius: f32,
        /// `false`: solid obstacle; `true`: hollow container.
        inverted: bool,
    },
    /// An axis-aligned box; `inverted` turns it into a container.
    Box {
        /// Centre.
        center: Point3<f32>,
        /// Half extents along each axis.
        half_extents: Vector3<f32>,
        /// `false`: solid obstacle; `true`: hollow container.
        inverted: bool,
    },
    /// A capsule: the set of points within `radius` of segment `a`–`b`.
    Capsule {
        /// First endpoint.
        a: Point3<f32>,
        /// Second endpoint.
        b: Point3<f32>,
        /// Radius.
        radius: f32,
    },
    /// A height field `y = h(x, z)` sampled on a regular grid.
    HeightField {
        /// Grid origin (minimum x/z corner; y added to every sample).
        origin: Point3<f32>,
        /// Grid spacing.
        cell_size: f32,
        /// Sample counts along x and z (at least 2 each).
        nx: u32,
        nz: u32,
        /// Row-major height samples, `nx * nz` of them.
        heights: Vec<f32>,
    },
}

/// Device-side collider record; lane layout per variant:
///
/// - Plane: `a = [nx, ny, nz, tag]`, `b = [offset, _, _, _]`
/// - Sphere: `a = [cx, cy, cz, tag]`, `b = [radius, sign, _, _]`
/// - Box: `a = [cx, cy, cz, tag]`, `b = [hx, hy, hz, sign]`
/// - Capsule: `a = [ax, ay, az, tag]`, `b = [bx, by, bz, radius]`
/// - HeightField: `a = [ox, oy, oz, tag]`, `b = [cell, _, _, _]`,
///   `c = [first, nx, nz, _]` (bit-cast u32 lanes)
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct GpuCollider {
    /// First data lane; `w` carries the bit-cast type tag.
    pub a: [f32; 4],
    /// Second data lane.
    pub b: [f32; 4],
    /// Third data lane (aux-buffer range for height fields).
    pub c: [f32; 4],
}

impl ColliderDesc {
    /// Lowers the description into a device record, appending any auxiliary
    /// samples to `aux`.
    pub fn lower(&self, aux: &mut Vec<f32>) -> GpuCollider {
        match self {
            Self::Plane { normal, offset } => GpuCollider {
                a: [
                    normal.x,
                    normal.y,
                    normal.z,
                    f32::from_bits(ColliderKind::Plane as u32),
                ],
                b: [*offset, 0.0, 0.0, 0.0],
                c: [0.0; 4],
            },
            Self::Sphere {
                center,
                radius,
                inverted,
            } => GpuCollider {
                a: [
                    center.x,
                    center.y,
                    center.z,
                    f32::from_bits(ColliderKind::Sphere as u32),
                ],
                b: [*radius, if *inverted { -1.0 } else { 1.0 }, 0.0, 0.0],
                c: [0.0; 4],
            },
            Self::Box {
                center,
                half_extents,
                inverted,
            } => GpuCollider {
                a: [
                    center.x,
                    center.y,
                    center.z,
                    f32::from_bits(ColliderKind::Box as u32),
                ],
                b: [
                    half_extents.x,
                    half_extents.y,
                    half_extents.z,
                    if *inverted { -1.0 } else { 1.0 },
                ],
                c: [0.0; 4],
            },
            Self::Capsule { a, b, radius } => GpuCollider {
                a: [a.x, a.y, a.z, f32::from_bits(ColliderKind::Capsule as u32)],
                b: [b.x, b.y, b.z, *radius],
                c: [0.0; 4],
            },
            Self::HeightField {
                origin,
                cell_size,
                nx,
                nz,
                heights,
            } => {
                assert!(*nx >= 2 && *nz >= 2, "height field needs at least 2x2 samples");
                assert_eq!(heights.len(), (*nx * *nz) as usize);
                let first = aux.len() as u32;
                aux.extend_from_slice(heights);
                GpuCollider {
                    a: [
                        origin.x,
                        origin.y,
                        origin.z,
                        f32::from_bits(ColliderKind::HeightField as u32),
                    ],
                    b: [*cell_size, 0.0, 0.0, 0.0],
                    c: [
                        f32::from_bits(first),
                        f32::from_bits(*nx),
                        f32::from_bits(*nz),
                        0.0,
                    ],
                }
            }
        }
    }

    /// Number of auxiliary samples this collider contributes.
    pub fn aux_len(&self) -> usize {
        match self {
            Self::HeightField { heights, .. } => heights.len(),
            _ => 0,
        }
    }
}

impl GpuCollider {
    /// Host mirror of the WGSL `collider_sample` function.
    pub fn sample(&self, aux: &[f32], p: Vector3<f32>) -> Vector4<f32> {
        let tag = self.a[3].to_bits();
        match tag {
            0 => {
                let n = Vector3::new(self.a[0], self.a[1], self.a[2]);
                let sd = n.dot(&p) - self.b[0];
                Vector4::new(n.x, n.y, n.z, sd)
            }
            1 => {
                let center = Vector3::new(self.a[0], self.a[1], self.a[2]);
                let radius = self.b[0];
                let sign = self.b[1];
                let rel = p - center;
                let d = rel.norm();
                let n = if d > 1.0e-9 {
                    rel / d
                } else {
                    Vector3::y()
                };
                Vector4::new(n.x * sign, n.y * sign, n.z * sign, (d - radius) * sign)
            }
            2 => {
                let center = Vector3::new(self.a[0], self.a[1], self.a[2]);
                let half = Vector3::new(self.b[0], self.b[1], self.b[2]);
                let sign = self.b[3];
                let rel = p - center;
                let q = rel.abs() - half;
                let (sd, n) = if q.x <= 0.0 && q.y <= 0.0 && q.z <= 0.0 {
                    // Inside: the face of smallest separation wins.
                    let mut axis = 0;
                    if q.y > q[axis] {
                        axis = 1;
                    }
                    if q.z > q[axis] {
                        axis = 2;
                    }
                    let mut n = Vector3::zeros();
                    n[axis] = rel[axis].signum();
                    (q[axis], n)
                } else {
                    let outside = Vector3::new(q.x.max(0.0), q.y.max(0.0), q.z.max(0.0));
                    let d = outside.norm();
                    let n = Vector3::new(
                        outside.x * rel.x.signum(),
                        outside.y * rel.y.signum(),
                        outside.z * rel.z.signum(),
                    ) / d.max(1.0e-9);
                    (d, n)
                };
                Vector4::new(n.x * sign, n.y * sign, n.z * sign, sd * sign)
            }
            3 => {
                let a = Vector3::new(self.a[0], self.a[1], self.a[2]);
                let b = Vector3::new(self.b[0], self.b[1], self.b[2]);
                let radius = self.b[3];
                let ab = b - a;
                let t = ((p - a).dot(&ab) / ab.norm_squared().max(1.0e-12)).clamp(0.0, 1.0);
                let q = a + ab * t;
                let rel = p - q;
                let d = rel.norm();
                let n = if d > 1.0e-9 { rel / d } else { Vector3::y() };
                Vector4::new(n.x, n.y, n.z, d - radius)
            }
            4 => {
                let origin = Vector3::new(self.a[0], self.a[1], self.a[2]);
                let cell = self.b[0];
                let first = self.c[0].to_bits() as usize;
                let nx = self.c[1].to_bits() as i32;
                let nz = self.c[2].to_bits() as i32;
                let height = |ix: i32, iz: i32| -> f32 {
                    let ix = ix.clamp(0, nx - 1);
                    let iz = iz.clamp(0, nz - 1);
                    aux[first + (iz * nx + ix) as usize]
                };
                let fx = (p.x - origin.x) / cell;
                let fz = (p.z - origin.z) / cell;
                let ix = fx.floor() as i32;
                let iz = fz.floor() as i32;
                let tx = (fx - ix as f32).clamp(0.0, 1.0);
                let tz = (fz - iz as f32).clamp(0.0, 1.0);
                let h00 = height(ix, iz);
                let h10 = height(ix + 1, iz);
                let h01 = height(ix, iz + 1);
                let h11 = height(ix + 1, iz + 1);
                let h = h00 * (1.0 - tx) * (1.0 - tz)
                    + h10 * tx * (1.0 - tz)
                    + h01 * (1.0 - tx) * tz
                    + h11 * tx * tz;
                let dhdx = ((h10 - h00) * (1.0 - tz) + (h11 - h01) * tz) / cell;
                let dhdz = ((h01 - h00) * (1.0 - tx) + (h11 - h10) * tx) / cell;
                let n = Vector3::new(-dhdx, 1.0, -dhdz).normalize();
                let sd = (p.y - (origin.y + h)) * n.y;
                Vector4::new(n.x, n.y, n.z, sd)
            }
            _ => Vector4::new(0.0, 1.0, 0.0, f32::INFINITY),
        }
    }
}

impl Collider for ColliderDesc {
    fn sample(&self, p: Point3<f32>) -> Vector4<f32> {
        let mut aux = Vec::new();
        let lowered = self.lower(&mut aux);
        lowered.sample(&aux, p.coords)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn plane_distance_and_normal() {
        let plane = ColliderDesc::Plane {
            normal: Vector3::y(),
            offset: 0.0,
        };
        let below = plane.sample(Point3::new(3.0, -0.25, 1.0));
        assert_relative_eq!(below.w, -0.25);
        assert_relative_eq!(below.xyz(), Vector3::y());
        let above = plane.sample(Point3::new(0.0, 2.0, 0.0));
        assert_relative_eq!(above.w, 2.0);
    }

    #[test]
    fn sphere_and_inverted_sphere() {
        let solid = ColliderDesc::Sphere {
            center: Point3::origin(),
            radius: 1.0,
            inverted: false,
        };
        let hit = solid.sample(Point3::new(0.5, 0.0, 0.0));
        assert_relative_eq!(hit.w, -0.5);
        assert_relative_eq!(hit.xyz(), Vector3::x());

        let container = ColliderDesc::Sphere {
            center: Point3::origin(),
            radius: 1.0,
            inverted: true,
        };
        let inside = container.sample(Point3::new(0.5, 0.0, 0.0));
        assert_relative_eq!(inside.w, 0.5);
        let escaped = container.sample(Point3::new(1.25, 0.0, 0.0));
        assert_relative_eq!(escaped.w, -0.25);
        assert_relative_eq!(escaped.xyz(), -Vector3::x());
    }

    #[test]
    fn box_faces_and_corners() {
        let cube = ColliderDesc::Box {
            center: Point3::origin(),
            half_extents: Vector3::new(1.0, 1.0, 1.0),
            inverted: false,
        };
        let inside = cube.sample(Point3::new(0.9, 0.0, 0.0));
        assert_relative_eq!(inside.w, -0.1, epsilon = 1.0e-6);
        assert_relative_eq!(inside.xyz(), Vector3::x());
        let corner = cube.sample(Point3::new(2.0, 2.0, 2.0));
        assert_relative_eq!(corner.w, 3.0f32.sqrt(), epsilon = 1.0e-6);
    }

    #[test]
    fn capsule_end_caps() {
        let capsule = ColliderDesc::Capsule {
            a: Point3::new(0.0, 0.0, 0.0),
            b: Point3::new(0.0, 1.0, 0.0),
            radius: 0.25,
        };
        let side = capsule.sample(Point3::new(0.5, 0.5, 0.0));
        assert_relative_eq!(side.w, 0.25, epsilon = 1.0e-6);
        let cap = capsule.sample(Point3::new(0.0, 1.5, 0.0));
        assert_relative_eq!(cap.w, 0.25, epsilon = 1.0e-6);
        assert_relative_eq!(cap.xyz(), Vector3::y());
    }

    #[test]
    fn height_field_bilinear_sample() {
        let field = ColliderDesc::HeightField {
            origin: Point3::new(0.0, 0.0, 0.0),
            cell_size: 1.0,
            nx: 2,
            nz: 2,
            heights: vec![0.0, 1.0, 0.0, 1.0],
        };
        // Halfway along x the surface sits at y = 0.5.
        let s = field.sample(Point3::new(0.5, 1.0, 0.5));
        assert!(s.w > 0.0);
        let below = field.sample(Point3::new(0.5, 0.2, 0.5));
        assert!(below.w < 0.0);
    }
}
