//! Tetrahedron primitives: canonical face/edge tables, signed volume,
//! circumsphere, quality metric, and barycentric coordinates.
//!
//! The face and edge tables are part of the external contract: neighbour
//! indexing, face-plane storage and the quality formula all assume this
//! ordering.

use na::{Matrix3, Point3, Vector3};

/// Canonical faces of a tetrahedron `(v0, v1, v2, v3)`, wound so that face
/// normals point outward when the tet has positive signed volume.
pub const TET_FACES: [[usize; 3]; 4] = [[2, 1, 0], [0, 1, 3], [1, 2, 3], [2, 0, 3]];

/// Canonical edges of a tetrahedron `(v0, v1, v2, v3)`.
pub const TET_EDGES: [[usize; 2]; 6] = [[0, 1], [0, 2], [0, 3], [1, 2], [1, 3], [2, 3]];

/// Determinant magnitude below which a circumsphere is considered degenerate.
pub const CIRCUMSPHERE_EPS: f64 = 1.0e-10;

/// Signed volume of the tetrahedron `(p0, p1, p2, p3)`.
///
/// Positive for the canonical winding of [`TET_FACES`].
#[inline]
pub fn tet_volume(p0: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>, p3: &Point3<f64>) -> f64 {
    (p1 - p0).dot(&(p2 - p0).cross(&(p3 - p0))) / 6.0
}

/// Quality of a tetrahedron, `12·V / (√2 · rms³)` with `rms` the root mean
/// square of the six edge lengths.
///
/// Evaluates to 1 for a regular tetrahedron and approaches 0 for degenerate
/// ones. Negative values indicate an inverted orientation.
pub fn tet_quality(p0: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>, p3: &Point3<f64>) -> f64 {
    let p = [p0, p1, p2, p3];
    let mut sum_sq = 0.0;
    for [a, b] in TET_EDGES {
        sum_sq += (p[b] - p[a]).norm_squared();
    }
    let rms = (sum_sq / 6.0).sqrt();
    if rms == 0.0 {
        return 0.0;
    }
    12.0 * tet_volume(p0, p1, p2, p3) / (std::f64::consts::SQRT_2 * rms * rms * rms)
}

/// Circumcentre and squared circumradius of a tetrahedron.
///
/// Returns `None` when the defining linear system is degenerate
/// (|det| < [`CIRCUMSPHERE_EPS`]), i.e. the four points are close to
/// coplanar.
pub fn circumsphere(
    p0: &Point3<f64>,
    p1: &Point3<f64>,
    p2: &Point3<f64>,
    p3: &Point3<f64>,
) -> Option<(Point3<f64>, f64)> {
    let r1 = p1 - p0;
    let r2 = p2 - p0;
    let r3 = p3 - p0;
    let a = Matrix3::from_rows(&[
        (2.0 * r1).transpose(),
        (2.0 * r2).transpose(),
        (2.0 * r3).transpose(),
    ]);
    if a.determinant().abs() < CIRCUMSPHERE_EPS {
        return None;
    }
    let b = Vector3::new(r1.norm_squared(), r2.norm_squared(), r3.norm_squared());
    let inv = a.try_inverse()?;
    let center = p0 + inv * b;
    let radius_sq = (center - p0).norm_squared();
    Some((center, radius_sq))
}

/// Whether `q` lies strictly inside the open circumsphere of the tetrahedron.
///
/// A degenerate circumsphere is treated as non-violating so that insertion
/// keeps making progress on near-coplanar configurations.
pub fn circumsphere_contains(
    p0: &Point3<f64>,
    p1: &Point3<f64>,
    p2: &Point3<f64>,
    p3: &Point3<f64>,
    q: &Point3<f64>,
) -> bool {
    match circumsphere(p0, p1, p2, p3) {
        Some((center, radius_sq)) => (q - center).norm_squared() < radius_sq,
        None => false,
    }
}

/// Barycentric coordinates `(β1, β2, β3)` of `p` with respect to the
/// tetrahedron `(p0, p1, p2, p3)`, so that
/// `p = p0 + β1·(p1−p0) + β2·(p2−p0) + β3·(p3−p0)`.
///
/// Returns zeros for a degenerate tetrahedron.
pub fn barycentric(
    p: &Point3<f64>,
    p0: &Point3<f64>,
    p1: &Point3<f64>,
    p2: &Point3<f64>,
    p3: &Point3<f64>,
) -> Vector3<f64> {
    let a = Matrix3::from_columns(&[p1 - p0, p2 - p0, p3 - p0]);
    match a.try_inverse() {
        Some(inv) => inv * (p - p0),
        None => Vector3::zeros(),
    }
}

/// Centroid of a tetrahedron.
#[inline]
pub fn tet_centroid(
    p0: &Point3<f64>,
    p1: &Point3<f64>,
    p2: &Point3<f64>,
    p3: &Point3<f64>,
) -> Point3<f64> {
    Point3::from((p0.coords + p1.coords + p2.coords + p3.coords) / 4.0)
}
