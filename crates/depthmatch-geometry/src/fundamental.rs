use crate::error::GeometryError;

/// A row-major 3x3 matrix.
pub type Mat3 = [[f64; 3]; 3];

/// Minimum number of correspondences required by the 8-point solver.
pub const MIN_CORRESPONDENCES: usize = 8;

/// Estimate the fundamental matrix using the normalized 8-point algorithm.
///
/// - `x1`: points in image 1 as `&[[f64; 2]]` (length >= 8)
/// - `x2`: corresponding points in image 2 as `&[[f64; 2]]` (same length)
///
/// The result satisfies `x2^T F x1 ~ 0`, has rank 2 and is scaled so that
/// `F[2][2] == 1` whenever that entry is not vanishing (unit Frobenius norm otherwise).
pub fn fundamental_8point(x1: &[[f64; 2]], x2: &[[f64; 2]]) -> Result<Mat3, GeometryError> {
    if x1.len() != x2.len() || x1.len() < MIN_CORRESPONDENCES {
        return Err(GeometryError::InvalidInput {
            required: MIN_CORRESPONDENCES,
            left: x1.len(),
            right: x2.len(),
        });
    }

    // Normalize points with similarity transforms T1, T2 to have zero mean and avg sqrt(2) distance
    let (x1n, t1) = normalize_points_2d(x1);
    let (x2n, t2) = normalize_points_2d(x2);

    // Build design matrix A (N x 9) for x2' * F * x1 = 0
    let n = x1n.len();
    let mut a = faer::Mat::<f64>::zeros(n, 9);
    for i in 0..n {
        let (x, y) = (x1n[i][0], x1n[i][1]);
        let (xp, yp) = (x2n[i][0], x2n[i][1]);
        let row = [xp * x, xp * y, xp, yp * x, yp * y, yp, x, y, 1.0];
        for (j, &v) in row.iter().enumerate() {
            a.write(i, j, v);
        }
    }

    // Solve Af = 0 via SVD: take last column of V
    let svd = a.svd();
    let fvec = svd.v().col(8);
    let f = faer::mat![
        [fvec.read(0), fvec.read(1), fvec.read(2)],
        [fvec.read(3), fvec.read(4), fvec.read(5)],
        [fvec.read(6), fvec.read(7), fvec.read(8)]
    ];

    // Enforce rank-2 constraint: F = s0 u0 v0^T + s1 u1 v1^T
    let svd = f.svd();
    let (u, s, v) = (svd.u(), svd.s_diagonal(), svd.v());
    let mut f_rank2 = [[0.0; 3]; 3];
    for (i, row) in f_rank2.iter_mut().enumerate() {
        for (j, val) in row.iter_mut().enumerate() {
            *val = (0..2).map(|k| s.read(k) * u.read(i, k) * v.read(j, k)).sum();
        }
    }

    // Denormalize: F = T2^T * F * T1
    let f_denorm = matmul3(&matmul3(&transpose3(&t2), &f_rank2), &t1);

    let f = scale_fundamental(f_denorm);
    if f.iter().flatten().any(|v| !v.is_finite()) {
        return Err(GeometryError::NonFiniteModel);
    }

    Ok(f)
}

/// Squared Sampson distance of a correspondence to the epipolar geometry `f`.
///
/// This is the first order approximation of the squared geometric reprojection
/// error, in squared pixel units. Returns `f64::INFINITY` when the epipolar
/// lines vanish.
pub fn sampson_distance(f: &Mat3, x1: &[f64; 2], x2: &[f64; 2]) -> f64 {
    let p1 = [x1[0], x1[1], 1.0];
    let p2 = [x2[0], x2[1], 1.0];

    let fx1 = matvec3(f, &p1);
    let ftx2 = matvec3(&transpose3(f), &p2);
    let err = p2[0] * fx1[0] + p2[1] * fx1[1] + p2[2] * fx1[2];

    let denom = fx1[0] * fx1[0] + fx1[1] * fx1[1] + ftx2[0] * ftx2[0] + ftx2[1] * ftx2[1];
    if denom <= f64::EPSILON {
        return f64::INFINITY;
    }

    err * err / denom
}

/// Whether all points lie (numerically) on a single line.
///
/// Uses the ratio between the eigenvalues of the 2x2 scatter matrix, which makes
/// the test independent of the point cloud scale. Coincident points count as collinear.
pub fn is_collinear(points: &[[f64; 2]]) -> bool {
    if points.len() < 3 {
        return true;
    }

    let n = points.len() as f64;
    let (mx, my) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p[0], sy + p[1]));
    let (mx, my) = (mx / n, my / n);

    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for p in points {
        let dx = p[0] - mx;
        let dy = p[1] - my;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }

    let trace = sxx + syy;
    if trace <= f64::EPSILON {
        return true;
    }
    let det = sxx * syy - sxy * sxy;
    let disc = (trace * trace * 0.25 - det).max(0.0).sqrt();
    let lambda_min = trace * 0.5 - disc;
    let lambda_max = trace * 0.5 + disc;

    lambda_min <= 1e-10 * lambda_max
}

fn normalize_points_2d(x: &[[f64; 2]]) -> (Vec<[f64; 2]>, Mat3) {
    let n = x.len() as f64;
    let (mut mx, mut my) = (0.0, 0.0);
    for p in x {
        mx += p[0];
        my += p[1];
    }
    mx /= n;
    my /= n;
    let mut mean_dist = 0.0;
    for p in x {
        let dx = p[0] - mx;
        let dy = p[1] - my;
        mean_dist += (dx * dx + dy * dy).sqrt();
    }
    mean_dist /= n;
    let scale = if mean_dist > 0.0 {
        (2.0f64).sqrt() / mean_dist
    } else {
        1.0
    };

    let xn = x
        .iter()
        .map(|p| [(p[0] - mx) * scale, (p[1] - my) * scale])
        .collect();

    // Similarity transform matrix T = [[s,0,-s*mx],[0,s,-s*my],[0,0,1]]
    let t = [
        [scale, 0.0, -scale * mx],
        [0.0, scale, -scale * my],
        [0.0, 0.0, 1.0],
    ];
    (xn, t)
}

fn scale_fundamental(f: Mat3) -> Mat3 {
    let norm = f.iter().flatten().map(|v| v * v).sum::<f64>().sqrt();
    let scale = if f[2][2].abs() > 1e-12 * norm.max(f64::MIN_POSITIVE) {
        1.0 / f[2][2]
    } else if norm > 0.0 {
        1.0 / norm
    } else {
        1.0
    };
    f.map(|row| row.map(|v| v * scale))
}

pub(crate) fn matmul3(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, val) in row.iter_mut().enumerate() {
            *val = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

pub(crate) fn matvec3(a: &Mat3, x: &[f64; 3]) -> [f64; 3] {
    [
        a[0][0] * x[0] + a[0][1] * x[1] + a[0][2] * x[2],
        a[1][0] * x[0] + a[1][1] * x[1] + a[1][2] * x[2],
        a[2][0] * x[0] + a[2][1] * x[1] + a[2][2] * x[2],
    ]
}

pub(crate) fn transpose3(a: &Mat3) -> Mat3 {
    [
        [a[0][0], a[1][0], a[2][0]],
        [a[0][1], a[1][1], a[2][1]],
        [a[0][2], a[1][2], a[2][2]],
    ]
}

pub(crate) fn det3(a: &Mat3) -> f64 {
    a[0][0] * (a[1][1] * a[2][2] - a[1][2] * a[2][1])
        - a[0][1] * (a[1][0] * a[2][2] - a[1][2] * a[2][0])
        + a[0][2] * (a[1][0] * a[2][1] - a[1][1] * a[2][0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic;
    use approx::assert_relative_eq;

    // Check x2'^T F x1 ~ 0 for perfect correspondences of a known camera pair
    #[test]
    fn test_fundamental_8point_epipolar_constraint() -> Result<(), GeometryError> {
        let scene = synthetic::two_view_scene(8, 0.0);

        let f_est = fundamental_8point(&scene.x1, &scene.x2)?;

        for (p1, p2) in scene.x1.iter().zip(scene.x2.iter()) {
            let d = sampson_distance(&f_est, p1, p2);
            assert!(d < 1e-8, "sampson error too large: {d}");
        }

        // rank 2
        let norm = f_est.iter().flatten().map(|v| v * v).sum::<f64>().sqrt();
        assert!(det3(&f_est).abs() < 1e-9 * norm.powi(3));

        Ok(())
    }

    #[test]
    fn test_fundamental_8point_overdetermined() -> Result<(), GeometryError> {
        let scene = synthetic::two_view_scene(60, 0.0);
        let f_est = fundamental_8point(&scene.x1, &scene.x2)?;
        let f_true = synthetic::unit_corner(&scene.fundamental);
        for (a, b) in f_est.iter().flatten().zip(f_true.iter().flatten()) {
            assert_relative_eq!(a, b, epsilon = 1e-6, max_relative = 1e-4);
        }
        Ok(())
    }

    #[test]
    fn test_fundamental_8point_rejects_few_points() {
        let x = vec![[0.0, 0.0]; 7];
        assert_eq!(
            fundamental_8point(&x, &x),
            Err(GeometryError::InvalidInput {
                required: 8,
                left: 7,
                right: 7
            })
        );
    }

    #[test]
    fn test_sampson_distance() {
        // rectified stereo pair: epipolar lines are horizontal, y1 == y2
        let f = [[0.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]];
        assert_relative_eq!(sampson_distance(&f, &[10.0, 5.0], &[20.0, 5.0]), 0.0);
        // one pixel of vertical disparity splits evenly between the two views
        assert_relative_eq!(sampson_distance(&f, &[10.0, 5.0], &[20.0, 6.0]), 0.5);
        assert_eq!(
            sampson_distance(&[[0.0; 3]; 3], &[1.0, 1.0], &[1.0, 1.0]),
            f64::INFINITY
        );
    }

    #[test]
    fn test_is_collinear() {
        assert!(is_collinear(&[[0.0, 0.0], [1.0, 1.0], [2.0, 2.0], [5.0, 5.0]]));
        assert!(is_collinear(&[[3.0, 3.0]; 10]));
        assert!(!is_collinear(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]));
    }
}
