//! Synthetic two-view scenes shared by the unit tests.

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::fundamental::{matmul3, matvec3, transpose3, Mat3};

pub(crate) struct Scene {
    pub x1: Vec<[f64; 2]>,
    pub x2: Vec<[f64; 2]>,
    pub fundamental: Mat3,
}

const FOCAL: f64 = 500.0;
const CX: f64 = 320.0;
const CY: f64 = 240.0;

fn skew(t: &[f64; 3]) -> Mat3 {
    [[0.0, -t[2], t[1]], [t[2], 0.0, -t[0]], [-t[1], t[0], 0.0]]
}

fn project(p: &[f64; 3]) -> [f64; 2] {
    [FOCAL * p[0] / p[2] + CX, FOCAL * p[1] / p[2] + CY]
}

/// Project `n` random points of a non planar scene into two calibrated cameras.
pub(crate) fn two_view_scene(n: usize, noise: f64) -> Scene {
    let mut rng = StdRng::seed_from_u64(42);

    let yaw = 0.05f64;
    let rotation = [
        [yaw.cos(), 0.0, yaw.sin()],
        [0.0, 1.0, 0.0],
        [-yaw.sin(), 0.0, yaw.cos()],
    ];
    let translation = [-1.0, 0.1, 0.2];

    let k_inv = [
        [1.0 / FOCAL, 0.0, -CX / FOCAL],
        [0.0, 1.0 / FOCAL, -CY / FOCAL],
        [0.0, 0.0, 1.0],
    ];
    let essential = matmul3(&skew(&translation), &rotation);
    let fundamental = matmul3(&matmul3(&transpose3(&k_inv), &essential), &k_inv);

    let mut x1 = Vec::with_capacity(n);
    let mut x2 = Vec::with_capacity(n);
    for _ in 0..n {
        let p = [
            rng.random_range(-2.0..2.0),
            rng.random_range(-1.5..1.5),
            rng.random_range(4.0..8.0),
        ];
        let q = matvec3(&rotation, &p);
        let q = [
            q[0] + translation[0],
            q[1] + translation[1],
            q[2] + translation[2],
        ];

        let mut a = project(&p);
        let mut b = project(&q);
        if noise > 0.0 {
            a[0] += rng.random_range(-noise..noise);
            a[1] += rng.random_range(-noise..noise);
            b[0] += rng.random_range(-noise..noise);
            b[1] += rng.random_range(-noise..noise);
        }
        x1.push(a);
        x2.push(b);
    }

    Scene {
        x1,
        x2,
        fundamental,
    }
}

/// Scale `f` with the same convention used by the solver output (`F[2][2] == 1`).
pub(crate) fn unit_corner(f: &Mat3) -> Mat3 {
    let s = 1.0 / f[2][2];
    f.map(|row| row.map(|v| v * s))
}

/// Uniformly distributed points over a 640x480 image.
pub(crate) fn random_points(n: usize, seed: u64) -> Vec<[f64; 2]> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| [rng.random_range(0.0..640.0), rng.random_range(0.0..480.0)])
        .collect()
}
