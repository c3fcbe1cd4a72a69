use std::sync::Arc;

use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;

use depthmatch_image::{ops, Image, ImageSize};
use depthmatch_imgproc::{
    filter::{gaussian_blur3, integral_image, integral_sum},
    resize::resize_bilinear,
};

use super::MatchDescriptor;
use crate::error::ModelError;

/// Learnable parameters of a [`BlockMatcher`].
#[derive(Clone, Debug, PartialEq, bincode::Encode, bincode::Decode)]
pub struct MatchWeights {
    /// Scale of the photometric error, in intensity units.
    pub photometric_sigma: f32,
    /// Regularizer of the best / second best cost ratio.
    pub distinctiveness_eps: f32,
    /// Certainties above this value are sampled as if they were 1.
    pub sample_threshold: f32,
    /// Number of correspondences drawn by [`BlockMatcher::sample`].
    pub num_samples: u32,
    pub seed: u64,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            photometric_sigma: 0.05,
            distinctiveness_eps: 1e-4,
            sample_threshold: 0.1,
            num_samples: 5000,
            seed: 0,
        }
    }
}

/// Fixed structure of a matcher, shared between models of the same descriptor.
#[derive(Debug)]
pub struct MatcherArchitecture {
    pub descriptor: MatchDescriptor,
    /// Both images are matched at this resolution.
    pub size: ImageSize,
    /// Largest displacement searched along each axis, in working pixels.
    pub search_radius: usize,
    /// Half size of the compared patches.
    pub patch_radius: usize,
}

impl MatcherArchitecture {
    pub fn new(descriptor: MatchDescriptor) -> Self {
        Self {
            descriptor,
            size: descriptor.working_size(),
            search_radius: descriptor.search_radius(),
            patch_radius: 3,
        }
    }
}

/// Dense correspondences in normalized coordinates.
///
/// Each entry is `[xA, yA, xB, yB]` in `[-1, 1]`, one per working pixel of image A
/// in row-major order.
#[derive(Clone, Debug, PartialEq)]
pub struct Warp {
    size: ImageSize,
    data: Vec<[f32; 4]>,
}

impl Warp {
    pub fn size(&self) -> ImageSize {
        self.size
    }

    pub fn as_slice(&self) -> &[[f32; 4]] {
        &self.data
    }
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    cost: f32,
    dx: i32,
    dy: i32,
}

impl Candidate {
    const NONE: Self = Self {
        cost: f32::INFINITY,
        dx: 0,
        dy: 0,
    };

    // ties go to the smallest displacement so the result does not depend on the scan order
    fn better_than(&self, other: &Self) -> bool {
        if self.cost != other.cost {
            return self.cost < other.cost;
        }
        (self.dx.abs() + self.dy.abs(), self.dy, self.dx)
            < (other.dx.abs() + other.dy.abs(), other.dy, other.dx)
    }

    fn is_near(&self, dx: i32, dy: i32) -> bool {
        (self.dx - dx).abs() <= 1 && (self.dy - dy).abs() <= 1
    }
}

/// Built-in dense matcher.
///
/// Compares 7x7 patches of the smoothed grayscale images over every displacement of
/// the search window, keeps the best and the best non adjacent displacement per
/// pixel and refines the winner to sub-pixel accuracy with a parabola fit.
#[derive(Clone, Debug)]
pub struct BlockMatcher {
    arch: Arc<MatcherArchitecture>,
    weights: MatchWeights,
}

impl BlockMatcher {
    pub fn new(descriptor: MatchDescriptor) -> Self {
        Self {
            arch: Arc::new(MatcherArchitecture::new(descriptor)),
            weights: MatchWeights::default(),
        }
    }

    /// A matcher sharing this architecture, reset to the initial weights.
    pub fn with_same_architecture(&self) -> Self {
        Self {
            arch: Arc::clone(&self.arch),
            weights: MatchWeights::default(),
        }
    }

    pub fn descriptor(&self) -> &MatchDescriptor {
        &self.arch.descriptor
    }

    pub fn architecture(&self) -> &MatcherArchitecture {
        &self.arch
    }

    pub fn weights(&self) -> &MatchWeights {
        &self.weights
    }

    pub fn load_weights(&mut self, weights: MatchWeights) -> Result<(), ModelError> {
        if !(weights.photometric_sigma.is_finite() && weights.photometric_sigma > 0.0) {
            return Err(ModelError::InvalidWeights(format!(
                "photometric sigma must be positive, got {}",
                weights.photometric_sigma
            )));
        }
        if !(weights.distinctiveness_eps.is_finite() && weights.distinctiveness_eps >= 0.0)
            || !weights.sample_threshold.is_finite()
        {
            return Err(ModelError::InvalidWeights("non finite matcher weights".into()));
        }
        self.weights = weights;
        Ok(())
    }

    /// Match image A against image B.
    ///
    /// Returns the warp and a per pixel certainty in `[0, 1]`, both at the working
    /// resolution of the architecture.
    pub fn match_images(
        &self,
        image_a: &Image<u8, 3>,
        image_b: &Image<u8, 3>,
    ) -> Result<(Warp, Image<f32, 1>), ModelError> {
        let a = self.preprocess(image_a)?;
        let b = self.preprocess(image_b)?;

        let best = self.scan(&a, &b, None);
        let second = self.scan(&a, &b, Some(best.as_slice()));

        let size = self.arch.size;
        let (w, h) = (size.width as f32, size.height as f32);
        let sigma2 = self.weights.photometric_sigma * self.weights.photometric_sigma;
        let eps = self.weights.distinctiveness_eps;

        let mut warp = Vec::with_capacity(size.area());
        let mut certainty = Vec::with_capacity(size.area());
        for r in 0..size.height {
            for c in 0..size.width {
                let i = r * size.width + c;
                let xa = (c as f32 + 0.5) / w * 2.0 - 1.0;
                let ya = (r as f32 + 0.5) / h * 2.0 - 1.0;

                let winner = best[i];
                if !winner.cost.is_finite() {
                    warp.push([xa, ya, xa, ya]);
                    certainty.push(0.0);
                    continue;
                }

                let (ox, oy) = self.refine(&a, &b, r, c, winner);
                let xb = (c as f32 + winner.dx as f32 + ox + 0.5) / w * 2.0 - 1.0;
                let yb = (r as f32 + winner.dy as f32 + oy + 0.5) / h * 2.0 - 1.0;
                warp.push([xa, ya, xb, yb]);

                let quality = (-winner.cost / sigma2).exp();
                let runner_up = second[i].cost;
                let distinctiveness = if runner_up.is_finite() {
                    ((runner_up - winner.cost) / (runner_up + eps)).clamp(0.0, 1.0)
                } else {
                    1.0
                };
                certainty.push((quality * distinctiveness).clamp(0.0, 1.0));
            }
        }

        Ok((Warp { size, data: warp }, Image::new(size, certainty)?))
    }

    /// Draw correspondences from the warp, weighted by certainty and without replacement.
    ///
    /// Returns the sampled matches and their (thresholded) certainty.
    pub fn sample(&self, warp: &Warp, certainty: &Image<f32, 1>) -> (Vec<[f32; 4]>, Vec<f32>) {
        let threshold = self.weights.sample_threshold;
        let mut rng = StdRng::seed_from_u64(self.weights.seed);

        // weighted reservoir keys: ln(u) / w, the largest keys win
        let mut keyed = Vec::with_capacity(warp.data.len());
        for (m, &c) in warp.data.iter().zip(certainty.as_slice()) {
            let weight = if c > threshold { 1.0 } else { c };
            if weight <= 0.0 {
                continue;
            }
            let u = 1.0 - rng.random::<f64>();
            keyed.push((u.ln() / weight as f64, *m, weight));
        }

        keyed.sort_by(|x, y| y.0.total_cmp(&x.0));
        keyed.truncate(self.weights.num_samples as usize);
        keyed.into_iter().map(|(_, m, w)| (m, w)).unzip()
    }

    /// Convert normalized matches to pixel coordinates of each image.
    pub fn to_pixel_coordinates(
        &self,
        matches: &[[f32; 4]],
        height_a: usize,
        width_a: usize,
        height_b: usize,
        width_b: usize,
    ) -> (Vec<[f64; 2]>, Vec<[f64; 2]>) {
        let (ha, wa) = (height_a as f64, width_a as f64);
        let (hb, wb) = (height_b as f64, width_b as f64);
        matches
            .iter()
            .map(|m| {
                let [xa, ya, xb, yb] = m.map(f64::from);
                (
                    [wa / 2.0 * (xa + 1.0), ha / 2.0 * (ya + 1.0)],
                    [wb / 2.0 * (xb + 1.0), hb / 2.0 * (yb + 1.0)],
                )
            })
            .unzip()
    }

    fn preprocess(&self, image: &Image<u8, 3>) -> Result<Image<f32, 1>, ModelError> {
        let mut rgb = Image::<f32, 3>::from_size_val(image.size(), 0.0)?;
        ops::cast_and_scale(image, &mut rgb, 1.0 / 255.0)?;

        let mut gray = Image::<f32, 1>::from_size_val(image.size(), 0.0)?;
        ops::gray_from_rgb(&rgb, &mut gray)?;

        let mut resized = Image::<f32, 1>::from_size_val(self.arch.size, 0.0)?;
        resize_bilinear(&gray, &mut resized)?;

        let mut smoothed = Image::<f32, 1>::from_size_val(self.arch.size, 0.0)?;
        gaussian_blur3(&resized, &mut smoothed)?;

        Ok(smoothed)
    }

    /// Best displacement per pixel, skipping the neighbourhood of `exclude` if given.
    fn scan(
        &self,
        a: &Image<f32, 1>,
        b: &Image<f32, 1>,
        exclude: Option<&[Candidate]>,
    ) -> Vec<Candidate> {
        let n = a.size().area();
        let radius = self.arch.search_radius as i32;

        (-radius..=radius)
            .into_par_iter()
            .map(|dy| {
                let mut best = vec![Candidate::NONE; n];
                let mut costs = vec![0.0f32; n];
                for dx in -radius..=radius {
                    self.cost_map(a, b, dx, dy, &mut costs);
                    for (i, (slot, &cost)) in best.iter_mut().zip(costs.iter()).enumerate() {
                        if exclude.is_some_and(|ex| ex[i].is_near(dx, dy)) {
                            continue;
                        }
                        let candidate = Candidate { cost, dx, dy };
                        if candidate.better_than(slot) {
                            *slot = candidate;
                        }
                    }
                }
                best
            })
            .reduce(
                || vec![Candidate::NONE; n],
                |mut acc, other| {
                    for (slot, candidate) in acc.iter_mut().zip(other) {
                        if candidate.better_than(slot) {
                            *slot = candidate;
                        }
                    }
                    acc
                },
            )
    }

    /// Mean squared patch difference of every pixel of `a` for one displacement.
    ///
    /// Only pixels whose displaced position falls inside `b` contribute. Pixels with
    /// less than half a patch of support get an infinite cost.
    fn cost_map(
        &self,
        a: &Image<f32, 1>,
        b: &Image<f32, 1>,
        dx: i32,
        dy: i32,
        out: &mut [f32],
    ) {
        let (w, h) = (a.width() as i32, a.height() as i32);
        let (r_lo, r_hi) = ((-dy).max(0), (h - dy).min(h));
        let (c_lo, c_hi) = ((-dx).max(0), (w - dx).min(w));
        if r_lo >= r_hi || c_lo >= c_hi {
            out.fill(f32::INFINITY);
            return;
        }

        let (da, db) = (a.as_slice(), b.as_slice());
        let inside = |r: i32, c: i32| r >= r_lo && r < r_hi && c >= c_lo && c < c_hi;
        let diff = Image::<f32, 1>::from_fn(a.size(), |r, c, _| {
            let (r, c) = (r as i32, c as i32);
            if inside(r, c) {
                let d = da[(r * w + c) as usize] - db[((r + dy) * w + c + dx) as usize];
                d * d
            } else {
                0.0
            }
        });
        let table = integral_image(&diff);
        let stride = a.width() + 1;

        let p = self.arch.patch_radius as i32;
        let min_support = ((2 * p + 1) * (2 * p + 1) + 1) / 2;
        for r in 0..h {
            for c in 0..w {
                let out = &mut out[(r * w + c) as usize];
                if !inside(r, c) {
                    *out = f32::INFINITY;
                    continue;
                }
                let (r0, r1) = ((r - p).max(r_lo), (r + p + 1).min(r_hi));
                let (c0, c1) = ((c - p).max(c_lo), (c + p + 1).min(c_hi));
                let support = (r1 - r0) * (c1 - c0);
                *out = if support < min_support {
                    f32::INFINITY
                } else {
                    let sum = integral_sum(
                        &table,
                        stride,
                        r0 as usize,
                        c0 as usize,
                        r1 as usize,
                        c1 as usize,
                    );
                    (sum.max(0.0) / support as f64) as f32
                };
            }
        }
    }

    /// Same cost as [`Self::cost_map`] for a single pixel.
    fn patch_cost(
        &self,
        a: &Image<f32, 1>,
        b: &Image<f32, 1>,
        r: usize,
        c: usize,
        dx: i32,
        dy: i32,
    ) -> f32 {
        let (w, h) = (a.width() as i32, a.height() as i32);
        let (r, c) = (r as i32, c as i32);
        let (r_lo, r_hi) = ((-dy).max(0), (h - dy).min(h));
        let (c_lo, c_hi) = ((-dx).max(0), (w - dx).min(w));
        if r < r_lo || r >= r_hi || c < c_lo || c >= c_hi {
            return f32::INFINITY;
        }

        let p = self.arch.patch_radius as i32;
        let min_support = ((2 * p + 1) * (2 * p + 1) + 1) / 2;
        let (r0, r1) = ((r - p).max(r_lo), (r + p + 1).min(r_hi));
        let (c0, c1) = ((c - p).max(c_lo), (c + p + 1).min(c_hi));
        let support = (r1 - r0) * (c1 - c0);
        if support < min_support {
            return f32::INFINITY;
        }

        let (da, db) = (a.as_slice(), b.as_slice());
        let mut sum = 0.0f64;
        for rr in r0..r1 {
            for cc in c0..c1 {
                let d = da[(rr * w + cc) as usize] - db[((rr + dy) * w + cc + dx) as usize];
                sum += (d * d) as f64;
            }
        }
        (sum / support as f64) as f32
    }

    fn refine(
        &self,
        a: &Image<f32, 1>,
        b: &Image<f32, 1>,
        r: usize,
        c: usize,
        winner: Candidate,
    ) -> (f32, f32) {
        let c0 = winner.cost;
        let vertex = |minus: f32, plus: f32| {
            let curvature = minus - 2.0 * c0 + plus;
            if minus.is_finite() && plus.is_finite() && curvature > f32::EPSILON {
                (0.5 * (minus - plus) / curvature).clamp(-0.5, 0.5)
            } else {
                0.0
            }
        };
        let (dx, dy) = (winner.dx, winner.dy);
        let ox = vertex(
            self.patch_cost(a, b, r, c, dx - 1, dy),
            self.patch_cost(a, b, r, c, dx + 1, dy),
        );
        let oy = vertex(
            self.patch_cost(a, b, r, c, dx, dy - 1),
            self.patch_cost(a, b, r, c, dx, dy + 1),
        );
        (ox, oy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Smooth random texture sampled on integer pixel positions.
    fn texture(size: ImageSize, shift_x: usize, seed: u64) -> Image<u8, 3> {
        const CELL: usize = 4;
        let (gw, gh) = ((size.width + 64) / CELL + 2, size.height / CELL + 2);
        let mut rng = StdRng::seed_from_u64(seed);
        let lattice: Vec<f32> = (0..gw * gh).map(|_| rng.random::<f32>()).collect();

        Image::from_fn(size, |r, c, _| {
            let x = c + 32 - shift_x;
            let (gx, fx) = (x / CELL, (x % CELL) as f32 / CELL as f32);
            let (gy, fy) = (r / CELL, (r % CELL) as f32 / CELL as f32);
            let at = |i: usize, j: usize| lattice[j * gw + i];
            let top = at(gx, gy) * (1.0 - fx) + at(gx + 1, gy) * fx;
            let bottom = at(gx, gy + 1) * (1.0 - fx) + at(gx + 1, gy + 1) * fx;
            ((top * (1.0 - fy) + bottom * fy) * 255.0).round() as u8
        })
    }

    #[test]
    fn pixel_coordinates() {
        let matcher = BlockMatcher::new(MatchDescriptor::TinyRomaV1);
        let (a, b) = matcher.to_pixel_coordinates(
            &[[-1.0, -1.0, 1.0, 1.0], [0.0, 0.5, -0.5, 0.0]],
            100,
            200,
            50,
            80,
        );
        assert_eq!(a, vec![[0.0, 0.0], [100.0, 75.0]]);
        assert_eq!(b, vec![[80.0, 50.0], [20.0, 25.0]]);
    }

    #[test]
    fn sampling_is_weighted_and_deterministic() -> Result<(), ModelError> {
        let matcher = BlockMatcher::new(MatchDescriptor::TinyRomaV1);
        let size = ImageSize {
            width: 100,
            height: 100,
        };
        let warp = Warp {
            size,
            data: (0..size.area()).map(|i| [i as f32, 0.0, 0.0, 0.0]).collect(),
        };
        // only the first 50 pixels carry any certainty, the first 10 below the threshold
        let certainty = Image::from_fn(size, |r, c, _| match (r, c) {
            (0, 0..=9) => 0.05,
            (0, 10..=49) => 0.5,
            _ => 0.0,
        });

        let (matches, conf) = matcher.sample(&warp, &certainty);
        assert_eq!(matches.len(), 50);
        assert_eq!(conf.len(), 50);
        assert!(matches.iter().all(|m| m[0] < 50.0));
        // saturated above the threshold
        for (m, &c) in matches.iter().zip(conf.iter()) {
            let expected = if m[0] < 10.0 { 0.05 } else { 1.0 };
            assert_eq!(c, expected);
        }

        let again = matcher.sample(&warp, &certainty);
        assert_eq!(again.0, matches);
        Ok(())
    }

    #[test]
    fn sample_count_is_capped() -> Result<(), ModelError> {
        let mut matcher = BlockMatcher::new(MatchDescriptor::TinyRomaV1);
        matcher.load_weights(MatchWeights {
            num_samples: 10,
            ..MatchWeights::default()
        })?;
        let size = ImageSize {
            width: 8,
            height: 8,
        };
        let warp = Warp {
            size,
            data: vec![[0.0; 4]; size.area()],
        };
        let certainty = Image::from_size_val(size, 0.5)?;
        let (matches, conf) = matcher.sample(&warp, &certainty);
        assert_eq!(matches.len(), 10);
        assert!(conf.iter().all(|&c| c == 1.0));
        Ok(())
    }

    #[test]
    fn recovers_a_horizontal_shift() -> Result<(), ModelError> {
        let matcher = BlockMatcher::new(MatchDescriptor::TinyRomaV1);
        let size = matcher.architecture().size;
        let a = texture(size, 0, 7);
        let b = texture(size, 6, 7);

        let (warp, certainty) = matcher.match_images(&a, &b)?;
        assert_eq!(warp.size(), size);
        assert!(certainty.as_slice().iter().all(|c| (0.0..=1.0).contains(c)));

        // a confident interior pixel moves by 6 working pixels
        let (r, c) = (60, 80);
        let i = r * size.width + c;
        assert!(certainty.as_slice()[i] > 0.5);
        let m = warp.as_slice()[i];
        let dx = (m[2] - m[0]) * size.width as f32 / 2.0;
        let dy = (m[3] - m[1]) * size.height as f32 / 2.0;
        assert_relative_eq!(dx, 6.0, epsilon = 0.3);
        assert_relative_eq!(dy, 0.0, epsilon = 0.3);
        Ok(())
    }

    #[test]
    fn rejects_invalid_weights() {
        let mut matcher = BlockMatcher::new(MatchDescriptor::TinyRomaV1);
        let res = matcher.load_weights(MatchWeights {
            photometric_sigma: 0.0,
            ..MatchWeights::default()
        });
        assert!(matches!(res, Err(ModelError::InvalidWeights(_))));
        assert_eq!(matcher.weights(), &MatchWeights::default());
    }
}
