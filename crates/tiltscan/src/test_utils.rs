//! Shared synthetic-data builders for unit tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::gaussian::GaussianParams;
use crate::grid::IntensityImage;

/// Render `params` over a `width × height` frame, optionally adding uniform
/// noise in `[-noise, noise]` drawn from a seeded generator.
pub(crate) fn synthetic_frame(
    width: usize,
    height: usize,
    params: &GaussianParams,
    noise: f64,
    seed: u64,
) -> IntensityImage {
    let mut data = params.evaluate_grid(width, height);
    if noise > 0.0 {
        let mut rng = StdRng::seed_from_u64(seed);
        for v in &mut data {
            *v += rng.gen_range(-noise..noise);
        }
    }
    IntensityImage::from_vec(width, height, data).expect("synthetic frame is well-formed")
}

/// Elliptic tilted spot that sits well inside a 96×80 frame.
pub(crate) fn spot_params() -> GaussianParams {
    GaussianParams {
        amplitude: 150.0,
        center_x: 41.3,
        center_y: 37.8,
        sigma_x: 12.0,
        sigma_y: 8.0,
        rotation: 0.35,
        offset: 6.0,
    }
}

/// A deliberately perturbed starting point for [`spot_params`].
pub(crate) fn spot_guess() -> GaussianParams {
    GaussianParams {
        amplitude: 120.0,
        center_x: 45.0,
        center_y: 35.0,
        sigma_x: 15.0,
        sigma_y: 10.0,
        rotation: 0.2,
        offset: 4.0,
    }
}
