//! Gaussian spot model and centroid fitting.
//!
//! Implements:
//! - Closed-form general 2D Gaussian with rotation, batched over pixel grids.
//! - Levenberg–Marquardt fit of the model to a sensor frame with
//!   covariance-derived standard errors.
//! - Fit diagnostics for caller-supplied renderers.

mod diagnostics;
mod fit;
mod model;
mod solver;
mod types;

pub use diagnostics::{
    contour_levels, FitDiagnostics, FitRenderError, FitRenderer, DEFAULT_CONTOUR_LEVELS,
};
pub use fit::{fit_centroid, CentroidFitter};
pub use model::{
    GaussianParams, DEFAULT_GUESS_AMPLITUDE, DEFAULT_GUESS_CENTER, DEFAULT_GUESS_OFFSET,
    DEFAULT_GUESS_SIGMA, N_PARAMS,
};
pub use types::{FitConfig, FitError, FitResult, DEFAULT_MAX_EVALUATIONS, DEFAULT_TOLERANCE};
