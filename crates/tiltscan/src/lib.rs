//! tiltscan — surface tilt from reflected-spot images and surface height
//! from slope fields.
//!
//! A laser spot reflected off the surface under test lands on a CMOS sensor.
//! The pipeline stages are:
//!
//! 1. **Centroid** – Levenberg–Marquardt fit of a rotated 2D Gaussian to the
//!    sensor frame, with covariance-derived standard errors.
//! 2. **Tilt** – spot position to surface tilt (arcseconds) and slope through
//!    the fixed bench geometry.
//! 3. **Profile** – running Simpson integration of x/y slope fields into a
//!    relative height map.
//!
//! # Public API
//! - [`CentroidFitter`] and [`GaussianParams`] for spot fitting
//! - [`TiltEstimator`] for tilt and slope conversion
//! - [`SimpsonIntegrator`] and [`ProfileReconstructor`] for integration
//! - [`TiltScanConfig`] bundling all of the above for serialized runs

mod config;
mod gaussian;
mod grid;
mod integrate;
mod profile;
mod tilt;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::TiltScanConfig;
pub use gaussian::{
    contour_levels, fit_centroid, CentroidFitter, FitConfig, FitDiagnostics, FitError,
    FitRenderError, FitRenderer, FitResult, GaussianParams, DEFAULT_CONTOUR_LEVELS,
    DEFAULT_GUESS_AMPLITUDE, DEFAULT_GUESS_CENTER, DEFAULT_GUESS_OFFSET, DEFAULT_GUESS_SIGMA,
    DEFAULT_MAX_EVALUATIONS, DEFAULT_TOLERANCE, N_PARAMS,
};
pub use grid::{Grid, GridError, IntensityImage};
pub use integrate::{simpson, validate_axis, EvenIntervalRule, IntegrationError, SimpsonIntegrator};
pub use profile::{
    reconstruct_profile, HeightProfile, ProfileError, ProfileReconstructor, SlopeField,
};
pub use tilt::{
    BenchGeometry, SensorSpec, SlopeConversion, SurfaceSlopes, TiltAngles, TiltEstimator,
    DEFAULT_PARALLEL_DISTANCE_M, DEFAULT_PERPENDICULAR_DISTANCE_M, DEFAULT_PIXEL_SIZE_M,
};
