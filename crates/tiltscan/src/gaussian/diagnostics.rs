//! Data handed to diagnostic renderers after a fit.
//!
//! The library never draws or writes files; a [`FitRenderer`] implementation
//! supplied by the caller decides what to do with the model grid and contour
//! levels.

use serde::Serialize;

use super::types::{FitError, FitResult};
use crate::grid::{Grid, IntensityImage};

/// Number of iso-contours drawn by default.
pub const DEFAULT_CONTOUR_LEVELS: usize = 8;

/// Fitted model sampled on the frame's pixel grid.
#[derive(Debug, Clone, Serialize)]
pub struct FitDiagnostics {
    /// Frame dimensions `[width, height]`.
    pub image_size: [usize; 2],
    /// Model intensity at every pixel (`rows = height`).
    pub model: Grid,
    /// `observed − model` at every pixel.
    pub residuals: Grid,
    /// Root-mean-square of `residuals`.
    pub rms_residual: f64,
    /// Model iso-levels, ascending.
    pub contour_levels: Vec<f64>,
}

impl FitDiagnostics {
    /// Evaluate the fitted model over `image` and pick `n_levels` contour levels.
    pub fn new(image: &IntensityImage, fit: &FitResult, n_levels: usize) -> Self {
        let (w, h) = (image.width(), image.height());
        let values = fit.params.evaluate_grid(w, h);
        let model = Grid::from_fn(h, w, |r, c| values[r * w + c]);
        let residuals = Grid::from_fn(h, w, |r, c| image.get(c, r) - values[r * w + c]);

        let n = residuals.data().len().max(1) as f64;
        let rms_residual = (residuals.data().iter().map(|r| r * r).sum::<f64>() / n).sqrt();

        let (lo, hi) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });

        Self {
            image_size: [w, h],
            model,
            residuals,
            rms_residual,
            contour_levels: contour_levels(lo, hi, n_levels),
        }
    }
}

/// `n` evenly spaced levels strictly inside `(lo, hi)`.
pub fn contour_levels(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    if n == 0 || !lo.is_finite() || !hi.is_finite() || hi <= lo {
        return Vec::new();
    }
    let step = (hi - lo) / (n + 1) as f64;
    (1..=n).map(|k| lo + step * k as f64).collect()
}

/// Consumer of fit diagnostics, e.g. an image writer or a plotting backend.
pub trait FitRenderer {
    type Error;

    /// Number of contour levels to request.
    fn contour_levels(&self) -> usize {
        DEFAULT_CONTOUR_LEVELS
    }

    fn render(
        &mut self,
        image: &IntensityImage,
        fit: &FitResult,
        diagnostics: &FitDiagnostics,
    ) -> Result<(), Self::Error>;
}

/// Failure of [`CentroidFitter::fit_and_render`](super::CentroidFitter::fit_and_render).
#[derive(Debug)]
pub enum FitRenderError<E> {
    /// The fit itself failed; nothing was rendered.
    Fit(FitError),
    /// The fit succeeded but the renderer failed.
    Render(E),
}

impl<E: std::fmt::Display> std::fmt::Display for FitRenderError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fit(e) => write!(f, "fit failed: {}", e),
            Self::Render(e) => write!(f, "rendering failed: {}", e),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for FitRenderError<E> {}
