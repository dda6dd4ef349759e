//! Fit configuration, result and error types.

use serde::{Deserialize, Serialize};

use super::model::{GaussianParams, N_PARAMS};

/// Default evaluation budget: `200 · (N_PARAMS + 1)`.
pub const DEFAULT_MAX_EVALUATIONS: usize = 200 * (N_PARAMS + 1);
/// Default relative tolerance on cost reduction and on step size (√ε).
pub const DEFAULT_TOLERANCE: f64 = 1.490_116_119_384_765_6e-8;

// ── Error type ─────────────────────────────────────────────────────────────

/// Errors that can occur while fitting the Gaussian model to a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FitError {
    /// A parameter of the initial guess is unusable (non-finite, or a zero width).
    InvalidGuess {
        /// Parameter name.
        parameter: &'static str,
        /// Offending value.
        value: f64,
    },
    /// A solver setting cannot bound or drive the iteration.
    InvalidConfig {
        /// Field of [`FitConfig`].
        parameter: &'static str,
        /// Offending value.
        value: f64,
    },
    /// The frame has fewer pixels than the model has parameters.
    TooFewPixels {
        /// Required minimum number of pixels.
        needed: usize,
        /// Provided number of pixels.
        got: usize,
    },
    /// The cost at the initial guess is NaN or infinite.
    NonFiniteResidual,
    /// Evaluation budget exhausted before the tolerances were met.
    NotConverged {
        /// Model evaluations spent.
        evaluations: usize,
        /// Sum of squared residuals at the last accepted parameters.
        cost: f64,
    },
    /// No damped step reduces the cost although the step is still significant.
    Stalled {
        /// Damping at which the solver gave up.
        damping: f64,
        /// Sum of squared residuals at the last accepted parameters.
        cost: f64,
    },
    /// `JᵀJ` at the solution is not positive definite; standard errors are
    /// undefined. The fitted parameters are still reported.
    SingularCovariance {
        /// Parameters the solver converged to.
        params: GaussianParams,
        /// Sum of squared residuals at `params`.
        cost: f64,
    },
}

impl FitError {
    /// True for failures of the iterative solver itself.
    pub fn is_convergence_failure(&self) -> bool {
        matches!(
            self,
            Self::NonFiniteResidual | Self::NotConverged { .. } | Self::Stalled { .. }
        )
    }
}

impl std::fmt::Display for FitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidGuess { parameter, value } => {
                write!(f, "invalid initial guess: {} = {}", parameter, value)
            }
            Self::InvalidConfig { parameter, value } => {
                write!(f, "invalid solver config: {} = {}", parameter, value)
            }
            Self::TooFewPixels { needed, got } => {
                write!(f, "too few pixels: need {}, got {}", needed, got)
            }
            Self::NonFiniteResidual => write!(f, "non-finite residual at initial guess"),
            Self::NotConverged { evaluations, cost } => write!(
                f,
                "fit did not converge within {} evaluations (cost {:.6e})",
                evaluations, cost
            ),
            Self::Stalled { damping, cost } => write!(
                f,
                "fit stalled: no step reduces cost {:.6e} (damping {:.3e})",
                cost, damping
            ),
            Self::SingularCovariance { params, .. } => write!(
                f,
                "singular covariance at center ({:.3}, {:.3}); standard errors unavailable",
                params.center_x, params.center_y
            ),
        }
    }
}

impl std::error::Error for FitError {}

// ── Types ──────────────────────────────────────────────────────────────────

/// Levenberg–Marquardt budget and tolerances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Maximum number of model evaluations over the full frame.
    pub max_evaluations: usize,
    /// Stop when an accepted step reduces the cost by less than this fraction.
    pub cost_tolerance: f64,
    /// Stop when `‖step‖ ≤ step_tolerance · (‖params‖ + step_tolerance)`.
    pub step_tolerance: f64,
    /// Initial Marquardt damping.
    pub initial_damping: f64,
    /// Damping multiplier after a rejected step.
    pub damping_increase: f64,
    /// Damping multiplier after an accepted step.
    pub damping_decrease: f64,
    /// Give up when damping exceeds this value.
    pub max_damping: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_evaluations: DEFAULT_MAX_EVALUATIONS,
            cost_tolerance: DEFAULT_TOLERANCE,
            step_tolerance: DEFAULT_TOLERANCE,
            initial_damping: 1e-3,
            damping_increase: 10.0,
            damping_decrease: 0.1,
            max_damping: 1e16,
        }
    }
}

impl FitConfig {
    /// Reject settings under which the solver could fail to terminate or
    /// never move.
    pub fn validate(&self) -> Result<(), FitError> {
        let invalid = |parameter, value| Err(FitError::InvalidConfig { parameter, value });
        if self.max_evaluations == 0 {
            return invalid("max_evaluations", 0.0);
        }
        if !(self.damping_increase.is_finite() && self.damping_increase > 1.0) {
            return invalid("damping_increase", self.damping_increase);
        }
        if !(self.damping_decrease > 0.0 && self.damping_decrease < 1.0) {
            return invalid("damping_decrease", self.damping_decrease);
        }
        if !(self.max_damping.is_finite() && self.max_damping > 0.0) {
            return invalid("max_damping", self.max_damping);
        }
        if !(self.initial_damping.is_finite() && self.initial_damping >= 0.0) {
            return invalid("initial_damping", self.initial_damping);
        }
        for (parameter, value) in [
            ("cost_tolerance", self.cost_tolerance),
            ("step_tolerance", self.step_tolerance),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return invalid(parameter, value);
            }
        }
        Ok(())
    }
}

/// Outcome of a successful centroid fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    /// Fitted model parameters. Widths are reported as magnitudes.
    pub params: GaussianParams,
    /// One-sigma standard errors in [`GaussianParams::to_array`] order.
    pub standard_errors: [f64; N_PARAMS],
    /// Frame dimensions `[width, height]`.
    pub image_size: [usize; 2],
    /// Sum of squared residuals at `params`.
    pub cost: f64,
    /// Accepted solver steps.
    pub iterations: usize,
    /// Model evaluations over the full frame.
    pub evaluations: usize,
}

impl FitResult {
    /// Fitted centroid `[x, y]` in pixels.
    pub fn center(&self) -> [f64; 2] {
        [self.params.center_x, self.params.center_y]
    }

    /// Standard errors arranged like the parameters they belong to.
    pub fn standard_error_params(&self) -> GaussianParams {
        GaussianParams::from_array(self.standard_errors)
    }

    /// Root-mean-square residual per pixel.
    pub fn rms_residual(&self) -> f64 {
        let n = self.image_size[0] * self.image_size[1];
        if n == 0 {
            return 0.0;
        }
        (self.cost / n as f64).sqrt()
    }
}
