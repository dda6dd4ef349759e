use nalgebra::{SMatrix, SVector};

use super::model::N_PARAMS;
use super::types::FitConfig;

pub(super) type ParamVector = SVector<f64, N_PARAMS>;
pub(super) type ParamMatrix = SMatrix<f64, N_PARAMS, N_PARAMS>;

/// Gauss–Newton normal equations `JᵀJ`, `Jᵀr` and the cost `Σr²` for one
/// parameter vector, with `r = observed − model` and `J = ∂model/∂p`.
#[derive(Debug, Clone)]
pub(super) struct NormalEquations {
    pub jtj: ParamMatrix,
    pub jtr: ParamVector,
    pub cost: f64,
}

impl NormalEquations {
    pub fn zeros() -> Self {
        Self {
            jtj: ParamMatrix::zeros(),
            jtr: ParamVector::zeros(),
            cost: 0.0,
        }
    }

    /// Add one residual and its model gradient.
    #[inline]
    pub fn push(&mut self, residual: f64, gradient: &ParamVector) {
        self.cost += residual * residual;
        self.jtr.axpy(residual, gradient, 1.0);
        self.jtj.ger(1.0, gradient, gradient, 1.0);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Termination {
    CostTolerance,
    StepTolerance,
    ExactFit,
}

#[derive(Debug, Clone)]
pub(super) struct LmOutcome {
    pub params: ParamVector,
    pub normal: NormalEquations,
    pub iterations: usize,
    pub evaluations: usize,
    pub termination: Termination,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) enum LmFailure {
    NonFiniteStart,
    Exhausted { evaluations: usize, cost: f64 },
    Stalled { damping: f64, cost: f64 },
}

/// Damped normal-equation step `(JᵀJ + λ·diag(JᵀJ)) δ = Jᵀr`.
fn damped_step(normal: &NormalEquations, damping: f64) -> Option<ParamVector> {
    let mut lhs = normal.jtj;
    for k in 0..N_PARAMS {
        // Keep the scaling usable for parameters the data does not constrain.
        let d = normal.jtj[(k, k)].max(1e-12);
        lhs[(k, k)] += damping * d;
    }
    let step = lhs.cholesky()?.solve(&normal.jtr);
    step.iter().all(|v| v.is_finite()).then_some(step)
}

/// Levenberg–Marquardt minimization of `Σr²`.
///
/// `evaluate` returns the normal equations at a parameter vector. Every call
/// and every failed factorization of the damped system counts against
/// `config.max_evaluations`; `config` is expected to pass
/// [`FitConfig::validate`].
pub(super) fn levenberg_marquardt(
    init: ParamVector,
    config: &FitConfig,
    mut evaluate: impl FnMut(&ParamVector) -> NormalEquations,
) -> Result<LmOutcome, LmFailure> {
    let mut params = init;
    let mut normal = evaluate(&params);
    let mut evaluations = 1usize;
    if !normal.cost.is_finite() {
        return Err(LmFailure::NonFiniteStart);
    }

    let mut damping = config.initial_damping.max(f64::MIN_POSITIVE);
    let mut iterations = 0usize;
    let mut failed_steps = 0usize;
    let done = |params, normal, iterations, evaluations, termination| LmOutcome {
        params,
        normal,
        iterations,
        evaluations,
        termination,
    };

    loop {
        if normal.cost == 0.0 {
            return Ok(done(params, normal, iterations, evaluations, Termination::ExactFit));
        }

        if evaluations + failed_steps >= config.max_evaluations {
            return Err(LmFailure::Exhausted {
                evaluations,
                cost: normal.cost,
            });
        }

        let Some(step) = damped_step(&normal, damping) else {
            failed_steps += 1;
            damping *= config.damping_increase;
            if damping > config.max_damping {
                return Err(LmFailure::Stalled {
                    damping,
                    cost: normal.cost,
                });
            }
            continue;
        };

        let tol = config.step_tolerance;
        let small_step = step.norm() <= tol * (params.norm() + tol);
        let candidate = params + step;
        let trial = evaluate(&candidate);
        evaluations += 1;

        if trial.cost.is_finite() && trial.cost < normal.cost {
            let reduction = (normal.cost - trial.cost) / normal.cost;
            params = candidate;
            normal = trial;
            iterations += 1;
            damping = (damping * config.damping_decrease).max(f64::MIN_POSITIVE);
            tracing::debug!(
                "LM step {}: cost={:.6e} damping={:.3e}",
                iterations,
                normal.cost,
                damping
            );
            if reduction <= config.cost_tolerance {
                return Ok(done(params, normal, iterations, evaluations, Termination::CostTolerance));
            }
            if small_step {
                return Ok(done(params, normal, iterations, evaluations, Termination::StepTolerance));
            }
        } else {
            if small_step {
                return Ok(done(params, normal, iterations, evaluations, Termination::StepTolerance));
            }
            damping *= config.damping_increase;
            tracing::trace!(
                "LM step rejected: trial cost={:.6e}, damping -> {:.3e}",
                trial.cost,
                damping
            );
            if damping > config.max_damping {
                return Err(LmFailure::Stalled {
                    damping,
                    cost: normal.cost,
                });
            }
        }
    }
}

/// Residual-variance scaled covariance `(JᵀJ)⁻¹ · cost / (n − p)`.
///
/// Returns `None` when `JᵀJ` is not positive definite or the result is not
/// finite.
pub(super) fn covariance(normal: &NormalEquations, n_residuals: usize) -> Option<ParamMatrix> {
    if n_residuals <= N_PARAMS {
        return None;
    }
    let inv = normal.jtj.cholesky()?.inverse();
    let variance = normal.cost / (n_residuals - N_PARAMS) as f64;
    let cov = inv * variance;
    let ok = (0..N_PARAMS).all(|k| cov[(k, k)].is_finite() && cov[(k, k)] >= 0.0);
    ok.then_some(cov)
}
