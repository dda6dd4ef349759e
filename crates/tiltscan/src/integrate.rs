//! Composite Simpson's rule over sampled, possibly non-uniformly spaced data.
//!
//! Each pair of intervals `(h0, h1)` starting at sample `i` contributes
//!
//!   (h0 + h1)/6 · ( y[i]·(2 − h1/h0) + y[i+1]·(h0 + h1)²/(h0·h1) + y[i+2]·(2 − h0/h1) )
//!
//! which is exact for quadratics on any spacing. An even number of samples
//! leaves one interval over; [`EvenIntervalRule`] decides where the
//! trapezoid for it goes.

use serde::{Deserialize, Serialize};

// ── Error type ─────────────────────────────────────────────────────────────

/// Invalid input to the integrator.
#[derive(Debug, Clone, PartialEq)]
pub enum IntegrationError {
    /// `samples` and `coordinates` differ in length.
    LengthMismatch {
        /// Number of samples.
        samples: usize,
        /// Number of coordinates.
        coordinates: usize,
    },
    /// Fewer than two samples.
    TooFewSamples {
        /// Required minimum number of samples.
        needed: usize,
        /// Provided number of samples.
        got: usize,
    },
    /// `coordinates[index] <= coordinates[index - 1]`.
    NonIncreasing {
        /// Index of the first offending coordinate.
        index: usize,
    },
    /// A coordinate is NaN or infinite.
    NonFiniteCoordinate {
        /// Index of the offending coordinate.
        index: usize,
    },
}

impl std::fmt::Display for IntegrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LengthMismatch {
                samples,
                coordinates,
            } => write!(
                f,
                "length mismatch: {} samples, {} coordinates",
                samples, coordinates
            ),
            Self::TooFewSamples { needed, got } => {
                write!(f, "too few samples: need {}, got {}", needed, got)
            }
            Self::NonIncreasing { index } => {
                write!(f, "coordinates not strictly increasing at index {}", index)
            }
            Self::NonFiniteCoordinate { index } => {
                write!(f, "non-finite coordinate at index {}", index)
            }
        }
    }
}

impl std::error::Error for IntegrationError {}

// ── Types ──────────────────────────────────────────────────────────────────

/// Treatment of the leftover interval when the sample count is even.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvenIntervalRule {
    /// Mean of [`TrapezoidLast`](Self::TrapezoidLast) and
    /// [`TrapezoidFirst`](Self::TrapezoidFirst).
    #[default]
    Average,
    /// Simpson on the first `N − 2` intervals, trapezoid on the last one.
    TrapezoidLast,
    /// Trapezoid on the first interval, Simpson on the remaining ones.
    TrapezoidFirst,
}

/// Composite Simpson integrator.
///
/// Stateless apart from its configuration; every call is independent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimpsonIntegrator {
    /// Placement of the trapezoid on even sample counts.
    pub even_rule: EvenIntervalRule,
}

/// Check that `coordinates` is finite and strictly increasing.
pub fn validate_axis(coordinates: &[f64]) -> Result<(), IntegrationError> {
    if let Some(index) = coordinates.iter().position(|c| !c.is_finite()) {
        return Err(IntegrationError::NonFiniteCoordinate { index });
    }
    if let Some(w) = coordinates.windows(2).position(|w| w[1] <= w[0]) {
        return Err(IntegrationError::NonIncreasing { index: w + 1 });
    }
    Ok(())
}

fn validate(samples: &[f64], coordinates: &[f64]) -> Result<(), IntegrationError> {
    if samples.len() != coordinates.len() {
        return Err(IntegrationError::LengthMismatch {
            samples: samples.len(),
            coordinates: coordinates.len(),
        });
    }
    if samples.len() < 2 {
        return Err(IntegrationError::TooFewSamples {
            needed: 2,
            got: samples.len(),
        });
    }
    validate_axis(coordinates)
}

/// Simpson sum over interval pairs starting at `start, start + 2, …` below `stop`.
fn simpson_pairs(y: &[f64], x: &[f64], start: usize, stop: usize) -> f64 {
    let mut total = 0.0;
    for i in (start..stop).step_by(2) {
        let h0 = x[i + 1] - x[i];
        let h1 = x[i + 2] - x[i + 1];
        let hsum = h0 + h1;
        let hprod = h0 * h1;
        let h0_div_h1 = h0 / h1;
        total += hsum / 6.0
            * (y[i] * (2.0 - 1.0 / h0_div_h1)
                + y[i + 1] * hsum * hsum / hprod
                + y[i + 2] * (2.0 - h0_div_h1));
    }
    total
}

impl SimpsonIntegrator {
    pub fn new(even_rule: EvenIntervalRule) -> Self {
        Self { even_rule }
    }

    /// Definite integral of `samples` over `coordinates`.
    pub fn integrate(&self, samples: &[f64], coordinates: &[f64]) -> Result<f64, IntegrationError> {
        validate(samples, coordinates)?;
        Ok(self.integrate_unchecked(samples, coordinates))
    }

    /// Running integral: element `i` integrates `samples[..=i]`, element 0 is 0.
    pub fn cumulative(
        &self,
        samples: &[f64],
        coordinates: &[f64],
    ) -> Result<Vec<f64>, IntegrationError> {
        validate(samples, coordinates)?;
        Ok(self.cumulative_unchecked(samples, coordinates))
    }

    /// Caller guarantees equal lengths and a valid axis.
    pub(crate) fn cumulative_unchecked(&self, samples: &[f64], coordinates: &[f64]) -> Vec<f64> {
        let mut out = Vec::with_capacity(samples.len());
        out.push(0.0);
        for end in 2..=samples.len() {
            out.push(self.integrate_unchecked(&samples[..end], &coordinates[..end]));
        }
        out
    }

    fn integrate_unchecked(&self, y: &[f64], x: &[f64]) -> f64 {
        let n = y.len();
        if n < 2 {
            return 0.0;
        }
        if n % 2 == 1 {
            return simpson_pairs(y, x, 0, n - 2);
        }

        let trapezoid_last = 0.5 * (x[n - 1] - x[n - 2]) * (y[n - 1] + y[n - 2]);
        let trapezoid_first = 0.5 * (x[1] - x[0]) * (y[1] + y[0]);
        // Pair loops are empty for n == 2, leaving a plain trapezoid.
        let simpson_head = || simpson_pairs(y, x, 0, n.saturating_sub(3));
        let simpson_tail = || simpson_pairs(y, x, 1, n - 2);

        match self.even_rule {
            EvenIntervalRule::TrapezoidLast => simpson_head() + trapezoid_last,
            EvenIntervalRule::TrapezoidFirst => simpson_tail() + trapezoid_first,
            EvenIntervalRule::Average => {
                let val = (trapezoid_last + trapezoid_first) / 2.0;
                let result = (simpson_head() + simpson_tail()) / 2.0;
                result + val
            }
        }
    }
}

/// Integrate with the default [`EvenIntervalRule`].
pub fn simpson(samples: &[f64], coordinates: &[f64]) -> Result<f64, IntegrationError> {
    SimpsonIntegrator::default().integrate(samples, coordinates)
}
