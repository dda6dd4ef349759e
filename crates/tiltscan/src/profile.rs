//! Surface height reconstruction from x/y slope fields.
//!
//! Every row of the x-slope grid is integrated along x and every column of
//! the y-slope grid along y, each as a running Simpson integral from the
//! first sample. The two partial profiles are summed cell by cell:
//!
//!   height[r][c] = ∫₀^{x_c} ∂h/∂x (x, y_r) dx + ∫₀^{y_r} ∂h/∂y (x_c, y) dy
//!
//! The sum is only meaningful when the slopes come from a (near) gradient
//! field whose x and y contributions separate; this is assumed, not checked.
//! Heights are relative: the origin cell is always zero.

use serde::Serialize;

use crate::grid::Grid;
use crate::integrate::{validate_axis, IntegrationError, SimpsonIntegrator};

// ── Error type ─────────────────────────────────────────────────────────────

/// Errors raised by [`ProfileReconstructor::reconstruct`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileError {
    /// x- and y-slope grids have different shapes.
    ShapeMismatch {
        /// `[rows, cols]` of the x-slope grid.
        x_slope: [usize; 2],
        /// `[rows, cols]` of the y-slope grid.
        y_slope: [usize; 2],
    },
    /// An axis does not match the grid dimension it labels.
    AxisLength {
        /// `"x"` or `"y"`.
        axis: &'static str,
        /// Grid columns (x) or rows (y).
        expected: usize,
        /// Axis length.
        got: usize,
    },
    /// An axis cannot be integrated over.
    InvalidAxis {
        /// `"x"` or `"y"`.
        axis: &'static str,
        /// Underlying integrator error.
        source: IntegrationError,
    },
}

impl std::fmt::Display for ProfileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShapeMismatch { x_slope, y_slope } => write!(
                f,
                "slope grids differ in shape: x {}x{}, y {}x{}",
                x_slope[0], x_slope[1], y_slope[0], y_slope[1]
            ),
            Self::AxisLength {
                axis,
                expected,
                got,
            } => write!(
                f,
                "{} axis has {} coordinates, grid needs {}",
                axis, got, expected
            ),
            Self::InvalidAxis { axis, source } => write!(f, "invalid {} axis: {}", axis, source),
        }
    }
}

impl std::error::Error for ProfileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidAxis { source, .. } => Some(source),
            _ => None,
        }
    }
}

// ── Types ──────────────────────────────────────────────────────────────────

/// Pair of same-shape grids holding `∂h/∂x` and `∂h/∂y`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlopeField {
    x_slope: Grid,
    y_slope: Grid,
}

impl SlopeField {
    pub fn new(x_slope: Grid, y_slope: Grid) -> Result<Self, ProfileError> {
        if x_slope.shape() != y_slope.shape() {
            return Err(ProfileError::ShapeMismatch {
                x_slope: x_slope.shape(),
                y_slope: y_slope.shape(),
            });
        }
        Ok(Self { x_slope, y_slope })
    }

    /// Sample analytic partial derivatives on the `y_axis × x_axis` grid.
    pub fn from_fn(
        x_axis: &[f64],
        y_axis: &[f64],
        dh_dx: impl Fn(f64, f64) -> f64,
        dh_dy: impl Fn(f64, f64) -> f64,
    ) -> Self {
        let (rows, cols) = (y_axis.len(), x_axis.len());
        Self {
            x_slope: Grid::from_fn(rows, cols, |r, c| dh_dx(x_axis[c], y_axis[r])),
            y_slope: Grid::from_fn(rows, cols, |r, c| dh_dy(x_axis[c], y_axis[r])),
        }
    }

    pub fn x_slope(&self) -> &Grid {
        &self.x_slope
    }

    pub fn y_slope(&self) -> &Grid {
        &self.y_slope
    }

    /// `[rows, cols]`.
    pub fn shape(&self) -> [usize; 2] {
        self.x_slope.shape()
    }
}

/// Reconstructed relative heights, same shape as the slope field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct HeightProfile {
    heights: Grid,
}

impl HeightProfile {
    pub fn grid(&self) -> &Grid {
        &self.heights
    }

    pub fn into_grid(self) -> Grid {
        self.heights
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.heights.get(row, col)
    }

    pub fn shape(&self) -> [usize; 2] {
        self.heights.shape()
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.heights.to_rows()
    }
}

/// Two-sweep Simpson reconstruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfileReconstructor {
    pub integrator: SimpsonIntegrator,
}

fn check_axis(axis: &'static str, coords: &[f64], expected: usize) -> Result<(), ProfileError> {
    if coords.len() != expected {
        return Err(ProfileError::AxisLength {
            axis,
            expected,
            got: coords.len(),
        });
    }
    let source = if coords.len() < 2 {
        Some(IntegrationError::TooFewSamples {
            needed: 2,
            got: coords.len(),
        })
    } else {
        validate_axis(coords).err()
    };
    match source {
        Some(source) => Err(ProfileError::InvalidAxis { axis, source }),
        None => Ok(()),
    }
}

impl ProfileReconstructor {
    pub fn new(integrator: SimpsonIntegrator) -> Self {
        Self { integrator }
    }

    /// Height profile from `field`, with `x_axis` labelling columns and
    /// `y_axis` labelling rows.
    pub fn reconstruct(
        &self,
        field: &SlopeField,
        x_axis: &[f64],
        y_axis: &[f64],
    ) -> Result<HeightProfile, ProfileError> {
        let ix = self.integrate_along_x(field.x_slope(), x_axis)?;
        let iy = self.integrate_along_y(field.y_slope(), y_axis)?;

        let mut heights = ix;
        for (h, dy) in heights.data_mut().iter_mut().zip(iy.data()) {
            *h += dy;
        }
        tracing::debug!(
            "reconstructed {}x{} height profile",
            heights.rows(),
            heights.cols()
        );
        Ok(HeightProfile { heights })
    }

    /// Running integral of every row along x.
    pub fn integrate_along_x(&self, slopes: &Grid, x_axis: &[f64]) -> Result<Grid, ProfileError> {
        check_axis("x", x_axis, slopes.cols())?;
        let mut out = Grid::zeros(slopes.rows(), slopes.cols());
        let cols = slopes.cols();
        for (r, dst) in out.data_mut().chunks_exact_mut(cols).enumerate() {
            let running = self.integrator.cumulative_unchecked(slopes.row(r), x_axis);
            dst.copy_from_slice(&running);
        }
        Ok(out)
    }

    /// Running integral of every column along y.
    pub fn integrate_along_y(&self, slopes: &Grid, y_axis: &[f64]) -> Result<Grid, ProfileError> {
        check_axis("y", y_axis, slopes.rows())?;
        let (rows, cols) = (slopes.rows(), slopes.cols());
        let mut out = Grid::zeros(rows, cols);
        let data = out.data_mut();
        for c in 0..cols {
            let running = self
                .integrator
                .cumulative_unchecked(&slopes.column(c), y_axis);
            for (r, v) in running.into_iter().enumerate() {
                data[r * cols + c] = v;
            }
        }
        Ok(out)
    }
}

/// Reconstruct with the default integrator.
pub fn reconstruct_profile(
    field: &SlopeField,
    x_axis: &[f64],
    y_axis: &[f64],
) -> Result<HeightProfile, ProfileError> {
    ProfileReconstructor::default().reconstruct(field, x_axis, y_axis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrate::EvenIntervalRule;
    use approx::assert_relative_eq;

    fn linspace(a: f64, b: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| a + (b - a) * i as f64 / (n - 1) as f64)
            .collect()
    }

    fn bowl(x: f64, y: f64) -> f64 {
        x * x + (y / 2.0) * (y / 2.0)
    }

    #[test]
    fn reconstructs_quadratic_bowl_regression_case() {
        let x = linspace(0.0, 5.0, 6);
        let y = linspace(0.0, 6.0, 7);
        let field = SlopeField::from_fn(&x, &y, |x, _| 2.0 * x, |_, y| 0.5 * y);
        assert_eq!(field.shape(), [7, 6]);

        let profile = reconstruct_profile(&field, &x, &y).expect("valid field");
        assert_eq!(profile.shape(), [7, 6]);
        for (r, &yv) in y.iter().enumerate() {
            for (c, &xv) in x.iter().enumerate() {
                assert_relative_eq!(profile.get(r, c), bowl(xv, yv), epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn bowl_profile_equals_outer_sum_of_edge_integrals() {
        let x = linspace(0.0, 5.0, 6);
        let y = linspace(0.0, 6.0, 7);
        let hx: Vec<f64> = x.iter().map(|v| 2.0 * v).collect();
        let hy: Vec<f64> = y.iter().map(|v| 0.5 * v).collect();
        let integ = SimpsonIntegrator::default();
        let ix0 = integ.cumulative(&hx, &x).unwrap();
        let iy0 = integ.cumulative(&hy, &y).unwrap();

        let field = SlopeField::from_fn(&x, &y, |x, _| 2.0 * x, |_, y| 0.5 * y);
        let profile = reconstruct_profile(&field, &x, &y).unwrap();
        for r in 0..y.len() {
            for c in 0..x.len() {
                assert_eq!(profile.get(r, c), iy0[r] + ix0[c]);
            }
        }
    }

    #[test]
    fn zero_slopes_give_flat_profile() {
        let x = linspace(-1.0, 1.0, 5);
        let y = linspace(0.0, 3.0, 4);
        let field = SlopeField::new(Grid::zeros(4, 5), Grid::zeros(4, 5)).unwrap();
        let profile = reconstruct_profile(&field, &x, &y).unwrap();
        assert!(profile.grid().data().iter().all(|&h| h == 0.0));
    }

    #[test]
    fn separable_surface_on_uneven_axes() {
        let x: Vec<f64> = linspace(0.0, 1.0, 41).iter().map(|t| t * t * 2.0).collect();
        let y: Vec<f64> = linspace(0.0, 1.5, 30);
        let h = |x: f64, y: f64| x.sin() + y * y * y;
        let field = SlopeField::from_fn(&x, &y, |x, _| x.cos(), |_, y| 3.0 * y * y);
        for rule in [
            EvenIntervalRule::Average,
            EvenIntervalRule::TrapezoidLast,
            EvenIntervalRule::TrapezoidFirst,
        ] {
            let recon = ProfileReconstructor::new(SimpsonIntegrator::new(rule));
            let profile = recon.reconstruct(&field, &x, &y).unwrap();
            assert_eq!(profile.get(0, 0), 0.0);
            for r in 0..y.len() {
                for c in 0..x.len() {
                    let expected = h(x[c], y[r]) - h(x[0], y[0]);
                    assert_relative_eq!(profile.get(r, c), expected, epsilon = 1e-3);
                }
            }
        }
    }

    #[test]
    fn shape_errors_are_reported() {
        let err = SlopeField::new(Grid::zeros(3, 4), Grid::zeros(4, 3)).unwrap_err();
        assert_eq!(
            err,
            ProfileError::ShapeMismatch {
                x_slope: [3, 4],
                y_slope: [4, 3]
            }
        );

        let field = SlopeField::new(Grid::zeros(3, 4), Grid::zeros(3, 4)).unwrap();
        let x = linspace(0.0, 1.0, 4);
        let y = linspace(0.0, 1.0, 3);
        assert_eq!(
            reconstruct_profile(&field, &x[..3], &y),
            Err(ProfileError::AxisLength {
                axis: "x",
                expected: 4,
                got: 3
            })
        );
        let bad_y = [0.0, 2.0, 1.0];
        assert_eq!(
            reconstruct_profile(&field, &x, &bad_y),
            Err(ProfileError::InvalidAxis {
                axis: "y",
                source: IntegrationError::NonIncreasing { index: 2 }
            })
        );
    }

    #[test]
    fn single_sample_axis_is_too_short() {
        let field = SlopeField::new(Grid::zeros(1, 3), Grid::zeros(1, 3)).unwrap();
        let err = reconstruct_profile(&field, &[0.0, 1.0, 2.0], &[0.0]).unwrap_err();
        assert_eq!(
            err,
            ProfileError::InvalidAxis {
                axis: "y",
                source: IntegrationError::TooFewSamples { needed: 2, got: 1 }
            }
        );
    }
}
