//! Closed-form rotated 2D Gaussian.

use serde::{Deserialize, Serialize};

/// Number of free parameters of the model.
pub const N_PARAMS: usize = 7;

/// Default initial-guess amplitude (counts above offset).
pub const DEFAULT_GUESS_AMPLITUDE: f64 = 200.0;
/// Default initial-guess center, tuned for a 1280×1024 sensor.
pub const DEFAULT_GUESS_CENTER: [f64; 2] = [640.0, 512.0];
/// Default initial-guess widths `[sigma_x, sigma_y]` in pixels.
pub const DEFAULT_GUESS_SIGMA: [f64; 2] = [180.0, 150.0];
/// Default initial-guess background level.
pub const DEFAULT_GUESS_OFFSET: f64 = 5.0;

/// Parameters of the general 2D Gaussian
///
/// `f(x, y) = offset + amplitude · exp(−(a·dx² + 2b·dx·dy + c·dy²))`
///
/// with `dx = x − center_x`, `dy = y − center_y` and `a`, `b`, `c` derived
/// from the widths and the rotation angle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianParams {
    /// Peak height above `offset`.
    pub amplitude: f64,
    /// Peak x position in pixels (column axis).
    pub center_x: f64,
    /// Peak y position in pixels (row axis).
    pub center_y: f64,
    /// Standard deviation along the rotated x axis, pixels.
    pub sigma_x: f64,
    /// Standard deviation along the rotated y axis, pixels.
    pub sigma_y: f64,
    /// Rotation of the x axis in radians.
    pub rotation: f64,
    /// Constant background.
    pub offset: f64,
}

impl Default for GaussianParams {
    fn default() -> Self {
        Self {
            amplitude: DEFAULT_GUESS_AMPLITUDE,
            center_x: DEFAULT_GUESS_CENTER[0],
            center_y: DEFAULT_GUESS_CENTER[1],
            sigma_x: DEFAULT_GUESS_SIGMA[0],
            sigma_y: DEFAULT_GUESS_SIGMA[1],
            rotation: 0.0,
            offset: DEFAULT_GUESS_OFFSET,
        }
    }
}

/// Quadratic-form coefficients, computed once per parameter set.
#[derive(Debug, Clone, Copy)]
struct QuadForm {
    a: f64,
    b: f64,
    c: f64,
}

impl QuadForm {
    fn new(p: &GaussianParams) -> Self {
        let (sin_t, cos_t) = p.rotation.sin_cos();
        let sin_2t = (2.0 * p.rotation).sin();
        let sx2 = p.sigma_x * p.sigma_x;
        let sy2 = p.sigma_y * p.sigma_y;
        Self {
            a: cos_t * cos_t / (2.0 * sx2) + sin_t * sin_t / (2.0 * sy2),
            b: -sin_2t / (4.0 * sx2) + sin_2t / (4.0 * sy2),
            c: sin_t * sin_t / (2.0 * sx2) + cos_t * cos_t / (2.0 * sy2),
        }
    }

    #[inline]
    fn eval(&self, dx: f64, dy: f64) -> f64 {
        self.a * dx * dx + 2.0 * self.b * dx * dy + self.c * dy * dy
    }
}

/// Partial derivatives of `a`, `b`, `c` with respect to one parameter.
#[derive(Debug, Clone, Copy)]
struct QuadFormDerivative {
    da: f64,
    db: f64,
    dc: f64,
}

impl QuadFormDerivative {
    #[inline]
    fn eval(&self, dx: f64, dy: f64) -> f64 {
        self.da * dx * dx + 2.0 * self.db * dx * dy + self.dc * dy * dy
    }
}

/// Precomputed state for repeated evaluation with one parameter set.
///
/// Trigonometry and width reciprocals are hoisted out of the per-pixel
/// loop; the fitter builds one of these per solver evaluation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PreparedGaussian {
    params: GaussianParams,
    q: QuadForm,
    d_sigma_x: QuadFormDerivative,
    d_sigma_y: QuadFormDerivative,
    d_rotation: QuadFormDerivative,
}

impl PreparedGaussian {
    pub(crate) fn new(params: &GaussianParams) -> Self {
        let (sin_t, cos_t) = params.rotation.sin_cos();
        let sin_2t = (2.0 * params.rotation).sin();
        let cos_2t = (2.0 * params.rotation).cos();
        let sx = params.sigma_x;
        let sy = params.sigma_y;
        let sx2 = sx * sx;
        let sy2 = sy * sy;
        let sx3 = sx2 * sx;
        let sy3 = sy2 * sy;

        Self {
            params: *params,
            q: QuadForm::new(params),
            d_sigma_x: QuadFormDerivative {
                da: -cos_t * cos_t / sx3,
                db: sin_2t / (2.0 * sx3),
                dc: -sin_t * sin_t / sx3,
            },
            d_sigma_y: QuadFormDerivative {
                da: -sin_t * sin_t / sy3,
                db: -sin_2t / (2.0 * sy3),
                dc: -cos_t * cos_t / sy3,
            },
            d_rotation: QuadFormDerivative {
                da: -sin_2t / (2.0 * sx2) + sin_2t / (2.0 * sy2),
                db: -cos_2t / (2.0 * sx2) + cos_2t / (2.0 * sy2),
                dc: sin_2t / (2.0 * sx2) - sin_2t / (2.0 * sy2),
            },
        }
    }

    #[inline]
    pub(crate) fn value(&self, x: f64, y: f64) -> f64 {
        let dx = x - self.params.center_x;
        let dy = y - self.params.center_y;
        self.params.offset + self.params.amplitude * (-self.q.eval(dx, dy)).exp()
    }

    /// Model value and its gradient in [`GaussianParams::to_array`] order.
    #[inline]
    pub(crate) fn value_and_gradient(&self, x: f64, y: f64) -> (f64, [f64; N_PARAMS]) {
        let p = &self.params;
        let dx = x - p.center_x;
        let dy = y - p.center_y;
        let e = (-self.q.eval(dx, dy)).exp();
        let ae = p.amplitude * e;
        let QuadForm { a, b, c } = self.q;

        let grad = [
            e,
            ae * 2.0 * (a * dx + b * dy),
            ae * 2.0 * (b * dx + c * dy),
            -ae * self.d_sigma_x.eval(dx, dy),
            -ae * self.d_sigma_y.eval(dx, dy),
            -ae * self.d_rotation.eval(dx, dy),
            1.0,
        ];
        (p.offset + ae, grad)
    }
}

impl GaussianParams {
    /// Parameters in solver order:
    /// `[amplitude, center_x, center_y, sigma_x, sigma_y, rotation, offset]`.
    pub fn to_array(&self) -> [f64; N_PARAMS] {
        [
            self.amplitude,
            self.center_x,
            self.center_y,
            self.sigma_x,
            self.sigma_y,
            self.rotation,
            self.offset,
        ]
    }

    /// Inverse of [`GaussianParams::to_array`].
    pub fn from_array(v: [f64; N_PARAMS]) -> Self {
        Self {
            amplitude: v[0],
            center_x: v[1],
            center_y: v[2],
            sigma_x: v[3],
            sigma_y: v[4],
            rotation: v[5],
            offset: v[6],
        }
    }

    /// Parameter names in solver order, for diagnostics.
    pub const NAMES: [&'static str; N_PARAMS] = [
        "amplitude",
        "center_x",
        "center_y",
        "sigma_x",
        "sigma_y",
        "rotation",
        "offset",
    ];

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }

    /// Model intensity at one point.
    pub fn evaluate(&self, x: f64, y: f64) -> f64 {
        let dx = x - self.center_x;
        let dy = y - self.center_y;
        self.offset + self.amplitude * (-QuadForm::new(self).eval(dx, dy)).exp()
    }

    /// Model intensity at each `[x, y]` point.
    pub fn evaluate_points(&self, points: &[[f64; 2]]) -> Vec<f64> {
        let prepared = PreparedGaussian::new(self);
        points.iter().map(|&[x, y]| prepared.value(x, y)).collect()
    }

    /// Model intensity over the pixel meshgrid `x ∈ [0, width)`,
    /// `y ∈ [0, height)`, flattened row-major to match an image buffer.
    pub fn evaluate_grid(&self, width: usize, height: usize) -> Vec<f64> {
        let prepared = PreparedGaussian::new(self);
        let mut out = Vec::with_capacity(width * height);
        for row in 0..height {
            let y = row as f64;
            out.extend((0..width).map(|col| prepared.value(col as f64, y)));
        }
        out
    }

    /// Model intensity and analytic partial derivatives with respect to
    /// each parameter, in [`GaussianParams::to_array`] order.
    pub fn evaluate_with_gradient(&self, x: f64, y: f64) -> (f64, [f64; N_PARAMS]) {
        PreparedGaussian::new(self).value_and_gradient(x, y)
    }
}
