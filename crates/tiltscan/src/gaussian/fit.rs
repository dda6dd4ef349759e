//! Levenberg–Marquardt fit of the rotated Gaussian to a sensor frame.

use super::diagnostics::{FitDiagnostics, FitRenderError, FitRenderer};
use super::model::{GaussianParams, PreparedGaussian, N_PARAMS};
use super::solver::{covariance, levenberg_marquardt, LmFailure, NormalEquations, ParamVector};
use super::types::{FitConfig, FitError, FitResult};
use crate::grid::IntensityImage;

/// Locates the light spot in a frame by least-squares fitting
/// [`GaussianParams`] to every pixel.
///
/// Pixel `(col, row)` of the frame is the sample at `x = col`, `y = row`.
#[derive(Debug, Clone, Default)]
pub struct CentroidFitter {
    config: FitConfig,
}

impl CentroidFitter {
    pub fn new(config: FitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    /// Fit the model to `image` starting from `guess`.
    ///
    /// On success the standard errors are the square roots of the diagonal of
    /// `(JᵀJ)⁻¹ · cost / (n − 7)`. When that matrix does not exist the fit
    /// fails with [`FitError::SingularCovariance`], which still carries the
    /// fitted parameters. An unusable [`FitConfig`] is rejected up front with
    /// [`FitError::InvalidConfig`].
    pub fn fit(
        &self,
        image: &IntensityImage,
        guess: &GaussianParams,
    ) -> Result<FitResult, FitError> {
        self.config.validate()?;
        validate_guess(guess)?;
        let n = image.len();
        if n <= N_PARAMS {
            return Err(FitError::TooFewPixels {
                needed: N_PARAMS + 1,
                got: n,
            });
        }

        let init = ParamVector::from(guess.to_array());
        let outcome = levenberg_marquardt(init, &self.config, |p| {
            accumulate_normal_equations(image, p)
        })
        .map_err(|failure| match failure {
            LmFailure::NonFiniteStart => FitError::NonFiniteResidual,
            LmFailure::Exhausted { evaluations, cost } => {
                FitError::NotConverged { evaluations, cost }
            }
            LmFailure::Stalled { damping, cost } => FitError::Stalled { damping, cost },
        })?;

        let mut params = to_params(&outcome.params);
        // The model only sees sigma², report the magnitude.
        params.sigma_x = params.sigma_x.abs();
        params.sigma_y = params.sigma_y.abs();
        let cost = outcome.normal.cost;

        let Some(cov) = covariance(&outcome.normal, n) else {
            tracing::warn!(
                "singular covariance at center ({:.3}, {:.3}), cost={:.6e}",
                params.center_x,
                params.center_y,
                cost
            );
            return Err(FitError::SingularCovariance { params, cost });
        };
        let standard_errors = std::array::from_fn(|k| cov[(k, k)].sqrt());

        tracing::info!(
            "centroid fit: center=({:.3}, {:.3}) cost={:.6e} iterations={} evaluations={} ({:?})",
            params.center_x,
            params.center_y,
            cost,
            outcome.iterations,
            outcome.evaluations,
            outcome.termination
        );

        Ok(FitResult {
            params,
            standard_errors,
            image_size: [image.width(), image.height()],
            cost,
            iterations: outcome.iterations,
            evaluations: outcome.evaluations,
        })
    }

    /// Fit, then hand the frame and the sampled model to `renderer`.
    ///
    /// The renderer only runs after a successful fit.
    pub fn fit_and_render<R: FitRenderer>(
        &self,
        image: &IntensityImage,
        guess: &GaussianParams,
        renderer: &mut R,
    ) -> Result<FitResult, FitRenderError<R::Error>> {
        let fit = self.fit(image, guess).map_err(FitRenderError::Fit)?;
        let diagnostics = FitDiagnostics::new(image, &fit, renderer.contour_levels());
        renderer
            .render(image, &fit, &diagnostics)
            .map_err(FitRenderError::Render)?;
        Ok(fit)
    }
}

/// Fit with the default solver configuration.
pub fn fit_centroid(image: &IntensityImage, guess: &GaussianParams) -> Result<FitResult, FitError> {
    CentroidFitter::default().fit(image, guess)
}

fn validate_guess(guess: &GaussianParams) -> Result<(), FitError> {
    for (value, parameter) in guess.to_array().into_iter().zip(GaussianParams::NAMES) {
        if !value.is_finite() {
            return Err(FitError::InvalidGuess { parameter, value });
        }
    }
    for (value, parameter) in [(guess.sigma_x, "sigma_x"), (guess.sigma_y, "sigma_y")] {
        if value == 0.0 {
            return Err(FitError::InvalidGuess { parameter, value });
        }
    }
    Ok(())
}

fn to_params(v: &ParamVector) -> GaussianParams {
    GaussianParams::from_array(std::array::from_fn(|k| v[k]))
}

/// One pass over the frame: residuals, `JᵀJ` and `Jᵀr` without storing `J`.
fn accumulate_normal_equations(image: &IntensityImage, p: &ParamVector) -> NormalEquations {
    let model = PreparedGaussian::new(&to_params(p));
    let mut normal = NormalEquations::zeros();
    for (row, samples) in image.data().chunks_exact(image.width()).enumerate() {
        let y = row as f64;
        for (col, &observed) in samples.iter().enumerate() {
            let (value, grad) = model.value_and_gradient(col as f64, y);
            normal.push(observed - value, &ParamVector::from(grad));
        }
    }
    normal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{spot_guess, spot_params, synthetic_frame};
    use approx::assert_relative_eq;

    #[test]
    fn recovers_noise_free_spot() {
        let truth = spot_params();
        let frame = synthetic_frame(96, 80, &truth, 0.0, 0);
        let fit = fit_centroid(&frame, &spot_guess()).expect("fit should converge");

        assert_relative_eq!(fit.params.amplitude, truth.amplitude, epsilon = 1e-6);
        assert_relative_eq!(fit.params.center_x, truth.center_x, epsilon = 1e-6);
        assert_relative_eq!(fit.params.center_y, truth.center_y, epsilon = 1e-6);
        assert_relative_eq!(fit.params.sigma_x, truth.sigma_x, epsilon = 1e-6);
        assert_relative_eq!(fit.params.sigma_y, truth.sigma_y, epsilon = 1e-6);
        assert_relative_eq!(fit.params.rotation, truth.rotation, epsilon = 1e-6);
        assert_relative_eq!(fit.params.offset, truth.offset, epsilon = 1e-6);
        assert_eq!(fit.image_size, [96, 80]);
        assert!(fit.standard_errors.iter().all(|e| e.is_finite() && *e >= 0.0));
        assert!(fit.standard_errors[1] < 1e-6);
    }

    #[test]
    fn standard_errors_shrink_with_noise() {
        let truth = spot_params();
        let noisy = synthetic_frame(96, 80, &truth, 8.0, 7);
        let quiet = synthetic_frame(96, 80, &truth, 1.0, 7);

        let fit_noisy = fit_centroid(&noisy, &spot_guess()).expect("noisy fit");
        let fit_quiet = fit_centroid(&quiet, &spot_guess()).expect("quiet fit");

        assert_relative_eq!(fit_noisy.params.center_x, truth.center_x, epsilon = 0.3);
        assert_relative_eq!(fit_noisy.params.center_y, truth.center_y, epsilon = 0.3);
        assert_relative_eq!(fit_quiet.params.center_x, truth.center_x, epsilon = 0.05);
        assert_relative_eq!(fit_quiet.params.center_y, truth.center_y, epsilon = 0.05);

        for k in 0..N_PARAMS {
            assert!(
                fit_quiet.standard_errors[k] < fit_noisy.standard_errors[k],
                "{}: quiet {} vs noisy {}",
                GaussianParams::NAMES[k],
                fit_quiet.standard_errors[k],
                fit_noisy.standard_errors[k]
            );
        }
        assert!(fit_quiet.rms_residual() < fit_noisy.rms_residual());
    }

    #[test]
    fn exhausted_budget_is_not_converged() {
        let frame = synthetic_frame(96, 80, &spot_params(), 0.0, 0);
        let fitter = CentroidFitter::new(FitConfig {
            max_evaluations: 2,
            ..FitConfig::default()
        });
        let err = fitter.fit(&frame, &spot_guess()).unwrap_err();
        assert!(matches!(err, FitError::NotConverged { evaluations: 2, .. }));
        assert!(err.is_convergence_failure());
    }

    #[test]
    fn zero_width_guess_is_rejected() {
        let frame = synthetic_frame(16, 16, &spot_params(), 0.0, 0);
        let guess = GaussianParams {
            sigma_y: 0.0,
            ..spot_guess()
        };
        assert_eq!(
            fit_centroid(&frame, &guess),
            Err(FitError::InvalidGuess {
                parameter: "sigma_y",
                value: 0.0
            })
        );
        let guess = GaussianParams {
            center_x: f64::NAN,
            ..spot_guess()
        };
        assert!(matches!(
            fit_centroid(&frame, &guess),
            Err(FitError::InvalidGuess {
                parameter: "center_x",
                ..
            })
        ));
    }

    fn centered_spot() -> GaussianParams {
        GaussianParams {
            amplitude: 100.0,
            center_x: 7.5,
            center_y: 7.5,
            sigma_x: 3.0,
            sigma_y: 3.0,
            rotation: 0.0,
            offset: 5.0,
        }
    }

    #[test]
    fn degenerate_width_guess_stalls() {
        // sigma² underflows to a subnormal: the model collapses to the offset
        // and the Jacobian is NaN, so no damped step can be factorized.
        let frame = synthetic_frame(16, 16, &centered_spot(), 0.0, 0);
        let guess = GaussianParams {
            sigma_x: 1e-160,
            sigma_y: 1e-160,
            ..centered_spot()
        };
        let err = fit_centroid(&frame, &guess).unwrap_err();
        assert!(err.is_convergence_failure());
        match err {
            FitError::Stalled { damping, cost } => {
                assert!(damping > FitConfig::default().max_damping);
                assert!(cost.is_finite() && cost > 0.0);
            }
            other => panic!("expected stall, got {:?}", other),
        }
    }

    #[test]
    fn vanishing_width_at_pixel_center_is_non_finite() {
        let frame = synthetic_frame(16, 16, &centered_spot(), 0.0, 0);
        let guess = GaussianParams {
            center_x: 8.0,
            center_y: 8.0,
            sigma_x: 1e-300,
            sigma_y: 1e-300,
            ..centered_spot()
        };
        assert_eq!(fit_centroid(&frame, &guess), Err(FitError::NonFiniteResidual));
    }

    #[test]
    fn unbounded_solver_config_is_rejected() {
        let frame = synthetic_frame(16, 16, &centered_spot(), 0.0, 0);
        let guess = GaussianParams {
            sigma_x: 1e-160,
            sigma_y: 1e-160,
            ..centered_spot()
        };
        let cases = [
            (
                FitConfig {
                    damping_increase: 1.0,
                    ..FitConfig::default()
                },
                "damping_increase",
            ),
            (
                FitConfig {
                    max_damping: f64::INFINITY,
                    ..FitConfig::default()
                },
                "max_damping",
            ),
            (
                FitConfig {
                    damping_decrease: 1.5,
                    ..FitConfig::default()
                },
                "damping_decrease",
            ),
            (
                FitConfig {
                    max_evaluations: 0,
                    ..FitConfig::default()
                },
                "max_evaluations",
            ),
        ];
        for (config, name) in cases {
            match CentroidFitter::new(config).fit(&frame, &guess) {
                Err(FitError::InvalidConfig { parameter, .. }) => assert_eq!(parameter, name),
                other => panic!("{}: expected invalid config, got {:?}", name, other),
            }
        }
        assert_eq!(FitConfig::default().validate(), Ok(()));
    }

    #[test]
    fn tiny_frame_is_rejected() {
        let frame = IntensityImage::from_vec(3, 2, vec![1.0; 6]).expect("frame");
        assert_eq!(
            fit_centroid(&frame, &spot_guess()),
            Err(FitError::TooFewPixels { needed: 8, got: 6 })
        );
    }

    #[test]
    fn flat_frame_reports_singular_covariance_with_params() {
        let frame = IntensityImage::from_vec(20, 20, vec![5.0; 400]).expect("frame");
        let guess = GaussianParams {
            amplitude: 0.0,
            offset: 5.0,
            ..spot_guess()
        };
        match fit_centroid(&frame, &guess) {
            Err(FitError::SingularCovariance { params, cost }) => {
                assert_eq!(params.offset, 5.0);
                assert_eq!(cost, 0.0);
            }
            other => panic!("expected singular covariance, got {:?}", other),
        }
    }

    #[derive(Default)]
    struct Recorder {
        calls: usize,
        levels: Vec<f64>,
        rms: f64,
    }

    impl FitRenderer for Recorder {
        type Error = std::convert::Infallible;

        fn contour_levels(&self) -> usize {
            4
        }

        fn render(
            &mut self,
            image: &IntensityImage,
            fit: &FitResult,
            diagnostics: &FitDiagnostics,
        ) -> Result<(), Self::Error> {
            assert_eq!(diagnostics.image_size, [image.width(), image.height()]);
            assert_eq!(diagnostics.model.shape(), [image.height(), image.width()]);
            assert_eq!(fit.image_size, diagnostics.image_size);
            self.calls += 1;
            self.levels = diagnostics.contour_levels.clone();
            self.rms = diagnostics.rms_residual;
            Ok(())
        }
    }

    #[test]
    fn renderer_receives_model_after_successful_fit() {
        let frame = synthetic_frame(96, 80, &spot_params(), 0.0, 0);
        let mut recorder = Recorder::default();
        let fit = CentroidFitter::default()
            .fit_and_render(&frame, &spot_guess(), &mut recorder)
            .expect("fit and render");
        assert_eq!(recorder.calls, 1);
        assert_eq!(recorder.levels.len(), 4);
        assert!(recorder.rms < 1e-6);
        assert_relative_eq!(fit.params.center_x, spot_params().center_x, epsilon = 1e-6);

        let mut untouched = Recorder::default();
        let bad = GaussianParams {
            sigma_x: 0.0,
            ..spot_guess()
        };
        let err = CentroidFitter::default()
            .fit_and_render(&frame, &bad, &mut untouched)
            .unwrap_err();
        assert!(matches!(err, FitRenderError::Fit(FitError::InvalidGuess { .. })));
        assert_eq!(untouched.calls, 0);
    }
}
