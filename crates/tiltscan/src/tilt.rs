//! Surface tilt and slope from a fitted spot position.
//!
//! The reflected spot moves across the sensor as the surface tilts. With the
//! sensor face at parallel distance `d` and perpendicular offset `w` from the
//! surface, a spot landing at physical sensor offset `(x, y)` corresponds to
//!
//!   angle_x = ½·atan((w + x) / d)
//!   angle_y = ½·atan(y / d)
//!
//! where the offsets are measured from the far sensor edge: x grows right to
//! left and y bottom to top relative to raw pixel indices.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::gaussian::{CentroidFitter, FitError, FitResult, GaussianParams};
use crate::grid::IntensityImage;

/// Pixel pitch of the reference CMOS sensor, meters.
pub const DEFAULT_PIXEL_SIZE_M: f64 = 5.2e-6;
/// Default parallel distance `d` from the sensor's (0,0) pixel to the surface, meters.
pub const DEFAULT_PARALLEL_DISTANCE_M: f64 = 2.235;
/// Default perpendicular distance `w` from the sensor's (0,0) pixel to the surface, meters.
pub const DEFAULT_PERPENDICULAR_DISTANCE_M: f64 = 0.914;

/// Sensor properties needed to turn pixels into meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorSpec {
    /// Physical size of one pixel, meters.
    pub pixel_size_m: f64,
}

impl Default for SensorSpec {
    fn default() -> Self {
        Self {
            pixel_size_m: DEFAULT_PIXEL_SIZE_M,
        }
    }
}

/// Fixed placement of the sensor relative to the surface under test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchGeometry {
    /// Parallel distance `d`, meters.
    pub parallel_distance_m: f64,
    /// Perpendicular distance `w`, meters.
    pub perpendicular_distance_m: f64,
}

impl Default for BenchGeometry {
    fn default() -> Self {
        Self {
            parallel_distance_m: DEFAULT_PARALLEL_DISTANCE_M,
            perpendicular_distance_m: DEFAULT_PERPENDICULAR_DISTANCE_M,
        }
    }
}

/// How [`TiltEstimator::estimate_slope`] turns arcseconds back into radians.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlopeConversion {
    /// `arcsec · π · 3600 / 180`, bit-compatible with historical slope
    /// results. This is not the inverse of the arcsecond conversion.
    #[default]
    Legacy,
    /// `arcsec · π / (180 · 3600)`, the true inverse.
    Exact,
}

impl SlopeConversion {
    fn to_radians(self, arcsec: f64) -> f64 {
        match self {
            Self::Legacy => arcsec * PI * 3600.0 / 180.0,
            Self::Exact => arcsec * PI / 180.0 / 3600.0,
        }
    }
}

/// Surface tilt in arcseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TiltAngles {
    /// Tilt relative to the xz plane.
    pub x_arcsec: f64,
    /// Tilt relative to the yz plane.
    pub y_arcsec: f64,
}

impl TiltAngles {
    pub fn is_finite(&self) -> bool {
        self.x_arcsec.is_finite() && self.y_arcsec.is_finite()
    }
}

/// Surface slope (rise over run) along x and y.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceSlopes {
    /// `tan` of the x tilt angle.
    pub x: f64,
    /// `tan` of the y tilt angle.
    pub y: f64,
}

impl SurfaceSlopes {
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[inline]
fn radians_to_arcsec(angle: f64) -> f64 {
    angle * 180.0 / PI * 3600.0
}

/// Converts fitted spot centers into surface tilt and slope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TiltEstimator {
    pub sensor: SensorSpec,
    pub bench: BenchGeometry,
    pub slope_conversion: SlopeConversion,
}

impl TiltEstimator {
    pub fn new(sensor: SensorSpec, bench: BenchGeometry) -> Self {
        Self {
            sensor,
            bench,
            slope_conversion: SlopeConversion::default(),
        }
    }

    pub fn with_slope_conversion(mut self, conversion: SlopeConversion) -> Self {
        self.slope_conversion = conversion;
        self
    }

    /// Physical spot offset `[x, y]` in meters, measured from the
    /// `(width, height)` pixel corner.
    pub fn sensor_offset_m(&self, center: [f64; 2], image_size: [usize; 2]) -> [f64; 2] {
        let px = self.sensor.pixel_size_m;
        [
            (image_size[0] as f64 - center[0]) * px,
            (image_size[1] as f64 - center[1]) * px,
        ]
    }

    /// Tilt for a spot at `center` on a frame of `image_size = [width, height]`.
    pub fn tilt_from_center(&self, center: [f64; 2], image_size: [usize; 2]) -> TiltAngles {
        let [x, y] = self.sensor_offset_m(center, image_size);
        let d = self.bench.parallel_distance_m;
        let w = self.bench.perpendicular_distance_m;
        let angle_x = 0.5 * ((w + x) / d).atan();
        let angle_y = 0.5 * (y / d).atan();
        let tilt = TiltAngles {
            x_arcsec: radians_to_arcsec(angle_x),
            y_arcsec: radians_to_arcsec(angle_y),
        };
        if !tilt.is_finite() {
            tracing::warn!(
                "non-finite tilt for center ({}, {}) on {}x{} frame",
                center[0],
                center[1],
                image_size[0],
                image_size[1]
            );
        }
        tilt
    }

    /// Tilt from a centroid fit.
    pub fn estimate_tilt(&self, fit: &FitResult) -> TiltAngles {
        self.tilt_from_center(fit.center(), fit.image_size)
    }

    /// Slope `tan(angle)` with the angle recovered from arcseconds using
    /// [`TiltEstimator::slope_conversion`].
    pub fn slope_from_tilt(&self, tilt: &TiltAngles) -> SurfaceSlopes {
        SurfaceSlopes {
            x: self.slope_conversion.to_radians(tilt.x_arcsec).tan(),
            y: self.slope_conversion.to_radians(tilt.y_arcsec).tan(),
        }
    }

    /// Slope from a centroid fit.
    pub fn estimate_slope(&self, fit: &FitResult) -> SurfaceSlopes {
        self.slope_from_tilt(&self.estimate_tilt(fit))
    }

    /// Fit the spot in `image`, then convert it to a tilt.
    pub fn measure_tilt(
        &self,
        fitter: &CentroidFitter,
        image: &IntensityImage,
        guess: &GaussianParams,
    ) -> Result<TiltAngles, FitError> {
        let fit = fitter.fit(image, guess)?;
        Ok(self.estimate_tilt(&fit))
    }

    /// Fit the spot in `image`, then convert it to a slope.
    pub fn measure_slope(
        &self,
        fitter: &CentroidFitter,
        image: &IntensityImage,
        guess: &GaussianParams,
    ) -> Result<SurfaceSlopes, FitError> {
        let fit = fitter.fit(image, guess)?;
        Ok(self.estimate_slope(&fit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{spot_guess, spot_params, synthetic_frame};
    use approx::assert_relative_eq;

    const SENSOR: [usize; 2] = [1280, 1024];

    #[test]
    fn spot_at_far_corner_without_offset_is_level() {
        let est = TiltEstimator::new(
            SensorSpec::default(),
            BenchGeometry {
                perpendicular_distance_m: 0.0,
                ..BenchGeometry::default()
            },
        );
        let tilt = est.tilt_from_center([1280.0, 1024.0], SENSOR);
        assert_eq!(tilt.x_arcsec, 0.0);
        assert_eq!(tilt.y_arcsec, 0.0);
        let slope = est.slope_from_tilt(&tilt);
        assert_eq!(slope.x, 0.0);
        assert_eq!(slope.y, 0.0);
    }

    #[test]
    fn default_bench_tilt_at_sensor_center() {
        let est = TiltEstimator::default();
        let tilt = est.tilt_from_center([640.0, 512.0], SENSOR);
        assert_relative_eq!(tilt.x_arcsec, 40167.161_154_479_2, epsilon = 1e-6);
        assert_relative_eq!(tilt.y_arcsec, 122.854_398_298_569_76, epsilon = 1e-9);
    }

    #[test]
    fn axis_flip_moves_tilt_opposite_to_pixel_index() {
        let est = TiltEstimator::default();
        let a = est.tilt_from_center([600.0, 500.0], SENSOR);
        let b = est.tilt_from_center([700.0, 600.0], SENSOR);
        assert!(b.x_arcsec < a.x_arcsec);
        assert!(b.y_arcsec < a.y_arcsec);
    }

    #[test]
    fn legacy_slope_reproduces_historical_round_trip() {
        let est = TiltEstimator::default();
        let tilt = est.tilt_from_center([640.0, 512.0], SENSOR);
        let slope = est.slope_from_tilt(&tilt);
        assert_eq!(slope.x, (tilt.x_arcsec * PI * 3600.0 / 180.0).tan());
        assert_eq!(slope.y, (tilt.y_arcsec * PI * 3600.0 / 180.0).tan());
        assert_relative_eq!(slope.x, 0.843_753_749_347_525_2, epsilon = 1e-6);
    }

    #[test]
    fn exact_slope_is_tangent_of_tilt() {
        let est = TiltEstimator::default().with_slope_conversion(SlopeConversion::Exact);
        let slope = est.slope_from_tilt(&est.tilt_from_center([640.0, 512.0], SENSOR));
        assert_relative_eq!(slope.x, 0.197_235_410_109_057_98, epsilon = 1e-12);
        assert_relative_eq!(slope.y, 0.000_595_615_001_229_161_6, epsilon = 1e-15);
    }

    #[test]
    fn non_finite_center_propagates() {
        let est = TiltEstimator::default();
        let tilt = est.tilt_from_center([f64::NAN, 512.0], SENSOR);
        assert!(!tilt.is_finite());
        assert!(tilt.x_arcsec.is_nan());
        assert!(tilt.y_arcsec.is_finite());
        assert!(!est.slope_from_tilt(&tilt).is_finite());
    }

    #[test]
    fn measure_runs_fit_then_conversion() {
        let truth = spot_params();
        let frame = synthetic_frame(96, 80, &truth, 0.0, 0);
        let est = TiltEstimator::default();
        let tilt = est
            .measure_tilt(&CentroidFitter::default(), &frame, &spot_guess())
            .expect("fit converges");
        let expected = est.tilt_from_center([truth.center_x, truth.center_y], [96, 80]);
        assert_relative_eq!(tilt.x_arcsec, expected.x_arcsec, epsilon = 1e-3);
        assert_relative_eq!(tilt.y_arcsec, expected.y_arcsec, epsilon = 1e-3);

        let bad = GaussianParams {
            sigma_x: 0.0,
            ..spot_guess()
        };
        assert!(est
            .measure_slope(&CentroidFitter::default(), &frame, &bad)
            .is_err());
    }
}
