//! Aggregate configuration for a measurement run.

use serde::{Deserialize, Serialize};

use crate::gaussian::{CentroidFitter, FitConfig, GaussianParams};
use crate::integrate::SimpsonIntegrator;
use crate::profile::ProfileReconstructor;
use crate::tilt::TiltEstimator;

/// Everything a run needs: solver settings, starting guess, bench geometry
/// and integration rule.
///
/// Every section falls back to its default when absent from a serialized
/// document, so a partial JSON file only has to name what it changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TiltScanConfig {
    /// Levenberg–Marquardt budget and tolerances.
    pub fit: FitConfig,
    /// Initial Gaussian parameters.
    pub guess: GaussianParams,
    /// Sensor, bench geometry and slope conversion.
    pub tilt: TiltEstimator,
    /// Even-count rule for slope integration.
    pub integration: SimpsonIntegrator,
}

impl TiltScanConfig {
    pub fn fitter(&self) -> CentroidFitter {
        CentroidFitter::new(self.fit.clone())
    }

    pub fn reconstructor(&self) -> ProfileReconstructor {
        ProfileReconstructor::new(self.integration)
    }
}
