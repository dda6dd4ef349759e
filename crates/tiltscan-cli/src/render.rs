//! PNG renderer for centroid-fit diagnostics.

use std::path::PathBuf;

use image::{GrayImage, Luma};
use tiltscan::{FitDiagnostics, FitRenderer, FitResult, IntensityImage, DEFAULT_CONTOUR_LEVELS};

/// Brightest value used for the frame itself; contours are drawn at 255.
const FRAME_MAX: f64 = 200.0;
const CONTOUR: u8 = 255;

/// Writes the frame as a grayscale PNG, origin at the lower left, with
/// iso-contours of the fitted model overlaid in white.
pub struct ContourPngRenderer {
    out_path: PathBuf,
    levels: usize,
}

impl ContourPngRenderer {
    pub fn new(out_path: PathBuf) -> Self {
        Self {
            out_path,
            levels: DEFAULT_CONTOUR_LEVELS,
        }
    }
}

/// True when some level lies between `a` and `b`.
fn crosses(levels: &[f64], a: f64, b: f64) -> bool {
    levels.iter().any(|&l| (a - l) * (b - l) < 0.0 || (a == l) != (b == l))
}

impl FitRenderer for ContourPngRenderer {
    type Error = image::ImageError;

    fn contour_levels(&self) -> usize {
        self.levels
    }

    fn render(
        &mut self,
        image: &IntensityImage,
        fit: &FitResult,
        diagnostics: &FitDiagnostics,
    ) -> Result<(), Self::Error> {
        let (w, h) = (image.width(), image.height());
        let (lo, hi) = image.min_max();
        let scale = if hi > lo { FRAME_MAX / (hi - lo) } else { 0.0 };
        let model = &diagnostics.model;
        let levels = &diagnostics.contour_levels;

        let mut out = GrayImage::new(w as u32, h as u32);
        for row in 0..h {
            // Row 0 of the frame ends up at the bottom of the picture.
            let py = (h - 1 - row) as u32;
            for col in 0..w {
                let m = model.get(row, col);
                let on_contour = (col + 1 < w && crosses(levels, m, model.get(row, col + 1)))
                    || (row + 1 < h && crosses(levels, m, model.get(row + 1, col)));
                let value = if on_contour {
                    CONTOUR
                } else {
                    ((image.get(col, row) - lo) * scale).round().clamp(0.0, FRAME_MAX) as u8
                };
                out.put_pixel(col as u32, py, Luma([value]));
            }
        }

        out.save(&self.out_path)?;
        tracing::info!(
            "Fit plot ({} contours, center ({:.2}, {:.2})) written to {}",
            levels.len(),
            fit.params.center_x,
            fit.params.center_y,
            self.out_path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crossing_detects_level_between_neighbours() {
        let levels = [1.0, 2.0];
        assert!(crosses(&levels, 0.5, 1.5));
        assert!(crosses(&levels, 2.5, 1.5));
        assert!(crosses(&levels, 1.0, 1.5));
        assert!(!crosses(&levels, 1.2, 1.8));
        assert!(!crosses(&[], 0.0, 10.0));
    }
}
