//! Row-major sample grids: sensor intensity frames and slope/height fields.

use image::{GrayImage, ImageBuffer, Luma};
use serde::Serialize;

// ── Error type ─────────────────────────────────────────────────────────────

/// Errors raised when building a grid from caller-supplied samples.
#[derive(Debug, Clone, PartialEq)]
pub enum GridError {
    /// Zero rows or zero columns.
    Empty,
    /// Flat buffer length does not match `rows * cols`.
    SizeMismatch {
        /// Expected number of samples.
        expected: usize,
        /// Provided number of samples.
        got: usize,
    },
    /// A nested row differs in length from the first row.
    RaggedRow {
        /// Offending row index.
        row: usize,
        /// Length of the first row.
        expected: usize,
        /// Length of the offending row.
        got: usize,
    },
    /// A sample is NaN or infinite.
    NonFinite {
        /// Row of the offending sample.
        row: usize,
        /// Column of the offending sample.
        col: usize,
    },
}

impl std::fmt::Display for GridError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "grid has no samples"),
            Self::SizeMismatch { expected, got } => {
                write!(f, "size mismatch: expected {} samples, got {}", expected, got)
            }
            Self::RaggedRow { row, expected, got } => write!(
                f,
                "non-rectangular grid: row {} has {} samples, expected {}",
                row, got, expected
            ),
            Self::NonFinite { row, col } => {
                write!(f, "non-finite sample at row {}, column {}", row, col)
            }
        }
    }
}

impl std::error::Error for GridError {}

// ── Grid ───────────────────────────────────────────────────────────────────

/// Dense row-major grid of `f64` samples.
///
/// Row index is the y direction, column index the x direction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Grid {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Grid {
    /// All-zero grid of the given shape.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Wrap a flat row-major buffer.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, GridError> {
        if rows == 0 || cols == 0 {
            return Err(GridError::Empty);
        }
        let expected = rows.checked_mul(cols).ok_or(GridError::SizeMismatch {
            expected: usize::MAX,
            got: data.len(),
        })?;
        if data.len() != expected {
            return Err(GridError::SizeMismatch {
                expected,
                got: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Build from nested rows; every row must have the same length.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, GridError> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (r, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(GridError::RaggedRow {
                    row: r,
                    expected: cols,
                    got: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Self::from_vec(rows.len(), cols, data)
    }

    /// Build by evaluating `f(row, col)` at every cell.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Self { rows, cols, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `[rows, cols]`.
    pub fn shape(&self) -> [usize; 2] {
        [self.rows, self.cols]
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn row(&self, row: usize) -> &[f64] {
        let start = row * self.cols;
        &self.data[start..start + self.cols]
    }

    /// Copy of one column, top to bottom.
    pub fn column(&self, col: usize) -> Vec<f64> {
        (0..self.rows).map(|r| self.get(r, col)).collect()
    }

    /// Nested-row copy, convenient for printing and serialization.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        if self.cols == 0 {
            return vec![Vec::new(); self.rows];
        }
        self.data.chunks(self.cols).map(<[f64]>::to_vec).collect()
    }

    /// First non-finite sample, if any.
    pub fn find_non_finite(&self) -> Option<(usize, usize)> {
        self.data
            .iter()
            .position(|v| !v.is_finite())
            .map(|i| (i / self.cols, i % self.cols))
    }
}

// ── Intensity image ────────────────────────────────────────────────────────

/// Sensor frame of finite intensity samples.
///
/// `width` is the number of columns (x), `height` the number of rows (y).
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityImage {
    grid: Grid,
}

impl IntensityImage {
    /// Wrap a row-major buffer of `width * height` samples.
    pub fn from_vec(width: usize, height: usize, data: Vec<f64>) -> Result<Self, GridError> {
        Self::from_grid(Grid::from_vec(height, width, data)?)
    }

    /// Build from nested rows (`rows[y][x]`).
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, GridError> {
        Self::from_grid(Grid::from_rows(rows)?)
    }

    /// Validate an existing grid as an intensity frame.
    pub fn from_grid(grid: Grid) -> Result<Self, GridError> {
        if let Some((row, col)) = grid.find_non_finite() {
            return Err(GridError::NonFinite { row, col });
        }
        Ok(Self { grid })
    }

    pub fn width(&self) -> usize {
        self.grid.cols()
    }

    pub fn height(&self) -> usize {
        self.grid.rows()
    }

    /// Number of pixels.
    pub fn len(&self) -> usize {
        self.grid.data().len()
    }

    pub fn is_empty(&self) -> bool {
        self.grid.data().is_empty()
    }

    /// Flattened samples in row-major order.
    pub fn data(&self) -> &[f64] {
        self.grid.data()
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.grid.get(y, x)
    }

    pub fn as_grid(&self) -> &Grid {
        &self.grid
    }

    /// Smallest and largest sample.
    pub fn min_max(&self) -> (f64, f64) {
        self.data()
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }
}

impl TryFrom<&GrayImage> for IntensityImage {
    type Error = GridError;

    fn try_from(img: &GrayImage) -> Result<Self, Self::Error> {
        let (w, h) = img.dimensions();
        let data = img.as_raw().iter().map(|&v| f64::from(v)).collect();
        Ok(Self {
            grid: Grid::from_vec(h as usize, w as usize, data)?,
        })
    }
}

impl TryFrom<&ImageBuffer<Luma<u16>, Vec<u16>>> for IntensityImage {
    type Error = GridError;

    fn try_from(img: &ImageBuffer<Luma<u16>, Vec<u16>>) -> Result<Self, Self::Error> {
        let (w, h) = img.dimensions();
        let data = img.as_raw().iter().map(|&v| f64::from(v)).collect();
        Ok(Self {
            grid: Grid::from_vec(h as usize, w as usize, data)?,
        })
    }
}
