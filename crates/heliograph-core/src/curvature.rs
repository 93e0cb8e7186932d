use ndarray::{s, Array2, ArrayView1};

use crate::consts::{
    CURVATURE_CLIP_PASSES, CURVATURE_FIT_MARGIN, CURVATURE_MIN_ROWS, CURVATURE_SIGMA_CLIP,
    LINE_REFINE_HALF_WINDOW,
};
use crate::error::{HeliographError, Result};
use crate::math::poly::{polyfit, polyval};
use crate::math::stats::mean_stddev;
use crate::pipeline::config::SlitWindow;
use crate::pipeline::log::RunLog;

/// Degree-2 model of the spectral line's column drift along image rows:
/// `x = a*y^2 + b*y + c`. The drift is a design property of the optical
/// slit, not noise.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CurvatureModel {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

/// One row of the sampling table: integer column and fractional offset.
#[derive(Clone, Copy, Debug)]
pub struct SamplePos {
    pub floor: usize,
    pub frac: f64,
}

impl CurvatureModel {
    pub fn new(a: f64, b: f64, c: f64) -> Self {
        Self { a, b, c }
    }

    pub fn coeffs(&self) -> [f64; 3] {
        [self.a, self.b, self.c]
    }

    pub fn eval(&self, y: f64) -> f64 {
        polyval(&[self.a, self.b, self.c], y)
    }

    /// Same curvature with the constant term shifted by `dc` columns.
    pub fn offset(&self, dc: f64) -> Self {
        Self {
            c: self.c + dc,
            ..*self
        }
    }

    /// Per-row sampling positions for a given column shift, clamped so
    /// the 4-point interpolation support stays inside the image:
    /// `1 <= floor <= width - 3`. A clamped row gets a zero fractional
    /// part, degrading that row's resampling accuracy instead of
    /// failing the run.
    pub fn sample_table(&self, height: usize, width: usize, shift: f64) -> Vec<SamplePos> {
        let hi = (width - 3) as f64;
        (0..height)
            .map(|y| {
                let x = self.eval(y as f64) + shift;
                if x < 1.0 {
                    SamplePos {
                        floor: 1,
                        frac: 0.0,
                    }
                } else if x >= hi {
                    SamplePos {
                        floor: width - 3,
                        frac: 0.0,
                    }
                } else {
                    SamplePos {
                        floor: x.floor() as usize,
                        frac: x - x.floor(),
                    }
                }
            })
            .collect()
    }
}

/// Fit the curvature model on the mean image.
///
/// For each row inside the spectrum span (minus a margin, shrunk to a
/// quarter of the span on short scans), the column of minimum intensity
/// marks the absorption line; the position is refined to sub-pixel with
/// the depth centroid. A degree-2 polynomial is fitted row -> column
/// with iterative sigma-clipping: fit, mask points beyond K*sigma of
/// the residuals, refit.
pub fn fit_curvature(
    mean: &Array2<u16>,
    span: (usize, usize),
    slit_window: Option<SlitWindow>,
    log: &mut RunLog,
) -> Result<CurvatureModel> {
    let (h, w) = mean.dim();
    let (col_lo, col_hi, c_offset) = match slit_window {
        Some(win) => {
            let lo = win.x_min.min(w.saturating_sub(1));
            let hi = if win.x_max == 0 { w } else { win.x_max.min(w) };
            if hi <= lo + 4 {
                return Err(HeliographError::InvalidConfig(format!(
                    "slit detection window [{}, {}) too narrow",
                    lo, hi
                )));
            }
            log.info(format!("Slit detection zone x: [{}, {})", lo, hi));
            (lo, hi, lo as f64)
        }
        None => (0, w, 0.0),
    };

    let (top, bottom) = span;
    let margin = CURVATURE_FIT_MARGIN.min(bottom.saturating_sub(top) / 4);
    let row_lo = top + margin;
    let row_hi = bottom.saturating_sub(margin).min(h);
    if row_hi < row_lo + CURVATURE_MIN_ROWS {
        return Err(HeliographError::Geometry(format!(
            "spectrum span [{}, {}] too short for curvature fit",
            top, bottom
        )));
    }

    let ys: Vec<f64> = (row_lo..row_hi).map(|y| y as f64).collect();
    let min_cols: Vec<f64> = (row_lo..row_hi)
        .map(|y| {
            let window = mean.slice(s![y, col_lo..col_hi]);
            let mut best = 0usize;
            let mut best_val = u16::MAX;
            for (x, &v) in window.iter().enumerate() {
                if v < best_val {
                    best_val = v;
                    best = x;
                }
            }
            refine_line_position(window, best as f64)
        })
        .collect();

    let mut mask = vec![true; ys.len()];
    let mut coeffs = polyfit(&ys, &min_cols, 2)?;

    for _ in 0..CURVATURE_CLIP_PASSES {
        let kept_y: Vec<f64> = ys
            .iter()
            .zip(&mask)
            .filter(|(_, &m)| m)
            .map(|(&y, _)| y)
            .collect();
        let kept_x: Vec<f64> = min_cols
            .iter()
            .zip(&mask)
            .filter(|(_, &m)| m)
            .map(|(&x, _)| x)
            .collect();
        coeffs = polyfit(&kept_y, &kept_x, 2)?;

        let residuals: Vec<f64> = ys
            .iter()
            .zip(&min_cols)
            .map(|(&y, &x)| x - polyval(&coeffs, y))
            .collect();
        let kept_res: Vec<f64> = residuals
            .iter()
            .zip(&mask)
            .filter(|(_, &m)| m)
            .map(|(&r, _)| r)
            .collect();
        let (_, sigma) = mean_stddev(&kept_res);
        if sigma == 0.0 {
            break;
        }
        for (m, &r) in mask.iter_mut().zip(&residuals) {
            *m = r.abs() < CURVATURE_SIGMA_CLIP * sigma;
        }
    }

    let model = CurvatureModel::new(coeffs[0], coeffs[1], coeffs[2] + c_offset);
    log.info(format!(
        "Curvature coefficients a*y2, b*y, c: {:.4e} {:.4e} {:.2}",
        model.a, model.b, model.c
    ));
    Ok(model)
}

/// Refine the absorption-line position along one row.
///
/// Centroid of the line depth (local max minus intensity) over a window
/// around the expected column. Used by the polarization mode to anchor
/// the Zeeman offset on the measured line rather than the fitted model.
pub fn refine_line_position(row: ArrayView1<u16>, expected: f64) -> f64 {
    let w = row.len();
    let center = expected.round() as isize;
    let lo = (center - LINE_REFINE_HALF_WINDOW as isize).max(0) as usize;
    let hi = ((center + LINE_REFINE_HALF_WINDOW as isize + 1).max(0) as usize).min(w);
    if hi <= lo {
        return expected;
    }

    let peak = row.slice(ndarray::s![lo..hi]).iter().copied().max().unwrap_or(0) as f64;
    let mut weight_sum = 0.0;
    let mut pos_sum = 0.0;
    for x in lo..hi {
        let depth = peak - row[x] as f64;
        weight_sum += depth;
        pos_sum += depth * x as f64;
    }
    if weight_sum > 0.0 {
        pos_sum / weight_sum
    } else {
        expected
    }
}
