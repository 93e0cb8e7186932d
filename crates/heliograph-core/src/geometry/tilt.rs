use ndarray::Array2;

use crate::consts::{BACKGROUND_PERCENTILE, DARK_STRIP_ROWS};
use crate::math::stats::percentile;

/// Tilt angle, in degrees, of the apparent limb-to-limb horizontal axis.
///
/// Measured from the slope between the edge points at minimum and
/// maximum x; a positive angle tips the right limb downward.
pub fn tilt_from_edges(points: &[(f64, f64)]) -> f64 {
    let mut min_pt = points[0];
    let mut max_pt = points[0];
    for &p in points {
        if p.0 < min_pt.0 {
            min_pt = p;
        }
        if p.0 > max_pt.0 {
            max_pt = p;
        }
    }
    let dx = max_pt.0 - min_pt.0;
    if dx == 0.0 {
        return 0.0;
    }
    let dy = max_pt.1 - min_pt.1;
    (-dy / dx).atan().to_degrees()
}

/// Background level estimated from dark strips above and below the disk:
/// the 55th percentile of the top and bottom rows, or of the global
/// darker pixels when the disk touches those edges.
pub fn estimate_background(img: &Array2<u16>, span: (usize, usize)) -> f64 {
    let (h, w) = img.dim();
    let (y1, y2) = span;
    let mut dark: Vec<f64> = Vec::with_capacity(2 * DARK_STRIP_ROWS * w);

    let strip_ok_top = y1 > DARK_STRIP_ROWS + 5;
    let strip_ok_bottom = y2 + DARK_STRIP_ROWS + 5 < h;

    if strip_ok_top {
        for y in 0..DARK_STRIP_ROWS {
            dark.extend(img.row(y).iter().map(|&v| v as f64));
        }
    }
    if strip_ok_bottom {
        for y in h - DARK_STRIP_ROWS..h {
            dark.extend(img.row(y).iter().map(|&v| v as f64));
        }
    }

    if dark.is_empty() {
        // disk fills the frame: fall back to the darker global pixels
        let all: Vec<f64> = img.iter().map(|&v| v as f64).collect();
        return percentile(&all, 15.0);
    }
    percentile(&dark, BACKGROUND_PERCENTILE)
}

/// Correct the tilt by a per-column vertical shear about `colref`.
///
/// The image is padded top and bottom so no disk pixel shears out of
/// frame; extrapolated regions are filled with the background estimate.
/// Bilinear (vertical linear) resampling.
pub fn apply_tilt(img: &Array2<u16>, tilt_deg: f64, colref: f64, background: f64) -> Array2<u16> {
    let (h, w) = img.dim();
    let tan = tilt_deg.to_radians().tan();

    let reach = colref.max(w as f64 - colref);
    let pad = (tan.abs() * reach).ceil() as usize + 1;
    let new_h = h + 2 * pad;

    let bg = background.clamp(0.0, 65535.0);
    let sample = |y: f64, x: usize| -> f64 {
        // vertical-only shear: linear interpolation along the column
        let y0 = y.floor();
        let frac = y - y0;
        let i0 = y0 as isize;
        let get = |i: isize| -> f64 {
            if i < 0 || i >= h as isize {
                bg
            } else {
                img[[i as usize, x]] as f64
            }
        };
        get(i0) * (1.0 - frac) + get(i0 + 1) * frac
    };

    Array2::from_shape_fn((new_h, w), |(y, x)| {
        let dy = (x as f64 - colref) * tan;
        let y_src = y as f64 - pad as f64 - dy;
        sample(y_src, x).round().clamp(0.0, 65535.0) as u16
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tilt_sign_follows_slope() {
        // right limb 10 px lower than the left limb over 100 px
        let points = vec![(0.0, 50.0), (100.0, 60.0), (50.0, 10.0), (50.0, 90.0)];
        let tilt = tilt_from_edges(&points);
        assert!((tilt - (-0.1f64).atan().to_degrees()).abs() < 1e-9);
    }

    #[test]
    fn zero_tilt_preserves_rows() {
        let img = Array2::from_shape_fn((20, 30), |(y, _)| (y * 100) as u16);
        let out = apply_tilt(&img, 0.0, 15.0, 0.0);
        // padded by one row each side; interior content unchanged
        let pad = (out.nrows() - 20) / 2;
        for y in 0..20 {
            assert_eq!(out[[y + pad, 10]], (y * 100) as u16);
        }
    }

    #[test]
    fn shear_moves_columns_opposite_ways() {
        let mut img = Array2::<u16>::zeros((41, 41));
        for x in 0..41 {
            img[[20, x]] = 10000;
        }
        // 5.71 deg: tan = 0.1 -> +/- 2 px shear at the extreme columns
        let out = apply_tilt(&img, (0.1f64).atan().to_degrees(), 20.0, 0.0);
        let pad = (out.nrows() - 41) / 2;
        // center column unmoved
        assert_eq!(out[[20 + pad, 20]], 10000);
        // column at x=40: dy = +2 -> bright row appears 2 rows later
        assert_eq!(out[[22 + pad, 40]], 10000);
        // column at x=0: dy = -2 -> bright row appears 2 rows earlier
        assert_eq!(out[[18 + pad, 0]], 10000);
    }

    #[test]
    fn background_from_dark_strips() {
        let mut img = Array2::<u16>::from_elem((100, 50), 500);
        for y in 30..70 {
            for x in 10..40 {
                img[[y, x]] = 40000;
            }
        }
        let bg = estimate_background(&img, (30, 69));
        assert_eq!(bg, 500.0);
    }
}
