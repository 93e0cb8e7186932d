use ndarray::Array2;

use crate::consts::{
    DISK_MASK_FRACTION, DISK_MASK_FRACTION_LOW_DYN, FLAT_SATURATION_LIMIT, FLAT_SMOOTH_WINDOW,
};
use crate::error::Result;
use crate::geometry::edges::{histogram_thresholds, horizontal_span, vertical_span};
use crate::math::savgol::{odd_window, savgol_filter};
use crate::math::stats::median;
use crate::pipeline::log::RunLog;

/// Remove transversal banding along the scan axis caused by dust on the
/// slit, without touching the smooth brightness profile of the disk.
///
/// A per-row inside-disk median profile is divided by a heavily smoothed
/// version of itself; the resulting 1D curve corrects the image by
/// division, but only inside the solar-disk mask. Saturated scans skip
/// the stage entirely.
pub fn correct_flat_field(
    img: Array2<u16>,
    low_dynamic_range: bool,
    log: &mut RunLog,
) -> Result<Array2<u16>> {
    let (h, w) = img.dim();
    let (mut y1, mut y2) = vertical_span(&img, 0);
    log.info(format!("Vertical limits y1, y2: {} {}", y1, y2));

    let (x1, x2) = horizontal_span(&img, 0);
    let limbs_clipped = x1 <= 2 || x2 >= w.saturating_sub(3);

    let fraction = if low_dynamic_range {
        DISK_MASK_FRACTION_LOW_DYN
    } else {
        DISK_MASK_FRACTION
    };
    let (_, disk_level) = histogram_thresholds(&img);
    let mask_threshold = disk_level as f64 * fraction;

    // Per-row intensity: median of the in-disk pixels, ignoring sky
    // columns below the mask threshold. Rows inside the span that carry
    // no in-disk pixel narrow the span toward the nearer edge.
    let mut profile = vec![0.0_f64; h];
    let mut offset_y1 = 0usize;
    let mut offset_y2 = 0usize;
    for y in 0..h {
        let vals: Vec<f64> = if limbs_clipped {
            img.row(y).iter().map(|&v| v as f64).collect()
        } else {
            img.row(y)
                .iter()
                .map(|&v| v as f64)
                .filter(|&v| v > mask_threshold)
                .collect()
        };
        if vals.is_empty() {
            profile[y] = mask_threshold;
            if y >= y1 && y <= y2 {
                if y - y1 < y2 - y {
                    offset_y1 += 1;
                } else {
                    offset_y2 += 1;
                }
            }
        } else {
            profile[y] = median(&vals);
        }
    }
    y1 += offset_y1;
    y2 = y2.saturating_sub(offset_y2);
    if y2 <= y1 + 16 {
        log.info("Disk span too short for flat-field correction");
        return Ok(img);
    }

    let inside = &profile[y1..y2];
    let mean_level = inside.iter().sum::<f64>() / inside.len() as f64;
    if mean_level >= FLAT_SATURATION_LIMIT {
        log.info(format!(
            "Flat-field correction skipped: saturated profile (mean {:.0})",
            mean_level
        ));
        return Ok(img);
    }

    let mut window = FLAT_SMOOTH_WINDOW;
    if inside.len() < window {
        log.info(format!("Disk height abnormally low: {} {}", y1, y2));
        window = odd_window(inside.len().saturating_sub(10), inside.len());
        if window < 5 {
            return Ok(img);
        }
    }
    let smoothed = savgol_filter(inside, window, 3)?;

    // Correction curve: raw / smoothed, clamped to 1.0 outside the disk
    // span and over a 5-row guard band at each end.
    let mut curve = vec![1.0_f64; h];
    for (i, (&raw, &trend)) in inside.iter().zip(&smoothed).enumerate().skip(5) {
        if i + 5 >= inside.len() {
            break;
        }
        if trend > 0.0 {
            curve[y1 + i] = raw / trend;
        }
    }

    let out = Array2::from_shape_fn((h, w), |(y, x)| {
        let v = img[[y, x]] as f64;
        let in_mask = limbs_clipped || v > mask_threshold;
        if in_mask && curve[y] != 0.0 {
            (v / curve[y]).round().clamp(0.0, 65535.0) as u16
        } else {
            img[[y, x]]
        }
    });

    Ok(out)
}
