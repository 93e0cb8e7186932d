use ndarray::{Array2, Axis};

use crate::consts::{
    EDGE_EXCLUSION_FRACTION, HISTOGRAM_BINS, MIN_EDGE_POINTS, SPAN_THRESHOLD_FRACTION,
};

/// Signal span along an axis profile: first and last index whose mean
/// exceeds a fraction of the profile dynamic, pulled inward by `offset`.
fn profile_span(profile: &[f64], offset: usize) -> (usize, usize) {
    let n = profile.len();
    let lo = profile.iter().cloned().fold(f64::MAX, f64::min);
    let hi = profile.iter().cloned().fold(f64::MIN, f64::max);
    if hi <= lo {
        return (0, n.saturating_sub(1));
    }
    let threshold = lo + SPAN_THRESHOLD_FRACTION * (hi - lo);

    let first = profile.iter().position(|&v| v > threshold).unwrap_or(0);
    let last = profile
        .iter()
        .rposition(|&v| v > threshold)
        .unwrap_or(n - 1);

    let first = (first + offset).min(n - 1);
    let last = last.saturating_sub(offset).max(first);
    (first, last)
}

/// Vertical span (first/last row) of the signal.
pub fn vertical_span(img: &Array2<u16>, offset: usize) -> (usize, usize) {
    let profile: Vec<f64> = img
        .axis_iter(Axis(0))
        .map(|row| row.iter().map(|&v| v as f64).sum::<f64>() / row.len() as f64)
        .collect();
    profile_span(&profile, offset)
}

/// Horizontal span (first/last column) of the signal.
pub fn horizontal_span(img: &Array2<u16>, offset: usize) -> (usize, usize) {
    let profile: Vec<f64> = img
        .axis_iter(Axis(1))
        .map(|col| col.iter().map(|&v| v as f64).sum::<f64>() / col.len() as f64)
        .collect();
    profile_span(&profile, offset)
}

/// Background and disk levels from the intensity histogram.
///
/// The histogram is split with Otsu's criterion; the modal bin below the
/// split is the sky background level, the modal bin above it the disk
/// plateau level. Returns (background, disk_level) on the 16-bit scale.
pub fn histogram_thresholds(img: &Array2<u16>) -> (u16, u16) {
    let bins = HISTOGRAM_BINS;
    let scale = 65536 / bins;
    let mut histogram = vec![0u64; bins];
    for &v in img.iter() {
        histogram[(v as usize) / scale] += 1;
    }

    let total: f64 = img.len() as f64;
    let sum_all: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64)
        .sum();

    // Otsu split: maximize between-class variance.
    let mut weight_bg = 0.0;
    let mut sum_bg = 0.0;
    let mut best_variance = 0.0;
    let mut split = 0usize;
    for (i, &count) in histogram.iter().enumerate() {
        weight_bg += count as f64;
        if weight_bg == 0.0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0.0 {
            break;
        }
        sum_bg += i as f64 * count as f64;
        let mean_bg = sum_bg / weight_bg;
        let mean_fg = (sum_all - sum_bg) / weight_fg;
        let between = weight_bg * weight_fg * (mean_bg - mean_fg).powi(2);
        if between > best_variance {
            best_variance = between;
            split = i;
        }
    }

    let modal = |range: std::ops::Range<usize>| -> usize {
        range
            .clone()
            .max_by_key(|&i| histogram[i])
            .unwrap_or(range.start)
    };

    let background_bin = modal(0..(split + 1).min(bins));
    let disk_bin = modal((split + 1).min(bins - 1)..bins);

    let center = |bin: usize| ((bin * scale) + scale / 2).min(u16::MAX as usize) as u16;
    (center(background_bin), center(disk_bin))
}

/// Limb edge points (x, y), both sides, excluding a vertical band at the
/// top and bottom of the image where slit artifacts dominate.
pub fn detect_edge_points(img: &Array2<u16>, threshold: u16) -> Vec<(f64, f64)> {
    let (h, w) = img.dim();
    let excl = (h as f64 * EDGE_EXCLUSION_FRACTION) as usize;
    let mut points = Vec::new();

    for y in excl..h.saturating_sub(excl) {
        let row = img.row(y);
        let left = (0..w).find(|&x| row[x] >= threshold);
        let right = (0..w).rfind(|&x| row[x] >= threshold);
        if let (Some(l), Some(r)) = (left, right) {
            if r > l {
                points.push((l as f64, y as f64));
                points.push((r as f64, y as f64));
            }
        }
    }
    points
}

/// True when the disk has no visible horizontal limbs: disk-level pixels
/// reach the first or last two columns, or too few edge points were
/// found. The absolute threshold matters here: a relative profile span
/// always finds interior bounds, even on a disk wider than the frame.
pub fn no_limbs(img: &Array2<u16>, edge_points: &[(f64, f64)], threshold: u16) -> bool {
    if edge_points.len() < MIN_EDGE_POINTS {
        return true;
    }
    let w = img.ncols();
    let touches = |x: usize| img.column(x).iter().any(|&v| v >= threshold);
    touches(0) || touches(1) || touches(w.saturating_sub(2)) || touches(w.saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk_image(h: usize, w: usize, cx: f64, cy: f64, rx: f64, ry: f64) -> Array2<u16> {
        Array2::from_shape_fn((h, w), |(y, x)| {
            let dx = (x as f64 - cx) / rx;
            let dy = (y as f64 - cy) / ry;
            if dx * dx + dy * dy <= 1.0 { 30000 } else { 1000 }
        })
    }

    #[test]
    fn vertical_span_brackets_disk() {
        let img = disk_image(100, 100, 50.0, 50.0, 30.0, 30.0);
        let (y1, y2) = vertical_span(&img, 0);
        assert!(y1 >= 15 && y1 <= 25, "y1 = {}", y1);
        assert!(y2 >= 75 && y2 <= 85, "y2 = {}", y2);
    }

    #[test]
    fn thresholds_split_sky_and_disk() {
        let img = disk_image(100, 100, 50.0, 50.0, 30.0, 30.0);
        let (background, disk) = histogram_thresholds(&img);
        assert!(background < 3000, "background = {}", background);
        assert!(disk > 25000 && disk < 35000, "disk = {}", disk);
    }

    #[test]
    fn edge_points_lie_on_limb() {
        let img = disk_image(100, 100, 50.0, 50.0, 30.0, 30.0);
        let (_, disk) = histogram_thresholds(&img);
        let points = detect_edge_points(&img, disk / 2);
        assert!(points.len() > 50);
        for &(x, y) in &points {
            let dx = (x - 50.0) / 30.0;
            let dy = (y - 50.0) / 30.0;
            let r = (dx * dx + dy * dy).sqrt();
            assert!((r - 1.0).abs() < 0.15, "point ({}, {}) at r {}", x, y, r);
        }
    }

    #[test]
    fn truncated_disk_has_no_limbs() {
        // disk wider than the frame: limbs clipped on both sides
        let img = disk_image(60, 40, 20.0, 30.0, 60.0, 25.0);
        let (_, disk) = histogram_thresholds(&img);
        let points = detect_edge_points(&img, disk / 2);
        assert!(no_limbs(&img, &points, disk / 2));
    }

    #[test]
    fn full_width_disk_has_no_limbs() {
        // limbs exactly on the frame edges: the column profile still has
        // dynamic, but no sky is visible left or right of the disk
        let img = disk_image(100, 100, 50.0, 50.0, 52.0, 40.0);
        let (_, disk) = histogram_thresholds(&img);
        let points = detect_edge_points(&img, disk / 2);
        assert!(no_limbs(&img, &points, disk / 2));
    }

    #[test]
    fn full_disk_has_limbs() {
        let img = disk_image(100, 100, 50.0, 50.0, 30.0, 30.0);
        let (_, disk) = histogram_thresholds(&img);
        let points = detect_edge_points(&img, disk / 2);
        assert!(!no_limbs(&img, &points, disk / 2));
    }
}
