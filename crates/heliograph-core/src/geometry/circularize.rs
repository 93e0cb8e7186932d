use ndarray::Array2;

/// Resample the scan axis so the disk renders circular.
///
/// `ratio` is SY/SX from the ellipse fit: the output width becomes
/// `round(width * ratio)`, stretching or compressing every row with 1D
/// linear interpolation. Returns the resampled image and its new width.
pub fn circularize(img: &Array2<u16>, ratio: f64) -> (Array2<u16>, usize) {
    let (h, w) = img.dim();
    let new_w = ((w as f64) * ratio).round().max(2.0) as usize;
    if new_w == w {
        return (img.clone(), w);
    }

    let scale = (w - 1) as f64 / (new_w - 1) as f64;
    let out = Array2::from_shape_fn((h, new_w), |(y, x)| {
        let src = x as f64 * scale;
        let x0 = src.floor() as usize;
        let frac = src - x0 as f64;
        let x1 = (x0 + 1).min(w - 1);
        let v = img[[y, x0]] as f64 * (1.0 - frac) + img[[y, x1]] as f64 * frac;
        v.round().clamp(0.0, 65535.0) as u16
    });
    (out, new_w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::edges::{detect_edge_points, histogram_thresholds};
    use crate::geometry::ellipse::fit_ellipse;

    #[test]
    fn halving_ratio_halves_width() {
        let img = Array2::<u16>::from_elem((10, 100), 1234);
        let (out, new_w) = circularize(&img, 0.5);
        assert_eq!(new_w, 50);
        assert_eq!(out.dim(), (10, 50));
        assert!(out.iter().all(|&v| v == 1234));
    }

    #[test]
    fn unit_ratio_is_identity() {
        let img = Array2::from_shape_fn((5, 40), |(y, x)| (y * 40 + x) as u16);
        let (out, new_w) = circularize(&img, 1.0);
        assert_eq!(new_w, 40);
        assert_eq!(out, img);
    }

    #[test]
    fn oversampled_disk_becomes_circular() {
        // disk scanned 2x too fast along x: rx = 60, ry = 30
        let img = Array2::from_shape_fn((100, 200), |(y, x)| {
            let dx = (x as f64 - 100.0) / 60.0;
            let dy = (y as f64 - 50.0) / 30.0;
            if dx * dx + dy * dy <= 1.0 { 30000 } else { 800 }
        });
        let (out, _) = circularize(&img, 0.5);
        let (_, disk) = histogram_thresholds(&out);
        let points = detect_edge_points(&out, disk / 2);
        let e = fit_ellipse(&points).unwrap();
        assert!(
            (e.aspect_ratio() - 1.0).abs() < 0.05,
            "aspect = {}",
            e.aspect_ratio()
        );
    }
}
