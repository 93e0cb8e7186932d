use ndarray::Array2;

use crate::consts::{
    DEFECTIVE_LINE_THRESHOLD, DEFECTIVE_PATCH_HALF, DEFECTIVE_SMOOTH_WINDOW, DEFECTIVE_SPAN_MARGIN,
};
use crate::error::Result;
use crate::geometry::edges::vertical_span;
use crate::math::savgol::{odd_window, savgol_filter};
use crate::math::stats::median;
use crate::pipeline::log::RunLog;

/// Detect and repair rows whose along-scan mean deviates from the local
/// trend, caused by dust on the slit or dropped scan lines.
///
/// The along-scan mean profile inside the disk span is compared against
/// a wide Savitzky-Golay smoothing of itself; rows off by more than the
/// relative threshold are replaced with the column-wise median of their
/// neighborhood, always sampled from the pre-correction image so
/// repairs do not compound.
pub fn correct_defective_lines(img: Array2<u16>, log: &mut RunLog) -> Result<Array2<u16>> {
    let (h, w) = img.dim();
    let (y1, y2) = vertical_span(&img, 5);

    let lo = y1 + DEFECTIVE_SPAN_MARGIN;
    let hi = y2.saturating_sub(DEFECTIVE_SPAN_MARGIN);
    if hi <= lo + 8 || w < 8 {
        log.info("Disk span too short for defective-line detection");
        return Ok(img);
    }

    let profile: Vec<f64> = (lo..hi)
        .map(|y| img.row(y).iter().map(|&v| v as f64).sum::<f64>() / w as f64)
        .collect();

    let window = odd_window(DEFECTIVE_SMOOTH_WINDOW, profile.len());
    if window < 5 {
        return Ok(img);
    }
    let smoothed = savgol_filter(&profile, window, 3)?;

    let flagged: Vec<usize> = profile
        .iter()
        .zip(&smoothed)
        .enumerate()
        .filter(|(_, (&raw, &trend))| {
            trend > 0.0 && (raw / trend - 1.0).abs() > DEFECTIVE_LINE_THRESHOLD
        })
        .map(|(i, _)| i + lo)
        .collect();

    if flagged.is_empty() {
        return Ok(img);
    }
    log.info(format!(
        "Defective lines corrected: {} row(s) {:?}",
        flagged.len(),
        flagged
    ));

    let original = img.clone();
    let mut out = img;

    for &row in &flagged {
        let block_lo = row.saturating_sub(DEFECTIVE_PATCH_HALF);
        let block_hi = (row + DEFECTIVE_PATCH_HALF).min(h);

        // column-wise median over the neighborhood, skipping the 2
        // outermost columns each side which can be spuriously zero
        let mut patch = vec![0u16; w];
        for x in 2..w - 2 {
            let vals: Vec<f64> = (block_lo..block_hi)
                .map(|y| original[[y, x]] as f64)
                .collect();
            patch[x] = median(&vals).round() as u16;
        }
        patch[0] = patch[2];
        patch[1] = patch[2];
        patch[w - 2] = patch[w - 3];
        patch[w - 1] = patch[w - 3];

        for x in 0..w {
            out[[row, x]] = patch[x];
        }
    }

    Ok(out)
}
