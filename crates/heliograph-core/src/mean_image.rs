use ndarray::Array2;

use crate::consts::{BRIGHT_FRAME_THRESHOLD, BRIGHT_MAJORITY_COUNT};
use crate::error::{HeliographError, Result};
use crate::io::ser::FrameSequence;
use crate::math::{poly::gradient, savgol::savgol_filter};
use crate::pipeline::log::RunLog;

/// Mean image of the scan plus the per-frame brightness series.
///
/// Used only for geometry estimation: the spectral line's curvature is
/// fitted on the mean, never on individual frames.
pub struct MeanImage {
    pub image: Array2<u16>,
    pub frame_means: Vec<f64>,
}

/// Accumulate the mean image over all frames.
///
/// Two sums run in parallel: one over every frame and one restricted to
/// frames whose mean exceeds the brightness threshold. When the scan has
/// a clear majority of bright frames the restricted sum wins, which
/// discards the empty-sky frames at both ends of the video.
pub fn build_mean_image(seq: &FrameSequence, log: &mut RunLog) -> Result<MeanImage> {
    let (h, w) = (seq.height(), seq.width());
    let mut sum_all = Array2::<u64>::zeros((h, w));
    let mut sum_bright = Array2::<u64>::zeros((h, w));
    let mut kept_all = 0usize;
    let mut kept_bright = 0usize;
    let mut frame_means = Vec::with_capacity(seq.frame_count());

    for frame in seq.frames() {
        let frame = frame?;
        let total: u64 = frame.iter().map(|&v| v as u64).sum();
        let mean = total as f64 / (h * w) as f64;
        frame_means.push(mean);

        sum_all.zip_mut_with(&frame, |acc, &v| *acc += v as u64);
        kept_all += 1;

        if mean > BRIGHT_FRAME_THRESHOLD {
            sum_bright.zip_mut_with(&frame, |acc, &v| *acc += v as u64);
            kept_bright += 1;
        }
    }

    let (sum, kept) = if kept_bright > BRIGHT_MAJORITY_COUNT {
        log.info(format!(
            "Mean image restricted to {} bright frames (of {})",
            kept_bright, kept_all
        ));
        (sum_bright, kept_bright)
    } else {
        (sum_all, kept_all)
    };

    if kept < 2 {
        return Err(HeliographError::EmptySequence);
    }

    // divide by kept-1 to avoid a biased divide on short bright runs
    let divisor = (kept - 1) as u64;
    let image = sum.mapv(|v| (v / divisor).min(u16::MAX as u64) as u16);

    Ok(MeanImage { image, frame_means })
}

impl MeanImage {
    /// Secondary mean over the frame window bracketing the steepest rise
    /// of the per-frame brightness series. Only the weak-line and
    /// polarization acquisition modes use it.
    pub fn weak_line_mean(
        &self,
        seq: &FrameSequence,
        window: (i64, i64),
        log: &mut RunLog,
    ) -> Result<Array2<u16>> {
        let smoothed = savgol_filter(&self.frame_means, 5, 3)?;
        let grad = gradient(&smoothed);

        let rise = grad
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i as i64)
            .unwrap_or(0);

        let n = seq.frame_count() as i64;
        let start = (rise + window.0).clamp(0, n - 1);
        let end = (rise + window.1).clamp(start + 1, n);
        log.info(format!(
            "Weak-line mean over frames {}..{} (brightness rise at {})",
            start, end, rise
        ));

        let (h, w) = (seq.height(), seq.width());
        let mut sum = Array2::<u64>::zeros((h, w));
        for i in start..end {
            let frame = seq.frame(i as usize)?;
            sum.zip_mut_with(&frame, |acc, &v| *acc += v as u64);
        }

        let count = (end - start) as u64;
        Ok(sum.mapv(|v| (v / count).min(u16::MAX as u64) as u16))
    }
}
