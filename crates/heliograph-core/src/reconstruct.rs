use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::parallel::prelude::*;
use ndarray::{Array2, ArrayView2, ArrayViewMut1, Axis};

use crate::curvature::{CurvatureModel, SamplePos};
use crate::error::Result;
use crate::io::ser::FrameSequence;

/// 4-point Catmull-Rom interpolation at fractional offset `t` in [0, 1)
/// between `p1` and `p2`.
#[inline]
fn catmull_rom(p0: f64, p1: f64, p2: f64, p3: f64, t: f64) -> f64 {
    0.5 * (2.0 * p1
        + (p2 - p0) * t
        + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t * t
        + (3.0 * (p1 - p2) + p3 - p0) * t * t * t)
}

/// Extract the sub-pixel slit column of one frame into `column`.
///
/// For every row the four neighboring columns around the curvature
/// model's position are combined with a Catmull-Rom kernel; the result
/// is clipped to the 16-bit range.
fn extract_column(frame: ArrayView2<u16>, table: &[SamplePos], mut column: ArrayViewMut1<u16>) {
    for (y, (pos, out)) in table.iter().zip(column.iter_mut()).enumerate() {
        let x = pos.floor;
        let p0 = frame[[y, x - 1]] as f64;
        let p1 = frame[[y, x]] as f64;
        let p2 = frame[[y, x + 1]] as f64;
        let p3 = frame[[y, x + 2]] as f64;
        let v = catmull_rom(p0, p1, p2, p3, pos.frac);
        *out = v.round().clamp(0.0, 65535.0) as u16;
    }
}

/// Reconstruct one raw disk per offset.
///
/// Each disk has shape (frame height, frame count): row = spatial axis
/// along the slit, column = scan position. Frames are independent, so
/// the per-frame extraction runs in parallel over the disk's columns.
/// `progress` is invoked with the cumulative number of extracted
/// columns, across all offsets.
pub fn reconstruct_disks(
    seq: &FrameSequence,
    model: &CurvatureModel,
    offsets: &[f64],
    progress: &(dyn Fn(usize) + Send + Sync),
) -> Result<Vec<Array2<u16>>> {
    let h = seq.height();
    let w = seq.width();
    let n = seq.frame_count();
    let done = AtomicUsize::new(0);

    let mut disks = Vec::with_capacity(offsets.len());
    for &shift in offsets {
        let table = model.sample_table(h, w, shift);
        let mut disk = Array2::<u16>::zeros((h, n));

        disk.axis_iter_mut(Axis(1))
            .into_par_iter()
            .enumerate()
            .try_for_each(|(i, column)| -> Result<()> {
                let frame = seq.frame(i)?;
                extract_column(frame.view(), &table, column);
                progress(done.fetch_add(1, Ordering::Relaxed) + 1);
                Ok(())
            })?;

        disks.push(disk);
    }

    Ok(disks)
}
