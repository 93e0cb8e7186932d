use ndarray::Array2;

use crate::consts::SHIFT_EDGE_MARGIN;
use crate::curvature::CurvatureModel;
use crate::pipeline::config::ScanMode;
use crate::pipeline::log::RunLog;

/// Resolved set of column offsets to reconstruct.
#[derive(Clone, Debug)]
pub struct ShiftSet {
    /// One entry per output channel, zero offset first.
    pub channels: Vec<f64>,
    /// Offsets actually reconstructed; with noise reduction each channel
    /// expands to the triplet (s-1, s, s+1).
    pub reconstruct: Vec<f64>,
    pub noise_reduction: bool,
    /// True when an out-of-bounds shift collapsed the set to [0].
    pub collapsed: bool,
}

/// Channel offsets for the acquisition mode, before bounds validation.
fn mode_offsets(mode: &ScanMode) -> Vec<f64> {
    match mode {
        ScanMode::LineCenter { pixel_shift } => vec![*pixel_shift],
        ScanMode::DopplerContinuum {
            doppler_shift,
            continuum_shift,
            doppler_offset,
            continuum_only,
        } => {
            if *continuum_only {
                vec![0.0, *continuum_shift]
            } else {
                vec![
                    0.0,
                    doppler_offset - doppler_shift,
                    doppler_offset + doppler_shift,
                    *continuum_shift,
                ]
            }
        }
        ScanMode::VolumeScan { half_range } => {
            let n = *half_range as i64;
            // zero first, then the negative and positive wings in order
            let mut offsets = vec![0.0];
            offsets.extend((-n..0).map(|s| s as f64));
            offsets.extend((1..=n).map(|s| s as f64));
            offsets
        }
        ScanMode::Polarization { offset, .. } => vec![0.0, -offset, *offset],
        ScanMode::WeakLine { shift1, shift2, .. } => vec![0.0, *shift1, *shift2],
    }
}

/// Resolve the shift set, validating that the extreme offsets keep the
/// curvature model's column range clear of the image edges over the
/// spectrum span. On violation the set collapses to the zero offset.
pub fn resolve_shifts(
    mode: &ScanMode,
    noise_reduction: bool,
    model: &CurvatureModel,
    span: (usize, usize),
    width: usize,
    log: &mut RunLog,
) -> ShiftSet {
    let mut channels = mode_offsets(mode);

    let (top, bottom) = span;
    let mut slit_min = f64::MAX;
    let mut slit_max = f64::MIN;
    for y in top..=bottom.max(top) {
        let x = model.eval(y as f64);
        slit_min = slit_min.min(x);
        slit_max = slit_max.max(x);
    }

    // noise reduction reconstructs s +/- 1, so validate the expanded range
    let expand = if noise_reduction { 1.0 } else { 0.0 };
    let max_abs = channels
        .iter()
        .fold(0.0_f64, |acc, s| acc.max(s.abs() + expand));
    let hi_limit = (width - 3) as f64;
    let mut collapsed = false;

    if slit_min - max_abs <= SHIFT_EDGE_MARGIN || slit_max + max_abs >= hi_limit {
        let legal = (slit_min - SHIFT_EDGE_MARGIN).min(hi_limit - slit_max);
        log.warn(format!(
            "Shift value too large (slit columns {:.1}..{:.1}, width {}); \
             maximum legal shift {:.1}. Only the line-center image will be computed.",
            slit_min, slit_max, width, legal
        ));
        channels = vec![0.0];
        collapsed = true;
    }

    let reconstruct = if noise_reduction {
        channels
            .iter()
            .flat_map(|&s| [s - 1.0, s, s + 1.0])
            .collect()
    } else {
        channels.clone()
    };

    ShiftSet {
        channels,
        reconstruct,
        noise_reduction,
        collapsed,
    }
}

impl ShiftSet {
    /// Collapse the reconstructed triplets back to one disk per channel,
    /// combining each as (0.5*lo + mid + 0.5*hi) / 2 -- a 3-tap smoothing
    /// along the dispersion axis that keeps the center sample dominant.
    pub fn combine_noise_triplets(&self, disks: Vec<Array2<u16>>, log: &mut RunLog) -> Vec<Array2<u16>> {
        if !self.noise_reduction {
            return disks;
        }
        log.info("Noise reduction: combining 3-column triplets");

        self.channels
            .iter()
            .enumerate()
            .map(|(i, _)| {
                let lo = &disks[3 * i];
                let mid = &disks[3 * i + 1];
                let hi = &disks[3 * i + 2];
                let mut out = Array2::<u16>::zeros(mid.dim());
                ndarray::Zip::from(&mut out)
                    .and(lo)
                    .and(mid)
                    .and(hi)
                    .for_each(|o, &a, &b, &c| {
                        let v = (0.5 * a as f64 + b as f64 + 0.5 * c as f64) / 2.0;
                        *o = v.round().clamp(0.0, 65535.0) as u16;
                    });
                out
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::log::RunLog;

    fn flat_model(c: f64) -> CurvatureModel {
        CurvatureModel::new(0.0, 0.0, c)
    }

    #[test]
    fn doppler_mode_orders_channels() {
        let mut log = RunLog::new();
        let mode = ScanMode::DopplerContinuum {
            doppler_shift: 5.0,
            continuum_shift: 16.0,
            doppler_offset: 0.0,
            continuum_only: false,
        };
        let set = resolve_shifts(&mode, false, &flat_model(60.0), (5, 120), 128, &mut log);
        assert_eq!(set.channels, vec![0.0, -5.0, 5.0, 16.0]);
        assert!(!set.collapsed);
    }

    #[test]
    fn out_of_bounds_collapses_to_zero() {
        let mut log = RunLog::new();
        let mode = ScanMode::DopplerContinuum {
            doppler_shift: 5.0,
            continuum_shift: 50.0,
            doppler_offset: 0.0,
            continuum_only: false,
        };
        // 60-pixel frame, slit near column 30: a 50-px shift cannot fit
        let set = resolve_shifts(&mode, false, &flat_model(30.0), (5, 45), 60, &mut log);
        assert_eq!(set.channels, vec![0.0]);
        assert!(set.collapsed);
    }

    #[test]
    fn noise_reduction_expands_triplets() {
        let mut log = RunLog::new();
        let mode = ScanMode::LineCenter { pixel_shift: 0.0 };
        let set = resolve_shifts(&mode, true, &flat_model(60.0), (5, 120), 128, &mut log);
        assert_eq!(set.channels, vec![0.0]);
        assert_eq!(set.reconstruct, vec![-1.0, 0.0, 1.0]);
    }

    #[test]
    fn noise_reduction_bounds_include_expansion() {
        let mode = ScanMode::LineCenter { pixel_shift: 26.5 };
        // slit at column 30 in a 60-px frame: 26.5 fits, 27.5 does not
        let mut log = RunLog::new();
        let set = resolve_shifts(&mode, false, &flat_model(30.0), (5, 45), 60, &mut log);
        assert!(!set.collapsed);

        let mut log = RunLog::new();
        let set = resolve_shifts(&mode, true, &flat_model(30.0), (5, 45), 60, &mut log);
        assert!(set.collapsed);
        assert_eq!(set.channels, vec![0.0]);
    }

    #[test]
    fn triplet_combination_weights() {
        let mut log = RunLog::new();
        let set = ShiftSet {
            channels: vec![0.0],
            reconstruct: vec![-1.0, 0.0, 1.0],
            noise_reduction: true,
            collapsed: false,
        };
        let disks = vec![
            Array2::from_elem((2, 2), 1000u16),
            Array2::from_elem((2, 2), 2000u16),
            Array2::from_elem((2, 2), 3000u16),
        ];
        let combined = set.combine_noise_triplets(disks, &mut log);
        assert_eq!(combined.len(), 1);
        // (0.5*1000 + 2000 + 0.5*3000) / 2 = 2000
        assert_eq!(combined[0][[0, 0]], 2000);
    }

    #[test]
    fn volume_scan_covers_range() {
        let mut log = RunLog::new();
        let mode = ScanMode::VolumeScan { half_range: 2 };
        let set = resolve_shifts(&mode, false, &flat_model(60.0), (5, 120), 128, &mut log);
        assert_eq!(set.channels, vec![0.0, -2.0, -1.0, 1.0, 2.0]);
    }
}
