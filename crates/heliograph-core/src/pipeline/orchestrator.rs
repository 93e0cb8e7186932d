use std::path::Path;
use std::sync::Arc;

use ndarray::Array2;
use tracing::info;

use crate::correct::defective_lines::correct_defective_lines;
use crate::correct::flat_field::correct_flat_field;
use crate::curvature::{fit_curvature, refine_line_position, CurvatureModel};
use crate::error::Result;
use crate::finalize::finalize_channel;
use crate::geometry::edges::vertical_span;
use crate::geometry::{solve_geometry, DiskGeometry, ForcedGeometry, GeometryState};
use crate::io::ser::FrameSequence;
use crate::mean_image::build_mean_image;
use crate::pipeline::log::RunLog;
use crate::reconstruct::reconstruct_disks;
use crate::shifts::resolve_shifts;

use super::config::{ScanConfig, ScanMode};
use super::types::{
    ChannelImage, ChannelMetadata, NoOpReporter, ProgressReporter, ScanOutput, ScanStage,
};

/// Pick the curvature model for the scan.
///
/// Weak-line mode fits on the mean of the frames bracketing the
/// brightness rise, where a faint line still has contrast; polarization
/// mode re-anchors the fitted model on the measured line position at
/// mid-span before adding the Zeeman offset.
fn resolve_curvature(
    seq: &FrameSequence,
    mean: &crate::mean_image::MeanImage,
    span: (usize, usize),
    config: &ScanConfig,
    log: &mut RunLog,
) -> Result<CurvatureModel> {
    if let Some([a, b, c]) = config.forced_poly {
        log.info(format!("Forced curvature coefficients: {:.4e} {:.4e} {:.2}", a, b, c));
        return Ok(CurvatureModel::new(a, b, c));
    }

    let model = match &config.mode {
        ScanMode::WeakLine { free_shift, .. } => {
            let windowed = mean.weak_line_mean(seq, config.weak_window(), log)?;
            let model = fit_curvature(&windowed, span, config.slit_window, log)?;
            model.offset(*free_shift)
        }
        ScanMode::Polarization { zeeman_shift, .. } => {
            let model = fit_curvature(&mean.image, span, config.slit_window, log)?;
            let y_mid = (span.0 + span.1) as f64 / 2.0;
            let expected = model.eval(y_mid);
            let refined = refine_line_position(mean.image.row(y_mid.round() as usize), expected);
            log.info(format!(
                "Line position at mid-span: fitted {:.2}, measured {:.2}",
                expected, refined
            ));
            model.offset(refined - expected + zeeman_shift)
        }
        _ => fit_curvature(&mean.image, span, config.slit_window, log)?,
    };
    Ok(model)
}

/// Run the full scan reconstruction with a thread-safe progress reporter.
pub fn run_scan_reported(
    input: &Path,
    config: &ScanConfig,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<ScanOutput> {
    config.validate()?;
    let mut log = RunLog::new();

    reporter.begin_stage(ScanStage::Reading, None);
    let seq = FrameSequence::open(input)?;
    let (h, w, n) = (seq.height(), seq.width(), seq.frame_count());
    info!(frames = n, width = w, height = h, "Opened SER scan");
    log.info(format!(
        "Scan: {} frames of {}x{}, {} bits",
        n,
        w,
        h,
        seq.bit_depth()
    ));
    reporter.finish_stage();

    reporter.begin_stage(ScanStage::MeanImage, Some(n));
    let mean = build_mean_image(&seq, &mut log)?;
    reporter.finish_stage();

    reporter.begin_stage(ScanStage::CurvatureFit, None);
    let span = vertical_span(&mean.image, 5);
    log.info(format!("Spectrum span y: [{}, {}]", span.0, span.1));
    let model = resolve_curvature(&seq, &mean, span, config, &mut log)?;
    let shifts = resolve_shifts(&config.mode, config.noise_reduction, &model, span, w, &mut log);
    reporter.finish_stage();

    reporter.begin_stage(
        ScanStage::Reconstruction,
        Some(shifts.reconstruct.len() * seq.frame_count()),
    );
    let disks = reconstruct_disks(&seq, &model, &shifts.reconstruct, &|done| {
        reporter.advance(done)
    })?;
    reporter.finish_stage();
    let disks = shifts.combine_noise_triplets(disks, &mut log);

    let mut channels = Vec::with_capacity(disks.len());
    let mut canonical_geometry: Option<DiskGeometry> = None;
    let sensor_height = seq.sensor_height();

    for (k, disk) in disks.into_iter().enumerate() {
        let shift = shifts.channels[k];
        if shifts.channels.len() > 1 {
            log.info(format!("Channel {} (shift {:+.2})", k, shift));
        }

        let corrected = run_corrections(disk, config, &reporter, &mut log)?;

        reporter.begin_stage(ScanStage::Geometry, None);
        let forced = match canonical_geometry {
            // Every later channel inherits the canonical solution so all
            // outputs stay co-registered.
            Some(geo) => ForcedGeometry {
                tilt_deg: Some(geo.tilt_deg),
                ratio: Some(geo.aspect_ratio),
            },
            None => ForcedGeometry {
                tilt_deg: config.forced_tilt_deg,
                ratio: config.forced_ratio,
            },
        };
        let solution = solve_geometry(corrected, forced, k == 0, &mut log)?;
        reporter.finish_stage();

        reporter.begin_stage(ScanStage::Finalizing, None);
        let finalized =
            finalize_channel(solution.image, solution.geometry, config, sensor_height, &mut log)?;
        reporter.finish_stage();

        if canonical_geometry.is_none() && solution.geometry.state != GeometryState::NoBounds {
            canonical_geometry = Some(solution.geometry);
        }

        let metadata = ChannelMetadata {
            shift,
            center_x: finalized.geometry.center_x,
            center_y: finalized.geometry.center_y,
            radius: finalized.geometry.radius(),
            tilt_deg: finalized.geometry.tilt_deg,
            aspect_ratio: finalized.geometry.aspect_ratio,
            rotation_deg: finalized.rotation_deg,
            geometry_state: finalized.geometry.state,
            poly: model.offset(shift).coeffs(),
            bbox: finalized.bbox,
            frame_count: n,
            bit_depth: seq.bit_depth(),
            solar: config.solar,
            extra: config.extra_metadata.clone(),
        };
        channels.push(ChannelImage {
            image: finalized.image,
            metadata,
        });
    }

    let geometry = channels[0].metadata.clone();
    let geometry = DiskGeometry {
        center_x: geometry.center_x,
        center_y: geometry.center_y,
        radius_x: geometry.radius,
        radius_y: geometry.radius,
        tilt_deg: geometry.tilt_deg,
        aspect_ratio: geometry.aspect_ratio,
        state: geometry.geometry_state,
    };

    Ok(ScanOutput {
        channels,
        geometry,
        collapsed: shifts.collapsed,
        log,
    })
}

fn run_corrections(
    disk: Array2<u16>,
    config: &ScanConfig,
    reporter: &Arc<dyn ProgressReporter>,
    log: &mut RunLog,
) -> Result<Array2<u16>> {
    reporter.begin_stage(ScanStage::LineCorrection, None);
    let repaired = correct_defective_lines(disk, log)?;
    reporter.finish_stage();

    reporter.begin_stage(ScanStage::FlatField, None);
    let flat = correct_flat_field(repaired, config.low_dynamic_range, log)?;
    reporter.finish_stage();

    Ok(flat)
}

/// Run the full scan reconstruction without progress reporting.
pub fn run_scan(input: &Path, config: &ScanConfig) -> Result<ScanOutput> {
    run_scan_reported(input, config, Arc::new(NoOpReporter))
}
