pub mod circularize;
pub mod edges;
pub mod ellipse;
pub mod tilt;

use ndarray::Array2;

use crate::consts::{DISK_MASK_FRACTION, NO_BOUNDS_RATIO, RATIO_REFINE_THRESHOLD};
use crate::error::Result;
use crate::pipeline::log::RunLog;

use circularize::circularize;
use edges::{detect_edge_points, histogram_thresholds, no_limbs, vertical_span};
use ellipse::{fit_ellipse, Ellipse};
use tilt::{apply_tilt, estimate_background, tilt_from_edges};

/// How the geometry for a channel was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeometryState {
    /// Estimated from the visible limb.
    Normal,
    /// Tilt and ratio supplied by the caller or propagated from the
    /// canonical channel.
    Forced,
    /// Disk touches the frame edges: fixed default ratio, no tilt
    /// correction, no autocrop.
    NoBounds,
}

/// Disk geometry of record for one channel.
#[derive(Clone, Copy, Debug)]
pub struct DiskGeometry {
    pub center_x: f64,
    pub center_y: f64,
    pub radius_x: f64,
    pub radius_y: f64,
    pub tilt_deg: f64,
    /// SY/SX ratio that was applied during circularization.
    pub aspect_ratio: f64,
    pub state: GeometryState,
}

impl DiskGeometry {
    pub fn radius(&self) -> f64 {
        self.radius_x.min(self.radius_y)
    }

    fn no_bounds(ratio: f64) -> Self {
        Self {
            center_x: 0.0,
            center_y: 0.0,
            radius_x: 0.0,
            radius_y: 0.0,
            tilt_deg: 0.0,
            aspect_ratio: ratio,
            state: GeometryState::NoBounds,
        }
    }
}

/// Tilt/ratio values carried from the canonical channel (or the caller)
/// into every other channel, keeping all outputs co-registered.
#[derive(Clone, Copy, Debug, Default)]
pub struct ForcedGeometry {
    pub tilt_deg: Option<f64>,
    pub ratio: Option<f64>,
}

/// Geometry-corrected image plus the geometry used.
pub struct GeometrySolution {
    pub image: Array2<u16>,
    pub geometry: DiskGeometry,
}

fn disk_threshold(img: &Array2<u16>) -> u16 {
    let (_, disk_level) = histogram_thresholds(img);
    (disk_level as f64 * DISK_MASK_FRACTION) as u16
}

fn limb_points(img: &Array2<u16>) -> Vec<(f64, f64)> {
    detect_edge_points(img, disk_threshold(img))
}

/// Correct tilt and aspect ratio for one channel.
///
/// `canonical` enables the refinement pass: only the zero-shift channel
/// may trigger a second circularization, and its result becomes the
/// geometry forced onto every other channel by the orchestrator.
pub fn solve_geometry(
    img: Array2<u16>,
    forced: ForcedGeometry,
    canonical: bool,
    log: &mut RunLog,
) -> Result<GeometrySolution> {
    let threshold = disk_threshold(&img);
    let points = detect_edge_points(&img, threshold);

    if no_limbs(&img, &points, threshold) {
        let ratio = forced.ratio.unwrap_or(NO_BOUNDS_RATIO);
        log.warn(format!(
            "No visible horizontal limbs: skipping tilt correction, \
             applying fixed SY/SX = {:.3}",
            ratio
        ));
        let (image, _) = circularize(&img, ratio);
        return Ok(GeometrySolution {
            image,
            geometry: DiskGeometry::no_bounds(ratio),
        });
    }

    let forced_state = forced.tilt_deg.is_some() && forced.ratio.is_some();

    // Tilt correction about the horizontal midpoint of the limb.
    let span = vertical_span(&img, 0);
    let background = estimate_background(&img, span);
    let tilt_deg = match forced.tilt_deg {
        Some(angle) => angle,
        None => tilt_from_edges(&points),
    };
    log.info(format!("Tilt angle: {:+.4}", tilt_deg));

    let x_min = points.iter().map(|p| p.0).fold(f64::MAX, f64::min);
    let x_max = points.iter().map(|p| p.0).fold(f64::MIN, f64::max);
    let colref = ((x_min + x_max) / 2.0).round();
    let detilted = apply_tilt(&img, tilt_deg, colref, background);

    // Aspect ratio from the detilted limb, then circularization.
    let ratio = match forced.ratio {
        Some(r) => {
            log.info(format!("Fixed scaling SY/SX: {:+.4}", r));
            r
        }
        None => {
            let pts = limb_points(&detilted);
            match fit_ellipse(&pts) {
                Ok(e) => {
                    let r = e.aspect_ratio();
                    log.info(format!("Scaling SY/SX: {:+.4}", r));
                    r
                }
                Err(err) => {
                    log.warn(format!(
                        "Ellipse fit failed after tilt correction ({}); \
                         applying fixed SY/SX = {:.3}",
                        err, NO_BOUNDS_RATIO
                    ));
                    NO_BOUNDS_RATIO
                }
            }
        }
    };
    let (mut image, _) = circularize(&detilted, ratio);

    // Sanity refit; one refinement pass on the canonical channel only.
    let mut applied_ratio = ratio;
    let fitted = match fit_ellipse(&limb_points(&image)) {
        Ok(mut e) => {
            let residual = e.aspect_ratio();
            if canonical
                && forced.ratio.is_none()
                && (residual - 1.0).abs() > RATIO_REFINE_THRESHOLD
            {
                log.info(format!("Second circularization pass, ratio {:+.4}", residual));
                let (refined, _) = circularize(&image, residual);
                image = refined;
                applied_ratio = ratio * residual;
                if let Ok(e2) = fit_ellipse(&limb_points(&image)) {
                    e = e2;
                }
            }
            log.info(format!("Final SY/SX: {:+.3}", e.aspect_ratio()));
            Some(e)
        }
        Err(err) => {
            log.warn(format!("Final ellipse fit failed: {}", err));
            None
        }
    };

    let geometry = match fitted {
        Some(Ellipse { cx, cy, rx, ry }) => DiskGeometry {
            center_x: cx,
            center_y: cy,
            radius_x: rx,
            radius_y: ry,
            tilt_deg,
            aspect_ratio: applied_ratio,
            state: if forced_state {
                GeometryState::Forced
            } else {
                GeometryState::Normal
            },
        },
        None => DiskGeometry::no_bounds(applied_ratio),
    };

    Ok(GeometrySolution { image, geometry })
}
