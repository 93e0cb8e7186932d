use std::collections::BTreeMap;

use ndarray::Array2;

use crate::geometry::{DiskGeometry, GeometryState};
use crate::pipeline::config::SolarEphemeris;
use crate::pipeline::log::RunLog;

/// Scan processing stage, used for progress reporting.
#[derive(Clone, Copy, Debug)]
pub enum ScanStage {
    Reading,
    MeanImage,
    CurvatureFit,
    Reconstruction,
    LineCorrection,
    FlatField,
    Geometry,
    Finalizing,
}

impl std::fmt::Display for ScanStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reading => write!(f, "Reading frames"),
            Self::MeanImage => write!(f, "Computing mean image"),
            Self::CurvatureFit => write!(f, "Fitting line curvature"),
            Self::Reconstruction => write!(f, "Reconstructing disks"),
            Self::LineCorrection => write!(f, "Repairing defective lines"),
            Self::FlatField => write!(f, "Correcting flat field"),
            Self::Geometry => write!(f, "Solving disk geometry"),
            Self::Finalizing => write!(f, "Finalizing"),
        }
    }
}

/// Thread-safe progress reporting for the scan pipeline.
///
/// Implementors can use this to drive progress bars, logging, or any
/// other UI feedback. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new stage has started. `total_items` is the number of work
    /// items in this stage (e.g., frame count), if known.
    fn begin_stage(&self, _stage: ScanStage, _total_items: Option<usize>) {}

    /// One work item within the current stage has completed.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}
}

/// No-op progress reporter, used when `run_scan` delegates.
pub(super) struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

/// Everything a caller needs to label one output channel.
#[derive(Clone, Debug)]
pub struct ChannelMetadata {
    /// Column offset from the line center, pixels.
    pub shift: f64,
    pub center_x: f64,
    pub center_y: f64,
    pub radius: f64,
    pub tilt_deg: f64,
    pub aspect_ratio: f64,
    pub rotation_deg: f64,
    pub geometry_state: GeometryState,
    /// Curvature polynomial (a, b, c) the channel was extracted with.
    pub poly: [f64; 3],
    /// Disk bounding box (x1, x2, y1, y2) on the final image.
    pub bbox: (usize, usize, usize, usize),
    pub frame_count: usize,
    pub bit_depth: u32,
    pub solar: Option<SolarEphemeris>,
    pub extra: BTreeMap<String, String>,
}

impl ChannelMetadata {
    /// Flatten into string key/value pairs, ready for a TOML sidecar or
    /// a FITS-style header block.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("shift".into(), format!("{:.2}", self.shift));
        map.insert("center_x".into(), format!("{:.2}", self.center_x));
        map.insert("center_y".into(), format!("{:.2}", self.center_y));
        map.insert("radius".into(), format!("{:.2}", self.radius));
        map.insert("tilt_deg".into(), format!("{:.4}", self.tilt_deg));
        map.insert("ratio_sy_sx".into(), format!("{:.4}", self.aspect_ratio));
        map.insert("rotation_deg".into(), format!("{:.3}", self.rotation_deg));
        let state = match self.geometry_state {
            GeometryState::Normal => "normal",
            GeometryState::Forced => "forced",
            GeometryState::NoBounds => "no-bounds",
        };
        map.insert("geometry".into(), state.into());
        map.insert(
            "poly".into(),
            format!("{:.6e} {:.6e} {:.4}", self.poly[0], self.poly[1], self.poly[2]),
        );
        let (x1, x2, y1, y2) = self.bbox;
        map.insert("bbox".into(), format!("{} {} {} {}", x1, x2, y1, y2));
        map.insert("frame_count".into(), self.frame_count.to_string());
        map.insert("bit_depth".into(), self.bit_depth.to_string());
        if let Some(solar) = self.solar {
            map.insert("solar_b0".into(), format!("{:.4}", solar.b0));
            map.insert("solar_l0".into(), format!("{:.4}", solar.l0));
            map.insert("carrington".into(), format!("{:.2}", solar.carrington));
        }
        for (k, v) in &self.extra {
            map.insert(k.clone(), v.clone());
        }
        map
    }
}

/// One reconstructed wavelength channel.
#[derive(Clone, Debug)]
pub struct ChannelImage {
    pub image: Array2<u16>,
    pub metadata: ChannelMetadata,
}

/// Result of one scan reconstruction.
pub struct ScanOutput {
    /// Channels in the order the mode defines, zero offset first.
    pub channels: Vec<ChannelImage>,
    /// Geometry of record: the zero-offset channel's solution.
    pub geometry: DiskGeometry,
    /// True when an out-of-bounds shift collapsed the output to the
    /// line-center channel only.
    pub collapsed: bool,
    pub log: RunLog,
}
