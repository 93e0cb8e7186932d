/// Per-frame mean intensity (16-bit scale) above which a frame is
/// considered to carry solar signal when building the mean image.
pub const BRIGHT_FRAME_THRESHOLD: f64 = 3000.0;

/// Minimum number of bright frames required before the mean image is
/// restricted to the bright-only accumulation.
pub const BRIGHT_MAJORITY_COUNT: usize = 500;

/// Sigma multiplier for outlier rejection in the curvature fit.
pub const CURVATURE_SIGMA_CLIP: f64 = 6.0;

/// Number of fit/reject passes in the curvature fit.
pub const CURVATURE_CLIP_PASSES: usize = 2;

/// Rows excluded at each end of the spectrum span before fitting the
/// line-minimum positions. On short scans the margin shrinks to a
/// quarter of the span so the fit always sees most of it.
pub const CURVATURE_FIT_MARGIN: usize = 30;

/// Minimum number of rows the curvature fit must have after the margin
/// is applied.
pub const CURVATURE_MIN_ROWS: usize = 10;

/// Half-window (in columns) for the absorption-line position refinement.
pub const LINE_REFINE_HALF_WINDOW: usize = 13;

/// Relative deviation from the smoothed along-scan profile above which a
/// row is flagged as defective.
pub const DEFECTIVE_LINE_THRESHOLD: f64 = 0.02;

/// Savitzky-Golay window for the defective-line detection profile.
pub const DEFECTIVE_SMOOTH_WINDOW: usize = 41;

/// Rows kept inside the disk span (each side) for defective-line detection.
pub const DEFECTIVE_SPAN_MARGIN: usize = 15;

/// Half-height of the neighborhood used to patch a defective row.
pub const DEFECTIVE_PATCH_HALF: usize = 11;

/// Savitzky-Golay window for the flat-field intensity profile.
pub const FLAT_SMOOTH_WINDOW: usize = 101;

/// Mean profile level above which the flat-field stage is skipped
/// (saturated disk, e.g. green-line corona scans).
pub const FLAT_SATURATION_LIMIT: f64 = 64000.0;

/// Disk-mask threshold as a fraction of the histogram high level.
pub const DISK_MASK_FRACTION: f64 = 0.5;

/// Disk-mask fraction used in low-dynamic-range mode.
pub const DISK_MASK_FRACTION_LOW_DYN: f64 = 0.7;

/// Fraction of the image height excluded at top and bottom when
/// collecting limb edge points.
pub const EDGE_EXCLUSION_FRACTION: f64 = 0.1;

/// Minimum number of limb points for a trustworthy ellipse fit.
pub const MIN_EDGE_POINTS: usize = 8;

/// Aspect ratio applied when the disk has no visible horizontal limbs.
pub const NO_BOUNDS_RATIO: f64 = 0.5;

/// Deviation of the post-circularization aspect ratio from 1.0 that
/// triggers a second circularization pass on the canonical shift.
pub const RATIO_REFINE_THRESHOLD: f64 = 0.01;

/// Percentile of the dark strips used as background fill level.
pub const BACKGROUND_PERCENTILE: f64 = 55.0;

/// Height of the dark strips sampled above and below the disk.
pub const DARK_STRIP_ROWS: usize = 10;

/// Number of histogram bins for the background/high threshold heuristic.
pub const HISTOGRAM_BINS: usize = 256;

/// Fraction of the profile dynamic used as signal threshold in axis
/// bound detection.
pub const SPAN_THRESHOLD_FRACTION: f64 = 0.25;

/// Pixel values at or below this level after rotation are treated as
/// exposed border and filled with the background estimate.
pub const ROTATION_FILL_LIMIT: u16 = 10;

/// Margin, in pixels, that the slit position must keep from the image
/// edges for a shift to be valid (4-point interpolation support).
pub const SHIFT_EDGE_MARGIN: f64 = 2.0;

/// Default frame window around the brightness rise for the weak-line mean.
pub const WEAK_LINE_DEFAULT_WINDOW: (i64, i64) = (-10, 10);

/// Extra margin applied to the disk diameter when deriving an autocrop
/// size from the measured radius (diameter + 20%).
pub const AUTOCROP_RADIUS_MARGIN: f64 = 1.2;
