use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::consts::WEAK_LINE_DEFAULT_WINDOW;
use crate::error::{HeliographError, Result};

/// Acquisition mode: which wavelength channels the scan reconstructs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ScanMode {
    /// Single image at the line center, optionally displaced by a fixed
    /// pixel shift (e.g. a continuum-only reconstruction).
    LineCenter { pixel_shift: f64 },
    /// Line center, both Doppler wings and a far-wing continuum channel.
    DopplerContinuum {
        doppler_shift: f64,
        continuum_shift: f64,
        /// Common displacement applied to both wings.
        doppler_offset: f64,
        /// Reconstruct only center + continuum.
        continuum_only: bool,
    },
    /// Every 1-pixel step in [-half_range, +half_range].
    VolumeScan { half_range: u32 },
    /// Center plus the symmetric Zeeman pair at +/- offset.
    Polarization { offset: f64, zeeman_shift: f64 },
    /// Center plus two caller-chosen offsets, fitted on the windowed
    /// start-of-scan mean; `free_shift` displaces the fitted polynomial.
    WeakLine {
        shift1: f64,
        shift2: f64,
        free_shift: f64,
    },
}

impl Default for ScanMode {
    fn default() -> Self {
        ScanMode::LineCenter { pixel_shift: 0.0 }
    }
}

/// Output framing: fixed square size, or derived from the measured disk
/// radius (diameter + 20%).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum AutocropSize {
    Fixed(usize),
    FromRadius,
}

/// Solar ephemeris merged into the output metadata when supplied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SolarEphemeris {
    /// Heliographic latitude of the disk center, degrees.
    pub b0: f64,
    /// Carrington longitude of the central meridian, degrees.
    pub l0: f64,
    /// Carrington rotation number.
    pub carrington: f64,
}

/// Horizontal sub-window restricting where the slit is searched.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlitWindow {
    pub x_min: usize,
    /// Exclusive upper bound; 0 means "to the image edge".
    pub x_max: usize,
}

/// Full configuration for one scan reconstruction, validated once at
/// pipeline entry.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default)]
    pub mode: ScanMode,

    /// Reconstruct each channel from a 3-column triplet and combine with
    /// weights (0.5, 1.0, 0.5) / 2.
    #[serde(default)]
    pub noise_reduction: bool,

    #[serde(default)]
    pub autocrop: Option<AutocropSize>,

    /// East-west mirror of the final image.
    #[serde(default)]
    pub flip_horizontal: bool,

    /// North-south mirror of the final image.
    #[serde(default)]
    pub flip_vertical: bool,

    /// Raise the disk segmentation threshold for low-contrast scans.
    #[serde(default)]
    pub low_dynamic_range: bool,

    /// Caller-forced tilt angle in degrees; skips tilt estimation.
    #[serde(default)]
    pub forced_tilt_deg: Option<f64>,

    /// Caller-forced SY/SX aspect ratio; skips ratio estimation.
    #[serde(default)]
    pub forced_ratio: Option<f64>,

    /// Caller-forced curvature polynomial (a, b, c); skips fitting.
    #[serde(default)]
    pub forced_poly: Option<[f64; 3]>,

    /// Solar P angle added to the final rotation, degrees.
    #[serde(default)]
    pub position_angle_deg: f64,

    #[serde(default)]
    pub slit_window: Option<SlitWindow>,

    /// Frame window around the brightness rise for the weak-line mean,
    /// relative frame indices (lo, hi).
    #[serde(default)]
    pub weak_line_window: Option<(i64, i64)>,

    #[serde(default)]
    pub solar: Option<SolarEphemeris>,

    /// Free-form keys merged into every channel's metadata map.
    #[serde(default)]
    pub extra_metadata: BTreeMap<String, String>,
}

impl ScanConfig {
    /// Check every option once; the pipeline assumes a valid config.
    pub fn validate(&self) -> Result<()> {
        match &self.mode {
            ScanMode::DopplerContinuum {
                doppler_shift,
                continuum_shift,
                ..
            } => {
                if *doppler_shift <= 0.0 {
                    return Err(HeliographError::InvalidConfig(
                        "doppler_shift must be positive".into(),
                    ));
                }
                if *continuum_shift == 0.0 {
                    return Err(HeliographError::InvalidConfig(
                        "continuum_shift must be non-zero".into(),
                    ));
                }
            }
            ScanMode::VolumeScan { half_range } => {
                if *half_range == 0 {
                    return Err(HeliographError::InvalidConfig(
                        "volume scan half_range must be at least 1".into(),
                    ));
                }
            }
            ScanMode::Polarization { offset, .. } => {
                if *offset <= 0.0 {
                    return Err(HeliographError::InvalidConfig(
                        "polarization offset must be positive".into(),
                    ));
                }
            }
            ScanMode::WeakLine { shift1, shift2, .. } => {
                if shift1 == shift2 {
                    return Err(HeliographError::InvalidConfig(
                        "weak-line shifts must differ".into(),
                    ));
                }
            }
            ScanMode::LineCenter { .. } => {}
        }

        if let Some(AutocropSize::Fixed(size)) = self.autocrop {
            if size == 0 {
                return Err(HeliographError::InvalidConfig(
                    "autocrop size must be positive".into(),
                ));
            }
        }
        if let Some(ratio) = self.forced_ratio {
            if ratio <= 0.0 {
                return Err(HeliographError::InvalidConfig(
                    "forced aspect ratio must be positive".into(),
                ));
            }
        }
        if let Some((lo, hi)) = self.weak_line_window {
            if hi <= lo {
                return Err(HeliographError::InvalidConfig(
                    "weak-line frame window must be increasing".into(),
                ));
            }
        }
        if let Some(win) = self.slit_window {
            if win.x_max != 0 && win.x_max <= win.x_min {
                return Err(HeliographError::InvalidConfig(
                    "slit window must be increasing".into(),
                ));
            }
        }
        Ok(())
    }

    /// Frame window for the weak-line mean, defaulted when unset.
    pub fn weak_window(&self) -> (i64, i64) {
        self.weak_line_window.unwrap_or(WEAK_LINE_DEFAULT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ScanConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_doppler() {
        let config = ScanConfig {
            mode: ScanMode::DopplerContinuum {
                doppler_shift: 0.0,
                continuum_shift: 16.0,
                doppler_offset: 0.0,
                continuum_only: false,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_ratio() {
        let config = ScanConfig {
            forced_ratio: Some(-1.0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
