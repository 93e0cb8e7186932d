use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use heliograph_core::io::image_io::save_png16;
use heliograph_core::pipeline::config::{AutocropSize, ScanConfig, ScanMode, SlitWindow};
use heliograph_core::pipeline::{run_scan_reported, ProgressReporter, ScanOutput, ScanStage};

use crate::summary::print_scan_summary;

#[derive(Args)]
pub struct ReconstructArgs {
    /// Input SER file
    pub file: PathBuf,

    /// Scan config file (TOML); overrides every other option
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Pixel shift from the line center for the single-channel mode
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    pub shift: f64,

    /// Doppler wing offset in pixels; enables the Doppler/continuum mode
    #[arg(long)]
    pub doppler: Option<f64>,

    /// Continuum channel offset in pixels (Doppler/continuum mode)
    #[arg(long, default_value = "16", allow_hyphen_values = true)]
    pub continuum: f64,

    /// Common displacement added to both Doppler wings
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    pub doppler_offset: f64,

    /// Reconstruct only the line center and continuum channels
    #[arg(long)]
    pub continuum_only: bool,

    /// Volume scan: reconstruct every 1-pixel step in [-N, +N]
    #[arg(long, value_name = "N")]
    pub volume: Option<u32>,

    /// Polarization mode: symmetric channel pair at +/- OFFSET pixels
    #[arg(long, value_name = "OFFSET")]
    pub polarization: Option<f64>,

    /// Zeeman displacement added to the measured line (polarization mode)
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    pub zeeman_shift: f64,

    /// Weak-line mode: two comma-separated channel offsets
    #[arg(long, value_name = "S1,S2")]
    pub weak_line: Option<String>,

    /// Free displacement of the fitted line (weak-line mode)
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    pub free_shift: f64,

    /// Reconstruct each channel from a 3-column triplet
    #[arg(long)]
    pub noise_reduction: bool,

    /// Crop the output to a square around the disk
    #[arg(long)]
    pub autocrop: bool,

    /// Fixed square crop size in pixels (implies --autocrop)
    #[arg(long, value_name = "PIXELS")]
    pub crop_size: Option<usize>,

    /// East-west mirror of the final image
    #[arg(long)]
    pub flip_horizontal: bool,

    /// North-south mirror of the final image
    #[arg(long)]
    pub flip_vertical: bool,

    /// Raise the disk segmentation threshold for low-contrast scans
    #[arg(long)]
    pub low_dynamic: bool,

    /// Force the tilt angle in degrees instead of measuring it
    #[arg(long, allow_hyphen_values = true)]
    pub tilt: Option<f64>,

    /// Force the SY/SX aspect ratio instead of measuring it
    #[arg(long)]
    pub ratio: Option<f64>,

    /// Solar P angle added to the final rotation, degrees
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    pub position_angle: f64,

    /// Restrict the slit search to columns [X1, X2)
    #[arg(long, value_name = "X1,X2")]
    pub slit_window: Option<String>,

    /// Output directory (defaults to the input file's directory)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}

fn parse_pair(value: &str, flag: &str) -> Result<(f64, f64)> {
    let parts: Vec<&str> = value.split(',').collect();
    if parts.len() != 2 {
        bail!("--{} expects two comma-separated values, got '{}'", flag, value);
    }
    let a = parts[0].trim().parse().with_context(|| format!("invalid --{}", flag))?;
    let b = parts[1].trim().parse().with_context(|| format!("invalid --{}", flag))?;
    Ok((a, b))
}

fn build_config(args: &ReconstructArgs) -> Result<ScanConfig> {
    let mode = if let Some(half_range) = args.volume {
        ScanMode::VolumeScan { half_range }
    } else if let Some(doppler_shift) = args.doppler {
        ScanMode::DopplerContinuum {
            doppler_shift,
            continuum_shift: args.continuum,
            doppler_offset: args.doppler_offset,
            continuum_only: args.continuum_only,
        }
    } else if let Some(offset) = args.polarization {
        ScanMode::Polarization {
            offset,
            zeeman_shift: args.zeeman_shift,
        }
    } else if let Some(ref pair) = args.weak_line {
        let (shift1, shift2) = parse_pair(pair, "weak-line")?;
        ScanMode::WeakLine {
            shift1,
            shift2,
            free_shift: args.free_shift,
        }
    } else {
        ScanMode::LineCenter {
            pixel_shift: args.shift,
        }
    };

    let autocrop = match (args.crop_size, args.autocrop) {
        (Some(size), _) => Some(AutocropSize::Fixed(size)),
        (None, true) => Some(AutocropSize::FromRadius),
        (None, false) => None,
    };

    let slit_window = match args.slit_window {
        Some(ref pair) => {
            let (x1, x2) = parse_pair(pair, "slit-window")?;
            Some(SlitWindow {
                x_min: x1 as usize,
                x_max: x2 as usize,
            })
        }
        None => None,
    };

    Ok(ScanConfig {
        mode,
        noise_reduction: args.noise_reduction,
        autocrop,
        flip_horizontal: args.flip_horizontal,
        flip_vertical: args.flip_vertical,
        low_dynamic_range: args.low_dynamic,
        forced_tilt_deg: args.tilt,
        forced_ratio: args.ratio,
        position_angle_deg: args.position_angle,
        slit_window,
        ..Default::default()
    })
}

/// Progress reporting over one indicatif bar, swapped per stage.
struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }
}

impl ProgressReporter for CliReporter {
    fn begin_stage(&self, stage: ScanStage, total_items: Option<usize>) {
        let bar = match total_items {
            Some(total) => {
                let pb = ProgressBar::new(total as u64);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("{msg:28} [{bar:40}] {pos}/{len}")
                        .expect("valid progress template")
                        .progress_chars("=> "),
                );
                pb
            }
            None => {
                let pb = ProgressBar::new_spinner();
                pb.enable_steady_tick(std::time::Duration::from_millis(100));
                pb
            }
        };
        bar.set_message(stage.to_string());
        *self.bar.lock().expect("progress bar lock") = Some(bar);
    }

    fn advance(&self, items_done: usize) {
        if let Some(ref bar) = *self.bar.lock().expect("progress bar lock") {
            bar.set_position(items_done as u64);
        }
    }

    fn finish_stage(&self) {
        if let Some(bar) = self.bar.lock().expect("progress bar lock").take() {
            bar.finish_and_clear();
        }
    }
}

fn channel_path(dir: &Path, stem: &str, shift: f64, index: usize) -> PathBuf {
    if shift == 0.0 && index == 0 {
        dir.join(format!("{}_disk.png", stem))
    } else {
        dir.join(format!("{}_shift{:+.1}.png", stem, shift))
    }
}

fn write_outputs(output: &ScanOutput, dir: &Path, stem: &str) -> Result<PathBuf> {
    let mut first = PathBuf::new();
    let mut meta = toml::value::Table::new();

    for (k, channel) in output.channels.iter().enumerate() {
        let path = channel_path(dir, stem, channel.metadata.shift, k);
        save_png16(&channel.image, &path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        if k == 0 {
            first = path;
        }

        let mut table = toml::value::Table::new();
        for (key, value) in channel.metadata.to_map() {
            table.insert(key, toml::Value::String(value));
        }
        meta.insert(format!("channel_{}", k), toml::Value::Table(table));
    }

    let meta_path = dir.join(format!("{}_meta.toml", stem));
    std::fs::write(&meta_path, toml::to_string_pretty(&toml::Value::Table(meta))?)
        .with_context(|| format!("Failed to write {}", meta_path.display()))?;

    let log_path = dir.join(format!("{}_log.txt", stem));
    std::fs::write(&log_path, output.log.to_text())
        .with_context(|| format!("Failed to write {}", log_path.display()))?;

    Ok(first)
}

pub fn run(args: &ReconstructArgs) -> Result<()> {
    let config: ScanConfig = if let Some(ref config_path) = args.config {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config {}", config_path.display()))?;
        toml::from_str(&contents).context("Invalid scan config")?
    } else {
        build_config(args)?
    };

    print_scan_summary(&args.file, &config);

    let reporter = Arc::new(CliReporter::new());
    let output = run_scan_reported(&args.file, &config, reporter)?;

    if output.collapsed {
        eprintln!("Warning: shift out of range, only the line-center channel was computed");
    }

    let dir = match args.output_dir {
        Some(ref dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            dir.clone()
        }
        None => args
            .file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    let stem = args
        .file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "scan".into());

    let first = write_outputs(&output, &dir, &stem)?;

    println!();
    println!(
        "Disk center ({:.1}, {:.1}), radius {:.1} px",
        output.geometry.center_x,
        output.geometry.center_y,
        output.geometry.radius()
    );
    println!(
        "{} channel(s) saved, first: {}",
        output.channels.len(),
        first.display()
    );

    Ok(())
}
