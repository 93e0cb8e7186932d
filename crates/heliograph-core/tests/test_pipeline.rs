mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use heliograph_core::geometry::GeometryState;
use heliograph_core::pipeline::config::{AutocropSize, ScanConfig, ScanMode};
use heliograph_core::pipeline::{run_scan, run_scan_reported, ProgressReporter, ScanStage};

use common::{build_ser_u16, write_test_ser};

const WIDTH: u32 = 60; // dispersion axis
const HEIGHT: u32 = 100; // spatial axis along the slit
const FRAMES: usize = 100;

const LINE_A: f64 = 0.001;
const LINE_B: f64 = 0.02;
const LINE_C: f64 = 25.0;

/// Synthetic slit-scan of a circular solar disk.
///
/// Frame t shows the spectrum of slit position t: rows inside the disk
/// carry a bright continuum with a curved absorption line, rows outside
/// only sky. Scanning t across the disk yields a circle of radius 40
/// centered on frame 50, row 50.
fn synthetic_scan() -> Vec<u8> {
    let line = |y: f64| LINE_A * y * y + LINE_B * y + LINE_C;

    let frames: Vec<Vec<u16>> = (0..FRAMES)
        .map(|t| {
            let dt = t as f64 - 50.0;
            let mut frame = vec![0u16; (WIDTH * HEIGHT) as usize];
            for y in 0..HEIGHT as usize {
                let dy = y as f64 - 50.0;
                let inside = dt * dt + dy * dy <= 40.0 * 40.0;
                let center = line(y as f64);
                for x in 0..WIDTH as usize {
                    let v = if inside {
                        // absorption line: 75% depth, 3-pixel ramp
                        let dx = (x as f64 - center).abs();
                        let dip = 0.75 * (1.0 - dx / 3.0).max(0.0);
                        20000.0 * (1.0 - dip)
                    } else {
                        800.0
                    };
                    frame[y * WIDTH as usize + x] = v as u16;
                }
            }
            frame
        })
        .collect();

    build_ser_u16(WIDTH, HEIGHT, &frames)
}

#[test]
fn reconstructs_circular_disk() {
    let tmp = write_test_ser(&synthetic_scan());
    let output = run_scan(tmp.path(), &ScanConfig::default()).unwrap();

    assert_eq!(output.channels.len(), 1);
    assert!(!output.collapsed);

    let geo = &output.geometry;
    assert_eq!(geo.state, GeometryState::Normal);
    assert!((geo.center_x - 50.0).abs() < 2.0, "center_x = {}", geo.center_x);
    assert!((geo.center_y - 50.0).abs() < 2.0, "center_y = {}", geo.center_y);
    assert!((geo.radius() - 40.0).abs() < 2.0, "radius = {}", geo.radius());
    assert!((geo.aspect_ratio - 1.0).abs() < 0.05, "ratio = {}", geo.aspect_ratio);

    // interior dark (line core), sky bright separation
    let img = &output.channels[0].image;
    assert!(img[[50, 50]] > 3000, "disk interior too dark");
    assert!(img[[5, 5]] < 2000, "sky too bright");
}

#[test]
fn output_is_deterministic() {
    let tmp = write_test_ser(&synthetic_scan());
    let a = run_scan(tmp.path(), &ScanConfig::default()).unwrap();
    let b = run_scan(tmp.path(), &ScanConfig::default()).unwrap();
    assert_eq!(a.channels[0].image, b.channels[0].image);
}

#[test]
fn doppler_channels_stay_coregistered() {
    let tmp = write_test_ser(&synthetic_scan());
    let config = ScanConfig {
        mode: ScanMode::DopplerContinuum {
            doppler_shift: 2.0,
            continuum_shift: 5.0,
            doppler_offset: 0.0,
            continuum_only: false,
        },
        ..Default::default()
    };
    let output = run_scan(tmp.path(), &config).unwrap();

    assert_eq!(output.channels.len(), 4);
    let shifts: Vec<f64> = output.channels.iter().map(|c| c.metadata.shift).collect();
    assert_eq!(shifts, vec![0.0, -2.0, 2.0, 5.0]);

    let dim = output.channels[0].image.dim();
    for channel in &output.channels[1..] {
        assert_eq!(channel.image.dim(), dim);
        assert_eq!(channel.metadata.geometry_state, GeometryState::Forced);
        assert!(
            (channel.metadata.center_x - output.geometry.center_x).abs() < 2.0,
            "channel drifted to {}",
            channel.metadata.center_x
        );
    }
}

#[test]
fn volume_scan_orders_channels() {
    let tmp = write_test_ser(&synthetic_scan());
    let config = ScanConfig {
        mode: ScanMode::VolumeScan { half_range: 2 },
        ..Default::default()
    };
    let output = run_scan(tmp.path(), &config).unwrap();

    let shifts: Vec<f64> = output.channels.iter().map(|c| c.metadata.shift).collect();
    assert_eq!(shifts, vec![0.0, -2.0, -1.0, 1.0, 2.0]);
}

#[test]
fn out_of_range_shift_collapses_to_center() {
    let tmp = write_test_ser(&synthetic_scan());
    let config = ScanConfig {
        mode: ScanMode::LineCenter { pixel_shift: 40.0 },
        ..Default::default()
    };
    let output = run_scan(tmp.path(), &config).unwrap();

    assert!(output.collapsed);
    assert_eq!(output.channels.len(), 1);
    assert_eq!(output.channels[0].metadata.shift, 0.0);
}

#[test]
fn autocrop_centers_disk_in_square() {
    let tmp = write_test_ser(&synthetic_scan());
    let config = ScanConfig {
        autocrop: Some(AutocropSize::FromRadius),
        ..Default::default()
    };
    let output = run_scan(tmp.path(), &config).unwrap();

    let (h, w) = output.channels[0].image.dim();
    assert_eq!(h, w);
    let meta = &output.channels[0].metadata;
    assert!((meta.center_x - w as f64 / 2.0).abs() < 1.0);
    assert!((meta.center_y - h as f64 / 2.0).abs() < 1.0);
    // side tracks the measured radius plus margin
    assert!(
        (h as f64 - 2.0 * 1.2 * meta.radius).abs() < 5.0,
        "side {} vs radius {}",
        h,
        meta.radius
    );
}

#[derive(Default)]
struct CountingReporter {
    reconstruction_total: AtomicUsize,
    last_advance: AtomicUsize,
}

impl ProgressReporter for CountingReporter {
    fn begin_stage(&self, stage: ScanStage, total_items: Option<usize>) {
        if matches!(stage, ScanStage::Reconstruction) {
            self.reconstruction_total
                .store(total_items.unwrap_or(0), Ordering::Relaxed);
        }
    }

    fn advance(&self, items_done: usize) {
        self.last_advance.fetch_max(items_done, Ordering::Relaxed);
    }
}

#[test]
fn reconstruction_reports_per_frame_progress() {
    let tmp = write_test_ser(&synthetic_scan());
    let reporter = Arc::new(CountingReporter::default());
    run_scan_reported(tmp.path(), &ScanConfig::default(), reporter.clone()).unwrap();

    let total = reporter.reconstruction_total.load(Ordering::Relaxed);
    assert_eq!(total, FRAMES);
    assert_eq!(reporter.last_advance.load(Ordering::Relaxed), total);
}

#[test]
fn noise_reduction_keeps_single_channel() {
    let tmp = write_test_ser(&synthetic_scan());
    let config = ScanConfig {
        noise_reduction: true,
        ..Default::default()
    };
    let output = run_scan(tmp.path(), &config).unwrap();

    assert_eq!(output.channels.len(), 1);
    assert!(output.log.to_text().contains("Noise reduction"));
}
