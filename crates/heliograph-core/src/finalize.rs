use ndarray::{s, Array2};

use crate::consts::{AUTOCROP_RADIUS_MARGIN, ROTATION_FILL_LIMIT};
use crate::error::Result;
use crate::geometry::edges::{histogram_thresholds, horizontal_span, vertical_span};
use crate::geometry::{DiskGeometry, GeometryState};
use crate::pipeline::config::{AutocropSize, ScanConfig};
use crate::pipeline::log::RunLog;

/// Final image with the disk geometry re-expressed in its coordinates.
pub struct FinalizedChannel {
    pub image: Array2<u16>,
    pub geometry: DiskGeometry,
    /// Rotation that was applied to bring solar north up, degrees.
    pub rotation_deg: f64,
    /// Disk bounding box (x1, x2, y1, y2) measured on the final image.
    pub bbox: (usize, usize, usize, usize),
}

/// Orientation, rotation and framing for one reconstructed channel.
///
/// Flips come first so the tilt sign convention follows the sensor into
/// the flipped frame. The tilt residual is rescaled by the applied SY/SX
/// ratio before it joins the P angle, because circularization changed
/// the vertical scale the tilt was measured in.
pub fn finalize_channel(
    img: Array2<u16>,
    geometry: DiskGeometry,
    config: &ScanConfig,
    sensor_height: usize,
    log: &mut RunLog,
) -> Result<FinalizedChannel> {
    let mut image = img;
    let mut geometry = geometry;
    let mut sens_ns = 1.0_f64;
    let mut sens_ew = 1.0_f64;

    if config.flip_vertical {
        let h = image.nrows() as f64;
        image = image.slice(s![..;-1, ..]).to_owned();
        geometry.center_y = h - 1.0 - geometry.center_y;
        sens_ns = -1.0;
    }
    if config.flip_horizontal {
        let w = image.ncols() as f64;
        image = image.slice(s![.., ..;-1]).to_owned();
        geometry.center_x = w - 1.0 - geometry.center_x;
        sens_ew = -1.0;
    }

    let rotation_deg = if geometry.state == GeometryState::NoBounds {
        0.0
    } else if 2.0 * geometry.radius_x > sensor_height as f64 {
        if config.position_angle_deg != 0.0 {
            log.warn("Partial disk: solar north rotation skipped");
        }
        0.0
    } else {
        let ratio = if geometry.aspect_ratio > 0.0 {
            geometry.aspect_ratio
        } else {
            1.0
        };
        let tilt_scaled = (geometry.tilt_deg.to_radians().tan() / ratio)
            .atan()
            .to_degrees();
        config.position_angle_deg + sens_ns * sens_ew * tilt_scaled
    };

    let background = histogram_thresholds(&image).0;

    if rotation_deg != 0.0 {
        log.info(format!("Rotation to solar north: {:+.3} deg", rotation_deg));
        image = rotate_about(
            &image,
            rotation_deg,
            geometry.center_x,
            geometry.center_y,
        );
        // Interpolation leaves near-zero pixels along the swept corners.
        image.mapv_inplace(|v| if v <= ROTATION_FILL_LIMIT { background } else { v });
    }

    if geometry.state != GeometryState::NoBounds {
        if let Some(size) = config.autocrop {
            let side = match size {
                AutocropSize::Fixed(s) => s,
                AutocropSize::FromRadius => {
                    (2.0 * AUTOCROP_RADIUS_MARGIN * geometry.radius()).round() as usize
                }
            };
            log.info(format!("Crop to {0}x{0}", side));
            image = crop_square(
                &image,
                geometry.center_x,
                geometry.center_y,
                side,
                background,
            );
            geometry.center_x = side as f64 / 2.0;
            geometry.center_y = side as f64 / 2.0;
        }
    }

    let (x1, x2) = horizontal_span(&image, 0);
    let (y1, y2) = vertical_span(&image, 0);

    Ok(FinalizedChannel {
        image,
        geometry,
        rotation_deg,
        bbox: (x1, x2, y1, y2),
    })
}

/// Bilinear rotation by `angle_deg` counter-clockwise about a pivot.
/// Samples falling outside the source are zero, to be backfilled by the
/// caller.
fn rotate_about(img: &Array2<u16>, angle_deg: f64, cx: f64, cy: f64) -> Array2<u16> {
    let (h, w) = img.dim();
    let theta = angle_deg.to_radians();
    let (sin, cos) = theta.sin_cos();

    Array2::from_shape_fn((h, w), |(y, x)| {
        let dx = x as f64 - cx;
        let dy = y as f64 - cy;
        let xs = cx + dx * cos - dy * sin;
        let ys = cy + dx * sin + dy * cos;
        sample_bilinear(img, xs, ys, w, h)
    })
}

fn sample_bilinear(img: &Array2<u16>, xs: f64, ys: f64, w: usize, h: usize) -> u16 {
    if xs < 0.0 || ys < 0.0 || xs > (w - 1) as f64 || ys > (h - 1) as f64 {
        return 0;
    }
    let x0 = xs.floor() as usize;
    let y0 = ys.floor() as usize;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = xs - x0 as f64;
    let fy = ys - y0 as f64;

    let v00 = img[[y0, x0]] as f64;
    let v01 = img[[y0, x1]] as f64;
    let v10 = img[[y1, x0]] as f64;
    let v11 = img[[y1, x1]] as f64;

    let top = v00 * (1.0 - fx) + v01 * fx;
    let bottom = v10 * (1.0 - fx) + v11 * fx;
    (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 65535.0) as u16
}

/// Square crop of side `side` centered on (cx, cy), padded with
/// `background` where it overruns the source.
fn crop_square(
    img: &Array2<u16>,
    cx: f64,
    cy: f64,
    side: usize,
    background: u16,
) -> Array2<u16> {
    let (h, w) = img.dim();
    let x0 = cx.round() as i64 - side as i64 / 2;
    let y0 = cy.round() as i64 - side as i64 / 2;

    Array2::from_shape_fn((side, side), |(y, x)| {
        let sx = x0 + x as i64;
        let sy = y0 + y as i64;
        if sx >= 0 && sy >= 0 && (sx as usize) < w && (sy as usize) < h {
            img[[sy as usize, sx as usize]]
        } else {
            background
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk_image(h: usize, w: usize, cx: f64, cy: f64, r: f64) -> Array2<u16> {
        Array2::from_shape_fn((h, w), |(y, x)| {
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            if dx * dx + dy * dy <= r * r { 30000 } else { 1000 }
        })
    }

    fn geometry(cx: f64, cy: f64, r: f64) -> DiskGeometry {
        DiskGeometry {
            center_x: cx,
            center_y: cy,
            radius_x: r,
            radius_y: r,
            tilt_deg: 0.0,
            aspect_ratio: 1.0,
            state: GeometryState::Normal,
        }
    }

    #[test]
    fn flip_tracks_center() {
        let img = disk_image(200, 200, 60.0, 80.0, 30.0);
        let config = ScanConfig {
            flip_horizontal: true,
            flip_vertical: true,
            ..Default::default()
        };
        let mut log = RunLog::new();
        let out =
            finalize_channel(img, geometry(60.0, 80.0, 30.0), &config, 400, &mut log).unwrap();

        assert!((out.geometry.center_x - 139.0).abs() < 1e-9);
        assert!((out.geometry.center_y - 119.0).abs() < 1e-9);
        // center of the flipped disk is bright
        assert_eq!(out.image[[119, 139]], 30000);
    }

    #[test]
    fn autocrop_recenters_disk() {
        let img = disk_image(300, 260, 90.0, 170.0, 40.0);
        let config = ScanConfig {
            autocrop: Some(AutocropSize::FromRadius),
            ..Default::default()
        };
        let mut log = RunLog::new();
        let out =
            finalize_channel(img, geometry(90.0, 170.0, 40.0), &config, 600, &mut log).unwrap();

        let side = (2.0 * AUTOCROP_RADIUS_MARGIN * 40.0).round() as usize;
        assert_eq!(out.image.dim(), (side, side));
        let c = side / 2;
        assert_eq!(out.image[[c, c]], 30000);
        assert_eq!(out.image[[0, 0]], 1000);
    }

    #[test]
    fn partial_disk_skips_rotation() {
        let img = disk_image(100, 100, 50.0, 50.0, 45.0);
        let config = ScanConfig {
            position_angle_deg: 25.0,
            ..Default::default()
        };
        let mut log = RunLog::new();
        // sensor shorter than the disk diameter
        let mut geo = geometry(50.0, 50.0, 45.0);
        geo.tilt_deg = 1.0;
        let out = finalize_channel(img, geo, &config, 80, &mut log).unwrap();
        assert_eq!(out.rotation_deg, 0.0);
        assert!(log.to_text().contains("Partial disk"));
    }

    #[test]
    fn rotation_moves_feature() {
        // disk with a bright spot east of center; rotate 90 deg CCW and
        // the spot should land north of center
        let mut img = disk_image(201, 201, 100.0, 100.0, 80.0);
        for y in 95..=105 {
            for x in 145..=155 {
                img[[y, x]] = 60000;
            }
        }
        let config = ScanConfig {
            position_angle_deg: 90.0,
            ..Default::default()
        };
        let mut log = RunLog::new();
        let out =
            finalize_channel(img, geometry(100.0, 100.0, 80.0), &config, 500, &mut log).unwrap();
        assert!(out.image[[50, 100]] > 50000, "spot not rotated north");
        assert!(out.image[[100, 150]] < 40000, "spot still east");
    }
}
