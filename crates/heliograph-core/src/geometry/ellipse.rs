use crate::error::{HeliographError, Result};
use crate::math::poly::solve_linear;

/// Axis-aligned ellipse: center and semi-axes in pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ellipse {
    pub cx: f64,
    pub cy: f64,
    pub rx: f64,
    pub ry: f64,
}

impl Ellipse {
    /// SY/SX aspect ratio of the fitted disk.
    pub fn aspect_ratio(&self) -> f64 {
        self.ry / self.rx
    }
}

/// Least-squares fit of an axis-aligned conic `A*x^2 + B*y^2 + C*x + D*y = 1`
/// to the limb points.
///
/// The tilt correction runs before this fit, so no cross term is needed;
/// the call sites only consume the center and the two axis extents.
/// Points are centered and scaled before solving to keep the normal
/// equations well-conditioned on sensor-sized coordinates.
pub fn fit_ellipse(points: &[(f64, f64)]) -> Result<Ellipse> {
    if points.len() < 4 {
        return Err(HeliographError::Geometry(format!(
            "ellipse fit needs at least 4 points, got {}",
            points.len()
        )));
    }

    let n = points.len() as f64;
    let mx = points.iter().map(|p| p.0).sum::<f64>() / n;
    let my = points.iter().map(|p| p.1).sum::<f64>() / n;
    let spread = points
        .iter()
        .map(|p| ((p.0 - mx).powi(2) + (p.1 - my).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let scale = if spread > 0.0 { spread } else { 1.0 };

    // Normal equations over the design rows [u^2, v^2, u, v] -> 1.
    let mut ata = vec![vec![0.0; 4]; 4];
    let mut atb = vec![0.0; 4];
    for &(x, y) in points {
        let u = (x - mx) / scale;
        let v = (y - my) / scale;
        let row = [u * u, v * v, u, v];
        for i in 0..4 {
            for j in 0..4 {
                ata[i][j] += row[i] * row[j];
            }
            atb[i] += row[i];
        }
    }

    let sol = solve_linear(&mut ata, &mut atb)?;
    let (a, b, c, d) = (sol[0], sol[1], sol[2], sol[3]);
    if a <= 0.0 || b <= 0.0 {
        return Err(HeliographError::Geometry(
            "limb points do not describe an ellipse".into(),
        ));
    }

    let u0 = -c / (2.0 * a);
    let v0 = -d / (2.0 * b);
    let f = 1.0 + a * u0 * u0 + b * v0 * v0;
    if f <= 0.0 {
        return Err(HeliographError::Geometry(
            "degenerate conic from limb points".into(),
        ));
    }

    Ok(Ellipse {
        cx: mx + u0 * scale,
        cy: my + v0 * scale,
        rx: (f / a).sqrt() * scale,
        ry: (f / b).sqrt() * scale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ellipse_points(cx: f64, cy: f64, rx: f64, ry: f64, n: usize) -> Vec<(f64, f64)> {
        (0..n)
            .map(|i| {
                let theta = 2.0 * std::f64::consts::PI * i as f64 / n as f64;
                (cx + rx * theta.cos(), cy + ry * theta.sin())
            })
            .collect()
    }

    #[test]
    fn recovers_circle() {
        let points = ellipse_points(512.0, 400.0, 300.0, 300.0, 64);
        let e = fit_ellipse(&points).unwrap();
        assert!((e.cx - 512.0).abs() < 1e-6);
        assert!((e.cy - 400.0).abs() < 1e-6);
        assert!((e.rx - 300.0).abs() < 1e-6);
        assert!((e.ry - 300.0).abs() < 1e-6);
    }

    #[test]
    fn recovers_squashed_ellipse() {
        let points = ellipse_points(1000.0, 700.0, 400.0, 320.0, 48);
        let e = fit_ellipse(&points).unwrap();
        assert!((e.aspect_ratio() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn rejects_collinear_points() {
        let points: Vec<(f64, f64)> = (0..10).map(|i| (i as f64, 2.0 * i as f64)).collect();
        assert!(fit_ellipse(&points).is_err());
    }

    #[test]
    fn rejects_too_few_points() {
        assert!(fit_ellipse(&[(0.0, 1.0), (1.0, 0.0)]).is_err());
    }
}
