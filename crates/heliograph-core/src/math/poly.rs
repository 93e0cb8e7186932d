use crate::error::{HeliographError, Result};

/// Solve a small dense linear system in place (Gaussian elimination with
/// partial pivoting). `a` is row-major n x n, `b` the right-hand side.
pub fn solve_linear(a: &mut [Vec<f64>], b: &mut [f64]) -> Result<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < 1e-12 {
            return Err(HeliographError::Geometry(
                "singular normal-equation matrix".into(),
            ));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for col in (0..n).rev() {
        let mut acc = b[col];
        for k in col + 1..n {
            acc -= a[col][k] * x[k];
        }
        x[col] = acc / a[col][col];
    }
    Ok(x)
}

/// Least-squares polynomial fit of degree `degree`.
///
/// Returns coefficients highest power first, matching the (a, b, c)
/// convention used by the curvature model.
pub fn polyfit(xs: &[f64], ys: &[f64], degree: usize) -> Result<Vec<f64>> {
    let n = degree + 1;
    if xs.len() != ys.len() || xs.len() < n {
        return Err(HeliographError::Geometry(format!(
            "polyfit needs at least {} points, got {}",
            n,
            xs.len()
        )));
    }

    // Normal equations on the Vandermonde system.
    let mut ata = vec![vec![0.0; n]; n];
    let mut atb = vec![0.0; n];
    for (&x, &y) in xs.iter().zip(ys) {
        let mut powers = vec![1.0; n];
        for k in 1..n {
            powers[k] = powers[k - 1] * x;
        }
        for i in 0..n {
            for j in 0..n {
                ata[i][j] += powers[i] * powers[j];
            }
            atb[i] += powers[i] * y;
        }
    }

    let mut coeffs = solve_linear(&mut ata, &mut atb)?;
    coeffs.reverse();
    Ok(coeffs)
}

/// Evaluate a polynomial with coefficients highest power first.
pub fn polyval(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().fold(0.0, |acc, &c| acc * x + c)
}

/// Numerical gradient with central differences, one-sided at the ends.
pub fn gradient(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    match n {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => (0..n)
            .map(|i| {
                if i == 0 {
                    values[1] - values[0]
                } else if i == n - 1 {
                    values[n - 1] - values[n - 2]
                } else {
                    (values[i + 1] - values[i - 1]) / 2.0
                }
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_exact_parabola() {
        let xs: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|&x| 0.5 * x * x - 3.0 * x + 7.0).collect();
        let p = polyfit(&xs, &ys, 2).unwrap();
        assert!((p[0] - 0.5).abs() < 1e-9);
        assert!((p[1] + 3.0).abs() < 1e-8);
        assert!((p[2] - 7.0).abs() < 1e-7);
    }

    #[test]
    fn polyval_horner() {
        assert_eq!(polyval(&[2.0, -1.0, 3.0], 2.0), 9.0);
    }

    #[test]
    fn gradient_of_line_is_constant() {
        let g = gradient(&[1.0, 3.0, 5.0, 7.0]);
        assert_eq!(g, vec![2.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn underdetermined_fit_errors() {
        assert!(polyfit(&[1.0], &[1.0], 2).is_err());
    }
}
