use crate::error::{HeliographError, Result};
use crate::math::poly::solve_linear;

/// Savitzky-Golay smoothing filter.
///
/// Fits a polynomial of `degree` over a sliding window of odd length
/// `window` and keeps its value at the window center. Signal ends are
/// mirror-padded, matching scipy's `interp` boundary closely enough for
/// the wide windows used by the flat-field and line-detection profiles.
pub fn savgol_filter(values: &[f64], window: usize, degree: usize) -> Result<Vec<f64>> {
    if window % 2 == 0 || window < degree + 2 {
        return Err(HeliographError::Pipeline(format!(
            "invalid Savitzky-Golay window {} for degree {}",
            window, degree
        )));
    }
    if values.len() < window {
        return Err(HeliographError::Pipeline(format!(
            "signal of length {} shorter than smoothing window {}",
            values.len(),
            window
        )));
    }

    let kernel = savgol_kernel(window, degree)?;
    let half = window / 2;
    let n = values.len();

    // Mirror-pad indices so the kernel can run over the full signal.
    let sample = |i: isize| -> f64 {
        let idx = if i < 0 {
            (-i) as usize
        } else if i as usize >= n {
            2 * (n - 1) - i as usize
        } else {
            i as usize
        };
        values[idx.min(n - 1)]
    };

    Ok((0..n)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, &w)| w * sample(i as isize + k as isize - half as isize))
                .sum()
        })
        .collect())
}

/// Smoothing kernel: the projection of the window onto the value at its
/// center of a least-squares polynomial of the given degree.
fn savgol_kernel(window: usize, degree: usize) -> Result<Vec<f64>> {
    let half = window as isize / 2;
    let n = degree + 1;

    let mut ata = vec![vec![0.0; n]; n];
    for x in -half..=half {
        let mut powers = vec![1.0; n];
        for k in 1..n {
            powers[k] = powers[k - 1] * x as f64;
        }
        for i in 0..n {
            for j in 0..n {
                ata[i][j] += powers[i] * powers[j];
            }
        }
    }

    // First row of (X^T X)^-1 X^T gives the center-value weights.
    let mut rhs = vec![0.0; n];
    rhs[0] = 1.0;
    let coeffs = solve_linear(&mut ata, &mut rhs)?;

    Ok((-half..=half)
        .map(|x| {
            let mut p = 1.0;
            let mut acc = 0.0;
            for &c in &coeffs {
                acc += c * p;
                p *= x as f64;
            }
            acc
        })
        .collect())
}

/// Largest odd window no wider than `len`, shrinking `preferred` as needed.
pub fn odd_window(preferred: usize, len: usize) -> usize {
    let w = preferred.min(len);
    if w % 2 == 0 { w.saturating_sub(1) } else { w }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_cubic_signal() {
        let values: Vec<f64> = (0..60)
            .map(|i| {
                let x = i as f64;
                0.001 * x * x * x - 0.2 * x * x + 3.0 * x + 5.0
            })
            .collect();
        let smoothed = savgol_filter(&values, 11, 3).unwrap();
        // A degree-3 filter reproduces a degree-3 polynomial exactly in
        // the interior; mirrored ends deviate slightly.
        for i in 5..55 {
            assert!((smoothed[i] - values[i]).abs() < 1e-6, "index {}", i);
        }
    }

    #[test]
    fn flattens_impulse_noise() {
        let mut values = vec![100.0; 51];
        values[25] = 160.0;
        let smoothed = savgol_filter(&values, 21, 3).unwrap();
        assert!((smoothed[25] - 100.0).abs() < 25.0);
        assert!((smoothed[5] - 100.0).abs() < 1e-6);
    }

    #[test]
    fn even_window_rejected() {
        assert!(savgol_filter(&[0.0; 32], 10, 3).is_err());
    }

    #[test]
    fn odd_window_shrinks() {
        assert_eq!(odd_window(101, 50), 49);
        assert_eq!(odd_window(41, 200), 41);
    }
}
