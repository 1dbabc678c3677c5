//! MVDR (Capon) beamforming primitives
//!
//! Spatial covariance estimation, diagonal loading, Hermitian inversion and
//! the Capon spectrum `P(θ) = 1 / (aᴴ R⁻¹ a)`. Matrices are row-major
//! `Vec<Vec<Complex64>>`.
//!
//! # Example
//!
//! ```rust
//! use mmw_core::mvdr_beamformer::{capon_power, diagonal_loading, invert_hermitian, sample_covariance};
//! use num_complex::Complex64;
//!
//! let snapshots = vec![vec![Complex64::new(1.0, 0.0); 4]; 8];
//! let mut cov = sample_covariance(&snapshots);
//! diagonal_loading(&mut cov, 0.1);
//! let inv = invert_hermitian(&cov).unwrap();
//! let broadside = vec![Complex64::new(1.0, 0.0); 4];
//! assert!(capon_power(&inv, &broadside) > 0.9);
//! ```

use num_complex::Complex64;

/// Square complex matrix, row-major.
pub type CMatrix = Vec<Vec<Complex64>>;

/// Pivot magnitudes below this are treated as singular.
const SINGULAR_EPS: f64 = 1e-30;

/// Sample covariance `R = (1/K) Σ x xᴴ` over K snapshots.
pub fn sample_covariance(snapshots: &[Vec<Complex64>]) -> CMatrix {
    let n = snapshots.first().map_or(0, Vec::len);
    let mut cov = vec![vec![Complex64::new(0.0, 0.0); n]; n];
    if snapshots.is_empty() {
        return cov;
    }
    for x in snapshots {
        for i in 0..n {
            for j in i..n {
                cov[i][j] += x[i] * x[j].conj();
            }
        }
    }
    let scale = 1.0 / snapshots.len() as f64;
    for i in 0..n {
        for j in i..n {
            cov[i][j] *= scale;
            cov[j][i] = cov[i][j].conj();
        }
    }
    cov
}

/// Sum of the (real) diagonal.
pub fn trace(matrix: &CMatrix) -> f64 {
    matrix.iter().enumerate().map(|(i, row)| row[i].re).sum()
}

/// Add `loading` to every diagonal element.
pub fn diagonal_loading(covariance: &mut CMatrix, loading: f64) {
    for (i, row) in covariance.iter_mut().enumerate() {
        row[i] += Complex64::new(loading, 0.0);
    }
}

/// Gauss-Jordan inversion with partial pivoting.
///
/// Returns `None` for a singular matrix.
pub fn invert_hermitian(matrix: &CMatrix) -> Option<CMatrix> {
    let n = matrix.len();
    let zero = Complex64::new(0.0, 0.0);

    // Augment [A | I]
    let mut aug: CMatrix = matrix
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut r = Vec::with_capacity(2 * n);
            r.extend_from_slice(row);
            r.extend((0..n).map(|j| if i == j { Complex64::new(1.0, 0.0) } else { zero }));
            r
        })
        .collect();

    for col in 0..n {
        let best_row = (col..n).max_by(|&a, &b| {
            aug[a][col]
                .norm_sqr()
                .total_cmp(&aug[b][col].norm_sqr())
        })?;
        if aug[best_row][col].norm_sqr() < SINGULAR_EPS {
            return None;
        }
        aug.swap(col, best_row);

        let pivot_inv = aug[col][col].inv();
        for v in aug[col].iter_mut() {
            *v *= pivot_inv;
        }

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[row][col];
            if factor == zero {
                continue;
            }
            for k in 0..2 * n {
                let sub = factor * aug[col][k];
                aug[row][k] -= sub;
            }
        }
    }

    Some(aug.into_iter().map(|row| row[n..].to_vec()).collect())
}

/// `R⁻¹ a`
pub fn mat_vec(matrix: &CMatrix, x: &[Complex64]) -> Vec<Complex64> {
    matrix
        .iter()
        .map(|row| row.iter().zip(x).map(|(m, v)| m * v).sum::<Complex64>())
        .collect()
}

/// Capon power `1 / Re(aᴴ R⁻¹ a)`; zero when the quadratic form is not positive.
pub fn capon_power(inverse: &CMatrix, steering: &[Complex64]) -> f64 {
    let denom: f64 = mat_vec(inverse, steering)
        .iter()
        .zip(steering)
        .map(|(ra, a)| (a.conj() * ra).re)
        .sum();
    if denom > 0.0 && denom.is_finite() {
        1.0 / denom
    } else {
        0.0
    }
}

/// MVDR weights `w = R⁻¹ a / (aᴴ R⁻¹ a)`.
pub fn mvdr_weights(inverse: &CMatrix, steering: &[Complex64]) -> Option<Vec<Complex64>> {
    let ra = mat_vec(inverse, steering);
    let denom: Complex64 = steering.iter().zip(&ra).map(|(a, r)| a.conj() * r).sum();
    if denom.norm_sqr() < SINGULAR_EPS {
        return None;
    }
    Some(ra.into_iter().map(|r| r / denom).collect())
}

/// Apply weights to one snapshot: `y = wᴴ x`.
pub fn apply_weights(weights: &[Complex64], snapshot: &[Complex64]) -> Complex64 {
    weights.iter().zip(snapshot).map(|(w, x)| w.conj() * x).sum()
}

/// Capon spectrum over a precomputed set of steering vectors.
pub fn capon_spectrum(inverse: &CMatrix, steering: &[Vec<Complex64>]) -> Vec<f64> {
    steering.iter().map(|a| capon_power(inverse, a)).collect()
}

/// Loaded, inverted covariance for a set of snapshots.
///
/// Loading is `alpha × trace / N`. Returns `None` for degenerate input
/// (no snapshots, zero trace or a singular result).
pub fn loaded_inverse(snapshots: &[Vec<Complex64>], alpha: f64) -> Option<CMatrix> {
    let mut cov = sample_covariance(snapshots);
    let n = cov.len();
    if n == 0 {
        return None;
    }
    let tr = trace(&cov);
    if !(tr > f64::MIN_POSITIVE) || !tr.is_finite() {
        return None;
    }
    diagonal_loading(&mut cov, alpha * tr / n as f64);
    invert_hermitian(&cov)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    fn ula_steering(n: usize, angle_deg: f64) -> Vec<Complex64> {
        let phase = PI * angle_deg.to_radians().sin();
        (0..n).map(|k| Complex64::from_polar(1.0, phase * k as f64)).collect()
    }

    #[test]
    fn test_covariance_is_hermitian() {
        let snapshots = vec![
            vec![c(1.0, 2.0), c(0.5, -1.0), c(-0.3, 0.1)],
            vec![c(0.2, 0.0), c(1.5, 0.5), c(0.0, -2.0)],
        ];
        let cov = sample_covariance(&snapshots);
        for i in 0..3 {
            assert_relative_eq!(cov[i][i].im, 0.0, epsilon = 1e-12);
            for j in 0..3 {
                assert_relative_eq!(cov[i][j].re, cov[j][i].re, epsilon = 1e-12);
                assert_relative_eq!(cov[i][j].im, -cov[j][i].im, epsilon = 1e-12);
            }
        }
        assert_relative_eq!(trace(&cov), (5.0 + 1.25 + 0.1 + 0.04 + 2.5 + 4.0) / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_inverse_times_matrix_is_identity() {
        let mut cov = sample_covariance(&[
            vec![c(1.0, 2.0), c(0.5, -1.0), c(-0.3, 0.1)],
            vec![c(0.2, 0.0), c(1.5, 0.5), c(0.0, -2.0)],
        ]);
        diagonal_loading(&mut cov, 0.5);
        let inv = invert_hermitian(&cov).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let v: Complex64 = (0..3).map(|k| cov[i][k] * inv[k][j]).sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(v.re, expected, epsilon = 1e-9);
                assert_relative_eq!(v.im, 0.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_singular_matrix() {
        let zero = vec![vec![c(0.0, 0.0); 3]; 3];
        assert!(invert_hermitian(&zero).is_none());
    }

    #[test]
    fn test_identity_capon_power() {
        let mut identity = vec![vec![c(0.0, 0.0); 4]; 4];
        diagonal_loading(&mut identity, 1.0);
        let p = capon_power(&identity, &ula_steering(4, 20.0));
        assert_relative_eq!(p, 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_mvdr_distortionless() {
        let snapshots: Vec<Vec<Complex64>> = (0..32)
            .map(|k| {
                let s = Complex64::from_polar(1.0, k as f64 * 0.7);
                ula_steering(6, 25.0).into_iter().map(|a| a * s).collect()
            })
            .collect();
        let inv = loaded_inverse(&snapshots, 0.05).unwrap();
        let a = ula_steering(6, 25.0);
        let w = mvdr_weights(&inv, &a).unwrap();
        let gain = apply_weights(&w, &a);
        assert_relative_eq!(gain.re, 1.0, epsilon = 1e-9);
        assert_relative_eq!(gain.im, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_spectrum_peaks_at_source() {
        let snapshots: Vec<Vec<Complex64>> = (0..64)
            .map(|k| {
                let s = Complex64::from_polar(1.0, k as f64 * 1.3);
                ula_steering(8, -15.0).into_iter().map(|a| a * s).collect()
            })
            .collect();
        let inv = loaded_inverse(&snapshots, 0.01).unwrap();
        let angles: Vec<f64> = (-60..=60).map(|a| a as f64).collect();
        let steering: Vec<_> = angles.iter().map(|&a| ula_steering(8, a)).collect();
        let spectrum = capon_spectrum(&inv, &steering);
        let peak = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap()
            .0;
        assert_relative_eq!(angles[peak], -15.0);
    }

    #[test]
    fn test_zero_snapshots_degenerate() {
        assert!(loaded_inverse(&[], 0.1).is_none());
        let zeros = vec![vec![c(0.0, 0.0); 4]; 10];
        assert!(loaded_inverse(&zeros, 0.1).is_none());
    }
}
