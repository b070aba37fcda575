//! Numerical linear algebra helpers
//!
//! Covariance matrices produced during optimization are symmetric and, in
//! exact arithmetic, positive definite. In practice they drift towards
//! singularity (most notably `Kuf·Kufᵀ` when inducing points collapse), so
//! inversion goes through [`SymmetricFactor`]: a Cholesky factorization when
//! it succeeds, otherwise a symmetric eigendecomposition whose near-zero
//! spectrum is truncated. Neither path ever fails.
//!
//! # Mathematical Foundations
//! ```text
//! Cholesky:   K = L·Lᵀ,      log|K| = 2·Σ ln Lᵢᵢ
//! Eigen:      K = V·Λ·Vᵀ,    K⁺ = Σ_{λᵢ > τ} vᵢvᵢᵀ / λᵢ,   log|K|⁺ = Σ_{λᵢ > τ} ln λᵢ
//!             τ = n · ε · max|λ|
//! ```
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use log::warn;
use nalgebra::{Cholesky, DMatrix, DVector, SymmetricEigen};

/// Inverse and log-determinant of a symmetric matrix
#[derive(Debug, Clone)]
pub struct SymmetricFactor {
    inverse: DMatrix<f64>,
    log_det: f64,
    /// False when the eigen fallback truncated part of the spectrum
    exact: bool,
}

impl SymmetricFactor {
    /// Factorize `matrix`, falling back to a pseudo-inverse when it is not
    /// numerically positive definite.
    pub fn new(matrix: &DMatrix<f64>) -> Self {
        let n = matrix.nrows();
        if n == 0 {
            return Self {
                inverse: DMatrix::zeros(0, 0),
                log_det: 0.0,
                exact: true,
            };
        }

        if let Some(cholesky) = Cholesky::new(matrix.clone()) {
            let log_det = 2.0 * cholesky.l_dirty().diagonal().iter().map(|d| d.ln()).sum::<f64>();
            let inverse = cholesky.inverse();
            if log_det.is_finite() {
                return Self {
                    inverse: symmetrize(&inverse),
                    log_det,
                    exact: true,
                };
            }
        }

        Self::pseudo_inverse(matrix)
    }

    fn pseudo_inverse(matrix: &DMatrix<f64>) -> Self {
        let n = matrix.nrows();
        let eigen = SymmetricEigen::new(symmetrize(matrix));
        let largest = eigen
            .eigenvalues
            .iter()
            .fold(0.0_f64, |acc, value| acc.max(value.abs()));
        let tolerance = largest * n as f64 * f64::EPSILON;

        let mut inverse = DMatrix::zeros(n, n);
        let mut log_det = 0.0;
        let mut truncated = 0usize;
        for (k, &lambda) in eigen.eigenvalues.iter().enumerate() {
            if lambda > tolerance {
                let v = eigen.eigenvectors.column(k).into_owned();
                inverse += (&v * v.transpose()) / lambda;
                log_det += lambda.ln();
            } else {
                truncated += 1;
            }
        }

        warn!(
            "Covariance matrix of order {} is not positive definite; pseudo-inverse dropped {} eigenvalue(s)",
            n, truncated
        );

        Self {
            inverse,
            log_det,
            exact: truncated == 0,
        }
    }

    #[inline]
    pub fn inverse(&self) -> &DMatrix<f64> {
        &self.inverse
    }

    #[inline]
    pub fn log_det(&self) -> f64 {
        self.log_det
    }

    #[inline]
    pub fn is_exact(&self) -> bool {
        self.exact
    }
}

/// `(M + Mᵀ) / 2`
pub fn symmetrize(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    (matrix + matrix.transpose()) * 0.5
}

/// `M · diag(w)`
pub fn scale_columns(matrix: &DMatrix<f64>, weights: &DVector<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(matrix.nrows(), matrix.ncols(), |i, j| matrix[(i, j)] * weights[j])
}

/// `diag(w) · M`
pub fn scale_rows(matrix: &DMatrix<f64>, weights: &DVector<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(matrix.nrows(), matrix.ncols(), |i, j| matrix[(i, j)] * weights[i])
}

/// Column-wise inner products: `out[j] = a[:, j] · b[:, j]`
pub fn column_dots(a: &DMatrix<f64>, b: &DMatrix<f64>) -> DVector<f64> {
    DVector::from_fn(a.ncols(), |j, _| a.column(j).dot(&b.column(j)))
}

/// Row-wise inner products: `out[i] = a[i, :] · b[i, :]`
pub fn row_dots(a: &DMatrix<f64>, b: &DMatrix<f64>) -> DVector<f64> {
    DVector::from_fn(a.nrows(), |i, _| a.row(i).dot(&b.row(i)))
}
