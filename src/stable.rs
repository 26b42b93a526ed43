use faer::Mat;

use crate::regression::lstsq;
use crate::types::{SysIdError, C64};
use crate::utils::{cols, frobenius_norm, vstack};

/// Largest relative error allowed when recomposing an operator from its eigendecomposition.
const RECOMPOSE_TOL: f64 = 1e-6;

/// Eigenvalues of a real square matrix, with eigenvectors as columns
/// (`vectors[i][j]` is entry i of eigenvector j).
pub(crate) fn eigen_decompose(a: &Mat<f64>) -> Result<(Vec<C64>, Vec<Vec<C64>>), SysIdError> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(SysIdError::InvalidInput(format!(
            "matrix must be square, got {}x{}",
            n,
            a.ncols()
        )));
    }
    if n == 0 {
        return Ok((Vec::new(), Vec::new()));
    }

    let eigen = a
        .as_ref()
        .eigen()
        .map_err(|e| SysIdError::EigenFailed(format!("{e:?}")))?;
    let values_diag = eigen.S().column_vector();
    let vectors_raw = eigen.U();

    let mut values = Vec::with_capacity(n);
    let mut vectors = vec![vec![C64::zero(); n]; n];
    for j in 0..n {
        let ev = values_diag[j];
        values.push(C64::new(ev.re, ev.im));
        for (i, row) in vectors.iter_mut().enumerate() {
            let v = vectors_raw[(i, j)];
            row[j] = C64::new(v.re, v.im);
        }
    }
    Ok((values, vectors))
}

/// Solve a complex linear system Ax = b using Gaussian elimination with partial pivoting.
fn complex_solve(a: &[Vec<C64>], b: &[C64]) -> Result<Vec<C64>, SysIdError> {
    let n = b.len();
    let mut aug: Vec<Vec<C64>> = a
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut new_row = row.clone();
            new_row.push(b[i]);
            new_row
        })
        .collect();

    for col in 0..n {
        let mut max_norm = aug[col][col].norm();
        let mut max_row = col;
        for (row, r) in aug.iter().enumerate().skip(col + 1) {
            let norm = r[col].norm();
            if norm > max_norm {
                max_norm = norm;
                max_row = row;
            }
        }
        if max_norm < 1e-14 {
            return Err(SysIdError::SolveFailed(
                "eigenvector matrix is singular (defective operator)".into(),
            ));
        }
        aug.swap(col, max_row);

        let pivot = aug[col][col];
        for row in (col + 1)..n {
            let factor = aug[row][col] / pivot;
            for j in col..=n {
                let sub = factor * aug[col][j];
                aug[row][j] = aug[row][j] - sub;
            }
        }
    }

    let mut x = vec![C64::zero(); n];
    for i in (0..n).rev() {
        let mut sum = aug[i][n];
        for j in (i + 1)..n {
            sum = sum - aug[i][j] * x[j];
        }
        x[i] = sum / aug[i][i];
    }

    Ok(x)
}

/// Re(V Λ V⁻¹) for the given eigenvalues.
fn recompose(vectors: &[Vec<C64>], values: &[C64], v_inv: &[Vec<C64>]) -> Mat<f64> {
    let n = values.len();
    Mat::<f64>::from_fn(n, n, |i, j| {
        let mut val = C64::zero();
        for k in 0..n {
            val += vectors[i][k] * values[k] * v_inv[k][j];
        }
        val.re
    })
}

/// Outcome of projecting an operator onto a spectral-radius bound.
#[derive(Debug, Clone)]
pub struct Stabilized {
    /// The (possibly modified) operator.
    pub a: Mat<f64>,
    /// Spectral radius before projection.
    pub radius_before: f64,
    /// Number of eigenvalues moved onto the bound.
    pub n_clipped: usize,
}

/// Bound the spectral radius of `a` by `max_radius`.
///
/// Every eigenvalue outside the disk of radius `max_radius` is scaled back
/// onto its boundary, keeping its phase, and the operator is recomposed as
/// Re(V Λ' V⁻¹). Operators already inside the bound are returned unchanged.
/// A defective operator has no eigenvector basis to recompose from and fails
/// with [`SysIdError::SolveFailed`].
pub fn stabilize(a: &Mat<f64>, max_radius: f64) -> Result<Stabilized, SysIdError> {
    if !max_radius.is_finite() || max_radius <= 0.0 {
        return Err(SysIdError::Config(format!(
            "max_radius must be positive, got {max_radius}"
        )));
    }

    let (values, vectors) = eigen_decompose(a)?;
    let radius_before = values.iter().map(C64::norm).fold(0.0_f64, f64::max);
    if radius_before <= max_radius {
        return Ok(Stabilized {
            a: a.clone(),
            radius_before,
            n_clipped: 0,
        });
    }

    let n = values.len();
    let mut n_clipped = 0;
    let clipped: Vec<C64> = values
        .iter()
        .map(|&lambda| {
            let mag = lambda.norm();
            if mag > max_radius {
                n_clipped += 1;
                lambda * (max_radius / mag)
            } else {
                lambda
            }
        })
        .collect();

    // V⁻¹, column by column
    let mut v_inv = vec![vec![C64::zero(); n]; n];
    for col in 0..n {
        let mut rhs = vec![C64::zero(); n];
        rhs[col] = C64::one();
        let x = complex_solve(&vectors, &rhs)?;
        for (i, xi) in x.into_iter().enumerate() {
            v_inv[i][col] = xi;
        }
    }

    // Nearly parallel eigenvectors survive the solve but cannot reproduce A
    let residual = frobenius_norm(&(&recompose(&vectors, &values, &v_inv) - a));
    let scale = frobenius_norm(a).max(f64::MIN_POSITIVE);
    if residual > RECOMPOSE_TOL * scale {
        return Err(SysIdError::SolveFailed(format!(
            "operator is defective (eigendecomposition residual {:.2e})",
            residual / scale
        )));
    }

    let stable = recompose(&vectors, &clipped, &v_inv);

    tracing::info!(
        radius_before,
        max_radius,
        n_clipped,
        "clipped unstable eigenvalues"
    );

    Ok(Stabilized {
        a: stable,
        radius_before,
        n_clipped,
    })
}

/// Fit x⁺ ≈ A x + B u with the spectral radius of A bounded by `max_radius`.
///
/// `x`, `y` are (n × N), `u` is (m × N). After bounding A, B is refitted
/// against the residual Y − A X so the pair stays consistent.
pub fn fit_stable(
    x: &Mat<f64>,
    u: &Mat<f64>,
    y: &Mat<f64>,
    max_radius: f64,
) -> Result<(Mat<f64>, Mat<f64>, Stabilized), SysIdError> {
    let n = x.nrows();
    let m = u.nrows();

    let xu = vstack(x, u)?;
    let ab = lstsq(&xu, y)?;
    let a = cols(&ab, 0, n);
    let mut b = cols(&ab, n, m);

    let stabilized = stabilize(&a, max_radius)?;
    if stabilized.n_clipped > 0 && m > 0 {
        let ax = &stabilized.a * x;
        let mut residual = y.clone();
        for j in 0..residual.ncols() {
            for i in 0..n {
                residual[(i, j)] -= ax[(i, j)];
            }
        }
        b = lstsq(u, &residual)?;
    }

    Ok((stabilized.a.clone(), b, stabilized))
}
