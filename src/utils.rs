use faer::Mat;

use crate::types::{SysIdError, System, Trajectory};

/// Validate that a matrix meets minimum dimension requirements and contains no NaN/Inf.
pub fn validate_matrix(x: &Mat<f64>, min_rows: usize, min_cols: usize) -> Result<(), SysIdError> {
    let (rows, cols) = (x.nrows(), x.ncols());
    if rows < min_rows {
        return Err(SysIdError::InvalidInput(format!(
            "matrix has {rows} rows, need at least {min_rows}"
        )));
    }
    if cols < min_cols {
        return Err(SysIdError::InvalidInput(format!(
            "matrix has {cols} columns, need at least {min_cols}"
        )));
    }
    for j in 0..cols {
        for i in 0..rows {
            let val = x[(i, j)];
            if val.is_nan() || val.is_infinite() {
                return Err(SysIdError::InvalidInput(
                    "matrix contains NaN or Inf values".to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// Check that a vector has the expected length and finite entries.
pub fn validate_vector(v: &[f64], expected: usize, what: &'static str) -> Result<(), SysIdError> {
    if v.len() != expected {
        return Err(SysIdError::DimensionMismatch {
            what,
            expected,
            got: v.len(),
        });
    }
    if v.iter().any(|x| !x.is_finite()) {
        return Err(SysIdError::InvalidInput(format!(
            "{what} contains NaN or Inf values"
        )));
    }
    Ok(())
}

/// Check one trajectory against the system dimensions.
///
/// Observations and controls must match the system's variable counts, have
/// the same length, and be finite.
pub fn validate_trajectory(system: &System, traj: &Trajectory) -> Result<(), SysIdError> {
    if traj.obs.nrows() != system.obs_dim() {
        return Err(SysIdError::DimensionMismatch {
            what: "trajectory observations",
            expected: system.obs_dim(),
            got: traj.obs.nrows(),
        });
    }
    if traj.ctrls.nrows() != system.ctrl_dim() {
        return Err(SysIdError::DimensionMismatch {
            what: "trajectory controls",
            expected: system.ctrl_dim(),
            got: traj.ctrls.nrows(),
        });
    }
    if traj.ctrls.ncols() != traj.obs.ncols() {
        return Err(SysIdError::DimensionMismatch {
            what: "trajectory length",
            expected: traj.obs.ncols(),
            got: traj.ctrls.ncols(),
        });
    }
    validate_matrix(&traj.obs, 0, 0)?;
    validate_matrix(&traj.ctrls, 0, 0)
}

/// Check a set of training trajectories against the system dimensions.
///
/// Returns the total number of transitions available for fitting.
pub fn validate_trajectories(system: &System, trajs: &[Trajectory]) -> Result<usize, SysIdError> {
    if trajs.is_empty() {
        return Err(SysIdError::InvalidInput("no trajectories given".into()));
    }

    let mut n_transitions = 0;
    for traj in trajs {
        validate_trajectory(system, traj)?;
        n_transitions += traj.n_transitions();
    }

    if n_transitions == 0 {
        return Err(SysIdError::InvalidInput(
            "trajectories contain no transitions (need at least 2 steps)".into(),
        ));
    }
    Ok(n_transitions)
}

/// Compute the Moore-Penrose pseudo-inverse via SVD.
pub fn pinv(a: &Mat<f64>, tol: Option<f64>) -> Result<Mat<f64>, SysIdError> {
    let m = a.nrows();
    let n = a.ncols();
    if m == 0 || n == 0 {
        return Ok(Mat::<f64>::zeros(n, m));
    }

    let svd = a.svd().map_err(|e| SysIdError::SvdFailed(format!("{e:?}")))?;
    let u = svd.U();
    let s_col = svd.S().column_vector();
    let v = svd.V();

    let k = s_col.nrows();
    let max_sv = (0..k).map(|i| s_col[i].abs()).fold(0.0_f64, f64::max);

    let tol = tol.unwrap_or_else(|| {
        let max_dim = m.max(n) as f64;
        max_sv * max_dim * f64::EPSILON
    });

    // pinv(A) = V S_inv U^T
    let mut result = Mat::<f64>::zeros(n, m);

    for idx in 0..k {
        let si = s_col[idx];
        if si.abs() > tol {
            let si_inv = 1.0 / si;
            for j in 0..n {
                for i in 0..m {
                    result[(j, i)] += v[(j, idx)] * si_inv * u[(i, idx)];
                }
            }
        }
    }

    Ok(result)
}

/// Concatenate matrices with equal row counts side by side.
pub fn hstack(blocks: &[Mat<f64>]) -> Result<Mat<f64>, SysIdError> {
    let nrows = match blocks.first() {
        Some(b) => b.nrows(),
        None => return Ok(Mat::<f64>::zeros(0, 0)),
    };
    let mut ncols = 0;
    for b in blocks {
        if b.nrows() != nrows {
            return Err(SysIdError::DimensionMismatch {
                what: "hstack rows",
                expected: nrows,
                got: b.nrows(),
            });
        }
        ncols += b.ncols();
    }

    let mut out = Mat::<f64>::zeros(nrows, ncols);
    let mut offset = 0;
    for b in blocks {
        for j in 0..b.ncols() {
            for i in 0..nrows {
                out[(i, offset + j)] = b[(i, j)];
            }
        }
        offset += b.ncols();
    }
    Ok(out)
}

/// Stack two matrices with equal column counts on top of each other.
pub fn vstack(top: &Mat<f64>, bottom: &Mat<f64>) -> Result<Mat<f64>, SysIdError> {
    if top.ncols() != bottom.ncols() {
        return Err(SysIdError::DimensionMismatch {
            what: "vstack columns",
            expected: top.ncols(),
            got: bottom.ncols(),
        });
    }
    let (n_top, ncols) = (top.nrows(), top.ncols());
    let mut out = Mat::<f64>::zeros(n_top + bottom.nrows(), ncols);
    for j in 0..ncols {
        for i in 0..n_top {
            out[(i, j)] = top[(i, j)];
        }
        for i in 0..bottom.nrows() {
            out[(n_top + i, j)] = bottom[(i, j)];
        }
    }
    Ok(out)
}

/// Copy column `j` into a vector.
pub fn column(x: &Mat<f64>, j: usize) -> Vec<f64> {
    (0..x.nrows()).map(|i| x[(i, j)]).collect()
}

/// Build a single-column matrix from a slice.
pub fn column_matrix(v: &[f64]) -> Mat<f64> {
    Mat::<f64>::from_fn(v.len(), 1, |i, _| v[i])
}

/// Copy a contiguous block of columns.
pub fn cols(x: &Mat<f64>, start: usize, count: usize) -> Mat<f64> {
    Mat::<f64>::from_fn(x.nrows(), count, |i, j| x[(i, start + j)])
}

/// Copy a contiguous block of rows.
pub fn rows(x: &Mat<f64>, start: usize, count: usize) -> Mat<f64> {
    Mat::<f64>::from_fn(count, x.ncols(), |i, j| x[(start + i, j)])
}

/// Matrix-vector product.
pub fn mat_vec(a: &Mat<f64>, x: &[f64]) -> Vec<f64> {
    (0..a.nrows())
        .map(|i| (0..a.ncols()).map(|j| a[(i, j)] * x[j]).sum())
        .collect()
}

/// Frobenius norm.
pub fn frobenius_norm(x: &Mat<f64>) -> f64 {
    let mut sum = 0.0;
    for j in 0..x.ncols() {
        for i in 0..x.nrows() {
            sum += x[(i, j)] * x[(i, j)];
        }
    }
    sum.sqrt()
}
