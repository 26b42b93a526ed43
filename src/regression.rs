use faer::Mat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::types::SysIdError;
use crate::utils::pinv;

fn check_shapes(features: &Mat<f64>, targets: &Mat<f64>) -> Result<(), SysIdError> {
    if features.ncols() != targets.ncols() {
        return Err(SysIdError::DimensionMismatch {
            what: "regression samples",
            expected: features.ncols(),
            got: targets.ncols(),
        });
    }
    if features.ncols() == 0 {
        return Err(SysIdError::InvalidInput("regression needs at least one sample".into()));
    }
    Ok(())
}

fn check_alpha(alpha: f64, what: &str) -> Result<(), SysIdError> {
    if !alpha.is_finite() || alpha < 0.0 {
        return Err(SysIdError::Config(format!(
            "{what} must be finite and non-negative, got {alpha}"
        )));
    }
    Ok(())
}

/// Ordinary least squares: W = Y F⁺.
///
/// All solvers here share one layout: `features` is F (p × N) with one sample
/// per column, `targets` is Y (q × N), and the coefficients W are (q × p) so
/// that Y ≈ W F.
pub fn lstsq(features: &Mat<f64>, targets: &Mat<f64>) -> Result<Mat<f64>, SysIdError> {
    check_shapes(features, targets)?;
    let f_pinv = pinv(features, None)?;
    Ok(targets * &f_pinv)
}

/// Copy the rows of `x` listed in `idx`.
fn select_rows(x: &Mat<f64>, idx: &[usize]) -> Mat<f64> {
    Mat::<f64>::from_fn(idx.len(), x.ncols(), |i, j| x[(idx[i], j)])
}

/// a · bᵀ for matrices with equal column counts.
fn mul_transpose(a: &Mat<f64>, b: &Mat<f64>) -> Mat<f64> {
    let mut out = Mat::<f64>::zeros(a.nrows(), b.nrows());
    for i in 0..a.nrows() {
        for j in 0..b.nrows() {
            let mut sum = 0.0;
            for t in 0..a.ncols() {
                sum += a[(i, t)] * b[(j, t)];
            }
            out[(i, j)] = sum;
        }
    }
    out
}

/// Ridge regression: W = Y Fᵀ (F Fᵀ + αI)⁺.
pub fn ridge(features: &Mat<f64>, targets: &Mat<f64>, alpha: f64) -> Result<Mat<f64>, SysIdError> {
    check_shapes(features, targets)?;
    check_alpha(alpha, "ridge alpha")?;

    let mut gram = mul_transpose(features, features);
    for i in 0..gram.nrows() {
        gram[(i, i)] += alpha;
    }
    let gram_pinv = pinv(&gram, None)?;
    let y_ft = mul_transpose(targets, features);
    Ok(&y_ft * &gram_pinv)
}

/// Ridge fit of a single target on a subset of feature rows.
fn ridge_single(features: &Mat<f64>, y: &[f64], alpha: f64) -> Result<Vec<f64>, SysIdError> {
    let targets = Mat::<f64>::from_fn(1, y.len(), |_, t| y[t]);
    let w = ridge(features, &targets, alpha)?;
    Ok((0..w.ncols()).map(|j| w[(0, j)]).collect())
}

fn lstsq_single(features: &Mat<f64>, y: &[f64]) -> Result<Vec<f64>, SysIdError> {
    let targets = Mat::<f64>::from_fn(1, y.len(), |_, t| y[t]);
    let w = lstsq(features, &targets)?;
    Ok((0..w.ncols()).map(|j| w[(0, j)]).collect())
}

/// Lasso (L1-regularized) regression settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LassoConfig {
    /// Weight of the L1 penalty.
    pub alpha: f64,
    pub max_iter: usize,
    /// Stop once the largest coefficient update falls below `tol` times the largest coefficient.
    pub tol: f64,
    /// Fit an unpenalized intercept per target.
    pub fit_intercept: bool,
}

impl Default for LassoConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            max_iter: 1000,
            tol: 1e-4,
            fit_intercept: false,
        }
    }
}

/// Result of a Lasso fit.
#[derive(Debug, Clone)]
pub struct LassoFit {
    /// Coefficients W (q × p).
    pub coefficients: Mat<f64>,
    /// Per-target intercepts (zero when `fit_intercept` is off).
    pub intercepts: Vec<f64>,
    /// Coordinate-descent sweeps used per target.
    pub n_iter: Vec<usize>,
    /// Whether every target met the tolerance.
    pub converged: bool,
}

fn soft_threshold(x: f64, lambda: f64) -> f64 {
    if x > lambda {
        x - lambda
    } else if x < -lambda {
        x + lambda
    } else {
        0.0
    }
}

struct TargetFit {
    coef: Vec<f64>,
    intercept: f64,
    n_iter: usize,
    converged: bool,
}

/// Cyclic coordinate descent on (1/2N)‖y − Fᵀw‖² + α‖w‖₁ for one target row.
fn lasso_target(features: &Mat<f64>, y: &[f64], config: &LassoConfig) -> TargetFit {
    let (p, n) = (features.nrows(), features.ncols());
    let n_f = n as f64;

    let (f_mean, y_mean) = if config.fit_intercept {
        let f_mean: Vec<f64> = (0..p)
            .map(|j| (0..n).map(|t| features[(j, t)]).sum::<f64>() / n_f)
            .collect();
        (f_mean, y.iter().sum::<f64>() / n_f)
    } else {
        (vec![0.0; p], 0.0)
    };

    let x = |j: usize, t: usize| features[(j, t)] - f_mean[j];
    let norms: Vec<f64> = (0..p)
        .map(|j| (0..n).map(|t| x(j, t) * x(j, t)).sum())
        .collect();

    let mut w = vec![0.0; p];
    let mut residual: Vec<f64> = y.iter().map(|v| v - y_mean).collect();
    let penalty = config.alpha * n_f;

    let mut n_iter = 0;
    let mut converged = false;
    while n_iter < config.max_iter {
        n_iter += 1;
        let mut max_dw = 0.0_f64;
        let mut max_w = 0.0_f64;

        for j in 0..p {
            if norms[j] == 0.0 {
                continue;
            }
            let w_old = w[j];
            let mut rho = norms[j] * w_old;
            for (t, r) in residual.iter().enumerate() {
                rho += x(j, t) * r;
            }
            let w_new = soft_threshold(rho, penalty) / norms[j];
            let dw = w_new - w_old;
            if dw != 0.0 {
                for (t, r) in residual.iter_mut().enumerate() {
                    *r -= x(j, t) * dw;
                }
            }
            w[j] = w_new;
            max_dw = max_dw.max(dw.abs());
            max_w = max_w.max(w_new.abs());
        }

        if max_w == 0.0 || max_dw / max_w < config.tol {
            converged = true;
            break;
        }
    }

    let intercept = if config.fit_intercept {
        y_mean - f_mean.iter().zip(&w).map(|(m, c)| m * c).sum::<f64>()
    } else {
        0.0
    };

    TargetFit {
        coef: w,
        intercept,
        n_iter,
        converged,
    }
}

/// Lasso regression, each target row fitted independently in parallel.
pub fn lasso(
    features: &Mat<f64>,
    targets: &Mat<f64>,
    config: &LassoConfig,
) -> Result<LassoFit, SysIdError> {
    check_shapes(features, targets)?;
    check_alpha(config.alpha, "lasso alpha")?;

    let fits: Vec<TargetFit> = (0..targets.nrows())
        .into_par_iter()
        .map(|i| {
            let y: Vec<f64> = (0..targets.ncols()).map(|t| targets[(i, t)]).collect();
            lasso_target(features, &y, config)
        })
        .collect();

    let converged = fits.iter().all(|f| f.converged);
    if !converged {
        tracing::warn!(
            alpha = config.alpha,
            max_iter = config.max_iter,
            "lasso coordinate descent did not converge"
        );
    }

    let coefficients = Mat::<f64>::from_fn(targets.nrows(), features.nrows(), |i, j| fits[i].coef[j]);
    Ok(LassoFit {
        coefficients,
        intercepts: fits.iter().map(|f| f.intercept).collect(),
        n_iter: fits.iter().map(|f| f.n_iter).collect(),
        converged,
    })
}

/// Sequentially thresholded least squares settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StlsqConfig {
    /// Coefficients with magnitude below this are pruned.
    pub threshold: f64,
    /// Ridge penalty used in the thresholding iterations.
    pub alpha: f64,
    pub max_iter: usize,
    /// Refit the final support with ordinary least squares.
    pub unbias: bool,
}

impl Default for StlsqConfig {
    fn default() -> Self {
        Self {
            threshold: 0.01,
            alpha: 0.05,
            max_iter: 20,
            unbias: true,
        }
    }
}

fn stlsq_target(
    features: &Mat<f64>,
    y: &[f64],
    config: &StlsqConfig,
) -> Result<(Vec<f64>, bool), SysIdError> {
    let p = features.nrows();
    let mut support = vec![true; p];
    let mut coef = vec![0.0; p];
    let mut converged = false;

    for _ in 0..config.max_iter {
        let active: Vec<usize> = (0..p).filter(|&j| support[j]).collect();
        if active.is_empty() {
            tracing::warn!(
                threshold = config.threshold,
                "threshold eliminated all coefficients"
            );
            converged = true;
            break;
        }

        let sub = ridge_single(&select_rows(features, &active), y, config.alpha)?;
        coef.iter_mut().for_each(|c| *c = 0.0);
        for (k, &j) in active.iter().enumerate() {
            coef[j] = sub[k];
        }

        let next: Vec<bool> = coef.iter().map(|c| c.abs() >= config.threshold).collect();
        for (c, keep) in coef.iter_mut().zip(&next) {
            if !keep {
                *c = 0.0;
            }
        }

        if next == support {
            converged = true;
            break;
        }
        support = next;
    }

    let active: Vec<usize> = (0..p).filter(|&j| support[j] && coef[j] != 0.0).collect();
    if config.unbias && !active.is_empty() {
        let refit = lstsq_single(&select_rows(features, &active), y)?;
        for (k, &j) in active.iter().enumerate() {
            coef[j] = refit[k];
        }
    }

    Ok((coef, converged))
}

/// Sequentially thresholded least squares (STLSQ) for sparse coefficient matrices.
pub fn stlsq(
    features: &Mat<f64>,
    targets: &Mat<f64>,
    config: &StlsqConfig,
) -> Result<Mat<f64>, SysIdError> {
    check_shapes(features, targets)?;
    check_alpha(config.alpha, "ridge alpha")?;
    check_alpha(config.threshold, "threshold")?;

    let fits = (0..targets.nrows())
        .into_par_iter()
        .map(|i| {
            let y: Vec<f64> = (0..targets.ncols()).map(|t| targets[(i, t)]).collect();
            stlsq_target(features, &y, config)
        })
        .collect::<Result<Vec<_>, SysIdError>>()?;

    if fits.iter().any(|(_, converged)| !converged) {
        tracing::warn!(
            max_iter = config.max_iter,
            "STLSQ support did not settle within max_iter"
        );
    }

    Ok(Mat::<f64>::from_fn(targets.nrows(), features.nrows(), |i, j| {
        fits[i].0[j]
    }))
}
