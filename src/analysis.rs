use faer::Mat;
use rayon::prelude::*;

use crate::model::Model;
use crate::stable::eigen_decompose;
use crate::types::{ErrorMetrics, ModeInfo, Stability, StabilityResult, SysIdError, Trajectory};
use crate::utils::{cols, column_matrix, rows, validate_trajectory};

/// Analyze the eigenvalue spectrum of a discrete-time operator.
///
/// Returns per-mode information: magnitude, phase, frequency, growth rate,
/// half-life, and stability classification.
pub fn spectrum(a: &Mat<f64>, dt: f64) -> Result<Vec<ModeInfo>, SysIdError> {
    let (eigenvalues, _) = eigen_decompose(a)?;
    let mut info = Vec::with_capacity(eigenvalues.len());

    for (i, &lambda) in eigenvalues.iter().enumerate() {
        let mag = lambda.norm();
        let phase = lambda.arg();
        let frequency = phase.abs() / (2.0 * std::f64::consts::PI * dt);
        let period = if frequency.abs() > 1e-14 {
            1.0 / frequency
        } else {
            f64::INFINITY
        };
        let growth_rate = mag.ln() / dt;
        let half_life = if growth_rate.abs() > 1e-14 && growth_rate.is_finite() {
            Some(-(2.0_f64.ln()) / growth_rate)
        } else {
            None
        };

        info.push(ModeInfo {
            index: i,
            eigenvalue: lambda,
            magnitude: mag,
            phase,
            frequency,
            period,
            growth_rate,
            half_life,
            stability: classify_eigenvalue(mag, 1e-6),
        });
    }

    Ok(info)
}

/// Analyze the stability of a discrete-time operator.
pub fn stability(a: &Mat<f64>, tol: f64) -> Result<StabilityResult, SysIdError> {
    let (eigenvalues, _) = eigen_decompose(a)?;
    let mode_stability: Vec<Stability> = eigenvalues
        .iter()
        .map(|lambda| classify_eigenvalue(lambda.norm(), tol))
        .collect();

    let spectral_radius = eigenvalues
        .iter()
        .map(|lambda| lambda.norm())
        .fold(0.0_f64, f64::max);

    let is_unstable = mode_stability.contains(&Stability::Growing);
    let is_marginal = mode_stability.contains(&Stability::Neutral);

    Ok(StabilityResult {
        is_stable: !is_unstable,
        is_unstable,
        is_marginal,
        spectral_radius,
        mode_stability,
    })
}

/// Classify an eigenvalue by its magnitude relative to the unit circle.
pub fn classify_eigenvalue(magnitude: f64, tol: f64) -> Stability {
    if magnitude < 1.0 - tol {
        Stability::Decaying
    } else if magnitude > 1.0 + tol {
        Stability::Growing
    } else {
        Stability::Neutral
    }
}

/// Open-loop simulation of a model along a recorded control sequence.
///
/// The model is initialized from the first observation of `traj` and then
/// driven by its recorded controls only. Returns the predicted observations
/// (obs_dim × horizon); column 0 is the initial observation. `horizon`
/// defaults to the trajectory length and is clamped to `1..=len`.
pub fn rollout<M: Model + ?Sized>(
    model: &M,
    traj: &Trajectory,
    horizon: Option<usize>,
) -> Result<Mat<f64>, SysIdError> {
    validate_trajectory(model.system(), traj)?;
    if traj.is_empty() {
        return Err(SysIdError::InvalidInput("trajectory is empty".into()));
    }
    let horizon = horizon.unwrap_or(traj.len()).clamp(1, traj.len());
    let obs_dim = model.system().obs_dim();

    let start = Trajectory::new(cols(&traj.obs, 0, 1), cols(&traj.ctrls, 0, 1))?;
    let mut state = model.traj_to_state(&start)?;

    let mut out = Mat::<f64>::zeros(obs_dim, horizon);
    for k in 0..horizon {
        if k > 0 {
            state = model.pred(&state, &traj.ctrl_at(k - 1))?;
        }
        for (i, v) in model.state_to_obs(&state)?.into_iter().enumerate() {
            out[(i, k)] = v;
        }
    }
    Ok(out)
}

/// Open-loop prediction error over a set of trajectories.
///
/// Each trajectory is rolled out with [`rollout`]; the initial observation
/// is not counted.
pub fn rollout_error<M: Model + ?Sized>(
    model: &M,
    trajs: &[Trajectory],
    horizon: Option<usize>,
) -> Result<ErrorMetrics, SysIdError> {
    for traj in trajs {
        validate_trajectory(model.system(), traj)?;
    }
    let pairs = trajs
        .par_iter()
        .filter(|t| t.n_transitions() > 0)
        .map(|traj| -> Result<_, SysIdError> {
            let predicted = rollout(model, traj, horizon)?;
            let h = predicted.ncols();
            Ok((cols(&predicted, 1, h - 1), cols(&traj.obs, 1, h - 1)))
        })
        .collect::<Result<Vec<_>, SysIdError>>()?;

    error_metrics(model.system().obs_dim(), &pairs)
}

/// One-step-ahead prediction error over a set of trajectories.
///
/// Every transition is predicted from the model state reconstructed from the
/// recorded observations up to that step.
pub fn one_step_error<M: Model + ?Sized>(
    model: &M,
    trajs: &[Trajectory],
) -> Result<ErrorMetrics, SysIdError> {
    for traj in trajs {
        validate_trajectory(model.system(), traj)?;
    }
    let obs_dim = model.system().obs_dim();
    let pairs = trajs
        .par_iter()
        .filter(|t| t.n_transitions() > 0)
        .map(|traj| -> Result<_, SysIdError> {
            let n = traj.n_transitions();
            let states = model.traj_to_states(traj)?;
            let next = model.pred_batch(&cols(&states, 0, n), &cols(&traj.ctrls, 0, n))?;
            Ok((rows(&next, 0, obs_dim), cols(&traj.obs, 1, n)))
        })
        .collect::<Result<Vec<_>, SysIdError>>()?;

    error_metrics(obs_dim, &pairs)
}

/// Error metrics of a single predicted observation against the recorded one.
pub fn step_error(predicted: &[f64], actual: &[f64]) -> Result<ErrorMetrics, SysIdError> {
    if predicted.len() != actual.len() {
        return Err(SysIdError::DimensionMismatch {
            what: "observation",
            expected: actual.len(),
            got: predicted.len(),
        });
    }
    error_metrics(
        actual.len(),
        &[(column_matrix(predicted), column_matrix(actual))],
    )
}

fn error_metrics(
    n_vars: usize,
    pairs: &[(Mat<f64>, Mat<f64>)],
) -> Result<ErrorMetrics, SysIdError> {
    let mut sum_sq = 0.0;
    let mut sum_abs = 0.0;
    let mut orig_norm_sq = 0.0;
    let mut per_var_sq = vec![0.0; n_vars];
    let mut n_samples = 0;

    for (predicted, actual) in pairs {
        for k in 0..actual.ncols() {
            for (i, var_sq) in per_var_sq.iter_mut().enumerate() {
                let diff = predicted[(i, k)] - actual[(i, k)];
                sum_sq += diff * diff;
                sum_abs += diff.abs();
                orig_norm_sq += actual[(i, k)] * actual[(i, k)];
                *var_sq += diff * diff;
            }
        }
        n_samples += actual.ncols();
    }

    if n_samples == 0 {
        return Err(SysIdError::InvalidInput(
            "no transitions to evaluate".into(),
        ));
    }

    let n_total = (n_vars * n_samples) as f64;
    let rmse = (sum_sq / n_total).sqrt();
    let mae = sum_abs / n_total;
    let relative_error = if orig_norm_sq > 0.0 {
        (sum_sq / orig_norm_sq).sqrt()
    } else {
        0.0
    };
    let per_variable_rmse: Vec<f64> = per_var_sq
        .iter()
        .map(|v| (v / n_samples as f64).sqrt())
        .collect();

    Ok(ErrorMetrics {
        rmse,
        mae,
        relative_error,
        per_variable_rmse,
        n_samples,
    })
}
