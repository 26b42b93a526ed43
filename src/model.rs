use faer::Mat;
use rayon::prelude::*;

use crate::types::{Linearization, Parameters, SysIdError, System, Trajectory};
use crate::utils::column;

/// A learned discrete-time dynamics model x⁺ = f(x, u).
///
/// The model state may be a lifted version of the observation; its first
/// `obs_dim` entries are always the raw observation. Batched inputs are
/// laid out variables × samples.
pub trait Model: Send + Sync {
    /// System the model was built for.
    fn system(&self) -> &System;

    /// Dimension of the model state.
    fn state_dim(&self) -> usize;

    fn is_trained(&self) -> bool;

    /// Fit the model to recorded trajectories.
    fn train(&mut self, trajs: &[Trajectory]) -> Result<(), SysIdError>;

    /// Model state at the end of a trajectory.
    fn traj_to_state(&self, traj: &Trajectory) -> Result<Vec<f64>, SysIdError>;

    /// Model state at every step of a trajectory (state_dim × n_steps).
    fn traj_to_states(&self, traj: &Trajectory) -> Result<Mat<f64>, SysIdError>;

    /// Advance a tracked state once a new control was applied and a new observation arrived.
    fn update_state(
        &self,
        state: &[f64],
        new_ctrl: &[f64],
        new_obs: &[f64],
    ) -> Result<Vec<f64>, SysIdError>;

    /// Observation part of a model state.
    fn state_to_obs(&self, state: &[f64]) -> Result<Vec<f64>, SysIdError> {
        let obs_dim = self.system().obs_dim();
        if state.len() != self.state_dim() {
            return Err(SysIdError::DimensionMismatch {
                what: "state",
                expected: self.state_dim(),
                got: state.len(),
            });
        }
        Ok(state[..obs_dim].to_vec())
    }

    /// One-step prediction.
    fn pred(&self, state: &[f64], ctrl: &[f64]) -> Result<Vec<f64>, SysIdError>;

    /// One-step prediction for every column of `states` / `ctrls`.
    fn pred_batch(&self, states: &Mat<f64>, ctrls: &Mat<f64>) -> Result<Mat<f64>, SysIdError> {
        check_batch(self, states, ctrls)?;
        let preds = (0..states.ncols())
            .into_par_iter()
            .map(|j| self.pred(&column(states, j), &column(ctrls, j)))
            .collect::<Result<Vec<_>, SysIdError>>()?;
        Ok(Mat::<f64>::from_fn(self.state_dim(), preds.len(), |i, j| {
            preds[j][i]
        }))
    }

    /// One-step prediction with the Jacobians ∂x⁺/∂x and ∂x⁺/∂u.
    fn pred_diff(&self, state: &[f64], ctrl: &[f64]) -> Result<Linearization, SysIdError>;

    /// [`Model::pred_diff`] for every column of `states` / `ctrls`.
    fn pred_diff_batch(
        &self,
        states: &Mat<f64>,
        ctrls: &Mat<f64>,
    ) -> Result<Vec<Linearization>, SysIdError> {
        check_batch(self, states, ctrls)?;
        (0..states.ncols())
            .into_par_iter()
            .map(|j| self.pred_diff(&column(states, j), &column(ctrls, j)))
            .collect()
    }

    /// (A, B) for models that are linear in their state; None otherwise.
    fn to_linear(&self) -> Option<(Mat<f64>, Mat<f64>)> {
        None
    }

    /// Snapshot of the learned parameters.
    fn get_parameters(&self) -> Result<Parameters, SysIdError>;

    /// Restore learned parameters, marking the model trained.
    fn set_parameters(&mut self, params: &Parameters) -> Result<(), SysIdError>;
}

/// Shape check shared by the batched operations.
pub(crate) fn check_batch<M: Model + ?Sized>(
    model: &M,
    states: &Mat<f64>,
    ctrls: &Mat<f64>,
) -> Result<(), SysIdError> {
    if states.nrows() != model.state_dim() {
        return Err(SysIdError::DimensionMismatch {
            what: "batch states",
            expected: model.state_dim(),
            got: states.nrows(),
        });
    }
    if ctrls.nrows() != model.system().ctrl_dim() {
        return Err(SysIdError::DimensionMismatch {
            what: "batch controls",
            expected: model.system().ctrl_dim(),
            got: ctrls.nrows(),
        });
    }
    if states.ncols() != ctrls.ncols() {
        return Err(SysIdError::DimensionMismatch {
            what: "batch size",
            expected: states.ncols(),
            got: ctrls.ncols(),
        });
    }
    Ok(())
}
