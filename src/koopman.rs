use faer::Mat;
use serde::{Deserialize, Serialize};

use crate::analysis;
use crate::basis::{Basis, BasisConfig};
use crate::config::{flag, positive, ModelConfig};
use crate::model::{check_batch, Model};
use crate::regression::{lasso, lstsq, LassoConfig};
use crate::stable::fit_stable;
use crate::types::{
    Linearization, ModeInfo, Parameters, StabilityResult, SysIdError, System, Trajectory,
};
use crate::utils::{cols, hstack, mat_vec, validate_trajectories, validate_vector, vstack};

/// How the operator pair (A, B) is fitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KoopmanMethod {
    /// Least squares via the pseudo-inverse.
    #[default]
    Lstsq,
    /// L1-regularized regression of each lifted coordinate.
    ///
    /// No intercept is fitted since the model has no affine term. On data whose
    /// lifted coordinates are not zero-mean the coefficients therefore differ
    /// from an intercept-fitting Lasso.
    Lasso,
    /// Least squares with the spectral radius of A bounded.
    Stable,
}

/// Koopman model hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KoopmanConfig {
    pub method: KoopmanMethod,
    /// L1 weight for [`KoopmanMethod::Lasso`].
    pub lasso_alpha: f64,
    /// Spectral-radius bound for [`KoopmanMethod::Stable`].
    pub max_radius: f64,
    #[serde(deserialize_with = "flag")]
    pub poly_basis: bool,
    pub poly_degree: usize,
    #[serde(deserialize_with = "flag")]
    pub trig_basis: bool,
    pub trig_freq: usize,
    #[serde(deserialize_with = "flag")]
    pub product_terms: bool,
}

impl Default for KoopmanConfig {
    fn default() -> Self {
        Self {
            method: KoopmanMethod::Lstsq,
            lasso_alpha: 1.0,
            max_radius: 1.0,
            poly_basis: false,
            poly_degree: 3,
            trig_basis: false,
            trig_freq: 1,
            product_terms: false,
        }
    }
}

impl KoopmanConfig {
    /// Lifting options.
    pub fn basis(&self) -> BasisConfig {
        BasisConfig {
            poly_basis: self.poly_basis,
            poly_degree: self.poly_degree,
            trig_basis: self.trig_basis,
            trig_freq: self.trig_freq,
            product_terms: self.product_terms,
        }
    }
}

impl ModelConfig for KoopmanConfig {
    fn validate(&self) -> Result<(), SysIdError> {
        self.basis().validate()?;
        match self.method {
            KoopmanMethod::Lasso => positive(self.lasso_alpha, "lasso_alpha"),
            KoopmanMethod::Stable => positive(self.max_radius, "max_radius"),
            KoopmanMethod::Lstsq => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
struct Operator {
    a: Mat<f64>,
    b: Mat<f64>,
}

/// Koopman model with a polynomial / trigonometric lifting.
///
/// Observations x are lifted through a fixed basis ψ and a pair (A, B) is
/// fitted so that ψ(x[k+1]) ≈ A ψ(x[k]) + B u[k]. The basis depends on the
/// state only, so the lifted model stays linear in the control and can be
/// handed to LQR directly.
#[derive(Debug, Clone)]
pub struct Koopman {
    system: System,
    config: KoopmanConfig,
    basis: Basis,
    operator: Option<Operator>,
}

impl Koopman {
    pub fn new(system: System, config: KoopmanConfig) -> Result<Self, SysIdError> {
        config.validate()?;
        let basis = Basis::new(&config.basis(), system.obs_dim())?;
        Ok(Self {
            system,
            config,
            basis,
            operator: None,
        })
    }

    pub fn config(&self) -> &KoopmanConfig {
        &self.config
    }

    pub fn basis(&self) -> &Basis {
        &self.basis
    }

    /// Names of the lifted state coordinates.
    pub fn feature_names(&self) -> Vec<String> {
        self.basis
            .names(&self.system.observations)
            .unwrap_or_default()
    }

    /// Lift one observation into the model state.
    pub fn lift(&self, obs: &[f64]) -> Result<Vec<f64>, SysIdError> {
        self.basis.apply(obs)
    }

    fn operator(&self) -> Result<&Operator, SysIdError> {
        self.operator.as_ref().ok_or(SysIdError::NotTrained)
    }

    /// Eigenvalue spectrum of the learned A.
    pub fn spectrum(&self) -> Result<Vec<ModeInfo>, SysIdError> {
        analysis::spectrum(&self.operator()?.a, self.system.dt)
    }

    /// Stability of the learned A.
    pub fn stability(&self, tol: f64) -> Result<StabilityResult, SysIdError> {
        analysis::stability(&self.operator()?.a, tol)
    }

    fn check_pair(&self, state: &[f64], ctrl: &[f64]) -> Result<(), SysIdError> {
        validate_vector(state, self.state_dim(), "state")?;
        validate_vector(ctrl, self.system.ctrl_dim(), "control")
    }
}

impl Model for Koopman {
    fn system(&self) -> &System {
        &self.system
    }

    fn state_dim(&self) -> usize {
        self.basis.dim()
    }

    fn is_trained(&self) -> bool {
        self.operator.is_some()
    }

    fn train(&mut self, trajs: &[Trajectory]) -> Result<(), SysIdError> {
        let n_transitions = validate_trajectories(&self.system, trajs)?;

        let mut xs = Vec::with_capacity(trajs.len());
        let mut ys = Vec::with_capacity(trajs.len());
        let mut us = Vec::with_capacity(trajs.len());
        for traj in trajs.iter().filter(|t| t.n_transitions() > 0) {
            let lifted = self.basis.lift(&traj.obs)?;
            let steps = traj.n_transitions();
            xs.push(cols(&lifted, 0, steps));
            ys.push(cols(&lifted, 1, steps));
            us.push(cols(&traj.ctrls, 0, steps));
        }
        let x = hstack(&xs)?;
        let y = hstack(&ys)?;
        let u = hstack(&us)?;
        let n = x.nrows();
        let m = u.nrows();

        tracing::debug!(
            n_trajs = trajs.len(),
            n_transitions,
            state_dim = n,
            ctrl_dim = m,
            method = ?self.config.method,
            "fitting Koopman operator"
        );

        let (a, b) = match self.config.method {
            KoopmanMethod::Lstsq => {
                let ab = lstsq(&vstack(&x, &u)?, &y)?;
                (cols(&ab, 0, n), cols(&ab, n, m))
            }
            KoopmanMethod::Lasso => {
                tracing::info!(
                    alpha = self.config.lasso_alpha,
                    "fitting Koopman operator with lasso"
                );
                let config = LassoConfig {
                    alpha: self.config.lasso_alpha,
                    ..Default::default()
                };
                let fit = lasso(&vstack(&x, &u)?, &y, &config)?;
                (cols(&fit.coefficients, 0, n), cols(&fit.coefficients, n, m))
            }
            KoopmanMethod::Stable => {
                let (a, b, stabilized) = fit_stable(&x, &u, &y, self.config.max_radius)?;
                tracing::info!(
                    radius_before = stabilized.radius_before,
                    n_clipped = stabilized.n_clipped,
                    "fitted stable Koopman operator"
                );
                (a, b)
            }
        };

        self.operator = Some(Operator { a, b });
        Ok(())
    }

    fn traj_to_state(&self, traj: &Trajectory) -> Result<Vec<f64>, SysIdError> {
        if traj.is_empty() {
            return Err(SysIdError::InvalidInput("trajectory is empty".into()));
        }
        self.basis.apply(&traj.obs_at(traj.len() - 1))
    }

    fn traj_to_states(&self, traj: &Trajectory) -> Result<Mat<f64>, SysIdError> {
        self.basis.lift(&traj.obs)
    }

    fn update_state(
        &self,
        _state: &[f64],
        _new_ctrl: &[f64],
        new_obs: &[f64],
    ) -> Result<Vec<f64>, SysIdError> {
        self.basis.apply(new_obs)
    }

    fn pred(&self, state: &[f64], ctrl: &[f64]) -> Result<Vec<f64>, SysIdError> {
        let op = self.operator()?;
        self.check_pair(state, ctrl)?;
        let ax = mat_vec(&op.a, state);
        let bu = mat_vec(&op.b, ctrl);
        Ok(ax.iter().zip(&bu).map(|(p, q)| p + q).collect())
    }

    fn pred_batch(&self, states: &Mat<f64>, ctrls: &Mat<f64>) -> Result<Mat<f64>, SysIdError> {
        let op = self.operator()?;
        check_batch(self, states, ctrls)?;
        let mut next = &op.a * states;
        if ctrls.nrows() > 0 {
            let bu = &op.b * ctrls;
            for j in 0..next.ncols() {
                for i in 0..next.nrows() {
                    next[(i, j)] += bu[(i, j)];
                }
            }
        }
        Ok(next)
    }

    fn pred_diff(&self, state: &[f64], ctrl: &[f64]) -> Result<Linearization, SysIdError> {
        let next_state = self.pred(state, ctrl)?;
        let op = self.operator()?;
        Ok(Linearization {
            next_state,
            state_jac: op.a.clone(),
            ctrl_jac: op.b.clone(),
        })
    }

    fn to_linear(&self) -> Option<(Mat<f64>, Mat<f64>)> {
        self.operator
            .as_ref()
            .map(|op| (op.a.clone(), op.b.clone()))
    }

    fn get_parameters(&self) -> Result<Parameters, SysIdError> {
        let op = self.operator()?;
        let mut params = Parameters::new();
        params.insert("A", op.a.clone());
        params.insert("B", op.b.clone());
        Ok(params)
    }

    fn set_parameters(&mut self, params: &Parameters) -> Result<(), SysIdError> {
        let n = self.state_dim();
        let m = self.system.ctrl_dim();
        let a = params.get("A")?;
        let b = params.get("B")?;
        if a.nrows() != n || a.ncols() != n {
            return Err(SysIdError::DimensionMismatch {
                what: "parameter A",
                expected: n,
                got: if a.nrows() != n { a.nrows() } else { a.ncols() },
            });
        }
        if b.nrows() != n {
            return Err(SysIdError::DimensionMismatch {
                what: "parameter B rows",
                expected: n,
                got: b.nrows(),
            });
        }
        if b.ncols() != m {
            return Err(SysIdError::DimensionMismatch {
                what: "parameter B columns",
                expected: m,
                got: b.ncols(),
            });
        }
        self.operator = Some(Operator {
            a: a.clone(),
            b: b.clone(),
        });
        Ok(())
    }
}
