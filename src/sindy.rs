use faer::Mat;
use serde::{Deserialize, Serialize};

use crate::basis::UnaryTerm;
use crate::config::{flag, positive, ModelConfig};
use crate::library::{FeatureLibrary, PairTerm};
use crate::model::{check_batch, Model};
use crate::regression::{lasso, lstsq, stlsq, LassoConfig, StlsqConfig};
use crate::types::{Linearization, Parameters, SysIdError, System, Trajectory};
use crate::utils::{cols, hstack, mat_vec, validate_trajectories, validate_vector, vstack};

/// Regression used to fit Ξ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SindyMethod {
    /// Sequentially thresholded least squares.
    #[default]
    Stlsq,
    /// Dense least squares, no sparsity.
    Lstsq,
    /// L1-regularized regression.
    Lasso,
}

/// SINDy hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SindyConfig {
    pub method: SindyMethod,
    /// STLSQ pruning threshold.
    pub threshold: f64,
    /// STLSQ ridge penalty.
    pub ridge_alpha: f64,
    /// STLSQ iteration limit.
    pub max_iter: usize,
    /// log₁₀ of the Lasso weight.
    pub lasso_alpha_log10: f64,
    #[serde(deserialize_with = "flag")]
    pub poly_basis: bool,
    pub poly_degree: usize,
    #[serde(deserialize_with = "flag")]
    pub trig_basis: bool,
    pub trig_freq: usize,
    /// Include a sin(b), a cos(b), b sin(a), b cos(a) for every input pair.
    #[serde(deserialize_with = "flag")]
    pub trig_interaction: bool,
}

impl Default for SindyConfig {
    fn default() -> Self {
        Self {
            method: SindyMethod::Stlsq,
            threshold: 0.01,
            ridge_alpha: 0.05,
            max_iter: 20,
            lasso_alpha_log10: 0.0,
            poly_basis: false,
            poly_degree: 3,
            trig_basis: false,
            trig_freq: 1,
            trig_interaction: true,
        }
    }
}

impl SindyConfig {
    pub fn lasso_alpha(&self) -> f64 {
        10f64.powf(self.lasso_alpha_log10)
    }

    /// Build the candidate library over `n_inputs` = obs_dim + ctrl_dim variables.
    ///
    /// Order: identity, sin/cos per frequency, powers, pair interactions.
    pub fn library(&self, n_inputs: usize) -> FeatureLibrary {
        let mut unary = vec![UnaryTerm::Identity];
        if self.trig_basis {
            for f in 1..=self.trig_freq as u32 {
                unary.push(UnaryTerm::Sin(f));
                unary.push(UnaryTerm::Cos(f));
            }
        }
        if self.poly_basis {
            unary.extend((2..=self.poly_degree as u32).map(UnaryTerm::Power));
        }
        let pairs = if self.trig_interaction {
            PairTerm::ALL.to_vec()
        } else {
            Vec::new()
        };
        FeatureLibrary::new(unary, pairs, n_inputs)
    }

    fn stlsq_config(&self) -> StlsqConfig {
        StlsqConfig {
            threshold: self.threshold,
            alpha: self.ridge_alpha,
            max_iter: self.max_iter,
            unbias: true,
        }
    }
}

impl ModelConfig for SindyConfig {
    fn validate(&self) -> Result<(), SysIdError> {
        if self.poly_basis && !(2..=8).contains(&self.poly_degree) {
            return Err(SysIdError::Config(format!(
                "poly_degree must be in 2..=8, got {}",
                self.poly_degree
            )));
        }
        if self.trig_basis && !(1..=8).contains(&self.trig_freq) {
            return Err(SysIdError::Config(format!(
                "trig_freq must be in 1..=8, got {}",
                self.trig_freq
            )));
        }
        match self.method {
            SindyMethod::Stlsq => {
                if !self.threshold.is_finite() || self.threshold < 0.0 {
                    return Err(SysIdError::Config(format!(
                        "threshold must be non-negative, got {}",
                        self.threshold
                    )));
                }
                if !self.ridge_alpha.is_finite() || self.ridge_alpha < 0.0 {
                    return Err(SysIdError::Config(format!(
                        "ridge_alpha must be non-negative, got {}",
                        self.ridge_alpha
                    )));
                }
                if self.max_iter == 0 {
                    return Err(SysIdError::Config("max_iter must be at least 1".into()));
                }
                Ok(())
            }
            SindyMethod::Lasso => positive(self.lasso_alpha(), "lasso alpha"),
            SindyMethod::Lstsq => Ok(()),
        }
    }
}

/// SINDy model over the raw observation.
///
/// The next observation is modelled as x[k+1] = Ξ Θ([x[k]; u[k]]) where Θ is
/// a [`FeatureLibrary`] of candidate functions and Ξ a mostly sparse
/// coefficient matrix. Jacobians come analytically from the library
/// derivatives.
#[derive(Debug, Clone)]
pub struct Sindy {
    system: System,
    config: SindyConfig,
    library: FeatureLibrary,
    coefficients: Option<Mat<f64>>,
}

impl Sindy {
    pub fn new(system: System, config: SindyConfig) -> Result<Self, SysIdError> {
        config.validate()?;
        let library = config.library(system.obs_dim() + system.ctrl_dim());
        Ok(Self {
            system,
            config,
            library,
            coefficients: None,
        })
    }

    pub fn config(&self) -> &SindyConfig {
        &self.config
    }

    pub fn library(&self) -> &FeatureLibrary {
        &self.library
    }

    /// Fitted coefficient matrix Ξ (obs_dim × n_features).
    pub fn coefficients(&self) -> Result<&Mat<f64>, SysIdError> {
        self.coefficients.as_ref().ok_or(SysIdError::NotTrained)
    }

    /// Library feature names over the system's observation and control names.
    pub fn feature_names(&self) -> Vec<String> {
        let inputs: Vec<String> = self
            .system
            .observations
            .iter()
            .chain(&self.system.controls)
            .cloned()
            .collect();
        self.library
            .feature_names(&inputs)
            .unwrap_or_default()
    }

    /// Number of active (non-zero) terms in Ξ.
    pub fn n_nonzero(&self) -> Result<usize, SysIdError> {
        let xi = self.coefficients()?;
        let mut count = 0;
        for j in 0..xi.ncols() {
            for i in 0..xi.nrows() {
                if xi[(i, j)] != 0.0 {
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    /// The identified update rule, one line per observation, e.g.
    /// `theta[k+1] = 1.000 theta + 0.100 omega`.
    pub fn equations(&self, precision: usize) -> Result<Vec<String>, SysIdError> {
        let xi = self.coefficients()?;
        let names = self.feature_names();
        let lines = self
            .system
            .observations
            .iter()
            .enumerate()
            .map(|(i, obs)| {
                let terms: Vec<String> = (0..xi.ncols())
                    .filter(|&j| xi[(i, j)] != 0.0)
                    .map(|j| format!("{:.*} {}", precision, xi[(i, j)], names[j]))
                    .collect();
                let rhs = if terms.is_empty() {
                    "0".to_string()
                } else {
                    terms.join(" + ")
                };
                format!("{obs}[k+1] = {rhs}")
            })
            .collect();
        Ok(lines)
    }

    fn inputs(&self, state: &[f64], ctrl: &[f64]) -> Result<Vec<f64>, SysIdError> {
        validate_vector(state, self.state_dim(), "state")?;
        validate_vector(ctrl, self.system.ctrl_dim(), "control")?;
        Ok(state.iter().chain(ctrl).copied().collect())
    }

    fn check_obs_rows(&self, traj: &Trajectory) -> Result<(), SysIdError> {
        if traj.obs.nrows() != self.state_dim() {
            return Err(SysIdError::DimensionMismatch {
                what: "trajectory observations",
                expected: self.state_dim(),
                got: traj.obs.nrows(),
            });
        }
        Ok(())
    }
}

impl Model for Sindy {
    fn system(&self) -> &System {
        &self.system
    }

    fn state_dim(&self) -> usize {
        self.system.obs_dim()
    }

    fn is_trained(&self) -> bool {
        self.coefficients.is_some()
    }

    fn train(&mut self, trajs: &[Trajectory]) -> Result<(), SysIdError> {
        let n_transitions = validate_trajectories(&self.system, trajs)?;

        let mut zs = Vec::with_capacity(trajs.len());
        let mut ys = Vec::with_capacity(trajs.len());
        for traj in trajs.iter().filter(|t| t.n_transitions() > 0) {
            let steps = traj.n_transitions();
            zs.push(vstack(&cols(&traj.obs, 0, steps), &cols(&traj.ctrls, 0, steps))?);
            ys.push(cols(&traj.obs, 1, steps));
        }
        let theta = self.library.evaluate_matrix(&hstack(&zs)?)?;
        let y = hstack(&ys)?;

        tracing::debug!(
            n_trajs = trajs.len(),
            n_transitions,
            n_features = theta.nrows(),
            method = ?self.config.method,
            "fitting SINDy model"
        );

        let xi = match self.config.method {
            SindyMethod::Stlsq => stlsq(&theta, &y, &self.config.stlsq_config())?,
            SindyMethod::Lstsq => lstsq(&theta, &y)?,
            SindyMethod::Lasso => {
                let config = LassoConfig {
                    alpha: self.config.lasso_alpha(),
                    ..Default::default()
                };
                lasso(&theta, &y, &config)?.coefficients
            }
        };

        self.coefficients = Some(xi);
        tracing::info!(n_nonzero = self.n_nonzero()?, "identified SINDy model");
        Ok(())
    }

    fn traj_to_state(&self, traj: &Trajectory) -> Result<Vec<f64>, SysIdError> {
        self.check_obs_rows(traj)?;
        if traj.is_empty() {
            return Err(SysIdError::InvalidInput("trajectory is empty".into()));
        }
        Ok(traj.obs_at(traj.len() - 1))
    }

    fn traj_to_states(&self, traj: &Trajectory) -> Result<Mat<f64>, SysIdError> {
        self.check_obs_rows(traj)?;
        Ok(traj.obs.clone())
    }

    fn update_state(
        &self,
        _state: &[f64],
        _new_ctrl: &[f64],
        new_obs: &[f64],
    ) -> Result<Vec<f64>, SysIdError> {
        validate_vector(new_obs, self.state_dim(), "observation")?;
        Ok(new_obs.to_vec())
    }

    fn pred(&self, state: &[f64], ctrl: &[f64]) -> Result<Vec<f64>, SysIdError> {
        let xi = self.coefficients()?;
        let theta = self.library.evaluate(&self.inputs(state, ctrl)?)?;
        Ok(mat_vec(xi, &theta))
    }

    fn pred_batch(&self, states: &Mat<f64>, ctrls: &Mat<f64>) -> Result<Mat<f64>, SysIdError> {
        let xi = self.coefficients()?;
        check_batch(self, states, ctrls)?;
        let theta = self.library.evaluate_matrix(&vstack(states, ctrls)?)?;
        Ok(xi * &theta)
    }

    fn pred_diff(&self, state: &[f64], ctrl: &[f64]) -> Result<Linearization, SysIdError> {
        let xi = self.coefficients()?;
        let z = self.inputs(state, ctrl)?;
        let theta = self.library.evaluate(&z)?;
        let dtheta = self.library.jacobian(&z)?;

        // ∂x⁺/∂z = Ξ ∂Θ/∂z, split into state and control columns
        let jac = xi * &dtheta;
        let n = self.state_dim();
        let m = self.system.ctrl_dim();
        Ok(Linearization {
            next_state: mat_vec(xi, &theta),
            state_jac: cols(&jac, 0, n),
            ctrl_jac: cols(&jac, n, m),
        })
    }

    fn get_parameters(&self) -> Result<Parameters, SysIdError> {
        let mut params = Parameters::new();
        params.insert("coefficients", self.coefficients()?.clone());
        Ok(params)
    }

    fn set_parameters(&mut self, params: &Parameters) -> Result<(), SysIdError> {
        let xi = params.get("coefficients")?;
        if xi.nrows() != self.state_dim() {
            return Err(SysIdError::DimensionMismatch {
                what: "coefficient rows",
                expected: self.state_dim(),
                got: xi.nrows(),
            });
        }
        if xi.ncols() != self.library.n_features() {
            return Err(SysIdError::DimensionMismatch {
                what: "coefficient columns",
                expected: self.library.n_features(),
                got: xi.ncols(),
            });
        }
        self.coefficients = Some(xi.clone());
        Ok(())
    }
}
