use std::collections::BTreeMap;

use faer::Mat;
use serde::{Deserialize, Serialize};

/// Error types for system-identification operations.
#[derive(Debug, thiserror::Error)]
pub enum SysIdError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("dimension mismatch for {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("SVD computation failed: {0}")]
    SvdFailed(String),

    #[error("eigendecomposition failed: {0}")]
    EigenFailed(String),

    #[error("linear solve failed: {0}")]
    SolveFailed(String),

    #[error("numerical error: {0}")]
    NumericalError(String),

    #[error("model has not been trained")]
    NotTrained,

    #[error("missing parameter: {0}")]
    MissingParameter(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Description of the controlled system a model is identified for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct System {
    /// Observation (state) variable names.
    pub observations: Vec<String>,
    /// Control input names.
    pub controls: Vec<String>,
    /// Sampling period between consecutive observations.
    #[serde(default = "default_dt")]
    pub dt: f64,
}

fn default_dt() -> f64 {
    1.0
}

impl System {
    /// Create a system from observation and control names.
    pub fn new<S: Into<String>>(
        observations: impl IntoIterator<Item = S>,
        controls: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            observations: observations.into_iter().map(Into::into).collect(),
            controls: controls.into_iter().map(Into::into).collect(),
            dt: default_dt(),
        }
    }

    /// Set the sampling period.
    pub fn with_dt(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }

    pub fn obs_dim(&self) -> usize {
        self.observations.len()
    }

    pub fn ctrl_dim(&self) -> usize {
        self.controls.len()
    }
}

/// A recorded trajectory of observations and the controls applied.
///
/// Both matrices are laid out variables × time. The control in column `k`
/// is applied at step `k` and produces the observation in column `k + 1`,
/// so the last control column does not take part in fitting.
#[derive(Debug, Clone)]
pub struct Trajectory {
    /// Observations (obs_dim × n_steps).
    pub obs: Mat<f64>,
    /// Controls (ctrl_dim × n_steps).
    pub ctrls: Mat<f64>,
}

impl Trajectory {
    /// Create a trajectory, checking that observations and controls have the same length.
    pub fn new(obs: Mat<f64>, ctrls: Mat<f64>) -> Result<Self, SysIdError> {
        if obs.ncols() != ctrls.ncols() {
            return Err(SysIdError::DimensionMismatch {
                what: "trajectory length",
                expected: obs.ncols(),
                got: ctrls.ncols(),
            });
        }
        Ok(Self { obs, ctrls })
    }

    /// Number of time steps.
    pub fn len(&self) -> usize {
        self.obs.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.obs.ncols() == 0
    }

    /// Number of (x[k], u[k]) -> x[k+1] transitions.
    pub fn n_transitions(&self) -> usize {
        self.len().saturating_sub(1)
    }

    /// Observation at step `k`.
    pub fn obs_at(&self, k: usize) -> Vec<f64> {
        (0..self.obs.nrows()).map(|i| self.obs[(i, k)]).collect()
    }

    /// Control at step `k`.
    pub fn ctrl_at(&self, k: usize) -> Vec<f64> {
        (0..self.ctrls.nrows()).map(|i| self.ctrls[(i, k)]).collect()
    }
}

/// One-step prediction together with its Jacobians.
#[derive(Debug, Clone)]
pub struct Linearization {
    /// Predicted next state.
    pub next_state: Vec<f64>,
    /// ∂x⁺/∂x (state_dim × state_dim).
    pub state_jac: Mat<f64>,
    /// ∂x⁺/∂u (state_dim × ctrl_dim).
    pub ctrl_jac: Mat<f64>,
}

/// Opaque named set of model parameters.
#[derive(Debug, Clone, Default)]
pub struct Parameters {
    entries: BTreeMap<String, Mat<f64>>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Mat<f64>) {
        self.entries.insert(name.into(), value);
    }

    /// Look up a parameter, failing with [`SysIdError::MissingParameter`].
    pub fn get(&self, name: &str) -> Result<&Mat<f64>, SysIdError> {
        self.entries
            .get(name)
            .ok_or_else(|| SysIdError::MissingParameter(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Complex number type (re, im).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct C64 {
    pub re: f64,
    pub im: f64,
}

impl C64 {
    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    /// Magnitude |z|.
    pub fn norm(&self) -> f64 {
        (self.re * self.re + self.im * self.im).sqrt()
    }

    pub fn norm_sqr(&self) -> f64 {
        self.re * self.re + self.im * self.im
    }

    /// Phase angle atan2(im, re).
    pub fn arg(&self) -> f64 {
        self.im.atan2(self.re)
    }

    pub fn conj(&self) -> Self {
        Self {
            re: self.re,
            im: -self.im,
        }
    }

    pub fn zero() -> Self {
        Self { re: 0.0, im: 0.0 }
    }

    pub fn one() -> Self {
        Self { re: 1.0, im: 0.0 }
    }
}

impl std::ops::Add for C64 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            re: self.re + rhs.re,
            im: self.im + rhs.im,
        }
    }
}

impl std::ops::AddAssign for C64 {
    fn add_assign(&mut self, rhs: Self) {
        self.re += rhs.re;
        self.im += rhs.im;
    }
}

impl std::ops::Sub for C64 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            re: self.re - rhs.re,
            im: self.im - rhs.im,
        }
    }
}

impl std::ops::Mul for C64 {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self {
            re: self.re * rhs.re - self.im * rhs.im,
            im: self.re * rhs.im + self.im * rhs.re,
        }
    }
}

impl std::ops::Mul<f64> for C64 {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self {
            re: self.re * rhs,
            im: self.im * rhs,
        }
    }
}

impl std::ops::Div for C64 {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        let denom = rhs.norm_sqr();
        Self {
            re: (self.re * rhs.re + self.im * rhs.im) / denom,
            im: (self.im * rhs.re - self.re * rhs.im) / denom,
        }
    }
}

/// Information about a single eigenvalue of a learned linear operator.
#[derive(Debug, Clone)]
pub struct ModeInfo {
    pub index: usize,
    pub eigenvalue: C64,
    /// Eigenvalue magnitude |λ|.
    pub magnitude: f64,
    /// Phase angle (radians).
    pub phase: f64,
    /// Oscillation frequency (cycles per unit time).
    pub frequency: f64,
    /// Oscillation period (time units).
    pub period: f64,
    /// Growth rate log|λ|/dt.
    pub growth_rate: f64,
    /// Half-life for decaying modes (positive), doubling time for growing (negative).
    pub half_life: Option<f64>,
    pub stability: Stability,
}

/// Stability classification of a mode or system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    Decaying,
    Neutral,
    Growing,
}

impl std::fmt::Display for Stability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stability::Decaying => write!(f, "decaying"),
            Stability::Neutral => write!(f, "neutral"),
            Stability::Growing => write!(f, "growing"),
        }
    }
}

/// Result of stability analysis.
#[derive(Debug, Clone)]
pub struct StabilityResult {
    /// Whether no mode is growing.
    pub is_stable: bool,
    /// Whether any mode is growing.
    pub is_unstable: bool,
    /// Whether any mode sits on the unit circle (within tolerance).
    pub is_marginal: bool,
    /// Maximum eigenvalue magnitude.
    pub spectral_radius: f64,
    /// Per-mode stability classification.
    pub mode_stability: Vec<Stability>,
}

/// Error metrics of predictions against recorded observations.
#[derive(Debug, Clone)]
pub struct ErrorMetrics {
    /// Root mean square error.
    pub rmse: f64,
    /// Mean absolute error.
    pub mae: f64,
    /// Relative error (Frobenius norm ratio).
    pub relative_error: f64,
    /// Per-variable RMSE.
    pub per_variable_rmse: Vec<f64>,
    /// Number of compared samples (columns).
    pub n_samples: usize,
}
