//! # koopman-sysid
//!
//! Data-driven identification of controlled dynamical systems for use in
//! model-based control (LQR, iLQR, MPC).
//!
//! Two model families share the [`Model`] interface:
//!
//! - **Koopman** ([`Koopman`], [`KoopmanConfig`]): observations are lifted
//!   through a polynomial / trigonometric basis ([`Basis`]) and a linear pair
//!   (A, B) is fitted by least squares, Lasso, or with a bounded spectral radius
//! - **SINDy** ([`Sindy`], [`SindyConfig`]): a sparse combination of candidate
//!   functions of state and control ([`FeatureLibrary`]) fitted by sequentially
//!   thresholded least squares
//!
//! Both provide one-step predictions and analytic Jacobians
//! ([`Model::pred_diff`]). The [`analysis`] module covers spectra, stability,
//! open-loop rollouts and error metrics.
//!
//! ## Quick Start
//!
//! ```rust
//! use faer::Mat;
//! use koopman_sysid::{Koopman, KoopmanConfig, Model, System, Trajectory};
//!
//! // Damped oscillator driven by a known input
//! let n = 100;
//! let ctrls = Mat::<f64>::from_fn(1, n, |_, t| (0.3 * t as f64).sin());
//! let mut obs = Mat::<f64>::zeros(2, n);
//! obs[(0, 0)] = 1.0;
//! for t in 1..n {
//!     let (x, v) = (obs[(0, t - 1)], obs[(1, t - 1)]);
//!     obs[(0, t)] = x + 0.1 * v;
//!     obs[(1, t)] = 0.98 * v - 0.1 * x + 0.1 * ctrls[(0, t - 1)];
//! }
//! let traj = Trajectory::new(obs, ctrls).unwrap();
//!
//! let system = System::new(["x", "v"], ["u"]).with_dt(0.1);
//! let mut model = Koopman::new(system, KoopmanConfig::default()).unwrap();
//! model.train(&[traj]).unwrap();
//!
//! // Linearize around the origin
//! let lin = model.pred_diff(&[0.0, 0.0], &[0.0]).unwrap();
//! assert!((lin.ctrl_jac[(1, 0)] - 0.1).abs() < 1e-8);
//! ```
//!
//! ## References
//!
//! - Korda & Mezić (2018), *Automatica*, 93, 149-160
//! - Brunton, Proctor & Kutz (2016), *PNAS*, 113(15), 3932-3937
//! - Kaiser, Kutz & Brunton (2018), *Proc. R. Soc. A*, 474, 20180335

pub mod basis;
pub mod library;
pub mod types;

pub mod analysis;
pub mod config;
pub mod koopman;
pub mod model;
pub mod regression;
pub mod sindy;
pub mod stable;
pub mod utils;

pub use analysis::{one_step_error, rollout, rollout_error, spectrum, stability, step_error};
pub use basis::{Basis, BasisConfig, UnaryTerm};
pub use config::ModelConfig;
pub use koopman::{Koopman, KoopmanConfig, KoopmanMethod};
pub use library::{FeatureLibrary, PairTerm};
pub use model::Model;
pub use regression::{lasso, lstsq, ridge, stlsq, LassoConfig, LassoFit, StlsqConfig};
pub use sindy::{Sindy, SindyConfig, SindyMethod};
pub use stable::{fit_stable, stabilize, Stabilized};
pub use types::{
    ErrorMetrics, Linearization, ModeInfo, Parameters, Stability, StabilityResult, SysIdError,
    System, Trajectory, C64,
};
