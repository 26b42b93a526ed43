//! Edge case and numerical stability tests.

use approx::assert_abs_diff_eq;
use faer::Mat;
use koopman_sysid::*;

/// Euler-discretized damped pendulum driven by a torque input.
fn pendulum(n_steps: usize, theta0: f64, dt: f64) -> Trajectory {
    let ctrls = Mat::<f64>::from_fn(1, n_steps, |_, t| {
        0.4 * (0.15 * t as f64 + theta0).sin() + 0.2 * (0.7 * t as f64).cos()
    });
    let mut obs = Mat::<f64>::zeros(2, n_steps);
    obs[(0, 0)] = theta0;
    for t in 1..n_steps {
        let (th, om) = (obs[(0, t - 1)], obs[(1, t - 1)]);
        obs[(0, t)] = th + dt * om;
        obs[(1, t)] = om + dt * (-th.sin() - 0.1 * om + ctrls[(0, t - 1)]);
    }
    Trajectory::new(obs, ctrls).unwrap()
}

fn pendulum_system(dt: f64) -> System {
    System::new(["theta", "omega"], ["torque"]).with_dt(dt)
}

fn pendulum_data(dt: f64) -> Vec<Trajectory> {
    [-1.5, -0.4, 0.3, 1.2]
        .iter()
        .map(|&th| pendulum(120, th, dt))
        .collect()
}

// ============================================================================
// Koopman: lifted models
// ============================================================================

#[test]
fn koopman_lifted_state_starts_with_observation() {
    let config = KoopmanConfig {
        poly_basis: true,
        poly_degree: 2,
        trig_basis: true,
        product_terms: true,
        ..Default::default()
    };
    let mut model = Koopman::new(pendulum_system(0.05), config).unwrap();
    // (x, x², sin x, cos x) * 2 vars = 8, plus 28 products
    assert_eq!(model.state_dim(), 36);

    let trajs = pendulum_data(0.05);
    model.train(&trajs).unwrap();

    let state = model.traj_to_state(&trajs[0]).unwrap();
    assert_eq!(state.len(), 36);
    let obs = model.state_to_obs(&state).unwrap();
    assert_eq!(obs, trajs[0].obs_at(trajs[0].len() - 1));

    let (a, b) = model.to_linear().unwrap();
    assert_eq!((a.nrows(), a.ncols()), (36, 36));
    assert_eq!((b.nrows(), b.ncols()), (36, 1));
}

#[test]
fn koopman_one_step_beats_rollout() {
    let config = KoopmanConfig {
        trig_basis: true,
        ..Default::default()
    };
    let mut model = Koopman::new(pendulum_system(0.05), config).unwrap();
    let trajs = pendulum_data(0.05);
    model.train(&trajs).unwrap();

    let one_step = one_step_error(&model, &trajs).unwrap();
    let open_loop = rollout_error(&model, &trajs, Some(60)).unwrap();
    assert!(one_step.relative_error < 0.05);
    assert!(one_step.rmse <= open_loop.rmse + 1e-12);
    assert_eq!(one_step.n_samples, 4 * 119);
    assert_eq!(open_loop.n_samples, 4 * 59);
}

#[test]
fn koopman_stable_fit_is_not_growing() {
    let config = KoopmanConfig {
        method: KoopmanMethod::Stable,
        max_radius: 0.99,
        poly_basis: true,
        poly_degree: 2,
        ..Default::default()
    };
    let mut model = Koopman::new(pendulum_system(0.05), config).unwrap();
    model.train(&pendulum_data(0.05)).unwrap();

    let stab = model.stability(1e-6).unwrap();
    assert!(stab.is_stable);
    assert!(stab.spectral_radius <= 0.99 + 1e-6);
    let spec = model.spectrum().unwrap();
    assert_eq!(spec.len(), model.state_dim());
}

#[test]
fn koopman_lasso_large_penalty_gives_zero_operator() {
    let config = KoopmanConfig {
        method: KoopmanMethod::Lasso,
        lasso_alpha: 1e6,
        ..Default::default()
    };
    let mut model = Koopman::new(pendulum_system(0.05), config).unwrap();
    model.train(&pendulum_data(0.05)).unwrap();

    let next = model.pred(&[0.5, -0.5], &[1.0]).unwrap();
    assert_abs_diff_eq!(next[0], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(next[1], 0.0, epsilon = 1e-12);
}

// ============================================================================
// SINDy: Jacobians and sparsity
// ============================================================================

#[test]
fn sindy_recovers_pendulum_jacobian() {
    let dt = 0.05;
    let config = SindyConfig {
        trig_basis: true,
        trig_interaction: false,
        threshold: 0.004,
        ridge_alpha: 1e-6,
        ..Default::default()
    };
    let mut model = Sindy::new(pendulum_system(dt), config).unwrap();
    model.train(&pendulum_data(dt)).unwrap();

    let (th, om) = (0.8, -0.3);
    let lin = model.pred_diff(&[th, om], &[0.1]).unwrap();
    assert_abs_diff_eq!(lin.state_jac[(0, 0)], 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(lin.state_jac[(0, 1)], dt, epsilon = 1e-6);
    assert_abs_diff_eq!(lin.state_jac[(1, 0)], -dt * th.cos(), epsilon = 1e-6);
    assert_abs_diff_eq!(lin.state_jac[(1, 1)], 1.0 - 0.1 * dt, epsilon = 1e-6);
    assert_abs_diff_eq!(lin.ctrl_jac[(1, 0)], dt, epsilon = 1e-6);
}

#[test]
fn sindy_jacobian_matches_finite_differences() {
    let config = SindyConfig {
        method: SindyMethod::Lstsq,
        trig_basis: true,
        poly_basis: true,
        poly_degree: 3,
        ..Default::default()
    };
    let mut model = Sindy::new(pendulum_system(0.05), config).unwrap();
    model.train(&pendulum_data(0.05)).unwrap();

    let x = [0.2, 0.6];
    let u = [-0.3];
    let lin = model.pred_diff(&x, &u).unwrap();
    let h = 1e-6;
    for j in 0..2 {
        let mut xp = x;
        let mut xm = x;
        xp[j] += h;
        xm[j] -= h;
        let fp = model.pred(&xp, &u).unwrap();
        let fm = model.pred(&xm, &u).unwrap();
        for i in 0..2 {
            let fd = (fp[i] - fm[i]) / (2.0 * h);
            assert_abs_diff_eq!(lin.state_jac[(i, j)], fd, epsilon = 1e-4 * (1.0 + fd.abs()));
        }
    }
}

#[test]
fn sindy_lasso_is_sparse() {
    let config = SindyConfig {
        method: SindyMethod::Lasso,
        lasso_alpha_log10: 3.0,
        ..Default::default()
    };
    let mut model = Sindy::new(pendulum_system(0.05), config).unwrap();
    model.train(&pendulum_data(0.05)).unwrap();
    assert_eq!(model.n_nonzero().unwrap(), 0);
    let eqs = model.equations(2).unwrap();
    assert_eq!(eqs[0], "theta[k+1] = 0");
}

// ============================================================================
// Edge cases: dimensions
// ============================================================================

#[test]
fn single_variable_without_controls() {
    let n = 60;
    let obs = Mat::<f64>::from_fn(1, n, |_, t| 0.95_f64.powi(t as i32));
    let traj = Trajectory::new(obs, Mat::<f64>::zeros(0, n)).unwrap();
    let system = System::new(["x"], Vec::<&str>::new());

    let mut koopman = Koopman::new(system.clone(), KoopmanConfig::default()).unwrap();
    koopman.train(std::slice::from_ref(&traj)).unwrap();
    let lin = koopman.pred_diff(&[1.0], &[]).unwrap();
    assert_abs_diff_eq!(lin.state_jac[(0, 0)], 0.95, epsilon = 1e-10);
    assert_eq!(lin.ctrl_jac.ncols(), 0);

    let mut sindy = Sindy::new(
        system,
        SindyConfig {
            method: SindyMethod::Lstsq,
            ..Default::default()
        },
    )
    .unwrap();
    sindy.train(&[traj]).unwrap();
    // a single input has no interaction pairs
    assert_eq!(sindy.library().n_features(), 1);
    assert_abs_diff_eq!(sindy.pred(&[2.0], &[]).unwrap()[0], 1.9, epsilon = 1e-10);
}

#[test]
fn wrong_dimensions_are_rejected() {
    let mut model = Koopman::new(pendulum_system(0.05), KoopmanConfig::default()).unwrap();

    let bad = Trajectory::new(Mat::zeros(3, 10), Mat::zeros(1, 10)).unwrap();
    assert!(matches!(
        model.train(&[bad]),
        Err(SysIdError::DimensionMismatch { .. })
    ));
    assert!(Trajectory::new(Mat::zeros(2, 10), Mat::zeros(1, 9)).is_err());

    let short = Trajectory::new(Mat::zeros(2, 1), Mat::zeros(1, 1)).unwrap();
    assert!(model.train(&[short]).is_err());
    assert!(!model.is_trained());

    model.train(&pendulum_data(0.05)).unwrap();
    assert!(model.pred(&[0.0], &[0.0]).is_err());
    assert!(model.pred(&[0.0, 0.0], &[]).is_err());
    assert!(model
        .pred_batch(&Mat::zeros(2, 3), &Mat::zeros(1, 4))
        .is_err());
}

#[test]
fn non_finite_data_is_rejected() {
    let mut trajs = pendulum_data(0.05);
    trajs[1].obs[(0, 5)] = f64::NAN;
    let mut model = Sindy::new(pendulum_system(0.05), SindyConfig::default()).unwrap();
    assert!(model.train(&trajs).is_err());
}

// ============================================================================
// Model trait objects
// ============================================================================

#[test]
fn models_behind_trait_objects() {
    let dt = 0.05;
    let trajs = pendulum_data(dt);
    let mut models: Vec<Box<dyn Model>> = vec![
        Box::new(Koopman::new(pendulum_system(dt), KoopmanConfig::default()).unwrap()),
        Box::new(
            Sindy::new(
                pendulum_system(dt),
                SindyConfig {
                    trig_basis: true,
                    ..Default::default()
                },
            )
            .unwrap(),
        ),
    ];

    for model in models.iter_mut() {
        assert!(!model.is_trained());
        model.train(&trajs).unwrap();
        assert!(model.is_trained());

        // track the state online and compare with the batch reconstruction
        let traj = &trajs[2];
        let start = Trajectory::new(
            Mat::from_fn(2, 1, |i, _| traj.obs[(i, 0)]),
            Mat::from_fn(1, 1, |_, _| traj.ctrls[(0, 0)]),
        )
        .unwrap();
        let mut state = model.traj_to_state(&start).unwrap();
        for k in 1..10 {
            state = model
                .update_state(&state, &traj.ctrl_at(k - 1), &traj.obs_at(k))
                .unwrap();
        }
        let states = model.traj_to_states(traj).unwrap();
        for (i, v) in state.iter().enumerate() {
            assert_abs_diff_eq!(*v, states[(i, 9)], epsilon = 1e-12);
        }

        let params = model.get_parameters().unwrap();
        assert!(!params.is_empty());
        model.set_parameters(&params).unwrap();

        let err = one_step_error(&**model, &trajs).unwrap();
        assert!(err.relative_error < 0.1);
    }
}
