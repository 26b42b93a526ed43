//! SINDy example: recover the equations of a forced pendulum.

use faer::Mat;
use koopman_sysid::{
    one_step_error, rollout_error, Model, ModelConfig, Sindy, SindyConfig, System, Trajectory,
};

fn pendulum(n_steps: usize, theta0: f64, dt: f64) -> Trajectory {
    let ctrls = Mat::<f64>::from_fn(1, n_steps, |_, t| 0.5 * (0.2 * t as f64 + theta0).sin());
    let mut obs = Mat::<f64>::zeros(2, n_steps);
    obs[(0, 0)] = theta0;
    for t in 1..n_steps {
        let (th, om) = (obs[(0, t - 1)], obs[(1, t - 1)]);
        obs[(0, t)] = th + dt * om;
        obs[(1, t)] = om + dt * (-th.sin() - 0.05 * om + ctrls[(0, t - 1)]);
    }
    Trajectory::new(obs, ctrls).unwrap()
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let dt = 0.05;
    let system = System::new(["theta", "omega"], ["torque"]).with_dt(dt);
    let train: Vec<Trajectory> = [-2.0, -1.0, 0.5, 1.5]
        .iter()
        .map(|&th| pendulum(200, th, dt))
        .collect();
    let test = vec![pendulum(200, 0.8, dt)];

    // Hyperparameters as produced by a sampler: flags arrive as strings
    let config = SindyConfig::from_json(
        r#"{
            "method": "stlsq",
            "threshold": 0.002,
            "ridge_alpha": 1e-6,
            "trig_basis": "true",
            "poly_basis": "true",
            "poly_degree": 2,
            "trig_interaction": "false"
        }"#,
    )
    .unwrap();

    let mut model = Sindy::new(system, config).unwrap();
    model.train(&train).unwrap();

    println!("SINDy");
    println!(
        "  Library: {} features, {} active terms",
        model.library().n_features(),
        model.n_nonzero().unwrap()
    );
    println!("\nIdentified equations:");
    for eq in model.equations(4).unwrap() {
        println!("  {eq}");
    }

    let one_step = one_step_error(&model, &test).unwrap();
    let open_loop = rollout_error(&model, &test, None).unwrap();
    println!("\nErrors on held-out trajectory:");
    println!("  One-step RMSE: {:.2e}", one_step.rmse);
    println!("  Rollout RMSE:  {:.2e}", open_loop.rmse);

    let lin = model.pred_diff(&[0.5, 0.0], &[0.0]).unwrap();
    println!("\nJacobian at θ=0.5, ω=0:");
    for i in 0..2 {
        println!(
            "  [{:+.4} {:+.4}] [{:+.4}]",
            lin.state_jac[(i, 0)],
            lin.state_jac[(i, 1)],
            lin.ctrl_jac[(i, 0)]
        );
    }
}
