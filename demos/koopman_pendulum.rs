//! Koopman example: lift a forced pendulum and inspect the linear model.

use faer::Mat;
use koopman_sysid::{
    rollout_error, Koopman, KoopmanConfig, KoopmanMethod, Model, System, Trajectory,
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

    for method in [KoopmanMethod::Lstsq, KoopmanMethod::Stable] {
        let config = KoopmanConfig {
            method,
            trig_basis: true,
            trig_freq: 2,
            poly_basis: true,
            poly_degree: 2,
            ..Default::default()
        };
        let mut model = Koopman::new(system.clone(), config).unwrap();
        model.train(&train).unwrap();

        println!("Koopman ({method:?})");
        println!("  Lifted state: {} features", model.state_dim());

        let stab = model.stability(1e-6).unwrap();
        println!("  Spectral radius: {:.6}", stab.spectral_radius);
        println!("  Stable: {}", stab.is_stable);

        let spec = model.spectrum().unwrap();
        println!("  Slowest modes:");
        for m in spec.iter().filter(|m| m.magnitude > 0.99).take(4) {
            println!(
                "    Mode {}: |λ|={:.4}, freq={:.4}, stability={}",
                m.index, m.magnitude, m.frequency, m.stability
            );
        }

        let err = rollout_error(&model, &test, Some(100)).unwrap();
        println!("  100-step rollout RMSE: {:.5}", err.rmse);

        let lin = model.pred_diff(&model.lift(&[0.0, 0.0]).unwrap(), &[0.0]).unwrap();
        println!(
            "  ∂θ⁺/∂θ = {:.4}, ∂ω⁺/∂u = {:.4}\n",
            lin.state_jac[(0, 0)],
            lin.ctrl_jac[(1, 0)]
        );
    }
}
