use criterion::{black_box, criterion_group, criterion_main, Criterion};
use faer::Mat;
use koopman_sysid::*;

fn make_trajectories(n_traj: usize, n_steps: usize) -> Vec<Trajectory> {
    let dt = 0.05;
    (0..n_traj)
        .map(|k| {
            let theta0 = -1.5 + 3.0 * k as f64 / n_traj as f64;
            let ctrls =
                Mat::<f64>::from_fn(1, n_steps, |_, t| 0.5 * (0.1 * t as f64 + k as f64).sin());
            let mut obs = Mat::<f64>::zeros(2, n_steps);
            obs[(0, 0)] = theta0;
            for t in 1..n_steps {
                let (th, om) = (obs[(0, t - 1)], obs[(1, t - 1)]);
                obs[(0, t)] = th + dt * om;
                obs[(1, t)] = om + dt * (-th.sin() + ctrls[(0, t - 1)]);
            }
            Trajectory::new(obs, ctrls).unwrap()
        })
        .collect()
}

fn system() -> System {
    System::new(["theta", "omega"], ["torque"]).with_dt(0.05)
}

fn koopman_config() -> KoopmanConfig {
    KoopmanConfig {
        poly_basis: true,
        poly_degree: 3,
        trig_basis: true,
        trig_freq: 2,
        ..Default::default()
    }
}

fn sindy_config() -> SindyConfig {
    SindyConfig {
        poly_basis: true,
        trig_basis: true,
        ..Default::default()
    }
}

fn bench_train(c: &mut Criterion) {
    let mut group = c.benchmark_group("train");

    for &(n_traj, n_steps) in &[(5, 100), (20, 200), (50, 500)] {
        let trajs = make_trajectories(n_traj, n_steps);

        group.bench_function(format!("koopman_{n_traj}x{n_steps}"), |b| {
            b.iter(|| {
                let mut model = Koopman::new(system(), koopman_config()).unwrap();
                model.train(black_box(&trajs)).unwrap();
                model
            })
        });

        group.bench_function(format!("sindy_{n_traj}x{n_steps}"), |b| {
            b.iter(|| {
                let mut model = Sindy::new(system(), sindy_config()).unwrap();
                model.train(black_box(&trajs)).unwrap();
                model
            })
        });
    }

    group.finish();
}

fn bench_linearize(c: &mut Criterion) {
    let trajs = make_trajectories(20, 200);
    let mut koopman = Koopman::new(system(), koopman_config()).unwrap();
    koopman.train(&trajs).unwrap();
    let mut sindy = Sindy::new(system(), sindy_config()).unwrap();
    sindy.train(&trajs).unwrap();

    let states = sindy.traj_to_states(&trajs[0]).unwrap();
    let lifted = koopman.traj_to_states(&trajs[0]).unwrap();
    let ctrls = trajs[0].ctrls.clone();

    let mut group = c.benchmark_group("pred_diff_batch");

    group.bench_function("koopman_200", |b| {
        b.iter(|| {
            koopman
                .pred_diff_batch(black_box(&lifted), black_box(&ctrls))
                .unwrap()
        })
    });

    group.bench_function("sindy_200", |b| {
        b.iter(|| {
            sindy
                .pred_diff_batch(black_box(&states), black_box(&ctrls))
                .unwrap()
        })
    });

    group.finish();
}

fn bench_regression(c: &mut Criterion) {
    let n = 1000;
    let features = Mat::<f64>::from_fn(30, n, |i, t| ((i + 1) as f64 * 0.01 * t as f64).sin());
    let targets = Mat::<f64>::from_fn(4, n, |i, t| {
        features[(i, t)] - 0.5 * features[(i + 10, t)]
    });

    let mut group = c.benchmark_group("regression");

    group.bench_function("lstsq_30x1000", |b| {
        b.iter(|| lstsq(black_box(&features), black_box(&targets)).unwrap())
    });

    group.bench_function("stlsq_30x1000", |b| {
        b.iter(|| {
            stlsq(
                black_box(&features),
                black_box(&targets),
                &StlsqConfig::default(),
            )
            .unwrap()
        })
    });

    let config = LassoConfig {
        alpha: 1e-3,
        ..Default::default()
    };
    group.bench_function("lasso_30x1000", |b| {
        b.iter(|| lasso(black_box(&features), black_box(&targets), &config).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_train, bench_linearize, bench_regression);
criterion_main!(benches);
