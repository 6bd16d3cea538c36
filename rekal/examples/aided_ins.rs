//! Position-aided INS: a 3-state (position, velocity, acceleration-bias)
//! linear system corrected by noisy position fixes.

use nalgebra::{dmatrix, dvector, DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rekal::{DiscreteKalmanFilter, LinearSystem};

struct AidedIns {
    transition: DMatrix<f64>,
    process_noise: DMatrix<f64>,
    fix_noise: f64,
    /// Pre-simulated position fixes; the measurement source is injected data,
    /// not a generator hidden inside the model.
    fixes: Vec<f64>,
}

impl AidedIns {
    fn new(ts: f64, rv: f64, qb: f64, fix_noise: f64, fixes: Vec<f64>) -> Self {
        let transition = dmatrix![
            1.0, ts, 0.5 * ts * ts;
            0.0, 1.0, ts;
            0.0, 0.0, 1.0
        ];
        // Discretization of Q = diag(rv, qb) through W = [0 0; 1 0; 0 1].
        let process_noise = dmatrix![
            qb * ts.powi(5) / 20.0 + rv * ts.powi(3) / 3.0,
                qb * ts.powi(4) / 8.0 + rv * ts * ts / 2.0,
                qb * ts.powi(3) / 6.0;
            qb * ts.powi(4) / 8.0 + rv * ts * ts / 2.0,
                qb * ts.powi(3) / 3.0 + rv * ts,
                qb * ts * ts / 2.0;
            qb * ts.powi(3) / 6.0, qb * ts * ts / 2.0, qb * ts
        ];
        Self {
            transition,
            process_noise,
            fix_noise,
            fixes,
        }
    }
}

impl LinearSystem<f64> for AidedIns {
    fn state_dim(&self) -> usize {
        3
    }
    fn input_dim(&self) -> usize {
        2
    }
    fn output_dim(&self) -> usize {
        1
    }
    fn state_transition(&self, _step: usize) -> DMatrix<f64> {
        self.transition.clone()
    }
    fn output_matrix(&self, _step: usize) -> DMatrix<f64> {
        dmatrix![1.0, 0.0, 0.0]
    }
    fn process_noise_covariance(&self, _step: usize) -> DMatrix<f64> {
        self.process_noise.clone()
    }
    fn measurement_noise_covariance(&self, _step: usize) -> DMatrix<f64> {
        dmatrix![self.fix_noise]
    }
    fn measurement(&self, step: usize, _state: &DVector<f64>) -> DVector<f64> {
        dvector![self.fixes[step]]
    }
}

fn main() {
    let ts = 1.0_f64;
    let rv = 2.5e-3;
    let qb = 1.0e-6;
    let fix_noise = 3.0_f64;
    let steps = 60;

    // Simulate the true trajectory and its noisy position fixes up front.
    let mut rng = StdRng::seed_from_u64(17);
    let true_velocity = 1.0_f64;
    let true_bias = 0.02_f64;
    let mut true_position = 0.0_f64;
    let mut fixes = Vec::with_capacity(steps);
    for _ in 0..steps {
        true_position += true_velocity * ts + 0.5 * true_bias * ts * ts;
        fixes.push(true_position + rng.gen_range(-1.0..1.0) * fix_noise.sqrt());
    }

    let model = AidedIns::new(ts, rv, qb, fix_noise, fixes);
    let mut filter = DiscreteKalmanFilter::new(
        DVector::zeros(3),
        DMatrix::identity(3, 3) * 10.0,
        model,
    )
    .expect("prior shapes match the model");

    for step in 0..steps {
        filter.update_time(step).expect("time update failed");
        let fix = filter.model().measurement(step, filter.state());
        filter
            .update_measurement(step, &fix)
            .expect("measurement update failed");

        if step % 10 == 0 || step == steps - 1 {
            let x = filter.state();
            let p = filter.covariance();
            println!(
                "step {:02}: pos {:7.3}±{:.3}, vel {:.3}±{:.3}, bias {:.4}±{:.4}, gain {:.3}",
                step,
                x[0],
                p[(0, 0)].sqrt(),
                x[1],
                p[(1, 1)].sqrt(),
                x[2],
                p[(2, 2)].sqrt(),
                filter.gain().expect("gain exists after correction")[(0, 0)],
            );
        }
    }
}
