//! Radar range tracking: a constant-velocity target observed through a
//! nonlinear slant-range measurement, estimated with the EKF.
//!
//! State is [position, velocity]; the radar sits at a known altitude and
//! reports r = sqrt(position² + altitude²), so the output Jacobian depends on
//! the current estimate and is re-linearized every step.

use nalgebra::{dmatrix, dvector, DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rekal::{ExtendedKalmanFilter, NonlinearSystem};

struct RadarRange {
    dt: f64,
    altitude: f64,
    process_noise: DMatrix<f64>,
    range_noise: f64,
    ranges: Vec<f64>,
}

impl RadarRange {
    fn new(dt: f64, altitude: f64, q: f64, range_noise: f64, ranges: Vec<f64>) -> Self {
        let process_noise = dmatrix![
            q * dt.powi(3) / 3.0, q * dt * dt / 2.0;
            q * dt * dt / 2.0, q * dt
        ];
        Self {
            dt,
            altitude,
            process_noise,
            range_noise,
            ranges,
        }
    }

    fn slant_range(&self, position: f64) -> f64 {
        (position * position + self.altitude * self.altitude).sqrt()
    }
}

impl NonlinearSystem<f64> for RadarRange {
    fn state_dim(&self) -> usize {
        2
    }
    fn input_dim(&self) -> usize {
        0
    }
    fn output_dim(&self) -> usize {
        1
    }
    fn state_transition_jacobian(&self, _step: usize, _state: &DVector<f64>) -> DMatrix<f64> {
        dmatrix![1.0, self.dt; 0.0, 1.0]
    }
    fn output_jacobian(&self, _step: usize, state: &DVector<f64>) -> DMatrix<f64> {
        let range = self.slant_range(state[0]);
        dmatrix![state[0] / range, 0.0]
    }
    fn process_noise_covariance(&self, _step: usize) -> DMatrix<f64> {
        self.process_noise.clone()
    }
    fn measurement_noise_covariance(&self, _step: usize) -> DMatrix<f64> {
        dmatrix![self.range_noise]
    }
    fn evaluate_plant(&self, _step: usize, state: &DVector<f64>) -> DVector<f64> {
        dvector![state[0] + state[1] * self.dt, state[1]]
    }
    fn evaluate_measurement(&self, _step: usize, state: &DVector<f64>) -> DVector<f64> {
        dvector![self.slant_range(state[0])]
    }
    fn measurement(&self, step: usize, _state: &DVector<f64>) -> DVector<f64> {
        dvector![self.ranges[step]]
    }
}

fn main() {
    let dt = 0.5_f64;
    let altitude = 100.0_f64;
    let q = 0.01;
    let range_noise = 4.0_f64;
    let steps = 80;

    let mut rng = StdRng::seed_from_u64(42);
    let true_velocity = 8.0_f64;
    let mut true_position = -150.0_f64;
    let mut ranges = Vec::with_capacity(steps);
    let mut truth = Vec::with_capacity(steps);
    for _ in 0..steps {
        true_position += true_velocity * dt;
        truth.push(true_position);
        let range = (true_position * true_position + altitude * altitude).sqrt();
        ranges.push(range + rng.gen_range(-1.0..1.0) * range_noise.sqrt());
    }

    let model = RadarRange::new(dt, altitude, q, range_noise, ranges);
    let mut filter = ExtendedKalmanFilter::new(
        dvector![-140.0, 5.0],
        DMatrix::identity(2, 2) * 50.0,
        model,
    )
    .expect("prior shapes match the model");

    for step in 0..steps {
        filter.update_time(step).expect("time update failed");
        let range = filter.model().measurement(step, filter.state());
        if let Err(error) = filter.update_measurement(step, &range) {
            // Near the overhead point the range carries almost no position
            // information; skip the step and keep the prediction.
            println!("step {step:02}: correction skipped ({error:?})");
            continue;
        }

        if step % 10 == 0 || step == steps - 1 {
            let x = filter.state();
            let p = filter.covariance();
            println!(
                "step {:02}: pos {:8.2}±{:6.2} (true {:8.2}), vel {:6.2}±{:.2}",
                step,
                x[0],
                p[(0, 0)].sqrt(),
                truth[step],
                x[1],
                p[(1, 1)].sqrt(),
            );
        }
    }
}
