//! Extended Kalman filter over a nonlinear system model.

use nalgebra::{DMatrix, DVector, RealField};

use crate::error::FilterError;
use crate::linalg::{
    check_model_shape, check_model_vector, check_shape, check_vector, invert_and_determinant,
    symmetrize,
};
use crate::model::{ContinuousNonlinearSystem, NonlinearSystem};

/// A recursive state estimator for discrete-time nonlinear stochastic
/// systems, linearized around the current estimate at every step.
///
/// The recursion is the same predict/correct cycle as
/// [`DiscreteKalmanFilter`](crate::DiscreteKalmanFilter), but the prediction
/// propagates the state through the nonlinear plant f and the correction
/// forms the residual against the nonlinear measurement h; only the
/// covariance propagation uses the Jacobians Φ = ∂f/∂x and C = ∂h/∂x.
///
/// Linearization points are part of the contract, not an implementation
/// detail: Φ is evaluated at the corrected estimate entering the time update,
/// and C at the predicted estimate entering the measurement update. A stale
/// linearization point is a correctness bug.
///
/// For models that additionally implement
/// [`ContinuousNonlinearSystem`], the filter offers
/// [`update_time_continuous`](Self::update_time_continuous), which propagates
/// through the continuous dynamics ẋ = f(t, x) instead of a one-step
/// discretization.
#[derive(Clone, Debug)]
pub struct ExtendedKalmanFilter<T, M>
where
    T: RealField + Copy,
    M: NonlinearSystem<T>,
{
    model: M,
    state: DVector<T>,
    covariance: DMatrix<T>,
    gain: Option<DMatrix<T>>,
}

impl<T, M> ExtendedKalmanFilter<T, M>
where
    T: RealField + Copy,
    M: NonlinearSystem<T>,
{
    /// Construct a filter from the prior (x₀, P₀) and a system model.
    ///
    /// Fails with [`FilterError::DimensionMismatch`] when x₀ or P₀ do not
    /// match the model's declared `state_dim`, before any update is attempted.
    pub fn new(
        initial_state: DVector<T>,
        initial_covariance: DMatrix<T>,
        model: M,
    ) -> Result<Self, FilterError> {
        let n = model.state_dim();
        check_vector(&initial_state, n)?;
        check_shape(&initial_covariance, n, n)?;

        Ok(Self {
            model,
            state: initial_state,
            covariance: initial_covariance,
            gain: None,
        })
    }

    /// Time (prediction) update through the nonlinear plant:
    ///
    /// ```text
    /// x⁻ = f(k, x)
    /// P⁻ = Φ(k, x)·P·Φ(k, x)ᵀ + Q(k)
    /// ```
    ///
    /// with Φ the plant Jacobian evaluated at the current (corrected)
    /// estimate x.
    pub fn update_time(&mut self, step: usize) -> Result<(), FilterError> {
        let n = self.model.state_dim();

        let phi = self.model.state_transition_jacobian(step, &self.state);
        check_model_shape(&phi, n, n)?;
        let process_noise = self.model.process_noise_covariance(step);
        check_model_shape(&process_noise, n, n)?;
        let predicted_state = self.model.evaluate_plant(step, &self.state);
        check_model_vector(&predicted_state, n)?;

        let mut predicted_covariance = &phi * &self.covariance * phi.transpose() + process_noise;
        symmetrize(&mut predicted_covariance);

        self.state = predicted_state;
        self.covariance = predicted_covariance;
        Ok(())
    }

    /// Continuous-time prediction over one integration step of length `dt`:
    ///
    /// ```text
    /// x ← x + f(t, x)·dt
    /// P ← P + (A(t, x)·P + P·A(t, x)ᵀ + Q(t))·dt
    /// ```
    ///
    /// with A the continuous system matrix (not its discretization Φ).
    /// Callers wanting a finer integration simply call this repeatedly with a
    /// smaller `dt`.
    pub fn update_time_continuous(&mut self, time: T, dt: T) -> Result<(), FilterError>
    where
        M: ContinuousNonlinearSystem<T>,
    {
        let n = self.model.state_dim();

        let system = self.model.system_matrix(time, &self.state);
        check_model_shape(&system, n, n)?;
        let process_noise = self.model.continuous_process_noise_covariance(time);
        check_model_shape(&process_noise, n, n)?;
        let derivative = self.model.derivative(time, &self.state);
        check_model_vector(&derivative, n)?;

        let predicted_state = &self.state + derivative * dt;
        let covariance_rate =
            &system * &self.covariance + &self.covariance * system.transpose() + process_noise;
        let mut predicted_covariance = &self.covariance + covariance_rate * dt;
        symmetrize(&mut predicted_covariance);

        self.state = predicted_state;
        self.covariance = predicted_covariance;
        Ok(())
    }

    /// Measurement (correction) update against the reading ỹ:
    ///
    /// ```text
    /// C = ∂h/∂x evaluated at x⁻
    /// S = C·P⁻·Cᵀ + R
    /// K = P⁻·Cᵀ·S⁻¹
    /// r = ỹ − h(k, x⁻)
    /// x = x⁻ + K·r
    /// P = (I − K·C)·P⁻
    /// ```
    ///
    /// A singular S fails the update with [`FilterError::SingularMatrix`] and
    /// leaves (x⁻, P⁻) committed as-is.
    pub fn update_measurement(
        &mut self,
        step: usize,
        measurement: &DVector<T>,
    ) -> Result<(), FilterError> {
        let n = self.model.state_dim();
        let m = self.model.output_dim();
        check_vector(measurement, m)?;

        // Re-linearize around the predicted state entering this update.
        let output = self.model.output_jacobian(step, &self.state);
        check_model_shape(&output, m, n)?;
        let measurement_noise = self.model.measurement_noise_covariance(step);
        check_model_shape(&measurement_noise, m, m)?;
        let predicted_measurement = self.model.evaluate_measurement(step, &self.state);
        check_model_vector(&predicted_measurement, m)?;

        let innovation_covariance =
            &output * &self.covariance * output.transpose() + measurement_noise;
        let (innovation_inverse, _det) = invert_and_determinant(&innovation_covariance)?;

        let gain = &self.covariance * output.transpose() * innovation_inverse;
        let residual = measurement - predicted_measurement;

        let corrected_state = &self.state + &gain * residual;
        let mut corrected_covariance =
            (DMatrix::identity(n, n) - &gain * &output) * &self.covariance;
        symmetrize(&mut corrected_covariance);

        self.state = corrected_state;
        self.covariance = corrected_covariance;
        self.gain = Some(gain);
        Ok(())
    }

    /// The current state estimate x.
    pub fn state(&self) -> &DVector<T> {
        &self.state
    }

    /// The current state error covariance P.
    pub fn covariance(&self) -> &DMatrix<T> {
        &self.covariance
    }

    /// The Kalman gain from the most recent measurement update, or `None`
    /// before the first correction of a run.
    pub fn gain(&self) -> Option<&DMatrix<T>> {
        self.gain.as_ref()
    }

    /// The system model this filter recurses over.
    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn state_dim(&self) -> usize {
        self.model.state_dim()
    }

    pub fn input_dim(&self) -> usize {
        self.model.input_dim()
    }

    pub fn output_dim(&self) -> usize {
        self.model.output_dim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{dmatrix, dvector};

    /// Plant f(x) = 2x (Jacobian 2) and measurement h(x) = x²/2, whose
    /// Jacobian C(x) = x depends detectably on its evaluation point.
    struct QuadraticSensor;

    impl NonlinearSystem<f64> for QuadraticSensor {
        fn state_dim(&self) -> usize {
            1
        }
        fn input_dim(&self) -> usize {
            0
        }
        fn output_dim(&self) -> usize {
            1
        }
        fn state_transition_jacobian(&self, _step: usize, _state: &DVector<f64>) -> DMatrix<f64> {
            dmatrix![2.0]
        }
        fn output_jacobian(&self, _step: usize, state: &DVector<f64>) -> DMatrix<f64> {
            dmatrix![state[0]]
        }
        fn process_noise_covariance(&self, _step: usize) -> DMatrix<f64> {
            dmatrix![0.5]
        }
        fn measurement_noise_covariance(&self, _step: usize) -> DMatrix<f64> {
            dmatrix![1.0]
        }
        fn evaluate_plant(&self, _step: usize, state: &DVector<f64>) -> DVector<f64> {
            dvector![2.0 * state[0]]
        }
        fn evaluate_measurement(&self, _step: usize, state: &DVector<f64>) -> DVector<f64> {
            dvector![0.5 * state[0] * state[0]]
        }
        fn measurement(&self, _step: usize, _state: &DVector<f64>) -> DVector<f64> {
            dvector![3.0]
        }
    }

    #[test]
    fn output_jacobian_is_evaluated_at_the_predicted_state() {
        let mut filter =
            ExtendedKalmanFilter::new(dvector![1.0], dmatrix![1.0], QuadraticSensor).unwrap();

        // x⁻ = f(1) = 2, P⁻ = 4·1 + 0.5 = 4.5.
        filter.update_time(0).unwrap();
        assert!((filter.state()[0] - 2.0).abs() < 1e-12);
        assert!((filter.covariance()[(0, 0)] - 4.5).abs() < 1e-12);

        // With C evaluated at x⁻ = 2: S = 2·4.5·2 + 1 = 19, K = 9/19,
        // r = 3 − h(2) = 1, x = 2 + 9/19, P = 4.5/19. Had C been evaluated at
        // the stale corrected state x = 1, S would be 5.5 instead.
        filter.update_measurement(0, &dvector![3.0]).unwrap();
        assert!((filter.gain().unwrap()[(0, 0)] - 9.0 / 19.0).abs() < 1e-12);
        assert!((filter.state()[0] - (2.0 + 9.0 / 19.0)).abs() < 1e-12);
        assert!((filter.covariance()[(0, 0)] - 4.5 / 19.0).abs() < 1e-12);
    }

    /// A linear model expressed through the nonlinear interface; the EKF must
    /// reduce exactly to the discrete Kalman filter on it.
    struct LinearInDisguise;

    impl NonlinearSystem<f64> for LinearInDisguise {
        fn state_dim(&self) -> usize {
            1
        }
        fn input_dim(&self) -> usize {
            0
        }
        fn output_dim(&self) -> usize {
            1
        }
        fn state_transition_jacobian(&self, _step: usize, _state: &DVector<f64>) -> DMatrix<f64> {
            dmatrix![1.0]
        }
        fn output_jacobian(&self, _step: usize, _state: &DVector<f64>) -> DMatrix<f64> {
            dmatrix![1.0]
        }
        fn process_noise_covariance(&self, _step: usize) -> DMatrix<f64> {
            dmatrix![1.0]
        }
        fn measurement_noise_covariance(&self, _step: usize) -> DMatrix<f64> {
            dmatrix![2.0]
        }
        fn evaluate_plant(&self, _step: usize, state: &DVector<f64>) -> DVector<f64> {
            state.clone()
        }
        fn evaluate_measurement(&self, _step: usize, state: &DVector<f64>) -> DVector<f64> {
            state.clone()
        }
        fn measurement(&self, _step: usize, _state: &DVector<f64>) -> DVector<f64> {
            dvector![2.0]
        }
    }

    #[test]
    fn reduces_to_the_linear_filter_on_a_linear_model() {
        let mut filter =
            ExtendedKalmanFilter::new(dvector![1.0], dmatrix![10.0], LinearInDisguise).unwrap();

        filter.update_time(1).unwrap();
        assert!((filter.state()[0] - 1.0).abs() < 1e-12);
        assert!((filter.covariance()[(0, 0)] - 11.0).abs() < 1e-12);

        filter.update_measurement(1, &dvector![2.0]).unwrap();
        assert!((filter.gain().unwrap()[(0, 0)] - 11.0 / 13.0).abs() < 1e-12);
        assert!((filter.state()[0] - 24.0 / 13.0).abs() < 1e-12);
        assert!((filter.covariance()[(0, 0)] - 22.0 / 13.0).abs() < 1e-12);
    }

    /// h is constant, so C = 0; with R = 0 the innovation covariance is the
    /// zero matrix.
    struct BlindSensor;

    impl NonlinearSystem<f64> for BlindSensor {
        fn state_dim(&self) -> usize {
            1
        }
        fn input_dim(&self) -> usize {
            0
        }
        fn output_dim(&self) -> usize {
            1
        }
        fn state_transition_jacobian(&self, _step: usize, _state: &DVector<f64>) -> DMatrix<f64> {
            dmatrix![1.0]
        }
        fn output_jacobian(&self, _step: usize, _state: &DVector<f64>) -> DMatrix<f64> {
            dmatrix![0.0]
        }
        fn process_noise_covariance(&self, _step: usize) -> DMatrix<f64> {
            dmatrix![1.0]
        }
        fn measurement_noise_covariance(&self, _step: usize) -> DMatrix<f64> {
            dmatrix![0.0]
        }
        fn evaluate_plant(&self, _step: usize, state: &DVector<f64>) -> DVector<f64> {
            state.clone()
        }
        fn evaluate_measurement(&self, _step: usize, _state: &DVector<f64>) -> DVector<f64> {
            dvector![0.0]
        }
        fn measurement(&self, _step: usize, _state: &DVector<f64>) -> DVector<f64> {
            dvector![0.0]
        }
    }

    #[test]
    fn singular_innovation_fails_and_leaves_the_prediction_committed() {
        let mut filter =
            ExtendedKalmanFilter::new(dvector![1.0], dmatrix![10.0], BlindSensor).unwrap();
        filter.update_time(0).unwrap();

        let result = filter.update_measurement(0, &dvector![0.5]);
        assert_eq!(result, Err(FilterError::SingularMatrix));
        assert!((filter.state()[0] - 1.0).abs() < 1e-12);
        assert!((filter.covariance()[(0, 0)] - 11.0).abs() < 1e-12);
        assert!(filter.gain().is_none());
    }

    /// Continuous dynamics ẋ = −x with A = −1 and a constant noise intensity.
    struct ExponentialDecay {
        noise: f64,
    }

    impl NonlinearSystem<f64> for ExponentialDecay {
        fn state_dim(&self) -> usize {
            1
        }
        fn input_dim(&self) -> usize {
            0
        }
        fn output_dim(&self) -> usize {
            1
        }
        fn state_transition_jacobian(&self, _step: usize, _state: &DVector<f64>) -> DMatrix<f64> {
            dmatrix![1.0]
        }
        fn output_jacobian(&self, _step: usize, _state: &DVector<f64>) -> DMatrix<f64> {
            dmatrix![1.0]
        }
        fn process_noise_covariance(&self, _step: usize) -> DMatrix<f64> {
            dmatrix![self.noise]
        }
        fn measurement_noise_covariance(&self, _step: usize) -> DMatrix<f64> {
            dmatrix![1.0]
        }
        fn evaluate_plant(&self, _step: usize, state: &DVector<f64>) -> DVector<f64> {
            state.clone()
        }
        fn evaluate_measurement(&self, _step: usize, state: &DVector<f64>) -> DVector<f64> {
            state.clone()
        }
        fn measurement(&self, _step: usize, state: &DVector<f64>) -> DVector<f64> {
            state.clone()
        }
    }

    impl ContinuousNonlinearSystem<f64> for ExponentialDecay {
        fn system_matrix(&self, _time: f64, _state: &DVector<f64>) -> DMatrix<f64> {
            dmatrix![-1.0]
        }
        fn derivative(&self, _time: f64, state: &DVector<f64>) -> DVector<f64> {
            dvector![-state[0]]
        }
        fn continuous_process_noise_covariance(&self, _time: f64) -> DMatrix<f64> {
            dmatrix![self.noise]
        }
    }

    #[test]
    fn continuous_time_update_propagates_through_the_system_matrix() {
        let mut filter = ExtendedKalmanFilter::new(
            dvector![2.0],
            dmatrix![1.0],
            ExponentialDecay { noise: 0.5 },
        )
        .unwrap();

        // One Euler step: x = 2 − 2·0.1 = 1.8, P = 1 + (−2·1 + 0.5)·0.1 = 0.85.
        filter.update_time_continuous(0.0, 0.1).unwrap();
        assert!((filter.state()[0] - 1.8).abs() < 1e-12);
        assert!((filter.covariance()[(0, 0)] - 0.85).abs() < 1e-12);

        // Repeated small steps track the decaying trajectory.
        let mut time = 0.1;
        for _ in 0..9 {
            filter.update_time_continuous(time, 0.1).unwrap();
            time += 0.1;
        }
        assert!(filter.state()[0] < 1.8);
        assert!(filter.state()[0] > 0.0);
    }

    #[test]
    fn construction_rejects_mismatched_prior_shapes() {
        let result =
            ExtendedKalmanFilter::new(dvector![1.0, 2.0], dmatrix![1.0], QuadraticSensor);
        assert_eq!(
            result.err(),
            Some(FilterError::DimensionMismatch {
                expected: (1, 1),
                found: (2, 1),
            })
        );
    }

    #[test]
    fn estimate_tracks_a_nonlinear_measurement_stream() {
        // Feed noise-free quadratic readings of a known trajectory; the EKF
        // should stay close to it despite the linearization error.
        struct Stationary;

        impl NonlinearSystem<f64> for Stationary {
            fn state_dim(&self) -> usize {
                1
            }
            fn input_dim(&self) -> usize {
                0
            }
            fn output_dim(&self) -> usize {
                1
            }
            fn state_transition_jacobian(
                &self,
                _step: usize,
                _state: &DVector<f64>,
            ) -> DMatrix<f64> {
                dmatrix![1.0]
            }
            fn output_jacobian(&self, _step: usize, state: &DVector<f64>) -> DMatrix<f64> {
                dmatrix![state[0]]
            }
            fn process_noise_covariance(&self, _step: usize) -> DMatrix<f64> {
                dmatrix![1e-4]
            }
            fn measurement_noise_covariance(&self, _step: usize) -> DMatrix<f64> {
                dmatrix![1e-2]
            }
            fn evaluate_plant(&self, _step: usize, state: &DVector<f64>) -> DVector<f64> {
                state.clone()
            }
            fn evaluate_measurement(&self, _step: usize, state: &DVector<f64>) -> DVector<f64> {
                dvector![0.5 * state[0] * state[0]]
            }
            fn measurement(&self, _step: usize, _state: &DVector<f64>) -> DVector<f64> {
                // True state is 3, so h(3) = 4.5.
                dvector![4.5]
            }
        }

        let mut filter =
            ExtendedKalmanFilter::new(dvector![2.0], dmatrix![1.0], Stationary).unwrap();
        for step in 0..30 {
            filter.update_time(step).unwrap();
            let reading = filter.model().measurement(step, filter.state());
            filter.update_measurement(step, &reading).unwrap();
        }
        assert!((filter.state()[0] - 3.0).abs() < 1e-2);
    }
}
