//! System-model capability traits.
//!
//! A system model is the caller-owned description of the dynamics and noise
//! statistics the filters recurse over. Models come in two flavors selected by
//! filter type: [`LinearSystem`] for the discrete Kalman filter and
//! [`NonlinearSystem`] for the extended Kalman filter, with
//! [`ContinuousNonlinearSystem`] as an additional capability for the EKF's
//! continuous-time update.
//!
//! Every accessor returns freshly owned values rather than references into
//! shared scratch. That keeps models free of per-call mutable state, so one
//! model instance can be shared read-only across several filter instances
//! (e.g. multiple tracks over the same dynamics).
//!
//! Accessors must be pure with respect to filter state and must return the
//! declared shapes for the model's lifetime; the filters re-check shapes on
//! every step and report violations as
//! [`ModelContractViolation`](crate::FilterError::ModelContractViolation).

use nalgebra::{DMatrix, DVector, RealField};

/// A discrete-time linear stochastic system:
///
/// ```text
/// x(k+1) = Φ(k)·x(k) + Bu(k) + w(k),   w ~ N(0, Qd(k))
/// y(k)   = C(k)·x(k) + Du(k) + v(k),   v ~ N(0, Rd(k))
/// ```
///
/// A time-invariant system simply ignores `step` and returns constant
/// matrices.
pub trait LinearSystem<T: RealField + Copy> {
    fn state_dim(&self) -> usize;
    fn input_dim(&self) -> usize;
    fn output_dim(&self) -> usize;

    /// State-transition matrix Φ(k), `state_dim × state_dim`.
    fn state_transition(&self, step: usize) -> DMatrix<T>;

    /// Output matrix C(k), `output_dim × state_dim`.
    fn output_matrix(&self, step: usize) -> DMatrix<T>;

    /// Discretized process-noise covariance Qd(k), `state_dim × state_dim`.
    fn process_noise_covariance(&self, step: usize) -> DMatrix<T>;

    /// Discretized measurement-noise covariance Rd(k),
    /// `output_dim × output_dim`.
    fn measurement_noise_covariance(&self, step: usize) -> DMatrix<T>;

    /// Deterministic control contribution Bu(k) = Bd(k)·u(k) to the state
    /// equation. Defaults to the zero vector for uncontrolled systems.
    fn control_input(&self, _step: usize) -> DVector<T> {
        DVector::zeros(self.state_dim())
    }

    /// Deterministic contribution Du(k) = Dd(k)·u(k) to the observation
    /// equation. Defaults to the zero vector.
    fn measurement_input(&self, _step: usize) -> DVector<T> {
        DVector::zeros(self.output_dim())
    }

    /// Actual (or simulated) sensor reading ỹ(k). This is an external data
    /// source owned by the model; the filter never calls it, drivers feed its
    /// output into `update_measurement`.
    fn measurement(&self, step: usize, state: &DVector<T>) -> DVector<T>;
}

/// A discrete-time nonlinear stochastic system:
///
/// ```text
/// x(k+1) = f(k, x(k), u(k), w(k)),   w ~ N(0, Q(k))
/// y(k)   = h(k, x(k), u(k), v(k)),   v ~ N(0, R(k))
/// ```
///
/// The Jacobian accessors take the evaluation state explicitly because the
/// EKF re-linearizes at every step around its current estimate.
pub trait NonlinearSystem<T: RealField + Copy> {
    fn state_dim(&self) -> usize;
    fn input_dim(&self) -> usize;
    fn output_dim(&self) -> usize;

    /// Jacobian Φ(k, x) = ∂f/∂x evaluated at `state`,
    /// `state_dim × state_dim`.
    fn state_transition_jacobian(&self, step: usize, state: &DVector<T>) -> DMatrix<T>;

    /// Jacobian C(k, x) = ∂h/∂x evaluated at `state`,
    /// `output_dim × state_dim`.
    fn output_jacobian(&self, step: usize, state: &DVector<T>) -> DMatrix<T>;

    /// Process-noise covariance Q(k), `state_dim × state_dim`.
    fn process_noise_covariance(&self, step: usize) -> DMatrix<T>;

    /// Measurement-noise covariance R(k), `output_dim × output_dim`.
    fn measurement_noise_covariance(&self, step: usize) -> DMatrix<T>;

    /// Noise-free plant evaluation f(k, x, u, 0).
    fn evaluate_plant(&self, step: usize, state: &DVector<T>) -> DVector<T>;

    /// Noise-free measurement evaluation h(k, x, u, 0).
    fn evaluate_measurement(&self, step: usize, state: &DVector<T>) -> DVector<T>;

    /// Actual (or simulated) sensor reading ỹ(k), as in
    /// [`LinearSystem::measurement`].
    fn measurement(&self, step: usize, state: &DVector<T>) -> DVector<T>;
}

/// Continuous-time capability for the EKF time update.
///
/// This is a separate capability rather than extra methods on
/// [`NonlinearSystem`]: a model that only describes discrete dynamics simply
/// does not implement it, and `update_time_continuous` is not callable on a
/// filter over such a model.
pub trait ContinuousNonlinearSystem<T: RealField + Copy>: NonlinearSystem<T> {
    /// Continuous system matrix A(t, x) = ∂ẋ/∂x evaluated at `state`,
    /// `state_dim × state_dim`. Note: A, not its discretization Φ.
    fn system_matrix(&self, time: T, state: &DVector<T>) -> DMatrix<T>;

    /// State derivative ẋ = f(t, x, u, 0).
    fn derivative(&self, time: T, state: &DVector<T>) -> DVector<T>;

    /// Continuous process-noise intensity Q(t), `state_dim × state_dim`.
    fn continuous_process_noise_covariance(&self, time: T) -> DMatrix<T>;
}

impl<T: RealField + Copy, M: LinearSystem<T> + ?Sized> LinearSystem<T> for &M {
    fn state_dim(&self) -> usize {
        (**self).state_dim()
    }
    fn input_dim(&self) -> usize {
        (**self).input_dim()
    }
    fn output_dim(&self) -> usize {
        (**self).output_dim()
    }
    fn state_transition(&self, step: usize) -> DMatrix<T> {
        (**self).state_transition(step)
    }
    fn output_matrix(&self, step: usize) -> DMatrix<T> {
        (**self).output_matrix(step)
    }
    fn process_noise_covariance(&self, step: usize) -> DMatrix<T> {
        (**self).process_noise_covariance(step)
    }
    fn measurement_noise_covariance(&self, step: usize) -> DMatrix<T> {
        (**self).measurement_noise_covariance(step)
    }
    fn control_input(&self, step: usize) -> DVector<T> {
        (**self).control_input(step)
    }
    fn measurement_input(&self, step: usize) -> DVector<T> {
        (**self).measurement_input(step)
    }
    fn measurement(&self, step: usize, state: &DVector<T>) -> DVector<T> {
        (**self).measurement(step, state)
    }
}

impl<T: RealField + Copy, M: NonlinearSystem<T> + ?Sized> NonlinearSystem<T> for &M {
    fn state_dim(&self) -> usize {
        (**self).state_dim()
    }
    fn input_dim(&self) -> usize {
        (**self).input_dim()
    }
    fn output_dim(&self) -> usize {
        (**self).output_dim()
    }
    fn state_transition_jacobian(&self, step: usize, state: &DVector<T>) -> DMatrix<T> {
        (**self).state_transition_jacobian(step, state)
    }
    fn output_jacobian(&self, step: usize, state: &DVector<T>) -> DMatrix<T> {
        (**self).output_jacobian(step, state)
    }
    fn process_noise_covariance(&self, step: usize) -> DMatrix<T> {
        (**self).process_noise_covariance(step)
    }
    fn measurement_noise_covariance(&self, step: usize) -> DMatrix<T> {
        (**self).measurement_noise_covariance(step)
    }
    fn evaluate_plant(&self, step: usize, state: &DVector<T>) -> DVector<T> {
        (**self).evaluate_plant(step, state)
    }
    fn evaluate_measurement(&self, step: usize, state: &DVector<T>) -> DVector<T> {
        (**self).evaluate_measurement(step, state)
    }
    fn measurement(&self, step: usize, state: &DVector<T>) -> DVector<T> {
        (**self).measurement(step, state)
    }
}

impl<T: RealField + Copy, M: ContinuousNonlinearSystem<T> + ?Sized> ContinuousNonlinearSystem<T>
    for &M
{
    fn system_matrix(&self, time: T, state: &DVector<T>) -> DMatrix<T> {
        (**self).system_matrix(time, state)
    }
    fn derivative(&self, time: T, state: &DVector<T>) -> DVector<T> {
        (**self).derivative(time, state)
    }
    fn continuous_process_noise_covariance(&self, time: T) -> DMatrix<T> {
        (**self).continuous_process_noise_covariance(time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{dmatrix, dvector};

    struct Uncontrolled;

    impl LinearSystem<f64> for Uncontrolled {
        fn state_dim(&self) -> usize {
            2
        }
        fn input_dim(&self) -> usize {
            0
        }
        fn output_dim(&self) -> usize {
            1
        }
        fn state_transition(&self, _step: usize) -> DMatrix<f64> {
            DMatrix::identity(2, 2)
        }
        fn output_matrix(&self, _step: usize) -> DMatrix<f64> {
            dmatrix![1.0, 0.0]
        }
        fn process_noise_covariance(&self, _step: usize) -> DMatrix<f64> {
            DMatrix::identity(2, 2)
        }
        fn measurement_noise_covariance(&self, _step: usize) -> DMatrix<f64> {
            DMatrix::identity(1, 1)
        }
        fn measurement(&self, _step: usize, state: &DVector<f64>) -> DVector<f64> {
            dvector![state[0]]
        }
    }

    #[test]
    fn deterministic_inputs_default_to_zero_vectors() {
        let model = Uncontrolled;
        assert_eq!(model.control_input(0), DVector::zeros(2));
        assert_eq!(model.measurement_input(0), DVector::zeros(1));
    }

    #[test]
    fn a_shared_reference_is_itself_a_model() {
        fn transition<M: LinearSystem<f64>>(model: M) -> DMatrix<f64> {
            model.state_transition(0)
        }
        let model = Uncontrolled;
        let by_ref = transition(&model);
        assert_eq!(by_ref, DMatrix::identity(2, 2));
        // The owner is still usable afterwards.
        assert_eq!(model.state_dim(), 2);
    }
}
