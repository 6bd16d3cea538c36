//! Discrete Kalman filter over a linear system model.

use nalgebra::{DMatrix, DVector, RealField};

use crate::error::FilterError;
use crate::linalg::{
    check_model_shape, check_model_vector, check_shape, check_vector, invert_and_determinant,
    symmetrize,
};
use crate::model::LinearSystem;

/// A recursive state estimator for discrete-time linear stochastic systems.
///
/// The filter alternates a time update (prediction through the dynamics) with
/// a measurement update (correction against a sensor reading), maintaining the
/// estimated state x, its error covariance P and, after the first correction,
/// the Kalman gain K.
///
/// Each update either fully commits or fails leaving (x, P, K) at their
/// pre-call values; the caller decides whether a failed step is skipped,
/// retried with adjusted noise, or fatal for the run.
///
/// ```
/// use nalgebra::{dmatrix, dvector, DMatrix, DVector};
/// use rekal::{DiscreteKalmanFilter, LinearSystem};
///
/// struct Scalar;
///
/// impl LinearSystem<f64> for Scalar {
///     fn state_dim(&self) -> usize { 1 }
///     fn input_dim(&self) -> usize { 0 }
///     fn output_dim(&self) -> usize { 1 }
///     fn state_transition(&self, _step: usize) -> DMatrix<f64> { dmatrix![1.0] }
///     fn output_matrix(&self, _step: usize) -> DMatrix<f64> { dmatrix![1.0] }
///     fn process_noise_covariance(&self, _step: usize) -> DMatrix<f64> { dmatrix![1.0] }
///     fn measurement_noise_covariance(&self, _step: usize) -> DMatrix<f64> { dmatrix![2.0] }
///     fn measurement(&self, _step: usize, _state: &DVector<f64>) -> DVector<f64> {
///         dvector![2.0]
///     }
/// }
///
/// let mut filter = DiscreteKalmanFilter::new(dvector![1.0], dmatrix![10.0], Scalar).unwrap();
/// filter.update_time(1).unwrap();
/// let reading = filter.model().measurement(1, filter.state());
/// filter.update_measurement(1, &reading).unwrap();
/// assert!((filter.state()[0] - 24.0 / 13.0).abs() < 1e-12);
/// ```
#[derive(Clone, Debug)]
pub struct DiscreteKalmanFilter<T, M>
where
    T: RealField + Copy,
    M: LinearSystem<T>,
{
    model: M,
    state: DVector<T>,
    covariance: DMatrix<T>,
    gain: Option<DMatrix<T>>,
}

impl<T, M> DiscreteKalmanFilter<T, M>
where
    T: RealField + Copy,
    M: LinearSystem<T>,
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

    /// Time (prediction) update:
    ///
    /// ```text
    /// x⁻ = Φ(k)·x + Bu(k)
    /// P⁻ = Φ(k)·P·Φ(k)ᵀ + Qd(k)
    /// ```
    ///
    /// Performs no matrix inversion; the only failure mode is a model
    /// returning wrongly shaped data.
    pub fn update_time(&mut self, step: usize) -> Result<(), FilterError> {
        let n = self.model.state_dim();

        let phi = self.model.state_transition(step);
        check_model_shape(&phi, n, n)?;
        let control = self.model.control_input(step);
        check_model_vector(&control, n)?;
        let process_noise = self.model.process_noise_covariance(step);
        check_model_shape(&process_noise, n, n)?;

        let predicted_state = &phi * &self.state + control;
        let mut predicted_covariance = &phi * &self.covariance * phi.transpose() + process_noise;
        symmetrize(&mut predicted_covariance);

        self.state = predicted_state;
        self.covariance = predicted_covariance;
        Ok(())
    }

    /// Measurement (correction) update against the reading ỹ:
    ///
    /// ```text
    /// S = C·P⁻·Cᵀ + Rd
    /// K = P⁻·Cᵀ·S⁻¹
    /// r = ỹ − (C·x⁻ + Du)
    /// x = x⁻ + K·r
    /// P = (I − K·C)·P⁻
    /// ```
    ///
    /// Inverting S is mandatory every step; a singular S fails the update with
    /// [`FilterError::SingularMatrix`] and leaves (x⁻, P⁻) committed as-is.
    /// Calling this before any time update is valid once per run and corrects
    /// against the prior (x₀, P₀).
    pub fn update_measurement(
        &mut self,
        step: usize,
        measurement: &DVector<T>,
    ) -> Result<(), FilterError> {
        let n = self.model.state_dim();
        let m = self.model.output_dim();
        check_vector(measurement, m)?;

        let output = self.model.output_matrix(step);
        check_model_shape(&output, m, n)?;
        let measurement_noise = self.model.measurement_noise_covariance(step);
        check_model_shape(&measurement_noise, m, m)?;
        let measurement_input = self.model.measurement_input(step);
        check_model_vector(&measurement_input, m)?;

        let innovation_covariance =
            &output * &self.covariance * output.transpose() + measurement_noise;
        let (innovation_inverse, _det) = invert_and_determinant(&innovation_covariance)?;

        let gain = &self.covariance * output.transpose() * innovation_inverse;
        let residual = measurement - (&output * &self.state + measurement_input);

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
