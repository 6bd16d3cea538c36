//! Recursive state estimation for discrete-time stochastic systems.
//!
//! Two filter variants over a caller-supplied system model:
//! [`DiscreteKalmanFilter`] for linear systems and [`ExtendedKalmanFilter`]
//! for nonlinear ones, re-linearized around the current estimate each step.
//! Both maintain a running belief (state vector and error covariance) and
//! alternate a time update with a measurement update, producing the Kalman
//! gain as a side effect of correction.
//!
//! The model is a read-only capability ([`LinearSystem`],
//! [`NonlinearSystem`], [`ContinuousNonlinearSystem`]) that may be shared
//! across independent filter instances; the filter never mutates it. Failed
//! updates report a [`FilterError`] and leave the committed estimate
//! untouched, so driver loops choose their own retry/skip/abort policy.

pub mod ekf;
pub mod error;
pub mod kf;
pub mod linalg;
pub mod model;

pub use ekf::ExtendedKalmanFilter;
pub use error::FilterError;
pub use kf::DiscreteKalmanFilter;
pub use model::{ContinuousNonlinearSystem, LinearSystem, NonlinearSystem};
