//! Error types shared by the filter implementations.

/// Errors that can occur during filter construction or an update step.
///
/// Every failing operation leaves the filter's committed state untouched, so a
/// driver loop may skip the step, adjust its inputs and retry, or abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterError {
    /// A caller-supplied vector or matrix does not match the declared
    /// `state_dim`/`input_dim`/`output_dim`. Vectors report `(len, 1)`.
    DimensionMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
    /// The LU factorization met a (near-)zero pivot while inverting a matrix,
    /// typically the innovation covariance S.
    SingularMatrix,
    /// A system model returned a matrix or vector of the wrong shape.
    ModelContractViolation {
        expected: (usize, usize),
        found: (usize, usize),
    },
}
