//! Linear algebra boundary shared by both filters.
//!
//! All factorization work is delegated to nalgebra; this module only adds the
//! runtime preconditions the filters need: shape checks at call boundaries and
//! a singularity-aware inverse. Dimension violations are reachable, testable
//! conditions here, not panics.

use nalgebra::{DMatrix, DVector, RealField};

use crate::error::FilterError;

/// Pivots smaller than `max_pivot * PIVOT_TOLERANCE` are treated as zero.
const PIVOT_TOLERANCE: f64 = 1e-12;

/// Invert a square matrix via LU decomposition with partial pivoting,
/// returning the inverse together with the determinant.
///
/// Fails with [`FilterError::SingularMatrix`] when the factorization produces
/// a (near-)zero pivot. No pseudo-inverse is ever substituted; callers decide
/// how to handle a singular step.
pub fn invert_and_determinant<T: RealField + Copy>(
    matrix: &DMatrix<T>,
) -> Result<(DMatrix<T>, T), FilterError> {
    let n = matrix.nrows();
    if matrix.ncols() != n {
        return Err(FilterError::DimensionMismatch {
            expected: (n, n),
            found: (matrix.nrows(), matrix.ncols()),
        });
    }

    let lu = matrix.clone().lu();
    let u = lu.u();

    let mut max_pivot = T::zero();
    for i in 0..n {
        let pivot = u[(i, i)].abs();
        if pivot > max_pivot {
            max_pivot = pivot;
        }
    }
    let threshold = max_pivot * T::from_subset(&PIVOT_TOLERANCE);
    for i in 0..n {
        if u[(i, i)].abs() <= threshold {
            return Err(FilterError::SingularMatrix);
        }
    }

    let determinant = lu.determinant();
    let inverse = lu.try_inverse().ok_or(FilterError::SingularMatrix)?;
    Ok((inverse, determinant))
}

/// Restore exact symmetry after a covariance update: P ← (P + Pᵀ) / 2.
///
/// The update formulas keep P symmetric analytically; this removes the
/// floating-point drift that accumulates over long runs.
pub fn symmetrize<T: RealField + Copy>(matrix: &mut DMatrix<T>) {
    let half = T::from_subset(&0.5);
    let symmetric = (&*matrix + matrix.transpose()) * half;
    matrix.copy_from(&symmetric);
}

/// Check a caller-supplied matrix against the declared shape.
pub fn check_shape<T: RealField + Copy>(
    matrix: &DMatrix<T>,
    rows: usize,
    cols: usize,
) -> Result<(), FilterError> {
    if matrix.nrows() == rows && matrix.ncols() == cols {
        Ok(())
    } else {
        Err(FilterError::DimensionMismatch {
            expected: (rows, cols),
            found: (matrix.nrows(), matrix.ncols()),
        })
    }
}

/// Check a caller-supplied vector against the declared length.
pub fn check_vector<T: RealField + Copy>(
    vector: &DVector<T>,
    len: usize,
) -> Result<(), FilterError> {
    if vector.len() == len {
        Ok(())
    } else {
        Err(FilterError::DimensionMismatch {
            expected: (len, 1),
            found: (vector.len(), 1),
        })
    }
}

/// Check a model-returned matrix; violations are the model's fault, not the
/// caller's, and surface as [`FilterError::ModelContractViolation`].
pub fn check_model_shape<T: RealField + Copy>(
    matrix: &DMatrix<T>,
    rows: usize,
    cols: usize,
) -> Result<(), FilterError> {
    if matrix.nrows() == rows && matrix.ncols() == cols {
        Ok(())
    } else {
        Err(FilterError::ModelContractViolation {
            expected: (rows, cols),
            found: (matrix.nrows(), matrix.ncols()),
        })
    }
}

/// Check a model-returned vector, surfacing violations as
/// [`FilterError::ModelContractViolation`].
pub fn check_model_vector<T: RealField + Copy>(
    vector: &DVector<T>,
    len: usize,
) -> Result<(), FilterError> {
    if vector.len() == len {
        Ok(())
    } else {
        Err(FilterError::ModelContractViolation {
            expected: (len, 1),
            found: (vector.len(), 1),
        })
    }
}
