//! UdU' factorization primitives
//!
//! A symmetric positive semi-definite matrix `M` is factorized as
//! `M = U * D * U'` where `U` is unit upper triangular and `D` diagonal.
//! Both factors are packed into one matrix: the strict upper triangle holds
//! `U`, the diagonal holds `D` and the implicit unit diagonal of `U` is not
//! stored. The lower triangle plays no part in the representation.
//!
//! Only the leading `n x n` block of the packed matrix is interpreted, which
//! lets the filter keep extra scratch columns to the right of the factor.
//!
//! # Reference
//!
//! Bierman, G. J. (1977). "Factorization Methods for Discrete Sequential
//! Estimation." Academic Press.

use nalgebra::{DMatrix, RealField};
use num_traits::Float;

use crate::utils::indefinite_rcond;

/// Factorizes the leading `n x n` block of `m` in place into packed UD form.
///
/// Only the upper triangle of the block is read; the lower triangle is left
/// untouched. A zero diagonal is accepted when the rest of its column is
/// zero (semi-definite), anything else non-positive is negative definite.
///
/// # Returns
/// Reciprocal condition number of the factor, `-1` if `m` is negative definite
pub fn ud_factorize<T: RealField + Float + Copy>(m: &mut DMatrix<T>, n: usize) -> T {
    for j in (0..n).rev() {
        let d = m[(j, j)];
        if d < T::zero() {
            return indefinite_rcond();
        }

        if d > T::zero() {
            let d_inv = T::one() / d;
            for k in 0..j {
                // Remove the rank one contribution of column j from the leading block
                let beta = m[(k, j)];
                m[(k, j)] = beta * d_inv;
                for i in 0..=k {
                    let u_ij = m[(i, j)];
                    m[(i, k)] -= beta * u_ij;
                }
            }
        } else {
            // Semi-definite: column must be exactly empty
            for k in 0..j {
                if m[(k, j)] != T::zero() {
                    return indefinite_rcond();
                }
            }
        }
    }

    ud_rcond(m, n)
}

/// Factorizes the symmetric matrix `m` into the left block of `ud`.
///
/// The upper triangle of `m` is copied into `ud`, the lower triangle of the
/// left block is zeroed and the block factorized in place. `ud` may have more
/// columns than `m`; they are not touched.
///
/// # Panics
/// Panics if `m` is not square or `ud` is smaller than `m`.
pub fn ud_factorize_from<T: RealField + Float + Copy>(ud: &mut DMatrix<T>, m: &DMatrix<T>) -> T {
    let n = m.nrows();
    assert!(m.is_square(), "Matrix to factorize must be square");
    assert!(
        ud.nrows() >= n && ud.ncols() >= n,
        "UD storage smaller than matrix to factorize"
    );

    for j in 0..n {
        for i in 0..n {
            ud[(i, j)] = if i <= j { m[(i, j)] } else { T::zero() };
        }
    }
    ud_factorize(ud, n)
}

/// Recomposes `U * D * U'` from the leading block of `ud` into `x`.
///
/// The size of the block is taken from `x`, which must be square.
pub fn ud_recompose_into<T: RealField + Copy>(x: &mut DMatrix<T>, ud: &DMatrix<T>) {
    let n = x.nrows();
    debug_assert!(x.is_square() && ud.nrows() >= n && ud.ncols() >= n);

    let unit = |i: usize, j: usize| if i == j { T::one() } else { ud[(i, j)] };

    for i in 0..n {
        for k in i..n {
            let mut sum = T::zero();
            for j in k..n {
                sum += unit(i, j) * ud[(j, j)] * unit(k, j);
            }
            x[(i, k)] = sum;
            x[(k, i)] = sum;
        }
    }
}

/// Recomposes the leading `n x n` block of `ud` into a new symmetric matrix.
pub fn ud_recompose<T: RealField + Copy>(ud: &DMatrix<T>, n: usize) -> DMatrix<T> {
    let mut x = DMatrix::zeros(n, n);
    ud_recompose_into(&mut x, ud);
    x
}

/// Estimates the reciprocal condition number of a UD factor from its diagonal.
///
/// # Returns
/// - `-1` if any element of `D` is negative
/// - `0` if `D` is entirely zero
/// - `min(D) / max(D)` otherwise (`1` for an empty factor)
/// - NaN if `D` holds a non-finite element
pub fn ud_rcond<T: RealField + Float + Copy>(ud: &DMatrix<T>, n: usize) -> T {
    if n == 0 {
        return T::one();
    }

    let mut min_d = ud[(0, 0)];
    let mut max_d = T::zero();
    for i in 0..n {
        let d = ud[(i, i)];
        if !Float::is_finite(d) {
            return <T as Float>::nan();
        }
        if d < min_d {
            min_d = d;
        }
        if d > max_d {
            max_d = d;
        }
    }

    if min_d < T::zero() {
        return indefinite_rcond();
    }
    if max_d == T::zero() {
        return T::zero();
    }
    min_d / max_d
}
