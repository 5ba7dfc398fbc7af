//! MWG-S prediction of the UD factor

use nalgebra::{DMatrix, DVector, RealField};
use num_traits::Float;

use super::{PredictScratch, UdFilter};
use crate::models::LinrzPredictModel;
use crate::types::udu::ud_rcond;
use crate::utils::indefinite_rcond;
use crate::{FilterError, Result};

const NOISE_TOO_LARGE: &str = "Predict model noise larger than preallocated space";
const COUPLING_SIZE_MISMATCH: &str = "Predict model noise coupling does not match state dimension";
const JACOBIAN_SIZE_MISMATCH: &str = "Predict model Jacobian does not match state dimension";
const PREDICTION_SIZE_MISMATCH: &str = "Predicted state does not match state dimension";
const PREDICTED_NOT_PSD: &str = "Predicted state covariance not positive-semi-definite";

impl<T: RealField + Float + Copy> UdFilter<T> {
    /// Predicts the state and factor through a linearized model.
    ///
    /// The Jacobian is evaluated at the prior mean, the mean is then replaced
    /// by `f(x)` and the factor becomes the UdU' factorization of
    /// `Fx * X * Fx' + G * diag(q) * G'`.
    ///
    /// # Returns
    /// Reciprocal condition number of the predicted factor. Fails with a
    /// logic error if the model noise exceeds `q_max` or the model shapes do
    /// not match the state, and with a numeric error if the predicted
    /// covariance is not positive semi-definite or poorly conditioned.
    pub fn predict<M>(&mut self, model: &M) -> Result<T>
    where
        M: LinrzPredictModel<T> + ?Sized,
    {
        let n = self.state_size();
        let g = model.noise_coupling();
        let q = model.noise_variance();

        if q.len() > self.q_max {
            return Err(FilterError::Logic(NOISE_TOO_LARGE));
        }
        if g.nrows() != n || g.ncols() != q.len() {
            return Err(FilterError::Logic(COUPLING_SIZE_MISMATCH));
        }

        let fx = model.jacobian(&self.state.mean);
        if fx.shape() != (n, n) {
            return Err(FilterError::Logic(JACOBIAN_SIZE_MISMATCH));
        }
        let predicted = model.predict(&self.state.mean);
        if predicted.len() != n {
            return Err(FilterError::Logic(PREDICTION_SIZE_MISMATCH));
        }

        self.transaction(|filter| {
            filter.state.mean.copy_from(&predicted);
            let rcond = predict_gq(&mut filter.ud, &mut filter.predict_scratch, &fx, g, q);
            log::debug!("predict rcond={:?}", rcond);
            filter.limit.check_psd(rcond, PREDICTED_NOT_PSD)
        })
    }
}

/// MWG-S update of the packed factor `ud` to `Fx * UDU' * Fx' + G * diag(q) * G'`.
///
/// `ud` must have at least `n + q.len()` columns; the columns right of the
/// leading block are overwritten with `G`. The lower triangle is zeroed.
///
/// # Returns
/// Reciprocal condition number, `0` if semi-definite, `-1` if negative.
/// On `-1` the factor is left partially updated.
pub(super) fn predict_gq<T: RealField + Float + Copy>(
    ud: &mut DMatrix<T>,
    scratch: &mut PredictScratch<T>,
    fx: &DMatrix<T>,
    g: &DMatrix<T>,
    q: &DVector<T>,
) -> T {
    let n = ud.nrows();
    let nq = q.len();
    let augmented = n + nq;
    if n == 0 {
        return ud_rcond(ud, 0);
    }

    let PredictScratch { d, dv, v } = scratch;

    // Augment d with q and UD with G
    for i in 0..nq {
        d[n + i] = q[i];
    }
    for j in 0..n {
        for i in 0..nq {
            ud[(j, n + i)] = g[(j, i)];
        }
    }

    // U = Fx * U, column by column from the right, D retrieved into d
    for j in (1..n).rev() {
        for i in 0..=j {
            d[i] = ud[(i, j)];
        }
        for i in 0..n {
            let mut sum = fx[(i, j)];
            for k in 0..j {
                sum += fx[(i, k)] * d[k];
            }
            ud[(i, j)] = sum;
        }
    }
    d[0] = ud[(0, 0)];
    for j in 0..n {
        ud[(j, 0)] = fx[(j, 0)];
    }

    // Weighted Gram-Schmidt on the rows, built in the lower triangle
    for j in (0..n).rev() {
        let mut e = T::zero();
        for k in 0..augmented {
            v[k] = ud[(j, k)];
            dv[k] = d[k] * v[k];
            e += v[k] * dv[k];
        }

        if e > T::zero() {
            ud[(j, j)] = e;
            let diag_inv = T::one() / e;
            for k in 0..j {
                let mut coupling = T::zero();
                for i in 0..augmented {
                    coupling += ud[(k, i)] * dv[i];
                }
                coupling *= diag_inv;
                ud[(j, k)] = coupling;
                for i in 0..augmented {
                    ud[(k, i)] -= coupling * v[i];
                }
            }
        } else if e == T::zero() {
            // Semi-definite only if no remaining row is coupled to this one
            ud[(j, j)] = e;
            for k in 0..j {
                for i in 0..augmented {
                    if ud[(k, i)] * dv[i] != T::zero() {
                        return indefinite_rcond();
                    }
                }
                ud[(j, k)] = T::zero();
            }
        } else {
            return indefinite_rcond();
        }
    }

    // Transpose into the upper triangle
    for j in 1..n {
        for i in 0..j {
            ud[(i, j)] = ud[(j, i)];
            ud[(j, i)] = T::zero();
        }
    }

    ud_rcond(ud, n)
}
