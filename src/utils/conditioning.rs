//! Numerical conditioning policy for factorized covariances
//!
//! Every factorization in the filter returns an estimate of the reciprocal
//! condition number (rcond) of the resulting factor. The policy decides
//! whether that estimate is good enough to continue filtering:
//!
//! | rcond                | Classification                     |
//! |----------------------|------------------------------------|
//! | `< 0` (sentinel -1)  | [`Conditioning::Indefinite`]       |
//! | `[0, limit)` or NaN  | [`Conditioning::Singular`]         |
//! | `>= limit`           | [`Conditioning::Acceptable`]       |

use nalgebra::RealField;
use num_traits::Float;

use crate::{FilterError, Result};

const INVALID_LIMIT: &str = "Conditioning limit must be finite and non-negative";

/// Reciprocal condition number reported for a factor found to be negative.
///
/// Factorization and update primitives return this sentinel instead of an
/// rcond estimate when they detect a negative definite result.
pub fn indefinite_rcond<T: RealField + Copy>() -> T {
    -T::one()
}

/// Classification of a factorization result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conditioning {
    /// Conditioning at or above the configured limit
    Acceptable,
    /// Semi-definite, or positive definite but conditioned below the limit
    Singular,
    /// Negative definite (the factorization reported the -1 sentinel)
    Indefinite,
}

/// Minimum acceptable reciprocal condition number for PD factorizations.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ConditioningLimit<T> {
    limit_pd: T,
}

impl<T: RealField + Float + Copy> ConditioningLimit<T> {
    /// Headroom applied to machine epsilon by the default limit.
    pub const HEADROOM: f64 = 1e5;

    /// Creates the default limit: machine epsilon with five decimal digits of headroom.
    pub fn default_limit() -> Self {
        Self {
            limit_pd: <T as Float>::epsilon() * nalgebra::convert::<f64, T>(Self::HEADROOM),
        }
    }

    /// Creates a limit with a caller supplied floor.
    ///
    /// # Panics
    /// Panics if `limit` is negative or not finite.
    pub fn new(limit: T) -> Self {
        assert!(Self::is_valid(limit), "{}", INVALID_LIMIT);
        Self { limit_pd: limit }
    }

    /// Creates a limit, failing with a logic error if `limit` is negative or
    /// not finite.
    pub fn try_new(limit: T) -> Result<Self> {
        if Self::is_valid(limit) {
            Ok(Self { limit_pd: limit })
        } else {
            Err(FilterError::Logic(INVALID_LIMIT))
        }
    }

    fn is_valid(limit: T) -> bool {
        limit >= T::zero() && Float::is_finite(limit)
    }

    /// The configured minimum reciprocal condition number.
    #[inline]
    pub fn limit(&self) -> T {
        self.limit_pd
    }

    /// Classifies an rcond estimate against this limit.
    pub fn classify(&self, rcond: T) -> Conditioning {
        if rcond >= self.limit_pd {
            Conditioning::Acceptable
        } else if rcond < T::zero() {
            Conditioning::Indefinite
        } else {
            Conditioning::Singular
        }
    }

    /// Checks that a factorization is positive semi-definite and well conditioned.
    ///
    /// Returns the rcond unchanged when acceptable, otherwise a numeric
    /// failure carrying `message`.
    pub fn check_psd(&self, rcond: T, message: &'static str) -> Result<T> {
        match self.classify(rcond) {
            Conditioning::Acceptable => Ok(rcond),
            Conditioning::Singular => {
                log::warn!(
                    "{}: rcond {:?} below limit {:?}",
                    message,
                    rcond,
                    self.limit_pd
                );
                Err(FilterError::Numeric(message))
            }
            Conditioning::Indefinite => {
                log::warn!("{}: factor is negative definite", message);
                Err(FilterError::Numeric(message))
            }
        }
    }
}

impl<T: RealField + Float + Copy> Default for ConditioningLimit<T> {
    fn default() -> Self {
        Self::default_limit()
    }
}

// Deserialized limits go through the same validation as `try_new`
#[cfg(feature = "serde")]
impl<'de, T> serde::Deserialize<'de> for ConditioningLimit<T>
where
    T: RealField + Float + Copy + serde::Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> core::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(serde::Deserialize)]
        struct Repr<T> {
            limit_pd: T,
        }

        let repr = Repr::<T>::deserialize(deserializer)?;
        Self::try_new(repr.limit_pd).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limit_headroom() {
        let limit = ConditioningLimit::<f64>::default();
        assert!((limit.limit() - f64::EPSILON * 1e5).abs() < 1e-20);
        assert!(limit.limit() > 0.0 && limit.limit() < 1e-9);
    }

    #[test]
    fn test_classify() {
        let limit = ConditioningLimit::new(1e-6_f64);

        assert_eq!(limit.classify(1.0), Conditioning::Acceptable);
        assert_eq!(limit.classify(1e-6), Conditioning::Acceptable);
        assert_eq!(limit.classify(1e-7), Conditioning::Singular);
        assert_eq!(limit.classify(0.0), Conditioning::Singular);
        assert_eq!(limit.classify(-1.0), Conditioning::Indefinite);
        assert_eq!(limit.classify(f64::NAN), Conditioning::Singular);
    }

    #[test]
    fn test_check_psd() {
        let limit = ConditioningLimit::new(1e-6_f64);

        assert_eq!(limit.check_psd(0.5, "ok"), Ok(0.5));
        assert_eq!(
            limit.check_psd(1e-9, "poorly conditioned"),
            Err(FilterError::Numeric("poorly conditioned"))
        );
        let err = limit.check_psd(indefinite_rcond(), "negative").unwrap_err();
        assert!(err.is_numeric());
        assert_eq!(err.message(), "negative");
    }

    #[test]
    fn test_zero_limit_accepts_semidefinite() {
        let limit = ConditioningLimit::new(0.0_f32);
        assert_eq!(limit.classify(0.0), Conditioning::Acceptable);
        assert_eq!(limit.classify(-1.0), Conditioning::Indefinite);
    }

    #[test]
    #[should_panic]
    fn test_negative_limit_panics() {
        let _ = ConditioningLimit::new(-1e-3_f64);
    }

    #[test]
    fn test_try_new_rejects_invalid_limits() {
        assert_eq!(ConditioningLimit::try_new(1e-6_f64).unwrap().limit(), 1e-6);
        assert_eq!(ConditioningLimit::try_new(0.0_f64).unwrap().limit(), 0.0);
        for invalid in [-1e-3_f64, f64::NAN, f64::INFINITY] {
            assert_eq!(
                ConditioningLimit::try_new(invalid),
                Err(FilterError::Logic(INVALID_LIMIT))
            );
        }
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_deserialize_validates_limit() {
        let json = serde_json::to_string(&ConditioningLimit::new(0.5_f64)).unwrap();
        let limit: ConditioningLimit<f64> = serde_json::from_str(&json).unwrap();
        assert_eq!(limit.limit(), 0.5);

        let negative = serde_json::from_str::<ConditioningLimit<f64>>(r#"{"limit_pd":-1.0}"#);
        assert!(negative.is_err());
    }
}
