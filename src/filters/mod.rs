//! Factorized covariance filters
//!
//! - [`ud::UdFilter`]: UdU' factorized Kalman filter (Bierman-Thornton)

pub mod ud;
