//! Core types: explicit Kalman state and UdU' factor primitives

pub mod state;
pub mod udu;
