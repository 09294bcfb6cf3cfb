//! SVM solver implementations
//!
//! This module implements the Sequential Minimal Optimization (SMO) algorithm
//! with Platt's working-pair heuristics and bias update.

pub mod smo;

pub use self::smo::*;
