//! Kernel functions for the margin classifier

pub mod linear;
pub mod traits;

pub use self::linear::*;
pub use self::traits::*;
