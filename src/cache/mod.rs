//! Caching layers
//!
//! - [`KernelCache`]: LRU cache of kernel rows used inside the SMO solver
//! - [`ModelCache`]: per-key cache of trained models backed by artifacts

pub mod kernel;
pub mod model;

pub use self::kernel::{CacheStats, KernelCache};
pub use self::model::{Acquired, CacheKey, CacheState, ModelCache, ModelOrigin, ModelTrainer};
