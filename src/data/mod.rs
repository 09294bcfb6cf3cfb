//! Data loading, splitting and built-in sample tables
//!
//! Every path into a [`LabeledDataset`] encodes rows through a
//! [`FeatureSchema`](crate::schema::FeatureSchema), the same one used at
//! inference time.

pub mod csv;
pub mod dataset;
pub mod sample;
pub mod split;

pub use self::csv::LoadOptions;
pub use self::dataset::LabeledDataset;
pub use self::split::{stratified_split, Split, SplitConfig};
