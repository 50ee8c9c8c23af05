//! Imputation module for handling missing values.
//!
//! Only distance-based neighbor averaging is provided; see [`KNNImputer`].

mod knn;

pub use knn::KNNImputer;
