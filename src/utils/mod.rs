//! Utility functions and metrics.

pub mod metrics;

pub use metrics::{argmax, Profiler};
