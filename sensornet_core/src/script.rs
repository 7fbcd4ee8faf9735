//! The computation a worker runs against one location's pooled values.

use std::sync::Arc;

/// An aggregation over the values collected for one location.
///
/// The core never inspects a script; it only calls `run` with the
/// neighbours' values (in supervisor order) followed by the owner's value.
/// `values` is never empty.
pub trait Script: Send + Sync {
    /// Computes the updated value for the location.
    fn run(&self, values: &[f64]) -> f64;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "script"
    }
}

impl<F> Script for F
where
    F: Fn(&[f64]) -> f64 + Send + Sync,
{
    fn run(&self, values: &[f64]) -> f64 {
        self(values)
    }
}

/// Shared handle to a script, as stored in a device's inbox.
pub type ScriptRef = Arc<dyn Script>;
