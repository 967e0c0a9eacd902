//! Lock-free progress cells shared between the worker and the UI thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A fraction in `[0, 1]` written by one thread and polled by another.
///
/// Cloning yields another handle to the same cell.
#[derive(Debug, Clone, Default)]
pub struct ProgressCell {
    bits: Arc<AtomicU64>,
}

impl ProgressCell {
    /// Creates a cell holding `0.0`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a new value, clamped to `[0, 1]`. NaN is stored as `0.0`.
    pub fn set(&self, value: f64) {
        let value = if value.is_nan() {
            0.0
        } else {
            value.clamp(0.0, 1.0)
        };
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Stores `done / total`, or `1.0` when `total` is zero.
    pub fn set_ratio(&self, done: u64, total: u64) {
        if total == 0 {
            self.set(1.0);
        } else {
            self.set(done as f64 / total as f64);
        }
    }

    /// Returns the last stored value.
    #[must_use]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Resets the cell to `0.0`.
    pub fn reset(&self) {
        self.set(0.0);
    }

    /// Marks the cell complete.
    pub fn complete(&self) {
        self.set(1.0);
    }
}
