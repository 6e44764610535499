//! Transport clock shared between the render tap and the control domain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Lock-free transport position in seconds.
///
/// Written by the render-domain position feed, read by anyone.
#[derive(Debug, Clone, Default)]
pub struct TransportClock {
    bits: Arc<AtomicU64>,
}

impl TransportClock {
    pub fn new(seconds: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(seconds.to_bits())),
        }
    }

    /// Publish a new position.
    pub fn publish(&self, seconds: f64) {
        self.bits.store(seconds.to_bits(), Ordering::Release);
    }

    /// Current position.
    pub fn seconds(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}
