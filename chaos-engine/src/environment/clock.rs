//! Skewable wall clock.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime};

/// Wall clock with an adjustable offset.
///
/// Skews are applied as signed deltas so overlapping skews unwind correctly
/// in any order.
#[derive(Debug, Default)]
pub struct SkewedClock {
    offset_ms: AtomicI64,
}

impl SkewedClock {
    /// Clock with no offset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Perceived current time.
    pub fn now(&self) -> SystemTime {
        let offset = self.offset_ms();
        let magnitude = Duration::from_millis(offset.unsigned_abs());
        let real = SystemTime::now();
        if offset >= 0 {
            real + magnitude
        } else {
            real.checked_sub(magnitude).unwrap_or(SystemTime::UNIX_EPOCH)
        }
    }

    /// Current offset in milliseconds (positive = ahead).
    pub fn offset_ms(&self) -> i64 {
        self.offset_ms.load(Ordering::SeqCst)
    }

    /// Move perceived time forward by `by`.
    pub fn shift_forward(&self, by: Duration) {
        let ms = clamp_ms(by);
        let total = self.offset_ms.fetch_add(ms, Ordering::SeqCst) + ms;
        tracing::info!(by = ?by, offset_ms = total, "Clock skewed");
    }

    /// Undo a forward shift of `by`.
    pub fn shift_back(&self, by: Duration) {
        let ms = clamp_ms(by);
        let total = self.offset_ms.fetch_sub(ms, Ordering::SeqCst) - ms;
        tracing::info!(by = ?by, offset_ms = total, "Clock skew removed");
    }
}

fn clamp_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX / 2)
}
