//! Monotonic millisecond clock on the ESP-IDF high resolution timer.

use crate::traits::Clock;

/// Milliseconds since the clock was created.
///
/// `esp_timer_get_time()` counts microseconds since boot; the node only
/// needs differences, so time starts at zero when the clock is built.
///
/// ```ignore
/// let clock = Esp32Clock::new();
/// node.tick(clock.now_ms());
/// ```
pub struct Esp32Clock {
    origin_us: i64,
}

impl Esp32Clock {
    /// Start a clock at zero.
    pub fn new() -> Self {
        Self {
            origin_us: timer_us(),
        }
    }
}

impl Default for Esp32Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for Esp32Clock {
    #[inline]
    fn now_ms(&self) -> u64 {
        (timer_us().saturating_sub(self.origin_us) / 1000) as u64
    }
}

fn timer_us() -> i64 {
    // Safe: plain read of the monotonic system timer
    unsafe { esp_idf_hal::sys::esp_timer_get_time() }
}
