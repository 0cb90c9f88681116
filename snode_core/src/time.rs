//! Network adjusted time.
//!
//! The offset between the local clock and the service node network is
//! learned opportunistically from successful responses. Signed request
//! timestamps must use the adjusted clock or they get rejected once the
//! local clock drifts.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static CLOCK_OFFSET_MS: AtomicI64 = AtomicI64::new(0);

/// Milliseconds since Unix epoch by the local clock.
pub fn system_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Current time is earlier than Unix epoch")
        .as_millis() as u64
}

/// The current clock offset in milliseconds. Positive means the network is
/// ahead of us.
pub fn clock_offset_ms() -> i64 {
    CLOCK_OFFSET_MS.load(Ordering::Relaxed)
}

/// Record a new clock offset. Concurrent updates race; last writer wins.
pub fn set_clock_offset_ms(offset: i64) {
    CLOCK_OFFSET_MS.store(offset, Ordering::Relaxed);
}

/// Milliseconds since Unix epoch, adjusted by the learned offset. This is
/// the timestamp that goes into signed request parameters.
pub fn now_with_offset_ms() -> u64 {
    let now = system_time_ms() as i64 + clock_offset_ms();
    now.max(0) as u64
}
