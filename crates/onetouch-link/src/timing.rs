//! The protocol's fixed timing budget (spec §4.3, §5, glossary).

use std::time::Duration;

/// Minimum quiet interval between the end of one outbound frame and
/// the start of the next.
pub const GUARD_PERIOD: Duration = Duration::from_millis(100);

/// Maximum wait for the first byte of an inbound frame.
pub const LAYER_TIMEOUT: Duration = Duration::from_millis(500);

/// Maximum wait for each subsequent byte within a frame already in
/// progress.
pub const DATA_TIMEOUT: Duration = Duration::from_millis(10);

/// Reset attempts before giving up with `LinkLost`.
pub const RESET_RETRIES: u32 = 4;

/// Command attempts before giving up with `LinkLost`.
pub const COMMAND_RETRIES: u32 = 3;

/// Estimated on-wire duration of a frame of `len` bytes at 9600 8N1,
/// rounded up to the millisecond. The kernel may buffer bytes the
/// meter has not yet clocked out, so this is added to the "last
/// packet" timestamp after a transmit rather than relied on to have
/// already elapsed.
pub fn estimated_wire_time(len: usize) -> Duration {
    Duration::from_millis(len as u64)
}
