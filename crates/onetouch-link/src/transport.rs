//! The byte transport boundary (spec §4.2): a bidirectional octet
//! stream with blocking read, blocking write, and poll-with-timeout.
//! Implemented for a real serial device by `onetouch-serial` and for
//! a scripted simulator by `onetouch-facade`.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ReadByteError {
    #[error("timed out waiting for a byte")]
    Timeout,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait Transport {
    /// Writes exactly `buf.len()` bytes, retrying on transient
    /// "would block" conditions and failing on anything else.
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()>;

    /// Waits up to `timeout` for one byte. Must distinguish a timeout
    /// from a genuine I/O error.
    fn read_byte(&mut self, timeout: Duration) -> Result<u8, ReadByteError>;

    /// Suspends for `timeout` without reading. Used for guard
    /// periods.
    fn poll_idle(&mut self, timeout: Duration);

    /// Non-blocking: reads and discards all bytes currently
    /// available. Used before a flushing reset.
    fn drain(&mut self);
}
