use std::io;

/// Coarse classification every inner link operation attaches to its
/// failures, per the protocol's tri-state discipline: fatal errors
/// abort immediately, recoverable ones are papered over by the
/// reset/command retry loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Fatal,
    Recoverable,
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("I/O error talking to the meter: {0}")]
    Io(#[from] io::Error),

    #[error("oversized frame announced (len={0})")]
    OversizedFrame(u8),

    #[error("timed out waiting for the meter")]
    Timeout,

    #[error("corrupt frame received from meter")]
    Corruption,

    #[error("frame sequence number did not match")]
    SequenceError,

    #[error("stray byte 0x{0:02x} where STX was expected")]
    StrayByte(u8),

    #[error("unexpected payload on a frame that should have been empty")]
    UnexpectedData,

    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    #[error("link lost: retries exhausted")]
    LinkLost,
}

impl LinkError {
    /// Classifies this error per spec: fatal errors propagate
    /// immediately and are never retried; everything else is
    /// recoverable and is handed to the reset/command retry loop.
    pub fn severity(&self) -> Severity {
        match self {
            LinkError::Io(_) | LinkError::OversizedFrame(_) => Severity::Fatal,
            LinkError::Timeout
            | LinkError::Corruption
            | LinkError::SequenceError
            | LinkError::StrayByte(_)
            | LinkError::UnexpectedData
            | LinkError::ProtocolViolation(_) => Severity::Recoverable,
            // LinkLost is a terminal, surfaced-only variant; it is never
            // produced by an inner operation, so its severity is moot.
            LinkError::LinkLost => Severity::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

/// The result of a single attempt at a reset or command transaction:
/// the tri-state discipline from spec §4.6/§9, made explicit as a type
/// rather than collapsed into a single `Result` channel, so a fatal
/// error can never accidentally be retried.
pub(crate) enum Attempt<T> {
    Ok(T),
    Recoverable(LinkError),
    Fatal(LinkError),
}

impl<T> Attempt<T> {
    pub(crate) fn from_error(e: LinkError) -> Self {
        match e.severity() {
            Severity::Fatal => Attempt::Fatal(e),
            Severity::Recoverable => Attempt::Recoverable(e),
        }
    }
}
