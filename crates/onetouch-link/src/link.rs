//! The stop-and-wait state machine and the public open/reset/command/
//! close surface built on top of it (spec §4.4/§4.5).

use onetouch_common::Clock;

use crate::error::{Attempt, LinkError};
use crate::frame::{self, Message, PackMeta, MAX_FRAME_LEN};
use crate::state::FrameIo;
use crate::timing::{COMMAND_RETRIES, GUARD_PERIOD, RESET_RETRIES};
use crate::transport::Transport;

/// One link to the meter: owns the transport, the reusable frame
/// buffer (implicitly, via `FrameIo`), and the two sequence bits. Not
/// `Clone`, not `Sync` — a caller that needs concurrency owns one
/// `Link` per thread, per spec §5.
pub struct Link<T, C> {
    io: FrameIo<T, C>,
    e: bool,
    s: bool,
}

impl<T: Transport, C: Clock> Link<T, C> {
    /// Opens a link over an already-configured transport and performs
    /// the initial reset. Whatever device configuration the transport
    /// needs (termios, baud rate, ...) is the transport's own concern;
    /// this crate only ever speaks bytes.
    pub fn open(transport: T, clock: C) -> Result<Self, LinkError> {
        let mut link = Link {
            io: FrameIo::new(transport, clock),
            e: false,
            s: false,
        };
        link.reset()?;
        Ok(link)
    }

    /// Releases the underlying transport. Consuming `self` makes this
    /// naturally idempotent: a closed link cannot be referenced again.
    pub fn close(self) {}

    /// Performs the reset handshake, up to `RESET_RETRIES` times. On
    /// the first attempt stale bytes are left alone; later attempts
    /// wait out twice the guard period and then drain, giving any
    /// in-flight bytes from a confused peer a chance to arrive before
    /// being discarded.
    pub fn reset(&mut self) -> Result<(), LinkError> {
        for attempt in 0..RESET_RETRIES {
            if attempt > 0 {
                self.io.poll_idle(GUARD_PERIOD * 2);
                self.io.drain();
            }

            match self.attempt_reset() {
                Attempt::Ok(()) => {
                    self.e = false;
                    self.s = false;
                    return Ok(());
                }
                Attempt::Fatal(e) => return Err(e),
                Attempt::Recoverable(e) => {
                    log::warn!("reset attempt {} failed: {e}", attempt + 1);
                }
            }
        }

        log::error!("reset exhausted {RESET_RETRIES} attempts");
        Err(LinkError::LinkLost)
    }

    /// Runs a full command transaction, up to `COMMAND_RETRIES` times,
    /// resetting the link between recoverable failures. Requires the
    /// link to already be past its initial reset.
    pub fn command(&mut self, request: &[u8]) -> Result<Message, LinkError> {
        for attempt in 0..COMMAND_RETRIES {
            match self.attempt_command(request) {
                Attempt::Ok(reply) => return Ok(reply),
                Attempt::Fatal(e) => return Err(e),
                Attempt::Recoverable(e) => {
                    log::warn!("command attempt {} failed: {e}", attempt + 1);
                    if attempt + 1 < COMMAND_RETRIES {
                        self.reset()?;
                    }
                }
            }
        }

        log::error!("command exhausted {COMMAND_RETRIES} attempts");
        Err(LinkError::LinkLost)
    }

    fn attempt_reset(&mut self) -> Attempt<()> {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = frame::pack(
            false,
            false,
            PackMeta {
                ack: false,
                disc: true,
            },
            &[],
            &mut buf,
        );
        if let Err(e) = self.io.tx_frame(&buf[..n]) {
            return Attempt::from_error(e);
        }

        let mut rx = [0u8; MAX_FRAME_LEN];
        let n = match self.io.rx_frame(&mut rx) {
            Ok(n) => n,
            Err(e) => return Attempt::from_error(e),
        };

        match frame::unpack_expect_empty(false, &rx[..n]) {
            Ok(meta) if meta.disc && meta.ack => Attempt::Ok(()),
            Ok(_) => Attempt::Recoverable(LinkError::ProtocolViolation(
                "reset reply missing DISC/ACK",
            )),
            Err(e) => Attempt::from_error(e),
        }
    }

    fn attempt_command(&mut self, request: &[u8]) -> Attempt<Message> {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = frame::pack(
            self.e,
            self.s,
            PackMeta {
                ack: false,
                disc: false,
            },
            request,
            &mut buf,
        );
        if let Err(e) = self.io.tx_frame(&buf[..n]) {
            return Attempt::from_error(e);
        }

        let mut rx = [0u8; MAX_FRAME_LEN];
        let n = match self.io.rx_frame(&mut rx) {
            Ok(n) => n,
            Err(e) => return Attempt::from_error(e),
        };
        let ack_meta = match frame::unpack_expect_empty(self.e, &rx[..n]) {
            Ok(m) => m,
            Err(e) => return Attempt::from_error(e),
        };
        if ack_meta.disc {
            return Attempt::Recoverable(LinkError::ProtocolViolation(
                "peer disconnected mid-command",
            ));
        }
        if !ack_meta.ack {
            return Attempt::Recoverable(LinkError::ProtocolViolation(
                "expected ACK after command request",
            ));
        }

        self.s = !self.s;

        let n = match self.io.rx_frame(&mut rx) {
            Ok(n) => n,
            Err(e) => return Attempt::from_error(e),
        };
        let (reply_meta, reply) = match frame::unpack(self.e, &rx[..n]) {
            Ok(v) => v,
            Err(e) => return Attempt::from_error(e),
        };
        if reply_meta.ack || reply_meta.disc {
            return Attempt::Recoverable(LinkError::ProtocolViolation(
                "reply frame carried ACK or DISC",
            ));
        }
        if reply.is_empty() {
            return Attempt::Recoverable(LinkError::ProtocolViolation(
                "reply frame carried no payload",
            ));
        }

        self.e = !reply_meta.s;

        let n = frame::pack(
            self.e,
            self.s,
            PackMeta {
                ack: true,
                disc: false,
            },
            &[],
            &mut buf,
        );
        if let Err(e) = self.io.tx_frame(&buf[..n]) {
            return Attempt::from_error(e);
        }

        Attempt::Ok(reply)
    }
}
