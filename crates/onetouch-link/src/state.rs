//! Frame I/O with the guard period, layer timeout and data timeout
//! applied (spec §4.3). Everything here is still transport-agnostic;
//! it is the layer between the pure frame codec and the link's
//! sequencing state machine.

use onetouch_common::{Clock, Instant};

use crate::error::LinkError;
use crate::frame::{self, LEN_MAX, LEN_MIN, MAX_FRAME_LEN, STX};
use crate::timing::{estimated_wire_time, DATA_TIMEOUT, GUARD_PERIOD, LAYER_TIMEOUT};
use crate::transport::{ReadByteError, Transport};

pub(crate) struct FrameIo<T, C> {
    transport: T,
    clock: C,
    last_packet: Instant,
}

impl<T: Transport, C: Clock> FrameIo<T, C> {
    pub(crate) fn new(transport: T, clock: C) -> Self {
        let last_packet = clock.now();
        FrameIo {
            transport,
            clock,
            last_packet,
        }
    }

    pub(crate) fn drain(&mut self) {
        self.transport.drain();
    }

    pub(crate) fn poll_idle(&mut self, d: std::time::Duration) {
        self.transport.poll_idle(d);
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    /// Honors the 100ms inter-frame guard period, writes `buf`, then
    /// records the last-packet time as now plus the frame's
    /// estimated on-wire duration.
    pub(crate) fn tx_frame(&mut self, buf: &[u8]) -> Result<(), LinkError> {
        debug_assert!(frame::validate(buf));

        loop {
            let now = self.clock.now();
            // Signed: `last_packet` legitimately sits in the future
            // right after a transmit (see the wire-time note below),
            // so this delta must not saturate at zero.
            let delta_ms = now.signed_delta(self.last_packet) / 1_000_000;
            if delta_ms >= GUARD_PERIOD.as_millis() as i64 {
                break;
            }
            let remaining_ms = (GUARD_PERIOD.as_millis() as i64 - delta_ms).max(0) as u64;
            self.transport
                .poll_idle(std::time::Duration::from_millis(remaining_ms));
        }

        log::debug!(
            "PC to meter: {}",
            onetouch_common::hexdump::hexdump(buf)
        );

        self.transport.write_all(buf)?;

        let wire_time = estimated_wire_time(buf.len());
        self.last_packet = self.clock.now().plus(wire_time);
        Ok(())
    }

    /// Reads one frame, honoring the 500ms layer timeout for the
    /// first byte and the 10ms data timeout for every subsequent one.
    /// Returns the number of bytes written into `buf`.
    pub(crate) fn rx_frame(&mut self, buf: &mut [u8; MAX_FRAME_LEN]) -> Result<usize, LinkError> {
        let started = self.clock.now();

        let b0 = match self.transport.read_byte(LAYER_TIMEOUT) {
            Ok(b) => b,
            Err(ReadByteError::Timeout) => {
                log::error!(
                    "Timeout waiting for meter ({}ms)",
                    self.clock.now().signed_delta(started) / 1_000_000
                );
                return Err(LinkError::Timeout);
            }
            Err(ReadByteError::Io(e)) => return Err(LinkError::Io(e)),
        };

        if b0 != STX {
            log::error!("Received 0x{b0:02x} when expecting STX marker");
            return Err(LinkError::StrayByte(b0));
        }
        buf[0] = b0;

        let mut remaining = MAX_FRAME_LEN;
        let mut offset = 1usize;
        while offset < remaining {
            let b = match self.transport.read_byte(DATA_TIMEOUT) {
                Ok(b) => b,
                Err(ReadByteError::Timeout) => {
                    log::error!("Timeout receiving packet from meter");
                    return Err(LinkError::Timeout);
                }
                Err(ReadByteError::Io(e)) => return Err(LinkError::Io(e)),
            };
            buf[offset] = b;

            if offset == 1 {
                if b > LEN_MAX {
                    log::error!("Received oversized packet (len={b})");
                    return Err(LinkError::OversizedFrame(b));
                }
                if b < LEN_MIN {
                    log::error!("Received undersized packet (len={b})");
                    return Err(LinkError::Corruption);
                }
                remaining = b as usize;
            }

            offset += 1;
        }

        log::debug!(
            "Meter to PC: {}",
            onetouch_common::hexdump::hexdump(&buf[..offset])
        );

        self.last_packet = self.clock.now();
        Ok(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Clone)]
    struct TestClock {
        nanos: Rc<RefCell<u64>>,
    }

    impl TestClock {
        fn new() -> Self {
            TestClock {
                nanos: Rc::new(RefCell::new(0)),
            }
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            Instant::from_nanos(*self.nanos.borrow())
        }
    }

    struct RecordingTransport {
        clock: TestClock,
        writes_at: Vec<Instant>,
        inbound: VecDeque<u8>,
    }

    impl Transport for RecordingTransport {
        fn write_all(&mut self, _buf: &[u8]) -> std::io::Result<()> {
            self.writes_at.push(self.clock.now());
            Ok(())
        }

        fn read_byte(&mut self, _timeout: std::time::Duration) -> Result<u8, ReadByteError> {
            self.inbound
                .pop_front()
                .ok_or(ReadByteError::Timeout)
        }

        fn poll_idle(&mut self, timeout: std::time::Duration) {
            *self.clock.nanos.borrow_mut() += timeout.as_nanos() as u64;
        }

        fn drain(&mut self) {
            self.inbound.clear();
        }
    }

    #[test]
    fn back_to_back_transmits_respect_the_guard_period() {
        let clock = TestClock::new();
        let transport = RecordingTransport {
            clock: clock.clone(),
            writes_at: Vec::new(),
            inbound: VecDeque::new(),
        };
        let mut io = FrameIo::new(transport, clock);

        let frame = {
            let mut buf = [0u8; MAX_FRAME_LEN];
            let n = crate::frame::pack(
                false,
                false,
                crate::frame::PackMeta {
                    ack: false,
                    disc: true,
                },
                &[],
                &mut buf,
            );
            buf[..n].to_vec()
        };

        io.tx_frame(&frame).unwrap();
        io.tx_frame(&frame).unwrap();

        let writes = &io.transport().writes_at;
        assert_eq!(writes.len(), 2);
        assert!(writes[1].signed_delta(writes[0]) >= GUARD_PERIOD.as_nanos() as i64);
    }

    #[test]
    fn oversized_len_aborts_without_reading_the_rest() {
        let clock = TestClock::new();
        let mut inbound = VecDeque::new();
        inbound.push_back(STX);
        inbound.push_back(0xff);
        let transport = RecordingTransport {
            clock: clock.clone(),
            writes_at: Vec::new(),
            inbound,
        };
        let mut io = FrameIo::new(transport, clock);

        let mut buf = [0u8; MAX_FRAME_LEN];
        let err = io.rx_frame(&mut buf).unwrap_err();
        assert!(matches!(err, LinkError::OversizedFrame(0xff)));
        assert!(io.transport().inbound.is_empty());
    }
}
