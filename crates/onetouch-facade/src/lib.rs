//! An in-memory stand-in for the byte transport (spec §6), used for
//! deterministic testing in place of a real meter. Unlike the
//! original driver's simulator, this one honors the link's E/S bits
//! instead of replaying fixed full-frame byte sequences, so no
//! eager-read workaround is needed at open time.

use std::collections::VecDeque;
use std::time::Duration;

use onetouch_link::frame::{self, PackMeta, MAX_FRAME_LEN};
use onetouch_link::transport::ReadByteError;
use onetouch_link::Transport;

const LINK_DISC: u8 = 1 << 3;
const LINK_ACK: u8 = 1 << 2;
const LINK_E: u8 = 1 << 1;
const LINK_S: u8 = 1 << 0;

/// A recognized request payload and the reply payload the meter would
/// send for it. Request/response bytes taken from the documented
/// version and serial-number exchanges.
pub struct Entry {
    pub request_payload: Vec<u8>,
    pub reply_payload: Vec<u8>,
}

pub struct Facade {
    entries: Vec<Entry>,
    pending: VecDeque<u8>,
}

impl Facade {
    pub fn new() -> Self {
        Facade {
            entries: default_entries(),
            pending: VecDeque::new(),
        }
    }

    pub fn with_entries(entries: Vec<Entry>) -> Self {
        Facade {
            entries,
            pending: VecDeque::new(),
        }
    }

    fn lookup(&self, payload: &[u8]) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| e.request_payload == payload)
            .map(|e| e.reply_payload.as_slice())
    }

    fn queue_frame(&mut self, e: bool, s: bool, meta: PackMeta, payload: &[u8]) {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = frame::pack(e, s, meta, payload, &mut buf);
        self.pending.extend(&buf[..n]);
    }

    fn handle_outbound(&mut self, buf: &[u8]) {
        if !frame::validate(buf) {
            log::debug!("facade: dropping malformed frame from PC");
            return;
        }

        let len = buf[1] as usize;
        let link = buf[2];
        let disc = link & LINK_DISC != 0;
        let ack = link & LINK_ACK != 0;
        let pc_e = link & LINK_E != 0;
        let pc_s = link & LINK_S != 0;
        let payload = &buf[3..len - 3];

        if disc && !ack {
            log::debug!("facade: replying to reset");
            self.queue_frame(
                false,
                false,
                PackMeta {
                    ack: true,
                    disc: true,
                },
                &[],
            );
            return;
        }

        if ack {
            log::debug!("facade: command's final ack, nothing to send");
            return;
        }

        match self.lookup(payload) {
            Some(reply) => {
                let reply = reply.to_vec();
                let meter_e = !pc_s;
                log::debug!("facade: recognised request, replying");
                self.queue_frame(
                    meter_e,
                    pc_e,
                    PackMeta {
                        ack: true,
                        disc: false,
                    },
                    &[],
                );
                self.queue_frame(
                    meter_e,
                    pc_e,
                    PackMeta {
                        ack: false,
                        disc: false,
                    },
                    &reply,
                );
            }
            None => {
                log::debug!("facade: unrecognised request, no reply queued");
            }
        }
    }
}

impl Default for Facade {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for Facade {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.handle_outbound(buf);
        Ok(())
    }

    fn read_byte(&mut self, _timeout: Duration) -> Result<u8, ReadByteError> {
        self.pending.pop_front().ok_or(ReadByteError::Timeout)
    }

    fn poll_idle(&mut self, timeout: Duration) {
        std::thread::sleep(timeout);
    }

    fn drain(&mut self) {
        self.pending.clear();
    }
}

fn default_entries() -> Vec<Entry> {
    vec![
        Entry {
            request_payload: vec![0x05, 0x0d, 0x02],
            reply_payload: vec![
                0x05, 0x06, 0x11, 0x50, 0x30, 0x32, 0x2e, 0x30, 0x30, 0x2e, 0x30, 0x30, 0x32,
                0x35, 0x2f, 0x30, 0x35, 0x2f, 0x30, 0x37,
            ],
        },
        Entry {
            request_payload: vec![
                0x05, 0x0b, 0x02, 0x00, 0x00, 0x00, 0x00, 0x84, 0x6a, 0xe8, 0x73, 0x00,
            ],
            reply_payload: vec![
                0x05, 0x06, 0x43, 0x31, 0x37, 0x36, 0x53, 0x41, 0x30, 0x4f, 0x30,
            ],
        },
    ]
}
