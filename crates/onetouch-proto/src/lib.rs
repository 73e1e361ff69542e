//! Command/application layer above the link: the per-query request
//! payloads and reply decoders (version, serial number, RTC, record
//! count, individual records). The core link crate treats all of this
//! as opaque bytes; everything here interprets them.
//!
//! None of this is part of the wire protocol's hard engineering — it
//! is the thin, documented layer on top, grounded on the driver's
//! actual request/reply tags where they are attested. Where the
//! historical source is silent (the record-count reply shape, the
//! get-record request), that is called out in this crate's doc
//! comments rather than asserted as fact.

use std::time::Duration;

use onetouch_common::MonotonicClock;
use onetouch_link::{Link, LinkError, Message};

pub mod record;

pub use record::Record;

#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("unexpected reply tag from meter")]
    UnexpectedReplyTag,
}

/// The fixed 4-byte token the serial-number request carries. The
/// source alternates between this and an all-zero variant behind a
/// compile-time switch; the all-zero variant's effect on the meter is
/// undocumented, so this crate always sends the non-zero token.
const SERIAL_TOKEN: [u8; 4] = [0x84, 0x6a, 0xe8, 0x73];

fn version_request() -> Vec<u8> {
    vec![0x05, 0x0d, 0x02]
}

/// Not attested in the retrieved source: `ultraeasy_read_rtc` survives
/// only as a prototype in `ultraeasy.h`, its request/reply body was not
/// retrieved. Reuses the `05 1f`-family opcode the record-count and
/// record-body requests share, with a sub-tag (`0x01`) picked to stay
/// clear of the count (`0x00 0x02`) and record-by-index (`0x02 ..`)
/// sub-tags rather than a verified wire fact.
fn rtc_request() -> Vec<u8> {
    vec![0x05, 0x1f, 0x01, 0x00]
}

fn serial_request() -> Vec<u8> {
    let mut req = vec![0x05, 0x0b, 0x02, 0x00, 0x00, 0x00, 0x00];
    req.extend_from_slice(&SERIAL_TOKEN);
    req.push(0x00);
    req
}

/// The request-by-index form of the record-count query, preferred
/// over the older `05 1f f5 01` variant that also appears in the
/// source history.
fn record_count_request() -> Vec<u8> {
    vec![0x05, 0x1f, 0x00, 0x02]
}

/// Not attested anywhere in the retrieved source: the only
/// `05 1f`-family request documented is the record-count query above.
/// This extends that shape with a `0x02` sub-tag and a record index, on
/// the working assumption that record retrieval reuses the same opcode
/// family. Treat this request encoding as a best-effort reconstruction,
/// not a verified wire fact.
fn record_request(index: u16) -> Vec<u8> {
    let [hi, lo] = index.to_be_bytes();
    vec![0x05, 0x1f, 0x02, hi, lo]
}

fn strip_tag<'a>(reply: &'a Message, tag: &[u8]) -> Result<&'a [u8], ProtoError> {
    let bytes = reply.as_slice();
    if bytes.len() < tag.len() || &bytes[..tag.len()] != tag {
        return Err(ProtoError::UnexpectedReplyTag);
    }
    Ok(&bytes[tag.len()..])
}

/// A meter connection: a reset link plus the per-query request/reply
/// translation. `path == "facade"` selects the in-memory simulator
/// instead of a real serial device, mirroring the core's own open().
pub enum Meter {
    Serial(Link<onetouch_serial::SerialTransport, MonotonicClock>),
    Facade(Link<onetouch_facade::Facade, MonotonicClock>),
}

impl Meter {
    pub fn open(path: &str) -> Result<Self, ProtoError> {
        if path == "facade" {
            let link = Link::open(onetouch_facade::Facade::new(), MonotonicClock::new())?;
            Ok(Meter::Facade(link))
        } else {
            let transport = onetouch_serial::SerialTransport::open(path).map_err(|e| {
                ProtoError::Link(LinkError::Io(e))
            })?;
            let link = Link::open(transport, MonotonicClock::new())?;
            Ok(Meter::Serial(link))
        }
    }

    fn command(&mut self, request: &[u8]) -> Result<Message, ProtoError> {
        let reply = match self {
            Meter::Serial(link) => link.command(request)?,
            Meter::Facade(link) => link.command(request)?,
        };
        Ok(reply)
    }

    pub fn read_version(&mut self) -> Result<String, ProtoError> {
        let reply = self.command(&version_request())?;
        let tail = strip_tag(&reply, &[0x05, 0x06, 0x11])?;
        Ok(String::from_utf8_lossy(tail).into_owned())
    }

    pub fn read_serial(&mut self) -> Result<String, ProtoError> {
        let reply = self.command(&serial_request())?;
        let tail = strip_tag(&reply, &[0x05, 0x06])?;
        Ok(String::from_utf8_lossy(tail).into_owned())
    }

    /// Returns the raw record-count reply payload. The source does
    /// not document how to decode a count out of it (the matching C
    /// function discards the reply entirely), so this stops short of
    /// claiming a parsed integer.
    pub fn read_record_count_raw(&mut self) -> Result<Message, ProtoError> {
        self.command(&record_count_request())
    }

    /// Reads the meter's real-time clock, decoding it the same way a
    /// stored record's date word is decoded (seconds since the meter's
    /// 2000-01-01 epoch). `ultraeasy_read_rtc`'s own body was not
    /// retrieved, so this shares `record::decode`'s date arithmetic on
    /// the working assumption that the RTC reply uses the same epoch.
    pub fn read_rtc(&mut self) -> Result<std::time::SystemTime, ProtoError> {
        let reply = self.command(&rtc_request())?;
        let bytes = reply.as_slice();
        if bytes.len() < 4 {
            return Err(ProtoError::UnexpectedReplyTag);
        }
        let tail = &bytes[bytes.len() - 4..];
        let raw = u32::from_le_bytes(tail.try_into().unwrap());
        Ok(record::epoch_plus_seconds(raw))
    }

    pub fn read_record(&mut self, index: u16) -> Result<Record, ProtoError> {
        let reply = self.command(&record_request(index))?;
        record::decode(reply.as_slice())
    }
}

/// Estimated on-wire + processing latency budget for a single query,
/// useful to callers that want to bound total elapsed time across a
/// batch of commands.
pub fn command_latency_budget() -> Duration {
    onetouch_link::timing::LAYER_TIMEOUT + onetouch_link::timing::DATA_TIMEOUT * 34
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_version_and_serial_from_the_facade() {
        let mut meter = Meter::open("facade").unwrap();
        assert_eq!(meter.read_version().unwrap(), "P02.00.0025/05/07");
        assert_eq!(meter.read_serial().unwrap(), "C176SA0O0");
    }

    #[test]
    fn unrecognised_request_surfaces_as_link_error() {
        let mut meter = Meter::open("facade").unwrap();
        let err = meter.read_record_count_raw().unwrap_err();
        assert!(matches!(err, ProtoError::Link(LinkError::LinkLost)));
    }
}
