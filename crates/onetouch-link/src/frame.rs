//! Pack/unpack and validate a single wire frame. Pure aside from the
//! caller-provided buffer, exactly as spec §4.1 requires.

use crate::crc::ccitt_crc16;
use crate::error::LinkError;

pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;

/// Largest payload the wire format allows.
pub const MAX_MSG_LEN: usize = 34;

/// Smallest possible frame: STX, LEN, LINK, ETX, CRC_LO, CRC_HI.
pub const LEN_MIN: u8 = 6;

/// Largest possible frame: `LEN_MIN` plus a full payload.
pub const LEN_MAX: u8 = LEN_MIN + MAX_MSG_LEN as u8;

/// Size of buffer callers must provide to `pack`/`rx_frame`.
pub const MAX_FRAME_LEN: usize = LEN_MAX as usize;

mod bits {
    pub const S: u8 = 1 << 0;
    pub const E: u8 = 1 << 1;
    pub const ACK: u8 = 1 << 2;
    pub const DISC: u8 = 1 << 3;
    pub const MORE: u8 = 1 << 4;
    pub const RESERVED_MASK: u8 = 0b1110_0000;
}

/// The subset of the LINK byte the core chooses when generating a
/// frame. `E` and `S` are not part of this: they always come from the
/// link's own sequence state, not from the call site (mirrors the
/// original `pack_packet`, which ignores the `e`/`s` fields of its
/// `link_meta_t` argument and reads `link->e`/`link->s` directly).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PackMeta {
    pub ack: bool,
    pub disc: bool,
}

/// The full LINK byte as decoded from a received frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinkMeta {
    pub ack: bool,
    pub disc: bool,
    pub e: bool,
    pub s: bool,
    pub more: bool,
}

/// An opaque payload of 0..=34 bytes, the only thing the link ever
/// hands to or receives from its caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Message {
    len: u8,
    data: [u8; MAX_MSG_LEN],
}

impl Message {
    pub const EMPTY: Message = Message {
        len: 0,
        data: [0; MAX_MSG_LEN],
    };

    /// Panics if `bytes` is longer than `MAX_MSG_LEN`; command layers
    /// build their requests from fixed, known-short byte strings, so
    /// this is a programmer error rather than a runtime condition.
    pub fn from_slice(bytes: &[u8]) -> Self {
        assert!(bytes.len() <= MAX_MSG_LEN, "payload exceeds 34 bytes");
        let mut data = [0u8; MAX_MSG_LEN];
        data[..bytes.len()].copy_from_slice(bytes);
        Message {
            len: bytes.len() as u8,
            data,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for Message {
    fn default() -> Self {
        Message::EMPTY
    }
}

/// Writes a frame into `buf` and returns its total length. `e`/`s` are
/// the link's own sequence bits (not the peer's). Panics if
/// `payload.len() > MAX_MSG_LEN` or `buf` is too small, both of which
/// are programmer errors internal to this crate.
pub fn pack(e: bool, s: bool, meta: PackMeta, payload: &[u8], buf: &mut [u8]) -> usize {
    assert!(payload.len() <= MAX_MSG_LEN);
    let total = LEN_MIN as usize + payload.len();
    assert!(buf.len() >= total);

    buf[0] = STX;
    buf[1] = total as u8;
    buf[2] = ((meta.disc as u8) << 3) | ((meta.ack as u8) << 2) | ((e as u8) << 1) | (s as u8);
    buf[3..3 + payload.len()].copy_from_slice(payload);
    buf[total - 3] = ETX;

    let crc = ccitt_crc16(&buf[..total - 2]);
    buf[total - 2] = (crc & 0xff) as u8;
    buf[total - 1] = (crc >> 8) as u8;

    debug_assert!(validate(&buf[..total]));
    total
}

/// Structural validation only: STX/ETX, LEN range, reserved bits,
/// CRC. No sequencing check (that needs the link's local `E`, see
/// `unpack`) and no side effects.
pub fn validate(buf: &[u8]) -> bool {
    if buf.len() < LEN_MIN as usize || buf[0] != STX {
        return false;
    }

    let len = buf[1];
    if len < LEN_MIN || len > LEN_MAX || buf.len() < len as usize {
        return false;
    }

    if buf[2] & bits::RESERVED_MASK != 0 {
        return false;
    }

    let etx_offset = len as usize - 3;
    if buf[etx_offset] != ETX {
        return false;
    }

    let crc = ccitt_crc16(&buf[..len as usize - 2]);
    let crc_lo = (crc & 0xff) as u8;
    let crc_hi = (crc >> 8) as u8;
    buf[len as usize - 2] == crc_lo && buf[len as usize - 1] == crc_hi
}

/// Validates `buf`, checks the peer's `S` bit against our local `E`,
/// and decodes the LINK byte and payload. Does not care whether the
/// payload is expected to be empty; see `unpack_expect_empty` for the
/// ACK/reset-ack call sites that do.
pub fn unpack(local_e: bool, buf: &[u8]) -> Result<(LinkMeta, Message), LinkError> {
    if !validate(buf) {
        return Err(LinkError::Corruption);
    }

    let len = buf[1];
    let link = buf[2];
    let meta = LinkMeta {
        ack: link & bits::ACK != 0,
        disc: link & bits::DISC != 0,
        e: link & bits::E != 0,
        s: link & bits::S != 0,
        more: link & bits::MORE != 0,
    };

    if meta.s != local_e {
        return Err(LinkError::SequenceError);
    }

    let payload_len = (len - LEN_MIN) as usize;
    let message = Message::from_slice(&buf[3..3 + payload_len]);
    Ok((meta, message))
}

/// Like `unpack`, but for frames the protocol says must carry an
/// empty payload (bare ACKs, the reset handshake). A non-empty
/// payload here is `UnexpectedData`, per spec §4.1.
pub fn unpack_expect_empty(local_e: bool, buf: &[u8]) -> Result<LinkMeta, LinkError> {
    let (meta, message) = unpack(local_e, buf)?;
    if !message.is_empty() {
        return Err(LinkError::UnexpectedData);
    }
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_metas() -> impl Iterator<Item = (bool, bool, PackMeta)> {
        [false, true].into_iter().flat_map(|e| {
            [false, true].into_iter().flat_map(move |s| {
                [false, true]
                    .into_iter()
                    .flat_map(move |ack| {
                        [false, true]
                            .into_iter()
                            .map(move |disc| (e, s, PackMeta { ack, disc }))
                    })
            })
        })
    }

    #[test]
    fn round_trip_every_payload_length_and_bit_combo() {
        for len in 0..=MAX_MSG_LEN {
            let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
            for (e, s, meta) in all_metas() {
                let mut buf = [0u8; MAX_FRAME_LEN];
                let n = pack(e, s, meta, &payload, &mut buf);
                assert!(validate(&buf[..n]));

                // Decode with the caller's local E set to whatever S
                // we encoded, so the sequence check in `unpack` passes
                // (unpack validates the *peer's* S against *our* E).
                let (decoded_meta, decoded_msg) = unpack(s, &buf[..n]).unwrap();
                assert_eq!(decoded_meta.ack, meta.ack);
                assert_eq!(decoded_meta.disc, meta.disc);
                assert_eq!(decoded_meta.e, e);
                assert_eq!(decoded_meta.s, s);
                assert_eq!(decoded_msg.as_slice(), payload.as_slice());
            }
        }
    }

    #[test]
    fn documented_reset_request_round_trips() {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = pack(false, false, PackMeta { ack: false, disc: true }, &[], &mut buf);
        assert_eq!(&buf[..n], &[0x02, 0x06, 0x08, 0x03, 0xc2, 0x62]);
    }

    #[test]
    fn documented_reset_ack_round_trips() {
        // DISC=1, ACK=1, E=S=0 from the meter's point of view.
        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = pack(false, false, PackMeta { ack: true, disc: true }, &[], &mut buf);
        assert_eq!(&buf[..n], &[0x02, 0x06, 0x0c, 0x03, 0x06, 0xae]);
    }

    #[test]
    fn mutating_any_header_bit_breaks_validation() {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = pack(true, false, PackMeta { ack: true, disc: false }, &[1, 2, 3], &mut buf);
        for byte_index in 0..n - 2 {
            for bit in 0..8u8 {
                let mut mutated = buf;
                mutated[byte_index] ^= 1 << bit;
                assert!(
                    !validate(&mutated[..n]),
                    "flipping byte {byte_index} bit {bit} should have broken validation"
                );
            }
        }
    }

    #[test]
    fn len_out_of_range_fails_validation() {
        let mut buf = [0u8; MAX_FRAME_LEN];
        buf[0] = STX;
        buf[1] = LEN_MIN - 1;
        assert!(!validate(&buf));

        buf[1] = LEN_MAX + 1;
        assert!(!validate(&buf));
    }

    #[test]
    fn reserved_bits_must_be_zero() {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = pack(false, false, PackMeta { ack: false, disc: true }, &[], &mut buf);
        buf[2] |= 0b0010_0000;
        assert!(!validate(&buf[..n]));
    }

    #[test]
    fn sequence_mismatch_is_rejected() {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = pack(false, false, PackMeta { ack: true, disc: true }, &[], &mut buf);
        // Peer's S is 0 (we packed s=false); demand local E=1 instead.
        let err = unpack(true, &buf[..n]).unwrap_err();
        assert!(matches!(err, LinkError::SequenceError));
    }

    #[test]
    fn unexpected_payload_on_ack_is_rejected() {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = pack(false, false, PackMeta { ack: true, disc: false }, &[1, 2], &mut buf);
        let err = unpack_expect_empty(false, &buf[..n]).unwrap_err();
        assert!(matches!(err, LinkError::UnexpectedData));
    }
}
