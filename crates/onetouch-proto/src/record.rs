//! Decodes a stored-reading record, matching `ultraeasy_record_t`'s
//! raw `{ date: u32, reading: u32 }` pair plus its derived fields.
//!
//! The wire's tag length preceding these two words is not attested in
//! the retrieved source (only the struct shape survives, in
//! `ultraeasy.h`), so decoding reads the trailing 8 bytes of whatever
//! reply payload it is given rather than assuming a fixed prefix.

use std::time::{Duration, SystemTime};

use crate::ProtoError;

/// The meter's epoch, chosen to match other LifeScan meters of this
/// generation that stamp records as seconds since 2000-01-01T00:00:00Z.
const METER_EPOCH_UNIX_SECONDS: u64 = 946_684_800;

/// The meter's 2000-01-01 epoch plus `raw` seconds, shared by record
/// date decoding and the real-time-clock reply.
pub fn epoch_plus_seconds(raw: u32) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(METER_EPOCH_UNIX_SECONDS) + Duration::from_secs(raw as u64)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record {
    pub raw_date: u32,
    pub raw_reading: u32,
    pub timestamp: SystemTime,
    pub mmol_per_litre: f64,
}

pub fn decode(payload: &[u8]) -> Result<Record, ProtoError> {
    if payload.len() < 8 {
        return Err(ProtoError::UnexpectedReplyTag);
    }

    let tail = &payload[payload.len() - 8..];
    let raw_date = u32::from_le_bytes(tail[0..4].try_into().unwrap());
    let raw_reading = u32::from_le_bytes(tail[4..8].try_into().unwrap());

    let timestamp = epoch_plus_seconds(raw_date);
    let mmol_per_litre = raw_reading as f64 / 10.0;

    Ok(Record {
        raw_date,
        raw_reading,
        timestamp,
        mmol_per_litre,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_trailing_eight_bytes_regardless_of_prefix() {
        let mut payload = vec![0x05, 0x06, 0xaa, 0xbb];
        payload.extend_from_slice(&100u32.to_le_bytes());
        payload.extend_from_slice(&95u32.to_le_bytes());

        let record = decode(&payload).unwrap();
        assert_eq!(record.raw_date, 100);
        assert_eq!(record.raw_reading, 95);
        assert_eq!(record.mmol_per_litre, 9.5);
    }

    #[test]
    fn short_payload_is_rejected() {
        assert!(decode(&[1, 2, 3]).is_err());
    }
}
