// This file is part of framesift, a forensic multimedia parser.
// SPDX-License-Identifier: GPL-3.0-or-later

//! SEI message framing, ISO/IEC 14496-10 section 7.3.2.3.
//!
//! Payload bodies are kept verbatim; the forensic pipeline keys off
//! container state and slice headers, not SEI semantics.

use crate::bits::BitCursor;
use base::Error;
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct SeiMessage {
    pub payload_type: u32,
    pub payload_size: u32,
    #[serde(serialize_with = "crate::record::b64::serialize")]
    pub payload: Vec<u8>,
}

/// Parses every SEI message in an RBSP. Truncated trailing bytes end the
/// list without failing: SEI is advisory data.
pub fn parse_sei(rbsp: &[u8]) -> Result<Vec<SeiMessage>, Error> {
    let mut c = BitCursor::new(rbsp);
    let mut messages = Vec::new();
    while c.more_rbsp_data() && c.bits_remaining() >= 16 {
        let payload_type = match read_ff_coded(&mut c) {
            Ok(v) => v,
            Err(_) => break,
        };
        let payload_size = match read_ff_coded(&mut c) {
            Ok(v) => v,
            Err(_) => break,
        };
        let mut payload = Vec::with_capacity(payload_size as usize);
        for _ in 0..payload_size {
            match c.read_u8() {
                Ok(b) => payload.push(b),
                Err(_) => {
                    // Truncated payload: keep what was there.
                    messages.push(SeiMessage {
                        payload_type,
                        payload_size,
                        payload,
                    });
                    return Ok(messages);
                }
            }
        }
        messages.push(SeiMessage {
            payload_type,
            payload_size,
            payload,
        });
    }
    Ok(messages)
}

/// Reads the `ff`-extended value coding used for SEI payload type and size:
/// a run of 0xFF bytes each adding 255, terminated by the final byte.
pub fn read_ff_coded(c: &mut BitCursor) -> Result<u32, Error> {
    let mut v = 0u32;
    loop {
        let b = c.read_u8()?;
        v += b as u32;
        if b != 0xff {
            return Ok(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_message() {
        // type 6 (recovery point), size 1, one payload byte, stop bit.
        let rbsp = [0x06, 0x01, 0xc4, 0x80];
        let messages = parse_sei(&rbsp).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload_type, 6);
        assert_eq!(messages[0].payload_size, 1);
        assert_eq!(messages[0].payload, vec![0xc4]);
    }

    #[test]
    fn ff_extended_type() {
        // 0xff + 0x05 = type 260.
        let rbsp = [0xff, 0x05, 0x02, 0xaa, 0xbb, 0x80];
        let messages = parse_sei(&rbsp).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload_type, 260);
        assert_eq!(messages[0].payload, vec![0xaa, 0xbb]);
    }

    #[test]
    fn multiple_messages() {
        let rbsp = [
            0x01, 0x02, 0x11, 0x22, // pic timing, 2 bytes
            0x06, 0x01, 0x33, // recovery point, 1 byte
            0x80,
        ];
        let messages = parse_sei(&rbsp).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].payload_type, 1);
        assert_eq!(messages[1].payload_type, 6);
        assert_eq!(messages[1].payload, vec![0x33]);
    }

    #[test]
    fn truncated_payload_is_kept() {
        // Declares 4 bytes but only 1 follows.
        let rbsp = [0x05, 0x04, 0x9a];
        let messages = parse_sei(&rbsp).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload_size, 4);
        assert_eq!(messages[0].payload, vec![0x9a]);
    }
}
