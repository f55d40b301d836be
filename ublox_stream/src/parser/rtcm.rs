use crate::{
    constants::{RTCM_CRC_LEN, RTCM_RESERVED_MASK, RTCM_SYNC_CHAR},
    error::ParseError,
    message_id::MessageId,
    parser::{checksum::Crc24Q, ParseCursor},
};

/// Recognises an RTCM3 transport frame: `D3`, 6 reserved zero bits, a 10-bit
/// payload length, the payload (message type in its first 12 bits) and a
/// CRC-24Q over everything before it
pub fn parse_rtcm(c: &mut ParseCursor<'_>) -> Result<MessageId, ParseError> {
    let sync = c.next_byte()?;
    if sync != RTCM_SYNC_CHAR {
        return Err(ParseError::NotFound);
    }
    let len_hi = c.next_byte()?;
    if len_hi & RTCM_RESERVED_MASK != 0 {
        return Err(ParseError::NotFound);
    }
    let len_lo = c.next_byte()?;
    let len = u16::from_be_bytes([len_hi, len_lo]) as usize;
    if len < 2 {
        return Err(ParseError::NotFound);
    }

    let mut crc = Crc24Q::new();
    crc.update_slice(&[sync, len_hi, len_lo]);
    c.require(len + RTCM_CRC_LEN)?;
    let type_hi = c.next_byte()?;
    crc.update(type_hi);
    let type_lo = c.next_byte()?;
    crc.update(type_lo);
    for _ in 2..len + RTCM_CRC_LEN {
        crc.update(c.next_byte()?);
    }
    if crc.finalize() != 0 {
        return Err(ParseError::NotFound);
    }
    Ok(MessageId::Rtcm(
        ((type_hi as u16) << 4) | ((type_lo as u16) >> 4),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rtcm_frame(payload: &[u8]) -> Vec<u8> {
        let len = payload.len() as u16;
        let mut f = vec![RTCM_SYNC_CHAR];
        f.extend_from_slice(&len.to_be_bytes());
        f.extend_from_slice(payload);
        let mut crc = Crc24Q::new();
        crc.update_slice(&f);
        f.extend_from_slice(&crc.finalize().to_be_bytes()[1..]);
        f
    }

    // Type 1005 is 0x3ED
    const PAYLOAD_1005: [u8; 6] = [0x3e, 0xd0, 0x00, 0x03, 0x8a, 0xd8];

    #[test]
    fn parses_frame() {
        let f = rtcm_frame(&PAYLOAD_1005);
        let mut c = ParseCursor::from_slice(&f);
        assert_eq!(parse_rtcm(&mut c), Ok(MessageId::rtcm(1005)));
        assert_eq!(c.consumed(), f.len());
    }

    #[test]
    fn crc_over_whole_frame_is_zero() {
        let f = rtcm_frame(&PAYLOAD_1005);
        let mut crc = Crc24Q::new();
        crc.update_slice(&f);
        assert_eq!(crc.finalize(), 0);
    }

    #[test]
    fn reserved_bits_set() {
        let mut f = rtcm_frame(&PAYLOAD_1005);
        f[1] |= 0x04;
        let mut c = ParseCursor::from_slice(&f);
        assert_eq!(parse_rtcm(&mut c), Err(ParseError::NotFound));
        assert_eq!(c.consumed(), 2);
    }

    #[test]
    fn corrupted_payload() {
        let mut f = rtcm_frame(&PAYLOAD_1005);
        f[6] ^= 0x80;
        let mut c = ParseCursor::from_slice(&f);
        assert_eq!(parse_rtcm(&mut c), Err(ParseError::NotFound));
    }

    #[test]
    fn truncated_is_incomplete() {
        let f = rtcm_frame(&PAYLOAD_1005);
        for cut in 0..f.len() {
            let mut c = ParseCursor::from_slice(&f[..cut]);
            assert_eq!(parse_rtcm(&mut c), Err(ParseError::Incomplete), "cut {}", cut);
        }
    }

    #[test]
    fn message_type_bits() {
        let f = rtcm_frame(&[0x43, 0x50, 0x00]);
        let mut c = ParseCursor::from_slice(&f);
        assert_eq!(parse_rtcm(&mut c), Ok(MessageId::rtcm(1077)));
    }
}
