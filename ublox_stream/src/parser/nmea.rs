use crate::{
    constants::{NMEA_CHECKSUM_CHAR, NMEA_END_CHAR_1, NMEA_END_CHAR_2, NMEA_SYNC_CHAR},
    error::ParseError,
    message_id::{MessageId, NmeaId},
    parser::{checksum::NmeaChecksum, ParseCursor},
};

/// Recognises `$<id>,<fields>*<hh>\r\n`, `<id>` being up to 8 of `0-9A-Z`
pub fn parse_nmea(c: &mut ParseCursor<'_>) -> Result<MessageId, ParseError> {
    if c.next_byte()? != NMEA_SYNC_CHAR {
        return Err(ParseError::NotFound);
    }
    let mut ck = NmeaChecksum::new();
    let mut id = NmeaId::ANY;
    loop {
        let b = c.next_byte()?;
        ck.update(b);
        if b == b',' {
            break;
        }
        if !(b.is_ascii_digit() || b.is_ascii_uppercase()) || !id.push(b) {
            return Err(ParseError::NotFound);
        }
    }
    loop {
        let b = c.next_byte()?;
        if !(b' '..=b'~').contains(&b) {
            return Err(ParseError::NotFound);
        }
        if b == NMEA_CHECKSUM_CHAR {
            break;
        }
        ck.update(b);
    }
    let [hi, lo] = ck.hex_digits();
    for expected in [hi, lo, NMEA_END_CHAR_1, NMEA_END_CHAR_2] {
        if c.next_byte()? != expected {
            return Err(ParseError::NotFound);
        }
    }
    Ok(MessageId::Nmea(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GLL: &[u8] = b"$GPGLL,5057.970,N,00146.110,E,142451,A*27\r\n";

    fn parse(data: &[u8]) -> Result<MessageId, ParseError> {
        parse_nmea(&mut ParseCursor::from_slice(data))
    }

    #[test]
    fn parses_sentence() {
        let mut c = ParseCursor::from_slice(GLL);
        assert_eq!(parse_nmea(&mut c), Ok(MessageId::nmea("GPGLL").unwrap()));
        assert_eq!(c.consumed(), GLL.len());
    }

    #[test]
    fn wrong_checksum() {
        let mut s = GLL.to_vec();
        s[GLL.len() - 3] = b'8';
        assert_eq!(parse(&s), Err(ParseError::NotFound));
    }

    #[test]
    fn lower_case_checksum_rejected() {
        let s = b"$GPTXT,01,01,02,ANTSTATUS=OK*3B\r\n";
        assert!(parse(s).is_ok());
        let s = b"$GPTXT,01,01,02,ANTSTATUS=OK*3b\r\n";
        assert_eq!(parse(s), Err(ParseError::NotFound));
    }

    #[test]
    fn missing_crlf() {
        let s = b"$GPGLL,5057.970,N,00146.110,E,142451,A*27\n\r";
        assert_eq!(parse(s), Err(ParseError::NotFound));
    }

    #[test]
    fn id_too_long_stops_at_boundary() {
        // Nine id characters, then something that would be incomplete
        let s = b"$ABCDEFGHIJ";
        let mut c = ParseCursor::from_slice(s);
        assert_eq!(parse_nmea(&mut c), Err(ParseError::NotFound));
        assert_eq!(c.consumed(), 10);
    }

    #[test]
    fn id_with_lower_case_rejected() {
        assert_eq!(parse(b"$GPgga,*00\r\n"), Err(ParseError::NotFound));
    }

    #[test]
    fn unprintable_in_body_rejected() {
        assert_eq!(parse(b"$GPGGA,1\x012*00\r\n"), Err(ParseError::NotFound));
    }

    #[test]
    fn truncated_is_incomplete() {
        for cut in 0..GLL.len() {
            assert_eq!(parse(&GLL[..cut]), Err(ParseError::Incomplete), "cut {}", cut);
        }
    }

    #[test]
    fn proprietary_id() {
        let s = b"$PUBX,00*33\r\n";
        let mut ck = NmeaChecksum::new();
        for b in b"PUBX,00" {
            ck.update(*b);
        }
        assert_eq!(&ck.hex_digits(), b"33");
        assert_eq!(parse(s), Ok(MessageId::nmea("PUBX").unwrap()));
    }
}
