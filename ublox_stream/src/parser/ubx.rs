use crate::{
    constants::{UBX_HEADER_LEN, UBX_MAX_BODY_LEN, UBX_OVERHEAD_LEN, UBX_SYNC_CHAR_1, UBX_SYNC_CHAR_2},
    error::{Error, ParseError, Result},
    message_id::MessageId,
    parser::{checksum::UbxChecksum, ParseCursor},
};

/// Recognises `B5 62 class id len_lo len_hi body.. ck_a ck_b`
pub fn parse_ubx(c: &mut ParseCursor<'_>) -> core::result::Result<MessageId, ParseError> {
    if c.next_byte()? != UBX_SYNC_CHAR_1 {
        return Err(ParseError::NotFound);
    }
    if c.next_byte()? != UBX_SYNC_CHAR_2 {
        return Err(ParseError::NotFound);
    }
    // class, id and length
    c.require(4)?;
    let mut ck = UbxChecksum::new();
    let class = c.next_byte()?;
    ck.update(class);
    let id = c.next_byte()?;
    ck.update(id);
    let len_lo = c.next_byte()?;
    ck.update(len_lo);
    let len_hi = c.next_byte()?;
    ck.update(len_hi);

    let len = u16::from_le_bytes([len_lo, len_hi]) as usize;
    c.require(len)?;
    for _ in 0..len {
        ck.update(c.next_byte()?);
    }

    let (ck_a, ck_b) = ck.finalize();
    if c.next_byte()? != ck_a {
        return Err(ParseError::NotFound);
    }
    if c.next_byte()? != ck_b {
        return Err(ParseError::NotFound);
    }
    Ok(MessageId::ubx(class, id))
}

/// Builds a complete UBX frame around `body`
pub fn encode_ubx(class: u8, id: u8, body: &[u8]) -> Result<Vec<u8>> {
    if body.len() > UBX_MAX_BODY_LEN {
        return Err(Error::InvalidParameter("UBX body too long"));
    }
    let len = body.len() as u16;
    let mut frame = Vec::new();
    frame
        .try_reserve_exact(body.len() + UBX_OVERHEAD_LEN)
        .map_err(|_| Error::NoMemory)?;
    frame.extend_from_slice(&[UBX_SYNC_CHAR_1, UBX_SYNC_CHAR_2, class, id]);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(body);

    let mut ck = UbxChecksum::new();
    ck.update_slice(&frame[2..]);
    let (ck_a, ck_b) = ck.finalize();
    frame.push(ck_a);
    frame.push(ck_b);
    Ok(frame)
}

/// A UBX frame found in a byte slice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UbxFrame<'a> {
    pub class: u8,
    pub id: u8,
    pub body: &'a [u8],
}

/// Finds the first valid UBX frame in `data`, skipping anything in front of it
pub fn decode_ubx_frame(data: &[u8]) -> Result<UbxFrame<'_>> {
    for offset in 0..data.len() {
        let rest = &data[offset..];
        let mut cursor = ParseCursor::from_slice(rest);
        if let Ok(MessageId::Ubx(v)) = parse_ubx(&mut cursor) {
            let [class, id] = v.to_be_bytes();
            let end = cursor.consumed() - (UBX_OVERHEAD_LEN - UBX_HEADER_LEN);
            return Ok(UbxFrame {
                class,
                id,
                body: &rest[UBX_HEADER_LEN..end],
            });
        }
    }
    Err(Error::NotFound)
}
