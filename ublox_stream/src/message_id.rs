use core::fmt;

use bitflags::bitflags;

use crate::{
    constants::{NMEA_ID_MAX_LEN, UBX_WILDCARD},
    error::{Error, Result},
};

/// Single character wildcard in a wanted NMEA id
const NMEA_WILDCARD: u8 = b'?';

/// Protocol of a [`MessageId`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Protocol {
    Ubx,
    Nmea,
    Rtcm,
    /// Bytes that no parser recognised
    Unknown,
    /// Any frame, including unrecognised bytes
    Any,
    /// Any frame of a known protocol
    All,
}

bitflags! {
    /// Output protocol mask of a UBX-CFG-PRT port configuration
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ProtocolMask: u16 {
        const UBX = 0x0001;
        const NMEA = 0x0002;
        const RTCM3 = 0x0020;
    }
}

impl Protocol {
    /// Bit(s) of the CFG-PRT out-protocol mask standing for this protocol
    pub fn mask(self) -> Option<ProtocolMask> {
        match self {
            Protocol::Ubx => Some(ProtocolMask::UBX),
            Protocol::Nmea => Some(ProtocolMask::NMEA),
            Protocol::Rtcm => Some(ProtocolMask::RTCM3),
            Protocol::All => Some(ProtocolMask::all()),
            Protocol::Unknown | Protocol::Any => None,
        }
    }
}

/// NMEA talker + sentence token, e.g. `GPGGA`, at most [`NMEA_ID_MAX_LEN`] characters.
///
/// When used as a wanted pattern, `?` matches any single character and a
/// shorter pattern matches as a prefix; the empty pattern matches every sentence.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NmeaId {
    bytes: [u8; NMEA_ID_MAX_LEN],
    len: u8,
}

impl NmeaId {
    /// Pattern matching every NMEA sentence
    pub const ANY: NmeaId = NmeaId {
        bytes: [0; NMEA_ID_MAX_LEN],
        len: 0,
    };

    pub fn new(id: &str) -> Result<Self> {
        if id.len() > NMEA_ID_MAX_LEN {
            return Err(Error::InvalidParameter("NMEA id too long"));
        }
        let mut ret = Self::ANY;
        for &b in id.as_bytes() {
            if !b.is_ascii_graphic() {
                return Err(Error::InvalidParameter("NMEA id must be printable ASCII"));
            }
            ret.push(b);
        }
        Ok(ret)
    }

    /// Appends a character, returns `false` when full
    pub(crate) fn push(&mut self, b: u8) -> bool {
        let len = self.len as usize;
        if len >= NMEA_ID_MAX_LEN {
            return false;
        }
        self.bytes[len] = b;
        self.len += 1;
        true
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(self.as_bytes()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `self` is the concrete id, `wanted` the pattern
    pub fn matches(&self, wanted: &NmeaId) -> bool {
        let actual = self.as_bytes();
        let wanted = wanted.as_bytes();
        wanted.len() <= actual.len()
            && wanted
                .iter()
                .zip(actual)
                .all(|(w, a)| *w == NMEA_WILDCARD || w == a)
    }
}

impl fmt::Debug for NmeaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NmeaId({:?})", self.as_str())
    }
}

impl fmt::Display for NmeaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for NmeaId {
    fn serialize<S: serde::Serializer>(&self, s: S) -> core::result::Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for NmeaId {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> core::result::Result<Self, D::Error> {
        struct Visitor;
        impl serde::de::Visitor<'_> for Visitor {
            type Value = NmeaId;
            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an NMEA talker/sentence id of at most 8 characters")
            }
            fn visit_str<E: serde::de::Error>(self, v: &str) -> core::result::Result<NmeaId, E> {
                NmeaId::new(v).map_err(E::custom)
            }
        }
        d.deserialize_str(Visitor)
    }
}

/// Identity of a decoded frame, or a pattern to match decoded frames against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MessageId {
    /// `class << 8 | id`; in a pattern either byte may be [`UBX_WILDCARD`]
    Ubx(u16),
    Nmea(NmeaId),
    /// 12-bit message type
    Rtcm(u16),
    Unknown,
    Any,
    All,
}

impl MessageId {
    pub const fn ubx(class: u8, id: u8) -> Self {
        MessageId::Ubx(u16::from_be_bytes([class, id]))
    }

    /// Pattern matching every UBX frame
    pub const fn ubx_any() -> Self {
        MessageId::ubx(UBX_WILDCARD, UBX_WILDCARD)
    }

    pub fn nmea(id: &str) -> Result<Self> {
        NmeaId::new(id).map(MessageId::Nmea)
    }

    pub const fn rtcm(message_type: u16) -> Self {
        MessageId::Rtcm(message_type)
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            MessageId::Ubx(_) => Protocol::Ubx,
            MessageId::Nmea(_) => Protocol::Nmea,
            MessageId::Rtcm(_) => Protocol::Rtcm,
            MessageId::Unknown => Protocol::Unknown,
            MessageId::Any => Protocol::Any,
            MessageId::All => Protocol::All,
        }
    }

    /// Class and id of a UBX message id
    pub fn ubx_class_id(&self) -> Option<(u8, u8)> {
        match self {
            MessageId::Ubx(v) => {
                let [class, id] = v.to_be_bytes();
                Some((class, id))
            },
            _ => None,
        }
    }

    /// Returns true if this (decoded) id is matched by the `wanted` pattern.
    ///
    /// Not symmetric: `self` is the concrete value, `wanted` may carry wildcards.
    pub fn is_wanted(&self, wanted: &MessageId) -> bool {
        match (wanted, self) {
            (MessageId::Any, _) => true,
            (MessageId::All, actual) => *actual != MessageId::Unknown,
            (MessageId::Unknown, MessageId::Unknown) => true,
            (MessageId::Rtcm(w), MessageId::Rtcm(a)) => w == a,
            (MessageId::Nmea(w), MessageId::Nmea(a)) => a.matches(w),
            (MessageId::Ubx(w), MessageId::Ubx(a)) => ubx_id_matches(*a, *w),
            _ => false,
        }
    }
}

/// Compares a concrete UBX `class << 8 | id` against a wanted one, honouring
/// a wildcard in either byte of `wanted`
pub fn ubx_id_matches(actual: u16, wanted: u16) -> bool {
    let [wanted_class, wanted_id] = wanted.to_be_bytes();
    let mut actual = actual;
    if wanted_id == UBX_WILDCARD {
        actual |= UBX_WILDCARD as u16;
    }
    if wanted_class == UBX_WILDCARD {
        actual |= (UBX_WILDCARD as u16) << 8;
    }
    actual == wanted
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Ubx(v) => {
                let [class, id] = v.to_be_bytes();
                write!(f, "UBX 0x{:02x} 0x{:02x}", class, id)
            },
            MessageId::Nmea(id) => write!(f, "NMEA {}", id),
            MessageId::Rtcm(t) => write!(f, "RTCM {}", t),
            MessageId::Unknown => f.write_str("unknown"),
            MessageId::Any => f.write_str("any"),
            MessageId::All => f.write_str("all"),
        }
    }
}
