use std::time::Duration;

pub const UBX_SYNC_CHAR_1: u8 = 0xb5;
pub const UBX_SYNC_CHAR_2: u8 = 0x62;
/// Sync (2) + class (1) + id (1) + length (2)
pub const UBX_HEADER_LEN: usize = 6;
pub const UBX_CHECKSUM_LEN: usize = 2;
pub const UBX_OVERHEAD_LEN: usize = UBX_HEADER_LEN + UBX_CHECKSUM_LEN;
/// Largest body accepted when encoding an outbound UBX frame
pub const UBX_MAX_BODY_LEN: usize = 1024;
/// Wildcard value for either byte of a wanted UBX class/id pair
pub const UBX_WILDCARD: u8 = 0xff;

pub const UBX_CLASS_ACK: u8 = 0x05;
pub const UBX_ID_ACK_NACK: u8 = 0x00;
pub const UBX_ID_ACK_ACK: u8 = 0x01;
pub(crate) const UBX_ACK_BODY_LEN: usize = 2;

pub(crate) const UBX_CLASS_MON: u8 = 0x0a;
pub(crate) const UBX_ID_MON_MSGPP: u8 = 0x06;
pub(crate) const UBX_MON_MSGPP_BODY_LEN: usize = 120;
/// Stride, per port, of the message counters in a MON-MSGPP body
pub(crate) const UBX_MON_MSGPP_PORT_STRIDE: usize = 16;

pub(crate) const UBX_CLASS_CFG: u8 = 0x06;
pub(crate) const UBX_ID_CFG_PRT: u8 = 0x00;
pub(crate) const UBX_CFG_PRT_BODY_LEN: usize = 20;
pub(crate) const UBX_CFG_PRT_OUT_PROTO_OFFSET: usize = 14;

pub const NMEA_SYNC_CHAR: u8 = b'$';
pub const NMEA_CHECKSUM_CHAR: u8 = b'*';
pub const NMEA_END_CHAR_1: u8 = b'\r';
pub const NMEA_END_CHAR_2: u8 = b'\n';
/// Longest talker + sentence token, e.g. "GPGGA" or "PUBX"
pub const NMEA_ID_MAX_LEN: usize = 8;

pub const RTCM_SYNC_CHAR: u8 = 0xd3;
/// The six high bits of the byte after sync are reserved and must be zero
pub(crate) const RTCM_RESERVED_MASK: u8 = 0xfc;
pub(crate) const RTCM_CRC_LEN: usize = 3;

pub const RING_BUFFER_SIZE: usize = 2048;
pub const SCRATCH_BUFFER_SIZE: usize = RING_BUFFER_SIZE / 8;
pub const MAX_READ_HANDLES: usize = 8;
pub const MAX_RECEIVE_READERS: usize = 10;

pub const RING_BUFFER_MIN_FILL_TIME: Duration = Duration::from_millis(100);
pub const RING_BUFFER_MAX_FILL_TIME: Duration = Duration::from_millis(2000);
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const MSG_READ_TIMEOUT: Duration = Duration::from_millis(2000);
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(10);
pub(crate) const RECEIVE_TASK_YIELD: Duration = Duration::from_millis(50);
/// Settle time after reconfiguring a port before checking message counters
pub(crate) const PORT_SETTLE_TIME: Duration = Duration::from_millis(100);

pub const I2C_DEFAULT_ADDRESS: u8 = 0x42;
/// Register holding the big-endian count of bytes waiting in the GNSS chip
pub const I2C_LENGTH_REGISTER: u8 = 0xfd;
/// Register streaming the GNSS chip's output
pub const I2C_DATA_REGISTER: u8 = 0xff;

pub(crate) const AT_UBX_COMMAND: &str = "AT+UGUBX=";
pub(crate) const AT_UBX_RESPONSE: &str = "+UGUBX:";
