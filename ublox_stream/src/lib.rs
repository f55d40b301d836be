//! # ublox_stream
//!
//! Streaming transport and message framing for u-blox GNSS chips attached over
//! UART, I2C or tunnelled through a cellular module's AT interface.
//!
//! Everything the chip outputs is pulled into a [`RingBuffer`] shared by several
//! independent read cursors, split into UBX, NMEA and RTCM3 frames, and handed
//! to whoever is waiting for it: the reply to a command, a blocking
//! [`Device::msg_receive`], or callbacks registered with
//! [`Device::msg_receive_start`].
//!
//! Talking to a chip
//! =================
//!
//! ```no_run
//! # #[cfg(feature = "serialport")] {
//! use std::time::Duration;
//! use ublox_stream::{Device, DeviceConfig, Transport, TransportType, UartTransport};
//!
//! let port = serialport::new("/dev/ttyACM0", 9600)
//!     .timeout(Duration::from_millis(10))
//!     .open()
//!     .unwrap();
//! let device = Device::new(
//!     DeviceConfig::new(TransportType::Uart),
//!     Transport::stream(UartTransport::new(port)),
//! )
//! .unwrap();
//!
//! // UBX-MON-VER
//! let version = device.send_receive_ubx_alloc(0x0a, 0x04, &[]).unwrap();
//! println!("{}", String::from_utf8_lossy(&version[..30]));
//! # }
//! ```
//!
//! Framing without a device
//! ========================
//!
//! The parsers work on any pair of slices, so they can be used on captured data:
//! ```
//! use ublox_stream::{dispatch, MessageId, ParseCursor, PARSERS};
//!
//! let data = b"$GPGLL,5057.970,N,00146.110,E,142451,A*27\r\n";
//! let mut cursor = ParseCursor::from_slice(data);
//! let (len, id) = dispatch(&mut cursor, &PARSERS).unwrap();
//! assert_eq!(len, data.len());
//! assert_eq!(id, MessageId::nmea("GPGLL").unwrap());
//! ```

#[cfg(feature = "serde")]
extern crate serde;

pub use crate::{
    cancel::CancellationToken,
    config::DeviceConfig,
    device::{Device, FrameData, MessageBuffer, ReceivedMessage, UbxMessage},
    error::{Error, ParseError, Result},
    message_id::{ubx_id_matches, MessageId, NmeaId, Protocol, ProtocolMask},
    msg_receive::{MessageReader, ReaderHandle},
    parser::{
        decode_ubx_frame, dispatch, encode_ubx, parse_nmea, parse_rtcm, parse_ubx, Crc24Q,
        FrameParser, NmeaChecksum, ParseCursor, UbxChecksum, UbxFrame, PARSERS,
    },
    registry::{DeviceHandle, DeviceRegistry},
    ring_buffer::{ReadHandle, ReadLock, RingBuffer},
    transport::{AtChannel, StreamTransport, StreamType, Transport, TransportType},
};

#[cfg(feature = "i2c")]
pub use crate::transport::I2cTransport;
#[cfg(feature = "serialport")]
pub use crate::transport::UartTransport;

mod cancel;
mod config;
pub mod constants;
mod device;
mod error;
mod message_id;
mod msg_receive;
mod parser;
mod registry;
mod ring_buffer;
mod transport;
