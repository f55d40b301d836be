//! The wires a GNSS chip can sit behind.
//!
//! Streaming transports (UART, I2C) deliver everything the chip outputs and
//! need framing and correlation; the AT transport tunnels single UBX
//! request/response pairs through a cellular module.

use std::{io, time::Duration};

#[cfg(feature = "serialport")]
use std::io::{Read, Write};

#[cfg(feature = "i2c")]
use crate::constants::{I2C_DATA_REGISTER, I2C_LENGTH_REGISTER};

/// How the GNSS chip is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransportType {
    #[default]
    None,
    Uart,
    /// UBX tunnelled through `AT+UGUBX` on a cellular module
    At,
    I2c,
    /// UART carrying UBX only
    UbxUart,
    /// I2C carrying UBX only
    UbxI2c,
}

/// Physical kind of a streaming transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamType {
    Uart,
    I2c,
}

impl TransportType {
    /// `None` for transports that are not a byte stream
    pub fn stream_type(self) -> Option<StreamType> {
        match self {
            TransportType::Uart | TransportType::UbxUart => Some(StreamType::Uart),
            TransportType::I2c | TransportType::UbxI2c => Some(StreamType::I2c),
            TransportType::None | TransportType::At => None,
        }
    }
}

/// Non-blocking, best effort access to a streaming transport
pub trait StreamTransport: Send {
    fn stream_type(&self) -> StreamType;

    /// Number of bytes waiting to be read
    fn receive_size(&mut self) -> io::Result<usize>;

    /// UART returns what has arrived, up to `buf.len()`; I2C must only be asked
    /// for what [`StreamTransport::receive_size`] reported and fills `buf` exactly
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn write(&mut self, data: &[u8]) -> io::Result<usize>;
}

/// The AT command channel of a cellular module with a GNSS chip behind it
pub trait AtChannel: Send {
    /// Sends `command` and returns the text following `response_prefix` in
    /// the module's answer
    fn send_receive(
        &mut self,
        command: &str,
        response_prefix: &str,
        timeout: Duration,
    ) -> io::Result<String>;
}

pub enum Transport {
    Stream(Box<dyn StreamTransport>),
    At(Box<dyn AtChannel>),
}

impl Transport {
    pub fn stream<T: StreamTransport + 'static>(t: T) -> Self {
        Transport::Stream(Box::new(t))
    }

    pub fn at<T: AtChannel + 'static>(t: T) -> Self {
        Transport::At(Box::new(t))
    }
}

/// UART via the `serialport` crate
#[cfg(feature = "serialport")]
pub struct UartTransport {
    port: Box<dyn serialport::SerialPort>,
}

#[cfg(feature = "serialport")]
impl UartTransport {
    pub fn new(port: Box<dyn serialport::SerialPort>) -> Self {
        Self { port }
    }
}

#[cfg(feature = "serialport")]
impl StreamTransport for UartTransport {
    fn stream_type(&self) -> StreamType {
        StreamType::Uart
    }

    fn receive_size(&mut self) -> io::Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    /// Reads the serial port, converting timeouts into "no data received"
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(data.len())
    }
}

/// u-blox DDC (I2C) via any `embedded-hal` bus
#[cfg(feature = "i2c")]
pub struct I2cTransport<I> {
    bus: I,
    address: u8,
}

#[cfg(feature = "i2c")]
impl<I> I2cTransport<I> {
    pub fn new(bus: I, address: u8) -> Self {
        Self { bus, address }
    }
}

#[cfg(feature = "i2c")]
fn i2c_error<E: embedded_hal::i2c::Error>(e: E) -> io::Error {
    io::Error::other(format!("i2c: {:?}", e.kind()))
}

#[cfg(feature = "i2c")]
impl<I: embedded_hal::i2c::I2c + Send> StreamTransport for I2cTransport<I> {
    fn stream_type(&self) -> StreamType {
        StreamType::I2c
    }

    fn receive_size(&mut self) -> io::Result<usize> {
        // 0xFD/0xFE hold the big-endian count
        let mut len = [0u8; 2];
        self.bus
            .write_read(self.address, &[I2C_LENGTH_REGISTER], &mut len)
            .map_err(i2c_error)?;
        Ok(u16::from_be_bytes(len) as usize)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.bus
            .write_read(self.address, &[I2C_DATA_REGISTER], buf)
            .map_err(i2c_error)?;
        Ok(buf.len())
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.bus.write(self.address, data).map_err(i2c_error)?;
        Ok(data.len())
    }
}

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

pub(crate) fn bin_to_hex(data: &[u8]) -> String {
    let mut s = String::with_capacity(data.len() * 2);
    for b in data {
        s.push(HEX_DIGITS[(b >> 4) as usize] as char);
        s.push(HEX_DIGITS[(b & 0x0f) as usize] as char);
    }
    s
}

/// Decodes pairs of hex digits, either case; stops at the first character
/// that is not one
pub(crate) fn hex_to_bin(hex: &str) -> Vec<u8> {
    fn nibble(c: u8) -> Option<u8> {
        match c {
            b'0'..=b'9' => Some(c - b'0'),
            b'a'..=b'f' => Some(c - b'a' + 10),
            b'A'..=b'F' => Some(c - b'A' + 10),
            _ => None,
        }
    }
    hex.as_bytes()
        .chunks_exact(2)
        .map_while(|pair| Some((nibble(pair[0])? << 4) | nibble(pair[1])?))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_type_mapping() {
        assert_eq!(TransportType::Uart.stream_type(), Some(StreamType::Uart));
        assert_eq!(TransportType::UbxUart.stream_type(), Some(StreamType::Uart));
        assert_eq!(TransportType::I2c.stream_type(), Some(StreamType::I2c));
        assert_eq!(TransportType::UbxI2c.stream_type(), Some(StreamType::I2c));
        assert_eq!(TransportType::At.stream_type(), None);
        assert_eq!(TransportType::None.stream_type(), None);
    }

    #[test]
    fn hex_both_ways() {
        let data = [0xb5, 0x62, 0x0a, 0x04, 0x00, 0x00, 0x0e, 0x34];
        let hex = bin_to_hex(&data);
        assert_eq!(hex, "B5620A0400000E34");
        assert_eq!(hex_to_bin(&hex), data);
        assert_eq!(hex_to_bin("b5620a"), [0xb5, 0x62, 0x0a]);
    }

    #[test]
    fn hex_stops_at_junk() {
        assert_eq!(hex_to_bin("0102\"03"), [0x01, 0x02]);
        assert_eq!(hex_to_bin("010"), [0x01]);
    }
}
