use std::time::Duration;

use crate::{
    constants::{DEFAULT_RESPONSE_TIMEOUT, I2C_DEFAULT_ADDRESS, RING_BUFFER_SIZE, SCRATCH_BUFFER_SIZE},
    transport::{StreamType, TransportType},
};

/// Per-device settings
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DeviceConfig {
    pub transport_type: TransportType,
    /// 7-bit address of the chip on an I2C transport
    pub i2c_address: u8,
    /// UBX port index of the interface, used to pick counters out of
    /// UBX-MON-MSGPP and to address UBX-CFG-PRT. Derived from the transport
    /// when not set.
    pub port_number: Option<u8>,
    /// How long a command waits for its response
    pub response_timeout: Duration,
    pub ring_buffer_size: usize,
    /// Size of each bulk read from the transport
    pub scratch_size: usize,
    /// Log every UBX command and response at debug level
    pub print_messages: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            transport_type: TransportType::None,
            i2c_address: I2C_DEFAULT_ADDRESS,
            port_number: None,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            ring_buffer_size: RING_BUFFER_SIZE,
            scratch_size: SCRATCH_BUFFER_SIZE,
            print_messages: false,
        }
    }
}

impl DeviceConfig {
    pub fn new(transport_type: TransportType) -> Self {
        Self {
            transport_type,
            ..Self::default()
        }
    }

    /// I2C (DDC) is port 0, UART1 is port 1 on u-blox receivers
    pub fn port_number(&self) -> u8 {
        self.port_number
            .unwrap_or(match self.transport_type.stream_type() {
                Some(StreamType::I2c) => 0,
                _ => 1,
            })
    }
}
