//! `I2cTransport` against a scripted u-blox DDC register map.
#![cfg(feature = "i2c")]

use std::{
    collections::VecDeque,
    io,
    sync::{Arc, Mutex},
    time::Duration,
};

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, Operation};
use ublox_stream::{
    constants::{I2C_DATA_REGISTER, I2C_DEFAULT_ADDRESS, I2C_LENGTH_REGISTER},
    encode_ubx, Device, DeviceConfig, Error, I2cTransport, StreamTransport, Transport,
    TransportType,
};

#[derive(Default)]
struct Registers {
    pointer: u8,
    /// Output of the chip waiting behind the data register
    stream: VecDeque<u8>,
    /// Bytes clocked out of the data register
    data_reads: usize,
    /// Messages written to the chip
    written: Vec<Vec<u8>>,
    fail: bool,
}

#[derive(Clone, Default)]
struct ScriptedBus(Arc<Mutex<Registers>>);

impl ErrorType for ScriptedBus {
    type Error = ErrorKind;
}

impl I2c for ScriptedBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        assert_eq!(address, I2C_DEFAULT_ADDRESS);
        let mut guard = self.0.lock().unwrap();
        let regs = &mut *guard;
        if regs.fail {
            return Err(ErrorKind::Bus);
        }
        for op in operations {
            match op {
                Operation::Write([register]) => regs.pointer = *register,
                Operation::Write(message) => regs.written.push(message.to_vec()),
                Operation::Read(buf) => {
                    for b in buf.iter_mut() {
                        let len = regs.stream.len() as u16;
                        *b = match regs.pointer {
                            I2C_LENGTH_REGISTER => {
                                regs.pointer = I2C_LENGTH_REGISTER + 1;
                                (len >> 8) as u8
                            },
                            0xfe => {
                                regs.pointer = I2C_DATA_REGISTER;
                                len as u8
                            },
                            I2C_DATA_REGISTER => {
                                regs.data_reads += 1;
                                regs.stream.pop_front().unwrap_or(0xff)
                            },
                            other => panic!("read from register 0x{:02x}", other),
                        };
                    }
                },
            }
        }
        Ok(())
    }
}

fn i2c_device(bus: &ScriptedBus) -> Device {
    let config = DeviceConfig::new(TransportType::I2c);
    let transport = Transport::stream(I2cTransport::new(bus.clone(), config.i2c_address));
    Device::new(config, transport).unwrap()
}

#[test]
fn length_register_is_big_endian() {
    let bus = ScriptedBus::default();
    bus.0.lock().unwrap().stream.extend((0..0x0102).map(|i| i as u8));
    let mut transport = I2cTransport::new(bus.clone(), I2C_DEFAULT_ADDRESS);
    assert_eq!(transport.receive_size().unwrap(), 0x0102);

    let mut buf = [0u8; 4];
    assert_eq!(transport.read(&mut buf).unwrap(), 4);
    assert_eq!(buf, [0, 1, 2, 3]);
    assert_eq!(bus.0.lock().unwrap().data_reads, 4);
}

#[test]
fn fill_reads_exactly_what_is_waiting() {
    let bus = ScriptedBus::default();
    let data: Vec<u8> = (0..0x0102).map(|i| (i % 200) as u8).collect();
    bus.0.lock().unwrap().stream.extend(&data);
    let device = i2c_device(&bus);
    let h = device.ring_buffer().take_read_handle().unwrap();

    let added = device
        .fill_ring_buffer(Duration::from_millis(100), Duration::ZERO)
        .unwrap();
    assert_eq!(added, 258);
    assert_eq!(bus.0.lock().unwrap().data_reads, 258);

    let mut got = vec![0u8; 258];
    assert_eq!(device.ring_buffer().read_handle(h, &mut got), 258);
    assert_eq!(got, data);
}

#[test]
fn nothing_waiting_reads_nothing() {
    let bus = ScriptedBus::default();
    let device = i2c_device(&bus);
    assert!(matches!(
        device.fill_ring_buffer(Duration::ZERO, Duration::ZERO),
        Err(Error::Timeout)
    ));
    assert_eq!(bus.0.lock().unwrap().data_reads, 0);
}

#[test]
fn bus_error_is_a_transport_error() {
    let bus = ScriptedBus::default();
    bus.0.lock().unwrap().fail = true;
    let mut transport = I2cTransport::new(bus.clone(), I2C_DEFAULT_ADDRESS);
    let err = transport.receive_size().unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::Other);

    let device = i2c_device(&bus);
    let err = device
        .fill_ring_buffer(Duration::ZERO, Duration::ZERO)
        .unwrap_err();
    assert!(matches!(err, Error::Transport(_)), "{}", err);
}

#[test]
fn messages_are_written_whole() {
    let bus = ScriptedBus::default();
    let device = i2c_device(&bus);
    let sent = device
        .send_only_stream_ubx(0x06, 0x04, &[0xff, 0xff, 0x02, 0x00])
        .unwrap();
    assert_eq!(sent, 12);
    assert_eq!(
        bus.0.lock().unwrap().written,
        vec![encode_ubx(0x06, 0x04, &[0xff, 0xff, 0x02, 0x00]).unwrap()]
    );
}
