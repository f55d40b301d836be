//! A scripted u-blox chip behind mock UART, I2C and AT transports.
//!
//! The simulator answers UBX commands the way a receiver does: it counts every
//! message it is sent (as reported by MON-MSGPP), keeps a CFG-PRT output
//! protocol mask, acknowledges or rejects commands and answers polls it has a
//! body for. Replies can be preceded by noise to exercise the correlator.

#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    io,
    sync::{Arc, Mutex},
    time::Duration,
};

use ublox_stream::{
    decode_ubx_frame, encode_ubx, AtChannel, Device, DeviceConfig, StreamTransport, StreamType,
    Transport, TransportType,
};

pub const MON_CLASS: u8 = 0x0a;
pub const MON_VER: u8 = 0x04;
pub const MON_MSGPP: u8 = 0x06;
pub const CFG_CLASS: u8 = 0x06;
pub const CFG_PRT: u8 = 0x00;
pub const CFG_MSG: u8 = 0x01;
pub const CFG_RST: u8 = 0x04;
pub const CFG_NAV5: u8 = 0x24;

pub const GLL: &[u8] = b"$GPGLL,5057.970,N,00146.110,E,142451,A*27\r\n";
pub const TXT: &[u8] = b"$GPTXT,01,01,02,ANTSTATUS=OK*3B\r\n";

#[derive(Default)]
pub struct Simulator {
    /// Port whose counters are reported in MON-MSGPP
    pub port: u8,
    /// Messages received so far
    pub received: u64,
    pub out_proto: u16,
    /// Bodies returned for polls, by class and id
    pub polls: HashMap<(u8, u8), Vec<u8>>,
    pub ack: Vec<(u8, u8)>,
    pub nack: Vec<(u8, u8)>,
    /// Sent in front of every reply
    pub noise: Vec<u8>,
    /// Lose the next message that is not a MON-MSGPP poll
    pub drop_next: bool,
    /// Raw text the AT module answers with, in place of the chip's reply
    pub at_reply: Option<String>,
}

impl Simulator {
    pub fn new(port: u8) -> Self {
        Self {
            port,
            out_proto: 0x0003,
            ..Self::default()
        }
    }

    /// What the chip outputs in reply to `written`
    pub fn respond(&mut self, written: &[u8]) -> Vec<u8> {
        let Ok(frame) = decode_ubx_frame(written) else {
            return Vec::new();
        };
        let key = (frame.class, frame.id);
        if self.drop_next && key != (MON_CLASS, MON_MSGPP) {
            self.drop_next = false;
            return Vec::new();
        }
        self.received += 1;

        let mut reply = self.noise.clone();
        match key {
            (MON_CLASS, MON_MSGPP) => {
                let mut body = vec![0u8; 120];
                let at = self.port as usize * 16;
                body[at..at + 8].copy_from_slice(&self.received.to_le_bytes());
                reply.extend(encode_ubx(MON_CLASS, MON_MSGPP, &body).unwrap());
            },
            (CFG_CLASS, CFG_PRT) if frame.body.len() == 1 => {
                let mut body = vec![0u8; 20];
                body[0] = frame.body[0];
                body[12..14].copy_from_slice(&0x0007u16.to_le_bytes());
                body[14..16].copy_from_slice(&self.out_proto.to_le_bytes());
                reply.extend(encode_ubx(CFG_CLASS, CFG_PRT, &body).unwrap());
            },
            (CFG_CLASS, CFG_PRT) if frame.body.len() == 20 => {
                self.out_proto = u16::from_le_bytes([frame.body[14], frame.body[15]]);
                reply.extend(ack(true, CFG_CLASS, CFG_PRT));
            },
            k if self.nack.contains(&k) => reply.extend(ack(false, k.0, k.1)),
            k if self.ack.contains(&k) => reply.extend(ack(true, k.0, k.1)),
            k => match self.polls.get(&k) {
                Some(body) => reply.extend(encode_ubx(k.0, k.1, body).unwrap()),
                None => reply.clear(),
            },
        }
        reply
    }
}

pub fn ack(ok: bool, class: u8, id: u8) -> Vec<u8> {
    encode_ubx(0x05, u8::from(ok), &[class, id]).unwrap()
}

/// The chip side of a streaming transport
#[derive(Default)]
pub struct Wire {
    /// Output of the chip not yet read by the host
    pub rx: VecDeque<u8>,
    /// Everything the host wrote, one entry per write
    pub written: Vec<Vec<u8>>,
    pub fail_reads: bool,
    /// Keep at least this many bytes waiting, as a chip that never stops talking
    pub chatter: usize,
}

impl Wire {
    pub fn push(&mut self, data: &[u8]) {
        self.rx.extend(data);
    }
}

pub struct MockStream {
    stream_type: StreamType,
    wire: Arc<Mutex<Wire>>,
    sim: Arc<Mutex<Simulator>>,
}

impl StreamTransport for MockStream {
    fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    fn receive_size(&mut self) -> io::Result<usize> {
        let mut wire = self.wire.lock().unwrap();
        if wire.fail_reads {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"));
        }
        if wire.rx.len() < wire.chatter {
            let missing = wire.chatter - wire.rx.len();
            wire.rx.extend(std::iter::repeat(0u8).take(missing));
        }
        Ok(wire.rx.len().min(u16::MAX as usize))
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut wire = self.wire.lock().unwrap();
        if self.stream_type == StreamType::I2c {
            assert!(buf.len() <= wire.rx.len(), "I2C read past the available count");
        }
        let n = buf.len().min(wire.rx.len());
        for (dst, src) in buf.iter_mut().zip(wire.rx.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let reply = self.sim.lock().unwrap().respond(data);
        let mut wire = self.wire.lock().unwrap();
        wire.written.push(data.to_vec());
        wire.rx.extend(reply);
        Ok(data.len())
    }
}

pub struct MockAt {
    sim: Arc<Mutex<Simulator>>,
    pub commands: Arc<Mutex<Vec<String>>>,
}

fn unhex(s: &str) -> Vec<u8> {
    (0..s.len() / 2)
        .map(|i| u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).unwrap())
        .collect()
}

impl AtChannel for MockAt {
    fn send_receive(
        &mut self,
        command: &str,
        response_prefix: &str,
        _timeout: Duration,
    ) -> io::Result<String> {
        assert_eq!(response_prefix, "+UGUBX:");
        self.commands.lock().unwrap().push(command.to_owned());
        let hex = command
            .strip_prefix("AT+UGUBX=\"")
            .and_then(|s| s.strip_suffix('"'))
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "ERROR"))?;
        let mut sim = self.sim.lock().unwrap();
        let reply = sim.respond(&unhex(hex));
        if let Some(raw) = sim.at_reply.clone() {
            return Ok(raw);
        }
        let hex: String = reply.iter().map(|b| format!("{:02X}", b)).collect();
        Ok(format!(" \"{}\"", hex))
    }
}

pub struct Rig {
    pub device: Device,
    pub wire: Arc<Mutex<Wire>>,
    pub sim: Arc<Mutex<Simulator>>,
}

pub fn test_config(transport_type: TransportType) -> DeviceConfig {
    DeviceConfig {
        response_timeout: Duration::from_millis(600),
        print_messages: true,
        ..DeviceConfig::new(transport_type)
    }
}

pub fn stream_rig(transport_type: TransportType) -> Rig {
    let config = test_config(transport_type);
    let wire = Arc::new(Mutex::new(Wire::default()));
    let sim = Arc::new(Mutex::new(Simulator::new(config.port_number())));
    let transport = Transport::stream(MockStream {
        stream_type: transport_type.stream_type().unwrap(),
        wire: Arc::clone(&wire),
        sim: Arc::clone(&sim),
    });
    Rig {
        device: Device::new(config, transport).unwrap(),
        wire,
        sim,
    }
}

/// A stream transport that is never written to or read from
pub fn idle_stream(stream_type: StreamType) -> MockStream {
    MockStream {
        stream_type,
        wire: Arc::default(),
        sim: Arc::default(),
    }
}

pub fn uart_rig() -> Rig {
    stream_rig(TransportType::Uart)
}

pub fn at_rig() -> (Device, Arc<Mutex<Simulator>>, Arc<Mutex<Vec<String>>>) {
    let sim = Arc::new(Mutex::new(Simulator::new(1)));
    let commands = Arc::new(Mutex::new(Vec::new()));
    let transport = Transport::at(MockAt {
        sim: Arc::clone(&sim),
        commands: Arc::clone(&commands),
    });
    let device = Device::new(test_config(TransportType::At), transport).unwrap();
    (device, sim, commands)
}

/// A valid RTCM3 frame around `payload`
pub fn rtcm_frame(payload: &[u8]) -> Vec<u8> {
    let len = payload.len() as u16;
    let mut frame = vec![0xd3, (len >> 8) as u8, len as u8];
    frame.extend_from_slice(payload);
    let mut crc = ublox_stream::Crc24Q::new();
    crc.update_slice(&frame);
    frame.extend_from_slice(&crc.finalize().to_be_bytes()[1..]);
    frame
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
