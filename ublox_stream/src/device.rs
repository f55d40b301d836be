//! One GNSS chip behind one transport.
//!
//! Everything the chip sends lands in a shared [`RingBuffer`]; each consumer
//! (command responses, [`Device::msg_receive`], the background receiver) reads
//! it through its own cursor. A command/response cycle holds the device's
//! cycle lock from send to reply, so two commands never interleave on the
//! wire, while the transport itself is only locked per read or write.

use std::{
    ops::Deref,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread::{self, ThreadId},
    time::{Duration, Instant},
};

use log::{debug, trace};

use crate::{
    cancel::CancellationToken,
    config::DeviceConfig,
    constants::{
        AT_UBX_COMMAND, AT_UBX_RESPONSE, POLL_INTERVAL, PORT_SETTLE_TIME,
        RING_BUFFER_MAX_FILL_TIME, RING_BUFFER_MIN_FILL_TIME, UBX_ACK_BODY_LEN, UBX_CFG_PRT_BODY_LEN,
        UBX_CFG_PRT_OUT_PROTO_OFFSET, UBX_CHECKSUM_LEN, UBX_CLASS_ACK, UBX_CLASS_CFG, UBX_CLASS_MON,
        UBX_HEADER_LEN, UBX_ID_ACK_ACK, UBX_ID_ACK_NACK, UBX_ID_CFG_PRT, UBX_ID_MON_MSGPP,
        UBX_MON_MSGPP_BODY_LEN, UBX_MON_MSGPP_PORT_STRIDE, UBX_OVERHEAD_LEN, UBX_WILDCARD,
    },
    error::{Error, Result},
    message_id::{ubx_id_matches, MessageId, Protocol, ProtocolMask},
    msg_receive::MsgReceiveTask,
    parser::{decode_ubx_frame, encode_ubx, PARSERS},
    ring_buffer::{ReadHandle, RingBuffer},
    transport::{bin_to_hex, hex_to_bin, StreamType, Transport, TransportType},
};

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Where [`Device::msg_receive`] should put a matched message
pub enum MessageBuffer<'a> {
    /// Allocate exactly what the message needs
    Owned,
    /// Copy into the caller's buffer, skipping whatever does not fit
    Borrowed(&'a mut [u8]),
}

/// Bytes of a received frame, owned or in the caller's buffer
#[derive(Debug, PartialEq, Eq)]
pub enum FrameData<'a> {
    Owned(Vec<u8>),
    Borrowed(&'a [u8]),
}

impl Deref for FrameData<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            FrameData::Owned(v) => v,
            FrameData::Borrowed(s) => s,
        }
    }
}

impl FrameData<'_> {
    pub fn into_vec(self) -> Vec<u8> {
        match self {
            FrameData::Owned(v) => v,
            FrameData::Borrowed(s) => s.to_vec(),
        }
    }
}

/// A complete frame matched by a receive
#[derive(Debug, PartialEq, Eq)]
pub struct ReceivedMessage<'a> {
    pub id: MessageId,
    /// Header, body and trailer, as on the wire
    pub frame: FrameData<'a>,
    /// Bytes of the frame that did not fit the caller's buffer and were dropped
    pub truncated: usize,
}

/// A decoded UBX message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UbxMessage {
    pub class: u8,
    pub id: u8,
    pub body: Vec<u8>,
}

/// State shared between the device and its background receiver
pub(crate) struct Shared {
    pub(crate) config: DeviceConfig,
    pub(crate) ring: RingBuffer,
    transport: Mutex<Transport>,
    /// Held for a whole command/response cycle
    cycle: Mutex<()>,
    foreground_scratch: Mutex<Vec<u8>>,
    receiver_scratch: Mutex<Vec<u8>>,
    receiver_thread: Mutex<Option<ThreadId>>,
    private_handle: ReadHandle,
    msg_handle: ReadHandle,
}

impl Shared {
    fn stream_type(&self) -> Option<StreamType> {
        self.config.transport_type.stream_type()
    }

    fn require_stream(&self) -> Result<()> {
        self.stream_type().map(|_| ()).ok_or(Error::NotSupported)
    }

    pub(crate) fn set_receiver_thread(&self, id: Option<ThreadId>) {
        *lock(&self.receiver_thread) = id;
    }

    fn log_sent(&self, what: &str, data: &[u8]) {
        if self.config.print_messages {
            debug!("sent {}: {}", what, bin_to_hex(data));
        }
    }

    fn log_received(&self, msg: &UbxMessage) {
        if self.config.print_messages {
            debug!(
                "received UBX 0x{:02x} 0x{:02x} [body {} byte(s)]: {}",
                msg.class,
                msg.id,
                msg.body.len(),
                bin_to_hex(&msg.body)
            );
        }
    }

    /// Pulls what the transport has into the ring buffer.
    ///
    /// Waits up to `timeout` for the first byte and then keeps going while
    /// data flows, for at most `max_time` (zero: no limit) or until the ring
    /// is full. A zero `timeout` makes a single pass. Returns the bytes added,
    /// `Timeout` if there were none.
    pub(crate) fn fill_ring_buffer(&self, timeout: Duration, max_time: Duration) -> Result<usize> {
        let stream_type = self.stream_type().ok_or(Error::NotSupported)?;
        let on_receiver = *lock(&self.receiver_thread) == Some(thread::current().id());
        let mut scratch = if on_receiver {
            lock(&self.receiver_scratch)
        } else {
            lock(&self.foreground_scratch)
        };

        let start = Instant::now();
        let mut total = 0;
        loop {
            let available = self.ring.available_size_max();
            let received = {
                let mut transport = lock(&self.transport);
                let Transport::Stream(stream) = &mut *transport else {
                    return Err(Error::NotSupported);
                };
                let receive_size = stream.receive_size()?.min(available);
                let mut received = 0;
                if receive_size > 0 {
                    let want = match stream_type {
                        StreamType::Uart => available,
                        StreamType::I2c => receive_size,
                    }
                    .min(scratch.len());
                    received = stream.read(&mut scratch[..want])?;
                }
                // added before the transport is released, so fillers on
                // other threads cannot reorder the stream
                if received > 0 && !self.ring.force_add(&scratch[..received]) {
                    if total > 0 {
                        break;
                    }
                    return Err(Error::NoMemory);
                }
                received
            };
            if received > 0 {
                total += received;
            } else if available > 0 && !timeout.is_zero() {
                thread::sleep(POLL_INTERVAL);
            }

            let elapsed = start.elapsed();
            let waiting_for_first = total == 0 && elapsed < timeout;
            let still_flowing = received > 0 && (max_time.is_zero() || elapsed < max_time);
            if timeout.is_zero() || available == 0 || !(waiting_for_first || still_flowing) {
                break;
            }
        }
        if total > 0 {
            trace!("filled {} byte(s)", total);
            Ok(total)
        } else {
            Err(Error::Timeout)
        }
    }

    /// Reads or peeks `buf.len()` bytes on `h`, filling from the transport
    /// while they are not there yet, for up to `max_time`
    pub(crate) fn get_from_ring_buffer(
        &self,
        h: ReadHandle,
        buf: &mut [u8],
        mut offset: usize,
        max_time: Duration,
        remove: bool,
    ) -> Result<usize> {
        let start = Instant::now();
        let mut total = 0;
        let mut fill_error = None;
        loop {
            let n = if remove {
                self.ring.read_handle(h, &mut buf[total..])
            } else {
                self.ring.peek_handle(h, &mut buf[total..], offset)
            };
            offset += n;
            total += n;
            if total >= buf.len() || start.elapsed() >= max_time {
                break;
            }
            if n == 0 {
                match self.fill_ring_buffer(RING_BUFFER_MIN_FILL_TIME, max_time / 10) {
                    Ok(_) | Err(Error::Timeout) => {},
                    Err(e) => {
                        fill_error = Some(e);
                        break;
                    },
                }
            }
        }
        if total > 0 || buf.is_empty() {
            Ok(total)
        } else {
            Err(fill_error.unwrap_or(Error::Timeout))
        }
    }

    /// Scans `h` for a frame matched by `wanted`, consuming every frame and
    /// unrecognised byte that is not wanted. Returns the length and id of the
    /// match, left unconsumed at the cursor.
    ///
    /// A UBX-ACK-NACK naming a command matched by a UBX `wanted` ends the scan
    /// with [`Error::Nack`].
    pub(crate) fn decode_ring_buffer(
        &self,
        h: ReadHandle,
        wanted: &MessageId,
    ) -> Result<(usize, MessageId)> {
        const NACK_FRAME_LEN: usize = UBX_OVERHEAD_LEN + UBX_ACK_BODY_LEN;
        loop {
            let (len, id) = self
                .ring
                .parse_handle(h, &PARSERS)
                .map_err(|_| Error::Timeout)?;
            if id.is_wanted(wanted) {
                trace!("decoded {} ({} byte(s))", id, len);
                return Ok((len, id));
            }
            match (wanted, id) {
                (MessageId::Ubx(wanted_ubx), MessageId::Ubx(actual))
                    if actual == u16::from_be_bytes([UBX_CLASS_ACK, UBX_ID_ACK_NACK])
                        && len == NACK_FRAME_LEN =>
                {
                    let mut nack = [0u8; NACK_FRAME_LEN];
                    if self.ring.read_handle(h, &mut nack) == NACK_FRAME_LEN {
                        let (class, id) = (nack[UBX_HEADER_LEN], nack[UBX_HEADER_LEN + 1]);
                        if ubx_id_matches(u16::from_be_bytes([class, id]), *wanted_ubx) {
                            debug!("got NACK for 0x{:02x} 0x{:02x}", class, id);
                            return Err(Error::Nack { class, id });
                        }
                    }
                },
                _ => {
                    trace!("discarding {} ({} byte(s))", id, len);
                    self.ring.discard_handle(h, len);
                },
            }
        }
    }

    /// The correlator: fills, decodes and copies out the first frame matched
    /// by `wanted` on `h`, for up to `timeout` or until `cancel` fires.
    ///
    /// `h` is locked throughout. At least one attempt is made, even with a
    /// zero timeout.
    pub(crate) fn receive_stream_message<'b>(
        &self,
        wanted: &MessageId,
        h: ReadHandle,
        buffer: MessageBuffer<'b>,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<ReceivedMessage<'b>> {
        if matches!(&buffer, MessageBuffer::Borrowed(b) if b.is_empty()) {
            return Err(Error::InvalidParameter("receive buffer is empty"));
        }
        let fill_time = if timeout.is_zero() {
            Duration::ZERO
        } else {
            RING_BUFFER_MIN_FILL_TIME
        };
        let start = Instant::now();
        let _lock = self.ring.lock_read_handle(h);
        let mut buffer = buffer;
        let mut result = Err(Error::Timeout);
        loop {
            let received = match self.fill_ring_buffer(fill_time, Duration::ZERO) {
                Ok(n) => n,
                Err(Error::Timeout | Error::NoMemory) => 0,
                Err(e) => return Err(e),
            };
            if self.ring.data_size_handle(h) > 0 {
                match self.decode_ring_buffer(h, wanted) {
                    Ok((len, id)) => {
                        let read_time = timeout
                            .saturating_sub(start.elapsed())
                            .max(RING_BUFFER_MIN_FILL_TIME);
                        match buffer {
                            MessageBuffer::Owned => {
                                let mut data = Vec::new();
                                if data.try_reserve_exact(len).is_err() {
                                    self.ring.discard_handle(h, len);
                                    return Err(Error::NoMemory);
                                }
                                data.resize(len, 0);
                                match self.get_from_ring_buffer(h, &mut data, 0, read_time, true) {
                                    Ok(n) => {
                                        data.truncate(n);
                                        return Ok(ReceivedMessage {
                                            id,
                                            frame: FrameData::Owned(data),
                                            truncated: 0,
                                        });
                                    },
                                    Err(e) => result = Err(e),
                                }
                                buffer = MessageBuffer::Owned;
                            },
                            MessageBuffer::Borrowed(b) => {
                                let capture = len.min(b.len());
                                match self.get_from_ring_buffer(h, &mut b[..capture], 0, read_time, true) {
                                    Ok(n) => {
                                        // the whole frame is buffered, drop what did not fit
                                        let truncated = self.ring.discard_handle(h, len - n);
                                        let b: &'b [u8] = b;
                                        return Ok(ReceivedMessage {
                                            id,
                                            frame: FrameData::Borrowed(&b[..n]),
                                            truncated,
                                        });
                                    },
                                    Err(e) => result = Err(e),
                                }
                                buffer = MessageBuffer::Borrowed(b);
                            },
                        }
                    },
                    Err(e @ Error::Nack { .. }) => return Err(e),
                    Err(e) => result = Err(e),
                }
            }

            if received == 0 && !timeout.is_zero() {
                thread::sleep(POLL_INTERVAL);
            }
            if timeout.is_zero()
                || start.elapsed() >= timeout
                || cancel.is_some_and(CancellationToken::is_cancelled)
            {
                break;
            }
        }
        result
    }

    fn send_message_stream(&self, data: &[u8]) -> Result<usize> {
        let sent = {
            let mut transport = lock(&self.transport);
            let Transport::Stream(stream) = &mut *transport else {
                return Err(Error::NotSupported);
            };
            stream.write(data)?
        };
        if sent == data.len() {
            self.log_sent("message", data);
        }
        Ok(sent)
    }

    /// Waits on the private cursor for a UBX message matching `class`/`id`
    /// (either may be [`UBX_WILDCARD`])
    fn receive_ubx_stream(&self, class: u8, id: u8, timeout: Duration) -> Result<UbxMessage> {
        let wanted = MessageId::ubx(class, id);
        let msg = self.receive_stream_message(
            &wanted,
            self.private_handle,
            MessageBuffer::Owned,
            timeout,
            None,
        )?;
        let (class, id) = msg.id.ubx_class_id().ok_or(Error::UnexpectedResponse)?;
        let frame = msg.frame;
        if frame.len() < UBX_OVERHEAD_LEN {
            return Err(Error::UnexpectedResponse);
        }
        let ret = UbxMessage {
            class,
            id,
            body: frame[UBX_HEADER_LEN..frame.len() - UBX_CHECKSUM_LEN].to_vec(),
        };
        self.log_received(&ret);
        Ok(ret)
    }

    fn send_receive_ubx_at(
        &self,
        frame: &[u8],
        class: u8,
        id: u8,
        expect_response: bool,
    ) -> Result<Option<UbxMessage>> {
        let command = format!("{}\"{}\"", AT_UBX_COMMAND, bin_to_hex(frame));
        let reply = {
            let mut transport = lock(&self.transport);
            let Transport::At(at) = &mut *transport else {
                return Err(Error::NotSupported);
            };
            at.send_receive(&command, AT_UBX_RESPONSE, self.config.response_timeout)?
        };
        self.log_sent("UBX command", frame);
        if !expect_response {
            return Ok(None);
        }

        let bytes = hex_to_bin(reply.trim().trim_matches('"'));
        if bytes.is_empty() {
            return Err(Error::UnexpectedResponse);
        }
        let decoded = decode_ubx_frame(&bytes)?;
        if decoded.class == UBX_CLASS_ACK
            && decoded.id == UBX_ID_ACK_NACK
            && decoded.body == [class, id]
        {
            debug!("got NACK for 0x{:02x} 0x{:02x}", class, id);
            return Err(Error::Nack { class, id });
        }
        let ret = UbxMessage {
            class: decoded.class,
            id: decoded.id,
            body: decoded.body.to_vec(),
        };
        self.log_received(&ret);
        Ok(Some(ret))
    }

    /// One command/response cycle. `expect` is the class/id of the wanted
    /// reply, wildcards allowed; `None` sends without waiting.
    fn send_receive_ubx_message(
        &self,
        class: u8,
        id: u8,
        body: &[u8],
        expect: Option<(u8, u8)>,
    ) -> Result<Option<UbxMessage>> {
        let frame = encode_ubx(class, id, body)?;
        let _cycle = lock(&self.cycle);

        if self.config.transport_type == TransportType::At {
            return self.send_receive_ubx_at(&frame, class, id, expect.is_some());
        }
        self.require_stream()?;

        // Clear out history on the private cursor and hold it before sending,
        // so the reply cannot be missed
        let _private = match expect {
            Some(_) => {
                if let Err(e @ Error::Transport(_)) =
                    self.fill_ring_buffer(RING_BUFFER_MIN_FILL_TIME, RING_BUFFER_MAX_FILL_TIME)
                {
                    return Err(e);
                }
                let lock = self.ring.lock_read_handle(self.private_handle);
                self.ring.flush_handle(self.private_handle);
                Some(lock)
            },
            None => None,
        };
        self.send_message_stream(&frame)?;
        match expect {
            Some((c, i)) => self
                .receive_ubx_stream(c, i, self.config.response_timeout)
                .map(Some),
            None => Ok(None),
        }
    }

    fn send_only_stream_ubx(&self, class: u8, id: u8, body: &[u8]) -> Result<usize> {
        self.require_stream()?;
        let frame = encode_ubx(class, id, body)?;
        let _cycle = lock(&self.cycle);
        self.send_message_stream(&frame)
    }
}

/// A GNSS chip on a transport
pub struct Device {
    pub(crate) shared: Arc<Shared>,
    pub(crate) msg_receive: Mutex<Option<MsgReceiveTask>>,
}

impl Device {
    /// `transport` must be what `config.transport_type` says it is
    pub fn new(config: DeviceConfig, transport: Transport) -> Result<Self> {
        match (&transport, config.transport_type) {
            (Transport::At(_), TransportType::At) => {},
            (Transport::Stream(s), t) if t.stream_type() == Some(s.stream_type()) => {},
            _ => return Err(Error::InvalidParameter("transport does not match transport type")),
        }
        let ring = RingBuffer::new(config.ring_buffer_size);
        let private_handle = ring.take_read_handle().ok_or(Error::NoMemory)?;
        let msg_handle = ring.take_read_handle().ok_or(Error::NoMemory)?;
        let scratch_size = config.scratch_size.max(1);
        let shared = Shared {
            config,
            ring,
            transport: Mutex::new(transport),
            cycle: Mutex::new(()),
            foreground_scratch: Mutex::new(vec![0; scratch_size]),
            receiver_scratch: Mutex::new(vec![0; scratch_size]),
            receiver_thread: Mutex::new(None),
            private_handle,
            msg_handle,
        };
        Ok(Self {
            shared: Arc::new(shared),
            msg_receive: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.shared.config
    }

    pub fn transport_type(&self) -> TransportType {
        self.shared.config.transport_type
    }

    /// The shared ring buffer, for callers that keep cursors of their own
    pub fn ring_buffer(&self) -> &RingBuffer {
        &self.shared.ring
    }

    /// Waits up to `timeout` for data from the transport, then keeps reading
    /// for up to `max_time` (zero: no limit) while it flows. Returns the bytes
    /// added to the ring buffer.
    pub fn fill_ring_buffer(&self, timeout: Duration, max_time: Duration) -> Result<usize> {
        self.shared.fill_ring_buffer(timeout, max_time)
    }

    /// Reads `buf.len()` bytes from `h`, pulling more from the transport for
    /// up to `max_time` if needed
    pub fn read_ring_buffer(&self, h: ReadHandle, buf: &mut [u8], max_time: Duration) -> Result<usize> {
        self.shared.get_from_ring_buffer(h, buf, 0, max_time, true)
    }

    /// As [`Device::read_ring_buffer`] starting `offset` bytes in, without consuming
    pub fn peek_ring_buffer(
        &self,
        h: ReadHandle,
        buf: &mut [u8],
        offset: usize,
        max_time: Duration,
    ) -> Result<usize> {
        self.shared.get_from_ring_buffer(h, buf, offset, max_time, false)
    }

    pub fn decode_ring_buffer(&self, h: ReadHandle, wanted: &MessageId) -> Result<(usize, MessageId)> {
        self.shared.decode_ring_buffer(h, wanted)
    }

    pub fn receive_stream_message<'b>(
        &self,
        wanted: &MessageId,
        h: ReadHandle,
        buffer: MessageBuffer<'b>,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<ReceivedMessage<'b>> {
        self.shared.require_stream()?;
        self.shared
            .receive_stream_message(wanted, h, buffer, timeout, cancel)
    }

    /// Sends a UBX command and copies the body of the `class`/`id` reply into
    /// `response`, truncating. Returns the bytes copied.
    pub fn send_receive_ubx(&self, class: u8, id: u8, body: &[u8], response: &mut [u8]) -> Result<usize> {
        let reply = self
            .shared
            .send_receive_ubx_message(class, id, body, Some((class, id)))?
            .ok_or(Error::UnexpectedResponse)?;
        let n = reply.body.len().min(response.len());
        response[..n].copy_from_slice(&reply.body[..n]);
        Ok(n)
    }

    /// Sends a UBX command and returns the whole body of the `class`/`id` reply
    pub fn send_receive_ubx_alloc(&self, class: u8, id: u8, body: &[u8]) -> Result<Vec<u8>> {
        self.shared
            .send_receive_ubx_message(class, id, body, Some((class, id)))?
            .map(|reply| reply.body)
            .ok_or(Error::UnexpectedResponse)
    }

    /// Sends a UBX command that the chip acknowledges with UBX-ACK-ACK or
    /// UBX-ACK-NACK
    pub fn send_ubx(&self, class: u8, id: u8, body: &[u8]) -> Result<()> {
        let reply = self
            .shared
            .send_receive_ubx_message(class, id, body, Some((UBX_CLASS_ACK, UBX_WILDCARD)))?
            .ok_or(Error::UnexpectedResponse)?;
        if reply.class != UBX_CLASS_ACK || reply.body != [class, id] {
            return Err(Error::UnexpectedResponse);
        }
        if reply.id == UBX_ID_ACK_ACK {
            Ok(())
        } else {
            Err(Error::Nack { class, id })
        }
    }

    /// Waits for a UBX message matching `class`/`id` (either may be
    /// [`UBX_WILDCARD`]) that arrives outside a command/response cycle
    pub fn receive_ubx_stream(&self, class: u8, id: u8, timeout: Duration) -> Result<UbxMessage> {
        self.shared.require_stream()?;
        self.shared.receive_ubx_stream(class, id, timeout)
    }

    /// Sends a UBX message over a streaming transport without waiting for anything
    pub fn send_only_stream_ubx(&self, class: u8, id: u8, body: &[u8]) -> Result<usize> {
        self.shared.send_only_stream_ubx(class, id, body)
    }

    /// Sends a UBX message the chip does not acknowledge, then checks with
    /// UBX-MON-MSGPP that it was received
    pub fn send_only_check_stream_ubx(&self, class: u8, id: u8, body: &[u8]) -> Result<usize> {
        self.shared.require_stream()?;
        let before = self.port_message_count()?;
        let sent = self.send_only_stream_ubx(class, id, body)?;
        if sent != body.len() + UBX_OVERHEAD_LEN {
            return Err(Error::Platform("message only partly sent"));
        }
        let after = self.port_message_count()?;
        // the MON-MSGPP poll and our message
        if after.wrapping_sub(before) == 2 {
            Ok(sent)
        } else {
            Err(Error::Platform("message not counted by receiver"))
        }
    }

    /// Messages received on our port, from UBX-MON-MSGPP
    fn port_message_count(&self) -> Result<u64> {
        let mut body = [0u8; UBX_MON_MSGPP_BODY_LEN];
        let n = self.send_receive_ubx(UBX_CLASS_MON, UBX_ID_MON_MSGPP, &[], &mut body)?;
        if n != body.len() {
            return Err(Error::UnexpectedResponse);
        }
        let offset = self.shared.config.port_number() as usize * UBX_MON_MSGPP_PORT_STRIDE;
        let counters: [u8; 8] = body
            .get(offset..offset + 8)
            .and_then(|s| s.try_into().ok())
            .ok_or(Error::InvalidParameter("port number out of range"))?;
        Ok(u64::from_le_bytes(counters))
    }

    fn poll_port_config(&self) -> Result<[u8; UBX_CFG_PRT_BODY_LEN]> {
        let mut prt = [0u8; UBX_CFG_PRT_BODY_LEN];
        let port = self.shared.config.port_number();
        let n = self.send_receive_ubx(UBX_CLASS_CFG, UBX_ID_CFG_PRT, &[port], &mut prt)?;
        if n != prt.len() {
            return Err(Error::Platform("short UBX-CFG-PRT response"));
        }
        Ok(prt)
    }

    /// Switches output of `protocol` on our port on or off. UBX output
    /// cannot be switched off, nor can anything be changed over AT.
    pub fn set_protocol_out(&self, protocol: Protocol, on: bool) -> Result<()> {
        if self.transport_type() == TransportType::At {
            return Err(Error::NotSupported);
        }
        if !on && matches!(protocol, Protocol::Ubx | Protocol::All) {
            return Err(Error::InvalidParameter("UBX output cannot be switched off"));
        }
        let bit = protocol
            .mask()
            .ok_or(Error::InvalidParameter("protocol has no output setting"))?;

        let before = self.port_message_count()?;
        let mut prt = self.poll_port_config()?;
        let at = UBX_CFG_PRT_OUT_PROTO_OFFSET;
        let mut mask = ProtocolMask::from_bits_retain(u16::from_le_bytes([prt[at], prt[at + 1]]));
        if protocol == Protocol::All {
            mask = ProtocolMask::from_bits_retain(0xffff);
        } else if on {
            mask.insert(bit);
        } else {
            mask.remove(bit);
        }
        prt[at..at + 2].copy_from_slice(&mask.bits().to_le_bytes());
        self.shared
            .send_receive_ubx_message(UBX_CLASS_CFG, UBX_ID_CFG_PRT, &prt, None)?;

        thread::sleep(PORT_SETTLE_TIME);
        let after = self.port_message_count()?;
        // MON-MSGPP poll, CFG-PRT poll and CFG-PRT set
        if after.wrapping_sub(before) == 3 {
            Ok(())
        } else {
            Err(Error::Platform("port configuration not confirmed"))
        }
    }

    /// Output protocols enabled on our port
    pub fn get_protocol_out(&self) -> Result<ProtocolMask> {
        if self.transport_type() == TransportType::At {
            return Err(Error::NotSupported);
        }
        let prt = self.poll_port_config()?;
        let at = UBX_CFG_PRT_OUT_PROTO_OFFSET;
        Ok(ProtocolMask::from_bits_retain(u16::from_le_bytes([
            prt[at],
            prt[at + 1],
        ])))
    }

    /// Writes raw bytes to the chip
    pub fn msg_send(&self, data: &[u8]) -> Result<usize> {
        self.shared.require_stream()?;
        let _cycle = lock(&self.shared.cycle);
        self.shared.send_message_stream(data)
    }

    /// Waits for the next message matched by `wanted`, on a cursor of its own
    pub fn msg_receive<'b>(
        &self,
        wanted: &MessageId,
        buffer: MessageBuffer<'b>,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<ReceivedMessage<'b>> {
        self.receive_stream_message(wanted, self.shared.msg_handle, buffer, timeout, cancel)
    }

    /// Drops everything waiting for [`Device::msg_receive`] and, if
    /// `async_also`, for the background receiver
    pub fn msg_receive_flush(&self, async_also: bool) -> Result<()> {
        self.shared.require_stream()?;
        if let Err(e @ Error::Transport(_)) = self
            .shared
            .fill_ring_buffer(RING_BUFFER_MIN_FILL_TIME, RING_BUFFER_MAX_FILL_TIME)
        {
            return Err(e);
        }
        self.shared.ring.flush_handle(self.shared.msg_handle);
        if async_also {
            if let Some(task) = lock(&self.msg_receive).as_ref() {
                // waits for a receive pass, and its callbacks, to finish
                let _pass = self.shared.ring.lock_read_handle(task.read_handle());
                self.shared.ring.flush_handle(task.read_handle());
            }
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.msg_receive_stop_all();
    }
}
