//! Background delivery of messages to callbacks.
//!
//! The first [`Device::msg_receive_start`] spawns a thread with a cursor of
//! its own; it keeps pulling from the transport and hands every decoded
//! message to each reader whose pattern matches it. The thread stops when
//! the last reader is removed.

use std::{
    sync::{
        mpsc::{self, Sender, TryRecvError},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, warn};

use crate::{
    constants::{MAX_RECEIVE_READERS, MSG_READ_TIMEOUT, RECEIVE_TASK_YIELD},
    device::{lock, Device, Shared},
    error::{Error, Result},
    message_id::MessageId,
    ring_buffer::ReadHandle,
};

/// Identifies a reader added with [`Device::msg_receive_start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReaderHandle(u32);

type Callback = Box<dyn FnMut(&MessageId, usize, &mut MessageReader<'_>) + Send>;

struct Reader {
    handle: ReaderHandle,
    wanted: MessageId,
    callback: Callback,
}

/// Access to the message a callback was called for.
///
/// Reads consume the message; whatever no reader consumes is skipped once all
/// callbacks have run.
pub struct MessageReader<'a> {
    shared: &'a Shared,
    handle: ReadHandle,
    left: &'a mut usize,
}

impl MessageReader<'_> {
    /// Bytes of the message not yet read
    pub fn remaining(&self) -> usize {
        *self.left
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = buf.len().min(*self.left);
        if n == 0 {
            return Ok(0);
        }
        let read = self
            .shared
            .get_from_ring_buffer(self.handle, &mut buf[..n], 0, MSG_READ_TIMEOUT, true)?;
        *self.left -= read;
        Ok(read)
    }

    /// Copies from the start of the unread part without consuming
    pub fn peek(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = buf.len().min(*self.left);
        if n == 0 {
            return Ok(0);
        }
        self.shared
            .get_from_ring_buffer(self.handle, &mut buf[..n], 0, MSG_READ_TIMEOUT, false)
    }
}

pub(crate) struct MsgReceiveTask {
    thread: JoinHandle<()>,
    exit: Sender<()>,
    read_handle: ReadHandle,
    readers: Arc<Mutex<Vec<Reader>>>,
    next_reader: u32,
}

impl MsgReceiveTask {
    fn start(shared: &Arc<Shared>) -> Result<Self> {
        let read_handle = shared.ring.take_read_handle().ok_or(Error::NoMemory)?;
        let readers = Arc::new(Mutex::new(Vec::new()));
        let (exit, exit_rx) = mpsc::channel();
        let spawned = {
            let shared = Arc::clone(shared);
            let readers = Arc::clone(&readers);
            thread::Builder::new()
                .name("gnss-msg-receive".into())
                .spawn(move || receive_task(&shared, read_handle, &readers, &exit_rx))
        };
        match spawned {
            Ok(thread) => Ok(Self {
                thread,
                exit,
                read_handle,
                readers,
                next_reader: 0,
            }),
            Err(e) => {
                warn!("could not start message receive thread: {}", e);
                shared.ring.give_read_handle(read_handle);
                Err(Error::NoMemory)
            },
        }
    }

    pub(crate) fn read_handle(&self) -> ReadHandle {
        self.read_handle
    }

    fn stop(self, shared: &Shared) {
        // the thread also exits if the sender is gone
        let _ = self.exit.send(());
        if self.thread.join().is_err() {
            warn!("message receive thread panicked");
        }
        shared.ring.give_read_handle(self.read_handle);
        debug!("message receive thread stopped");
    }
}

fn receive_task(
    shared: &Shared,
    handle: ReadHandle,
    readers: &Mutex<Vec<Reader>>,
    exit: &mpsc::Receiver<()>,
) {
    shared.set_receiver_thread(Some(thread::current().id()));
    debug!("message receive thread running");

    while let Err(TryRecvError::Empty) = exit.try_recv() {
        // held for one pass; between passes other fillers may overrun us
        let pass = shared.ring.lock_read_handle(handle);
        let received = match shared.fill_ring_buffer(Duration::ZERO, Duration::ZERO) {
            Ok(n) => n,
            Err(Error::Timeout) => 0,
            Err(e) => {
                debug!("message receive fill: {}", e);
                0
            },
        };

        let mut drained = true;
        while shared.ring.data_size_handle(handle) > 0 {
            let Ok((len, id)) = shared.decode_ring_buffer(handle, &MessageId::Any) else {
                // a partial frame, wait for the rest
                drained = false;
                break;
            };
            let mut left = len;
            for reader in lock(readers)
                .iter_mut()
                .filter(|r| id.is_wanted(&r.wanted))
            {
                let mut message = MessageReader {
                    shared,
                    handle,
                    left: &mut left,
                };
                (reader.callback)(&id, len, &mut message);
            }
            shared.ring.discard_handle(handle, left);
        }
        drop(pass);

        let idle = received == 0 && drained;
        thread::sleep(if idle {
            RECEIVE_TASK_YIELD * 2
        } else {
            RECEIVE_TASK_YIELD
        });
    }
    shared.set_receiver_thread(None);
}

impl Device {
    /// Calls `callback` from a background thread for every message matched by
    /// `wanted`, with the message id, its length and a [`MessageReader`] over it.
    ///
    /// The callback must not call back into the receive API of this device.
    pub fn msg_receive_start<F>(&self, wanted: MessageId, callback: F) -> Result<ReaderHandle>
    where
        F: FnMut(&MessageId, usize, &mut MessageReader<'_>) + Send + 'static,
    {
        if self.shared.config.transport_type.stream_type().is_none() {
            return Err(Error::NotSupported);
        }
        let mut task = lock(&self.msg_receive);
        if task.is_none() {
            *task = Some(MsgReceiveTask::start(&self.shared)?);
        }
        let Some(task) = task.as_mut() else {
            return Err(Error::NoMemory);
        };
        let mut readers = lock(&task.readers);
        if readers.len() >= MAX_RECEIVE_READERS {
            return Err(Error::NoMemory);
        }
        let handle = ReaderHandle(task.next_reader);
        task.next_reader = task.next_reader.wrapping_add(1);
        readers.push(Reader {
            handle,
            wanted,
            callback: Box::new(callback),
        });
        debug!("added reader {:?} for {}", handle, wanted);
        Ok(handle)
    }

    /// Removes a reader, stopping the background thread with the last one
    pub fn msg_receive_stop(&self, handle: ReaderHandle) -> Result<()> {
        let mut slot = lock(&self.msg_receive);
        let Some(task) = slot.as_ref() else {
            return Err(Error::NotFound);
        };
        let now_empty = {
            let mut readers = lock(&task.readers);
            let before = readers.len();
            readers.retain(|r| r.handle != handle);
            if readers.len() == before {
                return Err(Error::NotFound);
            }
            readers.is_empty()
        };
        if now_empty {
            if let Some(task) = slot.take() {
                task.stop(&self.shared);
            }
        }
        Ok(())
    }

    /// Removes every reader and stops the background thread
    pub fn msg_receive_stop_all(&self) {
        if let Some(task) = lock(&self.msg_receive).take() {
            task.stop(&self.shared);
        }
    }

    /// Bytes the background thread lost because it fell behind the transport
    pub fn msg_receive_stat_read_loss(&self) -> usize {
        lock(&self.msg_receive)
            .as_ref()
            .map_or(0, |task| self.shared.ring.stat_read_loss(task.read_handle))
    }

    /// Bytes that could not be buffered at all because a locked cursor was full
    pub fn msg_receive_stat_stream_loss(&self) -> usize {
        self.shared.ring.stat_add_loss()
    }
}
