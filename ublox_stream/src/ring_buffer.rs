//! Fixed-size byte ring shared by several independent read cursors.
//!
//! Writers never block: [`RingBuffer::force_add`] drops the oldest unread bytes
//! of any cursor that would overflow, unless that cursor is locked, in which
//! case the add is refused. A handle that is not (or no longer) taken reads as
//! empty.

use std::{
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    thread::{self, ThreadId},
};

use log::{debug, warn};

use crate::{
    constants::MAX_READ_HANDLES,
    error::ParseError,
    message_id::MessageId,
    parser::{dispatch, FrameParser, ParseCursor},
};

/// A read cursor into a [`RingBuffer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReadHandle(usize);

impl ReadHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

struct Cursor {
    read: usize,
    lock_owner: Option<ThreadId>,
    lock_depth: usize,
    read_loss: usize,
}

struct Inner {
    buf: Box<[u8]>,
    write: usize,
    cursors: Vec<Option<Cursor>>,
    add_loss: usize,
}

impl Inner {
    fn size(&self) -> usize {
        self.buf.len()
    }

    fn used(&self, read: usize) -> usize {
        (self.write + self.size() - read) % self.size()
    }

    fn cursor(&self, h: ReadHandle) -> Option<&Cursor> {
        self.cursors.get(h.0).and_then(Option::as_ref)
    }

    fn cursor_mut(&mut self, h: ReadHandle) -> Option<&mut Cursor> {
        self.cursors.get_mut(h.0).and_then(Option::as_mut)
    }

    /// Unread data of `h` from `offset` on, as the two sides of the wrap
    fn slices(&self, h: ReadHandle, offset: usize) -> (&[u8], &[u8]) {
        let Some(cursor) = self.cursor(h) else {
            return (&[], &[]);
        };
        let used = self.used(cursor.read);
        if offset >= used {
            return (&[], &[]);
        }
        let start = (cursor.read + offset) % self.size();
        if start <= self.write {
            (&self.buf[start..self.write], &[])
        } else {
            (&self.buf[start..], &self.buf[..self.write])
        }
    }

    fn copy_out(&self, h: ReadHandle, offset: usize, out: &mut [u8]) -> usize {
        let (head, tail) = self.slices(h, offset);
        let from_head = head.len().min(out.len());
        out[..from_head].copy_from_slice(&head[..from_head]);
        let from_tail = tail.len().min(out.len() - from_head);
        out[from_head..from_head + from_tail].copy_from_slice(&tail[..from_tail]);
        from_head + from_tail
    }

    fn advance(&mut self, h: ReadHandle, count: usize) -> usize {
        let size = self.size();
        let write = self.write;
        match self.cursor_mut(h) {
            Some(cursor) => {
                let used = (write + size - cursor.read) % size;
                let count = count.min(used);
                cursor.read = (cursor.read + count) % size;
                count
            },
            None => 0,
        }
    }
}

pub struct RingBuffer {
    inner: Mutex<Inner>,
    unlocked: Condvar,
}

impl RingBuffer {
    /// Holds at most `size - 1` bytes
    pub fn new(size: usize) -> Self {
        let size = size.max(2);
        Self {
            inner: Mutex::new(Inner {
                buf: vec![0; size].into_boxed_slice(),
                write: 0,
                cursors: (0..MAX_READ_HANDLES).map(|_| None).collect(),
                add_loss: 0,
            }),
            unlocked: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.lock().size() - 1
    }

    /// Takes a free cursor, starting at the current end of the data
    pub fn take_read_handle(&self) -> Option<ReadHandle> {
        let mut inner = self.lock();
        let write = inner.write;
        let free = inner.cursors.iter().position(Option::is_none)?;
        inner.cursors[free] = Some(Cursor {
            read: write,
            lock_owner: None,
            lock_depth: 0,
            read_loss: 0,
        });
        Some(ReadHandle(free))
    }

    pub fn give_read_handle(&self, h: ReadHandle) {
        let mut inner = self.lock();
        if let Some(slot) = inner.cursors.get_mut(h.0) {
            *slot = None;
        }
        self.unlocked.notify_all();
    }

    /// Appends `data`, overwriting the oldest bytes of unlocked cursors that
    /// fall behind. Returns false, and adds nothing, if `data` can never fit
    /// or if a locked cursor would lose data.
    pub fn force_add(&self, data: &[u8]) -> bool {
        let mut inner = self.lock();
        let size = inner.size();
        let len = data.len();
        if len >= size {
            inner.add_loss += len;
            warn!("ring buffer: {} byte(s) too big to add", len);
            return false;
        }
        let capacity = size - 1;
        let blocked = inner
            .cursors
            .iter()
            .flatten()
            .any(|c| c.lock_depth > 0 && inner.used(c.read) + len > capacity);
        if blocked {
            inner.add_loss += len;
            warn!("ring buffer: locked reader is full, {} byte(s) lost", len);
            return false;
        }

        let write = inner.write;
        for (i, cursor) in inner.cursors.iter_mut().enumerate() {
            let Some(cursor) = cursor else {
                continue;
            };
            let used = (write + size - cursor.read) % size;
            if used + len > capacity {
                let dropped = used + len - capacity;
                cursor.read = (cursor.read + dropped) % size;
                cursor.read_loss += dropped;
                debug!("ring buffer: reader {} overrun, {} byte(s) lost", i, dropped);
            }
        }

        let first = len.min(size - write);
        inner.buf[write..write + first].copy_from_slice(&data[..first]);
        inner.buf[..len - first].copy_from_slice(&data[first..]);
        inner.write = (write + len) % size;
        true
    }

    /// Largest add that cannot fail: the least free space of any locked cursor
    pub fn available_size_max(&self) -> usize {
        let inner = self.lock();
        let capacity = inner.size() - 1;
        inner
            .cursors
            .iter()
            .flatten()
            .filter(|c| c.lock_depth > 0)
            .map(|c| capacity - inner.used(c.read))
            .min()
            .unwrap_or(capacity)
    }

    pub fn data_size_handle(&self, h: ReadHandle) -> usize {
        let inner = self.lock();
        inner.cursor(h).map_or(0, |c| inner.used(c.read))
    }

    /// Copies out and consumes up to `buf.len()` bytes
    pub fn read_handle(&self, h: ReadHandle, buf: &mut [u8]) -> usize {
        let mut inner = self.lock();
        let n = inner.copy_out(h, 0, buf);
        inner.advance(h, n)
    }

    /// Consumes up to `count` bytes without copying them
    pub fn discard_handle(&self, h: ReadHandle, count: usize) -> usize {
        self.lock().advance(h, count)
    }

    /// Copies up to `buf.len()` bytes starting `offset` bytes past the cursor,
    /// leaving the cursor where it is
    pub fn peek_handle(&self, h: ReadHandle, buf: &mut [u8], offset: usize) -> usize {
        self.lock().copy_out(h, offset, buf)
    }

    /// Drops everything unread on `h`
    pub fn flush_handle(&self, h: ReadHandle) {
        let mut inner = self.lock();
        let write = inner.write;
        if let Some(cursor) = inner.cursor_mut(h) {
            cursor.read = write;
        }
    }

    /// Locks `h` against overwrite until the guard is dropped.
    ///
    /// Re-entrant on the calling thread; a lock held by another thread is
    /// waited for.
    pub fn lock_read_handle(&self, h: ReadHandle) -> ReadLock<'_> {
        let me = thread::current().id();
        let mut inner = self.lock();
        loop {
            let Some(cursor) = inner.cursor_mut(h) else {
                break;
            };
            if cursor.lock_owner.is_none_or(|owner| owner == me) {
                cursor.lock_owner = Some(me);
                cursor.lock_depth += 1;
                break;
            }
            inner = self
                .unlocked
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
        ReadLock { ring: self, h }
    }

    fn unlock_read_handle(&self, h: ReadHandle) {
        let mut inner = self.lock();
        if let Some(cursor) = inner.cursor_mut(h) {
            cursor.lock_depth = cursor.lock_depth.saturating_sub(1);
            if cursor.lock_depth == 0 {
                cursor.lock_owner = None;
                self.unlocked.notify_all();
            }
        }
    }

    pub fn is_locked(&self, h: ReadHandle) -> bool {
        self.lock().cursor(h).is_some_and(|c| c.lock_depth > 0)
    }

    /// Bytes `h` lost to overwrites
    pub fn stat_read_loss(&self, h: ReadHandle) -> usize {
        self.lock().cursor(h).map_or(0, |c| c.read_loss)
    }

    /// Bytes refused by [`RingBuffer::force_add`]
    pub fn stat_add_loss(&self) -> usize {
        self.lock().add_loss
    }

    /// Runs `parsers` over the unread data of `h`, see [`dispatch`].
    ///
    /// Does not consume. A frame still incomplete when the cursor holds all the
    /// ring can take will never complete, so its first byte is reported as
    /// unknown to let the scan move on.
    pub fn parse_handle(
        &self,
        h: ReadHandle,
        parsers: &[FrameParser],
    ) -> Result<(usize, MessageId), ParseError> {
        let inner = self.lock();
        let full = inner
            .cursor(h)
            .is_some_and(|c| inner.used(c.read) >= inner.size() - 1);
        let (head, tail) = inner.slices(h, 0);
        let mut cursor = ParseCursor::new(head, tail);
        match dispatch(&mut cursor, parsers) {
            Err(ParseError::Incomplete) if full => Ok((1, MessageId::Unknown)),
            other => other,
        }
    }
}

/// Guard returned by [`RingBuffer::lock_read_handle`]
pub struct ReadLock<'a> {
    ring: &'a RingBuffer,
    h: ReadHandle,
}

impl ReadLock<'_> {
    pub fn handle(&self) -> ReadHandle {
        self.h
    }
}

impl Drop for ReadLock<'_> {
    fn drop(&mut self) {
        self.ring.unlock_read_handle(self.h);
    }
}
