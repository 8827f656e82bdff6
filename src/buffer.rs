// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Write buffers and the per-device reuse pool.
//!
//! A buffer's reference count is realised directly as `Rc::strong_count`:
//! [`WriteBuffer`] is a cheap `Rc`-backed handle, cloning it *is* taking a
//! ref, dropping the last clone *is* releasing it down to zero. The one
//! place a buffer legitimately outlives its queue membership — a migration
//! marshaller holding a snapshot reference — is simply another clone of the
//! handle kept alive for as long as the marshaller needs it.

use std::{cell::RefCell, rc::Rc};

use bytes::BytesMut;

use crate::client::ClientId;

/// Who produced the bytes in a [`WriteBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferOrigin {
    /// Not yet claimed by anyone (pool-resident or freshly allocated).
    None,
    /// Client-originated data awaiting write to the device; consumes (and
    /// later returns) client credit.
    Client,
    /// Server-synthesised outbound data; consumes (and later returns)
    /// self-credit.
    Server,
    /// Server-synthesised outbound data that bypasses credit accounting
    /// entirely.
    ServerNoToken,
}

struct Inner {
    storage: BytesMut,
    used: usize,
    origin: BufferOrigin,
    client: Option<ClientId>,
    token_price: u32,
}

/// A sized byte region, reference-counted so it may briefly outlive the
/// queue it was linked in.
#[derive(Clone)]
pub struct WriteBuffer(Rc<RefCell<Inner>>);

impl WriteBuffer {
    fn new(size: usize) -> Self {
        let mut storage = BytesMut::with_capacity(size);
        storage.resize(size, 0);
        Self(Rc::new(RefCell::new(Inner {
            storage,
            used: 0,
            origin: BufferOrigin::None,
            client: None,
            token_price: 1,
        })))
    }

    pub fn buf_size(&self) -> usize {
        self.0.borrow().storage.len()
    }

    pub fn buf_used(&self) -> usize {
        self.0.borrow().used
    }

    pub fn origin(&self) -> BufferOrigin {
        self.0.borrow().origin
    }

    pub fn client(&self) -> Option<ClientId> {
        self.0.borrow().client
    }

    pub fn token_price(&self) -> u32 {
        self.0.borrow().token_price
    }

    /// Number of live handles to this buffer.
    pub fn refs(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    /// Grow the backing storage so `buf_size >= size`, zero-filling the
    /// extension. Never shrinks (leased buffers are reset, not resized, on
    /// return to the pool).
    pub fn ensure_capacity(&self, size: usize) {
        let mut inner = self.0.borrow_mut();
        if inner.storage.len() < size {
            let extra = size - inner.storage.len();
            inner.storage.resize(inner.storage.len() + extra, 0);
        }
    }

    /// Copy `bytes` into the buffer starting at offset 0, setting
    /// `buf_used = bytes.len()`. Used by `write_buffer_add` callers and by
    /// migration restore.
    pub fn fill(&self, bytes: &[u8]) {
        let mut inner = self.0.borrow_mut();
        assert!(bytes.len() <= inner.storage.len(), "fill exceeds buf_size");
        inner.storage[..bytes.len()].copy_from_slice(bytes);
        inner.used = bytes.len();
    }

    /// Borrow the valid prefix `[0..buf_used)`.
    pub fn with_used_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let inner = self.0.borrow();
        f(&inner.storage[..inner.used])
    }

    pub(crate) fn set_meta(
        &self,
        origin: BufferOrigin,
        client: Option<ClientId>,
        token_price: u32,
    ) {
        let mut inner = self.0.borrow_mut();
        inner.origin = origin;
        inner.client = client;
        inner.token_price = token_price;
    }

    /// Demote a buffer to ownerless: a mid-write buffer belonging to a
    /// removed client keeps writing, but its credit is dropped on the floor
    /// rather than tearing the write.
    pub(crate) fn demote_to_orphan(&self) {
        let mut inner = self.0.borrow_mut();
        inner.origin = BufferOrigin::None;
        inner.client = None;
    }

    fn reset_for_pool(&self) {
        let mut inner = self.0.borrow_mut();
        inner.used = 0;
        inner.origin = BufferOrigin::None;
        inner.client = None;
        inner.token_price = 1;
    }

    fn same_buffer(&self, other: &WriteBuffer) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for WriteBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.0.borrow();
        f.debug_struct("WriteBuffer")
            .field("buf_size", &inner.storage.len())
            .field("buf_used", &inner.used)
            .field("origin", &inner.origin)
            .field("client", &inner.client)
            .field("token_price", &inner.token_price)
            .field("refs", &Rc::strong_count(&self.0))
            .finish()
    }
}

/// Per-device cache of empty, reusable write buffers, bounded by
/// `MAX_POOL_SIZE`.
pub struct WriteBufferPool {
    max_pool_size: usize,
    cur_pool_size: usize,
    cache: Vec<WriteBuffer>,
}

impl WriteBufferPool {
    pub fn new(max_pool_size: usize) -> Self {
        Self { max_pool_size, cur_pool_size: 0, cache: Vec::new() }
    }

    pub fn cur_pool_size(&self) -> usize {
        self.cur_pool_size
    }

    /// Lease a buffer of at least `size` bytes from the LIFO cache, or
    /// allocate fresh if the cache is empty or every cached buffer is too
    /// small. Caller is responsible for setting origin/client/token_price.
    pub fn lease_or_alloc(&mut self, size: usize) -> WriteBuffer {
        if let Some(buf) = self.cache.pop() {
            self.cur_pool_size -= buf.buf_size();
            buf.ensure_capacity(size);
            return buf;
        }
        WriteBuffer::new(size)
    }

    /// Return a buffer leased (or allocated fresh) from this pool back to
    /// the cache, if it is unreferenced elsewhere and the pool has room;
    /// otherwise the buffer is simply dropped (its last `Rc` reference goes
    /// away when the caller drops their handle too).
    pub fn put(&mut self, buf: WriteBuffer) {
        if buf.refs() == 1 && self.cur_pool_size + buf.buf_size() <= self.max_pool_size {
            buf.reset_for_pool();
            self.cur_pool_size += buf.buf_size();
            self.cache.push(buf);
        }
        // else: drop `buf` here, releasing our handle; if some other
        // handle (e.g. a migration marshaller snapshot) is still alive the
        // backing storage survives until that handle drops too.
    }

    /// Drop every cached buffer and reset the accounted size. Called when
    /// the last client is removed.
    pub fn flush(&mut self) {
        self.cache.clear();
        self.cur_pool_size = 0;
    }

    pub fn contains(&self, buf: &WriteBuffer) -> bool {
        self.cache.iter().any(|b| b.same_buffer(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_then_put_reuses_storage() {
        let mut pool = WriteBufferPool::new(640 * 1024);
        let buf = pool.lease_or_alloc(64);
        assert_eq!(buf.buf_size(), 64);
        buf.set_meta(BufferOrigin::Client, Some(ClientId(1)), 1);
        buf.fill(b"hi");
        pool.put(buf);
        assert_eq!(pool.cur_pool_size(), 64);

        let buf2 = pool.lease_or_alloc(10);
        assert_eq!(buf2.origin(), BufferOrigin::None);
        assert_eq!(buf2.buf_used(), 0);
        assert_eq!(pool.cur_pool_size(), 0);
    }

    #[test]
    fn put_refuses_when_still_referenced() {
        let mut pool = WriteBufferPool::new(640 * 1024);
        let buf = pool.lease_or_alloc(32);
        let _extra_ref = buf.clone();
        pool.put(buf);
        assert_eq!(pool.cur_pool_size(), 0, "buffer with refs>1 must not be cached");
    }

    #[test]
    fn put_refuses_beyond_cap() {
        let mut pool = WriteBufferPool::new(16);
        let buf = pool.lease_or_alloc(32);
        pool.put(buf);
        assert_eq!(pool.cur_pool_size(), 0);
    }

    #[test]
    fn flush_clears_cache_and_size() {
        let mut pool = WriteBufferPool::new(640 * 1024);
        let buf = pool.lease_or_alloc(64);
        pool.put(buf);
        assert_eq!(pool.cur_pool_size(), 64);
        pool.flush();
        assert_eq!(pool.cur_pool_size(), 0);
    }
}
