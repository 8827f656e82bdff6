// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Live-migration snapshot/restore of in-flight write data and outstanding
//! credits.
//!
//! The snapshot header is a fixed-layout `zerocopy` struct: `#[repr(C)]`,
//! big-endian integer fields, derived `FromBytes`/`IntoBytes`. It is never
//! sent over a wire to a peer that cares about cross-architecture byte
//! order, but keeping that shape means a hex-dumped snapshot is just as
//! readable as a hex-dumped protocol header, and the marshaller contract (a
//! byte-assembler with "reserve space, then append") matches how this core
//! already treats `WriteBuffer`.

use bytes::{Bytes, BytesMut};
use zerocopy::{BigEndian, FromBytes, Immutable, IntoBytes, KnownLayout, U32};

use crate::{
    buffer::BufferOrigin,
    client::ClientId,
    device::Device,
    error::CoreError,
};

/// Snapshot format version emitted by this crate. Restore accepts any
/// snapshot with `version <= CHAR_DEVICE_VERSION`.
pub const CHAR_DEVICE_VERSION: u32 = 1;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
struct SnapshotHeader {
    version: U32<BigEndian>,
    connected: u8,
    _reserved: [u8; 3],
    num_client_tokens: U32<BigEndian>,
    num_send_tokens: U32<BigEndian>,
    write_size: U32<BigEndian>,
    write_num_client_tokens: U32<BigEndian>,
}

const SNAPSHOT_HEADER_LEN: usize = std::mem::size_of::<SnapshotHeader>();

/// An opaque byte-assembler the snapshot is emitted into. `reserve` is a
/// capacity hint only; implementors may ignore it.
pub trait Marshaller {
    fn reserve(&mut self, additional: usize);
    fn put_bytes(&mut self, bytes: &[u8]);
}

/// The obvious `Marshaller`: a growable byte buffer.
#[derive(Debug, Default)]
pub struct BytesMarshaller(BytesMut);

impl BytesMarshaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Bytes {
        self.0.freeze()
    }
}

impl Marshaller for BytesMarshaller {
    fn reserve(&mut self, additional: usize) {
        self.0.reserve(additional);
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        self.0.extend_from_slice(bytes);
    }
}

/// `migrate_data_marshall_empty(out)`: the empty-device form — version plus
/// `connected=0`, everything else zero. Usable even before a `Device` has
/// been created (e.g. to pre-size a snapshot slot for a not-yet-attached
/// peer).
pub fn migrate_data_marshall_empty(out: &mut impl Marshaller) {
    let hdr = SnapshotHeader { version: U32::new(CHAR_DEVICE_VERSION), ..Default::default() };
    out.reserve(SNAPSHOT_HEADER_LEN);
    out.put_bytes(hdr.as_bytes());
}

impl Device {
    /// Serialises in-flight write data and outstanding credits into `out`.
    /// Requires exactly one attached client whose send queue is empty;
    /// anything else is rejected the same way `client_add(...,
    /// wait_for_migrate_data=true)` rejects an ineligible device —
    /// `MigrateRejected` is reused here because both mean "this device is
    /// not in a state migration can act on".
    pub fn migrate_data_marshall(&self, out: &mut impl Marshaller) -> Result<(), CoreError> {
        let inner = self.inner().borrow();
        if inner.clients.len() != 1 {
            return Err(CoreError::MigrateRejected);
        }
        let rec = inner.clients.values().next().expect("checked len == 1 above");
        if !rec.send_queue_is_empty() {
            return Err(CoreError::MigrateRejected);
        }

        let num_client_tokens = rec.client_tokens().value().unwrap_or(0);
        let num_send_tokens = rec.send_tokens().value().unwrap_or(0);

        let mut write_data = Vec::new();
        let mut write_num_client_tokens = 0u32;
        if let Some(cur) = inner.cur_write_buf.as_ref() {
            let pos = inner.cur_write_buf_pos;
            cur.with_used_bytes(|bytes| write_data.extend_from_slice(&bytes[pos..]));
            if cur.origin() == BufferOrigin::Client {
                write_num_client_tokens += cur.token_price();
            }
        }
        for buf in inner.write_queue.iter() {
            buf.with_used_bytes(|bytes| write_data.extend_from_slice(bytes));
            if buf.origin() == BufferOrigin::Client {
                write_num_client_tokens += buf.token_price();
            }
        }

        let hdr = SnapshotHeader {
            version: U32::new(CHAR_DEVICE_VERSION),
            connected: 1,
            _reserved: [0; 3],
            num_client_tokens: U32::new(num_client_tokens),
            num_send_tokens: U32::new(num_send_tokens),
            write_size: U32::new(write_data.len() as u32),
            write_num_client_tokens: U32::new(write_num_client_tokens),
        };
        out.reserve(SNAPSHOT_HEADER_LEN + write_data.len());
        out.put_bytes(hdr.as_bytes());
        out.put_bytes(&write_data);
        Ok(())
    }

    /// Restores in-flight write data and credits from a snapshot produced by
    /// `migrate_data_marshall`. `initial_client_tokens_window` is the
    /// implementer-supplied bootstrap value — the client-tokens window the
    /// fresh device would otherwise start the client at.
    pub fn restore(&self, data: &[u8], initial_client_tokens_window: u32) -> Result<(), CoreError> {
        if data.len() < SNAPSHOT_HEADER_LEN {
            return Err(CoreError::MigrateRejected);
        }
        let hdr = SnapshotHeader::read_from_bytes(&data[..SNAPSHOT_HEADER_LEN])
            .map_err(|_| CoreError::MigrateRejected)?;
        if hdr.version.get() > CHAR_DEVICE_VERSION {
            return Err(CoreError::MigrateVersion {
                found: hdr.version.get(),
                supported: CHAR_DEVICE_VERSION,
            });
        }
        if hdr.connected != 1 {
            return Err(CoreError::MigrateRejected);
        }

        let client: ClientId = {
            let inner = self.inner().borrow();
            if inner.cur_write_buf.is_some() || !inner.write_queue.is_empty() {
                return Err(CoreError::MigrateRejected);
            }
            if inner.clients.len() != 1 {
                return Err(CoreError::MigrateRejected);
            }
            *inner.clients.keys().next().expect("checked len == 1 above")
        };

        let num_client_tokens = hdr.num_client_tokens.get();
        let num_send_tokens = hdr.num_send_tokens.get();
        let write_size = hdr.write_size.get() as usize;
        let write_num_client_tokens = hdr.write_num_client_tokens.get();
        if data.len() < SNAPSHOT_HEADER_LEN + write_size {
            return Err(CoreError::MigrateRejected);
        }

        let client_tokens_free = initial_client_tokens_window
            .saturating_sub(num_client_tokens)
            .saturating_sub(write_num_client_tokens);

        {
            let mut inner = self.inner().borrow_mut();
            if let Some(rec) = inner.clients.get_mut(&client) {
                rec.client_tokens_set(num_client_tokens);
                rec.client_tokens_free_set(client_tokens_free);
                rec.send_tokens_set(num_send_tokens);
            }
            inner.wait_for_migrate_data = false;

            if write_size > 0 {
                let body = &data[SNAPSHOT_HEADER_LEN..SNAPSHOT_HEADER_LEN + write_size];
                let buf = inner.pool.lease_or_alloc(write_size);
                buf.fill(body);
                if write_num_client_tokens > 0 {
                    buf.set_meta(BufferOrigin::Client, Some(client), write_num_client_tokens);
                } else {
                    buf.set_meta(BufferOrigin::Server, None, 1);
                }
                inner.cur_write_buf = Some(buf);
                inner.cur_write_buf_pos = 0;
            }
        }

        self.write_to_device();
        self.read_from_device();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::{callbacks::DeviceCallbacks, device::Msg, io::LoopbackDevice, timer::ManualTimer};

    struct NoopCallbacks;
    impl DeviceCallbacks for NoopCallbacks {
        fn read_one_msg_from_device(&self, _dev: &Device) -> Option<Msg> {
            None
        }
        fn ref_msg_to_client(&self, _dev: &Device, _msg: &Msg) {}
        fn unref_msg_to_client(&self, _dev: &Device, _msg: &Msg) {}
        fn send_msg_to_client(&self, _dev: &Device, _msg: &Msg, _client: ClientId) {}
        fn send_tokens_to_client(&self, _dev: &Device, _client: ClientId, _n: u32) {}
        fn remove_client(&self, dev: &Device, client: ClientId) {
            dev.client_remove(client);
        }
    }

    fn new_device() -> Device {
        Device::new(
            Box::new(LoopbackDevice::new()),
            Rc::new(ManualTimer::new()),
            Rc::new(NoopCallbacks),
            5,
            4,
        )
    }

    #[test]
    fn empty_snapshot_round_trips_on_fresh_device() {
        let mut out = BytesMarshaller::new();
        migrate_data_marshall_empty(&mut out);
        let bytes = out.into_bytes();
        assert_eq!(bytes.len(), SNAPSHOT_HEADER_LEN);
        let hdr = SnapshotHeader::read_from_bytes(&bytes[..]).unwrap();
        assert_eq!(hdr.version.get(), CHAR_DEVICE_VERSION);
        assert_eq!(hdr.connected, 0);
    }

    #[test]
    fn snapshot_then_restore_preserves_credits_and_inflight_bytes() {
        let dev = new_device();
        dev.client_add(ClientId(1), true, 4, 10, 6, false).unwrap();
        dev.start();

        for _ in 0..3 {
            let buf = dev.write_buffer_get(Some(ClientId(1)), 1, 0).unwrap();
            buf.fill(b"x");
            // Consume without writing so it stays queued — stand-in for
            // "3 buffers released without crossing the batch threshold" by
            // directly crediting as release would, to exercise client_tokens
            // bookkeeping independent of the write pump.
            dev.write_buffer_release(buf);
        }
        // interval is 5; 3 releases of price 1 leave client_tokens_free=3,
        // not yet flushed. Each of the 5 `write_buffer_get` calls above and
        // below decrements client_tokens by one at acquisition time, so the
        // running total is 10 - 5 = 5 once the two still-outstanding
        // buffers below are also accounted for.

        let queued = dev.write_buffer_get(Some(ClientId(1)), 200, 0).unwrap();
        queued.fill(&vec![7u8; 200]);
        dev.inner().borrow_mut().write_queue.add_head(queued);

        let inflight = dev.write_buffer_get(Some(ClientId(1)), 50, 0).unwrap();
        inflight.fill(&vec![9u8; 50]);
        dev.inner().borrow_mut().cur_write_buf = Some(inflight);
        dev.inner().borrow_mut().cur_write_buf_pos = 0;

        let mut out = BytesMarshaller::new();
        dev.migrate_data_marshall(&mut out).unwrap();
        let snapshot = out.into_bytes();

        let hdr = SnapshotHeader::read_from_bytes(&snapshot[..SNAPSHOT_HEADER_LEN]).unwrap();
        assert_eq!(hdr.connected, 1);
        assert_eq!(hdr.num_client_tokens.get(), 5);
        assert_eq!(hdr.write_size.get(), 250);
        assert_eq!(hdr.write_num_client_tokens.get(), 2);

        let fresh = new_device();
        fresh.client_add(ClientId(42), true, 4, 0, 0, true).unwrap();
        fresh.restore(&snapshot, 10).unwrap();

        let inner = fresh.inner().borrow();
        let rec = &inner.clients[&ClientId(42)];
        assert_eq!(rec.client_tokens().value(), Some(5));
        assert_eq!(rec.client_tokens_free(), 3);
        assert_eq!(rec.send_tokens().value(), Some(6));
        let cur = inner.cur_write_buf.as_ref().unwrap();
        assert_eq!(cur.buf_used(), 250);
    }
}
