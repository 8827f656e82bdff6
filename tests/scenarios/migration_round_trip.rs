// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A single flow-controlled client consumes three CLIENT buffers without
//! crossing the batch threshold, leaving one queued
//! and one in-flight CLIENT buffer outstanding. A snapshot/restore
//! round-trip onto a fresh device must faithfully carry forward the
//! in-flight bytes and every outstanding credit.
//!
//! The restored device's credit state isn't directly observable through the
//! public API (by design — `Device` exposes behaviour, not a queryable
//! credit ledger), so this test proves the round-trip the same way any
//! caller would notice a mismatch: once the restored in-flight buffer
//! finishes writing, its credit is released and — having pushed
//! `client_tokens_free` across the batch threshold — shows up as a single
//! `send_tokens_to_client` callback carrying the expected total.

use std::rc::Rc;

use charflow::{client::ClientId, migration::BytesMarshaller};

use super::common::{Recorder, ScriptedIo, loopback_device, scripted_device};

#[test]
fn snapshot_then_restore_preserves_credits_and_inflight_bytes() {
    let rec = Rc::new(Recorder::default());
    let mut io = ScriptedIo::default();
    // Three 1-byte writes complete immediately; the 200-byte and 50-byte
    // buffers both stall (the device "goes away" mid-migration), leaving one
    // current and one queued CLIENT buffer behind.
    io.write_replies.push_back(Ok(1));
    io.write_replies.push_back(Ok(1));
    io.write_replies.push_back(Ok(1));
    io.write_replies.push_back(Ok(0));
    io.write_replies.push_back(Ok(0));
    let (dev, _timer) = scripted_device(io, rec.clone(), 5, 4);
    let client = ClientId(1);
    dev.client_add(client, true, 4, 10, 6, false).unwrap();
    dev.start();

    for _ in 0..3 {
        let buf = dev.write_buffer_get(Some(client), 1, 0).unwrap();
        buf.fill(b"x");
        dev.write_buffer_add(buf);
    }
    assert!(rec.tokens_returned.borrow().is_empty(), "batch threshold (5) not yet crossed");

    let queued = dev.write_buffer_get(Some(client), 200, 0).unwrap();
    queued.fill(&vec![7u8; 200]);
    dev.write_buffer_add(queued);

    let inflight = dev.write_buffer_get(Some(client), 50, 0).unwrap();
    inflight.fill(&vec![9u8; 50]);
    dev.write_buffer_add(inflight);

    let mut out = BytesMarshaller::new();
    dev.migrate_data_marshall(&mut out).unwrap();
    let snapshot = out.into_bytes();

    let fresh_rec = Rc::new(Recorder::default());
    let (fresh, _fresh_timer) = loopback_device(fresh_rec.clone(), 5, 4);
    fresh.start();
    let fresh_client = ClientId(42);
    fresh.client_add(fresh_client, true, 4, 0, 0, true).unwrap();
    fresh.restore(&snapshot, 10).unwrap();

    assert!(fresh.client_exists(fresh_client));
    // The restored in-flight buffer (250 bytes, price 2) drains instantly
    // against a plain loopback device, pushing the restored
    // client_tokens_free (3, from 10 - 5 - 2) past the interval-5 threshold
    // together with the 2 it just earned — the single batched return is the
    // externally visible proof the restore reconstructed both numbers
    // correctly.
    assert_eq!(fresh_rec.tokens_returned.borrow().as_slice(), &[(fresh_client, 5)]);
}
