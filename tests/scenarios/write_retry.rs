// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The device accepts one byte, then blocks; submitting a 3-byte client
//! buffer leaves a partial write pending until the retry
//! timer fires and the remainder drains, at which point the client's credit
//! is released (batched once it crosses the configured interval).

use std::{rc::Rc, time::Duration};

use charflow::{client::ClientId, device::WRITE_RETRY_MS};

use super::common::{Recorder, ScriptedIo, scripted_device};

#[test]
fn partial_write_retries_then_completes_and_credits_client() {
    let rec = Rc::new(Recorder::default());
    let mut io = ScriptedIo::default();
    io.write_replies.push_back(Ok(1));
    io.write_replies.push_back(Ok(0));
    io.write_replies.push_back(Ok(2));
    // client_tokens_interval = 1 so the single release flushes immediately.
    let (dev, timer) = scripted_device(io, rec.clone(), 1, 4);
    let client = ClientId(1);
    dev.client_add(client, true, 4, 10, 2, false).unwrap();
    dev.start();

    let buf = dev.write_buffer_get(Some(client), 3, 0).unwrap();
    buf.fill(b"abc");
    dev.write_buffer_add(buf);

    // First write accepted 1 byte, second call (still inside write_to_device's
    // loop) returned 0 — the buffer is left partially drained and a retry is
    // armed rather than looping forever.
    assert!(rec.tokens_returned.borrow().is_empty());

    timer.advance(Duration::from_millis(WRITE_RETRY_MS));

    assert_eq!(rec.tokens_returned.borrow().as_slice(), &[(client, 1)]);
}
