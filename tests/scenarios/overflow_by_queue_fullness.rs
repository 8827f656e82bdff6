// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A client whose send queue fills past `max_send_queue` is removed, and
//! every message queued for it is released.

use std::rc::Rc;

use charflow::{client::ClientId, device::Msg};

use super::common::{Recorder, loopback_device};

#[test]
fn queue_fullness_triggers_removal() {
    let rec = Rc::new(Recorder::default());
    let (dev, _timer) = loopback_device(rec.clone(), 5, 4);
    let client = ClientId(1);
    dev.client_add(client, true, 2, 10, 0, false).unwrap();
    dev.start();

    rec.inbox.borrow_mut().extend([
        Msg::from(b"a".as_slice()),
        Msg::from(b"b".as_slice()),
        Msg::from(b"c".as_slice()),
    ]);
    dev.read_from_device();

    assert_eq!(rec.removed.borrow().as_slice(), &[client]);
    assert!(!dev.client_exists(client));
    // The overflowing third message and the two already-queued ones never
    // reach a callback's `send_msg_to_client` once the client is gone.
    assert!(rec.sent.borrow().is_empty());
}
