// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A credit-starved client queues every message, then drains in order the
//! moment credit is granted.

use std::rc::Rc;

use charflow::{client::ClientId, device::Msg};

use super::common::{Recorder, loopback_device};

#[test]
fn credit_starved_client_queues_then_drains_in_order() {
    let rec = Rc::new(Recorder::default());
    let (dev, _timer) = loopback_device(rec.clone(), 5, 4);
    let client = ClientId(1);
    dev.client_add(client, true, 4, 10, 0, false).unwrap();
    dev.start();

    rec.inbox.borrow_mut().extend([
        Msg::from(b"a".as_slice()),
        Msg::from(b"b".as_slice()),
        Msg::from(b"c".as_slice()),
    ]);
    dev.read_from_device();

    assert!(rec.sent.borrow().is_empty(), "no credit yet, nothing should be delivered");
    assert!(rec.removed.borrow().is_empty());

    dev.send_tokens_add(client, 3);

    let sent = rec.sent.borrow();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0], (client, b"a".to_vec()));
    assert_eq!(sent[1], (client, b"b".to_vec()));
    assert_eq!(sent[2], (client, b"c".to_vec()));
    assert!(rec.removed.borrow().is_empty());
}
