// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A client whose send queue has data but no credit for `WAIT_TOKENS_MS` is
//! removed once the overflow timer fires.

use std::{rc::Rc, time::Duration};

use charflow::{client::ClientId, device::Msg};

use super::common::{Recorder, loopback_device};

#[test]
fn wait_for_tokens_timeout_triggers_removal() {
    let rec = Rc::new(Recorder::default());
    let (dev, timer) = loopback_device(rec.clone(), 5, 4);
    let client = ClientId(1);
    dev.client_add(client, true, 4, 10, 0, false).unwrap();
    dev.start();

    rec.inbox.borrow_mut().push_back(Msg::from(b"a".as_slice()));
    dev.read_from_device();
    assert!(rec.removed.borrow().is_empty(), "queue has room, no timeout reached yet");

    timer.advance(Duration::from_millis(29_999));
    assert!(rec.removed.borrow().is_empty());

    timer.advance(Duration::from_millis(1));
    assert_eq!(rec.removed.borrow().as_slice(), &[client]);
    assert!(!dev.client_exists(client));
}
