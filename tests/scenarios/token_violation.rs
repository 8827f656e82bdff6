// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Requesting a client-origin write buffer while the client owes no credit
//! is a token violation — the buffer request fails
//! and the client is removed.

use std::rc::Rc;

use charflow::{client::ClientId, error::CoreError};

use super::common::{Recorder, loopback_device};

#[test]
fn starved_client_buffer_request_is_a_violation() {
    let rec = Rc::new(Recorder::default());
    let (dev, _timer) = loopback_device(rec.clone(), 5, 4);
    let client = ClientId(1);
    dev.client_add(client, true, 4, 0, 2, false).unwrap();
    dev.start();

    let err = dev.write_buffer_get(Some(client), 64, 0).unwrap_err();
    assert_eq!(err, CoreError::TokenViolation(client));
    assert_eq!(rec.removed.borrow().as_slice(), &[client]);
    assert!(!dev.client_exists(client));
}
