// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The capability table supplied to the core at device-create time. Every
//! method receives `&Device` so a callback that needs to call back into the
//! core — most notably `remove_client`, which is expected to call
//! `client_remove` synchronously — can simply do so; there is no separate
//! back-reference to wire up.

use crate::{
    client::ClientId,
    device::{Device, Msg},
};

/// The read/ref/unref/send/tokens/remove/on_free capability set, expressed
/// as a trait with one optional method (`on_free_self_token`).
pub trait DeviceCallbacks {
    /// Pull one opaque message out of the device, framing raw bytes into a
    /// discrete unit however the upper protocol layer requires. Returns
    /// `None` when no full message is currently available.
    fn read_one_msg_from_device(&self, dev: &Device) -> Option<Msg>;

    /// Idempotent increment before a message is enqueued or fanned out to
    /// more than one client.
    fn ref_msg_to_client(&self, dev: &Device, msg: &Msg);

    /// Called after delivery or discard; may free the message.
    fn unref_msg_to_client(&self, dev: &Device, msg: &Msg);

    /// Hand a message to one client's wire send. Must not free `msg`
    /// synchronously (the core already holds/expects its own ref via
    /// [`DeviceCallbacks::ref_msg_to_client`]). The client record may be
    /// destroyed by the time this call returns.
    fn send_msg_to_client(&self, dev: &Device, msg: &Msg, client: ClientId);

    /// Best-effort batched credit return.
    fn send_tokens_to_client(&self, dev: &Device, client: ClientId, n: u32);

    /// Optional: invoked when a server-originated buffer is released,
    /// freeing up a self-token. May call back into `wakeup`.
    fn on_free_self_token(&self, _dev: &Device) {}

    /// Invoked on overflow or token violation; expected to call
    /// `dev.client_remove(client)` synchronously.
    fn remove_client(&self, dev: &Device, client: ClientId);
}
