// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Shared black-box test fixtures for the scenario tests: a recording
//! [`DeviceCallbacks`] implementation and device-construction helpers, built
//! entirely on `charflow`'s public API (no access to crate-internal state).

use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use charflow::{
    callbacks::DeviceCallbacks,
    client::ClientId,
    device::{Device, Msg},
    io::{DeviceCaps, DeviceIo, LoopbackDevice},
    timer::ManualTimer,
};

/// Records every externally observable effect of the callback table: what
/// was delivered to which client, which clients were removed (and why
/// doesn't matter at this layer — overflow and token violation both surface
/// here identically, since both route through `remove_client`), and how much
/// credit was batched back.
#[derive(Default)]
pub struct Recorder {
    pub sent: RefCell<Vec<(ClientId, Vec<u8>)>>,
    pub removed: RefCell<Vec<ClientId>>,
    pub tokens_returned: RefCell<Vec<(ClientId, u32)>>,
    pub inbox: RefCell<VecDeque<Msg>>,
}

impl DeviceCallbacks for Recorder {
    fn read_one_msg_from_device(&self, _dev: &Device) -> Option<Msg> {
        self.inbox.borrow_mut().pop_front()
    }

    fn ref_msg_to_client(&self, _dev: &Device, _msg: &Msg) {}

    fn unref_msg_to_client(&self, _dev: &Device, _msg: &Msg) {}

    fn send_msg_to_client(&self, _dev: &Device, msg: &Msg, client: ClientId) {
        self.sent.borrow_mut().push((client, msg.to_vec()));
    }

    fn send_tokens_to_client(&self, _dev: &Device, client: ClientId, n: u32) {
        self.tokens_returned.borrow_mut().push((client, n));
    }

    fn remove_client(&self, dev: &Device, client: ClientId) {
        self.removed.borrow_mut().push(client);
        dev.client_remove(client);
    }
}

/// A device I/O double whose `write` replies follow a canned script, used
/// to exercise the write pump's retry path deterministically.
#[derive(Default)]
pub struct ScriptedIo {
    pub write_replies: VecDeque<std::io::Result<usize>>,
}

impl DeviceIo for ScriptedIo {
    fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        Ok(0)
    }

    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.write_replies.pop_front() {
            Some(reply) => reply,
            None => Ok(buf.len()),
        }
    }

    fn caps(&self) -> DeviceCaps {
        DeviceCaps::empty()
    }
}

/// A device over a plain [`LoopbackDevice`], timed by a [`ManualTimer`] so
/// overflow/retry windows advance instantaneously under test control.
pub fn loopback_device(
    rec: Rc<Recorder>,
    client_tokens_interval: u32,
    self_tokens: u32,
) -> (Device, Rc<ManualTimer>) {
    let timer = Rc::new(ManualTimer::new());
    let dev =
        Device::new(Box::new(LoopbackDevice::new()), timer.clone(), rec, client_tokens_interval, self_tokens);
    (dev, timer)
}

/// A device over a [`ScriptedIo`], for deterministic write-pump scripting.
pub fn scripted_device(
    io: ScriptedIo,
    rec: Rc<Recorder>,
    client_tokens_interval: u32,
    self_tokens: u32,
) -> (Device, Rc<ManualTimer>) {
    let timer = Rc::new(ManualTimer::new());
    let dev = Device::new(Box::new(io), timer.clone(), rec, client_tokens_interval, self_tokens);
    (dev, timer)
}
