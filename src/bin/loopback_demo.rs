// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A runnable illustration of the flow-control core: one [`LoopbackDevice`]
//! bridged to two in-process mock clients, driven through a handful of
//! read/write cycles while send credit is granted and then exhausted.

use std::{cell::RefCell, rc::Rc};

use anyhow::{Context, Result};
use charflow::{
    callbacks::DeviceCallbacks,
    cfg::{cli::resolve_config_path, config::Config, logger::init_logger},
    client::ClientId,
    device::{Device, Msg},
    io::LoopbackDevice,
    timer::TokioTimer,
};
use tracing::info;

/// Frames raw device bytes one-byte-per-message (the core never interprets
/// payload, so any framing scheme is equally valid for a demo) and logs
/// every hand-off in place of an actual wire send.
struct DemoCallbacks {
    delivered: RefCell<Vec<(ClientId, u8)>>,
}

impl DemoCallbacks {
    fn new() -> Self {
        Self { delivered: RefCell::new(Vec::new()) }
    }
}

impl DeviceCallbacks for DemoCallbacks {
    fn read_one_msg_from_device(&self, dev: &Device) -> Option<Msg> {
        let mut byte = [0u8; 1];
        match dev.read_raw(&mut byte) {
            Ok(1) => Some(Msg::from(byte.as_slice())),
            _ => None,
        }
    }

    fn ref_msg_to_client(&self, _dev: &Device, _msg: &Msg) {}

    fn unref_msg_to_client(&self, _dev: &Device, _msg: &Msg) {}

    fn send_msg_to_client(&self, _dev: &Device, msg: &Msg, client: ClientId) {
        let byte = msg.first().copied().unwrap_or(0);
        info!(?client, byte, "delivered message to client");
        self.delivered.borrow_mut().push((client, byte));
    }

    fn send_tokens_to_client(&self, _dev: &Device, client: ClientId, n: u32) {
        info!(?client, n, "batched client-credit return");
    }

    fn remove_client(&self, dev: &Device, client: ClientId) {
        info!(?client, "removing client (overflow or token violation)");
        dev.client_remove(client);
    }
}

fn main() -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build single-threaded runtime")?;
    let local = tokio::task::LocalSet::new();
    local.block_on(&rt, run())
}

async fn run() -> Result<()> {
    let logger_path = resolve_config_path("config/logger.yaml")
        .context("failed to resolve logger config path")?;
    let _guard = init_logger(logger_path.to_str().context("non-utf8 logger config path")?)
        .context("failed to init logger")?;

    let cfg = resolve_config_path("config/device.yaml")
        .and_then(Config::load_from_file)
        .context("failed to resolve or load device config")?;

    let mut io = LoopbackDevice::new();
    io.push_inbound(b"abc");

    let callbacks = Rc::new(DemoCallbacks::new());
    let dev = Device::new(
        Box::new(io),
        Rc::new(TokioTimer),
        callbacks.clone(),
        cfg.device.client_tokens_interval,
        4,
    );

    let client_a = ClientId(1);
    let client_b = ClientId(2);
    dev.client_add(client_a, true, 4, 10, 0, false)?;
    dev.client_add(client_b, true, 4, 10, 2, false)?;

    dev.start();
    info!(
        delivered = callbacks.delivered.borrow().len(),
        "after start: client_b (send_tokens=2) received some bytes, client_a queued the rest"
    );

    dev.send_tokens_add(client_a, 3);
    info!(
        delivered = callbacks.delivered.borrow().len(),
        "after granting client_a 3 send tokens, its queued bytes drained"
    );

    let buf = dev.write_buffer_get(Some(client_a), 4, 0)?;
    buf.fill(b"xyz");
    dev.write_buffer_add(buf);
    info!("submitted a client-originated write, drained by the write pump");

    dev.stop();
    Ok(())
}
