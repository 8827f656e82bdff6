// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The device-side I/O collaborator: a non-blocking byte stream plus a
//! capability flag telling the write pump whether it needs to arm its own
//! retry timer.

use std::collections::VecDeque;

bitflags::bitflags! {
    /// Capability flags advertised by a [`DeviceIo`] implementation.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceCaps: u8 {
        /// The driver will notify the core (via `wakeup`) when it becomes
        /// writable again; the core must not install its own write-retry
        /// timer.
        const NOTIFY_WRITABLE = 0x01;
    }
}

/// Non-blocking byte-stream primitive supplied by the device driver.
///
/// `read`/`write` follow the classic non-blocking contract: `Ok(0)` or an
/// `Err` of kind `WouldBlock` both mean "no progress possible right now",
/// never a fatal condition by themselves.
pub trait DeviceIo {
    /// Non-blocking read into `buf`. Returns the number of bytes read, or
    /// `Ok(0)` if nothing is currently available.
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Non-blocking write of `buf`. Returns the number of bytes written
    /// (which may be less than `buf.len()`), or `Ok(0)` if the device is
    /// currently blocked.
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize>;

    /// Capability flags for this device instance.
    fn caps(&self) -> DeviceCaps {
        DeviceCaps::empty()
    }

    /// Optional informational state callback.
    fn set_state(&mut self, _up: bool) {}
}

/// An in-memory loopback device: bytes written are immediately available to
/// be read back. Used by the demo binary and by tests that need a device
/// without touching a real socket or TTY.
#[derive(Debug, Default)]
pub struct LoopbackDevice {
    buf: VecDeque<u8>,
    /// Caps this instance to emulate.
    caps: DeviceCaps,
    /// Per-call cap on bytes accepted by `write`, used to emulate a slow
    /// or short-writing device and exercise the write-retry path.
    max_write_chunk: Option<usize>,
    up: bool,
}

impl LoopbackDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_caps(caps: DeviceCaps) -> Self {
        Self { caps, ..Self::default() }
    }

    /// Constrain every `write` call to accept at most `n` bytes, to exercise
    /// the write pump's retry path deterministically.
    pub fn with_max_write_chunk(mut self, n: usize) -> Self {
        self.max_write_chunk = Some(n);
        self
    }

    /// Feed bytes that a subsequent `read_from_device` call will pick up —
    /// stands in for inbound traffic arriving on the device.
    pub fn push_inbound(&mut self, bytes: &[u8]) {
        self.buf.extend(bytes);
    }

    pub fn is_up(&self) -> bool {
        self.up
    }
}

impl DeviceIo for LoopbackDevice {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = buf.len().min(self.buf.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.buf.pop_front().expect("checked len above");
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let cap = self.max_write_chunk.unwrap_or(buf.len());
        Ok(buf.len().min(cap))
    }

    fn caps(&self) -> DeviceCaps {
        self.caps
    }

    fn set_state(&mut self, up: bool) {
        self.up = up;
    }
}
