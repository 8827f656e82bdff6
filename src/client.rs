// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Per-client state.

use crate::{ring::Ring, timer::TimerHandle};

/// Opaque identifier for an attached client. The device hands these out (or
/// is handed them by the caller, depending on whether clients are
/// externally addressed) and uses them purely as map keys / callback
/// arguments — the core never interprets a `ClientId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

/// A credit counter in one flow-control direction.
///
/// Representing "unlimited" with an all-ones integer invites silent
/// saturation bugs. `Credit::Unbounded` is a dedicated sentinel instead, so
/// arithmetic on a flow-controlled client's counter can never accidentally
/// wrap or stick at `u32::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credit {
    Bounded(u32),
    Unbounded,
}

impl Credit {
    pub fn is_positive(&self) -> bool {
        match self {
            Credit::Unbounded => true,
            Credit::Bounded(n) => *n > 0,
        }
    }

    pub fn value(&self) -> Option<u32> {
        match self {
            Credit::Unbounded => None,
            Credit::Bounded(n) => Some(*n),
        }
    }

    pub fn decrement(&mut self) {
        if let Credit::Bounded(n) = self {
            *n = n.saturating_sub(1);
        }
    }

    pub fn add(&mut self, delta: u32) {
        if let Credit::Bounded(n) = self {
            *n = n.saturating_add(delta);
        }
    }

    pub fn set(&mut self, value: u32) {
        if let Credit::Bounded(n) = self {
            *n = value;
        }
    }
}

/// A single attached client.
pub struct ClientRecord {
    pub id: ClientId,
    flow_control: bool,
    /// Credits the device owes back to the client for client-originated
    /// data already consumed (client→device direction).
    client_tokens: Credit,
    /// Accumulator for batched credit return.
    client_tokens_free: u32,
    /// Credits the client has granted for device→client messages.
    send_tokens: Credit,
    send_queue: Ring<crate::device::Msg>,
    max_send_queue: usize,
    overflow_timer: Option<TimerHandle>,
    overflow_timer_armed: bool,
}

impl ClientRecord {
    pub fn new(
        id: ClientId,
        flow_control: bool,
        max_send_queue: usize,
        initial_client_tokens: u32,
        initial_send_tokens: u32,
    ) -> Self {
        let (client_tokens, send_tokens) = if flow_control {
            (Credit::Bounded(initial_client_tokens), Credit::Bounded(initial_send_tokens))
        } else {
            (Credit::Unbounded, Credit::Unbounded)
        };
        Self {
            id,
            flow_control,
            client_tokens,
            client_tokens_free: 0,
            send_tokens,
            send_queue: Ring::new(),
            max_send_queue,
            overflow_timer: None,
            overflow_timer_armed: false,
        }
    }

    pub fn flow_control(&self) -> bool {
        self.flow_control
    }

    pub fn can_send(&self) -> bool {
        self.send_tokens.is_positive()
    }

    pub fn send_tokens(&self) -> Credit {
        self.send_tokens
    }

    pub fn send_tokens_decrement(&mut self) {
        self.send_tokens.decrement();
    }

    pub fn send_tokens_add(&mut self, n: u32) {
        self.send_tokens.add(n);
    }

    pub fn send_tokens_set(&mut self, n: u32) {
        self.send_tokens.set(n);
    }

    pub fn client_tokens(&self) -> Credit {
        self.client_tokens
    }

    pub fn client_tokens_decrement(&mut self) {
        self.client_tokens.decrement();
    }

    pub fn client_tokens_set(&mut self, n: u32) {
        self.client_tokens.set(n);
    }

    pub fn client_tokens_free(&self) -> u32 {
        self.client_tokens_free
    }

    pub fn client_tokens_free_add(&mut self, n: u32) {
        self.client_tokens_free = self.client_tokens_free.saturating_add(n);
    }

    /// Set the batched accumulator directly, bypassing the normal add path.
    /// Used only by migration restore, which computes the accumulator from
    /// the snapshot rather than building it up one release at a time.
    pub fn client_tokens_free_set(&mut self, n: u32) {
        self.client_tokens_free = n;
    }

    /// Consume the batched accumulator, crediting it onto `client_tokens`:
    /// the batch is mirrored into `client_tokens` when it is flushed via
    /// `send_tokens_to_client`.
    pub fn client_tokens_drain_free(&mut self) -> u32 {
        let n = self.client_tokens_free;
        self.client_tokens_free = 0;
        self.client_tokens.add(n);
        n
    }

    pub fn send_queue_len(&self) -> usize {
        self.send_queue.len()
    }

    pub fn send_queue_is_full(&self) -> bool {
        self.send_queue.len() >= self.max_send_queue
    }

    pub fn send_queue_is_empty(&self) -> bool {
        self.send_queue.is_empty()
    }

    pub fn send_queue_push(&mut self, msg: crate::device::Msg) {
        self.send_queue.add_head(msg);
    }

    pub fn send_queue_pop(&mut self) -> Option<crate::device::Msg> {
        self.send_queue.remove_tail()
    }

    pub fn send_queue_drain(&mut self, mut f: impl FnMut(crate::device::Msg)) {
        self.send_queue.drain_all(&mut f);
    }

    pub fn overflow_timer_armed(&self) -> bool {
        self.overflow_timer_armed
    }

    pub fn arm_overflow_timer(&mut self, handle: TimerHandle) {
        self.overflow_timer = Some(handle);
        self.overflow_timer_armed = true;
    }

    pub fn cancel_overflow_timer(&mut self) {
        if let Some(h) = self.overflow_timer.take() {
            h.cancel();
        }
        self.overflow_timer_armed = false;
    }
}
