// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The timer facility: one-shot timers that the core arms, and which later
//! re-enter the core through a callback. Two windows need one each: the
//! per-device write retry (`WRITE_RETRY_MS`) and the per-client
//! wait-for-tokens overflow timer (`WAIT_TOKENS_MS`).
//!
//! Every timer in this core is allocated, armed, and either fires once or is
//! cancelled — it is never armed-but-dormant — so add+start collapse into
//! [`TimerService::schedule`] and cancel+remove collapse into
//! [`TimerHandle::cancel`].

use std::{rc::Rc, time::Duration};

use tokio_util::sync::CancellationToken;

/// A handle to an armed one-shot timer. Dropping it does *not* cancel the
/// timer — the `CancellationToken` inside, not the handle itself, carries
/// the cancellation semantics — call [`TimerHandle::cancel`] explicitly.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    cancel: CancellationToken,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// A one-shot timer scheduler. The core never touches a thread boundary —
/// this trait exists purely so the write-retry and wait-for-tokens timers
/// can be swapped for a deterministic fake in tests (real wall-clock sleeps
/// would otherwise make overflow tests take 30 real seconds).
pub trait TimerService {
    /// Arm a one-shot timer; `callback` runs once, after `after`, unless
    /// the returned handle is cancelled first.
    fn schedule(&self, after: Duration, callback: Rc<dyn Fn()>) -> TimerHandle;
}

/// Default timer service: one [`tokio::task::LocalSet`] per reactor,
/// `tokio::time::sleep` inside `spawn_local` so the scheduled callback may
/// freely hold `Rc`-based core state (the core is single-threaded with no
/// locking). The same `CancellationToken` idiom used elsewhere for
/// connection soft-stop applies equally well to one-shot timers.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTimer;

impl TimerService for TokioTimer {
    fn schedule(&self, after: Duration, callback: Rc<dyn Fn()>) -> TimerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::task::spawn_local(async move {
            tokio::select! {
                _ = token.cancelled() => {},
                _ = tokio::time::sleep(after) => callback(),
            }
        });
        TimerHandle { cancel }
    }
}

/// Test-only timer service driven by explicit [`ManualTimer::advance`]
/// calls instead of wall-clock time, so overflow/retry scenarios are
/// deterministic and instantaneous.
#[derive(Default)]
pub struct ManualTimer {
    pending: std::cell::RefCell<Vec<Pending>>,
}

struct Pending {
    remaining: Duration,
    handle: TimerHandle,
    callback: Rc<dyn Fn()>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the virtual clock by `dt`, firing (and dropping) any timer
    /// whose remaining duration has elapsed, in the order they were armed.
    pub fn advance(&self, dt: Duration) {
        let mut due = Vec::new();
        {
            let mut pending = self.pending.borrow_mut();
            let mut i = 0;
            while i < pending.len() {
                if pending[i].handle.is_cancelled() {
                    pending.swap_remove(i);
                    continue;
                }
                pending[i].remaining = pending[i].remaining.saturating_sub(dt);
                if pending[i].remaining.is_zero() {
                    due.push(pending.swap_remove(i));
                } else {
                    i += 1;
                }
            }
        }
        for p in due {
            if !p.handle.is_cancelled() {
                (p.callback)();
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }
}

impl TimerService for ManualTimer {
    fn schedule(&self, after: Duration, callback: Rc<dyn Fn()>) -> TimerHandle {
        let handle = TimerHandle { cancel: CancellationToken::new() };
        self.pending.borrow_mut().push(Pending {
            remaining: after,
            handle: handle.clone(),
            callback,
        });
        handle
    }
}
