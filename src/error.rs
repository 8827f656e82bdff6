// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Error kinds surfaced by the character-device flow-control core.
//!
//! Most faults are not exceptions in the classical sense: a
//! [`CoreError::TokenViolation`] or [`CoreError::Overflow`] is routed to the
//! `remove_client` callback rather than unwound through `?`, and a stalled
//! device write is not an error at all (the write-retry timer handles it
//! silently). `CoreError` exists for the handful of operations that must
//! return a typed failure to their caller: buffer acquisition, migration
//! restore, and client registration.

use thiserror::Error;

use crate::client::ClientId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A client attempted to send while owing no credit (`client_tokens=0`,
    /// not a migrated buffer). The client is removed; callers must treat a
    /// `None` return from buffer-get as ordinary back-pressure.
    #[error("client {0:?} violated its token window")]
    TokenViolation(ClientId),

    /// A client's send queue reached `max_send_queue`, or its
    /// wait-for-tokens timer elapsed. The client is removed.
    #[error("client {0:?} overflowed its send queue")]
    Overflow(ClientId),

    /// A write buffer was submitted or requested for a client no longer
    /// attached to the device.
    #[error("unknown client {0:?}")]
    UnknownClient(ClientId),

    /// `client_add` was called with `wait_for_migrate_data=true` while a
    /// client already exists or the device is active.
    #[error("migrate-data wait rejected: device already has clients or is active")]
    MigrateRejected,

    /// A migration snapshot declared a version newer than this crate
    /// supports.
    #[error("migration snapshot version {found} is newer than supported {supported}")]
    MigrateVersion { found: u32, supported: u32 },

    /// A server-originated buffer was requested while `self_tokens=0`.
    #[error("server write-buffer pool exhausted (no self tokens)")]
    PoolExhausted,
}
