// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

#![allow(clippy::all)]

//! Aggregator entry point for the scenario tests, one module per scenario
//! file.

mod scenarios {
    pub mod common;

    pub mod credit_starved_queueing;
    pub mod migration_round_trip;
    pub mod overflow_by_queue_fullness;
    pub mod overflow_by_timeout;
    pub mod token_violation;
    pub mod write_retry;
}
