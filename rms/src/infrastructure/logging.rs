// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Tracing bootstrap for binaries and tests embedding the kernel.
//!
//! The kernel itself only emits `tracing` events; installing a
//! subscriber is the embedding application's choice.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs a formatted subscriber honoring `RUST_LOG`, falling back to
/// the given directive (e.g. `"rms=info"`).
///
/// Safe to call more than once; only the first call installs.
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
