// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Test fixtures for gateway integration tests
//!
//! This module provides a small schema with resolvers that exercise the request
//! context, and helpers to bootstrap a gateway on an ephemeral port.

pub mod servers;

pub use servers::*;
