// Copyright 2026 Blobtap Contributors
// SPDX-License-Identifier: Apache-2.0

//! Blobtap runtime library: drives a Chromium page and saves every inline
//! resource and Web Audio buffer it produces, each exactly once.
//!
//! This library crate exposes the runtime modules for integration testing.

pub mod capture;
pub mod cli;
pub mod config;
pub mod events;
pub mod instrument;
pub mod renderer;
pub mod target;
