// SPDX-FileCopyrightText: 2026 Sendero Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reqwest-backed [`ProviderGateway`] implementation for the WhatsApp
//! Business API.
//!
//! [`ProviderGateway`]: sendero_core::ProviderGateway

pub mod client;
pub mod types;

pub use client::WhatsAppClient;
