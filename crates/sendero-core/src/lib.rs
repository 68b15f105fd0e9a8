// SPDX-FileCopyrightText: 2026 Sendero Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Sendero campaign dispatch pipeline.
//!
//! Provides the error taxonomy, shared domain types, and the provider
//! gateway trait used throughout the Sendero workspace.

pub mod error;
pub mod gateway;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::SenderoError;
pub use gateway::{ProviderGateway, SendOutcome, SendRequest};
pub use types::{
    CallbackStatus, Campaign, CampaignStats, CampaignStatus, Contact, DecryptedCampaign,
    DeliveryEvent, DispatchResult, MessageRecord, MessageStatus, RetryResult, is_valid_phone,
};
