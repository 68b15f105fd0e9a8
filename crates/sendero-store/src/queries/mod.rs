// SPDX-FileCopyrightText: 2026 Sendero Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules. All functions accept `&Database` and funnel SQL
//! through the single-writer connection.

pub mod audit;
pub mod campaigns;
pub mod messages;
