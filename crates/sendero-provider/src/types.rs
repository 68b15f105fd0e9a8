// SPDX-FileCopyrightText: 2026 Sendero Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types for the WhatsApp Business template-message endpoint.

use serde::{Deserialize, Serialize};

/// Outbound template-message request body.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateMessage {
    pub messaging_product: &'static str,
    pub to: String,
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub template: Template,
}

#[derive(Debug, Clone, Serialize)]
pub struct Template {
    pub name: String,
    pub language: Language,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Component>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Language {
    pub code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Component {
    #[serde(rename = "type")]
    pub component_type: &'static str,
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Parameter {
    #[serde(rename = "type")]
    pub parameter_type: &'static str,
    pub text: String,
}

/// Successful send response. Only the accepted message id matters.
#[derive(Debug, Clone, Deserialize)]
pub struct SendResponse {
    pub messages: Vec<AcceptedMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcceptedMessage {
    pub id: String,
}

/// Error envelope returned on rejected sends.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub message: String,
    #[serde(default)]
    pub code: Option<i64>,
}
