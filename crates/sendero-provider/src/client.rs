// SPDX-FileCopyrightText: 2026 Sendero Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the WhatsApp Business template-message endpoint.
//!
//! Provides [`WhatsAppClient`], which handles request construction, bearer
//! authentication, and the bounded per-call timeout. Rejections and transport
//! failures surface as [`SendOutcome::Rejected`] so the dispatch loop can
//! record them per message and keep going.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use sendero_config::ProviderConfig;
use sendero_core::{ProviderGateway, SendOutcome, SendRequest, SenderoError};
use tracing::{debug, warn};

use crate::types::{
    ApiErrorResponse, Component, Language, Parameter, SendResponse, Template, TemplateMessage,
};

/// WhatsApp Business API client.
#[derive(Debug, Clone)]
pub struct WhatsAppClient {
    client: reqwest::Client,
    base_url: String,
    template_language: String,
}

impl WhatsAppClient {
    /// Build a client from provider configuration. Fails when no API token
    /// is configured; outbound sends are impossible without one.
    pub fn new(config: &ProviderConfig) -> Result<Self, SenderoError> {
        let token = config.api_token.as_deref().ok_or_else(|| {
            SenderoError::Config("provider.api_token is required for dispatch".to_string())
        })?;

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| SenderoError::Config(format!("invalid API token header value: {e}")))?;
        auth.set_sensitive(true);
        headers.insert("authorization", auth);
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SenderoError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            template_language: config.template_language.clone(),
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn build_body(&self, request: &SendRequest) -> TemplateMessage {
        // Placeholder keys are positional ("1", "2", ...); order parameters
        // numerically, not lexically, so "10" follows "9".
        let mut keys: Vec<&String> = request.variables.keys().collect();
        keys.sort_by_key(|k| k.parse::<u64>().unwrap_or(u64::MAX));

        let parameters: Vec<Parameter> = keys
            .into_iter()
            .map(|k| Parameter {
                parameter_type: "text",
                text: request.variables[k].clone(),
            })
            .collect();

        let components = if parameters.is_empty() {
            Vec::new()
        } else {
            vec![Component {
                component_type: "body",
                parameters,
            }]
        };

        TemplateMessage {
            messaging_product: "whatsapp",
            to: request.to.clone(),
            message_type: "template",
            template: Template {
                name: request.template_id.clone(),
                language: Language {
                    code: self.template_language.clone(),
                },
                components,
            },
        }
    }
}

#[async_trait]
impl ProviderGateway for WhatsAppClient {
    async fn send(&self, request: &SendRequest) -> Result<SendOutcome, SenderoError> {
        let body = self.build_body(request);
        let url = format!("{}/messages", self.base_url);

        let response = match self.client.post(&url).json(&body).send().await {
            Ok(response) => response,
            // Transport failure or timeout: a per-message outcome, not a
            // batch-fatal error.
            Err(e) => {
                warn!(to = %request.to, error = %e, "provider request failed");
                return Ok(SendOutcome::Rejected {
                    error_code: None,
                    error_message: format!("request failed: {e}"),
                });
            }
        };

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        debug!(status = %status, to = %request.to, "provider response received");

        if status.is_success() {
            let parsed: SendResponse =
                serde_json::from_str(&text).map_err(|e| SenderoError::Provider {
                    message: format!("unparseable provider response: {e}"),
                    source: Some(Box::new(e)),
                })?;
            let accepted = parsed.messages.first().ok_or_else(|| SenderoError::Provider {
                message: "provider response contained no message id".to_string(),
                source: None,
            })?;
            return Ok(SendOutcome::Accepted {
                provider_message_id: accepted.id.clone(),
            });
        }

        let (error_code, error_message) =
            if let Ok(api_err) = serde_json::from_str::<ApiErrorResponse>(&text) {
                (
                    api_err.error.code.map(|c| c.to_string()),
                    api_err.error.message,
                )
            } else {
                (None, format!("provider returned {status}: {text}"))
            };
        warn!(to = %request.to, status = %status, error = %error_message, "send rejected");

        Ok(SendOutcome::Rejected {
            error_code,
            error_message,
        })
    }
}
