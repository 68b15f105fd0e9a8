// SPDX-FileCopyrightText: 2026 Sendero Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `sendero serve` command implementation.
//!
//! Starts the campaign HTTP API and the delivery-callback endpoint, recovers
//! campaigns stranded in `sending` by a previous process, and spawns the
//! periodic expiry sweep.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use hmac::{Hmac, Mac};
use sendero_config::model::SenderoConfig;
use sendero_core::{Campaign, ProviderGateway, SenderoError};
use sendero_engine::{CallbackPayload, DispatchEngine, reconcile};
use sendero_provider::WhatsAppClient;
use sendero_store::{CampaignStore, Database, NewCampaign};
use sendero_sweep::{SweepSettings, Sweeper};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared state for axum request handlers.
#[derive(Clone)]
struct AppState {
    store: CampaignStore,
    /// `None` when no provider token is configured; dispatch and retry are
    /// then rejected with a configuration error.
    engine: Option<DispatchEngine>,
    sweeper: Sweeper,
    default_country_code: String,
    /// HMAC-SHA256 secret for callback signatures. `None` rejects all
    /// callbacks (fail-closed).
    signing_secret: Option<String>,
}

/// Runs the `sendero serve` command.
pub async fn run_serve(config: SenderoConfig) -> Result<(), SenderoError> {
    init_tracing(&config.service.log_level);
    info!("starting sendero serve");

    let key_hex = config
        .campaign
        .encryption_key
        .as_deref()
        .ok_or_else(|| {
            SenderoError::Config("campaign.encryption_key is required to serve".to_string())
        })?;

    let db = Database::open(&config.storage.database_path).await?;
    let store = CampaignStore::new(db, key_hex, config.campaign.ttl_hours as i64)?;

    // Crash recovery: a dispatch never survives a restart.
    let recovered = store.recover_stale_sending().await?;
    if recovered > 0 {
        warn!(count = recovered, "recovered campaigns stuck in sending");
    }

    let engine = match &config.provider.api_token {
        Some(_) => {
            let gateway: Arc<dyn ProviderGateway> =
                Arc::new(WhatsAppClient::new(&config.provider)?);
            Some(DispatchEngine::new(
                store.clone(),
                gateway,
                config.dispatch.rate_per_second,
                config.dispatch.default_max_attempts as i64,
            ))
        }
        None => {
            warn!("no provider API token configured, outbound dispatch disabled");
            None
        }
    };

    let sweeper = Sweeper::new(
        store.clone(),
        SweepSettings {
            aggressive_age_hours: config.sweep.aggressive_age_hours,
            log_retention_hours: config.sweep.log_retention_hours,
        },
    );
    tokio::spawn(
        sweeper
            .clone()
            .run_periodic(Duration::from_secs(config.sweep.interval_minutes * 60)),
    );

    if config.callback.signing_secret.is_none() {
        warn!("no callback signing secret configured, all delivery callbacks will be rejected");
    }

    let state = AppState {
        store,
        engine,
        sweeper,
        default_country_code: config.ingest.default_country_code.clone(),
        signing_secret: config.callback.signing_secret.clone(),
    };

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&config.service.bind_address)
        .await
        .map_err(|e| SenderoError::Internal(format!(
            "failed to bind to {}: {e}",
            config.service.bind_address
        )))?;
    info!("listening on {}", config.service.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| SenderoError::Internal(format!("server error: {e}")))?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/campaigns", post(create_campaign).get(list_campaigns))
        .route("/campaigns/{id}", get(get_campaign).delete(delete_campaign))
        .route("/campaigns/{id}/dispatch", post(dispatch_campaign))
        .route("/campaigns/{id}/retry", post(retry_campaign))
        .route("/campaigns/{id}/stats", get(get_stats))
        .route("/callbacks/whatsapp", post(receive_callback))
        .route("/admin/cleanup", post(run_cleanup))
        .route("/admin/audit", get(get_audit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to install shutdown signal handler");
    } else {
        info!("shutdown signal received");
    }
}

/// Error wrapper mapping domain failures to HTTP responses.
struct ApiError(SenderoError);

impl From<SenderoError> for ApiError {
    fn from(e: SenderoError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SenderoError::Validation(_) | SenderoError::EmptyInput => StatusCode::BAD_REQUEST,
            SenderoError::NotFound { .. } => StatusCode::NOT_FOUND,
            SenderoError::Expired { .. } => StatusCode::GONE,
            SenderoError::Conflict(_) => StatusCode::CONFLICT,
            SenderoError::Provider { .. } => StatusCode::BAD_GATEWAY,
            SenderoError::Config(_) | SenderoError::Store { .. } | SenderoError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            warn!(error = %self.0, "request failed");
        }
        let body = Json(serde_json::json!({
            "success": false,
            "error": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct CreateCampaignRequest {
    name: String,
    template_id: String,
    #[serde(default)]
    variable_mappings: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    default_values: std::collections::BTreeMap<String, String>,
    /// Raw contact file content (CSV or semicolon-separated).
    contacts_csv: String,
}

#[derive(Debug, Serialize)]
struct CreateCampaignResponse {
    campaign: Campaign,
    /// Rows rejected during ingestion, with 1-based row numbers.
    skipped_rows: Vec<SkippedRow>,
}

#[derive(Debug, Serialize)]
struct SkippedRow {
    row: usize,
    reason: String,
}

async fn create_campaign(
    State(state): State<AppState>,
    Json(request): Json<CreateCampaignRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.name.trim().is_empty() {
        return Err(SenderoError::Validation("campaign name must not be empty".into()).into());
    }
    if request.template_id.trim().is_empty() {
        return Err(SenderoError::Validation("template_id must not be empty".into()).into());
    }

    let report = sendero_ingest::ingest(
        request.contacts_csv.as_bytes(),
        &state.default_country_code,
    )?;

    let campaign = state
        .store
        .create(
            NewCampaign {
                name: request.name,
                template_id: request.template_id,
                variable_mappings: request.variable_mappings,
                default_values: request.default_values,
            },
            &report.contacts,
        )
        .await?;

    let skipped_rows = report
        .errors
        .into_iter()
        .map(|e| SkippedRow {
            row: e.row,
            reason: e.reason,
        })
        .collect();

    Ok((
        StatusCode::CREATED,
        Json(CreateCampaignResponse {
            campaign,
            skipped_rows,
        }),
    ))
}

async fn list_campaigns(State(state): State<AppState>) -> Result<Json<Vec<Campaign>>, ApiError> {
    Ok(Json(state.store.list().await?))
}

async fn get_campaign(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Campaign>, ApiError> {
    Ok(Json(state.store.get_meta(&id).await?))
}

async fn delete_campaign(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.store.delete(&id).await? {
        Some(messages_removed) => Ok(Json(serde_json::json!({
            "success": true,
            "messages_removed": messages_removed,
        }))),
        None => Err(SenderoError::NotFound { campaign_id: id }.into()),
    }
}

async fn dispatch_campaign(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = state.engine.as_ref().ok_or_else(|| {
        SenderoError::Config("provider.api_token is required for dispatch".to_string())
    })?;
    let result = engine.dispatch(&id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "result": result,
    })))
}

#[derive(Debug, Default, Deserialize)]
struct RetryRequest {
    #[serde(default)]
    max_attempts: Option<i64>,
}

async fn retry_campaign(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<RetryRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = state.engine.as_ref().ok_or_else(|| {
        SenderoError::Config("provider.api_token is required for retry".to_string())
    })?;
    let max_attempts = body.and_then(|Json(r)| r.max_attempts);
    let result = engine.retry(&id, max_attempts).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "result": result,
    })))
}

async fn get_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state.store.stats(&id).await?;
    Ok(Json(serde_json::json!({
        "campaign_id": id,
        "stats": stats,
    })))
}

/// Delivery callback endpoint.
///
/// The signature is verified over the raw body bytes before any parsing;
/// unsigned or mis-signed callbacks are rejected. Unknown provider message
/// ids are acknowledged with `matched: false` so the provider stops
/// redelivering them.
async fn receive_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let Some(secret) = state.signing_secret.as_deref() else {
        warn!("callback rejected: no signing secret configured");
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    };
    let signature = headers
        .get("x-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !verify_signature(secret, &body, signature) {
        warn!("callback rejected: invalid signature");
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    }

    let payload: CallbackPayload = serde_json::from_slice(&body)
        .map_err(|e| SenderoError::Validation(format!("malformed callback body: {e}")))?;
    let matched = reconcile(&state.store, &payload).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "matched": matched,
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
struct CleanupRequest {
    #[serde(default)]
    mode: CleanupMode,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum CleanupMode {
    #[default]
    Routine,
    Aggressive,
}

async fn run_cleanup(
    State(state): State<AppState>,
    Json(request): Json<CleanupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let report = match request.mode {
        CleanupMode::Routine => state.sweeper.sweep_expired().await?,
        CleanupMode::Aggressive => state.sweeper.sweep_aggressive().await?,
    };
    match report {
        Some(report) => Ok(Json(serde_json::json!({
            "success": true,
            "report": report,
        }))),
        None => Ok(Json(serde_json::json!({
            "success": true,
            "skipped": "sweep already in flight",
        }))),
    }
}

#[derive(Debug, Deserialize)]
struct AuditQuery {
    #[serde(default = "default_audit_limit")]
    limit: u64,
}

fn default_audit_limit() -> u64 {
    50
}

async fn get_audit(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = state.store.recent_audit(query.limit).await?;
    let entries: Vec<serde_json::Value> = entries
        .into_iter()
        .map(|e| {
            serde_json::json!({
                "id": e.id,
                "action": e.action,
                "resource_type": e.resource_type,
                "resource_id": e.resource_id,
                "details": e.details,
                "security": e.security,
                "created_at": e.created_at,
            })
        })
        .collect();
    Ok(Json(entries))
}

async fn get_health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Verify an `X-Signature` header: lowercase hex HMAC-SHA256 of the raw
/// request body.
fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sendero={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
