use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use sos_core::{
    Incident,
    channel::TEST_MESSAGE,
    models::{DeliveryStatus, FailureReason},
};
use tracing::info;

use crate::{auth::AuthUser, error::AppError, state::AppState};

#[derive(Deserialize)]
pub struct TriggerRequest {
    lat: Option<f64>,
    lng: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    sos_id: Option<String>,
}

#[derive(Deserialize)]
pub struct TestSmsRequest {
    phone: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NotifiedContact {
    pub name: String,
    pub phone: String,
    pub sms_status: DeliveryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub success: bool,
    pub message: String,
    pub sos_id: String,
    pub contacts_notified: Vec<NotifiedContact>,
}

impl From<&Incident> for TriggerResponse {
    fn from(incident: &Incident) -> Self {
        Self {
            success: true,
            message: "SOS triggered".to_string(),
            sos_id: incident.id.clone(),
            contacts_notified: incident
                .recipient_outcomes
                .iter()
                .map(|outcome| NotifiedContact {
                    name: outcome.recipient_name.clone(),
                    phone: outcome.recipient_address.clone(),
                    sms_status: outcome.delivery_status,
                    reason: outcome.failure_reason,
                    error: outcome.failure_reason.map(|r| r.message().to_string()),
                })
                .collect(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Ack {
    pub success: bool,
    pub message: String,
}

impl Ack {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.to_string(),
        })
    }
}

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "SafeHer Backend Running ✅")
}

/// Runs in its own task: a client hanging up mid-request does not stop the alert.
pub async fn trigger_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    payload: Result<Json<TriggerRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload.map_err(|_| AppError::MalformedPayload)?;

    let task_state = state.clone();
    let incident = tokio::spawn(async move {
        task_state
            .dispatcher
            .trigger(&user, request.lat, request.lng)
            .await
    })
    .await
    .map_err(|e| AppError::InternalError(e.into()))??;

    Ok((
        StatusCode::CREATED,
        Json(TriggerResponse::from(&incident)),
    ))
}

pub async fn resolve_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    payload: Result<Json<ResolveRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload.map_err(|_| AppError::MalformedPayload)?;

    let sos_id = request
        .sos_id
        .filter(|id| !id.trim().is_empty())
        .ok_or(AppError::MissingIncidentId)?;

    let task_state = state.clone();
    tokio::spawn(async move { task_state.dispatcher.resolve(&user, &sos_id).await })
        .await
        .map_err(|e| AppError::InternalError(e.into()))??;

    Ok(Ack::new("SOS resolved"))
}

pub async fn logs_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let incidents = state.dispatcher.list_incidents(&user).await?;

    Ok(Json(incidents))
}

pub async fn test_sms_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    payload: Result<Json<TestSmsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload.map_err(|_| AppError::MalformedPayload)?;

    let phone = request
        .phone
        .filter(|phone| !phone.trim().is_empty())
        .ok_or(AppError::MissingPhone)?;
    let address = state.normalizer.normalize(&phone)?;

    info!("Test SMS to {address} requested by {}", user.user_id);
    state.channel.send(&address, TEST_MESSAGE).await?;

    Ok(Ack::new("Test SMS sent"))
}
