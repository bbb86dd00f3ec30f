use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use lune_core::generator::generate_with_fallback;
use lune_core::merge::{Merge, PatchError};
use lune_core::report::{ReportModel, ReportPatch};
use lune_core::store::{ReportState, Snapshot, validate_id};
use lune_core::transcript::SnapshotTurn;
use openai_realtime::secrets::mint_client_secret;
use openai_realtime::types::Session;
use openai_realtime::types::audio::{InputAudioTranscription, TranscriptionModel, Voice};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Ready,
    Failed,
}

/// Response body shared by the report endpoints.
#[derive(Debug, Serialize)]
pub struct ReportEnvelope {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_status: Option<ReportStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_model: Option<ReportModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_overrides: Option<ReportPatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_final: Option<ReportModel>,
    pub snapshot: Option<Snapshot>,
}

impl ReportEnvelope {
    fn ready(report: ReportState, snapshot: Option<Snapshot>) -> Self {
        let mut envelope = Self::with_report(report, snapshot);
        envelope.report_status = Some(ReportStatus::Ready);
        envelope
    }

    fn with_report(report: ReportState, snapshot: Option<Snapshot>) -> Self {
        let report_final = report.final_report();
        Self {
            ok: true,
            report_status: None,
            report_model: Some(report.model),
            report_overrides: Some(report.overrides),
            report_final: Some(report_final),
            snapshot,
        }
    }

    fn pending(snapshot: Snapshot) -> Self {
        Self {
            ok: true,
            report_status: Some(ReportStatus::Pending),
            report_model: None,
            report_overrides: None,
            report_final: None,
            snapshot: Some(snapshot),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FinalizeRequest {
    #[serde(default)]
    pub transcripts: Vec<SnapshotTurn>,
}

fn interview_id(raw: &str) -> Result<&str, ApiError> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(ApiError::BadRequest("Missing interview id".to_string()));
    }
    Ok(validate_id(id)?)
}

/// The session the minted secret is scoped to.
pub fn token_session() -> Session {
    Session::new()
        .with_model("gpt-realtime")
        .with_voice(Voice::Alloy)
        .with_input_audio_transcription(
            InputAudioTranscription::new().with_model(TranscriptionModel::Gpt4oTranscribe),
        )
        .build()
}

/// `GET /token`
///
/// Upstream bodies and statuses are passed through untouched.
pub async fn token(State(state): State<AppState>) -> Response {
    let Some(api_key) = state.token.api_key.as_ref() else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Missing OPENAI_API_KEY" })),
        )
            .into_response();
    };

    match mint_client_secret(&state.token.http, &state.token.url, api_key, &token_session()).await {
        Ok(minted) => (minted.status, Json(minted.body)).into_response(),
        Err(e) => {
            tracing::error!("Token generation error: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to generate token" })),
            )
                .into_response()
        }
    }
}

/// `POST /api/interviews/{id}/finalize`
pub async fn finalize(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    body: Result<Json<FinalizeRequest>, JsonRejection>,
) -> Result<Json<ReportEnvelope>, ApiError> {
    let id = interview_id(&raw_id)?;
    let transcripts = match body {
        Ok(Json(request)) => request.transcripts,
        Err(rejection) => {
            tracing::warn!(interview_id = %id, "finalize body rejected: {}", rejection.body_text());
            Vec::new()
        }
    };
    if transcripts.is_empty() {
        return Err(ApiError::BadRequest("Missing transcripts".to_string()));
    }

    let _guard = state.locks.acquire(id).await;

    // A stored model is never regenerated or overwritten.
    if let Some(report) = state.store.report_state(id).await? {
        let snapshot = match state.store.snapshot(id).await? {
            Some(snapshot) => snapshot,
            None => {
                tracing::warn!(interview_id = %id, "snapshot missing for stored report, saving replayed transcript");
                save_snapshot(&state, Snapshot::new(id, transcripts)).await
            }
        };
        tracing::info!(interview_id = %id, "finalize replayed, returning stored report");
        return Ok(Json(ReportEnvelope::ready(report, Some(snapshot))));
    }

    let snapshot = save_snapshot(&state, Snapshot::new(id, transcripts)).await;
    tracing::info!(
        interview_id = %id,
        turns = snapshot.transcripts.len(),
        "snapshot saved, generating report"
    );

    let model = generate_with_fallback(
        state.generator.as_ref(),
        &state.models.primary,
        &state.models.fallback,
        id,
        &snapshot.transcripts,
    )
    .await
    .map_err(|e| ApiError::GenerationFailed(e.to_string()))?;

    let overrides = ReportPatch::default();
    if let Err(e) = state.store.save_report(id, &model, &overrides).await {
        tracing::warn!(interview_id = %id, "report not persisted: {}", e);
    }
    tracing::info!(interview_id = %id, "report ready");

    let report = ReportState { model, overrides };
    Ok(Json(ReportEnvelope::ready(report, Some(snapshot))))
}

async fn save_snapshot(state: &AppState, snapshot: Snapshot) -> Snapshot {
    if let Err(e) = state.store.save_snapshot(&snapshot).await {
        tracing::warn!(interview_id = %snapshot.interview_id, "snapshot not persisted: {}", e);
    }
    snapshot
}

/// `GET /api/interviews/{id}/report`
pub async fn report(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<ReportEnvelope>, ApiError> {
    let id = interview_id(&raw_id)?;
    let Some(snapshot) = state.store.snapshot(id).await? else {
        return Err(ApiError::SnapshotNotFound);
    };
    match state.store.report_state(id).await? {
        Some(report) => Ok(Json(ReportEnvelope::ready(report, Some(snapshot)))),
        None => Ok(Json(ReportEnvelope::pending(snapshot))),
    }
}

/// `PATCH /api/interviews/{id}/report_overrides`
pub async fn patch_overrides(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ReportEnvelope>, ApiError> {
    let id = interview_id(&raw_id)?;
    let _guard = state.locks.acquire(id).await;

    let Some(current) = state.store.report_state(id).await? else {
        return Err(ApiError::ReportNotGenerated);
    };

    let patch = body
        .map_err(|_| PatchError::NotAnObject)
        .and_then(|Json(value)| ReportPatch::from_value(value))
        .map_err(|e| match e {
            PatchError::NotAnObject => ApiError::BadRequest("Invalid overrides payload".to_string()),
            PatchError::InvalidShape(reason) => {
                ApiError::BadRequest(format!("Invalid overrides payload: {}", reason))
            }
        })?;

    let overrides = current.overrides.merge(&patch);
    if let Err(e) = state.store.save_overrides(id, &overrides).await {
        tracing::warn!(interview_id = %id, "overrides not persisted: {}", e);
    }
    tracing::info!(interview_id = %id, "overrides updated");

    let snapshot = state.store.snapshot(id).await?;
    let report = ReportState {
        model: current.model,
        overrides,
    };
    Ok(Json(ReportEnvelope::with_report(report, snapshot)))
}
