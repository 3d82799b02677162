//! Conversion endpoint.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;
use vidconv_core::{ConversionRequest, ConversionResult};

use crate::state::AppState;

/// Request body for `POST /convert`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertBody {
    #[serde(flatten)]
    pub request: ConversionRequest,
    /// Caller-chosen id used to tag WebSocket events. Generated when absent.
    #[serde(default)]
    pub conversion_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    pub conversion_id: String,
    #[serde(flatten)]
    pub result: ConversionResult,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn validate(request: &ConversionRequest) -> Result<(), ApiError> {
    if request.input_path.as_os_str().is_empty() {
        return Err(bad_request("inputPath cannot be empty"));
    }
    if request.output_path.as_os_str().is_empty() {
        return Err(bad_request("outputPath cannot be empty"));
    }
    if request.output_format.trim().is_empty() {
        return Err(bad_request("outputFormat cannot be empty"));
    }
    Ok(())
}

/// Run one conversion and respond with its result.
///
/// Progress is pushed over the WebSocket channel; a `conversion_finished`
/// message follows the last progress message. The conversion runs to
/// completion even if the client goes away before the response.
pub async fn convert(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ConvertBody>,
) -> Result<Json<ConvertResponse>, ApiError> {
    validate(&body.request)?;

    let conversion_id = body
        .conversion_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    info!(conversion_id = %conversion_id, "Conversion requested");

    let converter = state.converter().clone();
    let broadcaster = state.ws_broadcaster().clone();
    let task_id = conversion_id.clone();
    let request = body.request;

    // Detached from the request: a dropped connection must not stop the transcode
    let task = tokio::spawn(async move {
        let progress = broadcaster.clone();
        let progress_id = task_id.clone();
        let result = converter
            .convert(request, move |event| {
                progress.conversion_progress(&progress_id, &event)
            })
            .await;

        broadcaster.conversion_finished(&task_id, &result);
        result
    });

    let result = task.await.map_err(|e| {
        error!(conversion_id = %conversion_id, "Conversion task failed: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Conversion task failed".to_string(),
            }),
        )
    })?;

    Ok(Json(ConvertResponse {
        conversion_id,
        result,
    }))
}
