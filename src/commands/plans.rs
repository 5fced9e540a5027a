use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::{now, SharedState};
use crate::error::EngineError;
use crate::planner::{generate_complete_plan, PlanGenerationRequest, PlanResponse};

/// Generate, select and activate a plan for the user in the request body
pub async fn generate_plan(State(state): State<SharedState>, Json(body): Json<serde_json::Value>) -> Response {
  let request: PlanGenerationRequest = match serde_json::from_value(body) {
    Ok(request) => request,
    Err(e) => {
      let error = EngineError::InvalidRequest(e.to_string());
      let response = PlanResponse {
        success: false,
        data: None,
        error: Some(error.to_string()),
        processing_time: 0,
        provider: None,
      };
      return (StatusCode::BAD_REQUEST, Json(response)).into_response();
    }
  };

  match generate_complete_plan(&state, request, now()).await {
    Ok(response) => Json(response).into_response(),
    Err((error, response)) => {
      let status = error.into_response().status();
      (status, Json(response)).into_response()
    }
  }
}
