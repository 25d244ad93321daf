use axum::{extract::State, response::IntoResponse, routing::post, Json, Router};

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::services::transfers::CreateTransferRequest;
use crate::{ApiResponse, AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(create_transfer))
}

/// Move stock along a direct parent/child edge of the location tree.
pub async fn create_transfer(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateTransferRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let response = state
        .transfer_service
        .create_transfer(request, &user)
        .await?;
    Ok(Json(ApiResponse::success(response)))
}
