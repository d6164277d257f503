use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::backend::{error::ApiError, state::AppState};

pub async fn api_key_auth(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(key) if key == state.api_key() => Ok(next.run(req).await),
        _ => Err(ApiError::Unauthorized),
    }
}
