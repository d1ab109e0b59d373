use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::{api::state::AppState, error::AppError, payments::verify_shared_secret};

/// Gates the admin surface behind the configured bearer token. The
/// comparison is constant-time; a missing or empty header never passes.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let supplied = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    if !verify_shared_secret(Some(state.settings.auth.admin_token.as_str()), supplied) {
        tracing::warn!("Rejected admin request with missing or invalid bearer token");
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}
