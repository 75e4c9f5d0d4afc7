use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    routing::post,
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::control::{ControlOutcome, ControlRequest},
    error::AppError,
    services::control_service,
    state::SharedState,
};

/// Header naming the authenticated user issuing the commands.
const USER_ID_HEADER: &str = "x-user-id";
/// Optional header naming the API token the request authenticated with.
const TOKEN_ID_HEADER: &str = "x-token-id";
/// Optional header naming the login session the request rode in on.
const SESSION_ID_HEADER: &str = "x-session-id";

#[utoipa::path(
    post,
    path = "/shockers/control",
    tag = "control",
    params(
        ("x-user-id" = String, Header, description = "Id of the user issuing the commands"),
        ("x-token-id" = Option<String>, Header, description = "API token id, for last-used bookkeeping"),
        ("x-session-id" = Option<String>, Header, description = "Session id, for last-used bookkeeping"),
    ),
    request_body = ControlRequest,
    responses(
        (status = 200, description = "Commands resolved; see outcome for denials", body = ControlOutcome),
        (status = 401, description = "Missing or malformed user header"),
        (status = 503, description = "Control channel unavailable"),
    )
)]
/// Resolve a batch of control commands against the caller's grants and
/// dispatch the accepted ones.
pub async fn send_control(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Valid(Json(payload)): Valid<Json<ControlRequest>>,
) -> Result<Json<ControlOutcome>, AppError> {
    let user_id = authenticated_user(&headers)?;
    record_credential_use(&state, &headers);

    let outcome = control_service::control(&state, user_id, payload.commands).await?;
    Ok(Json(outcome))
}

/// Extract the authenticated user id from the request headers.
fn authenticated_user(headers: &HeaderMap) -> Result<Uuid, AppError> {
    let raw = headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing user header".into()))?;
    raw.parse()
        .map_err(|_| AppError::Unauthorized("malformed user header".into()))
}

/// Enqueue last-used bookkeeping for whichever credential the request
/// carried. Never blocks and never fails the request.
fn record_credential_use(state: &SharedState, headers: &HeaderMap) {
    if let Some(token_id) = headers
        .get(TOKEN_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.parse::<Uuid>().ok())
    {
        state.batch().token_used(token_id);
    }

    if let Some(session_id) = headers
        .get(SESSION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        state.batch().session_used(session_id.to_string());
    }
}

/// Configure the control routes subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/shockers/control", post(send_control))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn user_header_must_be_a_uuid() {
        let mut headers = HeaderMap::new();
        assert!(authenticated_user(&headers).is_err());

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("not-a-uuid"));
        assert!(authenticated_user(&headers).is_err());

        let id = Uuid::new_v4();
        headers.insert(
            USER_ID_HEADER,
            HeaderValue::from_str(&id.to_string()).unwrap(),
        );
        assert_eq!(authenticated_user(&headers).unwrap(), id);
    }
}
