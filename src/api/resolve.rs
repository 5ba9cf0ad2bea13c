/// DID resolution endpoint
///
/// `GET /resolve?did=<did>` always answers with a resolution result body; the
/// status code mirrors `didResolutionMetadata.error`.
use crate::{
    context::AppContext,
    identity::{ResolutionErrorCode, ResolutionResult},
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct ResolveParams {
    pub did: Option<String>,
}

pub async fn resolve_did(
    State(ctx): State<AppContext>,
    Query(params): Query<ResolveParams>,
) -> Response {
    let did = params
        .did
        .map(|did| did.trim().to_string())
        .filter(|did| !did.is_empty());

    let Some(did) = did else {
        return respond(ResolutionResult::error(
            ResolutionErrorCode::InvalidDid,
            "Missing did query parameter",
        ));
    };

    let result = match ctx.resolver.resolve(&did).await {
        Ok(result) => result,
        Err(e) => {
            warn!(%did, error = %e, "resolution failed");
            ResolutionResult::error(ResolutionErrorCode::InternalError, e.to_string())
        }
    };

    respond(result)
}

/// HTTP status for a resolution result
pub fn status_for(result: &ResolutionResult) -> StatusCode {
    match result.error_code() {
        Some(ResolutionErrorCode::InvalidDid) => StatusCode::BAD_REQUEST,
        Some(ResolutionErrorCode::NotFound) => StatusCode::NOT_FOUND,
        Some(ResolutionErrorCode::InternalError) => StatusCode::BAD_GATEWAY,
        Some(ResolutionErrorCode::NotYetPropagated) | None => StatusCode::OK,
    }
}

fn respond(result: ResolutionResult) -> Response {
    (status_for(&result), Json(result)).into_response()
}
