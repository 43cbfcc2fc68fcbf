//! Proctoring sessions and their integrity reports.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
};
use rand::rng;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::{
    AppState,
    functions::{ErrorBody, authenticate, parse_body},
};
use crate::{
    error::{Error, Result},
    proctor::integrity::{IntegrityReport, simulate_report},
    utils::now_utc,
};

const DEFAULT_REPORT_LIMIT: i64 = 10;
const SUCCESS: &str = "success";

#[derive(Debug, Serialize, Deserialize, ToSchema, Validate)]
pub struct StartSessionRequest {
    /// A fresh id is generated when omitted
    #[serde(default)]
    #[validate(length(min = 1))]
    pub session_id: Option<String>,
    #[validate(length(min = 1))]
    pub test_name: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StartSessionResponse {
    pub status: String,
    pub message: String,
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EndSessionResponse {
    pub status: String,
    pub message: String,
    pub report: IntegrityReport,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserReportsResponse {
    pub user_id: String,
    /// All reports of the user, not only the returned page
    pub total_tests: i64,
    pub reports: Vec<IntegrityReport>,
}

fn default_limit() -> i64 {
    DEFAULT_REPORT_LIMIT
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ReportsQuery {
    /// 10 when omitted
    #[serde(default = "default_limit")]
    pub limit: i64,
}

#[utoipa::path(
    context_path = "/api/proctor",
    path = "/session/start",
    method(post),
    request_body = StartSessionRequest,
    responses(
        (status = 200, description = "Session started", body = StartSessionResponse),
        (status = 500, description = "Any failure", body = ErrorBody)
    )
)]
pub async fn start_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<StartSessionResponse>> {
    let user = authenticate(&state, &headers).await?;
    let req: StartSessionRequest = parse_body(&body)?;
    let id = req
        .session_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let session = state
        .store
        .start_proctor_session(user, id, req.test_name)
        .await?;
    info!(%user, session = %session.id, test = %session.test_name, "proctoring session started");
    Ok(Json(StartSessionResponse {
        status: SUCCESS.to_string(),
        message: "Proctoring session started".to_string(),
        session_id: session.id,
    }))
}

/// Ends the session and stores a freshly simulated report for it.
#[utoipa::path(
    context_path = "/api/proctor",
    path = "/session/end/{session_id}",
    method(post),
    params(("session_id" = String, Path)),
    responses(
        (status = 200, description = "Session ended, report generated", body = EndSessionResponse),
        (status = 404, description = "No such session for this user", body = ErrorBody),
        (status = 500, description = "Any other failure", body = ErrorBody)
    )
)]
pub async fn end_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<Json<EndSessionResponse>> {
    let user = authenticate(&state, &headers).await?;
    let session = state.store.end_proctor_session(user, &session_id).await?;
    let report = simulate_report(&mut rng(), &session, now_utc());
    state.store.save_integrity_report(&report).await?;
    info!(
        %user,
        session = %session_id,
        score = report.integrity_score,
        flags = report.flags.len(),
        "proctoring session ended"
    );
    Ok(Json(EndSessionResponse {
        status: SUCCESS.to_string(),
        message: "Session ended, report generated".to_string(),
        report,
    }))
}

#[utoipa::path(
    context_path = "/api/proctor",
    path = "/report/{session_id}",
    method(get),
    params(("session_id" = String, Path)),
    responses(
        (status = 200, description = "Stored report", body = IntegrityReport),
        (status = 404, description = "No report for this user", body = ErrorBody),
        (status = 500, description = "Any other failure", body = ErrorBody)
    )
)]
pub async fn report(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<Json<IntegrityReport>> {
    let user = authenticate(&state, &headers).await?;
    state
        .store
        .integrity_report(&session_id)
        .await?
        .filter(|r| r.user_id == user.to_string())
        .map(Json)
        .ok_or_else(|| Error::NotFound(format!("report for session {session_id}")))
}

/// Only the caller's own reports can be listed.
#[utoipa::path(
    context_path = "/api/proctor",
    path = "/report/user/{user_id}",
    method(get),
    params(("user_id" = String, Path), ReportsQuery),
    responses(
        (status = 200, description = "Newest reports first", body = UserReportsResponse),
        (status = 500, description = "Any failure", body = ErrorBody)
    )
)]
pub async fn user_reports(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Query(query): Query<ReportsQuery>,
) -> Result<Json<UserReportsResponse>> {
    let user = authenticate(&state, &headers).await?;
    if user.to_string() != user_id {
        return Err(Error::Unauthorized);
    }
    let (total_tests, reports) = state
        .store
        .user_reports(user, query.limit.max(0))
        .await?;
    Ok(Json(UserReportsResponse {
        user_id,
        total_tests,
        reports,
    }))
}
