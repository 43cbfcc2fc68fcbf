use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::info;
use utoipa::ToSchema;
use validator::Validate;

use super::AppState;
use crate::{
    ai_utils::conversation,
    auth::{UserId, bearer_token},
    content::{
        LessonRequest, PracticeRequest, Recommendation, decode_lesson, decode_practice,
        decode_recommendations,
    },
    error::{Error, Result},
    prompts::{
        ADVISOR_INSTRUCTION, LESSON_INSTRUCTION, PRACTICE_INSTRUCTION, lesson_prompt,
        practice_prompt, recommendations_prompt,
    },
    store::{LessonRow, PracticeQuestionRow},
};

/// How many progress rows feed the recommendations prompt
const RECENT_PROGRESS_LIMIT: i64 = 5;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LessonResponse {
    pub lesson: LessonRow,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PracticeResponse {
    pub questions: Vec<PracticeQuestionRow>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RecommendationsResponse {
    pub recommendations: Vec<Recommendation>,
}

/// Body of every failed request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

/// Runs before anything that costs money or touches the store.
pub(super) async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<UserId> {
    let token = bearer_token(headers).ok_or(Error::Unauthorized)?;
    state.identity.resolve(token).await.ok_or(Error::Unauthorized)
}

pub(super) fn parse_body<T: DeserializeOwned + Validate>(body: &[u8]) -> Result<T> {
    let req: T = serde_json::from_slice(body).map_err(|e| Error::BadRequest(e.to_string()))?;
    req.validate()
        .map_err(|e| Error::BadRequest(e.to_string()))?;
    Ok(req)
}

#[utoipa::path(
    context_path = "/functions/v1",
    path = "/generate-lesson",
    method(post),
    request_body = LessonRequest,
    responses(
        (status = 200, description = "Lesson generated and saved", body = LessonResponse),
        (status = 500, description = "Any failure", body = ErrorBody)
    )
)]
pub async fn generate_lesson(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<LessonResponse>> {
    let user = authenticate(&state, &headers).await?;
    let req: LessonRequest = parse_body(&body)?;
    info!(%user, subject = %req.subject, "generating lesson");
    let text = state
        .backend
        .complete(conversation(LESSON_INSTRUCTION, lesson_prompt(&req)))
        .await?;
    let content = decode_lesson(&text)?;
    let lesson = state.store.insert_lesson(user, &req, content).await?;
    Ok(Json(LessonResponse { lesson }))
}

#[utoipa::path(
    context_path = "/functions/v1",
    path = "/generate-practice",
    method(post),
    request_body = PracticeRequest,
    responses(
        (status = 200, description = "Questions generated and saved", body = PracticeResponse),
        (status = 500, description = "Any failure", body = ErrorBody)
    )
)]
pub async fn generate_practice(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PracticeResponse>> {
    let user = authenticate(&state, &headers).await?;
    let req: PracticeRequest = parse_body(&body)?;
    info!(%user, subject = %req.subject, count = req.count, "generating practice questions");
    let text = state
        .backend
        .complete(conversation(PRACTICE_INSTRUCTION, practice_prompt(&req)))
        .await?;
    let questions = decode_practice(&text, req.count)?;
    let questions = state
        .store
        .insert_practice_questions(user, &req, questions)
        .await?;
    Ok(Json(PracticeResponse { questions }))
}

/// Recommendations are returned but not stored.
#[utoipa::path(
    context_path = "/functions/v1",
    path = "/generate-recommendations",
    method(post),
    responses(
        (status = 200, description = "Three recommendations", body = RecommendationsResponse),
        (status = 500, description = "Any failure", body = ErrorBody)
    )
)]
pub async fn generate_recommendations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<RecommendationsResponse>> {
    let user = authenticate(&state, &headers).await?;
    let profile = state.store.profile(user).await?;
    let progress = state
        .store
        .recent_progress(user, RECENT_PROGRESS_LIMIT)
        .await?;
    info!(
        %user,
        has_profile = profile.is_some(),
        recent = progress.len(),
        "generating recommendations"
    );
    let prompt = recommendations_prompt(profile.as_ref(), &progress);
    let text = state
        .backend
        .complete(conversation(ADVISOR_INSTRUCTION, prompt))
        .await?;
    let recommendations = decode_recommendations(&text)?;
    Ok(Json(RecommendationsResponse { recommendations }))
}
