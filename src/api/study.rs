use std::sync::Arc;

use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use super::{
    AppState,
    functions::{ErrorBody, authenticate, parse_body},
};
use crate::{
    ai_utils::conversation,
    content::{QuestionnaireRequest, QuizQuestion, decode_questionnaire},
    error::{Error, Result},
    prompts::{QUESTIONNAIRE_INSTRUCTION, questionnaire_prompt},
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct QuestionnaireResponse {
    pub questions: Vec<QuizQuestion>,
}

/// Questions are returned but not stored.
#[utoipa::path(
    context_path = "/api",
    path = "/generate-questionnaire-text",
    method(post),
    request_body = QuestionnaireRequest,
    responses(
        (status = 200, description = "Questionnaire generated", body = QuestionnaireResponse),
        (status = 500, description = "Any failure", body = ErrorBody)
    )
)]
pub async fn generate_questionnaire_text(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<QuestionnaireResponse>> {
    let user = authenticate(&state, &headers).await?;
    let req: QuestionnaireRequest = parse_body(&body)?;
    if req.description.trim().is_empty() {
        return Err(Error::BadRequest("Description cannot be empty".to_string()));
    }
    info!(%user, lesson = %req.lesson_name, "generating questionnaire");
    let text = state
        .backend
        .complete(conversation(QUESTIONNAIRE_INSTRUCTION, questionnaire_prompt(&req)))
        .await?;
    let questions = decode_questionnaire(&text)?;
    Ok(Json(QuestionnaireResponse { questions }))
}
