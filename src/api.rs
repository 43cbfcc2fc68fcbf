pub mod functions;
pub mod proctor;
pub mod study;
#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::{
    Router,
    http::{
        HeaderName, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{ai_utils::ChatBackend, auth::IdentityResolver, store::Store};

/// Shared by every request; handlers keep no state of their own.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub backend: Arc<dyn ChatBackend>,
    pub identity: Arc<dyn IdentityResolver>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        functions::generate_lesson,
        functions::generate_practice,
        functions::generate_recommendations,
        study::generate_questionnaire_text,
        proctor::start_session,
        proctor::end_session,
        proctor::report,
        proctor::user_reports,
    ),
    info(title = "Learnova generation functions", version = "0.1.0")
)]
pub struct ApiDoc;

/// Permissive CORS; any `OPTIONS` request is answered here with an empty body
/// before reaching a handler.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ])
}

pub fn get_functions_scope() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/functions/v1",
        Router::new()
            .route("/generate-lesson", post(functions::generate_lesson))
            .route("/generate-practice", post(functions::generate_practice))
            .route(
                "/generate-recommendations",
                post(functions::generate_recommendations),
            )
            .layer(cors_layer()),
    )
}

pub fn get_api_scope() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/api",
        Router::new()
            .route(
                "/generate-questionnaire-text",
                post(study::generate_questionnaire_text),
            )
            .route("/proctor/session/start", post(proctor::start_session))
            .route(
                "/proctor/session/end/{session_id}",
                post(proctor::end_session),
            )
            .route("/proctor/report/{session_id}", get(proctor::report))
            .route(
                "/proctor/report/user/{user_id}",
                get(proctor::user_reports),
            )
            .layer(cors_layer()),
    )
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(get_functions_scope())
        .merge(get_api_scope())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
