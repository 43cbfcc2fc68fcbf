use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_openai::types::ChatCompletionRequestMessage;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{
        Request, StatusCode,
        header::{ACCESS_CONTROL_ALLOW_ORIGIN, AUTHORIZATION, CONTENT_TYPE, ORIGIN},
    },
};
use futures::{FutureExt, future::BoxFuture};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use super::{AppState, router};
use crate::{
    ai_utils::ChatBackend,
    auth::{JwtResolver, UserId, issue_token},
    content::fixtures,
    error::{Error, Result},
    store::{ProfileRow, Store, Table},
};

const SECRET: &[u8] = b"handler-test-secret";

/// Answers every call with the same canned reply and remembers the prompts.
struct FakeBackend {
    reply: std::result::Result<String, u16>,
    calls: AtomicUsize,
    last_messages: Mutex<Vec<ChatCompletionRequestMessage>>,
}

impl FakeBackend {
    fn replying(text: String) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text),
            calls: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
        })
    }

    fn failing(status: u16) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(status),
            calls: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_user_prompt(&self) -> String {
        let messages = serde_json::to_value(&*self.last_messages.lock()).unwrap();
        messages[1]["content"].as_str().unwrap_or_default().to_string()
    }
}

impl ChatBackend for FakeBackend {
    fn complete(&self, messages: Vec<ChatCompletionRequestMessage>) -> BoxFuture<'_, Result<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_messages.lock() = messages;
        let reply = match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(status) => Err(Error::Upstream { status: *status }),
        };
        futures::future::ready(reply).boxed()
    }
}

struct Harness {
    app: Router,
    store: Store,
    backend: Arc<FakeBackend>,
    user: UserId,
    token: String,
}

async fn harness(backend: Arc<FakeBackend>) -> Harness {
    let store = Store::in_memory().await.unwrap();
    let state = Arc::new(AppState {
        store: store.clone(),
        backend: backend.clone(),
        identity: Arc::new(JwtResolver::new(SECRET)),
    });
    let user = UserId(Uuid::new_v4());
    let token = issue_token(SECRET, user, time::Duration::hours(1)).unwrap();
    Harness {
        app: router(state),
        store,
        backend,
        user,
        token,
    }
}

fn call(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(ORIGIN, "https://learnova.example")
        .header(CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = body.map_or_else(Body::empty, |b| Body::from(b.to_string()));
    builder.body(body).unwrap()
}

fn post(path: &str, token: Option<&str>, body: Value) -> Request<Body> {
    call("POST", &format!("/functions/v1/{path}"), token, Some(body))
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn algebra_lesson() -> Value {
    json!({"subject": "Algebra", "difficulty": "beginner", "language": "en", "learningStyle": "visual"})
}

fn algebra_practice() -> Value {
    json!({"subject": "Algebra", "difficulty": "beginner", "language": "en"})
}

#[tokio::test]
async fn lesson_happy_path() {
    let h = harness(FakeBackend::replying(fixtures::lesson_json())).await;
    let (status, body) = send(&h.app, post("generate-lesson", Some(&h.token), algebra_lesson())).await;

    assert_eq!(status, StatusCode::OK);
    let lesson = &body["lesson"];
    assert!(!lesson["title"].as_str().unwrap().is_empty());
    assert!(!lesson["content"]["concepts"].as_array().unwrap().is_empty());
    assert_eq!(lesson["user_id"], h.user.to_string());
    assert_eq!(lesson["subject"], "Algebra");
    assert_eq!(h.backend.calls(), 1);
    assert!(h.backend.last_user_prompt().contains("optimized for visual learners"));
    assert_eq!(h.store.count_rows(Table::Lessons).await.unwrap(), 1);
}

#[tokio::test]
async fn practice_defaults_to_five_questions() {
    let h = harness(FakeBackend::replying(fixtures::practice_json(5))).await;
    let (status, body) = send(&h.app, post("generate-practice", Some(&h.token), algebra_practice())).await;

    assert_eq!(status, StatusCode::OK);
    let questions = body["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 5);
    assert!(questions.iter().all(|q| q["user_id"] == h.user.to_string()));
    assert_eq!(questions[0]["options"]["A"], "1");
    assert!(h.backend.last_user_prompt().starts_with("Generate 5 beginner-level"));
    assert_eq!(h.store.count_rows(Table::PracticeQuestions).await.unwrap(), 5);
}

#[tokio::test]
async fn missing_credential_is_rejected_before_any_work() {
    let h = harness(FakeBackend::replying(fixtures::lesson_json())).await;
    for (path, body) in [
        ("generate-lesson", algebra_lesson()),
        ("generate-practice", algebra_practice()),
        ("generate-recommendations", json!({})),
    ] {
        let (status, body) = send(&h.app, post(path, None, body)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{path}");
        assert_eq!(body, json!({"error": "Unauthorized"}), "{path}");
    }
    assert_eq!(h.backend.calls(), 0);
    assert_eq!(h.store.count_rows(Table::Lessons).await.unwrap(), 0);
    assert_eq!(h.store.count_rows(Table::PracticeQuestions).await.unwrap(), 0);
}

#[tokio::test]
async fn forged_credential_is_unauthorized() {
    let h = harness(FakeBackend::replying(fixtures::lesson_json())).await;
    let forged = issue_token(b"someone-else", h.user, time::Duration::hours(1)).unwrap();
    let (status, body) = send(&h.app, post("generate-lesson", Some(&forged), algebra_lesson())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Unauthorized");
    assert_eq!(h.backend.calls(), 0);
}

#[tokio::test]
async fn upstream_failure_writes_nothing() {
    let h = harness(FakeBackend::failing(502)).await;
    let (status, body) = send(&h.app, post("generate-lesson", Some(&h.token), algebra_lesson())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "AI API error: 502");

    let (status, _) = send(&h.app, post("generate-practice", Some(&h.token), algebra_practice())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(h.backend.calls(), 2);
    assert_eq!(h.store.count_rows(Table::Lessons).await.unwrap(), 0);
    assert_eq!(h.store.count_rows(Table::PracticeQuestions).await.unwrap(), 0);
}

#[tokio::test]
async fn invalid_model_output_writes_nothing() {
    let h = harness(FakeBackend::replying(fixtures::practice_json(4))).await;
    let (status, body) = send(&h.app, post("generate-practice", Some(&h.token), algebra_practice())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("expected 5 questions, got 4"));
    assert_eq!(h.store.count_rows(Table::PracticeQuestions).await.unwrap(), 0);
}

#[tokio::test]
async fn unparseable_model_output_is_reported() {
    let h = harness(FakeBackend::replying("Sure! Here is your lesson.".to_string())).await;
    let (status, body) = send(&h.app, post("generate-lesson", Some(&h.token), algebra_lesson())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().starts_with("AI response is not valid JSON"));
    assert_eq!(h.store.count_rows(Table::Lessons).await.unwrap(), 0);
}

#[tokio::test]
async fn malformed_body_skips_generation() {
    let h = harness(FakeBackend::replying(fixtures::lesson_json())).await;
    let (status, body) = send(
        &h.app,
        post("generate-lesson", Some(&h.token), json!({"subject": "Algebra"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().starts_with("Malformed request"));
    assert_eq!(h.backend.calls(), 0);
}

#[tokio::test]
async fn recommendations_use_profile_and_are_not_stored() {
    let h = harness(FakeBackend::replying(fixtures::recommendations_json())).await;
    h.store
        .upsert_profile(&ProfileRow {
            id: h.user.to_string(),
            learning_style: Some("hands-on".to_string()),
            proficiency_level: Some("intermediate".to_string()),
            preferred_language: Some("fr".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    let lesson = h
        .store
        .insert_lesson(
            h.user,
            &serde_json::from_value(algebra_lesson()).unwrap(),
            crate::content::decode_lesson(&fixtures::lesson_json()).unwrap(),
        )
        .await
        .unwrap();
    h.store
        .record_progress(h.user, Some(&lesson.id), 40, time::OffsetDateTime::now_utc())
        .await
        .unwrap();

    let (status, body) = send(&h.app, post("generate-recommendations", Some(&h.token), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["recommendations"].as_array().unwrap().len(), 3);

    let prompt = h.backend.last_user_prompt();
    assert!(prompt.contains("- Learning Style: hands-on\n"));
    assert!(prompt.contains("- Preferred Language: fr\n"));
    assert!(prompt.contains("- Recent Activity: Algebra\n"));
    assert_eq!(h.store.count_rows(Table::Lessons).await.unwrap(), 1);
}

#[tokio::test]
async fn recommendations_without_history_use_defaults() {
    let h = harness(FakeBackend::replying(fixtures::recommendations_json())).await;
    let (status, _) = send(&h.app, post("generate-recommendations", Some(&h.token), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    let prompt = h.backend.last_user_prompt();
    assert!(prompt.contains("- Learning Style: visual\n"));
    assert!(prompt.contains("- Recent Activity: none\n"));
}

#[tokio::test]
async fn preflight_is_answered_without_running_handlers() {
    let h = harness(FakeBackend::replying(fixtures::lesson_json())).await;
    for path in ["generate-lesson", "generate-practice", "generate-recommendations"] {
        let req = Request::builder()
            .method("OPTIONS")
            .uri(format!("/functions/v1/{path}"))
            .header(ORIGIN, "https://learnova.example")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();
        let response = h.app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{path}");
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
    }
    assert_eq!(h.backend.calls(), 0);
}

#[tokio::test]
async fn responses_carry_cors_origin() {
    let h = harness(FakeBackend::replying(fixtures::lesson_json())).await;
    let response = h
        .app
        .clone()
        .oneshot(post("generate-lesson", None, algebra_lesson()))
        .await
        .unwrap();
    assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn bare_options_gets_empty_ok() {
    let h = harness(FakeBackend::replying(fixtures::lesson_json())).await;
    let req = Request::builder()
        .method("OPTIONS")
        .uri("/functions/v1/generate-practice")
        .body(Body::empty())
        .unwrap();
    let response = h.app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.is_empty());
    assert_eq!(h.backend.calls(), 0);
}

fn photosynthesis() -> Value {
    json!({"lesson_name": "Photosynthesis", "description": "Plants turn light, water and CO2 into sugar."})
}

#[tokio::test]
async fn questionnaire_is_generated_but_not_stored() {
    let reply = format!("Here it is:\n```json\n{}\n```", fixtures::questionnaire_json(10));
    let h = harness(FakeBackend::replying(reply)).await;
    let req = call(
        "POST",
        "/api/generate-questionnaire-text",
        Some(&h.token),
        Some(photosynthesis()),
    );
    let (status, body) = send(&h.app, req).await;

    assert_eq!(status, StatusCode::OK);
    let questions = body["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 10);
    assert_eq!(questions[0]["options"].as_array().unwrap().len(), 4);
    assert_eq!(questions[1]["correctAnswer"], 1);
    assert!(h.backend.last_user_prompt().contains("Plants turn light, water and CO2 into sugar."));
    assert_eq!(h.store.count_rows(Table::Lessons).await.unwrap(), 0);
    assert_eq!(h.store.count_rows(Table::PracticeQuestions).await.unwrap(), 0);
}

#[tokio::test]
async fn questionnaire_needs_credential_and_description() {
    let h = harness(FakeBackend::replying(fixtures::questionnaire_json(10))).await;
    let uri = "/api/generate-questionnaire-text";
    let (status, body) = send(&h.app, call("POST", uri, None, Some(photosynthesis()))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Unauthorized");

    let blank = json!({"lesson_name": "Photosynthesis", "description": "  \n"});
    let (status, body) = send(&h.app, call("POST", uri, Some(&h.token), Some(blank))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Malformed request: Description cannot be empty");
    assert_eq!(h.backend.calls(), 0);
}

#[tokio::test]
async fn proctor_session_produces_a_stored_report() {
    let h = harness(FakeBackend::replying(String::new())).await;
    let start = json!({"session_id": "exam-1", "test_name": "Algebra final"});
    let (status, body) = send(
        &h.app,
        call("POST", "/api/proctor/session/start", Some(&h.token), Some(start)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["session_id"], "exam-1");

    let (status, ended) = send(
        &h.app,
        call("POST", "/api/proctor/session/end/exam-1", Some(&h.token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ended["message"], "Session ended, report generated");
    let report = &ended["report"];
    assert_eq!(report["user_id"], h.user.to_string());
    assert_eq!(report["test_name"], "Algebra final");
    let score = report["integrity_score"].as_f64().unwrap();
    assert!((0.5..=0.95).contains(&score));

    let (status, stored) = send(
        &h.app,
        call("GET", "/api/proctor/report/exam-1", Some(&h.token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&stored, report);

    let (status, listed) = send(
        &h.app,
        call(
            "GET",
            &format!("/api/proctor/report/user/{}?limit=5", h.user),
            Some(&h.token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["total_tests"], 1);
    assert_eq!(&listed["reports"][0], report);
    assert_eq!(h.backend.calls(), 0);
}

#[tokio::test]
async fn session_id_is_generated_when_omitted() {
    let h = harness(FakeBackend::replying(String::new())).await;
    let (status, body) = send(
        &h.app,
        call(
            "POST",
            "/api/proctor/session/start",
            Some(&h.token),
            Some(json!({"test_name": "Quiz"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = body["session_id"].as_str().unwrap();
    assert!(Uuid::parse_str(id).is_ok());
    assert_eq!(h.store.count_rows(Table::ProctorSessions).await.unwrap(), 1);
}

#[tokio::test]
async fn unknown_session_and_report_are_not_found() {
    let h = harness(FakeBackend::replying(String::new())).await;
    let (status, body) = send(
        &h.app,
        call("POST", "/api/proctor/session/end/nope", Some(&h.token), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not found: session nope");

    let (status, _) = send(
        &h.app,
        call("GET", "/api/proctor/report/nope", Some(&h.token), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(h.store.count_rows(Table::IntegrityReports).await.unwrap(), 0);
}

#[tokio::test]
async fn reports_stay_private_to_their_learner() {
    let h = harness(FakeBackend::replying(String::new())).await;
    let start = json!({"session_id": "exam-2", "test_name": "Quiz"});
    send(&h.app, call("POST", "/api/proctor/session/start", Some(&h.token), Some(start))).await;
    send(&h.app, call("POST", "/api/proctor/session/end/exam-2", Some(&h.token), None)).await;

    let stranger = issue_token(SECRET, UserId(Uuid::new_v4()), time::Duration::hours(1)).unwrap();
    let (status, _) = send(
        &h.app,
        call("GET", "/api/proctor/report/exam-2", Some(&stranger), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &h.app,
        call(
            "GET",
            &format!("/api/proctor/report/user/{}", h.user),
            Some(&stranger),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Unauthorized");

    let (status, _) = send(
        &h.app,
        call("POST", "/api/proctor/session/end/exam-2", Some(&stranger), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
