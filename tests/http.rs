use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    Router,
};
use http::{Method, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use lms_progression::{
    models::*,
    notify::LogNotifier,
    router,
    store::InMemoryStore,
    AppState,
};

struct Catalog {
    student: Uuid,
    pathway: Uuid,
    beginner: Uuid,
    quiz: Uuid,
    /// (question, correct option)
    questions: Vec<(Uuid, Uuid)>,
}

async fn seed(store: &InMemoryStore) -> Catalog {
    let student = Uuid::new_v4();
    store
        .insert_user(User { id: student, name: "lin".into(), role: UserRole::Student })
        .await;
    let pathway = Uuid::new_v4();
    store.insert_pathway(Pathway { id: pathway, title: "Systems".into() }).await;
    let beginner = Uuid::new_v4();
    store
        .insert_course(Course {
            id: beginner,
            title: "Intro to X".into(),
            pathway_id: Some(pathway),
            level: CourseLevel::Beginner,
        })
        .await;
    let module = Uuid::new_v4();
    store.insert_module(Module { id: module, course_id: beginner, title: "Basics".into() }).await;
    let quiz = Uuid::new_v4();
    store.insert_quiz(Quiz { id: quiz, module_id: module, title: "Check".into() }).await;

    let mut questions = Vec::new();
    for n in 1..=5 {
        let q = Uuid::new_v4();
        store
            .insert_question(Question {
                id: q,
                quiz_id: quiz,
                question_number: n,
                text: format!("Q{n}"),
                is_active: true,
            })
            .await;
        let right = Uuid::new_v4();
        store
            .insert_option(AnswerOption { id: right, question_id: q, option_order: 1, text: "a".into(), is_correct: true })
            .await;
        store
            .insert_option(AnswerOption { id: Uuid::new_v4(), question_id: q, option_order: 2, text: "b".into(), is_correct: false })
            .await;
        questions.push((q, right));
    }

    Catalog { student, pathway, beginner, quiz, questions }
}

async fn app() -> (Router, Catalog) {
    let store = InMemoryStore::new();
    let catalog = seed(&store).await;
    let state = AppState::new(Arc::new(store), Arc::new(LogNotifier));
    (router(state), catalog)
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(v) => Body::from(v.to_string()),
            None => Body::empty(),
        })
        .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn pathway_enrolment_through_completion() {
    let (app, c) = app().await;

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/api/pathways/{}/enrol", c.pathway),
        Some(json!({ "user_id": c.student })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let enrolment_id = body["enrolment"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["enrolment"]["course_id"], json!(c.beginner));
    assert_eq!(body["enrolment"]["status"], "enrolled");

    let (status, attempt) = call(
        &app,
        Method::POST,
        "/api/attempts",
        Some(json!({ "quiz_id": c.quiz, "enrolment_id": enrolment_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(attempt["count"], 1);
    let attempt_id = attempt["id"].as_str().unwrap().to_string();

    // four right, one left blank
    let answers: Vec<Value> = c.questions[..4]
        .iter()
        .map(|(q, right)| json!({ "question_id": q, "option_id": right }))
        .collect();
    let (status, submitted) = call(
        &app,
        Method::PUT,
        &format!("/api/attempts/{attempt_id}/submit"),
        Some(json!({ "answers": answers })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(submitted["score"], 0.8);
    assert_eq!(submitted["passed"], true);
    assert_eq!(submitted["answers"].as_array().unwrap().len(), 5);

    let (status, again) = call(
        &app,
        Method::PUT,
        &format!("/api/attempts/{attempt_id}/submit"),
        Some(json!({ "answers": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(again["code"], "ALREADY_SUBMITTED");

    let (status, enrolment) =
        call(&app, Method::GET, &format!("/api/enrolments/{enrolment_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(enrolment["status"], "completed");

    let (_, level) = call(
        &app,
        Method::GET,
        &format!("/api/pathways/{}/users/{}/level", c.pathway, c.student),
        None,
    )
    .await;
    assert_eq!(level["level"], 1);

    let (_, result) =
        call(&app, Method::GET, &format!("/api/attempts/{attempt_id}"), None).await;
    assert_eq!(result["passed"], true);
    assert_eq!(result["answers"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn duplicate_answers_are_rejected() {
    let (app, c) = app().await;
    let (_, enrolment) = call(
        &app,
        Method::POST,
        "/api/enrolments",
        Some(json!({ "course_id": c.beginner, "user_id": c.student })),
    )
    .await;
    assert!(enrolment["pathway_id"].is_null());
    let (_, attempt) = call(
        &app,
        Method::POST,
        "/api/attempts",
        Some(json!({ "quiz_id": c.quiz, "enrolment_id": enrolment["id"] })),
    )
    .await;

    let (q, right) = c.questions[0];
    let (status, body) = call(
        &app,
        Method::PUT,
        &format!("/api/attempts/{}/submit", attempt["id"].as_str().unwrap()),
        Some(json!({ "answers": [
            { "question_id": q, "option_id": right },
            { "question_id": q, "option_id": null },
        ] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "DUPLICATE_ANSWER");
}

#[tokio::test]
async fn error_codes_surface_to_clients() {
    let (app, c) = app().await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/enrolments",
        Some(json!({ "course_id": Uuid::new_v4(), "user_id": c.student })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, body) =
        call(&app, Method::POST, "/api/enrolments", Some(json!({ "user_id": c.student }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/enrolments/disenrol",
        Some(json!({ "course_id": c.beginner, "user_id": c.student })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "NOT_ENROLLED");

    let (status, body) = call(
        &app,
        Method::GET,
        &format!(
            "/api/pathways/{}/users/{}/courses/{}/prerequisite",
            c.pathway,
            Uuid::new_v4(),
            c.beginner
        ),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["satisfied"], true);
}

#[tokio::test]
async fn submit_without_body_records_every_question_unanswered() {
    let (app, c) = app().await;
    let (_, enrolment) = call(
        &app,
        Method::POST,
        "/api/enrolments",
        Some(json!({ "course_id": c.beginner, "user_id": c.student })),
    )
    .await;
    let (_, attempt) = call(
        &app,
        Method::POST,
        "/api/attempts",
        Some(json!({ "quiz_id": c.quiz, "enrolment_id": enrolment["id"] })),
    )
    .await;
    let uri = format!("/api/attempts/{}/submit", attempt["id"].as_str().unwrap());

    let req = Request::builder()
        .method(Method::PUT)
        .uri(&uri)
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let (status, submitted) = call(&app, Method::PUT, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(submitted["score"], 0.0);
    assert_eq!(submitted["passed"], false);
    let answers = submitted["answers"].as_array().unwrap();
    assert_eq!(answers.len(), c.questions.len());
    assert!(answers.iter().all(|a| a["option_id"].is_null()));
}
