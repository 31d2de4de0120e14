use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::attempt::{AttemptEngine, StoredOptionRegistrar};
use crate::error::{EngineError, EngineResult};
use crate::ledger::EnrolmentLedger;
use crate::models::*;
use crate::notify::Notifier;
use crate::progression::ProgressionCoordinator;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub ledger: EnrolmentLedger,
    pub attempts: AttemptEngine,
    pub progression: ProgressionCoordinator,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        let progression = ProgressionCoordinator::new(store.clone(), notifier.clone());
        let ledger = EnrolmentLedger::new(store.clone(), progression.clone(), notifier.clone());
        let attempts = AttemptEngine::new(
            store,
            progression.clone(),
            Arc::new(StoredOptionRegistrar),
            notifier,
        );
        Self {
            ledger,
            attempts,
            progression,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // enrolment ledger
        .route("/api/enrolments", post(enrol))
        .route("/api/enrolments/disenrol", post(disenrol))
        .route("/api/enrolments/:enrolment_id", get(get_enrolment))
        .route("/api/enrolments/:enrolment_id/refresh", post(refresh_enrolment))
        .route("/api/users/:user_id/enrolments", get(list_user_enrolments))
        // pathways
        .route("/api/pathways/:pathway_id/enrol", post(enrol_pathway))
        .route("/api/pathways/:pathway_id/disenrol", post(disenrol_pathway))
        .route("/api/pathways/:pathway_id/users/:user_id/level", get(pathway_level))
        .route(
            "/api/pathways/:pathway_id/users/:user_id/courses/:course_id/prerequisite",
            get(prerequisite),
        )
        // attempts
        .route("/api/attempts", post(start_attempt))
        .route("/api/attempts/:attempt_id", get(quiz_result))
        .route("/api/attempts/:attempt_id/submit", put(submit_attempt))
        .route(
            "/api/quizzes/:quiz_id/enrolments/:enrolment_id/attempts",
            get(list_attempts),
        )
        .with_state(state)
}

async fn enrol(
    State(app): State<AppState>,
    payload: Result<Json<EnrolReq>, JsonRejection>,
) -> EngineResult<Json<Enrolment>> {
    let req = body(payload)?;
    Ok(Json(app.ledger.enrol(req.user_id, req.course_id).await?))
}

async fn disenrol(
    State(app): State<AppState>,
    payload: Result<Json<EnrolReq>, JsonRejection>,
) -> EngineResult<Json<Enrolment>> {
    let req = body(payload)?;
    Ok(Json(app.ledger.disenrol(req.user_id, req.course_id).await?))
}

async fn get_enrolment(
    State(app): State<AppState>,
    Path(enrolment_id): Path<Uuid>,
) -> EngineResult<Json<Enrolment>> {
    Ok(Json(app.ledger.get(enrolment_id).await?))
}

async fn refresh_enrolment(
    State(app): State<AppState>,
    Path(enrolment_id): Path<Uuid>,
) -> EngineResult<Json<Enrolment>> {
    Ok(Json(
        app.progression.refresh_enrolment_status(enrolment_id).await?,
    ))
}

async fn list_user_enrolments(
    State(app): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> EngineResult<Json<Vec<Enrolment>>> {
    Ok(Json(app.ledger.list_for_user(user_id).await?))
}

async fn enrol_pathway(
    State(app): State<AppState>,
    Path(pathway_id): Path<Uuid>,
    payload: Result<Json<PathwayEnrolReq>, JsonRejection>,
) -> EngineResult<Json<PathwayEnrolment>> {
    let req = body(payload)?;
    Ok(Json(app.ledger.enrol_pathway(req.user_id, pathway_id).await?))
}

async fn disenrol_pathway(
    State(app): State<AppState>,
    Path(pathway_id): Path<Uuid>,
    payload: Result<Json<PathwayEnrolReq>, JsonRejection>,
) -> EngineResult<Json<Vec<Enrolment>>> {
    let req = body(payload)?;
    Ok(Json(
        app.ledger.disenrol_pathway(req.user_id, pathway_id).await?,
    ))
}

#[derive(Serialize)]
struct LevelResp {
    level: u8,
}

async fn pathway_level(
    State(app): State<AppState>,
    Path((pathway_id, user_id)): Path<(Uuid, Uuid)>,
) -> EngineResult<Json<LevelResp>> {
    let level = app.progression.user_pathway_level(user_id, pathway_id).await?;
    Ok(Json(LevelResp { level }))
}

#[derive(Serialize)]
struct PrerequisiteResp {
    satisfied: bool,
}

async fn prerequisite(
    State(app): State<AppState>,
    Path((pathway_id, user_id, course_id)): Path<(Uuid, Uuid, Uuid)>,
) -> EngineResult<Json<PrerequisiteResp>> {
    let satisfied = app
        .progression
        .validate_prerequisite(user_id, pathway_id, course_id)
        .await?;
    Ok(Json(PrerequisiteResp { satisfied }))
}

async fn start_attempt(
    State(app): State<AppState>,
    payload: Result<Json<StartAttemptReq>, JsonRejection>,
) -> EngineResult<Json<QuizAttempt>> {
    let req = body(payload)?;
    Ok(Json(app.attempts.start(req.quiz_id, req.enrolment_id).await?))
}

async fn submit_attempt(
    State(app): State<AppState>,
    Path(attempt_id): Path<Uuid>,
    payload: Bytes,
) -> EngineResult<Json<AttemptWithAnswers>> {
    // no body at all submits with no answers
    let req = if payload.is_empty() {
        SubmitAttemptReq::default()
    } else {
        body(Json::<SubmitAttemptReq>::from_bytes(&payload))?
    };
    Ok(Json(app.attempts.submit(attempt_id, req.answers).await?))
}

async fn quiz_result(
    State(app): State<AppState>,
    Path(attempt_id): Path<Uuid>,
) -> EngineResult<Json<AttemptWithAnswers>> {
    Ok(Json(app.attempts.result(attempt_id).await?))
}

async fn list_attempts(
    State(app): State<AppState>,
    Path((quiz_id, enrolment_id)): Path<(Uuid, Uuid)>,
) -> EngineResult<Json<Vec<QuizAttempt>>> {
    Ok(Json(app.attempts.list(quiz_id, enrolment_id).await?))
}

// --- helpers ---
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> EngineResult<T> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| EngineError::Validation(e.body_text()))
}
