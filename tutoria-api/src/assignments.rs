use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use tutoria_assignment::{ClassUnion, Outcome, PendingAssignment};
use tutoria_core::{Actor, ClassRequest};

use crate::error::AppError;
use crate::state::AppState;

/// Transitions on a pending assignment. The body is the acting user.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/assignments/{id}/teacher-accept", post(teacher_accept))
        .route("/v1/assignments/{id}/teacher-reject", post(teacher_reject))
        .route("/v1/assignments/{id}/admin-cancel", post(admin_cancel))
        .route("/v1/assignments/{id}/student-confirm", post(student_confirm))
        .route("/v1/assignments/{id}/student-reject", post(student_reject))
}

async fn teacher_accept(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(actor): Json<Actor>,
) -> Result<Json<Outcome<PendingAssignment>>, AppError> {
    Ok(Json(state.workflow.teacher_accept(&id, &actor).await?))
}

async fn teacher_reject(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(actor): Json<Actor>,
) -> Result<Json<Outcome<ClassRequest>>, AppError> {
    Ok(Json(state.workflow.teacher_reject(&id, &actor).await?))
}

async fn admin_cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(actor): Json<Actor>,
) -> Result<Json<Outcome<ClassRequest>>, AppError> {
    Ok(Json(state.workflow.admin_cancel(&id, &actor).await?))
}

async fn student_confirm(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(actor): Json<Actor>,
) -> Result<Json<Outcome<ClassUnion>>, AppError> {
    Ok(Json(state.workflow.student_confirm(&id, &actor).await?))
}

async fn student_reject(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(actor): Json<Actor>,
) -> Result<Json<Outcome<()>>, AppError> {
    Ok(Json(state.workflow.student_reject(&id, &actor).await?))
}
