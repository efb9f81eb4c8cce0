use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tutoria_assignment::PendingAssignment;
use tutoria_core::{Actor, ClassRequest, ClassStatus, NewClassRequest, TeacherProfile};
use tutoria_offer::{Offer, OfferSubmission, RequestWithOffers};

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct BoardQuery {
    pub status: Option<ClassStatus>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitOfferRequest {
    pub teacher: TeacherProfile,
    #[serde(flatten)]
    pub submission: OfferSubmission,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/class-requests", post(open_request).get(list_requests))
        .route("/v1/class-requests/{id}", get(get_request))
        .route("/v1/class-requests/{id}/offers", post(submit_offer).get(list_offers))
        .route("/v1/class-requests/{id}/offers/{offer_id}/withdraw", post(withdraw_offer))
        .route("/v1/class-requests/{id}/offers/{offer_id}/select", post(select_offer))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/class-requests
async fn open_request(
    State(state): State<AppState>,
    Json(draft): Json<NewClassRequest>,
) -> Result<(StatusCode, Json<ClassRequest>), AppError> {
    let request = state.workflow.open_request(draft).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// GET /v1/class-requests?status=pending
/// Admin board of requests with their offers
async fn list_requests(
    State(state): State<AppState>,
    Query(query): Query<BoardQuery>,
) -> Result<Json<Vec<RequestWithOffers>>, AppError> {
    Ok(Json(state.ledger().list_requests_with_offers(query.status).await?))
}

async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ClassRequest>, AppError> {
    Ok(Json(state.workflow.get_request(&id).await?))
}

/// POST /v1/class-requests/{id}/offers
/// One open offer per teacher and request
async fn submit_offer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SubmitOfferRequest>,
) -> Result<(StatusCode, Json<Offer>), AppError> {
    if state.ledger().has_open_offer(&req.teacher.id, &id).await? {
        return Err(AppError::ConflictError(format!(
            "teacher {} already has an open offer on class request {}",
            req.teacher.id, id
        )));
    }
    let offer = state.ledger().submit_offer(&id, &req.teacher, req.submission).await?;
    Ok((StatusCode::CREATED, Json(offer)))
}

async fn list_offers(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Vec<Offer>>, AppError> {
    Ok(Json(state.ledger().list_offers(&id).await?))
}

/// POST /v1/class-requests/{id}/offers/{offer_id}/withdraw
async fn withdraw_offer(
    State(state): State<AppState>,
    Path((id, offer_id)): Path<(String, String)>,
    Json(actor): Json<Actor>,
) -> Result<Json<Offer>, AppError> {
    Ok(Json(state.ledger().withdraw_or_cancel_offer(&id, &offer_id, &actor).await?))
}

/// POST /v1/class-requests/{id}/offers/{offer_id}/select
async fn select_offer(
    State(state): State<AppState>,
    Path((id, offer_id)): Path<(String, String)>,
    Json(admin): Json<Actor>,
) -> Result<(StatusCode, Json<PendingAssignment>), AppError> {
    let pending = state.workflow.select_offer(&id, &offer_id, &admin).await?;
    Ok((StatusCode::CREATED, Json(pending)))
}
