use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures_util::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tutoria_assignment::{ClassUnion, PendingAssignment};
use tutoria_core::collections;
use tutoria_offer::MyOffer;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/teachers/{id}/offers", get(my_offers))
        .route("/v1/teachers/{id}/offers/stream", get(stream_my_offers))
        .route("/v1/teachers/{id}/assignments", get(teacher_assignments))
        .route("/v1/teachers/{id}/unions", get(teacher_unions))
        .route("/v1/requesters/{id}/assignments", get(requester_assignments))
        .route("/v1/requesters/{id}/unions", get(requester_unions))
}

async fn my_offers(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Vec<MyOffer>>, AppError> {
    Ok(Json(state.ledger().list_my_offers(&id).await?))
}

/// GET /v1/teachers/{id}/offers/stream
/// Sends the full "my offers" list on connect and again after every relevant write
async fn stream_my_offers(
    State(state): State<AppState>,
    Path(teacher_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let index = collections::teacher_offer_index(&teacher_id);
    let requests = collections::class_requests();

    let changes = BroadcastStream::new(state.store.subscribe()).filter_map(move |change| {
        // A lagged receiver may have missed a relevant write, so refresh.
        let relevant = match change {
            Ok(event) => event.collection == index || event.collection.is_within(&requests),
            Err(_) => true,
        };
        async move { relevant.then_some(()) }
    });

    let snapshots = stream::once(async {}).chain(changes).then(move |()| {
        let state = state.clone();
        let teacher_id = teacher_id.clone();
        async move { Ok::<_, Infallible>(snapshot(&state, &teacher_id).await) }
    });

    Sse::new(snapshots).keep_alive(KeepAlive::default())
}

async fn snapshot(state: &AppState, teacher_id: &str) -> Event {
    let event = match state.ledger().list_my_offers(teacher_id).await {
        Ok(offers) => Event::default().event("my_offers").json_data(&offers),
        Err(e) => {
            tracing::warn!("Could not list offers of teacher {}: {}", teacher_id, e);
            return Event::default().event("error").data(e.to_string());
        }
    };
    event.unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}

async fn teacher_assignments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PendingAssignment>>, AppError> {
    Ok(Json(state.workflow.assignments_for_teacher(&id).await?))
}

async fn teacher_unions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ClassUnion>>, AppError> {
    Ok(Json(state.workflow.unions_for_teacher(&id).await?))
}

async fn requester_assignments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PendingAssignment>>, AppError> {
    Ok(Json(state.workflow.assignments_for_requester(&id).await?))
}

async fn requester_unions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ClassUnion>>, AppError> {
    Ok(Json(state.workflow.unions_for_requester(&id).await?))
}
