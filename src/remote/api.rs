//! HTTP surface of the mock backend.
//!
//! Serves the notes REST endpoints over a shared [`RemoteStore`], answering
//! every request with an [`ApiResponse`] envelope.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Serialize;
use tracing::info;

use super::{ApiResponse, RemoteError, RemoteResult, RemoteStore};
use crate::entity::{Note, NoteDraft, NoteId, NotePatch};
use crate::error::Result;

pub type SharedRemote = Arc<dyn RemoteStore>;

/// Build the `/api/notes` router.
pub fn router(remote: SharedRemote) -> Router {
    Router::new()
        .route(
            "/api/notes",
            get(list_notes)
                .post(create_note)
                .delete(clear_notes)
                .options(preflight),
        )
        .route("/api/notes/bulk", put(update_many).options(preflight))
        .route(
            "/api/notes/sync",
            axum::routing::post(sync_notes).options(preflight),
        )
        .route(
            "/api/notes/{id}",
            put(update_note).delete(delete_note).options(preflight),
        )
        .layer(axum::middleware::map_response(with_cors))
        .with_state(remote)
}

/// Serve the mock API until ctrl-c.
pub async fn serve(remote: SharedRemote, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "mock notes API listening");

    axum::serve(listener, router(remote))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

async fn with_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

fn respond<T: Serialize>(result: RemoteResult<T>, success: StatusCode) -> Response {
    let status = match &result {
        Ok(_) => success,
        Err(RemoteError::NotFound(_)) => StatusCode::NOT_FOUND,
        Err(RemoteError::Network(_)) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ApiResponse::from(result))).into_response()
}

async fn list_notes(State(remote): State<SharedRemote>) -> Response {
    respond(remote.get_all().await, StatusCode::OK)
}

async fn create_note(State(remote): State<SharedRemote>, Json(draft): Json<NoteDraft>) -> Response {
    respond(remote.create(draft).await, StatusCode::CREATED)
}

async fn update_note(
    State(remote): State<SharedRemote>,
    Path(id): Path<NoteId>,
    Json(patch): Json<NotePatch>,
) -> Response {
    respond(remote.update(id, patch).await, StatusCode::OK)
}

async fn update_many(State(remote): State<SharedRemote>, Json(notes): Json<Vec<Note>>) -> Response {
    respond(remote.update_many(&notes).await, StatusCode::OK)
}

async fn delete_note(State(remote): State<SharedRemote>, Path(id): Path<NoteId>) -> Response {
    respond(remote.delete(id).await, StatusCode::OK)
}

async fn clear_notes(State(remote): State<SharedRemote>) -> Response {
    respond(remote.clear().await, StatusCode::OK)
}

async fn sync_notes(State(remote): State<SharedRemote>, Json(notes): Json<Vec<Note>>) -> Response {
    respond(remote.sync(&notes).await, StatusCode::OK)
}
