//! Route HTTP servant les fichiers du cache
//!
//! `GET /files/{filename}` renvoie le contenu du fichier avec un Content-Type
//! déduit de son extension, ou 404 s'il n'est pas (ou plus) servi.

use crate::key::content_type_for;
use crate::FileServer;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tracing::debug;

/// Crée le router exposant les handles `/files/{filename}`
///
/// ```rust,ignore
/// let app = axum::Router::new().merge(yomicache::file_router(files.clone()));
/// ```
pub fn file_router(server: Arc<FileServer>) -> Router {
    Router::new()
        .route("/files/{filename}", get(get_file))
        .with_state(server)
}

async fn get_file(
    State(server): State<Arc<FileServer>>,
    Path(filename): Path<String>,
) -> Response {
    match server.get(&filename).await {
        Some(bytes) => {
            let content_type = content_type_for(&filename);
            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        None => {
            debug!(filename = %filename, "File not served");
            (StatusCode::NOT_FOUND, "File not found").into_response()
        }
    }
}
