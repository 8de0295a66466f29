use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::error::AppError;
use crate::service::{
    AssignmentService, ChatResponse, FinalizeResponse, GenerateRequest, GenerateResponse,
    PreviewResponse, DOCX_CONTENT_TYPE,
};

const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone)]
struct AppState {
    service: Arc<AssignmentService>,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    document_id: String,
    user_prompt: String,
}

#[derive(Debug, Default, Deserialize)]
struct FinalizeRequest {
    #[serde(default)]
    student_name: Option<String>,
}

pub fn router(service: Arc<AssignmentService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/generate", post(generate))
        .route("/api/preview/:document_id", get(preview))
        .route("/api/chat", post(chat))
        .route("/api/finalize/:document_id", post(finalize))
        .route("/api/download/:filename", get(download))
        .route("/api/cleanup/:document_id", post(cleanup).delete(cleanup))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { service })
}

/// Serves until Ctrl-C. Expired sessions are swept every `sweep_interval`; all
/// remaining sessions are dropped on shutdown.
pub async fn run_server(
    bind: &str,
    service: Arc<AssignmentService>,
    sweep_interval: Duration,
) -> anyhow::Result<()> {
    let addr: SocketAddr = bind.parse()?;
    let sweeper = tokio::spawn(sweep_sessions(service.clone(), sweep_interval));
    let app = router(service.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    tokio::task::spawn_blocking(move || service.shutdown()).await?;
    info!("server stopped");
    Ok(())
}

async fn sweep_sessions(service: Arc<AssignmentService>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let svc = service.clone();
        match tokio::task::spawn_blocking(move || svc.purge_expired()).await {
            Ok(0) => {}
            Ok(n) => debug!(purged = n, "session sweep"),
            Err(err) => tracing::warn!(error = %err, "session sweep failed"),
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

/// Runs service work on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| AppError::Internal(anyhow!("worker task failed: {err}")))?
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now(),
        "active_sessions": state.service.sessions().len(),
    }))
}

fn bad_multipart(err: axum::extract::multipart::MultipartError) -> AppError {
    AppError::InvalidUpload(format!("Malformed upload: {err}"))
}

async fn generate(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<GenerateResponse>, AppError> {
    let mut req = GenerateRequest::default();
    let mut has_file = false;
    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "template" | "file" => {
                req.file_name = field.file_name().unwrap_or_default().to_string();
                req.bytes = field.bytes().await.map_err(bad_multipart)?.to_vec();
                has_file = true;
            }
            "topic" => req.topic = field.text().await.map_err(bad_multipart)?,
            "subject" => req.subject = field.text().await.map_err(bad_multipart)?,
            "word_count" => {
                let raw = field.text().await.map_err(bad_multipart)?;
                req.word_count = parse_optional(&raw, "word_count")?;
            }
            "temperature" => {
                let raw = field.text().await.map_err(bad_multipart)?;
                req.temperature = parse_optional(&raw, "temperature")?;
            }
            other => debug!(field = %other, "ignoring form field"),
        }
    }
    if !has_file {
        return Err(AppError::InvalidUpload("No template file uploaded".to_string()));
    }

    let service = state.service.clone();
    let resp = blocking(move || service.generate(req)).await?;
    Ok(Json(resp))
}

fn parse_optional<T: std::str::FromStr>(raw: &str, field: &str) -> Result<Option<T>, AppError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .map_err(|_| AppError::InvalidUpload(format!("Invalid {field}: {raw}")))
}

async fn preview(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> Result<Json<PreviewResponse>, AppError> {
    let service = state.service.clone();
    let resp = blocking(move || service.preview(&document_id)).await?;
    Ok(Json(resp))
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let service = state.service.clone();
    let resp =
        blocking(move || service.chat(&request.document_id, &request.user_prompt)).await?;
    Ok(Json(resp))
}

async fn finalize(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    request: Option<Json<FinalizeRequest>>,
) -> Result<Json<FinalizeResponse>, AppError> {
    let student = request.and_then(|Json(r)| r.student_name);
    let service = state.service.clone();
    let resp = blocking(move || service.finalize(&document_id, student.as_deref())).await?;
    Ok(Json(resp))
}

async fn download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let path = state.service.download_path(&filename)?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| AppError::FileNotFound(filename.clone()))?;
    Ok((
        [
            (header::CONTENT_TYPE, DOCX_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    ))
}

async fn cleanup(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let service = state.service.clone();
    let id = document_id.clone();
    blocking(move || service.cleanup(&id)).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Document {document_id} cleaned up"),
    })))
}

#[cfg(test)]
mod tests {
    use crate::error::AppError;

    use super::parse_optional;

    #[test]
    fn optional_form_numbers() {
        assert_eq!(parse_optional::<usize>("  ", "word_count").ok(), Some(None));
        assert_eq!(parse_optional::<f32>("0.5", "temperature").ok(), Some(Some(0.5)));
        assert!(matches!(
            parse_optional::<usize>("lots", "word_count"),
            Err(AppError::InvalidUpload(_))
        ));
    }
}
