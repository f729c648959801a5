use axum::{
    extract::{multipart::MultipartError, multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::fs;

use crate::models::*;
use crate::ocr_bridge::NUMERIC_ALPHABET;
use crate::parser;
use crate::preprocess;
use crate::AppState;

/// Form field carrying the uploaded image.
pub const IMAGE_FIELD: &str = "image";

/// Health check endpoint
pub async fn root(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "numscan image processing API is running".to_string(),
        ocr_engine: state.recognizer.name(),
    })
}

/// Read numbers from an uploaded image and total the two-number lines.
pub async fn process_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ExtractionOutcome>, AppError> {
    let mut multipart = multipart.map_err(|rejection| {
        tracing::info!("Rejected upload without multipart body: {}", rejection);
        AppError::MissingInput
    })?;
    let (filename, data) = read_image_field(&mut multipart).await?;
    tracing::info!("Received image '{}': {} bytes", filename, data.len());

    let workspace = RequestWorkspace::create(&state.config.upload_dir)?;
    let result = run_pipeline(&state, &workspace, data).await;
    workspace.close();

    Ok(Json(result?))
}

async fn read_image_field(multipart: &mut Multipart) -> Result<(String, Bytes), AppError> {
    let mut image: Option<(String, Bytes)> = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        if image.is_some() {
            return Err(AppError::BadRequest(
                "Only one image may be uploaded per request".to_string(),
            ));
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let data = field.bytes().await?;
        image = Some((filename, data));
    }

    image.ok_or(AppError::MissingInput)
}

/// Preprocess, recognize, parse and total, strictly in that order.
async fn run_pipeline(
    state: &AppState,
    workspace: &RequestWorkspace,
    data: Bytes,
) -> Result<ExtractionOutcome, AppError> {
    let upload_path = workspace.upload_path();
    let processed_path = workspace.processed_path();

    fs::write(&upload_path, &data).await?;

    let target_width = state.config.target_width;
    let max_output_pixels = state.config.max_output_pixels;
    let (width, height) = tokio::task::spawn_blocking({
        let processed_path = processed_path.clone();
        move || {
            preprocess::normalize(&upload_path, &processed_path, target_width, max_output_pixels)
        }
    })
    .await?
    .map_err(AppError::Processing)?;
    tracing::info!("Processed image: {}x{} grayscale PNG", width, height);

    let text = tokio::task::spawn_blocking({
        let recognizer = state.recognizer.clone();
        move || recognizer.recognize(&processed_path, NUMERIC_ALPHABET)
    })
    .await?
    .map_err(AppError::Recognition)?;
    tracing::debug!("OCR text: {:?}", text);

    let outcome = parser::extract_outcome(&text);
    if !outcome.total.is_finite() {
        return Err(AppError::InternalParsing(format!(
            "total over {} lines is not finite",
            outcome.lines.len()
        )));
    }
    tracing::info!(
        "Extracted {} lines, total {}",
        outcome.lines.len(),
        outcome.total
    );

    Ok(outcome)
}

/// Uniquely named directory holding one request's temporary files.
struct RequestWorkspace {
    dir: TempDir,
}

impl RequestWorkspace {
    fn create(parent: &Path) -> Result<Self, AppError> {
        let dir = tempfile::Builder::new()
            .prefix("request-")
            .tempdir_in(parent)?;
        Ok(Self { dir })
    }

    fn upload_path(&self) -> PathBuf {
        self.dir.path().join("upload")
    }

    fn processed_path(&self) -> PathBuf {
        self.dir.path().join("processed.png")
    }

    /// Remove the directory now rather than on drop, so failures get logged.
    fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(err) = self.dir.close() {
            tracing::warn!("Failed to remove temporary files in {}: {}", path.display(), err);
        }
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    MissingInput,
    BadRequest(String),
    Multipart(MultipartError),
    Processing(anyhow::Error),
    Recognition(anyhow::Error),
    InternalParsing(String),
    InternalError(anyhow::Error),
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalError(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(err.into())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::Multipart(err)
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::InternalError(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::MissingInput => (StatusCode::BAD_REQUEST, "No image provided".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Multipart(err) => {
                tracing::info!("Malformed upload: {}", err);
                (err.status(), err.body_text())
            }
            AppError::Processing(err) => {
                tracing::error!("Image preprocessing failed: {:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to process image".to_string())
            }
            AppError::Recognition(err) => {
                tracing::error!("OCR recognition failed: {:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "OCR recognition failed".to_string())
            }
            AppError::InternalParsing(detail) => {
                tracing::error!("Number processing failed: {}", detail);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to process numbers".to_string())
            }
            AppError::InternalError(err) => {
                tracing::error!("Internal error: {:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(ErrorBody {
            error: error_message,
        });

        (status, body).into_response()
    }
}
