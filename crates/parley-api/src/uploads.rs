use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use parley_store::DiskMedia;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// 25 MB limit on an upload request body. The payload is base64, so the
/// decoded file is roughly three quarters of that.
pub const MAX_UPLOAD_BODY: usize = 25 * 1024 * 1024;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    /// `data:<mime>;base64,<payload>`
    pub data: String,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_mime: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub url: String,
    pub file_name: Option<String>,
    pub file_mime: Option<String>,
}

/// POST /upload: stores a data URL under the uploads directory and returns
/// the `/uploads/...` reference clients attach to messages.
pub async fn upload(
    State(media): State<Arc<DiskMedia>>,
    Json(req): Json<UploadRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let prefix = req.prefix.as_deref().filter(|p| !p.is_empty()).unwrap_or("file");

    let url = media.save_data_url(&req.data, prefix).await.map_err(|e| {
        if e.is_client_error() {
            warn!("Rejected upload: {}", e);
            StatusCode::BAD_REQUEST
        } else {
            error!("Upload failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    })?;

    Ok(Json(UploadResponse {
        url,
        file_name: req.file_name.filter(|n| !n.is_empty()),
        file_mime: req.file_mime.filter(|m| !m.is_empty()),
    }))
}
