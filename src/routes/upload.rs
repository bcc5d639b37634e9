use super::ApiError;
use crate::{server::SharedState, storage::validate_filename};
use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    response::Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Multipart field names carrying files. Browsers appending to a FormData
/// with `files[]` keep the brackets in the field name.
const FILE_FIELDS: [&str; 2] = ["files", "files[]"];
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadedFileInfo {
    pub filename: String,
    pub size: u64,
    pub content_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub files_count: usize,
    pub files: Vec<UploadedFileInfo>,
}

struct UploadedFile {
    filename: String,
    content: Bytes,
    content_type: String,
}

impl UploadedFile {
    fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

/// Stores every file part of a multipart request.
///
/// The whole body is read and validated before anything touches the disk:
/// one part with a missing or unusable filename rejects the request.
#[instrument(skip(state, multipart))]
pub async fn upload_files(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let files = read_files(multipart).await?;

    if files.is_empty() {
        return Err(ApiError::BadRequest("No files provided".into()));
    }

    let mut uploaded = Vec::with_capacity(files.len());
    for file in files {
        state.file_store.save(&file.filename, &file.content).await?;
        state.metrics.record_upload(file.size(), &file.content_type);

        uploaded.push(UploadedFileInfo {
            size: file.size(),
            filename: file.filename,
            content_type: file.content_type,
        });
    }

    tracing::info!("Stored {} uploaded files", uploaded.len());

    Ok(Json(UploadResponse {
        message: "Files uploaded successfully".into(),
        files_count: uploaded.len(),
        files: uploaded,
    }))
}

async fn read_files(mut multipart: Multipart) -> Result<Vec<UploadedFile>, ApiError> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart data: {}", e.body_text())))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if !FILE_FIELDS.contains(&name.as_str()) {
            tracing::debug!("Ignoring multipart field {:?}", name);
            continue;
        }

        let filename = match field.file_name() {
            Some(filename) if !filename.is_empty() => filename.to_string(),
            _ => return Err(ApiError::BadRequest("Uploaded file is missing a filename".into())),
        };
        validate_filename(&filename)?;

        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let content = field.bytes().await.map_err(|e| {
            ApiError::BadRequest(format!("Failed to read file {:?}: {}", filename, e.body_text()))
        })?;

        files.push(UploadedFile {
            filename,
            content,
            content_type,
        });
    }

    Ok(files)
}
