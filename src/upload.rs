//! Upload endpoint: validate, decode, complete, encode, store, respond.

use axum::extract::{Multipart, State};
use axum::response::Json;
use serde::Serialize;
use tracing::info;

use crate::error::AppError;
use crate::sheet_codec::{self, file_extension};
use crate::AppState;

const ACCEPTED_EXTENSIONS: [&str; 2] = ["xlsx", "csv"];

/// Successful completion, shaped for the preview frontend.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResponse {
    /// Download URL of the completed workbook.
    pub file_path: String,
    pub file_id: String,
    /// Header row first, then each row's cells.
    pub backend_data: Vec<Vec<serde_json::Value>>,
    /// Transcript lines joined with `\n`.
    pub gpt_output_text: String,
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Raw multipart contents before validation.
#[derive(Debug, Default)]
pub struct UploadParts {
    pub file: Option<UploadedFile>,
    pub prompt: Option<String>,
}

/// A validated upload.
#[derive(Debug)]
pub struct UploadRequest {
    pub file: UploadedFile,
    pub prompt: String,
}

impl UploadParts {
    /// Check presence of file and prompt, then the extension. Content is not sniffed.
    pub fn validate(self) -> Result<UploadRequest, AppError> {
        let file = self
            .file
            .ok_or_else(|| AppError::validation("File upload failed or file not found."))?;
        let prompt = self
            .prompt
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AppError::validation("Missing 'prompt' in the request."))?;

        let accepted = file_extension(&file.filename)
            .map(|ext| ACCEPTED_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false);
        if !accepted {
            return Err(AppError::UnsupportedFileType);
        }

        Ok(UploadRequest { file, prompt })
    }
}

/// Collect the file part (any field with a filename) and the `prompt` field.
pub async fn read_multipart(multipart: &mut Multipart) -> Result<UploadParts, AppError> {
    let mut parts = UploadParts::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("Multipart error: {}", e)))?
    {
        if let Some(filename) = field.file_name().map(str::to_string) {
            if parts.file.is_some() {
                return Err(AppError::validation("Only one file may be uploaded."));
            }
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::validation(format!("Failed to read file: {}", e)))?
                .to_vec();
            parts.file = Some(UploadedFile { filename, data });
        } else if field.name() == Some("prompt") {
            let prompt = field
                .text()
                .await
                .map_err(|e| AppError::validation(format!("Failed to read prompt: {}", e)))?;
            parts.prompt = Some(prompt);
        }
    }

    Ok(parts)
}

/// Run the full pipeline for one validated upload.
///
/// Nothing is written to the output store unless every missing cell was filled
/// and the workbook encoded.
pub async fn process_upload(state: &AppState, request: UploadRequest) -> Result<CompletionResponse, AppError> {
    let UploadRequest { file, prompt } = request;
    info!("Received file: {} ({} bytes)", file.filename, file.data.len());

    let sheet = sheet_codec::decode(&file.filename, &file.data)?;
    let (completed, transcript) = state.completer.complete(&sheet, Some(prompt.as_str())).await?;
    let bytes = sheet_codec::encode(&completed)?;
    let stored = state.outputs.save(&bytes).await?;

    info!(
        "Completion stored: {} ({} cells filled)",
        stored.file_name,
        transcript.len()
    );

    Ok(CompletionResponse {
        file_path: format!("{}/uploads/{}", state.public_base_url, stored.file_name),
        file_id: stored.id,
        backend_data: completed.to_table(),
        gpt_output_text: transcript.to_string(),
    })
}

/// `POST /upload`
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<CompletionResponse>, AppError> {
    let request = read_multipart(&mut multipart).await?.validate()?;
    let response = process_upload(&state, request).await?;
    Ok(Json(response))
}
