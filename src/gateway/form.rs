use axum::extract::multipart::{Field, MultipartError};
use axum::extract::Multipart;
use axum::http::StatusCode;
use tracing::debug;

use crate::error::GateError;
use crate::upload::media::guess_mime_type;
use crate::upload::{RawFile, UploadRequest};

/// The `/upload` form after decoding.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub password: String,
    pub request: UploadRequest,
}

struct Decoder {
    max_file_bytes: u64,
}

impl Decoder {
    fn rejection(&self, err: MultipartError) -> GateError {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            GateError::FileTooLarge {
                filename: "request body".into(),
                max_bytes: self.max_file_bytes,
            }
        } else {
            GateError::InvalidInput(format!("Malformed upload form: {}", err.body_text()))
        }
    }

    /// Read a file part, stopping as soon as it outgrows the per-file limit.
    async fn file(&self, field: &mut Field<'_>, filename: &str) -> Result<Vec<u8>, GateError> {
        let mut bytes = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(|e| self.rejection(e))? {
            if (bytes.len() + chunk.len()) as u64 > self.max_file_bytes {
                return Err(GateError::FileTooLarge {
                    filename: filename.to_string(),
                    max_bytes: self.max_file_bytes,
                });
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }

    async fn text(&self, field: Field<'_>) -> Result<String, GateError> {
        field.text().await.map_err(|e| self.rejection(e))
    }
}

/// Decode the multipart body. Repeated fields become lists; a single field
/// is a list of one.
pub async fn read_upload_form(
    mut multipart: Multipart,
    max_file_bytes: u64,
) -> Result<UploadForm, GateError> {
    let decoder = Decoder { max_file_bytes };
    let mut form = UploadForm::default();
    let mut captions = Vec::new();
    let mut caption = Vec::new();
    let mut text_status = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| decoder.rejection(e))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "mediaFile" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let declared = field.content_type().map(str::to_string);
                let bytes = decoder.file(&mut field, &filename).await?;

                // Browsers submit an empty part for an untouched file input.
                if filename.is_empty() && bytes.is_empty() {
                    continue;
                }

                let mime_type = match declared.filter(|m| !m.is_empty()) {
                    Some(mime) => mime,
                    None => guess_mime_type(&filename),
                };
                form.request.files.push(RawFile {
                    mime_type,
                    filename,
                    bytes,
                });
            }
            "captions" => captions.push(decoder.text(field).await?),
            "caption" => caption.push(decoder.text(field).await?),
            "textStatus" => text_status = Some(decoder.text(field).await?),
            "password" => form.password = decoder.text(field).await?,
            other => debug!(field = other, "Ignoring unknown upload field"),
        }
    }

    form.request.captions = if captions.is_empty() { caption } else { captions };
    form.request.text_status = text_status;
    Ok(form)
}
