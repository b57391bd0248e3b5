//! Upload admission and dispatch.
//!
//! A request is checked as a whole before anything is sent: one bad file
//! rejects the batch. Admitted items then go out one at a time, in order,
//! because the status feed shows them in arrival order.

pub mod media;

use std::sync::Arc;
use tracing::{error, info};

use crate::channels::{OutgoingMessage, StatusClient, BROADCAST_TARGET};
use crate::error::GateError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_files: usize,
    pub max_file_bytes: u64,
    pub allowed_mime_prefixes: Vec<String>,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_files: 15,
            max_file_bytes: 16 * 1024 * 1024,
            allowed_mime_prefixes: vec!["image/".into(), "video/".into()],
        }
    }
}

impl UploadLimits {
    pub fn allows_mime(&self, mime_type: &str) -> bool {
        self.allowed_mime_prefixes
            .iter()
            .any(|prefix| mime_type.starts_with(prefix.as_str()))
    }
}

/// A file part as received, before admission.
#[derive(Debug, Clone)]
pub struct RawFile {
    pub mime_type: String,
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Files, captions and text exactly as the form carried them. Captions line
/// up with files by position; missing trailing captions leave files bare.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub files: Vec<RawFile>,
    pub captions: Vec<String>,
    pub text_status: Option<String>,
}

/// An admitted file with its caption resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadItem {
    pub mime_type: String,
    pub filename: String,
    pub bytes: Vec<u8>,
    pub caption: Option<String>,
}

impl UploadItem {
    pub fn byte_size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmittedUpload {
    pub items: Vec<UploadItem>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadReceipt {
    pub media_sent: usize,
    pub text_sent: bool,
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub struct UploadPipeline {
    client: Arc<dyn StatusClient>,
    limits: UploadLimits,
}

impl UploadPipeline {
    pub fn new(client: Arc<dyn StatusClient>, limits: UploadLimits) -> Self {
        Self { client, limits }
    }

    pub fn limits(&self) -> &UploadLimits {
        &self.limits
    }

    /// Run every admission check. Nothing is sent from here.
    pub fn admit(&self, request: UploadRequest) -> Result<AdmittedUpload, GateError> {
        let text = non_blank(request.text_status.as_deref());

        if request.files.is_empty() && text.is_none() {
            return Err(GateError::EmptyContent);
        }

        if request.files.len() > self.limits.max_files {
            return Err(GateError::TooManyFiles {
                max: self.limits.max_files,
            });
        }

        let mut items = Vec::with_capacity(request.files.len());
        for (index, file) in request.files.into_iter().enumerate() {
            if !self.limits.allows_mime(&file.mime_type) {
                return Err(GateError::UnsupportedMediaType {
                    filename: file.filename,
                    mime_type: file.mime_type,
                });
            }
            if file.bytes.len() as u64 > self.limits.max_file_bytes {
                return Err(GateError::FileTooLarge {
                    filename: file.filename,
                    max_bytes: self.limits.max_file_bytes,
                });
            }
            items.push(UploadItem {
                caption: non_blank(request.captions.get(index).map(String::as_str)),
                mime_type: file.mime_type,
                filename: file.filename,
                bytes: file.bytes,
            });
        }

        Ok(AdmittedUpload { items, text })
    }

    /// Admit the request, then post each item and the optional text in order.
    ///
    /// A failed send stops the batch. Items already posted stay posted; the
    /// error reports how many went out.
    pub async fn submit(&self, request: UploadRequest) -> Result<UploadReceipt, GateError> {
        let admitted = self.admit(request)?;
        let mut sent = 0;

        for (index, item) in admitted.items.iter().enumerate() {
            info!(
                index,
                filename = %item.filename,
                mime = %item.mime_type,
                bytes = item.byte_size(),
                captioned = item.caption.is_some(),
                "Posting media to status"
            );
            let message = OutgoingMessage::Media {
                media: media::to_payload(item),
                caption: item.caption.clone(),
            };
            self.dispatch(message, sent).await?;
            sent += 1;
        }

        let text_sent = match admitted.text {
            Some(body) => {
                info!(chars = body.chars().count(), "Posting text status");
                self.dispatch(OutgoingMessage::Text { body }, sent).await?;
                true
            }
            None => false,
        };

        Ok(UploadReceipt {
            media_sent: sent,
            text_sent,
        })
    }

    async fn dispatch(&self, message: OutgoingMessage, sent: usize) -> Result<(), GateError> {
        self.client
            .send_message(BROADCAST_TARGET, message)
            .await
            .map_err(|e| {
                error!(client = self.client.name(), sent, error = %e, "Status delivery failed");
                GateError::DeliveryFailed {
                    sent,
                    cause: format!("{e:#}"),
                }
            })
    }
}
