use base64::Engine;

use super::UploadItem;
use crate::channels::MediaPayload;

/// Encode an admitted item for the messaging client.
pub fn to_payload(item: &UploadItem) -> MediaPayload {
    MediaPayload {
        mimetype: item.mime_type.clone(),
        data: base64::engine::general_purpose::STANDARD.encode(&item.bytes),
        filename: item.filename.clone(),
    }
}

/// Guess MIME type from filename extension, for parts sent without one.
pub fn guess_mime_type(filename: &str) -> String {
    let ext = match filename.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => return "application/octet-stream".to_string(),
    };
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "heic" => "image/heic",
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "3gp" => "video/3gpp",
        "mkv" => "video/x-matroska",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
    .to_string()
}
