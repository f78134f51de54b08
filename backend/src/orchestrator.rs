//! Turns one decoded predict request into one envelope.
//!
//! Every item is handled on its own: a missing filename, undecodable bytes
//! or a failed inference end up in that item's result and the loop moves on.
//! Only an empty upload fails the whole batch.

use serde_json::json;
use shared::{ItemResult, Label};
use std::sync::Arc;

use crate::audit::{AuditSink, AuditTable};
use crate::envelope::Envelope;
use crate::inference::InferenceModel;

/// Items beyond this count are dropped without a result entry.
pub const MAX_FILES: usize = 16;

/// Accepted multipart field names, highest priority first.
pub const FILE_FIELDS: [&str; 2] = ["images[]", "image"];

pub const NO_FILE_MESSAGE: &str =
    "No file uploaded. Send as multipart/form-data with field name 'image' or 'images[]'.";

#[derive(Debug, Clone, PartialEq)]
pub struct UploadedItem {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// One file part of the multipart body together with its field name.
#[derive(Debug, Clone, PartialEq)]
pub struct FileField {
    pub field: String,
    pub item: UploadedItem,
}

/// What the transport hands over after decoding the HTTP request.
#[derive(Debug, Clone, Default)]
pub struct PredictRequest {
    pub forwarded_for: Option<String>,
    pub peer_addr: Option<String>,
    pub content_type: Option<String>,
    pub path: String,
    pub method: String,
    pub files: Vec<FileField>,
}

impl PredictRequest {
    /// Forwarded address first, then the socket peer, else empty. The
    /// forwarded header is taken as sent.
    pub fn client_ip(&self) -> String {
        self.forwarded_for
            .as_deref()
            .or(self.peer_addr.as_deref())
            .unwrap_or_default()
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ItemError {
    #[error("empty-filename")]
    EmptyFilename,
    #[error("invalid-image")]
    InvalidImage,
    #[error("{0}")]
    Processing(String),
}

pub struct BatchOrchestrator {
    model: Arc<InferenceModel>,
    audit: AuditSink,
}

impl BatchOrchestrator {
    pub fn new(model: Arc<InferenceModel>, audit: AuditSink) -> Self {
        Self { model, audit }
    }

    pub async fn predict(&self, request: PredictRequest) -> Envelope<Vec<ItemResult>> {
        let client_ip = request.client_ip();
        let mut items = select_items(request.files);

        if items.is_empty() {
            log::info!("Predict request from {:?} carried no file", client_ip);
            self.audit
                .record(AuditTable::Error, &client_ip, json!({"reason": "no-file"}));
            return Envelope::failure(NO_FILE_MESSAGE);
        }

        if items.len() > MAX_FILES {
            log::debug!("Truncating batch of {} files to {}", items.len(), MAX_FILES);
            items.truncate(MAX_FILES);
        }
        let files_count = items.len();

        let mut results = Vec::with_capacity(files_count);
        for item in items {
            results.push(self.process_item(item, &client_ip).await);
        }

        self.audit.record(
            AuditTable::Access,
            &client_ip,
            json!({
                "path": request.path,
                "method": request.method,
                "files_count": files_count,
                "content_type": request.content_type,
            }),
        );

        Envelope::success(results)
    }

    pub fn readyz(&self) -> Envelope<&'static str> {
        Envelope::success("ready")
    }

    pub fn livez(&self) -> Envelope<&'static str> {
        Envelope::success("alive")
    }

    async fn process_item(&self, item: UploadedItem, client_ip: &str) -> ItemResult {
        let UploadedItem {
            filename,
            bytes,
            mime_type,
        } = item;
        let Some(filename) = filename.filter(|name| !name.is_empty()) else {
            return ItemResult::failed(None, ItemError::EmptyFilename.to_string());
        };
        log::debug!("Classifying {} ({}, {} bytes)", filename, mime_type, bytes.len());

        match self.classify_bytes(bytes).await {
            Ok(label) => {
                self.audit.record(
                    AuditTable::User,
                    client_ip,
                    json!({
                        "action": "predict",
                        "filename": filename,
                        "prediction": label,
                    }),
                );
                ItemResult::predicted(filename, label)
            }
            Err(err) => {
                let message = err.to_string();
                log::warn!("Prediction failed for {}: {}", filename, message);
                self.audit.record(
                    AuditTable::Error,
                    client_ip,
                    json!({
                        "where": "predict",
                        "filename": filename,
                        "error": message,
                    }),
                );
                ItemResult::failed(Some(filename), message)
            }
        }
    }

    /// Decodes and classifies on the blocking pool; a panic in the model is
    /// reported as a processing error for this item only.
    async fn classify_bytes(&self, bytes: Vec<u8>) -> Result<Label, ItemError> {
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || {
            let image = image::load_from_memory(&bytes).map_err(|e| {
                log::debug!("Image decode failed: {}", e);
                ItemError::InvalidImage
            })?;
            model
                .classify(&image)
                .map_err(|e| ItemError::Processing(e.to_string()))
        })
        .await
        .unwrap_or_else(|e| Err(ItemError::Processing(format!("inference task failed: {}", e))))
    }
}

/// Items of the first accepted field that has any; fields are never merged.
fn select_items(files: Vec<FileField>) -> Vec<UploadedItem> {
    let mut by_field: [Vec<UploadedItem>; 2] = Default::default();
    for file in files {
        if let Some(slot) = FILE_FIELDS.iter().position(|name| *name == file.field) {
            by_field[slot].push(file.item);
        }
    }
    by_field
        .into_iter()
        .find(|items| !items.is_empty())
        .unwrap_or_default()
}
