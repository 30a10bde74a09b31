//! Persistence gateway
//!
//! Loads and saves the annotation set of one file for one user, and uploads
//! flattened PDF exports.

use crate::config::GatewayConfig;
use crate::transport::{Body, MultipartForm, Request, Transport, TransportError, UreqTransport};
use crate::wire::{self, CodecError};
use annotator_core::annotation::{timestamp_now, Annotation, PageAnnotations};
use annotator_core::store::AnnotationStore;
use annotator_flatten::FlattenError;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("failed to flatten annotations: {0}")]
    Flatten(#[from] FlattenError),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// What a save call reports back
#[derive(Debug, Clone, PartialEq)]
pub struct SaveReceipt {
    /// Number of records sent
    pub saved: usize,

    /// Timestamp stamped on every record
    pub updated_at: String,

    /// Server's view after the save, when requested with `return_full`
    pub persisted: Option<PageAnnotations>,
}

#[derive(Debug, Deserialize)]
struct ExportResponse {
    object_key: String,
}

pub struct Gateway<T: Transport> {
    transport: T,
    config: GatewayConfig,
}

impl Gateway<UreqTransport> {
    /// Gateway over HTTP using `config`
    pub fn http(config: GatewayConfig) -> Self {
        Self::new(UreqTransport::new(&config), config)
    }
}

impl<T: Transport> Gateway<T> {
    pub fn new(transport: T, config: GatewayConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn annotations_path(&self, file_id: u64) -> String {
        format!("{}/files/{file_id}/annotations", self.config.annotations_root())
    }

    /// All annotations of `file_id`, grouped by page in response order
    pub fn load(&self, file_id: u64, user_id: u64) -> Result<PageAnnotations, GatewayError> {
        let body = self
            .transport
            .send(&Request::get(self.annotations_path(file_id), user_id))?;
        let pages = wire::decode_annotations(&body)?;
        tracing::debug!(file_id, pages = pages.len(), "loaded annotations");
        Ok(pages)
    }

    /// Replace the stored set with `annotations` in one bulk upsert
    ///
    /// Never retried; a failure leaves the caller's state untouched.
    pub fn save(
        &self,
        file_id: u64,
        user_id: u64,
        annotations: &[Annotation],
    ) -> Result<SaveReceipt, GatewayError> {
        let updated_at = timestamp_now();
        let body = wire::encode_annotations(annotations, &updated_at)?;
        let return_full = self.config.return_full;
        let path = format!(
            "{}?return_full={}",
            self.annotations_path(file_id),
            u8::from(return_full)
        );

        let response = self
            .transport
            .send(&Request::post(path, user_id, Body::Json(body)))?;

        let persisted = if return_full { Some(wire::decode_annotations(&response)?) } else { None };
        tracing::debug!(file_id, saved = annotations.len(), "saved annotations");
        Ok(SaveReceipt { saved: annotations.len(), updated_at, persisted })
    }

    /// Flatten `annotations` into `pdf` and upload the result
    ///
    /// Returns the object key the server stored the file under.
    pub fn export(
        &self,
        file_id: u64,
        user_id: u64,
        pdf: &[u8],
        annotations: &[Annotation],
    ) -> Result<String, GatewayError> {
        let flattened = annotator_flatten::flatten_annotations(pdf, annotations)?;
        let form = MultipartForm::new()
            .file("file", format!("{file_id}.pdf"), "application/pdf", flattened)
            .text("file_id", file_id.to_string());

        let response = self
            .transport
            .send(&Request::post("/pdf/save", user_id, Body::Multipart(form)))?;
        let parsed: ExportResponse = serde_json::from_str(&response)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        tracing::debug!(file_id, object_key = %parsed.object_key, "exported pdf");
        Ok(parsed.object_key)
    }
}

impl<T: Transport> AnnotationStore for Gateway<T> {
    type Error = GatewayError;

    fn load(&self, file_id: u64, user_id: u64) -> Result<PageAnnotations, GatewayError> {
        Gateway::load(self, file_id, user_id)
    }

    fn save(&self, file_id: u64, user_id: u64, annotations: &[Annotation]) -> Result<(), GatewayError> {
        Gateway::save(self, file_id, user_id, annotations).map(|_| ())
    }
}
