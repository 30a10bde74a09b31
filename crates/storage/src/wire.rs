//! Backend wire format
//!
//! Each stored record carries its geometry as a JSON string in `text`:
//! `{"type": "ink", "version": 2, "data": {...}}`. `x`/`y` hold the
//! top-left of the bounding box so list views on the server can sort without
//! decoding the payload.

use annotator_core::annotation::{
    group_by_page, new_annotation_id, Annotation, AnnotationGeometry, AnnotationKind,
    CoordinateSpace, GeometryError, PageAnnotations,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("response is not an annotation list: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("response body is not a JSON object")]
    EnvelopeShape,
    #[error("malformed record: {0}")]
    Record(#[source] serde_json::Error),
    #[error("page {0} is not a valid page number")]
    Page(i64),
    #[error("undecodable text payload: {0}")]
    Payload(#[source] serde_json::Error),
    #[error("payload data is not an object")]
    PayloadShape,
    #[error("unknown annotation type {0:?}")]
    UnknownKind(String),
    #[error("{0}")]
    Version(String),
    #[error("invalid geometry: {0}")]
    Geometry(#[from] GeometryError),
    #[error("failed to encode annotations: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    annotations: Vec<Value>,
}

/// Stored record as the server returns it; author fields are ignored
#[derive(Debug, Deserialize)]
struct StoredRecord {
    #[serde(default)]
    id: String,
    page: i64,
    text: String,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    updated_at: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutgoingRecord<'a> {
    id: &'a str,
    page: u32,
    x: f32,
    y: f32,
    text: String,
    created_at: &'a str,
    updated_at: &'a str,
}

#[derive(Debug, Serialize)]
struct OutgoingEnvelope<'a> {
    annotations: Vec<OutgoingRecord<'a>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Payload {
    #[serde(rename = "type")]
    kind: String,
    version: u8,
    data: Value,
}

/// Decode a response body, dropping records that fail validation
///
/// Only an unparseable envelope fails the whole call.
pub fn decode_annotations(body: &str) -> Result<PageAnnotations, CodecError> {
    let value: Value = serde_json::from_str(body).map_err(CodecError::Envelope)?;
    if !value.is_object() {
        return Err(CodecError::EnvelopeShape);
    }
    let envelope: Envelope = serde_json::from_value(value).map_err(CodecError::Envelope)?;
    let total = envelope.annotations.len();

    let mut kept = Vec::with_capacity(total);
    for (index, record) in envelope.annotations.iter().enumerate() {
        match decode_record(record) {
            Ok(annotation) => kept.push(annotation),
            Err(err) => {
                let id = record.get("id").and_then(Value::as_str).unwrap_or("");
                tracing::warn!(index, id, %err, "dropping stored annotation");
            }
        }
    }

    if kept.len() < total {
        tracing::debug!(kept = kept.len(), total, "decoded annotations with drops");
    }
    Ok(group_by_page(kept))
}

/// Decode one stored record
pub fn decode_record(record: &Value) -> Result<Annotation, CodecError> {
    let stored = StoredRecord::deserialize(record).map_err(CodecError::Record)?;
    let page = u32::try_from(stored.page)
        .ok()
        .filter(|page| *page >= 1)
        .ok_or(CodecError::Page(stored.page))?;

    let payload: Payload = serde_json::from_str(&stored.text).map_err(CodecError::Payload)?;
    let kind = AnnotationKind::parse(&payload.kind)
        .ok_or_else(|| CodecError::UnknownKind(payload.kind.clone()))?;
    let space = CoordinateSpace::try_from(payload.version).map_err(CodecError::Version)?;

    let Value::Object(mut data) = payload.data else {
        return Err(CodecError::PayloadShape);
    };
    data.insert("type".to_owned(), Value::from(kind.as_str()));
    let geometry: AnnotationGeometry =
        serde_json::from_value(Value::Object(data)).map_err(CodecError::Payload)?;
    geometry.validate()?;

    let id = if stored.id.is_empty() { new_annotation_id() } else { stored.id };
    let updated_at = stored.updated_at.filter(|stamp| !stamp.is_empty());
    Ok(Annotation::from_parts(id, page, space, geometry, stored.created_at, updated_at))
}

fn encode_payload(annotation: &Annotation) -> Result<String, CodecError> {
    let mut data = serde_json::to_value(annotation.geometry()).map_err(CodecError::Encode)?;
    if let Value::Object(map) = &mut data {
        map.remove("type");
    }
    let payload = Payload {
        kind: annotation.kind().as_str().to_owned(),
        version: annotation.space().into(),
        data,
    };
    serde_json::to_string(&payload).map_err(CodecError::Encode)
}

/// Encode a save request body, stamping every record with `updated_at`
pub fn encode_annotations(annotations: &[Annotation], updated_at: &str) -> Result<String, CodecError> {
    let records = annotations
        .iter()
        .map(|annotation| {
            let anchor = annotation.anchor();
            Ok(OutgoingRecord {
                id: annotation.id(),
                page: annotation.page(),
                x: anchor.x,
                y: anchor.y,
                text: encode_payload(annotation)?,
                created_at: annotation.created_at(),
                updated_at,
            })
        })
        .collect::<Result<Vec<_>, CodecError>>()?;

    serde_json::to_string(&OutgoingEnvelope { annotations: records }).map_err(CodecError::Encode)
}
