//! Document input shape and stored record
//!
//! A [`Document`] is what callers hand in: text plus a metadata map. It is
//! validated and flattened into a row of the document schema before any
//! backend call. Rows read back are rebuilt into [`DocumentRecord`]s.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::backend::{Entity, FieldValue};
use super::error::VectorError;
use super::schema::{fields, CollectionSchema};

/// Structured header metadata, stored as a JSON string
pub type Headers = Map<String, Value>;

/// Metadata keys read from [`Document::metadata`]
pub mod metadata_keys {
    pub const USER_ID: &str = "user_id";
    pub const KB_ID: &str = "kb_id";
    pub const FILE_ID: &str = "file_id";
    pub const DOC_ID: &str = "doc_id";
    pub const HEADERS: &str = "headers";
}

/// A text chunk with its metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Document {
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata: Map::new(),
        }
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_user_id(self, user_id: &str) -> Self {
        self.with_metadata(metadata_keys::USER_ID, Value::String(user_id.to_string()))
    }

    pub fn with_kb_id(self, kb_id: &str) -> Self {
        self.with_metadata(metadata_keys::KB_ID, Value::String(kb_id.to_string()))
    }

    pub fn with_file_id(self, file_id: &str) -> Self {
        self.with_metadata(metadata_keys::FILE_ID, Value::String(file_id.to_string()))
    }

    pub fn with_doc_id(self, doc_id: &str) -> Self {
        self.with_metadata(metadata_keys::DOC_ID, Value::String(doc_id.to_string()))
    }

    pub fn with_headers(self, headers: Headers) -> Self {
        self.with_metadata(metadata_keys::HEADERS, Value::Object(headers))
    }

    /// `user_id` metadata, if present as a string
    pub fn user_id(&self) -> Option<&str> {
        self.metadata.get(metadata_keys::USER_ID).and_then(Value::as_str)
    }

    pub fn doc_id(&self) -> Option<&str> {
        self.metadata.get(metadata_keys::DOC_ID).and_then(Value::as_str)
    }
}

/// A stored document as returned by search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Primary key assigned by the store
    pub id: i64,
    pub user_id: String,
    pub kb_id: String,
    pub file_id: String,
    pub headers: Headers,
    pub doc_id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    /// Score against the query vector; `None` for filter-only results
    pub distance: Option<f32>,
}

impl DocumentRecord {
    /// Rebuild a record from a row carrying every output field
    pub(crate) fn from_entity(mut entity: Entity, distance: Option<f32>) -> Result<Self, String> {
        let id = match entity.remove(fields::ID) {
            Some(FieldValue::Int64(id)) => id,
            Some(other) => return Err(format!("field 'id' has type {}", other.dtype())),
            None => return Err("hit is missing field 'id'".to_string()),
        };

        let mut text = |name: &str| -> Result<String, String> {
            match entity.remove(name) {
                Some(FieldValue::VarChar(s)) => Ok(s),
                Some(other) => Err(format!("field '{}' has type {}", name, other.dtype())),
                None => Err(format!("hit {} is missing field '{}'", id, name)),
            }
        };

        let user_id = text(fields::USER_ID)?;
        let kb_id = text(fields::KB_ID)?;
        let file_id = text(fields::FILE_ID)?;
        let raw_headers = text(fields::HEADERS)?;
        let doc_id = text(fields::DOC_ID)?;
        let content = text(fields::CONTENT)?;

        let headers: Headers = serde_json::from_str(&raw_headers)
            .map_err(|e| format!("hit {} has unreadable headers {:?}: {}", id, raw_headers, e))?;

        let embedding = match entity.remove(fields::EMBEDDING) {
            Some(FieldValue::FloatVector(v)) => v,
            Some(other) => return Err(format!("field 'embedding' has type {}", other.dtype())),
            None => return Err(format!("hit {} is missing field 'embedding'", id)),
        };

        Ok(Self {
            id,
            user_id,
            kb_id,
            file_id,
            headers,
            doc_id,
            content,
            embedding,
            distance,
        })
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Non-empty string metadata; `None` when absent, null or empty
fn metadata_str<'a>(document: &'a Document, key: &str) -> Result<Option<&'a str>, VectorError> {
    match document.metadata.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(VectorError::validation(format!(
            "metadata '{}' must be a string, got {}",
            key,
            json_type(other)
        ))),
    }
}

/// Serialized header map; absent or null headers become `{}`
fn serialize_headers(document: &Document) -> Result<String, VectorError> {
    match document.metadata.get(metadata_keys::HEADERS) {
        None | Some(Value::Null) => Ok("{}".to_string()),
        Some(Value::Object(map)) => serde_json::to_string(map)
            .map_err(|e| VectorError::validation(format!("headers are not serializable: {}", e))),
        Some(other) => Err(VectorError::validation(format!(
            "metadata 'headers' must be an object, got {}",
            json_type(other)
        ))),
    }
}

/// Validate a document and its embedding and flatten them into a row
pub(crate) fn build_row(
    document: &Document,
    embedding: &[f32],
    schema: &CollectionSchema,
) -> Result<Entity, VectorError> {
    let user_id = metadata_str(document, metadata_keys::USER_ID)?;
    let kb_id = metadata_str(document, metadata_keys::KB_ID)?;
    let file_id = metadata_str(document, metadata_keys::FILE_ID)?;
    let doc_id = metadata_str(document, metadata_keys::DOC_ID)?;
    let content = Some(document.page_content.as_str()).filter(|c| !c.is_empty());

    let mut missing = Vec::new();
    for (name, value) in [
        (fields::USER_ID, user_id),
        (fields::KB_ID, kb_id),
        (fields::FILE_ID, file_id),
        (fields::DOC_ID, doc_id),
        (fields::CONTENT, content),
    ] {
        if value.is_none() {
            missing.push(name);
        }
    }
    if embedding.is_empty() {
        missing.push(fields::EMBEDDING);
    }
    if !missing.is_empty() {
        return Err(VectorError::validation(format!(
            "missing required fields: {}",
            missing.join(", ")
        )));
    }

    let dim = schema.dim();
    if embedding.len() != dim {
        return Err(VectorError::validation(format!(
            "embedding has dimension {}, expected {}",
            embedding.len(),
            dim
        )));
    }
    if let Some(pos) = embedding.iter().position(|x| !x.is_finite()) {
        return Err(VectorError::validation(format!(
            "embedding value at index {} is not finite",
            pos
        )));
    }

    let headers = serialize_headers(document)?;

    let mut row = Entity::new();
    for (name, value) in [
        (fields::USER_ID, user_id.unwrap_or_default()),
        (fields::KB_ID, kb_id.unwrap_or_default()),
        (fields::FILE_ID, file_id.unwrap_or_default()),
        (fields::HEADERS, headers.as_str()),
        (fields::DOC_ID, doc_id.unwrap_or_default()),
        (fields::CONTENT, document.page_content.as_str()),
    ] {
        if let Some(max) = schema.field(name).and_then(|f| f.max_length) {
            let len = value.chars().count();
            if len > max {
                return Err(VectorError::validation(format!(
                    "{} is {} characters, limit is {}",
                    name, len, max
                )));
            }
        }
        row.insert(name.to_string(), FieldValue::VarChar(value.to_string()));
    }
    row.insert(
        fields::EMBEDDING.to_string(),
        FieldValue::FloatVector(embedding.to_vec()),
    );

    Ok(row)
}
