//! Collection schema definitions
//!
//! Every tenant collection shares one fixed, versioned field layout. The
//! version is stored with the collection so that an attach against a
//! collection created by an older layout is detected instead of assumed.

use serde::{Deserialize, Serialize};

/// Version of the document field layout produced by [`CollectionSchema::documents`]
pub const SCHEMA_VERSION: u32 = 1;

/// Embedding dimension of the document layout
pub const EMBEDDING_DIM: usize = 768;

/// Field names of the document layout, in schema order
pub mod fields {
    pub const ID: &str = "id";
    pub const USER_ID: &str = "user_id";
    pub const KB_ID: &str = "kb_id";
    pub const FILE_ID: &str = "file_id";
    /// JSON-serialized header map
    pub const HEADERS: &str = "headers";
    pub const DOC_ID: &str = "doc_id";
    pub const CONTENT: &str = "content";
    pub const EMBEDDING: &str = "embedding";
}

/// Storage type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Int64,
    VarChar,
    FloatVector,
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Int64 => write!(f, "Int64"),
            DataType::VarChar => write!(f, "VarChar"),
            DataType::FloatVector => write!(f, "FloatVector"),
        }
    }
}

/// A single field of a collection schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub dtype: DataType,
    pub is_primary: bool,
    /// Primary key values are assigned by the store
    pub auto_id: bool,
    /// Maximum length in characters (VarChar only)
    pub max_length: Option<usize>,
    /// Vector dimension (FloatVector only)
    pub dim: Option<usize>,
}

impl FieldSchema {
    /// Auto-assigned Int64 primary key
    pub fn auto_primary(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dtype: DataType::Int64,
            is_primary: true,
            auto_id: true,
            max_length: None,
            dim: None,
        }
    }

    pub fn varchar(name: impl Into<String>, max_length: usize) -> Self {
        Self {
            name: name.into(),
            dtype: DataType::VarChar,
            is_primary: false,
            auto_id: false,
            max_length: Some(max_length),
            dim: None,
        }
    }

    pub fn float_vector(name: impl Into<String>, dim: usize) -> Self {
        Self {
            name: name.into(),
            dtype: DataType::FloatVector,
            is_primary: false,
            auto_id: false,
            max_length: None,
            dim: Some(dim),
        }
    }

    pub fn is_vector(&self) -> bool {
        self.dtype == DataType::FloatVector
    }
}

/// Ordered field layout of a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub version: u32,
    pub fields: Vec<FieldSchema>,
    pub description: String,
}

impl CollectionSchema {
    /// The document layout used for every tenant collection
    pub fn documents() -> Self {
        Self {
            version: SCHEMA_VERSION,
            fields: vec![
                FieldSchema::auto_primary(fields::ID),
                FieldSchema::varchar(fields::USER_ID, 64),
                FieldSchema::varchar(fields::KB_ID, 64),
                FieldSchema::varchar(fields::FILE_ID, 64),
                FieldSchema::varchar(fields::HEADERS, 256),
                FieldSchema::varchar(fields::DOC_ID, 64),
                FieldSchema::varchar(fields::CONTENT, 4000),
                FieldSchema::float_vector(fields::EMBEDDING, EMBEDDING_DIM),
            ],
            description: "tenant document chunks".to_string(),
        }
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn primary_field(&self) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.is_primary)
    }

    pub fn vector_field(&self) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.is_vector())
    }

    /// Dimension of the vector field, 0 if the schema has none
    pub fn dim(&self) -> usize {
        self.vector_field().and_then(|f| f.dim).unwrap_or(0)
    }

    /// Fields a caller must supply on insert (everything but an auto primary key)
    pub fn input_fields(&self) -> impl Iterator<Item = &FieldSchema> {
        self.fields.iter().filter(|f| !f.auto_id)
    }

    /// All field names in schema order
    pub fn output_fields(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Check structural rules: unique names, exactly one primary key and
    /// one vector field, lengths and dimensions present where required.
    pub fn validate(&self) -> Result<(), String> {
        if self.fields.is_empty() {
            return Err("schema has no fields".to_string());
        }

        for (i, field) in self.fields.iter().enumerate() {
            if field.name.is_empty() {
                return Err(format!("field #{} has an empty name", i));
            }
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(format!("duplicate field name '{}'", field.name));
            }
            match field.dtype {
                DataType::VarChar if field.max_length.unwrap_or(0) == 0 => {
                    return Err(format!("varchar field '{}' needs a max_length", field.name));
                }
                DataType::FloatVector if field.dim.unwrap_or(0) == 0 => {
                    return Err(format!("vector field '{}' needs a dimension", field.name));
                }
                _ => {}
            }
            if field.auto_id && !field.is_primary {
                return Err(format!("auto_id set on non-primary field '{}'", field.name));
            }
        }

        let primaries: Vec<_> = self.fields.iter().filter(|f| f.is_primary).collect();
        match primaries.as_slice() {
            [pk] if pk.dtype == DataType::Int64 => {}
            [pk] => return Err(format!("primary key '{}' must be Int64", pk.name)),
            _ => return Err(format!("expected one primary key, found {}", primaries.len())),
        }

        let vectors = self.fields.iter().filter(|f| f.is_vector()).count();
        if vectors != 1 {
            return Err(format!("expected one vector field, found {}", vectors));
        }

        Ok(())
    }
}
