//! Composite storage path descriptors.
//!
//! The catalog records where a document's bytes live as a single string of `|`-delimited
//! fields rather than as a bucket/key pair:
//!
//! ```text
//! <uuid>|<document_type>[|<mime_type>[|<extension>]]
//! 1f0c2e4a-...|documento.externo|application/pdf|pdf
//! ```
//!
//! [`PathDescriptor::parse`] decodes that string. The object key is the uuid followed by the
//! dot-prefixed extension when the fourth field is present, otherwise the bare uuid.

use crate::constants::{EXTENSION_FIELD_INDEX, MIN_PATH_FIELDS, PATH_FIELD_DELIMITER};
use crate::PathError;
use std::fmt;
use std::str::FromStr;

/// Parsed form of a catalog storage path.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PathDescriptor {
    uuid: String,
    document_type: String,
    mime_type: Option<String>,
    extension: Option<String>,
}

impl PathDescriptor {
    /// Decode a raw storage path string.
    ///
    /// Fields are trimmed. Extra fields beyond the fourth are ignored, and an empty extension
    /// field is treated as no extension.
    ///
    /// # Errors
    ///
    /// - [`PathError::TooFewFields`] when fewer than two fields are present.
    /// - [`PathError::EmptyField`] when the uuid or document type field is blank.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let fields: Vec<&str> = raw.split(PATH_FIELD_DELIMITER).map(str::trim).collect();

        if fields.len() < MIN_PATH_FIELDS {
            return Err(PathError::TooFewFields {
                raw: raw.to_owned(),
                fields: fields.len(),
            });
        }

        let optional = |index: usize| {
            fields
                .get(index)
                .filter(|value| !value.is_empty())
                .map(|value| (*value).to_owned())
        };

        Self::build(
            raw,
            fields[0],
            fields[1],
            optional(2),
            fields.get(EXTENSION_FIELD_INDEX).copied(),
        )
    }

    /// Build a descriptor from already separated parts.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::EmptyField`] when `uuid` or `document_type` is blank.
    pub fn new(
        uuid: &str,
        document_type: &str,
        extension: Option<&str>,
    ) -> Result<Self, PathError> {
        let raw = format!("{uuid}{PATH_FIELD_DELIMITER}{document_type}");
        Self::build(&raw, uuid.trim(), document_type.trim(), None, extension)
    }

    fn build(
        raw: &str,
        uuid: &str,
        document_type: &str,
        mime_type: Option<String>,
        extension: Option<&str>,
    ) -> Result<Self, PathError> {
        if uuid.is_empty() {
            return Err(PathError::EmptyField {
                raw: raw.to_owned(),
                field: "uuid",
            });
        }
        if document_type.is_empty() {
            return Err(PathError::EmptyField {
                raw: raw.to_owned(),
                field: "document type",
            });
        }

        Ok(Self {
            uuid: uuid.to_owned(),
            document_type: document_type.to_owned(),
            mime_type,
            extension: extension.and_then(normalize_extension),
        })
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn document_type(&self) -> &str {
        &self.document_type
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    /// Dot-prefixed extension, when the path carried one.
    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    /// Key of the object in its bucket: `uuid` plus the extension, if any.
    pub fn object_key(&self) -> String {
        match &self.extension {
            Some(extension) => format!("{}{}", self.uuid, extension),
            None => self.uuid.clone(),
        }
    }
}

impl FromStr for PathDescriptor {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PathDescriptor {
    /// Re-encodes the descriptor in catalog form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{PATH_FIELD_DELIMITER}{}", self.uuid, self.document_type)?;
        if self.mime_type.is_some() || self.extension.is_some() {
            write!(
                f,
                "{PATH_FIELD_DELIMITER}{}",
                self.mime_type.as_deref().unwrap_or_default()
            )?;
        }
        if let Some(extension) = &self.extension {
            write!(f, "{PATH_FIELD_DELIMITER}{}", extension)?;
        }
        Ok(())
    }
}

fn normalize_extension(extension: &str) -> Option<String> {
    let extension = extension.trim();
    if extension.is_empty() || extension == "." {
        return None;
    }
    if extension.starts_with('.') {
        Some(extension.to_owned())
    } else {
        Some(format!(".{extension}"))
    }
}
