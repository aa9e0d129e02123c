use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while configuring or running a [`crate::SheetParser`].
///
/// Configuration errors are returned directly from
/// [`crate::SheetParserBuilder::build`]. Everything else is raised while a parse
/// is running and ends up stored on the [`crate::ParseResult`].
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid parser configuration: {0}")]
    Configuration(String),
    #[error("no header row found")]
    HeaderNotFound,
    #[error("no header row found within the first {limit} rows")]
    HeaderScanLimit { limit: u32 },
    #[error("missing required columns: {}", fields.join(", "))]
    MissingRequiredColumns { fields: Vec<String> },
    #[error("worksheet `{name}` not found in workbook")]
    WorksheetNotFound { name: String },
    #[error("workbook has no readable sheets")]
    NoSheets,
    #[error("unsupported extension `{extension}` for workbook `{path}`")]
    UnsupportedFormat { path: PathBuf, extension: String },
    #[error("failed to load workbook `{path}`: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },
    #[error("row {row}: {source}")]
    Field {
        row: u32,
        #[source]
        source: FieldError,
    },
}

impl IngestError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        IngestError::Configuration(message.into())
    }
}

/// A record refused a value for one of its fields.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("field `{field}`: {message}")]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}
