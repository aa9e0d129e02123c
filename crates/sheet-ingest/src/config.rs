use serde::{Deserialize, Serialize};

/// One `label -> field` entry of a [`ParserConfig`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldBinding {
    /// Header text, matched case-insensitively after trimming.
    pub label: String,
    /// Record field the column is written to.
    pub field: String,
}

impl FieldBinding {
    pub fn new(label: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            field: field.into(),
        }
    }
}

/// Data-only parser options, e.g. loaded from a JSON or TOML import profile.
///
/// Closures (predicate, factory, callbacks) are configured on
/// [`crate::SheetParserBuilder`]; apply this with
/// [`crate::SheetParserBuilder::config`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParserConfig {
    pub fields: Vec<FieldBinding>,
    /// Labels that must appear in the header row.
    pub required: Vec<String>,
    /// Load the sheet in windows of this many rows (file inputs only).
    pub chunk_size: Option<u32>,
    #[serde(default = "crate::serde_defaults::default_true")]
    pub retain_records: bool,
    #[serde(default = "crate::serde_defaults::default_true")]
    pub write_nulls: bool,
    pub worksheet: Option<String>,
    pub header_scan_limit: Option<u32>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            required: Vec::new(),
            chunk_size: None,
            retain_records: true,
            write_nulls: true,
            worksheet: None,
            header_scan_limit: None,
        }
    }
}
