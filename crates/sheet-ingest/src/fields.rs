use std::collections::HashSet;

use crate::{Control, IngestError, RowSource};

/// Normalized form used for every header comparison.
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Header label -> logical field key.
///
/// Labels are stored normalized (trimmed, lower-cased) and keep their
/// insertion order, which is the order missing fields are reported in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    entries: Vec<(String, String)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `label` onto `field`. Re-inserting a label replaces its field.
    pub fn insert(&mut self, label: &str, field: impl Into<String>) {
        let label = normalize_label(label);
        let field = field.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == label) {
            Some(entry) => entry.1 = field,
            None => self.entries.push((label, field)),
        }
    }

    /// Field for a header label, compared case-insensitively.
    pub fn get(&self, label: &str) -> Option<&str> {
        let label = normalize_label(label);
        self.entries
            .iter()
            .find(|(existing, _)| *existing == label)
            .map(|(_, field)| field.as_str())
    }

    pub fn contains_label(&self, label: &str) -> bool {
        self.get(label).is_some()
    }

    /// Normalized labels in configuration order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(label, _)| label.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(label, field)| (label.as_str(), field.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<L: AsRef<str>, F: Into<String>> FromIterator<(L, F)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (L, F)>>(iter: I) -> Self {
        let mut map = FieldMap::new();
        for (label, field) in iter {
            map.insert(label.as_ref(), field);
        }
        map
    }
}

/// Logical field key -> zero-based column index, in header column order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderColumns {
    columns: Vec<(String, u32)>,
}

impl HeaderColumns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point `field` at `col`, replacing any previous column for it.
    pub fn insert(&mut self, field: impl Into<String>, col: u32) {
        let field = field.into();
        match self.columns.iter_mut().find(|(existing, _)| *existing == field) {
            Some(entry) => entry.1 = col,
            None => self.columns.push((field, col)),
        }
    }

    pub fn remove(&mut self, field: &str) -> Option<u32> {
        let idx = self.columns.iter().position(|(existing, _)| existing == field)?;
        Some(self.columns.remove(idx).1)
    }

    pub fn get(&self, field: &str) -> Option<u32> {
        self.columns
            .iter()
            .find(|(existing, _)| existing == field)
            .map(|(_, col)| *col)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.columns.iter().map(|(field, col)| (field.as_str(), *col))
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(field, _)| field.as_str())
    }

    pub fn max_column(&self) -> Option<u32> {
        self.columns.iter().map(|(_, col)| *col).max()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<F: Into<String>> FromIterator<(F, u32)> for HeaderColumns {
    fn from_iter<I: IntoIterator<Item = (F, u32)>>(iter: I) -> Self {
        let mut columns = HeaderColumns::new();
        for (field, col) in iter {
            columns.insert(field, col);
        }
        columns
    }
}

/// Outcome of reading the header row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMapping {
    pub columns: HeaderColumns,
    /// Configured labels with no matching header cell, in configuration order.
    pub missing_fields: Vec<String>,
    /// Header labels with no configured field, in column order.
    pub extra_fields: Vec<String>,
}

impl HeaderMapping {
    /// Fails when any of `required` (normalized labels) is missing.
    pub fn ensure_required(&self, required: &[String]) -> Result<(), IngestError> {
        let missing: Vec<String> = self
            .missing_fields
            .iter()
            .filter(|label| required.contains(label))
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(IngestError::MissingRequiredColumns { fields: missing })
        }
    }
}

/// Matches the labels of one header row against a [`FieldMap`].
#[derive(Debug, Clone, Copy)]
pub struct FieldMapper<'a> {
    fields: &'a FieldMap,
}

impl<'a> FieldMapper<'a> {
    pub fn new(fields: &'a FieldMap) -> Self {
        Self { fields }
    }

    /// Read exactly row `header_row` and partition its labels.
    pub fn read_header(
        &self,
        rows: &mut dyn RowSource,
        header_row: u32,
    ) -> Result<HeaderMapping, IngestError> {
        let mut mapping = HeaderMapping::default();
        let mut found: HashSet<String> = HashSet::new();

        rows.set_start_row(header_row);
        rows.for_each_row(&mut |row, _sheet| {
            for (col, cell) in row.cells() {
                if cell.is_empty() {
                    continue;
                }
                // Blank-looking labels still count as extra columns, as "".
                let label = normalize_label(&cell.to_text());
                match self.fields.get(&label) {
                    Some(field) => {
                        mapping.columns.insert(field, col);
                        found.insert(label);
                    }
                    None => mapping.extra_fields.push(label),
                }
            }
            Ok(Control::Stop)
        })?;

        mapping.missing_fields = self
            .fields
            .labels()
            .filter(|label| !found.contains(*label))
            .map(str::to_owned)
            .collect();
        log::debug!(
            "mapped {} header columns ({} missing, {} extra)",
            mapping.columns.len(),
            mapping.missing_fields.len(),
            mapping.extra_fields.len()
        );
        Ok(mapping)
    }
}
