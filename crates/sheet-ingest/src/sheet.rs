use std::collections::BTreeMap;

use crate::{CellValue, DateSystem};

static EMPTY: CellValue = CellValue::Empty;

/// Sparse in-memory worksheet.
///
/// Rows are **1-indexed** (row `1` is the first worksheet row) and columns are
/// **0-indexed** (column `0` is `A`). Only non-empty cells are stored, so a
/// chunk materialized through a [`crate::ReadWindowFilter`] costs memory in
/// proportion to the cells it accepted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sheet {
    name: String,
    rows: BTreeMap<u32, BTreeMap<u32, CellValue>>,
    last_row: u32,
    date_system: DateSystem,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Build a sheet from dense rows, the first one landing on row 1.
    pub fn from_rows<R, C>(name: impl Into<String>, rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator<Item = CellValue>,
    {
        let mut sheet = Self::new(name);
        let mut row_index = 0u32;
        for row in rows {
            row_index += 1;
            for (col, value) in (0u32..).zip(row) {
                sheet.set_value(row_index, col, value);
            }
        }
        sheet.extend_to_row(row_index);
        sheet
    }

    pub fn with_date_system(mut self, date_system: DateSystem) -> Self {
        self.date_system = date_system;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn date_system(&self) -> DateSystem {
        self.date_system
    }

    /// Store a value; writing [`CellValue::Empty`] removes the cell.
    ///
    /// Row `0` does not exist and is ignored.
    pub fn set_value(&mut self, row: u32, col: u32, value: impl Into<CellValue>) {
        if row == 0 {
            return;
        }
        let value = value.into();
        if value.is_empty() {
            if let Some(cells) = self.rows.get_mut(&row) {
                cells.remove(&col);
                if cells.is_empty() {
                    self.rows.remove(&row);
                }
            }
            return;
        }
        self.rows.entry(row).or_default().insert(col, value);
        self.extend_to_row(row);
    }

    pub fn value(&self, row: u32, col: u32) -> &CellValue {
        self.rows
            .get(&row)
            .and_then(|cells| cells.get(&col))
            .unwrap_or(&EMPTY)
    }

    /// View of a single row. Rows without stored cells yield an empty view.
    pub fn row(&self, index: u32) -> Row<'_> {
        Row {
            index,
            cells: self.rows.get(&index),
        }
    }

    /// Highest row index covered by the sheet, `0` for an empty sheet.
    ///
    /// Loaders may extend this past the last stored cell when the workbook
    /// declares trailing blank rows.
    pub fn last_row(&self) -> u32 {
        self.last_row
    }

    pub fn extend_to_row(&mut self, row: u32) {
        self.last_row = self.last_row.max(row);
    }

    /// Highest column index with a stored cell, if any.
    pub fn last_column(&self) -> Option<u32> {
        self.rows
            .values()
            .filter_map(|cells| cells.keys().next_back().copied())
            .max()
    }

    /// Number of stored (non-empty) cells.
    pub fn cell_count(&self) -> usize {
        self.rows.values().map(BTreeMap::len).sum()
    }

    pub fn info(&self) -> SheetInfo {
        SheetInfo {
            name: self.name.clone(),
            total_rows: self.last_row,
            total_columns: self.last_column().map_or(0, |col| col + 1),
        }
    }
}

/// Borrowed view of one worksheet row.
#[derive(Clone, Copy, Debug)]
pub struct Row<'a> {
    index: u32,
    cells: Option<&'a BTreeMap<u32, CellValue>>,
}

impl<'a> Row<'a> {
    /// 1-based row index.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Stored cells in column order.
    pub fn cells(&self) -> impl Iterator<Item = (u32, &'a CellValue)> + 'a {
        self.cells
            .into_iter()
            .flat_map(|cells| cells.iter().map(|(col, value)| (*col, value)))
    }

    pub fn get(&self, col: u32) -> &'a CellValue {
        self.cells
            .and_then(|cells| cells.get(&col))
            .unwrap_or(&EMPTY)
    }

    /// First cell holding non-null data.
    pub fn first_populated(&self) -> Option<(u32, &'a CellValue)> {
        self.cells().find(|(_, value)| !value.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.first_populated().is_none()
    }
}

/// Sheet metadata available without materializing cells.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SheetInfo {
    pub name: String,
    pub total_rows: u32,
    pub total_columns: u32,
}

/// Case-insensitive worksheet name comparison, matching how Excel resolves
/// sheet names.
pub fn sheet_name_eq_case_insensitive(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}
