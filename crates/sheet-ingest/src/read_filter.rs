use crate::sheet::sheet_name_eq_case_insensitive;

/// Decides which cells a [`crate::WorkbookLoader`] materializes for one chunk.
///
/// Row 1 is always accepted so sheet-level metadata stays readable in every
/// chunk; beyond that only rows inside `[start_row, end_row)` pass. A
/// `start_row` of `0` disables the row window entirely.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadWindowFilter {
    worksheet: Option<String>,
    start_row: u32,
    end_row: u32,
    max_column: Option<u32>,
}

impl ReadWindowFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the filter to one worksheet (matched case-insensitively).
    pub fn set_worksheet(&mut self, name: impl Into<String>) {
        self.worksheet = Some(name.into());
    }

    /// Accept rows `start_row .. start_row + chunk_size`.
    pub fn set_rows(&mut self, start_row: u32, chunk_size: u32) {
        self.start_row = start_row;
        self.end_row = start_row.saturating_add(chunk_size);
    }

    /// Accept only columns `0..=max_column`; `None` accepts every column.
    pub fn set_max_column(&mut self, max_column: Option<u32>) {
        self.max_column = max_column;
    }

    pub fn start_row(&self) -> u32 {
        self.start_row
    }

    /// Exclusive end of the row window.
    pub fn end_row(&self) -> u32 {
        self.end_row
    }

    /// `row` is 1-based, `col` 0-based.
    pub fn read_cell(&self, row: u32, col: u32, worksheet: &str) -> bool {
        if let Some(name) = &self.worksheet {
            if !sheet_name_eq_case_insensitive(name, worksheet) {
                return false;
            }
        }
        if let Some(max_column) = self.max_column {
            if col > max_column {
                return false;
            }
        }
        self.start_row == 0 || row == 1 || (row >= self.start_row && row < self.end_row)
    }

    /// True once `row` lies past the window, letting streaming loaders stop
    /// early on row-ordered input.
    pub fn is_past_window(&self, row: u32) -> bool {
        self.start_row != 0 && row >= self.end_row
    }
}
