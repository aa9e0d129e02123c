//! Row streaming.
//!
//! Both sources walk every row index from `start_row` to the sheet's last row,
//! including rows with no stored cells: a blank row is meaningful to the
//! record builder (it ends the data).

use crate::{IngestError, ReadWindowFilter, Row, Sheet, SheetInfo, WorkbookLoader};

/// Visitor verdict after each row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Stop,
}

pub type RowVisitor<'v> = dyn FnMut(Row<'_>, &Sheet) -> Result<Control, IngestError> + 'v;

/// Produces the rows of one worksheet in ascending order.
pub trait RowSource {
    /// 1-based index of the first row visited.
    fn start_row(&self) -> u32;

    fn set_start_row(&mut self, row: u32);

    /// Call `visitor` for each row at or after [`RowSource::start_row`] until it
    /// returns [`Control::Stop`], fails, or rows run out.
    fn for_each_row(&mut self, visitor: &mut RowVisitor<'_>) -> Result<(), IngestError>;

    /// Hint that only columns `0..=max_column` are needed from now on. Sources
    /// that load lazily may skip the other cells.
    fn set_max_column(&mut self, max_column: Option<u32>) {
        let _ = max_column;
    }
}

/// Pass-through over a sheet that is already in memory.
#[derive(Debug, Clone, Copy)]
pub struct SheetRows<'a> {
    sheet: &'a Sheet,
    start_row: u32,
}

impl<'a> SheetRows<'a> {
    pub fn new(sheet: &'a Sheet) -> Self {
        Self {
            sheet,
            start_row: 1,
        }
    }
}

impl RowSource for SheetRows<'_> {
    fn start_row(&self) -> u32 {
        self.start_row
    }

    fn set_start_row(&mut self, row: u32) {
        self.start_row = row;
    }

    fn for_each_row(&mut self, visitor: &mut RowVisitor<'_>) -> Result<(), IngestError> {
        for index in self.start_row.max(1)..=self.sheet.last_row() {
            if visitor(self.sheet.row(index), self.sheet)? == Control::Stop {
                break;
            }
        }
        Ok(())
    }
}

/// Reloads the worksheet in windows of `chunk_size` rows.
///
/// Each window is a fresh load restricted by a [`ReadWindowFilter`]. Only one
/// window is alive at a time.
pub struct ChunkedRows<'l> {
    loader: &'l mut dyn WorkbookLoader,
    info: SheetInfo,
    chunk_size: u32,
    filter: ReadWindowFilter,
    start_row: u32,
}

impl<'l> ChunkedRows<'l> {
    /// Reads the sheet's metadata once; `start_row` can be changed freely
    /// afterwards without touching the workbook again.
    pub fn new(
        loader: &'l mut dyn WorkbookLoader,
        worksheet: Option<&str>,
        chunk_size: u32,
    ) -> Result<Self, IngestError> {
        if chunk_size == 0 {
            return Err(IngestError::configuration("chunk size must be at least 1"));
        }
        let name = crate::loader::resolve_worksheet(loader, worksheet)?;
        let info = loader.sheet_info(&name)?;
        let mut filter = ReadWindowFilter::new();
        filter.set_worksheet(info.name.clone());
        Ok(Self {
            loader,
            info,
            chunk_size,
            filter,
            start_row: 1,
        })
    }

    pub fn info(&self) -> &SheetInfo {
        &self.info
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }
}

impl RowSource for ChunkedRows<'_> {
    fn start_row(&self) -> u32 {
        self.start_row
    }

    fn set_start_row(&mut self, row: u32) {
        self.start_row = row;
    }

    fn set_max_column(&mut self, max_column: Option<u32>) {
        self.filter.set_max_column(max_column);
    }

    fn for_each_row(&mut self, visitor: &mut RowVisitor<'_>) -> Result<(), IngestError> {
        let total_rows = self.info.total_rows;
        let mut current = self.start_row.max(1);

        while current <= total_rows {
            self.filter.set_rows(current, self.chunk_size);
            let chunk = self.loader.load_sheet(&self.info.name, Some(&self.filter))?;
            log::trace!(
                "loaded rows {current}..{} of `{}` ({} cells)",
                self.filter.end_row(),
                self.info.name,
                chunk.cell_count()
            );

            let last = current
                .saturating_add(self.chunk_size - 1)
                .min(total_rows);
            let mut stopped = false;
            for index in current..=last {
                if visitor(chunk.row(index), &chunk)? == Control::Stop {
                    stopped = true;
                    break;
                }
            }
            drop(chunk);

            if stopped {
                break;
            }
            match current.checked_add(self.chunk_size) {
                Some(next) => current = next,
                None => break,
            }
        }
        Ok(())
    }
}
