//! Workbook loading.
//!
//! The parser never decodes spreadsheet containers itself. It asks a
//! [`WorkbookLoader`] for sheet metadata and for (possibly windowed) sheet
//! loads. [`CalamineLoader`] is the file-backed implementation; it reopens the
//! file on every load so a chunk is fully released once the caller drops it.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use calamine::{
    open_workbook, open_workbook_auto, Cell, Data, DataRef, ExcelDateTime, Reader, Xlsb, Xlsx,
};
use chrono::{NaiveDate, NaiveDateTime};

use crate::sheet::sheet_name_eq_case_insensitive;
use crate::{CellValue, DateSystem, IngestError, ReadWindowFilter, Sheet, SheetInfo};

/// Source of worksheets for a parse.
pub trait WorkbookLoader {
    /// Worksheet names in workbook order.
    fn sheet_names(&mut self) -> Result<Vec<String>, IngestError>;

    /// Row/column extent of one worksheet, without keeping its cells.
    fn sheet_info(&mut self, name: &str) -> Result<SheetInfo, IngestError>;

    /// Materialize a worksheet. With a filter, only accepted cells are kept.
    fn load_sheet(
        &mut self,
        name: &str,
        filter: Option<&ReadWindowFilter>,
    ) -> Result<Sheet, IngestError>;
}

/// Pick the worksheet to parse: the requested one (matched
/// case-insensitively) or the first sheet of the workbook.
pub fn resolve_worksheet(
    loader: &mut dyn WorkbookLoader,
    requested: Option<&str>,
) -> Result<String, IngestError> {
    let names = loader.sheet_names()?;
    match requested {
        _ if names.is_empty() => Err(IngestError::NoSheets),
        None => names.into_iter().next().ok_or(IngestError::NoSheets),
        Some(requested) => names
            .into_iter()
            .find(|name| sheet_name_eq_case_insensitive(name, requested))
            .ok_or_else(|| IngestError::WorksheetNotFound {
                name: requested.to_owned(),
            }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkbookFormat {
    /// `.xlsx` / `.xlsm` / `.xlam`; windows are streamed cell by cell.
    Xlsx,
    Xls,
    /// Streamed cell by cell, like `Xlsx`.
    Xlsb,
    Ods,
}

impl WorkbookFormat {
    /// Detect the container format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self, IngestError> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match ext.as_str() {
            "xlsx" | "xlsm" | "xlam" => Ok(WorkbookFormat::Xlsx),
            "xls" | "xla" => Ok(WorkbookFormat::Xls),
            "xlsb" => Ok(WorkbookFormat::Xlsb),
            "ods" => Ok(WorkbookFormat::Ods),
            other => Err(IngestError::UnsupportedFormat {
                path: path.to_path_buf(),
                extension: other.to_string(),
            }),
        }
    }
}

/// [`WorkbookLoader`] backed by `calamine`.
#[derive(Debug, Clone)]
pub struct CalamineLoader {
    path: PathBuf,
    format: WorkbookFormat,
}

impl CalamineLoader {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, IngestError> {
        let path = path.as_ref();
        let format = WorkbookFormat::from_path(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            format,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> WorkbookFormat {
        self.format
    }

    fn load_error(&self, source: calamine::Error) -> IngestError {
        IngestError::Load {
            path: self.path.clone(),
            source,
        }
    }

    fn open_xlsx(&self) -> Result<Xlsx<BufReader<File>>, IngestError> {
        open_workbook(&self.path).map_err(|err: calamine::XlsxError| self.load_error(err.into()))
    }

    fn open_xlsb(&self) -> Result<Xlsb<BufReader<File>>, IngestError> {
        open_workbook(&self.path).map_err(|err: calamine::XlsbError| self.load_error(err.into()))
    }

    /// Feed every cell of a streaming worksheet reader to `visit` until it
    /// returns `false`. Only `.xlsx` and `.xlsb` have such readers.
    fn stream_cells(
        &self,
        name: &str,
        mut visit: impl FnMut((u32, u32), &DataRef<'_>) -> bool,
    ) -> Result<(), IngestError> {
        let streamed = match self.format {
            WorkbookFormat::Xlsx => {
                let mut workbook = self.open_xlsx()?;
                let mut cells = workbook
                    .worksheet_cells_reader(name)
                    .map_err(|err| self.load_error(err.into()))?;
                drain_cells(|| cells.next_cell().map_err(Into::into), &mut visit)
            }
            _ => {
                let mut workbook = self.open_xlsb()?;
                let mut cells = workbook
                    .worksheet_cells_reader(name)
                    .map_err(|err| self.load_error(err.into()))?;
                drain_cells(|| cells.next_cell().map_err(Into::into), &mut visit)
            }
        };
        streamed.map_err(|err| self.load_error(err))
    }

    fn load_streamed(
        &self,
        name: &str,
        filter: Option<&ReadWindowFilter>,
    ) -> Result<Sheet, IngestError> {
        let mut sheet = Sheet::new(name);
        self.stream_cells(name, |(row, col), value| {
            if let Some(filter) = filter {
                // Worksheet parts store rows in ascending order.
                if filter.is_past_window(row) {
                    return false;
                }
                if !filter.read_cell(row, col, name) {
                    return true;
                }
            }
            sheet.set_value(row, col, convert_data_ref(value));
            true
        })?;
        Ok(sheet)
    }

    fn load_range(
        &self,
        name: &str,
        filter: Option<&ReadWindowFilter>,
    ) -> Result<Sheet, IngestError> {
        let mut workbook = open_workbook_auto(&self.path).map_err(|err| self.load_error(err))?;
        let range = workbook
            .worksheet_range(name)
            .map_err(|err| self.load_error(err))?;

        let mut sheet = Sheet::new(name);
        // NOTE: calamine `Range` iterators return coordinates relative to `range.start()`.
        let (start_row, start_col) = range.start().unwrap_or((0, 0));
        for (row, col, value) in range.used_cells() {
            let Some((row, col)) = to_absolute((start_row, start_col), row, col) else {
                log::warn!("skipping out-of-bounds cell in sheet `{name}` at ({row},{col})");
                continue;
            };
            if let Some(filter) = filter {
                if !filter.read_cell(row, col, name) {
                    continue;
                }
            }
            sheet.set_value(row, col, convert_data(value));
        }
        if filter.is_none() {
            if let Some((end_row, _)) = range.end() {
                sheet.extend_to_row(end_row.saturating_add(1));
            }
        }
        Ok(sheet)
    }
}

impl WorkbookLoader for CalamineLoader {
    fn sheet_names(&mut self) -> Result<Vec<String>, IngestError> {
        match self.format {
            WorkbookFormat::Xlsx => Ok(self.open_xlsx()?.sheet_names()),
            WorkbookFormat::Xlsb => Ok(self.open_xlsb()?.sheet_names()),
            _ => {
                let workbook =
                    open_workbook_auto(&self.path).map_err(|err| self.load_error(err))?;
                Ok(workbook.sheet_names())
            }
        }
    }

    fn sheet_info(&mut self, name: &str) -> Result<SheetInfo, IngestError> {
        match self.format {
            WorkbookFormat::Xlsx | WorkbookFormat::Xlsb => {
                // Walk cell positions only; no values are retained.
                let mut total_rows = 0u32;
                let mut total_columns = 0u32;
                self.stream_cells(name, |(row, col), _value| {
                    total_rows = total_rows.max(row);
                    total_columns = total_columns.max(col.saturating_add(1));
                    true
                })?;
                Ok(SheetInfo {
                    name: name.to_owned(),
                    total_rows,
                    total_columns,
                })
            }
            _ => {
                let mut workbook =
                    open_workbook_auto(&self.path).map_err(|err| self.load_error(err))?;
                let range = workbook
                    .worksheet_range(name)
                    .map_err(|err| self.load_error(err))?;
                let (total_rows, total_columns) = range
                    .end()
                    .map_or((0, 0), |(row, col)| (row.saturating_add(1), col.saturating_add(1)));
                Ok(SheetInfo {
                    name: name.to_owned(),
                    total_rows,
                    total_columns,
                })
            }
        }
    }

    fn load_sheet(
        &mut self,
        name: &str,
        filter: Option<&ReadWindowFilter>,
    ) -> Result<Sheet, IngestError> {
        log::trace!(
            "loading sheet `{name}` from `{}` (rows {:?})",
            self.path.display(),
            filter.map(|f| (f.start_row(), f.end_row()))
        );
        match self.format {
            WorkbookFormat::Xlsx | WorkbookFormat::Xlsb => self.load_streamed(name, filter),
            WorkbookFormat::Xls | WorkbookFormat::Ods => self.load_range(name, filter),
        }
    }
}

/// [`WorkbookLoader`] over sheets that are already in memory.
///
/// Windowed loads copy only the accepted cells, so it behaves like a
/// file-backed loader while staying cheap to construct in tests and in
/// callers that decode workbooks through some other route.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWorkbook {
    sheets: Vec<Sheet>,
    loads: usize,
}

impl InMemoryWorkbook {
    pub fn new(sheets: Vec<Sheet>) -> Self {
        Self { sheets, loads: 0 }
    }

    /// Number of `load_sheet` calls served so far.
    pub fn load_count(&self) -> usize {
        self.loads
    }

    fn find(&self, name: &str) -> Result<&Sheet, IngestError> {
        self.sheets
            .iter()
            .find(|sheet| sheet_name_eq_case_insensitive(sheet.name(), name))
            .ok_or_else(|| IngestError::WorksheetNotFound {
                name: name.to_owned(),
            })
    }
}

impl WorkbookLoader for InMemoryWorkbook {
    fn sheet_names(&mut self) -> Result<Vec<String>, IngestError> {
        Ok(self
            .sheets
            .iter()
            .map(|sheet| sheet.name().to_owned())
            .collect())
    }

    fn sheet_info(&mut self, name: &str) -> Result<SheetInfo, IngestError> {
        Ok(self.find(name)?.info())
    }

    fn load_sheet(
        &mut self,
        name: &str,
        filter: Option<&ReadWindowFilter>,
    ) -> Result<Sheet, IngestError> {
        self.loads += 1;
        let source = self.find(name)?;
        let Some(filter) = filter else {
            return Ok(source.clone());
        };

        let mut sheet = Sheet::new(source.name()).with_date_system(source.date_system());
        for row_index in 1..=source.last_row() {
            if filter.is_past_window(row_index) {
                break;
            }
            for (col, value) in source.row(row_index).cells() {
                if filter.read_cell(row_index, col, source.name()) {
                    sheet.set_value(row_index, col, value.clone());
                }
            }
        }
        Ok(sheet)
    }
}

/// Pull cells from a calamine cell reader, passing 1-based rows to `visit`.
fn drain_cells<'a>(
    mut next_cell: impl FnMut() -> Result<Option<Cell<DataRef<'a>>>, calamine::Error>,
    visit: &mut impl FnMut((u32, u32), &DataRef<'_>) -> bool,
) -> Result<(), calamine::Error> {
    while let Some(cell) = next_cell()? {
        let (row, col) = cell.get_position();
        if !visit((row.saturating_add(1), col), cell.get_value()) {
            break;
        }
    }
    Ok(())
}

fn to_absolute(start: (u32, u32), row: usize, col: usize) -> Option<(u32, u32)> {
    let row: u32 = row.try_into().ok()?;
    let col: u32 = col.try_into().ok()?;
    let row = start.0.checked_add(row)?.checked_add(1)?;
    let col = start.1.checked_add(col)?;
    Some((row, col))
}

fn convert_data(value: &Data) -> CellValue {
    match value {
        Data::Empty => CellValue::Empty,
        Data::Bool(v) => CellValue::Boolean(*v),
        Data::Int(v) => CellValue::Number(*v as f64),
        Data::Float(v) => CellValue::Number(*v),
        Data::String(v) => CellValue::String(v.clone()),
        Data::Error(e) => CellValue::Error(cell_error_text(e).to_owned()),
        Data::DateTime(v) => convert_excel_datetime(v),
        Data::DateTimeIso(v) => convert_iso_datetime(v),
        Data::DurationIso(v) => CellValue::String(v.clone()),
    }
}

fn convert_data_ref(value: &DataRef<'_>) -> CellValue {
    match value {
        DataRef::Empty => CellValue::Empty,
        DataRef::Bool(v) => CellValue::Boolean(*v),
        DataRef::Int(v) => CellValue::Number(*v as f64),
        DataRef::Float(v) => CellValue::Number(*v),
        DataRef::String(v) => CellValue::String(v.clone()),
        DataRef::SharedString(v) => CellValue::String((*v).to_owned()),
        DataRef::Error(e) => CellValue::Error(cell_error_text(e).to_owned()),
        DataRef::DateTime(v) => convert_excel_datetime(v),
        DataRef::DateTimeIso(v) => convert_iso_datetime(v),
        DataRef::DurationIso(v) => CellValue::String(v.clone()),
    }
}

/// Date cells are normalized onto the 1900 date system so [`Sheet`]s built by
/// this loader never need to track the workbook's own system.
fn convert_excel_datetime(value: &ExcelDateTime) -> CellValue {
    if value.is_duration() {
        return CellValue::Number(value.as_f64());
    }
    match value.as_datetime() {
        Some(datetime) => CellValue::DateTime(DateSystem::Excel1900.datetime_to_serial(datetime)),
        None => CellValue::Number(value.as_f64()),
    }
}

fn convert_iso_datetime(value: &str) -> CellValue {
    let parsed = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        });
    match parsed {
        Some(datetime) => CellValue::DateTime(DateSystem::Excel1900.datetime_to_serial(datetime)),
        None => CellValue::String(value.to_owned()),
    }
}

fn cell_error_text(err: &calamine::CellErrorType) -> &'static str {
    use calamine::CellErrorType;

    match err {
        CellErrorType::Div0 => "#DIV/0!",
        CellErrorType::NA => "#N/A",
        CellErrorType::Name => "#NAME?",
        CellErrorType::Null => "#NULL!",
        CellErrorType::Num => "#NUM!",
        CellErrorType::Ref => "#REF!",
        CellErrorType::Value => "#VALUE!",
        CellErrorType::GettingData => "#GETTING_DATA",
    }
}
