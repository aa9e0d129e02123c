//! `sheet-ingest` maps spreadsheet rows onto structured records.
//!
//! A parse runs in three phases over a [`RowSource`]:
//! - locate the header row, tolerating titles and blank rows above it
//!   ([`HeaderLocator`]);
//! - match header labels against configured fields ([`FieldMapper`]);
//! - build one record per data row ([`RecordBuilder`]).
//!
//! Rows come either from a sheet already in memory ([`SheetRows`]) or from
//! bounded reloads of a workbook file ([`ChunkedRows`]), so arbitrarily large
//! sheets can be imported with roughly one chunk resident at a time.
//! [`SheetParser`] wires the phases together.

mod config;
mod date_system;
mod error;
mod fields;
mod header;
mod listener;
mod loader;
mod parser;
mod read_filter;
mod record;
mod row_source;
mod serde_defaults;
mod sheet;
mod value;

pub use config::{FieldBinding, ParserConfig};
pub use date_system::DateSystem;
pub use error::{FieldError, IngestError};
pub use fields::{normalize_label, FieldMap, FieldMapper, HeaderColumns, HeaderMapping};
pub use header::{HeaderLocation, HeaderLocator};
pub use listener::{LogListener, ParseListener, Phase};
pub use loader::{
    resolve_worksheet, CalamineLoader, InMemoryWorkbook, WorkbookFormat, WorkbookLoader,
};
pub use parser::{ParseResult, SheetParser, SheetParserBuilder};
pub use read_filter::ReadWindowFilter;
pub use record::{MapRecord, ParsedRecord, Record, RecordBuilder, RecordFlow};
pub use row_source::{ChunkedRows, Control, RowSource, RowVisitor, SheetRows};
pub use sheet::{sheet_name_eq_case_insensitive, Row, Sheet, SheetInfo};
pub use value::{CellValue, Value};
