//! The parse pipeline: locate the header, map its columns, build records.

use std::path::Path;

use crate::loader::resolve_worksheet;
use crate::{
    CalamineLoader, ChunkedRows, FieldMap, FieldMapper, HeaderColumns, HeaderLocator,
    IngestError, LogListener, ParseListener, ParsedRecord, ParserConfig, Phase, Record,
    RecordBuilder, RecordFlow, Row, RowSource, Sheet, SheetRows, WorkbookLoader,
};

type HeaderRowPredicate = Box<dyn FnMut(&Row<'_>) -> bool>;
type RecordFactory<R> = Box<dyn FnMut(Option<&R>) -> R>;
type RecordCallback<R> = Box<dyn FnMut(&R, u32) -> RecordFlow>;
type HeaderColumnsTransform = Box<dyn FnMut(HeaderColumns) -> HeaderColumns>;

/// Everything a parse produced. Failures are stored here rather than returned.
#[derive(Debug)]
pub struct ParseResult<R> {
    records: Vec<ParsedRecord<R>>,
    missing_fields: Vec<String>,
    extra_fields: Vec<String>,
    parsed_headers: Vec<String>,
    header_row_index: Option<u32>,
    data_row_index: Option<u32>,
    error: Option<IngestError>,
}

impl<R> Default for ParseResult<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            missing_fields: Vec::new(),
            extra_fields: Vec::new(),
            parsed_headers: Vec::new(),
            header_row_index: None,
            data_row_index: None,
            error: None,
        }
    }
}

impl<R> ParseResult<R> {
    /// Retained records with their 1-based source rows. Empty after an error.
    pub fn records(&self) -> &[ParsedRecord<R>] {
        &self.records
    }

    pub fn into_records(self) -> Vec<R> {
        self.records.into_iter().map(|p| p.record).collect()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Configured labels with no header cell, in configuration order.
    pub fn missing_fields(&self) -> &[String] {
        &self.missing_fields
    }

    /// Header labels with no configured field, in column order.
    pub fn extra_fields(&self) -> &[String] {
        &self.extra_fields
    }

    /// Field keys that were mapped onto a column.
    pub fn parsed_headers(&self) -> &[String] {
        &self.parsed_headers
    }

    pub fn header_row_index(&self) -> Option<u32> {
        self.header_row_index
    }

    pub fn data_row_index(&self) -> Option<u32> {
        self.data_row_index
    }

    pub fn error(&self) -> Option<&IngestError> {
        self.error.as_ref()
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// The records, or the error that stopped the parse.
    pub fn into_result(self) -> Result<Vec<ParsedRecord<R>>, IngestError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.records),
        }
    }
}

/// Configures a [`SheetParser`].
pub struct SheetParserBuilder<R> {
    fields: FieldMap,
    required: Vec<String>,
    header_row_predicate: Option<HeaderRowPredicate>,
    record_factory: Option<RecordFactory<R>>,
    chunk_size: Option<u32>,
    retain_records: bool,
    on_record: Option<RecordCallback<R>>,
    header_columns_transform: Option<HeaderColumnsTransform>,
    write_nulls: bool,
    worksheet: Option<String>,
    header_scan_limit: Option<u32>,
    listener: Option<Box<dyn ParseListener>>,
}

impl<R: Record> Default for SheetParserBuilder<R> {
    fn default() -> Self {
        Self {
            fields: FieldMap::new(),
            required: Vec::new(),
            header_row_predicate: None,
            record_factory: None,
            chunk_size: None,
            retain_records: true,
            on_record: None,
            header_columns_transform: None,
            write_nulls: true,
            worksheet: None,
            header_scan_limit: None,
            listener: None,
        }
    }
}

impl<R: Record> SheetParserBuilder<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map header `label` onto record field `field`.
    pub fn field(mut self, label: &str, field: impl Into<String>) -> Self {
        self.fields.insert(label, field);
        self
    }

    pub fn fields<L, F>(mut self, fields: impl IntoIterator<Item = (L, F)>) -> Self
    where
        L: AsRef<str>,
        F: Into<String>,
    {
        for (label, field) in fields {
            self.fields.insert(label.as_ref(), field);
        }
        self
    }

    /// Fail the parse when `label` is missing from the header row.
    pub fn required(mut self, label: impl Into<String>) -> Self {
        self.required.push(label.into());
        self
    }

    /// Decides whether a populated row is the header. Defaults to accepting
    /// the first populated row.
    pub fn header_row_predicate(mut self, f: impl FnMut(&Row<'_>) -> bool + 'static) -> Self {
        self.header_row_predicate = Some(Box::new(f));
        self
    }

    /// Creates the record for each data row. The previous record is passed in
    /// so continuation rows can extend it.
    pub fn record_factory(mut self, f: impl FnMut(Option<&R>) -> R + 'static) -> Self {
        self.record_factory = Some(Box::new(f));
        self
    }

    /// Load file inputs in windows of `rows` rows instead of all at once.
    pub fn chunk_size(mut self, rows: u32) -> Self {
        self.chunk_size = Some(rows);
        self
    }

    pub fn retain_records(mut self, retain: bool) -> Self {
        self.retain_records = retain;
        self
    }

    /// Called with every built record and its row index.
    pub fn on_record(mut self, f: impl FnMut(&R, u32) -> RecordFlow + 'static) -> Self {
        self.on_record = Some(Box::new(f));
        self
    }

    /// Rewrites the mapped columns once, after the header has been read.
    pub fn header_columns_transform(
        mut self,
        f: impl FnMut(HeaderColumns) -> HeaderColumns + 'static,
    ) -> Self {
        self.header_columns_transform = Some(Box::new(f));
        self
    }

    pub fn write_nulls(mut self, write_nulls: bool) -> Self {
        self.write_nulls = write_nulls;
        self
    }

    /// Parse this worksheet (case-insensitive) instead of the first one.
    pub fn worksheet(mut self, name: impl Into<String>) -> Self {
        self.worksheet = Some(name.into());
        self
    }

    /// Stop looking for the header after `rows` rows.
    pub fn header_scan_limit(mut self, rows: u32) -> Self {
        self.header_scan_limit = Some(rows);
        self
    }

    pub fn listener(mut self, listener: impl ParseListener + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    /// Apply the data-only options of `config` on top of this builder.
    pub fn config(mut self, config: ParserConfig) -> Self {
        for binding in config.fields {
            self.fields.insert(&binding.label, binding.field);
        }
        self.required.extend(config.required);
        if config.chunk_size.is_some() {
            self.chunk_size = config.chunk_size;
        }
        if config.worksheet.is_some() {
            self.worksheet = config.worksheet;
        }
        if config.header_scan_limit.is_some() {
            self.header_scan_limit = config.header_scan_limit;
        }
        self.retain_records = config.retain_records;
        self.write_nulls = config.write_nulls;
        self
    }

    pub fn build(self) -> Result<SheetParser<R>, IngestError> {
        if self.fields.is_empty() {
            return Err(IngestError::configuration("at least one field must be configured"));
        }
        let Some(record_factory) = self.record_factory else {
            return Err(IngestError::configuration("a record factory is required"));
        };
        if self.chunk_size == Some(0) {
            return Err(IngestError::configuration("chunk size must be at least 1"));
        }

        let mut required = Vec::with_capacity(self.required.len());
        for label in &self.required {
            let label = crate::normalize_label(label);
            if !self.fields.contains_label(&label) {
                return Err(IngestError::configuration(format!(
                    "required field `{label}` is not a configured label"
                )));
            }
            if !required.contains(&label) {
                required.push(label);
            }
        }

        Ok(SheetParser {
            fields: self.fields,
            required,
            header_row_predicate: self
                .header_row_predicate
                .unwrap_or_else(|| Box::new(|_: &Row<'_>| true)),
            record_factory,
            chunk_size: self.chunk_size,
            retain_records: self.retain_records,
            on_record: self.on_record,
            header_columns_transform: self.header_columns_transform,
            write_nulls: self.write_nulls,
            worksheet: self.worksheet,
            header_scan_limit: self.header_scan_limit,
            listener: self.listener.unwrap_or_else(|| Box::new(LogListener)),
        })
    }
}

impl<R: Record + Default + 'static> SheetParserBuilder<R> {
    /// Start every row from `R::default()`.
    pub fn default_records(self) -> Self {
        self.record_factory(|_| R::default())
    }
}

/// Maps spreadsheet rows onto records of type `R`.
pub struct SheetParser<R> {
    fields: FieldMap,
    required: Vec<String>,
    header_row_predicate: HeaderRowPredicate,
    record_factory: RecordFactory<R>,
    chunk_size: Option<u32>,
    retain_records: bool,
    on_record: Option<RecordCallback<R>>,
    header_columns_transform: Option<HeaderColumnsTransform>,
    write_nulls: bool,
    worksheet: Option<String>,
    header_scan_limit: Option<u32>,
    listener: Box<dyn ParseListener>,
}

impl<R: Record> SheetParser<R> {
    pub fn builder() -> SheetParserBuilder<R> {
        SheetParserBuilder::new()
    }

    /// Open a workbook file (format picked from the extension) and parse it.
    pub fn parse_path(&mut self, path: impl AsRef<Path>) -> ParseResult<R> {
        let mut result = ParseResult::default();
        let outcome = CalamineLoader::new(path)
            .and_then(|mut loader| self.run_loader(&mut loader, &mut result));
        self.finish(result, outcome)
    }

    /// Parse a worksheet from any loader, honouring the worksheet selector and
    /// chunk size.
    pub fn parse_loader(&mut self, loader: &mut dyn WorkbookLoader) -> ParseResult<R> {
        let mut result = ParseResult::default();
        let outcome = self.run_loader(loader, &mut result);
        self.finish(result, outcome)
    }

    /// Parse a sheet that is already in memory.
    pub fn parse_sheet(&mut self, sheet: &Sheet) -> ParseResult<R> {
        let mut result = ParseResult::default();
        let outcome = self.run(&mut SheetRows::new(sheet), &mut result);
        self.finish(result, outcome)
    }

    fn run_loader(
        &mut self,
        loader: &mut dyn WorkbookLoader,
        result: &mut ParseResult<R>,
    ) -> Result<(), IngestError> {
        match self.chunk_size {
            Some(chunk_size) => {
                let mut rows = ChunkedRows::new(loader, self.worksheet.as_deref(), chunk_size)?;
                self.run(&mut rows, result)
            }
            None => {
                let name = resolve_worksheet(loader, self.worksheet.as_deref())?;
                let sheet = loader.load_sheet(&name, None)?;
                self.run(&mut SheetRows::new(&sheet), result)
            }
        }
    }

    fn run(
        &mut self,
        rows: &mut dyn RowSource,
        result: &mut ParseResult<R>,
    ) -> Result<(), IngestError> {
        self.listener.phase_started(Phase::LocateHeader);
        let predicate = &mut self.header_row_predicate;
        let location = HeaderLocator::new(|row: &Row<'_>| predicate(row))
            .with_scan_limit(self.header_scan_limit)
            .locate(rows)?;
        result.header_row_index = Some(location.header_row);
        result.data_row_index = Some(location.data_row);
        self.listener.phase_finished(Phase::LocateHeader);

        self.listener.phase_started(Phase::MapHeader);
        let mapping = FieldMapper::new(&self.fields).read_header(rows, location.header_row)?;
        result.missing_fields = mapping.missing_fields.clone();
        result.extra_fields = mapping.extra_fields.clone();
        mapping.ensure_required(&self.required)?;
        let mut columns = mapping.columns;
        if let Some(transform) = self.header_columns_transform.as_mut() {
            columns = transform(columns);
        }
        result.parsed_headers = columns.fields().map(str::to_owned).collect();
        self.listener.phase_finished(Phase::MapHeader);

        self.listener.phase_started(Phase::BuildRecords);
        rows.set_max_column(columns.max_column());
        let factory = &mut self.record_factory;
        let on_record = &mut self.on_record;
        result.records = RecordBuilder::new(&columns)
            .write_nulls(self.write_nulls)
            .retain(self.retain_records)
            .build(
                rows,
                location.data_row,
                |previous: Option<&R>| factory(previous),
                |record: &R, row: u32| match on_record.as_mut() {
                    Some(callback) => callback(record, row),
                    None => RecordFlow::Continue,
                },
            )?;
        self.listener.phase_finished(Phase::BuildRecords);
        Ok(())
    }

    fn finish(
        &mut self,
        mut result: ParseResult<R>,
        outcome: Result<(), IngestError>,
    ) -> ParseResult<R> {
        if let Err(err) = outcome {
            self.listener.parse_failed(&err);
            result.records.clear();
            result.error = Some(err);
        }
        result
    }
}
