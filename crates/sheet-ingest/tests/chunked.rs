use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;
use rust_xlsxwriter::{Format, Workbook};
use sheet_ingest::{
    CellValue, IngestError, InMemoryWorkbook, MapRecord, ParseResult, Row, Sheet, SheetParser,
    SheetParserBuilder, Value,
};

const COLUMNS: u32 = 10;
const TOTAL_ROWS: u32 = 250;

/// Four lead rows, a header on row 5, data on rows 6..=250.
fn wide_sheet() -> Sheet {
    let mut sheet = Sheet::new("Data");
    sheet.set_value(1, 0, "Warehouse export");
    sheet.set_value(3, 2, "generated nightly");
    for col in 0..COLUMNS {
        sheet.set_value(5, col, format!("Col {col}"));
    }
    for row in 6..=TOTAL_ROWS {
        sheet.set_value(row, 0, format!("item {row}"));
        for col in 1..COLUMNS {
            sheet.set_value(row, col, f64::from(row * 100 + col));
        }
    }
    sheet
}

fn wide_parser() -> SheetParserBuilder<MapRecord> {
    SheetParser::<MapRecord>::builder()
        .fields((0..COLUMNS).map(|col| (format!("Col {col}"), format!("c{col}"))))
        .header_row_predicate(|row: &Row<'_>| row.get(0).to_text() == "Col 0")
        .default_records()
}

/// Writes `sheet` to an `.xlsx` file. Date cells get a date number format so
/// they are read back as dates.
fn write_xlsx(dir: &Path, file_name: &str, sheets: &[&Sheet]) -> PathBuf {
    let date_format = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");
    let mut workbook = Workbook::new();
    for sheet in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet.name()).expect("sheet name");
        for row_index in 1..=sheet.last_row() {
            let row = row_index - 1;
            for (col, value) in sheet.row(row_index).cells() {
                let col = u16::try_from(col).expect("column fits");
                let written = match value {
                    CellValue::String(s) => worksheet.write_string(row, col, s.as_str()),
                    CellValue::Number(n) => worksheet.write_number(row, col, *n),
                    CellValue::Boolean(b) => worksheet.write_boolean(row, col, *b),
                    CellValue::DateTime(serial) => {
                        worksheet.write_number_with_format(row, col, *serial, &date_format)
                    }
                    CellValue::Empty | CellValue::Error(_) => continue,
                };
                written.expect("write cell");
            }
        }
    }
    let path = dir.join(file_name);
    workbook.save(&path).expect("save workbook");
    path
}

fn summary(result: &ParseResult<MapRecord>) -> (usize, Vec<String>, Vec<String>, Option<String>) {
    (
        result.record_count(),
        result.missing_fields().to_vec(),
        result.extra_fields().to_vec(),
        result.error_message(),
    )
}

#[test]
fn chunked_and_in_memory_parses_agree() {
    let sheet = wide_sheet();

    let mut in_memory = wide_parser().build().expect("valid parser");
    let expected = in_memory.parse_sheet(&sheet);
    assert_eq!(expected.record_count(), 245);
    assert_eq!(expected.header_row_index(), Some(5));
    assert_eq!(expected.data_row_index(), Some(6));

    let mut workbook = InMemoryWorkbook::new(vec![sheet.clone()]);
    let mut chunked = wide_parser().chunk_size(50).build().expect("valid parser");
    let actual = chunked.parse_loader(&mut workbook);

    assert_eq!(summary(&actual), summary(&expected));
    assert_eq!(actual.records(), expected.records());
    assert_eq!(actual.header_row_index(), Some(5));
    // Header and data fit the first window; the build phase reloads all five.
    assert_eq!(workbook.load_count(), 7);
}

#[test]
fn chunked_xlsx_matches_in_memory_sheet() {
    let dir = tempfile::tempdir().expect("temp dir");
    let sheet = wide_sheet();
    let path = write_xlsx(dir.path(), "wide.xlsx", &[&sheet]);

    let mut in_memory = wide_parser().build().expect("valid parser");
    let expected = in_memory.parse_sheet(&sheet);

    let mut whole_file = wide_parser().build().expect("valid parser");
    let loaded = whole_file.parse_path(&path);
    assert!(loaded.error().is_none(), "{:?}", loaded.error());

    let mut chunked = wide_parser().chunk_size(50).build().expect("valid parser");
    let streamed = chunked.parse_path(&path);
    assert!(streamed.error().is_none(), "{:?}", streamed.error());

    assert_eq!(summary(&loaded), summary(&expected));
    assert_eq!(summary(&streamed), summary(&expected));
    assert_eq!(loaded.records(), expected.records());
    assert_eq!(streamed.records(), expected.records());

    let last = &streamed.records()[244];
    assert_eq!(last.row, 250);
    assert_eq!(last.record.get("c0"), Some(&Value::from("item 250")));
    assert_eq!(last.record.get("c9"), Some(&Value::Number(25009.0)));
}

#[test]
fn xlsx_dates_become_datetimes() {
    let dir = tempfile::tempdir().expect("temp dir");
    let sheet = Sheet::from_rows(
        "Shipments",
        vec![
            vec![CellValue::from("Ref"), CellValue::from("Shipped")],
            vec![CellValue::from("A-1"), CellValue::DateTime(45292.5)],
        ],
    );
    let path = write_xlsx(dir.path(), "dates.xlsx", &[&sheet]);

    let mut parser = SheetParser::<MapRecord>::builder()
        .field("Ref", "reference")
        .field("Shipped", "shipped_at")
        .default_records()
        .build()
        .expect("valid parser");
    let records = parser.parse_path(&path).into_records();

    let shipped = records[0]
        .get("shipped_at")
        .and_then(Value::as_datetime)
        .expect("datetime value");
    assert_eq!(shipped.to_string(), "2024-01-01 12:00:00");
}

#[test]
fn worksheet_is_picked_by_name() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut notes = Sheet::new("Notes");
    notes.set_value(1, 0, "see the data tab");
    let data = wide_sheet();
    let path = write_xlsx(dir.path(), "two-tabs.xlsx", &[&notes, &data]);

    let mut parser = wide_parser()
        .worksheet("data")
        .chunk_size(40)
        .build()
        .expect("valid parser");
    assert_eq!(parser.parse_path(&path).record_count(), 245);

    let mut missing = wide_parser()
        .worksheet("Archive")
        .build()
        .expect("valid parser");
    let result = missing.parse_path(&path);
    assert_eq!(result.record_count(), 0);
    assert!(matches!(
        result.error(),
        Some(IngestError::WorksheetNotFound { name }) if name == "Archive"
    ));
}

#[test]
fn unsupported_extension_is_reported() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("orders.csv");
    std::fs::write(&path, "Col 0\nitem\n").expect("write csv");

    let mut parser = wide_parser().build().expect("valid parser");
    let result = parser.parse_path(&path);
    assert!(matches!(
        result.error(),
        Some(IngestError::UnsupportedFormat { extension, .. }) if extension == "csv"
    ));
}
