use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    CellValue, Control, FieldError, HeaderColumns, IngestError, Row, RowSource, Sheet, Value,
};

/// Target of a parsed data row.
pub trait Record {
    fn field(&self, field: &str) -> Option<&Value>;

    /// Store `value`; implementations may reject values they cannot hold.
    fn set_field(&mut self, field: &str, value: Value) -> Result<(), FieldError>;
}

/// Ordered field map; the default record type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapRecord {
    fields: BTreeMap<String, Value>,
}

impl MapRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(field, value)| (field.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.fields
    }
}

impl Record for MapRecord {
    fn field(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    fn set_field(&mut self, field: &str, value: Value) -> Result<(), FieldError> {
        self.fields.insert(field.to_owned(), value);
        Ok(())
    }
}

impl From<BTreeMap<String, Value>> for MapRecord {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }
}

/// What the per-record callback wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFlow {
    /// Keep the record and move on to the next row.
    Continue,
    /// Discard this record and stop building.
    Stop,
    /// Keep this record, then stop building.
    Finish,
}

/// A built record and the 1-based row it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedRecord<R> {
    pub row: u32,
    pub record: R,
}

/// Turns data rows into records using the mapped header columns.
#[derive(Debug, Clone, Copy)]
pub struct RecordBuilder<'a> {
    columns: &'a HeaderColumns,
    write_nulls: bool,
    retain: bool,
}

impl<'a> RecordBuilder<'a> {
    pub fn new(columns: &'a HeaderColumns) -> Self {
        Self {
            columns,
            write_nulls: true,
            retain: true,
        }
    }

    /// Assign cleared fields for empty cells (default `true`).
    pub fn write_nulls(mut self, write_nulls: bool) -> Self {
        self.write_nulls = write_nulls;
        self
    }

    /// Collect the built records into the returned vector (default `true`).
    pub fn retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    /// Build records from `data_row` until a row with no mapped value, the
    /// end of the sheet, or a stop from `on_record`.
    ///
    /// `factory` receives the previously built record, so continuation rows
    /// can start from it; numeric cells then add onto the carried value.
    pub fn build<R, F, C>(
        &self,
        rows: &mut dyn RowSource,
        data_row: u32,
        mut factory: F,
        mut on_record: C,
    ) -> Result<Vec<ParsedRecord<R>>, IngestError>
    where
        R: Record,
        F: FnMut(Option<&R>) -> R,
        C: FnMut(&R, u32) -> RecordFlow,
    {
        let mut retained = Vec::new();
        // The last accepted record stays here (rather than in `retained`) so
        // the factory can borrow it whether or not retention is enabled.
        let mut previous: Option<ParsedRecord<R>> = None;
        let mut built = 0usize;

        rows.set_start_row(data_row);
        rows.for_each_row(&mut |row, sheet| {
            let mut record = factory(previous.as_ref().map(|p| &p.record));
            if !self.fill_record(&mut record, &row, sheet)? {
                log::debug!("row {} has no mapped values; end of data", row.index());
                return Ok(Control::Stop);
            }

            let flow = on_record(&record, row.index());
            if flow == RecordFlow::Stop {
                log::debug!("record callback stopped at row {}", row.index());
                return Ok(Control::Stop);
            }

            built += 1;
            let current = ParsedRecord {
                row: row.index(),
                record,
            };
            if let Some(done) = previous.replace(current) {
                if self.retain {
                    retained.push(done);
                }
            }
            Ok(match flow {
                RecordFlow::Finish => Control::Stop,
                _ => Control::Continue,
            })
        })?;

        if self.retain {
            retained.extend(previous);
        }
        log::debug!("built {built} records");
        Ok(retained)
    }

    /// Copy the mapped cells of `row` into `record`. Returns whether any
    /// mapped cell had a value.
    fn fill_record<R: Record>(
        &self,
        record: &mut R,
        row: &Row<'_>,
        sheet: &Sheet,
    ) -> Result<bool, IngestError> {
        let mut has_any_value = false;
        for (field, col) in self.columns.iter() {
            let cell = row.get(col);
            let has_value = cell.has_value();
            has_any_value |= has_value;
            if !has_value && !self.write_nulls {
                continue;
            }

            let value = match cell {
                CellValue::DateTime(serial) => {
                    match sheet.date_system().serial_to_datetime(*serial) {
                        Some(datetime) => Value::DateTime(datetime),
                        None => {
                            log::warn!(
                                "row {}: date serial {serial} for `{field}` is out of range",
                                row.index()
                            );
                            Value::Number(*serial)
                        }
                    }
                }
                // Repeated numeric cells for one logical record are summed.
                CellValue::Number(n) => match record.field(field) {
                    Some(Value::Number(prev)) => Value::Number(prev + n),
                    _ => Value::Number(*n),
                },
                CellValue::Empty => Value::Null,
                CellValue::String(s) => Value::String(s.clone()),
                CellValue::Boolean(b) => Value::Boolean(*b),
                CellValue::Error(e) => Value::Error(e.clone()),
            };
            record
                .set_field(field, value)
                .map_err(|source| IngestError::Field {
                    row: row.index(),
                    source,
                })?;
        }
        Ok(has_any_value)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{DateSystem, SheetRows};

    fn columns() -> HeaderColumns {
        [("name", 0), ("qty", 1)].into_iter().collect()
    }

    fn rows_of(sheet: &Sheet) -> SheetRows<'_> {
        SheetRows::new(sheet)
    }

    fn names(records: &[ParsedRecord<MapRecord>]) -> Vec<(u32, String)> {
        records
            .iter()
            .map(|p| {
                let name = p
                    .record
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned();
                (p.row, name)
            })
            .collect()
    }

    #[test]
    fn blank_row_ends_the_data() {
        let sheet = Sheet::from_rows(
            "Data",
            vec![
                vec![CellValue::from("Name"), CellValue::from("Qty")],
                vec![CellValue::from("a"), CellValue::from(1.0)],
                vec![CellValue::from("b"), CellValue::from(2.0)],
                vec![CellValue::Empty, CellValue::from(""), CellValue::from("note")],
                vec![CellValue::from("c"), CellValue::from(3.0)],
            ],
        );
        let columns = columns();
        let records = RecordBuilder::new(&columns)
            .build(
                &mut rows_of(&sheet),
                2,
                |_| MapRecord::new(),
                |_, _| RecordFlow::Continue,
            )
            .unwrap();
        assert_eq!(names(&records), vec![(2, "a".to_owned()), (3, "b".to_owned())]);
    }

    #[test]
    fn numeric_cells_accumulate_on_carried_records() {
        let sheet = Sheet::from_rows(
            "Data",
            vec![
                vec![CellValue::from("Order 1"), CellValue::from(5.0)],
                vec![CellValue::Empty, CellValue::from(3.0)],
            ],
        );
        let columns = columns();
        let records = RecordBuilder::new(&columns)
            .write_nulls(false)
            .build(
                &mut rows_of(&sheet),
                1,
                |prev: Option<&MapRecord>| prev.cloned().unwrap_or_default(),
                |_, _| RecordFlow::Continue,
            )
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].record.get("qty"), Some(&Value::Number(5.0)));
        assert_eq!(records[1].record.get("qty"), Some(&Value::Number(8.0)));
        // The carried name survives because empty cells are not written.
        assert_eq!(records[1].record.get("name"), Some(&Value::from("Order 1")));
    }

    #[test]
    fn write_nulls_clears_fields_for_empty_cells() {
        let sheet = Sheet::from_rows(
            "Data",
            vec![
                vec![CellValue::from("a"), CellValue::from(1.0)],
                vec![CellValue::from("b")],
            ],
        );
        let columns = columns();

        let with_nulls = RecordBuilder::new(&columns)
            .build(
                &mut rows_of(&sheet),
                1,
                |_| MapRecord::new(),
                |_, _| RecordFlow::Continue,
            )
            .unwrap();
        assert_eq!(with_nulls[1].record.get("qty"), Some(&Value::Null));

        let without_nulls = RecordBuilder::new(&columns)
            .write_nulls(false)
            .build(
                &mut rows_of(&sheet),
                1,
                |_| MapRecord::new(),
                |_, _| RecordFlow::Continue,
            )
            .unwrap();
        assert_eq!(without_nulls[1].record.get("qty"), None);
    }

    #[test]
    fn date_cells_become_datetimes() {
        let mut sheet = Sheet::new("Data").with_date_system(DateSystem::Excel1904);
        sheet.set_value(1, 0, "a");
        sheet.set_value(1, 1, CellValue::DateTime(43830.5));
        let columns = columns();
        let records = RecordBuilder::new(&columns)
            .build(
                &mut rows_of(&sheet),
                1,
                |_| MapRecord::new(),
                |_, _| RecordFlow::Continue,
            )
            .unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(records[0].record.get("qty"), Some(&Value::DateTime(expected)));
    }

    #[test]
    fn callback_stop_discards_and_finish_keeps() {
        let sheet = Sheet::from_rows(
            "Data",
            (1..=20).map(|i| vec![CellValue::from(format!("r{i}")), CellValue::from(1.0)]),
        );
        let columns = columns();

        let mut seen = Vec::new();
        let stopped = RecordBuilder::new(&columns)
            .build(
                &mut rows_of(&sheet),
                1,
                |_| MapRecord::new(),
                |_, row| {
                    seen.push(row);
                    if row == 10 {
                        RecordFlow::Stop
                    } else {
                        RecordFlow::Continue
                    }
                },
            )
            .unwrap();
        assert_eq!(stopped.len(), 9);
        assert_eq!(seen, (1..=10).collect::<Vec<_>>());

        let finished = RecordBuilder::new(&columns)
            .build(
                &mut rows_of(&sheet),
                1,
                |_| MapRecord::new(),
                |_, row| {
                    if row == 10 {
                        RecordFlow::Finish
                    } else {
                        RecordFlow::Continue
                    }
                },
            )
            .unwrap();
        assert_eq!(finished.len(), 10);
        assert_eq!(finished.last().map(|p| p.row), Some(10));
    }

    #[test]
    fn factory_sees_previous_record_without_retention() {
        let sheet = Sheet::from_rows(
            "Data",
            (1..=3).map(|i| vec![CellValue::from(format!("r{i}")), CellValue::from(2.0)]),
        );
        let columns = columns();
        let mut totals = Vec::new();
        let records = RecordBuilder::new(&columns)
            .retain(false)
            .build(
                &mut rows_of(&sheet),
                1,
                |prev: Option<&MapRecord>| prev.cloned().unwrap_or_default(),
                |record, _| {
                    totals.push(record.get("qty").and_then(Value::as_number));
                    RecordFlow::Continue
                },
            )
            .unwrap();
        assert!(records.is_empty());
        assert_eq!(totals, vec![Some(2.0), Some(4.0), Some(6.0)]);
    }

    #[derive(Debug, Default)]
    struct StrictRecord {
        qty: Option<f64>,
    }

    impl Record for StrictRecord {
        fn field(&self, field: &str) -> Option<&Value> {
            let _ = field;
            None
        }

        fn set_field(&mut self, field: &str, value: Value) -> Result<(), FieldError> {
            match (field, value) {
                ("qty", Value::Number(n)) => {
                    self.qty = Some(n);
                    Ok(())
                }
                ("qty", other) => Err(FieldError::new(
                    "qty",
                    format!("expected a number, got {other:?}"),
                )),
                _ => Ok(()),
            }
        }
    }

    #[test]
    fn rejected_values_abort_with_the_row() {
        let sheet = Sheet::from_rows(
            "Data",
            vec![
                vec![CellValue::from("a"), CellValue::from(1.0)],
                vec![CellValue::from("b"), CellValue::from("lots")],
            ],
        );
        let columns = columns();
        let err = RecordBuilder::new(&columns)
            .build(
                &mut rows_of(&sheet),
                1,
                |_| StrictRecord::default(),
                |_, _| RecordFlow::Continue,
            )
            .unwrap_err();
        match err {
            IngestError::Field { row, source } => {
                assert_eq!(row, 2);
                assert_eq!(source.field, "qty");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
