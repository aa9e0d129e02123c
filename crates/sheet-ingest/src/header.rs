use crate::{Control, IngestError, Row, RowSource};

/// Where the header and the first data row were found (both 1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderLocation {
    pub header_row: u32,
    pub data_row: u32,
}

/// Finds the header row using column alignment.
///
/// The first populated row accepted by the predicate becomes the header. The
/// first later row whose leftmost populated cell sits in the same column as
/// the header's is the first data row; rows starting in other columns (notes,
/// sub-headings, totals) are skipped. Rows without data are ignored.
pub struct HeaderLocator<F> {
    is_header_row: F,
    scan_limit: Option<u32>,
}

impl<F> HeaderLocator<F>
where
    F: FnMut(&Row<'_>) -> bool,
{
    pub fn new(is_header_row: F) -> Self {
        Self {
            is_header_row,
            scan_limit: None,
        }
    }

    /// Give up after `limit` rows instead of scanning the whole sheet.
    pub fn with_scan_limit(mut self, limit: Option<u32>) -> Self {
        self.scan_limit = limit;
        self
    }

    pub fn locate(&mut self, rows: &mut dyn RowSource) -> Result<HeaderLocation, IngestError> {
        let scan_limit = self.scan_limit;
        let is_header_row = &mut self.is_header_row;

        let mut header: Option<(u32, u32)> = None;
        let mut data_row = None;
        let mut scanned = 0u32;
        let mut limit_hit = false;

        rows.set_start_row(1);
        rows.for_each_row(&mut |row, _sheet| {
            if scan_limit.is_some_and(|limit| scanned >= limit) {
                limit_hit = true;
                return Ok(Control::Stop);
            }
            scanned += 1;

            let Some((col, _)) = row.first_populated() else {
                return Ok(Control::Continue);
            };
            match header {
                None => {
                    if is_header_row(&row) {
                        header = Some((row.index(), col));
                    }
                    Ok(Control::Continue)
                }
                Some((_, header_col)) if header_col != col => Ok(Control::Continue),
                Some(_) => {
                    data_row = Some(row.index());
                    Ok(Control::Stop)
                }
            }
        })?;

        let Some((header_row, _)) = header else {
            return Err(match scan_limit {
                Some(limit) if limit_hit => IngestError::HeaderScanLimit { limit },
                _ => IngestError::HeaderNotFound,
            });
        };
        // A header without aligned data still parses (as an empty dataset).
        let data_row = data_row.unwrap_or_else(|| header_row.saturating_add(1));
        log::debug!("found header row {header_row}, first data row {data_row}");
        Ok(HeaderLocation {
            header_row,
            data_row,
        })
    }
}
