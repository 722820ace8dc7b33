//! Tabular codec: CSV / Excel (.xlsx) bytes to an in-memory [`Sheet`] and back.

use crate::error::{DecodeError, EncodeError};
use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use rust_xlsxwriter::Workbook;
use std::fmt;
use std::io::Cursor;

/// Name of the single worksheet written by [`encode`].
pub const OUTPUT_SHEET_NAME: &str = "Updated Data";

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
}

impl CellValue {
    /// A cell is missing iff it is absent or the empty string. Zero and
    /// whitespace are values.
    pub fn is_missing(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            CellValue::Number(_) => false,
        }
    }

    /// JSON form used in API responses: numbers stay numbers, empty is `""`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::Empty => serde_json::Value::String(String::new()),
            CellValue::Text(s) => serde_json::Value::String(s.clone()),
            CellValue::Number(n) => {
                if is_whole(*n) {
                    serde_json::Value::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => f.write_str(s),
            // Avoid trailing ".0" for whole numbers
            CellValue::Number(n) if is_whole(*n) => write!(f, "{}", *n as i64),
            CellValue::Number(n) => write!(f, "{}", n),
        }
    }
}

fn is_whole(n: f64) -> bool {
    n.fract() == 0.0 && n.abs() < i64::MAX as f64
}

/// Parse a string that is entirely a finite number (surrounding whitespace allowed).
pub fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if !trimmed.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// One data row; cells are aligned with [`Sheet::columns`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    pub cells: Vec<CellValue>,
}

impl Row {
    pub fn new(cells: Vec<CellValue>) -> Self {
        Self { cells }
    }

    pub fn get(&self, idx: usize) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.cells.get(idx).unwrap_or(&EMPTY)
    }
}

/// Decoded first sheet of a workbook. Every row has one cell per column.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sheet {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut cells| {
                cells.resize(width, CellValue::Empty);
                Row::new(cells)
            })
            .collect();
        Self {
            name: name.into(),
            columns,
            rows,
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Header row first, then each row's cells, as JSON values.
    pub fn to_table(&self) -> Vec<Vec<serde_json::Value>> {
        let mut table = Vec::with_capacity(self.rows.len() + 1);
        table.push(
            self.columns
                .iter()
                .map(|c| serde_json::Value::String(c.clone()))
                .collect(),
        );
        for row in &self.rows {
            table.push(row.cells.iter().map(CellValue::to_json).collect());
        }
        table
    }
}

/// Lowercased extension of a filename, without the dot.
pub fn file_extension(filename: &str) -> Option<String> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Decode the first sheet of an uploaded file, dispatching by extension.
pub fn decode(filename: &str, data: &[u8]) -> Result<Sheet, DecodeError> {
    if data.is_empty() {
        return Err(DecodeError::Empty);
    }

    let ext = file_extension(filename).unwrap_or_default();
    match ext.as_str() {
        "csv" => decode_csv(filename, data),
        "xlsx" => decode_xlsx(data),
        _ => Err(DecodeError::UnsupportedExtension(ext)),
    }
}

fn decode_csv(filename: &str, data: &[u8]) -> Result<Sheet, DecodeError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(data);

    let raw_headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result?;
        let cells: Vec<CellValue> = record.iter().map(csv_field_to_cell).collect();
        // Skip completely empty rows
        if cells.iter().all(CellValue::is_missing) {
            continue;
        }
        records.push(cells);
    }

    let width = records
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(raw_headers.len()))
        .max()
        .unwrap_or(0);
    let columns = normalize_headers(raw_headers, width)?;

    let name = file_stem(filename);
    Ok(Sheet::new(name, columns, records))
}

fn csv_field_to_cell(field: &str) -> CellValue {
    if field.is_empty() {
        CellValue::Empty
    } else if let Some(n) = parse_number(field) {
        CellValue::Number(n)
    } else {
        CellValue::Text(field.to_string())
    }
}

fn file_stem(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    base.rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(base)
        .to_string()
}

/// Read only the first worksheet; first row is the header.
fn decode_xlsx(data: &[u8]) -> Result<Sheet, DecodeError> {
    let cursor = Cursor::new(data);
    let mut workbook: Xlsx<_> = open_workbook_from_rs(cursor)?;

    let name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(DecodeError::NoWorksheet)?;
    let range = workbook.worksheet_range(&name)?;

    let mut row_iter = range.rows();
    let header_row = row_iter.next().ok_or(DecodeError::NoHeader)?;
    let raw_headers: Vec<String> = header_row.iter().map(cell_to_string).collect();

    let mut records = Vec::new();
    for row in row_iter {
        let cells: Vec<CellValue> = row.iter().map(data_to_cell).collect();
        if cells.iter().all(CellValue::is_missing) {
            continue;
        }
        records.push(cells);
    }

    let columns = normalize_headers(raw_headers, range.width())?;
    Ok(Sheet::new(name, columns, records))
}

/// Fill blank header names and disambiguate duplicates.
fn normalize_headers(raw: Vec<String>, width: usize) -> Result<Vec<String>, DecodeError> {
    if raw.iter().all(|h| h.trim().is_empty()) {
        return Err(DecodeError::NoHeader);
    }

    let mut columns: Vec<String> = Vec::with_capacity(width);
    let mut blanks = 0usize;
    for idx in 0..width {
        let raw_name = raw.get(idx).map(|h| h.trim()).unwrap_or("");
        let base = if raw_name.is_empty() {
            let generated = if blanks == 0 {
                "__EMPTY".to_string()
            } else {
                format!("__EMPTY_{}", blanks)
            };
            blanks += 1;
            generated
        } else {
            raw_name.to_string()
        };

        let mut candidate = base.clone();
        let mut suffix = 1;
        while columns.contains(&candidate) {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        columns.push(candidate);
    }
    Ok(columns)
}

fn data_to_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) if s.is_empty() => CellValue::Empty,
        other => CellValue::Text(cell_to_string(other)),
    }
}

/// Convert a calamine cell to a string representation.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => CellValue::Number(*f).to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_string(dt.as_f64()),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#ERR:{:?}", e),
    }
}

/// Convert an Excel serial date number to a human-readable string.
/// Serial 1 is 1900-01-01; serial 60 is the nonexistent Feb 29, 1900.
fn excel_serial_to_string(serial: f64) -> String {
    let days = serial as i64;
    let frac = serial - days as f64;

    // Serials before the fake leap day sit one day early
    let adjusted_days = if days < 60 { days + 1 } else { days };

    let base = 25569i64; // serial of 1970-01-01
    let unix_days = adjusted_days - base;
    let total_secs = unix_days * 86400 + (frac * 86400.0).round() as i64;

    let days_since_epoch = total_secs.div_euclid(86400);
    let time_of_day = total_secs.rem_euclid(86400);

    let hours = time_of_day / 3600;
    let minutes = (time_of_day % 3600) / 60;
    let seconds = time_of_day % 60;

    let (year, month, day) = civil_from_days(days_since_epoch);

    if time_of_day == 0 {
        format!("{:04}-{:02}-{:02}", year, month, day)
    } else {
        format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            year, month, day, hours, minutes, seconds
        )
    }
}

fn civil_from_days(days_since_epoch: i64) -> (i64, u32, u32) {
    let mut year = 1970i64;
    let mut remaining = days_since_epoch;

    if remaining >= 0 {
        loop {
            let diy = if is_leap(year) { 366 } else { 365 };
            if remaining < diy {
                break;
            }
            remaining -= diy;
            year += 1;
        }
    } else {
        loop {
            year -= 1;
            remaining += if is_leap(year) { 366 } else { 365 };
            if remaining >= 0 {
                break;
            }
        }
    }

    let dim: [i64; 12] = if is_leap(year) {
        [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    } else {
        [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    };

    let mut month = 1u32;
    for d in dim {
        if remaining < d {
            break;
        }
        remaining -= d;
        month += 1;
    }
    (year, month, remaining as u32 + 1)
}

fn is_leap(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

/// Serialize a sheet as a single-worksheet xlsx workbook, header row first.
pub fn encode(sheet: &Sheet) -> Result<Vec<u8>, EncodeError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(OUTPUT_SHEET_NAME)?;

    for (c, column) in sheet.columns.iter().enumerate() {
        let col = u16::try_from(c).map_err(|_| EncodeError::TooLarge("columns"))?;
        worksheet.write_string(0, col, column.as_str())?;
    }

    for (r, row) in sheet.rows.iter().enumerate() {
        let row_idx = u32::try_from(r + 1).map_err(|_| EncodeError::TooLarge("rows"))?;
        for (c, cell) in row.cells.iter().enumerate() {
            let col = u16::try_from(c).map_err(|_| EncodeError::TooLarge("columns"))?;
            match cell {
                CellValue::Empty => {}
                CellValue::Number(n) => {
                    worksheet.write_number(row_idx, col, *n)?;
                }
                CellValue::Text(s) => {
                    worksheet.write_string(row_idx, col, s.as_str())?;
                }
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}
