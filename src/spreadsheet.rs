//! Decodes an uploaded roster file into header-keyed raw rows.
//!
//! Only the first sheet is read and its first non-empty row names the
//! columns. No business validation happens here.

use crate::error::{ClassbookError, Result};
use calamine::{Data, Reader, Xls, Xlsx};
use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl RawValue {
    /// Whether the cell counts as filled in when picking an alias.
    pub fn is_truthy(&self) -> bool {
        match self {
            RawValue::Text(s) => !s.is_empty(),
            RawValue::Number(n) => *n != 0.0 && !n.is_nan(),
            RawValue::Bool(b) => *b,
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            RawValue::Text(s) => s.clone(),
            // f64's Display already drops a zero fraction: 1001.0 -> "1001".
            RawValue::Number(n) => n.to_string(),
            RawValue::Bool(b) => b.to_string(),
        }
    }
}

pub type RawRow = BTreeMap<String, RawValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Xlsx,
    Xls,
    Csv,
}

/// Accepts `.xlsx`, `.xls` and `.csv` (any case). Checked before any bytes
/// are read.
pub fn detect_format(file_name: &str) -> Result<SheetFormat> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("xlsx") => Ok(SheetFormat::Xlsx),
        Some("xls") => Ok(SheetFormat::Xls),
        Some("csv") => Ok(SheetFormat::Csv),
        _ => Err(ClassbookError::UnsupportedFormat(file_name.to_string())),
    }
}

pub fn read_upload(path: &Path) -> Result<Vec<RawRow>> {
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    detect_format(&file_name)?;
    let bytes = std::fs::read(path).map_err(|e| ClassbookError::Parse(e.to_string()))?;
    parse_upload(&file_name, bytes)
}

pub fn parse_upload(file_name: &str, bytes: Vec<u8>) -> Result<Vec<RawRow>> {
    let grid = match detect_format(file_name)? {
        SheetFormat::Xlsx => first_sheet_grid::<Xlsx<Cursor<Vec<u8>>>>(bytes)?,
        SheetFormat::Xls => first_sheet_grid::<Xls<Cursor<Vec<u8>>>>(bytes)?,
        SheetFormat::Csv => csv_grid(&bytes)?,
    };
    Ok(rows_from_grid(grid))
}

type Grid = Vec<Vec<Option<RawValue>>>;

fn first_sheet_grid<R>(bytes: Vec<u8>) -> Result<Grid>
where
    R: Reader<Cursor<Vec<u8>>>,
    R::Error: std::fmt::Display,
{
    let mut workbook =
        R::new(Cursor::new(bytes)).map_err(|e| ClassbookError::Parse(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ClassbookError::Parse("workbook has no sheets".to_string()))?
        .map_err(|e| ClassbookError::Parse(e.to_string()))?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_value).collect())
        .collect())
}

fn cell_value(cell: &Data) -> Option<RawValue> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => text_value(s),
        Data::Float(f) => Some(RawValue::Number(*f)),
        Data::Int(i) => Some(RawValue::Number(*i as f64)),
        Data::Bool(b) => Some(RawValue::Bool(*b)),
        other => text_value(&other.to_string()),
    }
}

fn text_value(s: &str) -> Option<RawValue> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(RawValue::Text(t.to_string()))
    }
}

fn csv_grid(bytes: &[u8]) -> Result<Grid> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);
    let mut grid = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ClassbookError::Parse(e.to_string()))?;
        grid.push(record.iter().map(text_value).collect());
    }
    Ok(grid)
}

fn header_names(row: &[Option<RawValue>]) -> Vec<Option<String>> {
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    row.iter()
        .map(|cell| {
            let name = cell.as_ref()?.to_text().trim().to_string();
            if name.is_empty() {
                return None;
            }
            let n = seen.entry(name.clone()).or_insert(0);
            let out = if *n == 0 {
                name
            } else {
                format!("{}_{}", name, n)
            };
            *n += 1;
            Some(out)
        })
        .collect()
}

/// First non-empty row becomes the header; blank rows and cells under
/// unnamed columns are dropped.
fn rows_from_grid(grid: Grid) -> Vec<RawRow> {
    let mut rows = grid.into_iter();
    let header = loop {
        match rows.next() {
            Some(r) if r.iter().any(Option::is_some) => break header_names(&r),
            Some(_) => continue,
            None => return Vec::new(),
        }
    };

    rows.filter_map(|cells| {
        let row: RawRow = cells
            .into_iter()
            .zip(header.iter())
            .filter_map(|(cell, name)| Some((name.clone()?, cell?)))
            .collect();
        if row.is_empty() {
            None
        } else {
            Some(row)
        }
    })
    .collect()
}
