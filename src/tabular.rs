//! Catalog import and export over spreadsheets and delimited text.
//!
//! Import is split in two phases. [`parse_import`] turns the uploaded bytes into
//! [`ImportRow`]s, rejecting the whole file when a required column is missing.
//! The repository then applies the rows in one transaction, folding each one
//! into the current listing with [`merge_row`].

use crate::models::{Listing, ListingDraft};
use crate::normalize::{listing_price, normalize_status};
use calamine::{Data, Reader, Xlsx};
use encoding_rs::{UTF_8, WINDOWS_1252};
use rust_xlsxwriter::Workbook;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xltx", "xltm"];
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const SNIFF_LINES: usize = 20;

/// Logical columns of the catalog file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Code,
    Type,
    Price,
    Neighborhood,
    Description,
    Status,
    Image,
}

impl Column {
    /// Columns every import must carry, in export order.
    pub const REQUIRED: [Column; 6] = [
        Column::Code,
        Column::Type,
        Column::Price,
        Column::Neighborhood,
        Column::Description,
        Column::Status,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Column::Code => "code",
            Column::Type => "type",
            Column::Price => "price",
            Column::Neighborhood => "neighborhood",
            Column::Description => "description",
            Column::Status => "status",
            Column::Image => "image",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Column::Code => &["code", "codigo", "código"],
            Column::Type => &["type", "tipo"],
            Column::Price => &["price", "valor"],
            Column::Neighborhood => &["neighborhood", "bairro"],
            Column::Description => &["description", "descricao", "descrição"],
            Column::Status => &["status"],
            Column::Image => &["image", "imagem"],
        }
    }

    fn from_header(header: &str) -> Option<Column> {
        let header = header.trim_start_matches('\u{feff}').trim().to_lowercase();
        Column::REQUIRED
            .iter()
            .chain(std::iter::once(&Column::Image))
            .find(|column| column.aliases().contains(&header.as_str()))
            .copied()
    }
}

/// File shapes the adapter reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TabularFormat {
    Xlsx,
    Csv,
}

impl TabularFormat {
    /// Pick the format from the filename, then from the content.
    pub fn detect(filename: Option<&str>, bytes: &[u8]) -> Self {
        let extension = filename
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_lowercase());
        match extension.as_deref() {
            Some(ext) if SPREADSHEET_EXTENSIONS.contains(&ext) => TabularFormat::Xlsx,
            Some("csv") | Some("txt") => TabularFormat::Csv,
            _ if bytes.starts_with(ZIP_MAGIC) => TabularFormat::Xlsx,
            _ => TabularFormat::Csv,
        }
    }

    /// Parse the `format` query parameter of the export endpoint.
    pub fn from_param(param: Option<&str>) -> Option<Self> {
        match param.map(|p| p.trim().to_lowercase()).as_deref() {
            None | Some("") | Some("csv") => Some(TabularFormat::Csv),
            Some("xlsx") => Some(TabularFormat::Xlsx),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            TabularFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            TabularFormat::Csv => "text/csv; charset=utf-8",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            TabularFormat::Xlsx => "imoveis.xlsx",
            TabularFormat::Csv => "imoveis.csv",
        }
    }
}

/// Reasons an uploaded file is rejected as a whole.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportError {
    EmptyFile,
    MissingColumns(Vec<&'static str>),
    Spreadsheet(String),
    Delimited(String),
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportError::EmptyFile => write!(f, "The uploaded file is empty"),
            ImportError::MissingColumns(columns) => {
                write!(f, "Missing required columns: {}", columns.join(", "))
            }
            ImportError::Spreadsheet(msg) => write!(f, "Could not read spreadsheet: {}", msg),
            ImportError::Delimited(msg) => write!(f, "Could not read CSV: {}", msg),
        }
    }
}

impl std::error::Error for ImportError {}

impl From<ImportError> for crate::errors::AppError {
    fn from(err: ImportError) -> Self {
        crate::errors::AppError::BadRequest(err.to_string())
    }
}

/// One data row with a non-blank code. Blank cells are `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImportRow {
    pub code: String,
    pub kind: Option<String>,
    pub price: Option<String>,
    pub neighborhood: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    /// `Some` only when the file has an image column.
    pub image: Option<String>,
}

/// Rows accepted from a file, plus how many were skipped as blank.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedImport {
    pub format: TabularFormat,
    pub rows: Vec<ImportRow>,
    pub skipped: usize,
}

/// Outcome of applying an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Read an uploaded catalog file.
pub fn parse_import(filename: Option<&str>, bytes: &[u8]) -> Result<ParsedImport, ImportError> {
    if bytes.is_empty() {
        return Err(ImportError::EmptyFile);
    }

    let format = TabularFormat::detect(filename, bytes);
    let table = match format {
        TabularFormat::Xlsx => read_spreadsheet(bytes)?,
        TabularFormat::Csv => read_delimited(bytes)?,
    };

    let mut rows = table.into_iter();
    let header = rows.next().ok_or(ImportError::EmptyFile)?;
    let positions = resolve_header(&header)?;

    let mut accepted = Vec::new();
    let mut skipped = 0;
    for record in rows {
        match build_row(&positions, &record) {
            Some(row) => accepted.push(row),
            None => skipped += 1,
        }
    }

    tracing::debug!(
        "Parsed {:?} import: {} rows accepted, {} skipped",
        format,
        accepted.len(),
        skipped
    );

    Ok(ParsedImport {
        format,
        rows: accepted,
        skipped,
    })
}

/// Map each known column to its position in the header row.
fn resolve_header(header: &[String]) -> Result<HashMap<Column, usize>, ImportError> {
    let mut positions = HashMap::new();
    for (index, cell) in header.iter().enumerate() {
        if let Some(column) = Column::from_header(cell) {
            positions.entry(column).or_insert(index);
        }
    }

    let missing: Vec<&'static str> = Column::REQUIRED
        .iter()
        .filter(|column| !positions.contains_key(column))
        .map(Column::name)
        .collect();
    if !missing.is_empty() {
        return Err(ImportError::MissingColumns(missing));
    }

    Ok(positions)
}

fn build_row(positions: &HashMap<Column, usize>, record: &[String]) -> Option<ImportRow> {
    if record.iter().all(|cell| cell.trim().is_empty()) {
        return None;
    }

    let cell = |column: Column| {
        positions
            .get(&column)
            .and_then(|&index| record.get(index))
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    let code = cell(Column::Code)?;
    Some(ImportRow {
        code,
        kind: cell(Column::Type),
        price: cell(Column::Price),
        neighborhood: cell(Column::Neighborhood),
        description: cell(Column::Description),
        status: cell(Column::Status),
        image: cell(Column::Image),
    })
}

fn read_spreadsheet(bytes: &[u8]) -> Result<Vec<Vec<String>>, ImportError> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
        .map_err(|e| ImportError::Spreadsheet(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ImportError::Spreadsheet("workbook has no sheets".to_string()))?
        .map_err(|e| ImportError::Spreadsheet(e.to_string()))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

/// Spreadsheet cell as text. Numbers keep a plain numeral form so the price
/// normalizer reads them back unchanged.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        Data::Error(_) => String::new(),
    }
}

fn read_delimited(bytes: &[u8]) -> Result<Vec<Vec<String>>, ImportError> {
    let text = decode_text(bytes);
    let delimiter = sniff_delimiter(&text);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut table = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ImportError::Delimited(e.to_string()))?;
        table.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }

    // Leading blank lines before the header are not rows
    let first = table
        .iter()
        .position(|row| row.iter().any(|cell| !cell.trim().is_empty()))
        .ok_or(ImportError::EmptyFile)?;
    table.drain(..first);

    Ok(table)
}

/// UTF-8 (with or without signature) first, Windows-1252 otherwise.
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match UTF_8.decode_without_bom_handling_and_without_replacement(body) {
        Some(text) => text,
        None => {
            tracing::debug!("Upload is not valid UTF-8, decoding as Windows-1252");
            let (text, _) = WINDOWS_1252.decode_without_bom_handling(body);
            text
        }
    }
}

/// `;` when the header line has more semicolons than commas, `,` otherwise.
pub fn sniff_delimiter(text: &str) -> u8 {
    let header = text
        .lines()
        .take(SNIFF_LINES)
        .find(|line| !line.trim().is_empty())
        .unwrap_or("");
    let semicolons = header.matches(';').count();
    let commas = header.matches(',').count();
    if semicolons > commas {
        b';'
    } else {
        b','
    }
}

/// Fold an import row into the listing that currently holds its code.
///
/// Blank text cells keep the previous value. Price and status always pass
/// through their normalizers, status falling back to the previous status.
pub fn merge_row(existing: Option<&ListingDraft>, row: &ImportRow) -> ListingDraft {
    let base = existing
        .cloned()
        .unwrap_or_else(|| ListingDraft::seeded(&row.code));

    ListingDraft {
        code: row.code.clone(),
        kind: row.kind.clone().unwrap_or(base.kind),
        price: listing_price(row.price.as_deref()),
        neighborhood: row.neighborhood.clone().or(base.neighborhood),
        description: row.description.clone().or(base.description),
        image: row.image.clone().or(base.image),
        status: normalize_status(
            row.status.as_deref(),
            existing.map(|listing| listing.status),
        ),
    }
}

/// One export record, in `Column::REQUIRED` order.
fn export_record(listing: &Listing) -> [String; 6] {
    [
        listing.code.clone(),
        listing.kind.clone(),
        listing.price.to_string(),
        listing.neighborhood.clone().unwrap_or_default(),
        listing.description.clone().unwrap_or_default(),
        normalize_status(Some(listing.status.as_str()), None)
            .as_str()
            .to_string(),
    ]
}

/// Serialize the catalog in the requested format.
pub fn export(listings: &[Listing], format: TabularFormat) -> Result<Vec<u8>, String> {
    match format {
        TabularFormat::Csv => export_csv(listings),
        TabularFormat::Xlsx => export_xlsx(listings),
    }
}

/// UTF-8 with signature, `;`-delimited, so spreadsheet tools in pt-BR open it as is.
/// Multi-line descriptions are written as quoted fields.
pub fn export_csv(listings: &[Listing]) -> Result<Vec<u8>, String> {
    let mut out = UTF8_BOM.to_vec();
    {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .from_writer(&mut out);
        writer
            .write_record(Column::REQUIRED.iter().map(Column::name))
            .map_err(|e| e.to_string())?;
        for listing in listings {
            writer
                .write_record(&export_record(listing))
                .map_err(|e| e.to_string())?;
        }
        writer.flush().map_err(|e| e.to_string())?;
    }
    Ok(out)
}

pub fn export_xlsx(listings: &[Listing]) -> Result<Vec<u8>, String> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("imoveis").map_err(|e| e.to_string())?;

    for (col, column) in Column::REQUIRED.iter().enumerate() {
        sheet
            .write_string(0, col as u16, column.name())
            .map_err(|e| e.to_string())?;
    }

    for (index, listing) in listings.iter().enumerate() {
        let row = index as u32 + 1;
        for (col, value) in export_record(listing).iter().enumerate() {
            if Column::REQUIRED[col] == Column::Price {
                sheet
                    .write_number(row, col as u16, listing.price)
                    .map_err(|e| e.to_string())?;
            } else {
                sheet
                    .write_string(row, col as u16, value)
                    .map_err(|e| e.to_string())?;
            }
        }
    }

    workbook.save_to_buffer().map_err(|e| e.to_string())
}
