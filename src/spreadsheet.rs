//! Row-table reading for `.xlsx` workbooks (first sheet only).
//!
//! Workbooks are opened with `zip` and parsed with `quick-xml`. Reading is
//! strategy-based: [`default_readers`] returns the readers in priority order
//! and [`read_first_sheet`] returns the table from the first reader that
//! succeeds. Both readers produce the same table shape; they differ in how
//! they locate the first sheet.

use std::io::Read;

use quick_xml::events::{BytesStart, Event};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Maximum columns per row (avoids unbounded padding from bogus cell refs).
const MAX_COLUMNS: usize = 16_384;

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

/// First sheet as text cells. `rows` excludes the header row; every row is
/// padded or truncated to `headers.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SheetTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug)]
pub enum SheetError {
    Zip(String),
    Xml(String),
    MissingPart(String),
}

impl std::fmt::Display for SheetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SheetError::Zip(e) => write!(f, "workbook archive error: {}", e),
            SheetError::Xml(e) => write!(f, "workbook XML error: {}", e),
            SheetError::MissingPart(p) => write!(f, "workbook part not found: {}", p),
        }
    }
}

impl std::error::Error for SheetError {}

/// A strategy for locating and reading the first worksheet of a workbook.
pub trait SheetReader {
    /// Short identifier used in log messages.
    fn name(&self) -> &'static str;

    /// Reads the header row and up to `row_limit` data rows (all rows when
    /// `None`).
    fn read_first_sheet(
        &self,
        bytes: &[u8],
        row_limit: Option<usize>,
    ) -> Result<SheetTable, SheetError>;
}

/// Resolves the first sheet through `xl/workbook.xml` and its relationships,
/// i.e. the sheet shown first in the workbook's tab order.
pub struct WorkbookReader;

/// Opens the lowest-numbered `xl/worksheets/sheetN.xml` directly, for
/// workbooks whose workbook part or relationships are broken.
pub struct WorksheetScanReader;

impl SheetReader for WorkbookReader {
    fn name(&self) -> &'static str {
        "workbook"
    }

    fn read_first_sheet(
        &self,
        bytes: &[u8],
        row_limit: Option<usize>,
    ) -> Result<SheetTable, SheetError> {
        let mut archive = open_archive(bytes)?;
        let workbook = read_zip_entry_bounded(&mut archive, "xl/workbook.xml")?;
        let rel_id = first_sheet_rel_id(&workbook)?;
        let rels = read_zip_entry_bounded(&mut archive, "xl/_rels/workbook.xml.rels")?;
        let target = relationship_target(&rels, &rel_id)?;
        let sheet_path = resolve_target(&target);
        let shared = read_shared_strings(&mut archive)?;
        let sheet_xml = read_zip_entry_bounded(&mut archive, &sheet_path)?;
        parse_sheet(&sheet_xml, &shared, row_limit)
    }
}

impl SheetReader for WorksheetScanReader {
    fn name(&self) -> &'static str {
        "worksheet-scan"
    }

    fn read_first_sheet(
        &self,
        bytes: &[u8],
        row_limit: Option<usize>,
    ) -> Result<SheetTable, SheetError> {
        let mut archive = open_archive(bytes)?;
        let sheet_path = list_worksheet_names(&archive)
            .into_iter()
            .next()
            .ok_or_else(|| SheetError::MissingPart("xl/worksheets/sheet*.xml".to_string()))?;
        let shared = read_shared_strings(&mut archive)?;
        let sheet_xml = read_zip_entry_bounded(&mut archive, &sheet_path)?;
        parse_sheet(&sheet_xml, &shared, row_limit)
    }
}

/// Readers in priority order.
pub fn default_readers() -> Vec<Box<dyn SheetReader>> {
    vec![Box::new(WorkbookReader), Box::new(WorksheetScanReader)]
}

/// Returns the table from the first reader that succeeds, or `None` when
/// every reader fails.
pub fn read_first_sheet(
    bytes: &[u8],
    readers: &[Box<dyn SheetReader>],
    row_limit: Option<usize>,
) -> Option<SheetTable> {
    for reader in readers {
        match reader.read_first_sheet(bytes, row_limit) {
            Ok(table) => {
                tracing::debug!(
                    reader = reader.name(),
                    rows = table.rows.len(),
                    "read first sheet"
                );
                return Some(table);
            }
            Err(e) => {
                tracing::warn!(reader = reader.name(), error = %e, "sheet reader failed");
            }
        }
    }
    None
}

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, SheetError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| SheetError::Zip(e.to_string()))
}

fn read_zip_entry_bounded(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, SheetError> {
    let entry = archive.by_name(name).map_err(|e| match e {
        zip::result::ZipError::FileNotFound => SheetError::MissingPart(name.to_string()),
        other => SheetError::Zip(other.to_string()),
    })?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| SheetError::Zip(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(SheetError::Zip(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

fn attr_value(e: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        if a.key.local_name().as_ref() == local {
            a.unescape_value().ok().map(|v| v.into_owned())
        } else {
            None
        }
    })
}

fn first_sheet_rel_id(xml: &[u8]) -> Result<String, SheetError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"sheet" => {
                return attr_value(&e, b"id")
                    .ok_or_else(|| SheetError::Xml("sheet element without r:id".to_string()));
            }
            Ok(Event::Eof) => {
                return Err(SheetError::MissingPart(
                    "sheet entry in xl/workbook.xml".to_string(),
                ))
            }
            Err(e) => return Err(SheetError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
}

fn relationship_target(xml: &[u8], rel_id: &str) -> Result<String, SheetError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if attr_value(&e, b"Id").as_deref() == Some(rel_id) {
                    return attr_value(&e, b"Target")
                        .ok_or_else(|| SheetError::Xml("relationship without Target".to_string()));
                }
            }
            Ok(Event::Eof) => {
                return Err(SheetError::MissingPart(format!("relationship {}", rel_id)))
            }
            Err(e) => return Err(SheetError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
}

fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    }
}

/// Shared string table; a workbook without one (numbers only) yields an
/// empty table.
fn read_shared_strings(archive: &mut Archive<'_>) -> Result<Vec<String>, SheetError> {
    let xml = match read_zip_entry_bounded(archive, "xl/sharedStrings.xml") {
        Ok(xml) => xml,
        Err(SheetError::MissingPart(_)) => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    parse_shared_strings(&xml)
}

fn parse_shared_strings(xml: &[u8]) -> Result<Vec<String>, SheetError> {
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    // Phonetic runs (<rPh>) carry reading hints, not cell text.
    let mut in_phonetic = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"rPh" => in_phonetic = true,
                b"t" => in_t = !in_phonetic,
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"si" => {
                strings.push(String::new());
            }
            Ok(Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"rPh" => in_phonetic = false,
                b"si" => strings.push(current.take().unwrap_or_default()),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(SheetError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn list_worksheet_names(archive: &Archive<'_>) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Zero-based column index from a cell reference such as `AB12`.
fn column_index(cell_ref: &str) -> Option<usize> {
    let mut idx = 0usize;
    let mut seen = false;
    for ch in cell_ref.chars().take_while(|c| c.is_ascii_alphabetic()) {
        idx = idx * 26 + (ch.to_ascii_uppercase() as usize - 'A' as usize + 1);
        if idx > MAX_COLUMNS {
            return None;
        }
        seen = true;
    }
    if seen && idx <= MAX_COLUMNS {
        Some(idx - 1)
    } else {
        None
    }
}

#[derive(Default)]
struct CellState {
    col: usize,
    kind: Option<String>,
    value: String,
}

impl CellState {
    fn resolve(self, shared: &[String]) -> String {
        let raw = self.value.trim();
        match self.kind.as_deref() {
            Some("s") => raw
                .parse::<usize>()
                .ok()
                .and_then(|i| shared.get(i))
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
            Some("b") => match raw {
                "1" => "TRUE".to_string(),
                "0" => "FALSE".to_string(),
                other => other.to_string(),
            },
            _ => raw.to_string(),
        }
    }
}

fn place(row: &mut Vec<String>, col: usize, value: String) {
    if row.len() <= col {
        row.resize(col + 1, String::new());
    }
    row[col] = value;
}

fn parse_sheet(
    xml: &[u8],
    shared: &[String],
    row_limit: Option<usize>,
) -> Result<SheetTable, SheetError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Option<Vec<String>> = None;
    let mut cell: Option<CellState> = None;
    let mut in_value = false;
    let mut in_phonetic = false;
    let max_rows = row_limit.map(|n| n + 1);

    loop {
        if max_rows.is_some_and(|max| rows.len() >= max) {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => row = Some(Vec::new()),
                b"c" => {
                    let next_col = row.as_ref().map(Vec::len).unwrap_or(0);
                    cell = Some(CellState {
                        col: attr_value(&e, b"r")
                            .and_then(|r| column_index(&r))
                            .unwrap_or(next_col),
                        kind: attr_value(&e, b"t"),
                        value: String::new(),
                    });
                }
                // <v> for plain and shared values, <t> inside <is> for inline strings
                b"v" | b"t" => in_value = cell.is_some() && !in_phonetic,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"row" => {
                rows.push(Vec::new());
            }
            Ok(Event::Text(te)) if in_value => {
                if let Some(c) = cell.as_mut() {
                    c.value.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"rPh" => in_phonetic = false,
                b"c" => {
                    if let (Some(c), Some(r)) = (cell.take(), row.as_mut()) {
                        let col = c.col;
                        let value = c.resolve(shared);
                        place(r, col, value);
                    }
                }
                b"row" => {
                    if let Some(r) = row.take() {
                        rows.push(r);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(SheetError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    let mut iter = rows.into_iter();
    let headers = iter.next().unwrap_or_default();
    let width = headers.len();
    let rows = iter
        .map(|mut r| {
            r.resize(width, String::new());
            r
        })
        .collect();
    Ok(SheetTable { headers, rows })
}
