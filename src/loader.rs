//! Loaders for the three data sources.
//!
//! A missing source is never an error: it loads as empty. The only fatal
//! condition is a malformed institution JSON file.

use anyhow::{Context, Result};
use globset::{Glob, GlobMatcher};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::models::{InstitutionRecord, QuestionnaireRow, SchoolRecord, FIELD_MAJOR};
use crate::spreadsheet::{self, SheetReader, SheetTable};

/// Separator between school records in the flat-text files.
pub const RECORD_SENTINEL: &str = "^_^";
/// Full-width colon separating keys from values in school records.
const FIELD_SEPARATOR: char = '：';
/// Free-text remarks are not kept.
const REMARKS_FIELD: &str = "备注";

/// Loads the institution registry. Missing file or a non-array root yields
/// an empty list; array elements that are not objects are skipped.
pub fn load_institutions(path: &Path) -> Result<Vec<InstitutionRecord>> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "institution registry not found");
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read institution registry: {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse institution registry: {}", path.display()))?;

    let serde_json::Value::Array(items) = value else {
        tracing::warn!(path = %path.display(), "institution registry root is not an array");
        return Ok(Vec::new());
    };

    let records: Vec<InstitutionRecord> = items
        .iter()
        .filter_map(|item| item.as_object().map(InstitutionRecord::from_json))
        .collect();
    tracing::debug!(count = records.len(), "loaded institutions");
    Ok(records)
}

/// Why a school block did not produce a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Empty,
    MissingMajor,
}

/// Result of parsing one sentinel-delimited block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOutcome {
    Parsed(SchoolRecord),
    Skipped(SkipReason),
}

/// Parses one block of `key：value` lines. Lines without the separator,
/// empty keys and remarks are ignored.
pub fn parse_school_block(block: &str) -> BlockOutcome {
    let block = block.trim();
    if block.is_empty() {
        return BlockOutcome::Skipped(SkipReason::Empty);
    }
    let mut record = SchoolRecord::default();
    for line in block.lines() {
        let Some((key, value)) = line.trim().split_once(FIELD_SEPARATOR) else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() || key == REMARKS_FIELD {
            continue;
        }
        record
            .fields
            .insert(key.to_string(), value.trim().to_string());
    }
    if record.get(FIELD_MAJOR).is_empty() {
        return BlockOutcome::Skipped(SkipReason::MissingMajor);
    }
    BlockOutcome::Parsed(record)
}

/// Parses a whole school file's content into its block outcomes, in order.
pub fn parse_school_content(content: &str) -> Vec<BlockOutcome> {
    content.split(RECORD_SENTINEL).map(parse_school_block).collect()
}

/// Pattern restricted to one region's files: the first `*` of `pattern`
/// becomes `{region}_*` (`moe_majors_*.txt` → `moe_majors_广东省_*.txt`).
pub fn region_file_pattern(pattern: &str, region: &str) -> String {
    pattern.replacen('*', &format!("{}_*", escape_glob(region.trim())), 1)
}

fn escape_glob(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '*' | '?' | '[' | ']' | '{' | '}' => {
                out.push('[');
                out.push(ch);
                out.push(']');
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Files directly under `dir` whose names match `pattern`, sorted by name.
/// A missing directory or invalid pattern yields no files.
pub fn list_school_files(dir: &Path, pattern: &str) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    let matcher: GlobMatcher = match Glob::new(pattern) {
        Ok(glob) => glob.compile_matcher(),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "invalid school file pattern");
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| matcher.is_match(entry.file_name()))
        .map(|entry| entry.into_path())
        .collect();

    // Sort for deterministic ordering
    files.sort();
    files
}

/// Loads school records from every matching file. With `region_filter`
/// only that region's files are read. Unreadable files are skipped.
pub fn load_schools(dir: &Path, pattern: &str, region_filter: Option<&str>) -> Vec<SchoolRecord> {
    let pattern = match region_filter {
        Some(region) if !region.trim().is_empty() => region_file_pattern(pattern, region),
        _ => pattern.to_string(),
    };

    let mut records = Vec::new();
    for path in list_school_files(dir, &pattern) {
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable school file");
                continue;
            }
        };
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let mut skipped = 0usize;
        for outcome in parse_school_content(&content) {
            match outcome {
                BlockOutcome::Parsed(mut record) => {
                    record.source_file = file_name.clone();
                    records.push(record);
                }
                BlockOutcome::Skipped(SkipReason::MissingMajor) => skipped += 1,
                BlockOutcome::Skipped(SkipReason::Empty) => {}
            }
        }
        tracing::debug!(file = %file_name, skipped, "parsed school file");
    }
    records
}

/// Loads questionnaire rows from the first sheet. Missing file or a workbook
/// no reader can open yields an empty list.
pub fn load_questionnaire(path: &Path) -> Vec<QuestionnaireRow> {
    load_questionnaire_with(path, &spreadsheet::default_readers())
}

pub fn load_questionnaire_with(
    path: &Path,
    readers: &[Box<dyn SheetReader>],
) -> Vec<QuestionnaireRow> {
    match read_table(path, readers, None) {
        Some(table) => table_rows(&table),
        None => Vec::new(),
    }
}

/// Header columns of the questionnaire, for inspection.
pub fn load_questionnaire_columns(path: &Path) -> Vec<String> {
    match read_table(path, &spreadsheet::default_readers(), Some(0)) {
        Some(table) => table.headers,
        None => Vec::new(),
    }
}

fn read_table(
    path: &Path,
    readers: &[Box<dyn SheetReader>],
    row_limit: Option<usize>,
) -> Option<SheetTable> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "questionnaire not found");
        return None;
    }
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read questionnaire");
            return None;
        }
    };
    spreadsheet::read_first_sheet(&bytes, readers, row_limit)
}

/// Zips data rows with headers. Blank-header columns and fully blank rows
/// are dropped; missing cells become `""`.
pub fn table_rows(table: &SheetTable) -> Vec<QuestionnaireRow> {
    table
        .rows
        .iter()
        .filter(|cells| cells.iter().any(|c| !c.is_empty()))
        .map(|cells| {
            table
                .headers
                .iter()
                .enumerate()
                .filter(|(_, header)| !header.is_empty())
                .map(|(i, header)| (header.clone(), cells.get(i).cloned().unwrap_or_default()))
                .collect()
        })
        .collect()
}
