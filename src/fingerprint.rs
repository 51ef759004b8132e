//! Source-file fingerprints used to invalidate cached results.
//!
//! A fingerprint is a SHA-256 over path, modification time and size; file
//! contents are never read.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::loader::list_school_files;

/// Current fingerprint of each data source (`""` when absent).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Fingerprints {
    pub institution: String,
    pub questionnaire: String,
    pub school: String,
}

fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// `sha256("{path}|{mtime}|{size}")`, with mtime in fractional seconds.
/// Returns `""` if the file does not exist or cannot be stat'ed.
pub fn file_fingerprint(path: &Path) -> String {
    let Ok(metadata) = std::fs::metadata(path) else {
        return String::new();
    };
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    sha256_hex(&format!("{}|{}|{}", path.display(), mtime, metadata.len()))
}

/// Locations of the three data sources.
#[derive(Debug, Clone)]
pub struct DataSources {
    pub institution_json: PathBuf,
    pub questionnaire_xlsx: PathBuf,
    pub school_dir: PathBuf,
    pub school_file_pattern: String,
}

impl DataSources {
    pub fn from_config(config: &Config) -> Self {
        Self {
            institution_json: config.institution_path(),
            questionnaire_xlsx: config.questionnaire_path(),
            school_dir: config.school_dir(),
            school_file_pattern: config.data.school_file_pattern.clone(),
        }
    }

    /// Aggregate over every school file, in sorted order.
    pub fn school_fingerprint(&self) -> String {
        let parts: Vec<String> = list_school_files(&self.school_dir, &self.school_file_pattern)
            .iter()
            .map(|f| file_fingerprint(f))
            .collect();
        if parts.is_empty() {
            String::new()
        } else {
            sha256_hex(&parts.join("|"))
        }
    }

    pub fn fingerprints(&self) -> Fingerprints {
        Fingerprints {
            institution: file_fingerprint(&self.institution_json),
            questionnaire: file_fingerprint(&self.questionnaire_xlsx),
            school: self.school_fingerprint(),
        }
    }
}
