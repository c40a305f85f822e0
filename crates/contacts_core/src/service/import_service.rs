//! Bulk contact import.
//!
//! # Responsibility
//! - Parse JSON, CSV and vCard contact exports into drafts.
//! - Insert drafts while skipping records already present by email or
//!   telegram handle.
//!
//! # Invariants
//! - The format is chosen by file extension (`.json`, `.csv`, `.vcf`).
//! - A failing row is counted and logged; it never aborts the batch.
//! - Imported rows carry the source of their format (`import_json`,
//!   `import_csv`, `import_vcf`).

use crate::model::contact::ContactDraft;
use crate::repo::contact_repo::{ContactRepository, RepoResult};
use log::{info, warn};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

/// Provenance stored for JSON-imported contacts.
pub const JSON_IMPORT_SOURCE: &str = "import_json";
/// Provenance stored for CSV-imported contacts.
pub const CSV_IMPORT_SOURCE: &str = "import_csv";
/// Provenance stored for vCard-imported contacts.
pub const VCARD_IMPORT_SOURCE: &str = "import_vcf";

/// Name used when an imported record has none.
pub const UNNAMED_CONTACT: &str = "Unnamed";

#[derive(Debug)]
pub enum ImportError {
    /// Payload is not valid JSON or not an array of objects.
    Json(serde_json::Error),
    /// CSV payload cannot be read or a row does not fit the columns.
    Csv(csv::Error),
    /// File extension names no supported format.
    UnsupportedFormat(String),
}

impl Display for ImportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(err) => write!(f, "invalid contact import payload: {err}"),
            Self::Csv(err) => write!(f, "invalid contact CSV: {err}"),
            Self::UnsupportedFormat(extension) => write!(
                f,
                "unsupported import format `{extension}`; expected .json, .csv or .vcf"
            ),
        }
    }
}

impl Error for ImportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            Self::Csv(err) => Some(err),
            Self::UnsupportedFormat(_) => None,
        }
    }
}

impl From<serde_json::Error> for ImportError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<csv::Error> for ImportError {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}

/// Supported contact export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Json,
    Csv,
    Vcard,
}

impl ImportFormat {
    /// Picks the format from the file extension, case-insensitively.
    pub fn from_path(path: &Path) -> Result<Self, ImportError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "vcf" => Ok(Self::Vcard),
            _ => Err(ImportError::UnsupportedFormat(extension)),
        }
    }

    pub fn source(self) -> &'static str {
        match self {
            Self::Json => JSON_IMPORT_SOURCE,
            Self::Csv => CSV_IMPORT_SOURCE,
            Self::Vcard => VCARD_IMPORT_SOURCE,
        }
    }
}

/// Counters for one import batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub duplicates: usize,
    pub errors: usize,
}

#[derive(Debug, Default, Deserialize)]
struct ImportedContact {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    position: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    telegram: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

/// One CSV row; `tags` is a comma-separated cell.
#[derive(Debug, Deserialize)]
struct CsvContact {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    position: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    telegram: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    tags: Option<String>,
}

impl From<CsvContact> for ImportedContact {
    fn from(row: CsvContact) -> Self {
        let tags = row
            .tags
            .map(|cell| cell.split(',').map(|tag| tag.trim().to_string()).collect())
            .unwrap_or_default();
        Self {
            name: row.name,
            company: row.company,
            position: row.position,
            email: row.email,
            telegram: row.telegram,
            phone: row.phone,
            tags,
        }
    }
}

impl ImportedContact {
    fn into_draft(self, source: &str) -> ContactDraft {
        let name = blank_to_none(self.name).unwrap_or_else(|| UNNAMED_CONTACT.to_string());
        let mut draft = ContactDraft::new(name);
        draft.company = blank_to_none(self.company);
        draft.position = blank_to_none(self.position);
        draft.email = blank_to_none(self.email);
        draft.telegram = blank_to_none(self.telegram);
        draft.phone = blank_to_none(self.phone);
        draft.tags = self
            .tags
            .into_iter()
            .filter(|tag| !tag.trim().is_empty())
            .collect();
        draft.source = Some(source.to_string());
        draft
    }
}

/// Parses `content` in the given format.
pub fn parse_contacts(format: ImportFormat, content: &str) -> Result<Vec<ContactDraft>, ImportError> {
    match format {
        ImportFormat::Json => parse_json_contacts(content),
        ImportFormat::Csv => parse_csv_contacts(content),
        ImportFormat::Vcard => Ok(parse_vcard_contacts(content)),
    }
}

/// Parses a JSON array of contact objects.
pub fn parse_json_contacts(content: &str) -> Result<Vec<ContactDraft>, ImportError> {
    let records: Vec<ImportedContact> = serde_json::from_str(content)?;
    Ok(records
        .into_iter()
        .map(|record| record.into_draft(JSON_IMPORT_SOURCE))
        .collect())
}

/// Parses CSV with a header row naming `name, company, position, email,
/// telegram, phone, tags` in any order and case. Unknown columns are ignored.
pub fn parse_csv_contacts(content: &str) -> Result<Vec<ContactDraft>, ImportError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());
    let headers: csv::StringRecord = reader.headers()?.iter().map(str::to_lowercase).collect();
    reader.set_headers(headers);

    let mut drafts = Vec::new();
    for row in reader.deserialize::<CsvContact>() {
        drafts.push(ImportedContact::from(row?).into_draft(CSV_IMPORT_SOURCE));
    }
    Ok(drafts)
}

/// Parses every `BEGIN:VCARD` .. `END:VCARD` block.
///
/// Reads FN, EMAIL, TEL, ORG (first component) and TITLE; the first
/// occurrence of each property wins. Folded lines are joined.
pub fn parse_vcard_contacts(content: &str) -> Vec<ContactDraft> {
    let mut drafts = Vec::new();
    let mut current: Option<ImportedContact> = None;

    for line in unfold_vcard_lines(content) {
        let Some((head, value)) = line.split_once(':') else {
            continue;
        };
        let property = head
            .split(';')
            .next()
            .unwrap_or_default()
            .rsplit('.')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_uppercase();
        let value = value.trim();

        match property.as_str() {
            "BEGIN" if value.eq_ignore_ascii_case("VCARD") => {
                current = Some(ImportedContact::default());
            }
            "END" if value.eq_ignore_ascii_case("VCARD") => {
                if let Some(card) = current.take() {
                    drafts.push(card.into_draft(VCARD_IMPORT_SOURCE));
                }
            }
            _ => {
                let Some(card) = current.as_mut() else {
                    continue;
                };
                let slot = match property.as_str() {
                    "FN" => &mut card.name,
                    "EMAIL" => &mut card.email,
                    "TEL" => &mut card.phone,
                    "ORG" => &mut card.company,
                    "TITLE" => &mut card.position,
                    _ => continue,
                };
                if slot.is_none() {
                    let text = if property == "ORG" {
                        value.split(';').next().unwrap_or_default()
                    } else {
                        value
                    };
                    *slot = Some(unescape_vcard(text));
                }
            }
        }
    }

    drafts
}

fn unfold_vcard_lines(content: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in content.lines() {
        if let Some(continuation) = raw.strip_prefix([' ', '\t']) {
            if let Some(last) = lines.last_mut() {
                last.push_str(continuation);
                continue;
            }
        }
        lines.push(raw.to_string());
    }
    lines
}

fn unescape_vcard(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push(' '),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out.trim().to_string()
}

/// Import use-case service.
pub struct ImportService<C: ContactRepository> {
    contacts: C,
}

impl<C: ContactRepository> ImportService<C> {
    pub fn new(contacts: C) -> Self {
        Self { contacts }
    }

    /// Inserts every draft not already known by email or telegram.
    pub fn import(&self, drafts: &[ContactDraft]) -> ImportReport {
        let mut report = ImportReport::default();
        for draft in drafts {
            match self.import_one(draft) {
                Ok(true) => report.imported += 1,
                Ok(false) => report.duplicates += 1,
                Err(err) => {
                    report.errors += 1;
                    warn!(
                        "event=contact_import module=import status=row_error contact_id={} error={}",
                        draft.id, err
                    );
                }
            }
        }
        info!(
            "event=contact_import module=import status=ok imported={} duplicates={} errors={}",
            report.imported, report.duplicates, report.errors
        );
        report
    }

    fn import_one(&self, draft: &ContactDraft) -> RepoResult<bool> {
        if let Some(email) = draft.email.as_deref() {
            if self.contacts.find_by_email(email)?.is_some() {
                return Ok(false);
            }
        }
        if let Some(handle) = draft.telegram.as_deref() {
            if self.contacts.find_by_telegram(handle)?.is_some() {
                return Ok(false);
            }
        }
        self.contacts.create_contact(draft)?;
        Ok(true)
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}
