//! Contact repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide create/read/search APIs over canonical `contacts` storage.
//! - Read the `contact_summary` view and aggregate statistics.
//! - Keep SQL details inside core persistence boundary.
//!
//! # Invariants
//! - Write paths call `ContactDraft::validate()` before SQL mutations.
//! - `name_key` is always written from `normalize_name_key(name)`.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::contact::{
    normalize_name_key, Contact, ContactDraft, ContactId, ContactValidationError, DEFAULT_SOURCE,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub(crate) const CONTACT_SELECT_SQL: &str = "SELECT
    id,
    name,
    company,
    position,
    tags,
    bio,
    bio_source,
    telegram,
    email,
    email2,
    phone,
    phone2,
    source,
    created_at,
    updated_at
FROM contacts";

const RECENT_DEFAULT_LIMIT: u32 = 10;
const RECENT_LIMIT_MAX: u32 = 50;

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for contact/interaction persistence.
#[derive(Debug)]
pub enum RepoError {
    Validation(ContactValidationError),
    Db(DbError),
    NotFound(ContactId),
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "contact not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted contact data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "contacts repository requires schema version {expected_version}, got {actual_version}"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) => None,
            Self::InvalidData(_) => None,
            Self::UninitializedConnection { .. } => None,
        }
    }
}

impl From<ContactValidationError> for RepoError {
    fn from(value: ContactValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl RepoError {
    /// Returns the SQLite primary error code when this error came from the
    /// storage engine.
    pub fn sqlite_code(&self) -> Option<rusqlite::ErrorCode> {
        match self {
            Self::Db(DbError::Sqlite(rusqlite::Error::SqliteFailure(err, _))) => Some(err.code),
            _ => None,
        }
    }
}

/// Read model of the `contact_summary` view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactSummary {
    pub id: ContactId,
    pub name: String,
    pub company: Option<String>,
    pub position: Option<String>,
    pub tags: Vec<String>,
    pub telegram: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub interaction_count: u64,
    /// ISO date of the latest interaction, if any.
    pub last_interaction_date: Option<String>,
}

/// Aggregate counters over the whole store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactStats {
    pub total_contacts: u64,
    pub total_interactions: u64,
    pub unique_tags: u64,
}

impl ContactStats {
    /// Average interactions per contact; `None` on an empty store.
    pub fn average_interactions(&self) -> Option<f64> {
        if self.total_contacts == 0 {
            None
        } else {
            Some(self.total_interactions as f64 / self.total_contacts as f64)
        }
    }
}

/// Repository interface for contact operations.
pub trait ContactRepository {
    /// Inserts one contact and returns its stable id.
    fn create_contact(&self, draft: &ContactDraft) -> RepoResult<ContactId>;
    /// Gets one contact by id.
    fn get_contact(&self, id: ContactId) -> RepoResult<Option<Contact>>;
    /// Lists all contacts sharing the case-insensitive name key, by id.
    fn list_by_name(&self, name: &str) -> RepoResult<Vec<Contact>>;
    /// First contact whose telegram handle matches exactly.
    fn find_by_telegram(&self, handle: &str) -> RepoResult<Option<Contact>>;
    /// First contact whose primary or secondary email matches exactly.
    fn find_by_email(&self, email: &str) -> RepoResult<Option<Contact>>;
    /// First contact whose name contains `fragment`, case-insensitively.
    fn find_by_name_fragment(&self, fragment: &str) -> RepoResult<Option<Contact>>;
    /// Most recently created contacts. Limit defaults to 10 and clamps to 50.
    fn list_recent(&self, limit: Option<u32>) -> RepoResult<Vec<Contact>>;
    /// Contacts whose name, company or tags contain `needle`, case-insensitively.
    fn search(&self, needle: &str) -> RepoResult<Vec<Contact>>;
    /// Reads one row of the `contact_summary` view.
    fn get_summary(&self, id: ContactId) -> RepoResult<Option<ContactSummary>>;
    /// Store-wide counters.
    fn stats(&self) -> RepoResult<ContactStats>;
}

/// SQLite-backed contact repository.
pub struct SqliteContactRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteContactRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl ContactRepository for SqliteContactRepository<'_> {
    fn create_contact(&self, draft: &ContactDraft) -> RepoResult<ContactId> {
        draft.validate()?;

        self.conn.execute(
            "INSERT INTO contacts (
                id,
                name,
                name_key,
                company,
                position,
                tags,
                bio,
                bio_source,
                telegram,
                email,
                email2,
                phone,
                phone2,
                source
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14);",
            params![
                draft.id.to_string(),
                draft.name.trim(),
                normalize_name_key(&draft.name),
                draft.company.as_deref(),
                draft.position.as_deref(),
                encode_tags(&draft.tags)?,
                draft.bio.as_deref(),
                draft.bio_source.as_deref(),
                draft.telegram.as_deref(),
                draft.email.as_deref(),
                draft.email2.as_deref(),
                draft.phone.as_deref(),
                draft.phone2.as_deref(),
                draft.source.as_deref().unwrap_or(DEFAULT_SOURCE),
            ],
        )?;

        Ok(draft.id)
    }

    fn get_contact(&self, id: ContactId) -> RepoResult<Option<Contact>> {
        load_contact(self.conn, id)
    }

    fn list_by_name(&self, name: &str) -> RepoResult<Vec<Contact>> {
        load_contacts_by_name_key(self.conn, &normalize_name_key(name))
    }

    fn find_by_telegram(&self, handle: &str) -> RepoResult<Option<Contact>> {
        self.query_first(
            &format!("{CONTACT_SELECT_SQL} WHERE telegram = ?1 ORDER BY created_at ASC, id ASC LIMIT 1;"),
            handle,
        )
    }

    fn find_by_email(&self, email: &str) -> RepoResult<Option<Contact>> {
        self.query_first(
            &format!(
                "{CONTACT_SELECT_SQL}
                 WHERE email = ?1 OR email2 = ?1
                 ORDER BY created_at ASC, id ASC
                 LIMIT 1;"
            ),
            email,
        )
    }

    fn find_by_name_fragment(&self, fragment: &str) -> RepoResult<Option<Contact>> {
        let needle = normalize_name_key(fragment);
        if needle.is_empty() {
            return Ok(None);
        }
        self.query_first(
            &format!(
                "{CONTACT_SELECT_SQL}
                 WHERE instr(name_key, ?1) > 0
                 ORDER BY created_at ASC, id ASC
                 LIMIT 1;"
            ),
            &needle,
        )
    }

    fn list_recent(&self, limit: Option<u32>) -> RepoResult<Vec<Contact>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CONTACT_SELECT_SQL} ORDER BY created_at DESC, id ASC LIMIT ?1;"
        ))?;
        let mut rows = stmt.query([i64::from(normalize_recent_limit(limit))])?;
        let mut contacts = Vec::new();
        while let Some(row) = rows.next()? {
            contacts.push(parse_contact_row(row)?);
        }
        Ok(contacts)
    }

    fn search(&self, needle: &str) -> RepoResult<Vec<Contact>> {
        let needle = needle.trim().to_lowercase();
        let mut stmt = self.conn.prepare(&format!(
            "{CONTACT_SELECT_SQL} ORDER BY created_at DESC, id ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut matches = Vec::new();
        // SQLite `lower()` only folds ASCII, so matching happens here.
        while let Some(row) = rows.next()? {
            let contact = parse_contact_row(row)?;
            if contact_matches(&contact, &needle) {
                matches.push(contact);
            }
        }
        Ok(matches)
    }

    fn get_summary(&self, id: ContactId) -> RepoResult<Option<ContactSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                id,
                name,
                company,
                position,
                tags,
                telegram,
                email,
                phone,
                interaction_count,
                last_interaction_date
             FROM contact_summary
             WHERE id = ?1;",
        )?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_summary_row(row)?));
        }
        Ok(None)
    }

    fn stats(&self) -> RepoResult<ContactStats> {
        let total_contacts: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM contacts;", [], |row| row.get(0))?;
        let total_interactions: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM interactions;", [], |row| row.get(0))?;

        let mut stmt = self.conn.prepare("SELECT tags FROM contacts;")?;
        let mut rows = stmt.query([])?;
        let mut unique = BTreeSet::new();
        while let Some(row) = rows.next()? {
            let raw: String = row.get(0)?;
            unique.extend(decode_tags(&raw)?);
        }

        Ok(ContactStats {
            total_contacts: total_contacts.max(0) as u64,
            total_interactions: total_interactions.max(0) as u64,
            unique_tags: unique.len() as u64,
        })
    }
}

impl SqliteContactRepository<'_> {
    fn query_first(&self, sql: &str, value: &str) -> RepoResult<Option<Contact>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([value])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_contact_row(row)?));
        }
        Ok(None)
    }
}

/// Normalizes recent-list limit: defaults to 10 and clamps to 50.
pub fn normalize_recent_limit(limit: Option<u32>) -> u32 {
    match limit {
        Some(0) | None => RECENT_DEFAULT_LIMIT,
        Some(value) if value > RECENT_LIMIT_MAX => RECENT_LIMIT_MAX,
        Some(value) => value,
    }
}

pub(crate) fn load_contact(conn: &Connection, id: ContactId) -> RepoResult<Option<Contact>> {
    let mut stmt = conn.prepare(&format!("{CONTACT_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_contact_row(row)?));
    }
    Ok(None)
}

pub(crate) fn load_contacts_by_name_key(
    conn: &Connection,
    name_key: &str,
) -> RepoResult<Vec<Contact>> {
    let mut stmt = conn.prepare(&format!(
        "{CONTACT_SELECT_SQL} WHERE name_key = ?1 ORDER BY id ASC;"
    ))?;
    let mut rows = stmt.query([name_key])?;
    let mut contacts = Vec::new();
    while let Some(row) = rows.next()? {
        contacts.push(parse_contact_row(row)?);
    }
    Ok(contacts)
}

pub(crate) fn parse_contact_row(row: &Row<'_>) -> RepoResult<Contact> {
    let id_text: String = row.get("id")?;
    let tags_text: String = row.get("tags")?;

    let mut contact = Contact {
        id: parse_uuid(&id_text, "contacts.id")?,
        name: row.get("name")?,
        company: row.get("company")?,
        position: row.get("position")?,
        tags: decode_tags(&tags_text)?,
        bio: row.get("bio")?,
        bio_source: row.get("bio_source")?,
        telegram: row.get("telegram")?,
        email: row.get("email")?,
        email2: row.get("email2")?,
        phone: row.get("phone")?,
        phone2: row.get("phone2")?,
        source: row.get("source")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };
    contact.pack_channel_slots();
    contact.validate()?;
    Ok(contact)
}

fn parse_summary_row(row: &Row<'_>) -> RepoResult<ContactSummary> {
    let id_text: String = row.get("id")?;
    let tags_text: String = row.get("tags")?;
    let interaction_count: i64 = row.get("interaction_count")?;

    Ok(ContactSummary {
        id: parse_uuid(&id_text, "contact_summary.id")?,
        name: row.get("name")?,
        company: row.get("company")?,
        position: row.get("position")?,
        tags: decode_tags(&tags_text)?,
        telegram: row.get("telegram")?,
        email: row.get("email")?,
        phone: row.get("phone")?,
        interaction_count: interaction_count.max(0) as u64,
        last_interaction_date: row.get("last_interaction_date")?,
    })
}

pub(crate) fn encode_tags(tags: &[String]) -> RepoResult<String> {
    serde_json::to_string(tags)
        .map_err(|err| RepoError::InvalidData(format!("cannot encode tags: {err}")))
}

pub(crate) fn decode_tags(value: &str) -> RepoResult<Vec<String>> {
    serde_json::from_str(value).map_err(|err| {
        RepoError::InvalidData(format!("invalid tags value `{value}` in contacts.tags: {err}"))
    })
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

pub(crate) fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }
    Ok(())
}

fn contact_matches(contact: &Contact, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    contact.name.to_lowercase().contains(needle)
        || contact
            .company
            .as_deref()
            .is_some_and(|company| company.to_lowercase().contains(needle))
        || contact
            .tags
            .iter()
            .any(|tag| tag.to_lowercase().contains(needle))
}

pub(crate) fn contact_exists(conn: &Connection, id: ContactId) -> RepoResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM contacts WHERE id = ?1;",
            [id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}
