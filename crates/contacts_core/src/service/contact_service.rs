//! Contact use-case service.
//!
//! # Responsibility
//! - Provide create/quick-add/find/search/stats APIs for callers.
//! - Record notes as interactions with keyword-based classification.
//!
//! # Invariants
//! - Identifier lookup order: `@handle` → telegram, contains `@` → email,
//!   otherwise case-insensitive name fragment.
//! - An amount is only extracted for purchase notes.
//! - Every write is read back; a missing row is `InconsistentState`.

use crate::model::contact::{Contact, ContactDraft, ContactId};
use crate::model::interaction::{Interaction, InteractionDraft, InteractionKind};
use crate::repo::contact_repo::{
    normalize_recent_limit, ContactRepository, ContactStats, ContactSummary, RepoError, RepoResult,
};
use crate::repo::interaction_repo::InteractionRepository;
use chrono::NaiveDate;
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Provenance stored for contacts created through [`ContactService::quick_add`].
pub const QUICK_ADD_SOURCE: &str = "quick_add";

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w.\-]+@[\w.\-]+\.\w+$").expect("valid email regex"));
static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?\d[\d\s\-()]+$").expect("valid phone regex"));
static AMOUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d[\d\s]*(?:\.\d+)?)\s*(?:₽|руб|rub|\$|usd|€|eur)?").expect("valid amount regex")
});
static ISO_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid date regex"));

const PURCHASE_KEYWORDS: &[&str] = &[
    "купил", "покупка", "оплатил", "заказал", "продал", "bought", "purchase", "paid", "ordered",
    "sold",
];
const MEETING_KEYWORDS: &[&str] = &[
    "встреча",
    "встретились",
    "кофе",
    "обед",
    "конференция",
    "meeting",
    "coffee",
    "lunch",
    "conference",
];
const CALL_KEYWORDS: &[&str] = &["звонок", "созвонились", "позвонил", "call", "phoned"];
const EMAIL_KEYWORDS: &[&str] = &["email", "e-mail", "письмо", "написал", "wrote"];

/// Service error for contact use-cases.
#[derive(Debug)]
pub enum ContactServiceError {
    /// Caller input cannot be turned into a valid request.
    InvalidInput(String),
    /// No contact matches the given identifier.
    ContactNotFound(String),
    /// Persistence-layer failure.
    Repo(RepoError),
    /// Internal consistency mismatch between write and read-back.
    InconsistentState(&'static str),
}

impl Display for ContactServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::ContactNotFound(identifier) => write!(f, "contact `{identifier}` not found"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::InconsistentState(details) => write!(f, "inconsistent contact state: {details}"),
        }
    }
}

impl Error for ContactServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ContactServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::InvalidInput(err.to_string()),
            other => Self::Repo(other),
        }
    }
}

/// Search result envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactSearchResult {
    /// First `applied_limit` matches, newest first.
    pub items: Vec<Contact>,
    /// Number of matches before the limit.
    pub total: usize,
    pub applied_limit: u32,
}

/// A note stored against a contact.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedNote {
    pub contact: Contact,
    pub interaction: Interaction,
}

/// Contact service facade over repository implementations.
pub struct ContactService<C: ContactRepository, I: InteractionRepository> {
    contacts: C,
    interactions: I,
}

impl<C: ContactRepository, I: InteractionRepository> ContactService<C, I> {
    pub fn new(contacts: C, interactions: I) -> Self {
        Self {
            contacts,
            interactions,
        }
    }

    /// Creates one contact and returns the stored record.
    pub fn create_contact(&self, draft: &ContactDraft) -> Result<Contact, ContactServiceError> {
        let id = self.contacts.create_contact(draft)?;
        self.contacts
            .get_contact(id)?
            .ok_or(ContactServiceError::InconsistentState(
                "created contact not found in read-back",
            ))
    }

    /// Creates a contact from one comma-separated line.
    ///
    /// Format: `Name, Company, Position, extra...` where each extra part is
    /// classified as `@telegram`, email or phone. Unrecognized extras are
    /// ignored.
    pub fn quick_add(&self, input: &str) -> Result<Contact, ContactServiceError> {
        let draft = parse_contact_line(input).ok_or_else(|| {
            ContactServiceError::InvalidInput("contact line must start with a name".to_string())
        })?;
        let contact = self.create_contact(&draft)?;
        info!(
            "event=contact_create module=contacts status=ok source={} contact_id={}",
            QUICK_ADD_SOURCE, contact.id
        );
        Ok(contact)
    }

    /// Resolves an identifier to one contact.
    pub fn find_contact(&self, identifier: &str) -> RepoResult<Option<Contact>> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Ok(None);
        }
        if identifier.starts_with('@') {
            self.contacts.find_by_telegram(identifier)
        } else if identifier.contains('@') {
            self.contacts.find_by_email(identifier)
        } else {
            self.contacts.find_by_name_fragment(identifier)
        }
    }

    /// Stores a free-text note as an interaction of the identified contact.
    ///
    /// `date` must be `YYYY-MM-DD`; `None` uses the current date.
    pub fn add_note(
        &self,
        identifier: &str,
        note: &str,
        date: Option<&str>,
    ) -> Result<RecordedNote, ContactServiceError> {
        let note = note.trim();
        if note.is_empty() {
            return Err(ContactServiceError::InvalidInput(
                "note text cannot be empty".to_string(),
            ));
        }
        if let Some(value) = date {
            if !is_calendar_date(value) {
                return Err(ContactServiceError::InvalidInput(format!(
                    "date `{value}` must be YYYY-MM-DD"
                )));
            }
        }

        let contact = self
            .find_contact(identifier)?
            .ok_or_else(|| ContactServiceError::ContactNotFound(identifier.to_string()))?;

        let kind = classify_interaction(note);
        let mut draft = InteractionDraft::new(contact.id, kind);
        draft.note = Some(note.to_string());
        draft.date = date.map(str::to_string);
        if kind == InteractionKind::Purchase {
            draft.amount = extract_amount(note);
        }

        let interaction_id = self.interactions.create_interaction(&draft)?;
        let interaction = self
            .interactions
            .get_interaction(interaction_id)?
            .ok_or(ContactServiceError::InconsistentState(
                "recorded interaction not found in read-back",
            ))?;
        info!(
            "event=note_add module=contacts status=ok contact_id={} kind={}",
            contact.id,
            kind.as_str()
        );

        Ok(RecordedNote {
            contact,
            interaction,
        })
    }

    /// Substring search over name, company and tags.
    pub fn search(
        &self,
        query: &str,
        limit: Option<u32>,
    ) -> Result<ContactSearchResult, ContactServiceError> {
        if query.trim().is_empty() {
            return Err(ContactServiceError::InvalidInput(
                "search query cannot be empty".to_string(),
            ));
        }
        let applied_limit = normalize_recent_limit(limit);
        let mut items = self.contacts.search(query)?;
        let total = items.len();
        items.truncate(applied_limit as usize);
        Ok(ContactSearchResult {
            items,
            total,
            applied_limit,
        })
    }

    /// Most recently created contacts.
    pub fn list_recent(&self, limit: Option<u32>) -> RepoResult<Vec<Contact>> {
        self.contacts.list_recent(limit)
    }

    /// Every contact sharing the case-insensitive name key.
    pub fn contacts_named(&self, name: &str) -> RepoResult<Vec<Contact>> {
        self.contacts.list_by_name(name)
    }

    pub fn get_contact(&self, id: ContactId) -> RepoResult<Option<Contact>> {
        self.contacts.get_contact(id)
    }

    pub fn summary(&self, id: ContactId) -> RepoResult<Option<ContactSummary>> {
        self.contacts.get_summary(id)
    }

    pub fn interactions(&self, contact_id: ContactId) -> RepoResult<Vec<Interaction>> {
        self.interactions.list_for_contact(contact_id)
    }

    pub fn stats(&self) -> RepoResult<ContactStats> {
        self.contacts.stats()
    }
}

/// Parses a quick-add line into a draft. Returns `None` without a name.
pub fn parse_contact_line(input: &str) -> Option<ContactDraft> {
    let parts: Vec<&str> = input.split(',').map(str::trim).collect();
    let name = parts.first().filter(|value| !value.is_empty())?;

    let mut draft = ContactDraft::new(*name);
    draft.company = non_empty(parts.get(1).copied());
    draft.position = non_empty(parts.get(2).copied());
    draft.source = Some(QUICK_ADD_SOURCE.to_string());

    for part in parts.iter().skip(3) {
        if part.starts_with('@') && part.len() > 1 {
            draft.telegram = Some((*part).to_string());
        } else if EMAIL_RE.is_match(part) {
            draft.email = Some((*part).to_string());
        } else if PHONE_RE.is_match(part) {
            draft.phone = Some((*part).to_string());
        }
    }

    Some(draft)
}

/// Classifies a note by keyword, first matching category wins.
pub fn classify_interaction(note: &str) -> InteractionKind {
    let lowered = note.to_lowercase();
    let mentions = |keywords: &[&str]| keywords.iter().any(|word| lowered.contains(word));

    if mentions(PURCHASE_KEYWORDS) {
        InteractionKind::Purchase
    } else if mentions(MEETING_KEYWORDS) {
        InteractionKind::Meeting
    } else if mentions(CALL_KEYWORDS) {
        InteractionKind::Call
    } else if mentions(EMAIL_KEYWORDS) {
        InteractionKind::Email
    } else {
        InteractionKind::Other
    }
}

/// Extracts the first monetary-looking number from a note.
///
/// Decimal commas are accepted; thousands separators written as spaces are
/// collapsed (`"15 000₽"` → `15000.0`).
pub fn extract_amount(note: &str) -> Option<f64> {
    let normalized = note.replace(',', ".");
    let captures = AMOUNT_RE.captures(&normalized)?;
    let digits: String = captures
        .get(1)?
        .as_str()
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .collect();
    digits.parse().ok()
}

/// `YYYY-MM-DD` naming a real calendar day.
fn is_calendar_date(value: &str) -> bool {
    ISO_DATE_RE.is_match(value) && NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}
