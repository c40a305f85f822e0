//! Contact domain model.
//!
//! # Responsibility
//! - Define the canonical contact record and its creation draft.
//! - Own the name-key normalization and completeness scoring used by merge.
//!
//! # Invariants
//! - `id` is stable and never reused for another contact.
//! - At most two values are kept per channel (`phone`/`phone2`,
//!   `email`/`email2`); a secondary value implies a primary value.
//! - `name` is never blank.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for a contact.
pub type ContactId = Uuid;

/// Maximum number of values stored per multi-valued channel.
pub const MAX_CHANNEL_VALUES: usize = 2;

/// Provenance used when a contact is created without an explicit source.
pub const DEFAULT_SOURCE: &str = "manual";

/// Multi-valued contact channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Phone,
    Email,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Phone => "phone",
            Self::Email => "email",
        }
    }
}

/// Validation failures for contact drafts and persisted rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactValidationError {
    /// Name is empty or whitespace only.
    BlankName,
    /// Secondary channel value is set while the primary one is empty.
    SecondaryWithoutPrimary(Channel),
}

impl Display for ContactValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "contact name cannot be blank"),
            Self::SecondaryWithoutPrimary(channel) => write!(
                f,
                "secondary {} is set but primary {} is empty",
                channel.as_str(),
                channel.as_str()
            ),
        }
    }
}

impl Error for ContactValidationError {}

/// Persisted contact record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub name: String,
    pub company: Option<String>,
    pub position: Option<String>,
    /// Ordered tag collection; treated as a set by merge.
    pub tags: Vec<String>,
    pub bio: Option<String>,
    /// Where `bio` came from. Travels together with `bio` during merge.
    pub bio_source: Option<String>,
    /// Messaging handle, usually `@name`.
    pub telegram: Option<String>,
    pub email: Option<String>,
    pub email2: Option<String>,
    pub phone: Option<String>,
    pub phone2: Option<String>,
    /// How the record was created (`manual`, `quick_add`, `import_json`, ...).
    pub source: String,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds.
    pub updated_at: i64,
}

impl Contact {
    /// Ranks how complete this record is.
    ///
    /// Telegram and email are worth 2 points, phone, company and bio 1 point
    /// each. Blank strings count as absent.
    pub fn completeness_score(&self) -> u32 {
        let mut score = 0;
        if has_value(&self.telegram) {
            score += 2;
        }
        if has_value(&self.email) {
            score += 2;
        }
        if has_value(&self.phone) {
            score += 1;
        }
        if has_value(&self.company) {
            score += 1;
        }
        if has_value(&self.bio) {
            score += 1;
        }
        score
    }

    /// Non-empty phone values in primary, secondary order.
    pub fn phones(&self) -> Vec<&str> {
        channel_values(&self.phone, &self.phone2)
    }

    /// Non-empty email values in primary, secondary order.
    pub fn emails(&self) -> Vec<&str> {
        channel_values(&self.email, &self.email2)
    }

    /// Moves a lone secondary phone or email into the empty primary slot.
    ///
    /// Rows written outside this crate may fill only the secondary column.
    pub fn pack_channel_slots(&mut self) {
        pack_slots(&mut self.phone, &mut self.phone2);
        pack_slots(&mut self.email, &mut self.email2);
    }

    /// Key used for case-insensitive name matching.
    pub fn name_key(&self) -> String {
        normalize_name_key(&self.name)
    }

    pub fn validate(&self) -> Result<(), ContactValidationError> {
        validate_fields(
            &self.name,
            [
                (Channel::Phone, &self.phone, &self.phone2),
                (Channel::Email, &self.email, &self.email2),
            ],
        )
    }
}

/// Input model for creating one contact.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContactDraft {
    /// Identity assigned on insert.
    pub id: ContactId,
    pub name: String,
    pub company: Option<String>,
    pub position: Option<String>,
    pub tags: Vec<String>,
    pub bio: Option<String>,
    pub bio_source: Option<String>,
    pub telegram: Option<String>,
    pub email: Option<String>,
    pub email2: Option<String>,
    pub phone: Option<String>,
    pub phone2: Option<String>,
    /// `None` stores [`DEFAULT_SOURCE`].
    pub source: Option<String>,
}

impl ContactDraft {
    /// Creates a draft with a generated stable ID and all optional fields empty.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), name)
    }

    /// Creates a draft with a caller-provided ID.
    ///
    /// Used by import paths and tests that need a known identity order.
    pub fn with_id(id: ContactId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ContactValidationError> {
        validate_fields(
            &self.name,
            [
                (Channel::Phone, &self.phone, &self.phone2),
                (Channel::Email, &self.email, &self.email2),
            ],
        )
    }
}

/// Normalizes a display name into the match key used for deduplication.
///
/// Matching is case-insensitive over the full Unicode range, so `"Иван"` and
/// `"иван"` share a key. Surrounding whitespace is ignored.
pub fn normalize_name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Returns `true` when the optional field carries a non-blank value.
pub fn has_value(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|text| !text.trim().is_empty())
}

fn channel_values<'a>(primary: &'a Option<String>, secondary: &'a Option<String>) -> Vec<&'a str> {
    [primary, secondary]
        .into_iter()
        .filter(|value| has_value(value))
        .filter_map(|value| value.as_deref())
        .collect()
}

fn pack_slots(primary: &mut Option<String>, secondary: &mut Option<String>) {
    if !has_value(primary) && has_value(secondary) {
        *primary = secondary.take();
    }
}

fn validate_fields(
    name: &str,
    channels: [(Channel, &Option<String>, &Option<String>); 2],
) -> Result<(), ContactValidationError> {
    if name.trim().is_empty() {
        return Err(ContactValidationError::BlankName);
    }
    for (channel, primary, secondary) in channels {
        if has_value(secondary) && !has_value(primary) {
            return Err(ContactValidationError::SecondaryWithoutPrimary(channel));
        }
    }
    Ok(())
}
