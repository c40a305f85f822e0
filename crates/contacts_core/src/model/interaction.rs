//! Interaction history model.
//!
//! # Invariants
//! - Every interaction is owned by exactly one live contact.
//! - `date` is an ISO `YYYY-MM-DD` calendar date.

use crate::model::contact::ContactId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for an interaction.
pub type InteractionId = Uuid;

/// Keyword-derived interaction classification used by the note flow.
///
/// Storage keeps `type` as free text, so rows written by other paths may hold
/// values outside this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Purchase,
    Meeting,
    Call,
    Email,
    Other,
}

impl InteractionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Meeting => "meeting",
            Self::Call => "call",
            Self::Email => "email",
            Self::Other => "other",
        }
    }
}

/// Persisted interaction record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: InteractionId,
    pub contact_id: ContactId,
    pub date: String,
    /// Serialized as `type` to match storage naming.
    #[serde(rename = "type")]
    pub kind: String,
    pub note: Option<String>,
    pub amount: Option<f64>,
    /// Epoch milliseconds.
    pub created_at: i64,
}

/// Input model for recording one interaction.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionDraft {
    pub id: InteractionId,
    pub contact_id: ContactId,
    /// `None` stores the current date.
    pub date: Option<String>,
    pub kind: String,
    pub note: Option<String>,
    pub amount: Option<f64>,
}

impl InteractionDraft {
    pub fn new(contact_id: ContactId, kind: InteractionKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            contact_id,
            date: None,
            kind: kind.as_str().to_string(),
            note: None,
            amount: None,
        }
    }
}
