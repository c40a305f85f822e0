//! Interaction repository contracts and SQLite implementation.
//!
//! # Invariants
//! - Interactions are only inserted for an existing contact.
//! - Listing is deterministic: `date DESC, created_at DESC, id ASC`.

use crate::model::contact::ContactId;
use crate::model::interaction::{Interaction, InteractionDraft, InteractionId};
use crate::repo::contact_repo::{
    contact_exists, ensure_connection_ready, parse_uuid, RepoError, RepoResult,
};
use rusqlite::{params, Connection, Row};

/// Repository interface for interaction history.
pub trait InteractionRepository {
    /// Records one interaction and returns its stable id.
    fn create_interaction(&self, draft: &InteractionDraft) -> RepoResult<InteractionId>;
    /// Gets one interaction by id.
    fn get_interaction(&self, id: InteractionId) -> RepoResult<Option<Interaction>>;
    /// Lists interactions owned by one contact, newest first.
    fn list_for_contact(&self, contact_id: ContactId) -> RepoResult<Vec<Interaction>>;
    /// Counts interactions owned by any of `contact_ids`.
    fn count_for_contacts(&self, contact_ids: &[ContactId]) -> RepoResult<u64>;
}

/// SQLite-backed interaction repository.
pub struct SqliteInteractionRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteInteractionRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl InteractionRepository for SqliteInteractionRepository<'_> {
    fn create_interaction(&self, draft: &InteractionDraft) -> RepoResult<InteractionId> {
        if !contact_exists(self.conn, draft.contact_id)? {
            return Err(RepoError::NotFound(draft.contact_id));
        }

        self.conn.execute(
            "INSERT INTO interactions (id, contact_id, date, type, note, amount)
             VALUES (?1, ?2, COALESCE(?3, date('now')), ?4, ?5, ?6);",
            params![
                draft.id.to_string(),
                draft.contact_id.to_string(),
                draft.date.as_deref(),
                draft.kind.as_str(),
                draft.note.as_deref(),
                draft.amount,
            ],
        )?;

        Ok(draft.id)
    }

    fn get_interaction(&self, id: InteractionId) -> RepoResult<Option<Interaction>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, contact_id, date, type, note, amount, created_at
             FROM interactions
             WHERE id = ?1;",
        )?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_interaction_row(row)?));
        }
        Ok(None)
    }

    fn list_for_contact(&self, contact_id: ContactId) -> RepoResult<Vec<Interaction>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, contact_id, date, type, note, amount, created_at
             FROM interactions
             WHERE contact_id = ?1
             ORDER BY date DESC, created_at DESC, id ASC;",
        )?;
        let mut rows = stmt.query([contact_id.to_string()])?;
        let mut interactions = Vec::new();
        while let Some(row) = rows.next()? {
            interactions.push(parse_interaction_row(row)?);
        }
        Ok(interactions)
    }

    fn count_for_contacts(&self, contact_ids: &[ContactId]) -> RepoResult<u64> {
        let mut total = 0_u64;
        for contact_id in contact_ids {
            let count: i64 = self.conn.query_row(
                "SELECT COUNT(*) FROM interactions WHERE contact_id = ?1;",
                [contact_id.to_string()],
                |row| row.get(0),
            )?;
            total += count.max(0) as u64;
        }
        Ok(total)
    }
}

fn parse_interaction_row(row: &Row<'_>) -> RepoResult<Interaction> {
    let id_text: String = row.get("id")?;
    let contact_text: String = row.get("contact_id")?;
    Ok(Interaction {
        id: parse_uuid(&id_text, "interactions.id")?,
        contact_id: parse_uuid(&contact_text, "interactions.contact_id")?,
        date: row.get("date")?,
        kind: row.get("type")?,
        note: row.get("note")?,
        amount: row.get("amount")?,
        created_at: row.get("created_at")?,
    })
}
