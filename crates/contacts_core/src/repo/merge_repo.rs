//! Transactional name-based contact merge.
//!
//! # Responsibility
//! - Lock, select, reconcile, relink and purge in one write transaction.
//!
//! # Invariants
//! - The write lock (`BEGIN IMMEDIATE`) is taken before any candidate row is
//!   read, so a concurrent merge on the same key waits and then sees the
//!   committed result.
//! - Candidates are read and processed in ascending `id` order.
//! - The master's `updated_at` (epoch ms) strictly increases on every merge.
//! - Per duplicate, interactions are relinked before the contact row is
//!   deleted; no interaction is ever orphaned.
//! - Any error drops the transaction uncommitted, which rolls back every
//!   field write, relink and delete.

use crate::model::contact::{normalize_name_key, Contact, ContactId};
use crate::model::merge_plan::{reconcile, select_master};
use crate::repo::contact_repo::{
    encode_tags, ensure_connection_ready, load_contact, load_contacts_by_name_key, RepoError,
    RepoResult,
};
use log::debug;
use rusqlite::{params, Connection, Transaction, TransactionBehavior};

/// Storage-level description of one committed merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    /// Master record as committed.
    pub master: Contact,
    /// Deleted duplicates in processing order.
    pub duplicate_ids: Vec<ContactId>,
    /// Interactions moved from duplicates to the master.
    pub relinked_interactions: u64,
    /// Unique phone values that did not fit the two phone slots.
    pub dropped_phones: Vec<String>,
    /// Unique email values that did not fit the two email slots.
    pub dropped_emails: Vec<String>,
}

impl MergeReport {
    pub fn deleted_count(&self) -> usize {
        self.duplicate_ids.len()
    }
}

/// Outcome of one merge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No contact matches the name key; nothing was written.
    NoMatch,
    Merged(MergeReport),
}

/// Repository interface for the merge unit of work.
pub trait MergeRepository {
    /// Merges every contact whose name matches `name` case-insensitively.
    fn merge_by_name(&self, name: &str) -> RepoResult<MergeOutcome>;
}

/// SQLite-backed merge repository.
pub struct SqliteMergeRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteMergeRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl MergeRepository for SqliteMergeRepository<'_> {
    fn merge_by_name(&self, name: &str) -> RepoResult<MergeOutcome> {
        let name_key = normalize_name_key(name);
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let candidates = load_contacts_by_name_key(&tx, &name_key)?;
        let Some(plan) = select_master(candidates) else {
            tx.rollback()?;
            return Ok(MergeOutcome::NoMatch);
        };
        debug!(
            "event=contact_merge module=merge status=locked candidates={}",
            plan.duplicates.len() + 1
        );

        let reconciled = reconcile(&plan.master, &plan.duplicates);
        write_master(&tx, &reconciled.contact)?;

        let mut relinked_interactions = 0_u64;
        let mut duplicate_ids = Vec::with_capacity(plan.duplicates.len());
        for duplicate in &plan.duplicates {
            relinked_interactions += relink_interactions(&tx, duplicate.id, plan.master.id)?;
            delete_contact(&tx, duplicate.id)?;
            duplicate_ids.push(duplicate.id);
        }

        let master = load_contact(&tx, plan.master.id)?
            .ok_or(RepoError::NotFound(plan.master.id))?;
        tx.commit()?;

        Ok(MergeOutcome::Merged(MergeReport {
            master,
            duplicate_ids,
            relinked_interactions,
            dropped_phones: reconciled.dropped_phones,
            dropped_emails: reconciled.dropped_emails,
        }))
    }
}

fn write_master(tx: &Transaction<'_>, contact: &Contact) -> RepoResult<()> {
    let changed = tx.execute(
        "UPDATE contacts
         SET
            company = ?2,
            position = ?3,
            tags = ?4,
            bio = ?5,
            bio_source = ?6,
            telegram = ?7,
            email = ?8,
            email2 = ?9,
            phone = ?10,
            phone2 = ?11,
            updated_at = MAX(CAST(unixepoch('subsec') * 1000 AS INTEGER), updated_at + 1)
         WHERE id = ?1;",
        params![
            contact.id.to_string(),
            contact.company.as_deref(),
            contact.position.as_deref(),
            encode_tags(&contact.tags)?,
            contact.bio.as_deref(),
            contact.bio_source.as_deref(),
            contact.telegram.as_deref(),
            contact.email.as_deref(),
            contact.email2.as_deref(),
            contact.phone.as_deref(),
            contact.phone2.as_deref(),
        ],
    )?;

    if changed == 0 {
        return Err(RepoError::NotFound(contact.id));
    }
    Ok(())
}

fn relink_interactions(
    tx: &Transaction<'_>,
    from: ContactId,
    to: ContactId,
) -> RepoResult<u64> {
    let moved = tx.execute(
        "UPDATE interactions SET contact_id = ?2 WHERE contact_id = ?1;",
        params![from.to_string(), to.to_string()],
    )?;
    Ok(moved as u64)
}

fn delete_contact(tx: &Transaction<'_>, id: ContactId) -> RepoResult<()> {
    let deleted = tx.execute("DELETE FROM contacts WHERE id = ?1;", [id.to_string()])?;
    if deleted == 0 {
        return Err(RepoError::NotFound(id));
    }
    Ok(())
}
