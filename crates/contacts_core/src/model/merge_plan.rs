//! Pure merge rules: master selection and field reconciliation.
//!
//! # Responsibility
//! - Rank name-matched candidates and split them into master + duplicates.
//! - Compute the reconciled master record from master + duplicates.
//!
//! # Invariants
//! - Candidates are processed in ascending `id` order; selection and every
//!   order-sensitive reconciliation rule depend on it.
//! - Ties on completeness score resolve to the lowest `id`.
//! - Reconciled channels hold at most [`MAX_CHANNEL_VALUES`] values each.
//! - Non-empty scalar fields on the master are never overwritten.
//!
//! Nothing here touches storage; `repo::merge_repo` runs these rules inside
//! the locked transaction.

use crate::model::contact::{has_value, Contact, MAX_CHANNEL_VALUES};

/// Master/duplicate split for one merge invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    pub master: Contact,
    /// Remaining candidates in ascending `id` order.
    pub duplicates: Vec<Contact>,
}

/// Master record after folding in every duplicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub contact: Contact,
    /// Unique phone values that did not fit into the two phone slots.
    pub dropped_phones: Vec<String>,
    /// Unique email values that did not fit into the two email slots.
    pub dropped_emails: Vec<String>,
}

/// Picks the master among `candidates`.
///
/// Returns `None` when there are no candidates.
pub fn select_master(mut candidates: Vec<Contact>) -> Option<MergePlan> {
    candidates.sort_by(|left, right| left.id.cmp(&right.id));

    let mut best_index = None;
    let mut best_score = 0;
    for (index, candidate) in candidates.iter().enumerate() {
        let score = candidate.completeness_score();
        // Strict comparison keeps the earliest (lowest id) candidate on ties.
        if best_index.is_none() || score > best_score {
            best_index = Some(index);
            best_score = score;
        }
    }

    let master = candidates.remove(best_index?);
    Some(MergePlan {
        master,
        duplicates: candidates,
    })
}

/// Folds every duplicate into the master.
///
/// Rules:
/// - phone/email: master values first, then each duplicate's primary and
///   secondary value when not already present (exact match), up to two.
/// - tags: order-preserving set union, blank tags discarded.
/// - company/position/telegram/bio: fill-if-empty, first duplicate wins.
///   `bio_source` is copied together with `bio`.
pub fn reconcile(master: &Contact, duplicates: &[Contact]) -> Reconciled {
    let mut contact = master.clone();

    let (phone, phone2, dropped_phones) = merge_channel(
        master.phones(),
        duplicates.iter().flat_map(|duplicate| duplicate.phones()),
    );
    contact.phone = phone;
    contact.phone2 = phone2;

    let (email, email2, dropped_emails) = merge_channel(
        master.emails(),
        duplicates.iter().flat_map(|duplicate| duplicate.emails()),
    );
    contact.email = email;
    contact.email2 = email2;

    contact.tags = union_tags(
        std::iter::once(master.tags.as_slice())
            .chain(duplicates.iter().map(|duplicate| duplicate.tags.as_slice())),
    );

    for duplicate in duplicates {
        fill_if_empty(&mut contact.company, &duplicate.company);
        fill_if_empty(&mut contact.position, &duplicate.position);
        fill_if_empty(&mut contact.telegram, &duplicate.telegram);
        if !has_value(&contact.bio) && has_value(&duplicate.bio) {
            contact.bio = duplicate.bio.clone();
            contact.bio_source = duplicate.bio_source.clone();
        }
    }

    Reconciled {
        contact,
        dropped_phones,
        dropped_emails,
    }
}

fn merge_channel<'a>(
    existing: Vec<&'a str>,
    incoming: impl Iterator<Item = &'a str>,
) -> (Option<String>, Option<String>, Vec<String>) {
    let mut kept: Vec<&str> = existing;
    let mut dropped: Vec<String> = Vec::new();

    for value in incoming {
        if kept.contains(&value) || dropped.iter().any(|item| item == value) {
            continue;
        }
        if kept.len() < MAX_CHANNEL_VALUES {
            kept.push(value);
        } else {
            dropped.push(value.to_string());
        }
    }

    let mut slots = kept.into_iter().map(str::to_string);
    (slots.next(), slots.next(), dropped)
}

fn union_tags<'a>(collections: impl Iterator<Item = &'a [String]>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for collection in collections {
        for tag in collection {
            let trimmed = tag.trim();
            if trimmed.is_empty() || tags.iter().any(|existing| existing == trimmed) {
                continue;
            }
            tags.push(trimmed.to_string());
        }
    }
    tags
}

fn fill_if_empty(target: &mut Option<String>, candidate: &Option<String>) {
    if !has_value(target) && has_value(candidate) {
        *target = candidate.clone();
    }
}
