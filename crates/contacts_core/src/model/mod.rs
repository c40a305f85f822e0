//! Contact domain model.
//!
//! # Responsibility
//! - Define canonical contact/interaction structures used by core logic.
//! - Hold the storage-independent merge rules.
//!
//! # Invariants
//! - Every contact is identified by a stable `ContactId`.
//! - Duplicates are hard-deleted by merge; there are no tombstones.

pub mod contact;
pub mod interaction;
pub mod merge_plan;
