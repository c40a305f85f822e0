//! Core domain logic for the contacts manager.
//! This crate is the single source of truth for contact invariants and the
//! name-based deduplication merge.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, CoreConfig};
pub use logging::{
    default_log_level, init_logging, init_logging_from_config, logging_status, LoggingError,
};
pub use model::contact::{
    normalize_name_key, Channel, Contact, ContactDraft, ContactId, ContactValidationError,
    MAX_CHANNEL_VALUES,
};
pub use model::interaction::{Interaction, InteractionDraft, InteractionId, InteractionKind};
pub use model::merge_plan::{reconcile, select_master, MergePlan, Reconciled};
pub use repo::contact_repo::{
    ContactRepository, ContactStats, ContactSummary, RepoError, RepoResult,
    SqliteContactRepository,
};
pub use repo::interaction_repo::{InteractionRepository, SqliteInteractionRepository};
pub use repo::merge_repo::{MergeOutcome, MergeReport, MergeRepository, SqliteMergeRepository};
pub use service::contact_service::{
    ContactSearchResult, ContactService, ContactServiceError, RecordedNote,
};
pub use service::import_service::{
    parse_contacts, parse_csv_contacts, parse_json_contacts, parse_vcard_contacts, ImportError,
    ImportFormat, ImportReport, ImportService,
};
pub use service::merge_service::{MergeError, MergeResult, MergeService, CONTACT_NOT_FOUND};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
