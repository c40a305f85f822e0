use contacts_core::db::open_db_in_memory;
use contacts_core::{
    ContactDraft, ContactId, ContactRepository, InteractionDraft, InteractionKind,
    InteractionRepository, MergeError, MergeOutcome, MergeResult, MergeService,
    SqliteContactRepository, SqliteInteractionRepository, SqliteMergeRepository,
};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn id(value: u128) -> ContactId {
    Uuid::from_u128(value)
}

fn insert(conn: &Connection, draft: &ContactDraft) {
    SqliteContactRepository::try_new(conn)
        .unwrap()
        .create_contact(draft)
        .unwrap();
}

fn add_interaction(conn: &Connection, contact_id: ContactId, note: &str) {
    let mut draft = InteractionDraft::new(contact_id, InteractionKind::Other);
    draft.note = Some(note.to_string());
    SqliteInteractionRepository::try_new(conn)
        .unwrap()
        .create_interaction(&draft)
        .unwrap();
}

fn merge(conn: &Connection, name: &str) -> Result<MergeResult, MergeError> {
    MergeService::new(SqliteMergeRepository::try_new(conn).unwrap()).merge(name)
}

fn merge_detailed(conn: &Connection, name: &str) -> MergeOutcome {
    MergeService::new(SqliteMergeRepository::try_new(conn).unwrap())
        .merge_detailed(name)
        .unwrap()
}

fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

fn seed_ivan_petrov(conn: &Connection) {
    let mut first = ContactDraft::with_id(id(1), "Ivan Petrov");
    first.phone = Some("111".to_string());
    first.tags = vec!["vip".to_string()];
    insert(conn, &first);
    add_interaction(conn, id(1), "first");

    let mut second = ContactDraft::with_id(id(2), "ivan petrov");
    second.email = Some("a@x.com".to_string());
    second.tags = vec!["client".to_string()];
    insert(conn, &second);
    add_interaction(conn, id(2), "second");
}

#[test]
fn merge_collapses_case_variants_into_most_complete_record() {
    let conn = open_db_in_memory().unwrap();
    seed_ivan_petrov(&conn);

    let result = merge(&conn, "Ivan Petrov").unwrap();

    // email (2) outranks phone (1), so the second record survives.
    let MergeResult::Merged {
        master_id,
        master_name,
        deleted_count,
    } = result
    else {
        panic!("expected a merged result");
    };
    assert_eq!(master_id, id(2));
    assert!(master_name.eq_ignore_ascii_case("Ivan Petrov"));
    assert_eq!(deleted_count, 1);

    let repo = SqliteContactRepository::try_new(&conn).unwrap();
    let survivors = repo.list_by_name("IVAN PETROV").unwrap();
    assert_eq!(survivors.len(), 1);
    let master = &survivors[0];
    assert_eq!(master.phone.as_deref(), Some("111"));
    assert_eq!(master.email.as_deref(), Some("a@x.com"));
    assert!(master.tags.contains(&"vip".to_string()));
    assert!(master.tags.contains(&"client".to_string()));
    assert_eq!(master.tags.len(), 2);

    let interactions = SqliteInteractionRepository::try_new(&conn)
        .unwrap()
        .list_for_contact(master_id)
        .unwrap();
    assert_eq!(interactions.len(), 2);
    assert!(interactions.iter().all(|item| item.contact_id == master_id));
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM interactions;"), 2);
}

#[test]
fn merge_result_serializes_to_wire_shape() {
    let conn = open_db_in_memory().unwrap();
    seed_ivan_petrov(&conn);

    let merged = serde_json::to_value(merge(&conn, "ivan petrov").unwrap()).unwrap();
    assert_eq!(
        merged,
        json!({
            "success": true,
            "master_id": id(2).to_string(),
            "master_name": "ivan petrov",
            "deleted_count": 1
        })
    );

    let missing = serde_json::to_value(merge(&conn, "Nonexistent Name").unwrap()).unwrap();
    assert_eq!(
        missing,
        json!({"success": false, "error": "Contact not found"})
    );
}

#[test]
fn merge_unknown_name_writes_nothing() {
    let conn = open_db_in_memory().unwrap();
    seed_ivan_petrov(&conn);

    let result = merge(&conn, "Nonexistent Name").unwrap();
    assert_eq!(result, MergeResult::NotFound);
    assert!(!result.is_success());
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM contacts;"), 2);
}

#[test]
fn merging_again_is_a_successful_no_op() {
    let conn = open_db_in_memory().unwrap();
    seed_ivan_petrov(&conn);

    merge(&conn, "Ivan Petrov").unwrap();
    let second = merge(&conn, "Ivan Petrov").unwrap();
    assert!(second.is_success());
    assert_eq!(second.deleted_count(), 0);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM contacts;"), 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM interactions;"), 2);
}

#[test]
fn single_match_is_returned_unchanged() {
    let conn = open_db_in_memory().unwrap();
    let mut only = ContactDraft::with_id(id(7), "Solo");
    only.company = Some("Acme".to_string());
    insert(&conn, &only);

    let MergeOutcome::Merged(report) = merge_detailed(&conn, "solo") else {
        panic!("expected a merged outcome");
    };
    assert_eq!(report.master.id, id(7));
    assert_eq!(report.deleted_count(), 0);
    assert_eq!(report.relinked_interactions, 0);
    assert_eq!(report.master.company.as_deref(), Some("Acme"));
}

#[test]
fn equal_scores_keep_lowest_id_regardless_of_insert_order() {
    let conn = open_db_in_memory().unwrap();
    for value in [3_u128, 1, 2] {
        let mut draft = ContactDraft::with_id(id(value), "Tie Name");
        draft.phone = Some(format!("phone-{value}"));
        insert(&conn, &draft);
    }

    let result = merge(&conn, "tie name").unwrap();
    let MergeResult::Merged { master_id, .. } = result else {
        panic!("expected a merged result");
    };
    assert_eq!(master_id, id(1));
}

#[test]
fn channels_are_capped_and_overflow_is_reported() {
    let conn = open_db_in_memory().unwrap();

    let mut first = ContactDraft::with_id(id(1), "Overflow");
    first.email = Some("e1@x.com".to_string());
    first.email2 = Some("e2@x.com".to_string());
    first.phone = Some("p1".to_string());
    first.position = Some("Lead".to_string());
    first.bio = Some("bio".to_string());
    insert(&conn, &first);

    let mut second = ContactDraft::with_id(id(2), "OVERFLOW");
    second.email = Some("e3@x.com".to_string());
    second.phone = Some("p2".to_string());
    second.phone2 = Some("p3".to_string());
    second.position = Some("Intern".to_string());
    second.company = Some("Acme".to_string());
    insert(&conn, &second);

    let MergeOutcome::Merged(report) = merge_detailed(&conn, "overflow") else {
        panic!("expected a merged outcome");
    };
    let master = &report.master;
    assert_eq!(master.id, id(1));
    assert_eq!(master.name, "Overflow");
    assert_eq!(master.phones(), vec!["p1", "p2"]);
    assert_eq!(master.emails(), vec!["e1@x.com", "e2@x.com"]);
    assert_eq!(report.dropped_phones, vec!["p3".to_string()]);
    assert_eq!(report.dropped_emails, vec!["e3@x.com".to_string()]);
    assert_eq!(master.position.as_deref(), Some("Lead"));
    assert_eq!(master.company.as_deref(), Some("Acme"));
}

#[test]
fn scalar_fill_takes_first_duplicate_in_id_order() {
    let conn = open_db_in_memory().unwrap();

    let mut master = ContactDraft::with_id(id(5), "Fill Order");
    master.email = Some("m@x.com".to_string());
    master.telegram = Some("@master".to_string());
    insert(&conn, &master);

    let mut later = ContactDraft::with_id(id(9), "fill order");
    later.bio = Some("later bio".to_string());
    later.bio_source = Some("manual".to_string());
    insert(&conn, &later);

    let mut earlier = ContactDraft::with_id(id(6), "Fill Order");
    earlier.bio = Some("earlier bio".to_string());
    earlier.bio_source = Some("linkedin".to_string());
    earlier.telegram = Some("@earlier".to_string());
    insert(&conn, &earlier);

    let MergeOutcome::Merged(report) = merge_detailed(&conn, "FILL ORDER") else {
        panic!("expected a merged outcome");
    };
    assert_eq!(report.master.id, id(5));
    assert_eq!(report.duplicate_ids, vec![id(6), id(9)]);
    assert_eq!(report.master.telegram.as_deref(), Some("@master"));
    assert_eq!(report.master.bio.as_deref(), Some("earlier bio"));
    assert_eq!(report.master.bio_source.as_deref(), Some("linkedin"));
}

#[test]
fn other_names_are_left_untouched() {
    let conn = open_db_in_memory().unwrap();
    seed_ivan_petrov(&conn);
    let mut other = ContactDraft::with_id(id(3), "Ivan Petrovich");
    other.email = Some("other@x.com".to_string());
    insert(&conn, &other);
    add_interaction(&conn, id(3), "unrelated");

    merge(&conn, "ivan petrov").unwrap();

    let repo = SqliteContactRepository::try_new(&conn).unwrap();
    let untouched = repo.get_contact(id(3)).unwrap().unwrap();
    assert_eq!(untouched.email.as_deref(), Some("other@x.com"));
    assert_eq!(untouched.tags, Vec::<String>::new());
    let owned = SqliteInteractionRepository::try_new(&conn)
        .unwrap()
        .count_for_contacts(&[id(3)])
        .unwrap();
    assert_eq!(owned, 1);
}

#[test]
fn cyrillic_names_match_case_insensitively() {
    let conn = open_db_in_memory().unwrap();
    insert(&conn, &ContactDraft::with_id(id(1), "Иван Петров"));
    insert(&conn, &ContactDraft::with_id(id(2), "ИВАН ПЕТРОВ"));
    insert(&conn, &ContactDraft::with_id(id(3), "иван петров"));

    let result = merge(&conn, "Иван петров").unwrap();
    assert_eq!(result.deleted_count(), 2);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM contacts;"), 1);
}

#[test]
fn failed_delete_rolls_back_every_change() {
    let conn = open_db_in_memory().unwrap();
    seed_ivan_petrov(&conn);
    conn.execute_batch(
        "CREATE TRIGGER block_contact_delete
         BEFORE DELETE ON contacts
         BEGIN
            SELECT RAISE(ABORT, 'blocked');
         END;",
    )
    .unwrap();

    let err = merge(&conn, "Ivan Petrov").unwrap_err();
    assert!(matches!(err, MergeError::ConstraintViolation(_)));
    assert!(!err.is_retryable());

    let repo = SqliteContactRepository::try_new(&conn).unwrap();
    let first = repo.get_contact(id(1)).unwrap().unwrap();
    let second = repo.get_contact(id(2)).unwrap().unwrap();
    assert_eq!(second.phone, None);
    assert_eq!(second.tags, vec!["client".to_string()]);
    assert_eq!(first.tags, vec!["vip".to_string()]);

    let interactions = SqliteInteractionRepository::try_new(&conn).unwrap();
    assert_eq!(interactions.count_for_contacts(&[id(1)]).unwrap(), 1);
    assert_eq!(interactions.count_for_contacts(&[id(2)]).unwrap(), 1);

    conn.execute_batch("DROP TRIGGER block_contact_delete;").unwrap();
    assert_eq!(merge(&conn, "Ivan Petrov").unwrap().deleted_count(), 1);
}

#[test]
fn relinked_interactions_keep_their_payload() {
    let conn = open_db_in_memory().unwrap();
    seed_ivan_petrov(&conn);

    let MergeOutcome::Merged(report) = merge_detailed(&conn, "ivan petrov") else {
        panic!("expected a merged outcome");
    };
    assert_eq!(report.relinked_interactions, 1);

    let notes: Vec<Option<String>> = SqliteInteractionRepository::try_new(&conn)
        .unwrap()
        .list_for_contact(report.master.id)
        .unwrap()
        .into_iter()
        .map(|item| item.note)
        .collect();
    assert!(notes.contains(&Some("first".to_string())));
    assert!(notes.contains(&Some("second".to_string())));
}

#[test]
fn candidate_with_only_secondary_email_is_merged() {
    let conn = open_db_in_memory().unwrap();
    let mut first = ContactDraft::with_id(id(1), "Anna");
    first.phone = Some("111".to_string());
    insert(&conn, &first);
    conn.execute(
        "INSERT INTO contacts (id, name, name_key, email2) VALUES (?1, 'anna', 'anna', 'b@x.com');",
        [id(2).to_string()],
    )
    .unwrap();

    let MergeOutcome::Merged(report) = merge_detailed(&conn, "Anna") else {
        panic!("expected a merged outcome");
    };
    assert_eq!(report.master.id, id(2));
    assert_eq!(report.deleted_count(), 1);
    assert_eq!(report.master.emails(), vec!["b@x.com"]);
    assert_eq!(report.master.email2, None);
    assert_eq!(report.master.phones(), vec!["111"]);

    let stored: (Option<String>, Option<String>) = conn
        .query_row(
            "SELECT email, email2 FROM contacts WHERE id = ?1;",
            [id(2).to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(stored, (Some("b@x.com".to_string()), None));
}

#[test]
fn merge_advances_master_updated_at() {
    let conn = open_db_in_memory().unwrap();
    let mut master = ContactDraft::with_id(id(1), "Bob");
    master.email = Some("bob@x.com".to_string());
    insert(&conn, &master);
    insert(&conn, &ContactDraft::with_id(id(2), "bob"));

    let before = SqliteContactRepository::try_new(&conn)
        .unwrap()
        .get_contact(id(1))
        .unwrap()
        .unwrap()
        .updated_at;

    let MergeOutcome::Merged(first) = merge_detailed(&conn, "bob") else {
        panic!("expected a merged outcome");
    };
    assert!(first.master.updated_at > before);

    let MergeOutcome::Merged(second) = merge_detailed(&conn, "bob") else {
        panic!("expected a merged outcome");
    };
    assert!(second.master.updated_at > first.master.updated_at);
}
