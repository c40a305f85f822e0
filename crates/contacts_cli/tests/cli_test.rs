/// Binary integration tests using assert_cmd.
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

fn contacts(db: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_contacts"));
    cmd.env("CONTACTS_DB_PATH", db)
        .env_remove("CONTACTS_LOG_DIR")
        .env_remove("CONTACTS_BUSY_TIMEOUT_MS");
    cmd
}

#[test]
fn merge_prints_json_result() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("contacts.sqlite3");

    contacts(&db)
        .args(["add", "Ivan Petrov, , , +7 900 111-11-11"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added Ivan Petrov"));
    contacts(&db)
        .args(["add", "ivan petrov, Acme, , a@x.com"])
        .assert()
        .success();

    contacts(&db)
        .args(["merge", "IVAN PETROV"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""success":true"#))
        .stdout(predicate::str::contains(r#""master_name":"ivan petrov""#))
        .stdout(predicate::str::contains(r#""deleted_count":1"#));

    contacts(&db)
        .args(["find", "a@x.com"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Company: Acme"))
        .stdout(predicate::str::contains("Phone: +7 900 111-11-11"));
}

#[test]
fn merge_unknown_name_reports_not_found() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("contacts.sqlite3");

    contacts(&db)
        .args(["merge", "Nonexistent Name"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            r#"{"success":false,"error":"Contact not found"}"#,
        ));
}

#[test]
fn note_and_stats_flow() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("contacts.sqlite3");

    contacts(&db)
        .args(["add", "Anna, Acme, CTO, @anna"])
        .assert()
        .success();
    contacts(&db)
        .args(["note", "@anna", "bought a license for 1500 usd", "--date", "2024-05-01"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Recorded purchase for Anna on 2024-05-01"))
        .stdout(predicate::str::contains("amount 1500"));

    contacts(&db)
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("Contacts: 1"))
        .stdout(predicate::str::contains("Interactions: 1"));
}

#[test]
fn note_for_unknown_contact_fails() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("contacts.sqlite3");

    contacts(&db)
        .args(["note", "@ghost", "call"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn import_reports_counts() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("contacts.sqlite3");
    let file = dir.path().join("contacts.json");
    std::fs::write(
        &file,
        r#"[{"name": "A", "email": "a@x.com"}, {"name": "B", "email": "a@x.com"}]"#,
    )
    .unwrap();

    contacts(&db)
        .arg("import")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported: 1, duplicates: 1, errors: 0"));
}

#[test]
fn import_reads_csv_and_vcard_by_extension() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("contacts.sqlite3");
    let csv = dir.path().join("export.csv");
    std::fs::write(&csv, "Name,Email,Tags\nAnna,anna@x.com,\"hr, it\"\n").unwrap();
    let vcf = dir.path().join("export.vcf");
    std::fs::write(
        &vcf,
        "BEGIN:VCARD\nFN:Anna K\nEMAIL:anna@x.com\nEND:VCARD\nBEGIN:VCARD\nFN:Boris\nTEL:123\nEND:VCARD\n",
    )
    .unwrap();

    contacts(&db)
        .arg("import")
        .arg(&csv)
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported: 1, duplicates: 0, errors: 0"));
    contacts(&db)
        .arg("import")
        .arg(&vcf)
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported: 1, duplicates: 1, errors: 0"));
}

#[test]
fn import_rejects_unknown_extension() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("contacts.xlsx");
    std::fs::write(&file, "irrelevant").unwrap();

    contacts(&dir.path().join("contacts.sqlite3"))
        .arg("import")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported import format"));
}

#[test]
fn no_command_shows_hint() {
    let dir = TempDir::new().unwrap();
    contacts(&dir.path().join("unused.sqlite3"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Use --help for usage information"));
}

#[test]
fn invalid_command_fails() {
    let dir = TempDir::new().unwrap();
    contacts(&dir.path().join("unused.sqlite3"))
        .arg("invalid-command")
        .assert()
        .failure();
}
