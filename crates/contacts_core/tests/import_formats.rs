use contacts_core::db::open_db_in_memory;
use contacts_core::{
    parse_contacts, parse_csv_contacts, parse_vcard_contacts, ContactRepository, ImportError,
    ImportFormat, ImportService, SqliteContactRepository,
};
use std::path::Path;

const CSV_EXPORT: &str = "\
Name,Company,Position,Email,Telegram,Phone,Tags,Notes
Иван Петров,TechCorp,HR Manager,ivan@tech.com,@ivan_hr,+7 999 123-45-67,\"hr, it\",ignored
,Acme,,,,,,
Anna,,,anna@x.com,,,,
";

const VCARD_EXPORT: &str = "\
BEGIN:VCARD\r
VERSION:3.0\r
FN:Мария Иванова\r
ORG:Acme\\, Inc;Sales\r
TITLE:Account\r
  Manager\r
item1.EMAIL;type=INTERNET;type=pref:maria@acme.com\r
EMAIL;type=INTERNET:second@acme.com\r
TEL;type=CELL:+7 900 000-00-00\r
END:VCARD\r
BEGIN:VCARD\r
VERSION:3.0\r
TEL:12345\r
END:VCARD\r
";

#[test]
fn csv_rows_map_columns_case_insensitively_and_split_tags() {
    let drafts = parse_csv_contacts(CSV_EXPORT).unwrap();
    assert_eq!(drafts.len(), 3);

    let ivan = &drafts[0];
    assert_eq!(ivan.name, "Иван Петров");
    assert_eq!(ivan.company.as_deref(), Some("TechCorp"));
    assert_eq!(ivan.position.as_deref(), Some("HR Manager"));
    assert_eq!(ivan.email.as_deref(), Some("ivan@tech.com"));
    assert_eq!(ivan.telegram.as_deref(), Some("@ivan_hr"));
    assert_eq!(ivan.phone.as_deref(), Some("+7 999 123-45-67"));
    assert_eq!(ivan.tags, vec!["hr".to_string(), "it".to_string()]);
    assert_eq!(ivan.source.as_deref(), Some("import_csv"));

    assert_eq!(drafts[1].name, "Unnamed");
    assert_eq!(drafts[1].company.as_deref(), Some("Acme"));
    assert!(drafts[1].tags.is_empty());
    assert_eq!(drafts[2].email.as_deref(), Some("anna@x.com"));
}

#[test]
fn vcard_reads_first_value_of_each_property() {
    let drafts = parse_vcard_contacts(VCARD_EXPORT);
    assert_eq!(drafts.len(), 2);

    let maria = &drafts[0];
    assert_eq!(maria.name, "Мария Иванова");
    assert_eq!(maria.company.as_deref(), Some("Acme, Inc"));
    assert_eq!(maria.position.as_deref(), Some("Account Manager"));
    assert_eq!(maria.email.as_deref(), Some("maria@acme.com"));
    assert_eq!(maria.phone.as_deref(), Some("+7 900 000-00-00"));
    assert_eq!(maria.source.as_deref(), Some("import_vcf"));

    assert_eq!(drafts[1].name, "Unnamed");
    assert_eq!(drafts[1].phone.as_deref(), Some("12345"));
}

#[test]
fn format_dispatch_follows_file_extension() {
    let format = ImportFormat::from_path(Path::new("export/contacts.vcf")).unwrap();
    let drafts = parse_contacts(format, VCARD_EXPORT).unwrap();
    assert_eq!(drafts[0].source.as_deref(), Some("import_vcf"));

    let format = ImportFormat::from_path(Path::new("contacts.CSV")).unwrap();
    assert_eq!(format, ImportFormat::Csv);
    assert_eq!(parse_contacts(format, CSV_EXPORT).unwrap().len(), 3);

    let err = ImportFormat::from_path(Path::new("contacts.xlsx")).unwrap_err();
    assert!(matches!(err, ImportError::UnsupportedFormat(ref ext) if ext == "xlsx"));
}

#[test]
fn csv_and_vcard_imports_skip_known_contacts() {
    let conn = open_db_in_memory().unwrap();
    let service = ImportService::new(SqliteContactRepository::try_new(&conn).unwrap());

    let csv = service.import(&parse_csv_contacts(CSV_EXPORT).unwrap());
    assert_eq!(csv.imported, 3);
    assert_eq!(csv.duplicates, 0);

    let vcard = service.import(&parse_vcard_contacts(VCARD_EXPORT));
    assert_eq!(vcard.imported, 2);

    let again = service.import(&parse_csv_contacts(CSV_EXPORT).unwrap());
    // Rows without email or telegram cannot be recognized as duplicates.
    assert_eq!(again.duplicates, 2);
    assert_eq!(again.imported, 1);

    let repo = SqliteContactRepository::try_new(&conn).unwrap();
    let maria = repo.find_by_email("maria@acme.com").unwrap().unwrap();
    assert_eq!(maria.source, "import_vcf");
}
