use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use contacts_core::db::open_db_with_options;
use contacts_core::{
    init_logging_from_config, parse_contacts, Contact, ContactService, CoreConfig, ImportFormat,
    ImportService, MergeService, SqliteContactRepository, SqliteInteractionRepository,
    SqliteMergeRepository,
};
use log::info;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

/// Total tries for a merge that loses the write lock race.
const MERGE_ATTEMPTS: u32 = 3;

#[derive(Parser)]
#[command(name = "contacts")]
#[command(version)]
#[command(about = "Personal contacts store with duplicate merging", long_about = None)]
pub struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = "CONTACTS_DB_PATH")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Merge every contact sharing a name (case-insensitive) and print the JSON result
    Merge { name: String },
    /// Add a contact from "Name, Company, Position, @telegram, email, phone"
    Add { line: String },
    /// Attach a note to a contact found by @telegram, email or name
    Note {
        identifier: String,
        text: String,
        /// Interaction date as YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<String>,
    },
    /// Show one contact with its interaction summary
    Find { identifier: String },
    /// Search name, company and tags
    Search {
        query: String,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// List recently added contacts
    List {
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Show store statistics
    Stats,
    /// Import contacts from a .json, .csv or .vcf file
    Import { file: PathBuf },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("Use --help for usage information");
        return Ok(());
    };

    let mut config = CoreConfig::from_env()?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    init_logging_from_config(&config)?;
    info!("event=cli_start module=cli status=ok version={}", contacts_core::core_version());

    let conn = open_db_with_options(&config.db_path, &config.db_options())
        .with_context(|| format!("cannot open database {}", config.db_path.display()))?;

    match command {
        Commands::Merge { name } => merge(&conn, &name),
        Commands::Add { line } => add(&conn, &line),
        Commands::Note {
            identifier,
            text,
            date,
        } => note(&conn, &identifier, &text, date.as_deref()),
        Commands::Find { identifier } => find(&conn, &identifier),
        Commands::Search { query, limit } => search(&conn, &query, limit),
        Commands::List { limit } => list(&conn, limit),
        Commands::Stats => stats(&conn),
        Commands::Import { file } => import(&conn, &file),
    }
}

fn contact_service(
    conn: &Connection,
) -> Result<ContactService<SqliteContactRepository<'_>, SqliteInteractionRepository<'_>>> {
    Ok(ContactService::new(
        SqliteContactRepository::try_new(conn)?,
        SqliteInteractionRepository::try_new(conn)?,
    ))
}

fn merge(conn: &Connection, name: &str) -> Result<()> {
    let service = MergeService::new(SqliteMergeRepository::try_new(conn)?);
    let result = service.merge_with_retry(name, MERGE_ATTEMPTS)?;
    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

fn add(conn: &Connection, line: &str) -> Result<()> {
    let contact = contact_service(conn)?.quick_add(line)?;
    println!("Added {} ({})", contact.name, contact.id);
    print_contact(&contact);
    Ok(())
}

fn note(conn: &Connection, identifier: &str, text: &str, date: Option<&str>) -> Result<()> {
    let recorded = contact_service(conn)?.add_note(identifier, text, date)?;
    let interaction = &recorded.interaction;
    match interaction.amount {
        Some(amount) => println!(
            "Recorded {} for {} on {} (amount {amount})",
            interaction.kind, recorded.contact.name, interaction.date
        ),
        None => println!(
            "Recorded {} for {} on {}",
            interaction.kind, recorded.contact.name, interaction.date
        ),
    }
    Ok(())
}

fn find(conn: &Connection, identifier: &str) -> Result<()> {
    let service = contact_service(conn)?;
    let Some(contact) = service.find_contact(identifier)? else {
        println!("No contact matches `{identifier}`");
        return Ok(());
    };

    print_contact(&contact);
    if let Some(summary) = service.summary(contact.id)? {
        println!("  Interactions: {}", summary.interaction_count);
        if let Some(last) = summary.last_interaction_date {
            println!("  Last interaction: {last}");
        }
    }
    for interaction in service.interactions(contact.id)?.iter().take(5) {
        println!(
            "  - {} [{}] {}",
            interaction.date,
            interaction.kind,
            interaction.note.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

fn search(conn: &Connection, query: &str, limit: Option<u32>) -> Result<()> {
    let result = contact_service(conn)?.search(query, limit)?;
    println!("Found {} contact(s)", result.total);
    for contact in &result.items {
        print_contact(contact);
    }
    Ok(())
}

fn list(conn: &Connection, limit: Option<u32>) -> Result<()> {
    let contacts = contact_service(conn)?.list_recent(limit)?;
    if contacts.is_empty() {
        println!("No contacts yet");
    }
    for contact in &contacts {
        print_contact(contact);
    }
    Ok(())
}

fn stats(conn: &Connection) -> Result<()> {
    let stats = contact_service(conn)?.stats()?;
    println!("Contacts: {}", stats.total_contacts);
    println!("Interactions: {}", stats.total_interactions);
    println!("Unique tags: {}", stats.unique_tags);
    if let Some(average) = stats.average_interactions() {
        println!("Interactions per contact: {average:.1}");
    }
    Ok(())
}

fn import(conn: &Connection, file: &Path) -> Result<()> {
    let format = ImportFormat::from_path(file)?;
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("cannot read {}", file.display()))?;
    let drafts = parse_contacts(format, &content)?;
    let report = ImportService::new(SqliteContactRepository::try_new(conn)?).import(&drafts);
    println!(
        "Imported: {}, duplicates: {}, errors: {}",
        report.imported, report.duplicates, report.errors
    );
    Ok(())
}

fn print_contact(contact: &Contact) {
    println!("{} <{}>", contact.name, contact.id);
    let fields = [
        ("Company", contact.company.as_deref()),
        ("Position", contact.position.as_deref()),
        ("Telegram", contact.telegram.as_deref()),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            println!("  {label}: {value}");
        }
    }
    let emails = contact.emails();
    if !emails.is_empty() {
        println!("  Email: {}", emails.join(", "));
    }
    let phones = contact.phones();
    if !phones.is_empty() {
        println!("  Phone: {}", phones.join(", "));
    }
    if !contact.tags.is_empty() {
        println!("  Tags: {}", contact.tags.join(", "));
    }
}
