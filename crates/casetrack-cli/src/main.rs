use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use casetrack_auth::password;
use casetrack_core::validate_username;
use casetrack_store_sqlite::SqliteStore;
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use time::OffsetDateTime;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "casetrack")]
#[command(about = "CaseTrack operator CLI")]
struct Cli {
    #[arg(long, default_value = "./casetrack.sqlite3")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    SchemaVersion,
    Migrate(DbMigrateArgs),
}

#[derive(Debug, Args)]
struct DbMigrateArgs {
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Debug, Subcommand)]
enum UserCommand {
    Add(UserAddArgs),
    List,
}

#[derive(Debug, Args)]
struct UserAddArgs {
    #[arg(long)]
    username: String,
    #[arg(long)]
    password: String,
}

fn with_contract_version(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        map.insert(
            "cli_contract_version".to_string(),
            Value::String(CLI_CONTRACT_VERSION.to_string()),
        );
    }
    value
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn open_store(db: &Path) -> Result<SqliteStore> {
    SqliteStore::open(db)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Db { command } => match command {
            DbCommand::SchemaVersion => db_schema_version(&cli.db),
            DbCommand::Migrate(args) => db_migrate(&cli.db, args.dry_run),
        },
        Command::User { command } => match command {
            UserCommand::Add(args) => user_add(&cli.db, &args.username, &args.password),
            UserCommand::List => user_list(&cli.db),
        },
    }
}

fn db_schema_version(db: &Path) -> Result<()> {
    let store = open_store(db)?;
    let status = store.schema_status()?;
    emit_json(serde_json::to_value(&status)?)
}

fn db_migrate(db: &Path, dry_run: bool) -> Result<()> {
    let mut store = open_store(db)?;
    let before = store.schema_status()?;

    if dry_run {
        return emit_json(json!({
            "dry_run": true,
            "current_version": before.current_version,
            "target_version": before.target_version,
            "would_apply_versions": before.pending_versions,
        }));
    }

    let planned_versions = before.pending_versions.clone();
    store.migrate()?;
    let after = store.schema_status()?;
    emit_json(json!({
        "dry_run": false,
        "current_version": before.current_version,
        "target_version": before.target_version,
        "applied_versions": planned_versions,
        "after_version": after.current_version,
    }))
}

fn user_add(db: &Path, username: &str, raw_password: &str) -> Result<()> {
    validate_username(username).map_err(|err| anyhow!("{err}"))?;

    let mut store = open_store(db)?;
    store.migrate()?;
    if store.find_user_by_username(username)?.is_some() {
        return Err(anyhow!("user `{username}` already exists"));
    }

    let password_hash = password::hash_password(raw_password).map_err(|err| anyhow!("{err}"))?;
    let user = store.insert_user(username, &password_hash, OffsetDateTime::now_utc())?;

    emit_json(json!({ "id": user.id, "username": user.username }))
}

fn user_list(db: &Path) -> Result<()> {
    let mut store = open_store(db)?;
    store.migrate()?;
    // Hashes stay out of the listing.
    let users = store
        .list_users()?
        .into_iter()
        .map(|user| json!({ "id": user.id, "username": user.username }))
        .collect::<Vec<_>>();

    emit_json(json!({ "users": users }))
}
