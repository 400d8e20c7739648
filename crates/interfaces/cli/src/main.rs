mod reporter;

use std::io::{self, IsTerminal, Write};

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use notegarden_config::AppConfig;
use notegarden_index::{SemanticIndex, build_embedder};
use notegarden_llm::GenerationClient;
use notegarden_safety::BackupVault;
use notegarden_sync::{ChangeCursor, SyncOrchestrator};
use notegarden_tags::VocabularyStore;
use notegarden_vault::VaultScanner;

use reporter::ConsoleReporter;

#[derive(Debug, Parser)]
#[command(
    name = "notegarden",
    version,
    about = "Incremental AI enrichment for Markdown note vaults"
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, short = 'c', global = true, default_value = "notegarden.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Full vault scan and index build.
    Init {
        /// Reset the semantic index before rebuilding.
        #[arg(long, short = 'f')]
        force: bool,
    },
    /// Incremental pass: tag and cross-link documents changed since the
    /// last run.
    Update {
        /// Take every decision but modify nothing on disk.
        #[arg(long)]
        dry_run: bool,
        /// Show detailed logs.
        #[arg(long, short = 'v')]
        verbose: bool,
    },
    /// Roll documents back to their backed-up state.
    Restore {
        /// Restore every file backed up on this date (YYYY-MM-DD).
        #[arg(long)]
        date: Option<String>,
        /// Restore one file by vault-relative path.
        #[arg(long)]
        file: Option<String>,
        /// Skip the confirmation prompt.
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Manage the tag whitelist.
    Tags {
        #[command(subcommand)]
        command: TagCommands,
    },
    /// Manage the tag blacklist.
    Blacklist {
        #[command(subcommand)]
        command: TagCommands,
    },
}

#[derive(Debug, Subcommand)]
enum TagCommands {
    /// List all tags in this set.
    List,
    /// Add a tag.
    Add { tag: String },
    /// Remove a tag.
    Remove { tag: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Update { verbose: true, .. } => "debug",
        _ => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = match AppConfig::load_from(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err:#}");
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Init { force } => run_init(&config, force).await,
        Commands::Update { dry_run, .. } => run_update(&config, dry_run).await,
        Commands::Restore { date, file, yes } => run_restore(&config, date, file, yes),
        Commands::Tags { command } => run_tags(&config, command),
        Commands::Blacklist { command } => run_blacklist(&config, command),
    }
}

fn open_vocabulary(config: &AppConfig) -> Result<VocabularyStore> {
    VocabularyStore::open(config.allowed_tags_path(), config.forbidden_tags_path())
}

fn build_orchestrator(config: &AppConfig, dry_run: bool) -> Result<SyncOrchestrator> {
    let vault_root = config.vault_root();
    if !vault_root.exists() {
        bail!("vault path does not exist: {}", vault_root.display());
    }

    let embedder = build_embedder(&config.embedding);
    Ok(SyncOrchestrator::new(
        VaultScanner::new(&vault_root),
        BackupVault::new(&config.safety, &vault_root),
        open_vocabulary(config)?,
        SemanticIndex::open(&config.index, embedder)?,
        GenerationClient::from_config(config)?,
        ChangeCursor::new(config.cursor_path()),
        config.limits.retrieval_k,
        dry_run,
    ))
}

async fn run_init(config: &AppConfig, force: bool) -> Result<()> {
    println!("vault: {}", config.vault_path);
    println!("embedding model: {}", config.embedding.model);
    if force {
        println!("force mode: the existing index will be reset");
    }

    let mut orchestrator = build_orchestrator(config, false)?;
    let summary = orchestrator.run_init(force).await?;

    println!(
        "initialized: {} document(s) scanned, {} indexed",
        summary.scanned, summary.indexed
    );
    Ok(())
}

async fn run_update(config: &AppConfig, dry_run: bool) -> Result<()> {
    let mut orchestrator = build_orchestrator(config, dry_run)?;
    let mut reporter = ConsoleReporter;
    orchestrator.run_update(&mut reporter).await?;
    Ok(())
}

fn run_restore(
    config: &AppConfig,
    date: Option<String>,
    file: Option<String>,
    yes: bool,
) -> Result<()> {
    if date.is_none() && file.is_none() {
        bail!("restore requires --date or --file");
    }

    println!("backup root: {}", config.safety.backup_path);
    if let Some(date) = &date {
        println!("restoring every file backed up on {date}");
    }
    if let Some(file) = &file {
        println!("restoring {file}");
    }

    if !yes && !confirm("This will overwrite live documents with their backups.")? {
        println!("restore cancelled");
        return Ok(());
    }

    let backups = BackupVault::new(&config.safety, config.vault_root());

    if let Some(date) = &date {
        let count = backups.restore_by_date(date);
        if count == 0 {
            bail!("no files restored for {date}");
        }
        println!("restored {count} file(s)");
    }

    if let Some(file) = &file {
        if !backups.restore_latest(file) {
            bail!("no backup found for {file}");
        }
        println!("restored {file}");
    }

    Ok(())
}

fn confirm(warning: &str) -> Result<bool> {
    if !io::stdin().is_terminal() {
        bail!("refusing to restore in non-interactive mode without --yes");
    }

    print!("{warning} Type 'yes' to continue: ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}

fn run_tags(config: &AppConfig, command: TagCommands) -> Result<()> {
    let mut vocabulary = open_vocabulary(config)?;
    match command {
        TagCommands::List => {
            let tags = vocabulary.allowed();
            if tags.is_empty() {
                println!("no known tags yet");
            } else {
                println!("known tags ({}): {}", tags.len(), tags.join(", "));
            }
        }
        TagCommands::Add { tag } => {
            if vocabulary.add_allowed(&tag)? {
                println!("tag '{tag}' added");
            } else {
                println!("tag '{tag}' already exists, is blacklisted, or is empty");
            }
        }
        TagCommands::Remove { tag } => {
            if vocabulary.remove_allowed(&tag)? {
                println!("tag '{tag}' removed");
            } else {
                println!("tag '{tag}' does not exist");
            }
        }
    }
    Ok(())
}

fn run_blacklist(config: &AppConfig, command: TagCommands) -> Result<()> {
    let mut vocabulary = open_vocabulary(config)?;
    match command {
        TagCommands::List => {
            let tags = vocabulary.forbidden();
            if tags.is_empty() {
                println!("blacklist is empty");
            } else {
                println!("blacklisted tags ({}): {}", tags.len(), tags.join(", "));
            }
        }
        TagCommands::Add { tag } => {
            if vocabulary.add_forbidden(&tag)? {
                println!("tag '{tag}' blacklisted (and removed from the whitelist if present)");
            } else {
                println!("tag '{tag}' is already blacklisted or empty");
            }
        }
        TagCommands::Remove { tag } => {
            if vocabulary.remove_forbidden(&tag)? {
                println!("tag '{tag}' removed from the blacklist");
            } else {
                println!("tag '{tag}' is not blacklisted");
            }
        }
    }
    Ok(())
}
