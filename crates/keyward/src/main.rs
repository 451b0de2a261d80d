// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyward - encrypted storage for AI provider API keys.
//!
//! This is the binary entry point. Every command opens the vault, unlocking
//! it with `KEYWARD_PASSPHRASE` or an interactive prompt.

use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use keyward_config::KeywardConfig;
use keyward_core::{KeyStatus, KeywardError, Provider};
use keyward_vault::{
    CredentialRecord, CredentialVault, ListOptions, NewCredential, SortBy, SortOrder,
    open_vault_interactive,
};
use secrecy::{ExposeSecret, SecretString};

/// Keyward - encrypted storage for AI provider API keys.
#[derive(Parser, Debug)]
#[command(name = "keyward", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a new API key. The key is read from the terminal or stdin.
    Add {
        /// Display name.
        #[arg(long)]
        name: String,
        /// Provider; detected from the key prefix when omitted.
        #[arg(long)]
        provider: Option<Provider>,
        #[arg(long)]
        description: Option<String>,
        /// Tag to attach (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Endpoint used by `keyward test` for this key.
        #[arg(long)]
        endpoint: Option<String>,
    },
    /// List stored keys (masked).
    List {
        #[arg(long)]
        provider: Option<Provider>,
        #[arg(long)]
        status: Option<KeyStatus>,
        /// Required tag (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Case-insensitive match on name, description or tags.
        #[arg(long)]
        search: Option<String>,
        /// Sort by name instead of creation time.
        #[arg(long)]
        by_name: bool,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Show a key's metadata and usage.
    Show {
        id: String,
        /// Also print the decrypted secret.
        #[arg(long)]
        reveal: bool,
    },
    /// Permanently delete a key.
    Delete { id: String },
    /// Replace a key with a new secret read from the terminal or stdin.
    Rotate {
        id: String,
        /// Undo the rotation that produced `id` instead.
        #[arg(long)]
        rollback: bool,
    },
    /// Check that the provider accepts a stored key.
    Test { id: String },
    /// Export every key as JSON.
    Export {
        /// Include encrypted records so the export can be imported.
        #[arg(long)]
        include_secrets: bool,
        /// Write to this file instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Import keys from an export file.
    Import { file: PathBuf },
    /// Report encryption and storage readiness.
    Health,
    /// Show recent audit entries, newest first.
    Audit {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => keyward_config::load_and_validate_path(path),
        None => keyward_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            keyward_config::render_errors(&errors);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.logging.level);

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("keyward: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, config: &KeywardConfig) -> Result<(), KeywardError> {
    let vault = open_vault_interactive(config).await?;
    tracing::debug!(keys = vault.key_count(), "vault unlocked");
    let result = execute(command, &vault).await;
    vault.encryption().shutdown().await;
    result
}

async fn execute(command: Commands, vault: &CredentialVault) -> Result<(), KeywardError> {
    match command {
        Commands::Add {
            name,
            provider,
            description,
            tags,
            endpoint,
        } => {
            let key = read_secret("API key")?;
            let mut input = NewCredential::new(key.expose_secret(), name).with_tags(tags);
            input.provider = provider;
            input.description = description;
            input.configuration.endpoint = endpoint;
            let record = vault.add(input).await?;
            println!("{}  {}", record.id, record.metadata.masked_key);
        }
        Commands::List {
            provider,
            status,
            tags,
            search,
            by_name,
            limit,
            offset,
        } => {
            let options = ListOptions {
                provider,
                status,
                tags,
                search,
                sort_by: if by_name { SortBy::Name } else { SortBy::CreatedAt },
                sort_order: if by_name { SortOrder::Asc } else { SortOrder::Desc },
                limit,
                offset,
                ..Default::default()
            };
            let listed = vault.list(&options).await?;
            for key in &listed.keys {
                println!(
                    "{}  {:<10} {:<8} {}  {}",
                    key.id, key.provider, key.status, key.masked_key, key.name
                );
            }
            if listed.has_more {
                println!("... {} of {} shown", listed.keys.len(), listed.total);
            }
        }
        Commands::Show { id, reveal } => {
            let record = require(vault.get(&id).await?, &id)?;
            print_json(&summary(&record))?;
            if reveal && let Some(secret) = vault.get_secret(&id).await? {
                println!("{}", secret.expose_secret());
            }
        }
        Commands::Delete { id } => {
            if !vault.delete(&id).await? {
                return Err(KeywardError::NotFound(format!("credential {id}")));
            }
            println!("deleted {id}");
        }
        Commands::Rotate { id, rollback: true } => {
            let restored = vault.rollback_rotation(&id).await?;
            println!("restored {}", restored.id);
        }
        Commands::Rotate { id, rollback: false } => {
            let key = read_secret("New API key")?;
            let outcome = vault.rotate(&id, key).await;
            match outcome.new_key_id {
                Some(new_id) if outcome.success => println!("rotated {id} -> {new_id}"),
                _ => {
                    return Err(KeywardError::Validation(
                        outcome.error.unwrap_or_else(|| "rotation failed".into()),
                    ));
                }
            }
        }
        Commands::Test { id } => {
            let result = vault.test_connection(&id).await?;
            match result.error {
                None => println!("ok ({} ms)", result.response_time_ms),
                Some(error) => {
                    return Err(KeywardError::Provider {
                        message: error,
                        source: None,
                    });
                }
            }
        }
        Commands::Export {
            include_secrets,
            output,
        } => {
            let export = vault.export_all(include_secrets).await?;
            let text = to_pretty(&export)?;
            match output {
                Some(path) => std::fs::write(&path, text)
                    .map_err(|e| KeywardError::storage(format!("write {}", path.display()), e))?,
                None => println!("{text}"),
            }
        }
        Commands::Import { file } => {
            let text = std::fs::read_to_string(&file)
                .map_err(|e| KeywardError::storage(format!("read {}", file.display()), e))?;
            let data = serde_json::from_str(&text)
                .map_err(|e| KeywardError::InvalidFormat(format!("{}: {e}", file.display())))?;
            let report = vault.import_all(data).await?;
            for error in &report.errors {
                eprintln!("keyward: {error}");
            }
            println!("imported {}, failed {}", report.success, report.failed);
        }
        Commands::Health => {
            let report = vault.health_check().await;
            print_json(&report)?;
            if !report.healthy {
                return Err(KeywardError::Internal("vault is not healthy".into()));
            }
        }
        Commands::Audit { limit } => {
            for entry in vault.recent_audit(limit).await? {
                println!(
                    "{}  {:<18} {}",
                    entry.timestamp.to_rfc3339(),
                    entry.event,
                    entry.subject_id.as_deref().unwrap_or("-")
                );
            }
        }
    }
    Ok(())
}

/// Read a secret from the terminal without echo, or one line from piped
/// stdin.
fn read_secret(label: &str) -> Result<SecretString, KeywardError> {
    let stdin = std::io::stdin();
    let line = if stdin.is_terminal() {
        rpassword::prompt_password(format!("{label}: "))
    } else {
        let mut line = String::new();
        stdin.lock().read_line(&mut line).map(|_| line)
    }
    .map_err(|e| KeywardError::Validation(format!("failed to read {label}: {e}")))?;

    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(KeywardError::Validation(format!("{label} must not be empty")));
    }
    Ok(SecretString::from(trimmed.to_string()))
}

fn require(
    record: Option<CredentialRecord>,
    id: &str,
) -> Result<CredentialRecord, KeywardError> {
    record.ok_or_else(|| KeywardError::NotFound(format!("credential {id}")))
}

/// Printable view of a record. Leaves out the ciphertext and hashes.
fn summary(record: &CredentialRecord) -> serde_json::Value {
    serde_json::json!({
        "metadata": record.metadata,
        "configuration": record.configuration,
        "usageStats": record.usage_stats,
        "rotation": record.rotation,
    })
}

fn to_pretty<T: serde::Serialize>(value: &T) -> Result<String, KeywardError> {
    serde_json::to_string_pretty(value).map_err(|e| KeywardError::Internal(e.to_string()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), KeywardError> {
    println!("{}", to_pretty(value)?);
    Ok(())
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("keyward={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
