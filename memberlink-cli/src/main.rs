//! Memberlink CLI
//!
//! Command-line interface for inspecting and maintaining a member registry
//! document.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::*;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use memberlink_core::constants::{DEFAULT_REGISTRY_PATH, ENV_ENCRYPTION_KEY, ENV_REGISTRY_PATH};
use memberlink_core::Member;
use memberlink_crypto::EncryptionKey;
use memberlink_registry::{AuditReport, MemberRegistry, RegistryConfig};

/// Memberlink - external account to subject registry
#[derive(Parser)]
#[command(name = "memberlink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Registry document path
    #[arg(long, global = true, env = ENV_REGISTRY_PATH, default_value = DEFAULT_REGISTRY_PATH)]
    path: PathBuf,

    /// Credential encryption key (64 hex characters)
    #[arg(long, global = true, env = ENV_ENCRYPTION_KEY, hide_env_values = true)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new encryption key
    Keygen,

    /// List members
    List {
        /// Only active members
        #[arg(long)]
        active: bool,
    },

    /// Show one member by subject id or external account id
    Show {
        /// Subject id
        #[arg(required_unless_present = "external", conflicts_with = "external")]
        subject_id: Option<String>,
        /// External account id
        #[arg(long)]
        external: Option<String>,
    },

    /// Check the registry's index invariants
    Audit {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Deactivate a member
    Deactivate {
        /// Subject id
        subject_id: String,
    },

    /// Reactivate a member
    Reactivate {
        /// Subject id
        subject_id: String,
    },

    /// Remove a member permanently
    Remove {
        /// Subject id
        subject_id: String,
    },

    /// Load the document (repairing duplicates) and write it back
    Resave,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "memberlink=debug,info"
    } else {
        "memberlink=info,warn"
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if let Commands::Keygen = cli.command {
        return cmd_keygen();
    }

    let registry = open_registry(&cli).await?;

    match cli.command {
        Commands::Keygen => Ok(()),
        Commands::List { active } => cmd_list(&registry, active),
        Commands::Show {
            subject_id,
            external,
        } => cmd_show(&registry, subject_id.as_deref(), external.as_deref()),
        Commands::Audit { json } => cmd_audit(&registry, json),
        Commands::Deactivate { subject_id } => cmd_deactivate(&registry, &subject_id).await,
        Commands::Reactivate { subject_id } => cmd_reactivate(&registry, &subject_id).await,
        Commands::Remove { subject_id } => cmd_remove(&registry, &subject_id).await,
        Commands::Resave => cmd_resave(&registry).await,
    }
}

async fn open_registry(cli: &Cli) -> Result<MemberRegistry> {
    let Some(key_hex) = cli.key.as_deref() else {
        bail!("{ENV_ENCRYPTION_KEY} is not set (use --key or the environment)");
    };

    let key = EncryptionKey::from_hex(key_hex).context("Invalid encryption key")?;
    let config = RegistryConfig::new(&cli.path, key);
    debug!(path = %config.path.display(), "Opening registry");

    MemberRegistry::open_from_config(&config)
        .await
        .with_context(|| format!("Failed to open registry at {}", cli.path.display()))
}

/// Generate a new encryption key
fn cmd_keygen() -> Result<()> {
    println!("{}", "🔑 Generating encryption key...".cyan().bold());

    let key = EncryptionKey::generate();
    println!("\n{}={}", ENV_ENCRYPTION_KEY, key.to_hex());

    println!("\n{}", "⚠️  IMPORTANT: Keep this key safe!".red().bold());
    println!("   Credentials written with it cannot be read without it.");

    Ok(())
}

/// List members
fn cmd_list(registry: &MemberRegistry, active_only: bool) -> Result<()> {
    let members = if active_only {
        registry.list_active()
    } else {
        registry.list_all()
    };

    let stats = registry.stats();
    println!(
        "{} {} total, {} active, {} inactive",
        "📋 Members:".cyan().bold(),
        stats.total,
        stats.active,
        stats.inactive
    );

    if members.is_empty() {
        println!("\n{}", "Registry is empty.".yellow());
        return Ok(());
    }

    println!();
    for member in &members {
        let status = if member.is_active {
            "active".green()
        } else {
            "inactive".red()
        };
        println!(
            "   {:>12}  {:<24} {}  {}",
            member.subject_id,
            member.external_account_id,
            status,
            member.registered_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
        );
    }

    Ok(())
}

/// Show one member
fn cmd_show(registry: &MemberRegistry, subject_id: Option<&str>, external: Option<&str>) -> Result<()> {
    let member = match (subject_id, external) {
        (Some(id), _) => registry.get_by_subject(id),
        (None, Some(ext)) => registry.get_by_external_account(ext),
        (None, None) => None,
    };

    let Some(member) = member else {
        bail!("Member not found");
    };

    print_member(&member)
}

fn print_member(member: &Member) -> Result<()> {
    let expired = member.credentials.is_expired_at(Utc::now());

    println!("{} {}", "👤 Subject".cyan().bold(), member.subject_id);
    println!("   {} {}", "External account:".dimmed(), member.external_account_id);
    println!(
        "   {} {}",
        "Status:".dimmed(),
        if member.is_active { "active".green() } else { "inactive".red() }
    );
    println!("   {} {}", "Registered:".dimmed(), member.registered_at.to_rfc3339());
    println!(
        "   {} {}",
        "Credentials refreshed:".dimmed(),
        member.last_credential_refresh.to_rfc3339()
    );
    if let Some(at) = member.deactivated_at {
        println!("   {} {}", "Deactivated:".dimmed(), at.to_rfc3339());
    }
    println!(
        "   {} {} {}",
        "Token expires:".dimmed(),
        member.credentials.expires_at.to_rfc3339(),
        if expired { "(expired)".red() } else { "".normal() }
    );

    println!("\n{}", "Subject snapshot:".yellow().bold());
    println!("{}", serde_json::to_string_pretty(&member.subject)?);
    println!("\n{}", "Profile snapshot:".yellow().bold());
    println!("{}", serde_json::to_string_pretty(&member.profile)?);

    Ok(())
}

/// Audit the registry
fn cmd_audit(registry: &MemberRegistry, json: bool) -> Result<()> {
    let report = registry.audit();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", "🔎 Auditing registry...".cyan().bold());
        println!("   {} {}", "Members:".dimmed(), report.member_count);
        println!("   {} {}", "Mappings:".dimmed(), report.mapping_count);

        if report.is_consistent {
            println!("\n{}", "✅ Registry is consistent.".green().bold());
        } else {
            println!("\n{} {} issue(s):", "❌".red(), report.errors.len());
            for issue in &report.errors {
                println!("   {}", issue);
            }
        }
    }

    ensure_consistent(&report)
}

/// Turns an inconsistent report into a failing exit status.
fn ensure_consistent(report: &AuditReport) -> Result<()> {
    if !report.is_consistent {
        bail!("Registry is inconsistent ({} issue(s))", report.errors.len());
    }
    Ok(())
}

/// Deactivate a member
async fn cmd_deactivate(registry: &MemberRegistry, subject_id: &str) -> Result<()> {
    registry
        .deactivate(subject_id)
        .await
        .context("Failed to deactivate member")?;
    println!("{} {}", "✅ Deactivated:".green(), subject_id);
    Ok(())
}

/// Reactivate a member
async fn cmd_reactivate(registry: &MemberRegistry, subject_id: &str) -> Result<()> {
    registry
        .reactivate(subject_id)
        .await
        .context("Failed to reactivate member")?;
    println!("{} {}", "✅ Reactivated:".green(), subject_id);
    Ok(())
}

/// Remove a member
async fn cmd_remove(registry: &MemberRegistry, subject_id: &str) -> Result<()> {
    registry
        .remove(subject_id)
        .await
        .context("Failed to remove member")?;
    println!("{} {}", "🗑  Removed:".green(), subject_id);
    Ok(())
}

/// Write the loaded state back
async fn cmd_resave(registry: &MemberRegistry) -> Result<()> {
    registry.save().await.context("Failed to save registry")?;
    println!(
        "{} {} member(s) written",
        "✅ Saved:".green(),
        registry.len()
    );
    Ok(())
}
