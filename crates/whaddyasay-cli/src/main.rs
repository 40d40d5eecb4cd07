use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::{theme::ColorfulTheme, Password};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use whaddyasay_core::ai::runtime::{self, DownloadProgress};
use whaddyasay_core::crypto::generate_password;
use whaddyasay_core::{
    AdviceRequest, AdviceSession, BackendKind, Config, ConversationContext, MemoryRecord,
    MemorySearch, ModelRuntime, SituationType, Urgency,
};

mod output;

const PASSWORD_ENV: &str = "WHADDYASAY_PASSWORD";

#[derive(Parser)]
#[command(name = "whaddyasay")]
#[command(version)]
#[command(about = "Private conversation coach: local models first, cloud only with your consent")]
struct Cli {
    /// Use a different config file
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Get advice for an upcoming conversation
    Coach {
        /// What the conversation is about
        situation: String,
        /// Setting: general, work, family, friends, romantic
        #[arg(short, long, default_value = "general")]
        context: String,
        /// Who you'll be talking to (e.g. manager, partner)
        #[arg(short, long, default_value = "")]
        relationship: String,
        /// low, medium, or high
        #[arg(short, long, default_value = "medium")]
        urgency: String,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
        /// Don't keep this conversation in history
        #[arg(long)]
        no_save: bool,
    },
    /// Show which backend would answer and how private it is
    Status {
        #[arg(long)]
        json: bool,
    },
    /// List discovered model backends
    Models {
        /// Remember a preferred model (e.g. "ollama:llama3.2")
        #[arg(long)]
        prefer: Option<String>,
    },
    /// Manage consent for cloud models
    Consent {
        #[command(subcommand)]
        action: ConsentAction,
    },
    /// Store and search personal memories
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },
    /// Recent coached conversations
    History {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Record how a coached conversation went
    Outcome {
        /// Conversation id from `history`
        id: i64,
        /// Rating from 1 (badly) to 5 (great)
        rating: u8,
        /// What happened
        outcome: String,
        /// What you'd do differently
        #[arg(short, long)]
        lessons: Option<String>,
    },
    /// Manage the encryption vault
    Vault {
        #[command(subcommand)]
        action: VaultAction,
    },
    /// Manage on-device model weights
    Runtime {
        #[command(subcommand)]
        action: RuntimeAction,
    },
    /// Storage statistics and communication patterns
    Stats {
        /// Only this situation type (e.g. professional, apology)
        #[arg(short = 't', long)]
        situation_type: Option<String>,
    },
    /// Run the MCP server on stdio
    Mcp,
}

#[derive(Subcommand)]
enum ConsentAction {
    /// Allow cloud models
    Grant,
    /// Disallow cloud models
    Revoke,
    /// Show current consent
    Show,
}

#[derive(Subcommand)]
enum MemoryAction {
    /// Remember an experience
    Add {
        title: String,
        content: String,
        /// Comma separated tags
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,
        #[arg(short = 'T', long = "type")]
        memory_type: Option<String>,
    },
    /// Most recent memories
    List {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Search memories by text and tags
    Search {
        #[arg(default_value = "")]
        query: String,
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,
        #[arg(short = 'T', long = "type")]
        memory_type: Option<String>,
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum VaultAction {
    /// Create the vault with a master password
    Setup {
        /// Generate a strong password instead of prompting
        #[arg(long)]
        generate: bool,
    },
    /// Show encryption status
    Status,
    /// Re-wrap the data key under a new password
    Rotate {
        /// Keep the current password and only refresh the salt
        #[arg(long)]
        keep_password: bool,
    },
}

#[derive(Subcommand)]
enum RuntimeAction {
    /// Catalog of on-device models
    List,
    /// Download a model's weights into the cache
    Download {
        /// Model id; defaults to the best fit for this device
        model: Option<String>,
    },
    /// Delete cached weights
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays usable for JSON and MCP
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("whaddyasay=info,whaddyasay_core=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Coach {
            situation,
            context,
            relationship,
            urgency,
            json,
            no_save,
        } => {
            let request = AdviceRequest::new(situation)
                .with_context(ConversationContext::parse(&context))
                .with_relationship(relationship)
                .with_urgency(Urgency::parse(&urgency));
            coach(&config, request, json, no_save).await
        }
        Commands::Status { json } => status(&config, json).await,
        Commands::Models { prefer: Some(model) } => {
            let mut updated = config.clone();
            updated.preferred_model = Some(model.clone());
            match &cli.config {
                Some(path) => updated.save_to(path)?,
                None => updated.save()?,
            }
            println!("{} Preferred model set to {}", "✓".green(), model.bold());
            models(&updated).await
        }
        Commands::Models { prefer: None } => models(&config).await,
        Commands::Consent { action } => consent(&config, action).await,
        Commands::Memory { action } => memory(&config, action),
        Commands::History { limit } => history(&config, limit),
        Commands::Outcome {
            id,
            rating,
            outcome,
            lessons,
        } => record_outcome(&config, id, rating, &outcome, lessons.as_deref()),
        Commands::Vault { action } => vault(&config, action),
        Commands::Runtime { action } => runtime_command(&config, action).await,
        Commands::Stats { situation_type } => stats(&config, situation_type.as_deref()),
        Commands::Mcp => mcp(&config).await,
    }
}

fn password(prompt: &str) -> Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(password);
    }
    Ok(Password::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .interact()?)
}

/// Open the session and unlock the vault when one exists
fn open_session(config: &Config) -> Result<AdviceSession> {
    let mut session = AdviceSession::from_config(config).context("Could not open local storage")?;
    if session.vault().is_setup()? {
        let password = password("Master password")?;
        session.unlock(&password)?;
    }
    Ok(session)
}

async fn coach(config: &Config, request: AdviceRequest, json: bool, no_save: bool) -> Result<()> {
    let mut session = open_session(config)?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner} {msg}")?);
    spinner.set_message("Looking for models...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));

    session.initialize().await?;
    spinner.set_message(format!("Asking {}...", session.selection().identifier()));

    let (id, result) = if no_save {
        (None, session.generate_advice(&request).await)
    } else {
        let (id, result) = session.coach(&request).await?;
        (Some(id), result)
    };
    spinner.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    output::print_advice(&result);
    if let Some(id) = id {
        println!(
            "\nSaved as conversation {}. Afterwards: {}",
            id.to_string().bold(),
            format!("whaddyasay outcome {} <1-5> \"what happened\"", id).cyan()
        );
    }
    Ok(())
}

async fn status(config: &Config, json: bool) -> Result<()> {
    let mut session = AdviceSession::from_config(config)?;
    session.initialize().await?;
    let status = session.status();

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        output::print_status(&status);
    }
    Ok(())
}

async fn models(config: &Config) -> Result<()> {
    let mut session = AdviceSession::from_config(config)?;
    session.initialize().await?;

    println!("\n{}", "🤖 Available Backends".bold().blue());
    println!("{}", "=".repeat(30).dimmed());

    let availability = session.availability();
    if availability.is_empty() {
        println!("{}", "No model backends found; advice will come from templates.".yellow());
        println!("Start a local server: {}", "ollama serve".bold());
        println!("Or download an on-device model: {}", "whaddyasay runtime download".bold());
        return Ok(());
    }

    let selected = session.selection().identifier();
    for kind in BackendKind::all() {
        if !availability.has_kind(kind) {
            continue;
        }
        println!("\n{}", kind.as_str().replace('_', " ").bold());
        for backend in availability.of_kind(kind) {
            let marker = if backend.identifier() == selected { "▶" } else { "•" };
            println!(
                "  {} {} {} {}",
                marker,
                backend.identifier().green(),
                backend.provider.display_name().dimmed(),
                backend.size.as_deref().unwrap_or("").dimmed()
            );
        }
    }
    if !session.consent().cloud_api {
        println!(
            "\n{} Cloud models are hidden until you run {}",
            "ℹ".blue(),
            "whaddyasay consent grant".bold()
        );
    }
    Ok(())
}

async fn consent(config: &Config, action: ConsentAction) -> Result<()> {
    let mut session = AdviceSession::from_config(config)?;
    match action {
        ConsentAction::Grant => {
            session.set_cloud_consent(true).await?;
            println!("{} Cloud models may be used when no local model is available", "✓".green());
        }
        ConsentAction::Revoke => {
            session.set_cloud_consent(false).await?;
            println!("{} Cloud models will not be used", "✓".green());
        }
        ConsentAction::Show => {
            let consent = session.consent();
            println!(
                "Cloud models: {}",
                if consent.cloud_api { "allowed".yellow() } else { "not allowed".green() }
            );
        }
    }
    Ok(())
}

fn memory(config: &Config, action: MemoryAction) -> Result<()> {
    let session = open_session(config)?;
    let records = session.records();

    match action {
        MemoryAction::Add {
            title,
            content,
            tags,
            memory_type,
        } => {
            let mut memory = MemoryRecord::new(title, content).with_tags(tags);
            if let Some(memory_type) = memory_type {
                memory = memory.with_type(memory_type);
            }
            let id = records.store_memory(&memory)?;
            let note = if records.is_encrypting() { " (encrypted)" } else { "" };
            println!("{} Stored memory {}{}", "✓".green(), id, note);
        }
        MemoryAction::List { limit } => output::print_memories(&records.get_memories(limit)?),
        MemoryAction::Search {
            query,
            tags,
            memory_type,
            limit,
        } => {
            let mut search = MemorySearch::new(query).with_tags(tags).with_limit(limit);
            if let Some(memory_type) = memory_type {
                search = search.with_type(memory_type);
            }
            output::print_memories(&records.search_memories(&search)?);
        }
    }
    Ok(())
}

fn history(config: &Config, limit: usize) -> Result<()> {
    let session = open_session(config)?;
    output::print_history(&session.records().get_conversations(limit)?);
    Ok(())
}

fn record_outcome(
    config: &Config,
    id: i64,
    rating: u8,
    outcome: &str,
    lessons: Option<&str>,
) -> Result<()> {
    if !(1..=5).contains(&rating) {
        bail!("Rating must be between 1 and 5");
    }
    let session = open_session(config)?;
    session.records().record_outcome(id, outcome, rating, lessons)?;
    println!("{} Recorded outcome for conversation {}", "✓".green(), id);
    Ok(())
}

fn vault(config: &Config, action: VaultAction) -> Result<()> {
    let mut session = AdviceSession::from_config(config)?;

    match action {
        VaultAction::Setup { generate } => {
            if session.vault().is_setup()? {
                bail!("The vault is already set up; use `whaddyasay vault rotate` to change the password");
            }
            let password = if generate {
                let password = generate_password(24);
                println!("Your master password: {}", password.bold());
                println!("{}", "Store it somewhere safe; it cannot be recovered.".yellow());
                password
            } else if let Ok(password) = std::env::var(PASSWORD_ENV) {
                password
            } else {
                Password::with_theme(&ColorfulTheme::default())
                    .with_prompt("New master password")
                    .with_confirmation("Confirm password", "Passwords don't match")
                    .interact()?
            };
            session.unlock(&password)?;
            println!("{} New memories and conversations will be encrypted", "✓".green());
        }
        VaultAction::Status => {
            let status = session.vault_status()?;
            output::print_vault_status(&status);
        }
        VaultAction::Rotate { keep_password } => {
            let current = password("Current master password")?;
            let new_password = if keep_password {
                None
            } else {
                Some(
                    Password::with_theme(&ColorfulTheme::default())
                        .with_prompt("New master password")
                        .with_confirmation("Confirm password", "Passwords don't match")
                        .interact()?,
                )
            };
            session.rotate_key(&current, new_password.as_deref())?;
            let version = session.vault_status()?.key_version.unwrap_or_default();
            println!("{} Key rotated (version {})", "✓".green(), version);
        }
    }
    Ok(())
}

async fn runtime_command(config: &Config, action: RuntimeAction) -> Result<()> {
    let runtime = ModelRuntime::new(&config.runtime_program, config.model_cache_dir()?);
    let ram = config.device_memory_gb();

    match action {
        RuntimeAction::List => output::print_catalog(&runtime, ram),
        RuntimeAction::Download { model } => {
            let model = match model {
                Some(id) => runtime::find_model(&id)?,
                None => runtime::recommended_model(ram),
            };
            if !runtime::is_suitable(model.id, ram) {
                println!(
                    "{} {} may be too large for {:.0}GB of memory",
                    "⚠".yellow(),
                    model.name,
                    ram
                );
            }

            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")?
                    .progress_chars("=> "),
            );
            bar.set_message(model.name.to_string());

            let path = runtime
                .download(model.id, |progress: DownloadProgress| {
                    if let Some(total) = progress.total {
                        bar.set_length(total);
                    }
                    bar.set_position(progress.downloaded);
                })
                .await?;
            bar.finish_and_clear();
            println!("{} {} cached at {}", "✓".green(), model.name, path.display());

            if runtime.program_path().is_none() {
                println!(
                    "{} Install {} to run on-device models",
                    "ℹ".blue(),
                    config.runtime_program.bold()
                );
            }
        }
        RuntimeAction::Clear => {
            let removed = runtime.clear_cache()?;
            println!("{} Removed {} cached file(s)", "✓".green(), removed);
        }
    }
    Ok(())
}

fn stats(config: &Config, situation_type: Option<&str>) -> Result<()> {
    let filter = match situation_type {
        Some(s) => Some(SituationType::from_str(s).with_context(|| format!("Unknown situation type: {}", s))?),
        None => None,
    };
    let session = open_session(config)?;
    output::print_stats(&session.records().stats()?, &session.pattern_report(filter)?);
    Ok(())
}

async fn mcp(config: &Config) -> Result<()> {
    let mut session = AdviceSession::from_config(config)?;
    // No prompt here: stdin belongs to the protocol
    if session.vault().is_setup()? {
        match std::env::var(PASSWORD_ENV) {
            Ok(password) => session.unlock(&password)?,
            Err(_) => tracing::warn!(
                "Vault is locked; set {} to read encrypted records",
                PASSWORD_ENV
            ),
        }
    }
    session.initialize().await?;
    whaddyasay_core::mcp::run_mcp_server(&mut session).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_coach() {
        let cli = Cli::parse_from([
            "whaddyasay",
            "coach",
            "Ask for a raise",
            "--relationship",
            "manager",
            "-u",
            "high",
        ]);
        match cli.command {
            Commands::Coach {
                situation,
                relationship,
                urgency,
                no_save,
                ..
            } => {
                assert_eq!(situation, "Ask for a raise");
                assert_eq!(relationship, "manager");
                assert_eq!(Urgency::parse(&urgency), Urgency::High);
                assert!(!no_save);
            }
            _ => panic!("expected coach"),
        }
    }

    #[test]
    fn test_parse_memory_tags() {
        let cli = Cli::parse_from(["whaddyasay", "memory", "add", "Retro", "Went fine", "-t", "work,team"]);
        match cli.command {
            Commands::Memory {
                action: MemoryAction::Add { tags, .. },
            } => assert_eq!(tags, vec!["work", "team"]),
            _ => panic!("expected memory add"),
        }
    }
}
