//! Terminal rendering

use colored::*;
use whaddyasay_core::ai::runtime;
use whaddyasay_core::crypto::VaultStatus;
use whaddyasay_core::patterns::PatternReport;
use whaddyasay_core::storage::StorageStats;
use whaddyasay_core::{
    AdviceResult, ConversationRecord, EngineStatus, MemoryRecord, ModelRuntime, PrivacyLevel,
};

fn privacy_badge(level: PrivacyLevel) -> ColoredString {
    match level {
        PrivacyLevel::Complete => "🔒 private".green(),
        PrivacyLevel::CloudProcessed => "☁ cloud".yellow(),
        PrivacyLevel::TemplateBased => "📋 templates".blue(),
    }
}

fn section(title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("\n{}", title.bold());
    for item in items {
        println!("  • {}", item);
    }
}

pub fn print_advice(result: &AdviceResult) {
    let analysis = result.analysis();
    println!(
        "\n{} {}",
        "💬 Conversation plan".bold().blue(),
        format!(
            "({}, {:.0}% confidence)",
            analysis.situation_type.as_str().replace('_', " "),
            analysis.confidence * 100.0
        )
        .dimmed()
    );
    println!("{}", "=".repeat(50).dimmed());
    println!("\n{}", result.strategy());

    section("Key points", result.key_points());
    println!("\n{}", "Try saying".bold());
    for phrase in result.helpful_phrases() {
        println!("  {}", format!("\"{}\"", phrase).cyan());
    }
    section("Avoid", result.pitfalls());
    section("Before you talk", &result.content.preparation_steps);
    section("From your experience", &result.content.personal_insights);
    section("Remember", &result.content.confidence_boosters);
    section("Because it's urgent", &result.content.urgency_considerations);
    section("Questions to ask", &result.content.follow_up_questions);
    section("Afterwards", &result.content.follow_up_considerations);

    println!("\n{}", "=".repeat(50).dimmed());
    println!(
        "{} {} {}",
        privacy_badge(result.privacy_level),
        result.model.dimmed(),
        result.privacy_level.description().dimmed()
    );
    if result.emergency {
        println!("{}", "Basic advice only: every generator failed.".yellow());
    }
}

pub fn print_status(status: &EngineStatus) {
    println!("\n{}", "📡 Advice Engine".bold().blue());
    println!("{}", "=".repeat(30).dimmed());
    println!("Backend:   {}", status.model.green());
    println!("Privacy:   {} {}", privacy_badge(status.privacy_level), status.privacy_description.dimmed());
    println!(
        "Cloud:     {}",
        if status.consent.cloud_api { "allowed".yellow() } else { "not allowed".green() }
    );
    println!(
        "Vault:     {}",
        if status.vault_unlocked { "unlocked".green() } else { "locked".dimmed() }
    );
    println!("Available: {} backend(s)", status.available.len().to_string().bold());
}

pub fn print_memories(memories: &[MemoryRecord]) {
    if memories.is_empty() {
        println!("{}", "No memories found".yellow());
        return;
    }
    for memory in memories {
        let id = memory.id.unwrap_or_default().to_string();
        if memory.decryption_error {
            println!("{}. {}", id.bold().blue(), "unreadable (decryption failed)".red());
            continue;
        }
        if memory.locked {
            println!("{}. {}", id.bold().blue(), "encrypted - unlock the vault to read".dimmed());
            continue;
        }
        println!(
            "{}. {} {}",
            id.bold().blue(),
            memory.title.bold().yellow(),
            format!("[{}]", memory.memory_type).dimmed()
        );
        println!("   {}", memory.content);
        if !memory.tags.is_empty() {
            println!("   {}", memory.tags.join(", ").dimmed());
        }
    }
}

pub fn print_history(conversations: &[ConversationRecord]) {
    if conversations.is_empty() {
        println!("{}", "No coached conversations yet".yellow());
        return;
    }
    for c in conversations {
        let id = c.id.unwrap_or_default().to_string();
        let rating = c
            .success_rating
            .map(|r| format!("{}{}", "★".repeat(r as usize), "☆".repeat(5usize.saturating_sub(r as usize))))
            .unwrap_or_else(|| "not rated".to_string());
        let situation = if c.is_readable() {
            c.situation.clone()
        } else {
            "(encrypted)".to_string()
        };
        println!(
            "{}. {} {} {}",
            id.bold().blue(),
            situation,
            format!("[{}]", c.situation_type.as_str()).dimmed(),
            rating.yellow()
        );
        if let Some(outcome) = &c.outcome {
            println!("   {}", outcome.dimmed());
        }
    }
}

pub fn print_vault_status(status: &VaultStatus) {
    println!("\n{}", "🔐 Encryption".bold().blue());
    println!("{}", "=".repeat(30).dimmed());
    if !status.setup_complete {
        println!("{}", "Not set up. Run `whaddyasay vault setup` to encrypt your data.".yellow());
        return;
    }
    println!("Algorithm:  {} ({})", status.algorithm, status.key_derivation);
    println!("Iterations: {}", status.iterations);
    if let Some(version) = status.key_version {
        println!("Key:        version {}", version);
    }
    println!("Unlocks:    {}", status.auth_count);
    match status.days_until_rotation {
        Some(days) if days <= 0 => println!("{}", "Key rotation is due".yellow()),
        Some(days) => println!("Rotation:   in {} day(s)", days),
        None => {}
    }
}

pub fn print_catalog(runtime: &ModelRuntime, ram_gb: f32) {
    println!("\n{}", "🧠 On-device Models".bold().blue());
    println!("{}", "=".repeat(30).dimmed());
    let best = runtime::recommended_model(ram_gb);
    for model in runtime::catalog() {
        let mut notes = Vec::new();
        if model.id == best.id {
            notes.push("best fit".green().to_string());
        }
        if runtime.is_cached(model.id) {
            notes.push("downloaded".blue().to_string());
        }
        if !runtime::is_suitable(model.id, ram_gb) {
            notes.push("needs more memory".red().to_string());
        }
        println!(
            "  • {} {} {} {}",
            model.id.green(),
            model.size.dimmed(),
            model.description,
            notes.join(" ")
        );
    }
    println!("\nCache: {}", runtime.cache_dir().display().to_string().dimmed());
}

pub fn print_stats(stats: &StorageStats, report: &PatternReport) {
    println!("\n{}", "📊 Your Conversations".bold().blue());
    println!("{}", "=".repeat(30).dimmed());
    println!("Memories:      {}", stats.memories);
    println!("Conversations: {}", stats.conversations);
    println!("Encrypted:     {}", stats.encrypted);
    if stats.unreadable > 0 {
        println!("Unreadable:    {}", stats.unreadable.to_string().red());
    }
    println!(
        "Advice:        {} ({} from models, {} from templates)",
        report.total_advice, report.llm_generated, report.template_generated
    );
    if let Some(avg) = report.average_rating {
        println!("Avg rating:    {:.1}/5 over {} conversation(s)", avg, report.rated_conversations);
    }

    for summary in &report.by_type {
        println!(
            "  • {} {} advice, {} conversation(s){}",
            summary.situation_type.as_str().replace('_', " ").green(),
            summary.advice_count,
            summary.conversations,
            summary
                .average_rating
                .map(|r| format!(", {:.1}/5", r))
                .unwrap_or_default()
        );
    }
    for insight in &report.insights {
        println!("{} {}", "💡".yellow(), insight);
    }
}
