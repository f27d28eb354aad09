use crate::config::Config;
use crate::credential::CookieJar;
use crate::notification::{Notification, OpaqueId};
use crate::snapshot::{HttpSnapshotClient, SnapshotApi};
use crate::surfaces::{badge_label, format_timestamp};
use chrono::Local;
use colored::*;
use std::sync::Arc;

/// Shared implementation of the one-shot `cli` binary.
///
/// Connection settings come from the environment (`NOTIFY_API_URL`,
/// `NOTIFY_COOKIE`, ...).
pub async fn run(args: Vec<String>) -> anyhow::Result<()> {
    let bin = args
        .first()
        .map(|s| s.as_str())
        .unwrap_or("cli")
        .to_string();

    if args.len() < 2 {
        print_usage(&bin);
        return Ok(());
    }

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    let credentials = Arc::new(CookieJar::new(config.cookie.clone().unwrap_or_default()));
    let client = HttpSnapshotClient::new(&config, credentials);

    let command = &args[1];

    match command.as_str() {
        "list" => list(&client).await?,
        "unread" => unread(&client).await?,
        "read" => {
            if args.len() < 3 {
                eprintln!("{}", format!("Usage: {} read <notification_id>", bin).yellow());
                return Ok(());
            }
            mark_read(&client, OpaqueId::new(args[2].clone())).await?;
        }
        "read-all" => mark_all_read(&client).await?,
        "conversations" => conversations(&client).await?,
        _ => {
            eprintln!("{} Unknown command: {}", "✗".red().bold(), command.red());
            print_usage(&bin);
        }
    }

    Ok(())
}

fn print_usage(bin: &str) {
    println!("{}", "🔔 Notification CLI".bright_cyan().bold());
    println!();
    println!("{}", "Usage:".bright_white().bold());
    println!("  {} <command> [args]", bin.cyan());
    println!();
    println!("{}", "Commands:".bright_white().bold());
    println!("  {}                 List all notifications", "list".cyan());
    println!("  {}               Show the unread count", "unread".cyan());
    println!("  {} <id>            Mark one notification as read", "read".cyan());
    println!("  {}             Mark every notification as read", "read-all".cyan());
    println!("  {}        Unread messages per conversation", "conversations".cyan());
    println!();
    println!(
        "  {} {}",
        "-".dimmed(),
        "NOTIFY_COOKIE='session_token=...' cargo run --bin cli -- list".yellow()
    );
}

fn fail(e: impl std::fmt::Display) -> ! {
    eprintln!("{} Error: {}", "✗".red().bold(), e.to_string().red());
    std::process::exit(1);
}

async fn list(client: &HttpSnapshotClient) -> anyhow::Result<()> {
    let notifications = match client.fetch_all().await {
        Ok(list) => list,
        Err(e) => fail(e),
    };

    if notifications.is_empty() {
        println!("{}", "No notifications".yellow());
        return Ok(());
    }

    let unread = notifications.iter().filter(|n| !n.is_read).count();
    println!(
        "{}",
        format!("Notifications ({}, {} unread)", notifications.len(), unread)
            .bright_cyan()
            .bold()
    );
    println!("{}", "─".repeat(60).dimmed());
    let now = Local::now();
    for n in &notifications {
        print_row(n, &now);
    }

    Ok(())
}

fn print_row(n: &Notification, now: &chrono::DateTime<Local>) {
    let marker = if n.is_read { " ".normal() } else { "●".blue().bold() };
    let title = if n.is_read { n.title.normal() } else { n.title.bold() };
    let when = format_timestamp(&n.timestamp.with_timezone(&Local), now);
    println!(
        "  {} [{}] {} {}",
        marker,
        n.id.as_str().cyan(),
        title,
        format!("({:?})", n.kind).dimmed()
    );
    if !n.message.is_empty() {
        println!("      {}", n.message);
    }
    println!("      {}", when.dimmed());
}

async fn unread(client: &HttpSnapshotClient) -> anyhow::Result<()> {
    let count = match client.unread_count().await {
        Ok(count) => count,
        Err(e) => fail(e),
    };
    match badge_label(count) {
        Some(label) => println!("{} {} unread", "🔔".bold(), label.bright_red().bold()),
        None => println!("{}", "✓ All caught up".green().bold()),
    }
    Ok(())
}

async fn mark_read(client: &HttpSnapshotClient, id: OpaqueId) -> anyhow::Result<()> {
    if let Err(e) = client.mark_read(&id).await {
        fail(e);
    }
    println!("{} Marked {} as read", "✓".green().bold(), id.as_str().cyan());
    Ok(())
}

async fn mark_all_read(client: &HttpSnapshotClient) -> anyhow::Result<()> {
    if let Err(e) = client.mark_all_read().await {
        fail(e);
    }
    println!("{}", "✓ All notifications marked as read".green().bold());
    Ok(())
}

async fn conversations(client: &HttpSnapshotClient) -> anyhow::Result<()> {
    let counts = match client.conversation_unread().await {
        Ok(counts) => counts,
        Err(e) => fail(e),
    };

    let total: u64 = counts.values().sum();
    println!(
        "{}",
        format!("Unread messages ({})", total).bright_cyan().bold()
    );
    println!("{}", "─".repeat(60).dimmed());
    if counts.is_empty() {
        println!("  {}", "No conversations".yellow());
    }
    for (conversation, count) in &counts {
        let count = if *count > 0 {
            count.to_string().bright_red().bold()
        } else {
            count.to_string().dimmed()
        };
        println!("  {} {}", conversation.cyan(), count);
    }
    Ok(())
}
