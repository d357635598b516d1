// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `dmrelay shell` command implementation.
//!
//! Runs the relay in the background and offers a line console for reading
//! and answering direct messages.

use std::sync::Arc;

use colored::Colorize;
use dmrelay_agent::{ConversationSummary, Relay};
use dmrelay_agent::shutdown;
use dmrelay_config::DmRelayConfig;
use dmrelay_core::{CorrespondentId, DmRelayError, JobPhase, JobState, Message, TriggerOutcome};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::error;

use crate::serve::{init_tracing, start_relay};

/// Lines shown by `open`.
const OPEN_TAIL: usize = 20;

/// A parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    List,
    Open(CorrespondentId),
    Reply(CorrespondentId, String),
    Reload,
    Status,
    Token(String),
    Help,
    Quit,
}

/// Parse one console line. `Ok(None)` for a blank line.
pub fn parse_command(line: &str) -> Result<Option<ShellCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map(|(w, r)| (w, r.trim()))
        .unwrap_or((line, ""));

    let command = match word.trim_start_matches('/') {
        "list" | "ls" => ShellCommand::List,
        "open" => ShellCommand::Open(parse_id(rest)?),
        "reply" => {
            let (id, body) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| "usage: reply <user id> <message>".to_string())?;
            let body = body.trim();
            if body.is_empty() {
                return Err("usage: reply <user id> <message>".into());
            }
            ShellCommand::Reply(parse_id(id)?, body.to_string())
        }
        "reload" => ShellCommand::Reload,
        "status" => ShellCommand::Status,
        "token" if !rest.is_empty() => ShellCommand::Token(rest.to_string()),
        "token" => return Err("usage: token <new bot token>".into()),
        "help" | "?" => ShellCommand::Help,
        "quit" | "exit" => ShellCommand::Quit,
        other => return Err(format!("unknown command `{other}`, type `help`")),
    };
    Ok(Some(command))
}

fn parse_id(raw: &str) -> Result<CorrespondentId, String> {
    raw.parse()
        .map_err(|_| format!("`{raw}` is not a user id"))
}

/// Runs the `dmrelay shell` console.
pub async fn run_shell(config: DmRelayConfig) -> Result<(), DmRelayError> {
    // Keep log lines from garbling the prompt unless RUST_LOG asks for them.
    init_tracing("warn");

    let (relay, discord) = start_relay(&config)?;
    let shutdown = shutdown::install_signal_handler();

    let gateway = {
        let relay = Arc::clone(&relay);
        let discord_config = config.discord.clone();
        let reconcile_on_startup = config.history.reconcile_on_startup;
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = discord
                .run(relay, &discord_config, reconcile_on_startup, shutdown)
                .await
            {
                error!(error = %e, "discord connection ended");
            }
        })
    };

    let mut rl = DefaultEditor::new()
        .map_err(|e| DmRelayError::Internal(format!("failed to initialize readline: {e}")))?;

    println!("{}", format!("{} shell", config.agent.name).bold().green());
    println!("Type {} for commands, {} to exit.\n", "help".yellow(), "quit".yellow());

    let prompt = format!("{}> ", "dmrelay".green());
    while !shutdown.is_cancelled() {
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {e}", "error".red());
                break;
            }
        };
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                eprintln!("{}", message.yellow());
                continue;
            }
        };
        let _ = rl.add_history_entry(line.as_str());
        if command == ShellCommand::Quit {
            break;
        }
        execute(&relay, command).await;
    }

    shutdown.cancel();
    if let Err(e) = gateway.await {
        error!(error = %e, "discord task failed");
    }
    relay.shutdown().await;
    println!("{}", "goodbye".dimmed());
    Ok(())
}

async fn execute(relay: &Relay, command: ShellCommand) {
    match command {
        ShellCommand::List => print_list(relay),
        ShellCommand::Open(correspondent) => print_conversation(relay, correspondent),
        ShellCommand::Reply(correspondent, body) => {
            match relay.send_reply(correspondent, &body).await {
                Ok(_) => println!("{}", format!("sent to {correspondent}").green()),
                Err(e) => eprintln!("{}: {e}", "error".red()),
            }
        }
        ShellCommand::Reload => match relay.trigger_reconciliation() {
            TriggerOutcome::Accepted => println!(
                "Reconciling {} conversations in the background. Use {} to follow along.",
                relay.correspondents().len(),
                "status".yellow()
            ),
            TriggerOutcome::RejectedAlreadyRunning => {
                println!("{}", "A reload is already running.".yellow())
            }
        },
        ShellCommand::Status => print_status(relay),
        ShellCommand::Token(token) => {
            relay.set_stored_token(token);
            println!("Token updated. Restart required.");
        }
        ShellCommand::Help => print_help(),
        ShellCommand::Quit => {}
    }
}

fn print_list(relay: &Relay) {
    let summaries = relay.conversation_summaries();
    println!(
        "{} conversations, {} unread",
        summaries.len(),
        relay.total_unread()
    );
    for summary in &summaries {
        println!("  {}", format_summary(summary));
    }
}

/// One `list` row.
pub fn format_summary(summary: &ConversationSummary) -> String {
    let last = summary
        .last_message_at
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".into());
    let unread = if summary.unread_count > 0 {
        format!("{} unread", summary.unread_count).yellow().to_string()
    } else {
        "read".dimmed().to_string()
    };
    format!(
        "{:<20} {:>5} msgs  last {}  {}",
        summary.correspondent, summary.message_count, last, unread
    )
}

fn print_conversation(relay: &Relay, correspondent: CorrespondentId) {
    let Some(conversation) = relay.conversation_snapshot(correspondent) else {
        println!("No conversation with {correspondent}. Start one with `reply {correspondent} <message>`.");
        return;
    };
    println!("{}", format!("=== Conversation with {correspondent} ===").bold());
    let skip = conversation.messages.len().saturating_sub(OPEN_TAIL);
    for message in &conversation.messages[skip..] {
        println!("{}", format_line(correspondent, message));
    }
    relay.mark_read(correspondent);
}

/// One transcript line: `[time] author: body`.
pub fn format_line(correspondent: CorrespondentId, message: &Message) -> String {
    let when = message.timestamp.format("%m-%d %H:%M");
    if message.author_is_self {
        format!("[{when}] {}: {}", "you".cyan(), message.body)
    } else {
        format!("[{when}] {}: {}", correspondent.to_string().magenta(), message.body)
    }
}

fn print_status(relay: &Relay) {
    let connection = relay
        .connection_status()
        .unwrap_or_else(|| "Not connected".into());
    println!("  Discord:  {connection}");
    println!("  Unread:   {}", relay.total_unread());
    println!("  Reload:   {}", describe_job(&relay.status_snapshot()));
}

/// Human summary of the reconciliation register.
pub fn describe_job(state: &JobState) -> String {
    match state.phase {
        JobPhase::Idle => "never run".into(),
        JobPhase::Running => format!(
            "running, {}/{} done, {} failed",
            state.completed, state.total, state.failed
        ),
        JobPhase::Completed => format!("completed, {} conversations", state.completed),
        JobPhase::CompletedWithFailures => format!(
            "completed with failures, {} reconciled, {} failed",
            state.completed, state.failed
        ),
    }
}

fn print_help() {
    println!("  list                    conversations and unread counts");
    println!("  open <id>               last {OPEN_TAIL} messages, marks them read");
    println!("  reply <id> <message>    send a DM (also starts new conversations)");
    println!("  reload                  re-fetch full history for every conversation");
    println!("  status                  connection and reload progress");
    println!("  token <token>           save a new bot token (restart required)");
    println!("  quit                    exit");
}
