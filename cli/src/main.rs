//! Rapport CLI - line-oriented front end over [`rapport_engine::Session`].
//!
//! ```text
//! stdin lines -> parse_line() -> Session::{send, set_field, submit}
//!                                        |
//!                 transcript printer <- watch<SessionView>
//! ```
//!
//! Plain lines are chat input. Lines starting with `/` are local commands;
//! see [`HELP`].

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use rapport_engine::intent::intent_specs;
use rapport_engine::render::{
    EMPTY_TRANSCRIPT_PLACEHOLDER, render_entry, render_form, render_suggestions, status_line,
};
use rapport_engine::{
    AsyncStatus, FormSnapshot, HttpBackend, OperationKind, RapportConfig, SendOutcome, Session,
    SessionView, config_path,
};

const HELP: &str = "\
Commands:
  /set <field> <value>  edit a form field (e.g. /set hcp_name Dr. Smith)
  /submit               log the current form as an interaction
  /form                 show the form
  /suggestions          show AI suggested follow-ups
  /status               show request status
  /help                 show this help
  /quit                 exit
Anything else is sent to the assistant.";

/// [`HELP`] plus the lookups the assistant recognizes in chat.
fn help_text() -> String {
    let mut text = format!("{HELP}\n\nAsk about:");
    for spec in intent_specs() {
        text.push_str(&format!(
            "\n  {:<22}{}",
            spec.keywords.join(" / "),
            spec.description
        ));
    }
    text
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // No log file: stay silent rather than interleave logs with the transcript.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.rapport/logs/rapport.log
    if let Some(config_path) = config_path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("rapport.log"));
    }

    // Fallback: ./.rapport/logs/rapport.log
    candidates.push(PathBuf::from(".rapport").join("logs").join("rapport.log"));

    candidates
}

#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    Blank,
    Chat(&'a str),
    Set { field: &'a str, value: &'a str },
    Submit,
    Form,
    Suggestions,
    Status,
    Help,
    Quit,
    Unknown(&'a str),
}

fn parse_line(line: &str) -> Line<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Line::Blank;
    }
    let Some(command) = trimmed.strip_prefix('/') else {
        return Line::Chat(line);
    };

    let (name, rest) = command
        .split_once(char::is_whitespace)
        .map_or((command, ""), |(name, rest)| (name, rest.trim_start()));

    match name {
        "set" => {
            let (field, value) = rest
                .split_once(char::is_whitespace)
                .map_or((rest, ""), |(field, value)| (field, value.trim()));
            if field.is_empty() {
                Line::Unknown(trimmed)
            } else {
                Line::Set { field, value }
            }
        }
        "submit" => Line::Submit,
        "form" => Line::Form,
        "suggestions" => Line::Suggestions,
        "status" => Line::Status,
        "help" | "?" => Line::Help,
        "quit" | "q" | "exit" => Line::Quit,
        _ => Line::Unknown(trimmed),
    }
}

/// Print transcript entries as they are appended, and the status line when
/// a request fails.
fn spawn_transcript_printer(mut views: watch::Receiver<SessionView>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut printed = 0;
        let mut seen_failures = 0;

        while views.changed().await.is_ok() {
            let view = views.borrow_and_update().clone();
            for message in view.messages.iter().skip(printed) {
                println!("{}\n", render_entry(message).to_text());
            }
            printed = view.messages.len();

            if let Some(line) = new_failure_line(&view, seen_failures) {
                println!("! {line}\n");
            }
            seen_failures = view.failures;
        }
    })
}

/// Error text for failures recorded since `seen`. Only shown while the
/// session is still in the Failed state.
fn new_failure_line(view: &SessionView, seen: u64) -> Option<String> {
    if view.failures == seen {
        return None;
    }
    status_line(view.status, view.last_error.as_ref())
}

fn print_status(view: &SessionView) {
    println!("Status: {:?}", view.status);
    for (kind, status) in view.statuses.iter() {
        println!("  {:<22} {status:?}", kind.as_str());
    }
    if let Some(line) = status_line(view.status, view.last_error.as_ref()) {
        println!("Error: {line}");
    }
}

async fn handle_line(session: &Session, line: Line<'_>) -> Result<bool> {
    match line {
        Line::Blank => {}
        Line::Chat(text) => {
            if let SendOutcome::Requested(op) = session.send(text).await? {
                tracing::debug!(operation = %op.kind(), "Request issued");
            }
        }
        Line::Set { field, value } => {
            if let Err(e) = session.set_field(field, value) {
                println!("! {e}");
            }
        }
        Line::Submit => {
            session.submit().await?.finished().await?;
            let view = session.snapshot().await?;
            if view.statuses.get(OperationKind::CreateRecord) == AsyncStatus::Succeeded {
                println!("Interaction logged ({} this session).", view.records.len());
            }
        }
        Line::Form => {
            for row in render_form(&session.view().form) {
                println!("{row}");
            }
        }
        Line::Suggestions => {
            for row in render_suggestions(&session.view().suggestions) {
                println!("{row}");
            }
        }
        Line::Status => print_status(&session.view()),
        Line::Help => println!("{}", help_text()),
        Line::Quit => return Ok(false),
        Line::Unknown(input) => println!("Unknown command: {input} (try /help)"),
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = match RapportConfig::load() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            eprintln!("Warning: {e}; using defaults");
            RapportConfig::default()
        }
    };
    let backend = HttpBackend::new(&config.client_config()?)?;
    tracing::info!(base_url = %backend.base_url(), "Using backend");

    let mut session = Session::start(
        Arc::new(backend),
        FormSnapshot::new_session(),
        config.engine_settings(),
    );
    let printer = spawn_transcript_printer(session.subscribe());

    println!("{EMPTY_TRANSCRIPT_PLACEHOLDER} (/help for commands)\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match handle_line(&session, parse_line(&line)).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                eprintln!("Error: {e:?}");
                break;
            }
        }
    }

    session.shutdown().await;
    printer.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use rapport_engine::{ApiFailure, AsyncStatus, FormSnapshot, OperationStatuses, SessionView};

    use super::{Line, help_text, new_failure_line, parse_line};

    fn failed_view(failures: u64, detail: &str) -> SessionView {
        SessionView {
            form: FormSnapshot::default(),
            messages: Vec::new(),
            records: Vec::new(),
            suggestions: Vec::new(),
            status: AsyncStatus::Failed,
            statuses: OperationStatuses::default(),
            last_error: Some(ApiFailure::Detail(detail.to_string())),
            failures,
        }
    }

    #[test]
    fn back_to_back_failures_are_each_reported() {
        let first = failed_view(1, "HCP not found");
        assert_eq!(
            new_failure_line(&first, 0).as_deref(),
            Some("HCP not found")
        );
        // Pending was coalesced away; only the counter moved.
        let second = failed_view(2, "HCP not found");
        assert_eq!(
            new_failure_line(&second, 1).as_deref(),
            Some("HCP not found")
        );
        assert_eq!(new_failure_line(&second, 2), None);
    }

    #[test]
    fn plain_text_is_chat() {
        assert_eq!(
            parse_line("It was a call, not a meeting"),
            Line::Chat("It was a call, not a meeting")
        );
        assert_eq!(parse_line("   "), Line::Blank);
    }

    #[test]
    fn set_keeps_spaces_in_value() {
        assert_eq!(
            parse_line("/set hcp_name  Dr. Smith "),
            Line::Set {
                field: "hcp_name",
                value: "Dr. Smith"
            }
        );
        assert_eq!(
            parse_line("/set outcomes"),
            Line::Set {
                field: "outcomes",
                value: ""
            }
        );
        assert_eq!(parse_line("/set"), Line::Unknown("/set"));
    }

    #[test]
    fn help_lists_chat_lookups() {
        let help = help_text();
        assert!(help.starts_with("Commands:"));
        assert!(help.contains("history / records"));
        assert!(help.contains("Suggest next steps for the HCP"));
    }

    #[test]
    fn known_commands() {
        assert_eq!(parse_line("/submit"), Line::Submit);
        assert_eq!(parse_line(" /form "), Line::Form);
        assert_eq!(parse_line("/suggestions"), Line::Suggestions);
        assert_eq!(parse_line("/status"), Line::Status);
        assert_eq!(parse_line("/?"), Line::Help);
        assert_eq!(parse_line("/q"), Line::Quit);
        assert_eq!(parse_line("/launch"), Line::Unknown("/launch"));
    }
}
