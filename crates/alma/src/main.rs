//! A simple terminal chat with the assistant.

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use alma::core::{SendOutcome, Session, SessionClosedError};
use alma::model::SearchResult;
use alma::render::{Chunk, ReplyPrinter};
use alma::{Client, Config};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};
use tokio::select;
use tokio::signal::ctrl_c;
use tokio::sync::mpsc;
use tokio::time::sleep;

const BAR_CHAR: &str = "▎";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return;
        }
    };
    debug!("using {config:?}");

    let builder = match Client::new(config).open_chat().await {
        Ok(builder) => builder,
        Err(err) => {
            eprintln!("failed to load the chat: {err}");
            return;
        }
    };

    let (title_tx, mut title_rx) = mpsc::unbounded_channel();
    let session = builder
        .on_title(move |title| {
            title_tx.send(title.to_owned()).ok();
        })
        .build();

    let snapshot = session.snapshot();
    if let Some(title) = snapshot.transcript.title() {
        println!(
            "{} ({} messages)",
            title.bright_magenta().bold(),
            snapshot.transcript.messages().len()
        );
    }

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    loop {
        print!("> ");
        std::io::stdout().flush().unwrap();

        let line = select! {
            line = read_line() => line,
            _ = ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if !stream_reply(&session, line, &progress_style).await {
            break;
        }

        while let Ok(title) = title_rx.try_recv() {
            println!("{}", format!("# {title}").bright_magenta().bold());
        }
    }
}

/// Sends `line` and prints the reply as it streams. Returns `false` if
/// the session is gone.
async fn stream_reply(
    session: &Session,
    line: &str,
    progress_style: &ProgressStyle,
) -> bool {
    let mut snapshot_rx = session.subscribe();
    // Skip the user message, the reply starts right after it.
    let mut printer =
        ReplyPrinter::new(snapshot_rx.borrow().transcript.messages().len() + 1);
    let mut output = Output::default();
    let mut reply = pin!(session.send_message(line));

    let progress_bar = ProgressBar::new_spinner();
    progress_bar.set_style(progress_style.clone());
    progress_bar.set_message("🤔 Thinking...");

    let outcome = loop {
        select! {
            outcome = &mut reply => break outcome,
            changed = snapshot_rx.changed() => {
                if changed.is_err() {
                    break Err(SessionClosedError);
                }
                let transcript =
                    Arc::clone(&snapshot_rx.borrow_and_update().transcript);
                let chunks = printer.advance(&transcript);
                if !chunks.is_empty() {
                    progress_bar.finish_and_clear();
                    output.print(chunks);
                }
            }
            _ = ctrl_c() => {
                session.cancel().ok();
            }
            _ = sleep(Duration::from_millis(100)) => {
                if !progress_bar.is_finished() {
                    progress_bar.inc(1);
                }
            }
        }
    };
    progress_bar.finish_and_clear();

    // The final snapshot is published before the outcome.
    output.print(printer.advance(&session.snapshot().transcript));
    output.end_line();

    let Ok(outcome) = outcome else {
        return false;
    };
    match outcome {
        SendOutcome::Succeeded => {}
        SendOutcome::Cancelled => {
            println!("{}", "(cancelled)".dimmed());
        }
        SendOutcome::Interrupted { error } => {
            println!("{}", format!("Reply interrupted: {error}").red());
        }
        SendOutcome::RateLimited { input, rate_limit } => {
            println!(
                "{}",
                "Too many requests, try again in a moment.".yellow()
            );
            if let Some(rate_limit) = rate_limit {
                println!("{}", rate_limit.to_string().yellow());
            }
            println!("Your message was: {}", input.bright_white());
        }
        SendOutcome::Failed { input, error } => {
            println!("{}", format!("Failed to send message: {error}").red());
            println!("Your message was: {}", input.bright_white());
        }
    }
    true
}

#[derive(Default)]
struct Output {
    in_text: bool,
}

impl Output {
    fn print(&mut self, chunks: Vec<Chunk>) {
        for chunk in chunks {
            match chunk {
                Chunk::Text(text) => {
                    if !self.in_text {
                        print!("{}🤖 ", BAR_CHAR.bright_cyan());
                        self.in_text = true;
                    }
                    print!("{}", text.bright_white());
                }
                Chunk::SearchStarted(query) => {
                    self.end_line();
                    println!(
                        "{}🔍 {}",
                        BAR_CHAR.bright_yellow(),
                        query.bright_white().bold()
                    );
                }
                Chunk::SearchFinished(results) => {
                    self.end_line();
                    print_results(&results);
                }
            }
        }
        std::io::stdout().flush().unwrap();
    }

    fn end_line(&mut self) {
        if self.in_text {
            println!();
            self.in_text = false;
        }
    }
}

fn print_results(results: &[SearchResult]) {
    let bar = BAR_CHAR.bright_yellow();
    if results.is_empty() {
        println!("{bar}   {}", "no results".dimmed());
    }
    for result in results {
        println!("{bar}   {} {}", result.title, result.url.dimmed());
    }
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(count) => {
            if count == 0 {
                return None;
            }
            Some(line)
        }
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
