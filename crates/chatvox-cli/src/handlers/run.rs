//! `run`: speak chat lines read from stdin.

use anyhow::{Context, Result};
use chatvox_core::{RequestId, SpeakTrigger};
use chatvox_engine::TtsService;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use super::{spawn_event_printer, wait_idle};
use crate::bootstrap::CliContext;
use crate::presentation::{print_cache_stats, print_cost_stats, print_processor_stats};

/// One line of operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputLine {
    /// `username: text`
    Chat { username: String, text: String },
    /// `!say <text>`: a manual operator request.
    Say(String),
    Skip,
    Clear,
    Pause,
    Resume,
    Stats,
    /// `!done <request-id>`: the overlay finished playing.
    Done(RequestId),
    Blank,
    Invalid(String),
}

pub fn parse_line(line: &str) -> InputLine {
    let line = line.trim();
    if line.is_empty() {
        return InputLine::Blank;
    }
    if let Some(command) = line.strip_prefix('!') {
        let (name, rest) = command
            .split_once(char::is_whitespace)
            .map_or((command, ""), |(name, rest)| (name, rest.trim()));
        return match name {
            "skip" => InputLine::Skip,
            "clear" => InputLine::Clear,
            "pause" => InputLine::Pause,
            "resume" => InputLine::Resume,
            "stats" => InputLine::Stats,
            "say" if !rest.is_empty() => InputLine::Say(rest.to_string()),
            "done" => rest
                .parse()
                .map_or_else(|_| InputLine::Invalid(line.to_string()), InputLine::Done),
            _ => InputLine::Invalid(line.to_string()),
        };
    }
    match line.split_once(':') {
        Some((username, text)) if !username.trim().is_empty() => InputLine::Chat {
            username: username.trim().to_string(),
            text: text.trim().to_string(),
        },
        _ => InputLine::Invalid(line.to_string()),
    }
}

/// Chat users are keyed by their lowercased name.
fn user_id_for(username: &str) -> String {
    username.to_lowercase()
}

pub async fn execute(ctx: &CliContext) -> Result<()> {
    let service = ctx.service();
    let printer = spawn_event_printer(service.subscribe()?, false);
    println!("Reading `user: text` lines from stdin (Ctrl-D to finish, !skip/!clear/!pause/!resume/!stats).");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            line = lines.next_line() => line.context("Failed to read stdin")?,
        };
        let Some(line) = line else {
            if !wait_idle(service).await? {
                println!("Processor is paused; discarding pending requests.");
            }
            break;
        };
        handle_line(service, parse_line(&line)).await?;
    }

    let discarded = service.shutdown().await;
    if discarded > 0 {
        println!("Discarded {discarded} pending request(s).");
    }
    let _ = printer.await;
    Ok(())
}

async fn handle_line(service: &TtsService, input: InputLine) -> Result<()> {
    match input {
        InputLine::Chat { username, text } => {
            let trigger = SpeakTrigger::chat(user_id_for(&username), username, text);
            report_speak(service, trigger).await;
        }
        InputLine::Say(text) => report_speak(service, SpeakTrigger::admin(text)).await,
        InputLine::Skip => {
            if !service.skip().await? {
                println!("Nothing is playing.");
            }
        }
        InputLine::Clear => {
            let removed = service.clear().await?;
            println!("Cleared {removed} pending request(s).");
        }
        InputLine::Pause => service.pause().await?,
        InputLine::Resume => service.resume().await?,
        InputLine::Stats => {
            print_processor_stats(&service.status().await?.stats);
            print_cost_stats(&service.cost_stats().await);
            print_cache_stats(&service.cache_stats().await);
        }
        InputLine::Done(id) => service.playback_finished(id),
        InputLine::Blank => {}
        InputLine::Invalid(line) => println!("Ignoring unrecognised input: {line}"),
    }
    Ok(())
}

async fn report_speak(service: &TtsService, trigger: SpeakTrigger) {
    let username = trigger.username.clone();
    match service.speak(trigger).await {
        Ok(receipt) => println!("[queued] {username} #{} ({})", receipt.position, receipt.id),
        Err(e) => println!("[rejected] {username}: {}", e.user_message()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_lines() {
        assert_eq!(
            parse_line("  Alice:  hello there "),
            InputLine::Chat {
                username: "Alice".into(),
                text: "hello there".into()
            }
        );
        assert_eq!(
            parse_line("bob: ratio: 2:1"),
            InputLine::Chat {
                username: "bob".into(),
                text: "ratio: 2:1".into()
            }
        );
        assert_eq!(user_id_for("Alice"), "alice");
    }

    #[test]
    fn test_operator_commands() {
        assert_eq!(parse_line("!skip"), InputLine::Skip);
        assert_eq!(parse_line("!pause"), InputLine::Pause);
        assert_eq!(parse_line("!say  hello all"), InputLine::Say("hello all".into()));
        assert_eq!(parse_line("!say"), InputLine::Invalid("!say".into()));

        let id = RequestId::new();
        assert_eq!(parse_line(&format!("!done {id}")), InputLine::Done(id));
        assert!(matches!(parse_line("!done nope"), InputLine::Invalid(_)));
    }

    #[test]
    fn test_blank_and_invalid() {
        assert_eq!(parse_line("   "), InputLine::Blank);
        assert!(matches!(parse_line("no separator"), InputLine::Invalid(_)));
        assert!(matches!(parse_line(": orphan text"), InputLine::Invalid(_)));
    }
}
