//! Interactive console: the button panel.
//!
//! Reads one command per line from stdin and prints what happened. While a
//! permission prompt is open the next line answers it instead.

use std::fmt;
use std::str::FromStr;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use workbg_core::error::CoreError;
use workbg_core::permission::PermissionStatus;
use workbg_events::EventJournal;
use workbg_worker::ServiceHost;

use crate::controller::{ControllerHandle, UserAction};
use crate::error::AppResult;
use crate::permission::PromptRequest;

/// Events shown by `history`.
const HISTORY_LINES: usize = 20;

const HELP: &str = "\
Commands:
  start     start the worker (connects first when unbound)
  stop      stop the worker and disconnect
  download  download the configured file
  status    show the connection state
  crash     make the worker die unexpectedly
  history   show recent lifecycle events
  help      show this text
  quit      exit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Action(UserAction),
    Status,
    Crash,
    History,
    Help,
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "status" => Ok(Self::Status),
            "crash" => Ok(Self::Crash),
            "history" | "events" => Ok(Self::History),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" | "q" => Ok(Self::Quit),
            other => other.parse().map(Self::Action).map_err(|_| {
                CoreError::Validation(format!("Unknown command '{other}', try 'help'"))
            }),
        }
    }
}

impl fmt::Display for ConsoleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action(action) => fmt::Display::fmt(action, f),
            Self::Status => f.write_str("status"),
            Self::Crash => f.write_str("crash"),
            Self::History => f.write_str("history"),
            Self::Help => f.write_str("help"),
            Self::Quit => f.write_str("quit"),
        }
    }
}

/// Run the console on stdin until `quit`, end of input or Ctrl-C.
///
/// `prompts` carries permission questions from a
/// [`ChannelPrompt`](crate::permission::ChannelPrompt); pass `None` when
/// prompts are answered without asking.
pub async fn run(
    controller: &ControllerHandle,
    host: &ServiceHost,
    journal: &EventJournal,
    prompts: Option<mpsc::Receiver<PromptRequest>>,
) -> AppResult<()> {
    println!("{HELP}");
    run_lines(
        BufReader::new(tokio::io::stdin()),
        controller,
        host,
        journal,
        prompts,
    )
    .await
}

/// Same as [`run`] but reads lines from `input`.
///
/// A question waiting on `prompts` is shown before the next line is read.
pub async fn run_lines<R>(
    input: R,
    controller: &ControllerHandle,
    host: &ServiceHost,
    journal: &EventJournal,
    mut prompts: Option<mpsc::Receiver<PromptRequest>>,
) -> AppResult<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut open_prompt: Option<PromptRequest> = None;

    loop {
        tokio::select! {
            biased;

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }

            Some(request) = next_prompt(&mut prompts), if open_prompt.is_none() => {
                let names: Vec<_> = request.permissions.iter().map(ToString::to_string).collect();
                println!("Allow {}? [y/n]", names.join(", "));
                open_prompt = Some(request);
            }

            line = lines.next_line() => {
                let Some(line) = line? else {
                    tracing::debug!("End of input");
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                if let Some(request) = open_prompt.take() {
                    open_prompt = answer_prompt(request, line);
                    continue;
                }

                match line.parse::<ConsoleCommand>() {
                    Ok(ConsoleCommand::Quit) => break,
                    Ok(command) => execute(command, controller, host, journal).await?,
                    Err(e) => println!("{e}"),
                }
            }
        }
    }

    // An unanswered prompt counts as a denial once dropped.
    drop(open_prompt);
    Ok(())
}

/// Answer `request` from `line`. Hands the request back when the line is
/// not a yes/no answer.
fn answer_prompt(request: PromptRequest, line: &str) -> Option<PromptRequest> {
    match line.parse::<PermissionStatus>() {
        Ok(status) => {
            request.answer(status);
            None
        }
        Err(_) => {
            println!("Please answer y or n");
            Some(request)
        }
    }
}

async fn next_prompt(prompts: &mut Option<mpsc::Receiver<PromptRequest>>) -> Option<PromptRequest> {
    match prompts {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn execute(
    command: ConsoleCommand,
    controller: &ControllerHandle,
    host: &ServiceHost,
    journal: &EventJournal,
) -> AppResult<()> {
    match command {
        ConsoleCommand::Action(action) => {
            let outcome = controller.act(action).await?;
            println!("{action}: {outcome}");
        }
        ConsoleCommand::Status => {
            let status = controller.status().await?;
            match status.connection_id {
                Some(id) => println!("bound (connection {id})"),
                None if status.pending_attempt.is_some() => println!("connecting"),
                None => println!("unbound"),
            }
            if let Some(failure) = status.last_failure {
                println!("last connect attempt failed: {}", failure.reason);
            }
            println!(
                "worker running: {}, live connections: {}",
                host.is_running(),
                host.connection_count()
            );
        }
        ConsoleCommand::Crash => {
            let notified = host.crash();
            println!("worker crashed, {notified} connection(s) notified");
        }
        ConsoleCommand::History => {
            let events = journal.snapshot();
            let skip = events.len().saturating_sub(HISTORY_LINES);
            for event in events.iter().skip(skip) {
                println!(
                    "{} {:<24} {}",
                    event.timestamp.format("%H:%M:%S%.3f"),
                    event.event_type,
                    event.payload
                );
            }
        }
        ConsoleCommand::Help => println!("{HELP}"),
        ConsoleCommand::Quit => {}
    }
    Ok(())
}
