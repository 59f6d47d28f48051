// In app/src/commands.rs

use anyhow::{Context, Result};
use core_types::{Interval, Symbol};
use engine::ControlCommand;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Parses one line typed on stdin. Blank lines yield `None`.
///
/// Accepted forms: `quit` / `exit`, or `SYMBOL INTERVAL` (e.g. `ethusdt 5m`).
pub fn parse_command(line: &str) -> Result<Option<ControlCommand>> {
    let mut parts = line.split_whitespace();
    let Some(first) = parts.next() else {
        return Ok(None);
    };

    if first.eq_ignore_ascii_case("quit") || first.eq_ignore_ascii_case("exit") {
        return Ok(Some(ControlCommand::Shutdown));
    }

    let interval = parts
        .next()
        .context("expected `SYMBOL INTERVAL` or `quit`")?;
    if parts.next().is_some() {
        anyhow::bail!("too many arguments; expected `SYMBOL INTERVAL`");
    }

    Ok(Some(ControlCommand::Switch {
        symbol: Symbol::new(first)?,
        interval: interval.parse::<Interval>()?,
    }))
}

/// Forwards commands typed on stdin until EOF, `quit`, or the controller goes away.
pub async fn read_stdin_commands(commands_tx: mpsc::Sender<ControlCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::info!("Stdin closed. Context switching from the console is no longer available.");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to read from stdin.");
                return;
            }
        };

        match parse_command(&line) {
            Ok(Some(command)) => {
                let shutdown = command == ControlCommand::Shutdown;
                if commands_tx.send(command).await.is_err() || shutdown {
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(input = %line.trim(), error = %e, "Ignoring console input."),
        }
    }
}
