use anyhow::{Context, Result};
use tokio::{
    io::{self, AsyncWriteExt, Stdin},
    select,
};
use tracing::{info, warn};

use crate::{
    cli::ClientArgs,
    protocol::{Framing, MessageReader, is_quit},
    transport::Transport,
};

const CONNECTION_LOST: &str = "*** connection to server lost";

/// Longest line read from the terminal.
const INPUT_LIMIT: usize = 64 * 1024;

/// Terminal front-end: stdin lines go to the relay, relay lines go to stdout.
pub async fn run(args: ClientArgs) -> Result<()> {
    let mut transport = Transport::connect(&args.server, args.framing).await?;
    info!("connected to {}", args.server);

    transport
        .send(&args.name)
        .await
        .context("failed to send name")?;

    // Both readers keep partial lines buffered, so losing a `select!` race
    // never drops input.
    let mut stdin = MessageReader::new(tokio::io::stdin(), Framing::Lines, INPUT_LIMIT);

    run_client_loop(&mut transport, &mut stdin).await?;
    if let Err(error) = transport.close().await {
        warn!(?error, "failed to shutdown client writer cleanly");
    }

    Ok(())
}

async fn run_client_loop(
    transport: &mut Transport,
    stdin: &mut MessageReader<Stdin>,
) -> Result<()> {
    loop {
        select! {
            server_message = transport.receive() => {
                if !handle_server_message(server_message).await? {
                    break;
                }
            }
            input = stdin.next_message() => {
                if !handle_stdin_input(input, transport).await? {
                    break;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                if let Err(error) = ctrl_c {
                    warn!(?error, "ctrl-c handler failed");
                }
                break;
            }
        }
    }
    Ok(())
}

async fn handle_server_message(message: io::Result<Option<String>>) -> Result<bool> {
    match message {
        Ok(Some(line)) => {
            write_stdout(&line).await?;
            Ok(true)
        }
        Ok(None) => {
            write_stdout(CONNECTION_LOST).await?;
            Ok(false)
        }
        Err(error) => {
            warn!(?error, "failed to read from server");
            write_stdout(CONNECTION_LOST).await?;
            Ok(false)
        }
    }
}

async fn handle_stdin_input(
    input: io::Result<Option<String>>,
    transport: &mut Transport,
) -> Result<bool> {
    let Some(input) = input? else {
        return Ok(false);
    };

    let text = input.trim_end();
    if text.trim().is_empty() {
        return Ok(true);
    }

    if let Err(error) = transport.send(text).await {
        warn!(?error, "failed to send message");
        write_stdout(CONNECTION_LOST).await?;
        return Ok(false);
    }

    if is_quit(text) {
        write_stdout("*** leaving chat").await?;
        return Ok(false);
    }

    Ok(true)
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
