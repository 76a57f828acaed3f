use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;

use crynux_chat::config::{Config, LogConfig};
use crynux_chat::logging;
use crynux_chat::prompt::{self, Command, HELP, Input};
use crynux_chat::session::ChatSession;
use crynux_chat::task::TaskClient;
use crynux_chat::transport::http::HttpTransport;

/// Install the subscriber. With a log dir, the full log goes to the file and
/// stderr only gets warnings, keeping the prompt readable.
fn init_logging(log: &LogConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = || {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&log.level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let Some(dir) = &log.dir else {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .init();
        return Ok(None);
    };

    let (file_writer, guard) = tracing_appender::non_blocking(logging::file_appender(dir)?);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(filter()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_filter(LevelFilter::WARN),
        )
        .init();
    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::load();

    // Held until exit so buffered lines reach the log file.
    let _log_guard = init_logging(&config.log)?;

    for warning in &config.warnings {
        tracing::warn!("{warning}");
    }

    tracing::info!(
        bridge_url = %config.bridge_url,
        model = config.default_model(),
        "crynux-chat starting"
    );

    let transport =
        HttpTransport::new(&config.bridge_url)?.with_result_route(config.result_route);
    let client = TaskClient::new(Arc::new(transport)).with_policy(config.poll_policy());
    let mut session = ChatSession::new(
        client,
        config.default_model(),
        config.generation.clone(),
        config.seed,
        config.task_timeout(),
    );

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    stdout.write_all(format!("{HELP}\n").as_bytes()).await?;

    loop {
        stdout
            .write_all(format!("[{}] > ", session.model()).as_bytes())
            .await?;
        stdout.flush().await?;

        let line = match prompt::read_input(&mut lines, tokio::signal::ctrl_c()).await? {
            Input::Line(line) => line,
            Input::Eof => break,
            Input::Interrupted => {
                stdout.write_all(b"\n").await?;
                break;
            }
        };

        let message = match Command::parse(&line) {
            Command::Empty => continue,
            Command::Quit => break,
            Command::Reset => {
                session.reset();
                stdout.write_all(b"history cleared\n").await?;
                continue;
            }
            Command::Models => {
                let listing = config.models.join("\n");
                stdout.write_all(format!("{listing}\n").as_bytes()).await?;
                continue;
            }
            Command::Model(name) => {
                session.set_model(name);
                continue;
            }
            Command::Help => {
                stdout.write_all(format!("{HELP}\n").as_bytes()).await?;
                continue;
            }
            Command::Chat(message) => message,
        };

        // Ctrl-C cancels the turn in flight, not the whole session.
        let cancel = CancellationToken::new();
        let outcome = {
            let turn = session.send(message, &cancel);
            tokio::pin!(turn);
            tokio::select! {
                outcome = &mut turn => outcome,
                _ = tokio::signal::ctrl_c() => {
                    cancel.cancel();
                    turn.await
                }
            }
        };

        match outcome {
            Ok(reply) => {
                stdout.write_all(format!("{reply}\n").as_bytes()).await?;
            }
            Err(e) => {
                tracing::error!(task_id = ?e.task_id(), "chat turn failed: {e}");
                stdout
                    .write_all(format!("error: {}\n", e.user_message()).as_bytes())
                    .await?;
            }
        }
    }

    tracing::info!("crynux-chat shutting down");
    Ok(())
}
