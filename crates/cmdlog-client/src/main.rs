use std::io::{Read, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use cmdlog_client::{AgentConfig, Cli, Command, HistoryService, HttpHistoryService, UploadAgent, UploadOutcome};
use cmdlog_logging::{LogConfig, SubscriberBuilder};
use tracing::{debug, error};

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let _log_guard = SubscriberBuilder::new()
        .with_config(LogConfig::client().with_level(cli.log_level.clone()))
        .try_init()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = AgentConfig::from(&cli);
    let service = HttpHistoryService::new(&config.server_url, config.request_timeout)
        .context("failed to build HTTP client")?;

    match cli.command {
        Command::Session => {
            // Exact body, so `$(cmdlog session)` captures just the id
            let id = service.create_session().await?;
            let mut stdout = std::io::stdout().lock();
            write!(stdout, "{}", id)?;
            stdout.flush()?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Track => {
            let mut raw = Vec::new();
            std::io::stdin()
                .read_to_end(&mut raw)
                .context("failed to read history line from stdin")?;

            let agent = UploadAgent::new(service, config);
            report(agent.record(&raw).await)
        }
        Command::Flush => {
            let agent = UploadAgent::new(service, config);
            report(agent.flush().await)
        }
        Command::Last { count, session } => {
            let body = service.last(count, session).await?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&body)?;
            stdout.flush()?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn report(result: Result<UploadOutcome, cmdlog_client::AgentError>) -> Result<ExitCode> {
    match result {
        Ok(outcome) => {
            debug!(?outcome, "Invocation finished");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            // Queued commands are retried by the next invocation
            error!(error = %err, "cmdlog upload failed");
            Ok(ExitCode::FAILURE)
        }
    }
}
