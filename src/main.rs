mod cli;
mod printer;
mod repl;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;

use querydesk_chat::orchestrator::{ActionOutcome, ChatConfig, Orchestrator};
use querydesk_client::http::{HttpBackend, HttpBackendConfig};
use querydesk_core::messages::{MessageKind, Origin};
use querydesk_settings::QuerydeskSettings;
use querydesk_telemetry::{init_telemetry, TelemetryConfig};

use cli::{AskArgs, Cli, Command};

fn load_settings(cli: &Cli) -> anyhow::Result<QuerydeskSettings> {
    let mut settings = match &cli.config {
        Some(path) => querydesk_settings::load_settings_from_path(path),
        None => querydesk_settings::load_settings(),
    }
    .context("failed to load settings")?;

    if let Some(url) = &cli.base_url {
        settings.backend.base_url = url.clone();
    }
    if let Some(level) = &cli.log_level {
        settings.logging.level = level.clone();
    }
    if let Some(ms) = cli.typing_interval_ms {
        settings.stream.typing_interval_ms = ms;
    }
    settings.validate();
    Ok(settings)
}

fn build_orchestrator(settings: &QuerydeskSettings) -> anyhow::Result<Arc<Orchestrator>> {
    let backend = HttpBackend::new(HttpBackendConfig {
        base_url: settings.backend.base_url.clone(),
        connect_timeout: Duration::from_secs(settings.backend.connect_timeout_secs),
        request_timeout: Duration::from_secs(settings.backend.request_timeout_secs),
    })
    .context("failed to build HTTP client")?;
    Ok(Arc::new(Orchestrator::new(
        Arc::new(backend),
        ChatConfig::from_settings(settings),
    )))
}

/// Ask once, optionally execute and summarize, then exit.
async fn ask_once(orch: &Orchestrator, args: &AskArgs) -> anyhow::Result<()> {
    orch.load_catalog().await;
    for model in &args.models {
        if orch.toggle_model(model).is_none() {
            tracing::warn!(model = %model, "semantic model not offered by backend");
        }
    }
    for service in &args.search_services {
        if orch.toggle_search_service(service).is_none() {
            tracing::warn!(service = %service, "search service not offered by backend");
        }
    }

    check(orch.submit(&args.prompt).await)?;
    if !(args.execute || args.summarize) {
        return Ok(());
    }

    let Some(sql) = last_assistant(orch, MessageKind::GeneratedSql) else {
        bail!("the answer contained no SQL to execute");
    };
    check(orch.execute(&sql).await)?;
    if !args.summarize {
        return Ok(());
    }

    let Some(result) = last_assistant(orch, MessageKind::ExecutedResult) else {
        bail!("no result to summarize");
    };
    check(orch.summarize(&result).await)
}

fn last_assistant(orch: &Orchestrator, kind: MessageKind) -> Option<querydesk_core::ids::MessageId> {
    orch.store()
        .snapshot()
        .into_iter()
        .rev()
        .find(|m| m.origin == Origin::Assistant && m.kind == kind && !m.is_failure())
        .map(|m| m.id)
}

fn check(outcome: ActionOutcome) -> anyhow::Result<()> {
    match outcome {
        ActionOutcome::Completed => Ok(()),
        ActionOutcome::Failed(e) => Err(e).context("request failed"),
        ActionOutcome::Rejected(reason) => bail!("request rejected: {reason:?}"),
        ActionOutcome::Cancelled => bail!("cancelled"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    if let Err(e) = init_telemetry(&TelemetryConfig::from_settings(&settings.logging)) {
        eprintln!("logging disabled: {e}");
    }
    tracing::info!(base_url = %settings.backend.base_url, "starting querydesk");

    let orch = build_orchestrator(&settings)?;
    let printer = printer::spawn(orch.store().subscribe());

    let result = match &cli.command {
        Some(Command::Ask(args)) => ask_once(&orch, args).await,
        Some(Command::Chat) | None => {
            let catalog = orch.load_catalog().await;
            tracing::debug!(
                models = catalog.models().len(),
                search_services = catalog.search_services().len(),
                "catalog ready"
            );
            repl::run(&orch).await
        }
    };

    // Dropping the last store handle closes the event channel.
    drop(orch);
    let _ = printer.await;
    tracing::info!("shutting down");
    result
}
