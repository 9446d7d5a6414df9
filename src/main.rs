use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;

use kanban_steward::board::{BoardService, TrelloClient};
use kanban_steward::config::StewardConfig;
use kanban_steward::steward::Steward;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = StewardConfig::from_env().context("loading configuration")?;

    eprintln!("🗂  Kanban steward v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Current board: {}", config.names.current_board);
    eprintln!("   Archive board: {}", config.names.archive_board);
    eprintln!(
        "   Admin fallback: {}",
        config.admin_username.as_deref().unwrap_or("(none)")
    );

    let service: Arc<dyn BoardService> = Arc::new(TrelloClient::new(config.trello.clone()));
    let steward = Steward::connect(service, &config)
        .await
        .context("resolving boards and lists")?;

    let report = steward.run(Utc::now()).await;
    print!("{report}");

    if report.has_failures() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
