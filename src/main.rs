//! frame-db - run or render one SQL statement against a connection group.

use frame_db::config::Cli;
use frame_db::db::{ConnectionRegistry, HookRegistry, JsonRow};
use frame_db::models::Operand;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        subscriber.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn run(cli: &Cli, registry: &ConnectionRegistry) -> Result<(), Box<dyn std::error::Error>> {
    let mut db = registry.db(&cli.group).await?;
    let operands: Vec<Operand> = cli.query_params().into_iter().map(Operand::from).collect();
    db.sql(&cli.sql, operands);
    if cli.force_primary {
        db.force_master();
    }

    if cli.render {
        println!("{}", db.get_sql()?);
        return Ok(());
    }

    if cli.exec {
        let affected = db.exec().await?;
        let output = serde_json::json!({
            "affected_rows": affected,
            "last_insert_id": db.last_insert_id(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let rows: Vec<JsonRow> = db.fetch_all().await?;
    info!(rows = rows.len(), "Query returned");
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse_args();
    init_tracing(&cli);

    let provider = cli.config_provider()?;
    let hooks = Arc::new(HookRegistry::with_slow_query_threshold(
        cli.slow_query_threshold(),
    ));
    let registry = ConnectionRegistry::with_hooks(provider, hooks);

    let result = run(&cli, &registry).await;
    registry.shutdown(&[]).await;

    if let Err(e) = result {
        error!(error = %e, "Command failed");
        return Err(e);
    }
    Ok(())
}
