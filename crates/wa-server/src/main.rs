// SPDX-License-Identifier: MIT OR Apache-2.0
use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wa_eventlog::EventLog;
use wa_hub::MatchHub;
use wa_judging::JudgingStore;
use wa_runner::MatchRunner;
use wa_server::config::Args;
use wa_server::{build_app, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("wa=debug,wa_server=debug")
    } else {
        EnvFilter::new("wa=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let event_log = EventLog::connect(&args.db_path)
        .await
        .with_context(|| format!("connect event log at {}", args.db_path))?;
    let judging = JudgingStore::connect(&args.db_path)
        .await
        .with_context(|| format!("connect judging store at {}", args.db_path))?;
    let hub = Arc::new(MatchHub::new(args.hub_capacity));
    let provider = args.llm_provider.build()?;

    let runner = MatchRunner::new(event_log, hub, provider);
    let state = Arc::new(AppState { runner, judging: Arc::new(judging) });

    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("bind {}", args.bind))?;
    info!(bind = %args.bind, provider = %args.llm_provider, "wa-server listening");

    axum::serve(listener, app).await.context("serve")
}
