use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

mod api;
mod config;
mod db;
mod error;
mod fantasy;
mod ingest;
mod standings;
mod transfermarkt;

use api::AppState;
use config::{Command, Config};
use db::Database;
use fantasy::{FantasyEngine, ScoringWeights};
use ingest::LeagueIngestor;
use transfermarkt::TransfermarktClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let db = Database::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);

    match &config.command {
        Command::Ingest {
            competition_path,
            season,
        } => {
            let client = TransfermarktClient::from_config(&config)?;
            let ingestor = LeagueIngestor::new(db, Arc::new(client));
            let report = ingestor.ingest(competition_path, season).await?;
            if !report.anomalies.is_empty() {
                warn!(
                    "{} anomalies while ingesting {}",
                    report.anomalies.len(),
                    report.league_name
                );
            }
            print_json(&report)?;
        }

        Command::Score { league_id } => {
            let weights = match &config.scoring_weights {
                Some(path) => ScoringWeights::load(path)?,
                None => ScoringWeights::default(),
            };
            let engine = FantasyEngine::new(db, weights);
            let report = engine.process_league(*league_id)?;
            print_json(&report)?;
        }

        Command::SeedComposite { name, league_ids } => {
            let league = ingest::seed_composite_league(&db, name, league_ids)?;
            print_json(&league)?;
        }

        Command::Standings { league_id } => {
            let table = standings::compute_standings(&db, *league_id)?;
            print_json(&table)?;
        }

        Command::Serve { listen } => {
            let addr: SocketAddr = listen
                .parse()
                .with_context(|| format!("Invalid listen address {}", listen))?;
            let app = api::router(AppState { db });
            info!("Query API listening on http://{}", addr);
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
