use clap::{Parser, Subcommand};

/// Football competition ingestion, fantasy scoring and standings
#[derive(Parser, Debug, Clone)]
#[command(name = "matchday", version, about)]
pub struct Config {
    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "matchday.db")]
    pub database_path: String,

    /// Base URL of the statistics site that competition paths are resolved against
    #[arg(
        long,
        env = "SOURCE_BASE_URL",
        default_value = "https://www.transfermarkt.com"
    )]
    pub source_base_url: String,

    /// Per-request timeout in seconds for page fetches
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "10")]
    pub request_timeout_secs: u64,

    /// Base delay between consecutive page fetches in milliseconds (jittered)
    #[arg(long, env = "REQUEST_DELAY_MS", default_value = "250")]
    pub request_delay_ms: u64,

    /// User agent sent with every page fetch
    #[arg(
        long,
        env = "USER_AGENT",
        default_value = "Mozilla/5.0 (X11; Linux x86_64) matchday/0.1"
    )]
    pub user_agent: String,

    /// TOML file with the fantasy scoring weight table (built-in table when absent)
    #[arg(long, env = "SCORING_WEIGHTS")]
    pub scoring_weights: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Scrape one competition season and reconcile it into the database
    Ingest {
        /// Competition schedule path, e.g. /premier-league/gesamtspielplan/wettbewerb/GB1/saison_id/
        competition_path: String,
        /// Season appended to the competition path, e.g. 2019
        #[arg(long)]
        season: String,
    },

    /// Compute fantasy points for every played match of a league
    Score {
        league_id: i64,
    },

    /// Create a composite league over existing leagues and group its rounds
    SeedComposite {
        #[arg(long, default_value = "TOP 5 League")]
        name: String,
        #[arg(long = "league", required = true)]
        league_ids: Vec<i64>,
    },

    /// Print standings as JSON (global when no league is given)
    Standings {
        #[arg(long = "league")]
        league_id: Option<i64>,
    },

    /// Serve the JSON query API
    Serve {
        #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
        listen: String,
    },
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be positive");
        }
        let base = url::Url::parse(&self.source_base_url)
            .map_err(|e| anyhow::anyhow!("source_base_url is not a valid URL: {}", e))?;
        if base.cannot_be_a_base() {
            anyhow::bail!("source_base_url must be an absolute http(s) URL");
        }
        if let Command::Ingest { competition_path, .. } = &self.command {
            if !competition_path.starts_with('/') {
                anyhow::bail!("competition path must start with '/'");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ingest_defaults() {
        let config = Config::try_parse_from([
            "matchday",
            "ingest",
            "/premier-league/gesamtspielplan/wettbewerb/GB1/saison_id/",
            "--season",
            "2019",
        ])
        .unwrap();
        assert_eq!(config.request_timeout_secs, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_relative_competition_path_rejected() {
        let config =
            Config::try_parse_from(["matchday", "ingest", "wettbewerb/GB1", "--season", "2019"])
                .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_seed_composite_requires_league() {
        assert!(Config::try_parse_from(["matchday", "seed-composite"]).is_err());
        let config = Config::try_parse_from([
            "matchday",
            "seed-composite",
            "--league",
            "1",
            "--league",
            "2",
        ])
        .unwrap();
        match config.command {
            Command::SeedComposite { name, league_ids } => {
                assert_eq!(name, "TOP 5 League");
                assert_eq!(league_ids, vec![1, 2]);
            }
            other => panic!("Expected SeedComposite, got {:?}", other),
        }
    }
}
