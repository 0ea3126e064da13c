use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::source::PageSource;
use crate::config::Config;

const PROFILE_TOOLTIP_PATH: &str = "/spieler/_profilTooltip";

/// HTTP document source for the statistics site.
#[derive(Clone)]
pub struct TransfermarktClient {
    http: Client,
    base_url: Url,
    /// Base politeness delay before each fetch; up to the same amount again is
    /// added as jitter.
    delay: Duration,
}

impl TransfermarktClient {
    pub fn new(base_url: &str, timeout: Duration, delay: Duration, user_agent: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("Failed to build HTTP client")?;
        let base_url = Url::parse(base_url).context("Invalid source base URL")?;
        Ok(TransfermarktClient {
            http,
            base_url,
            delay,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.source_base_url,
            Duration::from_secs(config.request_timeout_secs),
            Duration::from_millis(config.request_delay_ms),
            &config.user_agent,
        )
    }

    fn url_for(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Cannot resolve '{}' against {}", path, self.base_url))
    }

    async fn pause(&self) {
        if self.delay.is_zero() {
            return;
        }
        let jitter = {
            let max = self.delay.as_millis() as u64;
            rand::thread_rng().gen_range(0..=max)
        };
        tokio::time::sleep(self.delay + Duration::from_millis(jitter)).await;
    }

    async fn read_body(resp: reqwest::Response, what: &str) -> Result<String> {
        if !resp.status().is_success() {
            anyhow::bail!("{} returned {}", what, resp.status());
        }
        resp.text()
            .await
            .with_context(|| format!("Failed to read {} body", what))
    }
}

#[async_trait]
impl PageSource for TransfermarktClient {
    fn name(&self) -> &str {
        "transfermarkt"
    }

    async fn fetch_page(&self, path: &str) -> Result<String> {
        let url = self.url_for(path)?;
        self.pause().await;
        debug!("Fetching {}", url);

        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;
        Self::read_body(resp, url.as_str()).await
    }

    async fn fetch_player_profile(&self, external_id: i64) -> Result<String> {
        let url = self.url_for(PROFILE_TOOLTIP_PATH)?;
        self.pause().await;
        debug!("Fetching profile of player {}", external_id);

        let resp = self
            .http
            .post(url)
            .form(&[("spieler_id", external_id.to_string())])
            .send()
            .await
            .with_context(|| format!("Profile request for player {} failed", external_id))?;
        Self::read_body(resp, "player profile").await
    }
}
