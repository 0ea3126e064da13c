use anyhow::Result;
use async_trait::async_trait;

/// Where ingestion reads its documents from.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch the HTML document at a site-relative path such as
    /// `/premier-league/gesamtspielplan/wettbewerb/GB1/saison_id/2019`.
    async fn fetch_page(&self, path: &str) -> Result<String>;

    /// Fetch the short profile document of one player.
    async fn fetch_player_profile(&self, external_id: i64) -> Result<String>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
