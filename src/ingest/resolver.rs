use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

use super::IngestContext;
use crate::db::models::{NewPlayer, Player, Position, Stadium, Team};
use crate::db::Database;
use crate::transfermarkt::{parse_player_profile, PageSource, PlayerRef, TeamRef};

/// Maps references found on pages onto stored teams, players and stadiums,
/// creating them on first sight. Every write is an upsert keyed by code,
/// external id or stadium key, so a second pass never duplicates rows.
#[derive(Clone)]
pub struct EntityResolver {
    db: Database,
    source: Arc<dyn PageSource>,
}

impl EntityResolver {
    pub fn new(db: Database, source: Arc<dyn PageSource>) -> Self {
        EntityResolver { db, source }
    }

    /// Team by name (its code), with membership in the league and, for
    /// grouped competitions, in the group.
    pub fn resolve_team(&self, team: &TeamRef, league_id: i64, group_id: Option<i64>) -> Result<Team> {
        let stored = self
            .db
            .upsert_team(&team.name, &team.name, team.crest.as_deref())?;
        self.db.add_team_to_league(stored.id, league_id)?;
        if let Some(group_id) = group_id {
            self.db.add_team_to_league(stored.id, group_id)?;
        }
        Ok(stored)
    }

    pub fn resolve_stadium(&self, name: &str) -> Result<Stadium> {
        self.db.upsert_stadium(&stadium_key(name), name.trim())
    }

    /// Player listed in a lineup. A player whose profile was already read is
    /// reused as is, even if it gave no position; otherwise the profile is
    /// fetched. A failed fetch is an anomaly, the player is stored with an
    /// unknown position and the fetch is retried on the next pass.
    pub async fn resolve_lineup_player(
        &self,
        ctx: &mut IngestContext,
        player: &PlayerRef,
        team_id: i64,
        shirt_number: Option<i32>,
    ) -> Result<Player> {
        if let Some(known) = self.db.find_player_by_external_id(player.external_id)? {
            if known.is_fully_resolved() {
                self.db.add_player_to_team(known.id, team_id)?;
                return Ok(known);
            }
        }

        let (first_name, last_name) = split_name(&player.name);
        let mut new_player = NewPlayer {
            external_id: player.external_id,
            first_name,
            last_name,
            position: Some(Position::Unknown),
            shirt_number,
            ..Default::default()
        };

        match self.source.fetch_player_profile(player.external_id).await {
            Ok(html) => {
                let profile = parse_player_profile(&html);
                debug!(
                    player = player.external_id,
                    position = %profile.position,
                    "profile fetched"
                );
                if let Some(name) = profile.name.as_deref() {
                    let (first, last) = split_name(name);
                    new_player.first_name = first;
                    new_player.last_name = last;
                }
                new_player.position = Some(profile.position);
                new_player.birth_date = profile.birth_date;
                new_player.market_value = profile.market_value;
                new_player.profile_picture = profile.profile_picture;
                new_player.profile_fetched = true;
            }
            Err(e) => ctx.anomaly(
                format!("player {}", player.external_id),
                format!("profile unavailable, position left unknown: {:#}", e),
            ),
        }

        let stored = self.db.upsert_player(&new_player)?;
        self.db.add_player_to_team(stored.id, team_id)?;
        Ok(stored)
    }

    /// Player named by an event row (goal, card, substitution, penalty).
    /// Stored from the reference alone, without a profile fetch.
    pub fn resolve_event_player(&self, player: &PlayerRef, team_id: i64) -> Result<Player> {
        if let Some(known) = self.db.find_player_by_external_id(player.external_id)? {
            self.db.add_player_to_team(known.id, team_id)?;
            return Ok(known);
        }
        let (first_name, last_name) = split_name(&player.name);
        let stored = self.db.upsert_player(&NewPlayer {
            external_id: player.external_id,
            first_name,
            last_name,
            ..Default::default()
        })?;
        self.db.add_player_to_team(stored.id, team_id)?;
        Ok(stored)
    }
}

/// "Pierre-Emerick Aubameyang" -> (Some("Pierre-Emerick"), "Aubameyang").
/// A single word is a last name.
pub fn split_name(full: &str) -> (Option<String>, String) {
    let full = full.trim();
    match full.split_once(char::is_whitespace) {
        Some((first, last)) => (Some(first.to_string()), last.trim().to_string()),
        None => (None, full.to_string()),
    }
}

/// Stable lookup key for a stadium display name.
pub fn stadium_key(name: &str) -> String {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::LeagueLayout;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Offline;

    /// Serves a profile page that names the player but gives no position.
    #[derive(Default)]
    struct PositionlessProfile {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl PageSource for PositionlessProfile {
        async fn fetch_page(&self, path: &str) -> Result<String> {
            anyhow::bail!("no page {}", path)
        }
        async fn fetch_player_profile(&self, _id: i64) -> Result<String> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(r#"<div class="spielername-kurzprofil"><a href="/profil">Bernd Leno</a></div>"#.to_string())
        }
        fn name(&self) -> &str {
            "positionless"
        }
    }

    #[async_trait]
    impl PageSource for Offline {
        async fn fetch_page(&self, path: &str) -> Result<String> {
            anyhow::bail!("offline: {}", path)
        }
        async fn fetch_player_profile(&self, id: i64) -> Result<String> {
            anyhow::bail!("offline: player {}", id)
        }
        fn name(&self) -> &str {
            "offline"
        }
    }

    #[test]
    fn test_split_name() {
        assert_eq!(
            split_name("Pierre-Emerick Aubameyang"),
            (Some("Pierre-Emerick".to_string()), "Aubameyang".to_string())
        );
        assert_eq!(
            split_name("Virgil van Dijk"),
            (Some("Virgil".to_string()), "van Dijk".to_string())
        );
        assert_eq!(split_name("Jorginho"), (None, "Jorginho".to_string()));
    }

    #[test]
    fn test_stadium_key() {
        assert_eq!(stadium_key("Emirates Stadium"), "emirates-stadium");
        assert_eq!(stadium_key("  St. James' Park "), "st-james-park");
    }

    #[test]
    fn test_team_resolution_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let resolver = EntityResolver::new(db.clone(), Arc::new(Offline));
        let league = db
            .get_or_create_regular_league("Premier League", Some("2019"), LeagueLayout::Single)
            .unwrap();
        let team = TeamRef {
            name: "Arsenal FC".into(),
            crest: None,
        };
        let a = resolver.resolve_team(&team, league.id, None).unwrap();
        let b = resolver.resolve_team(&team, league.id, None).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.code, "Arsenal FC");
        assert_eq!(db.count_rows("teams").unwrap(), 1);
        assert_eq!(db.teams_in_league(league.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_profile_fetch_degrades_to_unknown() {
        let db = Database::open_in_memory().unwrap();
        let resolver = EntityResolver::new(db.clone(), Arc::new(Offline));
        let team = db.upsert_team("Arsenal FC", "Arsenal FC", None).unwrap();
        let mut ctx = IngestContext::new("test");

        let player = PlayerRef {
            external_id: 101,
            name: "Bernd Leno".into(),
        };
        let stored = resolver
            .resolve_lineup_player(&mut ctx, &player, team.id, Some(1))
            .await
            .unwrap();
        assert_eq!(stored.position, Position::Unknown);
        assert_eq!(stored.last_name, "Leno");
        assert_eq!(stored.shirt_number, Some(1));
        assert_eq!(ctx.anomalies().len(), 1);
        assert_eq!(db.players_of_team(team.id).unwrap().len(), 1);
        assert!(!stored.is_fully_resolved());
    }

    #[tokio::test]
    async fn test_profile_without_position_is_fetched_once() {
        let db = Database::open_in_memory().unwrap();
        let source = Arc::new(PositionlessProfile::default());
        let resolver = EntityResolver::new(db.clone(), source.clone());
        let team = db.upsert_team("Arsenal FC", "Arsenal FC", None).unwrap();
        let mut ctx = IngestContext::new("test");
        let player = PlayerRef {
            external_id: 101,
            name: "B. Leno".into(),
        };

        for _ in 0..2 {
            let stored = resolver
                .resolve_lineup_player(&mut ctx, &player, team.id, None)
                .await
                .unwrap();
            assert_eq!(stored.position, Position::Unknown);
            assert_eq!(stored.first_name.as_deref(), Some("Bernd"));
        }
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        assert!(ctx.anomalies().is_empty());
    }
}
