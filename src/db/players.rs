use anyhow::Result;
use rusqlite::{params, OptionalExtension};

use super::models::{NewPlayer, Player, Position};
use super::Database;

const PLAYER_COLUMNS: &str = "id, external_id, first_name, last_name, position, birth_date,
                              shirt_number, market_value, profile_picture, profile_fetched";

impl Database {
    pub fn find_player(&self, id: i64) -> Result<Option<Player>> {
        let conn = self.conn();
        let player = conn
            .query_row(
                &format!("SELECT {} FROM players WHERE id=?1", PLAYER_COLUMNS),
                params![id],
                map_player,
            )
            .optional()?;
        Ok(player)
    }

    pub fn find_player_by_external_id(&self, external_id: i64) -> Result<Option<Player>> {
        let conn = self.conn();
        let player = conn
            .query_row(
                &format!("SELECT {} FROM players WHERE external_id=?1", PLAYER_COLUMNS),
                params![external_id],
                map_player,
            )
            .optional()?;
        Ok(player)
    }

    /// Insert or update a player keyed by external id. Known facts are never
    /// downgraded: an unknown position or a missing optional field keeps the
    /// stored value, and a fetched profile stays fetched.
    pub fn upsert_player(&self, player: &NewPlayer) -> Result<Player> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO players (external_id, first_name, last_name, position, birth_date,
                                  shirt_number, market_value, profile_picture, profile_fetched)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)
             ON CONFLICT(external_id) DO UPDATE SET
                first_name=COALESCE(excluded.first_name, players.first_name),
                last_name=excluded.last_name,
                position=CASE WHEN excluded.position='unknown'
                              THEN players.position ELSE excluded.position END,
                birth_date=COALESCE(excluded.birth_date, players.birth_date),
                shirt_number=COALESCE(excluded.shirt_number, players.shirt_number),
                market_value=COALESCE(excluded.market_value, players.market_value),
                profile_picture=COALESCE(excluded.profile_picture, players.profile_picture),
                profile_fetched=MAX(excluded.profile_fetched, players.profile_fetched)",
            params![
                player.external_id,
                player.first_name,
                player.last_name,
                player.position.unwrap_or(Position::Unknown),
                player.birth_date,
                player.shirt_number,
                player.market_value,
                player.profile_picture,
                player.profile_fetched,
            ],
        )?;
        let stored = conn.query_row(
            &format!("SELECT {} FROM players WHERE external_id=?1", PLAYER_COLUMNS),
            params![player.external_id],
            map_player,
        )?;
        Ok(stored)
    }

    /// Record that a player appeared for a team (idempotent)
    pub fn add_player_to_team(&self, player_id: i64, team_id: i64) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO player_teams (player_id, team_id) VALUES (?1, ?2)",
            params![player_id, team_id],
        )?;
        Ok(())
    }

    pub fn players_of_team(&self, team_id: i64) -> Result<Vec<Player>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT p.id, p.external_id, p.first_name, p.last_name, p.position, p.birth_date,
                    p.shirt_number, p.market_value, p.profile_picture, p.profile_fetched
             FROM players p JOIN player_teams pt ON pt.player_id = p.id
             WHERE pt.team_id=?1 ORDER BY p.last_name, p.id",
        )?;
        let players = stmt
            .query_map(params![team_id], map_player)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(players)
    }
}

fn map_player(row: &rusqlite::Row) -> rusqlite::Result<Player> {
    Ok(Player {
        id: row.get(0)?,
        external_id: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        position: row.get(4)?,
        birth_date: row.get(5)?,
        shirt_number: row.get(6)?,
        market_value: row.get(7)?,
        profile_picture: row.get(8)?,
        profile_fetched: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_upsert_player_never_downgrades() {
        let db = Database::open_in_memory().unwrap();
        let full = db
            .upsert_player(&NewPlayer {
                external_id: 433177,
                first_name: Some("Bukayo".into()),
                last_name: "Saka".into(),
                position: Some(Position::Attacker),
                birth_date: NaiveDate::from_ymd_opt(2001, 9, 5),
                shirt_number: Some(7),
                profile_fetched: true,
                ..Default::default()
            })
            .unwrap();
        assert!(full.is_fully_resolved());

        let again = db
            .upsert_player(&NewPlayer {
                external_id: 433177,
                last_name: "Saka".into(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(again.id, full.id);
        assert_eq!(again.position, Position::Attacker);
        assert_eq!(again.first_name.as_deref(), Some("Bukayo"));
        assert_eq!(again.shirt_number, Some(7));
        assert!(again.is_fully_resolved());
        assert_eq!(db.count_rows("players").unwrap(), 1);
    }

    #[test]
    fn test_reference_only_player_is_not_resolved() {
        let db = Database::open_in_memory().unwrap();
        let p = db
            .upsert_player(&NewPlayer {
                external_id: 1,
                last_name: "Unknown".into(),
                ..Default::default()
            })
            .unwrap();
        assert!(!p.is_fully_resolved());
        assert!(db.find_player_by_external_id(1).unwrap().is_some());

        // a fetched profile without a readable position still counts
        let fetched = db
            .upsert_player(&NewPlayer {
                external_id: 1,
                last_name: "Unknown".into(),
                profile_fetched: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(fetched.position, Position::Unknown);
        assert!(fetched.is_fully_resolved());
        assert!(db.find_player_by_external_id(2).unwrap().is_none());
    }
}
