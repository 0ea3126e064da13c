use anyhow::Result;
use rusqlite::{params, OptionalExtension};

use super::models::PlayerPoints;
use super::Database;

impl Database {
    /// True once a scoring pass has stored the points of this match, even
    /// when no player earned any.
    pub fn is_points_processed(&self, match_id: i64) -> Result<bool> {
        let conn = self.conn();
        let processed = conn
            .query_row(
                "SELECT points_processed FROM matches WHERE id=?1",
                params![match_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(processed.unwrap_or(false))
    }

    /// Store the points of one match and mark it processed. The marker is
    /// checked again inside the transaction, so a concurrent run cannot
    /// double-write; returns false when the match was already processed and
    /// nothing was written.
    pub fn insert_player_points(&self, match_id: i64, points: &[(i64, f64)]) -> Result<bool> {
        self.transaction(|tx| {
            let claimed = tx.execute(
                "UPDATE matches SET points_processed=1 WHERE id=?1 AND points_processed=0",
                params![match_id],
            )?;
            if claimed == 0 {
                return Ok(false);
            }
            let mut stmt = tx.prepare(
                "INSERT INTO player_points (match_id, player_id, points) VALUES (?1, ?2, ?3)",
            )?;
            for (player_id, value) in points {
                stmt.execute(params![match_id, player_id, value])?;
            }
            Ok(true)
        })
    }

    pub fn points_for_match(&self, match_id: i64) -> Result<Vec<PlayerPoints>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, match_id, player_id, points FROM player_points
             WHERE match_id=?1 ORDER BY player_id",
        )?;
        let rows = stmt
            .query_map(params![match_id], |row| {
                Ok(PlayerPoints {
                    id: row.get(0)?,
                    match_id: row.get(1)?,
                    player_id: row.get(2)?,
                    points: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{LeagueLayout, MatchUpsert, NewPlayer};
    use approx::assert_relative_eq;

    #[test]
    fn test_points_written_once() {
        let db = Database::open_in_memory().unwrap();
        let league = db
            .get_or_create_regular_league("Serie A", Some("2019"), LeagueLayout::Single)
            .unwrap();
        let a = db.upsert_team("Inter", "Inter", None).unwrap();
        let b = db.upsert_team("Milan", "Milan", None).unwrap();
        let m = db
            .upsert_match(&MatchUpsert {
                external_id: 1,
                league_id: league.id,
                team1_id: a.id,
                team2_id: b.id,
                score1: Some(2),
                score2: Some(1),
                date_time: None,
            })
            .unwrap();
        let p = db
            .upsert_player(&NewPlayer {
                external_id: 10,
                last_name: "Lautaro".into(),
                ..Default::default()
            })
            .unwrap();

        assert!(!db.is_points_processed(m.id).unwrap());
        assert!(db.insert_player_points(m.id, &[(p.id, 7.5)]).unwrap());
        assert!(!db.insert_player_points(m.id, &[(p.id, 99.0)]).unwrap());

        let rows = db.points_for_match(m.id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_relative_eq!(rows[0].points, 7.5);
        assert!(db.is_points_processed(m.id).unwrap());
    }

    #[test]
    fn test_empty_points_still_mark_match() {
        let db = Database::open_in_memory().unwrap();
        let league = db
            .get_or_create_regular_league("Serie A", Some("2019"), LeagueLayout::Single)
            .unwrap();
        let a = db.upsert_team("Inter", "Inter", None).unwrap();
        let b = db.upsert_team("Milan", "Milan", None).unwrap();
        let m = db
            .upsert_match(&MatchUpsert {
                external_id: 1,
                league_id: league.id,
                team1_id: a.id,
                team2_id: b.id,
                score1: Some(0),
                score2: Some(0),
                date_time: None,
            })
            .unwrap();

        assert!(db.insert_player_points(m.id, &[]).unwrap());
        assert!(db.is_points_processed(m.id).unwrap());
        assert!(!db.insert_player_points(m.id, &[]).unwrap());
        assert_eq!(db.count_rows("player_points").unwrap(), 0);
        assert!(!db.is_points_processed(m.id + 1).unwrap());
    }
}
