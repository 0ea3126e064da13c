use anyhow::Result;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};

use super::models::{League, LeagueKind, LeagueLayout, Round};
use super::Database;

const LEAGUE_COLUMNS: &str = "id, name, season, kind, layout";
const ROUND_COLUMNS: &str = "id, league_id, name, start_date, end_date";

impl Database {
    // ── Leagues ───────────────────────────────────────────────────────────────

    pub fn find_league(&self, id: i64) -> Result<Option<League>> {
        let conn = self.conn();
        find_league(&conn, id)
    }

    pub fn find_regular_league(&self, name: &str, season: Option<&str>) -> Result<Option<League>> {
        let conn = self.conn();
        find_regular_league(&conn, name, season)
    }

    /// Look up a regular league by (name, season), creating it when absent.
    /// The layout is refreshed on every call since the page decides it.
    pub fn get_or_create_regular_league(
        &self,
        name: &str,
        season: Option<&str>,
        layout: LeagueLayout,
    ) -> Result<League> {
        let conn = self.conn();
        if let Some(mut league) = find_regular_league(&conn, name, season)? {
            if league.layout != layout {
                conn.execute(
                    "UPDATE leagues SET layout=?1 WHERE id=?2",
                    params![layout, league.id],
                )?;
                league.layout = layout;
            }
            return Ok(league);
        }
        conn.execute(
            "INSERT INTO leagues (name, season, kind, layout) VALUES (?1, ?2, ?3, ?4)",
            params![name, season, LeagueKind::Regular, layout],
        )?;
        Ok(League {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            season: season.map(str::to_string),
            kind: LeagueKind::Regular,
            layout,
        })
    }

    /// Group named `name` below `parent_id`, created and linked when absent.
    pub fn get_or_create_group(&self, parent_id: i64, name: &str) -> Result<League> {
        let conn = self.conn();
        let existing = conn
            .query_row(
                "SELECT l.id, l.name, l.season, l.kind, l.layout
                 FROM leagues l JOIN league_groups g ON g.group_id = l.id
                 WHERE g.parent_id=?1 AND l.name=?2 AND l.kind='group'",
                params![parent_id, name],
                map_league,
            )
            .optional()?;
        if let Some(group) = existing {
            return Ok(group);
        }
        let season: Option<String> = conn.query_row(
            "SELECT season FROM leagues WHERE id=?1",
            params![parent_id],
            |r| r.get(0),
        )?;
        conn.execute(
            "INSERT INTO leagues (name, season, kind, layout) VALUES (?1, ?2, ?3, ?4)",
            params![name, season, LeagueKind::Group, LeagueLayout::Single],
        )?;
        let id = conn.last_insert_rowid();
        conn.execute(
            "INSERT OR IGNORE INTO league_groups (parent_id, group_id) VALUES (?1, ?2)",
            params![parent_id, id],
        )?;
        Ok(League {
            id,
            name: name.to_string(),
            season,
            kind: LeagueKind::Group,
            layout: LeagueLayout::Single,
        })
    }

    /// Leagues grouped under `parent_id` (competition groups or composite members)
    pub fn league_groups(&self, parent_id: i64) -> Result<Vec<League>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT l.id, l.name, l.season, l.kind, l.layout
             FROM leagues l JOIN league_groups g ON g.group_id = l.id
             WHERE g.parent_id=?1 ORDER BY l.id",
        )?;
        let groups = stmt
            .query_map(params![parent_id], map_league)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(groups)
    }

    /// Create a composite league over `members` and give every member team a
    /// membership in it. All-or-nothing.
    pub fn create_composite_league(
        &self,
        name: &str,
        season: Option<&str>,
        members: &[i64],
    ) -> Result<League> {
        self.transaction(|tx| {
            tx.execute(
                "INSERT INTO leagues (name, season, kind, layout) VALUES (?1, ?2, ?3, ?4)",
                params![name, season, LeagueKind::Regular, LeagueLayout::Composite],
            )?;
            let id = tx.last_insert_rowid();
            for member in members {
                tx.execute(
                    "INSERT OR IGNORE INTO league_groups (parent_id, group_id) VALUES (?1, ?2)",
                    params![id, member],
                )?;
                tx.execute(
                    "INSERT OR IGNORE INTO team_leagues (team_id, league_id)
                     SELECT team_id, ?1 FROM team_leagues WHERE league_id=?2",
                    params![id, member],
                )?;
            }
            Ok(League {
                id,
                name: name.to_string(),
                season: season.map(str::to_string),
                kind: LeagueKind::Regular,
                layout: LeagueLayout::Composite,
            })
        })
    }

    // ── Rounds ────────────────────────────────────────────────────────────────

    pub fn get_or_create_round(&self, league_id: i64, name: &str) -> Result<Round> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO rounds (league_id, name) VALUES (?1, ?2)",
            params![league_id, name],
        )?;
        let round = conn.query_row(
            &format!(
                "SELECT {} FROM rounds WHERE league_id=?1 AND name=?2",
                ROUND_COLUMNS
            ),
            params![league_id, name],
            map_round,
        )?;
        Ok(round)
    }

    /// Widen a round's window to include `date`. A missing date leaves it as is.
    pub fn extend_round_bounds(&self, round_id: i64, date: Option<NaiveDateTime>) -> Result<()> {
        let Some(date) = date else {
            return Ok(());
        };
        let conn = self.conn();
        conn.execute(
            "UPDATE rounds SET
                start_date = CASE WHEN start_date IS NULL OR ?1 < start_date THEN ?1 ELSE start_date END,
                end_date   = CASE WHEN end_date   IS NULL OR ?1 > end_date   THEN ?1 ELSE end_date   END
             WHERE id=?2",
            params![date, round_id],
        )?;
        Ok(())
    }

    /// Attach a match to a round. Returns false when the match already sits in
    /// a round of the same scope (membership is append-only).
    pub fn add_match_to_round(&self, round: &Round, match_id: i64) -> Result<bool> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO round_matches (round_id, match_id, scope_league_id)
             VALUES (?1, ?2, ?3)",
            params![round.id, match_id, round.league_id],
        )?;
        Ok(inserted > 0)
    }

    pub fn rounds_for_league(&self, league_id: i64) -> Result<Vec<Round>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM rounds WHERE league_id=?1 ORDER BY id",
            ROUND_COLUMNS
        ))?;
        let rounds = stmt
            .query_map(params![league_id], map_round)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rounds)
    }

    pub fn round_match_ids(&self, round_id: i64) -> Result<Vec<i64>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT rm.match_id FROM round_matches rm JOIN matches m ON m.id = rm.match_id
             WHERE rm.round_id=?1 ORDER BY m.date_time, m.id",
        )?;
        let ids = stmt
            .query_map(params![round_id], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// Matches that belong to any round scoped to one of `league_ids`,
    /// chronologically with undated matches last.
    pub fn scoped_match_dates(
        &self,
        league_ids: &[i64],
    ) -> Result<Vec<(i64, Option<NaiveDateTime>)>> {
        let conn = self.conn();
        let mut out = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut stmt = conn.prepare(
            "SELECT m.id, m.date_time FROM matches m
             JOIN round_matches rm ON rm.match_id = m.id
             WHERE rm.scope_league_id=?1",
        )?;
        for league_id in league_ids {
            let rows = stmt
                .query_map(params![league_id], |r| Ok((r.get(0)?, r.get(1)?)))?
                .collect::<rusqlite::Result<Vec<(i64, Option<NaiveDateTime>)>>>()?;
            for row in rows {
                if seen.insert(row.0) {
                    out.push(row);
                }
            }
        }
        out.sort_by(|a, b| match (a.1, b.1) {
            (Some(x), Some(y)) => x.cmp(&y).then(a.0.cmp(&b.0)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.0.cmp(&b.0),
        });
        Ok(out)
    }
}

fn find_league(conn: &Connection, id: i64) -> Result<Option<League>> {
    let league = conn
        .query_row(
            &format!("SELECT {} FROM leagues WHERE id=?1", LEAGUE_COLUMNS),
            params![id],
            map_league,
        )
        .optional()?;
    Ok(league)
}

fn find_regular_league(
    conn: &Connection,
    name: &str,
    season: Option<&str>,
) -> Result<Option<League>> {
    let league = conn
        .query_row(
            &format!(
                "SELECT {} FROM leagues WHERE kind='regular' AND name=?1 AND season IS ?2",
                LEAGUE_COLUMNS
            ),
            params![name, season],
            map_league,
        )
        .optional()?;
    Ok(league)
}

fn map_league(row: &rusqlite::Row) -> rusqlite::Result<League> {
    Ok(League {
        id: row.get(0)?,
        name: row.get(1)?,
        season: row.get(2)?,
        kind: row.get(3)?,
        layout: row.get(4)?,
    })
}

fn map_round(row: &rusqlite::Row) -> rusqlite::Result<Round> {
    Ok(Round {
        id: row.get(0)?,
        league_id: row.get(1)?,
        name: row.get(2)?,
        start_date: row.get(3)?,
        end_date: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2019, 8, day)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_regular_league_is_reused_per_season() {
        let db = Database::open_in_memory().unwrap();
        let a = db
            .get_or_create_regular_league("Premier League", Some("2019"), LeagueLayout::Single)
            .unwrap();
        let b = db
            .get_or_create_regular_league("Premier League", Some("2019"), LeagueLayout::Single)
            .unwrap();
        let c = db
            .get_or_create_regular_league("Premier League", Some("2020"), LeagueLayout::Single)
            .unwrap();
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn test_group_belongs_to_parent() {
        let db = Database::open_in_memory().unwrap();
        let cup = db
            .get_or_create_regular_league("Champions League", Some("2019"), LeagueLayout::Grouped)
            .unwrap();
        let g1 = db.get_or_create_group(cup.id, "Group A").unwrap();
        let g2 = db.get_or_create_group(cup.id, "Group A").unwrap();
        assert_eq!(g1.id, g2.id);
        assert_eq!(g1.kind, LeagueKind::Group);
        assert_eq!(g1.season.as_deref(), Some("2019"));
        assert_eq!(db.league_groups(cup.id).unwrap().len(), 1);
    }

    #[test]
    fn test_round_bounds_extend_incrementally() {
        let db = Database::open_in_memory().unwrap();
        let league = db
            .get_or_create_regular_league("Premier League", Some("2019"), LeagueLayout::Single)
            .unwrap();
        let round = db.get_or_create_round(league.id, "1.Matchday").unwrap();
        db.extend_round_bounds(round.id, Some(at(10))).unwrap();
        db.extend_round_bounds(round.id, Some(at(9))).unwrap();
        db.extend_round_bounds(round.id, None).unwrap();
        db.extend_round_bounds(round.id, Some(at(11))).unwrap();
        let round = db.get_or_create_round(league.id, "1.Matchday").unwrap();
        assert_eq!(round.start_date, Some(at(9)));
        assert_eq!(round.end_date, Some(at(11)));
    }
}
