use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use super::models::{Stadium, Team, TeamDetail};
use super::{is_unique_violation, Database};
use crate::error::ServiceError;

const TEAM_COLUMNS: &str = "id, name, code, crest";

impl Database {
    // ── Teams ─────────────────────────────────────────────────────────────────

    /// Insert or refresh a team keyed by its unique code. The crest is only
    /// overwritten when a new one is supplied.
    pub fn upsert_team(&self, name: &str, code: &str, crest: Option<&str>) -> Result<Team> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO teams (name, code, crest) VALUES (?1, ?2, ?3)
             ON CONFLICT(code) DO UPDATE SET
                name=excluded.name,
                crest=COALESCE(excluded.crest, teams.crest)",
            params![name, code, crest],
        )?;
        let team = conn.query_row(
            &format!("SELECT {} FROM teams WHERE code=?1", TEAM_COLUMNS),
            params![code],
            map_team,
        )?;
        Ok(team)
    }

    /// Create a brand-new team. The code defaults to the name; a code already
    /// in use fails with [`ServiceError::DuplicateTeamCode`] and writes nothing.
    pub fn create_team(&self, name: &str, code: Option<&str>, crest: Option<&str>) -> Result<Team> {
        let code = code.unwrap_or(name);
        let conn = self.conn();
        match conn.execute(
            "INSERT INTO teams (name, code, crest) VALUES (?1, ?2, ?3)",
            params![name, code, crest],
        ) {
            Ok(_) => Ok(Team {
                id: conn.last_insert_rowid(),
                name: name.to_string(),
                code: code.to_string(),
                crest: crest.map(str::to_string),
            }),
            Err(e) if is_unique_violation(&e) => {
                Err(ServiceError::DuplicateTeamCode(code.to_string()).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn add_team_to_league(&self, team_id: i64, league_id: i64) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO team_leagues (team_id, league_id) VALUES (?1, ?2)",
            params![team_id, league_id],
        )?;
        Ok(())
    }

    pub fn find_team(&self, id: i64) -> Result<Option<Team>> {
        let conn = self.conn();
        find_team(&conn, id)
    }

    pub fn list_teams(&self) -> Result<Vec<Team>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {} FROM teams ORDER BY id", TEAM_COLUMNS))?;
        let teams = stmt
            .query_map([], map_team)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(teams)
    }

    /// Teams whose name contains `query` (case-insensitive)
    pub fn search_teams(&self, query: &str) -> Result<Vec<Team>> {
        let conn = self.conn();
        let pattern = format!(
            "%{}%",
            query.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
        );
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM teams WHERE name LIKE ?1 ESCAPE '\\' ORDER BY name",
            TEAM_COLUMNS
        ))?;
        let teams = stmt
            .query_map(params![pattern], map_team)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(teams)
    }

    pub fn teams_in_league(&self, league_id: i64) -> Result<Vec<Team>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT t.id, t.name, t.code, t.crest FROM teams t
             JOIN team_leagues tl ON tl.team_id = t.id
             WHERE tl.league_id=?1 ORDER BY t.id",
        )?;
        let teams = stmt
            .query_map(params![league_id], map_team)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(teams)
    }

    /// Team with its leagues and squad
    pub fn team_detail(&self, id: i64) -> Result<Option<TeamDetail>> {
        let Some(team) = self.find_team(id)? else {
            return Ok(None);
        };
        let leagues = self.leagues_of_team(id)?;
        let players = self.players_of_team(id)?;
        Ok(Some(TeamDetail {
            team,
            leagues,
            players,
        }))
    }

    /// Attach an existing player to an existing team.
    pub fn attach_player_to_team(&self, team_id: i64, player_id: i64) -> Result<()> {
        if self.find_player(player_id)?.is_none() {
            return Err(ServiceError::InvalidPlayerId(player_id).into());
        }
        if self.find_team(team_id)?.is_none() {
            return Err(ServiceError::InvalidTeamId(team_id).into());
        }
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO player_teams (player_id, team_id) VALUES (?1, ?2)",
            params![player_id, team_id],
        )?;
        if inserted == 0 {
            return Err(ServiceError::PlayerAlreadyAttached { player_id, team_id }.into());
        }
        Ok(())
    }

    // ── Stadiums ──────────────────────────────────────────────────────────────

    pub fn upsert_stadium(&self, key: &str, name: &str) -> Result<Stadium> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO stadiums (key, name) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET name=excluded.name",
            params![key, name],
        )?;
        let stadium = conn.query_row(
            "SELECT id, key, name FROM stadiums WHERE key=?1",
            params![key],
            |row| {
                Ok(Stadium {
                    id: row.get(0)?,
                    key: row.get(1)?,
                    name: row.get(2)?,
                })
            },
        )?;
        Ok(stadium)
    }

    fn leagues_of_team(&self, team_id: i64) -> Result<Vec<super::models::League>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT l.id FROM leagues l JOIN team_leagues tl ON tl.league_id = l.id
             WHERE tl.team_id=?1 ORDER BY l.id",
        )?;
        let ids = stmt
            .query_map(params![team_id], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        drop(stmt);
        drop(conn);
        let mut leagues = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(league) = self.find_league(id)? {
                leagues.push(league);
            }
        }
        Ok(leagues)
    }
}

fn find_team(conn: &Connection, id: i64) -> Result<Option<Team>> {
    let team = conn
        .query_row(
            &format!("SELECT {} FROM teams WHERE id=?1", TEAM_COLUMNS),
            params![id],
            map_team,
        )
        .optional()?;
    Ok(team)
}

fn map_team(row: &rusqlite::Row) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get(0)?,
        name: row.get(1)?,
        code: row.get(2)?,
        crest: row.get(3)?,
    })
}
