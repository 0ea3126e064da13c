use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use tracing::warn;

use super::models::{
    Card, Goal, Lineup, LineupAggregate, Match, MatchAggregate, MatchDetails, MatchUpsert,
    MissedPenalty, Side, Substitution,
};
use super::Database;

const MATCH_COLUMNS: &str = "id, external_id, league_id, team1_id, team2_id, score1, score2,
                             date_time, stadium_id, lineup1_id, lineup2_id, review_required";

/// Final score of one played match, as consumed by the standings aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchResultRow {
    pub team1_id: i64,
    pub team2_id: i64,
    pub score1: i32,
    pub score2: i32,
}

impl Database {
    pub fn find_match(&self, id: i64) -> Result<Option<Match>> {
        let conn = self.conn();
        find_match(&conn, "id", id)
    }

    pub fn find_match_by_external_id(&self, external_id: i64) -> Result<Option<Match>> {
        let conn = self.conn();
        find_match(&conn, "external_id", external_id)
    }

    /// Create or update the summary part of a match, keyed by external id.
    /// The owning league is fixed by the first ingestion.
    pub fn upsert_match(&self, m: &MatchUpsert) -> Result<Match> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO matches (external_id, league_id, team1_id, team2_id, score1, score2, date_time)
             VALUES (?1,?2,?3,?4,?5,?6,?7)
             ON CONFLICT(external_id) DO UPDATE SET
                team1_id=excluded.team1_id,
                team2_id=excluded.team2_id,
                score1=excluded.score1,
                score2=excluded.score2,
                date_time=COALESCE(excluded.date_time, matches.date_time)",
            params![
                m.external_id,
                m.league_id,
                m.team1_id,
                m.team2_id,
                m.score1,
                m.score2,
                m.date_time,
            ],
        )?;
        find_match(&conn, "external_id", m.external_id)?
            .ok_or_else(|| anyhow::anyhow!("match {} vanished after upsert", m.external_id))
    }

    /// Replace the detail rows of one match (lineups, substitutions, cards,
    /// missed penalties, goals, stadium) in a single transaction. Either the
    /// whole aggregate is stored or nothing changes.
    pub fn save_match_details(&self, match_id: i64, details: &MatchDetails) -> Result<()> {
        self.transaction(|tx| {
            tx.execute(
                "UPDATE matches SET lineup1_id=NULL, lineup2_id=NULL WHERE id=?1",
                params![match_id],
            )?;
            tx.execute("DELETE FROM lineups WHERE match_id=?1", params![match_id])?;
            tx.execute("DELETE FROM goals WHERE match_id=?1", params![match_id])?;
            tx.execute("DELETE FROM cards WHERE match_id=?1", params![match_id])?;
            tx.execute(
                "DELETE FROM missed_penalties WHERE match_id=?1",
                params![match_id],
            )?;

            let mut lineup_ids: HashMap<Side, i64> = HashMap::new();
            for lineup in &details.lineups {
                tx.execute(
                    "INSERT INTO lineups (match_id, side, formation, captain_id) VALUES (?1,?2,?3,?4)",
                    params![match_id, lineup.side, lineup.formation, lineup.captain_id],
                )?;
                let lineup_id = tx.last_insert_rowid();
                let slots = lineup
                    .starters
                    .iter()
                    .map(|s| ("starter", s))
                    .chain(lineup.bench.iter().map(|s| ("bench", s)));
                for (role, slot) in slots {
                    tx.execute(
                        "INSERT OR IGNORE INTO lineup_players (lineup_id, player_id, role, shirt_number)
                         VALUES (?1,?2,?3,?4)",
                        params![lineup_id, slot.player_id, role, slot.shirt_number],
                    )?;
                }
                lineup_ids.insert(lineup.side, lineup_id);
            }

            tx.execute(
                "UPDATE matches SET lineup1_id=?1, lineup2_id=?2,
                        stadium_id=COALESCE(?3, stadium_id)
                 WHERE id=?4",
                params![
                    lineup_ids.get(&Side::Home).copied(),
                    lineup_ids.get(&Side::Away).copied(),
                    details.stadium_id,
                    match_id
                ],
            )?;

            for sub in &details.substitutions {
                let Some(lineup_id) = lineup_ids.get(&sub.side) else {
                    warn!(match_id, side = %sub.side, "substitution without lineup dropped");
                    continue;
                };
                tx.execute(
                    "INSERT INTO substitutions (lineup_id, player_in_id, player_out_id, minute)
                     VALUES (?1,?2,?3,?4)",
                    params![lineup_id, sub.player_in_id, sub.player_out_id, sub.minute],
                )?;
            }

            for card in &details.cards {
                tx.execute(
                    "INSERT INTO cards (match_id, side, player_id, minute, card_type)
                     VALUES (?1,?2,?3,?4,?5)",
                    params![match_id, card.side, card.player_id, card.minute, card.card_type],
                )?;
            }

            for mp in &details.missed_penalties {
                tx.execute(
                    "INSERT INTO missed_penalties
                        (match_id, side, taker_id, saved_by_id, conceded_by_id, minute)
                     VALUES (?1,?2,?3,?4,?5,?6)",
                    params![
                        match_id,
                        mp.side,
                        mp.taker_id,
                        mp.saved_by_id,
                        mp.conceded_by_id,
                        mp.minute
                    ],
                )?;
            }

            for goal in &details.goals {
                tx.execute(
                    "INSERT INTO goals
                        (match_id, side, scorer_id, assist_id, minute, score1, score2, own_goal, penalty)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
                    params![
                        match_id,
                        goal.side,
                        goal.scorer_id,
                        goal.assist_id,
                        goal.minute,
                        goal.score1,
                        goal.score2,
                        goal.own_goal,
                        goal.penalty
                    ],
                )?;
            }
            Ok(())
        })
    }

    /// Mark a match for manual inspection
    pub fn set_review_required(&self, match_id: i64) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE matches SET review_required=1 WHERE id=?1",
            params![match_id],
        )?;
        Ok(())
    }

    /// Load a match together with its lineups and event rows.
    pub fn load_match_aggregate(&self, match_id: i64) -> Result<Option<MatchAggregate>> {
        let conn = self.conn();
        let Some(header) = find_match(&conn, "id", match_id)? else {
            return Ok(None);
        };

        let mut lineups = Vec::new();
        let mut stmt = conn.prepare(
            "SELECT id, match_id, side, formation, captain_id FROM lineups
             WHERE match_id=?1 ORDER BY side DESC",
        )?;
        let rows = stmt
            .query_map(params![match_id], |row| {
                Ok(Lineup {
                    id: row.get(0)?,
                    match_id: row.get(1)?,
                    side: row.get(2)?,
                    formation: row.get(3)?,
                    captain_id: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for lineup in rows {
            lineups.push(load_lineup(&conn, lineup)?);
        }

        let mut stmt = conn.prepare(
            "SELECT id, match_id, side, scorer_id, assist_id, minute, score1, score2, own_goal, penalty
             FROM goals WHERE match_id=?1 ORDER BY id",
        )?;
        let goals = stmt
            .query_map(params![match_id], |row| {
                Ok(Goal {
                    id: row.get(0)?,
                    match_id: row.get(1)?,
                    side: row.get(2)?,
                    scorer_id: row.get(3)?,
                    assist_id: row.get(4)?,
                    minute: row.get(5)?,
                    score1: row.get(6)?,
                    score2: row.get(7)?,
                    own_goal: row.get(8)?,
                    penalty: row.get(9)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
            "SELECT id, match_id, side, player_id, minute, card_type
             FROM cards WHERE match_id=?1 ORDER BY id",
        )?;
        let cards = stmt
            .query_map(params![match_id], |row| {
                Ok(Card {
                    id: row.get(0)?,
                    match_id: row.get(1)?,
                    side: row.get(2)?,
                    player_id: row.get(3)?,
                    minute: row.get(4)?,
                    card_type: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
            "SELECT id, match_id, side, taker_id, saved_by_id, conceded_by_id, minute
             FROM missed_penalties WHERE match_id=?1 ORDER BY id",
        )?;
        let missed_penalties = stmt
            .query_map(params![match_id], |row| {
                Ok(MissedPenalty {
                    id: row.get(0)?,
                    match_id: row.get(1)?,
                    side: row.get(2)?,
                    taker_id: row.get(3)?,
                    saved_by_id: row.get(4)?,
                    conceded_by_id: row.get(5)?,
                    minute: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some(MatchAggregate {
            header,
            lineups,
            goals,
            cards,
            missed_penalties,
        }))
    }

    /// Final scores of played matches. `scope` restricts to matches holding a
    /// round membership in that league; `None` means every match.
    pub fn match_results(&self, scope: Option<i64>) -> Result<Vec<MatchResultRow>> {
        let conn = self.conn();
        let map = |row: &rusqlite::Row| -> rusqlite::Result<MatchResultRow> {
            Ok(MatchResultRow {
                team1_id: row.get(0)?,
                team2_id: row.get(1)?,
                score1: row.get(2)?,
                score2: row.get(3)?,
            })
        };
        let rows = match scope {
            Some(league_id) => {
                // (match_id, scope_league_id) is unique, so no duplicates here
                let mut stmt = conn.prepare(
                    "SELECT m.team1_id, m.team2_id, m.score1, m.score2
                     FROM matches m JOIN round_matches rm ON rm.match_id = m.id
                     WHERE rm.scope_league_id=?1
                       AND m.score1 IS NOT NULL AND m.score2 IS NOT NULL
                     ORDER BY m.id",
                )?;
                let rows = stmt
                    .query_map(params![league_id], map)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT team1_id, team2_id, score1, score2 FROM matches
                     WHERE score1 IS NOT NULL AND score2 IS NOT NULL ORDER BY id",
                )?;
                let rows = stmt.query_map([], map)?.collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };
        Ok(rows)
    }
}

fn load_lineup(conn: &Connection, lineup: Lineup) -> Result<LineupAggregate> {
    let mut stmt = conn.prepare(
        "SELECT player_id, role FROM lineup_players WHERE lineup_id=?1 ORDER BY rowid",
    )?;
    let mut starters = Vec::new();
    let mut bench = Vec::new();
    let rows = stmt
        .query_map(params![lineup.id], |r| {
            Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for (player_id, role) in rows {
        if role == "starter" {
            starters.push(player_id);
        } else {
            bench.push(player_id);
        }
    }

    let mut stmt = conn.prepare(
        "SELECT id, lineup_id, player_in_id, player_out_id, minute
         FROM substitutions WHERE lineup_id=?1 ORDER BY id",
    )?;
    let substitutions = stmt
        .query_map(params![lineup.id], |row| {
            Ok(Substitution {
                id: row.get(0)?,
                lineup_id: row.get(1)?,
                player_in_id: row.get(2)?,
                player_out_id: row.get(3)?,
                minute: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(LineupAggregate {
        lineup,
        starters,
        bench,
        substitutions,
    })
}

fn find_match(conn: &Connection, key: &str, value: i64) -> Result<Option<Match>> {
    let m = conn
        .query_row(
            &format!("SELECT {} FROM matches WHERE {}=?1", MATCH_COLUMNS, key),
            params![value],
            map_match,
        )
        .optional()?;
    Ok(m)
}

fn map_match(row: &rusqlite::Row) -> rusqlite::Result<Match> {
    Ok(Match {
        id: row.get(0)?,
        external_id: row.get(1)?,
        league_id: row.get(2)?,
        team1_id: row.get(3)?,
        team2_id: row.get(4)?,
        score1: row.get(5)?,
        score2: row.get(6)?,
        date_time: row.get(7)?,
        stadium_id: row.get(8)?,
        lineup1_id: row.get(9)?,
        lineup2_id: row.get(10)?,
        review_required: row.get(11)?,
    })
}
