use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;

use crate::db::models::Team;
use crate::db::{Database, MatchResultRow};
use crate::error::ServiceError;

/// One table row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StandingValue {
    pub team_id: i64,
    pub team_name: String,
    pub points: i32,
    pub goals_scored: i32,
    pub goals_conceded: i32,
    pub won: i32,
    pub draw: i32,
    pub lose: i32,
}

impl StandingValue {
    fn new(team: &Team) -> Self {
        StandingValue {
            team_id: team.id,
            team_name: team.name.clone(),
            points: 0,
            goals_scored: 0,
            goals_conceded: 0,
            won: 0,
            draw: 0,
            lose: 0,
        }
    }

    pub fn goal_difference(&self) -> i32 {
        self.goals_scored - self.goals_conceded
    }

    fn record(&mut self, scored: i32, conceded: i32) {
        self.goals_scored += scored;
        self.goals_conceded += conceded;
        if scored > conceded {
            self.won += 1;
        } else if scored == conceded {
            self.draw += 1;
        } else {
            self.lose += 1;
        }
        self.points = 3 * self.won + self.draw;
    }
}

/// Standings of the teams of a league (or group) over the matches scoped to
/// it, or of every team over every match when `league_id` is `None`.
pub fn compute_standings(db: &Database, league_id: Option<i64>) -> Result<Vec<StandingValue>> {
    let (teams, results) = match league_id {
        Some(id) => {
            db.find_league(id)?.ok_or(ServiceError::InvalidLeagueId(id))?;
            (db.teams_in_league(id)?, db.match_results(Some(id))?)
        }
        None => (db.list_teams()?, db.match_results(None)?),
    };
    Ok(aggregate(&teams, &results))
}

/// Fold results into one row per team, in `teams` order, then rank.
pub fn aggregate(teams: &[Team], results: &[MatchResultRow]) -> Vec<StandingValue> {
    let mut rows: Vec<StandingValue> = teams.iter().map(StandingValue::new).collect();
    let index: HashMap<i64, usize> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| (row.team_id, i))
        .collect();

    for r in results {
        if let Some(&i) = index.get(&r.team1_id) {
            rows[i].record(r.score1, r.score2);
        }
        if let Some(&i) = index.get(&r.team2_id) {
            rows[i].record(r.score2, r.score1);
        }
    }

    sort_standings(&mut rows);
    rows
}

/// Points, then goal difference, then goals scored, all descending. Full
/// ties keep their incoming order.
pub fn sort_standings(rows: &mut [StandingValue]) {
    rows.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then_with(|| b.goal_difference().cmp(&a.goal_difference()))
            .then_with(|| b.goals_scored.cmp(&a.goals_scored))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{LeagueLayout, MatchUpsert};

    fn row(team_id: i64, won: i32, draw: i32, scored: i32, conceded: i32) -> StandingValue {
        StandingValue {
            team_id,
            team_name: format!("Team {}", team_id),
            points: 3 * won + draw,
            goals_scored: scored,
            goals_conceded: conceded,
            won,
            draw,
            lose: 0,
        }
    }

    #[test]
    fn test_ordering_keys_and_stability() {
        // (points, diff, scored): (3,-1,2), (6,+2,5), (6,0,3), (6,+2,5)
        let mut rows = vec![
            row(4, 1, 0, 2, 3),
            row(1, 2, 0, 5, 3),
            row(3, 2, 0, 3, 3),
            row(2, 2, 0, 5, 3),
        ];
        sort_standings(&mut rows);
        let order: Vec<i64> = rows.iter().map(|r| r.team_id).collect();
        assert_eq!(order, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_goals_scored_breaks_equal_difference() {
        let mut rows = vec![row(1, 1, 0, 2, 1), row(2, 1, 0, 4, 3)];
        sort_standings(&mut rows);
        assert_eq!(rows[0].team_id, 2);
    }

    #[test]
    fn test_single_match_scenario() {
        let db = Database::open_in_memory().unwrap();
        let league = db
            .get_or_create_regular_league("Eredivisie", Some("2019"), LeagueLayout::Single)
            .unwrap();
        let a = db.upsert_team("Team A", "A", None).unwrap();
        let b = db.upsert_team("Team B", "B", None).unwrap();
        db.add_team_to_league(a.id, league.id).unwrap();
        db.add_team_to_league(b.id, league.id).unwrap();
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
        let round = db.get_or_create_round(league.id, "1.Matchday").unwrap();
        db.add_match_to_round(&round, m.id).unwrap();

        for scope in [Some(league.id), None] {
            let table = compute_standings(&db, scope).unwrap();
            assert_eq!(table.len(), 2);
            let (first, second) = (&table[0], &table[1]);
            assert_eq!(first.team_id, a.id);
            assert_eq!(
                (first.won, first.draw, first.lose, first.goals_scored, first.goals_conceded),
                (1, 0, 0, 2, 1)
            );
            assert_eq!(first.points, 3);
            assert_eq!(second.team_id, b.id);
            assert_eq!(
                (second.won, second.draw, second.lose, second.goals_scored, second.goals_conceded),
                (0, 0, 1, 1, 2)
            );
            assert_eq!(second.points, 0);
        }
    }

    #[test]
    fn test_unplayed_and_foreign_matches_ignored() {
        let db = Database::open_in_memory().unwrap();
        let league = db
            .get_or_create_regular_league("Eredivisie", Some("2019"), LeagueLayout::Single)
            .unwrap();
        let a = db.upsert_team("Team A", "A", None).unwrap();
        let b = db.upsert_team("Team B", "B", None).unwrap();
        db.add_team_to_league(a.id, league.id).unwrap();
        db.add_team_to_league(b.id, league.id).unwrap();
        // played but not in any round of the league, and an unplayed one
        for (ext, score) in [(1, Some(3)), (2, None)] {
            db.upsert_match(&MatchUpsert {
                external_id: ext,
                league_id: league.id,
                team1_id: a.id,
                team2_id: b.id,
                score1: score,
                score2: score,
                date_time: None,
            })
            .unwrap();
        }

        let scoped = compute_standings(&db, Some(league.id)).unwrap();
        assert!(scoped.iter().all(|r| r.won + r.draw + r.lose == 0));

        let global = compute_standings(&db, None).unwrap();
        assert!(global.iter().all(|r| r.draw == 1 && r.points == 1));
    }

    #[test]
    fn test_unknown_league() {
        let db = Database::open_in_memory().unwrap();
        let err = compute_standings(&db, Some(5)).unwrap_err();
        assert_eq!(ServiceError::find(&err), Some(&ServiceError::InvalidLeagueId(5)));
    }
}
