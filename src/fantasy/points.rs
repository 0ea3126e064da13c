use std::collections::{BTreeMap, HashMap};

use super::weights::ScoringWeights;
use crate::db::models::{CardType, LineupAggregate, MatchAggregate, Side};

const FULL_MATCH: i32 = 90;

/// Counters accrued by one player in one match.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerTally {
    /// Side the player appeared for
    pub side: Side,
    pub goals: u32,
    pub own_goals: u32,
    pub assists: u32,
    pub clean_sheets: u32,
    pub yellow_cards: u32,
    pub red_cards: u32,
    pub saved_penalties: u32,
    pub missed_penalties: u32,
    /// `None` for players seen only in events, never in a lineup
    pub minutes: Option<i32>,
}

impl PlayerTally {
    fn new(side: Side) -> Self {
        PlayerTally {
            side,
            goals: 0,
            own_goals: 0,
            assists: 0,
            clean_sheets: 0,
            yellow_cards: 0,
            red_cards: 0,
            saved_penalties: 0,
            missed_penalties: 0,
            minutes: None,
        }
    }

    pub fn points(&self, w: &ScoringWeights) -> f64 {
        let count = |n: u32, weight: f64| n as f64 * weight;
        count(self.goals, w.goal)
            + count(self.own_goals, w.own_goal)
            + count(self.assists, w.assist)
            + count(self.clean_sheets, w.clean_sheet)
            + count(self.yellow_cards, w.yellow_card)
            + count(self.red_cards, w.red_card)
            + count(self.saved_penalties, w.saved_penalty)
            + count(self.missed_penalties, w.missed_penalty)
            + self.minutes.map_or(0.0, |m| w.minutes_points(m))
    }
}

/// Everything accrued for one match, keyed by player id.
#[derive(Debug, Clone, Default)]
pub struct MatchTally {
    pub players: BTreeMap<i64, PlayerTally>,
    /// Minutes that could not be reconstructed; any entry makes the match
    /// review-required
    pub anomalies: Vec<String>,
}

impl MatchTally {
    fn entry(&mut self, player_id: i64, side: Side) -> &mut PlayerTally {
        self.players
            .entry(player_id)
            .or_insert_with(|| PlayerTally::new(side))
    }

    /// One total per tallied player, zero totals included.
    pub fn totals(&self, weights: &ScoringWeights) -> Vec<(i64, f64)> {
        self.players
            .iter()
            .map(|(&id, tally)| (id, tally.points(weights)))
            .collect()
    }
}

/// Accrue every counter of a stored match. Goals come first so that the
/// per-goal clean-sheet credit only reaches players tallied up to that goal.
pub fn tally_match(m: &MatchAggregate) -> MatchTally {
    let mut tally = MatchTally::default();

    for goal in &m.goals {
        if let Some(scorer) = goal.scorer_id {
            let t = tally.entry(scorer, goal.scorer_side());
            if goal.own_goal {
                t.own_goals += 1;
            } else {
                t.goals += 1;
            }
        }
        if let Some(assist) = goal.assist_id {
            tally.entry(assist, goal.side).assists += 1;
        }
        // A side still on zero at this goal has kept a clean sheet so far
        let kept_clean = match (goal.score1, goal.score2) {
            (_, Some(0)) => Some(Side::Home),
            (Some(0), _) => Some(Side::Away),
            _ => None,
        };
        if let Some(side) = kept_clean {
            for t in tally.players.values_mut().filter(|t| t.side == side) {
                t.clean_sheets += 1;
            }
        }
    }

    for card in &m.cards {
        let t = tally.entry(card.player_id, card.side);
        match card.card_type {
            CardType::Yellow => t.yellow_cards += 1,
            CardType::Red => t.red_cards += 1,
        }
    }

    for mp in &m.missed_penalties {
        if let Some(keeper) = mp.saved_by_id {
            tally.entry(keeper, mp.side.opposite()).saved_penalties += 1;
        }
        if let Some(taker) = mp.taker_id {
            tally.entry(taker, mp.side).missed_penalties += 1;
        }
    }

    for lineup in &m.lineups {
        let side = lineup.lineup.side;
        let minutes = lineup_minutes(lineup, &mut tally.anomalies);
        for (player_id, played) in minutes {
            tally.entry(player_id, side).minutes = Some(played);
        }
    }

    tally
}

/// Starters play the full match. An incoming player is credited with the
/// minutes left at the change; the outgoing player's running total loses the
/// same amount.
fn lineup_minutes(lineup: &LineupAggregate, anomalies: &mut Vec<String>) -> HashMap<i64, i32> {
    let mut minutes: HashMap<i64, i32> = lineup
        .starters
        .iter()
        .map(|&id| (id, FULL_MATCH))
        .collect();

    for sub in &lineup.substitutions {
        if let (Some(player_in), Some(minute)) = (sub.player_in_id, sub.minute) {
            minutes.insert(player_in, (FULL_MATCH - minute).max(0));
        }
    }

    for sub in &lineup.substitutions {
        let Some(minute) = sub.minute else {
            anomalies.push(format!(
                "substitution of player {} has no minute",
                sub.player_out_id
            ));
            continue;
        };
        match minutes.get_mut(&sub.player_out_id) {
            Some(played) => *played = (*played - (FULL_MATCH - minute)).max(0),
            None => anomalies.push(format!(
                "no minutes on record for substituted player {}",
                sub.player_out_id
            )),
        }
    }

    minutes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Card, Formation, Goal, Lineup, Match, MissedPenalty, Substitution};
    use approx::assert_relative_eq;

    fn header() -> Match {
        Match {
            id: 1,
            external_id: 1,
            league_id: 1,
            team1_id: 10,
            team2_id: 20,
            score1: Some(2),
            score2: Some(0),
            date_time: None,
            stadium_id: None,
            lineup1_id: Some(1),
            lineup2_id: Some(2),
            review_required: false,
        }
    }

    fn lineup(id: i64, side: Side, starters: Vec<i64>, subs: Vec<(Option<i64>, i64, Option<i32>)>) -> LineupAggregate {
        LineupAggregate {
            lineup: Lineup {
                id,
                match_id: 1,
                side,
                formation: Formation::F442,
                captain_id: None,
            },
            starters,
            bench: Vec::new(),
            substitutions: subs
                .into_iter()
                .enumerate()
                .map(|(i, (player_in_id, player_out_id, minute))| Substitution {
                    id: i as i64,
                    lineup_id: id,
                    player_in_id,
                    player_out_id,
                    minute,
                })
                .collect(),
        }
    }

    fn goal(side: Side, scorer: i64, assist: Option<i64>, score: (i32, i32), own_goal: bool) -> Goal {
        Goal {
            id: 0,
            match_id: 1,
            side,
            scorer_id: Some(scorer),
            assist_id: assist,
            minute: Some(10),
            score1: Some(score.0),
            score2: Some(score.1),
            own_goal,
            penalty: false,
        }
    }

    fn aggregate(lineups: Vec<LineupAggregate>, goals: Vec<Goal>) -> MatchAggregate {
        MatchAggregate {
            header: header(),
            lineups,
            goals,
            cards: Vec::new(),
            missed_penalties: Vec::new(),
        }
    }

    #[test]
    fn test_starters_without_substitutions_play_full_match() {
        let m = aggregate(
            vec![
                lineup(1, Side::Home, vec![1, 2, 3], vec![]),
                lineup(2, Side::Away, vec![4, 5], vec![]),
            ],
            vec![],
        );
        let tally = tally_match(&m);
        assert!(tally.anomalies.is_empty());
        assert_eq!(tally.players.len(), 5);
        assert!(tally.players.values().all(|t| t.minutes == Some(90)));
    }

    #[test]
    fn test_single_substitution_conserves_minutes() {
        let m = aggregate(
            vec![lineup(1, Side::Home, vec![1, 2], vec![(Some(3), 2, Some(63))])],
            vec![],
        );
        let tally = tally_match(&m);
        assert!(tally.anomalies.is_empty());
        assert_eq!(tally.players[&1].minutes, Some(90));
        assert_eq!(tally.players[&2].minutes, Some(63));
        assert_eq!(tally.players[&3].minutes, Some(27));
    }

    #[test]
    fn test_substitute_substituted_again() {
        let m = aggregate(
            vec![lineup(
                1,
                Side::Home,
                vec![1],
                vec![(Some(2), 1, Some(30)), (Some(3), 2, Some(75))],
            )],
            vec![],
        );
        let tally = tally_match(&m);
        assert_eq!(tally.players[&1].minutes, Some(30));
        assert_eq!(tally.players[&2].minutes, Some(45));
        assert_eq!(tally.players[&3].minutes, Some(15));
    }

    #[test]
    fn test_unknown_outgoing_player_is_an_anomaly() {
        let m = aggregate(
            vec![lineup(1, Side::Home, vec![1], vec![(Some(3), 99, Some(60))])],
            vec![],
        );
        let tally = tally_match(&m);
        assert_eq!(tally.anomalies.len(), 1);
        assert_eq!(tally.players[&1].minutes, Some(90));
        assert_eq!(tally.players[&3].minutes, Some(30));
        assert!(!tally.players.contains_key(&99));
    }

    #[test]
    fn test_clean_sheet_follows_goal_snapshots() {
        // 1:0 by home 7 assisted by 8, then 2:0 by home 7
        let m = aggregate(
            vec![
                lineup(1, Side::Home, vec![6, 7, 8], vec![]),
                lineup(2, Side::Away, vec![9], vec![]),
            ],
            vec![
                goal(Side::Home, 7, Some(8), (1, 0), false),
                goal(Side::Home, 7, None, (2, 0), false),
            ],
        );
        let tally = tally_match(&m);
        assert_eq!(tally.players[&7].goals, 2);
        assert_eq!(tally.players[&7].clean_sheets, 2);
        assert_eq!(tally.players[&8].assists, 1);
        assert_eq!(tally.players[&8].clean_sheets, 2);
        // not yet tallied when the goals were walked
        assert_eq!(tally.players[&6].clean_sheets, 0);
        assert_eq!(tally.players[&9].clean_sheets, 0);
    }

    #[test]
    fn test_goalless_match_earns_no_clean_sheet() {
        let m = aggregate(
            vec![
                lineup(1, Side::Home, vec![1], vec![]),
                lineup(2, Side::Away, vec![2], vec![]),
            ],
            vec![],
        );
        let tally = tally_match(&m);
        assert!(tally.players.values().all(|t| t.clean_sheets == 0));
    }

    #[test]
    fn test_own_goal_counts_against_scorer_side() {
        // away defender 9 puts it in his own net: 1:0 for home
        let m = aggregate(vec![], vec![goal(Side::Home, 9, None, (1, 0), true)]);
        let tally = tally_match(&m);
        let t = &tally.players[&9];
        assert_eq!(t.side, Side::Away);
        assert_eq!(t.own_goals, 1);
        assert_eq!(t.goals, 0);
        assert_eq!(t.clean_sheets, 0);
    }

    #[test]
    fn test_cards_and_penalties() {
        let mut m = aggregate(vec![], vec![]);
        m.cards = vec![
            Card {
                id: 1,
                match_id: 1,
                side: Side::Home,
                player_id: 1,
                minute: Some(30),
                card_type: CardType::Yellow,
            },
            Card {
                id: 2,
                match_id: 1,
                side: Side::Home,
                player_id: 1,
                minute: Some(70),
                card_type: CardType::Red,
            },
        ];
        m.missed_penalties = vec![MissedPenalty {
            id: 1,
            match_id: 1,
            side: Side::Away,
            taker_id: Some(2),
            saved_by_id: Some(3),
            conceded_by_id: Some(1),
            minute: Some(55),
        }];
        let tally = tally_match(&m);
        assert_eq!(tally.players[&1].yellow_cards, 1);
        assert_eq!(tally.players[&1].red_cards, 1);
        assert_eq!(tally.players[&2].missed_penalties, 1);
        assert_eq!(tally.players[&3].saved_penalties, 1);
        assert_eq!(tally.players[&3].side, Side::Home);
    }

    #[test]
    fn test_points_are_weighted_sum() {
        let w = ScoringWeights::default();
        let m = aggregate(
            vec![lineup(1, Side::Home, vec![7], vec![])],
            vec![goal(Side::Home, 7, None, (1, 0), false)],
        );
        let totals = tally_match(&m).totals(&w);
        assert_eq!(totals.len(), 1);
        // goal + clean sheet + full match band
        assert_relative_eq!(totals[0].1, 5.0 + 4.0 + 2.0, epsilon = 1e-9);
    }
}
