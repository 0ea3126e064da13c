pub mod points;
pub mod weights;

pub use points::tally_match;
pub use weights::ScoringWeights;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, error, info, info_span, warn, Span};

use crate::db::models::LeagueKind;
use crate::db::Database;
use crate::error::ServiceError;
use crate::ingest::Anomaly;

/// What scoring did with one match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Unplayed,
    AlreadyScored,
    Scored { players: usize, review_required: bool },
}

/// State of one scoring invocation.
pub struct ScoringRun {
    span: Span,
    pub matches_scored: usize,
    pub matches_skipped: usize,
    pub matches_failed: usize,
    pub review_required: usize,
    anomalies: Vec<Anomaly>,
}

impl ScoringRun {
    pub fn new(league_id: i64) -> Self {
        ScoringRun {
            span: info_span!("score", league_id),
            matches_scored: 0,
            matches_skipped: 0,
            matches_failed: 0,
            review_required: 0,
            anomalies: Vec::new(),
        }
    }

    fn anomaly(&mut self, scope: String, detail: String) {
        self.span.in_scope(|| {
            warn!(scope = %scope, detail = %detail, "scoring anomaly");
        });
        self.anomalies.push(Anomaly { scope, detail });
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoringReport {
    pub league_id: i64,
    pub matches_scored: usize,
    pub matches_skipped: usize,
    pub matches_failed: usize,
    pub review_required: usize,
    pub anomalies: Vec<Anomaly>,
}

/// Turns stored match events into per-player fantasy points.
pub struct FantasyEngine {
    db: Database,
    weights: ScoringWeights,
}

impl FantasyEngine {
    pub fn new(db: Database, weights: ScoringWeights) -> Self {
        FantasyEngine { db, weights }
    }

    /// Score every match of every round of a regular league. A failing match
    /// is logged and counted; the others are still scored.
    pub fn process_league(&self, league_id: i64) -> Result<ScoringReport> {
        self.db
            .find_league(league_id)?
            .filter(|l| l.kind == LeagueKind::Regular)
            .ok_or(ServiceError::InvalidLeagueId(league_id))?;

        let mut run = ScoringRun::new(league_id);
        let span = run.span.clone();
        let _guard = span.enter();

        for round in self.db.rounds_for_league(league_id)? {
            for match_id in self.db.round_match_ids(round.id)? {
                match self.process_match(&mut run, match_id) {
                    Ok(MatchOutcome::Scored { players, review_required }) => {
                        run.matches_scored += 1;
                        if review_required {
                            run.review_required += 1;
                        }
                        debug!(round = %round.name, match_id, players, "match scored");
                    }
                    Ok(_) => run.matches_skipped += 1,
                    Err(e) => {
                        error!(match_id, "Scoring failed: {:#}", e);
                        run.matches_failed += 1;
                    }
                }
            }
        }

        info!(
            scored = run.matches_scored,
            skipped = run.matches_skipped,
            failed = run.matches_failed,
            review_required = run.review_required,
            "league scored"
        );
        Ok(ScoringReport {
            league_id,
            matches_scored: run.matches_scored,
            matches_skipped: run.matches_skipped,
            matches_failed: run.matches_failed,
            review_required: run.review_required,
            anomalies: run.anomalies,
        })
    }

    /// Score one match. Unplayed and already scored matches are left alone.
    /// Minutes that cannot be reconstructed flag the match for review; the
    /// remaining points are still written.
    pub fn process_match(&self, run: &mut ScoringRun, match_id: i64) -> Result<MatchOutcome> {
        let m = self
            .db
            .load_match_aggregate(match_id)?
            .with_context(|| format!("match {} not found", match_id))?;
        if !m.header.is_played() {
            return Ok(MatchOutcome::Unplayed);
        }
        if self.db.is_points_processed(match_id)? {
            return Ok(MatchOutcome::AlreadyScored);
        }

        let tally = tally_match(&m);
        let review_required = !tally.anomalies.is_empty();
        if review_required {
            self.db.set_review_required(match_id)?;
            for detail in &tally.anomalies {
                run.anomaly(format!("match {}", m.header.external_id), detail.clone());
            }
        }

        let totals = tally.totals(&self.weights);
        if !self.db.insert_player_points(match_id, &totals)? {
            return Ok(MatchOutcome::AlreadyScored);
        }
        Ok(MatchOutcome::Scored {
            players: totals.len(),
            review_required,
        })
    }
}
