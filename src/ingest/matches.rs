use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

use super::resolver::EntityResolver;
use super::IngestContext;
use crate::db::models::{
    LineupSlot, Match, MatchDetails, MatchUpsert, NewCard, NewGoal, NewLineup, NewMissedPenalty,
    NewSubstitution, Side,
};
use crate::db::Database;
use crate::transfermarkt::match_page::LineupBlock;
use crate::transfermarkt::{parse_match_page, MatchDetailPage, MatchRow, PageSource, PlayerRef};

/// Reconciles one schedule row, and the report page of a played match, into
/// a stored match aggregate.
pub struct MatchIngestor {
    db: Database,
    source: Arc<dyn PageSource>,
    resolver: EntityResolver,
}

impl MatchIngestor {
    pub fn new(db: Database, source: Arc<dyn PageSource>, resolver: EntityResolver) -> Self {
        MatchIngestor {
            db,
            source,
            resolver,
        }
    }

    /// Create or refresh the match of `row`. A match whose lineups are both
    /// stored is returned untouched. Detail extraction failures are recorded
    /// on `ctx` and leave the match partially populated.
    pub async fn ingest_row(
        &self,
        ctx: &mut IngestContext,
        row: &MatchRow,
        league_id: i64,
        group_id: Option<i64>,
    ) -> Result<Match> {
        ctx.matches_seen += 1;

        if let Some(existing) = self.db.find_match_by_external_id(row.external_id)? {
            if existing.is_detail_processed() {
                debug!(external_id = row.external_id, "match already processed");
                ctx.matches_skipped += 1;
                return Ok(existing);
            }
        }

        let home = self.resolver.resolve_team(&row.home, league_id, group_id)?;
        let away = self.resolver.resolve_team(&row.away, league_id, group_id)?;
        let (score1, score2) = row.score.unzip();
        let m = self.db.upsert_match(&MatchUpsert {
            external_id: row.external_id,
            league_id,
            team1_id: home.id,
            team2_id: away.id,
            score1,
            score2,
            date_time: row.date_time,
        })?;

        if !m.is_played() {
            return Ok(m);
        }

        if self.ingest_details(ctx, &m, &row.detail_path).await {
            ctx.details_stored += 1;
        }
        self.db
            .find_match(m.id)?
            .with_context(|| format!("match {} disappeared", m.external_id))
    }

    /// Fetch and store the report page. Returns whether details were saved.
    async fn ingest_details(&self, ctx: &mut IngestContext, m: &Match, path: &str) -> bool {
        let scope = format!("match {}", m.external_id);
        let html = match self.source.fetch_page(path).await {
            Ok(html) => html,
            Err(e) => {
                ctx.anomaly(scope, format!("report page unavailable: {:#}", e));
                return false;
            }
        };
        let page = parse_match_page(&html);
        let details = self.build_details(ctx, m, &page, &scope).await;

        match self.db.save_match_details(m.id, &details) {
            Ok(()) => {
                info!(
                    external_id = m.external_id,
                    lineups = details.lineups.len(),
                    goals = details.goals.len(),
                    "match details saved"
                );
                true
            }
            Err(e) => {
                ctx.anomaly(scope, format!("details not saved: {:#}", e));
                false
            }
        }
    }

    async fn build_details(
        &self,
        ctx: &mut IngestContext,
        m: &Match,
        page: &MatchDetailPage,
        scope: &str,
    ) -> MatchDetails {
        let mut details = MatchDetails::default();

        if let Some(name) = page.stadium.as_deref() {
            match self.resolver.resolve_stadium(name) {
                Ok(stadium) => details.stadium_id = Some(stadium.id),
                Err(e) => ctx.anomaly(scope, format!("stadium '{}': {:#}", name, e)),
            }
        }

        if page.lineups.len() == 2 {
            for (side, block) in [Side::Home, Side::Away].into_iter().zip(&page.lineups) {
                let lineup = self.build_lineup(ctx, side, m.team_for(side), block).await;
                details.lineups.push(lineup);
            }
        } else {
            ctx.anomaly(scope, "no lineups on report page");
        }

        for sub in &page.substitutions {
            if !details.lineups.iter().any(|l| l.side == sub.side) {
                ctx.anomaly(scope, format!("substitution for {} side without lineup", sub.side));
                continue;
            }
            let team_id = m.team_for(sub.side);
            let Some(player_out_id) = self.event_player(ctx, scope, sub.player_out.as_ref(), team_id)
            else {
                ctx.anomaly(scope, "substitution without outgoing player");
                continue;
            };
            let player_in_id = self.event_player(ctx, scope, sub.player_in.as_ref(), team_id);
            details.substitutions.push(NewSubstitution {
                side: sub.side,
                player_in_id,
                player_out_id,
                minute: sub.minute,
            });
        }

        for card in &page.cards {
            let Some(player_id) =
                self.event_player(ctx, scope, card.player.as_ref(), m.team_for(card.side))
            else {
                ctx.anomaly(scope, "card without player");
                continue;
            };
            details.cards.push(NewCard {
                side: card.side,
                player_id,
                minute: card.minute,
                card_type: card.card_type,
            });
        }

        for mp in &page.missed_penalties {
            let own = m.team_for(mp.side);
            let other = m.team_for(mp.side.opposite());
            details.missed_penalties.push(NewMissedPenalty {
                side: mp.side,
                taker_id: self.event_player(ctx, scope, mp.taker.as_ref(), own),
                saved_by_id: self.event_player(ctx, scope, mp.saved_by.as_ref(), other),
                conceded_by_id: self.event_player(ctx, scope, mp.conceded_by.as_ref(), other),
                minute: mp.minute,
            });
        }

        for goal in &page.goals {
            let scorer_side = if goal.own_goal { goal.side.opposite() } else { goal.side };
            let (score1, score2) = goal.score.unzip();
            details.goals.push(NewGoal {
                side: goal.side,
                scorer_id: self.event_player(ctx, scope, goal.scorer.as_ref(), m.team_for(scorer_side)),
                assist_id: self.event_player(ctx, scope, goal.assist.as_ref(), m.team_for(goal.side)),
                minute: goal.minute,
                score1,
                score2,
                own_goal: goal.own_goal,
                penalty: goal.penalty,
            });
        }

        details
    }

    async fn build_lineup(
        &self,
        ctx: &mut IngestContext,
        side: Side,
        team_id: i64,
        block: &LineupBlock,
    ) -> NewLineup {
        let mut lineup = NewLineup {
            side,
            formation: block.formation,
            captain_id: None,
            starters: Vec::with_capacity(block.starters.len()),
            bench: Vec::with_capacity(block.bench.len()),
        };

        for (entry, is_starter) in block
            .starters
            .iter()
            .map(|e| (e, true))
            .chain(block.bench.iter().map(|e| (e, false)))
        {
            let player = match self
                .resolver
                .resolve_lineup_player(ctx, &entry.player, team_id, entry.shirt_number)
                .await
            {
                Ok(p) => p,
                Err(e) => {
                    ctx.anomaly(
                        format!("player {}", entry.player.external_id),
                        format!("{:#}", e),
                    );
                    continue;
                }
            };
            let slot = LineupSlot {
                player_id: player.id,
                shirt_number: entry.shirt_number,
            };
            if is_starter {
                if entry.captain {
                    lineup.captain_id = Some(player.id);
                }
                lineup.starters.push(slot);
            } else {
                lineup.bench.push(slot);
            }
        }
        lineup
    }

    /// Resolve an optional event player; a storage failure is an anomaly.
    fn event_player(
        &self,
        ctx: &mut IngestContext,
        scope: &str,
        player: Option<&PlayerRef>,
        team_id: i64,
    ) -> Option<i64> {
        let player = player?;
        match self.resolver.resolve_event_player(player, team_id) {
            Ok(p) => Some(p.id),
            Err(e) => {
                ctx.anomaly(scope, format!("player {}: {:#}", player.external_id, e));
                None
            }
        }
    }
}
