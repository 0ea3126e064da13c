pub mod composite;
pub mod matches;
pub mod resolver;
pub mod rounds;

pub use composite::seed_composite_league;
pub use matches::MatchIngestor;
pub use resolver::EntityResolver;
pub use rounds::RoundGrouper;

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument, Span};

use crate::db::models::{LeagueLayout, Round};
use crate::db::Database;
use crate::transfermarkt::{parse_league_page, MatchRow, PageLayout, PageSource};

/// Something that could not be reconciled and was skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    /// Smallest unit affected, e.g. "match 3200001" or "player 433177"
    pub scope: String,
    pub detail: String,
}

/// State of one ingestion invocation: its span and the anomalies it met.
pub struct IngestContext {
    span: Span,
    anomalies: Vec<Anomaly>,
    pub matches_seen: usize,
    pub matches_skipped: usize,
    pub details_stored: usize,
}

impl IngestContext {
    pub fn new(competition: &str) -> Self {
        IngestContext {
            span: info_span!("ingest", competition = %competition),
            anomalies: Vec::new(),
            matches_seen: 0,
            matches_skipped: 0,
            details_stored: 0,
        }
    }

    pub fn span(&self) -> Span {
        self.span.clone()
    }

    /// Record and log an anomaly. Processing of the enclosing unit continues.
    pub fn anomaly(&mut self, scope: impl Into<String>, detail: impl Display) {
        let anomaly = Anomaly {
            scope: scope.into(),
            detail: detail.to_string(),
        };
        self.span.in_scope(|| {
            warn!(scope = %anomaly.scope, detail = %anomaly.detail, "ingestion anomaly");
        });
        self.anomalies.push(anomaly);
    }

    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }
}

/// Outcome of one league ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub league_id: i64,
    pub league_name: String,
    pub layout: LeagueLayout,
    pub matches_seen: usize,
    pub matches_skipped: usize,
    pub details_stored: usize,
    pub anomalies: Vec<Anomaly>,
}

/// Top-level orchestrator: fetches a competition schedule, decides its
/// layout and drives round grouping and match ingestion.
pub struct LeagueIngestor {
    db: Database,
    source: Arc<dyn PageSource>,
    matches: MatchIngestor,
}

impl LeagueIngestor {
    pub fn new(db: Database, source: Arc<dyn PageSource>) -> Self {
        let resolver = EntityResolver::new(db.clone(), source.clone());
        let matches = MatchIngestor::new(db.clone(), source.clone(), resolver);
        LeagueIngestor {
            db,
            source,
            matches,
        }
    }

    /// Ingest one competition season. `competition_path` and `season` are
    /// concatenated into the schedule path.
    pub async fn ingest(&self, competition_path: &str, season: &str) -> Result<IngestReport> {
        let path = format!("{}{}", competition_path, season);
        let mut ctx = IngestContext::new(&path);
        let span = ctx.span();
        self.run(&mut ctx, &path, season).instrument(span).await
    }

    async fn run(&self, ctx: &mut IngestContext, path: &str, season: &str) -> Result<IngestReport> {
        let html = self
            .source
            .fetch_page(path)
            .await
            .with_context(|| format!("Failed to fetch competition page {}", path))?;
        let page = parse_league_page(&html)
            .with_context(|| format!("No competition found at {}", path))?;

        let layout = match page.layout {
            PageLayout::Flat(_) => LeagueLayout::Single,
            PageLayout::Grouped(_) => LeagueLayout::Grouped,
        };
        let league = self
            .db
            .get_or_create_regular_league(&page.name, Some(season), layout)?;
        info!(
            league = %league.name,
            id = league.id,
            ?layout,
            source = self.source.name(),
            "processing league"
        );

        match &page.layout {
            PageLayout::Flat(matchdays) => {
                for matchday in matchdays {
                    let round = self.db.get_or_create_round(league.id, &matchday.title)?;
                    for row in &matchday.rows {
                        self.ingest_into(ctx, row, league.id, None, &[&round]).await?;
                    }
                    info!(round = %round.name, matches = matchday.rows.len(), "round saved");
                }
            }
            PageLayout::Grouped(groups) => {
                for group_block in groups {
                    let group = self.db.get_or_create_group(league.id, &group_block.name)?;
                    // Each group restarts numbering; league rounds of the same
                    // name are shared between groups.
                    let mut grouper = RoundGrouper::new();
                    for row in &group_block.rows {
                        let name = grouper.push(row.date_time).name.clone();
                        let league_round = self.db.get_or_create_round(league.id, &name)?;
                        let group_round = self.db.get_or_create_round(group.id, &name)?;
                        self.ingest_into(
                            ctx,
                            row,
                            league.id,
                            Some(group.id),
                            &[&league_round, &group_round],
                        )
                        .await?;
                    }
                    info!(
                        group = %group.name,
                        rounds = grouper.rounds().len(),
                        "group processed"
                    );
                }
            }
        }

        let report = IngestReport {
            league_id: league.id,
            league_name: league.name,
            layout,
            matches_seen: ctx.matches_seen,
            matches_skipped: ctx.matches_skipped,
            details_stored: ctx.details_stored,
            anomalies: ctx.anomalies().to_vec(),
        };
        info!(
            seen = report.matches_seen,
            skipped = report.matches_skipped,
            details = report.details_stored,
            anomalies = report.anomalies.len(),
            "ingestion finished"
        );
        Ok(report)
    }

    /// Ingest one row and attach the match to `rounds`. A failing row is an
    /// anomaly; only database errors on round bookkeeping propagate.
    async fn ingest_into(
        &self,
        ctx: &mut IngestContext,
        row: &MatchRow,
        league_id: i64,
        group_id: Option<i64>,
        rounds: &[&Round],
    ) -> Result<()> {
        let m = match self.matches.ingest_row(ctx, row, league_id, group_id).await {
            Ok(m) => m,
            Err(e) => {
                ctx.anomaly(format!("match {}", row.external_id), format!("{:#}", e));
                return Ok(());
            }
        };
        for round in rounds {
            if self.db.add_match_to_round(round, m.id)? {
                self.db.extend_round_bounds(round.id, m.date_time)?;
            }
        }
        Ok(())
    }
}
