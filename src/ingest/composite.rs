use anyhow::Result;
use tracing::info;

use super::rounds::group_rounds;
use crate::db::models::{League, LeagueKind, LeagueLayout};
use crate::db::Database;
use crate::error::ServiceError;

/// Build a regular league over existing regular leagues: members become its
/// groups, their teams join it, and rounds are derived by week over every
/// member match. A composite league of the same name and season is reused and
/// its rounds are assigned again, which fills in whatever an interrupted
/// seeding left out.
pub fn seed_composite_league(db: &Database, name: &str, members: &[i64]) -> Result<League> {
    if members.is_empty() {
        anyhow::bail!("a composite league needs at least one member league");
    }
    let mut season = None;
    for (i, &id) in members.iter().enumerate() {
        let league = db
            .find_league(id)?
            .filter(|l| l.kind == LeagueKind::Regular)
            .ok_or(ServiceError::InvalidLeagueId(id))?;
        if i == 0 {
            season = league.season;
        }
    }

    let league = match db.find_regular_league(name, season.as_deref())? {
        Some(existing) if existing.layout == LeagueLayout::Composite => {
            info!(league = %existing.name, id = existing.id, "composite league already seeded");
            existing
        }
        Some(existing) => anyhow::bail!(
            "league '{}' ({}) already exists and is not composite",
            existing.name,
            existing.id
        ),
        None => db.create_composite_league(name, season.as_deref(), members)?,
    };

    let (matches, rounds, placed) = assign_rounds(db, &league, members)?;
    info!(
        league = %league.name,
        id = league.id,
        members = members.len(),
        matches,
        rounds,
        placed,
        "composite league rounds assigned"
    );
    Ok(league)
}

/// Group every member match into week rounds of `league`. Matches already in
/// a round of the league stay where they are. Returns the number of matches,
/// rounds and newly placed matches.
fn assign_rounds(db: &Database, league: &League, members: &[i64]) -> Result<(usize, usize, usize)> {
    let matches = db.scoped_match_dates(members)?;
    let dates: Vec<_> = matches.iter().map(|(_, date)| *date).collect();
    let spans = group_rounds(&dates);
    let mut placed = 0;
    for span in &spans {
        let round = db.get_or_create_round(league.id, &span.name)?;
        for &i in &span.members {
            let (match_id, date) = matches[i];
            if db.add_match_to_round(&round, match_id)? {
                db.extend_round_bounds(round.id, date)?;
                placed += 1;
            }
        }
    }
    Ok((matches.len(), spans.len(), placed))
}
