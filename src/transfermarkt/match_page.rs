use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::LazyLock;

use super::minute::minute_from_sprite;
use super::{element_text, external_id_from_path, parse_score, sel, select_text};
use crate::db::models::{CardType, Formation, Side};

static FORMATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\d-)+\d").expect("valid formation pattern"));

/// A player as linked from a match page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerRef {
    pub external_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LineupEntry {
    pub player: PlayerRef,
    pub shirt_number: Option<i32>,
    pub captain: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LineupBlock {
    pub formation: Formation,
    /// Whether the block carried a tactical shape at all. Without one the
    /// page lists names only: no shirt numbers, captain or bench.
    pub has_shape: bool,
    pub starters: Vec<LineupEntry>,
    pub bench: Vec<LineupEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubstitutionEntry {
    pub side: Side,
    pub minute: Option<i32>,
    pub player_in: Option<PlayerRef>,
    pub player_out: Option<PlayerRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CardEntry {
    pub side: Side,
    pub minute: Option<i32>,
    pub player: Option<PlayerRef>,
    pub card_type: CardType,
}

#[derive(Debug, Clone, Serialize)]
pub struct MissedPenaltyEntry {
    /// Side of the penalty taker
    pub side: Side,
    pub minute: Option<i32>,
    pub taker: Option<PlayerRef>,
    /// Goalkeeper of the other side
    pub saved_by: Option<PlayerRef>,
    /// Fouling player of the other side
    pub conceded_by: Option<PlayerRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GoalEntry {
    /// Side the goal is listed under (the side it counts for)
    pub side: Side,
    pub minute: Option<i32>,
    pub scorer: Option<PlayerRef>,
    pub assist: Option<PlayerRef>,
    /// Running score after the goal
    pub score: Option<(i32, i32)>,
    pub own_goal: bool,
    pub penalty: bool,
}

/// Everything extracted from one match report page.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchDetailPage {
    /// Home then away; empty unless the page shows exactly two lineup blocks
    pub lineups: Vec<LineupBlock>,
    pub stadium: Option<String>,
    pub substitutions: Vec<SubstitutionEntry>,
    pub cards: Vec<CardEntry>,
    pub missed_penalties: Vec<MissedPenaltyEntry>,
    pub goals: Vec<GoalEntry>,
}

pub fn parse_match_page(html: &str) -> MatchDetailPage {
    let doc = Html::parse_document(html);
    let root = doc.root_element();

    let blocks: Vec<_> = root.select(&sel("#main .box .large-6")).collect();
    let lineups = if blocks.len() == 2 {
        blocks.iter().map(parse_lineup).collect()
    } else {
        Vec::new()
    };

    MatchDetailPage {
        lineups,
        stadium: parse_stadium(&root),
        substitutions: event_rows(&root, "#sb-wechsel ul li")
            .map(|li| parse_substitution(&li))
            .collect(),
        cards: event_rows(&root, "#sb-karten ul li")
            .map(|li| parse_card(&li))
            .collect(),
        missed_penalties: event_rows(&root, "#sb-verschossene ul li")
            .map(|li| parse_missed_penalty(&li))
            .collect(),
        goals: event_rows(&root, "#sb-tore ul li")
            .map(|li| parse_goal(&li))
            .collect(),
    }
}

fn event_rows<'a>(root: &ElementRef<'a>, css: &str) -> impl Iterator<Item = ElementRef<'a>> {
    root.select(&sel(css)).collect::<Vec<_>>().into_iter()
}

// ── Lineups ───────────────────────────────────────────────────────────────────

/// Tactical shape printed in the first row of a lineup block, e.g.
/// "Starting Line-up: 4-3-3 Attacking".
fn parse_shape(block: &ElementRef) -> Option<String> {
    let row = block.select(&sel(".row")).next()?;
    let div = row.select(&sel("div")).next()?;
    FORMATION_RE
        .find(&element_text(&div))
        .map(|m| m.as_str().to_string())
}

fn parse_lineup(block: &ElementRef) -> LineupBlock {
    let Some(shape) = parse_shape(block) else {
        // Names only: keep every distinct linked player as a starter
        let mut seen = HashSet::new();
        let starters = block
            .select(&sel(".spielprofil_tooltip"))
            .filter_map(|a| player_from_href(&a))
            .filter(|p| seen.insert(p.external_id))
            .map(|player| LineupEntry {
                player,
                shirt_number: None,
                captain: false,
            })
            .collect();
        return LineupBlock {
            formation: Formation::Unknown,
            has_shape: false,
            starters,
            bench: Vec::new(),
        };
    };

    let a = sel("a");
    let number = sel(".aufstellung-rueckennummer-box");
    let captain = sel(".kapitaenicon-formation");
    let starters = block
        .select(&sel(".aufstellung-spieler-container"))
        .filter_map(|container| {
            let player = container.select(&a).find_map(|l| player_from_href(&l))?;
            Some(LineupEntry {
                player,
                shirt_number: select_text(&container, &number).and_then(|t| t.parse().ok()),
                captain: container.select(&captain).next().is_some(),
            })
        })
        .collect();

    let tooltip = sel(".spielprofil_tooltip");
    let td = sel("td");
    let bench = block
        .select(&sel(".aufstellung-ersatzbank-box tr"))
        .filter_map(|row| {
            let link = row.select(&tooltip).next()?;
            let player = player_from_href(&link)?;
            Some(LineupEntry {
                player,
                shirt_number: select_text(&row, &td).and_then(|t| t.parse().ok()),
                captain: false,
            })
        })
        .collect();

    LineupBlock {
        formation: Formation::from_shape(&shape),
        has_shape: true,
        starters,
        bench,
    }
}

fn parse_stadium(root: &ElementRef) -> Option<String> {
    let info = root.select(&sel("#main .box .sb-zusatzinfos")).next()?;
    info.select(&sel("a"))
        .filter(|a| {
            a.value()
                .attr("href")
                .is_some_and(|href| href.starts_with("/stadion"))
        })
        .map(|a| element_text(&a))
        .filter(|name| !name.is_empty())
        .last()
}

// ── Events ────────────────────────────────────────────────────────────────────

fn side_of(li: &ElementRef) -> Side {
    if li.value().classes().any(|c| c == "sb-aktion-gast") {
        Side::Away
    } else {
        Side::Home
    }
}

fn event_minute(li: &ElementRef) -> Option<i32> {
    let clock = li.select(&sel(".sb-sprite-uhr-klein")).next()?;
    let style = clock.value().attr("style").unwrap_or_default();
    minute_from_sprite(style, &element_text(&clock))
}

/// Event links carry the player id in their `id` attribute; lineup links
/// only in the profile path.
fn player_from_event_link(a: &ElementRef) -> Option<PlayerRef> {
    let external_id = a
        .value()
        .attr("id")
        .and_then(|id| id.trim().parse().ok())
        .or_else(|| a.value().attr("href").and_then(external_id_from_path))?;
    Some(PlayerRef {
        external_id,
        name: element_text(a),
    })
}

fn player_from_href(a: &ElementRef) -> Option<PlayerRef> {
    let external_id = a.value().attr("href").and_then(external_id_from_path)?;
    let name = element_text(a);
    let name = if name.is_empty() {
        a.value().attr("title").unwrap_or_default().trim().to_string()
    } else {
        name
    };
    Some(PlayerRef { external_id, name })
}

fn first_player(li: &ElementRef, selector: &Selector) -> Option<PlayerRef> {
    li.select(selector)
        .next()
        .and_then(|a| player_from_event_link(&a))
}

fn parse_substitution(li: &ElementRef) -> SubstitutionEntry {
    SubstitutionEntry {
        side: side_of(li),
        minute: event_minute(li),
        player_in: first_player(li, &sel(".sb-aktion-wechsel-ein a")),
        player_out: first_player(li, &sel(".sb-aktion-wechsel-aus a")),
    }
}

fn parse_card(li: &ElementRef) -> CardEntry {
    let card_type = if li.select(&sel(".sb-rot")).next().is_some() {
        CardType::Red
    } else {
        CardType::Yellow
    };
    CardEntry {
        side: side_of(li),
        minute: event_minute(li),
        player: first_player(li, &sel(".sb-aktion-aktion a")),
        card_type,
    }
}

fn parse_missed_penalty(li: &ElementRef) -> MissedPenaltyEntry {
    let mut entry = MissedPenaltyEntry {
        side: side_of(li),
        minute: event_minute(li),
        taker: None,
        saved_by: None,
        conceded_by: None,
    };
    let a = sel("a");
    for span in li.select(&sel(".sb-aktion-aktion span")) {
        let Some(player) = span.select(&a).next().and_then(|l| player_from_event_link(&l)) else {
            continue;
        };
        let text = element_text(&span);
        if text.contains("Missed") {
            continue;
        } else if text.contains("Saved") {
            entry.saved_by = Some(player);
        } else if text.contains("Conceded") {
            entry.conceded_by = Some(player);
        } else {
            entry.taker = Some(player);
        }
    }
    entry
}

fn parse_goal(li: &ElementRef) -> GoalEntry {
    let links = sel(".sb-aktion-aktion a");
    let mut players = li.select(&links).filter_map(|a| player_from_event_link(&a));
    let scorer = players.next();
    let assist = players.next();
    let text = element_text(li);
    GoalEntry {
        side: side_of(li),
        minute: event_minute(li),
        scorer,
        assist,
        score: select_text(li, &sel(".sb-aktion-spielstand")).and_then(|t| parse_score(&t)),
        own_goal: text.contains("Own-goal"),
        penalty: text.contains("Penalty"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL: &str = include_str!("../../fixtures/match_detail.html");

    #[test]
    fn test_lineups() {
        let page = parse_match_page(DETAIL);
        assert_eq!(page.lineups.len(), 2);

        let home = &page.lineups[0];
        assert!(home.has_shape);
        assert_eq!(home.formation, Formation::F433);
        assert_eq!(home.starters.len(), 3);
        assert_eq!(home.starters[0].shirt_number, Some(1));
        assert!(home.starters[1].captain);
        assert_eq!(home.bench.len(), 1);
        assert_eq!(home.bench[0].player.external_id, 104);
        assert_eq!(home.bench[0].shirt_number, Some(12));

        let away = &page.lineups[1];
        assert!(!away.has_shape);
        assert_eq!(away.formation, Formation::Unknown);
        assert_eq!(away.starters.len(), 3);
        assert!(away.bench.is_empty());
    }

    #[test]
    fn test_stadium() {
        let page = parse_match_page(DETAIL);
        assert_eq!(page.stadium.as_deref(), Some("Emirates Stadium"));
    }

    #[test]
    fn test_events() {
        let page = parse_match_page(DETAIL);

        assert_eq!(page.substitutions.len(), 2);
        let sub = &page.substitutions[0];
        assert_eq!(sub.side, Side::Home);
        assert_eq!(sub.minute, Some(63));
        assert_eq!(sub.player_in.as_ref().unwrap().external_id, 104);
        assert_eq!(sub.player_out.as_ref().unwrap().external_id, 103);
        assert_eq!(page.substitutions[1].side, Side::Away);

        assert_eq!(page.cards.len(), 2);
        assert_eq!(page.cards[0].card_type, CardType::Yellow);
        assert_eq!(page.cards[1].card_type, CardType::Red);
        assert_eq!(page.cards[1].side, Side::Away);

        assert_eq!(page.missed_penalties.len(), 1);
        let mp = &page.missed_penalties[0];
        assert_eq!(mp.side, Side::Away);
        assert_eq!(mp.taker.as_ref().unwrap().external_id, 202);
        assert_eq!(mp.saved_by.as_ref().unwrap().external_id, 101);

        assert_eq!(page.goals.len(), 3);
        let first = &page.goals[0];
        assert_eq!(first.scorer.as_ref().unwrap().external_id, 103);
        assert_eq!(first.assist.as_ref().unwrap().external_id, 102);
        assert_eq!(first.score, Some((1, 0)));
        assert_eq!(first.minute, Some(12));
        assert!(page.goals[1].penalty);
        assert_eq!(page.goals[1].side, Side::Away);
        assert_eq!(page.goals[2].minute, Some(93));
    }

    #[test]
    fn test_goal_links_give_scorer_then_assist() {
        let page = parse_match_page(DETAIL);
        let scorers: Vec<_> = page
            .goals
            .iter()
            .map(|g| g.scorer.as_ref().map(|p| p.external_id))
            .collect();
        assert_eq!(scorers, vec![Some(103), Some(201), Some(104)]);
        assert!(page.goals[1].assist.is_none());
        assert!(page.goals[2].assist.is_none());
        assert!(!page.goals[0].own_goal);
    }

    #[test]
    fn test_page_without_blocks() {
        let page = parse_match_page("<html><body><div id=\"main\"></div></body></html>");
        assert!(page.lineups.is_empty());
        assert!(page.stadium.is_none());
        assert!(page.goals.is_empty());
    }

    #[test]
    fn test_formation_shape() {
        assert_eq!(
            FORMATION_RE.find("Starting Line-up: 4-2-3-1 defensive").unwrap().as_str(),
            "4-2-3-1"
        );
        assert!(FORMATION_RE.find("Starting Line-up").is_none());
    }
}
