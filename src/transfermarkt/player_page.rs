use chrono::NaiveDate;
use regex::Regex;
use scraper::Html;
use serde::Serialize;
use std::sync::LazyLock;

use super::{sel, select_text};
use crate::db::models::Position;

static POSITION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Position:\s*(.*)").expect("valid position pattern"));
static BIRTH_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d\d\.\d\d\.\d\d\d\d").expect("valid date pattern"));

/// Short player profile (tooltip document).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerProfile {
    pub name: Option<String>,
    pub position: Position,
    pub market_value: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub profile_picture: Option<String>,
}

pub fn parse_player_profile(html: &str) -> PlayerProfile {
    let doc = Html::parse_document(html);
    let root = doc.root_element();

    // Info lines are separated by <br>, so look at text nodes one by one
    let info_lines: Vec<String> = root
        .select(&sel(".kurzprofil-infos"))
        .next()
        .map(|info| info.text().map(|t| t.trim().to_string()).collect())
        .unwrap_or_default();

    let position = info_lines
        .iter()
        .find_map(|line| POSITION_RE.captures(line))
        .map(|c| Position::from_profile_text(&c[1]))
        .unwrap_or(Position::Unknown);

    let birth_date = info_lines
        .iter()
        .find_map(|line| BIRTH_DATE_RE.find(line))
        .and_then(|m| NaiveDate::parse_from_str(m.as_str(), "%d.%m.%Y").ok());

    let market_value = select_text(&root, &sel(".kurzprofil-marktwert"))
        .map(|t| t.replace("Market Value:", "").trim().to_string())
        .filter(|t| !t.is_empty());

    let profile_picture = root
        .select(&sel(".bilderrahmen"))
        .next()
        .and_then(|img| img.value().attr("src"))
        .filter(|src| !src.is_empty())
        .map(str::to_string);

    PlayerProfile {
        name: select_text(&root, &sel(".spielername-kurzprofil a")),
        position,
        market_value,
        birth_date,
        profile_picture,
    }
}
