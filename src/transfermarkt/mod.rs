pub mod client;
pub mod league_page;
pub mod match_page;
pub mod minute;
pub mod player_page;
pub mod source;

pub use client::TransfermarktClient;
pub use league_page::{parse_league_page, MatchRow, PageLayout, TeamRef};
pub use match_page::{parse_match_page, MatchDetailPage, PlayerRef};
pub use player_page::parse_player_profile;
pub use source::PageSource;

use scraper::{ElementRef, Selector};

/// Compile a selector literal.
///
/// Callers must pass a constant: an invalid selector is a programming error
/// and panics.
fn sel(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {css:?}: {e}"))
}

/// Whitespace-normalised text content of an element.
fn element_text(el: &ElementRef) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn select_text(el: &ElementRef, selector: &Selector) -> Option<String> {
    el.select(selector)
        .next()
        .map(|e| element_text(&e))
        .filter(|t| !t.is_empty())
}

/// Numeric id in the last path segment of a site link
/// (`/arsenal_chelsea/index/spielbericht/3200000` -> 3200000).
pub fn external_id_from_path(href: &str) -> Option<i64> {
    href.trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|segment| segment.trim().parse().ok())
}

/// "A:B" score text. Anything else (e.g. "-:-" before kick-off) is `None`.
pub fn parse_score(text: &str) -> Option<(i32, i32)> {
    let (a, b) = text.trim().split_once(':')?;
    let a = a.trim().parse().ok()?;
    let b = b.trim().split_whitespace().next()?.parse().ok()?;
    Some((a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_id_from_path() {
        assert_eq!(
            external_id_from_path("/arsenal_chelsea/index/spielbericht/3200000"),
            Some(3_200_000)
        );
        assert_eq!(external_id_from_path("/profil/spieler/433177/"), Some(433177));
        assert_eq!(external_id_from_path("/aktuell/waspassiertheute/aktuell/new/datum/2019-08-09"), None);
        assert_eq!(external_id_from_path(""), None);
    }

    #[test]
    fn test_parse_score() {
        assert_eq!(parse_score("2:1"), Some((2, 1)));
        assert_eq!(parse_score(" 0 : 0 "), Some((0, 0)));
        assert_eq!(parse_score("3:2 AET"), Some((3, 2)));
        assert_eq!(parse_score("-:-"), None);
        assert_eq!(parse_score(""), None);
    }
}
