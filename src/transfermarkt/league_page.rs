use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use scraper::{ElementRef, Html};
use serde::Serialize;

use super::{element_text, external_id_from_path, parse_score, sel, select_text};

/// Schedule page of one competition season.
#[derive(Debug, Clone, Serialize)]
pub struct LeaguePage {
    pub name: String,
    pub layout: PageLayout,
}

#[derive(Debug, Clone, Serialize)]
pub enum PageLayout {
    /// One box per matchday, titled e.g. "1.Matchday"
    Flat(Vec<MatchdayBlock>),
    /// One box per competition group, matches listed by date
    Grouped(Vec<GroupBlock>),
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchdayBlock {
    pub title: String,
    pub rows: Vec<MatchRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupBlock {
    pub name: String,
    pub rows: Vec<MatchRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamRef {
    pub name: String,
    pub crest: Option<String>,
}

/// One fixture line of a schedule table.
#[derive(Debug, Clone, Serialize)]
pub struct MatchRow {
    pub external_id: i64,
    /// Link to the match report
    pub detail_path: String,
    pub home: TeamRef,
    pub away: TeamRef,
    /// `None` until the match is played
    pub score: Option<(i32, i32)>,
    /// `None` when the date/time fragments do not parse
    pub date_time: Option<NaiveDateTime>,
}

/// Parse a schedule page. `None` when the page has no competition name at
/// all (wrong path, error page).
pub fn parse_league_page(html: &str) -> Option<LeaguePage> {
    let doc = Html::parse_document(html);
    let root = doc.root_element();

    if let Some(name) = select_text(&root, &sel(".spielername-profil")) {
        let matchdays = parse_matchdays(&root);
        return Some(LeaguePage {
            name,
            layout: PageLayout::Flat(matchdays),
        });
    }

    let name = select_text(&root, &sel("#wettbewerb_head .dataName"))?;
    Some(LeaguePage {
        name,
        layout: PageLayout::Grouped(parse_groups(&root)),
    })
}

fn parse_matchdays(root: &ElementRef) -> Vec<MatchdayBlock> {
    let header = sel(".table-header");
    let tr = sel("tr");
    let td = sel("td");

    root.select(&sel(".row .large-6 .box"))
        .filter_map(|matchday| {
            let title = select_text(&matchday, &header)?;
            let rows = matchday
                .select(&tr)
                .filter_map(|row| {
                    let cells: Vec<_> = row.select(&td).collect();
                    (cells.len() == 7).then(|| parse_row(&cells)).flatten()
                })
                .collect();
            Some(MatchdayBlock { title, rows })
        })
        .collect()
}

fn parse_groups(root: &ElementRef) -> Vec<GroupBlock> {
    let header = sel(".table-header");
    let table = sel("table");
    let tr = sel("tr");
    let td = sel("td");
    let small = sel(".show-for-small");

    let mut groups = Vec::new();
    for group in root.select(&sel(".large-8 .row .large-6")) {
        let Some(name) = select_text(&group, &header) else {
            continue;
        };
        let Some(table) = group.select(&table).last() else {
            groups.push(GroupBlock { name, rows: vec![] });
            continue;
        };

        // Grouped tables print the date once, in a narrow row above the
        // matches of that day.
        let mut date_cell: Option<ElementRef> = None;
        let mut rows = Vec::new();
        for row in table.select(&tr) {
            let cells: Vec<_> = row.select(&td).collect();
            if cells.len() == 1 {
                let cell = cells[0];
                let is_date_row = cell.value().classes().any(|c| c == "show-for-small")
                    || cell.select(&small).next().is_some();
                if is_date_row {
                    date_cell = Some(cell);
                }
            }
            if cells.len() != 6 {
                continue;
            }
            let Some(date_cell) = date_cell else {
                continue;
            };
            let mut full = Vec::with_capacity(7);
            full.push(date_cell);
            full.extend(cells);
            if let Some(parsed) = parse_row(&full) {
                rows.push(parsed);
            }
        }
        groups.push(GroupBlock { name, rows });
    }
    groups
}

/// Seven cells: date link, time, home name, home crest, result link,
/// away crest, away name.
fn parse_row(cells: &[ElementRef]) -> Option<MatchRow> {
    let a = sel("a");

    let result_link = cells[4].select(&a).next()?;
    let detail_path = result_link.value().attr("href")?.to_string();
    let external_id = external_id_from_path(&detail_path)?;
    let score = parse_score(&element_text(&result_link));

    let date_link = cells[0].select(&a).next();
    let date_raw = date_link
        .and_then(|l| l.value().attr("href"))
        .and_then(|href| href.rsplit('/').next())
        .unwrap_or_default();
    let mut time_raw = date_link
        .and_then(|l| l.next_sibling())
        .and_then(|n| n.value().as_text().map(|t| t.trim().to_string()))
        .unwrap_or_default();
    if time_raw.is_empty() {
        time_raw = element_text(&cells[1]);
    }

    let home = team_ref(&cells[2], &cells[3]);
    let away = team_ref(&cells[6], &cells[5]);
    if home.name.is_empty() || away.name.is_empty() {
        return None;
    }

    Some(MatchRow {
        external_id,
        detail_path,
        home,
        away,
        score,
        date_time: parse_kickoff(date_raw, &time_raw),
    })
}

fn team_ref(name_cell: &ElementRef, crest_cell: &ElementRef) -> TeamRef {
    let names: Vec<String> = name_cell
        .select(&sel("a"))
        .map(|l| element_text(&l))
        .filter(|t| !t.is_empty())
        .collect();
    let name = if names.is_empty() {
        element_text(name_cell)
    } else {
        names.join(" ")
    };
    let crest = crest_cell
        .select(&sel("img"))
        .next()
        .and_then(|i| i.value().attr("src"))
        .filter(|src| !src.is_empty())
        .map(normalise_crest);
    TeamRef { name, crest }
}

/// Crest thumbnails link the "tiny" variant; store the "normal" one.
pub fn normalise_crest(src: &str) -> String {
    src.replace("tiny", "normal")
}

/// Date fragment `YYYY-MM-DD` plus time `h:mm AM/PM`. A blank or `-` time
/// means the kick-off is not fixed yet and resolves to midnight.
pub fn parse_kickoff(date: &str, time: &str) -> Option<NaiveDateTime> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()?;
    let time = time.trim();
    if time.is_empty() || time == "-" {
        return date.and_hms_opt(0, 0, 0);
    }
    NaiveTime::parse_from_str(time, "%I:%M %p")
        .ok()
        .map(|t| date.and_time(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLAT: &str = include_str!("../../fixtures/league_flat.html");
    const GROUPED: &str = include_str!("../../fixtures/league_grouped.html");

    #[test]
    fn test_parse_kickoff() {
        let d = parse_kickoff("2019-08-09", "8:00 PM").unwrap();
        assert_eq!(d.to_string(), "2019-08-09 20:00:00");
        let d = parse_kickoff("2019-08-10", "12:30 PM").unwrap();
        assert_eq!(d.to_string(), "2019-08-10 12:30:00");
        let d = parse_kickoff("2019-08-10", "-").unwrap();
        assert_eq!(d.to_string(), "2019-08-10 00:00:00");
        assert!(parse_kickoff("", "8:00 PM").is_none());
        assert!(parse_kickoff("2019-08-10", "soon").is_none());
    }

    #[test]
    fn test_crest_normalised() {
        assert_eq!(
            normalise_crest("https://tmssl.akamaized.net/images/wappen/tiny/11.png"),
            "https://tmssl.akamaized.net/images/wappen/normal/11.png"
        );
    }

    #[test]
    fn test_flat_page() {
        let page = parse_league_page(FLAT).unwrap();
        assert_eq!(page.name, "Premier League");
        let PageLayout::Flat(matchdays) = page.layout else {
            panic!("expected flat layout");
        };
        assert_eq!(matchdays.len(), 2);
        assert_eq!(matchdays[0].title, "1.Matchday");
        assert_eq!(matchdays[0].rows.len(), 2);

        let first = &matchdays[0].rows[0];
        assert_eq!(first.external_id, 3_200_001);
        assert_eq!(first.home.name, "Arsenal FC");
        assert_eq!(first.away.name, "Chelsea FC");
        assert_eq!(first.score, Some((2, 1)));
        assert_eq!(first.date_time.unwrap().to_string(), "2019-08-10 15:00:00");
        assert_eq!(
            first.home.crest.as_deref(),
            Some("https://tmssl.akamaized.net/images/wappen/normal/11.png")
        );

        // unplayed fixture keeps a null score
        let later = &matchdays[1].rows[0];
        assert_eq!(later.score, None);
        assert_eq!(later.date_time.unwrap().to_string(), "2019-08-17 00:00:00");
    }

    #[test]
    fn test_grouped_page() {
        let page = parse_league_page(GROUPED).unwrap();
        assert_eq!(page.name, "Champions League");
        let PageLayout::Grouped(groups) = page.layout else {
            panic!("expected grouped layout");
        };
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "Group A");
        assert_eq!(groups[0].rows.len(), 2);
        assert_eq!(groups[1].rows.len(), 1);
        let row = &groups[0].rows[1];
        assert_eq!(row.date_time.unwrap().to_string(), "2019-10-01 21:00:00");
        assert_eq!(row.score, Some((0, 0)));
    }

    #[test]
    fn test_unknown_page() {
        assert!(parse_league_page("<html><body><p>404</p></body></html>").is_none());
    }
}
