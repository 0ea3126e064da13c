use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stores a closed enum as its lowercase text tag.
macro_rules! sql_text_enum {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: UnknownTag| FromSqlError::Other(Box::new(e)))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

#[derive(Debug, Clone)]
pub struct UnknownTag(pub String);

impl fmt::Display for UnknownTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown tag '{}'", self.0)
    }
}

impl std::error::Error for UnknownTag {}

// ── Enumerations ──────────────────────────────────────────────────────────────

/// Which side of a fixture an event or lineup belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Home => Side::Away,
            Side::Away => Side::Home,
        }
    }
}

impl FromStr for Side {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "home" => Ok(Side::Home),
            "away" => Ok(Side::Away),
            other => Err(UnknownTag(other.to_string())),
        }
    }
}

sql_text_enum!(Side);

/// Regular leagues are scoreable; groups only exist inside a grouped league.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeagueKind {
    Regular,
    Group,
}

impl LeagueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeagueKind::Regular => "regular",
            LeagueKind::Group => "group",
        }
    }
}

impl FromStr for LeagueKind {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "regular" => Ok(LeagueKind::Regular),
            "group" => Ok(LeagueKind::Group),
            other => Err(UnknownTag(other.to_string())),
        }
    }
}

sql_text_enum!(LeagueKind);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeagueLayout {
    /// One table, matches listed per matchday
    Single,
    /// Several competition groups, rounds derived per week
    Grouped,
    /// Built over other leagues by `seed-composite`
    Composite,
}

impl LeagueLayout {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeagueLayout::Single => "single",
            LeagueLayout::Grouped => "grouped",
            LeagueLayout::Composite => "composite",
        }
    }
}

impl FromStr for LeagueLayout {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(LeagueLayout::Single),
            "grouped" => Ok(LeagueLayout::Grouped),
            "composite" => Ok(LeagueLayout::Composite),
            other => Err(UnknownTag(other.to_string())),
        }
    }
}

sql_text_enum!(LeagueLayout);

/// Player position category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Goalkeeper,
    Defender,
    Midfielder,
    Attacker,
    Unknown,
}

impl Position {
    pub fn as_str(&self) -> &'static str {
        match self {
            Position::Goalkeeper => "goalkeeper",
            Position::Defender => "defender",
            Position::Midfielder => "midfielder",
            Position::Attacker => "attacker",
            Position::Unknown => "unknown",
        }
    }

    /// Map the free-text position shown on a player profile ("Centre-Back",
    /// "Left Winger", ...) onto a category.
    pub fn from_profile_text(text: &str) -> Position {
        let t = text.trim().to_lowercase();
        if t.is_empty() {
            Position::Unknown
        } else if t.contains("goalkeeper") || t == "keeper" {
            Position::Goalkeeper
        } else if t.contains("midfield") {
            // before the defender check: "Defensive Midfield"
            Position::Midfielder
        } else if t.contains("back") || t.contains("defen") || t.contains("sweeper") {
            Position::Defender
        } else if t.contains("forward")
            || t.contains("winger")
            || t.contains("striker")
            || t.contains("attack")
        {
            Position::Attacker
        } else {
            Position::Unknown
        }
    }
}

impl FromStr for Position {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "goalkeeper" => Ok(Position::Goalkeeper),
            "defender" => Ok(Position::Defender),
            "midfielder" => Ok(Position::Midfielder),
            "attacker" => Ok(Position::Attacker),
            "unknown" => Ok(Position::Unknown),
            other => Err(UnknownTag(other.to_string())),
        }
    }
}

sql_text_enum!(Position);

/// Tactical shape of a lineup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Formation {
    F442,
    F433,
    F4231,
    F4141,
    F4411,
    F451,
    F41212,
    F4312,
    F4321,
    F4222,
    F4132,
    F352,
    F343,
    F3421,
    F3412,
    F3142,
    F3511,
    F532,
    F541,
    Unknown,
}

const FORMATIONS: &[(Formation, &str)] = &[
    (Formation::F442, "4-4-2"),
    (Formation::F433, "4-3-3"),
    (Formation::F4231, "4-2-3-1"),
    (Formation::F4141, "4-1-4-1"),
    (Formation::F4411, "4-4-1-1"),
    (Formation::F451, "4-5-1"),
    (Formation::F41212, "4-1-2-1-2"),
    (Formation::F4312, "4-3-1-2"),
    (Formation::F4321, "4-3-2-1"),
    (Formation::F4222, "4-2-2-2"),
    (Formation::F4132, "4-1-3-2"),
    (Formation::F352, "3-5-2"),
    (Formation::F343, "3-4-3"),
    (Formation::F3421, "3-4-2-1"),
    (Formation::F3412, "3-4-1-2"),
    (Formation::F3142, "3-1-4-2"),
    (Formation::F3511, "3-5-1-1"),
    (Formation::F532, "5-3-2"),
    (Formation::F541, "5-4-1"),
    (Formation::Unknown, "unknown"),
];

impl Formation {
    pub fn as_str(&self) -> &'static str {
        FORMATIONS
            .iter()
            .find(|(f, _)| f == self)
            .map(|(_, s)| *s)
            .unwrap_or("unknown")
    }

    /// Shape string such as "4-3-3"; anything not in the table is `Unknown`.
    pub fn from_shape(shape: &str) -> Formation {
        let shape = shape.trim();
        FORMATIONS
            .iter()
            .find(|(_, s)| *s == shape)
            .map(|(f, _)| *f)
            .unwrap_or(Formation::Unknown)
    }
}

impl FromStr for Formation {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Formation::from_shape(s) {
            Formation::Unknown if s != "unknown" => Err(UnknownTag(s.to_string())),
            f => Ok(f),
        }
    }
}

sql_text_enum!(Formation);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    Yellow,
    Red,
}

impl CardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::Yellow => "yellow",
            CardType::Red => "red",
        }
    }
}

impl FromStr for CardType {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yellow" => Ok(CardType::Yellow),
            "red" => Ok(CardType::Red),
            other => Err(UnknownTag(other.to_string())),
        }
    }
}

sql_text_enum!(CardType);

// ── Stored entities ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct League {
    pub id: i64,
    pub name: String,
    pub season: Option<String>,
    pub kind: LeagueKind,
    pub layout: LeagueLayout,
}

/// A matchday window of one league scope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub id: i64,
    pub league_id: i64,
    pub name: String,
    pub start_date: Option<NaiveDateTime>,
    pub end_date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub name: String,
    /// Globally unique
    pub code: String,
    /// Crest image URL
    pub crest: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: i64,
    /// Identifier assigned by the statistics site
    pub external_id: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: String,
    pub position: Position,
    pub birth_date: Option<NaiveDate>,
    pub shirt_number: Option<i32>,
    /// Raw market value text as displayed, e.g. "€12.00m"
    pub market_value: Option<String>,
    pub profile_picture: Option<String>,
    /// Profile page read at least once, whatever it yielded
    pub profile_fetched: bool,
}

impl Player {
    /// Profile already read and external id known: no fetch needed.
    pub fn is_fully_resolved(&self) -> bool {
        self.profile_fetched && self.external_id.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stadium {
    pub id: i64,
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: i64,
    /// Primary de-duplication key for ingestion
    pub external_id: i64,
    pub league_id: i64,
    pub team1_id: i64,
    pub team2_id: i64,
    pub score1: Option<i32>,
    pub score2: Option<i32>,
    pub date_time: Option<NaiveDateTime>,
    pub stadium_id: Option<i64>,
    pub lineup1_id: Option<i64>,
    pub lineup2_id: Option<i64>,
    pub review_required: bool,
}

impl Match {
    pub fn is_played(&self) -> bool {
        self.score1.is_some() && self.score2.is_some()
    }

    pub fn is_detail_processed(&self) -> bool {
        self.lineup1_id.is_some() && self.lineup2_id.is_some()
    }

    pub fn team_for(&self, side: Side) -> i64 {
        match side {
            Side::Home => self.team1_id,
            Side::Away => self.team2_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lineup {
    pub id: i64,
    pub match_id: i64,
    pub side: Side,
    pub formation: Formation,
    pub captain_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Substitution {
    pub id: i64,
    pub lineup_id: i64,
    /// Player coming on; the site occasionally omits it
    pub player_in_id: Option<i64>,
    /// Player leaving the pitch
    pub player_out_id: i64,
    pub minute: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: i64,
    pub match_id: i64,
    /// Side the goal counts for
    pub side: Side,
    pub scorer_id: Option<i64>,
    pub assist_id: Option<i64>,
    pub minute: Option<i32>,
    /// Running score after this goal
    pub score1: Option<i32>,
    pub score2: Option<i32>,
    pub own_goal: bool,
    pub penalty: bool,
}

impl Goal {
    /// Side the scorer plays for (own goals count for the opponent).
    pub fn scorer_side(&self) -> Side {
        if self.own_goal {
            self.side.opposite()
        } else {
            self.side
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: i64,
    pub match_id: i64,
    pub side: Side,
    pub player_id: i64,
    pub minute: Option<i32>,
    pub card_type: CardType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissedPenalty {
    pub id: i64,
    pub match_id: i64,
    /// Side of the penalty taker
    pub side: Side,
    pub taker_id: Option<i64>,
    pub saved_by_id: Option<i64>,
    pub conceded_by_id: Option<i64>,
    pub minute: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerPoints {
    pub id: Option<i64>,
    pub match_id: i64,
    pub player_id: i64,
    pub points: f64,
}

// ── Write-side inputs ─────────────────────────────────────────────────────────

/// Player fields gathered from a lineup and optionally a profile page.
#[derive(Debug, Clone, Default)]
pub struct NewPlayer {
    pub external_id: i64,
    pub first_name: Option<String>,
    pub last_name: String,
    pub position: Option<Position>,
    pub birth_date: Option<NaiveDate>,
    pub shirt_number: Option<i32>,
    pub market_value: Option<String>,
    pub profile_picture: Option<String>,
    pub profile_fetched: bool,
}

#[derive(Debug, Clone)]
pub struct MatchUpsert {
    pub external_id: i64,
    pub league_id: i64,
    pub team1_id: i64,
    pub team2_id: i64,
    pub score1: Option<i32>,
    pub score2: Option<i32>,
    pub date_time: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineupSlot {
    pub player_id: i64,
    pub shirt_number: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct NewLineup {
    pub side: Side,
    pub formation: Formation,
    pub captain_id: Option<i64>,
    pub starters: Vec<LineupSlot>,
    pub bench: Vec<LineupSlot>,
}

#[derive(Debug, Clone)]
pub struct NewSubstitution {
    pub side: Side,
    pub player_in_id: Option<i64>,
    pub player_out_id: i64,
    pub minute: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct NewCard {
    pub side: Side,
    pub player_id: i64,
    pub minute: Option<i32>,
    pub card_type: CardType,
}

#[derive(Debug, Clone)]
pub struct NewMissedPenalty {
    pub side: Side,
    pub taker_id: Option<i64>,
    pub saved_by_id: Option<i64>,
    pub conceded_by_id: Option<i64>,
    pub minute: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct NewGoal {
    pub side: Side,
    pub scorer_id: Option<i64>,
    pub assist_id: Option<i64>,
    pub minute: Option<i32>,
    pub score1: Option<i32>,
    pub score2: Option<i32>,
    pub own_goal: bool,
    pub penalty: bool,
}

/// Everything read from one match detail page, with players already resolved.
#[derive(Debug, Clone, Default)]
pub struct MatchDetails {
    pub stadium_id: Option<i64>,
    pub lineups: Vec<NewLineup>,
    pub substitutions: Vec<NewSubstitution>,
    pub cards: Vec<NewCard>,
    pub missed_penalties: Vec<NewMissedPenalty>,
    pub goals: Vec<NewGoal>,
}

// ── Read-side aggregates ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LineupAggregate {
    pub lineup: Lineup,
    pub starters: Vec<i64>,
    pub bench: Vec<i64>,
    pub substitutions: Vec<Substitution>,
}

/// A match with all of its event rows, assembled by id lookups.
#[derive(Debug, Clone)]
pub struct MatchAggregate {
    pub header: Match,
    pub lineups: Vec<LineupAggregate>,
    pub goals: Vec<Goal>,
    pub cards: Vec<Card>,
    pub missed_penalties: Vec<MissedPenalty>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamDetail {
    #[serde(flatten)]
    pub team: Team,
    pub leagues: Vec<League>,
    pub players: Vec<Player>,
}
