use anyhow::Result;
use rusqlite::{Connection, Transaction};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

mod leagues;
mod matches;
pub mod models;
mod players;
mod points;
mod teams;

pub use matches::MatchResultRow;

/// Thread-safe SQLite handle (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::from_connection(conn)
    }

    /// Private in-memory database, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock leaves SQLite itself consistent.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` inside one transaction: committed if `f` returns `Ok`, rolled
    /// back otherwise.
    pub fn transaction<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Row count of a table, for reporting and idempotence checks
    pub fn count_rows(&self, table: &str) -> Result<i64> {
        if !TABLES.contains(&table) {
            anyhow::bail!("unknown table '{}'", table);
        }
        let conn = self.conn();
        let n = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?;
        Ok(n)
    }
}

/// True when `err` is a UNIQUE/PRIMARY KEY constraint violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == rusqlite::ErrorCode::ConstraintViolation
                && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}

const TABLES: &[&str] = &[
    "leagues",
    "league_groups",
    "rounds",
    "round_matches",
    "teams",
    "team_leagues",
    "players",
    "player_teams",
    "stadiums",
    "matches",
    "lineups",
    "lineup_players",
    "substitutions",
    "goals",
    "cards",
    "missed_penalties",
    "player_points",
];

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS leagues (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    name    TEXT    NOT NULL,
    season  TEXT,
    kind    TEXT    NOT NULL DEFAULT 'regular',
    layout  TEXT    NOT NULL DEFAULT 'single'
);

CREATE TABLE IF NOT EXISTS league_groups (
    parent_id INTEGER NOT NULL REFERENCES leagues(id) ON DELETE CASCADE,
    group_id  INTEGER NOT NULL REFERENCES leagues(id) ON DELETE CASCADE,
    PRIMARY KEY (parent_id, group_id)
);

CREATE TABLE IF NOT EXISTS rounds (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    league_id  INTEGER NOT NULL REFERENCES leagues(id) ON DELETE CASCADE,
    name       TEXT    NOT NULL,
    start_date TEXT,
    end_date   TEXT,
    UNIQUE (league_id, name)
);

CREATE TABLE IF NOT EXISTS teams (
    id    INTEGER PRIMARY KEY AUTOINCREMENT,
    name  TEXT    NOT NULL,
    code  TEXT    NOT NULL UNIQUE,
    crest TEXT
);

CREATE TABLE IF NOT EXISTS team_leagues (
    team_id   INTEGER NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
    league_id INTEGER NOT NULL REFERENCES leagues(id) ON DELETE CASCADE,
    PRIMARY KEY (team_id, league_id)
);

CREATE TABLE IF NOT EXISTS players (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id     INTEGER UNIQUE,
    first_name      TEXT,
    last_name       TEXT    NOT NULL,
    position        TEXT    NOT NULL DEFAULT 'unknown',
    birth_date      TEXT,
    shirt_number    INTEGER,
    market_value    TEXT,
    profile_picture TEXT,
    profile_fetched INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS player_teams (
    player_id INTEGER NOT NULL REFERENCES players(id) ON DELETE CASCADE,
    team_id   INTEGER NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
    PRIMARY KEY (player_id, team_id)
);

CREATE TABLE IF NOT EXISTS stadiums (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    key  TEXT    NOT NULL UNIQUE,
    name TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS matches (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id     INTEGER NOT NULL UNIQUE,
    league_id       INTEGER NOT NULL REFERENCES leagues(id),
    team1_id        INTEGER NOT NULL REFERENCES teams(id),
    team2_id        INTEGER NOT NULL REFERENCES teams(id),
    score1          INTEGER,
    score2          INTEGER,
    date_time       TEXT,
    stadium_id      INTEGER REFERENCES stadiums(id),
    lineup1_id      INTEGER REFERENCES lineups(id) ON DELETE SET NULL,
    lineup2_id      INTEGER REFERENCES lineups(id) ON DELETE SET NULL,
    review_required INTEGER NOT NULL DEFAULT 0,
    points_processed INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS round_matches (
    round_id        INTEGER NOT NULL REFERENCES rounds(id) ON DELETE CASCADE,
    match_id        INTEGER NOT NULL REFERENCES matches(id) ON DELETE CASCADE,
    scope_league_id INTEGER NOT NULL REFERENCES leagues(id) ON DELETE CASCADE,
    PRIMARY KEY (round_id, match_id),
    UNIQUE (match_id, scope_league_id)
);

CREATE TABLE IF NOT EXISTS lineups (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    match_id   INTEGER NOT NULL REFERENCES matches(id) ON DELETE CASCADE,
    side       TEXT    NOT NULL,
    formation  TEXT    NOT NULL DEFAULT 'unknown',
    captain_id INTEGER REFERENCES players(id),
    UNIQUE (match_id, side)
);

CREATE TABLE IF NOT EXISTS lineup_players (
    lineup_id    INTEGER NOT NULL REFERENCES lineups(id) ON DELETE CASCADE,
    player_id    INTEGER NOT NULL REFERENCES players(id),
    role         TEXT    NOT NULL,
    shirt_number INTEGER,
    PRIMARY KEY (lineup_id, player_id)
);

CREATE TABLE IF NOT EXISTS substitutions (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    lineup_id     INTEGER NOT NULL REFERENCES lineups(id) ON DELETE CASCADE,
    player_in_id  INTEGER REFERENCES players(id),
    player_out_id INTEGER NOT NULL REFERENCES players(id),
    minute        INTEGER
);

CREATE TABLE IF NOT EXISTS goals (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    match_id  INTEGER NOT NULL REFERENCES matches(id) ON DELETE CASCADE,
    side      TEXT    NOT NULL,
    scorer_id INTEGER REFERENCES players(id),
    assist_id INTEGER REFERENCES players(id),
    minute    INTEGER,
    score1    INTEGER,
    score2    INTEGER,
    own_goal  INTEGER NOT NULL DEFAULT 0,
    penalty   INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS cards (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    match_id  INTEGER NOT NULL REFERENCES matches(id) ON DELETE CASCADE,
    side      TEXT    NOT NULL,
    player_id INTEGER NOT NULL REFERENCES players(id),
    minute    INTEGER,
    card_type TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS missed_penalties (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    match_id       INTEGER NOT NULL REFERENCES matches(id) ON DELETE CASCADE,
    side           TEXT    NOT NULL,
    taker_id       INTEGER REFERENCES players(id),
    saved_by_id    INTEGER REFERENCES players(id),
    conceded_by_id INTEGER REFERENCES players(id),
    minute         INTEGER
);

CREATE TABLE IF NOT EXISTS player_points (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    match_id  INTEGER NOT NULL REFERENCES matches(id) ON DELETE CASCADE,
    player_id INTEGER NOT NULL REFERENCES players(id),
    points    REAL    NOT NULL,
    UNIQUE (match_id, player_id)
);

CREATE INDEX IF NOT EXISTS idx_matches_team1 ON matches(team1_id);
CREATE INDEX IF NOT EXISTS idx_matches_team2 ON matches(team2_id);
CREATE INDEX IF NOT EXISTS idx_round_matches_scope ON round_matches(scope_league_id);
CREATE INDEX IF NOT EXISTS idx_goals_match ON goals(match_id);
CREATE INDEX IF NOT EXISTS idx_cards_match ON cards(match_id);
CREATE INDEX IF NOT EXISTS idx_player_points_match ON player_points(match_id);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().unwrap();
        assert_eq!(db.count_rows("matches").unwrap(), 0);
    }

    #[test]
    fn test_count_rows_rejects_unknown_table() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.count_rows("sqlite_master; DROP TABLE teams").is_err());
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let res: Result<()> = db.transaction(|tx| {
            tx.execute(
                "INSERT INTO teams (name, code) VALUES ('Arsenal', 'ARS')",
                [],
            )?;
            anyhow::bail!("abort");
        });
        assert!(res.is_err());
        assert_eq!(db.count_rows("teams").unwrap(), 0);
    }
}
