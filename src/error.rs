use thiserror::Error;

/// Client-visible domain failures. Everything else travels as `anyhow::Error`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("invalid league id: {0}")]
    InvalidLeagueId(i64),

    #[error("invalid team id: {0}")]
    InvalidTeamId(i64),

    #[error("invalid player id: {0}")]
    InvalidPlayerId(i64),

    #[error("team with code '{0}' already exists")]
    DuplicateTeamCode(String),

    #[error("player {player_id} is already attached to team {team_id}")]
    PlayerAlreadyAttached { player_id: i64, team_id: i64 },
}

impl ServiceError {
    /// Find a domain error anywhere in an anyhow chain.
    pub fn find(err: &anyhow::Error) -> Option<&ServiceError> {
        err.chain().find_map(|cause| cause.downcast_ref::<ServiceError>())
    }
}
