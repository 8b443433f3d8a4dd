// Error taxonomy for session and phase-engine operations.
//
// Every variant is a local validation failure: the caller turns it into a
// rejection for the originating request and nothing else is affected. Display
// texts are what clients see in `error` envelopes.

/// Failure of a session, directory, or phase-engine operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("game is full")]
    GameFull,
    #[error("game not found")]
    GameNotFound,
    #[error("player not found")]
    PlayerNotFound,
    #[error("invalid game phase")]
    InvalidPhase,
    #[error("not enough players to start game")]
    NotEnoughPlayers,
    #[error("game has already started")]
    AlreadyStarted,
    #[error("player is not alive")]
    PlayerNotAlive,
    #[error("invalid vote")]
    InvalidVote,
    #[error("player name already taken")]
    NameTaken,
    #[error("player already exists")]
    PlayerAlreadyExists,
    #[error("player is not mafia")]
    NotMafia,
}

pub type GameResult<T> = Result<T, GameError>;
