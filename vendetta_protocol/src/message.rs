// Protocol messages exchanged between game clients and the relay.
//
// Every frame carries one `Envelope`: `{type, gameId, playerId, data}`. The
// `type` string selects how `data` is read. Inbound envelopes are decoded
// into a typed `ClientRequest` by `ClientRequest::parse`; outbound envelopes
// are built through the constructor helpers on `Envelope` so the server never
// spells a message type by hand.
//
// Inbound vocabulary:
// - `createGame` / `joinGame` / `startGame` / `nextPhase`: lobby control.
// - `join`: bind this connection to an existing roster entry by name.
// - `mafiaAction` / `vote`: target player id as a bare JSON string.
// - `chat`: opaque payload, echoed verbatim to the whole session.
//
// Outbound vocabulary: `gameState`, `playerCount`, `mafiaVote`, `error`,
// `gameCreated`, `joined`.
//
// `data` stays a `serde_json::Value` on the envelope itself because `chat`
// payloads are opaque and `gameState` carries a snapshot type this crate does
// not know about.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::types::{GameId, PlayerId};

/// Message `type` strings.
pub mod kind {
    pub const CREATE_GAME: &str = "createGame";
    pub const JOIN_GAME: &str = "joinGame";
    pub const START_GAME: &str = "startGame";
    pub const NEXT_PHASE: &str = "nextPhase";
    pub const JOIN: &str = "join";
    pub const MAFIA_ACTION: &str = "mafiaAction";
    pub const VOTE: &str = "vote";
    pub const CHAT: &str = "chat";

    pub const GAME_STATE: &str = "gameState";
    pub const PLAYER_COUNT: &str = "playerCount";
    pub const MAFIA_VOTE: &str = "mafiaVote";
    pub const ERROR: &str = "error";
    pub const GAME_CREATED: &str = "gameCreated";
    pub const JOINED: &str = "joined";
}

/// The single frame shape used in both directions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub game_id: GameId,
    #[serde(default)]
    pub player_id: PlayerId,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(kind: &str, game_id: GameId, data: Value) -> Self {
        Self {
            kind: kind.to_owned(),
            game_id,
            player_id: PlayerId::default(),
            data,
        }
    }

    /// Set the `playerId` field.
    pub fn with_player(mut self, player_id: PlayerId) -> Self {
        self.player_id = player_id;
        self
    }

    /// Full session snapshot. `snapshot` is already JSON so this crate stays
    /// independent of the game crate.
    pub fn game_state(game_id: GameId, snapshot: Value) -> Self {
        Self::new(kind::GAME_STATE, game_id, snapshot)
    }

    pub fn player_count(game_id: GameId, count: usize) -> Self {
        Self::new(kind::PLAYER_COUNT, game_id, Value::from(count))
    }

    pub fn mafia_vote(game_id: GameId, voter: PlayerId, target: PlayerId) -> Self {
        let data = MafiaVoteData { voter, target };
        Self::new(kind::MAFIA_VOTE, game_id, to_value(&data))
    }

    pub fn error(game_id: GameId, message: impl Into<String>) -> Self {
        Self::new(kind::ERROR, game_id, Value::String(message.into()))
    }

    pub fn game_created(game_id: GameId, player_id: PlayerId) -> Self {
        let data = SeatData {
            game_id: game_id.clone(),
            player_id,
        };
        Self::new(kind::GAME_CREATED, game_id, to_value(&data))
    }

    pub fn joined(game_id: GameId, player_id: PlayerId) -> Self {
        let data = SeatData {
            game_id: game_id.clone(),
            player_id,
        };
        Self::new(kind::JOINED, game_id, to_value(&data))
    }

    /// Client-side constructor for any inbound request.
    pub fn request(request: &ClientRequest, game_id: GameId, player_id: PlayerId) -> Self {
        let (name, data) = match request {
            ClientRequest::CreateGame { player_name } => (
                kind::CREATE_GAME,
                to_value(&PlayerNameData {
                    player_name: player_name.clone(),
                }),
            ),
            ClientRequest::JoinGame { player_name } => (
                kind::JOIN_GAME,
                to_value(&PlayerNameData {
                    player_name: player_name.clone(),
                }),
            ),
            ClientRequest::Join { player_name } => (
                kind::JOIN,
                to_value(&PlayerNameData {
                    player_name: player_name.clone(),
                }),
            ),
            ClientRequest::StartGame => (kind::START_GAME, Value::Null),
            ClientRequest::NextPhase => (kind::NEXT_PHASE, Value::Null),
            ClientRequest::MafiaAction { target } => {
                (kind::MAFIA_ACTION, Value::String(target.0.clone()))
            }
            ClientRequest::Vote { target } => (kind::VOTE, Value::String(target.0.clone())),
            ClientRequest::Chat { payload } => (kind::CHAT, payload.clone()),
        };
        Self::new(name, game_id, data).with_player(player_id)
    }

    /// Decode `data` into a typed payload.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, MessageError> {
        serde_json::from_value(self.data.clone()).map_err(|e| MessageError::BadData {
            kind: self.kind.clone(),
            reason: e.to_string(),
        })
    }
}

/// `data` of `createGame`, `joinGame`, and `join`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerNameData {
    pub player_name: String,
}

/// `data` of `mafiaVote`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MafiaVoteData {
    pub voter: PlayerId,
    pub target: PlayerId,
}

/// `data` of `gameCreated` and `joined`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatData {
    pub game_id: GameId,
    pub player_id: PlayerId,
}

/// A decoded inbound request.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientRequest {
    /// Create a session and take the host seat.
    CreateGame { player_name: String },
    /// Take a seat in an existing session.
    JoinGame { player_name: String },
    /// Host (or anyone, there is no host-only gate) starts the game.
    StartGame,
    /// Advance to the next phase.
    NextPhase,
    /// Bind the connection to an existing roster entry.
    Join { player_name: String },
    /// Mafia night kill target.
    MafiaAction { target: PlayerId },
    /// Day elimination vote.
    Vote { target: PlayerId },
    /// Opaque chat payload.
    Chat { payload: Value },
}

impl ClientRequest {
    pub fn parse(envelope: &Envelope) -> Result<Self, MessageError> {
        let request = match envelope.kind.as_str() {
            kind::CREATE_GAME => Self::CreateGame {
                player_name: envelope.data_as::<PlayerNameData>()?.player_name,
            },
            kind::JOIN_GAME => Self::JoinGame {
                player_name: envelope.data_as::<PlayerNameData>()?.player_name,
            },
            kind::JOIN => Self::Join {
                player_name: envelope.data_as::<PlayerNameData>()?.player_name,
            },
            kind::START_GAME => Self::StartGame,
            kind::NEXT_PHASE => Self::NextPhase,
            kind::MAFIA_ACTION => Self::MafiaAction {
                target: envelope.data_as::<PlayerId>()?,
            },
            kind::VOTE => Self::Vote {
                target: envelope.data_as::<PlayerId>()?,
            },
            kind::CHAT => Self::Chat {
                payload: envelope.data.clone(),
            },
            other => return Err(MessageError::UnknownType(other.to_owned())),
        };
        Ok(request)
    }
}

/// Why an inbound envelope could not be decoded.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MessageError {
    #[error("unknown message type {0:?}")]
    UnknownType(String),
    #[error("malformed {kind} payload: {reason}")]
    BadData { kind: String, reason: String },
}

fn to_value<T: Serialize>(data: &T) -> Value {
    match serde_json::to_value(data) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "payload failed to serialize, sending null");
            Value::Null
        }
    }
}
