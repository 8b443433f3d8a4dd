// vendetta_protocol — wire protocol for Silent Vendetta game sessions.
//
// Defines the message envelope, typed inbound requests, and framing shared
// by the relay server (`vendetta_relay`) and its clients. Has no dependency
// on the game rules crate; game snapshots cross this boundary as plain JSON.
//
// Module overview:
// - `types.rs`:    `GameId`, `PlayerId`, `ConnectionId`.
// - `message.rs`:  `Envelope` (`{type, gameId, playerId, data}`), the
//                  `ClientRequest` decoder, and outbound constructors.
// - `framing.rs`:  4-byte big-endian length prefix + JSON payload over any
//                  `Read`/`Write` stream.

pub mod framing;
pub mod message;
pub mod types;

pub use framing::{MAX_MESSAGE_SIZE, read_message, write_message};
pub use message::{ClientRequest, Envelope, MessageError, kind};
pub use types::{ConnectionId, GameId, PlayerId};

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn envelope_survives_framing() {
        let env = Envelope::error(GameId::from("g"), "game is full");
        let json = serde_json::to_vec(&env).unwrap();
        let mut wire = Vec::new();
        write_message(&mut wire, &json).unwrap();

        let bytes = read_message(&mut Cursor::new(&wire)).unwrap();
        let back: Envelope = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, env);
    }
}
