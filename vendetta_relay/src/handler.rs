// Inbound request dispatch.
//
// `Dispatcher` turns decoded envelopes from one connection into directory and
// session calls, then tells the hub what to send. It is shared by every
// reader thread (`Clone`, all state behind `Arc`). Per-connection state
// (which game the connection is attached to, which roster entry it speaks
// for) lives in a `Connection` owned by that connection's reader thread.
//
// Attachment: `createGame` and `joinGame` attach the connection to the game
// they create or join. Any other envelope attaches an unattached connection
// to the session named by its `gameId`, if that session exists, and pushes
// the current `gameState` and `playerCount` to it first. Once attached, the
// envelope's `gameId` is ignored.
//
// Session calls return before anything is handed to the hub, so no session
// lock is ever held across delivery. Game-rule failures go back to the
// originating connection as an `error` envelope. Malformed envelopes are
// logged and dropped; the connection stays open.

use std::sync::Arc;

use tracing::{debug, info, warn};
use vendetta_game::{GameDirectory, GameError, GameResult, Session};
use vendetta_protocol::{ClientRequest, ConnectionId, Envelope, GameId, PlayerId};

use crate::hub::HubHandle;

/// What the server knows about one live connection.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    game: Option<GameId>,
    player: Option<PlayerId>,
}

impl Connection {
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            game: None,
            player: None,
        }
    }

    pub fn game(&self) -> Option<&GameId> {
        self.game.as_ref()
    }

    pub fn player(&self) -> Option<&PlayerId> {
        self.player.as_ref()
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    games: Arc<GameDirectory>,
    hub: HubHandle,
}

impl Dispatcher {
    pub fn new(games: Arc<GameDirectory>, hub: HubHandle) -> Self {
        Self { games, hub }
    }

    pub fn games(&self) -> &Arc<GameDirectory> {
        &self.games
    }

    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    /// Decode one raw frame and dispatch it.
    pub fn handle_frame(&self, conn: &mut Connection, frame: &[u8]) {
        match serde_json::from_slice::<Envelope>(frame) {
            Ok(envelope) => self.handle_envelope(conn, envelope),
            Err(e) => warn!(conn = %conn.id, error = %e, "dropping unparseable envelope"),
        }
    }

    pub fn handle_envelope(&self, conn: &mut Connection, envelope: Envelope) {
        let request = match ClientRequest::parse(&envelope) {
            Ok(request) => request,
            Err(e) => {
                warn!(conn = %conn.id, error = %e, "dropping malformed request");
                return;
            }
        };
        debug!(conn = %conn.id, kind = %envelope.kind, game = %envelope.game_id, "request");

        let result = match request {
            ClientRequest::CreateGame { player_name } => self.create_game(conn, &player_name),
            ClientRequest::JoinGame { player_name } => {
                let game = match conn.game.clone() {
                    Some(attached) if envelope.game_id.is_empty() => attached,
                    _ => envelope.game_id.clone(),
                };
                self.join_game(conn, &game, &player_name)
            }
            other => {
                self.attach_if_unattached(conn, &envelope.game_id);
                match conn.game.clone() {
                    Some(game) => self.in_session(conn, &game, other, &envelope),
                    None => Err(GameError::GameNotFound),
                }
            }
        };

        if let Err(err) = result {
            debug!(conn = %conn.id, error = %err, "request rejected");
            let game = conn.game.clone().unwrap_or(envelope.game_id);
            self.hub.direct(conn.id, Envelope::error(game, err.to_string()));
        }
    }

    /// Connection closed: drop its hub handle and tell the session.
    pub fn disconnect(&self, conn: &Connection) {
        self.hub.deregister(conn.id);
        if let Some(game) = &conn.game {
            if let Ok(session) = self.games.get(game) {
                let count = session.player_count();
                self.hub
                    .broadcast(game.clone(), Envelope::player_count(game.clone(), count));
            }
        }
        info!(conn = %conn.id, "connection closed");
    }

    fn create_game(&self, conn: &mut Connection, player_name: &str) -> GameResult<()> {
        let session = self.games.create();
        let player = session.add_player(player_name)?;
        let game = session.id().clone();
        let count = session.player_count();

        self.bind(conn, &game, &player);
        self.hub
            .broadcast(game.clone(), Envelope::player_count(game.clone(), count));
        // The reply goes last so a client that has seen it has also seen
        // every broadcast caused by its request.
        self.hub.direct(conn.id, Envelope::game_created(game, player));
        Ok(())
    }

    fn join_game(&self, conn: &mut Connection, game: &GameId, player_name: &str) -> GameResult<()> {
        let session = self.games.get(game)?;
        let player = session.add_player(player_name)?;
        let snapshot = session.snapshot();

        self.bind(conn, game, &player);
        self.hub
            .broadcast(game.clone(), Envelope::game_state(game.clone(), snapshot.to_json()));
        self.hub.broadcast(
            game.clone(),
            Envelope::player_count(game.clone(), snapshot.players.len()),
        );
        self.hub.direct(conn.id, Envelope::joined(game.clone(), player));
        Ok(())
    }

    fn attach_if_unattached(&self, conn: &mut Connection, game: &GameId) {
        if conn.game.is_some() || game.is_empty() {
            return;
        }
        let Ok(session) = self.games.get(game) else {
            return;
        };
        let snapshot = session.snapshot();

        conn.game = Some(game.clone());
        self.hub.attach_game(conn.id, game.clone());
        self.hub
            .direct(conn.id, Envelope::game_state(game.clone(), snapshot.to_json()));
        self.hub.direct(
            conn.id,
            Envelope::player_count(game.clone(), snapshot.players.len()),
        );
        debug!(conn = %conn.id, game = %game, "connection attached");
    }

    fn bind(&self, conn: &mut Connection, game: &GameId, player: &PlayerId) {
        if conn.game.as_ref() != Some(game) {
            conn.game = Some(game.clone());
            self.hub.attach_game(conn.id, game.clone());
        }
        conn.player = Some(player.clone());
        self.hub.attach_player(conn.id, player.clone());
    }

    /// Requests that act on the attached session.
    fn in_session(
        &self,
        conn: &mut Connection,
        game: &GameId,
        request: ClientRequest,
        envelope: &Envelope,
    ) -> GameResult<()> {
        let session = self.games.get(game)?;
        match request {
            ClientRequest::StartGame => {
                session.start_game()?;
                self.broadcast_state(&session);
            }
            ClientRequest::NextPhase => {
                session.advance_phase()?;
                self.broadcast_state(&session);
            }
            ClientRequest::Join { player_name } => {
                let player = session
                    .player_id_by_name(&player_name)
                    .ok_or(GameError::PlayerNotFound)?;
                info!(conn = %conn.id, game = %game, player = %player, "connection bound to player");
                self.bind(conn, game, &player);
            }
            ClientRequest::MafiaAction { target } => {
                let actor = conn.player.clone().unwrap_or_default();
                session.record_mafia_action(&actor, &target)?;
                self.hub.send_to_players(
                    game.clone(),
                    session.mafia_ids(),
                    Envelope::mafia_vote(game.clone(), actor, target),
                );
                if let Some(change) = session.advance_on_mafia_consensus()? {
                    info!(game = %game, to = %change.to, "mafia consensus reached, night ended early");
                    self.broadcast_state(&session);
                }
            }
            ClientRequest::Vote { target } => {
                let voter = conn.player.clone().unwrap_or_default();
                session.handle_vote(&voter, &target)?;
            }
            ClientRequest::Chat { .. } => {
                // Forwarded as received, addressed to the attached session.
                let mut chat = envelope.clone();
                chat.game_id = game.clone();
                self.hub.broadcast(game.clone(), chat);
            }
            ClientRequest::CreateGame { .. } | ClientRequest::JoinGame { .. } => {
                // Routed before attachment.
            }
        }
        Ok(())
    }

    fn broadcast_state(&self, session: &Session) {
        let game = session.id().clone();
        let state = Envelope::game_state(game.clone(), session.snapshot().to_json());
        self.hub.broadcast(game, state);
    }
}
