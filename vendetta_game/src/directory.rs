// Registry of live sessions, keyed by game id.
//
// `GameDirectory` is an explicit object handed to request handlers by
// reference (`Arc<GameDirectory>`); there is no global registry. Its lock
// protects only the id -> session map. Every facade method clones the
// session's `Arc` and drops the directory lock before touching the session,
// so the directory lock is never held together with a session lock and never
// across message delivery.
//
// The facade methods mirror the request-layer API: create a session, add a
// player, start, advance, record night and day votes, and fetch a snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;
use vendetta_protocol::{GameId, PlayerId};

use crate::config::GameConfig;
use crate::error::{GameError, GameResult};
use crate::session::{PhaseChange, Session, SessionSnapshot};

pub struct GameDirectory {
    config: GameConfig,
    sessions: RwLock<HashMap<GameId, Arc<Session>>>,
}

impl GameDirectory {
    /// Sessions created through this directory copy `config`.
    pub fn new(config: GameConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Create an empty session under a fresh id.
    pub fn create(&self) -> Arc<Session> {
        let id = GameId::random();
        let session = Arc::new(Session::new(id.clone(), self.config.clone()));
        self.sessions.write().insert(id.clone(), Arc::clone(&session));
        info!(game = %id, "session created");
        session
    }

    pub fn get(&self, id: &GameId) -> GameResult<Arc<Session>> {
        self.sessions
            .read()
            .get(id)
            .cloned()
            .ok_or(GameError::GameNotFound)
    }

    pub fn remove(&self, id: &GameId) -> Option<Arc<Session>> {
        let removed = self.sessions.write().remove(id);
        if removed.is_some() {
            info!(game = %id, "session removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Handles to every live session, taken in one read of the map.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.read().values().cloned().collect()
    }

    pub fn create_session(&self) -> GameId {
        self.create().id().clone()
    }

    pub fn add_player(&self, game: &GameId, name: &str) -> GameResult<PlayerId> {
        self.get(game)?.add_player(name)
    }

    pub fn start_game(&self, game: &GameId) -> GameResult<()> {
        self.get(game)?.start_game()
    }

    pub fn advance_phase(&self, game: &GameId) -> GameResult<PhaseChange> {
        self.get(game)?.advance_phase()
    }

    pub fn record_mafia_action(
        &self,
        game: &GameId,
        actor: &PlayerId,
        target: &PlayerId,
    ) -> GameResult<()> {
        self.get(game)?.record_mafia_action(actor, target)
    }

    pub fn handle_vote(&self, game: &GameId, voter: &PlayerId, target: &PlayerId) -> GameResult<()> {
        self.get(game)?.handle_vote(voter, target)
    }

    pub fn get_session(&self, game: &GameId) -> GameResult<SessionSnapshot> {
        Ok(self.get(game)?.snapshot())
    }
}

impl Default for GameDirectory {
    fn default() -> Self {
        Self::new(GameConfig::default())
    }
}
