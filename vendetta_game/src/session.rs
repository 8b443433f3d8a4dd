// Session state for one game, guarded by its own lock.
//
// `Session` owns the roster, phase, round counter, and phase deadline of a
// single game. The mutable part lives in `SessionState` behind a
// `parking_lot::RwLock`: every mutation holds the write lock for the whole
// operation (one full phase transition, one vote), and snapshots take the
// read lock. Nothing in here performs I/O, so no lock is ever held across a
// network send. Callers notify clients after these methods return.
//
// Phase transitions (see `advance_phase`):
//   Night   --resolve night kill-->            Discuss
//   Discuss --(timer only)-->                  Vote
//   Vote    --resolve vote, check winner-->    Night (round + 1) | GameOver
//   Waiting / GameOver                         -> InvalidPhase
//
// Role assignment is a one-shot operation inside `start_game`; the phase
// engine (`engine.rs`) supplies the algorithms.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vendetta_protocol::{GameId, PlayerId};

use crate::config::GameConfig;
use crate::engine::{self, Outcome};
use crate::error::{GameError, GameResult};
use crate::player::{Phase, Player, Role, Roster};

/// A single game instance.
pub struct Session {
    id: GameId,
    config: GameConfig,
    state: RwLock<SessionState>,
}

#[derive(Default)]
struct SessionState {
    players: Roster,
    phase: Phase,
    round: u32,
    phase_end_time: Option<DateTime<Utc>>,
    winner: Option<Role>,
}

/// Serializable copy of a session, sent to clients as `gameState`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: GameId,
    pub players: Roster,
    pub phase: Phase,
    pub round: u32,
    pub phase_end_time: Option<DateTime<Utc>>,
    pub min_players: usize,
    pub max_players: usize,
    pub mafia_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Role>,
}

impl SessionSnapshot {
    pub fn to_json(&self) -> serde_json::Value {
        match serde_json::to_value(self) {
            Ok(value) => value,
            Err(e) => {
                warn!(game = %self.id, error = %e, "snapshot failed to serialize, sending null");
                serde_json::Value::Null
            }
        }
    }

    pub fn living(&self) -> impl Iterator<Item = &Player> {
        self.players.values().filter(|p| p.is_alive)
    }
}

/// What one `advance_phase` call did.
#[derive(Clone, Debug, PartialEq)]
pub struct PhaseChange {
    pub from: Phase,
    pub to: Phase,
    pub round: u32,
    /// Player killed at night or voted out during the day, if any.
    pub eliminated: Option<PlayerId>,
    pub outcome: Outcome,
}

impl Session {
    pub fn new(id: GameId, config: GameConfig) -> Self {
        Self {
            id,
            config,
            state: RwLock::new(SessionState::default()),
        }
    }

    pub fn id(&self) -> &GameId {
        &self.id
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Add a player under a freshly generated id.
    pub fn add_player(&self, name: &str) -> GameResult<PlayerId> {
        self.add_player_with_id(name, PlayerId::random())
    }

    /// Add a player under a caller-chosen id. The first player ever added
    /// becomes host. Names must be unique across the current roster, dead
    /// players included.
    pub fn add_player_with_id(&self, name: &str, id: PlayerId) -> GameResult<PlayerId> {
        let mut state = self.state.write();
        if state.players.len() >= self.config.max_players {
            return Err(GameError::GameFull);
        }
        if state.players.contains_key(&id) {
            return Err(GameError::PlayerAlreadyExists);
        }
        if state.players.values().any(|p| p.name == name) {
            return Err(GameError::NameTaken);
        }

        let is_host = state.players.is_empty();
        state
            .players
            .insert(id.clone(), Player::new(id.clone(), name, is_host));
        info!(game = %self.id, player = %id, name, is_host, "player added");
        Ok(id)
    }

    /// Remove a player unconditionally. Host status is not handed on.
    pub fn remove_player(&self, id: &PlayerId) -> bool {
        let removed = self.state.write().players.remove(id).is_some();
        if removed {
            info!(game = %self.id, player = %id, "player removed");
        }
        removed
    }

    pub fn is_ready(&self) -> bool {
        self.state.read().players.len() >= self.config.min_players
    }

    pub fn player_count(&self) -> usize {
        self.state.read().players.len()
    }

    pub fn phase(&self) -> Phase {
        self.state.read().phase
    }

    pub fn round(&self) -> u32 {
        self.state.read().round
    }

    pub fn player(&self, id: &PlayerId) -> Option<Player> {
        self.state.read().players.get(id).cloned()
    }

    pub fn player_id_by_name(&self, name: &str) -> Option<PlayerId> {
        self.state
            .read()
            .players
            .values()
            .find(|p| p.name == name)
            .map(|p| p.id.clone())
    }

    /// Copy of every living player.
    pub fn living_players(&self) -> Vec<Player> {
        self.state
            .read()
            .players
            .values()
            .filter(|p| p.is_alive)
            .cloned()
            .collect()
    }

    /// Ids of every Mafia player, living or dead.
    pub fn mafia_ids(&self) -> Vec<PlayerId> {
        self.state
            .read()
            .players
            .values()
            .filter(|p| p.is_mafia())
            .map(|p| p.id.clone())
            .collect()
    }

    /// Evaluate the win condition without changing anything.
    pub fn check_win_condition(&self) -> Outcome {
        engine::win_condition(&self.state.read().players)
    }

    /// True once the current phase has a deadline and `now` is past it.
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.state
            .read()
            .phase_end_time
            .is_some_and(|deadline| now >= deadline)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.read();
        SessionSnapshot {
            id: self.id.clone(),
            players: state.players.clone(),
            phase: state.phase,
            round: state.round,
            phase_end_time: state.phase_end_time,
            min_players: self.config.min_players,
            max_players: self.config.max_players,
            mafia_count: self.config.mafia_count,
            winner: state.winner,
        }
    }

    /// Deal roles and begin the first night, shuffling with a freshly seeded
    /// generator.
    pub fn start_game(&self) -> GameResult<()> {
        let mut rng = StdRng::from_os_rng();
        self.start_game_with_rng(&mut rng)
    }

    pub fn start_game_with_rng<R: Rng + ?Sized>(&self, rng: &mut R) -> GameResult<()> {
        let mut state = self.state.write();
        if state.phase != Phase::Waiting {
            return Err(GameError::AlreadyStarted);
        }
        if state.players.len() < self.config.min_players {
            return Err(GameError::NotEnoughPlayers);
        }

        let deal = engine::assign_roles(&mut state.players, self.config.mafia_count, rng);
        for (id, role) in &deal {
            debug!(game = %self.id, player = %id, %role, "role assigned");
        }
        state.phase = Phase::Night;
        state.round = 1;
        state.phase_end_time = self.deadline(Phase::Night);
        info!(game = %self.id, players = deal.len(), "game started");
        Ok(())
    }

    /// Run one transition of the phase state machine.
    pub fn advance_phase(&self) -> GameResult<PhaseChange> {
        let mut state = self.state.write();
        self.advance_locked(&mut state)
    }

    /// End the night early once enough living Mafia have chosen a target.
    /// The check and the transition happen under one write lock, so two
    /// Mafia voting at the same moment cannot advance the game twice.
    pub fn advance_on_mafia_consensus(&self) -> GameResult<Option<PhaseChange>> {
        let mut state = self.state.write();
        if state.phase != Phase::Night || !engine::mafia_consensus(&state.players) {
            return Ok(None);
        }
        self.advance_locked(&mut state).map(Some)
    }

    /// Advance only if the current phase's deadline has passed at `now`.
    pub fn advance_if_past_deadline(&self, now: DateTime<Utc>) -> GameResult<Option<PhaseChange>> {
        let mut state = self.state.write();
        if !state.phase_end_time.is_some_and(|deadline| now >= deadline) {
            return Ok(None);
        }
        self.advance_locked(&mut state).map(Some)
    }

    fn advance_locked(&self, state: &mut SessionState) -> GameResult<PhaseChange> {
        let from = state.phase;
        let mut eliminated = None;
        let mut outcome = Outcome::Ongoing;

        let to = match from {
            Phase::Night => {
                eliminated = engine::resolve_night(&mut state.players);
                if let Some(victim) = &eliminated {
                    info!(game = %self.id, player = %victim, "mafia killed player");
                }
                Phase::Discuss
            }
            Phase::Discuss => Phase::Vote,
            Phase::Vote => {
                eliminated = engine::resolve_vote(&mut state.players);
                if let Some(out) = &eliminated {
                    info!(game = %self.id, player = %out, "player eliminated by vote");
                }
                outcome = engine::win_condition(&state.players);
                if outcome.is_over() {
                    Phase::GameOver
                } else {
                    state.round += 1;
                    Phase::Night
                }
            }
            Phase::Waiting | Phase::GameOver => return Err(GameError::InvalidPhase),
        };

        state.phase = to;
        state.phase_end_time = self.deadline(to);
        if let Some(winner) = outcome.winner() {
            state.winner = Some(winner);
            info!(game = %self.id, %winner, round = state.round, "game over");
        } else {
            info!(game = %self.id, %from, %to, round = state.round, "phase advanced");
        }

        Ok(PhaseChange {
            from,
            to,
            round: state.round,
            eliminated,
            outcome,
        })
    }

    /// Record a Mafia member's night target (last write wins).
    pub fn record_mafia_action(&self, actor: &PlayerId, target: &PlayerId) -> GameResult<()> {
        let mut state = self.state.write();
        if state.phase != Phase::Night {
            return Err(GameError::InvalidPhase);
        }
        if target.is_empty() {
            return Err(GameError::InvalidVote);
        }
        let Some(mafia) = state.players.get(actor) else {
            return Err(GameError::PlayerNotFound);
        };
        if !mafia.is_mafia() {
            return Err(GameError::NotMafia);
        }
        if !mafia.is_alive {
            return Err(GameError::PlayerNotAlive);
        }
        let Some(victim) = state.players.get(target) else {
            return Err(GameError::PlayerNotFound);
        };
        if !victim.is_alive {
            return Err(GameError::PlayerNotAlive);
        }

        if let Some(mafia) = state.players.get_mut(actor) {
            mafia.voted_for = Some(target.clone());
        }
        debug!(game = %self.id, actor = %actor, target = %target, "mafia action recorded");
        Ok(())
    }

    /// Whether enough living Mafia have picked a target to end the night.
    pub fn mafia_consensus_reached(&self) -> bool {
        let state = self.state.read();
        state.phase == Phase::Night && engine::mafia_consensus(&state.players)
    }

    /// Record a day vote (one active vote per player, last write wins).
    pub fn handle_vote(&self, voter: &PlayerId, target: &PlayerId) -> GameResult<()> {
        let mut state = self.state.write();
        if state.phase != Phase::Vote {
            return Err(GameError::InvalidPhase);
        }
        if target.is_empty() {
            return Err(GameError::InvalidVote);
        }
        for id in [voter, target] {
            match state.players.get(id) {
                None => return Err(GameError::PlayerNotFound),
                Some(p) if !p.is_alive => return Err(GameError::PlayerNotAlive),
                Some(_) => {}
            }
        }

        if let Some(p) = state.players.get_mut(voter) {
            p.voted_for = Some(target.clone());
        }
        debug!(game = %self.id, voter = %voter, target = %target, "vote recorded");
        Ok(())
    }

    fn deadline(&self, phase: Phase) -> Option<DateTime<Utc>> {
        let length = chrono::Duration::from_std(self.config.phase_duration(phase)?).ok()?;
        Utc::now().checked_add_signed(length)
    }
}
