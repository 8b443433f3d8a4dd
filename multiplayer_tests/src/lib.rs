// Test-only player client for multiplayer integration tests.
//
// Wraps the real `NetClient` (from `vendetta_relay::client`) and keeps the
// most recent `gameState` snapshot it has seen, giving tests a synchronous
// API for driving whole games over TCP: create → join → start → night →
// discuss → vote → game over.
//
// The only test-specific code here is the blocking polling wrappers around
// `NetClient::poll()`. Networking, dispatch, and game rules all run through
// the same code paths as a live server.
//
// See also: `tests/full_game.rs` for the scenarios.

use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use vendetta_game::{Phase, Player, Role, SessionSnapshot};
use vendetta_protocol::{ClientRequest, Envelope, GameId, PlayerId, kind};
use vendetta_relay::NetClient;

/// Default timeout for blocking poll operations.
const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep duration between poll attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One seated player on a real TCP connection.
pub struct TestPlayer {
    client: NetClient,
    pub name: String,
    /// Latest `gameState` received, if any.
    pub state: Option<SessionSnapshot>,
    /// Every non-`gameState` envelope received and not yet taken.
    pub inbox: Vec<Envelope>,
}

impl TestPlayer {
    /// Connect and create a new game as its host.
    pub fn create(addr: SocketAddr, name: &str) -> Self {
        let mut player = Self::connect(addr, name);
        player.send(&ClientRequest::CreateGame {
            player_name: name.into(),
        });
        player.poll_until(kind::GAME_CREATED);
        player
    }

    /// Connect and take a seat in `game`.
    pub fn join(addr: SocketAddr, game: &GameId, name: &str) -> Self {
        let mut player = Self::connect(addr, name);
        player.client.set_game(game.clone());
        player.send(&ClientRequest::JoinGame {
            player_name: name.into(),
        });
        player.poll_until(kind::JOINED);
        player
    }

    fn connect(addr: SocketAddr, name: &str) -> Self {
        let client = NetClient::connect(addr).expect("TestPlayer::connect failed");
        Self {
            client,
            name: name.into(),
            state: None,
            inbox: Vec::new(),
        }
    }

    pub fn id(&self) -> &PlayerId {
        self.client.player()
    }

    pub fn game(&self) -> &GameId {
        self.client.game()
    }

    pub fn send(&mut self, request: &ClientRequest) {
        self.client.send(request).expect("send failed");
    }

    pub fn start_game(&mut self) {
        self.send(&ClientRequest::StartGame);
    }

    pub fn next_phase(&mut self) {
        self.send(&ClientRequest::NextPhase);
    }

    pub fn mafia_action(&mut self, target: &PlayerId) {
        self.send(&ClientRequest::MafiaAction {
            target: target.clone(),
        });
    }

    pub fn vote(&mut self, target: &PlayerId) {
        self.send(&ClientRequest::Vote {
            target: target.clone(),
        });
    }

    pub fn chat(&mut self, payload: serde_json::Value) {
        self.send(&ClientRequest::Chat { payload });
    }

    /// Blocking poll until an envelope of type `wanted` arrives (or is
    /// already waiting in the inbox). Removes and returns it.
    pub fn poll_until(&mut self, wanted: &str) -> Envelope {
        let start = Instant::now();
        loop {
            if let Some(pos) = self.inbox.iter().position(|e| e.kind == wanted) {
                return self.inbox.remove(pos);
            }
            assert!(
                start.elapsed() < POLL_TIMEOUT,
                "{}: timed out waiting for {wanted}",
                self.name
            );
            self.pump();
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Blocking poll until a `gameState` shows `phase`. Returns that
    /// snapshot.
    pub fn poll_until_phase(&mut self, phase: Phase) -> SessionSnapshot {
        let start = Instant::now();
        loop {
            self.pump();
            if let Some(state) = self.state.as_ref().filter(|s| s.phase == phase) {
                return state.clone();
            }
            assert!(
                start.elapsed() < POLL_TIMEOUT,
                "{}: timed out waiting for phase {phase}",
                self.name
            );
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Wait briefly and report whether any envelope of type `wanted` arrived.
    pub fn received_within(&mut self, wanted: &str, wait: Duration) -> bool {
        thread::sleep(wait);
        self.pump();
        self.inbox.iter().any(|e| e.kind == wanted)
    }

    /// This player's entry in the latest snapshot.
    pub fn me(&self) -> Option<&Player> {
        self.state.as_ref()?.players.get(self.id())
    }

    pub fn role(&self) -> Option<Role> {
        self.me()?.role
    }

    pub fn disconnect(&mut self) {
        self.client.disconnect();
    }

    /// Drain the socket: snapshots replace `state`, the rest go to `inbox`.
    fn pump(&mut self) {
        for envelope in self.client.poll() {
            if envelope.kind == kind::GAME_STATE {
                match serde_json::from_value(envelope.data) {
                    Ok(snapshot) => self.state = Some(snapshot),
                    Err(e) => panic!("{}: bad gameState: {e}", self.name),
                }
            } else {
                self.inbox.push(envelope);
            }
        }
    }
}

/// Seat a full table: the first name creates the game, the rest join it.
/// Every player's inbox starts empty.
pub fn seat_table(addr: SocketAddr, names: &[&str]) -> Vec<TestPlayer> {
    let (host_name, guests) = names.split_first().expect("at least one name");
    let host = TestPlayer::create(addr, host_name);
    let game = host.game().clone();
    let mut table = vec![host];
    for name in guests {
        table.push(TestPlayer::join(addr, &game, name));
    }
    // The final `playerCount` is the last lobby broadcast each seat gets.
    let seated = serde_json::Value::from(names.len());
    for player in &mut table {
        while player.poll_until(kind::PLAYER_COUNT).data != seated {}
        player.inbox.clear();
    }
    table
}

/// Host starts the game and every player waits for the first night.
pub fn start(table: &mut [TestPlayer]) {
    table[0].start_game();
    for player in table.iter_mut() {
        player.poll_until_phase(Phase::Night);
    }
}

/// Indices of players dealt `role`, as each player's own snapshot shows.
pub fn seats_with_role(table: &[TestPlayer], role: Role) -> Vec<usize> {
    table
        .iter()
        .enumerate()
        .filter(|(_, p)| p.role() == Some(role))
        .map(|(i, _)| i)
        .collect()
}
