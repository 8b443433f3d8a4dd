// TCP server for the game relay.
//
// Architecture: thread-per-reader around a shared `Dispatcher`.
//
// - **Listener thread** (`TcpListener::accept()` loop, non-blocking with a
//   short sleep so it can notice `stop`): for each new connection, hands a
//   cloned write half to the hub as a `TcpSink` and spawns a reader thread.
// - **Reader threads** (one per client): call `read_message()` in a loop and
//   pass every frame to the `Dispatcher` on the reader's own thread. Session
//   locks make concurrent requests from different connections safe; requests
//   from one connection are handled in the order they were sent. On EOF or a
//   read error the reader deregisters the connection and exits.
// - **Hub thread** (`hub.rs`): the only writer to client sockets.
// - **Phase clock thread** (optional, `RelayConfig::phase_clock`): on every
//   tick, advances each session whose phase deadline has passed and
//   broadcasts its new `gameState`. Without it, phases move only on
//   `nextPhase` requests and Mafia consensus.
//
// Shutdown: `RelayHandle::stop` clears `keep_running`, joins the listener and
// clock threads, then shuts the hub down. Closing the hub closes every client
// socket, which unblocks the remaining reader threads.

use std::io::{self, BufReader};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use vendetta_game::{GameConfig, GameDirectory};
use vendetta_protocol::{Envelope, read_message};

use crate::handler::{Connection, Dispatcher};
use crate::hub::{HubHandle, TcpSink, spawn_hub};

const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// Configuration for starting a relay server.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub host: String,
    /// `0` lets the OS pick a free port.
    pub port: u16,
    pub game: GameConfig,
    /// Tick interval of the deadline-driven phase clock. `None` disables it.
    pub phase_clock: Option<Duration>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3001,
            game: GameConfig::default(),
            phase_clock: None,
        }
    }
}

/// Handle returned by `start_relay` to control the running server.
pub struct RelayHandle {
    keep_running: Arc<AtomicBool>,
    games: Arc<GameDirectory>,
    hub: HubHandle,
    threads: Vec<JoinHandle<()>>,
}

impl RelayHandle {
    /// The live session directory, for inspection and tooling.
    pub fn games(&self) -> &Arc<GameDirectory> {
        &self.games
    }

    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    /// Stop accepting, stop the clock, close every client, and wait for the
    /// server threads to exit.
    pub fn stop(self) {
        self.keep_running.store(false, Ordering::SeqCst);
        let mut threads = self.threads;
        // The hub thread is last; it must outlive the listener and clock.
        let hub_thread = threads.pop();
        for thread in threads {
            let _ = thread.join();
        }
        self.hub.shutdown();
        if let Some(thread) = hub_thread {
            let _ = thread.join();
        }
        info!("relay stopped");
    }
}

/// Bind and start the relay on background threads. Returns a handle for
/// stopping it and the actual bound address.
pub fn start_relay(config: RelayConfig) -> io::Result<(RelayHandle, SocketAddr)> {
    let listener = TcpListener::bind((config.host.as_str(), config.port))?;
    let addr = listener.local_addr()?;
    // Set non-blocking so the accept loop can check keep_running periodically.
    listener.set_nonblocking(true)?;

    let keep_running = Arc::new(AtomicBool::new(true));
    let games = Arc::new(GameDirectory::new(config.game.clone()));
    let (hub, hub_thread) = spawn_hub();
    let dispatcher = Dispatcher::new(Arc::clone(&games), hub.clone());

    let mut threads = Vec::new();
    {
        let dispatcher = dispatcher.clone();
        let keep_running = Arc::clone(&keep_running);
        threads.push(thread::spawn(move || {
            accept_loop(listener, dispatcher, keep_running);
        }));
    }
    if let Some(interval) = config.phase_clock {
        let keep_running = Arc::clone(&keep_running);
        threads.push(thread::spawn(move || {
            phase_clock(&dispatcher, interval, &keep_running);
        }));
    }
    threads.push(hub_thread);

    info!(%addr, phase_clock = ?config.phase_clock, "relay listening");
    Ok((
        RelayHandle {
            keep_running,
            games,
            hub,
            threads,
        },
        addr,
    ))
}

fn accept_loop(listener: TcpListener, dispatcher: Dispatcher, keep_running: Arc<AtomicBool>) {
    while keep_running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = accept(stream, &dispatcher) {
                    warn!(%peer, error = %e, "failed to set up connection");
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                warn!(error = %e, "accept failed, listener exiting");
                break;
            }
        }
    }
}

fn accept(stream: TcpStream, dispatcher: &Dispatcher) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    let write_half = stream.try_clone()?;
    let peer = stream.peer_addr()?;

    let id = dispatcher.hub().register(Box::new(TcpSink::new(write_half)?));
    info!(conn = %id, %peer, "connection accepted");

    let dispatcher = dispatcher.clone();
    thread::spawn(move || {
        reader_loop(BufReader::new(stream), Connection::new(id), &dispatcher);
    });
    Ok(())
}

/// Reader loop for a single client. Runs in its own thread.
fn reader_loop(mut reader: BufReader<TcpStream>, mut conn: Connection, dispatcher: &Dispatcher) {
    loop {
        match read_message(&mut reader) {
            Ok(frame) => dispatcher.handle_frame(&mut conn, &frame),
            Err(e) => {
                // EOF is the normal way out.
                if e.kind() != io::ErrorKind::UnexpectedEof {
                    debug!(conn = %conn.id, error = %e, "read failed");
                }
                break;
            }
        }
    }
    dispatcher.disconnect(&conn);
}

/// Advance every session whose phase deadline has passed, once per tick.
fn phase_clock(dispatcher: &Dispatcher, interval: Duration, keep_running: &AtomicBool) {
    while keep_running.load(Ordering::SeqCst) {
        thread::sleep(interval);
        let now = Utc::now();
        for session in dispatcher.games().sessions() {
            match session.advance_if_past_deadline(now) {
                Ok(Some(change)) => {
                    info!(game = %session.id(), from = %change.from, to = %change.to, "phase deadline passed");
                    let game = session.id().clone();
                    let state = Envelope::game_state(game.clone(), session.snapshot().to_json());
                    dispatcher.hub().broadcast(game, state);
                }
                Ok(None) => {}
                Err(e) => warn!(game = %session.id(), error = %e, "phase clock advance failed"),
            }
        }
    }
}
