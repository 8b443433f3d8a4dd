// Broadcast hub: the single owner of every live client connection.
//
// Architecture: one dedicated hub thread drains an `mpsc` channel of
// `HubEvent`s. Registration, deregistration, attachment, and every kind of
// outbound delivery arrive on that one channel, so they are applied strictly
// in submission order and never interleave. The client map lives on the hub
// thread's stack; nothing else can touch it, so it needs no lock.
//
// Callers hold a cloneable `HubHandle`. Every method on it only enqueues an
// event and returns; `connection_count` and `flush` are the exceptions and
// block on a reply channel until the hub reaches them.
//
// Delivery: an envelope is serialized once and the same JSON bytes are handed
// to each recipient's `ClientSink`. A sink error logs, evicts that one
// client, and closes its transport; delivery to the remaining recipients
// continues. The hub is the only writer to any client socket. Reader threads
// in `server.rs` only read. TCP writes carry a timeout, so a peer that stops
// reading is evicted instead of parking the hub thread.
//
// Targeting:
// - `broadcast`: every client attached to the game.
// - `send_to_player`: the first attached client bound to that player id.
// - `send_to_players`: every attached client bound to any of the given ids
//   (used for the Mafia-only `mafiaVote`).
// - `direct`: one connection by id, attached or not (replies and errors).

use std::collections::BTreeMap;
use std::io::{self, BufWriter};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};
use vendetta_protocol::{ConnectionId, Envelope, GameId, PlayerId, write_message};

/// Write half of one client transport.
pub trait ClientSink: Send {
    /// Deliver one serialized envelope.
    fn send(&mut self, payload: &[u8]) -> io::Result<()>;

    /// Close the transport. Called at most once, on eviction or shutdown.
    fn close(&mut self);
}

/// How long one frame may wait on a full socket send buffer.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(3);

/// Length-delimited frames over a TCP write half.
pub struct TcpSink {
    writer: BufWriter<TcpStream>,
}

impl TcpSink {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        Self::with_write_timeout(stream, WRITE_TIMEOUT)
    }

    pub fn with_write_timeout(stream: TcpStream, timeout: Duration) -> io::Result<Self> {
        stream.set_write_timeout(Some(timeout))?;
        Ok(Self {
            writer: BufWriter::new(stream),
        })
    }
}

impl ClientSink for TcpSink {
    fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        write_message(&mut self.writer, payload)
    }

    fn close(&mut self) {
        // Every frame is flushed on send; leftovers only follow a failed write.
        // Unblocks the reader thread parked on the other half.
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
    }
}

struct ClientHandle {
    game: Option<GameId>,
    player: Option<PlayerId>,
    sink: Box<dyn ClientSink>,
}

impl ClientHandle {
    fn in_game(&self, game: &GameId) -> bool {
        self.game.as_ref() == Some(game)
    }

    fn is_player(&self, player: &PlayerId) -> bool {
        self.player.as_ref() == Some(player)
    }
}

enum HubEvent {
    Register {
        id: ConnectionId,
        sink: Box<dyn ClientSink>,
    },
    Deregister {
        id: ConnectionId,
    },
    AttachGame {
        id: ConnectionId,
        game: GameId,
    },
    AttachPlayer {
        id: ConnectionId,
        player: PlayerId,
    },
    Broadcast {
        game: GameId,
        envelope: Envelope,
    },
    SendToPlayer {
        game: GameId,
        player: PlayerId,
        envelope: Envelope,
    },
    SendToPlayers {
        game: GameId,
        players: Vec<PlayerId>,
        envelope: Envelope,
    },
    Direct {
        id: ConnectionId,
        envelope: Envelope,
    },
    Count(Sender<usize>),
    Flush(Sender<()>),
    Shutdown,
}

/// Cloneable submission side of the hub.
#[derive(Clone)]
pub struct HubHandle {
    tx: Sender<HubEvent>,
    next_id: Arc<AtomicU64>,
}

impl HubHandle {
    /// Add a client under a freshly assigned connection id. The client is
    /// unattached until `attach_game`.
    pub fn register(&self, sink: Box<dyn ClientSink>) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.submit(HubEvent::Register { id, sink });
        id
    }

    /// Remove a client if still present and close its transport.
    pub fn deregister(&self, id: ConnectionId) {
        self.submit(HubEvent::Deregister { id });
    }

    pub fn attach_game(&self, id: ConnectionId, game: GameId) {
        self.submit(HubEvent::AttachGame { id, game });
    }

    pub fn attach_player(&self, id: ConnectionId, player: PlayerId) {
        self.submit(HubEvent::AttachPlayer { id, player });
    }

    pub fn broadcast(&self, game: GameId, envelope: Envelope) {
        self.submit(HubEvent::Broadcast { game, envelope });
    }

    pub fn send_to_player(&self, game: GameId, player: PlayerId, envelope: Envelope) {
        self.submit(HubEvent::SendToPlayer {
            game,
            player,
            envelope,
        });
    }

    pub fn send_to_players(&self, game: GameId, players: Vec<PlayerId>, envelope: Envelope) {
        self.submit(HubEvent::SendToPlayers {
            game,
            players,
            envelope,
        });
    }

    pub fn direct(&self, id: ConnectionId, envelope: Envelope) {
        self.submit(HubEvent::Direct { id, envelope });
    }

    /// Number of registered clients once every earlier event is applied.
    /// Zero after shutdown.
    pub fn connection_count(&self) -> usize {
        let (tx, rx) = mpsc::channel();
        self.submit(HubEvent::Count(tx));
        rx.recv().unwrap_or(0)
    }

    /// Block until every event submitted before this call has been handled.
    pub fn flush(&self) {
        let (tx, rx) = mpsc::channel();
        self.submit(HubEvent::Flush(tx));
        let _ = rx.recv();
    }

    /// Close every client and stop the hub thread.
    pub fn shutdown(&self) {
        self.submit(HubEvent::Shutdown);
    }

    fn submit(&self, event: HubEvent) {
        if self.tx.send(event).is_err() {
            debug!("hub stopped, event dropped");
        }
    }
}

/// Start the hub thread.
pub fn spawn_hub() -> (HubHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel();
    let thread = thread::spawn(move || run_hub(rx));
    let handle = HubHandle {
        tx,
        next_id: Arc::new(AtomicU64::new(1)),
    };
    (handle, thread)
}

fn run_hub(rx: Receiver<HubEvent>) {
    let mut hub = Hub::default();
    while let Ok(event) = rx.recv() {
        if !hub.handle(event) {
            break;
        }
    }
    hub.close_all();
    info!("hub stopped");
}

#[derive(Default)]
struct Hub {
    clients: BTreeMap<ConnectionId, ClientHandle>,
}

impl Hub {
    /// Apply one event. Returns false on shutdown.
    fn handle(&mut self, event: HubEvent) -> bool {
        match event {
            HubEvent::Register { id, sink } => {
                self.clients.insert(
                    id,
                    ClientHandle {
                        game: None,
                        player: None,
                        sink,
                    },
                );
                debug!(conn = %id, clients = self.clients.len(), "client registered");
            }
            HubEvent::Deregister { id } => {
                if let Some(mut client) = self.clients.remove(&id) {
                    client.sink.close();
                    debug!(conn = %id, clients = self.clients.len(), "client deregistered");
                }
            }
            HubEvent::AttachGame { id, game } => {
                if let Some(client) = self.clients.get_mut(&id) {
                    debug!(conn = %id, game = %game, "client attached to game");
                    client.game = Some(game);
                }
            }
            HubEvent::AttachPlayer { id, player } => {
                if let Some(client) = self.clients.get_mut(&id) {
                    debug!(conn = %id, player = %player, "client bound to player");
                    client.player = Some(player);
                }
            }
            HubEvent::Broadcast { game, envelope } => {
                let targets = self.select(|c| c.in_game(&game));
                self.deliver(&targets, &envelope);
            }
            HubEvent::SendToPlayer {
                game,
                player,
                envelope,
            } => {
                let first = self
                    .clients
                    .iter()
                    .find(|(_, c)| c.in_game(&game) && c.is_player(&player))
                    .map(|(id, _)| *id);
                match first {
                    Some(id) => self.deliver(&[id], &envelope),
                    None => debug!(game = %game, player = %player, "no connection for player"),
                }
            }
            HubEvent::SendToPlayers {
                game,
                players,
                envelope,
            } => {
                let targets =
                    self.select(|c| c.in_game(&game) && players.iter().any(|p| c.is_player(p)));
                self.deliver(&targets, &envelope);
            }
            HubEvent::Direct { id, envelope } => {
                self.deliver(&[id], &envelope);
            }
            HubEvent::Count(reply) => {
                let _ = reply.send(self.clients.len());
            }
            HubEvent::Flush(reply) => {
                let _ = reply.send(());
            }
            HubEvent::Shutdown => return false,
        }
        true
    }

    fn select(&self, pred: impl Fn(&ClientHandle) -> bool) -> Vec<ConnectionId> {
        self.clients
            .iter()
            .filter(|(_, c)| pred(c))
            .map(|(id, _)| *id)
            .collect()
    }

    fn deliver(&mut self, targets: &[ConnectionId], envelope: &Envelope) {
        if targets.is_empty() {
            return;
        }
        let payload = match serde_json::to_vec(envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(kind = %envelope.kind, error = %e, "failed to serialize envelope");
                return;
            }
        };
        for id in targets {
            let Some(client) = self.clients.get_mut(id) else {
                continue;
            };
            if let Err(e) = client.sink.send(&payload) {
                warn!(conn = %id, kind = %envelope.kind, error = %e, "delivery failed, evicting");
                if let Some(mut evicted) = self.clients.remove(id) {
                    evicted.sink.close();
                }
            }
        }
    }

    fn close_all(&mut self) {
        for (_, mut client) in std::mem::take(&mut self.clients) {
            client.sink.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use serde_json::Value;
    use vendetta_protocol::kind;

    use super::*;

    /// Sink that forwards every payload to a channel and records closing.
    struct ChannelSink {
        tx: Sender<Envelope>,
        closed: Arc<AtomicBool>,
        fail: bool,
    }

    impl ClientSink for ChannelSink {
        fn send(&mut self, payload: &[u8]) -> io::Result<()> {
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
            }
            let envelope = serde_json::from_slice(payload).unwrap();
            let _ = self.tx.send(envelope);
            Ok(())
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct TestClient {
        id: ConnectionId,
        rx: Receiver<Envelope>,
        closed: Arc<AtomicBool>,
    }

    impl TestClient {
        fn drain(&self) -> Vec<Envelope> {
            self.rx.try_iter().collect()
        }
    }

    fn client(hub: &HubHandle, fail: bool) -> TestClient {
        let (tx, rx) = mpsc::channel();
        let closed = Arc::new(AtomicBool::new(false));
        let id = hub.register(Box::new(ChannelSink {
            tx,
            closed: Arc::clone(&closed),
            fail,
        }));
        TestClient { id, rx, closed }
    }

    fn seated(hub: &HubHandle, game: &str, player: &str) -> TestClient {
        let c = client(hub, false);
        hub.attach_game(c.id, GameId::from(game));
        hub.attach_player(c.id, PlayerId::from(player));
        c
    }

    fn count(game: &str, n: usize) -> Envelope {
        Envelope::player_count(GameId::from(game), n)
    }

    #[test]
    fn broadcast_reaches_only_attached_game() {
        let (hub, thread) = spawn_hub();
        let a = seated(&hub, "g1", "a");
        let b = seated(&hub, "g1", "b");
        let other = seated(&hub, "g2", "c");
        let lobby = client(&hub, false);

        hub.broadcast(GameId::from("g1"), count("g1", 2));
        hub.flush();

        assert_eq!(a.drain(), vec![count("g1", 2)]);
        assert_eq!(b.drain(), vec![count("g1", 2)]);
        assert!(other.drain().is_empty());
        assert!(lobby.drain().is_empty());

        hub.shutdown();
        thread.join().unwrap();
    }

    #[test]
    fn failed_delivery_evicts_only_that_client() {
        let (hub, thread) = spawn_hub();
        let good = seated(&hub, "g", "a");
        let bad = client(&hub, true);
        hub.attach_game(bad.id, GameId::from("g"));
        let also_good = seated(&hub, "g", "c");
        assert_eq!(hub.connection_count(), 3);

        hub.broadcast(GameId::from("g"), count("g", 3));
        hub.broadcast(GameId::from("g"), count("g", 2));
        hub.flush();

        assert_eq!(good.drain(), vec![count("g", 3), count("g", 2)]);
        assert_eq!(also_good.drain(), vec![count("g", 3), count("g", 2)]);
        assert!(bad.closed.load(Ordering::SeqCst));
        assert_eq!(hub.connection_count(), 2);

        hub.shutdown();
        thread.join().unwrap();
    }

    #[test]
    fn deregister_closes_and_stops_delivery() {
        let (hub, thread) = spawn_hub();
        let a = seated(&hub, "g", "a");
        hub.deregister(a.id);
        hub.broadcast(GameId::from("g"), count("g", 0));
        hub.flush();

        assert!(a.closed.load(Ordering::SeqCst));
        assert!(a.drain().is_empty());
        assert_eq!(hub.connection_count(), 0);
        // Deregistering twice is harmless.
        hub.deregister(a.id);
        assert_eq!(hub.connection_count(), 0);

        hub.shutdown();
        thread.join().unwrap();
    }

    #[test]
    fn send_to_player_delivers_once() {
        let (hub, thread) = spawn_hub();
        let first = seated(&hub, "g", "p");
        let second = seated(&hub, "g", "p");
        let bystander = seated(&hub, "g", "q");

        hub.send_to_player(GameId::from("g"), PlayerId::from("p"), count("g", 1));
        hub.flush();

        let delivered = first.drain().len() + second.drain().len();
        assert_eq!(delivered, 1);
        assert!(bystander.drain().is_empty());

        hub.shutdown();
        thread.join().unwrap();
    }

    #[test]
    fn send_to_players_targets_listed_ids() {
        let (hub, thread) = spawn_hub();
        let m1 = seated(&hub, "g", "m1");
        let m2 = seated(&hub, "g", "m2");
        let villager = seated(&hub, "g", "v");
        let elsewhere = seated(&hub, "h", "m1");

        let vote = Envelope::mafia_vote(GameId::from("g"), PlayerId::from("m1"), PlayerId::from("v"));
        hub.send_to_players(
            GameId::from("g"),
            vec![PlayerId::from("m1"), PlayerId::from("m2")],
            vote.clone(),
        );
        hub.flush();

        assert_eq!(m1.drain(), vec![vote.clone()]);
        assert_eq!(m2.drain(), vec![vote]);
        assert!(villager.drain().is_empty());
        assert!(elsewhere.drain().is_empty());

        hub.shutdown();
        thread.join().unwrap();
    }

    #[test]
    fn direct_reaches_unattached_connection() {
        let (hub, thread) = spawn_hub();
        let c = client(&hub, false);
        hub.direct(c.id, Envelope::error(GameId::default(), "game not found"));
        hub.flush();

        let got = c.drain();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].kind, kind::ERROR);
        assert_eq!(got[0].data, Value::from("game not found"));

        hub.shutdown();
        thread.join().unwrap();
    }

    #[test]
    fn concurrent_submitters_keep_per_sender_order() {
        let (hub, thread) = spawn_hub();
        let watcher = seated(&hub, "g", "w");
        hub.flush();

        let senders: Vec<_> = (0..4)
            .map(|t| {
                let hub = hub.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        hub.broadcast(GameId::from("g"), count("g", t * 1000 + i));
                    }
                })
            })
            .collect();
        for s in senders {
            s.join().unwrap();
        }
        hub.flush();

        let got: Vec<usize> = watcher
            .drain()
            .iter()
            .map(|e| e.data.as_u64().unwrap() as usize)
            .collect();
        assert_eq!(got.len(), 200);
        for t in 0..4 {
            let mine: Vec<usize> = got.iter().copied().filter(|n| n / 1000 == t).collect();
            assert!(mine.windows(2).all(|w| w[0] < w[1]));
        }

        hub.shutdown();
        thread.join().unwrap();
    }

    #[test]
    fn stalled_reader_is_evicted_without_blocking_other_games() {
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let stream = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        // Accepted but never read from.
        let (_peer, _) = listener.accept().unwrap();

        let (hub, thread) = spawn_hub();
        let sink = TcpSink::with_write_timeout(stream, Duration::from_millis(200)).unwrap();
        let slow = hub.register(Box::new(sink));
        hub.attach_game(slow, GameId::from("slow"));
        let fast = seated(&hub, "fast", "f");

        let filler = Value::from("x".repeat(64 * 1024));
        let bulk = Envelope::new(kind::CHAT, GameId::from("slow"), filler);
        for _ in 0..400 {
            hub.broadcast(GameId::from("slow"), bulk.clone());
        }
        hub.broadcast(GameId::from("fast"), count("fast", 1));

        let got = fast.rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(got, count("fast", 1));
        assert_eq!(hub.connection_count(), 1);

        hub.shutdown();
        thread.join().unwrap();
    }

    #[test]
    fn shutdown_closes_everyone() {
        let (hub, thread) = spawn_hub();
        let a = seated(&hub, "g", "a");
        let b = client(&hub, false);
        hub.shutdown();
        thread.join().unwrap();

        assert!(a.closed.load(Ordering::SeqCst));
        assert!(b.closed.load(Ordering::SeqCst));
        // Handle keeps working but has nothing behind it.
        assert_eq!(hub.connection_count(), 0);
        hub.flush();
    }
}
