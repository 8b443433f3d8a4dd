// TCP client for talking to the relay.
//
// `connect()` opens the socket and spawns a background reader thread that
// decodes frames into `Envelope`s and pushes them into an `mpsc` inbox. The
// caller keeps a `BufWriter<TcpStream>` for sending. `poll()` drains the
// inbox without blocking; `recv_timeout()` waits for the next envelope.
//
// The client remembers the game and player ids the server assigned (from
// `gameCreated` / `joined`, or set by hand) and stamps them on every request
// it sends.
//
// Used by the integration tests and by any tooling that wants to drive a
// relay without a real game client.

use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use vendetta_protocol::message::SeatData;
use vendetta_protocol::{ClientRequest, Envelope, GameId, PlayerId, kind, read_message, write_message};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connection failed: {0}")]
    Connect(#[source] std::io::Error),
    #[error("send failed: {0}")]
    Send(#[source] std::io::Error),
    #[error("could not encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("timed out waiting for a message")]
    Timeout,
    #[error("connection closed by server")]
    Closed,
}

/// TCP client for relay communication.
pub struct NetClient {
    writer: BufWriter<TcpStream>,
    inbox: Receiver<Envelope>,
    _reader_thread: JoinHandle<()>,
    game: GameId,
    player: PlayerId,
}

impl NetClient {
    /// Connect and start the background reader.
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).map_err(ClientError::Connect)?;
        stream.set_nodelay(true).map_err(ClientError::Connect)?;
        let reader_stream = stream.try_clone().map_err(ClientError::Connect)?;

        let (tx, rx) = mpsc::channel();
        let reader_thread = thread::spawn(move || {
            let mut reader = BufReader::new(reader_stream);
            while let Ok(bytes) = read_message(&mut reader) {
                let Ok(envelope) = serde_json::from_slice::<Envelope>(&bytes) else {
                    break;
                };
                if tx.send(envelope).is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            writer: BufWriter::new(stream),
            inbox: rx,
            _reader_thread: reader_thread,
            game: GameId::default(),
            player: PlayerId::default(),
        })
    }

    pub fn game(&self) -> &GameId {
        &self.game
    }

    pub fn player(&self) -> &PlayerId {
        &self.player
    }

    /// Target a game without a seat reply (e.g. a spectator connection).
    pub fn set_game(&mut self, game: GameId) {
        self.game = game;
    }

    pub fn set_player(&mut self, player: PlayerId) {
        self.player = player;
    }

    /// Send a request stamped with the current game and player ids.
    pub fn send(&mut self, request: &ClientRequest) -> Result<(), ClientError> {
        let envelope = Envelope::request(request, self.game.clone(), self.player.clone());
        self.send_envelope(&envelope)
    }

    /// Send an arbitrary envelope as-is.
    pub fn send_envelope(&mut self, envelope: &Envelope) -> Result<(), ClientError> {
        let json = serde_json::to_vec(envelope)?;
        write_message(&mut self.writer, &json).map_err(ClientError::Send)
    }

    /// Send raw bytes as one frame, bypassing envelope encoding.
    pub fn send_raw(&mut self, payload: &[u8]) -> Result<(), ClientError> {
        write_message(&mut self.writer, payload).map_err(ClientError::Send)
    }

    /// Drain all queued envelopes without blocking. Seat replies update the
    /// remembered ids.
    pub fn poll(&mut self) -> Vec<Envelope> {
        let messages: Vec<Envelope> = self.inbox.try_iter().collect();
        for envelope in &messages {
            self.note_seat(envelope);
        }
        messages
    }

    /// Wait up to `timeout` for the next envelope.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<Envelope, ClientError> {
        let envelope = self.inbox.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => ClientError::Timeout,
            RecvTimeoutError::Disconnected => ClientError::Closed,
        })?;
        self.note_seat(&envelope);
        Ok(envelope)
    }

    /// Close both directions of the socket.
    pub fn disconnect(&mut self) {
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
    }

    fn note_seat(&mut self, envelope: &Envelope) {
        if envelope.kind != kind::GAME_CREATED && envelope.kind != kind::JOINED {
            return;
        }
        if let Ok(seat) = envelope.data_as::<SeatData>() {
            self.game = seat.game_id;
            self.player = seat.player_id;
        }
    }
}
