// Integration smoke test for the relay server.
//
// Starts a relay on localhost, connects plain TCP clients through
// `NetClient`, and exercises the lobby lifecycle: create, join, attach,
// start, chat, errors, disconnect, and the deadline-driven phase clock.
//
// No game client involved; every message is a framed JSON envelope built
// with the protocol crate.

use std::time::{Duration, Instant};

use serde_json::{Value, json};
use vendetta_game::{GameConfig, Phase, SessionSnapshot};
use vendetta_protocol::{ClientRequest, Envelope, GameId, kind};
use vendetta_relay::{NetClient, RelayConfig, start_relay};

const WAIT: Duration = Duration::from_secs(5);

fn test_config() -> RelayConfig {
    RelayConfig {
        port: 0, // OS picks a free port
        ..RelayConfig::default()
    }
}

/// Read envelopes until one of type `wanted` arrives; earlier ones are
/// discarded.
fn wait_for(client: &mut NetClient, wanted: &str) -> Envelope {
    let deadline = Instant::now() + WAIT;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        let envelope = client
            .recv_timeout(left)
            .unwrap_or_else(|e| panic!("waiting for {wanted}: {e}"));
        if envelope.kind == wanted {
            return envelope;
        }
    }
}

fn snapshot(envelope: &Envelope) -> SessionSnapshot {
    serde_json::from_value(envelope.data.clone()).unwrap()
}

/// Read `gameState` envelopes until one shows `phase`.
fn wait_for_phase(client: &mut NetClient, phase: Phase) -> SessionSnapshot {
    loop {
        let state = snapshot(&wait_for(client, kind::GAME_STATE));
        if state.phase == phase {
            return state;
        }
    }
}

fn create(addr: std::net::SocketAddr, name: &str) -> NetClient {
    let mut client = NetClient::connect(addr).unwrap();
    client
        .send(&ClientRequest::CreateGame {
            player_name: name.into(),
        })
        .unwrap();
    wait_for(&mut client, kind::GAME_CREATED);
    client
}

fn join(addr: std::net::SocketAddr, game: &GameId, name: &str) -> NetClient {
    let mut client = NetClient::connect(addr).unwrap();
    client.set_game(game.clone());
    client
        .send(&ClientRequest::JoinGame {
            player_name: name.into(),
        })
        .unwrap();
    wait_for(&mut client, kind::JOINED);
    client
}

#[test]
fn full_lobby_lifecycle() {
    let (handle, addr) = start_relay(test_config()).unwrap();

    // 1. Host creates a game and learns its ids.
    let mut host = create(addr, "Ann");
    let game = host.game().clone();
    assert!(!game.is_empty());
    assert!(!host.player().is_empty());

    // 2. Three more players join; the host sees the count climb.
    let mut guests: Vec<NetClient> = ["Bo", "Cy", "Di"]
        .into_iter()
        .map(|name| join(addr, &game, name))
        .collect();
    for expected in 2..=4 {
        assert_eq!(wait_for(&mut host, kind::PLAYER_COUNT).data, json!(expected));
    }
    assert_eq!(handle.games().get(&game).unwrap().player_count(), 4);

    // 3. A bystander connection attaches by naming the game and gets the
    //    current state pushed first.
    let mut spectator = NetClient::connect(addr).unwrap();
    spectator.set_game(game.clone());
    spectator
        .send(&ClientRequest::Chat {
            payload: json!("hello"),
        })
        .unwrap();
    let state = wait_for(&mut spectator, kind::GAME_STATE);
    assert_eq!(snapshot(&state).phase, Phase::Waiting);
    assert_eq!(wait_for(&mut spectator, kind::PLAYER_COUNT).data, json!(4));
    assert_eq!(wait_for(&mut spectator, kind::CHAT).data, json!("hello"));
    assert_eq!(wait_for(&mut host, kind::CHAT).data, json!("hello"));

    // 4. Host starts the game; everyone sees Night, round 1, roles dealt.
    host.send(&ClientRequest::StartGame).unwrap();
    let started = wait_for_phase(&mut host, Phase::Night);
    assert_eq!(started.round, 1);
    assert!(started.players.values().all(|p| p.role.is_some()));
    for guest in &mut guests {
        assert_eq!(wait_for_phase(guest, Phase::Night).round, 1);
    }

    // 5. Rule violations come back as errors to the sender only.
    guests[0].send(&ClientRequest::StartGame).unwrap();
    let err = wait_for(&mut guests[0], kind::ERROR);
    assert_eq!(err.data, Value::from("game has already started"));

    // 6. Host advances by hand.
    host.send(&ClientRequest::NextPhase).unwrap();
    wait_for_phase(&mut host, Phase::Discuss);

    // 7. A guest leaves; the rest are told the (unchanged) roster count.
    let mut gone = guests.pop().unwrap();
    gone.disconnect();
    assert_eq!(wait_for(&mut host, kind::PLAYER_COUNT).data, json!(4));

    handle.stop();
}

#[test]
fn malformed_frames_keep_the_connection_open() {
    let (handle, addr) = start_relay(test_config()).unwrap();
    let mut host = create(addr, "Ann");

    host.send_raw(b"{ definitely not json").unwrap();
    host.send_raw(br#"{"type":"summon","gameId":"x"}"#).unwrap();
    host.send_raw(br#"{"type":"vote","data":[1,2,3]}"#).unwrap();

    // Still served afterwards.
    host.send(&ClientRequest::StartGame).unwrap();
    let err = wait_for(&mut host, kind::ERROR);
    assert_eq!(err.data, Value::from("not enough players to start game"));

    handle.stop();
}

#[test]
fn unknown_game_is_reported() {
    let (handle, addr) = start_relay(test_config()).unwrap();
    let mut client = NetClient::connect(addr).unwrap();
    client.set_game(GameId::from("no-such-game"));
    client
        .send(&ClientRequest::JoinGame {
            player_name: "Ann".into(),
        })
        .unwrap();
    let err = wait_for(&mut client, kind::ERROR);
    assert_eq!(err.data, Value::from("game not found"));
    handle.stop();
}

#[test]
fn phase_clock_advances_expired_night() {
    let config = RelayConfig {
        game: GameConfig {
            night_secs: 0,
            ..GameConfig::default()
        },
        phase_clock: Some(Duration::from_millis(20)),
        ..test_config()
    };
    let (handle, addr) = start_relay(config).unwrap();

    let mut host = create(addr, "Ann");
    let game = host.game().clone();
    let _guests: Vec<NetClient> = ["Bo", "Cy", "Di"]
        .into_iter()
        .map(|name| join(addr, &game, name))
        .collect();

    host.send(&ClientRequest::StartGame).unwrap();
    // Night has a zero-length deadline; Discuss lasts two minutes, so the
    // clock moves the game exactly one step without any request.
    let next = wait_for_phase(&mut host, Phase::Discuss);
    assert_eq!(next.round, 1);
    assert!(next.phase_end_time.is_some());
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(handle.games().get(&game).unwrap().phase(), Phase::Discuss);

    handle.stop();
}

#[test]
fn stop_closes_client_sockets() {
    let (handle, addr) = start_relay(test_config()).unwrap();
    let mut host = create(addr, "Ann");
    handle.stop();

    let deadline = Instant::now() + WAIT;
    loop {
        match host.recv_timeout(Duration::from_millis(100)) {
            Err(vendetta_relay::ClientError::Closed) => break,
            _ if Instant::now() > deadline => panic!("socket never closed"),
            _ => {}
        }
    }
}
