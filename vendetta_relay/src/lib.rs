// vendetta_relay — game server for Silent Vendetta.
//
// Accepts TCP connections from game clients, decodes their envelopes, runs
// them against the session directory from `vendetta_game`, and fans the
// results back out through a single broadcast hub.
//
// Module overview:
// - `hub.rs`:      Broadcast hub. One thread owns every client handle and
//                  applies register / deregister / deliver events in
//                  arrival order.
// - `handler.rs`:  `Dispatcher`. Maps each inbound request to directory and
//                  session calls and decides what goes to whom.
// - `server.rs`:   TCP listener, one reader thread per client, optional
//                  deadline-driven phase clock, `start_relay`.
// - `client.rs`:   `NetClient`, a small blocking client for tests and tools.
//
// The relay can run as a standalone binary (`main.rs`) or be embedded via
// the library API (`start_relay`).

pub mod client;
pub mod handler;
pub mod hub;
pub mod server;

pub use client::{ClientError, NetClient};
pub use handler::{Connection, Dispatcher};
pub use hub::{ClientSink, HubHandle, TcpSink, spawn_hub};
pub use server::{RelayConfig, RelayHandle, start_relay};
