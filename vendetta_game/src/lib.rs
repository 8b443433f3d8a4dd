// vendetta_game — session state machine and phase engine for Silent Vendetta.
//
// Pure game logic with no networking: the relay crate (`vendetta_relay`)
// resolves sessions through the directory, calls these operations, and then
// tells clients what changed.
//
// Module overview:
// - `player.rs`:    `Player`, `Role`, `Phase`, and the `Roster` map.
// - `engine.rs`:    Role assignment, night and day vote resolution, win
//                   evaluation. Plain functions over a roster.
// - `session.rs`:   `Session` — one game behind a read/write lock; runs the
//                   phase state machine by calling into `engine.rs`.
// - `directory.rs`: `GameDirectory` — id -> session registry plus the
//                   request-layer facade.
// - `config.rs`:    `GameConfig` — roster limits and phase durations.
// - `error.rs`:     `GameError` — every validation failure.

pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod player;
pub mod session;

pub use config::{ConfigError, GameConfig};
pub use directory::GameDirectory;
pub use engine::Outcome;
pub use error::{GameError, GameResult};
pub use player::{Phase, Player, Role, Roster};
pub use session::{PhaseChange, Session, SessionSnapshot};
