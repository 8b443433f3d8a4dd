// Data-driven game configuration.
//
// Roster limits, Mafia headcount, and phase durations live in `GameConfig`,
// loadable from JSON so balance can change without a rebuild. Every field has
// a default, so a partial JSON object (or `{}`) is a valid config. Each
// session copies the config it was created with; later changes to the
// directory's config do not affect running sessions.
//
// Phase durations are advisory: they set the `phaseEndTime` deadline shown to
// clients, but nothing in this crate advances a phase on its own.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::player::Phase;

/// Tunable rules for one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameConfig {
    /// Roster size required before `start_game` is accepted.
    pub min_players: usize,
    /// Hard roster cap; `add_player` fails with `GameFull` beyond it.
    pub max_players: usize,
    /// Requested Mafia headcount, capped at a third of the roster.
    pub mafia_count: usize,
    pub night_secs: u64,
    pub discuss_secs: u64,
    pub vote_secs: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            min_players: 4,
            max_players: 10,
            mafia_count: 2,
            night_secs: 30,
            discuss_secs: 120,
            vote_secs: 30,
        }
    }
}

impl GameConfig {
    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configs no game could be played under.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_players == 0 {
            return Err(ConfigError::Invalid("minPlayers must be at least 1".into()));
        }
        if self.max_players < self.min_players {
            return Err(ConfigError::Invalid(format!(
                "maxPlayers ({}) is below minPlayers ({})",
                self.max_players, self.min_players
            )));
        }
        Ok(())
    }

    /// Wall-clock length of `phase`, or `None` for phases without a deadline.
    pub fn phase_duration(&self, phase: Phase) -> Option<Duration> {
        match phase {
            Phase::Night => Some(Duration::from_secs(self.night_secs)),
            Phase::Discuss => Some(Duration::from_secs(self.discuss_secs)),
            Phase::Vote => Some(Duration::from_secs(self.vote_secs)),
            Phase::Waiting | Phase::GameOver => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_standard_rules() {
        let config = GameConfig::default();
        assert_eq!(config.min_players, 4);
        assert_eq!(config.max_players, 10);
        assert_eq!(config.mafia_count, 2);
        assert_eq!(
            config.phase_duration(Phase::Discuss),
            Some(Duration::from_secs(120))
        );
        assert_eq!(config.phase_duration(Phase::Waiting), None);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = GameConfig::from_json(r#"{"maxPlayers": 6, "nightSecs": 5}"#).unwrap();
        assert_eq!(config.max_players, 6);
        assert_eq!(config.night_secs, 5);
        assert_eq!(config.min_players, 4);
        assert_eq!(config.vote_secs, 30);
    }

    #[test]
    fn rejects_inverted_limits() {
        let err = GameConfig::from_json(r#"{"minPlayers": 8, "maxPlayers": 5}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
