// Roster entries, roles, and phases.
//
// `Player` is the unit the phase engine mutates: role assignment fills in
// `role`, night and day resolution flip `is_alive`, and `voted_for` holds the
// single outstanding vote (night kill target for Mafia, elimination target
// during the day). Serialized field names and enum spellings follow the
// client protocol (`isAlive`, `"mafia"`, `"gameover"`, ...).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use vendetta_protocol::PlayerId;

/// All players of one session, keyed by id.
pub type Roster = BTreeMap<PlayerId, Player>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Mafia,
    Villager,
    /// Informational villager sub-role, assigned from five players up.
    Detective,
    /// Informational villager sub-role, assigned from seven players up.
    Medic,
}

impl Role {
    /// Win accounting only distinguishes Mafia from everyone else.
    pub fn is_mafia(self) -> bool {
        self == Role::Mafia
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Mafia => "mafia",
            Role::Villager => "villager",
            Role::Detective => "detective",
            Role::Medic => "medic",
        };
        f.write_str(name)
    }
}

/// Game clock state. Advances `Night -> Discuss -> Vote -> Night | GameOver`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Waiting,
    Night,
    Discuss,
    Vote,
    GameOver,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Waiting => "waiting",
            Phase::Night => "night",
            Phase::Discuss => "discuss",
            Phase::Vote => "vote",
            Phase::GameOver => "gameover",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Unset until the game starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub is_alive: bool,
    pub is_host: bool,
    /// Outstanding vote; cleared after every night and day resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voted_for: Option<PlayerId>,
}

impl Player {
    pub fn new(id: PlayerId, name: impl Into<String>, is_host: bool) -> Self {
        Self {
            id,
            name: name.into(),
            role: None,
            is_alive: true,
            is_host,
            voted_for: None,
        }
    }

    pub fn is_mafia(&self) -> bool {
        self.role.is_some_and(Role::is_mafia)
    }
}
