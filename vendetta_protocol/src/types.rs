// Core ID types for the game protocol.
//
// `GameId` and `PlayerId` are string newtypes: fresh ones are UUID v4
// strings, but clients see them only as opaque text and a caller may supply
// its own player id (the original lobby used the display name). They
// serialize transparently so they can be used as JSON map keys in session
// snapshots.
//
// `ConnectionId` is assigned by the relay's broadcast hub and never leaves
// the server process.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a fresh random id (UUID v4 text).
            pub fn random() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id! {
    /// Identifier of one game session.
    GameId
}

string_id! {
    /// Identifier of one player within a session.
    PlayerId
}

/// Hub-assigned id of one live client connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_ids_are_distinct_uuids() {
        let a = PlayerId::random();
        let b = PlayerId::random();
        assert_ne!(a, b);
        assert!(uuid::Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = GameId::from("amber-42");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""amber-42""#);
        let back: GameId = serde_json::from_str(r#""amber-42""#).unwrap();
        assert_eq!(back, id);
    }
}
