use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Where a node's value lives and how it is persisted.
///
/// - `Inherited`: no policy of its own, resolved from the nearest ancestor
/// - `Local`: stored on the node, persisted to local storage
/// - `Transient`: stored on the node, never expected to outlive the process
/// - `Server`: stored on the node, persisted to the remote service
/// - `Game`: never stored, every read goes through the lookup collaborator
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StorageLocation {
    #[default]
    Inherited,
    Local,
    Transient,
    Server,
    Game,
}

impl StorageLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inherited => "inherited",
            Self::Local => "local",
            Self::Transient => "transient",
            Self::Server => "server",
            Self::Game => "game",
        }
    }

    /// Whether the node carries a value slot of its own.
    pub fn stores_value(&self) -> bool {
        !matches!(self, Self::Game)
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageLocation {
    type Err = UnknownLocation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inherited" => Ok(Self::Inherited),
            "local" => Ok(Self::Local),
            "transient" => Ok(Self::Transient),
            "server" => Ok(Self::Server),
            "game" => Ok(Self::Game),
            _ => Err(UnknownLocation(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown storage location: {0}")]
pub struct UnknownLocation(pub String);

bitflags! {
    /// A filter over effective storage locations.
    ///
    /// The empty set means "no filter": every node matches. `INHERITED`
    /// never matches, since effective policies are always explicit.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct LocationSet: u8 {
        const LOCAL = 1;
        const TRANSIENT = 1 << 1;
        const SERVER = 1 << 2;
        const GAME = 1 << 3;
        const INHERITED = 1 << 4;
    }
}

impl LocationSet {
    /// Locations persisted by a save: everything that owns a value
    /// and is not transient.
    pub const PERSISTENT: Self = Self::LOCAL.union(Self::SERVER);

    pub fn matches(self, location: StorageLocation) -> bool {
        if self.is_empty() {
            return true;
        }
        match location {
            StorageLocation::Inherited => false,
            other => self.contains(Self::from(other)),
        }
    }
}

impl From<StorageLocation> for LocationSet {
    fn from(location: StorageLocation) -> Self {
        match location {
            StorageLocation::Inherited => Self::INHERITED,
            StorageLocation::Local => Self::LOCAL,
            StorageLocation::Transient => Self::TRANSIENT,
            StorageLocation::Server => Self::SERVER,
            StorageLocation::Game => Self::GAME,
        }
    }
}

impl FromIterator<StorageLocation> for LocationSet {
    fn from_iter<I: IntoIterator<Item = StorageLocation>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |set, location| set | Self::from(location))
    }
}
