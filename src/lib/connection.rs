//! Connection snapshot types
//!
//! A [`ConnectionSnapshot`] is the complete set of connections reported by one
//! `ipsec statusall` run. It is rebuilt from scratch on every poll and never
//! merged with a previous one.

use std::{
    collections::{btree_map::Entry, BTreeMap},
    fmt,
};

use serde::Serialize;
use utoipa::ToSchema;

/// Placeholder used for subnets that were not reported in this cycle.
pub const UNKNOWN_SUBNET: &str = "unknown";

/// State of a connection as last observed in the status text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Unknown,
    Established,
}

impl ConnectionState {
    /// Label value used in the exported metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Unknown => "unknown",
            ConnectionState::Established => "established",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-connection data extracted from one status report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ConnectionRecord {
    pub name: String,
    /// 1 when the connection was seen established, 0 otherwise
    pub status: u8,
    pub state: ConnectionState,
    /// Inbound bytes of the installed SA, as last reported
    pub bytes_in: u64,
    /// Outbound bytes of the installed SA, as last reported
    pub bytes_out: u64,
    pub left_subnet: String,
    pub right_subnet: String,
}

impl ConnectionRecord {
    /// Creates a record with every field at its default.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: 0,
            state: ConnectionState::Unknown,
            bytes_in: 0,
            bytes_out: 0,
            left_subnet: UNKNOWN_SUBNET.to_string(),
            right_subnet: UNKNOWN_SUBNET.to_string(),
        }
    }

    pub fn is_established(&self) -> bool {
        self.state == ConnectionState::Established
    }
}

/// Mapping from connection name to its record, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ConnectionSnapshot {
    connections: BTreeMap<String, ConnectionRecord>,
}

impl ConnectionSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fresh default record for `name`, replacing any existing one,
    /// and returns it for further updates.
    pub(crate) fn reset(&mut self, name: &str) -> &mut ConnectionRecord {
        let record = ConnectionRecord::new(name);
        match self.connections.entry(name.to_string()) {
            Entry::Occupied(mut entry) => {
                entry.insert(record);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(record),
        }
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut ConnectionRecord> {
        self.connections.get_mut(name)
    }

    pub fn get(&self, name: &str) -> Option<&ConnectionRecord> {
        self.connections.get(name)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConnectionRecord> {
        self.connections.values()
    }

    /// Number of connections currently established.
    pub fn established_count(&self) -> usize {
        self.iter().filter(|c| c.is_established()).count()
    }
}

impl FromIterator<ConnectionRecord> for ConnectionSnapshot {
    fn from_iter<I: IntoIterator<Item = ConnectionRecord>>(iter: I) -> Self {
        Self {
            connections: iter.into_iter().map(|c| (c.name.clone(), c)).collect(),
        }
    }
}
