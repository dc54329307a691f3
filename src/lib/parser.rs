//! ## Status Parser
//!
//! Turns the text printed by `ipsec statusall` into a [`ConnectionSnapshot`].
//!
//! The report is prose rather than a grammar, so every line is first classified
//! into a [`LineKind`] by looking for literal markers, then handed to the handler
//! for that kind. Handlers are independent of each other: a change to how one
//! kind of line is read cannot affect the others.
//!
//! ```text
//!  net-a:  192.0.2.1...198.51.100.7  IKEv2, dpddelay=30s        -> Header
//!  net-a[3]: ESTABLISHED 12 minutes ago, ...                    -> Established
//!  net-a{5}:  INSTALLED, 500 bytes_i (5 pkts), 200 bytes_o (4 pkts) -> InstalledCounters
//!  net-a{5}:   10.0.0.0/24 === 10.1.0.0/24                      -> SubnetDelimiter
//! ```
//!
//! Fields are applied to the connection introduced by the most recent header
//! line. Lines that cannot be read are defaulted, never fatal.

use tracing::trace;

use crate::connection::{ConnectionRecord, ConnectionSnapshot, ConnectionState};

const PROTOCOL_MARKER: &str = "IKEv2";
const DPD_DELAY_MARKER: &str = "dpddelay";
const ESTABLISHED_MARKER: &str = "ESTABLISHED";
const INSTALLED_MARKER: &str = "INSTALLED";
const BYTES_IN_LABEL: &str = "bytes_i";
const BYTES_OUT_LABEL: &str = "bytes_o";
const SUBNET_SEPARATOR: &str = "===";

/// What a single status line carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind<'a> {
    /// Starts a new connection stanza.
    Header { name: &'a str },
    /// The current connection is up.
    Established,
    /// Byte counters of the installed SA. Both are 0 when the line could not be read.
    InstalledCounters { bytes_in: u64, bytes_out: u64 },
    /// Local and remote traffic selectors around the `===` separator.
    SubnetDelimiter {
        left: Option<&'a str>,
        right: Option<&'a str>,
    },
    Other,
}

impl<'a> LineKind<'a> {
    /// Classifies a line. The first matching rule wins.
    pub fn classify(line: &'a str) -> Self {
        if line.contains(PROTOCOL_MARKER) && line.contains(DPD_DELAY_MARKER) {
            let name = line.split_once(':').map_or(line, |(name, _)| name).trim();
            LineKind::Header { name }
        } else if line.contains(ESTABLISHED_MARKER) {
            LineKind::Established
        } else if line.contains(INSTALLED_MARKER) {
            let (bytes_in, bytes_out) = parse_counters(line);
            LineKind::InstalledCounters {
                bytes_in,
                bytes_out,
            }
        } else if line.contains(SUBNET_SEPARATOR) {
            let (left, right) = split_subnets(line);
            LineKind::SubnetDelimiter { left, right }
        } else {
            LineKind::Other
        }
    }
}

/// Reads the counter pair from an `INSTALLED` line.
///
/// Each value is the token right before its label, with grouping commas
/// removed. A missing label or an unreadable value zeroes both counters.
fn parse_counters(line: &str) -> (u64, u64) {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    match (
        labelled_value(&tokens, BYTES_IN_LABEL),
        labelled_value(&tokens, BYTES_OUT_LABEL),
    ) {
        (Some(bytes_in), Some(bytes_out)) => (bytes_in, bytes_out),
        _ => (0, 0),
    }
}

fn labelled_value(tokens: &[&str], label: &str) -> Option<u64> {
    let index = tokens.iter().position(|token| *token == label)?;
    let value = tokens.get(index.checked_sub(1)?)?;
    value.replace(',', "").parse().ok()
}

/// Last token before the first `===` and first token after it.
fn split_subnets(line: &str) -> (Option<&str>, Option<&str>) {
    let mut parts = line.split(SUBNET_SEPARATOR);
    let left = parts.next().and_then(|part| part.split_whitespace().last());
    let right = parts.next().and_then(|part| part.split_whitespace().next());
    (left, right)
}

/// Scanner state: the snapshot under construction and the connection that
/// following lines apply to.
#[derive(Debug, Default)]
struct ParserState {
    snapshot: ConnectionSnapshot,
    current: Option<String>,
}

impl ParserState {
    fn apply(&mut self, kind: LineKind<'_>) {
        match kind {
            LineKind::Header { name } => self.on_header(name),
            LineKind::Established => self.on_established(),
            LineKind::InstalledCounters {
                bytes_in,
                bytes_out,
            } => self.on_installed_counters(bytes_in, bytes_out),
            LineKind::SubnetDelimiter { left, right } => self.on_subnets(left, right),
            LineKind::Other => {}
        }
    }

    fn on_header(&mut self, name: &str) {
        self.snapshot.reset(name);
        self.current = Some(name.to_string());
    }

    fn on_established(&mut self) {
        if let Some(record) = self.current_record() {
            record.status = 1;
            record.state = ConnectionState::Established;
        }
    }

    fn on_installed_counters(&mut self, bytes_in: u64, bytes_out: u64) {
        if let Some(record) = self.current_record() {
            record.bytes_in = bytes_in;
            record.bytes_out = bytes_out;
        }
    }

    fn on_subnets(&mut self, left: Option<&str>, right: Option<&str>) {
        if let Some(record) = self.current_record() {
            if let Some(left) = left {
                record.left_subnet = left.to_string();
            }
            if let Some(right) = right {
                record.right_subnet = right.to_string();
            }
        }
    }

    fn current_record(&mut self) -> Option<&mut ConnectionRecord> {
        let name = self.current.as_deref()?;
        self.snapshot.get_mut(name)
    }
}

/// Parses a full status report into a snapshot.
///
/// Pure function of `raw`: no state is carried between calls.
pub fn parse_status(raw: &str) -> ConnectionSnapshot {
    let mut state = ParserState::default();
    for line in raw.lines() {
        let kind = LineKind::classify(line);
        if kind != LineKind::Other {
            trace!(?kind, "classified status line");
        }
        state.apply(kind);
    }
    state.snapshot
}
