//! Core identifier helpers shared by both handshakes.
//!
//! Process ids and agreement ids are UUIDs internally and travel as
//! `urn:uuid:<uuid>` on the wire. Parsing accepts the bare UUID form too,
//! since partners are inconsistent about the prefix.

use uuid::Uuid;

/// URN prefix used for every id this provider writes.
pub const UUID_URN_PREFIX: &str = "urn:uuid:";

/// Provider-assigned process id (negotiation or transfer).
pub type ProcessId = Uuid;

/// Agreement (contract) id.
pub type ContractId = Uuid;

/// Dataset id resolved from a negotiated asset.
pub type DatasetId = Uuid;

/// Format a UUID in wire form.
#[inline]
pub fn format_pid(id: Uuid) -> String {
    format!("{}{}", UUID_URN_PREFIX, id)
}

/// Parse a wire id; `None` for anything that is not a UUID.
pub fn parse_pid(raw: &str) -> Option<Uuid> {
    let raw = raw.trim();
    let bare = raw.strip_prefix(UUID_URN_PREFIX).unwrap_or(raw);
    Uuid::parse_str(bare).ok()
}

/// Compare two wire ids by value, ignoring the optional URN prefix.
pub fn same_pid(a: &str, b: &str) -> bool {
    match (parse_pid(a), parse_pid(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a.trim() == b.trim(),
    }
}
