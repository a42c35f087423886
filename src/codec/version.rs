use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::dialect::Dialect;

/// Context document of the compact wire form.
pub const COMPACT_CONTEXT: &str = "https://w3id.org/dspace/2024/1/context.json";

/// Well-known context of the legacy wire form.
pub const LEGACY_CONTEXT: &str = "https://w3id.org/dspace/v0.8/context.json";

/// Supported protocol revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolVersion {
    #[serde(rename = "v0.8")]
    V0_8,
    #[serde(rename = "2024-1")]
    V2024_1,
    /// Same messages as 2024-1, served under its own path
    #[serde(rename = "2025-1")]
    V2025_1,
}

impl ProtocolVersion {
    pub const ALL: [ProtocolVersion; 3] = [
        ProtocolVersion::V0_8,
        ProtocolVersion::V2024_1,
        ProtocolVersion::V2025_1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolVersion::V0_8 => "v0.8",
            ProtocolVersion::V2024_1 => "2024-1",
            ProtocolVersion::V2025_1 => "2025-1",
        }
    }

    /// Route prefix; the legacy revision is served at the root.
    pub fn path_prefix(&self) -> &'static str {
        match self {
            ProtocolVersion::V0_8 => "",
            ProtocolVersion::V2024_1 => "/2024/1",
            ProtocolVersion::V2025_1 => "/2025/1",
        }
    }

    /// Path as advertised by the version discovery document.
    pub fn advertised_path(&self) -> &'static str {
        match self.path_prefix() {
            "" => "/",
            prefix => prefix,
        }
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            ProtocolVersion::V0_8 => Dialect::Legacy,
            ProtocolVersion::V2024_1 | ProtocolVersion::V2025_1 => Dialect::Compact,
        }
    }

    #[inline]
    pub fn is_legacy(&self) -> bool {
        self.dialect() == Dialect::Legacy
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProtocolVersion {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProtocolVersion::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or(())
    }
}
