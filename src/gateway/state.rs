use std::sync::Arc;

use crate::codec::ProtocolVersion;
use crate::engine::ProtocolEngine;

/// Gateway state, one per protocol version route tree
#[derive(Clone)]
pub struct VersionState {
    pub engine: Arc<ProtocolEngine>,
    /// Wire format of every route under this prefix
    pub version: ProtocolVersion,
}

impl VersionState {
    pub fn new(engine: Arc<ProtocolEngine>, version: ProtocolVersion) -> Self {
        Self { engine, version }
    }
}
