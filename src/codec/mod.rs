//! Message Codec
//!
//! Per-version encoding and decoding of every protocol message. The version
//! selects a [`Dialect`]; each message describes itself once through the
//! [`WireMessage`] trait.
//!
//! Decoding never panics: malformed JSON, a wrong or missing `@context`
//! (compact versions), a wrong `@type` or a missing required field all
//! yield `None`.

pub mod dialect;
pub mod jsonld;
pub mod messages;
pub mod policy;
pub mod version;
pub mod vocab;

pub use dialect::Dialect;
pub use messages::*;
pub use version::ProtocolVersion;

use serde_json::Value;
use tracing::debug;

/// Decode `raw` as message `T` in `version`'s format.
pub fn decode<T: WireMessage>(version: ProtocolVersion, raw: &[u8]) -> Option<T> {
    let doc: Value = match serde_json::from_slice(raw) {
        Ok(doc) => doc,
        Err(e) => {
            debug!(version = %version, error = %e, "Body is not JSON");
            return None;
        }
    };
    decode_value(version, doc)
}

pub fn decode_value<T: WireMessage>(version: ProtocolVersion, doc: Value) -> Option<T> {
    let dialect = version.dialect();
    let Some(node) = dialect.prepare(doc) else {
        debug!(version = %version, kind = T::TYPE.name, "Envelope rejected");
        return None;
    };
    if !dialect.has_type(&node, T::TYPE) {
        debug!(version = %version, kind = T::TYPE.name, "Unexpected @type");
        return None;
    }
    let message = T::read(dialect, &node);
    if message.is_none() {
        debug!(version = %version, kind = T::TYPE.name, "Missing required field");
    }
    message
}

pub fn encode_value<T: WireMessage>(version: ProtocolVersion, message: &T) -> Value {
    let dialect = version.dialect();
    let mut out = dialect.begin(T::TYPE);
    message.write(dialect, &mut out);
    Value::Object(out)
}

/// Encode `message` in `version`'s format.
pub fn encode<T: WireMessage>(version: ProtocolVersion, message: &T) -> Vec<u8> {
    encode_value(version, message).to_string().into_bytes()
}
