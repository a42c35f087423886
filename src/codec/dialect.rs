//! Wire dialects
//!
//! A [`Dialect`] validates the envelope of an inbound document, reads fields
//! by [`Term`] and writes outbound documents. Messages are described once in
//! terms of these accessors and render in either form.

use serde_json::{Map, Value};

use super::jsonld::{self, Context};
use super::version::COMPACT_CONTEXT;
use super::vocab::{self, Ns, Term};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Namespace-prefixed keys, `@value`/`@id` containers, read after
    /// JSON-LD expansion
    Legacy,
    /// Flat names under a single `@context` reference
    Compact,
}

impl Dialect {
    /// Check the envelope and normalize the document for reading.
    ///
    /// Legacy documents are expanded; a legacy document without `@context`
    /// is read against the well-known legacy context. Compact documents must
    /// reference the compact context, alone or within an array.
    pub fn prepare(&self, doc: Value) -> Option<Value> {
        if !doc.is_object() {
            return None;
        }
        match self {
            Dialect::Legacy => jsonld::expand(&doc, &Context::legacy()),
            Dialect::Compact => {
                let context_ok = match doc.get("@context") {
                    Some(Value::String(c)) => c == COMPACT_CONTEXT,
                    Some(Value::Array(cs)) => cs.iter().any(|c| c.as_str() == Some(COMPACT_CONTEXT)),
                    _ => false,
                };
                context_ok.then_some(doc)
            }
        }
    }

    pub fn has_type(&self, node: &Value, ty: Term) -> bool {
        let expected = match self {
            Dialect::Legacy => ty.iri(),
            Dialect::Compact => ty.name.to_string(),
        };
        match node.get("@type") {
            Some(Value::String(t)) => *t == expected,
            Some(Value::Array(ts)) => ts.iter().any(|t| t.as_str() == Some(expected.as_str())),
            _ => false,
        }
    }

    fn field<'a>(&self, node: &'a Value, term: Term) -> Option<&'a Value> {
        match self {
            Dialect::Legacy => node.get(term.iri()),
            Dialect::Compact => node.get(term.name),
        }
    }

    pub fn get_str(&self, node: &Value, term: Term) -> Option<String> {
        let value = self.field(node, term)?;
        match self {
            Dialect::Legacy => jsonld::first_str(value).map(str::to_string),
            Dialect::Compact => value.as_str().map(str::to_string),
        }
    }

    /// Enumerated value without its namespace: `REQUESTED` from
    /// `REQUESTED`, `dspace:REQUESTED` or the full IRI.
    pub fn get_enum(&self, node: &Value, term: Term) -> Option<String> {
        let raw = self.get_str(node, term)?;
        let prefixed = format!("{}:", Ns::Dspace.prefix());
        let name = raw
            .strip_prefix(vocab::DSPACE_NS)
            .or_else(|| raw.strip_prefix(prefixed.as_str()))
            .unwrap_or(&raw);
        Some(name.to_string())
    }

    pub fn get_strs(&self, node: &Value, term: Term) -> Vec<String> {
        let Some(value) = self.field(node, term) else {
            return Vec::new();
        };
        let items: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(obj) => obj.get("@value").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect()
    }

    pub fn get_node<'a>(&self, node: &'a Value, term: Term) -> Option<&'a Value> {
        self.get_nodes(node, term).into_iter().next()
    }

    pub fn get_nodes<'a>(&self, node: &'a Value, term: Term) -> Vec<&'a Value> {
        match self.field(node, term) {
            Some(Value::Array(items)) => items
                .iter()
                .filter(|v| v.is_object() && v.get("@value").is_none())
                .collect(),
            Some(v @ Value::Object(_)) => vec![v],
            _ => Vec::new(),
        }
    }

    /// Policy (offer or agreement) in compact form.
    pub fn get_policy(&self, node: &Value, term: Term) -> Option<Value> {
        let value = self.field(node, term)?;
        let policy = match self {
            Dialect::Legacy => jsonld::compact(value),
            Dialect::Compact => value.clone(),
        };
        policy.is_object().then_some(policy)
    }

    fn key(&self, term: Term) -> String {
        match self {
            Dialect::Legacy => term.prefixed(),
            Dialect::Compact => term.name.to_string(),
        }
    }

    /// Top-level document with `@context` and `@type`.
    pub fn begin(&self, ty: Term) -> Map<String, Value> {
        let mut out = Map::new();
        let context = match self {
            Dialect::Legacy => {
                let prefixes: Map<String, Value> = Ns::ALL
                    .iter()
                    .map(|ns| (ns.prefix().to_string(), Value::String(ns.iri().to_string())))
                    .collect();
                Value::Object(prefixes)
            }
            Dialect::Compact => Value::String(COMPACT_CONTEXT.to_string()),
        };
        out.insert("@context".into(), context);
        out.insert("@type".into(), Value::String(self.key(ty)));
        out
    }

    /// Nested node with `@type` only.
    pub fn begin_nested(&self, ty: Term) -> Map<String, Value> {
        let mut out = Map::new();
        out.insert("@type".into(), Value::String(self.key(ty)));
        out
    }

    pub fn put_str(&self, out: &mut Map<String, Value>, term: Term, value: &str) {
        let v = match self {
            Dialect::Legacy => wrap("@value", Value::String(value.to_string())),
            Dialect::Compact => Value::String(value.to_string()),
        };
        out.insert(self.key(term), v);
    }

    pub fn put_id(&self, out: &mut Map<String, Value>, term: Term, value: &str) {
        let v = match self {
            Dialect::Legacy => wrap("@id", Value::String(value.to_string())),
            Dialect::Compact => Value::String(value.to_string()),
        };
        out.insert(self.key(term), v);
    }

    pub fn put_enum(&self, out: &mut Map<String, Value>, term: Term, value: &str) {
        match self {
            Dialect::Legacy => {
                let prefixed = format!("{}:{}", Ns::Dspace.prefix(), value);
                self.put_str(out, term, &prefixed)
            }
            Dialect::Compact => self.put_str(out, term, value),
        }
    }

    pub fn put_strs(&self, out: &mut Map<String, Value>, term: Term, values: &[String]) {
        let items = values
            .iter()
            .map(|s| match self {
                Dialect::Legacy => wrap("@value", Value::String(s.clone())),
                Dialect::Compact => Value::String(s.clone()),
            })
            .collect();
        out.insert(self.key(term), Value::Array(items));
    }

    pub fn put_node(&self, out: &mut Map<String, Value>, term: Term, node: Map<String, Value>) {
        out.insert(self.key(term), Value::Object(node));
    }

    pub fn put_nodes(&self, out: &mut Map<String, Value>, term: Term, nodes: Vec<Map<String, Value>>) {
        out.insert(
            self.key(term),
            Value::Array(nodes.into_iter().map(Value::Object).collect()),
        );
    }

    /// Write a compact policy.
    pub fn put_policy(&self, out: &mut Map<String, Value>, term: Term, policy: &Value) {
        let v = match self {
            Dialect::Legacy => legacy_policy(policy),
            Dialect::Compact => policy.clone(),
        };
        out.insert(self.key(term), v);
    }
}

fn wrap(key: &str, value: Value) -> Value {
    let mut m = Map::new();
    m.insert(key.into(), value);
    Value::Object(m)
}

fn prefix_name(ns: Ns, name: &str) -> String {
    if name.contains(':') {
        name.to_string()
    } else {
        format!("{}:{}", ns.prefix(), name)
    }
}

/// Render a compact policy with prefixed keys and explicit identifiers.
fn legacy_policy(policy: &Value) -> Value {
    match policy {
        Value::Array(items) => Value::Array(items.iter().map(legacy_policy).collect()),
        Value::Object(obj) => {
            let mut out = Map::new();
            for (key, value) in obj {
                match key.as_str() {
                    "@context" => {}
                    "@type" => {
                        let t = match value {
                            Value::String(t) => Value::String(prefix_name(Ns::Odrl, t)),
                            other => other.clone(),
                        };
                        out.insert(key.clone(), t);
                    }
                    k if k.starts_with('@') => {
                        out.insert(key.clone(), value.clone());
                    }
                    k => {
                        let rendered = match value {
                            Value::String(s) if vocab::VOCAB_VALUED_POLICY_KEYS.contains(&k) => {
                                wrap("@id", Value::String(prefix_name(Ns::Odrl, s)))
                            }
                            Value::String(s) if vocab::ID_VALUED_POLICY_KEYS.contains(&k) => {
                                wrap("@id", Value::String(s.clone()))
                            }
                            other => legacy_policy(other),
                        };
                        out.insert(prefix_name(vocab::policy_ns(k), k), rendered);
                    }
                }
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::vocab::{CONSUMER_PID, CONTRACT_NEGOTIATION, PROVIDER_PID, REASON, STATE};
    use serde_json::json;

    #[test]
    fn test_compact_context_check() {
        let d = Dialect::Compact;
        assert!(d.prepare(json!({"@context": COMPACT_CONTEXT})).is_some());
        assert!(d.prepare(json!({"@context": ["https://other", COMPACT_CONTEXT]})).is_some());
        assert!(d.prepare(json!({"@context": "https://w3id.org/dspace/v0.8/context.json"})).is_none());
        assert!(d.prepare(json!({"providerPid": "x"})).is_none());
        assert!(d.prepare(json!("text")).is_none());
    }

    #[test]
    fn test_write_then_read_both_dialects() {
        for d in [Dialect::Legacy, Dialect::Compact] {
            let mut out = d.begin(CONTRACT_NEGOTIATION);
            d.put_str(&mut out, PROVIDER_PID, "urn:uuid:p");
            d.put_id(&mut out, CONSUMER_PID, "urn:uuid:c");
            d.put_enum(&mut out, STATE, "AGREED");
            d.put_strs(&mut out, REASON, &["a".to_string(), "b".to_string()]);

            let node = d.prepare(Value::Object(out)).unwrap();
            assert!(d.has_type(&node, CONTRACT_NEGOTIATION), "{:?}", d);
            assert_eq!(d.get_str(&node, PROVIDER_PID).as_deref(), Some("urn:uuid:p"));
            assert_eq!(d.get_str(&node, CONSUMER_PID).as_deref(), Some("urn:uuid:c"));
            assert_eq!(d.get_enum(&node, STATE).as_deref(), Some("AGREED"));
            assert_eq!(d.get_strs(&node, REASON), vec!["a", "b"]);
        }
    }

    #[test]
    fn test_legacy_form_is_prefixed() {
        let d = Dialect::Legacy;
        let mut out = d.begin(CONTRACT_NEGOTIATION);
        d.put_enum(&mut out, STATE, "FINALIZED");
        let doc = Value::Object(out);
        assert_eq!(doc["@type"], "dspace:ContractNegotiation");
        assert_eq!(doc["dspace:state"], json!({"@value": "dspace:FINALIZED"}));
        assert_eq!(doc["@context"]["odrl"], vocab::ODRL_NS);
    }

    #[test]
    fn test_legacy_policy_roundtrip() {
        let policy = json!({
            "@id": "urn:uuid:offer-1",
            "@type": "Offer",
            "target": "urn:asset:1",
            "permission": [{
                "action": "use",
                "constraint": [{"leftOperand": "spatial", "operator": "eq", "rightOperand": "EU"}]
            }]
        });
        let rendered = legacy_policy(&policy);
        assert_eq!(rendered["odrl:target"], json!({"@id": "urn:asset:1"}));
        assert_eq!(rendered["odrl:permission"][0]["odrl:action"], json!({"@id": "odrl:use"}));

        let mut out = Dialect::Legacy.begin(CONTRACT_NEGOTIATION);
        Dialect::Legacy.put_policy(&mut out, vocab::OFFER, &policy);
        let node = Dialect::Legacy.prepare(Value::Object(out)).unwrap();
        let back = Dialect::Legacy.get_policy(&node, vocab::OFFER).unwrap();
        assert_eq!(back["@id"], "urn:uuid:offer-1");
        assert_eq!(back["@type"], "Offer");
        assert_eq!(back["permission"]["constraint"]["rightOperand"], "EU");
        assert_eq!(back["permission"]["constraint"]["operator"], "eq");
    }
}
