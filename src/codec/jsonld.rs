//! JSON-LD subset
//!
//! Enough of expansion and compaction to read the legacy wire form:
//! inline prefix/term definitions, `@vocab`, `@id`/`@vocab` type coercion,
//! nested contexts and the well-known legacy context. Remote contexts are
//! never fetched; any context URL other than the legacy one fails expansion.
//!
//! Expanded nodes follow the usual shape: every property maps to an array of
//! `{"@value": ..}`, `{"@id": ..}` or nested node objects, and `@type` is an
//! array of IRIs.

use serde_json::{Map, Value};
use std::collections::HashMap;

use super::version::LEGACY_CONTEXT;
use super::vocab::{self, Ns};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Coerce {
    None,
    Id,
    Vocab,
}

#[derive(Debug, Clone)]
struct TermDef {
    iri: String,
    coerce: Coerce,
}

/// Active context during expansion.
#[derive(Debug, Clone, Default)]
pub struct Context {
    vocab: Option<String>,
    terms: HashMap<String, TermDef>,
}

impl Context {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Contents of the well-known legacy context document.
    pub fn legacy() -> Self {
        let mut ctx = Self::empty();
        for ns in Ns::ALL {
            ctx.define(ns.prefix(), ns.iri().to_string(), Coerce::None);
        }
        for key in vocab::VOCAB_VALUED_POLICY_KEYS {
            ctx.define(&format!("odrl:{}", key), format!("{}{}", vocab::ODRL_NS, key), Coerce::Vocab);
        }
        for key in vocab::ID_VALUED_POLICY_KEYS {
            ctx.define(&format!("odrl:{}", key), format!("{}{}", vocab::ODRL_NS, key), Coerce::Id);
        }
        ctx
    }

    /// Context used to lift a compact policy into IRIs.
    pub fn compact_policy() -> Self {
        let mut ctx = Self::legacy();
        ctx.vocab = Some(vocab::ODRL_NS.to_string());
        for key in vocab::DSPACE_POLICY_KEYS {
            ctx.define(key, format!("{}{}", vocab::DSPACE_NS, key), Coerce::None);
        }
        for key in vocab::VOCAB_VALUED_POLICY_KEYS {
            ctx.define(key, format!("{}{}", vocab::ODRL_NS, key), Coerce::Vocab);
        }
        for key in vocab::ID_VALUED_POLICY_KEYS {
            ctx.define(key, format!("{}{}", vocab::ODRL_NS, key), Coerce::Id);
        }
        ctx
    }

    fn define(&mut self, term: &str, iri: String, coerce: Coerce) {
        self.terms.insert(term.to_string(), TermDef { iri, coerce });
    }

    /// Apply a local `@context` value on top of this context.
    fn with(&self, local: &Value) -> Option<Context> {
        let mut ctx = self.clone();
        match local {
            Value::Null => ctx = Context::empty(),
            Value::String(url) if url == LEGACY_CONTEXT => {
                let legacy = Context::legacy();
                ctx.terms.extend(legacy.terms);
            }
            Value::String(_) => return None,
            Value::Array(items) => {
                for item in items {
                    ctx = ctx.with(item)?;
                }
            }
            Value::Object(defs) => {
                if let Some(Value::String(v)) = defs.get("@vocab") {
                    ctx.vocab = Some(ctx.expand_iri(v, true));
                }
                for (key, def) in defs {
                    if key.starts_with('@') {
                        continue;
                    }
                    match def {
                        Value::Null => {
                            ctx.terms.remove(key);
                        }
                        Value::String(iri) => {
                            let iri = ctx.expand_iri(iri, true);
                            ctx.define(key, iri, Coerce::None);
                        }
                        Value::Object(def) => {
                            let iri = match def.get("@id") {
                                Some(Value::String(id)) => ctx.expand_iri(id, true),
                                _ => ctx.expand_iri(key, true),
                            };
                            let coerce = match def.get("@type").and_then(Value::as_str) {
                                Some("@id") => Coerce::Id,
                                Some("@vocab") => Coerce::Vocab,
                                _ => Coerce::None,
                            };
                            ctx.define(key, iri, coerce);
                        }
                        _ => return None,
                    }
                }
            }
            _ => return None,
        }
        Some(ctx)
    }

    /// Expand a term, compact IRI or relative reference.
    ///
    /// `vocab_relative` selects term and `@vocab` resolution (property names,
    /// types); document-relative values only resolve prefixes.
    fn expand_iri(&self, value: &str, vocab_relative: bool) -> String {
        if value.starts_with('@') {
            return value.to_string();
        }
        if vocab_relative && let Some(def) = self.terms.get(value) {
            return def.iri.clone();
        }
        if let Some((prefix, suffix)) = value.split_once(':') {
            if suffix.starts_with("//") {
                return value.to_string();
            }
            return match self.terms.get(prefix) {
                Some(def) => format!("{}{}", def.iri, suffix),
                None => value.to_string(),
            };
        }
        match (&self.vocab, vocab_relative) {
            (Some(vocab), true) => format!("{}{}", vocab, value),
            _ => value.to_string(),
        }
    }

    fn coercion(&self, key: &str) -> Coerce {
        self.terms.get(key).map(|d| d.coerce).unwrap_or(Coerce::None)
    }
}

/// Expand a document into a single node object.
///
/// Returns `None` when the document is not an object or carries a context
/// that cannot be resolved.
pub fn expand(doc: &Value, base: &Context) -> Option<Value> {
    match doc {
        Value::Object(obj) => expand_node(base, obj).map(Value::Object),
        _ => None,
    }
}

fn expand_node(ctx: &Context, obj: &Map<String, Value>) -> Option<Map<String, Value>> {
    let local;
    let ctx = match obj.get("@context") {
        Some(c) => {
            local = ctx.with(c)?;
            &local
        }
        None => ctx,
    };

    let mut out = Map::new();
    for (key, value) in obj {
        match key.as_str() {
            "@context" => {}
            "@id" => {
                if let Value::String(id) = value {
                    out.insert("@id".into(), Value::String(ctx.expand_iri(id, false)));
                }
            }
            "@type" => {
                let types: Vec<Value> = match value {
                    Value::String(t) => vec![Value::String(ctx.expand_iri(t, true))],
                    Value::Array(ts) => ts
                        .iter()
                        .filter_map(Value::as_str)
                        .map(|t| Value::String(ctx.expand_iri(t, true)))
                        .collect(),
                    _ => Vec::new(),
                };
                out.insert("@type".into(), Value::Array(types));
            }
            k if k.starts_with('@') => {}
            _ => {
                let iri = ctx.expand_iri(key, true);
                // unmapped terms are dropped
                if !iri.contains(':') {
                    continue;
                }
                let mut values = Vec::new();
                expand_values(ctx, value, ctx.coercion(key), &mut values)?;
                if !values.is_empty() {
                    out.insert(iri, Value::Array(values));
                }
            }
        }
    }
    Some(out)
}

fn expand_values(ctx: &Context, value: &Value, coerce: Coerce, out: &mut Vec<Value>) -> Option<()> {
    match value {
        Value::Null => {}
        Value::Array(items) => {
            for item in items {
                expand_values(ctx, item, coerce, out)?;
            }
        }
        Value::String(s) => out.push(match coerce {
            Coerce::Id => id_node(ctx.expand_iri(s, false)),
            Coerce::Vocab => id_node(ctx.expand_iri(s, true)),
            Coerce::None => value_node(value.clone()),
        }),
        Value::Bool(_) | Value::Number(_) => out.push(value_node(value.clone())),
        Value::Object(obj) => {
            if let Some(v) = obj.get("@value") {
                let mut node = Map::new();
                node.insert("@value".into(), v.clone());
                for extra in ["@language", "@type"] {
                    if let Some(x) = obj.get(extra) {
                        node.insert(extra.into(), x.clone());
                    }
                }
                out.push(Value::Object(node));
            } else if let Some(list) = obj.get("@list") {
                expand_values(ctx, list, coerce, out)?;
            } else {
                out.push(Value::Object(expand_node(ctx, obj)?));
            }
        }
    }
    Some(())
}

fn value_node(v: Value) -> Value {
    let mut m = Map::new();
    m.insert("@value".into(), v);
    Value::Object(m)
}

fn id_node(iri: String) -> Value {
    let mut m = Map::new();
    m.insert("@id".into(), Value::String(iri));
    Value::Object(m)
}

/// First scalar of an expanded property array, from `@value` or `@id`.
pub fn first_str<'a>(values: &'a Value) -> Option<&'a str> {
    let first = match values {
        Value::Array(items) => items.first()?,
        other => other,
    };
    match first {
        Value::Object(obj) => obj
            .get("@value")
            .or_else(|| obj.get("@id"))
            .and_then(Value::as_str),
        Value::String(s) => Some(s),
        _ => None,
    }
}

/// Fold an expanded value back onto the compact vocabulary.
///
/// Known namespaces are stripped from keys, types and identifiers, value
/// objects collapse to their value and single-element arrays to their
/// element.
pub fn compact(expanded: &Value) -> Value {
    match expanded {
        Value::Array(items) => {
            let mut items: Vec<Value> = items.iter().map(compact).collect();
            if items.len() == 1 {
                items.swap_remove(0)
            } else {
                Value::Array(items)
            }
        }
        Value::Object(obj) => {
            if let Some(v) = obj.get("@value") {
                return v.clone();
            }
            if obj.len() == 1
                && let Some(Value::String(id)) = obj.get("@id")
            {
                return Value::String(compact_iri(id));
            }
            let mut out = Map::new();
            for (key, value) in obj {
                let compacted = match key.as_str() {
                    "@id" => match value {
                        Value::String(id) => Value::String(compact_iri(id)),
                        other => other.clone(),
                    },
                    "@type" => match value {
                        Value::Array(types) if types.len() == 1 => compact_type(&types[0]),
                        Value::Array(types) => Value::Array(types.iter().map(compact_type).collect()),
                        other => compact_type(other),
                    },
                    _ => compact(value),
                };
                out.insert(compact_iri(key), compacted);
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

fn compact_iri(iri: &str) -> String {
    vocab::local_name(iri).unwrap_or(iri).to_string()
}

fn compact_type(t: &Value) -> Value {
    match t {
        Value::String(iri) => Value::String(compact_iri(iri)),
        other => other.clone(),
    }
}
