//! XML wire codec for the gateway's flat/nested dialect.
//!
//! The gateway speaks a minimal XML shape: a `<xml>` root whose children are
//! `<key>value</key>` entries. Numeric-literal values are emitted bare; every
//! other scalar is wrapped in a CDATA section; nested maps recurse one element
//! deeper. This module is deliberately NOT a general-purpose XML library;
//! it covers exactly the dialect the protocol requires.
//!
//! Decoding goes through [`quick_xml`], which performs no external entity
//! resolution, so a malicious inbound document cannot trigger entity
//! expansion or remote fetches.

use quick_xml::{events::Event, Reader};

use crate::error::{BridgeError, Result};

/// A wire value: a scalar leaf or a nested, insertion-ordered map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Scalar string value. Numeric strings are serialized without CDATA.
    Leaf(String),
    /// Nested element with child entries.
    Composite(Params),
}

impl Value {
    /// Returns the scalar value, or `None` for composites.
    #[must_use]
    pub fn as_leaf(&self) -> Option<&str> {
        match self {
            Self::Leaf(s) => Some(s),
            Self::Composite(_) => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Leaf(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Leaf(s)
    }
}

/// Insertion-ordered parameter map used for both signing and serialization.
///
/// Keys keep the order they were inserted in, matching the wire dialect's
/// "emit in iteration order" rule. Lookup is linear, which is fine for the
/// few dozen entries a request ever carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, Value)>);

impl Params {
    /// Creates an empty parameter map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry, replacing any existing value under the same key
    /// in place (the original position is kept).
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.0.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    /// Returns the value under `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Returns the scalar value under `key`, if present and a leaf.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_leaf)
    }

    /// Removes and returns the value under `key`.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let idx = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(idx).1)
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// True when `s` is a numeric literal per the wire dialect (emitted bare,
/// without a CDATA wrapper).
fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.parse::<f64>().map(|f| f.is_finite()).unwrap_or(false)
}

/// Serializes a parameter map to the gateway's XML dialect.
///
/// Entries are emitted in iteration order; composites recurse.
///
/// # Examples
///
/// ```
/// use wxpay_bridge::codec::{encode, Params};
///
/// let mut params = Params::new();
/// params.insert("appid", "wx001");
/// params.insert("total_fee", "100");
/// assert_eq!(
///     encode(&params),
///     "<xml><appid><![CDATA[wx001]]></appid><total_fee>100</total_fee></xml>"
/// );
/// ```
#[must_use]
pub fn encode(params: &Params) -> String {
    let mut xml = String::from("<xml>");
    write_entries(&mut xml, params);
    xml.push_str("</xml>");
    xml
}

fn write_entries(xml: &mut String, params: &Params) {
    for (key, value) in params.iter() {
        xml.push('<');
        xml.push_str(key);
        xml.push('>');
        match value {
            Value::Leaf(s) if is_numeric(s) => xml.push_str(s),
            Value::Leaf(s) => {
                xml.push_str("<![CDATA[");
                xml.push_str(s);
                xml.push_str("]]>");
            }
            Value::Composite(inner) => write_entries(xml, inner),
        }
        xml.push_str("</");
        xml.push_str(key);
        xml.push('>');
    }
}

/// Element under construction during decoding.
struct Node {
    name: String,
    text: Option<String>,
    children: Params,
}

/// Parses the gateway's XML dialect into a parameter map.
///
/// The root element is unwrapped: `decode` returns its children. An element
/// with neither children nor text decodes to an empty string leaf, never an
/// empty composite (the protocol's convention for absent values).
///
/// # Errors
///
/// Returns [`BridgeError::Protocol`] on malformed XML or a missing root.
pub fn decode(xml: &str) -> Result<Params> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<Node> = Vec::new();
    let mut root: Option<Params> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                stack.push(Node { name, text: None, children: Params::new() });
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                attach(&mut stack, &mut root, name, Value::Leaf(String::new()))?;
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| BridgeError::Protocol(format!("bad text node: {e}")))?;
                if let Some(node) = stack.last_mut() {
                    node.text = Some(text.into_owned());
                }
            }
            Ok(Event::CData(t)) => {
                let text = String::from_utf8_lossy(&t).into_owned();
                if let Some(node) = stack.last_mut() {
                    node.text = Some(text);
                }
            }
            Ok(Event::End(_)) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| BridgeError::Protocol("unbalanced end tag".to_owned()))?;
                let value = if node.children.is_empty() {
                    Value::Leaf(node.text.unwrap_or_default())
                } else {
                    Value::Composite(node.children)
                };
                attach(&mut stack, &mut root, node.name, value)?;
            }
            Ok(Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_)) => {}
            Err(e) => return Err(BridgeError::Protocol(format!("xml parse error: {e}"))),
        }
        buf.clear();
    }

    root.ok_or_else(|| BridgeError::Protocol("missing xml root element".to_owned()))
}

/// Attaches a finished element to its parent, or promotes it to the root.
fn attach(
    stack: &mut [Node],
    root: &mut Option<Params>,
    name: String,
    value: Value,
) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.insert(name, value);
        return Ok(());
    }
    match value {
        Value::Composite(children) => {
            *root = Some(children);
            Ok(())
        }
        // A childless root still decodes: a bare `<xml/>` or `<xml></xml>`
        // carries an empty map.
        Value::Leaf(text) if text.is_empty() => {
            *root = Some(Params::new());
            Ok(())
        }
        Value::Leaf(_) => Err(BridgeError::Protocol("scalar xml root".to_owned())),
    }
}
