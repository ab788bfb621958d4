/*!
Node model of the encoded form.

An encoded graph is a JSON envelope `{"version", "root"}`. Every value that is
not a JSON-native primitive becomes a node object tagged with [`NODE_KEY`]:

```text
{"__node": true, "class": "Agent", "ref": "1", "value": <snapshot>}
{"__node": true, "class": "Agent", "ref": "1", "marker": "ref"}
{"__node": true, "class": "Agent", "ref": "2", "marker": "self"}
```

Keys of snapshot objects that could be mistaken for the tag are escaped with a
leading `~`, so a snapshot object is never read back as a node.
*/

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{GraphSnapError, Result};

pub const NODE_KEY: &str = "__node";
pub const CLASS_KEY: &str = "class";
pub const REF_KEY: &str = "ref";
pub const VALUE_KEY: &str = "value";
pub const MARKER_KEY: &str = "marker";

/// Marker of a node that points at an earlier node with the same ref
pub const REF_MARKER: &str = "ref";
/// Marker of a node whose value is the class token of its own factory
pub const SELF_MARKER: &str = "self";

const ESCAPE: char = '~';

/// Top-level envelope of an encoded graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootNode<T> {
    pub version: String,
    pub root: T,
}

/// Escape a snapshot object key
pub fn escape_key(key: &str) -> Cow<'_, str> {
    if key == NODE_KEY || key.starts_with(ESCAPE) {
        Cow::Owned(format!("{ESCAPE}{key}"))
    } else {
        Cow::Borrowed(key)
    }
}

/// Reverse of [`escape_key`]
pub fn unescape_key(key: &str) -> &str {
    key.strip_prefix(ESCAPE).unwrap_or(key)
}

/// True when a JSON object is a node rather than a snapshot object
pub fn is_node(object: &serde_json::Map<String, JsonValue>) -> bool {
    matches!(object.get(NODE_KEY), Some(JsonValue::Bool(true)))
}

/// Index of a node in a [`NodeArena`].
pub(crate) type NodeId = usize;

/// One class-tagged node produced by the serialize walker.
#[derive(Debug)]
pub(crate) struct SerializerNode {
    pub class: String,
    pub value: NodeValue,
}

#[derive(Debug)]
pub(crate) enum NodeValue {
    /// Registered but children not encoded yet
    Pending,
    Snapshot(Encoded),
    SelfRef,
}

/// Snapshot tree with heap leaves replaced by node handles.
#[derive(Debug)]
pub(crate) enum Encoded {
    Inline(JsonValue),
    Node(NodeId),
    Array(Vec<Encoded>),
    /// Keys are already escaped
    Object(BTreeMap<String, Encoded>),
}

/// Nodes of one serialize run, in creation order.
///
/// RefIds are derived from creation order, so they start at `"1"` and increase
/// by one for every node.
#[derive(Debug, Default)]
pub(crate) struct NodeArena {
    nodes: Vec<SerializerNode>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, class: String) -> NodeId {
        self.nodes.push(SerializerNode {
            class,
            value: NodeValue::Pending,
        });
        self.nodes.len() - 1
    }

    pub fn set_value(&mut self, id: NodeId, value: NodeValue) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.value = value;
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&SerializerNode> {
        self.nodes.get(id)
    }

    pub fn ref_id(id: NodeId) -> String {
        (id + 1).to_string()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// Deepest `[`/`{` nesting of a JSON text, ignoring brackets inside strings.
pub fn nesting_depth(text: &str) -> usize {
    let mut depth = 0usize;
    let mut deepest = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for byte in text.bytes() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'[' | b'{' => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            b']' | b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    deepest
}

/// Texts nested at most this deep are parsed on the calling thread
const INLINE_PARSE_DEPTH: usize = 128;
/// Stack reserved for a dedicated parser thread, plus an allowance per level
const PARSER_STACK_BASE: usize = 1024 * 1024;
const PARSER_STACK_PER_LEVEL: usize = 8 * 1024;

/// Parse encoded text into a JSON tree, refusing input nested deeper than
/// `max_depth` plus the envelope.
///
/// serde_json's parser recurses once per nesting level, so its own recursion
/// limit is lifted and deep text is parsed on a thread whose stack is sized
/// from the bracket depth measured above.
pub(crate) fn parse_text(text: &str, max_depth: usize) -> Result<JsonValue> {
    let depth = nesting_depth(text);
    if depth > max_depth.saturating_add(1) {
        return Err(GraphSnapError::DepthLimitExceeded(max_depth));
    }
    with_parser_stack(depth, || parse_unbounded(text))
}

/// Re-encode JSON text, compact or indented, after the same depth check as
/// [`parse_text`]
pub fn reformat(text: &str, max_depth: usize, pretty: bool) -> Result<String> {
    let depth = nesting_depth(text);
    if depth > max_depth.saturating_add(1) {
        return Err(GraphSnapError::DepthLimitExceeded(max_depth));
    }
    with_parser_stack(depth, || {
        let parsed = parse_unbounded(text)?;
        let written = if pretty {
            serde_json::to_string_pretty(&parsed)
        } else {
            serde_json::to_string(&parsed)
        };
        release(parsed);
        Ok(written?)
    })
}

fn parse_unbounded(text: &str) -> Result<JsonValue> {
    let mut deserializer = serde_json::Deserializer::from_str(text);
    deserializer.disable_recursion_limit();
    let value = JsonValue::deserialize(&mut deserializer)?;
    deserializer.end()?;
    Ok(value)
}

/// Run `work`, which recurses once per nesting level, on a stack that fits `depth`
fn with_parser_stack<T, F>(depth: usize, work: F) -> Result<T>
where
    T: Send,
    F: FnOnce() -> Result<T> + Send,
{
    if depth <= INLINE_PARSE_DEPTH {
        return work();
    }
    let stack_size = depth
        .saturating_mul(PARSER_STACK_PER_LEVEL)
        .saturating_add(PARSER_STACK_BASE);

    std::thread::scope(|scope| -> Result<T> {
        let parser = std::thread::Builder::new()
            .name("graphsnap-parser".to_string())
            .stack_size(stack_size)
            .spawn_scoped(scope, work)?;
        parser
            .join()
            .map_err(|_| GraphSnapError::validation("JSON parser thread panicked"))?
    })
}

/// Drop a JSON tree level by level instead of recursively
pub(crate) fn release(json: JsonValue) {
    let mut pending = vec![json];
    while let Some(value) = pending.pop() {
        match value {
            JsonValue::Array(items) => pending.extend(items),
            JsonValue::Object(object) => pending.extend(object.into_iter().map(|(_, v)| v)),
            _ => {}
        }
    }
}

/// JSON form of a finite number; integral values are written without a fraction
pub(crate) fn json_number(n: f64) -> JsonValue {
    const MAX_SAFE: f64 = 9_007_199_254_740_991.0;
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE && !(n == 0.0 && n.is_sign_negative()) {
        JsonValue::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null)
    }
}
