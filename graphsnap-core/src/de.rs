/*!
Deserialize walker: parsed envelope → runtime value graph.

Nodes are rebuilt in document order by a loop over an explicit frame stack,
so deep input is limited by `max_depth` only. A node whose factory can create
a placeholder registers that placeholder under its RefId before its snapshot
is decoded, so back-references reached from inside the snapshot resolve to the
placeholder; the real value is copied into it once `from_plain` returns.
Without a placeholder the RefId is marked in progress, and reaching it again
before it completes is an unbreakable cycle.
*/

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::{map, Map, Value as JsonValue};
use tracing::trace;

use crate::factory::{Factory, Snapshot};
use crate::node::{
    is_node, release, unescape_key, RootNode, CLASS_KEY, MARKER_KEY, REF_KEY, REF_MARKER,
    SELF_MARKER, VALUE_KEY,
};
use crate::registry::FactoryRegistry;
use crate::value::Value;
use crate::{GraphSnapError, Result};

enum Slot {
    InProgress,
    Resolved(Value),
}

/// Next JSON item to decode
enum Work {
    /// A value position: a node or a JSON-native primitive
    Value(JsonValue, usize),
    /// A position inside a snapshot, where plain arrays and objects are allowed
    Snapshot(JsonValue, usize),
}

/// A node whose snapshot is being decoded
struct OpenNode {
    class: String,
    ref_id: String,
    factory: Arc<dyn Factory>,
    placeholder: Option<Value>,
}

enum Frame {
    Node(OpenNode),
    Array {
        items: std::vec::IntoIter<JsonValue>,
        done: Vec<Snapshot>,
        depth: usize,
    },
    Object {
        fields: map::IntoIter,
        done: BTreeMap<String, Snapshot>,
        key: String,
        depth: usize,
    },
}

impl Frame {
    /// Hand the JSON not yet decoded to [`release`]
    fn release(self) {
        match self {
            Frame::Node(_) => {}
            Frame::Array { items, .. } => release(JsonValue::Array(items.collect())),
            Frame::Object { fields, .. } => release(JsonValue::Array(
                fields.map(|(_, field)| field).collect(),
            )),
        }
    }
}

/// Outcome of reaching a node
enum Visit {
    Done(Value),
    Enter(OpenNode, JsonValue),
}

pub(crate) struct DeserializeWalker<'a> {
    registry: &'a FactoryRegistry,
    extras: HashMap<String, Arc<dyn Factory>>,
    instances: HashMap<String, Slot>,
    max_depth: usize,
}

impl<'a> DeserializeWalker<'a> {
    pub fn new(
        registry: &'a FactoryRegistry,
        extras: &[Arc<dyn Factory>],
        max_depth: usize,
    ) -> Self {
        Self {
            registry,
            extras: registry.name_extras(extras),
            instances: HashMap::new(),
            max_depth,
        }
    }

    /// Check the envelope shape and split it into version and root
    pub fn envelope(parsed: JsonValue) -> Result<RootNode<JsonValue>> {
        let mut object = match parsed {
            JsonValue::Object(object) => object,
            other => {
                let kind = json_kind(&other);
                release(other);
                return Err(GraphSnapError::malformed(format!(
                    "expected an envelope object, found {kind}"
                )));
            }
        };
        let checked = Self::split_envelope(&mut object);
        release(JsonValue::Object(object));
        checked
    }

    fn split_envelope(object: &mut Map<String, JsonValue>) -> Result<RootNode<JsonValue>> {
        let version = match object.remove("version") {
            Some(JsonValue::String(version)) => version,
            Some(_) => return Err(GraphSnapError::malformed("'version' must be a string")),
            None => return Err(GraphSnapError::malformed("missing 'version'")),
        };
        if let Some(key) = object.keys().find(|key| key.as_str() != "root") {
            return Err(GraphSnapError::malformed(format!(
                "unexpected envelope key '{key}'"
            )));
        }
        let root = object
            .remove("root")
            .ok_or_else(|| GraphSnapError::malformed("missing 'root'"))?;
        Ok(RootNode { version, root })
    }

    /// Rebuild the root value
    pub async fn run(mut self, root: JsonValue) -> Result<(Value, usize)> {
        let mut stack = Vec::new();
        let walked = self.walk(root, &mut stack).await;
        for frame in stack {
            frame.release();
        }
        let value = walked?;
        Ok((value, self.instances.len()))
    }

    async fn walk(&mut self, root: JsonValue, stack: &mut Vec<Frame>) -> Result<Value> {
        let mut work = Work::Value(root, 1);

        loop {
            let mut result = match work {
                Work::Value(JsonValue::Object(object), depth) if is_node(&object) => {
                    match self.enter_node(object, depth)? {
                        Visit::Done(value) => Snapshot::Value(value),
                        Visit::Enter(node, body) => {
                            stack.push(Frame::Node(node));
                            work = Work::Snapshot(body, depth + 1);
                            continue;
                        }
                    }
                }
                Work::Value(other @ (JsonValue::Object(_) | JsonValue::Array(_)), _) => {
                    let kind = json_kind(&other);
                    release(other);
                    return Err(GraphSnapError::malformed(format!(
                        "expected a node or primitive, found {kind}"
                    )));
                }
                Work::Snapshot(JsonValue::Object(object), depth) if is_node(&object) => {
                    work = Work::Value(JsonValue::Object(object), depth);
                    continue;
                }
                Work::Snapshot(JsonValue::Object(object), depth) => {
                    if let Err(e) = self.check_depth(depth) {
                        release(JsonValue::Object(object));
                        return Err(e);
                    }
                    let mut fields = object.into_iter();
                    match fields.next() {
                        Some((key, first)) => {
                            stack.push(Frame::Object {
                                fields,
                                done: BTreeMap::new(),
                                key: unescape_key(&key).to_string(),
                                depth,
                            });
                            work = Work::Snapshot(first, depth + 1);
                            continue;
                        }
                        None => Snapshot::Object(BTreeMap::new()),
                    }
                }
                Work::Snapshot(JsonValue::Array(items), depth) => {
                    if let Err(e) = self.check_depth(depth) {
                        release(JsonValue::Array(items));
                        return Err(e);
                    }
                    let mut done = Vec::with_capacity(items.len());
                    let mut items = items.into_iter();
                    match items.next() {
                        Some(first) => {
                            stack.push(Frame::Array { items, done, depth });
                            work = Work::Snapshot(first, depth + 1);
                            continue;
                        }
                        None => Snapshot::Array(done),
                    }
                }
                Work::Value(primitive, _) | Work::Snapshot(primitive, _) => {
                    Snapshot::Value(primitive_value(primitive))
                }
            };

            // Hand the finished snapshot to the innermost open frame
            work = loop {
                let Some(frame) = stack.pop() else {
                    return match result {
                        Snapshot::Value(value) => Ok(value),
                        _ => Err(GraphSnapError::malformed("root is not a node or primitive")),
                    };
                };
                match frame {
                    Frame::Node(node) => {
                        result = Snapshot::Value(self.finish_node(node, result).await?);
                    }
                    Frame::Array {
                        mut items,
                        mut done,
                        depth,
                    } => {
                        done.push(result);
                        match items.next() {
                            Some(item) => {
                                stack.push(Frame::Array { items, done, depth });
                                break Work::Snapshot(item, depth + 1);
                            }
                            None => result = Snapshot::Array(done),
                        }
                    }
                    Frame::Object {
                        mut fields,
                        mut done,
                        key,
                        depth,
                    } => {
                        done.insert(key, result);
                        match fields.next() {
                            Some((key, field)) => {
                                stack.push(Frame::Object {
                                    fields,
                                    done,
                                    key: unescape_key(&key).to_string(),
                                    depth,
                                });
                                break Work::Snapshot(field, depth + 1);
                            }
                            None => result = Snapshot::Object(done),
                        }
                    }
                }
            };
        }
    }

    fn enter_node(&mut self, mut node: Map<String, JsonValue>, depth: usize) -> Result<Visit> {
        let visit = self.open_node(&mut node, depth);
        release(JsonValue::Object(node));
        visit
    }

    /// Resolve a reached node, taking its value out of `node` when it must be decoded
    fn open_node(&mut self, node: &mut Map<String, JsonValue>, depth: usize) -> Result<Visit> {
        self.check_depth(depth)?;
        let class = take_string(node, CLASS_KEY)?;
        let ref_id = take_string(node, REF_KEY)?;
        let factory = self.resolve(&class)?;

        match node.remove(MARKER_KEY) {
            Some(JsonValue::String(marker)) if marker == REF_MARKER => {
                return match self.instances.get(&ref_id) {
                    Some(Slot::Resolved(value)) => Ok(Visit::Done(value.clone())),
                    Some(Slot::InProgress) => {
                        Err(GraphSnapError::UnbreakableCycle { class, ref_id })
                    }
                    None => Err(GraphSnapError::MissingReference(ref_id)),
                };
            }
            Some(JsonValue::String(marker)) if marker == SELF_MARKER => {
                self.claim(&ref_id)?;
                let token = Value::Class(factory.type_identity().clone());
                self.instances.insert(ref_id, Slot::Resolved(token.clone()));
                return Ok(Visit::Done(token));
            }
            Some(other) => {
                return Err(GraphSnapError::malformed(format!(
                    "unknown marker {other} on node '{ref_id}'"
                )))
            }
            None => {}
        }

        self.claim(&ref_id)?;
        let body = node.remove(VALUE_KEY).ok_or_else(|| {
            GraphSnapError::malformed(format!("node '{ref_id}' has neither value nor marker"))
        })?;
        trace!("Decoding node {} ({})", ref_id, class);

        let placeholder = factory.create_empty();
        let slot = match &placeholder {
            Some(placeholder) => Slot::Resolved(placeholder.clone()),
            None => Slot::InProgress,
        };
        self.instances.insert(ref_id.clone(), slot);

        Ok(Visit::Enter(
            OpenNode {
                class,
                ref_id,
                factory,
                placeholder,
            },
            body,
        ))
    }

    /// Convert a decoded snapshot and resolve the node's slot
    async fn finish_node(&mut self, node: OpenNode, snapshot: Snapshot) -> Result<Value> {
        let OpenNode {
            class,
            ref_id,
            factory,
            placeholder,
        } = node;
        let real = factory
            .from_plain(snapshot)
            .await
            .map_err(|e| e.in_conversion(class.as_str()))?;

        match placeholder {
            Some(placeholder) => {
                factory
                    .update_instance(&placeholder, real)
                    .await
                    .map_err(|e| e.in_conversion(class.as_str()))?;
                Ok(placeholder)
            }
            None => {
                self.instances.insert(ref_id, Slot::Resolved(real.clone()));
                Ok(real)
            }
        }
    }

    /// Extra factories first, then the registry
    fn resolve(&self, class: &str) -> Result<Arc<dyn Factory>> {
        match self.extras.get(class) {
            Some(factory) => Ok(factory.clone()),
            None => self.registry.get_factory(class),
        }
    }

    fn claim(&self, ref_id: &str) -> Result<()> {
        if self.instances.contains_key(ref_id) {
            return Err(GraphSnapError::malformed(format!(
                "ref '{ref_id}' is defined more than once"
            )));
        }
        Ok(())
    }

    fn check_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_depth {
            Err(GraphSnapError::DepthLimitExceeded(self.max_depth))
        } else {
            Ok(())
        }
    }
}

fn take_string(node: &mut Map<String, JsonValue>, key: &str) -> Result<String> {
    match node.remove(key) {
        Some(JsonValue::String(value)) => Ok(value),
        Some(other) => Err(GraphSnapError::malformed(format!(
            "node field '{key}' must be a string, found {}",
            json_kind(&other)
        ))),
        None => Err(GraphSnapError::malformed(format!(
            "node is missing '{key}'"
        ))),
    }
}

fn primitive_value(json: JsonValue) -> Value {
    match json {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(b),
        JsonValue::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        JsonValue::String(s) => Value::String(s),
        // callers route arrays and objects elsewhere
        JsonValue::Array(_) | JsonValue::Object(_) => Value::Undefined,
    }
}

fn json_kind(json: &JsonValue) -> &'static str {
    match json {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
