/*!
Serialize walker: runtime value graph → node arena.

The walk is depth first and driven by an explicit frame stack, so the nesting
a graph may reach is bounded by `max_depth` and not by the thread's stack.
Each identity-bearing value is recorded in the seen map, together with a clone
of the value that keeps its allocation alive for the whole run, before its
children are visited. Any later occurrence of the same value, including one
reached through a cycle, resolves to the existing node.
*/

use std::collections::{btree_map, BTreeMap, HashMap};

use serde_json::Value as JsonValue;
use tracing::trace;

use crate::factory::Snapshot;
use crate::node::{escape_key, json_number, Encoded, NodeArena, NodeId, NodeValue};
use crate::registry::FactoryRegistry;
use crate::value::Value;
use crate::{GraphSnapError, Result};

/// Next item to encode
enum Work {
    Value(Value, usize),
    Snapshot(Snapshot, usize),
}

/// A node or container whose children are still being encoded
enum Frame {
    Node(NodeId),
    Array {
        items: std::vec::IntoIter<Snapshot>,
        done: Vec<Encoded>,
        depth: usize,
    },
    Object {
        fields: btree_map::IntoIter<String, Snapshot>,
        done: BTreeMap<String, Encoded>,
        key: String,
        depth: usize,
    },
}

/// Outcome of visiting one value
enum Visit {
    Done(Encoded),
    /// A fresh node whose snapshot must be encoded next
    Enter(NodeId, Snapshot),
}

pub(crate) struct SerializeWalker<'a> {
    registry: &'a FactoryRegistry,
    max_depth: usize,
    arena: NodeArena,
    seen: HashMap<usize, (NodeId, Value)>,
}

impl<'a> SerializeWalker<'a> {
    pub fn new(registry: &'a FactoryRegistry, max_depth: usize) -> Self {
        Self {
            registry,
            max_depth,
            arena: NodeArena::new(),
            seen: HashMap::new(),
        }
    }

    /// Walk `root`, returning its encoding and the nodes it refers to
    pub async fn run(mut self, root: &Value) -> Result<(Encoded, NodeArena)> {
        let mut stack: Vec<Frame> = Vec::new();
        let mut work = Work::Value(root.clone(), 1);

        loop {
            let mut result = match work {
                Work::Value(value, depth) => match self.visit_value(value, depth).await? {
                    Visit::Done(encoded) => encoded,
                    Visit::Enter(node, snapshot) => {
                        stack.push(Frame::Node(node));
                        work = Work::Snapshot(snapshot, depth + 1);
                        continue;
                    }
                },
                Work::Snapshot(Snapshot::Value(value), depth) => {
                    work = Work::Value(value, depth);
                    continue;
                }
                Work::Snapshot(Snapshot::Array(items), depth) => {
                    self.check_depth(depth)?;
                    let mut done = Vec::with_capacity(items.len());
                    let mut items = items.into_iter();
                    match items.next() {
                        Some(first) => {
                            stack.push(Frame::Array { items, done, depth });
                            work = Work::Snapshot(first, depth + 1);
                            continue;
                        }
                        None => Encoded::Array(done),
                    }
                }
                Work::Snapshot(Snapshot::Object(fields), depth) => {
                    self.check_depth(depth)?;
                    // walk in escaped-key order, the order the text is written in
                    let escaped: BTreeMap<String, Snapshot> = fields
                        .into_iter()
                        .map(|(key, field)| (escape_key(&key).into_owned(), field))
                        .collect();
                    let mut fields = escaped.into_iter();
                    match fields.next() {
                        Some((key, first)) => {
                            stack.push(Frame::Object {
                                fields,
                                done: BTreeMap::new(),
                                key,
                                depth,
                            });
                            work = Work::Snapshot(first, depth + 1);
                            continue;
                        }
                        None => Encoded::Object(BTreeMap::new()),
                    }
                }
            };

            // Hand the finished encoding to the innermost open frame
            work = loop {
                let Some(frame) = stack.pop() else {
                    return Ok((result, self.arena));
                };
                match frame {
                    Frame::Node(node) => {
                        self.arena.set_value(node, NodeValue::Snapshot(result));
                        result = Encoded::Node(node);
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
                            None => result = Encoded::Array(done),
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
                                    key,
                                    depth,
                                });
                                break Work::Snapshot(field, depth + 1);
                            }
                            None => result = Encoded::Object(done),
                        }
                    }
                }
            };
        }
    }

    async fn visit_value(&mut self, value: Value, depth: usize) -> Result<Visit> {
        if let Some(inline) = inline_primitive(&value) {
            return Ok(Visit::Done(Encoded::Inline(inline)));
        }
        self.check_depth(depth)?;

        let identity = value.identity();
        if let Some((node, _)) = identity.and_then(|id| self.seen.get(&id)) {
            trace!("Repeated reference to node {}", NodeArena::ref_id(*node));
            return Ok(Visit::Done(Encoded::Node(*node)));
        }

        let found = self.registry.find_factory(&value)?;

        if found.is_self_ref {
            let node = self.arena.push(found.name);
            self.arena.set_value(node, NodeValue::SelfRef);
            if let Some(id) = identity {
                self.seen.insert(id, (node, value));
            }
            return Ok(Visit::Done(Encoded::Node(node)));
        }

        let snapshot = found
            .factory
            .to_plain(&value)
            .await
            .map_err(|e| e.in_conversion(found.name.as_str()))?;
        snapshot.validate_top_level(&found.name)?;

        let node = self.arena.push(found.name);
        trace!("Node {} created", NodeArena::ref_id(node));
        if let Some(id) = identity {
            self.seen.insert(id, (node, value));
        }
        Ok(Visit::Enter(node, snapshot))
    }

    fn check_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_depth {
            Err(GraphSnapError::DepthLimitExceeded(self.max_depth))
        } else {
            Ok(())
        }
    }
}

/// JSON form of a primitive that needs no node
fn inline_primitive(value: &Value) -> Option<JsonValue> {
    match value {
        Value::Null => Some(JsonValue::Null),
        Value::Bool(b) => Some(JsonValue::Bool(*b)),
        Value::String(s) => Some(JsonValue::String(s.clone())),
        Value::Number(n) if n.is_finite() => Some(json_number(*n)),
        _ => None,
    }
}
